//! Translation module supporting LibreTranslate and a Google Translate proxy.

use crate::error::{Result, VocabError};
use crate::retry::{RetryPolicy, ServiceError};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::{debug, warn};

/// Source language of every word list.
pub const SOURCE_LANGUAGE: &str = "en";

/// Target languages offered to users, as (ISO 639-1 code, English name).
pub const SUPPORTED_LANGUAGES: &[(&str, &str)] = &[
    ("en", "English"),
    ("fa", "Persian"),
    ("es", "Spanish"),
    ("fr", "French"),
    ("de", "German"),
    ("it", "Italian"),
    ("pt", "Portuguese"),
    ("ru", "Russian"),
    ("ja", "Japanese"),
    ("ko", "Korean"),
    ("zh", "Chinese"),
    ("ar", "Arabic"),
    ("tr", "Turkish"),
    ("hi", "Hindi"),
    ("nl", "Dutch"),
    ("pl", "Polish"),
    ("sv", "Swedish"),
    ("no", "Norwegian"),
    ("da", "Danish"),
    ("fi", "Finnish"),
    ("cs", "Czech"),
    ("ro", "Romanian"),
    ("hu", "Hungarian"),
    ("el", "Greek"),
    ("he", "Hebrew"),
    ("th", "Thai"),
    ("vi", "Vietnamese"),
    ("id", "Indonesian"),
    ("uk", "Ukrainian"),
    ("bg", "Bulgarian"),
    ("hr", "Croatian"),
    ("sk", "Slovak"),
    ("sl", "Slovenian"),
    ("et", "Estonian"),
    ("lv", "Latvian"),
    ("lt", "Lithuanian"),
];

/// Returns the English name of a supported language code.
pub fn language_name(code: &str) -> Option<&'static str> {
    SUPPORTED_LANGUAGES
        .iter()
        .find(|(c, _)| c.eq_ignore_ascii_case(code))
        .map(|(_, name)| *name)
}

/// Validates a target language code, returning it lowercased.
pub fn validate_language(code: &str) -> Result<String> {
    let code = code.trim().to_lowercase();
    if language_name(&code).is_some() {
        Ok(code)
    } else {
        Err(VocabError::UnsupportedLanguage(code))
    }
}

/// Translation backend to use.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum TranslationBackend {
    /// Google Translate via a translation-api proxy server.
    Google,
    /// LibreTranslate-compatible endpoint (POST with JSON body).
    #[default]
    LibreTranslate,
}

impl FromStr for TranslationBackend {
    type Err = std::convert::Infallible;

    /// Parses the backend from a string.
    ///
    /// Accepts "google" or "proxy" for the Google proxy, defaults to LibreTranslate.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "google" | "proxy" => TranslationBackend::Google,
            _ => TranslationBackend::LibreTranslate,
        })
    }
}

/// Translation service for single words, with per-word retry.
#[derive(Clone)]
pub struct Translator {
    /// HTTP client for API requests.
    client: reqwest::Client,

    /// Base URL for the translation API.
    api_url: String,

    /// Which backend to use.
    backend: TranslationBackend,

    /// Retry policy applied to each word.
    retry: RetryPolicy,
}

/// Request body for LibreTranslate API.
#[derive(Debug, Serialize)]
struct LibreTranslateRequest<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
    format: &'a str,
}

/// Response from LibreTranslate API.
#[derive(Debug, Deserialize)]
struct LibreTranslateResponse {
    #[serde(rename = "translatedText", default)]
    translated_text: String,
}

/// Response from the Google proxy.
#[derive(Debug, Deserialize)]
struct ProxyResponse {
    #[serde(default)]
    translation: String,
}

impl Translator {
    /// Creates a new Translator.
    ///
    /// # Arguments
    ///
    /// * `api_url` - The translation endpoint (LibreTranslate) or proxy base URL (Google).
    /// * `backend` - Which translation backend to use.
    /// * `retry` - Per-word retry policy.
    pub fn new(api_url: &str, backend: TranslationBackend, retry: RetryPolicy) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| VocabError::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_url: api_url.to_string(),
            backend,
            retry,
        })
    }

    /// Translates one English word into `target`.
    ///
    /// Transient failures and empty results are retried per the policy. Once
    /// the attempts are exhausted the failure is logged and an empty string is
    /// returned, so a bad word never stops the caller.
    pub async fn translate_word(&self, word: &str, target: &str) -> String {
        match self
            .retry
            .run(word, |_| self.try_translate(word, target))
            .await
        {
            Ok(translation) => translation,
            Err(e) => {
                warn!(
                    "Error translating '{}' after {} attempts: {}",
                    word,
                    self.retry.max_attempts.max(1),
                    e
                );
                String::new()
            }
        }
    }

    /// Makes a single translation request.
    ///
    /// A response with blank text is reported as [`ServiceError::empty_response`].
    pub async fn try_translate(
        &self,
        word: &str,
        target: &str,
    ) -> std::result::Result<String, ServiceError> {
        let translation = match self.backend {
            TranslationBackend::Google => self.translate_with_google(word, target).await?,
            TranslationBackend::LibreTranslate => {
                self.translate_with_libretranslate(word, target).await?
            }
        };

        let translation = translation.trim();
        if translation.is_empty() {
            return Err(ServiceError::empty_response("translation"));
        }

        debug!("Translated '{}' -> '{}' ({})", word, translation, target);
        Ok(translation.to_string())
    }

    /// Translates text using a translation-api proxy server.
    ///
    /// GET {api_url}/translate/{source}/{target}/{text}
    async fn translate_with_google(
        &self,
        text: &str,
        target: &str,
    ) -> std::result::Result<String, ServiceError> {
        let url = format!(
            "{}/translate/{}/{}/{}",
            self.api_url.trim_end_matches('/'),
            SOURCE_LANGUAGE,
            target,
            urlencoding::encode(text)
        );

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::from_status(status, &body));
        }

        let result: ProxyResponse = response.json().await?;
        Ok(result.translation)
    }

    /// Translates text using the LibreTranslate API.
    async fn translate_with_libretranslate(
        &self,
        text: &str,
        target: &str,
    ) -> std::result::Result<String, ServiceError> {
        let request = LibreTranslateRequest {
            q: text,
            source: SOURCE_LANGUAGE,
            target,
            format: "text",
        };

        let response = self.client.post(&self.api_url).json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::from_status(status, &body));
        }

        let result: LibreTranslateResponse = response.json().await?;
        Ok(result.translated_text)
    }
}
