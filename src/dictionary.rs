//! Word enrichment from a dictionary lookup service.
//!
//! Combines the POS reference dictionary with live lookups against a
//! dictionaryapi.dev-compatible endpoint. Lookup failures are soft: the
//! enricher returns whatever the reference dictionary supplied.

use crate::error::{Result, VocabError};
use crate::pos::PosDictionary;
use crate::retry::{retry_transient, RetryPolicy, ServiceError};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Maximum examples kept per word.
pub const MAX_EXAMPLES: usize = 2;

/// Definitions scanned for examples.
const EXAMPLE_SCAN_LIMIT: usize = 3;

/// Definition, part of speech, examples and pronunciation for one word.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Enrichment {
    pub definition: String,
    pub word_type: String,
    pub examples: Vec<String>,
    pub pronunciation: String,
}

/// One entry of the dictionary service response.
#[derive(Debug, Deserialize)]
pub struct DictionaryEntry {
    #[serde(default)]
    pub phonetics: Vec<Phonetic>,
    #[serde(default)]
    pub meanings: Vec<Meaning>,
}

#[derive(Debug, Deserialize)]
pub struct Phonetic {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Meaning {
    #[serde(rename = "partOfSpeech", default)]
    pub part_of_speech: String,
    #[serde(default)]
    pub definitions: Vec<Definition>,
}

#[derive(Debug, Deserialize)]
pub struct Definition {
    #[serde(default)]
    pub definition: String,
    #[serde(default)]
    pub example: Option<String>,
}

impl Enrichment {
    /// Starts from the reference dictionary entry for `word`, if any.
    pub fn seeded(word: &str, pos: &PosDictionary) -> Self {
        pos.get(word)
            .map(|entry| Enrichment {
                word_type: entry.pos.clone(),
                definition: entry.definition.clone(),
                ..Default::default()
            })
            .unwrap_or_default()
    }

    /// Merges a live lookup result into the seeded values.
    ///
    /// Pronunciation and examples always come from the live entry. Part of
    /// speech and definition fill in only what the seed left empty.
    pub fn merge(&mut self, entries: &[DictionaryEntry]) {
        let Some(entry) = entries.first() else {
            return;
        };

        if let Some(text) = entry
            .phonetics
            .iter()
            .filter_map(|p| p.text.as_deref())
            .map(str::trim)
            .find(|t| !t.is_empty())
        {
            self.pronunciation = text.to_string();
        }

        let Some(meaning) = entry.meanings.first() else {
            return;
        };

        if self.word_type.is_empty() {
            self.word_type = meaning.part_of_speech.trim().to_string();
        }

        if self.definition.is_empty() {
            if let Some(first) = meaning.definitions.first() {
                self.definition = first.definition.trim().to_string();
            }
        }

        self.examples = meaning
            .definitions
            .iter()
            .take(EXAMPLE_SCAN_LIMIT)
            .filter_map(|d| d.example.as_deref())
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .take(MAX_EXAMPLES)
            .map(str::to_string)
            .collect();
    }
}

/// Client for the dictionary lookup service.
#[derive(Clone)]
pub struct Enricher {
    client: reqwest::Client,
    api_url: String,
    retry: RetryPolicy,
}

impl Enricher {
    /// Creates an enricher against `api_url` (e.g. `https://api.dictionaryapi.dev/api/v2/entries/en`).
    ///
    /// Lookups make a single attempt unless a different policy is supplied
    /// with [`Enricher::with_retry`].
    pub fn new(api_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| VocabError::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            retry: RetryPolicy::once(),
        })
    }

    /// Retries transient lookup failures with `policy`; 404s are never retried.
    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy.retry_on(retry_transient);
        self
    }

    /// Enriches `word`, never failing.
    pub async fn enrich(&self, word: &str, pos: &PosDictionary) -> Enrichment {
        let word = word.trim();
        let mut info = Enrichment::seeded(word, pos);

        match self.retry.run(word, |_| self.lookup(word)).await {
            Ok(entries) => info.merge(&entries),
            Err(e) => debug!("Dictionary lookup for '{}' failed: {}", word, e),
        }

        info
    }

    /// Fetches raw entries for `word`.
    pub async fn lookup(&self, word: &str) -> std::result::Result<Vec<DictionaryEntry>, ServiceError> {
        let url = format!(
            "{}/{}",
            self.api_url,
            urlencoding::encode(&word.to_lowercase())
        );

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            if status != reqwest::StatusCode::NOT_FOUND {
                warn!("Dictionary API error for '{}': {}", word, status);
            }
            return Err(ServiceError::from_status(status, &body));
        }

        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pos::PosDictionary;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn live_response() -> serde_json::Value {
        serde_json::json!([{
            "word": "run",
            "phonetics": [{"audio": ""}, {"text": "/rʌn/"}],
            "meanings": [{
                "partOfSpeech": "verb",
                "definitions": [
                    {"definition": "D2", "example": "I run daily."},
                    {"definition": "To flow"},
                    {"definition": "To operate", "example": "Run the engine."},
                    {"definition": "To manage", "example": "She runs a shop."}
                ]
            }]
        }])
    }

    fn entries() -> Vec<DictionaryEntry> {
        serde_json::from_value(live_response()).unwrap()
    }

    #[test]
    fn test_reference_dictionary_wins_for_type_and_definition() {
        let pos = PosDictionary::from_rows([("run", "noun", "D1")]);
        let mut info = Enrichment::seeded("Run", &pos);
        info.merge(&entries());

        assert_eq!(info.word_type, "noun");
        assert_eq!(info.definition, "D1");
        assert_eq!(info.pronunciation, "/rʌn/");
    }

    #[test]
    fn test_live_values_fill_gaps() {
        let mut info = Enrichment::seeded("run", &PosDictionary::empty());
        info.merge(&entries());

        assert_eq!(info.word_type, "verb");
        assert_eq!(info.definition, "D2");
    }

    #[test]
    fn test_examples_scan_three_keep_two() {
        let mut info = Enrichment::default();
        info.merge(&entries());

        // The fourth definition's example is outside the scan window.
        assert_eq!(info.examples, vec!["I run daily.", "Run the engine."]);
    }

    #[test]
    fn test_merge_empty_response_keeps_seed() {
        let pos = PosDictionary::from_rows([("cat", "n.", "Feline")]);
        let mut info = Enrichment::seeded("cat", &pos);
        info.merge(&[]);
        assert_eq!(info.word_type, "noun");
        assert_eq!(info.definition, "Feline");
        assert!(info.examples.is_empty());
    }

    #[tokio::test]
    async fn test_enrich_from_live_service() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/run"))
            .respond_with(ResponseTemplate::new(200).set_body_json(live_response()))
            .mount(&server)
            .await;

        let enricher = Enricher::new(&server.uri()).unwrap();
        let pos = PosDictionary::from_rows([("run", "noun", "D1")]);
        let info = enricher.enrich("Run", &pos).await;

        assert_eq!(info.word_type, "noun");
        assert_eq!(info.definition, "D1");
        assert_eq!(info.pronunciation, "/rʌn/");
        assert_eq!(info.examples.len(), 2);
    }

    #[tokio::test]
    async fn test_lookup_failure_is_soft() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_json(
                serde_json::json!({"title": "No Definitions Found"}),
            ))
            .mount(&server)
            .await;

        let enricher = Enricher::new(&server.uri()).unwrap();
        let pos = PosDictionary::from_rows([("zyzzyva", "n.", "A weevil")]);
        let info = enricher.enrich("zyzzyva", &pos).await;

        assert_eq!(info.word_type, "noun");
        assert_eq!(info.definition, "A weevil");
        assert!(info.pronunciation.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_payload_is_soft() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let enricher = Enricher::new(&server.uri()).unwrap();
        let info = enricher.enrich("cat", &PosDictionary::empty()).await;
        assert_eq!(info, Enrichment::default());
    }

    #[tokio::test]
    async fn test_transient_lookup_retried_with_policy() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(live_response()))
            .mount(&server)
            .await;

        let enricher = Enricher::new(&server.uri())
            .unwrap()
            .with_retry(RetryPolicy::new(2, Duration::ZERO, Duration::ZERO));
        let info = enricher.enrich("run", &PosDictionary::empty()).await;
        assert_eq!(info.word_type, "verb");
    }
}
