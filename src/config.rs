//! Configuration module for the vocabulary builder.
//!
//! Handles loading configuration from environment variables and .env files.

use crate::error::{Result, VocabError};
use crate::retry::RetryPolicy;
use crate::source::WordSource;
use crate::translator::TranslationBackend;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Hosted word-frequency list used when `WORD_SOURCE` is not set.
pub const DEFAULT_WORD_SOURCE: &str =
    "https://raw.githubusercontent.com/first20hours/google-10000-english/master/google-10000-english-no-swears.txt";

/// Bulk English dictionary with part-of-speech tags.
pub const DEFAULT_POS_DICTIONARY_URL: &str =
    "https://raw.githubusercontent.com/benjihillard/English-Dictionary-Database/main/english%20Dictionary.csv";

pub const DEFAULT_DICTIONARY_API_URL: &str = "https://api.dictionaryapi.dev/api/v2/entries/en";

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the dataset and downloaded caches.
    pub data_dir: PathBuf,

    /// The persisted vocabulary table.
    pub vocab_file: PathBuf,

    /// Directory where HTTP-created flashcard packages are written.
    pub export_dir: PathBuf,

    /// Where the English word list comes from.
    pub word_source: WordSource,

    /// Maximum number of distinct words to process (0 = unbounded).
    pub max_words: usize,

    /// Default target language code (e.g., "fa", "es").
    pub target_language: String,

    /// Which translation backend to use.
    pub translation_backend: TranslationBackend,

    /// URL of the translation API endpoint.
    pub translation_api_url: String,

    /// Base URL of the dictionary lookup service.
    pub dictionary_api_url: String,

    /// Remote POS reference table and its local cache.
    pub pos_dictionary_url: String,
    pub pos_dictionary_cache: PathBuf,

    /// Delay between consecutive translation requests.
    pub request_delay: Duration,

    /// Number of words between longer pauses.
    pub batch_size: usize,

    /// Length of the pause after each batch.
    pub batch_pause: Duration,

    /// Number of words between progress reports.
    pub progress_interval: usize,

    /// Retry settings for the translation service.
    pub translation_max_attempts: u32,
    pub retry_base_delay: Duration,
    pub retry_fallback_delay: Duration,

    /// HTTP listen address.
    pub host: std::net::Ipv4Addr,
    pub port: u16,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// Every variable is optional:
    /// - `VOCAB_DATA_DIR`: data directory (default: data)
    /// - `VOCAB_FILE`: dataset path (default: <data>/vocab_translated.csv)
    /// - `EXPORT_DIR`: flashcard output directory (default: uploads)
    /// - `WORD_SOURCE`: word list URL or local path
    /// - `WORD_SOURCE_CACHE`: local cache for a remote word list
    /// - `MAX_WORDS`: cap on distinct words (default: 20000, 0 = unbounded)
    /// - `TARGET_LANGUAGE`: default target language (default: fa)
    /// - `TRANSLATION_BACKEND`: "libretranslate" (default) or "google"
    /// - `TRANSLATION_API_URL`: translation endpoint
    /// - `DICTIONARY_API_URL`, `POS_DICTIONARY_URL`, `POS_DICTIONARY_CACHE`
    /// - `REQUEST_DELAY_MS`, `BATCH_SIZE`, `BATCH_PAUSE_MS`, `PROGRESS_INTERVAL`
    /// - `TRANSLATION_MAX_ATTEMPTS`, `RETRY_BASE_DELAY_MS`, `RETRY_FALLBACK_DELAY_MS`
    /// - `HOST`, `PORT`: HTTP listen address (default: 127.0.0.1:5000)
    pub fn load() -> Result<Self> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_dir = PathBuf::from(lookup("VOCAB_DATA_DIR").unwrap_or_else(|| "data".into()));

        let vocab_file = lookup("VOCAB_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("vocab_translated.csv"));

        let export_dir = PathBuf::from(lookup("EXPORT_DIR").unwrap_or_else(|| "uploads".into()));

        let source_cache = lookup("WORD_SOURCE_CACHE")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("word_source.txt"));
        let word_source = WordSource::parse(
            &lookup("WORD_SOURCE").unwrap_or_else(|| DEFAULT_WORD_SOURCE.to_string()),
            source_cache,
        );

        // Parse translation backend (default to LibreTranslate)
        let translation_backend: TranslationBackend = lookup("TRANSLATION_BACKEND")
            .map(|s| s.parse().unwrap_or_default())
            .unwrap_or_default();

        // Set default URL based on backend
        let default_url = match translation_backend {
            TranslationBackend::Google => "http://localhost:4000",
            TranslationBackend::LibreTranslate => "https://libretranslate.de/translate",
        };

        let translation_api_url =
            lookup("TRANSLATION_API_URL").unwrap_or_else(|| default_url.to_string());

        let pos_dictionary_cache = lookup("POS_DICTIONARY_CACHE")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("english_dictionary.csv"));

        let host = parse_var(&lookup, "HOST", "127.0.0.1", "a valid IPv4 address")?;
        let port = parse_var(&lookup, "PORT", "5000", "a valid port number")?;

        Ok(Config {
            vocab_file,
            export_dir,
            word_source,
            max_words: parse_var(&lookup, "MAX_WORDS", "20000", "a non-negative number")?,
            target_language: lookup("TARGET_LANGUAGE")
                .unwrap_or_else(|| "fa".to_string())
                .to_lowercase(),
            translation_backend,
            translation_api_url,
            dictionary_api_url: lookup("DICTIONARY_API_URL")
                .unwrap_or_else(|| DEFAULT_DICTIONARY_API_URL.to_string()),
            pos_dictionary_url: lookup("POS_DICTIONARY_URL")
                .unwrap_or_else(|| DEFAULT_POS_DICTIONARY_URL.to_string()),
            pos_dictionary_cache,
            request_delay: millis(parse_var(&lookup, "REQUEST_DELAY_MS", "200", "milliseconds")?),
            batch_size: parse_var(&lookup, "BATCH_SIZE", "50", "a positive number")?,
            batch_pause: millis(parse_var(&lookup, "BATCH_PAUSE_MS", "500", "milliseconds")?),
            progress_interval: parse_var(&lookup, "PROGRESS_INTERVAL", "10", "a positive number")?,
            translation_max_attempts: parse_var(
                &lookup,
                "TRANSLATION_MAX_ATTEMPTS",
                "3",
                "a positive number",
            )?,
            retry_base_delay: millis(parse_var(
                &lookup,
                "RETRY_BASE_DELAY_MS",
                "2000",
                "milliseconds",
            )?),
            retry_fallback_delay: millis(parse_var(
                &lookup,
                "RETRY_FALLBACK_DELAY_MS",
                "1000",
                "milliseconds",
            )?),
            host,
            port,
            data_dir,
        })
    }

    /// Retry policy for translation requests.
    pub fn translation_retry(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.translation_max_attempts,
            self.retry_base_delay,
            self.retry_fallback_delay,
        )
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: &str, expected: &str) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let raw = lookup(key).unwrap_or_else(|| default.to_string());
    raw.trim()
        .parse()
        .map_err(|_| VocabError::config(format!("{} must be {} (got '{}')", key, expected, raw)))
}

fn millis(ms: u64) -> Duration {
    Duration::from_millis(ms)
}
