//! Word-source loading.
//!
//! Produces the ordered list of distinct English words a pipeline run works
//! through. Sources are either local (a word list file or a dataset directory)
//! or a remote plain-text list that gets cached next to the dataset.

use crate::error::{Result, VocabError};
use crate::retry::ServiceError;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Where the candidate words come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WordSource {
    /// A local `.txt`/`.csv`/`.json` file, or a directory containing one.
    File(PathBuf),
    /// A remote list with one word per line, cached locally after the first fetch.
    Remote { url: String, cache_path: PathBuf },
}

impl WordSource {
    /// Interprets `location` as a URL when it has an HTTP(S) scheme, otherwise as a path.
    pub fn parse(location: &str, cache_path: PathBuf) -> Self {
        let location = location.trim();
        if location.starts_with("http://") || location.starts_with("https://") {
            WordSource::Remote {
                url: location.to_string(),
                cache_path,
            }
        } else {
            WordSource::File(PathBuf::from(location))
        }
    }

    /// Human-readable description for logs and errors.
    pub fn describe(&self) -> String {
        match self {
            WordSource::File(path) => path.display().to_string(),
            WordSource::Remote { url, .. } => url.clone(),
        }
    }
}

/// Layout of a word list file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceFormat {
    Lines,
    Csv,
    Json,
}

impl SourceFormat {
    fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("csv") => SourceFormat::Csv,
            Some("json") => SourceFormat::Json,
            _ => SourceFormat::Lines,
        }
    }
}

/// `{"words": [...]}` as written by the JSON export, or a bare array.
#[derive(Deserialize)]
#[serde(untagged)]
enum WordsDocument {
    Wrapped { words: Vec<serde_json::Value> },
    Bare(Vec<serde_json::Value>),
}

/// Loads, normalizes and caps word lists.
#[derive(Clone)]
pub struct WordLoader {
    client: reqwest::Client,
}

impl WordLoader {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| VocabError::config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Returns the distinct words of `source`, at most `max_words` of them
    /// (0 = unbounded).
    ///
    /// # Errors
    ///
    /// `SourceNotFound` when neither a local copy nor the remote list can be
    /// read, `Service` when the remote list host is rate limiting or
    /// temporarily down, `EmptySource` when nothing survives normalization.
    pub async fn load(&self, source: &WordSource, max_words: usize) -> Result<Vec<String>> {
        info!("Loading words from {}", source.describe());

        let candidates = match source {
            WordSource::File(path) => read_local(path)?,
            WordSource::Remote { url, cache_path } => {
                let text = self.fetch_remote(url, cache_path).await?;
                parse_candidates(&text, SourceFormat::Lines)?
            }
        };

        let words = normalize_words(candidates, max_words);
        if words.is_empty() {
            return Err(VocabError::EmptySource(source.describe()));
        }

        info!("Loaded {} words", words.len());
        Ok(words)
    }

    /// Reads the cached copy if present, otherwise downloads and caches it.
    async fn fetch_remote(&self, url: &str, cache_path: &Path) -> Result<String> {
        if cache_path.is_file() {
            debug!("Using cached word list at {:?}", cache_path);
            return Ok(std::fs::read_to_string(cache_path)?);
        }

        let text = self.download(url).await.map_err(|e| {
            if e.is_transient() {
                VocabError::Service(e)
            } else {
                VocabError::SourceNotFound(format!("{} ({})", url, e))
            }
        })?;

        // Caching is best-effort; the words are already in memory.
        if let Err(e) = write_cache(cache_path, &text) {
            warn!("Failed to cache word list at {:?}: {}", cache_path, e);
        }

        Ok(text)
    }

    async fn download(&self, url: &str) -> std::result::Result<String, ServiceError> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::from_status(status, &body));
        }

        Ok(response.text().await?)
    }
}

fn write_cache(path: &Path, text: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, text)
}

/// Reads candidate words from a local file or dataset directory.
fn read_local(path: &Path) -> Result<Vec<String>> {
    let file = if path.is_dir() {
        find_word_file(path)
            .ok_or_else(|| VocabError::SourceNotFound(format!("no CSV or TXT file in {}", path.display())))?
    } else if path.is_file() {
        path.to_path_buf()
    } else {
        return Err(VocabError::SourceNotFound(path.display().to_string()));
    };

    debug!("Reading words from {:?}", file);
    let bytes = std::fs::read(&file)?;
    let text = String::from_utf8_lossy(&bytes);
    parse_candidates(&text, SourceFormat::from_path(&file))
}

/// First CSV in the directory tree, otherwise the first TXT.
fn find_word_file(dir: &Path) -> Option<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect();
    files.sort();

    let with_ext = |ext: &str| {
        files
            .iter()
            .find(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case(ext))
            })
            .cloned()
    };

    with_ext("csv").or_else(|| with_ext("txt"))
}

/// Splits source text into raw candidate words according to its format.
fn parse_candidates(text: &str, format: SourceFormat) -> Result<Vec<String>> {
    let text = text.trim_start_matches('\u{feff}');

    match format {
        SourceFormat::Lines => Ok(text.lines().map(str::to_string).collect()),
        SourceFormat::Csv => {
            let mut reader = csv::ReaderBuilder::new()
                .flexible(true)
                .from_reader(text.as_bytes());

            let column = reader
                .headers()?
                .iter()
                .position(|h| {
                    let h = h.to_lowercase();
                    h.contains("word") || h.contains("text")
                })
                .unwrap_or(0);

            Ok(reader
                .records()
                .filter_map(|record| record.ok())
                .filter_map(|record| record.get(column).map(str::to_string))
                .collect())
        }
        SourceFormat::Json => {
            let values = match serde_json::from_str::<WordsDocument>(text)? {
                WordsDocument::Wrapped { words } => words,
                WordsDocument::Bare(words) => words,
            };
            // Entries are plain strings or records carrying a "word" field.
            Ok(values
                .into_iter()
                .filter_map(|v| match v {
                    serde_json::Value::String(word) => Some(word),
                    serde_json::Value::Object(map) => {
                        map.get("word").and_then(|w| w.as_str()).map(str::to_string)
                    }
                    _ => None,
                })
                .collect())
        }
    }
}

/// Trims, drops blanks, removes case-insensitive duplicates (first-seen casing
/// wins) and caps the result at `max_words` when it is non-zero.
pub fn normalize_words<I, S>(candidates: I, max_words: usize) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut words = Vec::new();

    for candidate in candidates {
        let word = candidate.as_ref().trim();
        if word.is_empty() || !seen.insert(word.to_lowercase()) {
            continue;
        }
        words.push(word.to_string());
        if max_words > 0 && words.len() >= max_words {
            break;
        }
    }

    words
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::ServiceErrorKind;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_dedup_keeps_first_casing() {
        let words = normalize_words(["Run", "run", "Jump"], 0);
        assert_eq!(words, vec!["Run", "Jump"]);
    }

    #[test]
    fn test_normalize_trims_and_drops_blanks() {
        let words = normalize_words(["  cat ", "", "   ", "CAT", "dog\t"], 0);
        assert_eq!(words, vec!["cat", "dog"]);
    }

    #[test]
    fn test_cap_applies_after_dedup() {
        let input = ["a", "A", "b", "B", "c", "d"];
        assert_eq!(normalize_words(input, 3), vec!["a", "b", "c"]);
        // Cap larger than the distinct count returns every distinct word.
        assert_eq!(normalize_words(input, 10).len(), 4);
        assert_eq!(normalize_words(input, 0).len(), 4);
    }

    #[test]
    fn test_no_case_insensitive_duplicates() {
        let input = ["The", "the", "THE", "of", "Of", "and"];
        let words = normalize_words(input, 0);
        let lowered: HashSet<String> = words.iter().map(|w| w.to_lowercase()).collect();
        assert_eq!(lowered.len(), words.len());
    }

    #[test]
    fn test_parse_csv_picks_word_column() {
        let text = "\u{feff}level,Word,count\nA1,apple,3\nA2,Banana,1\n";
        let words = parse_candidates(text, SourceFormat::Csv).unwrap();
        assert_eq!(words, vec!["apple", "Banana"]);
    }

    #[test]
    fn test_parse_csv_falls_back_to_first_column() {
        let text = "headword,cefr\nzebra,B1\n";
        // "headword" contains "word", so it is still chosen
        assert_eq!(parse_candidates(text, SourceFormat::Csv).unwrap(), vec!["zebra"]);

        let text = "term,cefr\nyak,B1\n";
        assert_eq!(parse_candidates(text, SourceFormat::Csv).unwrap(), vec!["yak"]);
    }

    #[test]
    fn test_parse_json_documents() {
        let wrapped = r#"{"words": ["the", 3, "of"]}"#;
        assert_eq!(
            parse_candidates(wrapped, SourceFormat::Json).unwrap(),
            vec!["the", "of"]
        );

        let bare = r#"["and", "to"]"#;
        assert_eq!(
            parse_candidates(bare, SourceFormat::Json).unwrap(),
            vec!["and", "to"]
        );
    }

    #[tokio::test]
    async fn test_load_local_directory_prefers_csv() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("list.txt"), "from_txt\n").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested/words.csv"), "word\nfrom_csv\n").unwrap();

        let loader = WordLoader::new().unwrap();
        let words = loader
            .load(&WordSource::File(dir.path().to_path_buf()), 0)
            .await
            .unwrap();
        assert_eq!(words, vec!["from_csv"]);
    }

    #[tokio::test]
    async fn test_missing_local_source() {
        let dir = tempfile::tempdir().unwrap();
        let loader = WordLoader::new().unwrap();
        let err = loader
            .load(&WordSource::File(dir.path().join("nope.txt")), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, VocabError::SourceNotFound(_)));
    }

    #[tokio::test]
    async fn test_empty_source() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("blank.txt");
        std::fs::write(&file, "\n   \n\t\n").unwrap();

        let loader = WordLoader::new().unwrap();
        let err = loader.load(&WordSource::File(file), 0).await.unwrap_err();
        assert!(matches!(err, VocabError::EmptySource(_)));
    }

    #[tokio::test]
    async fn test_remote_source_is_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/words.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("Run\nrun\nJump\n"))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let source = WordSource::Remote {
            url: format!("{}/words.txt", server.uri()),
            cache_path: dir.path().join("cache/words.txt"),
        };

        let loader = WordLoader::new().unwrap();
        let first = loader.load(&source, 0).await.unwrap();
        assert_eq!(first, vec!["Run", "Jump"]);

        // Second load is served from the cache; the mock expects a single hit.
        let second = loader.load(&source, 1).await.unwrap();
        assert_eq!(second, vec!["Run"]);
    }

    #[tokio::test]
    async fn test_unreachable_remote_without_cache() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let source = WordSource::Remote {
            url: format!("{}/missing.txt", server.uri()),
            cache_path: dir.path().join("words.txt"),
        };

        let err = WordLoader::new().unwrap().load(&source, 0).await.unwrap_err();
        assert!(matches!(err, VocabError::SourceNotFound(_)));
        assert!(!dir.path().join("words.txt").exists());
    }

    #[tokio::test]
    async fn test_rate_limited_remote_is_retry_later() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).set_body_string("Too Many Requests"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let source = WordSource::Remote {
            url: format!("{}/words.txt", server.uri()),
            cache_path: dir.path().join("words.txt"),
        };

        let err = WordLoader::new().unwrap().load(&source, 0).await.unwrap_err();
        assert!(err.is_retry_later());
        assert!(matches!(
            err,
            VocabError::Service(ServiceError {
                kind: ServiceErrorKind::RateLimited,
                ..
            })
        ));
    }
}
