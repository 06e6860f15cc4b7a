//! Part-of-speech reference dictionary.
//!
//! Built once per pipeline run from a bulk English dictionary CSV and handed
//! to the enricher as a read-only lookup table.

use crate::error::Result;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Part-of-speech tags that win over any other tag for the same word.
pub const PREFERRED_POS: [&str; 5] = ["noun", "verb", "adjective", "adverb", "pronoun"];

/// Preferred part of speech and definition for one word.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PosEntry {
    pub pos: String,
    pub definition: String,
}

/// Immutable word → [`PosEntry`] map keyed by lowercased word.
#[derive(Debug, Clone, Default)]
pub struct PosDictionary {
    entries: HashMap<String, PosEntry>,
}

impl PosDictionary {
    /// A dictionary with no entries; enrichment then relies on the live service.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds the dictionary from `(word, pos, definition)` rows in order.
    ///
    /// The first row for a word is kept unless a later row carries a preferred
    /// tag while the kept one does not.
    pub fn from_rows<I, W, P, D>(rows: I) -> Self
    where
        I: IntoIterator<Item = (W, P, D)>,
        W: AsRef<str>,
        P: AsRef<str>,
        D: AsRef<str>,
    {
        let mut entries: HashMap<String, PosEntry> = HashMap::new();

        for (word, pos, definition) in rows {
            let word = word.as_ref().trim().to_lowercase();
            if word.is_empty() {
                continue;
            }
            let entry = PosEntry {
                pos: normalize_pos(pos.as_ref()),
                definition: definition.as_ref().trim().to_string(),
            };

            match entries.get(&word) {
                None => {
                    entries.insert(word, entry);
                }
                Some(current) if is_preferred(&entry.pos) && !is_preferred(&current.pos) => {
                    entries.insert(word, entry);
                }
                Some(_) => {}
            }
        }

        Self { entries }
    }

    /// Parses the reference CSV.
    ///
    /// Columns are matched loosely: the first header containing "word", a
    /// header containing "pos"/"part"/"speech", and optionally one containing
    /// "def"/"meaning". Malformed rows are skipped. Returns an empty dictionary
    /// if the word or POS column cannot be identified.
    pub fn from_csv(text: &str) -> Result<Self> {
        let text = text.trim_start_matches('\u{feff}');
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(text.as_bytes());

        let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_lowercase()).collect();

        let mut word_col = None;
        let mut pos_col = None;
        let mut def_col = None;
        for (i, header) in headers.iter().enumerate() {
            if header.contains("word") && word_col.is_none() {
                word_col = Some(i);
            } else if header.contains("pos") || header.contains("part") || header.contains("speech") {
                pos_col = Some(i);
            } else if header.contains("def") || header.contains("meaning") {
                def_col = Some(i);
            }
        }

        let (Some(word_col), Some(pos_col)) = (word_col, pos_col) else {
            warn!("Could not find word/POS columns. Available: {:?}", headers);
            return Ok(Self::empty());
        };

        let rows = reader.records().filter_map(|r| r.ok()).map(|record| {
            let field = |i: Option<usize>| {
                i.and_then(|i| record.get(i))
                    .unwrap_or_default()
                    .to_string()
            };
            (field(Some(word_col)), field(Some(pos_col)), field(def_col))
        });

        Ok(Self::from_rows(rows))
    }

    /// Loads the dictionary from `cache_path`, downloading it from `url` first
    /// when no cached copy exists.
    ///
    /// Failures are soft: a missing or unreadable table yields an empty
    /// dictionary and the run continues with live lookups only.
    pub async fn load(url: &str, cache_path: &Path) -> Self {
        if !cache_path.is_file() {
            info!("Downloading English dictionary with POS tags from {}", url);
            match download(url).await {
                Ok(bytes) => {
                    let written = cache_path
                        .parent()
                        .map_or(Ok(()), std::fs::create_dir_all)
                        .and_then(|_| std::fs::write(cache_path, &bytes));
                    match written {
                        Ok(()) => info!("Dictionary downloaded: {} bytes", bytes.len()),
                        Err(e) => {
                            warn!("Could not cache POS dictionary: {}", e);
                            return Self::parse_or_empty(&String::from_utf8_lossy(&bytes));
                        }
                    }
                }
                Err(e) => {
                    warn!("Could not download POS dictionary: {}", e);
                    return Self::empty();
                }
            }
        }

        match std::fs::read(cache_path) {
            Ok(bytes) => Self::parse_or_empty(&String::from_utf8_lossy(&bytes)),
            Err(e) => {
                warn!("Error reading POS dictionary {:?}: {}", cache_path, e);
                Self::empty()
            }
        }
    }

    fn parse_or_empty(text: &str) -> Self {
        match Self::from_csv(text) {
            Ok(dict) if dict.is_empty() => {
                warn!("POS dictionary has no usable rows");
                dict
            }
            Ok(dict) => {
                info!("Loaded {} words with POS tags", dict.len());
                dict
            }
            Err(e) => {
                warn!("Error loading POS dictionary: {}", e);
                Self::empty()
            }
        }
    }

    /// Looks up a word case-insensitively.
    pub fn get(&self, word: &str) -> Option<&PosEntry> {
        let key = word.trim().to_lowercase();
        let entry = self.entries.get(&key);
        if entry.is_some() {
            debug!("POS dictionary hit for '{}'", key);
        }
        entry
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

async fn download(url: &str) -> std::result::Result<Vec<u8>, reqwest::Error> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(60))
        .build()?;
    let response = client.get(url).send().await?.error_for_status()?;
    Ok(response.bytes().await?.to_vec())
}

fn is_preferred(pos: &str) -> bool {
    PREFERRED_POS.contains(&pos.to_lowercase().as_str())
}

/// Maps the reference table's abbreviated tags ("n.", "v.", "adv.") to full
/// names. Unknown tags are lowercased and passed through.
pub fn normalize_pos(raw: &str) -> String {
    let tag = raw.trim().to_lowercase();
    let full = match tag.as_str() {
        "n." | "n" => "noun",
        "v." | "v" | "v. t." | "v. i." | "v.t." | "v.i." => "verb",
        "a." | "a" | "adj." => "adjective",
        "adv." => "adverb",
        "pron." | "dat." | "obj." | "dat. & obj." => "pronoun",
        "prep." => "preposition",
        "conj." => "conjunction",
        "interj." => "interjection",
        _ => return tag,
    };
    full.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_normalize_pos() {
        assert_eq!(normalize_pos("n."), "noun");
        assert_eq!(normalize_pos(" V. "), "verb");
        assert_eq!(normalize_pos("adv."), "adverb");
        assert_eq!(normalize_pos("dat. & obj."), "pronoun");
        assert_eq!(normalize_pos("Noun"), "noun");
        assert_eq!(normalize_pos("p. p."), "p. p.");
    }

    #[test]
    fn test_first_preferred_entry_wins() {
        let dict = PosDictionary::from_rows([
            ("run", "v.", "To move fast"),
            ("run", "n.", "A spell of running"),
        ]);
        assert_eq!(dict.get("run").unwrap().pos, "verb");
        assert_eq!(dict.get("RUN").unwrap().definition, "To move fast");
    }

    #[test]
    fn test_preferred_replaces_non_preferred() {
        let dict = PosDictionary::from_rows([
            ("you", "obj.", "Objective case"),
            ("to", "prep.", "Toward"),
            ("to", "adv.", "Forward"),
            ("to", "conj.", "Later non-preferred"),
        ]);
        // "obj." normalizes to pronoun, which is preferred and stays.
        assert_eq!(dict.get("you").unwrap().pos, "pronoun");
        assert_eq!(dict.get("to").unwrap().pos, "adverb");
        assert_eq!(dict.get("to").unwrap().definition, "Forward");
    }

    #[test]
    fn test_non_preferred_never_replaces() {
        let dict = PosDictionary::from_rows([("of", "prep.", "First"), ("of", "conj.", "Second")]);
        assert_eq!(dict.get("of").unwrap().definition, "First");
    }

    #[test]
    fn test_from_csv_loose_headers() {
        let csv = "Word,POS,Def\n\
                   Apple,n.,\"A fruit, round\"\n\
                   quick,a.,Fast\n";
        let dict = PosDictionary::from_csv(csv).unwrap();
        assert_eq!(dict.len(), 2);
        assert_eq!(
            dict.get("apple"),
            Some(&PosEntry {
                pos: "noun".into(),
                definition: "A fruit, round".into()
            })
        );
    }

    #[test]
    fn test_from_csv_without_pos_column() {
        let dict = PosDictionary::from_csv("word,meaning\ncat,animal\n").unwrap();
        assert!(dict.is_empty());
    }

    #[tokio::test]
    async fn test_load_downloads_and_caches() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("word,pos,def\ncat,n.,Feline\n"))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("dict/english_dictionary.csv");

        let dict = PosDictionary::load(&server.uri(), &cache).await;
        assert_eq!(dict.get("cat").unwrap().pos, "noun");
        assert!(cache.is_file());

        // Second load reads the cache only.
        let again = PosDictionary::load(&server.uri(), &cache).await;
        assert_eq!(again.len(), 1);
    }

    #[tokio::test]
    async fn test_load_failure_is_soft() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dict = PosDictionary::load(&server.uri(), &dir.path().join("d.csv")).await;
        assert!(dict.is_empty());
    }
}
