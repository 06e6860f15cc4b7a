//! Vocabulary records and their on-disk table.
//!
//! The whole dataset is the unit of storage: it is written once per pipeline
//! run and read back in full by queries and exports.

use crate::dictionary::{Enrichment, MAX_EXAMPLES};
use crate::error::{Result, VocabError};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// UTF-8 byte order mark written at the start of the table.
const BOM: &[u8] = b"\xEF\xBB\xBF";

const BASIC_COLUMNS: [&str; 2] = ["word", "translation"];
const DETAIL_COLUMNS: [&str; 4] = ["definition", "word_type", "examples", "pronunciation"];

/// One enriched vocabulary entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordRecord {
    pub word: String,
    #[serde(default)]
    pub translation: String,
    #[serde(default)]
    pub definition: String,
    #[serde(default)]
    pub word_type: String,
    #[serde(default)]
    pub examples: Vec<String>,
    #[serde(default)]
    pub pronunciation: String,
}

impl WordRecord {
    pub fn new(word: impl Into<String>) -> Self {
        Self {
            word: word.into(),
            ..Default::default()
        }
    }

    pub fn with_translation(mut self, translation: impl Into<String>) -> Self {
        self.translation = translation.into();
        self
    }

    /// Copies enrichment fields onto the record, keeping at most two examples.
    pub fn with_enrichment(mut self, info: Enrichment) -> Self {
        self.definition = info.definition;
        self.word_type = info.word_type;
        self.examples = info.examples;
        self.examples.truncate(MAX_EXAMPLES);
        self.pronunciation = info.pronunciation;
        self
    }

    pub fn is_translated(&self) -> bool {
        !self.translation.trim().is_empty()
    }

    /// Lowercased word, the record identity.
    pub fn key(&self) -> String {
        self.word.to_lowercase()
    }
}

/// Ordered records of one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dataset {
    pub records: Vec<WordRecord>,
    /// Whether enrichment fields were requested for this run.
    pub has_details: bool,
}

/// JSON document form: `{"words": [...]}`.
#[derive(Serialize, Deserialize)]
struct WordsDocument {
    words: Vec<WordRecord>,
}

impl Dataset {
    pub fn new(records: Vec<WordRecord>, has_details: bool) -> Self {
        Self {
            records,
            has_details,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Number of records with a non-empty translation.
    pub fn translated_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_translated()).count()
    }

    /// Whether any record has been translated.
    pub fn has_translations(&self) -> bool {
        self.records.iter().any(WordRecord::is_translated)
    }

    /// Writes the table as CSV with a BOM. Detail columns are present only when
    /// the dataset carries details; `examples` is a JSON array in a text cell.
    pub fn write_csv<W: Write>(&self, mut out: W) -> Result<()> {
        out.write_all(BOM)?;
        let mut writer = csv::Writer::from_writer(out);

        let mut header: Vec<&str> = BASIC_COLUMNS.to_vec();
        if self.has_details {
            header.extend(DETAIL_COLUMNS);
        }
        writer.write_record(&header)?;

        for record in &self.records {
            let mut row = vec![record.word.clone(), record.translation.clone()];
            if self.has_details {
                row.push(record.definition.clone());
                row.push(record.word_type.clone());
                row.push(serde_json::to_string(&record.examples)?);
                row.push(record.pronunciation.clone());
            }
            writer.write_record(&row)?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Reads a table written by [`Dataset::write_csv`], tolerating a BOM,
    /// missing columns and malformed `examples` cells.
    pub fn read_csv(text: &str) -> Result<Self> {
        let text = text.trim_start_matches('\u{feff}');
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(text.as_bytes());

        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_lowercase())
            .collect();
        let column = |name: &str| headers.iter().position(|h| h == name);

        let word_col = column("word").ok_or_else(|| {
            VocabError::Csv(csv::Error::from(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "vocabulary table has no 'word' column",
            )))
        })?;
        let translation_col = column("translation");
        let definition_col = column("definition");
        let type_col = column("word_type");
        let examples_col = column("examples");
        let pronunciation_col = column("pronunciation");
        let has_details = definition_col.is_some();

        let mut records = Vec::new();
        for row in reader.records() {
            let row = row?;
            let cell = |col: Option<usize>| {
                col.and_then(|i| row.get(i))
                    .unwrap_or_default()
                    .trim()
                    .to_string()
            };

            let word = cell(Some(word_col));
            if word.is_empty() {
                continue;
            }

            records.push(WordRecord {
                word,
                translation: cell(translation_col),
                definition: cell(definition_col),
                word_type: cell(type_col),
                examples: parse_examples(&cell(examples_col)),
                pronunciation: cell(pronunciation_col),
            });
        }

        Ok(Self::new(records, has_details))
    }

    /// Writes the `{"words": [...]}` document used by static front ends.
    pub fn write_json<W: Write>(&self, out: W) -> Result<()> {
        let doc = WordsDocument {
            words: self.records.clone(),
        };
        serde_json::to_writer_pretty(out, &doc)?;
        Ok(())
    }
}

fn parse_examples(cell: &str) -> Vec<String> {
    if cell.is_empty() {
        return Vec::new();
    }
    let mut examples: Vec<String> = serde_json::from_str(cell).unwrap_or_default();
    examples.truncate(MAX_EXAMPLES);
    examples
}

/// The persisted vocabulary table.
#[derive(Debug, Clone)]
pub struct DatasetStore {
    path: PathBuf,
}

impl DatasetStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Loads the full dataset.
    ///
    /// # Errors
    ///
    /// `StoreMissing` when the table has not been written yet.
    pub fn load(&self) -> Result<Dataset> {
        if !self.exists() {
            return Err(VocabError::StoreMissing(self.path.clone()));
        }
        let bytes = std::fs::read(&self.path)?;
        let dataset = Dataset::read_csv(&String::from_utf8_lossy(&bytes))?;
        debug!("Loaded {} records from {:?}", dataset.len(), self.path);
        Ok(dataset)
    }

    /// Replaces the stored table with `dataset`.
    ///
    /// The table is written to a temporary file in the same directory and
    /// renamed over the old one.
    pub fn save(&self, dataset: &Dataset) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        dataset.write_csv(&mut tmp)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| VocabError::Io(e.error))?;

        info!("CSV file saved: {:?} ({} words)", self.path, dataset.len());
        Ok(())
    }

    /// Writes the dataset as a JSON document to `path`.
    pub fn export_json(&self, path: &Path) -> Result<usize> {
        let dataset = self.load()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::File::create(path)?;
        dataset.write_json(std::io::BufWriter::new(file))?;
        info!("Wrote {} words to {:?}", dataset.len(), path);
        Ok(dataset.len())
    }
}
