//! Anki flashcard package export.
//!
//! An `.apkg` file is a zip archive holding a SQLite collection
//! (`collection.anki2`, schema version 11) and a `media` manifest. One note
//! with one card is written per translated record.

use crate::dataset::{Dataset, WordRecord};
use crate::error::{Result, VocabError};
use chrono::{DateTime, Local, Utc};
use rusqlite::{params, Connection};
use serde_json::json;
use sha1::{Digest, Sha1};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Model id of the enhanced six-field layout.
pub const ENHANCED_MODEL_ID: i64 = 1607392319;

/// Model id of the two-field layout.
pub const SIMPLE_MODEL_ID: i64 = 1607392320;

pub const DECK_ID: i64 = 2059400110;

pub const DEFAULT_DECK_NAME: &str = "English Vocabulary 10000";

/// Field separator inside `notes.flds`.
const FIELD_SEPARATOR: char = '\u{1f}';

const CARD_CSS: &str = ".card {\n font-family: arial;\n font-size: 20px;\n text-align: center;\n color: black;\n background-color: white;\n}\n";

const SIMPLE_QFMT: &str = "{{English}}";
const SIMPLE_AFMT: &str = "{{FrontSide}}<hr id=\"answer\">{{Translation}}";

const ENHANCED_QFMT: &str =
    "<div style=\"font-size: 32px; text-align: center; margin: 20px;\">{{English}}</div>";
const ENHANCED_AFMT: &str = r#"{{FrontSide}}<hr id="answer">
<div style="padding: 20px;">
    <div style="font-size: 24px; color: #6366f1; margin-bottom: 10px;"><b>{{Translation}}</b></div>
    <div style="color: #64748b; margin-bottom: 10px;"><i>{{Type}}</i></div>
    <div style="margin-bottom: 10px;">{{Pronunciation}}</div>
    <div style="margin-bottom: 15px;">{{Definition}}</div>
    <div style="color: #10b981;">{{Examples}}</div>
</div>"#;

const SCHEMA: &str = "
CREATE TABLE col (
    id integer primary key,
    crt integer not null,
    mod integer not null,
    scm integer not null,
    ver integer not null,
    dty integer not null,
    usn integer not null,
    ls integer not null,
    conf text not null,
    models text not null,
    decks text not null,
    dconf text not null,
    tags text not null
);
CREATE TABLE notes (
    id integer primary key,
    guid text not null,
    mid integer not null,
    mod integer not null,
    usn integer not null,
    tags text not null,
    flds text not null,
    sfld integer not null,
    csum integer not null,
    flags integer not null,
    data text not null
);
CREATE TABLE cards (
    id integer primary key,
    nid integer not null,
    did integer not null,
    ord integer not null,
    mod integer not null,
    usn integer not null,
    type integer not null,
    queue integer not null,
    due integer not null,
    ivl integer not null,
    factor integer not null,
    reps integer not null,
    lapses integer not null,
    left integer not null,
    odue integer not null,
    odid integer not null,
    flags integer not null,
    data text not null
);
CREATE TABLE revlog (
    id integer primary key,
    cid integer not null,
    usn integer not null,
    ease integer not null,
    ivl integer not null,
    lastIvl integer not null,
    factor integer not null,
    time integer not null,
    type integer not null
);
CREATE TABLE graves (
    usn integer not null,
    oid integer not null,
    type integer not null
);
CREATE INDEX ix_notes_usn ON notes (usn);
CREATE INDEX ix_cards_usn ON cards (usn);
CREATE INDEX ix_revlog_usn ON revlog (usn);
CREATE INDEX ix_cards_nid ON cards (nid);
CREATE INDEX ix_cards_sched ON cards (did, queue, due);
CREATE INDEX ix_revlog_cid ON revlog (cid);
CREATE INDEX ix_notes_csum ON notes (csum);
";

/// Card layout, chosen by whether the dataset carries enrichment details.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardLayout {
    /// English on the front, translation on the back.
    Simple,
    /// Adds definition, type, examples and pronunciation to the back.
    Enhanced,
}

impl CardLayout {
    pub fn for_dataset(dataset: &Dataset) -> Self {
        if dataset.has_details {
            CardLayout::Enhanced
        } else {
            CardLayout::Simple
        }
    }

    pub fn model_id(self) -> i64 {
        match self {
            CardLayout::Simple => SIMPLE_MODEL_ID,
            CardLayout::Enhanced => ENHANCED_MODEL_ID,
        }
    }

    pub fn model_name(self) -> &'static str {
        match self {
            CardLayout::Simple => "Simple Vocabulary Model",
            CardLayout::Enhanced => "Enhanced Vocabulary Model",
        }
    }

    pub fn field_names(self) -> &'static [&'static str] {
        match self {
            CardLayout::Simple => &["English", "Translation"],
            CardLayout::Enhanced => &[
                "English",
                "Translation",
                "Definition",
                "Type",
                "Examples",
                "Pronunciation",
            ],
        }
    }

    fn templates(self) -> (&'static str, &'static str) {
        match self {
            CardLayout::Simple => (SIMPLE_QFMT, SIMPLE_AFMT),
            CardLayout::Enhanced => (ENHANCED_QFMT, ENHANCED_AFMT),
        }
    }

    /// Note fields for `record`, HTML-escaped, in `field_names` order.
    fn fields(self, record: &WordRecord) -> Vec<String> {
        let mut fields = vec![
            escape_html(record.word.trim()),
            escape_html(record.translation.trim()),
        ];
        if self == CardLayout::Enhanced {
            let examples: Vec<String> = record
                .examples
                .iter()
                .map(|e| escape_html(e.trim()))
                .collect();
            fields.push(escape_html(record.definition.trim()));
            fields.push(escape_html(record.word_type.trim()));
            fields.push(examples.join("<br>"));
            fields.push(escape_html(record.pronunciation.trim()));
        }
        fields
    }
}

/// One flashcard note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    /// Plain word used for sorting and duplicate checks.
    pub word: String,
    pub fields: Vec<String>,
}

impl Note {
    fn guid(&self) -> String {
        let digest = Sha1::digest(self.fields.join("\u{1f}").as_bytes());
        hex::encode(&digest[..8])
    }

    /// First 8 hex digits of the SHA-1 of the sort field, as Anki stores it.
    fn checksum(&self) -> i64 {
        let digest = Sha1::digest(self.word.as_bytes());
        i64::from(u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]))
    }
}

/// Notes for every record with a non-blank word and translation.
pub fn build_notes(dataset: &Dataset, layout: CardLayout) -> Vec<Note> {
    dataset
        .records
        .iter()
        .filter(|r| !r.word.trim().is_empty() && !r.translation.trim().is_empty())
        .map(|r| Note {
            word: r.word.trim().to_string(),
            fields: layout.fields(r),
        })
        .collect()
}

/// A named deck ready to be packaged.
#[derive(Debug, Clone)]
pub struct Deck {
    pub name: String,
    pub layout: CardLayout,
    pub notes: Vec<Note>,
}

impl Deck {
    /// Builds the deck for `dataset`.
    ///
    /// # Errors
    ///
    /// `TranslationRequired` when no record carries a translation.
    pub fn from_dataset(dataset: &Dataset, name: &str) -> Result<Self> {
        if !dataset.has_translations() {
            return Err(VocabError::TranslationRequired);
        }
        let layout = CardLayout::for_dataset(dataset);
        let notes = build_notes(dataset, layout);
        let name = match name.trim() {
            "" => DEFAULT_DECK_NAME.to_string(),
            trimmed => trimmed.to_string(),
        };
        Ok(Self {
            name,
            layout,
            notes,
        })
    }

    pub fn card_count(&self) -> usize {
        self.notes.len()
    }

    /// Writes the `.apkg` archive to `output`, replacing any existing file.
    pub fn write_package(&self, output: &Path) -> Result<()> {
        let workdir = tempfile::tempdir()?;
        let collection_path = workdir.path().join("collection.anki2");
        self.write_collection(&collection_path)?;

        let dir = match output.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let tmp = NamedTempFile::new_in(&dir)?;
        let mut zip = ZipWriter::new(tmp);
        let options = FileOptions::<()>::default().compression_method(CompressionMethod::Deflated);

        zip.start_file("collection.anki2", options)?;
        let mut collection = std::fs::File::open(&collection_path)?;
        std::io::copy(&mut collection, &mut zip)?;

        zip.start_file("media", options)?;
        zip.write_all(b"{}")?;

        let tmp = zip.finish()?;
        tmp.persist(output).map_err(|e| VocabError::Io(e.error))?;

        info!(
            "Anki deck created: {:?} ({} cards)",
            output,
            self.card_count()
        );
        Ok(())
    }

    fn write_collection(&self, path: &Path) -> Result<()> {
        let now = Utc::now();
        let now_ms = now.timestamp_millis();
        let now_s = now.timestamp();

        let mut conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;

        conn.execute(
            "INSERT INTO col (id, crt, mod, scm, ver, dty, usn, ls, conf, models, decks, dconf, tags)
             VALUES (1, ?1, ?2, ?2, 11, 0, 0, 0, ?3, ?4, ?5, ?6, '{}')",
            params![
                now_s,
                now_ms,
                collection_conf().to_string(),
                self.models_json(now_s).to_string(),
                self.decks_json(now_s).to_string(),
                deck_conf_json().to_string(),
            ],
        )?;

        let tx = conn.transaction()?;
        {
            let mut insert_note = tx.prepare(
                "INSERT INTO notes (id, guid, mid, mod, usn, tags, flds, sfld, csum, flags, data)
                 VALUES (?1, ?2, ?3, ?4, -1, '', ?5, ?6, ?7, 0, '')",
            )?;
            let mut insert_card = tx.prepare(
                "INSERT INTO cards (id, nid, did, ord, mod, usn, type, queue, due, ivl, factor,
                                    reps, lapses, left, odue, odid, flags, data)
                 VALUES (?1, ?2, ?3, 0, ?4, -1, 0, 0, ?5, 0, 0, 0, 0, 0, 0, 0, 0, '')",
            )?;

            let model_id = self.layout.model_id();
            for (position, note) in self.notes.iter().enumerate() {
                let id = now_ms + position as i64;
                let flds = note.fields.join(&FIELD_SEPARATOR.to_string());
                insert_note.execute(params![
                    id,
                    note.guid(),
                    model_id,
                    now_s,
                    flds,
                    note.word,
                    note.checksum(),
                ])?;
                insert_card.execute(params![id, id, DECK_ID, now_s, position as i64 + 1])?;
            }
        }
        tx.commit()?;

        conn.close().map_err(|(_, e)| e)?;
        debug!("Wrote {} notes to {:?}", self.notes.len(), path);
        Ok(())
    }

    fn models_json(&self, now_s: i64) -> serde_json::Value {
        let layout = self.layout;
        let (qfmt, afmt) = layout.templates();
        let fields: Vec<serde_json::Value> = layout
            .field_names()
            .iter()
            .enumerate()
            .map(|(ord, name)| {
                json!({
                    "name": name,
                    "ord": ord,
                    "sticky": false,
                    "rtl": false,
                    "font": "Arial",
                    "size": 20,
                    "media": [],
                })
            })
            .collect();

        let model_id = layout.model_id();
        json!({
            model_id.to_string(): {
                "id": model_id,
                "name": layout.model_name(),
                "type": 0,
                "mod": now_s,
                "usn": -1,
                "sortf": 0,
                "did": DECK_ID,
                "tmpls": [{
                    "name": "Card 1",
                    "ord": 0,
                    "qfmt": qfmt,
                    "afmt": afmt,
                    "bqfmt": "",
                    "bafmt": "",
                    "did": null,
                    "bfont": "",
                    "bsize": 0,
                }],
                "flds": fields,
                "css": CARD_CSS,
                "latexPre": "\\documentclass[12pt]{article}\n\\special{papersize=3in,5in}\n\\usepackage[utf8]{inputenc}\n\\usepackage{amssymb,amsmath}\n\\pagestyle{empty}\n\\setlength{\\parindent}{0in}\n\\begin{document}\n",
                "latexPost": "\\end{document}",
                "latexsvg": false,
                "req": [[0, "any", [0]]],
                "tags": [],
                "vers": [],
            }
        })
    }

    fn decks_json(&self, now_s: i64) -> serde_json::Value {
        let deck = |id: i64, name: &str| {
            json!({
                "id": id,
                "name": name,
                "mod": now_s,
                "usn": -1,
                "lrnToday": [0, 0],
                "revToday": [0, 0],
                "newToday": [0, 0],
                "timeToday": [0, 0],
                "collapsed": false,
                "browserCollapsed": false,
                "desc": "",
                "dyn": 0,
                "conf": 1,
                "extendNew": 0,
                "extendRev": 0,
            })
        };
        json!({
            "1": deck(1, "Default"),
            DECK_ID.to_string(): deck(DECK_ID, &self.name),
        })
    }
}

fn collection_conf() -> serde_json::Value {
    json!({
        "activeDecks": [1],
        "curDeck": 1,
        "newSpread": 0,
        "collapseTime": 1200,
        "timeLim": 0,
        "estTimes": true,
        "dueCounts": true,
        "curModel": null,
        "nextPos": 1,
        "sortType": "noteFld",
        "sortBackwards": false,
        "addToCur": true,
    })
}

fn deck_conf_json() -> serde_json::Value {
    json!({
        "1": {
            "id": 1,
            "name": "Default",
            "mod": 0,
            "usn": 0,
            "maxTaken": 60,
            "autoplay": true,
            "timer": 0,
            "replayq": true,
            "dyn": false,
            "new": {
                "delays": [1, 10],
                "ints": [1, 4, 7],
                "initialFactor": 2500,
                "order": 1,
                "perDay": 20,
                "bury": true,
                "separate": true,
            },
            "rev": {
                "perDay": 200,
                "ease4": 1.3,
                "fuzz": 0.05,
                "maxIvl": 36500,
                "ivlFct": 1,
                "minSpace": 1,
                "bury": true,
            },
            "lapse": {
                "delays": [10],
                "mult": 0,
                "minInt": 1,
                "leechFails": 8,
                "leechAction": 0,
            },
        }
    })
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// Exports the dataset as a deck named `deck_name` to `output`.
///
/// Returns the number of cards written.
pub fn export_deck(dataset: &Dataset, deck_name: &str, output: &Path) -> Result<usize> {
    let deck = Deck::from_dataset(dataset, deck_name)?;
    deck.write_package(output)?;
    Ok(deck.card_count())
}

/// Timestamped package name, e.g. `vocab_deck_20240131_154500.apkg`.
pub fn deck_file_name(at: DateTime<Local>) -> String {
    format!("vocab_deck_{}.apkg", at.format("%Y%m%d_%H%M%S"))
}

/// Resolves a requested package name inside `export_dir`.
///
/// Only bare `.apkg` file names are accepted; anything with a path component
/// is reported as not found.
pub fn resolve_package(export_dir: &Path, file_name: &str) -> Result<PathBuf> {
    let is_bare = !file_name.is_empty()
        && !file_name.contains(['/', '\\'])
        && file_name != "."
        && file_name != ".."
        && Path::new(file_name).extension().is_some_and(|e| e == "apkg");

    if !is_bare {
        return Err(VocabError::NotFound(file_name.to_string()));
    }

    let path = export_dir.join(file_name);
    if path.is_file() {
        Ok(path)
    } else {
        Err(VocabError::NotFound(file_name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Read;

    fn dataset(records: Vec<WordRecord>, has_details: bool) -> Dataset {
        Dataset::new(records, has_details)
    }

    fn open_collection(package: &Path, dir: &Path) -> Connection {
        let file = std::fs::File::open(package).unwrap();
        let mut archive = zip::ZipArchive::new(file).unwrap();

        let mut media = String::new();
        archive
            .by_name("media")
            .unwrap()
            .read_to_string(&mut media)
            .unwrap();
        assert_eq!(media, "{}");

        let mut bytes = Vec::new();
        archive
            .by_name("collection.anki2")
            .unwrap()
            .read_to_end(&mut bytes)
            .unwrap();
        let path = dir.join("extracted.anki2");
        std::fs::write(&path, bytes).unwrap();
        Connection::open(path).unwrap()
    }

    #[test]
    fn test_untranslated_record_yields_no_card() {
        let data = dataset(vec![WordRecord::new("cat")], false);
        assert!(build_notes(&data, CardLayout::Simple).is_empty());
        assert!(matches!(
            Deck::from_dataset(&data, "Deck"),
            Err(VocabError::TranslationRequired)
        ));
    }

    #[test]
    fn test_translated_record_yields_one_card() {
        let data = dataset(
            vec![
                WordRecord::new("cat").with_translation("gato"),
                WordRecord::new("dog").with_translation("   "),
            ],
            false,
        );
        let deck = Deck::from_dataset(&data, "Deck").unwrap();
        assert_eq!(deck.card_count(), 1);
        assert_eq!(deck.layout, CardLayout::Simple);
        assert_eq!(deck.notes[0].fields, vec!["cat", "gato"]);
    }

    #[test]
    fn test_note_guid_and_checksum() {
        let note = Note {
            word: "cat".into(),
            fields: vec!["cat".into(), "gato".into()],
        };
        assert_eq!(note.guid(), "acd2e3829cd31bdc");
        assert_eq!(note.checksum(), 0x9d98_9e8d);
    }

    #[test]
    fn test_enhanced_layout_fields() {
        let record = WordRecord {
            word: "run".into(),
            translation: "correr".into(),
            definition: "Move <fast>".into(),
            word_type: "verb".into(),
            examples: vec!["I run.".into(), "We run & jump.".into()],
            pronunciation: "/rʌn/".into(),
        };
        let deck = Deck::from_dataset(&dataset(vec![record], true), "  ").unwrap();

        assert_eq!(deck.name, DEFAULT_DECK_NAME);
        assert_eq!(deck.layout, CardLayout::Enhanced);
        assert_eq!(
            deck.notes[0].fields,
            vec![
                "run",
                "correr",
                "Move &lt;fast&gt;",
                "verb",
                "I run.<br>We run &amp; jump.",
                "/rʌn/"
            ]
        );
    }

    #[test]
    fn test_package_contains_collection() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out/vocab_deck.apkg");
        let data = dataset(
            vec![
                WordRecord::new("cat").with_translation("gato"),
                WordRecord::new("dog"),
            ],
            false,
        );

        assert_eq!(export_deck(&data, "Spanish", &output).unwrap(), 1);

        let conn = open_collection(&output, dir.path());
        let notes: i64 = conn
            .query_row("SELECT COUNT(*) FROM notes", [], |row| row.get(0))
            .unwrap();
        let cards: i64 = conn
            .query_row("SELECT COUNT(*) FROM cards", [], |row| row.get(0))
            .unwrap();
        assert_eq!((notes, cards), (1, 1));

        let (flds, mid, csum): (String, i64, i64) = conn
            .query_row("SELECT flds, mid, csum FROM notes", [], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })
            .unwrap();
        assert_eq!(flds, "cat\u{1f}gato");
        assert_eq!(mid, SIMPLE_MODEL_ID);
        // sha1("cat") = 9d989e8d...
        assert_eq!(csum, 0x9d989e8d);

        let decks: String = conn
            .query_row("SELECT decks FROM col", [], |row| row.get(0))
            .unwrap();
        let decks: serde_json::Value = serde_json::from_str(&decks).unwrap();
        assert_eq!(decks[DECK_ID.to_string()]["name"], "Spanish");
    }

    #[test]
    fn test_enhanced_package_model() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("deck.apkg");
        let record = WordRecord::new("sun").with_translation("sol");

        export_deck(&dataset(vec![record], true), "Deck", &output).unwrap();

        let conn = open_collection(&output, dir.path());
        let models: String = conn
            .query_row("SELECT models FROM col", [], |row| row.get(0))
            .unwrap();
        let models: serde_json::Value = serde_json::from_str(&models).unwrap();
        let model = &models[ENHANCED_MODEL_ID.to_string()];
        assert_eq!(model["name"], "Enhanced Vocabulary Model");
        assert_eq!(model["flds"].as_array().unwrap().len(), 6);
    }

    #[test]
    fn test_deck_file_name() {
        let at = Local.with_ymd_and_hms(2024, 1, 31, 15, 45, 0).unwrap();
        assert_eq!(deck_file_name(at), "vocab_deck_20240131_154500.apkg");
    }

    #[test]
    fn test_resolve_package_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("deck.apkg"), b"x").unwrap();

        assert!(resolve_package(dir.path(), "deck.apkg").is_ok());
        for name in ["../deck.apkg", "sub/deck.apkg", "..", "deck.csv", "", "missing.apkg"] {
            assert!(
                matches!(resolve_package(dir.path(), name), Err(VocabError::NotFound(_))),
                "{} should be rejected",
                name
            );
        }
    }
}
