//! Read-only queries over the stored vocabulary.
//!
//! Every call loads a fresh snapshot of the table, so results always reflect
//! the last completed pipeline run.

use crate::dataset::{Dataset, DatasetStore, WordRecord};
use crate::error::{Result, VocabError};
use rand::seq::SliceRandom;
use serde::Serialize;

/// Default page size for word listings.
pub const DEFAULT_PER_PAGE: usize = 50;

/// Overall dataset statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub total_words: usize,
    pub translated_words: usize,
    pub vocab_file_exists: bool,
}

/// Parameters of a word listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordQuery {
    pub search: Option<String>,
    pub word_type: Option<String>,
    pub page: usize,
    pub per_page: usize,
}

impl Default for WordQuery {
    fn default() -> Self {
        Self {
            search: None,
            word_type: None,
            page: 1,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub words: Vec<T>,
    pub total: usize,
    pub page: usize,
    pub per_page: usize,
    pub total_pages: usize,
}

/// Records whose word, translation or definition contains `term`
/// (case-insensitive), optionally restricted to an exact `word_type`.
/// A blank term or type does not filter.
pub fn search<'a>(
    records: &'a [WordRecord],
    term: Option<&str>,
    word_type: Option<&str>,
) -> Vec<&'a WordRecord> {
    let term = term.map(|t| t.trim().to_lowercase()).filter(|t| !t.is_empty());
    let word_type = word_type
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty());

    records
        .iter()
        .filter(|r| match &term {
            Some(term) => {
                r.word.to_lowercase().contains(term)
                    || r.translation.to_lowercase().contains(term)
                    || r.definition.to_lowercase().contains(term)
            }
            None => true,
        })
        .filter(|r| match &word_type {
            Some(t) => r.word_type.to_lowercase() == *t,
            None => true,
        })
        .collect()
}

/// The slice `[(page-1)*per_page, page*per_page)` of `items`.
///
/// Out-of-range pages (including page 0) give an empty slice; a zero page size
/// gives an empty slice and zero pages.
pub fn paginate<T: Clone>(items: &[T], page: usize, per_page: usize) -> Page<T> {
    let total = items.len();
    let total_pages = if per_page == 0 {
        0
    } else {
        total.div_ceil(per_page)
    };

    let words = match page.checked_sub(1) {
        Some(index) if per_page > 0 => {
            let start = index.saturating_mul(per_page);
            if start >= total {
                Vec::new()
            } else {
                let end = start.saturating_add(per_page).min(total);
                items[start..end].to_vec()
            }
        }
        _ => Vec::new(),
    };

    Page {
        words,
        total,
        page,
        per_page,
        total_pages,
    }
}

/// A uniformly random sample of `min(count, len)` distinct records.
pub fn sample<R: rand::Rng + ?Sized>(
    records: &[WordRecord],
    count: usize,
    rng: &mut R,
) -> Vec<WordRecord> {
    records.choose_multiple(rng, count).cloned().collect()
}

/// First record whose word matches case-insensitively.
pub fn find<'a>(records: &'a [WordRecord], word: &str) -> Option<&'a WordRecord> {
    let word = word.trim().to_lowercase();
    records.iter().find(|r| r.key() == word)
}

/// Query surface over a [`DatasetStore`].
#[derive(Debug, Clone)]
pub struct QueryService {
    store: DatasetStore,
}

impl QueryService {
    pub fn new(store: DatasetStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &DatasetStore {
        &self.store
    }

    fn snapshot(&self) -> Result<Dataset> {
        self.store.load()
    }

    /// Totals. A missing store is reported through `vocab_file_exists`.
    pub fn stats(&self) -> Result<Stats> {
        match self.snapshot() {
            Ok(dataset) => Ok(Stats {
                total_words: dataset.len(),
                translated_words: dataset.translated_count(),
                vocab_file_exists: true,
            }),
            Err(VocabError::StoreMissing(_)) => Ok(Stats {
                total_words: 0,
                translated_words: 0,
                vocab_file_exists: false,
            }),
            Err(e) => Err(e),
        }
    }

    /// Filtered, paginated listing.
    pub fn words(&self, query: &WordQuery) -> Result<Page<WordRecord>> {
        let dataset = self.snapshot()?;
        let matches: Vec<WordRecord> = search(
            &dataset.records,
            query.search.as_deref(),
            query.word_type.as_deref(),
        )
        .into_iter()
        .cloned()
        .collect();
        Ok(paginate(&matches, query.page, query.per_page))
    }

    /// Single-word lookup.
    pub fn word(&self, word: &str) -> Result<WordRecord> {
        let dataset = self.snapshot()?;
        find(&dataset.records, word)
            .cloned()
            .ok_or_else(|| VocabError::NotFound(word.to_string()))
    }

    /// Random words for today's review, re-drawn on every call.
    pub fn daily(&self, count: usize) -> Result<Vec<WordRecord>> {
        let dataset = self.snapshot()?;
        Ok(sample(&dataset.records, count, &mut rand::thread_rng()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn records() -> Vec<WordRecord> {
        vec![
            WordRecord {
                word: "Cat".into(),
                translation: "gato".into(),
                definition: "A small feline".into(),
                word_type: "noun".into(),
                ..Default::default()
            },
            WordRecord {
                word: "run".into(),
                translation: "correr".into(),
                definition: "Move fast".into(),
                word_type: "Verb".into(),
                ..Default::default()
            },
            WordRecord {
                word: "catch".into(),
                translation: "".into(),
                definition: "Seize".into(),
                word_type: "verb".into(),
                ..Default::default()
            },
            WordRecord {
                word: "dog".into(),
                translation: "PERRO".into(),
                definition: "Loyal animal, not a cat".into(),
                word_type: "noun".into(),
                ..Default::default()
            },
        ]
    }

    fn store_with(records: Vec<WordRecord>) -> (tempfile::TempDir, QueryService) {
        let dir = tempfile::tempdir().unwrap();
        let store = DatasetStore::new(dir.path().join("vocab.csv"));
        store.save(&Dataset::new(records, true)).unwrap();
        (dir, QueryService::new(store))
    }

    #[test]
    fn test_search_matches_word_translation_definition() {
        let records = records();
        let words: Vec<&str> = search(&records, Some("CAT"), None)
            .iter()
            .map(|r| r.word.as_str())
            .collect();
        assert_eq!(words, vec!["Cat", "catch", "dog"]);

        let by_translation = search(&records, Some("perro"), None);
        assert_eq!(by_translation.len(), 1);
        assert_eq!(by_translation[0].word, "dog");
    }

    #[test]
    fn test_search_with_type_filter() {
        let records = records();
        let verbs = search(&records, None, Some("VERB"));
        assert_eq!(verbs.len(), 2);

        let cat_nouns = search(&records, Some("cat"), Some("noun"));
        assert_eq!(cat_nouns.len(), 2);
    }

    #[test]
    fn test_search_no_match() {
        let records = records();
        let page = paginate(
            &search(&records, Some("zz-not-a-real-substring"), None),
            1,
            50,
        );
        assert!(page.words.is_empty());
        assert_eq!(page.total, 0);
        assert_eq!(page.total_pages, 0);
    }

    #[test]
    fn test_paginate_length_property() {
        let items: Vec<usize> = (0..23).collect();
        for per_page in 1..=30 {
            for page in 1..=30 {
                let result = paginate(&items, page, per_page);
                let expected = per_page.min(items.len().saturating_sub((page - 1) * per_page));
                assert_eq!(result.words.len(), expected, "page={} per_page={}", page, per_page);
                assert_eq!(result.total, 23);
                assert_eq!(result.total_pages, 23usize.div_ceil(per_page));
            }
        }
    }

    #[test]
    fn test_paginate_slices_in_order() {
        let items: Vec<usize> = (0..7).collect();
        assert_eq!(paginate(&items, 2, 3).words, vec![3, 4, 5]);
        assert_eq!(paginate(&items, 3, 3).words, vec![6]);
        assert!(paginate(&items, 4, 3).words.is_empty());
    }

    #[test]
    fn test_paginate_degenerate_inputs() {
        let items: Vec<usize> = (0..7).collect();
        assert!(paginate(&items, 0, 3).words.is_empty());
        let zero = paginate(&items, 1, 0);
        assert!(zero.words.is_empty());
        assert_eq!(zero.total_pages, 0);
    }

    #[test]
    fn test_sample_distinct_and_bounded() {
        let records = records();
        let mut rng = StdRng::seed_from_u64(7);
        for count in 0..6 {
            let picked = sample(&records, count, &mut rng);
            assert_eq!(picked.len(), count.min(records.len()));
            let keys: HashSet<String> = picked.iter().map(WordRecord::key).collect();
            assert_eq!(keys.len(), picked.len());
        }
    }

    #[test]
    fn test_find_case_insensitive() {
        let records = records();
        assert_eq!(find(&records, "cAT").unwrap().translation, "gato");
        assert!(find(&records, "bird").is_none());
    }

    #[test]
    fn test_service_reports_missing_store() {
        let dir = tempfile::tempdir().unwrap();
        let service = QueryService::new(DatasetStore::new(dir.path().join("none.csv")));

        let stats = service.stats().unwrap();
        assert!(!stats.vocab_file_exists);
        assert_eq!(stats.total_words, 0);

        assert!(service.words(&WordQuery::default()).unwrap_err().is_store_missing());
        assert!(service.word("cat").unwrap_err().is_store_missing());
        assert!(service.daily(5).unwrap_err().is_store_missing());
    }

    #[test]
    fn test_service_over_store() {
        let (_dir, service) = store_with(records());

        let stats = service.stats().unwrap();
        assert_eq!(
            stats,
            Stats {
                total_words: 4,
                translated_words: 3,
                vocab_file_exists: true
            }
        );

        let page = service
            .words(&WordQuery {
                search: Some("cat".into()),
                per_page: 2,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.words.len(), 2);

        assert_eq!(service.word("DOG").unwrap().translation, "PERRO");
        assert!(matches!(service.word("bird"), Err(VocabError::NotFound(_))));
        assert_eq!(service.daily(10).unwrap().len(), 4);
    }

    #[test]
    fn test_empty_store_is_not_missing() {
        let (_dir, service) = store_with(Vec::new());
        let stats = service.stats().unwrap();
        assert!(stats.vocab_file_exists);
        assert_eq!(stats.total_words, 0);
        assert!(service.daily(3).unwrap().is_empty());
    }
}
