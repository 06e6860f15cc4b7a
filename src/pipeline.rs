//! The vocabulary ETL run: load words, translate and enrich each one, persist.
//!
//! Words are processed strictly one at a time with a fixed delay between
//! requests and a longer pause after every batch. A shutdown signal stops the
//! loop at the next word boundary and the completed prefix is returned as a
//! partial result.

use crate::config::Config;
use crate::dataset::{Dataset, DatasetStore, WordRecord};
use crate::dictionary::Enricher;
use crate::error::Result;
use crate::events::{
    current_timestamp_ms, BatchPauseEvent, FinishedEvent, PipelineEvent, ProgressEvent,
    StartedEvent,
};
use crate::pos::PosDictionary;
use crate::source::{WordLoader, WordSource};
use crate::translator::{language_name, validate_language, Translator};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tracing::{info, warn};

/// Rate-limit and reporting constants of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    /// Sleep between consecutive words.
    pub request_delay: Duration,
    /// Words per batch; 0 disables batch pauses.
    pub batch_size: usize,
    /// Sleep after each full batch, replacing the request delay.
    pub batch_pause: Duration,
    /// Report progress every this many words; 0 reports only at the end.
    pub progress_interval: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            request_delay: Duration::from_millis(200),
            batch_size: 50,
            batch_pause: Duration::from_millis(500),
            progress_interval: 10,
        }
    }
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            request_delay: config.request_delay,
            batch_size: config.batch_size,
            batch_pause: config.batch_pause,
            progress_interval: config.progress_interval,
        }
    }
}

/// Parameters of one run.
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    pub target_language: String,
    pub include_details: bool,
    /// Overrides the pipeline's word cap for this run.
    pub max_words: Option<usize>,
    /// A previously built dataset. If it already carries translations the run
    /// is skipped and it is returned unchanged.
    pub existing: Option<Dataset>,
}

impl RunRequest {
    pub fn new(target_language: impl Into<String>, include_details: bool) -> Self {
        Self {
            target_language: target_language.into(),
            include_details,
            ..Default::default()
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Every loaded word was processed.
    Completed,
    /// Interrupted; the dataset holds the processed prefix.
    Partial,
    /// The existing dataset was already translated.
    Skipped,
}

/// Result of a run with its summary counts.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub status: RunStatus,
    pub dataset: Dataset,
    /// Words loaded from the source.
    pub total: usize,
    /// Words processed before the run ended.
    pub processed: usize,
    /// Records with a non-empty translation.
    pub translated: usize,
    /// Whether the dataset was written to the store.
    pub saved: bool,
}

/// Orchestrates a vocabulary build.
pub struct Pipeline {
    loader: WordLoader,
    source: WordSource,
    max_words: usize,
    translator: Translator,
    enricher: Enricher,
    pos_dictionary_url: String,
    pos_dictionary_cache: PathBuf,
    settings: PipelineSettings,
    events: Option<broadcast::Sender<PipelineEvent>>,
    shutdown: Option<watch::Receiver<bool>>,
}

impl Pipeline {
    /// Creates a pipeline over `source` with the given collaborators.
    ///
    /// # Arguments
    ///
    /// * `loader` - Word list loader.
    /// * `source` - Where to read words from.
    /// * `translator` - Per-word translator with its retry policy.
    /// * `enricher` - Dictionary lookup client.
    /// * `settings` - Delays, batch size and progress interval.
    pub fn new(
        loader: WordLoader,
        source: WordSource,
        translator: Translator,
        enricher: Enricher,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            loader,
            source,
            max_words: 0,
            translator,
            enricher,
            pos_dictionary_url: String::new(),
            pos_dictionary_cache: PathBuf::new(),
            settings,
            events: None,
            shutdown: None,
        }
    }

    /// Builds the pipeline described by `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let translator = Translator::new(
            &config.translation_api_url,
            config.translation_backend.clone(),
            config.translation_retry(),
        )?;
        let enricher =
            Enricher::new(&config.dictionary_api_url)?.with_retry(config.translation_retry());

        Ok(Self::new(
            WordLoader::new()?,
            config.word_source.clone(),
            translator,
            enricher,
            PipelineSettings::from_config(config),
        )
        .with_max_words(config.max_words)
        .with_pos_dictionary(&config.pos_dictionary_url, config.pos_dictionary_cache.clone()))
    }

    /// Caps the word list (0 = unbounded).
    pub fn with_max_words(mut self, max_words: usize) -> Self {
        self.max_words = max_words;
        self
    }

    /// Sets the reference POS table used when details are requested.
    pub fn with_pos_dictionary(mut self, url: &str, cache_path: PathBuf) -> Self {
        self.pos_dictionary_url = url.to_string();
        self.pos_dictionary_cache = cache_path;
        self
    }

    /// Publishes progress events on `tx`.
    pub fn with_events(mut self, tx: broadcast::Sender<PipelineEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Stops the run at the next word boundary once `rx` reads `true`.
    pub fn with_shutdown(mut self, rx: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(rx);
        self
    }

    /// Runs the pipeline without touching the store.
    ///
    /// # Errors
    ///
    /// `UnsupportedLanguage` for an unknown target, and the loader's
    /// `SourceNotFound`/`EmptySource`/`Service`. Per-word failures only leave empty
    /// fields on the affected record.
    pub async fn run(&self, request: RunRequest) -> Result<RunReport> {
        let target = validate_language(&request.target_language)?;

        if let Some(existing) = request.existing {
            if existing.has_translations() {
                let translated = existing.translated_count();
                info!(
                    "Dataset already has {} translated words, skipping run",
                    translated
                );
                return Ok(RunReport {
                    status: RunStatus::Skipped,
                    total: existing.len(),
                    processed: 0,
                    translated,
                    saved: false,
                    dataset: existing,
                });
            }
        }

        let max_words = request.max_words.unwrap_or(self.max_words);
        let words = self.loader.load(&self.source, max_words).await?;
        let total = words.len();

        let pos = if request.include_details && !self.pos_dictionary_url.is_empty() {
            PosDictionary::load(&self.pos_dictionary_url, &self.pos_dictionary_cache).await
        } else {
            PosDictionary::empty()
        };

        info!(
            "Translating {} words to {} ({})",
            total,
            language_name(&target).unwrap_or("unknown"),
            target
        );
        self.emit(PipelineEvent::Started(StartedEvent {
            total,
            target_language: target.clone(),
            include_details: request.include_details,
            timestamp: current_timestamp_ms(),
        }));

        let mut shutdown = self.shutdown.clone();
        let mut records = Vec::with_capacity(total);
        let mut translated = 0;

        for (index, word) in words.into_iter().enumerate() {
            if is_stopped(&shutdown) {
                warn!("Run interrupted after {} of {} words", index, total);
                break;
            }

            let translation = self.translator.translate_word(&word, &target).await;
            if !translation.is_empty() {
                translated += 1;
            }

            let mut record = WordRecord::new(word).with_translation(translation);
            if request.include_details {
                let info = self.enricher.enrich(&record.word, &pos).await;
                record = record.with_enrichment(info);
            }

            let processed = index + 1;
            if self.should_report(processed, total) {
                info!(
                    "Progress: {}/{} ({:.1}%) - {} -> {}",
                    processed,
                    total,
                    processed as f64 * 100.0 / total as f64,
                    record.word,
                    record.translation
                );
                self.emit(PipelineEvent::Progress(ProgressEvent {
                    processed,
                    total,
                    translated,
                    word: record.word.clone(),
                    translation: record.translation.clone(),
                    timestamp: current_timestamp_ms(),
                }));
            }
            records.push(record);

            if processed < total {
                let delay = if self.is_batch_end(processed) {
                    info!("Processed batch of {}, pausing...", self.settings.batch_size);
                    self.emit(PipelineEvent::BatchPause(BatchPauseEvent {
                        processed,
                        pause_ms: self.settings.batch_pause.as_millis() as u64,
                        timestamp: current_timestamp_ms(),
                    }));
                    self.settings.batch_pause
                } else {
                    self.settings.request_delay
                };
                pause(delay, &mut shutdown).await;
            }
        }

        let processed = records.len();
        let partial = processed < total;
        self.emit(PipelineEvent::Finished(FinishedEvent {
            processed,
            total,
            translated,
            partial,
            timestamp: current_timestamp_ms(),
        }));
        info!(
            "Translation finished: {}/{} words translated",
            translated, processed
        );

        Ok(RunReport {
            status: if partial {
                RunStatus::Partial
            } else {
                RunStatus::Completed
            },
            dataset: Dataset::new(records, request.include_details),
            total,
            processed,
            translated,
            saved: false,
        })
    }

    /// Runs the pipeline and persists the result.
    ///
    /// Completed runs always replace the stored table. Partial runs are saved
    /// only when at least one word was translated. Skipped runs write nothing.
    pub async fn run_and_store(&self, store: &DatasetStore, request: RunRequest) -> Result<RunReport> {
        let mut report = self.run(request).await?;

        let save = match report.status {
            RunStatus::Completed => true,
            RunStatus::Partial => report.translated > 0,
            RunStatus::Skipped => false,
        };

        if save {
            store.save(&report.dataset)?;
            report.saved = true;
        } else if report.status == RunStatus::Partial {
            warn!("No words translated before interruption, nothing saved");
        }

        Ok(report)
    }

    fn should_report(&self, processed: usize, total: usize) -> bool {
        let interval = self.settings.progress_interval;
        processed == total || (interval > 0 && processed % interval == 0)
    }

    fn is_batch_end(&self, processed: usize) -> bool {
        let size = self.settings.batch_size;
        size > 0 && processed % size == 0
    }

    fn emit(&self, event: PipelineEvent) {
        if let Some(tx) = &self.events {
            // No subscribers is fine.
            let _ = tx.send(event);
        }
    }
}

fn is_stopped(shutdown: &Option<watch::Receiver<bool>>) -> bool {
    shutdown.as_ref().is_some_and(|rx| *rx.borrow())
}

/// Sleeps for `duration`, waking early when the shutdown flag changes.
async fn pause(duration: Duration, shutdown: &mut Option<watch::Receiver<bool>>) {
    if duration.is_zero() {
        return;
    }

    let sleep = tokio::time::sleep(duration);
    tokio::pin!(sleep);

    let sender_gone = match shutdown.as_mut() {
        Some(rx) => tokio::select! {
            _ = &mut sleep => false,
            changed = rx.changed() => changed.is_err(),
        },
        None => {
            (&mut sleep).await;
            return;
        }
    };

    // Nobody can stop the run any more; finish the sleep.
    if sender_gone {
        *shutdown = None;
        sleep.await;
    }
}
