//! Progress events emitted by the pipeline.
//!
//! Events are broadcast over a `tokio::sync::broadcast` channel. The CLI
//! prints them as colored progress lines and the HTTP layer can forward them
//! as JSON.

use serde::Serialize;

/// Envelope for all pipeline events.
///
/// Uses Serde's internally tagged representation so each JSON message
/// includes a `"type"` field identifying the variant:
///
/// ```json
/// { "type": "Started", "total": 20000, "target_language": "fa", ... }
/// { "type": "Progress", "processed": 10, "total": 20000, ... }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum PipelineEvent {
    /// Words are loaded and processing is about to begin.
    Started(StartedEvent),
    /// Periodic progress report.
    Progress(ProgressEvent),
    /// The pipeline is pausing between batches.
    BatchPause(BatchPauseEvent),
    /// Processing ended, fully or partially.
    Finished(FinishedEvent),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StartedEvent {
    pub total: usize,
    pub target_language: String,
    pub include_details: bool,
    /// Unix timestamp in milliseconds when this event was created.
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub processed: usize,
    pub total: usize,
    /// Words with a non-empty translation so far.
    pub translated: usize,
    /// The word just processed.
    pub word: String,
    pub translation: String,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchPauseEvent {
    pub processed: usize,
    pub pause_ms: u64,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinishedEvent {
    pub processed: usize,
    pub total: usize,
    pub translated: usize,
    /// True when the run stopped before every word was processed.
    pub partial: bool,
    pub timestamp: u64,
}

impl ProgressEvent {
    /// Percentage of words processed, 0-100.
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.processed as f64 * 100.0 / self.total as f64
    }
}

/// Returns the current time as Unix milliseconds.
pub fn current_timestamp_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_is_tagged() {
        let event = PipelineEvent::BatchPause(BatchPauseEvent {
            processed: 50,
            pause_ms: 500,
            timestamp: 1,
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "BatchPause");
        assert_eq!(json["processed"], 50);
    }

    #[test]
    fn test_progress_percent() {
        let progress = ProgressEvent {
            processed: 5,
            total: 20,
            translated: 4,
            word: "cat".into(),
            translation: "gato".into(),
            timestamp: 0,
        };
        assert_eq!(progress.percent(), 25.0);
    }
}
