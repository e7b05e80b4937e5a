//! Recording event processing
//!
//! Stateless between events: each decoded "recording completed" event is
//! validated, its audio fetched, run through the extraction fallback
//! chain, and the resulting facts dispatched per character through the
//! rate-limited queue. Distinct events process concurrently; the only
//! shared structure is the dispatcher's queue.
//!
//! Failures are contained per event and reported as a summary or a skip
//! event on the bus; one recording's loss never interrupts another's
//! processing.

use async_trait::async_trait;
use chrono::Utc;
use scribe_common::events::{EventBus, ScribeEvent};
use scribe_common::{Error, Result};
use serde::Deserialize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::ExtractionSettings;
use crate::dispatch::Dispatcher;
use crate::extract::{group_by_character, ExtractionChain, TaskFact};
use crate::services::{MediaStore, TaskBoard};
use crate::stream::{EventSink, MeetingEvent, RECORDING_COMPLETED};

/// Pacing applied on top of the dispatcher's own rate window
///
/// The board mirrors every card change into a second, independently
/// rate-limited integration; explicit gaps between dispatches keep that
/// mirror out of its burst ceiling too.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Gap between follow-up facts for one character
    pub inter_task_delay: Duration,
    /// Gap between character groups
    pub inter_group_delay: Duration,
}

impl From<&ExtractionSettings> for ProcessorConfig {
    fn from(settings: &ExtractionSettings) -> Self {
        Self {
            inter_task_delay: Duration::from_millis(settings.inter_task_delay_ms),
            inter_group_delay: Duration::from_millis(settings.inter_group_delay_ms),
        }
    }
}

/// "Recording completed" payload
#[derive(Debug, Clone, Deserialize)]
pub struct RecordingPayload {
    /// Short-lived credential for the recording download, when present
    #[serde(default)]
    pub download_token: Option<String>,
    #[serde(default)]
    pub object: RecordingObject,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordingObject {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub recording_files: Vec<RecordingFile>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordingFile {
    #[serde(default)]
    pub file_type: String,
    #[serde(default)]
    pub recording_type: String,
    #[serde(default)]
    pub download_url: String,
}

/// Outcome of one recording's processing
#[derive(Debug, Clone, Default)]
pub struct ProcessingSummary {
    pub meeting_id: String,
    pub facts: usize,
    pub dispatched: usize,
    pub failed: usize,
}

/// Consumes decoded domain events and drives the pipeline
pub struct EventProcessor {
    media: Arc<dyn MediaStore>,
    chain: Arc<ExtractionChain>,
    dispatcher: Dispatcher,
    board: Arc<dyn TaskBoard>,
    event_bus: EventBus,
    config: ProcessorConfig,
}

impl EventProcessor {
    pub fn new(
        media: Arc<dyn MediaStore>,
        chain: Arc<ExtractionChain>,
        dispatcher: Dispatcher,
        board: Arc<dyn TaskBoard>,
        event_bus: EventBus,
        config: ProcessorConfig,
    ) -> Self {
        Self {
            media,
            chain,
            dispatcher,
            board,
            event_bus,
            config,
        }
    }

    /// Process one completed recording end to end
    pub async fn process_recording(&self, payload: &Value) -> Result<ProcessingSummary> {
        let payload: RecordingPayload = serde_json::from_value(payload.clone())
            .map_err(|e| Error::Validation(format!("Malformed recording payload: {}", e)))?;

        let audio = select_audio_file(&payload.object)?;
        tracing::info!(
            meeting = %payload.object.uuid,
            topic = %payload.object.topic,
            "Processing completed recording"
        );

        // Everything fetched below is released on every exit path
        let mut acquired: Vec<PathBuf> = Vec::new();
        let result = self
            .run_pipeline(&payload, &audio, &mut acquired)
            .await;
        self.media.cleanup(&acquired).await;
        result
    }

    async fn run_pipeline(
        &self,
        payload: &RecordingPayload,
        audio: &RecordingFile,
        acquired: &mut Vec<PathBuf>,
    ) -> Result<ProcessingSummary> {
        let meeting_id = payload.object.uuid.clone();

        let raw = self
            .media
            .fetch(&audio.download_url, payload.download_token.as_deref())
            .await?;
        acquired.push(raw.clone());

        let media_path = self.media.convert(&raw).await?;
        if media_path != raw {
            acquired.push(media_path.clone());
        }

        let facts = self.chain.extract(&media_path).await?;
        let mut summary = ProcessingSummary {
            meeting_id: meeting_id.clone(),
            facts: facts.len(),
            ..Default::default()
        };

        if facts.is_empty() {
            tracing::info!(meeting = %meeting_id, "No task facts found in recording");
            self.emit_summary(&summary);
            return Ok(summary);
        }

        let groups = group_by_character(facts);
        for (group_index, (character, group)) in groups.iter().enumerate() {
            if group_index > 0 {
                tokio::time::sleep(self.config.inter_group_delay).await;
            }

            for (fact_index, fact) in group.iter().enumerate() {
                if fact_index > 0 {
                    tokio::time::sleep(self.config.inter_task_delay).await;
                }

                let label = format!("{}#{}", character, fact_index + 1);
                match self.dispatch_fact(&label, fact).await {
                    Ok(()) => summary.dispatched += 1,
                    Err(e) => {
                        // One lost task never aborts its siblings
                        summary.failed += 1;
                        tracing::warn!(label = %label, error = %e, "Dispatch failed");
                        self.emit(ScribeEvent::DispatchFailed {
                            label,
                            error: e.to_string(),
                            timestamp: Utc::now(),
                        });
                    }
                }
            }
        }

        tracing::info!(
            meeting = %summary.meeting_id,
            facts = summary.facts,
            dispatched = summary.dispatched,
            failed = summary.failed,
            "Recording processing complete"
        );
        self.emit_summary(&summary);
        Ok(summary)
    }

    /// Submit one fact to the board via the rate-limited queue
    async fn dispatch_fact(&self, label: &str, fact: &TaskFact) -> Result<()> {
        let board = self.board.clone();
        let fact = fact.clone();

        self.dispatcher
            .execute(label, move || {
                let board = board.clone();
                let fact = fact.clone();
                async move {
                    let card = board.find_or_create_card(&fact.character).await?;
                    board.add_note(&card, &format_note(&fact)).await?;
                    board
                        .add_checklist(&card, &fact.project, &[fact.task.clone()])
                        .await?;
                    Ok(())
                }
            })
            .await
    }

    fn emit_summary(&self, summary: &ProcessingSummary) {
        self.emit(ScribeEvent::RecordingProcessed {
            meeting_id: summary.meeting_id.clone(),
            facts: summary.facts,
            dispatched: summary.dispatched,
            failed: summary.failed,
            timestamp: Utc::now(),
        });
    }

    fn emit(&self, event: ScribeEvent) {
        if self.event_bus.emit(event).is_err() {
            tracing::debug!("No event bus subscribers");
        }
    }
}

#[async_trait]
impl EventSink for EventProcessor {
    async fn handle_event(&self, event: MeetingEvent) {
        if event.event != RECORDING_COMPLETED {
            tracing::debug!(event = %event.event, "Ignoring event type");
            return;
        }

        if let Err(e) = self.process_recording(&event.payload).await {
            let meeting_id = event.payload["object"]["uuid"]
                .as_str()
                .unwrap_or_default()
                .to_string();
            tracing::error!(meeting = %meeting_id, error = %e, "Recording processing failed");
            self.emit(ScribeEvent::RecordingSkipped {
                meeting_id,
                reason: e.to_string(),
                timestamp: Utc::now(),
            });
        }
    }
}

/// Locate the audio recording among the event's files
///
/// Audio-only artifacts are identified by file type or recording type;
/// an event without one fails validation and is never dispatched.
fn select_audio_file(object: &RecordingObject) -> Result<RecordingFile> {
    object
        .recording_files
        .iter()
        .find(|file| {
            !file.download_url.is_empty()
                && (file.file_type.eq_ignore_ascii_case("m4a")
                    || file.recording_type.eq_ignore_ascii_case("audio_only"))
        })
        .cloned()
        .ok_or_else(|| {
            Error::Validation(format!(
                "Recording event for meeting '{}' contains no audio recording file",
                object.uuid
            ))
        })
}

/// Board note body for one fact
fn format_note(fact: &TaskFact) -> String {
    let mut note = format!(
        "[{}] {}\nConfidence: {:.0}%",
        fact.project,
        fact.task,
        fact.confidence * 100.0
    );
    if !fact.context.trim().is_empty() {
        note.push_str("\nContext: ");
        note.push_str(fact.context.trim());
    }
    note
}
