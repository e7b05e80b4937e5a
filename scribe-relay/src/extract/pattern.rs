//! Pattern-matching extraction strategy
//!
//! The cheap end of the fallback chain: no external services, just a scan
//! of the transcript artifact the meeting platform ships alongside the
//! recording (VTT or plain text sidecar). Looks for speaker-attributed
//! lines whose utterance carries a commitment cue ("I'll ...", "needs
//! to ..."). Low confidence by construction; the interpreted strategy
//! outranks it in the chain.

use async_trait::async_trait;
use regex::Regex;
use scribe_common::{Error, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use super::{ExtractionStrategy, TaskFact};

/// Fixed confidence for pattern-derived facts
const PATTERN_CONFIDENCE: f32 = 0.3;

/// Transcript sidecar extensions, in preference order
const TRANSCRIPT_EXTENSIONS: &[&str] = &["vtt", "txt"];

pub struct PatternExtraction {
    default_project: String,
    speaker: Regex,
    cue: Regex,
}

impl PatternExtraction {
    pub fn new(default_project: String) -> Result<Self> {
        let speaker = Regex::new(r"^([A-Z][A-Za-z'\-]{1,30})\s*:\s*(.+)$")
            .map_err(|e| Error::Internal(format!("Speaker pattern failed to compile: {}", e)))?;
        let cue = Regex::new(
            r"(?i)\b(?:i'll|i will|will|going to|gonna|needs? to|has to|have to|should)\s+(.{3,})$",
        )
        .map_err(|e| Error::Internal(format!("Cue pattern failed to compile: {}", e)))?;

        Ok(Self {
            default_project,
            speaker,
            cue,
        })
    }

    /// Scan transcript text for speaker-attributed commitments
    fn extract_from_text(&self, text: &str) -> Vec<TaskFact> {
        let mut seen: HashSet<(String, String)> = HashSet::new();
        let mut facts = Vec::new();

        for line in text.lines() {
            let line = line.trim();
            // VTT headers, cue indices, and timestamp lines carry no speech
            if line.is_empty()
                || line.contains("-->")
                || line.eq_ignore_ascii_case("webvtt")
                || line.chars().all(|c| c.is_ascii_digit())
            {
                continue;
            }

            let Some(parts) = self.speaker.captures(line) else {
                continue;
            };
            let character = parts[1].to_string();
            let utterance = parts[2].trim();

            let Some(cue) = self.cue.captures(utterance) else {
                continue;
            };
            let task = cue[1].trim().trim_end_matches(['.', '!', '?']).to_string();
            if task.is_empty() {
                continue;
            }

            let key = (character.to_lowercase(), task.to_lowercase());
            if seen.insert(key) {
                facts.push(TaskFact {
                    project: self.default_project.clone(),
                    character,
                    task,
                    context: line.to_string(),
                    confidence: PATTERN_CONFIDENCE,
                });
            }
        }

        facts
    }
}

#[async_trait]
impl ExtractionStrategy for PatternExtraction {
    fn name(&self) -> &'static str {
        "pattern"
    }

    async fn extract(&self, media_path: &Path) -> Result<Vec<TaskFact>> {
        let Some(transcript_path) = sidecar_transcript(media_path) else {
            tracing::debug!(
                media = %media_path.display(),
                "No transcript sidecar, pattern scan has nothing to read"
            );
            return Ok(Vec::new());
        };

        let text = tokio::fs::read_to_string(&transcript_path).await?;
        let facts = self.extract_from_text(&text);

        tracing::debug!(
            transcript = %transcript_path.display(),
            facts = facts.len(),
            "Pattern scan complete"
        );
        Ok(facts)
    }
}

/// Locate the transcript to scan: the artifact itself when it already is
/// one, otherwise a sidecar next to the media file
fn sidecar_transcript(media_path: &Path) -> Option<PathBuf> {
    let extension = media_path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    if TRANSCRIPT_EXTENSIONS.contains(&extension.as_str()) {
        return Some(media_path.to_path_buf());
    }

    TRANSCRIPT_EXTENSIONS
        .iter()
        .map(|ext| media_path.with_extension(ext))
        .find(|candidate| candidate.exists())
}
