//! Transcription + interpretation extraction strategy
//!
//! The richest strategy in the chain: transcribe the recording, have the
//! text-understanding service list task facts, then validate each fact
//! against the transcript itself. A character name the interpreter
//! invented does not literally appear in the source text, so validation
//! drops it; transcription spelling drift is tolerated via string
//! similarity on individual tokens.

use async_trait::async_trait;
use scribe_common::Result;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use super::{ExtractionStrategy, TaskFact};
use crate::services::{Interpreter, Transcriber};

/// Jaro-Winkler score at or above which a transcript token counts as an
/// occurrence of a character name
const NAME_MATCH_THRESHOLD: f64 = 0.88;

pub struct InterpretedExtraction {
    transcriber: Arc<dyn Transcriber>,
    interpreter: Arc<dyn Interpreter>,
    default_project: String,
}

impl InterpretedExtraction {
    pub fn new(
        transcriber: Arc<dyn Transcriber>,
        interpreter: Arc<dyn Interpreter>,
        default_project: String,
    ) -> Self {
        Self {
            transcriber,
            interpreter,
            default_project,
        }
    }

    /// Validate interpreter output against the transcript
    ///
    /// Keeps one record per (character, task) pair; drops facts with an
    /// absent character or task, facts whose character never appears in
    /// the source text, and clamps confidence into [0, 1].
    fn validate(&self, raw: Vec<TaskFact>, transcript: &str) -> Vec<TaskFact> {
        let transcript_lower = transcript.to_lowercase();
        let mut seen: HashSet<(String, String)> = HashSet::new();
        let mut validated = Vec::new();

        for mut fact in raw {
            fact.character = fact.character.trim().to_string();
            fact.task = fact.task.trim().to_string();

            if fact.character.is_empty() || fact.task.is_empty() {
                continue;
            }

            if !name_appears(&transcript_lower, &fact.character) {
                tracing::warn!(
                    character = %fact.character,
                    "Character not present in transcript, dropping fact"
                );
                continue;
            }

            if fact.project.trim().is_empty() {
                fact.project = self.default_project.clone();
            }
            fact.confidence = fact.confidence.clamp(0.0, 1.0);

            let key = (fact.character.to_lowercase(), fact.task.to_lowercase());
            if seen.insert(key) {
                validated.push(fact);
            }
        }

        validated
    }
}

#[async_trait]
impl ExtractionStrategy for InterpretedExtraction {
    fn name(&self) -> &'static str {
        "interpreted"
    }

    async fn extract(&self, media_path: &Path) -> Result<Vec<TaskFact>> {
        let transcript = self.transcriber.transcribe(media_path).await?;
        if transcript.trim().is_empty() {
            tracing::debug!("Empty transcript, nothing to interpret");
            return Ok(Vec::new());
        }

        let raw = self.interpreter.interpret(&transcript).await?;
        let raw_count = raw.len();
        let validated = self.validate(raw, &transcript);

        if validated.len() < raw_count {
            tracing::info!(
                raw = raw_count,
                validated = validated.len(),
                "Validation dropped unverifiable facts"
            );
        }

        Ok(validated)
    }
}

/// Whether a character name occurs in the transcript, exactly or as a
/// close token match
fn name_appears(transcript_lower: &str, name: &str) -> bool {
    let name_lower = name.to_lowercase();
    if transcript_lower.contains(&name_lower) {
        return true;
    }

    transcript_lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .any(|token| strsim::jaro_winkler(token, &name_lower) >= NAME_MATCH_THRESHOLD)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scribe_common::Error;

    struct StaticTranscriber(String);

    #[async_trait]
    impl Transcriber for StaticTranscriber {
        async fn transcribe(&self, _media_path: &Path) -> Result<String> {
            Ok(self.0.clone())
        }
    }

    struct StaticInterpreter(Vec<TaskFact>);

    #[async_trait]
    impl Interpreter for StaticInterpreter {
        async fn interpret(&self, _transcript: &str) -> Result<Vec<TaskFact>> {
            Ok(self.0.clone())
        }
    }

    struct FailingTranscriber;

    #[async_trait]
    impl Transcriber for FailingTranscriber {
        async fn transcribe(&self, _media_path: &Path) -> Result<String> {
            Err(Error::Internal("no credentials".to_string()))
        }
    }

    struct PanicInterpreter;

    #[async_trait]
    impl Interpreter for PanicInterpreter {
        async fn interpret(&self, _transcript: &str) -> Result<Vec<TaskFact>> {
            panic!("interpreter must not run on empty transcript");
        }
    }

    fn fact(character: &str, task: &str, project: &str, confidence: f32) -> TaskFact {
        TaskFact {
            project: project.to_string(),
            character: character.to_string(),
            task: task.to_string(),
            context: String::new(),
            confidence,
        }
    }

    fn strategy(transcript: &str, facts: Vec<TaskFact>) -> InterpretedExtraction {
        InterpretedExtraction::new(
            Arc::new(StaticTranscriber(transcript.to_string())),
            Arc::new(StaticInterpreter(facts)),
            "Campaign".to_string(),
        )
    }

    #[test]
    fn test_name_appears_exact() {
        assert!(name_appears("astra will scout the pass", "Astra"));
        assert!(!name_appears("nobody here by that name", "Astra"));
    }

    #[test]
    fn test_name_appears_tolerates_spelling_drift() {
        // Transcription rendered "Brennan" as "Brennen"
        assert!(name_appears("brennen said he would repair the wagon", "Brennan"));
    }

    #[tokio::test]
    async fn test_hallucinated_character_is_dropped() {
        let strategy = strategy(
            "Astra will scout the pass tomorrow",
            vec![
                fact("Astra", "scout the pass", "", 0.9),
                fact("Zorblax", "summon a demon", "", 0.9),
            ],
        );

        let facts = strategy.extract(Path::new("/tmp/x.m4a")).await.unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].character, "Astra");
    }

    #[tokio::test]
    async fn test_default_project_and_confidence_clamp() {
        let strategy = strategy(
            "Astra will scout the pass",
            vec![fact("Astra", "scout the pass", "", 1.7)],
        );

        let facts = strategy.extract(Path::new("/tmp/x.m4a")).await.unwrap();
        assert_eq!(facts[0].project, "Campaign");
        assert_eq!(facts[0].confidence, 1.0);
    }

    #[tokio::test]
    async fn test_duplicate_pairs_collapse() {
        let strategy = strategy(
            "Astra will scout the pass",
            vec![
                fact("Astra", "scout the pass", "", 0.9),
                fact("astra", "Scout the pass", "", 0.7),
            ],
        );

        let facts = strategy.extract(Path::new("/tmp/x.m4a")).await.unwrap();
        assert_eq!(facts.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_transcript_skips_interpreter() {
        let strategy = InterpretedExtraction::new(
            Arc::new(StaticTranscriber("   ".to_string())),
            Arc::new(PanicInterpreter),
            "Campaign".to_string(),
        );

        let facts = strategy.extract(Path::new("/tmp/x.m4a")).await.unwrap();
        assert!(facts.is_empty());
    }

    #[tokio::test]
    async fn test_transcriber_failure_propagates() {
        let strategy = InterpretedExtraction::new(
            Arc::new(FailingTranscriber),
            Arc::new(StaticInterpreter(Vec::new())),
            "Campaign".to_string(),
        );

        assert!(strategy.extract(Path::new("/tmp/x.m4a")).await.is_err());
    }
}
