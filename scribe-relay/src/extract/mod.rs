//! Extraction fallback chain
//!
//! Strategies are tried in a fixed priority order, richest first. Each
//! strategy does its own transcription/interpretation and validates its
//! own output; the chain owns only the ordering and fallback decisions:
//!
//! - a strategy error moves the chain to the next strategy
//! - the first non-empty validated result stops the chain
//! - an empty result from every clean strategy is a normal outcome, not
//!   an error ("nothing to do" downstream)
//! - an error from every strategy propagates the last one

pub mod facts;
pub mod interpreted;
pub mod pattern;

pub use facts::{group_by_character, TaskFact};
pub use interpreted::InterpretedExtraction;
pub use pattern::PatternExtraction;

use async_trait::async_trait;
use scribe_common::{Error, Result};
use std::path::Path;

/// One way of turning a media artifact into task facts
#[async_trait]
pub trait ExtractionStrategy: Send + Sync {
    /// Strategy name for diagnostics
    fn name(&self) -> &'static str;

    /// Extract validated facts; an empty vec means "ran cleanly, found
    /// nothing", an error means this strategy cannot serve this artifact.
    async fn extract(&self, media_path: &Path) -> Result<Vec<TaskFact>>;
}

/// Ordered fallback chain over extraction strategies
pub struct ExtractionChain {
    strategies: Vec<Box<dyn ExtractionStrategy>>,
}

impl ExtractionChain {
    pub fn new(strategies: Vec<Box<dyn ExtractionStrategy>>) -> Self {
        Self { strategies }
    }

    /// Run the chain against one media artifact
    pub async fn extract(&self, media_path: &Path) -> Result<Vec<TaskFact>> {
        if self.strategies.is_empty() {
            return Err(Error::Extraction(
                "No extraction strategies configured".to_string(),
            ));
        }

        let mut last_error: Option<Error> = None;
        let mut any_clean = false;

        for strategy in &self.strategies {
            match strategy.extract(media_path).await {
                Ok(facts) if !facts.is_empty() => {
                    tracing::info!(
                        strategy = strategy.name(),
                        facts = facts.len(),
                        "Extraction succeeded"
                    );
                    return Ok(facts);
                }
                Ok(_) => {
                    tracing::debug!(
                        strategy = strategy.name(),
                        "Strategy found no facts, trying next"
                    );
                    any_clean = true;
                }
                Err(e) => {
                    tracing::warn!(
                        strategy = strategy.name(),
                        error = %e,
                        "Strategy failed, trying next"
                    );
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            // Every strategy errored; propagate the last failure
            Some(last) if !any_clean => Err(Error::Extraction(format!(
                "All {} extraction strategies failed, last: {}",
                self.strategies.len(),
                last
            ))),
            // At least one strategy ran cleanly and found nothing
            _ => Ok(Vec::new()),
        }
    }
}
