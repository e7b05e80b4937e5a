//! Text-understanding client that turns transcripts into task facts
//!
//! The interpretation service returns free-form text that is *expected*
//! to be a JSON array of facts; the parser strips code fences and accepts
//! the two shapes the service is known to produce. A malformed reply is
//! an error for the calling strategy, never a panic.

use async_trait::async_trait;
use scribe_common::{Error, Result};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::extract::TaskFact;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

const INSTRUCTION: &str = "List every task assigned to a named character in this \
session transcript. Reply with a JSON array of objects with fields: project, \
character, task, context, confidence (0 to 1). Reply with JSON only.";

/// Turns transcript text into structured task facts
#[async_trait]
pub trait Interpreter: Send + Sync {
    async fn interpret(&self, transcript: &str) -> Result<Vec<TaskFact>>;
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: String,
}

/// Wrapper shape some replies use instead of a bare array
#[derive(Debug, Deserialize)]
struct FactsWrapper {
    facts: Vec<TaskFact>,
}

/// HTTP interpretation client (chat-completions style endpoint)
pub struct HttpInterpreter {
    http_client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl HttpInterpreter {
    pub fn new(endpoint: String, api_key: String, model: String) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Internal(format!("HTTP client creation failed: {}", e)))?;

        Ok(Self {
            http_client,
            endpoint,
            api_key,
            model,
        })
    }
}

#[async_trait]
impl Interpreter for HttpInterpreter {
    async fn interpret(&self, transcript: &str) -> Result<Vec<TaskFact>> {
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": INSTRUCTION },
                { "role": "user", "content": transcript },
            ],
            "temperature": 0.2,
        });

        let response = self
            .http_client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(Error::Throttled(
                "Interpretation service rate limit".to_string(),
            ));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Internal(format!(
                "Interpretation service returned {}: {}",
                status, body
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::Internal(format!("Interpretation response parse failed: {}", e)))?;

        let content = parsed
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .unwrap_or_default();

        let facts = parse_fact_json(content)?;
        tracing::debug!(facts = facts.len(), "Interpretation returned facts");
        Ok(facts)
    }
}

/// Parse the service's reply into facts
///
/// Accepts a bare JSON array or a `{"facts": [...]}` wrapper, with or
/// without markdown code fences around the JSON.
pub fn parse_fact_json(content: &str) -> Result<Vec<TaskFact>> {
    let stripped = strip_code_fences(content);
    let trimmed = stripped.trim();

    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    if let Ok(facts) = serde_json::from_str::<Vec<TaskFact>>(trimmed) {
        return Ok(facts);
    }
    if let Ok(wrapper) = serde_json::from_str::<FactsWrapper>(trimmed) {
        return Ok(wrapper.facts);
    }

    let preview: String = trimmed.chars().take(120).collect();
    Err(Error::Internal(format!(
        "Interpretation reply is not fact JSON: {}",
        preview
    )))
}

/// Drop a leading/trailing markdown fence if present
fn strip_code_fences(content: &str) -> String {
    let trimmed = content.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }

    trimmed
        .lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_array() {
        let facts = parse_fact_json(
            r#"[{"project":"Campaign","character":"Astra","task":"scout","context":"","confidence":0.8}]"#,
        )
        .unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].character, "Astra");
    }

    #[test]
    fn test_parse_wrapper_object() {
        let facts =
            parse_fact_json(r#"{"facts":[{"character":"Brennan","task":"repair the wagon"}]}"#)
                .unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].task, "repair the wagon");
    }

    #[test]
    fn test_parse_fenced_json() {
        let content = "```json\n[{\"character\":\"Astra\",\"task\":\"scout\"}]\n```";
        let facts = parse_fact_json(content).unwrap();
        assert_eq!(facts.len(), 1);
    }

    #[test]
    fn test_parse_empty_reply_is_no_facts() {
        assert!(parse_fact_json("").unwrap().is_empty());
        assert!(parse_fact_json("```\n```").unwrap().is_empty());
    }

    #[test]
    fn test_parse_prose_is_error() {
        let result = parse_fact_json("I could not find any tasks in this transcript.");
        assert!(matches!(result, Err(Error::Internal(_))));
    }
}
