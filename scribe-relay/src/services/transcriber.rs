//! Speech-to-text client

use async_trait::async_trait;
use scribe_common::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Session recordings run long; give the service room to work
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Turns a media artifact into transcript text
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, media_path: &Path) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    text: String,
}

/// HTTP transcription client (multipart file upload)
pub struct HttpTranscriber {
    http_client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpTranscriber {
    pub fn new(endpoint: String, api_key: String) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Internal(format!("HTTP client creation failed: {}", e)))?;

        Ok(Self {
            http_client,
            endpoint,
            api_key,
        })
    }
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(&self, media_path: &Path) -> Result<String> {
        let file_name = media_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "recording".to_string());

        let bytes = tokio::fs::read(media_path).await?;

        tracing::debug!(
            path = %media_path.display(),
            bytes = bytes.len(),
            "Uploading media for transcription"
        );

        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name);
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", "whisper-1")
            .text("response_format", "json");

        let response = self
            .http_client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(Error::Throttled(
                "Transcription service rate limit".to_string(),
            ));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Internal(format!(
                "Transcription service returned {}: {}",
                status, body
            )));
        }

        let parsed: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| Error::Internal(format!("Transcription response parse failed: {}", e)))?;

        tracing::info!(
            path = %media_path.display(),
            transcript_chars = parsed.text.len(),
            "Transcription complete"
        );

        Ok(parsed.text)
    }
}
