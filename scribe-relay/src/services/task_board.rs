//! Task board API client
//!
//! Find-or-create per-character cards, then attach notes and checklists.
//! The board enforces an undocumented per-second request ceiling and
//! answers bursts with HTTP 429; that status maps to the throttled error
//! class so the dispatcher retries it, while other failures surface as
//! dispatch errors.

use async_trait::async_trait;
use scribe_common::{Error, Result};
use serde::Deserialize;
use std::time::Duration;

use crate::config::BoardSettings;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Handle to one board card
#[derive(Debug, Clone)]
pub struct CardRef {
    pub id: String,
    pub name: String,
}

/// Downstream dispatch target
#[async_trait]
pub trait TaskBoard: Send + Sync {
    /// Return the card named `name` on the configured list, creating it
    /// when absent
    async fn find_or_create_card(&self, name: &str) -> Result<CardRef>;

    /// Attach a comment to a card
    async fn add_note(&self, card: &CardRef, text: &str) -> Result<()>;

    /// Attach a checklist with the given items to a card
    async fn add_checklist(&self, card: &CardRef, title: &str, items: &[String]) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct ApiCard {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ApiChecklist {
    id: String,
}

/// HTTP task board client (key + token query auth)
pub struct HttpTaskBoard {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
    api_token: String,
    list_id: String,
}

impl HttpTaskBoard {
    pub fn new(settings: &BoardSettings) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Internal(format!("HTTP client creation failed: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            api_token: settings.api_token.clone(),
            list_id: settings.list_id.clone(),
        })
    }

    fn auth_query(&self) -> [(&'static str, &str); 2] {
        [("key", self.api_key.as_str()), ("token", self.api_token.as_str())]
    }

    /// Map one response to the error taxonomy; 429 is the retryable class
    async fn check_status(operation: &str, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.as_u16() == 429 {
            return Err(Error::Throttled(format!("{} returned 429", operation)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Dispatch(format!(
                "{} returned {}: {}",
                operation, status, body
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl TaskBoard for HttpTaskBoard {
    async fn find_or_create_card(&self, name: &str) -> Result<CardRef> {
        let url = format!("{}/lists/{}/cards", self.base_url, self.list_id);
        let response = self
            .http_client
            .get(&url)
            .query(&self.auth_query())
            .send()
            .await?;
        let response = Self::check_status("list cards", response).await?;

        let cards: Vec<ApiCard> = response
            .json()
            .await
            .map_err(|e| Error::Dispatch(format!("Card list parse failed: {}", e)))?;

        if let Some(card) = cards
            .into_iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
        {
            tracing::debug!(card = %card.name, "Found existing card");
            return Ok(CardRef {
                id: card.id,
                name: card.name,
            });
        }

        let url = format!("{}/cards", self.base_url);
        let response = self
            .http_client
            .post(&url)
            .query(&self.auth_query())
            .query(&[("idList", self.list_id.as_str()), ("name", name)])
            .send()
            .await?;
        let response = Self::check_status("create card", response).await?;

        let card: ApiCard = response
            .json()
            .await
            .map_err(|e| Error::Dispatch(format!("Create card parse failed: {}", e)))?;

        tracing::info!(card = %card.name, "Created card");
        Ok(CardRef {
            id: card.id,
            name: card.name,
        })
    }

    async fn add_note(&self, card: &CardRef, text: &str) -> Result<()> {
        let url = format!("{}/cards/{}/actions/comments", self.base_url, card.id);
        let response = self
            .http_client
            .post(&url)
            .query(&self.auth_query())
            .query(&[("text", text)])
            .send()
            .await?;
        Self::check_status("add note", response).await?;
        Ok(())
    }

    async fn add_checklist(&self, card: &CardRef, title: &str, items: &[String]) -> Result<()> {
        let url = format!("{}/checklists", self.base_url);
        let response = self
            .http_client
            .post(&url)
            .query(&self.auth_query())
            .query(&[("idCard", card.id.as_str()), ("name", title)])
            .send()
            .await?;
        let response = Self::check_status("create checklist", response).await?;

        let checklist: ApiChecklist = response
            .json()
            .await
            .map_err(|e| Error::Dispatch(format!("Create checklist parse failed: {}", e)))?;

        for item in items {
            let url = format!("{}/checklists/{}/checkItems", self.base_url, checklist.id);
            let response = self
                .http_client
                .post(&url)
                .query(&self.auth_query())
                .query(&[("name", item.as_str())])
                .send()
                .await?;
            Self::check_status("add checklist item", response).await?;
        }

        Ok(())
    }
}
