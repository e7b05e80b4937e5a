//! Bearer token acquisition for the meeting platform
//!
//! Server-to-server credential flow: client id/secret are exchanged at the
//! token endpoint (basic auth) for a short-lived bearer token. The token is
//! cached and refreshed ahead of expiry; concurrent callers share one
//! in-flight refresh because the cache lock is held across the request.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use scribe_common::{Error, Result};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::config::AuthConfig;

/// Source of bearer credentials for the streaming connection
///
/// The connection manager depends on this seam rather than the concrete
/// provider so tests can hand it canned tokens.
#[async_trait]
pub trait TokenSource: Send + Sync + 'static {
    async fn get_token(&self) -> Result<String>;
}

/// Tokens are treated as expired this long before their stated expiry,
/// so a connection never opens with a credential about to lapse.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A cached bearer credential
#[derive(Debug, Clone)]
pub struct AccessToken {
    /// Opaque bearer token
    pub token: String,
    /// Monotonic expiry instant (stated expiry, margin not applied)
    pub expires_at: Instant,
}

impl AccessToken {
    /// Valid while now is more than the safety margin before expiry
    pub fn is_valid(&self) -> bool {
        Instant::now() + EXPIRY_MARGIN < self.expires_at
    }
}

/// Token endpoint response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: String,
    /// Lifetime in seconds
    #[serde(default)]
    expires_in: u64,
}

/// Token provider with single-flight refresh
pub struct TokenProvider {
    http_client: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    account_id: String,
    cached: Mutex<Option<AccessToken>>,
}

impl TokenProvider {
    pub fn new(config: &AuthConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Auth(format!("HTTP client creation failed: {}", e)))?;

        Ok(Self {
            http_client,
            token_url: config.token_url.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            account_id: config.account_id.clone(),
            cached: Mutex::new(None),
        })
    }

    /// Get a valid bearer token, refreshing when the cached one is absent
    /// or inside the expiry margin.
    ///
    /// The cache mutex is held across the refresh request, so a caller
    /// arriving during an in-flight refresh awaits that refresh and reads
    /// its result instead of issuing a duplicate.
    pub async fn get_token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref() {
            if token.is_valid() {
                return Ok(token.token.clone());
            }
            tracing::debug!("Cached token inside expiry margin, refreshing");
        }

        let fresh = self.refresh().await?;
        let token = fresh.token.clone();
        *cached = Some(fresh);
        Ok(token)
    }

    async fn refresh(&self) -> Result<AccessToken> {
        let basic = BASE64.encode(format!("{}:{}", self.client_id, self.client_secret));

        let response = self
            .http_client
            .post(&self.token_url)
            .header("Authorization", format!("Basic {}", basic))
            .query(&[
                ("grant_type", "account_credentials"),
                ("account_id", self.account_id.as_str()),
            ])
            .send()
            .await
            .map_err(|e| Error::Auth(format!("Token endpoint unreachable: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Auth(format!(
                "Token endpoint returned {}: {}",
                status, body
            )));
        }

        let parsed: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::Auth(format!("Token response parse failed: {}", e)))?;

        if parsed.access_token.is_empty() {
            return Err(Error::Auth("Token endpoint returned no token".to_string()));
        }

        tracing::debug!(expires_in = parsed.expires_in, "Access token refreshed");

        Ok(AccessToken {
            token: parsed.access_token,
            expires_at: Instant::now() + Duration::from_secs(parsed.expires_in),
        })
    }
}

#[async_trait]
impl TokenSource for TokenProvider {
    async fn get_token(&self) -> Result<String> {
        TokenProvider::get_token(self).await
    }
}
