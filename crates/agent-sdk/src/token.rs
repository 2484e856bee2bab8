//! Access-token acquisition and caching.
//!
//! The long-lived refresh credential is exchanged for a short-lived access
//! token that authenticates the streaming connection.  A token is reused
//! until `ttl - safety_margin` has elapsed since it was acquired.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use al_domain::config::TokenConfig;
use al_domain::error::{Error, Result};
use al_protocol::ApiEndpoint;
use parking_lot::Mutex;
use reqwest::StatusCode;
use tokio::time::Instant;

/// Exchanges a refresh credential for an access token.
#[async_trait::async_trait]
pub trait CredentialService: Send + Sync + 'static {
    async fn exchange(&self, refresh_token: &str) -> Result<String>;
}

/// `POST {origin}/user/auth/tokens` over reqwest (rustls, verified).
pub struct HttpCredentialService {
    client: reqwest::Client,
    url: String,
}

impl HttpCredentialService {
    pub fn new(endpoint: &ApiEndpoint, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Network(format!("building HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: endpoint.token_url(),
        })
    }
}

#[async_trait::async_trait]
impl CredentialService for HttpCredentialService {
    async fn exchange(&self, refresh_token: &str) -> Result<String> {
        let resp = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .await
            .map_err(|e| Error::Network(format!("token request failed: {e}")))?;

        let status = resp.status();
        if status != StatusCode::OK {
            return Err(Error::Protocol(format!("token endpoint returned {status}")));
        }
        let expected = match resp.content_length() {
            Some(n) if n > 0 => n,
            _ => {
                return Err(Error::Protocol(
                    "token response has no usable Content-Length".into(),
                ))
            }
        };

        let body = resp
            .bytes()
            .await
            .map_err(|e| Error::Network(format!("reading token response: {e}")))?;
        if (body.len() as u64) < expected {
            return Err(Error::Network(format!(
                "short read: {} of {expected} bytes",
                body.len()
            )));
        }

        let json: serde_json::Value = serde_json::from_slice(&body)
            .map_err(|e| Error::Protocol(format!("token response is not JSON: {e}")))?;
        match json.get("access_token").and_then(serde_json::Value::as_str) {
            Some(token) if !token.is_empty() => Ok(token.to_owned()),
            _ => Err(Error::Protocol(
                "token response has no string access_token".into(),
            )),
        }
    }
}

/// A cached access token and when it was acquired.
#[derive(Clone)]
pub struct AccessToken {
    value: String,
    acquired_at: Instant,
}

impl AccessToken {
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn acquired_at(&self) -> Instant {
        self.acquired_at
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("len", &self.value.len())
            .field("acquired_at", &self.acquired_at)
            .finish()
    }
}

pub struct TokenManager {
    service: Arc<dyn CredentialService>,
    ttl: Duration,
    safety_margin: Duration,
    cached: Mutex<Option<AccessToken>>,
}

impl TokenManager {
    pub fn new(service: Arc<dyn CredentialService>, config: &TokenConfig) -> Self {
        Self {
            service,
            ttl: config.ttl(),
            safety_margin: config.safety_margin(),
            cached: Mutex::new(None),
        }
    }

    /// Return the cached token while it is fresh, otherwise exchange
    /// `refresh_token` for a new one.
    ///
    /// The cache is cleared before the exchange, so a failed exchange
    /// leaves no token behind.
    pub async fn ensure_access_token(&self, refresh_token: &str) -> Result<String> {
        if let Some(token) = self.fresh() {
            return Ok(token);
        }

        self.cached.lock().take();
        tracing::info!("requesting access token");
        let value = match self.service.exchange(refresh_token).await {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(error = %e, "access token request failed");
                return Err(e);
            }
        };
        tracing::info!(token_len = value.len(), "access token acquired");

        *self.cached.lock() = Some(AccessToken {
            value: value.clone(),
            acquired_at: Instant::now(),
        });
        Ok(value)
    }

    /// Forget the cached token.
    pub fn invalidate(&self) {
        if self.cached.lock().take().is_some() {
            tracing::debug!("cached access token invalidated");
        }
    }

    pub fn cached(&self) -> Option<AccessToken> {
        self.cached.lock().clone()
    }

    fn fresh(&self) -> Option<String> {
        let guard = self.cached.lock();
        let token = guard.as_ref()?;
        let lifetime = self.ttl.saturating_sub(self.safety_margin);
        let age = token.acquired_at.elapsed();
        if age >= lifetime {
            tracing::debug!(age_secs = age.as_secs(), "cached access token expired");
            return None;
        }
        tracing::debug!(
            remaining_secs = (lifetime - age).as_secs(),
            "reusing cached access token"
        );
        Some(token.value.clone())
    }
}
