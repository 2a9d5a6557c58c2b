//! Access tokens for Google Cloud APIs.
//!
//! On Cloud Run the compute metadata server hands out tokens for the
//! service's identity. Locally, `GOOGLE_OAUTH_ACCESS_TOKEN` (for example the
//! output of `gcloud auth print-access-token`) is used verbatim.

use crate::error::{GcpError, GcpResult};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

pub const ACCESS_TOKEN_ENV: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";

const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Refresh this long before the reported expiry.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Something that can produce a bearer token.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn token(&self) -> GcpResult<String>;
}

/// A fixed token.
pub struct StaticTokenSource {
    token: String,
}

impl StaticTokenSource {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn token(&self) -> GcpResult<String> {
        Ok(self.token.clone())
    }
}

#[derive(Debug, Deserialize)]
struct MetadataToken {
    access_token: String,
    expires_in: u64,
}

#[derive(Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

impl std::fmt::Debug for CachedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedToken")
            .field("access_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Tokens from the compute metadata server, cached until shortly before expiry.
pub struct MetadataTokenSource {
    client: reqwest::Client,
    endpoint: String,
    cached: RwLock<Option<CachedToken>>,
}

impl MetadataTokenSource {
    pub fn new() -> Self {
        Self::with_endpoint(METADATA_TOKEN_URL)
    }

    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            cached: RwLock::new(None),
        }
    }

    async fn fetch(&self) -> GcpResult<CachedToken> {
        let response = self
            .client
            .get(&self.endpoint)
            .header("Metadata-Flavor", "Google")
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| GcpError::Auth(format!("metadata server unreachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(GcpError::Auth(format!(
                "metadata server returned {}",
                response.status()
            )));
        }

        let token: MetadataToken = response
            .json()
            .await
            .map_err(|e| GcpError::Auth(format!("malformed metadata token: {}", e)))?;

        debug!(expires_in = token.expires_in, "Fetched access token from metadata server");
        Ok(CachedToken {
            access_token: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        })
    }
}

impl Default for MetadataTokenSource {
    fn default() -> Self {
        Self::new()
    }
}

fn still_fresh(token: &CachedToken, now: Instant) -> bool {
    token.expires_at > now + REFRESH_MARGIN
}

#[async_trait]
impl TokenSource for MetadataTokenSource {
    async fn token(&self) -> GcpResult<String> {
        if let Some(token) = self.cached.read().await.as_ref() {
            if still_fresh(token, Instant::now()) {
                return Ok(token.access_token.clone());
            }
        }

        let mut guard = self.cached.write().await;
        if let Some(token) = guard.as_ref() {
            if still_fresh(token, Instant::now()) {
                return Ok(token.access_token.clone());
            }
        }
        let fresh = self.fetch().await?;
        let access_token = fresh.access_token.clone();
        *guard = Some(fresh);
        Ok(access_token)
    }
}

/// `GOOGLE_OAUTH_ACCESS_TOKEN` when set, otherwise the metadata server.
pub fn default_token_source() -> Arc<dyn TokenSource> {
    match std::env::var(ACCESS_TOKEN_ENV) {
        Ok(token) if !token.trim().is_empty() => {
            Arc::new(StaticTokenSource::new(token.trim().to_string()))
        }
        _ => Arc::new(MetadataTokenSource::new()),
    }
}
