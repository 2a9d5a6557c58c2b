//! Authorized HTTP transport shared by all service clients.

use crate::auth::TokenSource;
use crate::error::{GcpError, GcpResult};
use reqwest::{Client, Method, Response};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// A `reqwest` client that attaches a bearer token to every request.
#[derive(Clone)]
pub struct AuthorizedClient {
    client: Client,
    tokens: Arc<dyn TokenSource>,
}

impl AuthorizedClient {
    pub fn new(tokens: Arc<dyn TokenSource>) -> GcpResult<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;
        Ok(Self { client, tokens })
    }

    /// Send a request with an optional JSON body and decode the JSON answer.
    ///
    /// An empty success body decodes to `Value::Null`.
    pub async fn send_json(
        &self,
        service: &'static str,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> GcpResult<Value> {
        let token = self.tokens.token().await?;
        let mut request = self
            .client
            .request(method.clone(), url)
            .bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }

        debug!(service, %method, url, "Calling managed service");
        let response = request.send().await?;
        read_json(service, url, response).await
    }

    /// Upload raw bytes and decode the JSON answer.
    pub async fn send_bytes(
        &self,
        service: &'static str,
        url: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> GcpResult<Value> {
        let token = self.tokens.token().await?;
        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;
        read_json(service, url, response).await
    }
}

async fn read_json(service: &'static str, url: &str, response: Response) -> GcpResult<Value> {
    let status = response.status();
    let text = response.text().await?;

    if status.is_success() {
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        return serde_json::from_str(&text).map_err(|e| {
            GcpError::InvalidResponse(format!("{} returned non-JSON body: {}", service, e))
        });
    }

    let message = error_message(&text);
    match status.as_u16() {
        409 => Err(GcpError::Conflict(message)),
        404 => Err(GcpError::NotFound(message)),
        code => {
            warn!(service, url, status = code, "Managed service call failed");
            Err(GcpError::Api {
                service,
                status: code,
                message,
            })
        }
    }
}

/// Pull `error.message` out of a Google API error body, or fall back to the raw text.
pub(crate) fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}
