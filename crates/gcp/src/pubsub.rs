//! Pub/Sub v1 REST client.

use crate::error::{GcpError, GcpResult};
use crate::http::AuthorizedClient;
use crate::traits::MessageBus;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::info;

const PUBSUB_API: &str = "https://pubsub.googleapis.com/v1";
const SERVICE: &str = "Pub/Sub";

#[derive(Clone)]
pub struct PubSubClient {
    http: AuthorizedClient,
    project: String,
    base_url: String,
}

impl PubSubClient {
    pub fn new(http: AuthorizedClient, project: impl Into<String>) -> Self {
        Self {
            http,
            project: project.into(),
            base_url: PUBSUB_API.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn topic_path(&self, topic_id: &str) -> String {
        format!("projects/{}/topics/{}", self.project, topic_id)
    }

    pub fn subscription_path(&self, subscription_id: &str) -> String {
        format!("projects/{}/subscriptions/{}", self.project, subscription_id)
    }
}

#[async_trait]
impl MessageBus for PubSubClient {
    async fn create_topic(&self, topic_id: &str) -> GcpResult<()> {
        let url = format!("{}/{}", self.base_url, self.topic_path(topic_id));
        self.http.send_json(SERVICE, Method::PUT, &url, Some(&json!({}))).await?;
        info!(topic = %self.topic_path(topic_id), "Created topic");
        Ok(())
    }

    async fn create_push_subscription(
        &self,
        subscription_id: &str,
        topic_id: &str,
        push_endpoint: &str,
        oidc_service_account: Option<&str>,
    ) -> GcpResult<()> {
        let mut push_config = json!({ "pushEndpoint": push_endpoint });
        if let Some(account) = oidc_service_account {
            push_config["oidcToken"] = json!({ "serviceAccountEmail": account });
        }
        let body = json!({
            "topic": self.topic_path(topic_id),
            "pushConfig": push_config,
        });
        let url = format!("{}/{}", self.base_url, self.subscription_path(subscription_id));
        self.http.send_json(SERVICE, Method::PUT, &url, Some(&body)).await?;
        info!(subscription = %self.subscription_path(subscription_id), "Created push subscription");
        Ok(())
    }

    async fn publish(&self, topic_id: &str, data: &[u8]) -> GcpResult<String> {
        let url = format!("{}/{}:publish", self.base_url, self.topic_path(topic_id));
        let body = json!({ "messages": [{ "data": BASE64.encode(data) }] });
        let value = self.http.send_json(SERVICE, Method::POST, &url, Some(&body)).await?;
        value
            .get("messageIds")
            .and_then(|ids| ids.get(0))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| GcpError::InvalidResponse("publish returned no message id".to_string()))
    }

    async fn delete_subscription(&self, subscription_id: &str) -> GcpResult<()> {
        let url = format!("{}/{}", self.base_url, self.subscription_path(subscription_id));
        self.http.send_json(SERVICE, Method::DELETE, &url, None).await?;
        Ok(())
    }

    async fn delete_topic(&self, topic_id: &str) -> GcpResult<()> {
        let url = format!("{}/{}", self.base_url, self.topic_path(topic_id));
        self.http.send_json(SERVICE, Method::DELETE, &url, None).await?;
        Ok(())
    }
}
