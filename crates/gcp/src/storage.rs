//! Cloud Storage JSON API uploads.

use crate::error::GcpResult;
use crate::http::AuthorizedClient;
use crate::traits::ObjectStore;
use async_trait::async_trait;
use tracing::info;

const STORAGE_API: &str = "https://storage.googleapis.com";
const SERVICE: &str = "Cloud Storage";

#[derive(Clone)]
pub struct StorageClient {
    http: AuthorizedClient,
    base_url: String,
}

impl StorageClient {
    pub fn new(http: AuthorizedClient) -> Self {
        Self {
            http,
            base_url: STORAGE_API.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn upload_url(&self, bucket: &str, name: &str) -> String {
        format!(
            "{}/upload/storage/v1/b/{}/o?uploadType=media&name={}",
            self.base_url,
            urlencoding::encode(bucket),
            urlencoding::encode(name)
        )
    }
}

#[async_trait]
impl ObjectStore for StorageClient {
    async fn upload(
        &self,
        bucket: &str,
        name: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> GcpResult<String> {
        let size = data.len();
        self.http
            .send_bytes(SERVICE, &self.upload_url(bucket, name), data, content_type)
            .await?;
        let uri = format!("gs://{}/{}", bucket, name);
        info!(%uri, bytes = size, "Uploaded object");
        Ok(uri)
    }
}
