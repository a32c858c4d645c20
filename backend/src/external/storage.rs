//! Object storage client for attachments and signature images
//!
//! Talks to an S3-style HTTP object API:
//! `{endpoint}/object/{bucket}/{key}` for private objects and
//! `{endpoint}/object/public/{bucket}/{key}` for public reads.

use reqwest::{header, Client};

use crate::config::StorageConfig;
use crate::error::{AppError, AppResult};

/// Object storage API client
#[derive(Clone)]
pub struct StorageClient {
    client: Client,
    endpoint: String,
    bucket: String,
    api_key: String,
}

impl StorageClient {
    /// Create a new StorageClient
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            client: Client::new(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            bucket: config.bucket.clone(),
            api_key: config.api_key.clone(),
        }
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/object/{}/{}", self.endpoint, self.bucket, key)
    }

    /// Public URL for an object
    pub fn public_url(&self, key: &str) -> String {
        format!("{}/object/public/{}/{}", self.endpoint, self.bucket, key)
    }

    /// Upload an object, replacing any existing object under `key`
    pub async fn upload(&self, key: &str, content_type: &str, bytes: Vec<u8>) -> AppResult<()> {
        let size = bytes.len();
        let response = self
            .client
            .post(self.object_url(key))
            .bearer_auth(&self.api_key)
            .header(header::CONTENT_TYPE, content_type)
            .header("x-upsert", "true")
            .body(bytes)
            .send()
            .await
            .map_err(|e| AppError::StorageError(format!("Upload request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::StorageError(format!(
                "Upload rejected: {} - {}",
                status, body
            )));
        }

        tracing::debug!(key = %key, size, "Object uploaded");
        Ok(())
    }

    /// Delete an object. A missing object is not an error.
    pub async fn delete(&self, key: &str) -> AppResult<()> {
        let response = self
            .client
            .delete(self.object_url(key))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| AppError::StorageError(format!("Delete request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() && status != reqwest::StatusCode::NOT_FOUND {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::StorageError(format!(
                "Delete rejected: {} - {}",
                status, body
            )));
        }

        tracing::debug!(key = %key, "Object deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> StorageClient {
        StorageClient::new(&StorageConfig {
            endpoint: "https://storage.example.com/".to_string(),
            bucket: "fleet".to_string(),
            api_key: "key".to_string(),
            max_upload_bytes: 1024,
        })
    }

    #[test]
    fn test_urls() {
        let c = client();
        assert_eq!(
            c.object_url("vehicle/1/a.pdf"),
            "https://storage.example.com/object/fleet/vehicle/1/a.pdf"
        );
        assert_eq!(
            c.public_url("vehicle/1/a.pdf"),
            "https://storage.example.com/object/public/fleet/vehicle/1/a.pdf"
        );
    }
}
