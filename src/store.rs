//! Blob storage for migrated images.
//!
//! The pipeline depends on [`BlobStore`] only. [`GcsBlobStore`] backs it with
//! a Google Cloud Storage (Firebase Storage) bucket: every object is uploaded,
//! made world-readable and addressed by its public URL.

use crate::error::{ImageError, MigrateError};
use async_trait::async_trait;
use gcs_store::{Credentials, StorageClient};
use tracing::{debug, info};

/// Destination for migrated images.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Prepare the store (authenticate, check reachability). Called once per
    /// run before any job; a failure aborts the run.
    async fn init(&self) -> Result<(), MigrateError>;

    /// Store `bytes` at `remote_path` and return a publicly reachable URL.
    async fn upload(
        &self,
        bytes: Vec<u8>,
        remote_path: &str,
        content_type: &str,
    ) -> Result<String, ImageError>;
}

/// [`BlobStore`] over a GCS bucket.
#[derive(Debug)]
pub struct GcsBlobStore {
    client: StorageClient,
}

impl GcsBlobStore {
    pub fn new(client: StorageClient) -> Self {
        Self { client }
    }

    /// Build a store for `bucket`, optionally against a non-default endpoint.
    pub fn connect(
        bucket: impl Into<String>,
        credentials: Credentials,
        endpoint: Option<&str>,
    ) -> Result<Self, MigrateError> {
        let init_err = |e: gcs_store::GcsError| MigrateError::StoreInit {
            detail: e.to_string(),
        };
        let mut client = StorageClient::new(bucket, credentials).map_err(init_err)?;
        if let Some(endpoint) = endpoint {
            client = client.with_endpoint(endpoint).map_err(init_err)?;
        }
        Ok(Self::new(client))
    }

    pub fn client(&self) -> &StorageClient {
        &self.client
    }
}

#[async_trait]
impl BlobStore for GcsBlobStore {
    async fn init(&self) -> Result<(), MigrateError> {
        self.client
            .authenticate()
            .await
            .map_err(|e| MigrateError::StoreInit {
                detail: e.to_string(),
            })?;
        info!(
            "Storage ready: bucket '{}' at {}",
            self.client.bucket(),
            self.client.endpoint()
        );
        Ok(())
    }

    async fn upload(
        &self,
        bytes: Vec<u8>,
        remote_path: &str,
        content_type: &str,
    ) -> Result<String, ImageError> {
        let upload_err = |e: gcs_store::GcsError| ImageError::UploadFailed {
            remote_path: remote_path.to_string(),
            detail: e.to_string(),
        };

        self.client
            .upload_object(remote_path, bytes, content_type)
            .await
            .map_err(upload_err)?;
        self.client.make_public(remote_path).await.map_err(upload_err)?;

        let url = self.client.public_url(remote_path);
        debug!("Published {}", url);
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_store(endpoint: Option<&str>) -> GcsBlobStore {
        GcsBlobStore::connect(
            "exam-assets",
            Credentials::AccessToken("test-token".into()),
            endpoint,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn access_token_credentials_init_without_network() {
        let store = token_store(None);
        store.init().await.unwrap();
        assert_eq!(
            store.client().public_url("migrated_images/p_a.png"),
            "https://storage.googleapis.com/exam-assets/migrated_images/p_a.png"
        );
    }

    #[test]
    fn empty_bucket_is_store_init_error() {
        let err = GcsBlobStore::connect("", Credentials::AccessToken("t".into()), None)
            .unwrap_err();
        assert!(matches!(err, MigrateError::StoreInit { .. }));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_upload_failure() {
        let store = token_store(Some("127.0.0.1:9"));
        let err = store
            .upload(b"png".to_vec(), "migrated_images/a.png", "image/png")
            .await
            .unwrap_err();
        match err {
            ImageError::UploadFailed { remote_path, .. } => {
                assert_eq!(remote_path, "migrated_images/a.png")
            }
            other => panic!("expected UploadFailed, got {other:?}"),
        }
    }
}
