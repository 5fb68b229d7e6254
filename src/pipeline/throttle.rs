//! Rate limiting between uploads.

use async_trait::async_trait;
use std::time::Duration;

/// Called after every successful upload before the next image is processed.
#[async_trait]
pub trait UploadThrottle: Send + Sync {
    async fn after_upload(&self);
}

/// Sleep a fixed interval after each upload. A zero interval never yields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedDelay(pub Duration);

impl FixedDelay {
    pub fn from_millis(ms: u64) -> Self {
        Self(Duration::from_millis(ms))
    }
}

#[async_trait]
impl UploadThrottle for FixedDelay {
    async fn after_upload(&self) {
        if !self.0.is_zero() {
            tokio::time::sleep(self.0).await;
        }
    }
}
