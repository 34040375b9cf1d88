//! Callback notifier that records instead of posting.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::callback::{CallbackError, CallbackNotifier};

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCallback {
    pub url: String,
    pub payload: Value,
}

#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    calls: Arc<RwLock<Vec<RecordedCallback>>>,
    failing: Arc<RwLock<bool>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn calls(&self) -> Vec<RecordedCallback> {
        self.calls.read().await.clone()
    }

    /// Makes every later delivery report a non-success status.
    pub async fn set_failing(&self, failing: bool) {
        *self.failing.write().await = failing;
    }
}

#[async_trait]
impl CallbackNotifier for RecordingNotifier {
    async fn notify(&self, url: &str, payload: &Value) -> Result<(), CallbackError> {
        self.calls.write().await.push(RecordedCallback {
            url: url.to_string(),
            payload: payload.clone(),
        });
        if *self.failing.read().await {
            return Err(CallbackError::Status { status: 500 });
        }
        Ok(())
    }
}
