//! Outbound completion callbacks.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::config::CallbackConfig;

/// Name of the form field carrying the JSON payload.
pub const CALLBACK_FIELD: &str = "data";

#[derive(Debug, Error)]
pub enum CallbackError {
    #[error("Callback request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Callback endpoint returned status {status}")]
    Status { status: u16 },

    #[error("Failed to encode callback payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Delivers job and task results to caller-supplied URLs.
#[async_trait]
pub trait CallbackNotifier: Send + Sync {
    async fn notify(&self, url: &str, payload: &Value) -> Result<(), CallbackError>;
}

/// Posts `data=<json>` as a url-encoded form.
pub struct HttpCallbackNotifier {
    client: reqwest::Client,
}

impl HttpCallbackNotifier {
    pub fn new(config: &CallbackConfig) -> Result<Self, CallbackError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl CallbackNotifier for HttpCallbackNotifier {
    async fn notify(&self, url: &str, payload: &Value) -> Result<(), CallbackError> {
        let data = serde_json::to_string(payload)?;
        let response = self
            .client
            .post(url)
            .form(&[(CALLBACK_FIELD, data.as_str())])
            .send()
            .await?;

        let status = response.status();
        debug!(url = %url, status = %status, "Callback delivered");
        if !status.is_success() {
            return Err(CallbackError::Status {
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}
