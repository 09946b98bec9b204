use crate::models::AccountId;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifierError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("Notification service returned {0}")]
    ApiError(reqwest::StatusCode),
}

/// Push-notification device registry, told about logouts
#[async_trait]
pub trait DeviceNotifier: Send + Sync {
    /// Unregister every device of `account_id`
    async fn unregister_devices(&self, account_id: AccountId) -> Result<(), NotifierError>;
}

/// Used when no notification endpoint is configured
pub struct DisabledNotifier;

#[async_trait]
impl DeviceNotifier for DisabledNotifier {
    async fn unregister_devices(&self, _account_id: AccountId) -> Result<(), NotifierError> {
        Ok(())
    }
}

/// Webhook client for the notification service
pub struct HttpDeviceNotifier {
    base_url: String,
    api_key: Option<String>,
    client: Client,
}

impl HttpDeviceNotifier {
    pub fn new(base_url: String, api_key: Option<String>, timeout: Duration) -> Result<Self, NotifierError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            base_url,
            api_key,
            client,
        })
    }
}

#[async_trait]
impl DeviceNotifier for HttpDeviceNotifier {
    async fn unregister_devices(&self, account_id: AccountId) -> Result<(), NotifierError> {
        let url = format!("{}/devices/unregister", self.base_url.trim_end_matches('/'));

        tracing::debug!("Unregistering devices for {} via {}", account_id, url);

        let mut request = self.client.post(&url).json(&json!({ "user_id": account_id }));
        if let Some(key) = &self.api_key {
            request = request.header("X-Api-Key", key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(NotifierError::ApiError(response.status()));
        }

        Ok(())
    }
}

/// Fire-and-forget device unregistration; failures are only logged
pub fn dispatch_unregister(notifier: Arc<dyn DeviceNotifier>, account_id: AccountId) {
    tokio::spawn(async move {
        if let Err(e) = notifier.unregister_devices(account_id).await {
            tracing::warn!(account_id = account_id, "Failed to unregister devices on logout: {}", e);
        }
    });
}
