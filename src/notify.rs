// src/notify.rs
//
// Outbound penalty notices. The engine itself stays synchronous; handlers
// fire these after the response is decided, best effort.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::attendance::PenaltyOutcome;

#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("Failed to send notification: {0}")]
    SendError(String),
    #[error("Notification endpoint returned status {0}")]
    EndpointStatus(u16),
}

/// Payload describing one applied penalty, posted to the configured webhook.
#[derive(Debug, Clone, Serialize)]
pub struct PenaltyAlert {
    pub employee_id: String,
    pub employee_name: String,
    pub organization_id: String,
    pub outcome: PenaltyOutcome,
}

#[async_trait]
pub trait PenaltyNotifier: Send + Sync {
    async fn send_penalty_notice(&self, alert: &PenaltyAlert) -> Result<(), NotificationError>;
}

/// Posts penalty notices as JSON to a webhook URL (Slack-compatible payload
/// shape: a text line plus the structured alert).
pub struct WebhookNotifier {
    client: reqwest::Client,
    webhook_url: String,
}

impl WebhookNotifier {
    pub fn new(webhook_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            webhook_url,
        }
    }
}

#[async_trait]
impl PenaltyNotifier for WebhookNotifier {
    async fn send_penalty_notice(&self, alert: &PenaltyAlert) -> Result<(), NotificationError> {
        let payload = serde_json::json!({
            "text": format!(
                "Late-login penalty applied for {} ({})",
                alert.employee_name, alert.employee_id
            ),
            "alert": alert,
        });

        let response = self
            .client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotificationError::SendError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(NotificationError::EndpointStatus(response.status().as_u16()));
        }
        info!(
            "Penalty notice delivered: Emp={}, Org={}",
            alert.employee_id, alert.organization_id
        );
        Ok(())
    }
}
