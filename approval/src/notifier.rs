use crate::config::ApprovalConfig;
use crate::error::{ApprovalError, ApprovalResult};
use crate::message::ApprovalMessage;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// What the webhook answered. A non-2xx status is not an error: the caller
/// decides whether an undelivered notification matters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryReport {
    pub status: u16,
    pub message: ApprovalMessage,
}

impl DeliveryReport {
    pub fn is_delivered(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

pub struct SlackNotifier {
    client: reqwest::Client,
    config: ApprovalConfig,
    base_url: String,
}

impl SlackNotifier {
    pub fn new(config: ApprovalConfig) -> ApprovalResult<Self> {
        config
            .validate()
            .map_err(|message| ApprovalError::InvalidConfig { message })?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ApprovalError::InvalidConfig {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        let base_url = config.normalized_base_url();

        Ok(Self {
            client,
            config,
            base_url,
        })
    }

    pub fn from_env() -> ApprovalResult<Self> {
        Self::new(ApprovalConfig::from_env()?)
    }

    pub fn config(&self) -> &ApprovalConfig {
        &self.config
    }

    pub fn build_message(&self, token: &str) -> ApprovalResult<ApprovalMessage> {
        ApprovalMessage::new(&self.config.feature_name, &self.base_url, token)
    }

    /// Sends one approval notification for `token`.
    ///
    /// Every call posts again, so re-delivery of the same workflow event
    /// produces a duplicate message with identical links.
    pub async fn notify(&self, token: &str) -> ApprovalResult<DeliveryReport> {
        let message = self.build_message(token)?;
        let payload = serde_json::to_vec(&message.to_slack())?;

        debug!(
            "Posting approval request for {} ({}) to webhook",
            self.config.feature_name, self.config.region
        );

        let response = self
            .client
            .post(&self.config.webhook_url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            info!("Approval request sent for {}", self.config.feature_name);
        } else {
            let body = response.text().await.unwrap_or_default();
            warn!("Webhook answered {} for approval request: {}", status, body);
        }

        Ok(DeliveryReport {
            status: status.as_u16(),
            message,
        })
    }
}
