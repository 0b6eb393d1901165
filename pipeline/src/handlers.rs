//! Workflow-facing handlers.
//!
//! Both handlers answer `{"Response": 200}` once their step ran, whatever
//! the downstream service said about it; the real outcome is logged and a
//! failure to reach the service at all is returned as an error so the
//! invoking platform marks the invocation failed.

use approval::{ApprovalError, SlackNotifier};
use deploy::{DeployError, Promoter};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

/// Event sent by the workflow when it pauses for a decision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalEvent {
    pub token: String,
}

/// Event sent by CI (stage) or the approved workflow (prod)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployEvent {
    pub env: String,
    /// Model version; also the image tag
    pub commit: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct HandlerResponse {
    #[serde(rename = "Response")]
    pub response: u16,
}

impl HandlerResponse {
    pub const OK: HandlerResponse = HandlerResponse { response: 200 };
}

#[derive(Error, Debug)]
pub enum HandlerError {
    #[error(transparent)]
    Approval(#[from] ApprovalError),

    #[error(transparent)]
    Deploy(#[from] DeployError),
}

pub type HandlerResult = Result<HandlerResponse, HandlerError>;

pub async fn handle_approval(notifier: &SlackNotifier, event: ApprovalEvent) -> HandlerResult {
    let report = notifier.notify(&event.token).await?;

    if !report.is_delivered() {
        warn!(
            "Approval request for {} was not accepted by the webhook (status {})",
            notifier.config().feature_name,
            report.status
        );
    }

    Ok(HandlerResponse::OK)
}

pub async fn handle_deploy(promoter: &Promoter, event: DeployEvent) -> HandlerResult {
    let report = promoter
        .promote_str(&event.env, &event.commit)
        .await
        .inspect_err(|e| {
            if let Some(stage) = e.stage_reached() {
                warn!(
                    "Promotion of {} to {} stopped {}",
                    event.commit, event.env, stage
                );
            }
        })?;

    info!(
        "{} now serves {} as version {}",
        report.environment, report.image_uri, report.published_version
    );

    Ok(HandlerResponse::OK)
}
