use crate::promoter::PromotionStage;
use thiserror::Error;

/// Errors that can occur while promoting a model image
#[derive(Error, Debug)]
pub enum DeployError {
    /// Environment value outside `stage` / `prod`
    #[error("Unknown environment: {value:?} (expected \"stage\" or \"prod\")")]
    UnknownEnvironment { value: String },

    /// Model version cannot be used as an image tag
    #[error("Invalid model version: {reason}")]
    InvalidModelVersion { reason: String },

    /// Missing or malformed configuration
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// A control-plane call failed
    #[error("{operation} failed: {message}")]
    Platform {
        operation: &'static str,
        message: String,
    },

    /// The control plane answered without a field the promotion needs
    #[error("{operation} returned no {field}")]
    MissingField {
        operation: &'static str,
        field: &'static str,
    },

    /// The alias moved between reading it and repointing it
    #[error("Alias {alias} was changed concurrently (expected revision {expected_revision})")]
    AliasConflict {
        alias: String,
        expected_revision: String,
    },

    /// A version was published but the alias still points elsewhere
    #[error("Version {published_version} was published but alias update failed: {source}")]
    AliasLagging {
        published_version: String,
        #[source]
        source: Box<DeployError>,
    },

    /// The alias reports a different version than the one just published
    #[error("Alias points at version {actual}, expected {expected}")]
    AliasMismatch { expected: String, actual: String },
}

impl DeployError {
    pub fn platform(operation: &'static str, message: impl Into<String>) -> Self {
        DeployError::Platform {
            operation,
            message: message.into(),
        }
    }

    /// How far a failed promotion got. `None` means nothing was published.
    pub fn stage_reached(&self) -> Option<PromotionStage> {
        match self {
            DeployError::AliasLagging { .. } | DeployError::AliasMismatch { .. } => {
                Some(PromotionStage::PublishedUnaliased)
            }
            _ => None,
        }
    }
}

pub type DeployResult<T> = Result<T, DeployError>;
