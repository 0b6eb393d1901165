//! Deployment environments.

use crate::error::DeployError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Target environment of a promotion.
///
/// Only the two values the release workflow emits are accepted; parsing
/// anything else fails rather than silently doing nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Pre-production account, promoted automatically from CI
    Stage,
    /// Production account, promoted after a human approval
    Prod,
}

impl Environment {
    pub const ALL: [Environment; 2] = [Environment::Stage, Environment::Prod];

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Stage => "stage",
            Environment::Prod => "prod",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = DeployError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "stage" => Ok(Environment::Stage),
            "prod" => Ok(Environment::Prod),
            other => Err(DeployError::UnknownEnvironment {
                value: other.to_string(),
            }),
        }
    }
}
