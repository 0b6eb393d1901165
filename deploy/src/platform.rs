//! Control-plane seams used by the promoter.
//!
//! A promotion talks to two services: one that hands out temporary
//! credentials for an environment's role, and the function platform that
//! publishes versions and moves aliases. Both sit behind traits so the
//! promoter can run against AWS or against [`crate::memory::InMemoryPlatform`].

use crate::error::DeployResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Short-lived credentials obtained by assuming a role
#[derive(Clone, Serialize, Deserialize)]
pub struct TemporaryCredentials {
    pub role_arn: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub expiration: Option<DateTime<Utc>>,
}

// Keeps secrets out of logs.
impl fmt::Debug for TemporaryCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemporaryCredentials")
            .field("role_arn", &self.role_arn)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &"<redacted>")
            .field("expiration", &self.expiration)
            .finish()
    }
}

/// A new immutable function version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedVersion {
    pub version: String,
    pub image_uri: String,
}

/// An alias as the platform reports it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasState {
    pub name: String,
    pub function_version: String,
    /// Changes on every update; used as the compare value for guarded updates
    pub revision_id: Option<String>,
}

/// Issues temporary credentials for a role
#[async_trait]
pub trait CredentialBroker: Send + Sync {
    async fn assume_role(
        &self,
        role_arn: &str,
        session_name: &str,
    ) -> DeployResult<TemporaryCredentials>;

    fn broker_name(&self) -> &'static str;
}

/// Function operations performed with an environment's credentials
#[async_trait]
pub trait FunctionControl: Send + Sync {
    /// Point the function at `image_uri` and publish a new version.
    async fn publish_image(
        &self,
        function_name: &str,
        image_uri: &str,
    ) -> DeployResult<PublishedVersion>;

    async fn get_alias(&self, function_name: &str, alias_name: &str) -> DeployResult<AliasState>;

    /// Repoint `alias_name` at `version`.
    ///
    /// With `expected_revision` set, the update must fail with
    /// [`crate::DeployError::AliasConflict`] if the alias revision differs.
    async fn update_alias(
        &self,
        function_name: &str,
        alias_name: &str,
        version: &str,
        expected_revision: Option<&str>,
    ) -> DeployResult<AliasState>;
}

/// Builds a [`FunctionControl`] bound to a set of temporary credentials
pub trait FunctionControlFactory: Send + Sync {
    fn connect(&self, credentials: &TemporaryCredentials) -> Box<dyn FunctionControl>;
}
