//! In-process function platform.
//!
//! Mirrors the parts of the AWS behavior the promoter relies on: every
//! publish yields a fresh, increasing version number, every alias update
//! yields a new revision id, and guarded updates fail when the revision has
//! moved. Each role stands for a separate account, so stage and prod keep
//! independent functions. All calls are recorded for inspection.
//!
//! [`InMemoryPlatform::hold_after_publish`] parks every publisher until a
//! given number of publishes happened, which forces concurrent promotions
//! to interleave between publishing and moving the alias.

use crate::error::{DeployError, DeployResult};
use crate::platform::{
    AliasState, CredentialBroker, FunctionControl, FunctionControlFactory, PublishedVersion,
    TemporaryCredentials,
};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Barrier;

/// A call made against the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformCall {
    AssumeRole {
        role_arn: String,
        session_name: String,
    },
    PublishImage {
        role_arn: String,
        function_name: String,
        image_uri: String,
    },
    GetAlias {
        role_arn: String,
        function_name: String,
        alias_name: String,
    },
    UpdateAlias {
        role_arn: String,
        function_name: String,
        alias_name: String,
        version: String,
        expected_revision: Option<String>,
    },
}

/// Operation that can be made to fail once
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailurePoint {
    AssumeRole,
    PublishImage,
    GetAlias,
    UpdateAlias,
}

#[derive(Debug, Default)]
struct FunctionState {
    published: Vec<PublishedVersion>,
    aliases: HashMap<String, AliasState>,
}

#[derive(Debug, Clone)]
struct PendingRepoint {
    role_arn: String,
    function_name: String,
    alias_name: String,
    version: String,
}

#[derive(Debug, Default)]
struct PlatformState {
    functions: HashMap<(String, String), FunctionState>,
    roles: HashSet<String>,
    calls: Vec<PlatformCall>,
    failures: HashSet<FailurePoint>,
    repoint_on_publish: Option<PendingRepoint>,
    publish_barrier: Option<Arc<Barrier>>,
    next_revision: u64,
}

impl PlatformState {
    fn take_failure(&mut self, point: FailurePoint) -> DeployResult<()> {
        if self.failures.remove(&point) {
            return Err(DeployError::platform(point.operation(), "injected failure"));
        }
        Ok(())
    }

    fn revision(&mut self) -> String {
        self.next_revision += 1;
        format!("rev-{}", self.next_revision)
    }

    fn function_mut(
        &mut self,
        role_arn: &str,
        function_name: &str,
        operation: &'static str,
    ) -> DeployResult<&mut FunctionState> {
        self.functions
            .get_mut(&(role_arn.to_string(), function_name.to_string()))
            .ok_or_else(|| {
                DeployError::platform(operation, format!("function {} not found", function_name))
            })
    }

    fn set_alias(
        &mut self,
        role_arn: &str,
        function_name: &str,
        alias_name: &str,
        version: &str,
    ) -> DeployResult<AliasState> {
        let revision_id = self.revision();
        let function = self.function_mut(role_arn, function_name, "UpdateAlias")?;
        let alias = AliasState {
            name: alias_name.to_string(),
            function_version: version.to_string(),
            revision_id: Some(revision_id),
        };
        function.aliases.insert(alias_name.to_string(), alias.clone());
        Ok(alias)
    }
}

impl FailurePoint {
    fn operation(&self) -> &'static str {
        match self {
            FailurePoint::AssumeRole => "AssumeRole",
            FailurePoint::PublishImage => "UpdateFunctionCode",
            FailurePoint::GetAlias => "GetAlias",
            FailurePoint::UpdateAlias => "UpdateAlias",
        }
    }
}

/// Shared in-memory platform; clones observe the same state
#[derive(Debug, Clone, Default)]
pub struct InMemoryPlatform {
    state: Arc<Mutex<PlatformState>>,
}

impl InMemoryPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function in the account behind `role_arn`, with version
    /// `1` published and `alias_name` pointing at it.
    pub fn with_function(self, role_arn: &str, function_name: &str, alias_name: &str) -> Self {
        {
            let mut state = self.lock();
            state.roles.insert(role_arn.to_string());
            let revision_id = state.revision();

            let mut function = FunctionState::default();
            function.published.push(PublishedVersion {
                version: "1".to_string(),
                image_uri: String::new(),
            });
            function.aliases.insert(
                alias_name.to_string(),
                AliasState {
                    name: alias_name.to_string(),
                    function_version: "1".to_string(),
                    revision_id: Some(revision_id),
                },
            );

            state
                .functions
                .insert((role_arn.to_string(), function_name.to_string()), function);
        }
        self
    }

    /// Make the next call of `point` fail.
    pub fn fail_next(&self, point: FailurePoint) {
        self.lock().failures.insert(point);
    }

    /// Have another deployer move the alias right after the next publish.
    pub fn repoint_after_next_publish(
        &self,
        role_arn: &str,
        function_name: &str,
        alias_name: &str,
        version: &str,
    ) {
        self.lock().repoint_on_publish = Some(PendingRepoint {
            role_arn: role_arn.to_string(),
            function_name: function_name.to_string(),
            alias_name: alias_name.to_string(),
            version: version.to_string(),
        });
    }

    /// Block each successful publish until `publishers` publishes have
    /// completed. Stays in effect for every later round of publishes.
    pub fn hold_after_publish(&self, publishers: usize) {
        self.lock().publish_barrier = Some(Arc::new(Barrier::new(publishers)));
    }

    pub fn calls(&self) -> Vec<PlatformCall> {
        self.lock().calls.clone()
    }

    pub fn alias(
        &self,
        role_arn: &str,
        function_name: &str,
        alias_name: &str,
    ) -> Option<AliasState> {
        self.lock()
            .functions
            .get(&(role_arn.to_string(), function_name.to_string()))
            .and_then(|function| function.aliases.get(alias_name).cloned())
    }

    pub fn published_versions(
        &self,
        role_arn: &str,
        function_name: &str,
    ) -> Vec<PublishedVersion> {
        self.lock()
            .functions
            .get(&(role_arn.to_string(), function_name.to_string()))
            .map(|function| function.published.clone())
            .unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, PlatformState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl CredentialBroker for InMemoryPlatform {
    async fn assume_role(
        &self,
        role_arn: &str,
        session_name: &str,
    ) -> DeployResult<TemporaryCredentials> {
        let mut state = self.lock();
        state.calls.push(PlatformCall::AssumeRole {
            role_arn: role_arn.to_string(),
            session_name: session_name.to_string(),
        });
        state.take_failure(FailurePoint::AssumeRole)?;

        if !state.roles.contains(role_arn) {
            return Err(DeployError::platform(
                "AssumeRole",
                format!("role {} cannot be assumed", role_arn),
            ));
        }

        Ok(TemporaryCredentials {
            role_arn: role_arn.to_string(),
            access_key_id: format!("ASIA{}", state.calls.len()),
            secret_access_key: "memory-secret".to_string(),
            session_token: format!("{}-token", session_name),
            expiration: Some(Utc::now() + Duration::hours(1)),
        })
    }

    fn broker_name(&self) -> &'static str {
        "memory"
    }
}

impl FunctionControlFactory for InMemoryPlatform {
    fn connect(&self, credentials: &TemporaryCredentials) -> Box<dyn FunctionControl> {
        Box::new(InMemoryFunctionControl {
            platform: self.clone(),
            role_arn: credentials.role_arn.clone(),
        })
    }
}

/// [`FunctionControl`] bound to one account of an [`InMemoryPlatform`]
pub struct InMemoryFunctionControl {
    platform: InMemoryPlatform,
    role_arn: String,
}

#[async_trait]
impl FunctionControl for InMemoryFunctionControl {
    async fn publish_image(
        &self,
        function_name: &str,
        image_uri: &str,
    ) -> DeployResult<PublishedVersion> {
        let (published, barrier) = {
            let mut state = self.platform.lock();
            state.calls.push(PlatformCall::PublishImage {
                role_arn: self.role_arn.clone(),
                function_name: function_name.to_string(),
                image_uri: image_uri.to_string(),
            });
            state.take_failure(FailurePoint::PublishImage)?;

            let function =
                state.function_mut(&self.role_arn, function_name, "UpdateFunctionCode")?;
            let published = PublishedVersion {
                version: (function.published.len() + 1).to_string(),
                image_uri: image_uri.to_string(),
            };
            function.published.push(published.clone());

            if let Some(pending) = state.repoint_on_publish.take() {
                state.set_alias(
                    &pending.role_arn,
                    &pending.function_name,
                    &pending.alias_name,
                    &pending.version,
                )?;
            }

            (published, state.publish_barrier.clone())
        };

        if let Some(barrier) = barrier {
            barrier.wait().await;
        }

        Ok(published)
    }

    async fn get_alias(&self, function_name: &str, alias_name: &str) -> DeployResult<AliasState> {
        let mut state = self.platform.lock();
        state.calls.push(PlatformCall::GetAlias {
            role_arn: self.role_arn.clone(),
            function_name: function_name.to_string(),
            alias_name: alias_name.to_string(),
        });
        state.take_failure(FailurePoint::GetAlias)?;

        let function = state.function_mut(&self.role_arn, function_name, "GetAlias")?;
        function.aliases.get(alias_name).cloned().ok_or_else(|| {
            DeployError::platform("GetAlias", format!("alias {} not found", alias_name))
        })
    }

    async fn update_alias(
        &self,
        function_name: &str,
        alias_name: &str,
        version: &str,
        expected_revision: Option<&str>,
    ) -> DeployResult<AliasState> {
        let mut state = self.platform.lock();
        state.calls.push(PlatformCall::UpdateAlias {
            role_arn: self.role_arn.clone(),
            function_name: function_name.to_string(),
            alias_name: alias_name.to_string(),
            version: version.to_string(),
            expected_revision: expected_revision.map(str::to_string),
        });
        state.take_failure(FailurePoint::UpdateAlias)?;

        let function = state.function_mut(&self.role_arn, function_name, "UpdateAlias")?;
        if !function.published.iter().any(|p| p.version == version) {
            return Err(DeployError::platform(
                "UpdateAlias",
                format!("version {} does not exist", version),
            ));
        }

        let current = function.aliases.get(alias_name).ok_or_else(|| {
            DeployError::platform("UpdateAlias", format!("alias {} not found", alias_name))
        })?;

        if let Some(expected) = expected_revision {
            if current.revision_id.as_deref() != Some(expected) {
                return Err(DeployError::AliasConflict {
                    alias: alias_name.to_string(),
                    expected_revision: expected.to_string(),
                });
            }
        }

        state.set_alias(&self.role_arn, function_name, alias_name, version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROLE: &str = "arn:aws:iam::1:role/deploy-stage";

    fn platform() -> InMemoryPlatform {
        InMemoryPlatform::new().with_function(ROLE, "inference", "live")
    }

    #[tokio::test]
    async fn test_publish_increments_versions() {
        let platform = platform();
        let credentials = platform.assume_role(ROLE, "s").await.unwrap();
        let control = platform.connect(&credentials);

        let first = control.publish_image("inference", "repo:a").await.unwrap();
        let second = control.publish_image("inference", "repo:a").await.unwrap();

        assert_eq!(first.version, "2");
        assert_eq!(second.version, "3");
        assert_eq!(platform.published_versions(ROLE, "inference").len(), 3);
    }

    #[tokio::test]
    async fn test_unknown_role_is_refused() {
        let platform = platform();
        let result = platform.assume_role("arn:aws:iam::9:role/other", "s").await;
        assert!(matches!(result, Err(DeployError::Platform { .. })));
    }

    #[tokio::test]
    async fn test_guarded_update_detects_moved_alias() {
        let platform = platform();
        let credentials = platform.assume_role(ROLE, "s").await.unwrap();
        let control = platform.connect(&credentials);

        let before = control.get_alias("inference", "live").await.unwrap();
        let published = control.publish_image("inference", "repo:a").await.unwrap();
        control
            .update_alias("inference", "live", &published.version, None)
            .await
            .unwrap();

        let result = control
            .update_alias("inference", "live", "1", before.revision_id.as_deref())
            .await;
        assert!(matches!(result, Err(DeployError::AliasConflict { .. })));
        assert_eq!(
            platform.alias(ROLE, "inference", "live").unwrap().function_version,
            published.version
        );
    }

    #[tokio::test]
    async fn test_update_alias_rejects_unpublished_version() {
        let platform = platform();
        let credentials = platform.assume_role(ROLE, "s").await.unwrap();
        let control = platform.connect(&credentials);

        let result = control.update_alias("inference", "live", "42", None).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_held_publish_waits_for_peers() {
        let lonely = platform();
        lonely.hold_after_publish(2);
        let credentials = lonely.assume_role(ROLE, "s").await.unwrap();
        let alone = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            lonely.connect(&credentials).publish_image("inference", "repo:a"),
        )
        .await;
        assert!(alone.is_err(), "a single publisher stays parked");

        let platform = platform();
        platform.hold_after_publish(2);
        let credentials = platform.assume_role(ROLE, "s").await.unwrap();
        let first = platform.connect(&credentials);
        let second = platform.connect(&credentials);

        let (a, b) = tokio::join!(
            first.publish_image("inference", "repo:b"),
            second.publish_image("inference", "repo:c"),
        );
        assert!(a.is_ok() && b.is_ok());
    }

    #[tokio::test]
    async fn test_injected_failure_fires_once() {
        let platform = platform();
        platform.fail_next(FailurePoint::AssumeRole);

        assert!(platform.assume_role(ROLE, "s").await.is_err());
        assert!(platform.assume_role(ROLE, "s").await.is_ok());
    }
}
