//! Promotion of a packaged model image to an environment.
//!
//! A promotion moves through two observable states: the new version is
//! first published while the alias still serves the previous one
//! (`PublishedUnaliased`), then the alias is repointed (`Aliased`). Nothing
//! is persisted in between; if the alias update fails the error carries the
//! published version so an operator can finish or abandon it.

use crate::aws::{load_sdk_config, LambdaFactory, StsBroker};
use crate::config::DeployConfig;
use crate::environment::Environment;
use crate::error::{DeployError, DeployResult};
use crate::platform::{AliasState, CredentialBroker, FunctionControlFactory};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

/// Longest tag a container registry accepts
const MAX_TAG_LEN: usize = 128;

/// Where a promotion stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromotionStage {
    /// New version exists, alias still on the previous one
    PublishedUnaliased,
    /// Alias serves the new version
    Aliased,
}

impl fmt::Display for PromotionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromotionStage::PublishedUnaliased => write!(f, "published-unaliased"),
            PromotionStage::Aliased => write!(f, "aliased"),
        }
    }
}

/// Outcome of a successful promotion; the alias serves `published_version`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromotionReport {
    pub environment: Environment,
    pub model_version: String,
    pub image_uri: String,
    pub role_arn: String,
    pub published_version: String,
    /// Version the alias served before, when it was read
    pub previous_version: Option<String>,
    pub alias_revision: Option<String>,
    pub promoted_at: DateTime<Utc>,
}

/// Publishes model images and repoints the live alias
pub struct Promoter {
    config: DeployConfig,
    broker: Box<dyn CredentialBroker>,
    factory: Box<dyn FunctionControlFactory>,
}

impl Promoter {
    pub fn new(
        config: DeployConfig,
        broker: Box<dyn CredentialBroker>,
        factory: Box<dyn FunctionControlFactory>,
    ) -> DeployResult<Self> {
        config
            .validate()
            .map_err(|message| DeployError::InvalidConfig { message })?;

        Ok(Self {
            config,
            broker,
            factory,
        })
    }

    /// Promoter backed by AWS STS and Lambda, configured from the environment
    pub async fn from_env() -> DeployResult<Self> {
        let config = DeployConfig::from_env()?;
        let sdk_config = load_sdk_config().await;

        Self::new(
            config,
            Box::new(StsBroker::new(&sdk_config)),
            Box::new(LambdaFactory::new(&sdk_config)),
        )
    }

    pub fn config(&self) -> &DeployConfig {
        &self.config
    }

    /// Parse `environment` and promote. Unknown environments are rejected
    /// before any credentials are requested.
    pub async fn promote_str(
        &self,
        environment: &str,
        model_version: &str,
    ) -> DeployResult<PromotionReport> {
        let environment: Environment = environment.parse().inspect_err(|e| {
            warn!("Refusing promotion: {}", e);
        })?;
        self.promote(environment, model_version).await
    }

    pub async fn promote(
        &self,
        environment: Environment,
        model_version: &str,
    ) -> DeployResult<PromotionReport> {
        validate_model_version(model_version)?;

        let role_arn = self.config.role_for(environment);
        let image_uri = self.config.image_uri(model_version);
        let function_name = &self.config.function_name;
        let alias_name = &self.config.alias_name;

        info!(
            "Promoting {} to {} using {} (broker: {})",
            image_uri,
            environment,
            role_arn,
            self.broker.broker_name()
        );

        let credentials = self
            .broker
            .assume_role(role_arn, &self.config.session_name)
            .await?;
        let control = self.factory.connect(&credentials);

        let previous: Option<AliasState> = if self.config.guard_alias {
            Some(control.get_alias(function_name, alias_name).await?)
        } else {
            None
        };

        let published = control.publish_image(function_name, &image_uri).await?;
        debug!(
            "{} version {} is {}",
            function_name,
            published.version,
            PromotionStage::PublishedUnaliased
        );

        let expected_revision = previous.as_ref().and_then(|a| a.revision_id.as_deref());
        let alias = control
            .update_alias(function_name, alias_name, &published.version, expected_revision)
            .await
            .map_err(|source| {
                warn!(
                    "Alias {} still lags published version {}: {}",
                    alias_name, published.version, source
                );
                DeployError::AliasLagging {
                    published_version: published.version.clone(),
                    source: Box::new(source),
                }
            })?;

        if alias.function_version != published.version {
            return Err(DeployError::AliasMismatch {
                expected: published.version,
                actual: alias.function_version,
            });
        }

        info!(
            "{} version {} is {}: alias {} serves it in {}",
            function_name,
            published.version,
            PromotionStage::Aliased,
            alias_name,
            environment
        );

        Ok(PromotionReport {
            environment,
            model_version: model_version.to_string(),
            image_uri,
            role_arn: role_arn.to_string(),
            published_version: published.version,
            previous_version: previous.map(|a| a.function_version),
            alias_revision: alias.revision_id,
            promoted_at: Utc::now(),
        })
    }
}

/// Model versions become image tags, so they follow the registry's tag grammar.
fn validate_model_version(model_version: &str) -> DeployResult<()> {
    let invalid = |reason: String| Err(DeployError::InvalidModelVersion { reason });

    let Some(first) = model_version.chars().next() else {
        return invalid("model version cannot be empty".to_string());
    };

    if model_version.len() > MAX_TAG_LEN {
        return invalid(format!("longer than {} characters", MAX_TAG_LEN));
    }

    if first == '.' || first == '-' {
        return invalid(format!("{:?} cannot start with '{}'", model_version, first));
    }

    if let Some(bad) = model_version
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')))
    {
        return invalid(format!("{:?} contains {:?}", model_version, bad));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{FailurePoint, InMemoryPlatform, PlatformCall};

    const REPO: &str = "123456789012.dkr.ecr.us-east-1.amazonaws.com/delivery-time";
    const STAGE_ROLE: &str = "arn:aws:iam::111111111111:role/deploy-stage";
    const PROD_ROLE: &str = "arn:aws:iam::222222222222:role/deploy-prod";

    fn setup(guard: bool) -> (InMemoryPlatform, Promoter) {
        let platform = InMemoryPlatform::new()
            .with_function(STAGE_ROLE, "inference", "live")
            .with_function(PROD_ROLE, "inference", "live");
        let config = DeployConfig::new(REPO, "inference", "live", STAGE_ROLE, PROD_ROLE)
            .with_alias_guard(guard);
        let promoter = Promoter::new(
            config,
            Box::new(platform.clone()),
            Box::new(platform.clone()),
        )
        .unwrap();
        (platform, promoter)
    }

    #[test]
    fn test_model_version_validation() {
        assert!(validate_model_version("a1b2c3").is_ok());
        assert!(validate_model_version("v1.2.3-rc_1").is_ok());
        assert!(validate_model_version("").is_err());
        assert!(validate_model_version("-a").is_err());
        assert!(validate_model_version(".a").is_err());
        assert!(validate_model_version("a:b").is_err());
        assert!(validate_model_version("a/b").is_err());
        assert!(validate_model_version(&"a".repeat(129)).is_err());
        assert!(validate_model_version(&"a".repeat(128)).is_ok());
    }

    #[test]
    fn test_promoter_rejects_invalid_config() {
        let platform = InMemoryPlatform::new();
        let config = DeployConfig::new("", "inference", "live", STAGE_ROLE, PROD_ROLE);
        let result = Promoter::new(config, Box::new(platform.clone()), Box::new(platform));
        assert!(matches!(result, Err(DeployError::InvalidConfig { .. })));
    }

    #[tokio::test]
    async fn test_stage_promotion() {
        let (platform, promoter) = setup(true);

        let report = promoter.promote(Environment::Stage, "a1b2c3").await.unwrap();

        assert_eq!(report.role_arn, STAGE_ROLE);
        assert_eq!(report.image_uri, format!("{}:a1b2c3", REPO));
        assert_eq!(report.published_version, "2");
        assert_eq!(report.previous_version.as_deref(), Some("1"));

        let alias = platform.alias(STAGE_ROLE, "inference", "live").unwrap();
        assert_eq!(alias.function_version, report.published_version);
        assert_eq!(alias.revision_id, report.alias_revision);

        let prod_alias = platform.alias(PROD_ROLE, "inference", "live").unwrap();
        assert_eq!(prod_alias.function_version, "1");
    }

    #[tokio::test]
    async fn test_call_sequence() {
        let (platform, promoter) = setup(true);
        promoter.promote(Environment::Prod, "a1b2c3").await.unwrap();

        let calls = platform.calls();
        assert_eq!(calls.len(), 4);
        assert_eq!(
            calls[0],
            PlatformCall::AssumeRole {
                role_arn: PROD_ROLE.to_string(),
                session_name: "DeployInference".to_string(),
            }
        );
        assert!(matches!(&calls[1], PlatformCall::GetAlias { role_arn, .. } if role_arn == PROD_ROLE));
        assert_eq!(
            calls[2],
            PlatformCall::PublishImage {
                role_arn: PROD_ROLE.to_string(),
                function_name: "inference".to_string(),
                image_uri: format!("{}:a1b2c3", REPO),
            }
        );
        assert!(matches!(
            &calls[3],
            PlatformCall::UpdateAlias { version, expected_revision: Some(_), .. } if version == "2"
        ));
    }

    #[tokio::test]
    async fn test_unguarded_promotion_skips_alias_read() {
        let (platform, promoter) = setup(false);
        let report = promoter.promote(Environment::Stage, "a1b2c3").await.unwrap();

        assert!(report.previous_version.is_none());
        let calls = platform.calls();
        assert_eq!(calls.len(), 3);
        assert!(!calls
            .iter()
            .any(|call| matches!(call, PlatformCall::GetAlias { .. })));
        assert!(matches!(
            &calls[2],
            PlatformCall::UpdateAlias { expected_revision: None, .. }
        ));
    }

    #[tokio::test]
    async fn test_unknown_environment_has_no_side_effects() {
        let (platform, promoter) = setup(true);

        let result = promoter.promote_str("production", "a1b2c3").await;

        assert!(matches!(result, Err(DeployError::UnknownEnvironment { .. })));
        assert!(platform.calls().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_model_version_has_no_side_effects() {
        let (platform, promoter) = setup(true);
        let result = promoter.promote(Environment::Stage, "bad tag").await;
        assert!(matches!(result, Err(DeployError::InvalidModelVersion { .. })));
        assert!(platform.calls().is_empty());
    }

    #[tokio::test]
    async fn test_credential_failure_stops_promotion() {
        let (platform, promoter) = setup(true);
        platform.fail_next(FailurePoint::AssumeRole);

        let result = promoter.promote(Environment::Stage, "a1b2c3").await;

        let err = result.unwrap_err();
        assert!(matches!(err, DeployError::Platform { operation: "AssumeRole", .. }));
        assert_eq!(err.stage_reached(), None);
        assert_eq!(platform.published_versions(STAGE_ROLE, "inference").len(), 1);
    }

    #[tokio::test]
    async fn test_alias_failure_reports_lagging_version() {
        let (platform, promoter) = setup(true);
        platform.fail_next(FailurePoint::UpdateAlias);

        let result = promoter.promote(Environment::Stage, "a1b2c3").await;

        match result {
            Err(err) => {
                assert_eq!(err.stage_reached(), Some(PromotionStage::PublishedUnaliased));
                match err {
                    DeployError::AliasLagging {
                        published_version, ..
                    } => assert_eq!(published_version, "2"),
                    other => panic!("expected AliasLagging, got {:?}", other),
                }
            }
            Ok(report) => panic!("expected AliasLagging, got {:?}", report),
        }
        assert_eq!(platform.published_versions(STAGE_ROLE, "inference").len(), 2);
        assert_eq!(
            platform
                .alias(STAGE_ROLE, "inference", "live")
                .unwrap()
                .function_version,
            "1"
        );
    }

    #[tokio::test]
    async fn test_guard_detects_concurrent_repoint() {
        let (platform, promoter) = setup(true);
        platform.repoint_after_next_publish(STAGE_ROLE, "inference", "live", "1");

        let result = promoter.promote(Environment::Stage, "a1b2c3").await;

        match result {
            Err(DeployError::AliasLagging { source, .. }) => {
                assert!(matches!(*source, DeployError::AliasConflict { .. }))
            }
            other => panic!("expected AliasLagging, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_repeated_promotion_publishes_new_versions() {
        let (platform, promoter) = setup(true);

        let first = promoter.promote(Environment::Stage, "a1b2c3").await.unwrap();
        let second = promoter.promote(Environment::Stage, "a1b2c3").await.unwrap();

        assert_ne!(first.published_version, second.published_version);
        assert_eq!(second.previous_version.as_deref(), Some("2"));
        assert_eq!(
            platform
                .alias(STAGE_ROLE, "inference", "live")
                .unwrap()
                .function_version,
            second.published_version
        );
    }
}
