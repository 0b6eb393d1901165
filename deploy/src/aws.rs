//! AWS implementation of the control-plane seams: STS for role assumption
//! and Lambda for publishing container images and moving aliases.

use crate::error::{DeployError, DeployResult};
use crate::platform::{
    AliasState, CredentialBroker, FunctionControl, FunctionControlFactory, PublishedVersion,
    TemporaryCredentials,
};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, SdkConfig};
use aws_sdk_lambda::error::DisplayErrorContext;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

/// Load the shared SDK configuration (region, base credentials) from the environment.
pub async fn load_sdk_config() -> SdkConfig {
    aws_config::defaults(BehaviorVersion::latest()).load().await
}

/// Assumes deployment roles through STS using the caller's own credentials
pub struct StsBroker {
    client: aws_sdk_sts::Client,
}

impl StsBroker {
    pub fn new(sdk_config: &SdkConfig) -> Self {
        Self::from_client(aws_sdk_sts::Client::new(sdk_config))
    }

    pub fn from_client(client: aws_sdk_sts::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CredentialBroker for StsBroker {
    async fn assume_role(
        &self,
        role_arn: &str,
        session_name: &str,
    ) -> DeployResult<TemporaryCredentials> {
        debug!("Assuming role {} as {}", role_arn, session_name);

        let output = self
            .client
            .assume_role()
            .role_arn(role_arn)
            .role_session_name(session_name)
            .send()
            .await
            .map_err(|e| {
                DeployError::platform("AssumeRole", DisplayErrorContext(e).to_string())
            })?;

        let credentials = output.credentials().ok_or(DeployError::MissingField {
            operation: "AssumeRole",
            field: "credentials",
        })?;

        let expires_at = credentials.expiration();
        let expiration =
            DateTime::<Utc>::from_timestamp(expires_at.secs(), expires_at.subsec_nanos());

        Ok(TemporaryCredentials {
            role_arn: role_arn.to_string(),
            access_key_id: credentials.access_key_id().to_string(),
            secret_access_key: credentials.secret_access_key().to_string(),
            session_token: credentials.session_token().to_string(),
            expiration,
        })
    }

    fn broker_name(&self) -> &'static str {
        "sts"
    }
}

/// Builds Lambda clients that act with assumed-role credentials
pub struct LambdaFactory {
    sdk_config: SdkConfig,
}

impl LambdaFactory {
    pub fn new(sdk_config: &SdkConfig) -> Self {
        Self {
            sdk_config: sdk_config.clone(),
        }
    }
}

impl FunctionControlFactory for LambdaFactory {
    fn connect(&self, credentials: &TemporaryCredentials) -> Box<dyn FunctionControl> {
        let provider = aws_sdk_lambda::config::Credentials::new(
            credentials.access_key_id.clone(),
            credentials.secret_access_key.clone(),
            Some(credentials.session_token.clone()),
            credentials.expiration.map(std::time::SystemTime::from),
            "model-release-assumed-role",
        );

        let config = aws_sdk_lambda::config::Builder::from(&self.sdk_config)
            .credentials_provider(provider)
            .build();

        Box::new(LambdaControl::new(aws_sdk_lambda::Client::from_conf(config)))
    }
}

pub struct LambdaControl {
    client: aws_sdk_lambda::Client,
}

impl LambdaControl {
    pub fn new(client: aws_sdk_lambda::Client) -> Self {
        Self { client }
    }

    fn alias_state(
        alias_name: &str,
        function_version: Option<&str>,
        revision_id: Option<&str>,
        operation: &'static str,
    ) -> DeployResult<AliasState> {
        let function_version = function_version.ok_or(DeployError::MissingField {
            operation,
            field: "function version",
        })?;

        Ok(AliasState {
            name: alias_name.to_string(),
            function_version: function_version.to_string(),
            revision_id: revision_id.map(str::to_string),
        })
    }
}

#[async_trait]
impl FunctionControl for LambdaControl {
    async fn publish_image(
        &self,
        function_name: &str,
        image_uri: &str,
    ) -> DeployResult<PublishedVersion> {
        debug!("Updating {} to image {}", function_name, image_uri);

        let output = self
            .client
            .update_function_code()
            .function_name(function_name)
            .image_uri(image_uri)
            .publish(true)
            .send()
            .await
            .map_err(|e| {
                DeployError::platform("UpdateFunctionCode", DisplayErrorContext(e).to_string())
            })?;

        let version = output.version().ok_or(DeployError::MissingField {
            operation: "UpdateFunctionCode",
            field: "version",
        })?;

        info!("Published {} version {}", function_name, version);

        Ok(PublishedVersion {
            version: version.to_string(),
            image_uri: image_uri.to_string(),
        })
    }

    async fn get_alias(&self, function_name: &str, alias_name: &str) -> DeployResult<AliasState> {
        let output = self
            .client
            .get_alias()
            .function_name(function_name)
            .name(alias_name)
            .send()
            .await
            .map_err(|e| {
                DeployError::platform("GetAlias", DisplayErrorContext(e).to_string())
            })?;

        Self::alias_state(
            alias_name,
            output.function_version(),
            output.revision_id(),
            "GetAlias",
        )
    }

    async fn update_alias(
        &self,
        function_name: &str,
        alias_name: &str,
        version: &str,
        expected_revision: Option<&str>,
    ) -> DeployResult<AliasState> {
        debug!(
            "Pointing alias {} of {} at version {}",
            alias_name, function_name, version
        );

        let output = self
            .client
            .update_alias()
            .function_name(function_name)
            .name(alias_name)
            .function_version(version)
            .set_revision_id(expected_revision.map(str::to_string))
            .send()
            .await
            .map_err(|e| {
                let precondition_failed = e
                    .as_service_error()
                    .map(|service| service.is_precondition_failed_exception())
                    .unwrap_or(false);

                match (precondition_failed, expected_revision) {
                    (true, Some(expected)) => DeployError::AliasConflict {
                        alias: alias_name.to_string(),
                        expected_revision: expected.to_string(),
                    },
                    _ => DeployError::platform("UpdateAlias", DisplayErrorContext(e).to_string()),
                }
            })?;

        Self::alias_state(
            alias_name,
            output.function_version(),
            output.revision_id(),
            "UpdateAlias",
        )
    }
}
