//! Promotion configuration.

use crate::environment::Environment;
use crate::error::{DeployError, DeployResult};
use serde::{Deserialize, Serialize};

pub const ECR_REPO_VAR: &str = "ECR_REPO_URL";
pub const FUNCTION_NAME_VAR: &str = "FUNCTION_NAME";
pub const ALIAS_NAME_VAR: &str = "ALIAS_NAME";
pub const STAGE_ROLE_VAR: &str = "DEPLOY_STAGE_ROLE_ARN";
pub const PROD_ROLE_VAR: &str = "DEPLOY_PROD_ROLE_ARN";
pub const SESSION_NAME_VAR: &str = "DEPLOY_SESSION_NAME";
pub const ALIAS_GUARD_VAR: &str = "DEPLOY_ALIAS_GUARD";

/// Session name recorded on the assumed role
pub const DEFAULT_SESSION_NAME: &str = "DeployInference";

/// Everything the promoter needs to know about the target function
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Image repository URL without tag, e.g. `123.dkr.ecr.us-east-1.amazonaws.com/model`
    pub ecr_repo_url: String,
    /// Name of the inference function in each account
    pub function_name: String,
    /// Alias serving live traffic
    pub alias_name: String,
    /// Role assumed for stage promotions
    pub stage_role_arn: String,
    /// Role assumed for production promotions
    pub prod_role_arn: String,
    /// Session name attached to the assumed role
    pub session_name: String,
    /// Repoint the alias only if it still has the revision read before publishing
    pub guard_alias: bool,
}

impl DeployConfig {
    pub fn new(
        ecr_repo_url: impl Into<String>,
        function_name: impl Into<String>,
        alias_name: impl Into<String>,
        stage_role_arn: impl Into<String>,
        prod_role_arn: impl Into<String>,
    ) -> Self {
        Self {
            ecr_repo_url: ecr_repo_url.into(),
            function_name: function_name.into(),
            alias_name: alias_name.into(),
            stage_role_arn: stage_role_arn.into(),
            prod_role_arn: prod_role_arn.into(),
            session_name: DEFAULT_SESSION_NAME.to_string(),
            guard_alias: true,
        }
    }

    pub fn with_session_name(mut self, session_name: impl Into<String>) -> Self {
        self.session_name = session_name.into();
        self
    }

    pub fn with_alias_guard(mut self, guard_alias: bool) -> Self {
        self.guard_alias = guard_alias;
        self
    }

    /// Read the configuration from the process environment
    pub fn from_env() -> DeployResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build and validate the configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> DeployResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .ok_or_else(|| DeployError::InvalidConfig {
                    message: format!("{} is not set", key),
                })
        };

        let mut config = Self::new(
            required(ECR_REPO_VAR)?,
            required(FUNCTION_NAME_VAR)?,
            required(ALIAS_NAME_VAR)?,
            required(STAGE_ROLE_VAR)?,
            required(PROD_ROLE_VAR)?,
        );

        if let Some(session_name) = lookup(SESSION_NAME_VAR) {
            config.session_name = session_name.trim().to_string();
        }

        if let Some(raw) = lookup(ALIAS_GUARD_VAR) {
            config.guard_alias = match raw.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => true,
                "false" | "0" | "no" => false,
                _ => {
                    return Err(DeployError::InvalidConfig {
                        message: format!(
                            "{} must be true or false, got {:?}",
                            ALIAS_GUARD_VAR, raw
                        ),
                    })
                }
            };
        }

        config
            .validate()
            .map_err(|message| DeployError::InvalidConfig { message })?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.ecr_repo_url.is_empty() {
            return Err("Image repository URL cannot be empty".to_string());
        }

        if self.ecr_repo_url.contains("://") {
            return Err("Image repository URL must not include a scheme".to_string());
        }

        if self.ecr_repo_url.ends_with(':') || self.ecr_repo_url.ends_with('/') {
            return Err("Image repository URL must not end with ':' or '/'".to_string());
        }

        if self.function_name.is_empty() {
            return Err("Function name cannot be empty".to_string());
        }

        if self.alias_name.is_empty() {
            return Err("Alias name cannot be empty".to_string());
        }

        for (label, arn) in [
            ("Stage role", &self.stage_role_arn),
            ("Prod role", &self.prod_role_arn),
        ] {
            if !arn.starts_with("arn:") {
                return Err(format!("{} must be an ARN, got {:?}", label, arn));
            }
        }

        // STS limits session names to 2-64 characters of [\w+=,.@-].
        let session_ok = (2..=64).contains(&self.session_name.len())
            && self
                .session_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || "_+=,.@-".contains(c));
        if !session_ok {
            return Err(format!("Invalid role session name {:?}", self.session_name));
        }

        Ok(())
    }

    /// Role to assume for `environment`
    pub fn role_for(&self, environment: Environment) -> &str {
        match environment {
            Environment::Stage => &self.stage_role_arn,
            Environment::Prod => &self.prod_role_arn,
        }
    }

    /// Image reference for a model version: `<repo>:<version>`
    pub fn image_uri(&self, model_version: &str) -> String {
        format!("{}:{}", self.ecr_repo_url, model_version)
    }
}
