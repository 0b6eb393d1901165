use crate::error::{ApprovalError, ApprovalResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const FEATURE_NAME_VAR: &str = "FEATURE_NAME";
pub const REGION_VAR: &str = "REGION";
pub const API_DEPLOYMENT_VAR: &str = "API_DEPLOYMENT_ID";
pub const WEBHOOK_URL_VAR: &str = "SLACK_WEBHOOK_URL";
pub const WEBHOOK_TIMEOUT_VAR: &str = "WEBHOOK_TIMEOUT_SECS";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalConfig {
    /// Feature the model serves, shown in the notification text.
    pub feature_name: String,
    pub region: String,
    /// Invoke URL of the approval workflow's HTTP API; callback paths are appended to it.
    pub api_base_url: String,
    pub webhook_url: String,
    pub timeout: Duration,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            feature_name: String::new(),
            region: "us-east-1".to_string(),
            api_base_url: String::new(),
            webhook_url: String::new(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl ApprovalConfig {
    pub fn new(
        feature_name: impl Into<String>,
        api_base_url: impl Into<String>,
        webhook_url: impl Into<String>,
    ) -> Self {
        Self {
            feature_name: feature_name.into(),
            api_base_url: api_base_url.into(),
            webhook_url: webhook_url.into(),
            ..Self::default()
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Reads the configuration from the process environment.
    pub fn from_env() -> ApprovalResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup and validates it.
    pub fn from_lookup<F>(lookup: F) -> ApprovalResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .ok_or_else(|| ApprovalError::InvalidConfig {
                    message: format!("{} is not set", key),
                })
        };

        let mut config = Self {
            feature_name: required(FEATURE_NAME_VAR)?,
            region: required(REGION_VAR)?,
            api_base_url: required(API_DEPLOYMENT_VAR)?,
            webhook_url: required(WEBHOOK_URL_VAR)?,
            ..Self::default()
        };

        if let Some(raw) = lookup(WEBHOOK_TIMEOUT_VAR) {
            let secs: u64 = raw
                .trim()
                .parse()
                .map_err(|_| ApprovalError::InvalidConfig {
                    message: format!(
                        "{} must be a whole number of seconds, got {:?}",
                        WEBHOOK_TIMEOUT_VAR, raw
                    ),
                })?;
            config.timeout = Duration::from_secs(secs);
        }

        config
            .validate()
            .map_err(|message| ApprovalError::InvalidConfig { message })?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.feature_name.trim().is_empty() {
            return Err("Feature name cannot be empty".to_string());
        }

        if self.region.trim().is_empty() {
            return Err("Region cannot be empty".to_string());
        }

        validate_http_url("API base URL", &self.api_base_url)?;
        validate_http_url("Webhook URL", &self.webhook_url)?;

        if self.timeout.is_zero() {
            return Err("Timeout must be greater than 0".to_string());
        }

        Ok(())
    }

    /// The API base URL with exactly one trailing slash.
    pub fn normalized_base_url(&self) -> String {
        if self.api_base_url.ends_with('/') {
            self.api_base_url.clone()
        } else {
            format!("{}/", self.api_base_url)
        }
    }
}

fn validate_http_url(label: &str, value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err(format!("{} cannot be empty", label));
    }

    if value.trim() != value {
        return Err(format!("{} has leading or trailing whitespace", label));
    }

    if !value.starts_with("http://") && !value.starts_with("https://") {
        return Err(format!("{} must start with http:// or https://", label));
    }

    url::Url::parse(value).map_err(|e| format!("{} is not a valid URL: {}", label, e))?;

    Ok(())
}
