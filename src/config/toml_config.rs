use crate::adapters::rest::DEFAULT_TOKEN_HEADER;
use crate::adapters::token::StaticTokenProvider;
use crate::core::driver::DriverOptions;
use crate::core::reconciler::ReconcilePolicy;
use crate::core::resilience::{RetryPolicy, StoreCallGuard};
use crate::utils::error::{ReconcileError, Result};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Upper bound on realms reconciled at once.
pub const MAX_CONCURRENT_REALMS: usize = 256;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    pub store: StoreConfig,
    #[serde(default)]
    pub policy: ReconcilePolicy,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub driver: DriverConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    Rest,
    Snapshot,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub kind: StoreKind,
    pub base_url: Option<String>,
    pub snapshot_path: Option<String>,
    pub token: Option<String>,
    /// Environment variable holding the admin token, read when the pass starts.
    pub token_env: Option<String>,
    pub token_header: Option<String>,
    pub call_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay_ms: 200,
            max_delay_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    pub max_concurrent_realms: usize,
    pub dry_run: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            max_concurrent_realms: 1,
            dry_run: false,
        }
    }
}

impl ReconcilerConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| ReconcileError::ConfigError {
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// Replaces `${VAR}` with the variable's value; unset variables are left as written.
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| ReconcileError::config(e.to_string()))?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn validate_config(&self) -> Result<()> {
        match self.store.kind {
            StoreKind::Rest => {
                let base_url = validation::validate_required_field("store.base_url", &self.store.base_url)?;
                validation::validate_url("store.base_url", base_url)?;
                match (&self.store.token, &self.store.token_env) {
                    (Some(token), _) => {
                        validation::validate_non_empty_string("store.token", token)?;
                        if token.starts_with("${") {
                            return Err(ReconcileError::InvalidConfigValueError {
                                field: "store.token".to_string(),
                                value: token.clone(),
                                reason: "environment variable is not set".to_string(),
                            });
                        }
                    }
                    (None, Some(var)) => {
                        validation::validate_non_empty_string("store.token_env", var)?;
                    }
                    (None, None) => {
                        return Err(ReconcileError::MissingConfigError {
                            field: "store.token".to_string(),
                        });
                    }
                }
            }
            StoreKind::Snapshot => {
                let path = validation::validate_required_field(
                    "store.snapshot_path",
                    &self.store.snapshot_path,
                )?;
                validation::validate_path("store.snapshot_path", path)?;
            }
        }

        if let Some(timeout) = self.store.call_timeout_seconds {
            validation::validate_positive_number("store.call_timeout_seconds", timeout as usize, 1)?;
        }
        validation::validate_range(
            "driver.max_concurrent_realms",
            self.driver.max_concurrent_realms,
            1,
            MAX_CONCURRENT_REALMS,
        )?;

        validation::validate_non_empty_string("policy.service_id", &self.policy.service_id)?;
        validation::validate_non_empty_string(
            "policy.object_class_attribute",
            &self.policy.object_class_attribute,
        )?;
        validation::validate_non_empty_string(
            "policy.user_attributes_attribute",
            &self.policy.user_attributes_attribute,
        )?;
        validation::validate_non_empty_string(
            "policy.required_object_class",
            &self.policy.required_object_class,
        )?;
        for attribute in &self.policy.required_attributes {
            validation::validate_non_empty_string("policy.required_attributes", attribute)?;
        }

        Ok(())
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.store.call_timeout_seconds.unwrap_or(30))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.retry.max_retries,
            initial_delay: Duration::from_millis(self.retry.initial_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
            ..RetryPolicy::default()
        }
    }

    pub fn call_guard(&self) -> StoreCallGuard {
        StoreCallGuard::new(self.retry_policy(), self.call_timeout())
    }

    pub fn driver_options(&self) -> DriverOptions {
        DriverOptions {
            max_concurrent_realms: self.driver.max_concurrent_realms,
            dry_run: self.driver.dry_run,
        }
    }

    pub fn token_header(&self) -> &str {
        self.store
            .token_header
            .as_deref()
            .unwrap_or(DEFAULT_TOKEN_HEADER)
    }

    /// An inline token wins over `token_env`. Snapshot stores do not
    /// authenticate, so they fall back to a placeholder token.
    pub fn token_provider(&self) -> Result<StaticTokenProvider> {
        match (&self.store.token, &self.store.token_env) {
            (Some(token), _) => Ok(StaticTokenProvider::new(token.clone())),
            (None, Some(var)) => StaticTokenProvider::from_env(var),
            (None, None) => match self.store.kind {
                StoreKind::Snapshot => Ok(StaticTokenProvider::new("snapshot")),
                StoreKind::Rest => Err(ReconcileError::MissingConfigError {
                    field: "store.token".to_string(),
                }),
            },
        }
    }
}

impl Validate for ReconcilerConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
