use crate::domain::ports::{AdminToken, AdminTokenProvider};
use crate::utils::error::{ReconcileError, Result};
use async_trait::async_trait;

/// Hands out a pre-issued administrative session token.
#[derive(Debug, Clone)]
pub struct StaticTokenProvider {
    token: AdminToken,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: AdminToken::new(token),
        }
    }

    pub fn from_env(var: &str) -> Result<Self> {
        std::env::var(var)
            .map(Self::new)
            .map_err(|_| ReconcileError::Credential {
                message: format!("environment variable {} is not set", var),
            })
    }
}

#[async_trait]
impl AdminTokenProvider for StaticTokenProvider {
    async fn admin_token(&self) -> Result<AdminToken> {
        if self.token.expose().trim().is_empty() {
            return Err(ReconcileError::Credential {
                message: "admin token is empty".to_string(),
            });
        }
        Ok(self.token.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_returns_configured_token() {
        let provider = StaticTokenProvider::new("AQIC5w");
        assert_eq!(provider.admin_token().await.unwrap().expose(), "AQIC5w");
    }

    #[tokio::test]
    async fn test_empty_token_is_a_credential_error() {
        let provider = StaticTokenProvider::new("  ");
        assert!(matches!(
            provider.admin_token().await,
            Err(ReconcileError::Credential { .. })
        ));
    }

    #[test]
    fn test_missing_env_var() {
        assert!(StaticTokenProvider::from_env("REALM_SCHEMA_SYNC_TEST_UNSET_TOKEN").is_err());
    }

    #[test]
    fn test_debug_hides_token() {
        let provider = StaticTokenProvider::new("secret-value");
        assert!(!format!("{:?}", provider).contains("secret-value"));
    }
}
