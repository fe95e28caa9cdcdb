//! Secrets Management
//!
//! Provides a unified interface for reading the directory bind secret:
//! - Environment variables
//! - In-memory map (tests, local development)
//! - AWS Secrets Manager (with feature flag)

use std::sync::Arc;

use adc_common::AdcError;
use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

mod env;
mod memory;

pub use env::EnvProvider;
pub use memory::MemoryProvider;

#[cfg(feature = "aws")]
mod aws;
#[cfg(feature = "aws")]
pub use aws::AwsSecretsManagerProvider;

#[derive(Error, Debug)]
pub enum SecretsError {
    #[error("Secret not found: {0}")]
    NotFound(String),
    #[error("Malformed secret {key}: {message}")]
    Malformed { key: String, message: String },
    #[error("Provider error: {0}")]
    ProviderError(String),
}

impl From<SecretsError> for AdcError {
    fn from(e: SecretsError) -> Self {
        AdcError::Credential(e.to_string())
    }
}

/// Secrets provider trait
#[async_trait]
pub trait Provider: Send + Sync {
    /// Get a secret by key
    async fn get(&self, key: &str) -> Result<String, SecretsError>;

    /// Provider name
    fn name(&self) -> &str;
}

/// Create a provider by name (`env`, `aws-sm`)
pub async fn create_provider(name: &str) -> Result<Arc<dyn Provider>, SecretsError> {
    match name {
        "env" => {
            info!("Using environment variable secrets provider");
            Ok(Arc::new(EnvProvider::new()))
        }
        #[cfg(feature = "aws")]
        "aws-sm" => {
            info!("Using AWS Secrets Manager provider");
            Ok(Arc::new(AwsSecretsManagerProvider::from_env().await))
        }
        other => Err(SecretsError::ProviderError(format!("Unknown provider: {}", other))),
    }
}

/// Directory bind credentials
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct BindCredentials {
    #[serde(rename = "bindusername")]
    pub username: String,
    #[serde(rename = "bindpassword")]
    pub password: String,
}

impl std::fmt::Debug for BindCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl BindCredentials {
    /// Parse a JSON secret carrying `bindusername` and `bindpassword`
    pub fn from_secret_string(key: &str, raw: &str) -> Result<Self, SecretsError> {
        serde_json::from_str(raw).map_err(|e| SecretsError::Malformed {
            key: key.to_string(),
            message: e.to_string(),
        })
    }

    /// Down-level logon name, `DOMAIN\user`
    pub fn qualified_username(&self, domain: &str) -> String {
        format!("{}\\{}", domain, self.username)
    }
}

/// Fetch and parse the bind secret
pub async fn fetch_bind_credentials(
    provider: &dyn Provider,
    secret_ref: &str,
) -> Result<BindCredentials, AdcError> {
    let raw = provider.get(secret_ref).await?;
    let credentials = BindCredentials::from_secret_string(secret_ref, &raw)?;
    info!(provider = provider.name(), username = %credentials.username, "Bind credentials retrieved");
    Ok(credentials)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bind_secret() {
        let creds = BindCredentials::from_secret_string(
            "ad-bind",
            r#"{"bindusername": "svc-sync", "bindpassword": "hunter2"}"#,
        )
        .unwrap();
        assert_eq!(creds.username, "svc-sync");
        assert_eq!(creds.password, "hunter2");
        assert_eq!(creds.qualified_username("CORP"), "CORP\\svc-sync");
    }

    #[test]
    fn test_secret_missing_password_is_malformed() {
        let err = BindCredentials::from_secret_string("ad-bind", r#"{"bindusername": "svc-sync"}"#)
            .unwrap_err();
        assert!(matches!(err, SecretsError::Malformed { .. }));
    }

    #[test]
    fn test_debug_redacts_password() {
        let creds = BindCredentials {
            username: "svc-sync".to_string(),
            password: "hunter2".to_string(),
        };
        let rendered = format!("{:?}", creds);
        assert!(!rendered.contains("hunter2"));
    }

    #[tokio::test]
    async fn test_fetch_maps_errors_to_credential_error() {
        let provider = MemoryProvider::new();
        let err = fetch_bind_credentials(&provider, "ad-bind").await.unwrap_err();
        assert_eq!(err.kind(), "credential");

        provider.insert("ad-bind", "not json");
        let err = fetch_bind_credentials(&provider, "ad-bind").await.unwrap_err();
        assert_eq!(err.kind(), "credential");
    }

    #[tokio::test]
    async fn test_unknown_provider() {
        assert!(create_provider("vault").await.is_err());
    }
}
