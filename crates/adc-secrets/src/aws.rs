use async_trait::async_trait;
use tracing::debug;

use crate::{Provider, SecretsError};

/// Reads secret strings from AWS Secrets Manager by ARN or name
pub struct AwsSecretsManagerProvider {
    client: aws_sdk_secretsmanager::Client,
}

impl AwsSecretsManagerProvider {
    pub fn new(client: aws_sdk_secretsmanager::Client) -> Self {
        Self { client }
    }

    /// Build a client from the default AWS credential/region chain
    pub async fn from_env() -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::new(aws_sdk_secretsmanager::Client::new(&config))
    }
}

#[async_trait]
impl Provider for AwsSecretsManagerProvider {
    async fn get(&self, key: &str) -> Result<String, SecretsError> {
        debug!(secret_id = %key, "Fetching secret from AWS Secrets Manager");

        let output = self.client
            .get_secret_value()
            .secret_id(key)
            .send()
            .await
            .map_err(|e| SecretsError::ProviderError(format!("Failed to get secret {}: {}", key, e)))?;

        output
            .secret_string()
            .map(|s| s.to_string())
            .ok_or_else(|| SecretsError::Malformed {
                key: key.to_string(),
                message: "secret has no SecretString".to_string(),
            })
    }

    fn name(&self) -> &str {
        "aws-sm"
    }
}
