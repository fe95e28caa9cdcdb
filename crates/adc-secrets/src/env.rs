use async_trait::async_trait;

use crate::{Provider, SecretsError};

/// Reads secrets from environment variables.
///
/// The key is upper-cased and every non-alphanumeric character becomes `_`,
/// so `ad/bind-user` is read from `AD_BIND_USER`.
#[derive(Debug, Default)]
pub struct EnvProvider;

impl EnvProvider {
    pub fn new() -> Self {
        Self
    }

    pub fn var_name(key: &str) -> String {
        key.chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
            .collect()
    }
}

#[async_trait]
impl Provider for EnvProvider {
    async fn get(&self, key: &str) -> Result<String, SecretsError> {
        let var = Self::var_name(key);
        std::env::var(&var).map_err(|_| SecretsError::NotFound(var))
    }

    fn name(&self) -> &str {
        "env"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_var_name() {
        assert_eq!(EnvProvider::var_name("ad/bind-user"), "AD_BIND_USER");
        assert_eq!(EnvProvider::var_name("AD_BIND_SECRET"), "AD_BIND_SECRET");
    }
}
