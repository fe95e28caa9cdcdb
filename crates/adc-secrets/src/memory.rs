use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::{Provider, SecretsError};

/// Secrets held in process memory
#[derive(Debug, Default)]
pub struct MemoryProvider {
    secrets: RwLock<HashMap<String, String>>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(key: &str, value: &str) -> Self {
        let provider = Self::new();
        provider.insert(key, value);
        provider
    }

    pub fn insert(&self, key: &str, value: &str) {
        self.secrets.write().insert(key.to_string(), value.to_string());
    }
}

#[async_trait]
impl Provider for MemoryProvider {
    async fn get(&self, key: &str) -> Result<String, SecretsError> {
        self.secrets
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| SecretsError::NotFound(key.to_string()))
    }

    fn name(&self) -> &str {
        "memory"
    }
}
