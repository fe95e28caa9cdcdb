//! Directory backed by a fixed user list.

use std::sync::Arc;

use adc_common::{AdcError, Result, UserRecord};
use adc_config::DirectoryConfig;
use adc_secrets::BindCredentials;
use async_trait::async_trait;
use parking_lot::RwLock;

use crate::{Directory, DirectorySession};

/// Serves whatever user list it currently holds; `set_users` swaps it
/// between cycles. Optionally rejects binds that do not match `expected`.
#[derive(Debug, Default)]
pub struct StaticDirectory {
    users: Arc<RwLock<Vec<UserRecord>>>,
    expected: Option<BindCredentials>,
}

impl StaticDirectory {
    pub fn new(users: Vec<UserRecord>) -> Self {
        Self {
            users: Arc::new(RwLock::new(users)),
            expected: None,
        }
    }

    pub fn with_credentials(mut self, credentials: BindCredentials) -> Self {
        self.expected = Some(credentials);
        self
    }

    pub fn set_users(&self, users: Vec<UserRecord>) {
        *self.users.write() = users;
    }
}

#[async_trait]
impl Directory for StaticDirectory {
    async fn bind(
        &self,
        _config: &DirectoryConfig,
        credentials: &BindCredentials,
    ) -> Result<Box<dyn DirectorySession>> {
        if let Some(expected) = &self.expected {
            if expected != credentials {
                return Err(AdcError::Directory(format!(
                    "Invalid credentials for {}",
                    credentials.username
                )));
            }
        }
        Ok(Box::new(StaticSession {
            users: self.users.clone(),
        }))
    }
}

struct StaticSession {
    users: Arc<RwLock<Vec<UserRecord>>>,
}

#[async_trait]
impl DirectorySession for StaticSession {
    async fn search(
        &mut self,
        _base: &str,
        _filter: &str,
        _attributes: &[&str],
    ) -> Result<Vec<UserRecord>> {
        Ok(self.users.read().clone())
    }

    async fn unbind(&mut self) -> Result<()> {
        Ok(())
    }
}
