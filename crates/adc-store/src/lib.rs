//! Configuration store access
//!
//! - `TypeRegistry`: resolves the schema version a resource type is filed under
//! - `ConfigStore`: resource upsert/list/delete and evaluation reporting
//! - `memory`: in-process store with change notifications
//! - `aws`: AWS Config and CloudFormation registry (with feature flag)

use adc_common::{EvaluationResult, ResourcePage, Result, StoredResource};
use async_trait::async_trait;
use tracing::debug;

pub mod memory;

pub use memory::{ChangeNotification, InMemoryConfigStore, InMemoryTypeRegistry};

#[cfg(feature = "aws")]
pub mod aws;
#[cfg(feature = "aws")]
pub use aws::{AwsConfigStore, CloudFormationTypeRegistry};

#[async_trait]
pub trait TypeRegistry: Send + Sync {
    /// Default schema version registered for `resource_type`.
    /// Unregistered types are a configuration error.
    async fn resolve_schema_version(&self, resource_type: &str) -> Result<String>;
}

#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Create or replace the resource keyed by `(resource_type, resource_id)`
    async fn put_resource(&self, resource: &StoredResource) -> Result<()>;

    /// One page of resource ids filed under `resource_type`
    async fn list_resources(
        &self,
        resource_type: &str,
        next_token: Option<String>,
    ) -> Result<ResourcePage>;

    async fn delete_resource(&self, resource_type: &str, resource_id: &str) -> Result<()>;

    async fn put_evaluation_result(&self, result: &EvaluationResult) -> Result<()>;
}

/// Follow `next_token` until the listing is exhausted
pub async fn list_all_resources(store: &dyn ConfigStore, resource_type: &str) -> Result<Vec<String>> {
    let mut ids = Vec::new();
    let mut next_token = None;
    let mut pages = 0usize;

    loop {
        let page = store.list_resources(resource_type, next_token).await?;
        pages += 1;
        ids.extend(page.resource_ids);
        match page.next_token {
            Some(token) if !token.is_empty() => next_token = Some(token),
            _ => break,
        }
    }

    debug!(resource_type = %resource_type, pages, count = ids.len(), "Listed stored resources");
    Ok(ids)
}
