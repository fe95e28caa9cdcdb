//! In-process configuration store.
//!
//! Publishes a `ChangeNotification` for every put and delete, the way the
//! hosted store triggers rule evaluations.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use adc_common::{
    AdcError, ConfigurationItem, EvaluationResult, ResourcePage, Result, StoredResource,
};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::debug;

use crate::{ConfigStore, TypeRegistry};

pub const STATUS_OK: &str = "OK";
pub const STATUS_DELETED: &str = "ResourceDeleted";

/// A configuration change plus the token the evaluation must be reported with
#[derive(Debug, Clone)]
pub struct ChangeNotification {
    pub configuration_item: ConfigurationItem,
    pub result_token: String,
}

pub struct InMemoryConfigStore {
    resources: Mutex<BTreeMap<(String, String), StoredResource>>,
    evaluations: Mutex<Vec<EvaluationResult>>,
    failing_puts: Mutex<HashSet<String>>,
    failing_deletes: Mutex<HashSet<String>>,
    page_size: usize,
    sequence: AtomicU64,
    notifications: broadcast::Sender<ChangeNotification>,
}

/// Change notifications buffered per subscriber before the slowest one lags
pub const DEFAULT_NOTIFICATION_CAPACITY: usize = 1024;

impl Default for InMemoryConfigStore {
    fn default() -> Self {
        Self::with_page_size(100)
    }
}

impl InMemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page_size(page_size: usize) -> Self {
        let (notifications, _) = broadcast::channel(DEFAULT_NOTIFICATION_CAPACITY);
        Self {
            resources: Mutex::new(BTreeMap::new()),
            evaluations: Mutex::new(Vec::new()),
            failing_puts: Mutex::new(HashSet::new()),
            failing_deletes: Mutex::new(HashSet::new()),
            page_size: page_size.max(1),
            sequence: AtomicU64::new(0),
            notifications,
        }
    }

    /// Replace the notification channel. Subscribers taken earlier stop
    /// receiving.
    pub fn with_notification_capacity(mut self, capacity: usize) -> Self {
        let (notifications, _) = broadcast::channel(capacity.max(1));
        self.notifications = notifications;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeNotification> {
        self.notifications.subscribe()
    }

    /// Make puts of `resource_id` fail
    pub fn fail_put_of(&self, resource_id: &str) {
        self.failing_puts.lock().insert(resource_id.to_string());
    }

    /// Make deletes of `resource_id` fail
    pub fn fail_delete_of(&self, resource_id: &str) {
        self.failing_deletes.lock().insert(resource_id.to_string());
    }

    pub fn get(&self, resource_type: &str, resource_id: &str) -> Option<StoredResource> {
        self.resources
            .lock()
            .get(&(resource_type.to_string(), resource_id.to_string()))
            .cloned()
    }

    /// Sorted ids filed under `resource_type`
    pub fn resource_ids(&self, resource_type: &str) -> Vec<String> {
        self.resources
            .lock()
            .keys()
            .filter(|(t, _)| t == resource_type)
            .map(|(_, id)| id.clone())
            .collect()
    }

    pub fn evaluations(&self) -> Vec<EvaluationResult> {
        self.evaluations.lock().clone()
    }

    fn publish(&self, resource_type: &str, resource_id: &str, status: &str, configuration: Option<serde_json::Value>) {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        let notification = ChangeNotification {
            configuration_item: ConfigurationItem {
                resource_type: resource_type.to_string(),
                resource_id: resource_id.to_string(),
                status: status.to_string(),
                capture_time: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
                configuration,
            },
            result_token: format!("token-{}", seq),
        };
        // No subscribers is fine.
        let _ = self.notifications.send(notification);
    }
}

#[async_trait]
impl ConfigStore for InMemoryConfigStore {
    async fn put_resource(&self, resource: &StoredResource) -> Result<()> {
        if self.failing_puts.lock().contains(&resource.resource_id) {
            return Err(AdcError::Store(format!("Put of {} rejected", resource.resource_id)));
        }

        let configuration: serde_json::Value = serde_json::from_str(&resource.configuration)
            .map_err(|e| AdcError::Store(format!("Configuration is not valid JSON: {}", e)))?;

        self.resources.lock().insert(
            (resource.resource_type.clone(), resource.resource_id.clone()),
            resource.clone(),
        );
        self.publish(&resource.resource_type, &resource.resource_id, STATUS_OK, Some(configuration));
        Ok(())
    }

    async fn list_resources(
        &self,
        resource_type: &str,
        next_token: Option<String>,
    ) -> Result<ResourcePage> {
        let offset = match next_token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| AdcError::Store(format!("Invalid next token: {}", token)))?,
            None => 0,
        };

        let ids = self.resource_ids(resource_type);
        let end = (offset + self.page_size).min(ids.len());
        let resource_ids = ids.get(offset..end).map(|s| s.to_vec()).unwrap_or_default();
        let next_token = (end < ids.len()).then(|| end.to_string());

        Ok(ResourcePage { resource_ids, next_token })
    }

    async fn delete_resource(&self, resource_type: &str, resource_id: &str) -> Result<()> {
        if self.failing_deletes.lock().contains(resource_id) {
            return Err(AdcError::Store(format!("Delete of {} rejected", resource_id)));
        }

        let removed = self
            .resources
            .lock()
            .remove(&(resource_type.to_string(), resource_id.to_string()));
        if removed.is_none() {
            return Err(AdcError::Store(format!(
                "Resource {} of type {} not found",
                resource_id, resource_type
            )));
        }

        self.publish(resource_type, resource_id, STATUS_DELETED, None);
        Ok(())
    }

    async fn put_evaluation_result(&self, result: &EvaluationResult) -> Result<()> {
        debug!(
            resource_id = %result.resource_id,
            compliance_type = %result.compliance_type,
            "Evaluation recorded"
        );
        self.evaluations.lock().push(result.clone());
        Ok(())
    }
}

/// Registry with a fixed schema version per resource type
#[derive(Debug, Default)]
pub struct InMemoryTypeRegistry {
    versions: HashMap<String, String>,
}

impl InMemoryTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_type(mut self, resource_type: &str, version_id: &str) -> Self {
        self.versions.insert(resource_type.to_string(), version_id.to_string());
        self
    }
}

#[async_trait]
impl TypeRegistry for InMemoryTypeRegistry {
    async fn resolve_schema_version(&self, resource_type: &str) -> Result<String> {
        self.versions
            .get(resource_type)
            .cloned()
            .ok_or_else(|| AdcError::Configuration(format!("Resource type {} is not registered", resource_type)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adc_common::UserRecord;

    #[tokio::test]
    async fn test_put_and_delete_publish_notifications() {
        let store = InMemoryConfigStore::new();
        let mut rx = store.subscribe();

        let user = UserRecord::new("jdoe", "John Doe", "0", "66048");
        store
            .put_resource(&StoredResource::from_user("AD::User", "v1", &user).unwrap())
            .await
            .unwrap();
        store.delete_resource("AD::User", "jdoe").await.unwrap();

        let put = rx.recv().await.unwrap();
        assert_eq!(put.configuration_item.status, STATUS_OK);
        assert_eq!(
            put.configuration_item.configuration.unwrap()["userAccountControl"],
            "66048"
        );

        let deleted = rx.recv().await.unwrap();
        assert_eq!(deleted.configuration_item.status, STATUS_DELETED);
        assert_ne!(put.result_token, deleted.result_token);
    }

    #[tokio::test]
    async fn test_failed_put_stores_and_publishes_nothing() {
        let store = InMemoryConfigStore::new();
        let mut rx = store.subscribe();
        store.fail_put_of("jdoe");

        let user = UserRecord::new("jdoe", "John Doe", "0", "512");
        let err = store
            .put_resource(&StoredResource::from_user("AD::User", "v1", &user).unwrap())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "store");
        assert!(store.get("AD::User", "jdoe").is_none());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_notification_capacity() {
        let store = InMemoryConfigStore::new().with_notification_capacity(2);
        let mut rx = store.subscribe();

        for id in ["a", "b", "c"] {
            let user = UserRecord::new(id, id, "0", "512");
            store
                .put_resource(&StoredResource::from_user("AD::User", "v1", &user).unwrap())
                .await
                .unwrap();
        }

        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(1))
        ));
        assert_eq!(rx.recv().await.unwrap().configuration_item.resource_id, "b");
    }

    #[tokio::test]
    async fn test_delete_missing_resource_fails() {
        let store = InMemoryConfigStore::new();
        let err = store.delete_resource("AD::User", "ghost").await.unwrap_err();
        assert_eq!(err.kind(), "store");
    }

    #[tokio::test]
    async fn test_unregistered_type() {
        let registry = InMemoryTypeRegistry::new().with_type("AD::User", "00000001");
        assert_eq!(registry.resolve_schema_version("AD::User").await.unwrap(), "00000001");

        let err = registry.resolve_schema_version("AD::Group").await.unwrap_err();
        assert_eq!(err.kind(), "configuration");
    }
}
