use std::collections::HashSet;
use std::sync::Arc;

use adc_common::{AdcError, Result, StoredResource, UserRecord};
use adc_config::SyncConfig;
use adc_directory::{Directory, ALL_ATTRIBUTES, PERSON_FILTER};
use adc_secrets::{fetch_bind_credentials, Provider};
use adc_store::{list_all_resources, ConfigStore, TypeRegistry};
use tracing::{debug, error, info, warn};

/// Outcome of one successful cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub schema_version_id: String,
    pub upserted: usize,
    pub previous: usize,
    pub removed: Vec<String>,
}

pub struct DirectorySync {
    config: SyncConfig,
    registry: Arc<dyn TypeRegistry>,
    secrets: Arc<dyn Provider>,
    directory: Arc<dyn Directory>,
    store: Arc<dyn ConfigStore>,
}

impl DirectorySync {
    pub fn new(
        config: SyncConfig,
        registry: Arc<dyn TypeRegistry>,
        secrets: Arc<dyn Provider>,
        directory: Arc<dyn Directory>,
        store: Arc<dyn ConfigStore>,
    ) -> Self {
        Self {
            config,
            registry,
            secrets,
            directory,
            store,
        }
    }

    pub fn resource_type(&self) -> &str {
        &self.config.resource_type
    }

    /// Reconcile the store with the directory for the configured resource type.
    ///
    /// Any failure before the deletion phase aborts the cycle. Deletions are
    /// all attempted; the cycle fails afterwards if any of them failed.
    pub async fn run_sync_cycle(&self) -> Result<SyncReport> {
        let resource_type = self.config.resource_type.as_str();
        info!(resource_type = %resource_type, "Starting sync cycle");

        let schema_version_id = self.registry.resolve_schema_version(resource_type).await?;
        let credentials =
            fetch_bind_credentials(self.secrets.as_ref(), &self.config.bind_secret_ref).await?;

        let mut session = self.directory.bind(&self.config.directory, &credentials).await?;
        let users = session
            .search(&self.config.directory.search_base, PERSON_FILTER, ALL_ATTRIBUTES)
            .await;
        if let Err(e) = session.unbind().await {
            warn!(error = %e, "Directory unbind failed");
        }
        let users = users?;

        info!(count = users.len(), "Syncing users from directory to store");
        log_user_table(&users);

        let mut current = HashSet::with_capacity(users.len());
        for user in &users {
            current.insert(user.account_id.clone());
            let resource = StoredResource::from_user(resource_type, &schema_version_id, user)?;
            self.store.put_resource(&resource).await?;
            debug!(account_id = %user.account_id, "Upserted user");
        }
        metrics::counter!("adc_users_upserted_total").increment(users.len() as u64);

        let previous = list_all_resources(self.store.as_ref(), resource_type).await?;
        let stale = stale_resources(&previous, &current);
        self.check_guard(current.len(), previous.len(), stale.len())?;

        info!(removed = ?stale, "Removing deleted users from store");
        let mut failed = Vec::new();
        for resource_id in &stale {
            match self.store.delete_resource(resource_type, resource_id).await {
                Ok(()) => metrics::counter!("adc_resources_deleted_total").increment(1),
                Err(e) => {
                    error!(resource_id = %resource_id, error = %e, "Failed to delete stale resource");
                    failed.push(resource_id.clone());
                }
            }
        }

        if !failed.is_empty() {
            return Err(AdcError::Store(format!(
                "Failed to delete {} of {} stale resources: {:?}",
                failed.len(),
                stale.len(),
                failed
            )));
        }

        info!(
            upserted = users.len(),
            previous = previous.len(),
            removed = stale.len(),
            "Sync cycle finished"
        );

        Ok(SyncReport {
            schema_version_id,
            upserted: users.len(),
            previous: previous.len(),
            removed: stale,
        })
    }

    fn check_guard(&self, current: usize, previous: usize, stale: usize) -> Result<()> {
        let guard = &self.config.guard;
        if guard.refuse_empty_fetch && current == 0 && previous > 0 {
            return Err(AdcError::Directory(format!(
                "Directory returned no users; refusing to delete {} stored resources",
                previous
            )));
        }
        if let Some(max) = guard.max_deletions {
            if stale > max {
                return Err(AdcError::Directory(format!(
                    "Cycle would delete {} resources, above the limit of {}",
                    stale, max
                )));
            }
        }
        if current == 0 && previous > 0 {
            warn!(previous, "Directory returned no users; deleting every stored resource");
        }
        Ok(())
    }
}

/// Ids present in `previous` but absent from `current`, in listing order,
/// each at most once
pub fn stale_resources(previous: &[String], current: &HashSet<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut stale = Vec::new();
    for id in previous {
        if !current.contains(id) && seen.insert(id.as_str()) {
            stale.push(id.clone());
        }
    }
    stale
}

fn format_row(cols: [&str; 4]) -> String {
    format!("{:>20}{:>20}{:>20}{:>20}", cols[0], cols[1], cols[2], cols[3])
}

fn log_user_table(users: &[UserRecord]) {
    info!("{}", format_row(["SAMAccountName", "Name", "userAccountControl", "PwdLastSet"]));
    for user in users {
        let pwd_last_set: String = user.password_last_set.chars().take(10).collect();
        info!(
            "{}",
            format_row([
                user.account_id.as_str(),
                user.display_name.as_str(),
                user.account_control_flags.as_str(),
                pwd_last_set.as_str(),
            ])
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_stale_is_previous_minus_current() {
        let previous = ids(&["alice", "carol", "bob"]);
        let current: HashSet<String> = ids(&["alice", "bob", "dave"]).into_iter().collect();

        assert_eq!(stale_resources(&previous, &current), vec!["carol"]);
    }

    #[test]
    fn test_stale_with_empty_current_is_everything() {
        let previous = ids(&["alice", "carol"]);
        assert_eq!(stale_resources(&previous, &HashSet::new()), previous);
    }

    #[test]
    fn test_stale_deduplicates_listing() {
        let previous = ids(&["carol", "carol", "erin"]);
        let current: HashSet<String> = HashSet::new();
        assert_eq!(stale_resources(&previous, &current), vec!["carol", "erin"]);
    }

    #[test]
    fn test_format_row_is_fixed_width() {
        let row = format_row(["jdoe", "John Doe", "512", "1325145600"]);
        assert_eq!(row.len(), 80);
        assert!(row.ends_with("1325145600"));
    }
}
