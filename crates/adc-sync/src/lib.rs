//! Directory Sync
//!
//! Full-refresh reconciliation of directory users into the configuration
//! store:
//! - DirectorySync: one cycle (upsert every current user, delete the rest)
//! - SyncScheduler: runs cycles on a fixed interval, never overlapping

pub mod scheduler;
pub mod sync;

pub use scheduler::{SyncScheduler, SyncState, SyncStatus};
pub use sync::{stale_resources, DirectorySync, SyncReport};
