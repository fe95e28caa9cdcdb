//! Fixed-interval driver for sync cycles.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::sync::{DirectorySync, SyncReport};

/// Last known cycle outcome, exposed on the health endpoint
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncStatus {
    pub cycles: u64,
    pub failures: u64,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_upserted: usize,
    pub last_removed: usize,
}

#[derive(Debug, Default)]
pub struct SyncState {
    status: RwLock<SyncStatus>,
}

impl SyncState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> SyncStatus {
        self.status.read().clone()
    }

    fn record_success(&self, report: &SyncReport) {
        let mut status = self.status.write();
        status.cycles += 1;
        status.last_success_at = Some(Utc::now());
        status.last_error = None;
        status.last_upserted = report.upserted;
        status.last_removed = report.removed.len();
    }

    fn record_failure(&self, error: String) {
        let mut status = self.status.write();
        status.cycles += 1;
        status.failures += 1;
        status.last_error = Some(error);
    }
}

pub struct SyncScheduler {
    sync: Arc<DirectorySync>,
    interval: Duration,
    state: Arc<SyncState>,
}

impl SyncScheduler {
    pub fn new(sync: Arc<DirectorySync>, interval: Duration) -> Self {
        Self {
            sync,
            interval,
            state: Arc::new(SyncState::new()),
        }
    }

    pub fn state(&self) -> Arc<SyncState> {
        self.state.clone()
    }

    /// Run one cycle and record its outcome. Failures are logged, not retried.
    pub async fn tick(&self) {
        match self.sync.run_sync_cycle().await {
            Ok(report) => {
                metrics::counter!("adc_sync_cycles_total", "outcome" => "success").increment(1);
                self.state.record_success(&report);
            }
            Err(e) => {
                metrics::counter!("adc_sync_cycles_total", "outcome" => e.kind()).increment(1);
                error!(error = %e, kind = e.kind(), "Sync cycle failed");
                self.state.record_failure(e.to_string());
            }
        }
    }

    /// Tick until shutdown. A cycle always completes before the next one
    /// starts; ticks missed meanwhile are skipped.
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            resource_type = %self.sync.resource_type(),
            interval = ?self.interval,
            "Starting sync scheduler"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.tick().await,
                _ = shutdown_rx.recv() => {
                    info!("Sync scheduler shutting down");
                    break;
                }
            }
        }
    }
}
