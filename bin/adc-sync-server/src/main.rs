//! AD Config Connector Sync Server
//!
//! Reconciles directory users into AWS Config custom resources on a fixed
//! interval and serves health and metrics.
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `LDAP_FQDN` | - | Directory host (required) |
//! | `LDAP_PORT` | - | Directory port (required) |
//! | `LDAP_SECURE` | - | `true` for LDAPS (required) |
//! | `AD_DOMAIN_NAME` | - | Down-level domain for the bind user (required) |
//! | `AD_DOMAIN_BASE` | - | Search base DN (required) |
//! | `AD_BIND_USER_SM_ARN` | - | Secret holding bind credentials (required) |
//! | `RESOURCE_TYPE` | - | Registered custom resource type (required) |
//! | `ADC_SYNC_INTERVAL_SECS` | `60` | Seconds between cycles |
//! | `ADC_SYNC_RUN_ONCE` | `false` | Run a single cycle and exit |
//! | `ADC_SECRETS_PROVIDER` | `aws-sm` | `aws-sm` or `env` |
//! | `ADC_METRICS_PORT` | `9090` | Metrics/health port |
//! | `RUST_LOG` | `info` | Log level |

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::signal;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use adc_api::{health_router, HealthState};
use adc_config::{ServerConfig, SyncConfig};
use adc_directory::LdapDirectory;
use adc_store::{AwsConfigStore, CloudFormationTypeRegistry};
use adc_sync::{DirectorySync, SyncScheduler};

#[tokio::main]
async fn main() -> Result<()> {
    adc_common::logging::init();

    info!("Starting AD Config Connector Sync Server");

    let config = SyncConfig::load()?;
    let server_config = ServerConfig::load()?;

    let metrics = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics recorder: {}", e))?;

    let aws = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let registry = Arc::new(CloudFormationTypeRegistry::from_sdk_config(&aws));
    let store = Arc::new(AwsConfigStore::from_sdk_config(&aws));
    let secrets = adc_secrets::create_provider(&config.secrets_provider).await?;
    info!(
        provider = secrets.name(),
        directory = %config.directory.url(),
        resource_type = %config.resource_type,
        "Clients initialized"
    );

    let interval = Duration::from_secs(config.interval_secs);
    let run_once = config.run_once;
    let sync = Arc::new(DirectorySync::new(
        config,
        registry,
        secrets,
        Arc::new(LdapDirectory::new()),
        store,
    ));

    if run_once {
        let report = sync.run_sync_cycle().await.map_err(|e| {
            error!(error = %e, kind = e.kind(), "Sync cycle failed");
            e
        })?;
        info!(
            upserted = report.upserted,
            removed = report.removed.len(),
            "Single sync cycle complete"
        );
        return Ok(());
    }

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let scheduler = SyncScheduler::new(sync, interval);
    let sync_state = scheduler.state();
    let scheduler_handle = {
        let shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move { scheduler.run(shutdown_rx).await })
    };

    let metrics_addr = SocketAddr::from(([0, 0, 0, 0], server_config.metrics_port));
    info!("Metrics server listening on http://{}/metrics", metrics_addr);

    let app = health_router(HealthState {
        sync_state: Some(sync_state),
        metrics: Some(metrics),
    })
    .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(metrics_addr).await?;
    let server_handle = {
        let mut shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.recv().await;
                })
                .await
                .ok();
        })
    };

    info!("AD Config Connector Sync Server started");
    info!("Press Ctrl+C to shutdown");

    shutdown_signal().await;
    info!("Shutdown signal received...");

    let _ = shutdown_tx.send(());

    let _ = tokio::time::timeout(Duration::from_secs(30), async {
        let _ = scheduler_handle.await;
        let _ = server_handle.await;
    })
    .await;

    info!("AD Config Connector Sync Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
