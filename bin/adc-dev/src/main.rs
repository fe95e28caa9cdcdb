//! AD Config Connector Development Server
//!
//! Single binary for local development containing:
//! - Directory sync against a real directory, into an in-process store
//! - Compliance evaluation of every change the store publishes
//! - Evaluation intake, health and metrics endpoints
//!
//! Directory settings come from the same environment as the sync server.
//!
//! Every put and delete queues one change for the evaluator. A cycle that
//! queues more than `--notification-capacity` changes before the evaluator
//! catches up loses the oldest ones; raise it for large directories.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use adc_api::{evaluation_router, health_router, HealthState};
use adc_config::SyncConfig;
use adc_directory::LdapDirectory;
use adc_rules::ComplianceEvaluator;
use adc_store::{ChangeNotification, InMemoryConfigStore, InMemoryTypeRegistry};
use adc_sync::{DirectorySync, SyncScheduler};

/// AD Config Connector Development Server
#[derive(Parser, Debug)]
#[command(name = "adc-dev")]
#[command(about = "AD Config Connector development server - sync and evaluation in one binary")]
struct Args {
    /// HTTP port for intake, health and metrics
    #[arg(long, env = "ADC_RULE_PORT", default_value = "8080")]
    port: u16,

    /// Seconds between sync cycles (overrides ADC_SYNC_INTERVAL_SECS)
    #[arg(long)]
    interval_secs: Option<u64>,

    /// Secrets provider for the bind credentials: env, aws-sm
    #[arg(long, env = "ADC_SECRETS_PROVIDER", default_value = "env")]
    secrets_provider: String,

    /// Schema version reported by the in-process type registry
    #[arg(long, default_value = "dev")]
    schema_version: String,

    /// Page size of the in-process store's listings
    #[arg(long, default_value = "100")]
    page_size: usize,

    /// Changes buffered for the evaluator before the oldest are dropped
    #[arg(long, env = "ADC_DEV_NOTIFICATION_CAPACITY", default_value = "65536")]
    notification_capacity: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    adc_common::logging::init();

    let args = Args::parse();

    info!("Starting AD Config Connector Dev Server");

    let mut config = SyncConfig::load()?;
    config.secrets_provider = args.secrets_provider.clone();
    if let Some(secs) = args.interval_secs.filter(|s| *s > 0) {
        config.interval_secs = secs;
    }

    let metrics = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics recorder: {}", e))?;

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // 1. In-process store and registry
    let store = Arc::new(
        InMemoryConfigStore::with_page_size(args.page_size)
            .with_notification_capacity(args.notification_capacity),
    );
    let registry =
        Arc::new(InMemoryTypeRegistry::new().with_type(&config.resource_type, &args.schema_version));
    info!(
        resource_type = %config.resource_type,
        schema_version = %args.schema_version,
        "In-process store initialized"
    );

    // 2. Evaluate every change the store publishes
    let evaluator = Arc::new(ComplianceEvaluator::new(store.clone()));
    let evaluation_handle = {
        let notifications = store.subscribe();
        let evaluator = evaluator.clone();
        let shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(evaluate_changes(evaluator, notifications, shutdown_rx))
    };

    // 3. Sync scheduler
    let secrets = adc_secrets::create_provider(&config.secrets_provider).await?;
    let interval = Duration::from_secs(config.interval_secs);
    let sync = Arc::new(DirectorySync::new(
        config,
        registry,
        secrets,
        Arc::new(LdapDirectory::new()),
        store,
    ));
    let scheduler = SyncScheduler::new(sync, interval);
    let sync_state = scheduler.state();
    let scheduler_handle = {
        let shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move { scheduler.run(shutdown_rx).await })
    };

    // 4. HTTP endpoints
    let app = evaluation_router(evaluator)
        .merge(health_router(HealthState {
            sync_state: Some(sync_state),
            metrics: Some(metrics),
        }))
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = TcpListener::bind(addr).await?;
    info!("Dev server listening on http://{}", addr);

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

    info!("AD Config Connector Dev Server started");
    info!("Press Ctrl+C to shutdown");

    shutdown_signal().await;
    info!("Shutdown signal received...");

    let _ = shutdown_tx.send(());

    let _ = tokio::time::timeout(Duration::from_secs(30), async {
        let _ = scheduler_handle.await;
        let _ = evaluation_handle.await;
        let _ = server_handle.await;
    })
    .await;

    info!("AD Config Connector Dev Server shutdown complete");
    Ok(())
}

async fn evaluate_changes(
    evaluator: Arc<ComplianceEvaluator>,
    mut notifications: broadcast::Receiver<ChangeNotification>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            received = notifications.recv() => match received {
                Ok(change) => {
                    if let Err(e) = evaluator
                        .evaluate(&change.configuration_item, &change.result_token)
                        .await
                    {
                        error!(
                            resource_id = %change.configuration_item.resource_id,
                            error = %e,
                            "Evaluation failed"
                        );
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(
                        skipped,
                        "Evaluator fell behind; changes skipped, raise --notification-capacity"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = shutdown_rx.recv() => {
                info!("Evaluator shutting down");
                break;
            }
        }
    }
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
