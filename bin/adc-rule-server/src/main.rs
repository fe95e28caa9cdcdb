//! AD Config Connector Rule Server
//!
//! Receives configuration change notifications on `POST /evaluate`, checks
//! the password-never-expires flag and reports the verdict to AWS Config.
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `ADC_RULE_PORT` | `8080` | Intake, health and metrics port |
//! | `RUST_LOG` | `info` | Log level |

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use adc_api::{evaluation_router, health_router, HealthState};
use adc_config::RuleConfig;
use adc_rules::ComplianceEvaluator;
use adc_store::AwsConfigStore;

#[tokio::main]
async fn main() -> Result<()> {
    adc_common::logging::init();

    info!("Starting AD Config Connector Rule Server");

    let config = RuleConfig::load()?;

    let metrics = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics recorder: {}", e))?;

    let aws = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let store = Arc::new(AwsConfigStore::from_sdk_config(&aws));
    let evaluator = Arc::new(ComplianceEvaluator::new(store));

    let app = evaluation_router(evaluator)
        .merge(health_router(HealthState {
            sync_state: None,
            metrics: Some(metrics),
        }))
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.listen_port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Rule server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("AD Config Connector Rule Server shutdown complete");
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

    info!("Shutdown signal received...");
}
