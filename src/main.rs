//! idmd - identity manager and third-party discharger.

use std::sync::Arc;

use anyhow::Context;
use idmd::config::{Config, validate};
use idmd::state::{self, AppState};
use idmd::{http, metrics};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "idmd.toml".to_string());

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "Failed to load config");
        e
    })?;

    if let Err(errors) = validate(&config) {
        for e in &errors {
            error!(error = %e, "Invalid configuration");
        }
        anyhow::bail!("{} configuration error(s) in {config_path}", errors.len());
    }

    info!(
        location = %config.server.location,
        listen = %config.server.listen,
        "Starting idmd"
    );

    let store = state::open_store(&config)
        .await
        .context("failed to open identity store")?;
    let state = Arc::new(AppState::new(&config, store)?);
    info!(public_key = %state.key.public_key(), "Discharge key loaded");

    state::spawn_ticket_sweeper(Arc::clone(&state));
    info!("Ticket sweeper started");

    // Convention: metrics_port = 0 disables the HTTP endpoint (used by tests).
    let metrics_port = config.server.metrics_port;
    if metrics_port == 0 {
        info!("Metrics disabled");
    } else {
        metrics::init();
        info!("Metrics initialized");

        tokio::spawn(async move {
            http::run_metrics_server(metrics_port).await;
        });
        info!(port = metrics_port, "Prometheus HTTP server started");
    }

    let listener = tokio::net::TcpListener::bind(config.server.listen)
        .await
        .with_context(|| format!("failed to bind {}", config.server.listen))?;
    info!(addr = %config.server.listen, "Discharge service listening");

    http::serve(listener, state, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
        }
        info!("Shutting down");
    })
    .await?;

    Ok(())
}
