//! pipestepd — pipeline step service daemon.

use anyhow::{Context, Result};

use pipestep_api::ApiState;
use pipestep_core::config::PipestepConfig;
use pipestep_services::Engine;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = PipestepConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let mut config = PipestepConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        PipestepConfig::default()
    });

    if let Some(port) = std::env::args().nth(1) {
        config.server.port = port
            .parse()
            .with_context(|| format!("invalid port argument {port:?}"))?;
    }
    tracing::info!(
        bind = %config.server.bind,
        port = config.server.port,
        "pipestepd starting"
    );

    let engine = Engine::new(&config.engine)?;
    let state = ApiState::new(engine);

    tokio::select! {
        result = pipestep_api::serve(state, &config.server) => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }
    Ok(())
}
