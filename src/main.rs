use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::info;

mod config;
mod error;
mod live_scores;
mod relay;
mod server;

use config::Config;
use live_scores::EspnScoreboard;
use relay::{ChannelRegistry, SessionOrchestrator};
use server::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;

    let sports = config.sports()?;
    for sport in &sports {
        info!(
            "Tracking {} every {:?} from {} endpoint(s) as '{}'",
            sport.tag,
            sport.interval,
            sport.endpoints.len(),
            sport.event_name
        );
    }

    let fetcher = Arc::new(EspnScoreboard::new(config.upstream_timeout())?);
    let registry = Arc::new(ChannelRegistry::new());
    let orchestrator = Arc::new(SessionOrchestrator::new(
        sports,
        fetcher,
        Arc::clone(&registry) as Arc<dyn relay::Broadcaster>,
    ));

    let state = AppState {
        orchestrator: Arc::clone(&orchestrator),
        registry,
        channel_capacity: config.channel_capacity,
    };
    let app = server::router(state, &config.static_dir);

    let addr = config.listen_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Server listening on port {}", addr.port());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    orchestrator.shutdown().await;
    info!("Shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
