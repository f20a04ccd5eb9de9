mod aggregator;
mod api;
mod collector;
mod config;
mod error;
mod fetcher;
mod models;
mod normalizer;
mod orchestrator;
mod range;
mod report;
mod stripe;
#[cfg(test)]
mod testing;

use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stdout)
        .with_target(false)
        .init();

    info!("Connect reports starting...");

    let cfg = config::load()?;
    info!("  API base: {}", cfg.stripe.api_base);
    info!("  Port: {}", cfg.server.port);
    info!("  Account concurrency: {}", cfg.report.account_concurrency);

    let config::Config {
        stripe,
        server,
        report,
    } = cfg;

    // One scoped client per process; it owns the platform credential.
    let client = Arc::new(stripe::StripeClient::new(stripe)?);
    let state = api::AppState { client, report };

    let api_handle = tokio::spawn(api::serve(server, state));

    tokio::select! {
        res = api_handle => match res {
            Ok(Ok(_)) => info!("API exited cleanly"),
            Ok(Err(e)) => error!("API error: {:?}", e),
            Err(e) => error!("API task panicked: {:?}", e),
        },
        _ = signal::ctrl_c() => {
            info!("Shutdown signal received, stopping...");
        }
    }

    info!("Connect reports stopped.");
    Ok(())
}
