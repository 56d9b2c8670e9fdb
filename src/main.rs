// main.rs
// Daemon: loads configuration, prepares MongoDB and runs the daily sweeps
// until Ctrl-C.

use anyhow::Result;
use dotenvy::dotenv;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use fundkeeper::{config::Config, scheduler, state};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fundkeeper=info")),
        )
        .init();

    let config = Config::from_env()?;
    let state = Arc::new(state::init_state(&config).await?);
    tracing::info!(
        db = %config.mongodb_db,
        base_currency = %state.currency.base(),
        "state ready"
    );

    let mut tasks = scheduler::spawn_sweeps(state, config.schedule);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
        }
        Some(joined) = tasks.join_next() => {
            if let Err(err) = joined {
                tracing::error!("sweep task ended: {err}");
            }
        }
    }
    tasks.shutdown().await;

    Ok(())
}
