pub mod api;
pub mod db;
pub mod error;
pub mod ingest;
pub mod notifications;
pub mod occupancy;
pub mod settings;
mod utils;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use db::Database;
use ingest::Ingestor;
use log::info;
use notifications::{ChangeDetector, NotificationController};
use occupancy::SnapshotAssembler;
use settings::Settings;

const CONFIG_ENV: &str = "DESKWATCH_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "deskwatch.json";

pub async fn run() -> anyhow::Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    info!("Deskwatch starting up...");

    let config_path = std::env::var(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
    let settings = Settings::load(&config_path)?;

    let database = Database::new(settings.server.database_path.clone())?;

    let mut notifications = NotificationController::new(&settings.notifications);
    notifications.start(ChangeDetector::new(
        database.clone(),
        database.clone(),
        &settings.occupancy,
        &settings.notifications,
    ))?;

    let state = api::AppState {
        db: database.clone(),
        snapshots: Arc::new(SnapshotAssembler::new(
            database.clone(),
            database.clone(),
            &settings.occupancy,
        )),
        ingestor: Arc::new(Ingestor::new(database.clone(), database, &settings.ingest)),
        reports: notifications.sender(),
    };

    let listener = tokio::net::TcpListener::bind(&settings.server.bind_address)
        .await
        .with_context(|| format!("failed to bind {}", settings.server.bind_address))?;
    info!("HTTP server listening on {}", settings.server.bind_address);

    let served = axum::serve(listener, api::router(state))
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                log::error!("Failed to listen for shutdown signal: {err}");
                std::future::pending::<()>().await;
            }
            info!("Shutdown signal received");
        })
        .await
        .context("HTTP server failed");

    notifications.stop().await?;
    served
}
