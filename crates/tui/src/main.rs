mod app;
mod forms;

use std::{
    fs::{self, OpenOptions},
    sync::Arc,
};

use anyhow::{Context, Result};
use tracing_subscriber::{prelude::*, EnvFilter};
use tourbook_core::{
    config::{self, AppConfig},
    HttpApi, FileStore, SessionManager,
};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;

    config::ensure_default_config()?;
    let config = AppConfig::load()?;

    let api = Arc::new(HttpApi::new(config.api.clone()).context("failed to build API client")?);
    let base_url = api.base_url().to_string();
    let store = Arc::new(FileStore::new(config.session_file()));
    let session = Arc::new(SessionManager::new(api.clone(), store));
    session.initialize();
    tracing::info!(%base_url, authenticated = session.is_authenticated(), "starting tourbook");

    let mut app = app::TourBookApp::new(api, session, base_url);
    app.run().await
}

fn init_logging() -> Result<()> {
    let log_dir = std::env::current_dir()?.join("logs");
    fs::create_dir_all(&log_dir)?;
    let log_path = log_dir.join("tourbook.log");

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // The terminal belongs to the UI, so everything goes to the log file.
    let file_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_ansi(false)
        .compact()
        .with_writer(move || {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&log_path)
                .expect("failed to open log file")
        });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .init();

    Ok(())
}
