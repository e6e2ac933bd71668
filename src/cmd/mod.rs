//! CLI command implementations.

use std::path::{Path, PathBuf};

use anyhow::Result;

use storyboard::config::Config;
use storyboard::server::{ServerConfig, start_server};
use storyboard::store::TrackerDb;

/// `storyboard serve` — run the tracker API server.
pub async fn cmd_serve(
    project_dir: &Path,
    port: Option<u16>,
    db_path: Option<PathBuf>,
    dev: bool,
) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("storyboard=info")),
        )
        .init();

    let config = Config::load(project_dir, port, db_path)?;
    start_server(ServerConfig {
        port: config.port,
        db_path: config.db_path,
        dev_mode: dev,
    })
    .await
}

/// `storyboard init` — initialize the database without starting the server.
pub fn cmd_init(project_dir: &Path, db_path: Option<PathBuf>) -> Result<()> {
    let config = Config::load(project_dir, None, db_path)?;
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    TrackerDb::new(&config.db_path)?;
    println!(
        "{} Tracker database initialized at {}",
        console::style("✓").green(),
        config.db_path.display()
    );
    Ok(())
}
