use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

#[path = "../shared/mod.rs"]
mod shared;
#[path = "../sync/mod.rs"]
mod sync;

#[derive(Parser)]
#[command(name = "qlsync-daemon")]
#[command(about = "qlsync daemon - keeps the panel's cookie variable in sync with the browser session")]
struct Args {
    /// Configuration file (defaults to ~/.config/qlsync/config.json)
    #[arg(long, env = "QLSYNC_CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Directory for rotated log files
    #[arg(long, env = "QLSYNC_LOG_DIR")]
    log_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_dir = args.log_dir.unwrap_or_else(shared::config::logs_dir);
    let _ = shared::logging::init_service_logging(&log_dir, "qlsync_daemon");

    let config_path = args.config.unwrap_or_else(shared::config::resolve_config_path);
    let store = Arc::new(shared::FileConfigStore::open(config_path)?);
    tracing::info!(path = %store.path().display(), "configuration loaded");

    sync::run(store).await
}
