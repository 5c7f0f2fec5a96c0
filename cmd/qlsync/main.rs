use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local, Utc};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[path = "../../src/shared/mod.rs"]
mod shared;
#[path = "../../internal/configure/mod.rs"]
mod configure;

use shared::config::{self, Configuration, CookieSource};
use shared::logging::{init_cli_logging, mask_secret};
use shared::models::{ControlMessage, StatusSnapshot, SyncResponse};

/// A manual sync makes several panel calls, each bounded at 30 s.
const MANUAL_SYNC_TIMEOUT: Duration = Duration::from_secs(150);
const STATUS_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "qlsync")]
#[command(about = "Push browser session cookies into a Qinglong panel variable")]
struct Cli {
    /// Configuration file (defaults to ~/.config/qlsync/config.json)
    #[arg(long, global = true, env = "QLSYNC_CONFIG_PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Set panel credentials and sync options interactively
    Configure,
    /// Print the saved configuration
    Show,
    /// Ask the running daemon to sync now
    SyncNow,
    /// Print the daemon's status
    Status,
    /// Show CLI version
    Version,
}

fn main() {
    init_cli_logging();
    let cli = Cli::parse();
    let path = cli
        .config
        .map(|p| config::expand_path(p.to_string_lossy().into_owned()))
        .unwrap_or_else(config::resolve_config_path);

    let result = match cli.command {
        Command::Configure => configure::run(&path).map(|_| ()),
        Command::Show => cmd_show(&path),
        Command::SyncNow => cmd_sync_now(&path),
        Command::Status => cmd_status(&path),
        Command::Version => {
            println!("qlsync {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    };

    if let Err(err) = result {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

fn cmd_show(path: &Path) -> Result<()> {
    let cfg = config::load_or_default(path)?;
    println!("Config file:        {}", path.display());
    println!("Panel URL:          {}", or_unset(&cfg.panel_url));
    println!("Client ID:          {}", or_unset(&cfg.client_id));
    let secret = if cfg.client_secret.is_empty() {
        "(not set)".to_string()
    } else {
        mask_secret(&cfg.client_secret)
    };
    println!("Client secret:      {secret}");
    println!("Variable name:      {}", cfg.variable_name);
    println!("Login page:         {}", cfg.target_url);
    println!("Auto sync:          {}", on_off(cfg.auto_sync));
    println!("Interval (minutes): {}", cfg.sync_interval_minutes);
    println!("Implicit create:    {}", on_off(cfg.allow_implicit_create));
    match &cfg.cookie_source {
        CookieSource::Netscape { path } => println!("Cookies:            netscape {}", path.display()),
        CookieSource::Firefox { path } => println!("Cookies:            firefox {}", path.display()),
    }
    println!("Control address:    {}", cfg.control_addr);
    println!("Last sync:          {}", describe_last_sync(cfg.last_sync_at));
    Ok(())
}

fn cmd_sync_now(path: &Path) -> Result<()> {
    let cfg = config::load_or_default(path)?;
    check_ready_to_sync(&cfg)?;

    let response: SyncResponse = http_client(MANUAL_SYNC_TIMEOUT)?
        .post(control_url(&cfg, "actions"))
        .json(&ControlMessage::SyncNow)
        .send()
        .with_context(|| daemon_hint(&cfg))?
        .error_for_status()?
        .json()?;

    if response.success {
        let at = response
            .timestamp
            .and_then(DateTime::<Utc>::from_timestamp_millis);
        println!("Sync succeeded at {}", describe_last_sync(at));
        return Ok(());
    }
    bail!(
        "Sync failed: {}",
        response.error.unwrap_or_else(|| "unknown error".to_string())
    )
}

/// Same requirements the daemon applies to a sync attempt; the interval
/// only matters to the timer.
fn check_ready_to_sync(cfg: &Configuration) -> Result<()> {
    cfg.validate_for_sync()
        .map_err(|e| anyhow::anyhow!("{e}; run `qlsync configure` first"))
}

fn cmd_status(path: &Path) -> Result<()> {
    let cfg = config::load_or_default(path)?;
    let status: StatusSnapshot = http_client(STATUS_TIMEOUT)?
        .get(control_url(&cfg, "status"))
        .send()
        .with_context(|| daemon_hint(&cfg))?
        .error_for_status()?
        .json()?;

    let badge = if status.badge.text.is_empty() {
        "(clear)".to_string()
    } else {
        format!("{} ({})", status.badge.text, status.badge.color)
    };
    println!("Badge:              {badge}");
    println!("Last sync:          {}", describe_last_sync(status.last_sync_at));
    println!("Auto sync:          {}", on_off(status.auto_sync));
    println!("Interval (minutes): {}", status.sync_interval_minutes);
    println!("Sync running:       {}", if status.sync_in_flight { "yes" } else { "no" });
    Ok(())
}

fn http_client(timeout: Duration) -> Result<reqwest::blocking::Client> {
    Ok(reqwest::blocking::Client::builder().timeout(timeout).build()?)
}

fn control_url(cfg: &Configuration, endpoint: &str) -> String {
    format!("http://{}/api/v0/{endpoint}", cfg.control_addr)
}

fn daemon_hint(cfg: &Configuration) -> String {
    format!(
        "could not reach qlsync-daemon on {}; is it running?",
        cfg.control_addr
    )
}

fn describe_last_sync(at: Option<DateTime<Utc>>) -> String {
    match at {
        Some(at) => at
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string(),
        None => "never synced".to_string(),
    }
}

fn or_unset(value: &str) -> &str {
    if value.is_empty() {
        "(not set)"
    } else {
        value
    }
}

fn on_off(value: bool) -> &'static str {
    if value {
        "on"
    } else {
        "off"
    }
}
