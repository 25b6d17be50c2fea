mod client;
mod config;
mod keys;
mod store;
mod tui;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use client::bridge::BridgeClient;
use config::ConfigFile;
use store::SessionStore;

#[derive(Parser, Debug)]
#[command(
    name = "chatterm",
    version,
    about = "A modal terminal client for your phone's messages",
    long_about = None,
)]
struct Args {
    /// Forget the paired device and exit
    #[arg(long)]
    clear_session: bool,

    /// Write a default config file to ~/.config/chatterm/config.toml and exit
    #[arg(long)]
    init: bool,

    /// Override the bridge endpoint URL
    #[arg(long, env = "CHATTERM_ENDPOINT")]
    endpoint: Option<String>,
}

/// Log to `<config dir>/chatterm.log`; the terminal belongs to the TUI.
/// Filter comes from `CHATTERM_LOG` (default `info`).
fn init_logging() {
    let path = config::config_dir().join("chatterm.log");
    let file = match std::fs::OpenOptions::new().create(true).append(true).open(&path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("warning: cannot open log file {}: {e}", path.display());
            return;
        }
    };
    let filter = EnvFilter::try_from_env("CHATTERM_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(std::sync::Mutex::new(file))
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let dir = config::config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create config directory {}", dir.display()))?;

    // ── --init ────────────────────────────────────────────────────────────────
    if args.init {
        let path = ConfigFile::write_default_if_missing()?;
        println!("Config written to: {}", path.display());
        println!("Edit it, then run: chatterm");
        return Ok(());
    }

    let store = SessionStore::default_location();

    // ── --clear-session ───────────────────────────────────────────────────────
    if args.clear_session {
        store.clear()?;
        println!("Session cleared ({})", store.path().display());
        return Ok(());
    }

    init_logging();

    let mut cfg = ConfigFile::load()?;
    if let Some(endpoint) = args.endpoint {
        cfg.endpoint = endpoint;
    }
    let bridge = Arc::new(BridgeClient::new(&cfg.endpoint)?);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received");
                cancel.cancel();
            }
        });
    }

    info!(endpoint = %cfg.endpoint, "starting chatterm {}", env!("CARGO_PKG_VERSION"));
    tui::run(cfg, bridge.clone(), bridge, store, cancel).await
}
