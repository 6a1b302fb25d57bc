//! # huddle
//!
//! Presence relay binary: loads settings, starts logging and metrics, and
//! serves the WebSocket/HTTP relay until Ctrl-C.

#![deny(unsafe_code)]

mod logging;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use huddle_server::config::ServerConfig;
use huddle_server::server::HuddleServer;
use huddle_settings::{HuddleSettings, LogFormat, load_settings_from_path, settings_path};

/// Real-time presence and chat relay.
#[derive(Parser, Debug)]
#[command(name = "huddle", about = "Real-time presence and chat relay")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (default `~/.huddle/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level or filter directives (overrides settings).
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON log lines.
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    /// Apply flags on top of loaded settings.
    fn apply(&self, settings: &mut HuddleSettings) {
        if let Some(ref host) = self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(ref level) = self.log_level {
            settings.logging.level.clone_from(level);
        }
        if self.json_logs {
            settings.logging.format = LogFormat::Json;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let path = cli.config.clone().unwrap_or_else(settings_path);
    let mut settings = load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    cli.apply(&mut settings);

    logging::init(&settings.logging.level, settings.logging.format)?;
    let metrics_handle = huddle_server::metrics::install_recorder()
        .context("Failed to install metrics recorder")?;

    let server = HuddleServer::new(ServerConfig::from(&settings.server), metrics_handle);
    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!(
        %addr,
        origins = ?settings.server.allowed_origins,
        "huddle ready"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!(
        sessions = server.engine().connection_count(),
        "shutting down"
    );
    if !server.shutdown().graceful_shutdown(vec![handle], None).await {
        tracing::warn!("sessions still open at exit");
    }
    Ok(())
}
