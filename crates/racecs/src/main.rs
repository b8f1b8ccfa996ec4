//! # racecs
//!
//! RaceCS dashboard server binary: resolves settings, starts logging, and
//! serves `/ws` and `/health` until ctrl-c.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use racecs_logging::LogFormat;
use racecs_server::{RaceServer, ServerConfig};
use racecs_settings::RaceSettings;

/// RaceCS live dashboard server.
#[derive(Parser, Debug)]
#[command(name = "racecs", about = "RaceCS live dashboard server")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Heartbeat period in milliseconds (overrides settings).
    #[arg(long = "heartbeat-ms")]
    heartbeat_ms: Option<u64>,

    /// Settings file (default `~/.racecs/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Log level or filter directive (overrides settings).
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON log lines instead of compact text.
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    fn settings_path(&self) -> PathBuf {
        self.settings
            .clone()
            .unwrap_or_else(racecs_settings::settings_path)
    }

    /// Layer flags over `settings` and re-check the result, so a flag is held
    /// to the same bounds as the file and environment.
    fn apply(&self, settings: &mut RaceSettings) -> Result<()> {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(ms) = self.heartbeat_ms {
            settings.server.heartbeat_interval_ms = ms;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        if self.json_logs {
            settings.logging.format = LogFormat::Json;
        }
        racecs_settings::validate(settings).context("Invalid command-line override")
    }
}

fn server_config(settings: &RaceSettings) -> ServerConfig {
    let server = &settings.server;
    ServerConfig {
        host: server.host.clone(),
        port: server.port,
        heartbeat_interval_ms: server.heartbeat_interval_ms,
        send_queue_capacity: server.send_queue_capacity,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let settings_path = args.settings_path();
    let mut settings = racecs_settings::load_settings_from_path(&settings_path)
        .with_context(|| format!("Failed to load settings from {}", settings_path.display()))?;
    args.apply(&mut settings)?;

    racecs_logging::init_subscriber(&settings.logging.level, settings.logging.format);

    let server = RaceServer::new(server_config(&settings));
    let (addr, handle) = server.listen().await.context("Failed to bind server")?;

    tracing::info!("RaceCS dashboard listening on http://{addr} (websocket at ws://{addr}/ws)");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    server
        .shutdown()
        .graceful_shutdown(server.registry(), vec![handle], None)
        .await;

    Ok(())
}
