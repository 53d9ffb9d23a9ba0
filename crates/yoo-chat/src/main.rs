//! # yoo-chat
//!
//! yoo-chat server binary. Loads settings, wires the token issuer into the
//! connection server, and serves until Ctrl-C.

#![deny(unsafe_code)]

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use yoo_auth::TokenIssuer;
use yoo_server::{NoopProducer, ServerConfig, YooServer};
use yoo_settings::YooSettings;

/// yoo-chat WebSocket server.
#[derive(Parser, Debug)]
#[command(name = "yoo-chat", about = "Authenticated WebSocket connection server")]
struct Cli {
    /// Settings file (defaults to `~/.yoo-chat/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Log level or filter directive (overrides settings; `RUST_LOG` wins).
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    /// Load layered settings and apply command-line overrides on top.
    fn load_settings(&self) -> Result<YooSettings> {
        let mut settings = match &self.config {
            Some(path) => yoo_settings::load_settings_from_path(path)
                .with_context(|| format!("Failed to load settings from {}", path.display()))?,
            None => yoo_settings::load_settings().context("Failed to load settings")?,
        };

        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        Ok(settings)
    }
}

/// Serve with validated `settings` until `shutdown_signal` resolves.
async fn run(settings: YooSettings, shutdown_signal: impl Future<Output = ()>) -> Result<()> {
    let secret = settings.auth.secret().context("Missing signing secret")?;
    let issuer = TokenIssuer::new(&secret, settings.auth.access_ttl(), settings.auth.refresh_ttl());

    let config = ServerConfig::from_settings(&settings);
    let shutdown_timeout = config.shutdown_timeout;
    let mut server = YooServer::new(config, issuer, Arc::new(NoopProducer));
    match yoo_server::metrics::install_recorder() {
        Ok(handle) => server = server.with_metrics(handle),
        Err(err) => warn!(error = %err, "metrics recorder unavailable, /metrics disabled"),
    }

    let (addr, handle) = server.listen().await.context("Failed to start server")?;
    info!(%addr, "yoo-chat ready");

    shutdown_signal.await;

    info!("shutting down");
    server
        .shutdown()
        .graceful_shutdown(vec![handle], Some(shutdown_timeout))
        .await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // JWT_SECRET_KEY may live in a local .env file.
    let _ = dotenv::dotenv();
    let args = Cli::parse();

    let settings = args.load_settings()?;
    yoo_logging::init_subscriber(&settings.logging.level, settings.logging.format);
    settings.validate().context("Invalid settings")?;

    run(settings, async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c, shutting down");
        }
    })
    .await
}
