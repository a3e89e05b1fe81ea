//! watchparty-relay binary: load config, bind, serve until Ctrl-C.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{reload, EnvFilter};
use watchparty_relay::{serve, Hub};

#[derive(Parser)]
#[command(name = "watchparty-relay", about = "Presence and signaling relay for watch parties")]
struct Args {
    /// Path to a config file (defaults to the platform config dir).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on, overriding the config file.
    #[arg(short, long)]
    port: Option<u16>,

    /// Address to bind, overriding the config file.
    #[arg(long)]
    bind: Option<String>,
}

fn default_filter(level: &str) -> EnvFilter {
    EnvFilter::new(format!("watchparty_relay={level},watchparty_config={level}"))
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Installed before the config loads. The configured level replaces the
    // default afterwards unless RUST_LOG is set.
    let env_filter = EnvFilter::try_from_default_env().ok();
    let from_env = env_filter.is_some();
    let (filter, filter_handle) =
        reload::Layer::new(env_filter.unwrap_or_else(|| default_filter("info")));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = match watchparty_config::load_config_from(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Failed to load config");
            return ExitCode::FAILURE;
        }
    };

    if !from_env {
        let level = config.logging.level.as_str();
        if let Err(e) = filter_handle.reload(default_filter(level)) {
            tracing::warn!(error = %e, "Failed to apply configured log level");
        }
    }

    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(bind) = args.bind {
        config.server.bind_address = bind;
    }

    let addr = config.server.listen_addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "Failed to bind TCP listener");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!("watchparty-relay listening on {}", addr);

    let hub = Hub::from_config(&config);
    let reaper = hub.spawn_reaper(config.rooms.reap_interval());

    tokio::select! {
        _ = serve(listener, hub) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
        }
    }

    reaper.abort();
    ExitCode::SUCCESS
}
