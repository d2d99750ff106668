//! `doppler serve` subcommand: starts the HTTP facade without any embedding
//! application driving `facade::Engine` directly (teacher's `cli/` pattern).

use crate::config::{ApplicationConfig, ConfigLoader};
use crate::error::{DopplerError, DopplerResult};
use crate::facade::Engine;
use crate::server::{self, AppState};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone, Parser)]
#[command(name = "serve", about = "Start the Doppler inference server")]
pub struct ServeArgs {
    /// Server host, overrides the config file value.
    #[arg(long)]
    pub host: Option<String>,

    /// Server port, overrides the config file value.
    #[arg(long)]
    pub port: Option<u16>,

    /// Models directory, overrides the config file value.
    #[arg(long)]
    pub models_dir: Option<PathBuf>,

    /// Probe the GPU device and select a tier before serving requests.
    #[arg(long)]
    pub probe_device: bool,
}

impl Default for ServeArgs {
    fn default() -> Self {
        Self { host: None, port: None, models_dir: None, probe_device: false }
    }
}

fn apply_overrides(mut config: ApplicationConfig, args: &ServeArgs) -> ApplicationConfig {
    if let Some(host) = &args.host {
        config.server.host = host.clone();
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(models_dir) = &args.models_dir {
        config.models_dir = models_dir.clone();
    }
    config
}

pub async fn serve_command(args: ServeArgs) -> DopplerResult<()> {
    let base = ConfigLoader::load().map_err(DopplerError::Config)?;
    let config = apply_overrides(base, &args);

    let mut engine = Engine::new(config.clone());
    if args.probe_device {
        let capabilities = engine.init_device()?;
        info!(tier = ?capabilities.tier, "device probe succeeded");
    }

    let state = AppState::new(engine);
    let router = server::create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let socket_addr: std::net::SocketAddr = addr
        .parse()
        .map_err(|e| DopplerError::Config(format!("invalid socket address '{addr}': {e}")))?;

    let listener = tokio::net::TcpListener::bind(&socket_addr).await?;
    info!(%addr, "doppler server listening");
    axum::serve(listener, router)
        .await
        .map_err(|e| DopplerError::Config(format!("server error: {e}")))
}
