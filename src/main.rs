//! Sketchroom server
//!
//! Run with: cargo run -- serve
//!
//! # Configuration
//!
//! Settings come from a TOML file (`--config`, or the first of
//! `~/.config/sketchroom/config.toml`, `/etc/sketchroom/config.toml`,
//! `./sketchroom.toml`) with `SKETCHROOM_*` environment overrides on top.
//! `RUST_LOG` takes precedence over the configured log level.

use clap::{Parser, Subcommand};
use sketchroom::config::{generate_default_config, Config, LoggingConfig};
use sketchroom::{serve, AppState};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "sketchroom")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Collaborative drawing hub with live stroke relay and image analysis")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the hub (default)
    Serve {
        /// Config file (default: search the standard locations)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Override the bind host
        #[arg(long)]
        host: Option<String>,
        /// Override the bind port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Generate default config file
    InitConfig {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve {
        config: None,
        host: None,
        port: None,
    }) {
        Commands::Serve { config, host, port } => {
            let mut config = match config {
                Some(path) => Config::load_with_env(&path)?,
                None => Config::load_default(),
            };
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }

            init_tracing(&config.logging);

            tracing::info!("Starting Sketchroom v{}", env!("CARGO_PKG_VERSION"));
            tracing::info!(
                max_clients = config.hub.max_clients,
                broadcast_clear = config.hub.broadcast_clear,
                replay_on_join = config.hub.replay_on_join,
                "Hub settings"
            );

            let state = AppState::new(&config)?;
            tracing::info!(
                classifier = state.coordinator.classifier_name(),
                timeout_secs = config.classifier.timeout_secs,
                "Analysis coordinator ready"
            );

            serve(state, &config.server).await?;
        }

        Commands::InitConfig { output } => {
            let content = generate_default_config();
            match output {
                Some(path) => {
                    std::fs::write(&path, content)?;
                    println!("Wrote default config to {}", path.display());
                }
                None => print!("{}", content),
            }
        }
    }

    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("sketchroom={},tower_http=info", logging.level).into()
    });

    let registry = tracing_subscriber::registry().with(filter);

    if logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
