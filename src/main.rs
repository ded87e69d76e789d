//! airlink server
//!
//! Run with: cargo run -- serve
//!
//! Configuration is read from `--config`, else the first of
//! `~/.config/airlink/config.toml`, `/etc/airlink/config.toml` and
//! `./config.toml`. `AIRLINK_*` environment variables override the file and
//! command-line flags override both. `RUST_LOG` overrides `logging.level`.

use airlink::api::{serve, AppState};
use airlink::config::{generate_default_config, Config, ConfigOrigin, DisplayMode};
use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "airlink")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Device control plane: command sessions, telemetry broadcast and camera relay")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Config file (defaults to the standard locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the server (default)
    Serve {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// What to do with ingested frames (save, window, none)
        #[arg(short, long)]
        display_mode: Option<DisplayMode>,

        /// Camera URL reported in camera status
        #[arg(long)]
        camera_url: Option<String>,

        /// Broadcast interval in seconds
        #[arg(short, long)]
        interval: Option<f64>,

        /// Directory for saved frames
        #[arg(long)]
        save_dir: Option<PathBuf>,
    },

    /// Print a documented default config file
    Config {
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let command = cli.command.unwrap_or(Commands::Serve {
        host: None,
        port: None,
        display_mode: None,
        camera_url: None,
        interval: None,
        save_dir: None,
    });

    match command {
        Commands::Config { output } => {
            let content = generate_default_config();
            match output {
                Some(path) => {
                    std::fs::write(&path, content)
                        .with_context(|| format!("writing {}", path.display()))?;
                    println!("Wrote default config to {}", path.display());
                }
                None => print!("{}", content),
            }
            Ok(())
        }
        Commands::Serve {
            host,
            port,
            display_mode,
            camera_url,
            interval,
            save_dir,
        } => {
            let (mut config, origin) = match &cli.config {
                Some(path) => (Config::load_with_env(path)?, ConfigOrigin::file(path)),
                None => Config::discover(),
            };

            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(mode) = display_mode {
                config.camera.display_mode = mode;
            }
            if let Some(url) = camera_url {
                config.camera.url = Some(url);
            }
            if let Some(interval) = interval {
                config.broadcast.interval_secs = interval;
            }
            if let Some(dir) = save_dir {
                config.camera.save_dir = dir;
            }

            init_tracing(&config);
            tracing::info!("Starting airlink v{}", env!("CARGO_PKG_VERSION"));
            origin.log();

            let state = Arc::new(AppState::new(config));
            serve(state).await.context("server failed")?;

            tracing::info!("airlink stopped");
            Ok(())
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "airlink={level},tower_http={level}",
            level = config.logging.level
        ))
    });

    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.format.eq_ignore_ascii_case("json") {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
