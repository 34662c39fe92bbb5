//! Switchyard Server
//!
//! Run with: cargo run -- serve
//!
//! # Configuration
//!
//! Read from `--config <path>`, else the first of
//! `<config dir>/switchyard/config.toml`, `/etc/switchyard/config.toml` and
//! `./config.toml`. Environment variables override the file:
//! - `SWITCHYARD_HOST`, `SWITCHYARD_PORT`: listener address
//! - `SWITCHYARD_TICK_MS`: housekeeping interval
//! - `SWITCHYARD_LOCK_BACKEND`, `SWITCHYARD_DATABASE`: global lock store
//! - `SWITCHYARD_LOG_LEVEL`, `SWITCHYARD_LOG_FORMAT`: logging
//! - `RUST_LOG`: full filter, wins over `SWITCHYARD_LOG_LEVEL`

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use switchyard::api::{serve, AppState};
use switchyard::config::{generate_default_config, Config, ConfigError, LoggingConfig};
use switchyard::event::Event;
use switchyard::hub::Hub;
use switchyard::store::open_store;
use switchyard::trigger::Tier;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "switchyard")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Realtime event-routing hub")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: search the standard locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the hub (WebSocket on /ws, HTTP trigger on /api/v1/trigger)
    Serve {
        /// Override the listener host
        #[arg(long)]
        host: Option<String>,
        /// Override the listener port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Config { output } => {
            let content = generate_default_config();
            match output {
                Some(path) => {
                    std::fs::write(&path, content)
                        .with_context(|| format!("writing {}", path.display()))?;
                    println!("Config written to {}", path.display());
                }
                None => print!("{content}"),
            }
            Ok(())
        }
        Commands::Serve { host, port } => {
            let mut config = load_config(cli.config.as_deref(), bootstrap_subscriber())?;
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }

            init_tracing(&config.logging);
            run(config).await
        }
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    tracing::info!("Starting Switchyard v{}", env!("CARGO_PKG_VERSION"));

    let store = open_store(&config.lock).context("opening global store")?;
    tracing::info!(backend = store.backend(), "Global store ready");

    let hub = Hub::builder(config.hub.clone(), store)
        .vars(config.vars.clone())
        .build();
    register_builtin_handlers(&hub).await;

    let ticker = hub.start();

    let server = config.server.clone();
    serve(AppState::new(hub.clone(), config), &server).await?;

    hub.shutdown().await;
    if let Err(e) = ticker.await {
        tracing::warn!(error = %e, "Ticker ended abnormally");
    }

    tracing::info!("Switchyard stopped");
    Ok(())
}

/// Handlers every deployment answers
async fn register_builtin_handlers(hub: &Hub) {
    hub.on(Tier::Api, "ping", |mut event: Event, _ctx| async move {
        event.set_info("pong");
        Ok(event)
    })
    .await;
}

/// Console subscriber used until the configured one is installed
fn bootstrap_subscriber() -> impl tracing::Subscriber + Send + Sync + 'static {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("switchyard=info")),
        )
        .finish()
}

/// Load the config with `subscriber` receiving what the loader logs
fn load_config(
    path: Option<&Path>,
    subscriber: impl tracing::Subscriber + Send + Sync + 'static,
) -> Result<Config, ConfigError> {
    tracing::subscriber::with_default(subscriber, || match path {
        Some(path) => {
            let config = Config::load_with_env(path)?;
            tracing::info!(path = %path.display(), "Loaded config");
            Ok(config)
        }
        None => Config::load_default(),
    })
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("switchyard={},tower_http=info", logging.level))
    });
    let registry = tracing_subscriber::registry().with(filter);

    if logging.format.eq_ignore_ascii_case("json") {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
