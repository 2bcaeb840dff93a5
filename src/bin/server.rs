//! Server binary

use clap::{Parser, Subcommand};
use stampede::common::{Config, StoreBackend};
use stampede::Server;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "stampede-server")]
#[command(about = "Cache-stampede-safe lookup server")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server
    Serve {
        /// Config file (defaults to ./config.toml or ./config.yaml if present)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Bind address for HTTP
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// Store backend: memory or redis
        #[arg(long)]
        store: Option<StoreBackend>,

        /// Lookups per stream request
        #[arg(long)]
        requests: Option<usize>,
    },

    /// Print the effective configuration and exit
    CheckConfig {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            bind,
            store,
            requests,
        } => {
            // File and environment first, CLI has priority
            let mut config = Config::load(config.as_deref())?;
            if let Some(bind) = bind {
                config.bind_addr = bind;
            }
            if let Some(store) = store {
                config.store = store;
            }
            if let Some(requests) = requests {
                config.number_of_requests = requests;
            }

            init_tracing(&config.log_level);

            let server = Server::new(config)?;
            server.serve().await?;
        }
        Commands::CheckConfig { config } => {
            let config = Config::load(config.as_deref())?;
            config.validate()?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

fn init_tracing(default_level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
