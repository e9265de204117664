//! # Docs Relay CLI (`relay`)
//!
//! ## Usage
//!
//! ```bash
//! relay --config ./config/relay.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `relay publish [paths..]` | Publish all documents, or only the given files |
//! | `relay split <file>` | Print the message chunks of one file |
//! | `relay status` | Check channel mappings against the platform |
//! | `relay watch` | Publish local edits as they happen |
//! | `relay serve` | Accept push webhooks and publish changed documents |
//! | `relay pull` | Pull the tracked branch and publish what changed |
//!
//! Credentials are read from the environment (a `.env` file is loaded
//! first). Logs go to stderr and are filtered with `RUST_LOG`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use docs_relay::config;
use docs_relay::discord::DiscordPlatform;
use docs_relay::{publish, server, status, watch};

/// Docs Relay: republish markdown documents into chat channels.
///
/// All commands except `split` read a TOML configuration file given by
/// `--config`. See `config/relay.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "relay",
    about = "Republish a tree of markdown documents into chat channels",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/relay.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish documents to their channels.
    ///
    /// Without paths every tracked document under the root is published.
    /// Paths may be absolute or relative to the document root.
    Publish {
        paths: Vec<PathBuf>,

        /// Show routing and message counts without contacting the platform.
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the message chunks a file would be split into.
    Split {
        file: PathBuf,

        /// Maximum characters per chunk.
        #[arg(long, default_value = "1900")]
        max: usize,
    },

    /// List channels in scope and check every mapping rule.
    Status,

    /// Watch the document root and publish changes until interrupted.
    Watch,

    /// Run the webhook server.
    Serve,

    /// Pull the tracked branch once and publish changed documents.
    Pull,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,docs_relay=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let load = || config::load_config(&cli.config);

    match &cli.command {
        Commands::Publish { paths, dry_run } => {
            publish::run_publish(&load()?, paths, *dry_run).await?;
        }
        Commands::Split { file, max } => {
            publish::run_split(file, *max)?;
        }
        Commands::Status => {
            let cfg = load()?;
            let platform = DiscordPlatform::from_config(&cfg.platform)?;
            status::run_status(&cfg, &platform).await?;
        }
        Commands::Watch => {
            watch::run_watch(&load()?).await?;
        }
        Commands::Serve => {
            server::run_serve(&load()?).await?;
        }
        Commands::Pull => {
            publish::run_pull(&load()?).await?;
        }
    }

    Ok(())
}
