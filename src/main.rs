//! # Audio Guide CLI (`audioguide`)
//!
//! Runs the HTTP server and the storage maintenance commands.
//!
//! ## Usage
//!
//! ```bash
//! audioguide --config ./config/audioguide.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `audioguide serve` | Start the HTTP server |
//! | `audioguide init-db` | Create a guide index file in the storage agent |
//! | `audioguide inspect-db` | Print the guide index, or probe for guides |
//!
//! Logging is controlled with `RUST_LOG` (default `info`).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use audioguide::config::{self, Config};
use audioguide::library::GuideLibrary;
use audioguide::markdown::split_guide;
use audioguide::models::{FileId, GuideRecord};
use audioguide::server;
use audioguide::storage::{create_agent, StorageAgent};
use audioguide::store::GuideStore;

/// Audio guide backend: guide storage, translation and narration.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/audioguide.example.toml` for a full example.
#[derive(Parser)]
#[command(name = "audioguide", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/audioguide.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server.
    ///
    /// Falls back to the built-in defaults when the config file does not
    /// exist.
    Serve,

    /// Create a guide index file listing existing guide files.
    ///
    /// Prints `DB_FILE_ID=<id>`; set `library.index_file_id` to that id.
    InitDb {
        /// Wallet address recorded as the creator of every listed guide.
        #[arg(long)]
        creator: String,

        /// Guide file ids to include. May be repeated.
        #[arg(long = "file-id")]
        file_id: Vec<u64>,
    },

    /// Print the guide index and its first guide, or probe for guides
    /// when no index is configured.
    InspectDb,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve => {
            let cfg = if cli.config.exists() {
                config::load_config(&cli.config)?
            } else {
                tracing::warn!(path = %cli.config.display(), "config file not found, using defaults");
                Config::minimal()
            };
            server::run_server(&cfg).await?;
        }
        Commands::InitDb { creator, file_id } => {
            let cfg = config::load_config(&cli.config)?;
            init_db(&cfg, &creator, &file_id).await?;
        }
        Commands::InspectDb => {
            let cfg = config::load_config(&cli.config)?;
            inspect_db(&cfg).await?;
        }
    }

    Ok(())
}

/// Connect to the configured storage agent and wrap it in a library that
/// does not recover on its own.
async fn open_library(cfg: &Config) -> anyhow::Result<GuideLibrary> {
    let storage: Arc<dyn StorageAgent> = Arc::from(create_agent(&cfg.storage)?);
    storage
        .setup(&cfg.storage.namespace)
        .await
        .with_context(|| format!("Failed to set up namespace '{}'", cfg.storage.namespace))?;

    let mut library_cfg = cfg.library.clone();
    library_cfg.recover = false;
    Ok(GuideLibrary::new(
        Arc::new(GuideStore::new()),
        storage,
        library_cfg,
    ))
}

async fn init_db(cfg: &Config, creator: &str, file_ids: &[u64]) -> anyhow::Result<()> {
    if creator.trim().is_empty() {
        bail!("--creator must not be empty");
    }

    let library = open_library(cfg).await?;
    let now = Utc::now();
    let mut records = Vec::with_capacity(file_ids.len());

    for &id in file_ids {
        let file_id = FileId(id);
        match library.storage().get_file(file_id).await? {
            Some(_) => records.push(GuideRecord {
                file_id,
                creator: creator.trim().to_string(),
                timestamp: now,
            }),
            None => bail!("Guide file {} not found", file_id),
        }
    }

    let index_id = library.create_index(records).await?;
    println!("Guide index created with {} guides", file_ids.len());
    println!("DB_FILE_ID={}", index_id);
    Ok(())
}

async fn inspect_db(cfg: &Config) -> anyhow::Result<()> {
    let library = open_library(cfg).await?;

    let Some(index_id) = cfg.library.index_file_id.map(FileId) else {
        println!(
            "No index configured, probing file ids {}..{}",
            cfg.library.probe_start, cfg.library.probe_end
        );
        let found = library.probe().await;
        if found.is_empty() {
            println!("No guides found");
        }
        for (file_id, file) in found {
            let (title, _) = split_guide(&file.content);
            println!("  {}  {}  ({})", file_id, title, file.content_hash);
        }
        return Ok(());
    };

    let index = library
        .read_index(index_id)
        .await?
        .with_context(|| format!("Guide index file {} not found", index_id))?;

    println!("Guide index {}:", index_id);
    println!("{}", serde_json::to_string_pretty(&index)?);

    if let Some(first) = index.guides.first() {
        match library.storage().get_file(first.file_id).await? {
            Some(file) => {
                let (title, content) = split_guide(&file.content);
                println!("\nFirst guide ({}): {}", first.file_id, title);
                println!("{}", content);
            }
            None => println!("\nFirst guide {} is missing", first.file_id),
        }
    }

    Ok(())
}
