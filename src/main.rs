//! Statvault - operator CLI
//!
//! Inspect the stat-key universe, check backend connectivity and push
//! leaderboards or player stats from JSON files through the same pipeline
//! the game uses.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use uuid::Uuid;

use statvault::config::FileConfigSource;
use statvault::manager::resolve_tracked_keys;
use statvault::stat_key::enumerate_all;
use statvault::{
    ConfigSource, Experience, PlayerRef, StatCatalog, StorageConfig, StorageManager, TopEntry,
};

// =============================================================================
// TigerStyle Constants
// =============================================================================

/// Application name
pub const APP_NAME: &str = "statvault";

/// Application version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration file
pub const CONFIG_PATH_DEFAULT: &str = "~/.statvault/config.json";

// =============================================================================
// CLI
// =============================================================================

/// Statvault - game statistic persistence
#[derive(Parser, Debug)]
#[command(name = APP_NAME)]
#[command(about = "Persist game statistics and leaderboards to Postgres or MongoDB")]
#[command(version)]
struct Cli {
    /// Storage configuration file (JSON)
    #[arg(short, long, default_value = CONFIG_PATH_DEFAULT, global = true)]
    config: String,

    /// Statistic catalog (JSON); the built-in vanilla catalog otherwise
    #[arg(long, global = true)]
    catalog: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the tracked stat keys
    Keys {
        /// Print every valid key instead of the configured ones
        #[arg(long)]
        all: bool,
    },
    /// Connect to the configured backend and report the result
    Check,
    /// Upsert a leaderboard from a JSON file
    PushTop {
        /// `{ "stat_key": "...", "entries": [{ "name", "value" }] }`
        file: String,
    },
    /// Upsert player stats from a JSON file
    PushStats {
        /// `[{ "uuid", "name", "stats": { key: value }, "experience"? }]`
        file: String,
    },
}

#[derive(Debug, Deserialize)]
struct TopListFile {
    stat_key: String,
    entries: Vec<TopEntry>,
}

#[derive(Debug, Deserialize)]
struct PlayerStatsRecord {
    uuid: Uuid,
    name: String,
    #[serde(default)]
    stats: BTreeMap<String, i64>,
    #[serde(default)]
    experience: Option<Experience>,
}

// =============================================================================
// Main
// =============================================================================

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    // Initialize logging
    let filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .init();

    tracing::debug!("{} v{}", APP_NAME, APP_VERSION);

    let config_path = PathBuf::from(shellexpand::tilde(&cli.config).to_string());
    let catalog = match &cli.catalog {
        Some(path) => {
            let path = PathBuf::from(shellexpand::tilde(path).to_string());
            StatCatalog::from_json_file(&path)?
        }
        None => StatCatalog::vanilla().clone(),
    };
    let source = Arc::new(FileConfigSource::new(config_path));

    match cli.command {
        Command::Keys { all } => print_keys(source.as_ref(), &catalog, all),
        Command::Check => check(source, catalog),
        Command::PushTop { file } => push_top(source, catalog, &file),
        Command::PushStats { file } => push_stats(source, catalog, &file),
    }
}

fn print_keys(source: &FileConfigSource, catalog: &StatCatalog, all: bool) -> anyhow::Result<()> {
    let keys = if all {
        enumerate_all(catalog)
    } else {
        let config = StorageConfig::from_settings(&source.settings());
        resolve_tracked_keys(config.tracked_stats(), catalog)
    };
    for key in &keys {
        println!("{key}");
    }
    tracing::info!(count = keys.len(), "Stat keys listed");
    Ok(())
}

fn open_manager(source: Arc<FileConfigSource>, catalog: StatCatalog) -> anyhow::Result<StorageManager> {
    tracing::info!(config = %source.path().display(), "Loading storage config");
    let manager = StorageManager::builder(source).catalog(catalog).build();
    manager.reload();

    let config = manager.config();
    if !config.enabled() {
        anyhow::bail!("storage is disabled in the configuration");
    }
    if manager.active_backend() == "inert" {
        anyhow::bail!("{} backend unavailable; see log for details", config.backend());
    }
    Ok(manager)
}

fn check(source: Arc<FileConfigSource>, catalog: StatCatalog) -> anyhow::Result<()> {
    let manager = open_manager(source, catalog)?;
    println!(
        "backend={} state={} tracked_keys={}",
        manager.active_backend(),
        manager.state().as_str(),
        manager.tracked_stat_keys().len()
    );
    manager.close();
    Ok(())
}

fn push_top(source: Arc<FileConfigSource>, catalog: StatCatalog, file: &str) -> anyhow::Result<()> {
    let path = shellexpand::tilde(file).to_string();
    let text = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
    let top: TopListFile = serde_json::from_str(&text).with_context(|| format!("parsing {path}"))?;

    let manager = open_manager(source, catalog)?;
    manager.upsert_top_list(&top.stat_key, &top.entries);
    manager.close();

    tracing::info!(stat_key = %top.stat_key, entries = top.entries.len(), "Leaderboard pushed");
    Ok(())
}

fn push_stats(source: Arc<FileConfigSource>, catalog: StatCatalog, file: &str) -> anyhow::Result<()> {
    let path = shellexpand::tilde(file).to_string();
    let text = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
    let records: Vec<PlayerStatsRecord> =
        serde_json::from_str(&text).with_context(|| format!("parsing {path}"))?;

    let manager = open_manager(source, catalog)?;
    let mut values = 0usize;
    for record in &records {
        let player = PlayerRef::new(record.uuid, &record.name);
        for (key, value) in &record.stats {
            manager.update_player_stat(&player, key, *value);
            values += 1;
        }
        if let Some(experience) = record.experience {
            manager.update_player_experience(&player, experience);
        }
    }
    manager.close();

    tracing::info!(players = records.len(), values, "Player stats pushed");
    Ok(())
}
