//! Configuration - Sources and Snapshots
//!
//! TigerStyle: raw settings in, immutable snapshot out.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐  settings()  ┌─────────────────┐  from_settings  ┌───────────────┐
//! │  ConfigSource    │ ───────────▶ │ StorageSettings │ ──────────────▶ │ StorageConfig │
//! │ (file / memory)  │              │  (raw, serde)   │                 │  (immutable)  │
//! └──────────────────┘              └─────────────────┘                 └───────────────┘
//! ```
//!
//! Raw settings accept anything a hand-edited file may contain (negative
//! numbers, unknown backend names, missing sections). All normalization
//! happens in [`StorageConfig::from_settings`].

mod snapshot;

use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

pub use snapshot::{BackendKind, MongoConfig, PostgresConfig, StorageConfig};

use crate::constants::{
    ASYNC_THREADS_DEFAULT, BACKEND_POOL_SIZE_DEFAULT, CACHE_ENTRIES_MAX_DEFAULT,
    CACHE_TTL_MS_DEFAULT, CONNECTION_TIMEOUT_MS_DEFAULT, MONGO_DATABASE_DEFAULT,
    MONGO_PLAYER_COLLECTION_DEFAULT, MONGO_TOP_COLLECTION_DEFAULT, MONGO_URI_DEFAULT,
    PLAYER_UPDATE_MIN_INTERVAL_MS_DEFAULT, POSTGRES_PLAYER_TABLE_DEFAULT, POSTGRES_PORT_DEFAULT,
    POSTGRES_SCHEMA_DEFAULT, POSTGRES_TOP_TABLE_DEFAULT, TOP_GENERATE_INTERVAL_MINUTES_DEFAULT,
    TOP_LIST_SIZE_DEFAULT, TOP_UPDATE_MIN_INTERVAL_MS_DEFAULT,
};
use crate::error::ConfigError;

/// Environment variable overriding the Postgres password.
pub const ENV_POSTGRES_PASSWORD: &str = "STATVAULT_PG_PASSWORD";

/// Environment variable overriding the MongoDB connection string.
pub const ENV_MONGO_URI: &str = "STATVAULT_MONGO_URI";

// =============================================================================
// Raw Settings
// =============================================================================

/// Storage settings as written in the configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Persist anything at all
    pub enabled: bool,
    /// `"postgres"` or `"mongo"`
    pub backend: String,
    /// Entries kept per leaderboard
    pub top_list_size: i64,
    /// Explicit stat keys; empty means every known key
    pub tracked_stats: Vec<String>,
    /// Background workers
    pub async_threads: i64,
    /// Identical player stat writes inside this window are skipped
    pub player_update_min_interval_ms: i64,
    /// Identical leaderboard writes inside this window are skipped
    pub top_update_min_interval_ms: i64,
    /// Dedup cache entry lifetime
    pub cache_ttl_ms: i64,
    /// Dedup cache hard ceiling
    pub cache_max_entries: i64,
    /// Log every write decision
    pub verbose_logging: bool,
    /// Publish leaderboards once at startup
    pub generate_top_on_load: bool,
    /// Publish leaderboards on a timer
    pub generate_top_periodically: bool,
    /// Timer period
    pub generate_top_interval_minutes: i64,
    /// Push tracked stats when a player joins
    pub update_player_on_join: bool,
    /// Backend connection pool size
    pub max_pool_size: i64,
    /// Backend connection timeout
    pub connection_timeout_ms: i64,
    /// Relational backend
    pub postgres: PostgresSettings,
    /// Document backend
    pub mongo: MongoSettings,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            backend: "postgres".to_string(),
            top_list_size: TOP_LIST_SIZE_DEFAULT as i64,
            tracked_stats: Vec::new(),
            async_threads: ASYNC_THREADS_DEFAULT as i64,
            player_update_min_interval_ms: PLAYER_UPDATE_MIN_INTERVAL_MS_DEFAULT as i64,
            top_update_min_interval_ms: TOP_UPDATE_MIN_INTERVAL_MS_DEFAULT as i64,
            cache_ttl_ms: CACHE_TTL_MS_DEFAULT as i64,
            cache_max_entries: CACHE_ENTRIES_MAX_DEFAULT as i64,
            verbose_logging: false,
            generate_top_on_load: true,
            generate_top_periodically: false,
            generate_top_interval_minutes: TOP_GENERATE_INTERVAL_MINUTES_DEFAULT as i64,
            update_player_on_join: true,
            max_pool_size: i64::from(BACKEND_POOL_SIZE_DEFAULT),
            connection_timeout_ms: CONNECTION_TIMEOUT_MS_DEFAULT as i64,
            postgres: PostgresSettings::default(),
            mongo: MongoSettings::default(),
        }
    }
}

impl StorageSettings {
    /// Parse settings from JSON text.
    ///
    /// # Errors
    /// Returns the JSON error if the text is not a settings object.
    pub fn from_json_str(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Read settings from a JSON file.
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Replace secrets with environment values when present.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(password) = std::env::var(ENV_POSTGRES_PASSWORD) {
            self.postgres.password = password;
        }
        if let Ok(uri) = std::env::var(ENV_MONGO_URI) {
            self.mongo.uri = uri;
        }
        self
    }
}

/// Postgres connection settings.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostgresSettings {
    /// Host name
    pub host: String,
    /// Port, 0 means default
    pub port: u16,
    /// Database name
    pub database: String,
    /// Role
    pub user: String,
    /// Password
    pub password: String,
    /// Schema holding both tables
    pub schema: String,
    /// Require TLS
    pub ssl: bool,
    /// Per-player table
    pub player_table: String,
    /// Leaderboard table
    pub top_table: String,
}

impl Default for PostgresSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: POSTGRES_PORT_DEFAULT,
            database: "postgres".to_string(),
            user: "postgres".to_string(),
            password: String::new(),
            schema: POSTGRES_SCHEMA_DEFAULT.to_string(),
            ssl: false,
            player_table: POSTGRES_PLAYER_TABLE_DEFAULT.to_string(),
            top_table: POSTGRES_TOP_TABLE_DEFAULT.to_string(),
        }
    }
}

impl std::fmt::Debug for PostgresSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("schema", &self.schema)
            .field("ssl", &self.ssl)
            .field("player_table", &self.player_table)
            .field("top_table", &self.top_table)
            .finish()
    }
}

/// MongoDB connection settings.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MongoSettings {
    /// Connection string
    pub uri: String,
    /// Database name
    pub database: String,
    /// Per-player collection
    pub player_collection: String,
    /// Leaderboard collection
    pub top_collection: String,
}

impl Default for MongoSettings {
    fn default() -> Self {
        Self {
            uri: MONGO_URI_DEFAULT.to_string(),
            database: MONGO_DATABASE_DEFAULT.to_string(),
            player_collection: MONGO_PLAYER_COLLECTION_DEFAULT.to_string(),
            top_collection: MONGO_TOP_COLLECTION_DEFAULT.to_string(),
        }
    }
}

impl std::fmt::Debug for MongoSettings {
    // The URI may embed credentials.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MongoSettings")
            .field("uri", &"<redacted>")
            .field("database", &self.database)
            .field("player_collection", &self.player_collection)
            .field("top_collection", &self.top_collection)
            .finish()
    }
}

// =============================================================================
// Sources
// =============================================================================

/// Where the manager reads its settings from on every reload.
pub trait ConfigSource: Send + Sync {
    /// Current settings. Must not fail; return defaults on trouble.
    fn settings(&self) -> StorageSettings;
}

/// Reads a JSON file on every call.
///
/// Secrets may be supplied through [`ENV_POSTGRES_PASSWORD`] and
/// [`ENV_MONGO_URI`] instead of the file.
#[derive(Debug, Clone)]
pub struct FileConfigSource {
    path: PathBuf,
}

impl FileConfigSource {
    /// Source backed by `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigSource for FileConfigSource {
    fn settings(&self) -> StorageSettings {
        match StorageSettings::from_json_file(&self.path) {
            Ok(settings) => settings.with_env_overrides(),
            Err(e) => {
                tracing::warn!(error = %e, "Unreadable storage config; persistence disabled");
                StorageSettings::default()
            }
        }
    }
}

/// In-memory settings that can be swapped between reloads.
#[derive(Debug, Default)]
pub struct MemoryConfigSource {
    settings: RwLock<StorageSettings>,
}

impl MemoryConfigSource {
    /// Source returning `settings` until replaced.
    #[must_use]
    pub fn new(settings: StorageSettings) -> Self {
        Self {
            settings: RwLock::new(settings),
        }
    }

    /// Replace the settings seen by the next reload.
    pub fn replace(&self, settings: StorageSettings) {
        *self.settings.write() = settings;
    }

    /// Edit the settings in place.
    pub fn update(&self, edit: impl FnOnce(&mut StorageSettings)) {
        edit(&mut self.settings.write());
    }
}

impl ConfigSource for MemoryConfigSource {
    fn settings(&self) -> StorageSettings {
        self.settings.read().clone()
    }
}
