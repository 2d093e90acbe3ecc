//! StorageConfig - Immutable Snapshot
//!
//! Built once per reload and never mutated. Holds no live resources, so a
//! superseded snapshot is simply dropped.

use std::fmt;
use std::time::Duration;

use super::{MongoSettings, PostgresSettings, StorageSettings};
use crate::constants::{
    ASYNC_THREADS_MAX, CACHE_ENTRIES_MAX_FLOOR, CONNECTION_TIMEOUT_MS_MIN, MONGO_DATABASE_DEFAULT,
    MONGO_PLAYER_COLLECTION_DEFAULT, MONGO_TOP_COLLECTION_DEFAULT, MONGO_URI_DEFAULT,
    POSTGRES_PLAYER_TABLE_DEFAULT, POSTGRES_PORT_DEFAULT, POSTGRES_SCHEMA_DEFAULT,
    POSTGRES_TOP_TABLE_DEFAULT, TOP_LIST_SIZE_MAX,
};

// =============================================================================
// BackendKind
// =============================================================================

/// Which durable store to write to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Relational store
    Postgres,
    /// Document store
    Mongo,
}

impl BackendKind {
    /// Backend used when the setting is blank or unrecognized.
    pub const DEFAULT: BackendKind = BackendKind::Postgres;

    /// Get string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Mongo => "mongo",
        }
    }

    /// Parse a configured name; `None` for unrecognized or blank input.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Some(Self::Postgres),
            "mongo" | "mongodb" => Some(Self::Mongo),
            _ => None,
        }
    }

    /// Resolve a configured name, falling back to [`Self::DEFAULT`].
    #[must_use]
    pub fn resolve(name: &str) -> Self {
        if let Some(kind) = Self::from_name(name) {
            return kind;
        }
        if !name.trim().is_empty() {
            tracing::warn!(
                backend = name,
                fallback = Self::DEFAULT.as_str(),
                "Unrecognized storage backend"
            );
        }
        Self::DEFAULT
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Backend Sections
// =============================================================================

/// Postgres parameters with identifiers already sanitized.
#[derive(Clone, PartialEq, Eq)]
pub struct PostgresConfig {
    /// Host name
    pub host: String,
    /// Port
    pub port: u16,
    /// Database name
    pub database: String,
    /// Role
    pub user: String,
    /// Password
    pub password: String,
    /// Schema, `[A-Za-z0-9_]+`
    pub schema: String,
    /// Require TLS
    pub ssl: bool,
    /// Player table, `[A-Za-z0-9_]+`
    pub player_table: String,
    /// Leaderboard table, `[A-Za-z0-9_]+`
    pub top_table: String,
}

impl PostgresConfig {
    fn from_settings(s: &PostgresSettings) -> Self {
        Self {
            host: non_blank(&s.host, "localhost"),
            port: if s.port == 0 { POSTGRES_PORT_DEFAULT } else { s.port },
            database: non_blank(&s.database, "postgres"),
            user: s.user.clone(),
            password: s.password.clone(),
            schema: sanitize_ident(&s.schema, POSTGRES_SCHEMA_DEFAULT),
            ssl: s.ssl,
            player_table: sanitize_ident(&s.player_table, POSTGRES_PLAYER_TABLE_DEFAULT),
            top_table: sanitize_ident(&s.top_table, POSTGRES_TOP_TABLE_DEFAULT),
        }
    }

    /// Whether the host is the local machine.
    #[must_use]
    pub fn is_local(&self) -> bool {
        matches!(
            self.host.to_ascii_lowercase().as_str(),
            "localhost" | "127.0.0.1" | "::1"
        )
    }
}

impl fmt::Debug for PostgresConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresConfig")
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

/// MongoDB parameters with defaults applied.
#[derive(Clone, PartialEq, Eq)]
pub struct MongoConfig {
    /// Connection string
    pub uri: String,
    /// Database name
    pub database: String,
    /// Per-player collection
    pub player_collection: String,
    /// Leaderboard collection
    pub top_collection: String,
}

impl MongoConfig {
    fn from_settings(s: &MongoSettings) -> Self {
        Self {
            uri: non_blank(&s.uri, MONGO_URI_DEFAULT),
            database: non_blank(&s.database, MONGO_DATABASE_DEFAULT),
            player_collection: non_blank(&s.player_collection, MONGO_PLAYER_COLLECTION_DEFAULT),
            top_collection: non_blank(&s.top_collection, MONGO_TOP_COLLECTION_DEFAULT),
        }
    }
}

impl fmt::Debug for MongoConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MongoConfig")
            .field("uri", &"<redacted>")
            .field("database", &self.database)
            .field("player_collection", &self.player_collection)
            .field("top_collection", &self.top_collection)
            .finish()
    }
}

// =============================================================================
// StorageConfig
// =============================================================================

/// Immutable snapshot of every storage setting.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageConfig {
    enabled: bool,
    backend: BackendKind,
    top_list_size: usize,
    tracked_stats: Vec<String>,
    async_threads: usize,
    player_update_min_interval: Duration,
    top_update_min_interval: Duration,
    cache_ttl: Duration,
    cache_max_entries: usize,
    verbose_logging: bool,
    generate_top_on_load: bool,
    generate_top_periodically: bool,
    generate_top_interval: Duration,
    update_player_on_join: bool,
    max_pool_size: u32,
    connection_timeout: Duration,
    postgres: PostgresConfig,
    mongo: MongoConfig,
}

impl StorageConfig {
    /// Read every setting once and normalize it.
    #[must_use]
    pub fn from_settings(s: &StorageSettings) -> Self {
        Self {
            enabled: s.enabled,
            backend: BackendKind::resolve(&s.backend),
            top_list_size: clamp_to(s.top_list_size, 1, TOP_LIST_SIZE_MAX),
            tracked_stats: s.tracked_stats.iter().map(|k| k.trim().to_string()).collect(),
            async_threads: clamp_to(s.async_threads, 1, ASYNC_THREADS_MAX),
            player_update_min_interval: millis(s.player_update_min_interval_ms),
            top_update_min_interval: millis(s.top_update_min_interval_ms),
            cache_ttl: millis(s.cache_ttl_ms),
            cache_max_entries: clamp_to(s.cache_max_entries, CACHE_ENTRIES_MAX_FLOOR, usize::MAX),
            verbose_logging: s.verbose_logging,
            generate_top_on_load: s.generate_top_on_load,
            generate_top_periodically: s.generate_top_periodically,
            generate_top_interval: Duration::from_secs(
                (clamp_to(s.generate_top_interval_minutes, 1, usize::MAX) as u64).saturating_mul(60),
            ),
            update_player_on_join: s.update_player_on_join,
            max_pool_size: clamp_to(s.max_pool_size, 1, u32::MAX as usize) as u32,
            connection_timeout: millis(s.connection_timeout_ms)
                .max(Duration::from_millis(CONNECTION_TIMEOUT_MS_MIN)),
            postgres: PostgresConfig::from_settings(&s.postgres),
            mongo: MongoConfig::from_settings(&s.mongo),
        }
    }

    /// Persist anything at all.
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Selected backend.
    #[must_use]
    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    /// Entries kept per leaderboard, in `1..=1000`.
    #[must_use]
    pub fn top_list_size(&self) -> usize {
        self.top_list_size
    }

    /// Tracked keys exactly as configured (not yet validated).
    #[must_use]
    pub fn tracked_stats(&self) -> &[String] {
        &self.tracked_stats
    }

    /// Background workers, at least one.
    #[must_use]
    pub fn async_threads(&self) -> usize {
        self.async_threads
    }

    /// Player stat dedup window.
    #[must_use]
    pub fn player_update_min_interval(&self) -> Duration {
        self.player_update_min_interval
    }

    /// Leaderboard dedup window.
    #[must_use]
    pub fn top_update_min_interval(&self) -> Duration {
        self.top_update_min_interval
    }

    /// Dedup cache entry lifetime.
    #[must_use]
    pub fn cache_ttl(&self) -> Duration {
        self.cache_ttl
    }

    /// Dedup cache ceiling.
    #[must_use]
    pub fn cache_max_entries(&self) -> usize {
        self.cache_max_entries
    }

    /// Log every write decision.
    #[must_use]
    pub fn verbose_logging(&self) -> bool {
        self.verbose_logging
    }

    /// Publish leaderboards at startup.
    #[must_use]
    pub fn generate_top_on_load(&self) -> bool {
        self.generate_top_on_load
    }

    /// Publish leaderboards on a timer.
    #[must_use]
    pub fn generate_top_periodically(&self) -> bool {
        self.generate_top_periodically
    }

    /// Timer period, at least one minute.
    #[must_use]
    pub fn generate_top_interval(&self) -> Duration {
        self.generate_top_interval
    }

    /// Push tracked stats when a player joins.
    #[must_use]
    pub fn update_player_on_join(&self) -> bool {
        self.update_player_on_join
    }

    /// Backend connection pool size.
    #[must_use]
    pub fn max_pool_size(&self) -> u32 {
        self.max_pool_size
    }

    /// Backend connection timeout.
    #[must_use]
    pub fn connection_timeout(&self) -> Duration {
        self.connection_timeout
    }

    /// Postgres section.
    #[must_use]
    pub fn postgres(&self) -> &PostgresConfig {
        &self.postgres
    }

    /// MongoDB section.
    #[must_use]
    pub fn mongo(&self) -> &MongoConfig {
        &self.mongo
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Keep `[A-Za-z0-9_]`; fall back to `default` when nothing is left.
#[must_use]
pub fn sanitize_ident(raw: &str, default: &str) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    if cleaned.is_empty() {
        default.to_string()
    } else {
        cleaned
    }
}

fn non_blank(raw: &str, default: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        default.to_string()
    } else {
        trimmed.to_string()
    }
}

fn clamp_to(raw: i64, min: usize, max: usize) -> usize {
    usize::try_from(raw).unwrap_or(0).clamp(min, max)
}

fn millis(raw: i64) -> Duration {
    Duration::from_millis(u64::try_from(raw).unwrap_or(0))
}
