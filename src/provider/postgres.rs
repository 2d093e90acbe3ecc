//! PostgresProvider - Relational Storage
//!
//! TigerStyle: explicit schema, one upsert per write, pooled connections.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     PostgresProvider                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Pool: sqlx::PgPool (max_pool_size, connection_timeout)      │
//! │  Table: <schema>.<player_table>  one row per player          │
//! │  Table: <schema>.<top_table>     one row per stat key        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS "public"."player_stats" (
//!     uuid UUID PRIMARY KEY,
//!     name TEXT NOT NULL,
//!     updated_at BIGINT NOT NULL,
//!     stats JSONB NOT NULL DEFAULT '{}',
//!     exp_level INTEGER,
//!     exp_total INTEGER,
//!     exp_progress REAL
//! );
//! CREATE TABLE IF NOT EXISTS "public"."top_stats" (
//!     stat_key TEXT PRIMARY KEY,
//!     top_size INTEGER NOT NULL,
//!     updated_at BIGINT NOT NULL,
//!     entries JSONB NOT NULL
//! );
//! ```
//!
//! Player upserts merge one key into `stats` with `||`, so other keys of
//! the same player survive.

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode};

use super::{clamp_top_limit, StorageProvider};
use crate::config::{PostgresConfig, StorageConfig};
use crate::error::{StorageError, StorageResult};
use crate::model::{Experience, PlayerRef, TopEntry};

// =============================================================================
// PostgresProvider
// =============================================================================

/// PostgreSQL provider.
pub struct PostgresProvider {
    pool: PgPool,
    player_table: String,
    top_table: String,
    schema: String,
}

impl std::fmt::Debug for PostgresProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresProvider")
            .field("player_table", &self.player_table)
            .field("top_table", &self.top_table)
            .finish_non_exhaustive()
    }
}

impl PostgresProvider {
    /// Open a pool and verify the server answers.
    ///
    /// # Errors
    /// Returns [`StorageError::Connection`] if no connection can be made
    /// within the configured timeout.
    pub async fn connect(config: &StorageConfig) -> StorageResult<Self> {
        let pg = config.postgres();

        // Preconditions
        assert!(!pg.schema.is_empty(), "schema must be sanitized");
        assert!(!pg.player_table.is_empty(), "player table must be sanitized");

        warn_insecure(pg);

        let options = PgConnectOptions::new()
            .host(&pg.host)
            .port(pg.port)
            .database(&pg.database)
            .username(&pg.user)
            .password(&pg.password)
            .ssl_mode(if pg.ssl {
                PgSslMode::Require
            } else {
                PgSslMode::Disable
            });

        let pool = PgPoolOptions::new()
            .max_connections(config.max_pool_size())
            .acquire_timeout(config.connection_timeout())
            .connect_with(options)
            .await
            .map_err(|e| StorageError::connection(format!("failed to connect: {e}")))?;

        tracing::info!(
            host = %pg.host,
            port = pg.port,
            database = %pg.database,
            pool_size = config.max_pool_size(),
            "Connected to Postgres"
        );

        Ok(Self::from_pool(pool, pg))
    }

    /// Wrap an existing pool.
    #[must_use]
    pub fn from_pool(pool: PgPool, pg: &PostgresConfig) -> Self {
        Self {
            pool,
            schema: quote_ident(&pg.schema),
            player_table: format!("{}.{}", quote_ident(&pg.schema), quote_ident(&pg.player_table)),
            top_table: format!("{}.{}", quote_ident(&pg.schema), quote_ident(&pg.top_table)),
        }
    }

    /// Get the connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn schema_statements(&self) -> Vec<String> {
        let p = &self.player_table;
        let t = &self.top_table;
        let index_prefix = self.player_table.replace(['"', '.'], "");
        vec![
            format!("CREATE SCHEMA IF NOT EXISTS {}", self.schema),
            format!(
                "CREATE TABLE IF NOT EXISTS {p} (
                    uuid UUID PRIMARY KEY,
                    name TEXT NOT NULL,
                    updated_at BIGINT NOT NULL,
                    stats JSONB NOT NULL DEFAULT '{{}}',
                    exp_level INTEGER,
                    exp_total INTEGER,
                    exp_progress REAL
                )"
            ),
            // Tables created before experience tracking lack these columns.
            format!("ALTER TABLE {p} ADD COLUMN IF NOT EXISTS exp_level INTEGER"),
            format!("ALTER TABLE {p} ADD COLUMN IF NOT EXISTS exp_total INTEGER"),
            format!("ALTER TABLE {p} ADD COLUMN IF NOT EXISTS exp_progress REAL"),
            format!(
                "CREATE TABLE IF NOT EXISTS {t} (
                    stat_key TEXT PRIMARY KEY,
                    top_size INTEGER NOT NULL,
                    updated_at BIGINT NOT NULL,
                    entries JSONB NOT NULL
                )"
            ),
            format!("CREATE INDEX IF NOT EXISTS idx_{index_prefix}_name ON {p}(name)"),
            format!("CREATE INDEX IF NOT EXISTS idx_{index_prefix}_updated ON {p}(updated_at DESC)"),
        ]
    }
}

#[async_trait]
impl StorageProvider for PostgresProvider {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn start(&self) -> StorageResult<()> {
        let statements = self.schema_statements();
        let total = statements.len();
        let mut failed = 0usize;
        let mut last_error = None;

        // Each step is independent: a failed migration must not skip the indexes.
        for (step, statement) in statements.iter().enumerate() {
            if let Err(e) = sqlx::query(statement).execute(&self.pool).await {
                tracing::warn!(step, error = %e, "Postgres schema step failed");
                failed += 1;
                last_error = Some(e);
            }
        }

        match last_error {
            None => {
                tracing::debug!(table = %self.player_table, "Postgres schema ready");
                Ok(())
            }
            Some(e) => Err(StorageError::schema(format!(
                "{failed} of {total} schema steps failed; last: {e}"
            ))),
        }
    }

    async fn update_player_stat(
        &self,
        player: &PlayerRef,
        stat_key: &str,
        value: i64,
    ) -> StorageResult<()> {
        let sql = format!(
            "INSERT INTO {} AS p (uuid, name, updated_at, stats)
             VALUES ($1, $2, $3, jsonb_build_object($4::text, $5::bigint))
             ON CONFLICT (uuid) DO UPDATE SET
                name = EXCLUDED.name,
                updated_at = EXCLUDED.updated_at,
                stats = COALESCE(p.stats, '{{}}'::jsonb) || EXCLUDED.stats",
            self.player_table
        );

        sqlx::query(&sql)
            .bind(player.id)
            .bind(&player.name)
            .bind(now_ms())
            .bind(stat_key)
            .bind(value)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::write(format!("player stat upsert failed: {e}")))?;

        Ok(())
    }

    async fn upsert_top_list(
        &self,
        stat_key: &str,
        entries: &[TopEntry],
        limit: usize,
    ) -> StorageResult<()> {
        let limit = clamp_top_limit(limit);
        let stored: Vec<TopEntry> = entries.iter().take(limit).map(TopEntry::normalized).collect();
        let payload = serde_json::to_value(&stored)?;

        let sql = format!(
            "INSERT INTO {} (stat_key, top_size, updated_at, entries)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (stat_key) DO UPDATE SET
                top_size = EXCLUDED.top_size,
                updated_at = EXCLUDED.updated_at,
                entries = EXCLUDED.entries",
            self.top_table
        );

        sqlx::query(&sql)
            .bind(stat_key)
            .bind(i32::try_from(limit).unwrap_or(i32::MAX))
            .bind(now_ms())
            .bind(payload)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::write(format!("top list upsert failed: {e}")))?;

        Ok(())
    }

    async fn update_player_experience(
        &self,
        player: &PlayerRef,
        experience: Experience,
    ) -> StorageResult<()> {
        let sql = format!(
            "INSERT INTO {} (uuid, name, updated_at, exp_level, exp_total, exp_progress)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (uuid) DO UPDATE SET
                name = EXCLUDED.name,
                updated_at = EXCLUDED.updated_at,
                exp_level = EXCLUDED.exp_level,
                exp_total = EXCLUDED.exp_total,
                exp_progress = EXCLUDED.exp_progress",
            self.player_table
        );

        sqlx::query(&sql)
            .bind(player.id)
            .bind(&player.name)
            .bind(now_ms())
            .bind(experience.level)
            .bind(experience.total)
            .bind(experience.progress)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::write(format!("experience upsert failed: {e}")))?;

        Ok(())
    }

    async fn close(&self) -> StorageResult<()> {
        if !self.pool.is_closed() {
            self.pool.close().await;
            tracing::info!("Postgres pool closed");
        }
        Ok(())
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Double-quote an already sanitized identifier.
fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', ""))
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn warn_insecure(pg: &PostgresConfig) {
    if !pg.ssl && !pg.is_local() {
        tracing::warn!(host = %pg.host, "Postgres connection to a remote host without TLS");
    }
    if pg.password.is_empty() || pg.password == "postgres" {
        tracing::warn!(user = %pg.user, "Postgres password is empty or the default");
    }
}
