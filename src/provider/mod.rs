//! Provider - Backend Trait and Implementations
//!
//! TigerStyle: one capability set, one constructor per backend.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   StorageProvider Trait                      │
//! └─────────────────────────────────────────────────────────────┘
//!      ↑                ↑                 ↑                ↑
//! ┌────┴─────┐   ┌──────┴──────┐   ┌──────┴──────┐   ┌─────┴─────┐
//! │  Inert   │   │  Postgres   │   │    Mongo    │   │    Sim    │
//! │(fallback)│   │(relational) │   │ (document)  │   │ (testing) │
//! └──────────┘   └─────────────┘   └─────────────┘   └───────────┘
//! ```
//!
//! Opening a provider is the `init` step: it either returns a provider
//! holding live resources or an error, never something half-open.
//! Values reaching a provider were already validated by the manager.

mod inert;
mod sim;

#[cfg(feature = "mongo")]
mod mongo;
#[cfg(feature = "postgres")]
mod postgres;

use std::sync::Arc;

use async_trait::async_trait;

pub use inert::InertProvider;
pub use sim::{SimBackend, SimFaults, SimPlayerRecord, SimProvider};

#[cfg(feature = "mongo")]
pub use mongo::MongoProvider;
#[cfg(feature = "postgres")]
pub use postgres::PostgresProvider;

use crate::config::{BackendKind, StorageConfig};
use crate::error::StorageResult;
use crate::model::{Experience, PlayerRef, TopEntry};

// =============================================================================
// StorageProvider
// =============================================================================

/// Persistence operations every backend implements.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Backend label for logs and status.
    fn name(&self) -> &'static str;

    /// Idempotent preparation: schema, tables, unique indexes.
    async fn start(&self) -> StorageResult<()>;

    /// Merge one statistic into the player's record.
    async fn update_player_stat(
        &self,
        player: &PlayerRef,
        stat_key: &str,
        value: i64,
    ) -> StorageResult<()>;

    /// Replace the stored leaderboard with the first `limit` entries.
    async fn upsert_top_list(
        &self,
        stat_key: &str,
        entries: &[TopEntry],
        limit: usize,
    ) -> StorageResult<()>;

    /// Upsert the player's experience fields.
    async fn update_player_experience(
        &self,
        player: &PlayerRef,
        experience: Experience,
    ) -> StorageResult<()>;

    /// Release backend resources. Safe to call more than once.
    async fn close(&self) -> StorageResult<()>;
}

// =============================================================================
// ProviderFactory
// =============================================================================

/// Opens the provider a configuration snapshot asks for.
#[async_trait]
pub trait ProviderFactory: Send + Sync {
    /// Connect and validate; fail with a connection error if unreachable.
    async fn open(&self, config: &StorageConfig) -> StorageResult<Arc<dyn StorageProvider>>;
}

/// Factory dispatching on [`StorageConfig::backend`].
#[derive(Debug, Default, Clone, Copy)]
pub struct BackendFactory;

#[async_trait]
impl ProviderFactory for BackendFactory {
    async fn open(&self, config: &StorageConfig) -> StorageResult<Arc<dyn StorageProvider>> {
        match config.backend() {
            BackendKind::Postgres => open_postgres(config).await,
            BackendKind::Mongo => open_mongo(config).await,
        }
    }
}

#[cfg(feature = "postgres")]
async fn open_postgres(config: &StorageConfig) -> StorageResult<Arc<dyn StorageProvider>> {
    Ok(Arc::new(PostgresProvider::connect(config).await?))
}

#[cfg(not(feature = "postgres"))]
async fn open_postgres(_config: &StorageConfig) -> StorageResult<Arc<dyn StorageProvider>> {
    Err(crate::error::StorageError::unsupported(
        "built without the `postgres` feature",
    ))
}

#[cfg(feature = "mongo")]
async fn open_mongo(config: &StorageConfig) -> StorageResult<Arc<dyn StorageProvider>> {
    Ok(Arc::new(MongoProvider::connect(config).await?))
}

#[cfg(not(feature = "mongo"))]
async fn open_mongo(_config: &StorageConfig) -> StorageResult<Arc<dyn StorageProvider>> {
    Err(crate::error::StorageError::unsupported(
        "built without the `mongo` feature",
    ))
}

/// Clamp a requested leaderboard size into the range backends store.
#[must_use]
pub fn clamp_top_limit(limit: usize) -> usize {
    limit.clamp(1, crate::constants::TOP_LIST_SIZE_MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageSettings;

    #[test]
    fn test_clamp_top_limit() {
        assert_eq!(clamp_top_limit(0), 1);
        assert_eq!(clamp_top_limit(10), 10);
        assert_eq!(clamp_top_limit(5000), crate::constants::TOP_LIST_SIZE_MAX);
    }

    #[tokio::test]
    async fn test_backend_factory_unreachable_postgres() {
        let mut settings = StorageSettings {
            enabled: true,
            backend: "postgres".to_string(),
            connection_timeout_ms: 500,
            ..StorageSettings::default()
        };
        settings.postgres.host = "127.0.0.1".to_string();
        settings.postgres.port = 1;

        let config = StorageConfig::from_settings(&settings);
        let err = match BackendFactory.open(&config).await {
            Ok(_) => panic!("port 1 should refuse connections"),
            Err(e) => e,
        };
        assert!(err.is_unavailable(), "unexpected error: {err}");
    }
}
