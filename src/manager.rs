//! StorageManager - Write Orchestration
//!
//! TigerStyle: the foreground never waits on the network, never sees an
//! error, and never observes a half-swapped backend.
//!
//! # Architecture
//!
//! ```text
//!                        ┌──────────────────────────────┐
//!  update_player_stat ──▶│ validate key, clamp value     │
//!  upsert_top_list    ──▶│ dedup cache (player / top)    │──suppressed──▶ (dropped)
//!  update_player_exp  ──▶│ route by key                  │
//!                        └──────────────┬───────────────┘
//!                                       ▼
//!                        ┌──────────────────────────────┐
//!                        │ Generation (Arc, swapped by   │
//!                        │ reload): config, provider,    │
//!                        │ pool, caches, tracked keys    │
//!                        └──────────────┬───────────────┘
//!                                       ▼
//!                        WorkerPool ──▶ StorageProvider
//! ```
//!
//! # Lifecycle
//!
//! `Uninitialized → Ready ⇄ Reloading → Closed`. Before the first reload
//! and after close every write is a no-op. A reload that cannot open the
//! configured backend installs [`InertProvider`] instead of failing.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

use crate::cache::{top_list_hash, DedupCache, WriteDecision};
use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigSource, StorageConfig, StorageSettings};
use crate::constants::POOL_DRAIN_TIMEOUT;
use crate::error::StorageError;
use crate::model::{Experience, PlayerRef, TopEntry};
use crate::pool::WorkerPool;
use crate::provider::{BackendFactory, InertProvider, ProviderFactory, StorageProvider};
use crate::stat_key::{enumerate_all, is_valid, StatCatalog};

// =============================================================================
// State
// =============================================================================

/// Manager lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    /// Built, never reloaded
    Uninitialized,
    /// Serving writes with the current generation
    Ready,
    /// A reload is building the next generation
    Reloading,
    /// Closed for good
    Closed,
}

impl ManagerState {
    /// Get string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Ready => "ready",
            Self::Reloading => "reloading",
            Self::Closed => "closed",
        }
    }
}

/// Entry counts of the two dedup caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheSizes {
    /// (player, stat key) entries
    pub players: usize,
    /// Leaderboard entries
    pub top_lists: usize,
}

/// Everything one reload installs, swapped as a unit.
struct Generation {
    config: Arc<StorageConfig>,
    provider: Arc<dyn StorageProvider>,
    pool: Option<WorkerPool>,
    tracked_keys: Arc<[String]>,
    player_cache: DedupCache<(Uuid, String), i64>,
    top_cache: DedupCache<String, blake3::Hash>,
}

impl Generation {
    fn new(
        config: Arc<StorageConfig>,
        provider: Arc<dyn StorageProvider>,
        pool: Option<WorkerPool>,
        tracked_keys: Vec<String>,
        clock: &Arc<dyn Clock>,
    ) -> Self {
        Self {
            player_cache: DedupCache::new(config.cache_ttl(), config.cache_max_entries(), clock.clone()),
            top_cache: DedupCache::new(config.cache_ttl(), config.cache_max_entries(), clock.clone()),
            tracked_keys: tracked_keys.into(),
            provider,
            pool,
            config,
        }
    }

    fn inert(config: Arc<StorageConfig>, tracked_keys: Vec<String>, clock: &Arc<dyn Clock>) -> Self {
        Self::new(config, Arc::new(InertProvider), None, tracked_keys, clock)
    }

    /// Run `job` on the pool, or inline when there is none (inert).
    fn dispatch<F>(&self, route: u64, job: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        match &self.pool {
            Some(pool) => {
                pool.submit(route, job);
            }
            None => futures::executor::block_on(job),
        }
    }

    /// Drain, close the provider, stop the pool.
    fn retire(&self) {
        let provider = self.provider.clone();
        let close = async move {
            match tokio::time::timeout(POOL_DRAIN_TIMEOUT, provider.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(backend = provider.name(), error = %e, "Provider close failed")
                }
                Err(_) => tracing::warn!(backend = provider.name(), "Provider close timed out"),
            }
        };

        match &self.pool {
            Some(pool) => {
                pool.drain(POOL_DRAIN_TIMEOUT);
                pool.run_blocking(close);
                pool.terminate();
            }
            None => {
                // Only the inert provider runs without a pool; its close is immediate.
                if let Err(e) = futures::executor::block_on(self.provider.close()) {
                    tracing::warn!(backend = self.provider.name(), error = %e, "Provider close failed");
                }
            }
        }
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`StorageManager`].
pub struct StorageManagerBuilder {
    source: Arc<dyn ConfigSource>,
    catalog: Option<StatCatalog>,
    factory: Option<Arc<dyn ProviderFactory>>,
    clock: Option<Arc<dyn Clock>>,
}

impl StorageManagerBuilder {
    /// Statistic taxonomy; defaults to [`StatCatalog::vanilla`].
    #[must_use]
    pub fn catalog(mut self, catalog: StatCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Provider factory; defaults to [`BackendFactory`].
    #[must_use]
    pub fn factory(mut self, factory: Arc<dyn ProviderFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Time source for the dedup caches; defaults to [`SystemClock`].
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Build an uninitialized manager. Call [`StorageManager::reload`] to
    /// start persisting.
    #[must_use]
    pub fn build(self) -> StorageManager {
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock::new()));
        let config = Arc::new(StorageConfig::from_settings(&StorageSettings::default()));
        let initial = Generation::inert(config, Vec::new(), &clock);

        StorageManager {
            source: self.source,
            catalog: Arc::new(self.catalog.unwrap_or_else(|| StatCatalog::vanilla().clone())),
            factory: self.factory.unwrap_or_else(|| Arc::new(BackendFactory)),
            clock,
            current: RwLock::new(Arc::new(initial)),
            state: RwLock::new(ManagerState::Uninitialized),
            lifecycle: Mutex::new(()),
        }
    }
}

// =============================================================================
// StorageManager
// =============================================================================

/// Orchestrates validation, deduplication and background persistence.
///
/// Build once, share as `Arc<StorageManager>`.
pub struct StorageManager {
    source: Arc<dyn ConfigSource>,
    catalog: Arc<StatCatalog>,
    factory: Arc<dyn ProviderFactory>,
    clock: Arc<dyn Clock>,
    current: RwLock<Arc<Generation>>,
    state: RwLock<ManagerState>,
    /// Serializes reload and close
    lifecycle: Mutex<()>,
}

impl std::fmt::Debug for StorageManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageManager")
            .field("state", &self.state())
            .field("backend", &self.active_backend())
            .field("enabled", &self.config().enabled())
            .finish()
    }
}

impl StorageManager {
    /// Start building a manager that reads settings from `source`.
    pub fn builder(source: Arc<dyn ConfigSource>) -> StorageManagerBuilder {
        StorageManagerBuilder {
            source,
            catalog: None,
            factory: None,
            clock: None,
        }
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Re-read settings and install a new generation.
    ///
    /// Never fails: an unusable backend degrades to [`InertProvider`]. The
    /// old generation is retired only after the new one is installed.
    pub fn reload(&self) {
        let _lifecycle = self.lifecycle.lock();
        if self.state() == ManagerState::Closed {
            tracing::warn!("Reload ignored: storage manager is closed");
            return;
        }
        *self.state.write() = ManagerState::Reloading;

        let settings = self.source.settings();
        let config = Arc::new(StorageConfig::from_settings(&settings));
        let tracked_keys = resolve_tracked_keys(config.tracked_stats(), &self.catalog);

        let next = if config.enabled() {
            self.open_generation(config, tracked_keys)
        } else {
            tracing::info!("Storage disabled; writes are discarded");
            Generation::inert(config, tracked_keys, &self.clock)
        };

        tracing::info!(
            enabled = next.config.enabled(),
            backend = next.provider.name(),
            configured = next.config.backend().as_str(),
            tracked_keys = next.tracked_keys.len(),
            workers = next.pool.as_ref().map_or(0, WorkerPool::threads),
            "Storage reloaded"
        );

        let previous = std::mem::replace(&mut *self.current.write(), Arc::new(next));
        *self.state.write() = ManagerState::Ready;

        previous.retire();
    }

    fn open_generation(&self, config: Arc<StorageConfig>, tracked_keys: Vec<String>) -> Generation {
        let pool = match WorkerPool::new(config.async_threads()) {
            Ok(pool) => pool,
            Err(e) => {
                tracing::error!(error = %e, "Cannot start storage workers; writes are discarded");
                return Generation::inert(config, tracked_keys, &self.clock);
            }
        };

        let factory = self.factory.clone();
        let opened = pool.run_blocking(async {
            let provider = factory.open(&config).await?;
            // A failed preparation leaves the provider in degraded mode.
            if let Err(e) = provider.start().await {
                tracing::warn!(
                    backend = provider.name(),
                    error = %e,
                    "Storage backend preparation failed; continuing degraded"
                );
            }
            Ok::<_, StorageError>(provider)
        });

        match opened {
            Ok(provider) => Generation::new(config, provider, Some(pool), tracked_keys, &self.clock),
            Err(e) => {
                tracing::warn!(
                    backend = config.backend().as_str(),
                    error = %e,
                    "Storage backend unavailable; writes are discarded"
                );
                pool.terminate();
                Generation::inert(config, tracked_keys, &self.clock)
            }
        }
    }

    /// Drain pending writes, close the backend and stop the workers.
    /// Idempotent; later writes and reloads are ignored.
    pub fn close(&self) {
        let _lifecycle = self.lifecycle.lock();
        {
            let mut state = self.state.write();
            if *state == ManagerState::Closed {
                return;
            }
            *state = ManagerState::Closed;
        }

        let config = self.config();
        let tracked = self.tracked_stat_keys().to_vec();
        let previous = std::mem::replace(
            &mut *self.current.write(),
            Arc::new(Generation::inert(config, tracked, &self.clock)),
        );
        previous.retire();

        tracing::info!("Storage manager closed");
    }

    // -------------------------------------------------------------------------
    // Writes
    // -------------------------------------------------------------------------

    /// Persist one statistic of one player, unless suppressed.
    pub fn update_player_stat(&self, player: &PlayerRef, stat_key: &str, value: i64) {
        let Some(generation) = self.writable() else {
            return;
        };
        if !is_valid(stat_key, &self.catalog) {
            tracing::debug!(stat_key, "Skipping invalid stat key");
            return;
        }
        let value = value.max(0);
        let verbose = generation.config.verbose_logging();

        let decision = generation.player_cache.check_and_record(
            (player.id, stat_key.to_string()),
            value,
            generation.config.player_update_min_interval(),
        );
        if decision == WriteDecision::Suppress {
            if verbose {
                tracing::debug!(player = %player.id, stat_key, value, "Player stat unchanged; skipped");
            }
            return;
        }

        let provider = generation.provider.clone();
        let player = player.clone();
        let key = stat_key.to_string();
        let route = route_of(&(player.id, &key));
        generation.dispatch(route, async move {
            match provider.update_player_stat(&player, &key, value).await {
                Ok(()) if verbose => {
                    tracing::debug!(player = %player.id, stat_key = %key, value, "Player stat written")
                }
                Ok(()) => {}
                Err(e) => tracing::warn!(
                    player = %player.id,
                    stat_key = %key,
                    error = %e,
                    "Player stat write failed"
                ),
            }
        });
    }

    /// Persist a player's experience. Not deduplicated.
    pub fn update_player_experience(&self, player: &PlayerRef, experience: Experience) {
        let Some(generation) = self.writable() else {
            return;
        };
        let verbose = generation.config.verbose_logging();
        let experience = Experience::new(experience.level, experience.total, experience.progress);

        let provider = generation.provider.clone();
        let player = player.clone();
        let route = route_of(&player.id);
        generation.dispatch(route, async move {
            match provider.update_player_experience(&player, experience).await {
                Ok(()) if verbose => {
                    tracing::debug!(player = %player.id, level = experience.level, "Experience written")
                }
                Ok(()) => {}
                Err(e) => {
                    tracing::warn!(player = %player.id, error = %e, "Experience write failed")
                }
            }
        });
    }

    /// Replace the stored leaderboard for `stat_key` with the first
    /// top-list-size entries, unless the content is unchanged.
    pub fn upsert_top_list(&self, stat_key: &str, entries: &[TopEntry]) {
        let Some(generation) = self.writable() else {
            return;
        };
        if !is_valid(stat_key, &self.catalog) {
            tracing::debug!(stat_key, "Skipping leaderboard for invalid stat key");
            return;
        }
        let limit = generation.config.top_list_size();
        let verbose = generation.config.verbose_logging();

        let entries: Vec<TopEntry> = entries.iter().take(limit).map(TopEntry::normalized).collect();
        let decision = generation.top_cache.check_and_record(
            stat_key.to_string(),
            top_list_hash(&entries, limit),
            generation.config.top_update_min_interval(),
        );
        if decision == WriteDecision::Suppress {
            if verbose {
                tracing::debug!(stat_key, "Leaderboard unchanged; skipped");
            }
            return;
        }

        let provider = generation.provider.clone();
        let key = stat_key.to_string();
        let route = route_of(&key);
        generation.dispatch(route, async move {
            match provider.upsert_top_list(&key, &entries, limit).await {
                Ok(()) if verbose => {
                    tracing::debug!(stat_key = %key, entries = entries.len(), "Leaderboard written")
                }
                Ok(()) => {}
                Err(e) => tracing::warn!(stat_key = %key, error = %e, "Leaderboard write failed"),
            }
        });
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    /// Current configuration snapshot.
    #[must_use]
    pub fn config(&self) -> Arc<StorageConfig> {
        self.current.read().config.clone()
    }

    /// Keys resolved by the last reload.
    #[must_use]
    pub fn tracked_stat_keys(&self) -> Arc<[String]> {
        self.current.read().tracked_keys.clone()
    }

    /// Lifecycle state.
    #[must_use]
    pub fn state(&self) -> ManagerState {
        *self.state.read()
    }

    /// Name of the provider currently receiving writes.
    #[must_use]
    pub fn active_backend(&self) -> &'static str {
        self.current.read().provider.name()
    }

    /// Dedup cache sizes of the current generation.
    #[must_use]
    pub fn cache_sizes(&self) -> CacheSizes {
        let generation = self.current.read().clone();
        CacheSizes {
            players: generation.player_cache.len(),
            top_lists: generation.top_cache.len(),
        }
    }

    /// Statistic taxonomy keys are validated against.
    #[must_use]
    pub fn catalog(&self) -> &StatCatalog {
        &self.catalog
    }

    /// Current generation if writes should go anywhere.
    fn writable(&self) -> Option<Arc<Generation>> {
        if self.state() == ManagerState::Closed {
            return None;
        }
        let generation = self.current.read().clone();
        generation.config.enabled().then_some(generation)
    }
}

impl Drop for StorageManager {
    fn drop(&mut self) {
        self.close();
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Valid configured keys in order without repeats, or every known key when
/// none survive.
#[must_use]
pub fn resolve_tracked_keys(configured: &[String], catalog: &StatCatalog) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut invalid = 0usize;
    let mut keys = Vec::with_capacity(configured.len());
    for key in configured {
        if !is_valid(key, catalog) {
            invalid += 1;
            continue;
        }
        if seen.insert(key.as_str()) {
            keys.push(key.clone());
        }
    }

    if invalid > 0 {
        tracing::warn!(invalid, configured = configured.len(), "Ignoring invalid tracked stat keys");
    }
    if keys.is_empty() {
        if !configured.is_empty() {
            tracing::warn!("No valid tracked stat keys; tracking every known key");
        }
        return enumerate_all(catalog);
    }
    keys
}

fn route_of<T: Hash + ?Sized>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}
