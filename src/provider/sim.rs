//! SimProvider - In-Memory Backend
//!
//! TigerStyle: simulation-first. Implements the same storage semantics as
//! the real backends (merge on player upsert, replace on leaderboard
//! upsert) and counts every call so tests can assert what reached storage.
//!
//! [`SimBackend`] is the shared store and doubles as a [`ProviderFactory`];
//! every opened [`SimProvider`] writes into it.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;

use super::{clamp_top_limit, ProviderFactory, StorageProvider};
use crate::config::StorageConfig;
use crate::error::{StorageError, StorageResult};
use crate::model::{Experience, PlayerRef, TopEntry};

// =============================================================================
// Types
// =============================================================================

/// Switches that make the simulated backend misbehave.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimFaults {
    /// `open` fails as if the backend were unreachable
    pub fail_open: bool,
    /// `start` fails as if schema creation were rejected
    pub fail_start: bool,
    /// Every write fails
    pub fail_writes: bool,
}

/// Stored player record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimPlayerRecord {
    /// Last written display name
    pub name: String,
    /// Merged stat values
    pub stats: BTreeMap<String, i64>,
    /// Last written experience
    pub experience: Option<Experience>,
}

#[derive(Debug, Default)]
struct SimState {
    players: HashMap<Uuid, SimPlayerRecord>,
    top_lists: HashMap<String, Vec<TopEntry>>,
    player_stat_writes: usize,
    top_list_writes: usize,
    experience_writes: usize,
    opens: usize,
    starts: usize,
    closes: usize,
    faults: SimFaults,
    write_delay: Option<Duration>,
}

// =============================================================================
// SimBackend
// =============================================================================

/// Shared in-memory store.
#[derive(Debug, Clone, Default)]
pub struct SimBackend {
    state: Arc<Mutex<SimState>>,
}

impl SimBackend {
    /// Empty store with no faults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the fault switches.
    pub fn set_faults(&self, faults: SimFaults) {
        self.state.lock().faults = faults;
    }

    /// Make every write sleep first (simulated latency).
    pub fn set_write_delay(&self, delay: Option<Duration>) {
        self.state.lock().write_delay = delay;
    }

    /// Stored record of a player.
    #[must_use]
    pub fn player(&self, id: Uuid) -> Option<SimPlayerRecord> {
        self.state.lock().players.get(&id).cloned()
    }

    /// Stored leaderboard for a key.
    #[must_use]
    pub fn top_list(&self, stat_key: &str) -> Option<Vec<TopEntry>> {
        self.state.lock().top_lists.get(stat_key).cloned()
    }

    /// Number of player records.
    #[must_use]
    pub fn player_count(&self) -> usize {
        self.state.lock().players.len()
    }

    /// Player stat writes that reached the store.
    #[must_use]
    pub fn player_stat_writes(&self) -> usize {
        self.state.lock().player_stat_writes
    }

    /// Leaderboard writes that reached the store.
    #[must_use]
    pub fn top_list_writes(&self) -> usize {
        self.state.lock().top_list_writes
    }

    /// Experience writes that reached the store.
    #[must_use]
    pub fn experience_writes(&self) -> usize {
        self.state.lock().experience_writes
    }

    /// Successful opens.
    #[must_use]
    pub fn opens(&self) -> usize {
        self.state.lock().opens
    }

    /// `start` calls.
    #[must_use]
    pub fn starts(&self) -> usize {
        self.state.lock().starts
    }

    /// Provider closes (first close per provider only).
    #[must_use]
    pub fn closes(&self) -> usize {
        self.state.lock().closes
    }
}

#[async_trait]
impl ProviderFactory for SimBackend {
    async fn open(&self, _config: &StorageConfig) -> StorageResult<Arc<dyn StorageProvider>> {
        let mut state = self.state.lock();
        if state.faults.fail_open {
            return Err(StorageError::connection("simulated backend unreachable"));
        }
        state.opens += 1;
        Ok(Arc::new(SimProvider {
            backend: self.clone(),
            closed: AtomicBool::new(false),
        }))
    }
}

// =============================================================================
// SimProvider
// =============================================================================

/// Provider writing into a [`SimBackend`].
#[derive(Debug)]
pub struct SimProvider {
    backend: SimBackend,
    closed: AtomicBool,
}

impl SimProvider {
    async fn before_write(&self) -> StorageResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StorageError::internal("provider closed"));
        }
        let (delay, faults) = {
            let state = self.backend.state.lock();
            (state.write_delay, state.faults)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if faults.fail_writes {
            return Err(StorageError::write("simulated write failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl StorageProvider for SimProvider {
    fn name(&self) -> &'static str {
        "sim"
    }

    async fn start(&self) -> StorageResult<()> {
        let mut state = self.backend.state.lock();
        state.starts += 1;
        if state.faults.fail_start {
            return Err(StorageError::schema("simulated schema failure"));
        }
        Ok(())
    }

    async fn update_player_stat(
        &self,
        player: &PlayerRef,
        stat_key: &str,
        value: i64,
    ) -> StorageResult<()> {
        self.before_write().await?;

        let mut state = self.backend.state.lock();
        state.player_stat_writes += 1;
        let record = state.players.entry(player.id).or_default();
        record.name.clone_from(&player.name);
        record.stats.insert(stat_key.to_string(), value);
        Ok(())
    }

    async fn upsert_top_list(
        &self,
        stat_key: &str,
        entries: &[TopEntry],
        limit: usize,
    ) -> StorageResult<()> {
        self.before_write().await?;

        let stored: Vec<TopEntry> = entries
            .iter()
            .take(clamp_top_limit(limit))
            .map(TopEntry::normalized)
            .collect();
        let mut state = self.backend.state.lock();
        state.top_list_writes += 1;
        state.top_lists.insert(stat_key.to_string(), stored);
        Ok(())
    }

    async fn update_player_experience(
        &self,
        player: &PlayerRef,
        experience: Experience,
    ) -> StorageResult<()> {
        self.before_write().await?;

        let mut state = self.backend.state.lock();
        state.experience_writes += 1;
        let record = state.players.entry(player.id).or_default();
        record.name.clone_from(&player.name);
        record.experience = Some(experience);
        Ok(())
    }

    async fn close(&self) -> StorageResult<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.backend.state.lock().closes += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageSettings;

    fn config() -> StorageConfig {
        StorageConfig::from_settings(&StorageSettings::default())
    }

    #[tokio::test]
    async fn test_player_upsert_merges() {
        let backend = SimBackend::new();
        let provider = backend.open(&config()).await.unwrap();
        let player = PlayerRef::new(Uuid::new_v4(), "Alex");

        provider.update_player_stat(&player, "UNTYPED:JUMP", 4).await.unwrap();
        provider.update_player_stat(&player, "UNTYPED:DEATHS", 1).await.unwrap();
        provider.update_player_stat(&player, "UNTYPED:JUMP", 9).await.unwrap();

        let record = backend.player(player.id).unwrap();
        assert_eq!(record.stats.len(), 2);
        assert_eq!(record.stats["UNTYPED:JUMP"], 9);
        assert_eq!(backend.player_stat_writes(), 3);
    }

    #[tokio::test]
    async fn test_top_list_replaced_and_limited() {
        let backend = SimBackend::new();
        let provider = backend.open(&config()).await.unwrap();
        let entries: Vec<TopEntry> = (0..5).map(|i| TopEntry::new(format!("p{i}"), 100 - i)).collect();

        provider.upsert_top_list("UNTYPED:JUMP", &entries, 3).await.unwrap();
        assert_eq!(backend.top_list("UNTYPED:JUMP").unwrap(), entries[..3].to_vec());

        provider.upsert_top_list("UNTYPED:JUMP", &entries[4..], 3).await.unwrap();
        assert_eq!(backend.top_list("UNTYPED:JUMP").unwrap(), entries[4..].to_vec());
    }

    #[tokio::test]
    async fn test_faults() {
        let backend = SimBackend::new();
        backend.set_faults(SimFaults {
            fail_open: true,
            ..SimFaults::default()
        });
        assert!(backend.open(&config()).await.is_err());

        backend.set_faults(SimFaults {
            fail_start: true,
            fail_writes: true,
            ..SimFaults::default()
        });
        let provider = backend.open(&config()).await.unwrap();
        assert!(provider.start().await.is_err());

        let player = PlayerRef::new(Uuid::new_v4(), "Alex");
        assert!(provider.update_player_stat(&player, "UNTYPED:JUMP", 1).await.is_err());
        assert_eq!(backend.player_count(), 0);
    }

    #[tokio::test]
    async fn test_close_idempotent_and_final() {
        let backend = SimBackend::new();
        let provider = backend.open(&config()).await.unwrap();

        provider.close().await.unwrap();
        provider.close().await.unwrap();
        assert_eq!(backend.closes(), 1);

        let player = PlayerRef::new(Uuid::new_v4(), "Alex");
        assert!(provider
            .update_player_experience(&player, Experience::new(1, 1, 0.1))
            .await
            .is_err());
    }
}
