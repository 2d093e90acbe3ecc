//! DedupCache - Write Suppression
//!
//! TigerStyle: bounded memory, explicit reclamation.
//!
//! A write is suppressed when the same value was written for the same key
//! less than `min_interval` ago. Two independent policies bound memory:
//!
//! - **TTL**: before every check, entries older than the TTL are purged.
//! - **Ceiling**: inserting a new key into a full cache first evicts the
//!   oldest quarter of entries, ranked by (write time, insertion order).

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::clock::Clock;
use crate::model::TopEntry;

// =============================================================================
// Types
// =============================================================================

/// Outcome of a suppression test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteDecision {
    /// Value is new or stale; it was recorded and should be written
    Write,
    /// Same value written recently; skip the backend
    Suppress,
}

#[derive(Debug)]
struct CacheEntry<V> {
    value: V,
    written_at_ms: u64,
    seq: u64,
}

#[derive(Debug)]
struct CacheState<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    next_seq: u64,
}

/// Thread-safe write-dedup cache.
#[derive(Debug)]
pub struct DedupCache<K, V> {
    state: Mutex<CacheState<K, V>>,
    /// Zero disables TTL reclamation
    ttl_ms: u64,
    max_entries: usize,
    clock: Arc<dyn Clock>,
}

// =============================================================================
// DedupCache
// =============================================================================

impl<K, V> DedupCache<K, V>
where
    K: Hash + Eq + Clone,
    V: PartialEq,
{
    /// Create a cache.
    ///
    /// # Panics
    /// Panics if `max_entries` is zero.
    pub fn new(ttl: Duration, max_entries: usize, clock: Arc<dyn Clock>) -> Self {
        assert!(max_entries > 0, "max_entries must be positive");
        Self {
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                next_seq: 0,
            }),
            ttl_ms: u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX),
            max_entries,
            clock,
        }
    }

    /// Decide whether `value` needs writing for `key`, recording it if so.
    pub fn check_and_record(&self, key: K, value: V, min_interval: Duration) -> WriteDecision {
        let now = self.clock.now_ms();
        let min_interval_ms = u64::try_from(min_interval.as_millis()).unwrap_or(u64::MAX);

        let mut state = self.state.lock();
        state.purge_expired(now, self.ttl_ms);

        let (present, unchanged_recently) = match state.entries.get(&key) {
            Some(prev) => (
                true,
                prev.value == value && now.saturating_sub(prev.written_at_ms) < min_interval_ms,
            ),
            None => (false, false),
        };
        if unchanged_recently {
            return WriteDecision::Suppress;
        }
        if !present && state.entries.len() >= self.max_entries {
            state.evict_oldest_quarter();
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        state.entries.insert(
            key,
            CacheEntry {
                value,
                written_at_ms: now,
                seq,
            },
        );

        // Postcondition
        debug_assert!(state.entries.len() <= self.max_entries);

        WriteDecision::Write
    }

    /// Whether `key` currently has an entry.
    pub fn contains(&self, key: &K) -> bool {
        self.state.lock().entries.contains_key(key)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hard ceiling on entries.
    pub fn max_entries(&self) -> usize {
        self.max_entries
    }
}

impl<K, V> CacheState<K, V>
where
    K: Hash + Eq + Clone,
{
    fn purge_expired(&mut self, now: u64, ttl_ms: u64) {
        if ttl_ms == 0 {
            return;
        }
        self.entries
            .retain(|_, e| now.saturating_sub(e.written_at_ms) < ttl_ms);
    }

    fn evict_oldest_quarter(&mut self) {
        let count = (self.entries.len() / 4).max(1);
        let mut by_age: Vec<(u64, u64, K)> = self
            .entries
            .iter()
            .map(|(k, e)| (e.written_at_ms, e.seq, k.clone()))
            .collect();
        by_age.sort_unstable_by_key(|(at, seq, _)| (*at, *seq));

        for (_, _, key) in by_age.into_iter().take(count) {
            self.entries.remove(&key);
        }
        tracing::debug!(evicted = count, remaining = self.entries.len(), "Dedup cache at ceiling");
    }
}

// =============================================================================
// Leaderboard Hash
// =============================================================================

/// Content hash of the first `limit` entries, order- and value-sensitive.
#[must_use]
pub fn top_list_hash(entries: &[TopEntry], limit: usize) -> blake3::Hash {
    let mut hasher = blake3::Hasher::new();
    for entry in entries.iter().take(limit) {
        hasher.update(&(entry.name.len() as u64).to_le_bytes());
        hasher.update(entry.name.as_bytes());
        hasher.update(&entry.value.to_le_bytes());
    }
    hasher.finalize()
}
