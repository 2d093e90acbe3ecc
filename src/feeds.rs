//! Feeds - Pulling From the Game, Pushing Into Storage
//!
//! The manager only accepts writes. These helpers ask the game side for
//! data (ranked leaderboards, a joining player's stats, harvested
//! experience) and forward it:
//!
//! ```text
//! LeaderboardSource ──▶ publish_top_lists ──▶ StorageManager::upsert_top_list
//!        ▲
//!        └── TopListScheduler (on load, then every N minutes)
//! PlayerStatSource  ──▶ sync_player       ──▶ StorageManager::update_player_stat
//! (player, exp)*    ──▶ publish_experience ─▶ StorageManager::update_player_experience
//! ```

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::manager::StorageManager;
use crate::model::{Experience, PlayerRef, TopEntry};

/// Thread name of the leaderboard publisher.
const SCHEDULER_THREAD_NAME: &str = "statvault-top";

// =============================================================================
// Sources
// =============================================================================

/// Computes ranked leaderboards.
pub trait LeaderboardSource: Send + Sync {
    /// Best `size` entries for `stat_key`, highest first. `None` if the
    /// leaderboard cannot be computed right now.
    fn top_list(&self, stat_key: &str, size: usize) -> Option<Vec<TopEntry>>;
}

/// Reads a player's current statistic values.
pub trait PlayerStatSource: Send + Sync {
    /// Current value of `stat_key` for `player`, if known.
    fn stat_value(&self, player: &PlayerRef, stat_key: &str) -> Option<i64>;

    /// Current experience of `player`, if known.
    fn experience(&self, _player: &PlayerRef) -> Option<Experience> {
        None
    }
}

// =============================================================================
// One-shot Feeds
// =============================================================================

/// Forward a leaderboard for every tracked key. Returns how many were
/// handed to the manager.
pub fn publish_top_lists(manager: &StorageManager, source: &dyn LeaderboardSource) -> usize {
    let config = manager.config();
    if !config.enabled() {
        return 0;
    }

    let size = config.top_list_size();
    let mut published = 0;
    for key in manager.tracked_stat_keys().iter() {
        match source.top_list(key, size) {
            Some(entries) => {
                manager.upsert_top_list(key, &entries);
                published += 1;
            }
            None => tracing::debug!(stat_key = %key, "Leaderboard unavailable; skipped"),
        }
    }

    tracing::debug!(published, "Leaderboards published");
    published
}

/// Push every tracked stat and the experience of a player who just joined.
/// Returns how many stat values were forwarded.
pub fn sync_player(manager: &StorageManager, player: &PlayerRef, source: &dyn PlayerStatSource) -> usize {
    let config = manager.config();
    if !config.enabled() || !config.update_player_on_join() {
        return 0;
    }

    let mut forwarded = 0;
    for key in manager.tracked_stat_keys().iter() {
        if let Some(value) = source.stat_value(player, key) {
            manager.update_player_stat(player, key, value);
            forwarded += 1;
        }
    }
    if let Some(experience) = source.experience(player) {
        manager.update_player_experience(player, experience);
    }
    forwarded
}

/// Forward harvested experience records. Returns how many were forwarded.
pub fn publish_experience<I>(manager: &StorageManager, records: I) -> usize
where
    I: IntoIterator<Item = (PlayerRef, Experience)>,
{
    if !manager.config().enabled() {
        return 0;
    }
    let mut forwarded = 0;
    for (player, experience) in records {
        manager.update_player_experience(&player, experience);
        forwarded += 1;
    }
    forwarded
}

// =============================================================================
// TopListScheduler
// =============================================================================

/// Background publisher of leaderboards.
///
/// Publishes once on start when generate-top-on-load is set, then on every
/// period while generate-top-periodically stays set. The period is re-read
/// from the manager after each run, so reloads take effect.
pub struct TopListScheduler {
    stop_tx: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for TopListScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopListScheduler")
            .field("running", &self.is_running())
            .finish()
    }
}

impl TopListScheduler {
    /// Start publishing, or `None` if the configuration asks for nothing.
    pub fn start(manager: Arc<StorageManager>, source: Arc<dyn LeaderboardSource>) -> Option<Self> {
        Self::spawn(manager, source, None)
    }

    fn spawn(
        manager: Arc<StorageManager>,
        source: Arc<dyn LeaderboardSource>,
        period_override: Option<Duration>,
    ) -> Option<Self> {
        let config = manager.config();
        if !config.enabled() || !(config.generate_top_on_load() || config.generate_top_periodically()) {
            return None;
        }

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let spawned = std::thread::Builder::new()
            .name(SCHEDULER_THREAD_NAME.to_string())
            .spawn(move || run_scheduler(&manager, source.as_ref(), &stop_rx, period_override));

        match spawned {
            Ok(handle) => Some(Self {
                stop_tx: Some(stop_tx),
                handle: Some(handle),
            }),
            Err(e) => {
                tracing::error!(error = %e, "Cannot start leaderboard publisher");
                None
            }
        }
    }

    /// Whether the publisher thread is still alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop and wait for the thread. A publish in progress completes first.
    pub fn stop(&mut self) {
        drop(self.stop_tx.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Leaderboard publisher panicked");
            }
        }
    }
}

impl Drop for TopListScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_scheduler(
    manager: &StorageManager,
    source: &dyn LeaderboardSource,
    stop_rx: &mpsc::Receiver<()>,
    period_override: Option<Duration>,
) {
    if manager.config().generate_top_on_load() {
        publish_top_lists(manager, source);
    }

    loop {
        let config = manager.config();
        if !config.enabled() || !config.generate_top_periodically() {
            break;
        }
        let period = period_override.unwrap_or_else(|| config.generate_top_interval());
        match stop_rx.recv_timeout(period) {
            Err(RecvTimeoutError::Timeout) => {
                publish_top_lists(manager, source);
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    tracing::debug!("Leaderboard publisher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SimClock;
    use crate::config::{MemoryConfigSource, StorageSettings};
    use crate::provider::SimBackend;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;
    use uuid::Uuid;

    struct FixedBoards {
        calls: AtomicUsize,
    }

    impl LeaderboardSource for FixedBoards {
        fn top_list(&self, stat_key: &str, size: usize) -> Option<Vec<TopEntry>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) as i64;
            if stat_key == "UNTYPED:DEATHS" {
                return None;
            }
            Some(
                (0..size as i64)
                    .map(|i| TopEntry::new(format!("p{i}"), 1000 - i + call))
                    .collect(),
            )
        }
    }

    struct FixedStats(HashMap<String, i64>);

    impl PlayerStatSource for FixedStats {
        fn stat_value(&self, _player: &PlayerRef, stat_key: &str) -> Option<i64> {
            self.0.get(stat_key).copied()
        }
    }

    struct LevelledStats(HashMap<String, i64>, Experience);

    impl PlayerStatSource for LevelledStats {
        fn stat_value(&self, _player: &PlayerRef, stat_key: &str) -> Option<i64> {
            self.0.get(stat_key).copied()
        }

        fn experience(&self, _player: &PlayerRef) -> Option<Experience> {
            Some(self.1)
        }
    }

    fn settings() -> StorageSettings {
        StorageSettings {
            enabled: true,
            top_list_size: 3,
            tracked_stats: vec!["UNTYPED:JUMP".to_string(), "UNTYPED:DEATHS".to_string()],
            top_update_min_interval_ms: 0,
            ..StorageSettings::default()
        }
    }

    fn manager(settings: StorageSettings) -> (Arc<StorageManager>, SimBackend) {
        let backend = SimBackend::new();
        let manager = StorageManager::builder(Arc::new(MemoryConfigSource::new(settings)))
            .factory(Arc::new(backend.clone()))
            .clock(Arc::new(SimClock::new()))
            .build();
        manager.reload();
        (Arc::new(manager), backend)
    }

    #[test]
    fn test_publish_skips_unavailable_boards() {
        let (manager, backend) = manager(settings());
        let source = FixedBoards {
            calls: AtomicUsize::new(0),
        };

        assert_eq!(publish_top_lists(&manager, &source), 1);
        manager.close();

        assert_eq!(backend.top_list("UNTYPED:JUMP").unwrap().len(), 3);
        assert!(backend.top_list("UNTYPED:DEATHS").is_none());
    }

    #[test]
    fn test_publish_disabled_does_nothing() {
        let (manager, _backend) = manager(StorageSettings {
            enabled: false,
            ..settings()
        });
        let source = FixedBoards {
            calls: AtomicUsize::new(0),
        };
        assert_eq!(publish_top_lists(&manager, &source), 0);
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_scheduler_publishes_on_load_then_exits() {
        let (manager, _backend) = manager(settings());
        let source = Arc::new(FixedBoards {
            calls: AtomicUsize::new(0),
        });

        let mut scheduler = TopListScheduler::start(manager.clone(), source.clone()).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while scheduler.is_running() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        scheduler.stop();
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_scheduler_periodic_until_stopped() {
        let (manager, backend) = manager(StorageSettings {
            generate_top_on_load: false,
            generate_top_periodically: true,
            ..settings()
        });
        let source = Arc::new(FixedBoards {
            calls: AtomicUsize::new(0),
        });

        let mut scheduler =
            TopListScheduler::spawn(manager.clone(), source.clone(), Some(Duration::from_millis(10)))
                .unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while source.calls.load(Ordering::SeqCst) < 6 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }

        let stopped_at = Instant::now();
        scheduler.stop();
        assert!(stopped_at.elapsed() < Duration::from_secs(1));
        assert!(!scheduler.is_running());
        assert!(source.calls.load(Ordering::SeqCst) >= 6);

        manager.close();
        assert!(backend.top_list_writes() >= 3);
    }

    #[test]
    fn test_scheduler_not_started_when_nothing_requested() {
        let (manager, _backend) = manager(StorageSettings {
            generate_top_on_load: false,
            generate_top_periodically: false,
            ..settings()
        });
        let source = Arc::new(FixedBoards {
            calls: AtomicUsize::new(0),
        });
        assert!(TopListScheduler::start(manager, source).is_none());
    }

    #[test]
    fn test_sync_player_on_join() {
        let (manager, backend) = manager(settings());
        let player = PlayerRef::new(Uuid::new_v4(), "Alex");
        let source = FixedStats(HashMap::from([("UNTYPED:JUMP".to_string(), 12)]));

        assert_eq!(sync_player(&manager, &player, &source), 1);
        manager.close();
        assert_eq!(backend.player(player.id).unwrap().stats["UNTYPED:JUMP"], 12);
    }

    #[test]
    fn test_sync_player_pushes_experience() {
        let (manager, backend) = manager(settings());
        let player = PlayerRef::new(Uuid::new_v4(), "Alex");
        let source = LevelledStats(
            HashMap::from([("UNTYPED:DEATHS".to_string(), 2)]),
            Experience::new(12, 900, 0.75),
        );

        assert_eq!(sync_player(&manager, &player, &source), 1);
        manager.close();

        assert_eq!(backend.experience_writes(), 1);
        let record = backend.player(player.id).unwrap();
        assert_eq!(record.stats["UNTYPED:DEATHS"], 2);
        assert_eq!(record.experience, Some(Experience::new(12, 900, 0.75)));
    }

    #[test]
    fn test_sync_player_respects_join_toggle() {
        let (manager, _backend) = manager(StorageSettings {
            update_player_on_join: false,
            ..settings()
        });
        let player = PlayerRef::new(Uuid::new_v4(), "Alex");
        let source = FixedStats(HashMap::from([("UNTYPED:JUMP".to_string(), 12)]));
        assert_eq!(sync_player(&manager, &player, &source), 0);
    }

    #[test]
    fn test_publish_experience() {
        let (manager, backend) = manager(settings());
        let players: Vec<PlayerRef> = (0..3)
            .map(|i| PlayerRef::new(Uuid::new_v4(), &format!("p{i}")))
            .collect();
        let records = players
            .iter()
            .map(|p| (p.clone(), Experience::new(7, 300, 0.5)));

        assert_eq!(publish_experience(&manager, records), 3);
        manager.close();
        assert_eq!(backend.experience_writes(), 3);
        assert_eq!(
            backend.player(players[0].id).unwrap().experience,
            Some(Experience::new(7, 300, 0.5))
        );
    }
}
