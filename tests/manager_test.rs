//! End-to-end behavior of the storage manager against the simulated backend.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use uuid::Uuid;

use statvault::config::BackendKind;
use statvault::provider::{SimBackend, SimFaults};
use statvault::stat_key::enumerate_all;
use statvault::{
    Experience, ManagerState, MemoryConfigSource, PlayerRef, ProviderFactory, SimClock,
    StatCatalog, StorageConfig, StorageManager, StorageProvider, StorageResult, StorageSettings,
    TopEntry,
};

// =============================================================================
// Harness
// =============================================================================

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();
}

fn enabled() -> StorageSettings {
    StorageSettings {
        enabled: true,
        ..StorageSettings::default()
    }
}

struct Harness {
    manager: StorageManager,
    backend: SimBackend,
    source: Arc<MemoryConfigSource>,
    clock: Arc<SimClock>,
}

fn harness(settings: StorageSettings) -> Harness {
    init_logging();
    let backend = SimBackend::new();
    let source = Arc::new(MemoryConfigSource::new(settings));
    let clock = Arc::new(SimClock::new());
    let manager = StorageManager::builder(source.clone())
        .factory(Arc::new(backend.clone()))
        .clock(clock.clone())
        .build();
    manager.reload();
    Harness {
        manager,
        backend,
        source,
        clock,
    }
}

fn player(name: &str) -> PlayerRef {
    PlayerRef::new(Uuid::new_v4(), name)
}

/// Routes each backend kind to its own simulated store.
struct PerKindFactory {
    postgres: SimBackend,
    mongo: SimBackend,
}

#[async_trait]
impl ProviderFactory for PerKindFactory {
    async fn open(&self, config: &StorageConfig) -> StorageResult<Arc<dyn StorageProvider>> {
        match config.backend() {
            BackendKind::Postgres => self.postgres.open(config).await,
            BackendKind::Mongo => self.mongo.open(config).await,
        }
    }
}

// =============================================================================
// Deduplication
// =============================================================================

#[test]
fn test_identical_write_within_interval_suppressed() {
    let h = harness(enabled());
    let alex = player("Alex");

    h.manager.update_player_stat(&alex, "UNTYPED:JUMP", 10);
    h.clock.advance_ms(59_999);
    h.manager.update_player_stat(&alex, "UNTYPED:JUMP", 10);
    h.manager.close();

    assert_eq!(h.backend.player_stat_writes(), 1);
    assert_eq!(h.backend.player(alex.id).unwrap().stats["UNTYPED:JUMP"], 10);
}

#[test]
fn test_identical_write_after_interval_persisted() {
    let h = harness(enabled());
    let alex = player("Alex");

    h.manager.update_player_stat(&alex, "UNTYPED:JUMP", 10);
    h.clock.advance_ms(60_001);
    h.manager.update_player_stat(&alex, "UNTYPED:JUMP", 10);
    h.manager.close();

    assert_eq!(h.backend.player_stat_writes(), 2);
}

#[test]
fn test_changed_value_and_other_player_not_suppressed() {
    let h = harness(enabled());
    let alex = player("Alex");
    let sam = player("Sam");

    h.manager.update_player_stat(&alex, "UNTYPED:JUMP", 10);
    h.manager.update_player_stat(&alex, "UNTYPED:JUMP", 11);
    h.manager.update_player_stat(&sam, "UNTYPED:JUMP", 11);
    assert_eq!(h.manager.cache_sizes().players, 2);
    h.manager.close();

    assert_eq!(h.backend.player_stat_writes(), 3);
    assert_eq!(h.backend.player(alex.id).unwrap().stats["UNTYPED:JUMP"], 11);
}

#[test]
fn test_unchanged_leaderboard_suppressed() {
    let h = harness(enabled());
    let board = vec![TopEntry::new("Alex", 9), TopEntry::new("Sam", 4)];

    h.manager.upsert_top_list("UNTYPED:JUMP", &board);
    h.manager.upsert_top_list("UNTYPED:JUMP", &board);
    h.manager.upsert_top_list("UNTYPED:JUMP", &[TopEntry::new("Sam", 12)]);
    h.manager.close();

    assert_eq!(h.backend.top_list_writes(), 2);
    assert_eq!(
        h.backend.top_list("UNTYPED:JUMP").unwrap(),
        vec![TopEntry::new("Sam", 12)]
    );
}

// =============================================================================
// Leaderboards
// =============================================================================

#[test]
fn test_leaderboard_truncated_to_top_size_in_order() {
    let h = harness(StorageSettings {
        top_list_size: 3,
        ..enabled()
    });
    let board: Vec<TopEntry> = ["A", "B", "C", "D", "E"]
        .iter()
        .enumerate()
        .map(|(i, name)| TopEntry::new(*name, 50 - i as i64 * 10))
        .collect();

    h.manager.upsert_top_list("UNTYPED:JUMP", &board);
    h.manager.close();

    assert_eq!(h.backend.top_list("UNTYPED:JUMP").unwrap(), board[..3].to_vec());
}

// =============================================================================
// Validation
// =============================================================================

#[test]
fn test_invalid_keys_silently_skipped() {
    let h = harness(enabled());
    let alex = player("Alex");
    let too_long = format!("UNTYPED:{}", "J".repeat(200));

    for key in [
        "",
        "untyped:jump",
        "UNTYPED:NOT_A_STAT",
        "BLOCK:MINE_BLOCK",
        "UNTYPED:JUMP:STONE",
        "ITEM:MINE_BLOCK:STONE",
        too_long.as_str(),
    ] {
        h.manager.update_player_stat(&alex, key, 1);
        h.manager.upsert_top_list(key, &[TopEntry::new("Alex", 1)]);
    }
    h.manager.close();

    assert_eq!(h.backend.player_stat_writes(), 0);
    assert_eq!(h.backend.top_list_writes(), 0);
}

#[test]
fn test_tracked_keys_fall_back_to_every_key() {
    let h = harness(StorageSettings {
        tracked_stats: vec!["bogus".to_string(), "UNTYPED:".to_string()],
        ..enabled()
    });
    let all = enumerate_all(StatCatalog::vanilla());

    assert_eq!(h.manager.tracked_stat_keys().to_vec(), all);

    h.source.update(|s| s.tracked_stats = vec!["UNTYPED:JUMP".to_string()]);
    h.manager.reload();
    assert_eq!(h.manager.tracked_stat_keys().to_vec(), vec!["UNTYPED:JUMP".to_string()]);
}

// =============================================================================
// Degradation
// =============================================================================

#[test]
fn test_disabled_manager_is_noop() {
    let h = harness(StorageSettings::default());
    let alex = player("Alex");

    h.manager.update_player_stat(&alex, "UNTYPED:JUMP", 1);
    h.manager.update_player_experience(&alex, Experience::new(1, 1, 0.0));
    h.manager.upsert_top_list("UNTYPED:JUMP", &[TopEntry::new("Alex", 1)]);

    assert_eq!(h.manager.active_backend(), "inert");
    assert_eq!(h.manager.state(), ManagerState::Ready);
    assert_eq!(h.backend.opens(), 0);
}

#[test]
fn test_broken_reload_degrades_to_inert() {
    let h = harness(enabled());
    let alex = player("Alex");
    h.manager.update_player_stat(&alex, "UNTYPED:JUMP", 1);

    h.backend.set_faults(SimFaults {
        fail_open: true,
        ..SimFaults::default()
    });
    h.manager.reload();

    assert_eq!(h.manager.state(), ManagerState::Ready);
    assert_eq!(h.manager.active_backend(), "inert");
    assert!(h.manager.config().enabled());
    // The previous provider was retired after the swap.
    assert_eq!(h.backend.closes(), 1);

    h.manager.update_player_stat(&alex, "UNTYPED:JUMP", 2);
    h.manager.close();
    assert_eq!(h.backend.player_stat_writes(), 1);
    assert_eq!(h.backend.player(alex.id).unwrap().stats["UNTYPED:JUMP"], 1);
}

#[test]
fn test_start_failure_keeps_provider() {
    let h = harness(StorageSettings::default());
    h.backend.set_faults(SimFaults {
        fail_start: true,
        ..SimFaults::default()
    });
    h.source.replace(enabled());
    h.manager.reload();

    assert_eq!(h.manager.state(), ManagerState::Ready);
    assert_eq!(h.manager.active_backend(), "sim");
    assert_eq!(h.backend.opens(), 1);
    assert_eq!(h.backend.starts(), 1);
    assert_eq!(h.backend.closes(), 0);

    let alex = player("Alex");
    h.manager.update_player_stat(&alex, "UNTYPED:JUMP", 7);
    h.manager.upsert_top_list("UNTYPED:JUMP", &[TopEntry::new("Alex", 7)]);
    h.manager.close();

    assert_eq!(h.backend.player_stat_writes(), 1);
    assert_eq!(h.backend.player(alex.id).unwrap().stats["UNTYPED:JUMP"], 7);
    assert_eq!(h.backend.top_list_writes(), 1);
    assert_eq!(h.backend.closes(), 1);
}

#[test]
fn test_failed_writes_do_not_stop_pipeline() {
    let h = harness(enabled());
    h.backend.set_faults(SimFaults {
        fail_writes: true,
        ..SimFaults::default()
    });
    let alex = player("Alex");
    h.manager.update_player_stat(&alex, "UNTYPED:JUMP", 1);
    // Reload drains the failing write before the faults are cleared.
    h.manager.reload();

    h.backend.set_faults(SimFaults::default());
    h.manager.update_player_stat(&alex, "UNTYPED:DEATHS", 1);
    h.manager.close();

    let record = h.backend.player(alex.id).unwrap();
    assert!(!record.stats.contains_key("UNTYPED:JUMP"));
    assert_eq!(record.stats["UNTYPED:DEATHS"], 1);
}

#[test]
fn test_unreachable_postgres_degrades_to_inert() {
    init_logging();
    let mut settings = StorageSettings {
        enabled: true,
        backend: "postgres".to_string(),
        connection_timeout_ms: 500,
        ..StorageSettings::default()
    };
    settings.postgres.host = "127.0.0.1".to_string();
    settings.postgres.port = 1;

    let manager = StorageManager::builder(Arc::new(MemoryConfigSource::new(settings))).build();

    let started = Instant::now();
    manager.reload();
    assert!(started.elapsed() < Duration::from_secs(30));

    assert!(manager.config().enabled());
    assert_eq!(manager.active_backend(), "inert");
    manager.update_player_stat(&player("Alex"), "UNTYPED:JUMP", 3);
    manager.close();
}

// =============================================================================
// Lifecycle
// =============================================================================

#[test]
fn test_close_is_idempotent_and_final() {
    let h = harness(enabled());
    let alex = player("Alex");

    h.manager.close();
    h.manager.close();
    assert_eq!(h.manager.state(), ManagerState::Closed);
    assert_eq!(h.backend.closes(), 1);

    h.manager.update_player_stat(&alex, "UNTYPED:JUMP", 1);
    h.manager.reload();
    assert_eq!(h.manager.state(), ManagerState::Closed);
    assert_eq!(h.backend.opens(), 1);
    assert_eq!(h.backend.player_stat_writes(), 0);
}

#[test]
fn test_reload_switches_backend() {
    init_logging();
    let pg = SimBackend::new();
    let mongo = SimBackend::new();
    let source = Arc::new(MemoryConfigSource::new(enabled()));
    let manager = StorageManager::builder(source.clone())
        .factory(Arc::new(PerKindFactory {
            postgres: pg.clone(),
            mongo: mongo.clone(),
        }))
        .clock(Arc::new(SimClock::new()))
        .build();
    manager.reload();
    let alex = player("Alex");

    manager.update_player_stat(&alex, "UNTYPED:JUMP", 1);

    source.update(|s| s.backend = "mongodb".to_string());
    manager.reload();
    assert_eq!(manager.config().backend(), BackendKind::Mongo);
    assert_eq!(pg.closes(), 1);

    // Fresh caches per generation: the same value is written again.
    manager.update_player_stat(&alex, "UNTYPED:JUMP", 1);
    manager.close();

    assert_eq!(pg.player_stat_writes(), 1);
    assert_eq!(mongo.player_stat_writes(), 1);
    assert_eq!(mongo.closes(), 1);
}

#[test]
fn test_reload_drains_in_flight_writes() {
    let h = harness(enabled());
    h.backend.set_write_delay(Some(Duration::from_millis(10)));

    let players: Vec<PlayerRef> = (0..20).map(|i| player(&format!("p{i}"))).collect();
    for p in &players {
        h.manager.update_player_stat(p, "UNTYPED:JUMP", 5);
    }
    h.manager.reload();

    assert_eq!(h.backend.player_stat_writes(), 20);
    assert_eq!(h.backend.opens(), 2);
    h.manager.close();
}

#[test]
fn test_concurrent_writers_during_reload() {
    let h = Arc::new(harness(StorageSettings {
        player_update_min_interval_ms: 0,
        ..enabled()
    }));

    let writers: Vec<_> = (0..4)
        .map(|t| {
            let h = h.clone();
            std::thread::spawn(move || {
                let p = player(&format!("writer{t}"));
                for i in 0..500 {
                    h.manager.update_player_stat(&p, "UNTYPED:JUMP", i);
                }
            })
        })
        .collect();
    h.manager.reload();
    for w in writers {
        w.join().unwrap();
    }
    h.manager.close();

    assert!(h.backend.player_stat_writes() <= 2000);
    assert_eq!(h.backend.player_count(), 4);
}

#[test]
fn test_experience_written_without_dedup() {
    let h = harness(enabled());
    let alex = player("Alex");

    h.manager.update_player_experience(&alex, Experience::new(3, 40, 0.25));
    h.manager.update_player_experience(&alex, Experience::new(3, 40, 0.25));
    h.manager.close();

    assert_eq!(h.backend.experience_writes(), 2);
    assert_eq!(
        h.backend.player(alex.id).unwrap().experience,
        Some(Experience::new(3, 40, 0.25))
    );
}
