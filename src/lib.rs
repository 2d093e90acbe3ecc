//! Statvault - Game Statistic Persistence
//!
//! TigerStyle: the game loop never waits on storage, never crashes because
//! of storage, and never grows memory without bound.
//!
//! Statvault persists per-player statistics, experience and periodically
//! computed leaderboards to PostgreSQL or MongoDB. Writes are validated,
//! deduplicated and handed to a bounded background pool; an unreachable
//! backend degrades to an inert provider instead of failing.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      StorageManager                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  stat_key   │ KIND:STAT:QUALIFIER codec + catalog            │
//! │  config     │ ConfigSource → immutable StorageConfig         │
//! │  cache      │ write dedup (TTL + size ceiling)               │
//! │  pool       │ bounded queues, caller-runs backpressure       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  provider   │ Inert │ Postgres │ Mongo │ Sim                 │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use statvault::{MemoryConfigSource, PlayerRef, StorageManager, StorageSettings};
//!
//! let source = Arc::new(MemoryConfigSource::new(StorageSettings::default()));
//! let manager = StorageManager::builder(source).build();
//! manager.reload();
//!
//! // Disabled by default: accepted and discarded.
//! let player = PlayerRef::new(uuid::Uuid::new_v4(), "Alex");
//! manager.update_player_stat(&player, "UNTYPED:JUMP", 12);
//! assert_eq!(manager.active_backend(), "inert");
//! manager.close();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]

pub mod cache;
pub mod clock;
pub mod config;
pub mod constants;
pub mod error;
pub mod feeds;
pub mod manager;
pub mod model;
pub mod pool;
pub mod provider;
pub mod stat_key;

// Re-export common types
pub use clock::{Clock, SimClock, SystemClock};
pub use config::{
    BackendKind, ConfigSource, FileConfigSource, MemoryConfigSource, StorageConfig,
    StorageSettings,
};
pub use error::{ConfigError, StorageError, StorageResult};
pub use feeds::{
    publish_experience, publish_top_lists, sync_player, LeaderboardSource, PlayerStatSource,
    TopListScheduler,
};
pub use manager::{CacheSizes, ManagerState, StorageManager, StorageManagerBuilder};
pub use model::{Experience, PlayerRef, TopEntry};
pub use provider::{BackendFactory, InertProvider, ProviderFactory, StorageProvider};
pub use stat_key::{StatCatalog, StatKey, StatKind};
