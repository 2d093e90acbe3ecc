//! TigerStyle Constants
//!
//! Every limit in the crate lives here with its unit in the name.

use std::time::Duration;

// =============================================================================
// Stat Keys
// =============================================================================

/// Maximum length of an encoded stat key in characters.
pub const STAT_KEY_LENGTH_MAX: usize = 128;

/// Separator between stat key parts.
pub const STAT_KEY_SEPARATOR: char = ':';

// =============================================================================
// Players
// =============================================================================

/// Maximum stored length of a player display name in characters.
pub const PLAYER_NAME_LENGTH_MAX: usize = 32;

// =============================================================================
// Leaderboards
// =============================================================================

/// Default number of entries kept per leaderboard.
pub const TOP_LIST_SIZE_DEFAULT: usize = 10;

/// Upper bound on entries kept per leaderboard.
pub const TOP_LIST_SIZE_MAX: usize = 1000;

/// Default leaderboard generation interval in minutes.
pub const TOP_GENERATE_INTERVAL_MINUTES_DEFAULT: u64 = 10;

// =============================================================================
// Worker Pool
// =============================================================================

/// Default number of background workers.
pub const ASYNC_THREADS_DEFAULT: usize = 2;

/// Upper bound on background workers.
pub const ASYNC_THREADS_MAX: usize = 64;

/// Capacity of each worker's task queue.
pub const WORKER_QUEUE_CAPACITY: usize = 5000;

/// Bounded wait for queued tasks to drain on reload/close.
pub const POOL_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Worker thread name prefix.
pub const WORKER_THREAD_NAME_PREFIX: &str = "statvault-db";

// =============================================================================
// Dedup Caches
// =============================================================================

/// Default minimum interval between identical player stat writes.
pub const PLAYER_UPDATE_MIN_INTERVAL_MS_DEFAULT: u64 = 60_000;

/// Default minimum interval between identical leaderboard writes.
pub const TOP_UPDATE_MIN_INTERVAL_MS_DEFAULT: u64 = 300_000;

/// Default time-to-live of a cache entry, independent of write intervals.
pub const CACHE_TTL_MS_DEFAULT: u64 = 30 * 60_000;

/// Default hard ceiling on cache entries.
pub const CACHE_ENTRIES_MAX_DEFAULT: usize = 50_000;

/// Smallest accepted cache ceiling (quarter eviction must remove something).
pub const CACHE_ENTRIES_MAX_FLOOR: usize = 4;

// =============================================================================
// Backends
// =============================================================================

/// Default connection pool size for real backends.
pub const BACKEND_POOL_SIZE_DEFAULT: u32 = 4;

/// Default connection timeout in milliseconds.
pub const CONNECTION_TIMEOUT_MS_DEFAULT: u64 = 5_000;

/// Smallest connection timeout accepted in milliseconds.
pub const CONNECTION_TIMEOUT_MS_MIN: u64 = 250;

/// Default Postgres port.
pub const POSTGRES_PORT_DEFAULT: u16 = 5432;

/// Default Postgres schema.
pub const POSTGRES_SCHEMA_DEFAULT: &str = "public";

/// Default Postgres player table.
pub const POSTGRES_PLAYER_TABLE_DEFAULT: &str = "player_stats";

/// Default Postgres leaderboard table.
pub const POSTGRES_TOP_TABLE_DEFAULT: &str = "top_stats";

/// Default MongoDB connection string.
pub const MONGO_URI_DEFAULT: &str = "mongodb://localhost:27017";

/// Default MongoDB database.
pub const MONGO_DATABASE_DEFAULT: &str = "playerstats";

/// Default MongoDB player collection.
pub const MONGO_PLAYER_COLLECTION_DEFAULT: &str = "player_stats";

/// Default MongoDB leaderboard collection.
pub const MONGO_TOP_COLLECTION_DEFAULT: &str = "top_stats";
