//! MongoProvider - Document Storage
//!
//! TigerStyle: one document per player, one document per leaderboard.
//!
//! # Documents
//!
//! ```text
//! player_stats: { uuid, name, updatedAt, stats: { <key>: <value>, .. },
//!                 expLevel, expTotal, expProgress }
//! top_stats:    { statKey, topSize, updatedAt, entries: [ { name, value }, .. ] }
//! ```
//!
//! Player writes use `$set` on `stats.<key>` so other keys survive.
//! Leaderboard writes replace the whole document.

use async_trait::async_trait;
use mongodb::bson::{doc, Bson, Document};
use mongodb::options::{ClientOptions, IndexOptions, ReplaceOptions, Tls, UpdateOptions};
use mongodb::{Client, Collection, IndexModel};
use parking_lot::RwLock;

use super::{clamp_top_limit, StorageProvider};
use crate::config::StorageConfig;
use crate::error::{StorageError, StorageResult};
use crate::model::{Experience, PlayerRef, TopEntry};

// =============================================================================
// MongoProvider
// =============================================================================

#[derive(Clone)]
struct Handles {
    client: Client,
    players: Collection<Document>,
    tops: Collection<Document>,
}

/// MongoDB provider.
pub struct MongoProvider {
    handles: RwLock<Option<Handles>>,
    database: String,
}

impl std::fmt::Debug for MongoProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MongoProvider")
            .field("database", &self.database)
            .field("open", &self.handles.read().is_some())
            .finish()
    }
}

impl MongoProvider {
    /// Connect and ping the server.
    ///
    /// # Errors
    /// Returns [`StorageError::Connection`] if the URI is invalid or the
    /// server does not answer within the configured timeout.
    pub async fn connect(config: &StorageConfig) -> StorageResult<Self> {
        let mongo = config.mongo();

        let mut options = ClientOptions::parse(&mongo.uri)
            .await
            .map_err(|e| StorageError::connection(format!("invalid mongo uri: {e}")))?;
        options.connect_timeout = Some(config.connection_timeout());
        options.server_selection_timeout = Some(config.connection_timeout());
        options.max_pool_size = Some(config.max_pool_size());
        options.app_name = Some("statvault".to_string());

        warn_insecure(&options);

        let client = Client::with_options(options)
            .map_err(|e| StorageError::connection(format!("failed to create client: {e}")))?;
        let db = client.database(&mongo.database);
        db.run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(|e| StorageError::connection(format!("failed to connect: {e}")))?;

        tracing::info!(database = %mongo.database, "Connected to MongoDB");

        Ok(Self {
            handles: RwLock::new(Some(Handles {
                players: db.collection(&mongo.player_collection),
                tops: db.collection(&mongo.top_collection),
                client,
            })),
            database: mongo.database.clone(),
        })
    }

    fn handles(&self) -> StorageResult<Handles> {
        self.handles
            .read()
            .clone()
            .ok_or_else(|| StorageError::internal("mongo provider closed"))
    }
}

#[async_trait]
impl StorageProvider for MongoProvider {
    fn name(&self) -> &'static str {
        "mongo"
    }

    async fn start(&self) -> StorageResult<()> {
        let handles = self.handles()?;
        let indexes = [
            ("players", &handles.players, doc! { "uuid": 1 }),
            ("top lists", &handles.tops, doc! { "statKey": 1 }),
        ];

        // Each index is independent: one failing must not skip the other.
        let mut failed = Vec::new();
        for (label, collection, keys) in indexes {
            let model = IndexModel::builder()
                .keys(keys)
                .options(IndexOptions::builder().unique(true).build())
                .build();
            if let Err(e) = collection.create_index(model, None).await {
                tracing::warn!(collection = label, error = %e, "Mongo index creation failed");
                failed.push(format!("{label}: {e}"));
            }
        }

        if failed.is_empty() {
            tracing::debug!(database = %self.database, "Mongo indexes ready");
            Ok(())
        } else {
            Err(StorageError::schema(format!("failed to index {}", failed.join("; "))))
        }
    }

    async fn update_player_stat(
        &self,
        player: &PlayerRef,
        stat_key: &str,
        value: i64,
    ) -> StorageResult<()> {
        let handles = self.handles()?;

        let mut set = player_header(player);
        set.insert(format!("stats.{}", field_name(stat_key)), value);

        handles
            .players
            .update_one(
                doc! { "uuid": player.id.to_string() },
                doc! { "$set": set },
                UpdateOptions::builder().upsert(true).build(),
            )
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
        let handles = self.handles()?;
        let limit = clamp_top_limit(limit);

        let stored: Vec<Bson> = entries
            .iter()
            .take(limit)
            .map(|e| {
                let e = e.normalized();
                Bson::Document(doc! { "name": e.name, "value": e.value })
            })
            .collect();
        let replacement = doc! {
            "statKey": stat_key,
            "topSize": i64::try_from(limit).unwrap_or(i64::MAX),
            "updatedAt": now_ms(),
            "entries": stored,
        };

        handles
            .tops
            .replace_one(
                doc! { "statKey": stat_key },
                replacement,
                ReplaceOptions::builder().upsert(true).build(),
            )
            .await
            .map_err(|e| StorageError::write(format!("top list upsert failed: {e}")))?;
        Ok(())
    }

    async fn update_player_experience(
        &self,
        player: &PlayerRef,
        experience: Experience,
    ) -> StorageResult<()> {
        let handles = self.handles()?;

        let mut set = player_header(player);
        set.insert("expLevel", experience.level);
        set.insert("expTotal", experience.total);
        set.insert("expProgress", f64::from(experience.progress));

        handles
            .players
            .update_one(
                doc! { "uuid": player.id.to_string() },
                doc! { "$set": set },
                UpdateOptions::builder().upsert(true).build(),
            )
            .await
            .map_err(|e| StorageError::write(format!("experience upsert failed: {e}")))?;
        Ok(())
    }

    async fn close(&self) -> StorageResult<()> {
        let taken = self.handles.write().take();
        if let Some(handles) = taken {
            let Handles { client, .. } = handles;
            client.shutdown().await;
            tracing::info!(database = %self.database, "Mongo client closed");
        }
        Ok(())
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn player_header(player: &PlayerRef) -> Document {
    doc! {
        "name": player.name.as_str(),
        "updatedAt": now_ms(),
    }
}

/// Field paths treat `.` as nesting and reject a leading `$`.
fn field_name(stat_key: &str) -> String {
    stat_key.replace(['.', '$'], "_")
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn warn_insecure(options: &ClientOptions) {
    let remote = options.hosts.iter().any(|addr| {
        let addr = addr.to_string();
        !(addr.starts_with("localhost") || addr.starts_with("127.0.0.1"))
    });
    if !remote {
        return;
    }
    if options.credential.is_none() {
        tracing::warn!("MongoDB connection to a remote host without authentication");
    }
    if !matches!(options.tls, Some(Tls::Enabled(_))) {
        tracing::warn!("MongoDB connection to a remote host without TLS");
    }
}
