//! InertProvider - accepts every write and stores nothing.
//!
//! Installed whenever persistence is disabled or a real backend cannot be
//! opened, so callers never see a missing backend.

use async_trait::async_trait;

use super::StorageProvider;
use crate::error::StorageResult;
use crate::model::{Experience, PlayerRef, TopEntry};

/// No-op provider.
#[derive(Debug, Default, Clone, Copy)]
pub struct InertProvider;

#[async_trait]
impl StorageProvider for InertProvider {
    fn name(&self) -> &'static str {
        "inert"
    }

    async fn start(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn update_player_stat(
        &self,
        _player: &PlayerRef,
        _stat_key: &str,
        _value: i64,
    ) -> StorageResult<()> {
        Ok(())
    }

    async fn upsert_top_list(
        &self,
        _stat_key: &str,
        _entries: &[TopEntry],
        _limit: usize,
    ) -> StorageResult<()> {
        Ok(())
    }

    async fn update_player_experience(
        &self,
        _player: &PlayerRef,
        _experience: Experience,
    ) -> StorageResult<()> {
        Ok(())
    }

    async fn close(&self) -> StorageResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_inert_accepts_everything() {
        let provider = InertProvider;
        let player = PlayerRef::new(Uuid::new_v4(), "Steve");

        tokio_test::block_on(async {
            provider.start().await.unwrap();
            provider.update_player_stat(&player, "UNTYPED:JUMP", 3).await.unwrap();
            provider
                .upsert_top_list("UNTYPED:JUMP", &[TopEntry::new("Steve", 3)], 10)
                .await
                .unwrap();
            provider
                .update_player_experience(&player, Experience::new(1, 7, 0.5))
                .await
                .unwrap();
            provider.close().await.unwrap();
            provider.close().await.unwrap();
        });
    }
}
