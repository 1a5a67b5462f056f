// Storage port for the leveling system.
//
// The core says WHAT it needs from storage; infra decides HOW. Tests swap in
// an in-memory implementation without touching the service.

use super::leveling_models::{AdjustmentInputError, UserProgress};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LevelingError {
    #[error("Leveling storage is not initialized")]
    NotInitialized,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Storage error: {0}")]
    StorageError(String),
}

impl From<AdjustmentInputError> for LevelingError {
    fn from(err: AdjustmentInputError) -> Self {
        LevelingError::InvalidInput(err.to_string())
    }
}

/// Trait for persisting progression records.
#[async_trait]
pub trait XpStore: Send + Sync {
    /// False until the backing store can serve requests (connected, migrated).
    fn is_ready(&self) -> bool {
        true
    }

    /// Fetch a record, or `None` if the user was never touched in this guild.
    async fn load(&self, user_id: u64, guild_id: u64)
        -> Result<Option<UserProgress>, LevelingError>;

    /// Insert or replace a record. Must be a single atomic write.
    async fn upsert(&self, record: &UserProgress) -> Result<(), LevelingError>;

    /// Number of records in the guild with strictly more XP than `xp`.
    async fn count_greater(&self, guild_id: u64, xp: u64) -> Result<u64, LevelingError>;

    /// Up to `limit` records, XP descending, ties broken by user id ascending.
    async fn top_n(&self, guild_id: u64, limit: usize)
        -> Result<Vec<UserProgress>, LevelingError>;
}
