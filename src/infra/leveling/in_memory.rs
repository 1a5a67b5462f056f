// In-memory implementation of XpStore, used to run the service end to end
// in tests without a database file.

use crate::core::leveling::{LevelingError, UserProgress, XpStore};
use async_trait::async_trait;
use dashmap::DashMap;

/// Composite key: users are tracked separately in every guild.
#[derive(Hash, Eq, PartialEq, Clone, Copy, Debug)]
struct UserGuildKey {
    user_id: u64,
    guild_id: u64,
}

/// DashMap-backed store. Safe to share across async tasks without an
/// outer Mutex.
pub struct InMemoryXpStore {
    data: DashMap<UserGuildKey, UserProgress>,
}

impl InMemoryXpStore {
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
        }
    }
}

impl Default for InMemoryXpStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl XpStore for InMemoryXpStore {
    async fn load(
        &self,
        user_id: u64,
        guild_id: u64,
    ) -> Result<Option<UserProgress>, LevelingError> {
        let key = UserGuildKey { user_id, guild_id };
        Ok(self.data.get(&key).map(|entry| entry.value().clone()))
    }

    async fn upsert(&self, record: &UserProgress) -> Result<(), LevelingError> {
        let key = UserGuildKey {
            user_id: record.user_id,
            guild_id: record.guild_id,
        };
        self.data.insert(key, record.clone());
        Ok(())
    }

    async fn count_greater(&self, guild_id: u64, xp: u64) -> Result<u64, LevelingError> {
        Ok(self
            .data
            .iter()
            .filter(|entry| entry.key().guild_id == guild_id && entry.value().xp > xp)
            .count() as u64)
    }

    async fn top_n(
        &self,
        guild_id: u64,
        limit: usize,
    ) -> Result<Vec<UserProgress>, LevelingError> {
        let mut users: Vec<UserProgress> = self
            .data
            .iter()
            .filter(|entry| entry.key().guild_id == guild_id)
            .map(|entry| entry.value().clone())
            .collect();

        // XP descending, then user id so ties come out the same every time.
        users.sort_by(|a, b| b.xp.cmp(&a.xp).then(a.user_id.cmp(&b.user_id)));
        users.truncate(limit);

        Ok(users)
    }
}
