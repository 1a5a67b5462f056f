use crate::core::member_count::{MemberCountConfig, MemberCountStore, StoreError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::RwLock;

/// Member-count configs persisted as one JSON map keyed by guild id.
pub struct JsonMemberCountStore {
    path: PathBuf,
    cache: RwLock<HashMap<u64, MemberCountConfig>>,
}

impl JsonMemberCountStore {
    /// Load the file at `path`, or start empty if it doesn't exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let map: HashMap<u64, MemberCountConfig> = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            if raw.trim().is_empty() {
                HashMap::new()
            } else {
                serde_json::from_str(&raw)?
            }
        } else {
            HashMap::new()
        };

        Ok(Self {
            path,
            cache: RwLock::new(map),
        })
    }

    /// Write `configs` to disk through a temp file renamed into place.
    /// Callers hold the cache write guard for the whole call.
    async fn persist(&self, configs: &HashMap<u64, MemberCountConfig>) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(configs)?;
        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, json).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl MemberCountStore for JsonMemberCountStore {
    async fn get_config(&self, guild_id: u64) -> Result<Option<MemberCountConfig>, StoreError> {
        let cache = self.cache.read().await;
        Ok(cache.get(&guild_id).cloned())
    }

    async fn save_config(&self, config: MemberCountConfig) -> Result<(), StoreError> {
        let mut cache = self.cache.write().await;
        cache.insert(config.guild_id, config);
        self.persist(&cache).await
    }

    async fn delete_config(&self, guild_id: u64) -> Result<(), StoreError> {
        let mut cache = self.cache.write().await;
        if cache.remove(&guild_id).is_none() {
            return Err(StoreError::NotFound);
        }

        self.persist(&cache).await
    }

    async fn get_all_configs(&self) -> Result<Vec<MemberCountConfig>, StoreError> {
        let cache = self.cache.read().await;
        Ok(cache.values().cloned().collect())
    }
}
