// Member-count channel updater.
//
// Discord only allows a couple of channel renames per ten minutes, so the
// service decides *whether* a rename is due and the Discord layer just
// performs it.

use super::member_count_models::{
    ChannelRename, MemberCountConfig, COUNT_PLACEHOLDER, MAX_CHANNEL_NAME_LEN,
};
use super::member_count_store::{MemberCountStore, StoreError};
use chrono::{DateTime, Duration, Utc};

#[derive(Debug, thiserror::Error)]
pub enum MemberCountError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Already configured")]
    AlreadyConfigured,
    #[error("Not configured")]
    NotConfigured,
    #[error("Invalid template: {0}")]
    InvalidTemplate(String),
}

pub struct MemberCountService<S: MemberCountStore> {
    store: S,
    cooldown: Duration,
}

impl<S: MemberCountStore> MemberCountService<S> {
    pub fn new(store: S, cooldown_secs: u64) -> Self {
        let secs = i64::try_from(cooldown_secs).unwrap_or(i64::MAX);
        Self {
            store,
            cooldown: Duration::try_seconds(secs).unwrap_or(Duration::MAX),
        }
    }

    pub async fn get_config(
        &self,
        guild_id: u64,
    ) -> Result<Option<MemberCountConfig>, MemberCountError> {
        Ok(self.store.get_config(guild_id).await?)
    }

    pub async fn get_all_configs(&self) -> Result<Vec<MemberCountConfig>, MemberCountError> {
        Ok(self.store.get_all_configs().await?)
    }

    /// Register a counter channel for a guild.
    pub async fn configure(
        &self,
        guild_id: u64,
        channel_id: u64,
        template: &str,
    ) -> Result<MemberCountConfig, MemberCountError> {
        validate_template(template)?;

        if self.store.get_config(guild_id).await?.is_some() {
            return Err(MemberCountError::AlreadyConfigured);
        }

        let config = MemberCountConfig::new(guild_id, channel_id, template);
        self.store.save_config(config.clone()).await?;
        Ok(config)
    }

    pub async fn remove(&self, guild_id: u64) -> Result<MemberCountConfig, MemberCountError> {
        let config = self
            .store
            .get_config(guild_id)
            .await?
            .ok_or(MemberCountError::NotConfigured)?;

        self.store.delete_config(guild_id).await?;
        Ok(config)
    }

    pub async fn set_enabled(&self, guild_id: u64, enabled: bool) -> Result<(), MemberCountError> {
        let mut config = self
            .store
            .get_config(guild_id)
            .await?
            .ok_or(MemberCountError::NotConfigured)?;

        config.enabled = enabled;
        if enabled {
            // Force a refresh on the next update.
            config.last_count = None;
        }
        self.store.save_config(config).await?;
        Ok(())
    }

    /// Decide whether the counter channel should be renamed for `count`.
    ///
    /// Returns `None` when the guild has no enabled counter, the count is
    /// already displayed, or the last rename was too recent. Nothing is
    /// stored here; call [`Self::record_rename`] once the rename went through.
    pub async fn plan_update(
        &self,
        guild_id: u64,
        count: u64,
        now: DateTime<Utc>,
    ) -> Result<Option<ChannelRename>, MemberCountError> {
        let config = match self.store.get_config(guild_id).await? {
            Some(config) if config.enabled => config,
            _ => return Ok(None),
        };

        if config.last_count == Some(count) {
            return Ok(None);
        }

        if let Some(last) = config.last_renamed_at {
            let ready_at = last.checked_add_signed(self.cooldown);
            if ready_at.map_or(true, |ready_at| now < ready_at) {
                tracing::debug!(guild_id, count, "Member count rename deferred, on cooldown");
                return Ok(None);
            }
        }

        Ok(Some(ChannelRename {
            channel_id: config.channel_id,
            name: config.render(count),
        }))
    }

    /// Remember that the channel now shows `count`.
    pub async fn record_rename(
        &self,
        guild_id: u64,
        count: u64,
        now: DateTime<Utc>,
    ) -> Result<(), MemberCountError> {
        let mut config = self
            .store
            .get_config(guild_id)
            .await?
            .ok_or(MemberCountError::NotConfigured)?;

        config.last_count = Some(count);
        config.last_renamed_at = Some(now);
        self.store.save_config(config).await?;
        Ok(())
    }
}

fn validate_template(template: &str) -> Result<(), MemberCountError> {
    if !template.contains(COUNT_PLACEHOLDER) {
        return Err(MemberCountError::InvalidTemplate(format!(
            "template must contain {}",
            COUNT_PLACEHOLDER
        )));
    }

    // Leave room for a 20-digit count.
    let longest = template.replace(COUNT_PLACEHOLDER, "00000000000000000000");
    if longest.chars().count() > MAX_CHANNEL_NAME_LEN {
        return Err(MemberCountError::InvalidTemplate(format!(
            "rendered name can't exceed {} characters",
            MAX_CHANNEL_NAME_LEN
        )));
    }

    Ok(())
}
