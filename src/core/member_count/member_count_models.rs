use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Placeholder replaced with the live member count.
pub const COUNT_PLACEHOLDER: &str = "{count}";

/// Discord rejects channel names longer than this.
pub const MAX_CHANNEL_NAME_LEN: usize = 100;

pub const DEFAULT_TEMPLATE: &str = "👥 Members: {count}";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberCountConfig {
    pub guild_id: u64,
    pub channel_id: u64,
    pub template: String,
    pub enabled: bool,
    /// Count shown in the channel name after the last rename.
    #[serde(default)]
    pub last_count: Option<u64>,
    #[serde(default)]
    pub last_renamed_at: Option<DateTime<Utc>>,
}

impl MemberCountConfig {
    pub fn new(guild_id: u64, channel_id: u64, template: impl Into<String>) -> Self {
        Self {
            guild_id,
            channel_id,
            template: template.into(),
            enabled: true,
            last_count: None,
            last_renamed_at: None,
        }
    }

    pub fn render(&self, count: u64) -> String {
        self.template
            .replace(COUNT_PLACEHOLDER, &count.to_string())
    }
}

/// A rename the Discord layer should perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRename {
    pub channel_id: u64,
    pub name: String,
}
