// Runtime configuration, read from the environment (and `.env` via dotenv).

use crate::core::leveling::LevelingConfig;
use anyhow::{bail, Context as _};
use std::path::PathBuf;
use std::str::FromStr;

const DEFAULT_STATUS: &str = "/rank to see your level";

#[derive(Debug, Clone)]
pub struct BotConfig {
    pub discord_token: String,
    pub data_dir: PathBuf,
    pub leveling: LevelingConfig,
    /// Where level-up embeds go. `None` means "reply in the source channel".
    pub level_up_channel_id: Option<u64>,
    pub member_count_cooldown_secs: u64,
    pub status_text: String,
}

impl BotConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key lookup, so tests don't touch the
    /// process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let discord_token = lookup("DISCORD_TOKEN")
            .filter(|token| !token.trim().is_empty())
            .context("Missing DISCORD_TOKEN environment variable! Create a .env file with your bot token.")?;

        let data_dir = lookup("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("data"));

        let leveling = LevelingConfig {
            cooldown_secs: parse_or(&lookup, "XP_COOLDOWN_SECS", 60)?,
            gain_min: parse_or(&lookup, "XP_GAIN_MIN", 15)?,
            gain_max: parse_or(&lookup, "XP_GAIN_MAX", 25)?,
        };
        if leveling.gain_min == 0 {
            bail!("XP_GAIN_MIN must be at least 1");
        }
        if leveling.gain_min > leveling.gain_max {
            bail!(
                "XP_GAIN_MIN ({}) must not exceed XP_GAIN_MAX ({})",
                leveling.gain_min,
                leveling.gain_max
            );
        }

        let level_up_channel_id = match lookup("LEVEL_UP_CHANNEL_ID") {
            Some(raw) if !raw.trim().is_empty() => Some(parse_value("LEVEL_UP_CHANNEL_ID", &raw)?),
            _ => None,
        };

        Ok(Self {
            discord_token,
            data_dir,
            leveling,
            level_up_channel_id,
            member_count_cooldown_secs: parse_or(&lookup, "MEMBER_COUNT_COOLDOWN_SECS", 600)?,
            status_text: lookup("BOT_STATUS").unwrap_or_else(|| DEFAULT_STATUS.to_string()),
        })
    }

    pub fn leveling_db_path(&self) -> PathBuf {
        self.data_dir.join("leveling.db")
    }

    pub fn member_count_path(&self) -> PathBuf {
        self.data_dir.join("member_count.json")
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse()
        .with_context(|| format!("Invalid value for {}: {:?}", key, raw))
}
