// Domain models for the leveling system.

use super::progression::{self, LevelProgress, MAX_LEVEL, MAX_XP};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A user's progression record in one guild.
///
/// Users can be in several guilds, so progress is keyed by
/// `(user_id, guild_id)` and tracked independently per guild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProgress {
    pub user_id: u64,
    pub guild_id: u64,
    pub xp: u64,
    /// Always `level_for_experience(xp)` after a write through the service.
    pub level: u32,
    pub message_count: u64,
    /// Unix seconds of the last XP award. `None` until the first award.
    pub last_award_at: Option<i64>,
}

impl UserProgress {
    /// Zero-state record for a user who has never been touched.
    pub fn new(user_id: u64, guild_id: u64) -> Self {
        Self {
            user_id,
            guild_id,
            xp: 0,
            level: 0,
            message_count: 0,
            last_award_at: None,
        }
    }

    /// Replace the XP total and re-derive the level from it.
    pub fn set_xp(&mut self, xp: u64) {
        self.xp = xp;
        self.level = progression::level_for_experience(xp);
    }

    pub fn progress(&self) -> LevelProgress {
        progression::progress(self.xp)
    }

    /// Seconds left before another award is allowed, or `None` if the user
    /// may earn XP at `now`.
    pub fn cooldown_remaining(&self, now: i64, cooldown_secs: u64) -> Option<u64> {
        let last = self.last_award_at?;
        let elapsed = now.saturating_sub(last);
        let cooldown = i64::try_from(cooldown_secs).unwrap_or(i64::MAX);
        if elapsed < cooldown {
            Some(cooldown.saturating_sub(elapsed) as u64)
        } else {
            None
        }
    }
}

/// Emitted when an award pushes a user over a level threshold.
/// The Discord layer uses it to announce the level-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelUpEvent {
    pub user_id: u64,
    pub guild_id: u64,
    pub old_level: u32,
    pub new_level: u32,
    pub total_xp: u64,
}

/// Result of `award_experience`.
///
/// `applied` is false when the user was still cooling down; in that case
/// `record` is the unchanged stored state.
#[derive(Debug, Clone)]
pub struct AwardOutcome {
    pub record: UserProgress,
    pub applied: bool,
    pub leveled_up: bool,
    pub previous_level: u32,
    pub retry_after_secs: Option<u64>,
}

impl AwardOutcome {
    pub fn level_up_event(&self) -> Option<LevelUpEvent> {
        self.leveled_up.then(|| LevelUpEvent {
            user_id: self.record.user_id,
            guild_id: self.record.guild_id,
            old_level: self.previous_level,
            new_level: self.record.level,
            total_xp: self.record.xp,
        })
    }
}

/// Result of an administrative adjustment.
#[derive(Debug, Clone)]
pub struct AdjustmentOutcome {
    pub record: UserProgress,
    pub previous_xp: u64,
    pub previous_level: u32,
}

/// Read model for `/rank`.
#[derive(Debug, Clone)]
pub struct RankCard {
    pub record: UserProgress,
    pub progress: LevelProgress,
    pub rank: u64,
}

/// Raw input for an admin XP adjustment was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdjustmentInputError {
    #[error("Amount must not be negative (got {0})")]
    Negative(i64),

    #[error("Provide either a level or an XP total")]
    MissingTarget,

    #[error("Provide a level or an XP total, not both")]
    AmbiguousTarget,

    #[error("Level {0} is beyond the highest reachable level")]
    LevelOutOfRange(u64),

    #[error("Resulting XP total {0} is beyond the highest storable total")]
    XpOutOfRange(u128),
}

/// The four kinds of administrative XP change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminAdjustment {
    Add(u64),
    Remove(u64),
    SetLevel(u32),
    SetXp(u64),
}

/// Which adjustment a raw command asked for, before the amount is validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdjustmentKind {
    Add,
    Remove,
    SetLevel,
    SetXp,
}

impl AdminAdjustment {
    /// Validate a signed amount coming from a command option.
    pub fn parse(kind: AdjustmentKind, amount: i64) -> Result<Self, AdjustmentInputError> {
        let amount = u64::try_from(amount).map_err(|_| AdjustmentInputError::Negative(amount))?;
        Ok(match kind {
            AdjustmentKind::Add => AdminAdjustment::Add(amount),
            AdjustmentKind::Remove => AdminAdjustment::Remove(amount),
            AdjustmentKind::SetXp => AdminAdjustment::SetXp(amount),
            AdjustmentKind::SetLevel => AdminAdjustment::SetLevel(checked_level(amount)?),
        })
    }

    /// Build a "set" adjustment from two optional command options where
    /// exactly one must be present.
    pub fn for_set(level: Option<i64>, xp: Option<i64>) -> Result<Self, AdjustmentInputError> {
        match (level, xp) {
            (Some(level), None) => Self::parse(AdjustmentKind::SetLevel, level),
            (None, Some(xp)) => Self::parse(AdjustmentKind::SetXp, xp),
            (None, None) => Err(AdjustmentInputError::MissingTarget),
            (Some(_), Some(_)) => Err(AdjustmentInputError::AmbiguousTarget),
        }
    }

    /// The XP total this adjustment produces from `current`, or an error if
    /// that total would exceed [`MAX_XP`].
    pub fn apply_to(self, current: u64) -> Result<u64, AdjustmentInputError> {
        let total: u128 = match self {
            AdminAdjustment::Add(amount) => current as u128 + amount as u128,
            AdminAdjustment::Remove(amount) => current.saturating_sub(amount) as u128,
            AdminAdjustment::SetLevel(level) => progression::threshold_wide(level),
            AdminAdjustment::SetXp(xp) => xp as u128,
        };

        u64::try_from(total)
            .ok()
            .filter(|xp| *xp <= MAX_XP)
            .ok_or(AdjustmentInputError::XpOutOfRange(total))
    }
}

fn checked_level(raw: u64) -> Result<u32, AdjustmentInputError> {
    u32::try_from(raw)
        .ok()
        .filter(|level| *level <= MAX_LEVEL)
        .ok_or(AdjustmentInputError::LevelOutOfRange(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record_is_zero_state() {
        let record = UserProgress::new(1, 2);
        assert_eq!(record.xp, 0);
        assert_eq!(record.level, 0);
        assert_eq!(record.message_count, 0);
        assert_eq!(record.last_award_at, None);
    }

    #[test]
    fn set_xp_keeps_level_in_sync() {
        let mut record = UserProgress::new(1, 2);
        record.set_xp(475);
        assert_eq!(record.level, 5);
        record.set_xp(474);
        assert_eq!(record.level, 4);
    }

    #[test]
    fn cooldown_remaining_counts_down() {
        let mut record = UserProgress::new(1, 2);
        assert_eq!(record.cooldown_remaining(0, 60), None);

        record.last_award_at = Some(100);
        assert_eq!(record.cooldown_remaining(130, 60), Some(30));
        assert_eq!(record.cooldown_remaining(160, 60), None);
        // A clock that went backwards still counts as cooling down.
        assert_eq!(record.cooldown_remaining(90, 60), Some(70));
    }

    #[test]
    fn parse_rejects_negative_amounts() {
        assert_eq!(
            AdminAdjustment::parse(AdjustmentKind::Add, -5),
            Err(AdjustmentInputError::Negative(-5))
        );
        assert_eq!(
            AdminAdjustment::parse(AdjustmentKind::Remove, 10),
            Ok(AdminAdjustment::Remove(10))
        );
    }

    #[test]
    fn parse_rejects_unreachable_levels() {
        assert!(matches!(
            AdminAdjustment::parse(AdjustmentKind::SetLevel, i64::MAX),
            Err(AdjustmentInputError::LevelOutOfRange(_))
        ));
        assert_eq!(
            AdminAdjustment::parse(AdjustmentKind::SetLevel, 5),
            Ok(AdminAdjustment::SetLevel(5))
        );
    }

    #[test]
    fn for_set_requires_exactly_one_target() {
        assert_eq!(
            AdminAdjustment::for_set(None, None),
            Err(AdjustmentInputError::MissingTarget)
        );
        assert_eq!(
            AdminAdjustment::for_set(Some(3), Some(100)),
            Err(AdjustmentInputError::AmbiguousTarget)
        );
        assert_eq!(
            AdminAdjustment::for_set(None, Some(100)),
            Ok(AdminAdjustment::SetXp(100))
        );
    }

    #[test]
    fn remove_clamps_at_zero() {
        assert_eq!(AdminAdjustment::Remove(500).apply_to(120), Ok(0));
        assert_eq!(AdminAdjustment::Add(5).apply_to(120), Ok(125));
        assert_eq!(AdminAdjustment::SetLevel(5).apply_to(9_999), Ok(475));
    }

    #[test]
    fn totals_past_the_xp_ceiling_are_rejected() {
        assert_eq!(
            AdminAdjustment::Add(10).apply_to(MAX_XP - 5),
            Err(AdjustmentInputError::XpOutOfRange(MAX_XP as u128 + 5))
        );
        assert_eq!(AdminAdjustment::Add(5).apply_to(MAX_XP - 5), Ok(MAX_XP));
        assert_eq!(
            AdminAdjustment::SetLevel(MAX_LEVEL).apply_to(0),
            Ok(progression::threshold(MAX_LEVEL))
        );
    }

    #[test]
    fn levels_whose_threshold_cannot_be_stored_are_rejected() {
        // Fits the curve in u64, but not in a signed 64-bit column.
        assert_eq!(
            AdminAdjustment::parse(AdjustmentKind::SetLevel, 1_500_000_000),
            Err(AdjustmentInputError::LevelOutOfRange(1_500_000_000))
        );
        assert_eq!(
            AdminAdjustment::parse(AdjustmentKind::SetLevel, MAX_LEVEL as i64),
            Ok(AdminAdjustment::SetLevel(MAX_LEVEL))
        );
    }

    #[test]
    fn level_up_event_only_when_leveled() {
        let mut record = UserProgress::new(7, 8);
        record.set_xp(160);
        let outcome = AwardOutcome {
            record: record.clone(),
            applied: true,
            leveled_up: true,
            previous_level: 0,
            retry_after_secs: None,
        };
        let event = outcome.level_up_event().unwrap();
        assert_eq!(event.old_level, 0);
        assert_eq!(event.new_level, 1);
        assert_eq!(event.total_xp, 160);

        let quiet = AwardOutcome {
            leveled_up: false,
            ..outcome
        };
        assert!(quiet.level_up_event().is_none());
    }
}
