// Level curve math for the leveling system.
//
// Everything here is pure: no storage, no Discord, no clock. The service and
// the Discord layer both derive level boundaries from `threshold` so there is
// exactly one definition of the curve in the codebase.

use serde::Serialize;

/// Largest XP total a record may hold. Stores persist XP as a signed 64-bit
/// integer, so the curve stops at `i64::MAX`.
pub const MAX_XP: u64 = i64::MAX as u64;

/// Highest level whose threshold is still `<= MAX_XP`.
pub const MAX_LEVEL: u32 = 1_358_187_908;

/// Cumulative XP required to *reach* `level`.
///
/// Level 0 is free. From level 1 on the curve is `5·L² + 50·L + 100`, so
/// level 1 = 155 XP, level 2 = 220 XP, level 5 = 475 XP.
pub fn threshold(level: u32) -> u64 {
    let wide = threshold_wide(level);
    u64::try_from(wide).unwrap_or(u64::MAX)
}

/// Same curve as [`threshold`] but without saturation, for callers that need
/// to know whether a level is representable at all.
pub fn threshold_wide(level: u32) -> u128 {
    if level == 0 {
        return 0;
    }
    let l = level as u128;
    5 * l * l + 50 * l + 100
}

/// Largest level whose threshold is `<= xp`.
///
/// Binary search over the curve so huge XP totals stay cheap.
pub fn level_for_experience(xp: u64) -> u32 {
    let target = xp as u128;
    let (mut lo, mut hi) = (0u32, MAX_LEVEL);

    // Invariant: threshold(lo) <= xp, and every level above `hi` overshoots.
    while lo < hi {
        let mid = lo + (hi - lo).div_ceil(2);
        if threshold_wide(mid) <= target {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }

    lo
}

/// Where a given XP total sits inside its current level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LevelProgress {
    pub level: u32,
    /// XP earned since the current level's threshold.
    pub xp_into_level: u64,
    /// Width of the current level band (`threshold(level+1) - threshold(level)`).
    pub xp_for_next_level: u64,
    /// Whole percent through the band, always in `0..=100`.
    pub percent: u8,
}

impl LevelProgress {
    /// XP still missing before the next level-up.
    pub fn xp_remaining(&self) -> u64 {
        self.xp_for_next_level.saturating_sub(self.xp_into_level)
    }

    /// Fraction in `0.0..=1.0` for progress bars.
    pub fn ratio(&self) -> f64 {
        f64::from(self.percent) / 100.0
    }
}

/// Break an XP total down into level, position in level, and percent.
pub fn progress(xp: u64) -> LevelProgress {
    let level = level_for_experience(xp);
    let floor = threshold_wide(level);
    let ceiling = threshold_wide(level.saturating_add(1));

    let into = (xp as u128).saturating_sub(floor);
    // The curve is strictly increasing, so the band is never empty. The max
    // keeps the division safe at the very top of the representable range.
    let span = ceiling.saturating_sub(floor).max(1);
    let percent = (into * 100 / span).min(100) as u8;

    LevelProgress {
        level,
        xp_into_level: u64::try_from(into).unwrap_or(u64::MAX),
        xp_for_next_level: u64::try_from(span).unwrap_or(u64::MAX),
        percent,
    }
}
