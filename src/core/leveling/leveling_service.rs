// The leveling service orchestrates the progression rules on top of an
// `XpStore`. It owns every read-modify-write of a progress record so the
// level stored next to an XP total is always the one the curve derives.

use super::leveling_models::{
    AdjustmentOutcome, AdminAdjustment, AwardOutcome, LevelUpEvent, RankCard, UserProgress,
};
use super::leveling_store::{LevelingError, XpStore};
use super::progression::{self, MAX_XP};
use rand::Rng;
use tokio::sync::Mutex;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Tunables for message XP.
#[derive(Debug, Clone)]
pub struct LevelingConfig {
    /// Minimum seconds between two XP awards for the same user.
    pub cooldown_secs: u64,
    /// Inclusive range a message award is rolled from.
    pub gain_min: u64,
    pub gain_max: u64,
}

impl Default for LevelingConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: 60,
            gain_min: 15,
            gain_max: 25,
        }
    }
}

impl LevelingConfig {
    /// Roll the XP a single message is worth.
    pub fn roll_gain(&self) -> u64 {
        let min = self.gain_min.max(1);
        let max = self.gain_max.max(min);
        rand::thread_rng().gen_range(min..=max)
    }
}

// ============================================================================
// CORE SERVICE
// ============================================================================

/// The main service for leveling operations.
///
/// Generic over the store so production runs on SQLite while tests run on
/// an in-memory map.
pub struct LevelingService<S: XpStore> {
    store: S,
    config: LevelingConfig,
    /// Serializes read-modify-write cycles so concurrent awards can't lose
    /// updates.
    write_lock: Mutex<()>,
}

impl<S: XpStore> LevelingService<S> {
    #[allow(dead_code)] // main always passes a config
    pub fn new(store: S) -> Self {
        Self::with_config(store, LevelingConfig::default())
    }

    pub fn with_config(store: S, config: LevelingConfig) -> Self {
        Self {
            store,
            config,
            write_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn ensure_ready(&self) -> Result<(), LevelingError> {
        if self.store.is_ready() {
            Ok(())
        } else {
            Err(LevelingError::NotInitialized)
        }
    }

    fn validate_ids(user_id: u64, guild_id: u64) -> Result<(), LevelingError> {
        if user_id == 0 || guild_id == 0 {
            Err(LevelingError::InvalidInput(
                "user and guild ids must be non-zero".to_string(),
            ))
        } else {
            Ok(())
        }
    }

    /// Fetch a record, falling back to the zero state for untouched users.
    ///
    /// Nothing is written here; the record materializes on its first award
    /// or admin adjustment.
    pub async fn load_or_create(
        &self,
        user_id: u64,
        guild_id: u64,
    ) -> Result<UserProgress, LevelingError> {
        self.ensure_ready()?;
        Self::validate_ids(user_id, guild_id)?;

        Ok(self
            .store
            .load(user_id, guild_id)
            .await?
            .unwrap_or_else(|| UserProgress::new(user_id, guild_id)))
    }

    /// Award `gain` XP unless the user is still cooling down.
    ///
    /// `now` is unix seconds supplied by the caller. A cooldown rejection is
    /// not an error: the outcome comes back with `applied == false` and the
    /// stored record untouched.
    pub async fn award_experience(
        &self,
        user_id: u64,
        guild_id: u64,
        gain: u64,
        cooldown_secs: u64,
        now: i64,
    ) -> Result<AwardOutcome, LevelingError> {
        if gain == 0 {
            return Err(LevelingError::InvalidInput(
                "XP gain must be positive".to_string(),
            ));
        }

        let _guard = self.write_lock.lock().await;
        let mut record = self.load_or_create(user_id, guild_id).await?;
        let previous_level = record.level;

        if let Some(remaining) = record.cooldown_remaining(now, cooldown_secs) {
            return Ok(AwardOutcome {
                record,
                applied: false,
                leveled_up: false,
                previous_level,
                retry_after_secs: Some(remaining),
            });
        }

        record.set_xp(record.xp.saturating_add(gain).min(MAX_XP));
        record.message_count = record.message_count.saturating_add(1);
        record.last_award_at = Some(now);
        self.store.upsert(&record).await?;

        Ok(AwardOutcome {
            leveled_up: record.level > previous_level,
            record,
            applied: true,
            previous_level,
            retry_after_secs: None,
        })
    }

    /// Message XP: roll a gain, apply the configured cooldown, and hand back
    /// a level-up event if a threshold was crossed.
    pub async fn process_message(
        &self,
        user_id: u64,
        guild_id: u64,
        now: i64,
    ) -> Result<Option<LevelUpEvent>, LevelingError> {
        let gain = self.config.roll_gain();
        let outcome = self
            .award_experience(user_id, guild_id, gain, self.config.cooldown_secs, now)
            .await?;

        if !outcome.applied {
            tracing::debug!(
                user_id,
                guild_id,
                retry_after_secs = ?outcome.retry_after_secs,
                "XP award skipped, on cooldown"
            );
            return Ok(None);
        }

        Ok(outcome.level_up_event())
    }

    /// Administrative override. The level is always re-derived from the
    /// resulting XP total.
    pub async fn apply_admin_delta(
        &self,
        user_id: u64,
        guild_id: u64,
        adjustment: AdminAdjustment,
    ) -> Result<AdjustmentOutcome, LevelingError> {
        let _guard = self.write_lock.lock().await;
        let mut record = self.load_or_create(user_id, guild_id).await?;
        let previous_xp = record.xp;
        let previous_level = record.level;

        record.set_xp(adjustment.apply_to(record.xp)?);
        self.store.upsert(&record).await?;

        tracing::info!(
            user_id,
            guild_id,
            ?adjustment,
            previous_xp,
            new_xp = record.xp,
            new_level = record.level,
            "Applied admin XP adjustment"
        );

        Ok(AdjustmentOutcome {
            record,
            previous_xp,
            previous_level,
        })
    }

    /// 1-based rank: users with strictly more XP, plus one. Ties share a rank.
    pub async fn rank(&self, user_id: u64, guild_id: u64) -> Result<u64, LevelingError> {
        let record = self.load_or_create(user_id, guild_id).await?;
        let ahead = self.store.count_greater(guild_id, record.xp).await?;
        Ok(ahead + 1)
    }

    /// Top `limit` users by XP.
    pub async fn leaderboard(
        &self,
        guild_id: u64,
        limit: usize,
    ) -> Result<Vec<UserProgress>, LevelingError> {
        self.ensure_ready()?;
        if guild_id == 0 {
            return Err(LevelingError::InvalidInput(
                "guild id must be non-zero".to_string(),
            ));
        }
        if limit == 0 {
            return Ok(Vec::new());
        }

        self.store.top_n(guild_id, limit).await
    }

    /// Everything `/rank` shows, in one call.
    pub async fn rank_card(&self, user_id: u64, guild_id: u64) -> Result<RankCard, LevelingError> {
        let record = self.load_or_create(user_id, guild_id).await?;
        let ahead = self.store.count_greater(guild_id, record.xp).await?;

        Ok(RankCard {
            progress: progression::progress(record.xp),
            rank: ahead + 1,
            record,
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::leveling::leveling_models::{AdjustmentKind, AdminAdjustment};
    use crate::core::leveling::progression::MAX_LEVEL;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex as StdMutex};

    #[derive(Default)]
    struct MemoryStore {
        records: StdMutex<HashMap<(u64, u64), UserProgress>>,
        writes: AtomicUsize,
    }

    #[async_trait]
    impl XpStore for MemoryStore {
        async fn load(
            &self,
            user_id: u64,
            guild_id: u64,
        ) -> Result<Option<UserProgress>, LevelingError> {
            let records = self.records.lock().unwrap();
            Ok(records.get(&(user_id, guild_id)).cloned())
        }

        async fn upsert(&self, record: &UserProgress) -> Result<(), LevelingError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            let mut records = self.records.lock().unwrap();
            records.insert((record.user_id, record.guild_id), record.clone());
            Ok(())
        }

        async fn count_greater(&self, guild_id: u64, xp: u64) -> Result<u64, LevelingError> {
            let records = self.records.lock().unwrap();
            Ok(records
                .values()
                .filter(|r| r.guild_id == guild_id && r.xp > xp)
                .count() as u64)
        }

        async fn top_n(
            &self,
            guild_id: u64,
            limit: usize,
        ) -> Result<Vec<UserProgress>, LevelingError> {
            let records = self.records.lock().unwrap();
            let mut rows: Vec<_> = records
                .values()
                .filter(|r| r.guild_id == guild_id)
                .cloned()
                .collect();
            rows.sort_by(|a, b| b.xp.cmp(&a.xp).then(a.user_id.cmp(&b.user_id)));
            rows.truncate(limit);
            Ok(rows)
        }
    }

    struct UnreadyStore;

    #[async_trait]
    impl XpStore for UnreadyStore {
        fn is_ready(&self) -> bool {
            false
        }

        async fn load(&self, _: u64, _: u64) -> Result<Option<UserProgress>, LevelingError> {
            panic!("unready store should not be queried");
        }

        async fn upsert(&self, _: &UserProgress) -> Result<(), LevelingError> {
            panic!("unready store should not be written");
        }

        async fn count_greater(&self, _: u64, _: u64) -> Result<u64, LevelingError> {
            panic!("unready store should not be queried");
        }

        async fn top_n(&self, _: u64, _: usize) -> Result<Vec<UserProgress>, LevelingError> {
            panic!("unready store should not be queried");
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl XpStore for BrokenStore {
        async fn load(&self, _: u64, _: u64) -> Result<Option<UserProgress>, LevelingError> {
            Err(LevelingError::StorageError("disk on fire".to_string()))
        }

        async fn upsert(&self, _: &UserProgress) -> Result<(), LevelingError> {
            Err(LevelingError::StorageError("disk on fire".to_string()))
        }

        async fn count_greater(&self, _: u64, _: u64) -> Result<u64, LevelingError> {
            Err(LevelingError::StorageError("disk on fire".to_string()))
        }

        async fn top_n(&self, _: u64, _: usize) -> Result<Vec<UserProgress>, LevelingError> {
            Err(LevelingError::StorageError("disk on fire".to_string()))
        }
    }

    fn make_service() -> LevelingService<MemoryStore> {
        LevelingService::new(MemoryStore::default())
    }

    async fn seed(service: &LevelingService<MemoryStore>, user_id: u64, guild_id: u64, xp: u64) {
        service
            .apply_admin_delta(user_id, guild_id, AdminAdjustment::SetXp(xp))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn award_respects_cooldown() {
        let service = make_service();

        let first = service.award_experience(1, 10, 20, 60, 0).await.unwrap();
        assert!(first.applied);
        assert_eq!(first.record.xp, 20);
        assert_eq!(first.record.level, 0);
        assert_eq!(first.record.message_count, 1);

        let second = service.award_experience(1, 10, 20, 60, 30).await.unwrap();
        assert!(!second.applied);
        assert_eq!(second.record.xp, 20);
        assert_eq!(second.retry_after_secs, Some(30));

        let third = service.award_experience(1, 10, 20, 60, 61).await.unwrap();
        assert!(third.applied);
        assert_eq!(third.record.xp, 40);
        assert_eq!(third.record.message_count, 2);
    }

    #[tokio::test]
    async fn award_within_cooldown_is_idempotent() {
        let service = make_service();

        service.award_experience(1, 10, 20, 60, 100).await.unwrap();
        let after_first = service.load_or_create(1, 10).await.unwrap();
        let writes = service.store.writes.load(Ordering::SeqCst);

        service.award_experience(1, 10, 20, 60, 110).await.unwrap();
        let after_second = service.load_or_create(1, 10).await.unwrap();

        assert_eq!(after_first, after_second);
        assert_eq!(service.store.writes.load(Ordering::SeqCst), writes);
    }

    #[tokio::test]
    async fn award_reports_level_up() {
        let service = make_service();
        seed(&service, 1, 10, 150).await;

        let outcome = service.award_experience(1, 10, 10, 60, 0).await.unwrap();
        assert!(outcome.leveled_up);
        assert_eq!(outcome.previous_level, 0);
        assert_eq!(outcome.record.level, 1);

        let event = outcome.level_up_event().unwrap();
        assert_eq!(event.new_level, 1);
        assert_eq!(event.total_xp, 160);
    }

    #[tokio::test]
    async fn award_rejects_zero_gain() {
        let service = make_service();
        let err = service.award_experience(1, 10, 0, 60, 0).await.unwrap_err();
        assert!(matches!(err, LevelingError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn process_message_uses_configured_range() {
        let config = LevelingConfig {
            cooldown_secs: 60,
            gain_min: 200,
            gain_max: 200,
        };
        let service = LevelingService::with_config(MemoryStore::default(), config);

        let event = service.process_message(1, 10, 0).await.unwrap().unwrap();
        assert_eq!(event.total_xp, 200);
        assert_eq!(event.new_level, 1);

        // Cooling down: no event, no change.
        assert!(service.process_message(1, 10, 5).await.unwrap().is_none());
        assert_eq!(service.load_or_create(1, 10).await.unwrap().xp, 200);
    }

    #[tokio::test]
    async fn set_level_uses_threshold() {
        let service = make_service();
        let outcome = service
            .apply_admin_delta(1, 10, AdminAdjustment::SetLevel(5))
            .await
            .unwrap();
        assert_eq!(outcome.record.xp, 475);
        assert_eq!(outcome.record.level, 5);
    }

    #[tokio::test]
    async fn add_and_remove_stay_consistent() {
        let service = make_service();
        seed(&service, 1, 10, 100).await;

        let added = service
            .apply_admin_delta(1, 10, AdminAdjustment::Add(120))
            .await
            .unwrap();
        assert!(added.record.xp >= added.previous_xp);
        assert_eq!(added.record.xp, 220);
        assert_eq!(added.record.level, 2);

        let removed = service
            .apply_admin_delta(1, 10, AdminAdjustment::Remove(1_000))
            .await
            .unwrap();
        assert_eq!(removed.record.xp, 0);
        assert_eq!(removed.record.level, 0);
        assert_eq!(removed.previous_level, 2);
    }

    #[tokio::test]
    async fn admin_totals_past_the_ceiling_are_input_errors() {
        let service = make_service();
        seed(&service, 1, 10, MAX_XP - 10).await;
        let writes = service.store.writes.load(Ordering::SeqCst);

        let err = service
            .apply_admin_delta(1, 10, AdminAdjustment::Add(11))
            .await
            .unwrap_err();
        assert!(matches!(err, LevelingError::InvalidInput(_)));
        assert_eq!(service.store.writes.load(Ordering::SeqCst), writes);
        assert_eq!(service.store.load(1, 10).await.unwrap().unwrap().xp, MAX_XP - 10);
    }

    #[tokio::test]
    async fn awards_stop_at_the_xp_ceiling() {
        let service = make_service();
        seed(&service, 1, 10, MAX_XP - 2).await;

        let outcome = service.award_experience(1, 10, 25, 60, 0).await.unwrap();
        assert!(outcome.applied);
        assert_eq!(outcome.record.xp, MAX_XP);
        assert_eq!(outcome.record.level, MAX_LEVEL);
    }

    #[tokio::test]
    async fn admin_input_is_validated_before_any_write() {
        let service = make_service();
        let err = AdminAdjustment::parse(AdjustmentKind::Remove, -3)
            .map_err(LevelingError::from)
            .unwrap_err();
        assert!(err.to_string().contains("negative"));
        assert_eq!(service.store.writes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rank_shares_ties() {
        let service = make_service();
        seed(&service, 1, 10, 500).await;
        seed(&service, 2, 10, 300).await;
        seed(&service, 3, 10, 300).await;
        seed(&service, 4, 10, 100).await;
        // Other guild doesn't count.
        seed(&service, 5, 99, 10_000).await;

        assert_eq!(service.rank(1, 10).await.unwrap(), 1);
        assert_eq!(service.rank(2, 10).await.unwrap(), 2);
        assert_eq!(service.rank(3, 10).await.unwrap(), 2);
        assert_eq!(service.rank(4, 10).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn unknown_user_ranks_after_everyone_with_xp() {
        let service = make_service();
        seed(&service, 1, 10, 500).await;
        seed(&service, 2, 10, 50).await;

        assert_eq!(service.rank(42, 10).await.unwrap(), 3);
        // Reading a rank must not create a record.
        assert!(service.store.load(42, 10).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn leaderboard_orders_by_xp_then_user_id() {
        let service = make_service();
        seed(&service, 4, 10, 300).await;
        seed(&service, 1, 10, 500).await;
        seed(&service, 3, 10, 300).await;
        seed(&service, 2, 10, 100).await;

        let board = service.leaderboard(10, 3).await.unwrap();
        let ids: Vec<u64> = board.iter().map(|r| r.user_id).collect();
        assert_eq!(ids, vec![1, 3, 4]);
    }

    #[tokio::test]
    async fn leaderboard_with_zero_limit_is_empty() {
        let service = make_service();
        seed(&service, 1, 10, 500).await;
        assert!(service.leaderboard(10, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rank_card_combines_progress_and_rank() {
        let service = make_service();
        seed(&service, 1, 10, 182).await;
        seed(&service, 2, 10, 900).await;

        let card = service.rank_card(1, 10).await.unwrap();
        assert_eq!(card.rank, 2);
        assert_eq!(card.progress.level, 1);
        assert_eq!(card.progress.percent, 41);
    }

    #[tokio::test]
    async fn unready_store_fails_fast() {
        let service = LevelingService::new(UnreadyStore);
        assert!(matches!(
            service.award_experience(1, 10, 5, 60, 0).await,
            Err(LevelingError::NotInitialized)
        ));
        assert!(matches!(
            service.leaderboard(10, 5).await,
            Err(LevelingError::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn storage_errors_propagate() {
        let service = LevelingService::new(BrokenStore);
        let err = service.rank(1, 10).await.unwrap_err();
        assert_eq!(err.to_string(), "Storage error: disk on fire");
    }

    #[tokio::test]
    async fn zero_ids_are_rejected() {
        let service = make_service();
        assert!(matches!(
            service.load_or_create(0, 10).await,
            Err(LevelingError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn concurrent_awards_do_not_lose_updates() {
        let service = Arc::new(make_service());
        let mut handles = Vec::new();
        for user_id in 1..=8u64 {
            for _ in 0..5 {
                let service = Arc::clone(&service);
                handles.push(tokio::spawn(async move {
                    // Zero cooldown so every award applies.
                    service
                        .award_experience(user_id, 10, 3, 0, 1_000)
                        .await
                        .unwrap();
                }));
            }
        }
        for handle in handles {
            handle.await.unwrap();
        }

        for user_id in 1..=8u64 {
            let record = service.load_or_create(user_id, 10).await.unwrap();
            assert_eq!(record.xp, 15);
            assert_eq!(record.message_count, 5);
        }
    }

    #[test]
    fn roll_gain_stays_in_range() {
        let config = LevelingConfig::default();
        for _ in 0..200 {
            let gain = config.roll_gain();
            assert!((15..=25).contains(&gain));
        }
    }

    #[test]
    fn leveling_error_messages_are_descriptive() {
        let storage_error = LevelingError::StorageError("db down".into());
        assert!(storage_error.to_string().contains("db down"));

        assert_eq!(
            LevelingError::NotInitialized.to_string(),
            "Leveling storage is not initialized"
        );
    }
}
