use crate::core::leveling::{LevelingError, UserProgress, XpStore};
use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::sync::atomic::{AtomicBool, Ordering};

pub struct SqliteXpStore {
    pool: SqlitePool,
    migrated: AtomicBool,
}

impl SqliteXpStore {
    /// Open (creating if needed) the database at `database_path` and migrate it.
    pub async fn connect(database_path: &str) -> anyhow::Result<Self> {
        let conn_str = if database_path.starts_with("sqlite:") {
            database_path.to_string()
        } else {
            format!("sqlite://{}?mode=rwc", database_path)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&conn_str)
            .await?;

        let store = Self::from_pool(pool);
        store.migrate().await?;
        Ok(store)
    }

    /// Wrap an existing pool. The store reports not-ready until `migrate`
    /// has run.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            migrated: AtomicBool::new(false),
        }
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS user_progress (
                user_id INTEGER NOT NULL,
                guild_id INTEGER NOT NULL,
                xp INTEGER NOT NULL DEFAULT 0,
                level INTEGER NOT NULL DEFAULT 0,
                message_count INTEGER NOT NULL DEFAULT 0,
                last_award_at INTEGER,
                PRIMARY KEY (user_id, guild_id)
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_user_progress_guild_xp
            ON user_progress(guild_id, xp DESC)
            "#,
        )
        .execute(&self.pool)
        .await?;

        self.migrated.store(true, Ordering::Release);
        tracing::debug!("Leveling database migrated");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn storage_err(err: sqlx::Error) -> LevelingError {
    LevelingError::StorageError(err.to_string())
}

/// SQLite integers are signed; refuse totals that wouldn't round-trip.
fn to_db_int(value: u64, field: &str) -> Result<i64, LevelingError> {
    i64::try_from(value)
        .map_err(|_| LevelingError::StorageError(format!("{} {} exceeds storage range", field, value)))
}

fn row_to_progress(row: &SqliteRow) -> UserProgress {
    UserProgress {
        user_id: row.get::<i64, _>("user_id") as u64,
        guild_id: row.get::<i64, _>("guild_id") as u64,
        xp: row.get::<i64, _>("xp") as u64,
        level: row.get::<i64, _>("level") as u32,
        message_count: row.get::<i64, _>("message_count") as u64,
        last_award_at: row.get::<Option<i64>, _>("last_award_at"),
    }
}

#[async_trait]
impl XpStore for SqliteXpStore {
    fn is_ready(&self) -> bool {
        self.migrated.load(Ordering::Acquire) && !self.pool.is_closed()
    }

    async fn load(
        &self,
        user_id: u64,
        guild_id: u64,
    ) -> Result<Option<UserProgress>, LevelingError> {
        let row = sqlx::query(
            r#"
            SELECT user_id, guild_id, xp, level, message_count, last_award_at
            FROM user_progress
            WHERE user_id = ? AND guild_id = ?
            "#,
        )
        .bind(user_id as i64)
        .bind(guild_id as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(row.as_ref().map(row_to_progress))
    }

    async fn upsert(&self, record: &UserProgress) -> Result<(), LevelingError> {
        let xp = to_db_int(record.xp, "xp")?;
        let message_count = to_db_int(record.message_count, "message_count")?;

        sqlx::query(
            r#"
            INSERT INTO user_progress (user_id, guild_id, xp, level, message_count, last_award_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id, guild_id) DO UPDATE SET
                xp = excluded.xp,
                level = excluded.level,
                message_count = excluded.message_count,
                last_award_at = excluded.last_award_at
            "#,
        )
        .bind(record.user_id as i64)
        .bind(record.guild_id as i64)
        .bind(xp)
        .bind(record.level as i64)
        .bind(message_count)
        .bind(record.last_award_at)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(())
    }

    async fn count_greater(&self, guild_id: u64, xp: u64) -> Result<u64, LevelingError> {
        // Nothing stored can exceed i64::MAX, so a larger total has no one above it.
        let Ok(xp) = i64::try_from(xp) else {
            return Ok(0);
        };

        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM user_progress WHERE guild_id = ? AND xp > ?")
                .bind(guild_id as i64)
                .bind(xp)
                .fetch_one(&self.pool)
                .await
                .map_err(storage_err)?;

        Ok(count as u64)
    }

    async fn top_n(
        &self,
        guild_id: u64,
        limit: usize,
    ) -> Result<Vec<UserProgress>, LevelingError> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, guild_id, xp, level, message_count, last_award_at
            FROM user_progress
            WHERE guild_id = ?
            ORDER BY xp DESC, user_id ASC
            LIMIT ?
            "#,
        )
        .bind(guild_id as i64)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(rows.iter().map(row_to_progress).collect())
    }
}
