// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! SQLite client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Users (verified accounts)
//! - Tokens (OAuth tokens, one row per user)
//! - Auth sessions (cookie-backed logins)
//! - The session cache (sessions, drivers, participants)

use crate::error::AppError;
use crate::models::{
    AuthSession, Driver, OAuthTokenRecord, ParsedParticipant, Session, SessionHeader,
    SessionParticipant, User,
};
use chrono::{DateTime, Utc};
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

const MAX_CONNECTIONS: u32 = 8;

/// SQLite database client.
#[derive(Clone, Debug)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Embedded schema migrations.
    pub const MIGRATOR: Migrator = sqlx::migrate!("./migrations");

    /// Open (creating if needed) the database at `url` and apply migrations.
    pub async fn connect(url: &str) -> Result<Self, AppError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| AppError::Database(format!("Invalid DATABASE_URL: {}", e)))?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .map_err(|e| AppError::Database(format!("Failed to open database: {}", e)))?;

        let db = Self { pool };
        db.migrate().await?;
        tracing::info!("Connected to SQLite");
        Ok(db)
    }

    /// Private in-memory database for tests.
    ///
    /// Every connection to `:memory:` is a separate database, so the pool is
    /// pinned to one connection that is never recycled.
    pub async fn in_memory() -> Result<Self, AppError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| AppError::Database(e.to_string()))?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    async fn migrate(&self) -> Result<(), AppError> {
        Self::MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| AppError::Database(format!("Migration failed: {}", e)))
    }

    // ─── User Operations ─────────────────────────────────────────

    /// Get a user by local id.
    pub async fn get_user(&self, user_id: &str) -> Result<Option<User>, AppError> {
        Ok(sqlx::query_as::<_, User>(
            "SELECT id, iracing_member_id, display_name, created_at FROM users WHERE id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    /// Get a user by iRacing member id.
    pub async fn get_user_by_member_id(&self, member_id: i64) -> Result<Option<User>, AppError> {
        Ok(sqlx::query_as::<_, User>(
            "SELECT id, iracing_member_id, display_name, created_at FROM users \
             WHERE iracing_member_id = ?",
        )
        .bind(member_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    /// Create the user for `member_id`, or refresh the display name of the
    /// existing one. `new_id` is only used when a row is created.
    pub async fn upsert_user(
        &self,
        new_id: &str,
        member_id: i64,
        display_name: &str,
        now: DateTime<Utc>,
    ) -> Result<User, AppError> {
        Ok(sqlx::query_as::<_, User>(
            "INSERT INTO users (id, iracing_member_id, display_name, created_at) \
             VALUES (?, ?, ?, ?) \
             ON CONFLICT(iracing_member_id) DO UPDATE SET display_name = excluded.display_name \
             RETURNING id, iracing_member_id, display_name, created_at",
        )
        .bind(new_id)
        .bind(member_id)
        .bind(display_name)
        .bind(now)
        .fetch_one(&self.pool)
        .await?)
    }

    // ─── Token Operations ────────────────────────────────────────

    /// Get OAuth tokens for a user.
    pub async fn get_tokens(&self, user_id: &str) -> Result<Option<OAuthTokenRecord>, AppError> {
        Ok(sqlx::query_as::<_, OAuthTokenRecord>(
            "SELECT user_id, access_token, refresh_token, access_expires_at, scope, updated_at \
             FROM oauth_tokens WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    /// Insert or overwrite the token row for `record.user_id`.
    pub async fn set_tokens(&self, record: &OAuthTokenRecord) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO oauth_tokens \
             (user_id, access_token, refresh_token, access_expires_at, scope, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?) \
             ON CONFLICT(user_id) DO UPDATE SET \
               access_token = excluded.access_token, \
               refresh_token = excluded.refresh_token, \
               access_expires_at = excluded.access_expires_at, \
               scope = excluded.scope, \
               updated_at = excluded.updated_at",
        )
        .bind(&record.user_id)
        .bind(&record.access_token)
        .bind(&record.refresh_token)
        .bind(record.access_expires_at)
        .bind(&record.scope)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ─── Auth Session Operations ─────────────────────────────────

    pub async fn insert_auth_session(&self, session: &AuthSession) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO auth_sessions (id, user_id, created_at, expires_at, last_seen_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&session.id)
        .bind(&session.user_id)
        .bind(session.created_at)
        .bind(session.expires_at)
        .bind(session.last_seen_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Look up a login session together with its user.
    pub async fn get_auth_session_with_user(
        &self,
        session_id: &str,
    ) -> Result<Option<(AuthSession, User)>, AppError> {
        let Some(session) = sqlx::query_as::<_, AuthSession>(
            "SELECT id, user_id, created_at, expires_at, last_seen_at \
             FROM auth_sessions WHERE id = ?",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        // Users are never deleted while sessions remain (ON DELETE CASCADE),
        // so a missing user means the session is orphaned.
        Ok(self
            .get_user(&session.user_id)
            .await?
            .map(|user| (session, user)))
    }

    pub async fn touch_auth_session(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE auth_sessions SET last_seen_at = ? WHERE id = ?")
            .bind(now)
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete_auth_session(&self, session_id: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM auth_sessions WHERE id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ─── Session Cache Operations ────────────────────────────────

    /// Number of cached grid rows for a session. A session counts as cached
    /// once this is non-zero.
    pub async fn participant_count(&self, session_id: i64) -> Result<i64, AppError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM session_participants WHERE iracing_session_id = ?")
                .bind(session_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    pub async fn get_session(&self, session_id: i64) -> Result<Option<Session>, AppError> {
        Ok(sqlx::query_as::<_, Session>(
            "SELECT iracing_session_id, start_time, series_name, track_name, split, sof \
             FROM sessions WHERE iracing_session_id = ?",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    /// Cached grid for a session, ordered by finishing position.
    pub async fn get_participants(
        &self,
        session_id: i64,
    ) -> Result<Vec<SessionParticipant>, AppError> {
        Ok(sqlx::query_as::<_, SessionParticipant>(
            "SELECT iracing_session_id, iracing_member_id, finish_pos, car_name \
             FROM session_participants WHERE iracing_session_id = ? \
             ORDER BY finish_pos IS NULL, finish_pos, iracing_member_id",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn get_driver(&self, member_id: i64) -> Result<Option<Driver>, AppError> {
        Ok(sqlx::query_as::<_, Driver>(
            "SELECT iracing_member_id, display_name, last_seen_at FROM drivers \
             WHERE iracing_member_id = ?",
        )
        .bind(member_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    // ─── Atomic Grid Import ──────────────────────────────────────

    /// Atomically store an imported session: merge the header, replace the
    /// whole grid and upsert every driver seen in it.
    ///
    /// Readers see either the previous grid or the new one, never a mix.
    /// Returns the number of participant rows written.
    pub async fn replace_session_grid(
        &self,
        session_id: i64,
        header: &SessionHeader,
        participants: &[ParsedParticipant],
        now: DateTime<Utc>,
    ) -> Result<usize, AppError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        // Absent header fields never overwrite cached values.
        sqlx::query(
            "INSERT INTO sessions \
             (iracing_session_id, start_time, series_name, track_name, split, sof) \
             VALUES (?, ?, ?, ?, ?, ?) \
             ON CONFLICT(iracing_session_id) DO UPDATE SET \
               start_time = COALESCE(excluded.start_time, sessions.start_time), \
               series_name = COALESCE(excluded.series_name, sessions.series_name), \
               track_name = COALESCE(excluded.track_name, sessions.track_name), \
               split = COALESCE(excluded.split, sessions.split), \
               sof = COALESCE(excluded.sof, sessions.sof)",
        )
        .bind(session_id)
        .bind(&header.start_time)
        .bind(&header.series_name)
        .bind(&header.track_name)
        .bind(header.split)
        .bind(header.sof)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM session_participants WHERE iracing_session_id = ?")
            .bind(session_id)
            .execute(&mut *tx)
            .await?;

        for p in participants {
            sqlx::query(
                "INSERT INTO drivers (iracing_member_id, display_name, last_seen_at) \
                 VALUES (?, ?, ?) \
                 ON CONFLICT(iracing_member_id) DO UPDATE SET \
                   display_name = excluded.display_name, \
                   last_seen_at = excluded.last_seen_at",
            )
            .bind(p.member_id)
            .bind(&p.display_name)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                "INSERT INTO session_participants \
                 (iracing_session_id, iracing_member_id, finish_pos, car_name) \
                 VALUES (?, ?, ?, ?)",
            )
            .bind(session_id)
            .bind(p.member_id)
            .bind(p.finish_pos)
            .bind(&p.car_name)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit()
            .await
            .map_err(|e| AppError::Database(format!("Transaction commit failed: {}", e)))?;

        tracing::info!(
            session_id,
            participants = participants.len(),
            "Session grid stored atomically"
        );

        Ok(participants.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn participant(member_id: i64, pos: Option<i64>) -> ParsedParticipant {
        ParsedParticipant {
            member_id,
            display_name: format!("Driver {}", member_id),
            finish_pos: pos,
            car_name: Some("Mazda MX-5".to_string()),
        }
    }

    #[tokio::test]
    async fn upsert_user_keeps_id_and_refreshes_name() {
        let db = Database::in_memory().await.unwrap();
        let now = Utc::now();

        let first = db.upsert_user("u1", 4242, "Old Name", now).await.unwrap();
        let second = db
            .upsert_user("u2", 4242, "New Name", now + Duration::days(1))
            .await
            .unwrap();

        assert_eq!(first.id, "u1");
        assert_eq!(second.id, "u1");
        assert_eq!(second.display_name, "New Name");
        assert_eq!(second.created_at, first.created_at);
    }

    #[tokio::test]
    async fn set_tokens_overwrites_row() {
        let db = Database::in_memory().await.unwrap();
        let now = Utc::now();
        db.upsert_user("u1", 1, "A", now).await.unwrap();

        let mut record = OAuthTokenRecord {
            user_id: "u1".to_string(),
            access_token: "a1".to_string(),
            refresh_token: Some("r1".to_string()),
            access_expires_at: now,
            scope: Some("iracing.auth".to_string()),
            updated_at: now,
        };
        db.set_tokens(&record).await.unwrap();

        record.access_token = "a2".to_string();
        db.set_tokens(&record).await.unwrap();

        let stored = db.get_tokens("u1").await.unwrap().unwrap();
        assert_eq!(stored.access_token, "a2");
        assert_eq!(stored.refresh_token.as_deref(), Some("r1"));
    }

    #[tokio::test]
    async fn header_merge_never_clears_fields() {
        let db = Database::in_memory().await.unwrap();
        let full = SessionHeader {
            start_time: Some("2024-03-01T18:00:00Z".to_string()),
            series_name: Some("Global Mazda MX-5 Fanatec Cup".to_string()),
            track_name: Some("Lime Rock Park".to_string()),
            split: Some(2),
            sof: Some(1850),
        };
        db.replace_session_grid(77, &full, &[participant(1, Some(1))], Utc::now())
            .await
            .unwrap();

        let partial = SessionHeader {
            track_name: Some("Lime Rock Park - Full".to_string()),
            ..Default::default()
        };
        db.replace_session_grid(77, &partial, &[participant(1, Some(1))], Utc::now())
            .await
            .unwrap();

        let session = db.get_session(77).await.unwrap().unwrap();
        assert_eq!(session.start_time, full.start_time);
        assert_eq!(session.series_name, full.series_name);
        assert_eq!(session.track_name.as_deref(), Some("Lime Rock Park - Full"));
        assert_eq!(session.split, Some(2));
        assert_eq!(session.sof, Some(1850));
    }

    #[tokio::test]
    async fn grid_is_replaced_not_merged() {
        let db = Database::in_memory().await.unwrap();
        let header = SessionHeader::default();

        db.replace_session_grid(5, &header, &[participant(1, Some(1)), participant(2, Some(2))], Utc::now())
            .await
            .unwrap();
        db.replace_session_grid(5, &header, &[participant(3, Some(1))], Utc::now())
            .await
            .unwrap();

        let grid = db.get_participants(5).await.unwrap();
        assert_eq!(grid.len(), 1);
        assert_eq!(grid[0].iracing_member_id, 3);
        // Drivers seen earlier stay in the identity cache.
        assert!(db.get_driver(1).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn failed_import_rolls_back_entirely() {
        let db = Database::in_memory().await.unwrap();
        let header = SessionHeader {
            series_name: Some("Original".to_string()),
            ..Default::default()
        };
        db.replace_session_grid(9, &header, &[participant(1, Some(1))], Utc::now())
            .await
            .unwrap();

        // Duplicate member ids violate the grid primary key halfway through.
        let broken = [participant(2, Some(1)), participant(2, Some(2))];
        let changed = SessionHeader {
            series_name: Some("Changed".to_string()),
            ..Default::default()
        };
        let result = db.replace_session_grid(9, &changed, &broken, Utc::now()).await;
        assert!(result.is_err());

        let grid = db.get_participants(9).await.unwrap();
        assert_eq!(grid.len(), 1);
        assert_eq!(grid[0].iracing_member_id, 1);
        let session = db.get_session(9).await.unwrap().unwrap();
        assert_eq!(session.series_name.as_deref(), Some("Original"));
        assert!(db.get_driver(2).await.unwrap().is_none());
    }
}
