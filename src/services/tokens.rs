// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Access token lifecycle: hand out a valid token, refreshing when needed.
//!
//! Token rows are only written here and by the OAuth callback.

use crate::db::Database;
use crate::models::OAuthTokenRecord;
use crate::services::iracing::{IracingClient, ProviderError, TokenResponse};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Refresh when the access token has this little validity left.
pub const REFRESH_BUFFER_SECS: i64 = 30;

/// Token lifetime assumed when the provider omits `expires_in`.
pub const DEFAULT_EXPIRES_IN_SECS: i64 = 600;

/// Longest `expires_in` accepted from the provider; anything else gets the default.
pub const MAX_EXPIRES_IN_SECS: i64 = 365 * 24 * 60 * 60;

/// Per-user mutex serializing refreshes within this process.
pub type RefreshLocks = Arc<DashMap<String, Arc<Mutex<()>>>>;

/// Why no usable access token could be produced. Callers treat every
/// variant as "the user must re-verify".
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("no stored tokens")]
    Missing,

    #[error("access token expired and no refresh token stored")]
    NoRefreshToken,

    #[error("refresh failed: {0}")]
    Refresh(#[from] ProviderError),

    #[error("token storage failed: {0}")]
    Storage(String),
}

/// Whether `record` must be refreshed before use at `now`.
pub fn needs_refresh(record: &OAuthTokenRecord, now: DateTime<Utc>) -> bool {
    record.access_expires_at - now <= Duration::seconds(REFRESH_BUFFER_SECS)
}

/// Absolute expiry for a token issued at `now`.
pub fn expiry_from(now: DateTime<Utc>, expires_in: Option<i64>) -> DateTime<Utc> {
    let secs = expires_in
        .filter(|s| (1..=MAX_EXPIRES_IN_SECS).contains(s))
        .unwrap_or(DEFAULT_EXPIRES_IN_SECS);
    now + Duration::seconds(secs)
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Token row for a fresh authorization-code grant.
pub fn record_from_grant(
    user_id: &str,
    grant: &TokenResponse,
    now: DateTime<Utc>,
) -> OAuthTokenRecord {
    OAuthTokenRecord {
        user_id: user_id.to_string(),
        access_token: grant.access_token.clone(),
        refresh_token: non_empty(&grant.refresh_token),
        access_expires_at: expiry_from(now, grant.expires_in),
        scope: non_empty(&grant.scope),
        updated_at: now,
    }
}

/// Apply a refresh response to the stored row.
///
/// Rotation is optional: an omitted refresh token or scope keeps the
/// previous value.
pub fn merge_refreshed(
    previous: &OAuthTokenRecord,
    refreshed: &TokenResponse,
    now: DateTime<Utc>,
) -> OAuthTokenRecord {
    OAuthTokenRecord {
        user_id: previous.user_id.clone(),
        access_token: refreshed.access_token.clone(),
        refresh_token: non_empty(&refreshed.refresh_token).or_else(|| previous.refresh_token.clone()),
        access_expires_at: expiry_from(now, refreshed.expires_in),
        scope: non_empty(&refreshed.scope).or_else(|| previous.scope.clone()),
        updated_at: now,
    }
}

/// Hands out valid access tokens for users.
///
/// Tokens are read from the database on every call; nothing is cached in
/// memory. Refreshes for one user are serialized, and a caller that waited
/// on the lock re-reads the row before deciding to refresh again.
#[derive(Clone)]
pub struct TokenManager {
    db: Database,
    client: IracingClient,
    refresh_locks: RefreshLocks,
}

impl TokenManager {
    pub fn new(db: Database, client: IracingClient) -> Self {
        Self {
            db,
            client,
            refresh_locks: Arc::new(DashMap::new()),
        }
    }

    async fn load(&self, user_id: &str) -> Result<OAuthTokenRecord, TokenError> {
        self.db
            .get_tokens(user_id)
            .await
            .map_err(|e| TokenError::Storage(e.to_string()))?
            .ok_or(TokenError::Missing)
    }

    /// Return an access token with more than [`REFRESH_BUFFER_SECS`] of
    /// validity left, refreshing and persisting rotation if needed.
    pub async fn get_valid_access_token(&self, user_id: &str) -> Result<String, TokenError> {
        let record = self.load(user_id).await?;
        if !needs_refresh(&record, Utc::now()) {
            return Ok(record.access_token);
        }

        let lock = self
            .refresh_locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let result = {
            let _guard = lock.lock().await;
            self.refresh_locked(user_id).await
        };

        // Drop the entry unless another task still holds a clone of it.
        self.refresh_locks
            .remove_if(user_id, |_, held| Arc::strong_count(held) == 2);
        result
    }

    /// Number of users with a refresh lock currently allocated.
    pub fn refresh_lock_count(&self) -> usize {
        self.refresh_locks.len()
    }

    async fn refresh_locked(&self, user_id: &str) -> Result<String, TokenError> {
        // Another task may have refreshed while we waited.
        let record = self.load(user_id).await?;
        if !needs_refresh(&record, Utc::now()) {
            return Ok(record.access_token);
        }

        let Some(refresh_token) = non_empty(&record.refresh_token) else {
            tracing::info!(user_id, "Access token expired with no refresh token");
            return Err(TokenError::NoRefreshToken);
        };

        tracing::info!(user_id, "Access token expiring, refreshing");
        let refreshed = self
            .client
            .refresh_tokens(&refresh_token)
            .await
            .inspect_err(|e| tracing::warn!(user_id, error = %e, "Token refresh failed"))?;

        let updated = merge_refreshed(&record, &refreshed, Utc::now());
        self.db
            .set_tokens(&updated)
            .await
            .map_err(|e| TokenError::Storage(e.to_string()))?;

        tracing::info!(
            user_id,
            rotated = refreshed.refresh_token.is_some(),
            "Token refreshed"
        );
        Ok(updated.access_token)
    }
}
