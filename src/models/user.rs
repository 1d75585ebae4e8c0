// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Verified user, OAuth token and login session records.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A verified account, one per iRacing member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct User {
    /// Opaque local id (also used as the foreign key elsewhere)
    pub id: String,
    /// iRacing customer id
    pub iracing_member_id: i64,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
}

/// OAuth tokens for a user. Overwritten in place on refresh.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct OAuthTokenRecord {
    pub user_id: String,
    pub access_token: String,
    /// Absent when the provider never issued one
    pub refresh_token: Option<String>,
    pub access_expires_at: DateTime<Utc>,
    /// Space separated scopes as granted by the provider
    pub scope: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Login session referenced by the `gr_session` cookie.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct AuthSession {
    pub id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}
