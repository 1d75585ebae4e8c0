// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Map a session cookie to the verified user behind it.

use crate::db::Database;
use crate::error::AppError;
use crate::models::User;
use chrono::{DateTime, Utc};

/// Who is making the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Viewer {
    Unverified,
    Verified(User),
}

impl Viewer {
    pub fn user(&self) -> Option<&User> {
        match self {
            Viewer::Verified(user) => Some(user),
            Viewer::Unverified => None,
        }
    }

    pub fn into_user(self) -> Option<User> {
        match self {
            Viewer::Verified(user) => Some(user),
            Viewer::Unverified => None,
        }
    }
}

/// Resolve the viewer for an optional session id.
///
/// Expired sessions are deleted on sight. A hit records `last_seen_at`; that
/// write is best-effort and never fails the lookup.
pub async fn resolve_viewer(
    db: &Database,
    session_id: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Viewer, AppError> {
    let Some(session_id) = session_id.filter(|s| !s.is_empty()) else {
        return Ok(Viewer::Unverified);
    };

    let Some((session, user)) = db.get_auth_session_with_user(session_id).await? else {
        return Ok(Viewer::Unverified);
    };

    if session.expires_at <= now {
        tracing::debug!(user_id = %user.id, "Auth session expired, removing");
        db.delete_auth_session(session_id).await?;
        return Ok(Viewer::Unverified);
    }

    if let Err(e) = db.touch_auth_session(session_id, now).await {
        tracing::warn!(user_id = %user.id, error = %e, "Failed to update last_seen_at");
    }

    Ok(Viewer::Verified(user))
}
