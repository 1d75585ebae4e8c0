// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Cached race sessions and their grids.

use chrono::{DateTime, Utc};

/// Denormalized identity cache entry for anyone seen in an imported grid.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Driver {
    pub iracing_member_id: i64,
    pub display_name: String,
    pub last_seen_at: DateTime<Utc>,
}

/// A subsession. Fields are only ever filled in, never cleared.
#[derive(Debug, Clone, Default, PartialEq, Eq, sqlx::FromRow)]
pub struct Session {
    pub iracing_session_id: i64,
    pub start_time: Option<String>,
    pub series_name: Option<String>,
    pub track_name: Option<String>,
    pub split: Option<i64>,
    pub sof: Option<i64>,
}

/// One row of a cached grid.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct SessionParticipant {
    pub iracing_session_id: i64,
    pub iracing_member_id: i64,
    /// 1-based finishing position
    pub finish_pos: Option<i64>,
    pub car_name: Option<String>,
}

/// Session attributes recovered from a result payload. `None` means the
/// payload did not carry the field, not that it should be cleared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionHeader {
    pub start_time: Option<String>,
    pub series_name: Option<String>,
    pub track_name: Option<String>,
    pub split: Option<i64>,
    pub sof: Option<i64>,
}

/// A grid entry recovered from the race block of a result payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedParticipant {
    pub member_id: i64,
    pub display_name: String,
    /// Already converted to 1-based
    pub finish_pos: Option<i64>,
    pub car_name: Option<String>,
}
