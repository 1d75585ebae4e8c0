// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Pure extraction of typed data from iRacing JSON payloads.
//!
//! iRacing does not publish a fixed schema and the same attribute shows up
//! under different names depending on endpoint and version. Every attribute
//! here is therefore read through an ordered list of candidate paths, and the
//! first candidate that yields a usable value wins. Nothing in this module
//! does I/O.

use crate::models::{ParsedParticipant, SessionHeader};
use serde_json::Value;
use std::collections::HashSet;

/// A key path into a JSON object, e.g. `&["track", "track_name"]`.
type Path = &'static [&'static str];

const START_TIME_PATHS: &[Path] = &[
    &["start_time"],
    &["subsession_start_time"],
    &["session_start_time"],
    &["startTime"],
];

const SERIES_NAME_PATHS: &[Path] = &[
    &["series_name"],
    &["series", "series_name"],
    &["event_name"],
    &["seriesName"],
];

const TRACK_NAME_PATHS: &[Path] = &[
    &["track_name"],
    &["track", "track_name"],
    &["track", "track_name_full"],
    &["trackName"],
];

const SPLIT_PATHS: &[Path] = &[&["split"], &["split_number"]];

const SOF_PATHS: &[Path] = &[
    &["event_strength_of_field"],
    &["strength_of_field"],
    &["sof"],
];

/// Arrays that hold result rows inside a phase block (or at top level).
const ROW_ARRAY_KEYS: &[&str] = &["results", "result_rows", "rows"];

const ROW_MEMBER_ID_PATHS: &[Path] = &[&["cust_id"], &["id"]];
const ROW_NAME_PATHS: &[Path] = &[&["display_name"], &["name"]];
const ROW_FINISH_PATHS: &[Path] = &[&["finish_position"], &["finish_pos"]];
const ROW_CAR_PATHS: &[Path] = &[&["car_name"], &["car"]];

/// Raw 0-based positions at or above this are treated as garbage.
const MAX_FINISH_POSITION: i64 = 10_000;

/// `simsession_type` value iRacing uses for the race phase.
pub const RACE_SESSION_TYPE: i64 = 6;

/// Output of [`extract_result`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedResult {
    pub header: SessionHeader,
    pub participants: Vec<ParsedParticipant>,
    /// How the grid rows were located, for logging
    pub source: RowSource,
}

/// Where participant rows were taken from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RowSource {
    /// `simsession_type_name` equal to "RACE"
    RaceByTypeName,
    /// `simsession_type` equal to [`RACE_SESSION_TYPE`]
    RaceByTypeCode,
    /// `simsession_name` matching /race/i
    RaceByName,
    /// No race block had rows; first block with any rows
    FirstNonEmptyBlock,
    /// No phase blocks; rows were at the top level
    TopLevel,
    #[default]
    NoRows,
}

/// Identity recovered from a "recent activity" payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberIdentity {
    pub member_id: i64,
    pub display_name: Option<String>,
}

// ─── Primitive pickers ───────────────────────────────────────────

fn lookup<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |v, key| v.get(*key))
}

/// A string with visible content.
fn pick_string(value: &Value) -> Option<String> {
    value
        .as_str()
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
}

/// Largest float magnitude that converts to `i64` exactly.
const MAX_EXACT_FLOAT: f64 = 9_007_199_254_740_992.0;

/// An integer, accepting integral floats and numeric strings.
fn pick_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() <= MAX_EXACT_FLOAT)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// A positive integer id (member or subsession).
fn pick_id(value: &Value) -> Option<i64> {
    pick_integer(value).filter(|id| *id > 0)
}

/// Try each path in order and return the first value `pick` accepts.
fn first_match<T>(value: &Value, paths: &[Path], pick: fn(&Value) -> Option<T>) -> Option<T> {
    paths
        .iter()
        .find_map(|path| lookup(value, path).and_then(pick))
}

fn first_string(value: &Value, paths: &[Path]) -> Option<String> {
    first_match(value, paths, pick_string)
}

fn first_integer(value: &Value, paths: &[Path]) -> Option<i64> {
    first_match(value, paths, pick_integer)
}

fn first_id(value: &Value, paths: &[Path]) -> Option<i64> {
    first_match(value, paths, pick_id)
}

fn first_array<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Vec<Value>> {
    keys.iter().find_map(|key| value.get(*key).and_then(Value::as_array))
}

// ─── Subsession results ──────────────────────────────────────────

/// Extract the session header and race grid from a `results/get` payload.
pub fn extract_result(payload: &Value) -> ExtractedResult {
    let (rows, source) = select_rows(payload);
    ExtractedResult {
        header: extract_header(payload),
        participants: extract_participants(rows),
        source,
    }
}

pub fn extract_header(payload: &Value) -> SessionHeader {
    SessionHeader {
        start_time: first_string(payload, START_TIME_PATHS),
        series_name: first_string(payload, SERIES_NAME_PATHS),
        track_name: first_string(payload, TRACK_NAME_PATHS),
        split: first_integer(payload, SPLIT_PATHS),
        sof: first_integer(payload, SOF_PATHS),
    }
}

fn block_rows(block: &Value) -> &[Value] {
    first_array(block, ROW_ARRAY_KEYS)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

fn is_race_by_type_name(block: &Value) -> bool {
    block
        .get("simsession_type_name")
        .and_then(Value::as_str)
        .is_some_and(|name| name.eq_ignore_ascii_case("RACE"))
}

fn is_race_by_type_code(block: &Value) -> bool {
    block.get("simsession_type").and_then(pick_integer) == Some(RACE_SESSION_TYPE)
}

fn is_race_by_name(block: &Value) -> bool {
    block
        .get("simsession_name")
        .and_then(Value::as_str)
        .is_some_and(|name| name.to_ascii_lowercase().contains("race"))
}

/// Pick the rows of the race phase out of the per-phase blocks.
///
/// Practice and qualifying blocks carry their own positions, so taking the
/// wrong block silently produces a wrong grid order.
fn select_rows(payload: &Value) -> (&[Value], RowSource) {
    if let Some(blocks) = payload.get("session_results").and_then(Value::as_array) {
        let strategies: [(fn(&Value) -> bool, RowSource); 3] = [
            (is_race_by_type_name, RowSource::RaceByTypeName),
            (is_race_by_type_code, RowSource::RaceByTypeCode),
            (is_race_by_name, RowSource::RaceByName),
        ];

        let chosen = strategies.iter().find_map(|(matches, source)| {
            blocks
                .iter()
                .find(|block| matches(block))
                .map(|block| (block_rows(block), *source))
        });

        if let Some((rows, source)) = chosen {
            if !rows.is_empty() {
                return (rows, source);
            }
        }

        if let Some(rows) = blocks.iter().map(block_rows).find(|rows| !rows.is_empty()) {
            return (rows, RowSource::FirstNonEmptyBlock);
        }
    }

    match first_array(payload, ROW_ARRAY_KEYS) {
        Some(rows) if !rows.is_empty() => (rows.as_slice(), RowSource::TopLevel),
        _ => (&[], RowSource::NoRows),
    }
}

/// Convert raw result rows into grid entries.
///
/// Rows without a member id are dropped; a member appearing twice keeps its
/// first row. Positions arrive 0-based (winner = 0) and are stored 1-based.
pub fn extract_participants(rows: &[Value]) -> Vec<ParsedParticipant> {
    let mut seen = HashSet::new();

    rows.iter()
        .filter_map(|row| {
            let member_id = first_id(row, ROW_MEMBER_ID_PATHS)?;
            let display_name =
                first_string(row, ROW_NAME_PATHS).unwrap_or_else(|| fallback_name(member_id));

            Some(ParsedParticipant {
                member_id,
                display_name,
                finish_pos: first_integer(row, ROW_FINISH_PATHS)
                    .filter(|pos| (0..MAX_FINISH_POSITION).contains(pos))
                    .map(|pos| pos + 1),
                car_name: first_string(row, ROW_CAR_PATHS),
            })
        })
        .filter(|p| seen.insert(p.member_id))
        .collect()
}

/// Placeholder display name for a member we know nothing else about.
pub fn fallback_name(member_id: i64) -> String {
    format!("Driver {}", member_id)
}

// ─── Member identity ─────────────────────────────────────────────

const RECENT_ARRAY_KEYS: &[&str] = &["races", "results", "recent_races", "data"];
const IDENTITY_ROW_ID_PATHS: &[Path] = &[
    &["cust_id"],
    &["member_id"],
    &["driver_id"],
    &["driver", "cust_id"],
];
const IDENTITY_ROW_NAME_PATHS: &[Path] = &[
    &["display_name"],
    &["driver_name"],
    &["name"],
    &["driver", "display_name"],
];

/// Work out who the token belongs to from a `member_recent_races` payload.
///
/// Tried in order: a top-level `cust_id`, a nested `member` object, then the
/// first row of a races/results/data array.
pub fn extract_identity(payload: &Value) -> Option<MemberIdentity> {
    let attempts: [fn(&Value) -> Option<MemberIdentity>; 3] =
        [identity_top_level, identity_member_object, identity_first_row];
    attempts.iter().find_map(|attempt| attempt(payload))
}

fn identity_top_level(payload: &Value) -> Option<MemberIdentity> {
    let member_id = payload.get("cust_id").and_then(pick_id)?;
    Some(MemberIdentity {
        member_id,
        display_name: first_string(payload, &[&["display_name"], &["name"]]),
    })
}

fn identity_member_object(payload: &Value) -> Option<MemberIdentity> {
    let member = payload.get("member")?;
    let member_id = member.get("cust_id").and_then(pick_id)?;
    Some(MemberIdentity {
        member_id,
        display_name: member.get("display_name").and_then(pick_string),
    })
}

fn identity_first_row(payload: &Value) -> Option<MemberIdentity> {
    let row = first_array(payload, RECENT_ARRAY_KEYS)?.first()?;
    let member_id = first_id(row, IDENTITY_ROW_ID_PATHS)?;
    Some(MemberIdentity {
        member_id,
        display_name: first_string(row, IDENTITY_ROW_NAME_PATHS),
    })
}

/// Display name from a member lookup response (`member/info` or
/// `member/get`), if it describes `member_id`.
pub fn extract_member_display_name(payload: &Value, member_id: i64) -> Option<String> {
    let describes_member =
        |v: &Value| v.get("cust_id").and_then(pick_integer).is_none_or(|id| id == member_id);

    if describes_member(payload) {
        if let Some(name) = payload.get("display_name").and_then(pick_string) {
            return Some(name);
        }
    }

    payload
        .get("members")
        .and_then(Value::as_array)?
        .iter()
        .find(|m| m.get("cust_id").and_then(pick_integer) == Some(member_id))
        .and_then(|m| m.get("display_name"))
        .and_then(pick_string)
}

// ─── Recent sessions ─────────────────────────────────────────────

const RECENT_LIST_KEYS: &[&str] = &["races", "recent_races", "results"];
const RECENT_SESSION_ID_PATHS: &[Path] = &[&["subsession_id"], &["subsessionId"]];

/// Subsession ids from a `member_recent_races` payload, most recent first,
/// de-duplicated and capped at `limit`.
pub fn extract_recent_session_ids(payload: &Value, limit: usize) -> Vec<i64> {
    let rows = match payload {
        Value::Array(rows) => rows.as_slice(),
        _ => first_array(payload, RECENT_LIST_KEYS)
            .map(Vec::as_slice)
            .unwrap_or_default(),
    };

    let mut seen = HashSet::new();
    rows.iter()
        .filter_map(|row| first_id(row, RECENT_SESSION_ID_PATHS))
        .filter(|id| seen.insert(*id))
        .take(limit)
        .collect()
}
