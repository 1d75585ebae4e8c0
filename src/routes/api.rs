// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Viewer and session import routes.

use crate::error::{AppError, Result};
use crate::middleware::auth::VerifiedUser;
use crate::services::oauth::SESSION_COOKIE;
use crate::services::resolve_viewer;
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

const NO_STORE: [(header::HeaderName, &str); 1] = [(header::CACHE_CONTROL, "no-store")];

/// Routes that work for anonymous callers (they answer 401 themselves).
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/viewer", get(get_viewer))
        .route(
            "/api/iracing/session/{id}/import",
            get(import_session).post(import_session),
        )
}

/// Routes behind `require_viewer`, applied in routes/mod.rs.
pub fn protected_routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/iracing/recent/import", post(import_recent))
}

fn session_cookie(jar: &CookieJar) -> Option<String> {
    jar.get(SESSION_COOKIE).map(|c| c.value().to_string())
}

// ─── Viewer ──────────────────────────────────────────────────

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ViewerUser {
    pub id: String,
    #[serde(rename = "iracingId")]
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub iracing_id: i64,
    pub name: String,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ViewerResponse {
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<ViewerUser>,
}

/// Who is signed in, if anyone.
async fn get_viewer(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<impl IntoResponse> {
    let viewer = resolve_viewer(&state.db, session_cookie(&jar).as_deref(), Utc::now()).await?;

    let body = ViewerResponse {
        verified: viewer.user().is_some(),
        user: viewer.into_user().map(|u| ViewerUser {
            id: u.id,
            iracing_id: u.iracing_member_id,
            name: u.display_name,
        }),
    };
    Ok((NO_STORE, Json(body)))
}

// ─── Import ──────────────────────────────────────────────────

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "camelCase")]
pub struct ImportSessionResponse {
    pub ok: bool,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub subsession_id: i64,
    pub participants_imported: usize,
    pub skipped: bool,
}

fn parse_session_id(raw: &str) -> Result<i64> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| AppError::BadRequest(format!("Invalid subsession id: {}", raw)))
}

/// Import one subsession into the cache (no-op if already cached).
async fn import_session(
    State(state): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
    jar: CookieJar,
) -> Result<impl IntoResponse> {
    let subsession_id = parse_session_id(&raw_id)?;

    let outcome = state
        .importer
        .import_session(subsession_id, session_cookie(&jar).as_deref())
        .await?;

    tracing::info!(
        subsession_id,
        participants = outcome.participants_imported,
        skipped = outcome.skipped,
        "Session import finished"
    );

    Ok((
        NO_STORE,
        Json(ImportSessionResponse {
            ok: true,
            subsession_id,
            participants_imported: outcome.participants_imported,
            skipped: outcome.skipped,
        }),
    ))
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "camelCase")]
pub struct ImportRecentResponse {
    pub ok: bool,
    pub sessions_imported: usize,
    pub failed: usize,
    #[cfg_attr(feature = "binding-generation", ts(type = "number[]"))]
    pub subsession_ids: Vec<i64>,
}

/// Import the signed-in member's recent races.
async fn import_recent(
    State(state): State<Arc<AppState>>,
    Extension(VerifiedUser(user)): Extension<VerifiedUser>,
) -> Result<impl IntoResponse> {
    let outcome = state.importer.import_recent(&user.id).await?;

    Ok((
        NO_STORE,
        Json(ImportRecentResponse {
            ok: true,
            sessions_imported: outcome.imported,
            failed: outcome.failed,
            subsession_ids: outcome.ids,
        }),
    ))
}
