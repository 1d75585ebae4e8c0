// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session cookie authentication middleware.

use crate::error::AppError;
use crate::models::User;
use crate::services::oauth::SESSION_COOKIE;
use crate::services::resolve_viewer;
use crate::AppState;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use chrono::Utc;
use std::sync::Arc;

/// Verified user, inserted into request extensions by [`require_viewer`].
#[derive(Debug, Clone)]
pub struct VerifiedUser(pub User);

/// Middleware that requires a live `gr_session` cookie.
pub async fn require_viewer(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let session_id = jar.get(SESSION_COOKIE).map(|c| c.value().to_string());

    let viewer = match resolve_viewer(&state.db, session_id.as_deref(), Utc::now()).await {
        Ok(viewer) => viewer,
        Err(e) => return e.into_response(),
    };

    match viewer.into_user() {
        Some(user) => {
            request.extensions_mut().insert(VerifiedUser(user));
            next.run(request).await
        }
        None => AppError::NotVerified.into_response(),
    }
}
