// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! iRacing OAuth authentication routes.

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::services::oauth::{
    complete_sign_in, FlowState, SignInOutcome, FLOW_COOKIE, FLOW_TTL_MINUTES, SESSION_COOKIE,
    SESSION_TTL_DAYS,
};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/auth/start", get(auth_start))
        .route("/api/auth/callback", get(auth_callback))
        .route("/api/auth/logout", post(logout))
}

/// 302 to `location`.
fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

fn base_cookie(name: &'static str, value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .build()
}

fn flow_cookie(value: String, secure: bool) -> Cookie<'static> {
    let mut cookie = base_cookie(FLOW_COOKIE, value, secure);
    cookie.set_max_age(time::Duration::minutes(FLOW_TTL_MINUTES));
    cookie
}

fn session_cookie(session_id: String, secure: bool) -> Cookie<'static> {
    let mut cookie = base_cookie(SESSION_COOKIE, session_id, secure);
    cookie.set_max_age(time::Duration::days(SESSION_TTL_DAYS));
    cookie
}

/// Removal cookie carrying the same attributes the cookie was set with.
fn removal(name: &'static str, secure: bool) -> Cookie<'static> {
    base_cookie(name, String::new(), secure)
}

/// Query parameters for starting the OAuth flow.
#[derive(Deserialize)]
pub struct AuthStartParams {
    /// Local path to land on after sign-in
    #[serde(default, rename = "returnTo")]
    return_to: Option<String>,
}

/// Start the PKCE flow: set the flow cookie and redirect to iRacing.
async fn auth_start(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AuthStartParams>,
    jar: CookieJar,
) -> Result<(CookieJar, Response)> {
    let (flow, pkce) = FlowState::begin(params.return_to.as_deref())?;
    let authorize_url = state.iracing.authorize_url(&flow.state, &pkce.challenge)?;

    tracing::info!(return_to = %flow.return_to, "Starting OAuth flow, redirecting to iRacing");

    let jar = jar.add(flow_cookie(
        flow.to_cookie_value()?,
        state.config.secure_cookies(),
    ));
    Ok((jar, found(&authorize_url)))
}

#[derive(Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Append `key=value` to a local path that may already have a query string.
fn with_query(path: &str, key: &str, value: &str) -> String {
    let sep = if path.contains('?') { '&' } else { '?' };
    format!("{}{}{}={}", path, sep, key, urlencoding::encode(value))
}

/// OAuth callback: exchange the code, create a login session.
async fn auth_callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
    jar: CookieJar,
) -> Result<(CookieJar, Response)> {
    let secure = state.config.secure_cookies();
    let flow = jar
        .get(FLOW_COOKIE)
        .and_then(|c| FlowState::from_cookie_value(c.value()));

    if let Some(error) = params.error {
        tracing::warn!(error = %error, "OAuth error from iRacing");
        let return_to = flow.map_or_else(|| "/".to_string(), |f| f.return_to);
        let jar = jar.remove(removal(FLOW_COOKIE, secure));
        return Ok((jar, found(&with_query(&return_to, "auth_error", &error))));
    }

    let (Some(code), Some(returned_state)) = (params.code, params.state) else {
        return Err(AppError::BadRequest("Missing code/state".to_string()));
    };
    let Some(flow) = flow else {
        return Err(AppError::BadRequest("Missing OAuth cookie".to_string()));
    };
    if !flow.state_matches(&returned_state) {
        tracing::warn!("OAuth state mismatch");
        return Err(AppError::BadRequest("State mismatch".to_string()));
    }

    // The flow cookie is single-use whatever the outcome.
    let jar = jar.remove(removal(FLOW_COOKIE, secure));
    let outcome = match complete_sign_in(&state.db, &state.iracing, &code, &flow.verifier).await {
        Ok(outcome) => outcome,
        Err(err) => return Ok((jar, err.into_response())),
    };

    match outcome {
        SignInOutcome::RestartFlow => {
            let restart = with_query("/api/auth/start", "returnTo", &flow.return_to);
            Ok((jar, found(&restart)))
        }
        SignInOutcome::SignedIn { session, .. } => {
            let jar = jar.add(session_cookie(session.id, secure));
            Ok((jar, found(&flow.return_to)))
        }
    }
}

/// Logout: drop the login session and its cookie.
async fn logout(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<(CookieJar, StatusCode)> {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        state.db.delete_auth_session(cookie.value()).await?;
    }

    let jar = jar.remove(removal(SESSION_COOKIE, state.config.secure_cookies()));
    Ok((jar, StatusCode::NO_CONTENT))
}
