// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! PKCE sign-in flow with iRacing.
//!
//! `FlowState` travels in a short-lived cookie between the start and the
//! callback. `complete_sign_in` turns an authorization code into a local
//! user, stored tokens and a login session.

use crate::db::Database;
use crate::error::AppError;
use crate::models::{AuthSession, User};
use crate::random::{random_bytes, random_token};
use crate::services::extract::{extract_identity, extract_member_display_name, fallback_name};
use crate::services::iracing::{IracingClient, ProviderError, REQUIRED_SCOPE};
use crate::services::tokens::record_from_grant;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Cookie holding the in-progress flow.
pub const FLOW_COOKIE: &str = "gr_oauth";
/// Cookie holding the login session id.
pub const SESSION_COOKIE: &str = "gr_session";

pub const FLOW_TTL_MINUTES: i64 = 10;
pub const SESSION_TTL_DAYS: i64 = 30;

/// Data endpoint used to learn who a fresh token belongs to.
pub const IDENTITY_PATH: &str = "/data/stats/member_recent_races";

/// Reduce a caller-supplied `returnTo` to a same-origin path, or `/`.
pub fn sanitize_return_to(raw: Option<&str>) -> String {
    let Some(path) = raw.map(str::trim).filter(|p| !p.is_empty()) else {
        return "/".to_string();
    };

    let lowered = path.to_ascii_lowercase();
    let acceptable = path.starts_with('/')
        && !path.starts_with("//")
        && !path.contains('\\')
        && !path.chars().any(char::is_control)
        && !lowered.contains("javascript:")
        && !lowered.contains("data:");

    if acceptable {
        path.to_string()
    } else {
        tracing::warn!(return_to = %path, "Rejected unsafe returnTo");
        "/".to_string()
    }
}

/// S256 challenge for a PKCE verifier.
pub fn code_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// PKCE verifier and its derived challenge.
#[derive(Debug, Clone)]
pub struct PkcePair {
    pub verifier: String,
    pub challenge: String,
}

impl PkcePair {
    pub fn generate() -> anyhow::Result<Self> {
        let verifier = URL_SAFE_NO_PAD.encode(random_bytes::<32>()?);
        let challenge = code_challenge(&verifier);
        Ok(Self {
            verifier,
            challenge,
        })
    }
}

/// Contents of the flow cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowState {
    pub state: String,
    pub verifier: String,
    #[serde(rename = "returnTo")]
    pub return_to: String,
}

impl FlowState {
    /// Fresh state and verifier for a new sign-in attempt.
    pub fn begin(return_to: Option<&str>) -> anyhow::Result<(Self, PkcePair)> {
        let pkce = PkcePair::generate()?;
        let flow = Self {
            state: random_token()?,
            verifier: pkce.verifier.clone(),
            return_to: sanitize_return_to(return_to),
        };
        Ok((flow, pkce))
    }

    /// Cookie value: base64url of the JSON payload.
    pub fn to_cookie_value(&self) -> anyhow::Result<String> {
        Ok(URL_SAFE_NO_PAD.encode(serde_json::to_vec(self)?))
    }

    /// Parse a cookie value. `returnTo` is re-sanitized since the cookie is
    /// client-held.
    pub fn from_cookie_value(value: &str) -> Option<Self> {
        let bytes = URL_SAFE_NO_PAD.decode(value).ok()?;
        let mut flow: Self = serde_json::from_slice(&bytes).ok()?;
        flow.return_to = sanitize_return_to(Some(&flow.return_to));
        Some(flow)
    }

    pub fn state_matches(&self, state: &str) -> bool {
        !state.is_empty() && bool::from(self.state.as_bytes().ct_eq(state.as_bytes()))
    }
}

/// Whether a granted scope string covers `required`.
///
/// A token response without `scope` is taken as granting what was asked for.
pub fn scope_includes(granted: Option<&str>, required: &str) -> bool {
    match granted {
        None => true,
        Some(scope) => scope
            .split(|c: char| c.is_whitespace() || c == ',')
            .any(|s| s == required),
    }
}

/// Result of a callback exchange.
#[derive(Debug)]
pub enum SignInOutcome {
    SignedIn { user: User, session: AuthSession },
    /// The code was already used or expired; start over.
    RestartFlow,
}

/// Exchange `code` and establish a login session for the member it belongs to.
pub async fn complete_sign_in(
    db: &Database,
    client: &IracingClient,
    code: &str,
    verifier: &str,
) -> Result<SignInOutcome, AppError> {
    let grant = match client.exchange_code(code, verifier).await {
        Ok(grant) => grant,
        Err(e) if e.is_stale_grant() => {
            tracing::info!(error = %e, "Stale authorization code, restarting flow");
            return Ok(SignInOutcome::RestartFlow);
        }
        Err(e) => return Err(AppError::TokenExchange(e.to_string())),
    };

    if !scope_includes(grant.scope.as_deref(), REQUIRED_SCOPE) {
        tracing::warn!(granted = ?grant.scope, "Granted scope lacks required scope");
        return Err(AppError::MissingScope(REQUIRED_SCOPE.to_string()));
    }

    let recent = client
        .fetch_data(IDENTITY_PATH, &grant.access_token)
        .await
        .map_err(|e| match e {
            ProviderError::ScopeRequired { .. } => AppError::ScopeRequired,
            other => AppError::FetchFailed(other.to_string()),
        })?;

    let identity = extract_identity(&recent).ok_or(AppError::IdentityUnresolved)?;
    let member_id = identity.member_id;

    let display_name = match enrich_display_name(client, &grant.access_token, member_id).await {
        Some(name) => name,
        None => identity
            .display_name
            .unwrap_or_else(|| fallback_name(member_id)),
    };

    let now = Utc::now();
    let user = db
        .upsert_user(&random_token()?, member_id, &display_name, now)
        .await?;

    db.set_tokens(&record_from_grant(&user.id, &grant, now))
        .await?;

    let session = AuthSession {
        id: random_token()?,
        user_id: user.id.clone(),
        created_at: now,
        expires_at: now + Duration::days(SESSION_TTL_DAYS),
        last_seen_at: now,
    };
    db.insert_auth_session(&session).await?;

    tracing::info!(user_id = %user.id, member_id, "Sign-in complete");
    Ok(SignInOutcome::SignedIn { user, session })
}

/// Try the member lookup endpoints for a better display name.
/// Failures are logged and ignored.
pub async fn enrich_display_name(
    client: &IracingClient,
    access_token: &str,
    member_id: i64,
) -> Option<String> {
    let paths = [
        "/data/member/info".to_string(),
        format!("/data/member/get?cust_ids={}", member_id),
    ];

    for path in &paths {
        match client.fetch_data(path, access_token).await {
            Ok(payload) => {
                if let Some(name) = extract_member_display_name(&payload, member_id) {
                    return Some(name);
                }
            }
            Err(e) => tracing::debug!(path = %path, error = %e, "Display name lookup failed"),
        }
    }
    None
}
