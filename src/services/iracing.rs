// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! iRacing OAuth and data API client.
//!
//! Handles:
//! - Authorization-code and refresh-token grants against the token endpoint
//! - The masked `client_secret` iRacing requires instead of the raw secret
//! - Data API reads, including the `{ "link": ... }` indirection to signed URLs
//! - Mapping every failure to a `ProviderError`

use crate::config::Config;
use anyhow::Context;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::time::Duration;

/// Scope requested at authorization and required by the data API.
pub const REQUIRED_SCOPE: &str = "iracing.auth";

const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(15);

/// Failures talking to iRacing.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    /// Connection, TLS or timeout failure before a response arrived.
    #[error("request failed: {0}")]
    Transport(String),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Body could not be parsed as JSON. Token responses can land here, so the
    /// body stays out of `Display`.
    #[error("non-JSON response (HTTP {status})")]
    NonJson { status: u16, body: String },

    /// Structured OAuth rejection from the token endpoint.
    #[error("token error {error}: {}", .description.as_deref().unwrap_or("no description"))]
    Token {
        error: String,
        description: Option<String>,
    },

    /// The access token lacks `REQUIRED_SCOPE`.
    #[error("scope required (HTTP {status})")]
    ScopeRequired { status: u16, body: String },
}

impl ProviderError {
    /// Whether the authorization code was already used or expired, in which
    /// case the right move is to restart the flow rather than report an error.
    pub fn is_stale_grant(&self) -> bool {
        match self {
            ProviderError::Token { error, description } if error == "invalid_grant" => {
                let description = description.as_deref().unwrap_or("").to_ascii_lowercase();
                ["expired", "used", "invalid"]
                    .iter()
                    .any(|needle| description.contains(needle))
            }
            _ => false,
        }
    }
}

/// Token endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    /// Lifetime in seconds
    #[serde(default)]
    pub expires_in: Option<i64>,
    /// Only present when the provider rotates the refresh token
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Compute the masked client secret sent to the token endpoint:
/// standard base64 of `sha256(secret + lowercase(trim(client_id)))`.
pub fn masked_client_secret(client_id: &str, client_secret: &str) -> String {
    let normalized_id = client_id.trim().to_lowercase();
    let mut hasher = Sha256::new();
    hasher.update(client_secret.as_bytes());
    hasher.update(normalized_id.as_bytes());
    STANDARD.encode(hasher.finalize())
}

/// iRacing API client.
#[derive(Clone)]
pub struct IracingClient {
    http: reqwest::Client,
    oauth_url: String,
    data_url: String,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

impl IracingClient {
    /// Create a client from application config.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .context("failed building iRacing HTTP client")?;

        Ok(Self {
            http,
            oauth_url: config.iracing_oauth_url.trim_end_matches('/').to_string(),
            data_url: config.iracing_data_url.trim_end_matches('/').to_string(),
            client_id: config.iracing_client_id.clone(),
            client_secret: config.iracing_client_secret.clone(),
            redirect_uri: config.iracing_redirect_uri.clone(),
        })
    }

    /// Build the authorize URL for a PKCE authorization-code flow.
    pub fn authorize_url(&self, state: &str, code_challenge: &str) -> anyhow::Result<String> {
        let url = Url::parse_with_params(
            &format!("{}/authorize", self.oauth_url),
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("response_type", "code"),
                ("state", state),
                ("code_challenge", code_challenge),
                ("code_challenge_method", "S256"),
                ("scope", REQUIRED_SCOPE),
            ],
        )
        .context("invalid iRacing OAuth URL")?;
        Ok(url.into())
    }

    /// Exchange an authorization code (plus PKCE verifier) for tokens.
    pub async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<TokenResponse, ProviderError> {
        self.post_token_form(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("code_verifier", code_verifier),
        ])
        .await
    }

    /// Redeem a refresh token.
    pub async fn refresh_tokens(&self, refresh_token: &str) -> Result<TokenResponse, ProviderError> {
        self.post_token_form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .await
    }

    /// POST a form to the token endpoint with client credentials attached.
    async fn post_token_form(&self, form: &[(&str, &str)]) -> Result<TokenResponse, ProviderError> {
        // Never cached.
        let masked_secret = masked_client_secret(&self.client_id, &self.client_secret);

        let mut params: Vec<(&str, &str)> = Vec::with_capacity(form.len() + 2);
        params.push(("client_id", self.client_id.as_str()));
        params.push(("client_secret", masked_secret.as_str()));
        params.extend_from_slice(form);

        let response = self
            .http
            .post(format!("{}/token", self.oauth_url))
            .form(&params)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        if !status.is_success() {
            let err = token_error_from_body(status, body);
            tracing::warn!(status = status.as_u16(), error = %err, "iRacing token request rejected");
            return Err(err);
        }

        serde_json::from_str(&body).map_err(|_| ProviderError::NonJson {
            status: status.as_u16(),
            body,
        })
    }

    /// GET a data API path with bearer auth, following a `link` indirection.
    ///
    /// `path` is relative to the data host, e.g. `/data/stats/member_recent_races`.
    pub async fn fetch_data(&self, path: &str, access_token: &str) -> Result<Value, ProviderError> {
        let response = self
            .http
            .get(format!("{}{}", self.data_url, path))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        if !status.is_success() {
            if status == StatusCode::UNAUTHORIZED && body.contains(REQUIRED_SCOPE) {
                tracing::warn!(path, "iRacing data API requires additional scope");
                return Err(ProviderError::ScopeRequired {
                    status: status.as_u16(),
                    body,
                });
            }
            tracing::warn!(path, status = status.as_u16(), "iRacing data request failed");
            return Err(ProviderError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let meta = parse_json(status, body)?;

        match meta.get("link").and_then(Value::as_str) {
            Some(link) => self.follow_link(link).await,
            None => Ok(meta),
        }
    }

    /// Fetch the signed URL a data endpoint pointed at. No auth header: the
    /// link is pre-signed and forwarding the bearer token would leak it.
    async fn follow_link(&self, link: &str) -> Result<Value, ProviderError> {
        let response = self
            .http
            .get(link)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "iRacing signed link fetch failed");
            return Err(ProviderError::Http {
                status: status.as_u16(),
                body,
            });
        }

        parse_json(status, body)
    }
}

fn parse_json(status: StatusCode, body: String) -> Result<Value, ProviderError> {
    serde_json::from_str(&body).map_err(|_| ProviderError::NonJson {
        status: status.as_u16(),
        body,
    })
}

/// Turn a non-2xx token endpoint body into the most specific error we can.
fn token_error_from_body(status: StatusCode, body: String) -> ProviderError {
    #[derive(Deserialize)]
    struct OAuthErrorBody {
        error: Option<String>,
        error_description: Option<String>,
    }

    match serde_json::from_str::<OAuthErrorBody>(&body) {
        Ok(OAuthErrorBody {
            error: Some(error),
            error_description,
        }) => ProviderError::Token {
            error,
            description: error_description,
        },
        Ok(OAuthErrorBody {
            error: None,
            error_description: Some(description),
        }) => ProviderError::Token {
            error: "unknown".to_string(),
            description: Some(description),
        },
        _ => ProviderError::Http {
            status: status.as_u16(),
            body,
        },
    }
}
