// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Secrets are read once at startup and kept in memory.

use std::env;

/// Default OAuth server base (authorize + token endpoints live below it).
pub const DEFAULT_OAUTH_URL: &str = "https://oauth.iracing.com/oauth2";
/// Default data API host.
pub const DEFAULT_DATA_URL: &str = "https://members-ng.iracing.com";

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// iRacing OAuth client ID (public)
    pub iracing_client_id: String,
    /// Callback URL registered with iRacing
    pub iracing_redirect_uri: String,
    /// OAuth server base URL
    pub iracing_oauth_url: String,
    /// Data API base URL
    pub iracing_data_url: String,
    /// SQLite connection string
    pub database_url: String,
    /// Server port
    pub port: u16,

    // --- Secrets ---
    /// iRacing OAuth client secret (never sent raw, see `masked_client_secret`)
    pub iracing_client_secret: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            iracing_client_id: env::var("IRACING_CLIENT_ID")
                .map_err(|_| ConfigError::Missing("IRACING_CLIENT_ID"))?,
            iracing_redirect_uri: env::var("IRACING_REDIRECT_URI")
                .map_err(|_| ConfigError::Missing("IRACING_REDIRECT_URI"))?,
            iracing_oauth_url: env::var("IRACING_OAUTH_URL")
                .unwrap_or_else(|_| DEFAULT_OAUTH_URL.to_string()),
            iracing_data_url: env::var("IRACING_DATA_URL")
                .unwrap_or_else(|_| DEFAULT_DATA_URL.to_string()),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://gridrep.db".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),

            iracing_client_secret: env::var("IRACING_CLIENT_SECRET")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("IRACING_CLIENT_SECRET"))?,
        })
    }

    /// Deterministic config for tests.
    pub fn test_default() -> Self {
        Self {
            iracing_client_id: "test-client".to_string(),
            iracing_redirect_uri: "https://gridrep.test/api/auth/callback".to_string(),
            iracing_oauth_url: DEFAULT_OAUTH_URL.to_string(),
            iracing_data_url: DEFAULT_DATA_URL.to_string(),
            database_url: "sqlite::memory:".to_string(),
            port: 8080,
            iracing_client_secret: "test_secret".to_string(),
        }
    }

    /// Whether cookies should carry the `Secure` attribute.
    ///
    /// Plain-http callbacks only happen in local development.
    pub fn secure_cookies(&self) -> bool {
        !self.iracing_redirect_uri.starts_with("http://")
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
}
