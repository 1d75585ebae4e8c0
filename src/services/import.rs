// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Idempotent import of one subsession into the local cache.
//!
//! A session with at least one cached participant is never fetched again.
//! Otherwise the result is fetched, extracted and written in a single
//! transaction.

use crate::db::Database;
use crate::services::extract::{extract_result, RowSource};
use crate::services::iracing::{IracingClient, ProviderError};
use crate::services::tokens::TokenManager;
use crate::services::viewer::resolve_viewer;
use chrono::Utc;
use serde::Serialize;

/// Import failures, one per caller-visible outcome.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("sign-in required")]
    NotVerified,

    #[error("iRacing authorization required")]
    AuthRequired,

    #[error("iRacing data access not granted")]
    ScopeRequired,

    #[error("fetch failed: {0}")]
    FetchFailed(ProviderError),

    #[error("import failed: {0}")]
    ImportFailed(String),
}

impl From<ProviderError> for ImportError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::ScopeRequired { .. } => ImportError::ScopeRequired,
            other => ImportError::FetchFailed(other),
        }
    }
}

/// Outcome of importing one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportOutcome {
    pub participants_imported: usize,
    pub skipped: bool,
}

impl ImportOutcome {
    const SKIPPED: Self = Self {
        participants_imported: 0,
        skipped: true,
    };
}

/// Data API path for one subsession's results.
pub fn results_path(session_id: i64) -> String {
    format!(
        "/data/results/get?subsession_id={}&include_licenses=false",
        session_id
    )
}

/// Imports subsessions into the cache.
#[derive(Clone)]
pub struct SessionImporter {
    pub(super) db: Database,
    pub(super) client: IracingClient,
    pub(super) tokens: TokenManager,
}

impl SessionImporter {
    pub fn new(db: Database, client: IracingClient, tokens: TokenManager) -> Self {
        Self { db, client, tokens }
    }

    /// Import on behalf of whoever holds `session_cookie`.
    ///
    /// The cache check runs before the viewer or token are looked at, so a
    /// cached session never costs any auth or network work.
    pub async fn import_session(
        &self,
        session_id: i64,
        session_cookie: Option<&str>,
    ) -> Result<ImportOutcome, ImportError> {
        if self.is_cached(session_id).await? {
            return Ok(ImportOutcome::SKIPPED);
        }

        let user = resolve_viewer(&self.db, session_cookie, Utc::now())
            .await
            .map_err(|e| ImportError::ImportFailed(e.to_string()))?
            .into_user()
            .ok_or(ImportError::NotVerified)?;

        let access_token = self
            .tokens
            .get_valid_access_token(&user.id)
            .await
            .map_err(|e| {
                tracing::info!(user_id = %user.id, error = %e, "No usable access token");
                ImportError::AuthRequired
            })?;

        self.fetch_and_store(session_id, &access_token).await
    }

    /// Import with an access token the caller already holds.
    pub async fn import_with_token(
        &self,
        session_id: i64,
        access_token: &str,
    ) -> Result<ImportOutcome, ImportError> {
        if self.is_cached(session_id).await? {
            return Ok(ImportOutcome::SKIPPED);
        }
        self.fetch_and_store(session_id, access_token).await
    }

    async fn is_cached(&self, session_id: i64) -> Result<bool, ImportError> {
        let count = self
            .db
            .participant_count(session_id)
            .await
            .map_err(|e| ImportError::ImportFailed(e.to_string()))?;
        if count > 0 {
            tracing::debug!(session_id, count, "Session already cached, skipping");
        }
        Ok(count > 0)
    }

    async fn fetch_and_store(
        &self,
        session_id: i64,
        access_token: &str,
    ) -> Result<ImportOutcome, ImportError> {
        let payload = self
            .client
            .fetch_data(&results_path(session_id), access_token)
            .await?;

        let extracted = extract_result(&payload);
        if extracted.source != RowSource::RaceByTypeName {
            tracing::info!(
                session_id,
                source = ?extracted.source,
                "Race rows not found by type name"
            );
        }

        let written = self
            .db
            .replace_session_grid(
                session_id,
                &extracted.header,
                &extracted.participants,
                Utc::now(),
            )
            .await
            .map_err(|e| ImportError::ImportFailed(e.to_string()))?;

        Ok(ImportOutcome {
            participants_imported: written,
            skipped: false,
        })
    }
}
