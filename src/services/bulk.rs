// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Import a member's recent races in one go.

use crate::services::extract::extract_recent_session_ids;
use crate::services::import::{ImportError, SessionImporter};
use crate::services::oauth::IDENTITY_PATH;
use futures_util::{stream, StreamExt};
use serde::Serialize;
use tokio::task::JoinError;

/// Most recent sessions considered per bulk import.
pub const MAX_RECENT_SESSIONS: usize = 10;

/// Sessions imported concurrently.
pub const IMPORT_CONCURRENCY: usize = 3;

/// Per-batch result. `imported` includes sessions that were already cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkOutcome {
    pub imported: usize,
    pub failed: usize,
    pub ids: Vec<i64>,
}

impl SessionImporter {
    /// Import the recent races of `user_id`.
    ///
    /// One access token is used for the whole batch. A failing session is
    /// logged and counted; it never stops the others.
    pub async fn import_recent(&self, user_id: &str) -> Result<BulkOutcome, ImportError> {
        let access_token = self
            .tokens
            .get_valid_access_token(user_id)
            .await
            .map_err(|e| {
                tracing::info!(user_id, error = %e, "No usable access token");
                ImportError::AuthRequired
            })?;

        let recent = self.client.fetch_data(IDENTITY_PATH, &access_token).await?;
        let ids = extract_recent_session_ids(&recent, MAX_RECENT_SESSIONS);

        // Each import runs in its own task so a panic costs one session only.
        let results: Vec<(i64, Result<Result<_, ImportError>, JoinError>)> =
            stream::iter(ids.iter().copied())
                .map(|session_id| {
                    let importer = self.clone();
                    let access_token = access_token.clone();
                    async move {
                        let handle = tokio::spawn(async move {
                            importer.import_with_token(session_id, &access_token).await
                        });
                        (session_id, handle.await)
                    }
                })
                .buffer_unordered(IMPORT_CONCURRENCY)
                .collect()
                .await;

        let mut imported = 0;
        let mut failed = 0;
        for (session_id, result) in results {
            match result {
                Ok(Ok(_)) => imported += 1,
                Ok(Err(e)) => {
                    failed += 1;
                    tracing::warn!(user_id, session_id, error = %e, "Recent session import failed");
                }
                Err(e) => {
                    failed += 1;
                    tracing::error!(user_id, session_id, error = %e, "Recent session import aborted");
                }
            }
        }

        tracing::info!(
            user_id,
            candidates = ids.len(),
            imported,
            failed,
            "Recent import finished"
        );

        Ok(BulkOutcome {
            imported,
            failed,
            ids,
        })
    }
}
