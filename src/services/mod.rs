// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod bulk;
pub mod extract;
pub mod import;
pub mod iracing;
pub mod oauth;
pub mod tokens;
pub mod viewer;

pub use bulk::BulkOutcome;
pub use import::{ImportError, ImportOutcome, SessionImporter};
pub use iracing::{IracingClient, ProviderError};
pub use tokens::{TokenError, TokenManager};
pub use viewer::{resolve_viewer, Viewer};
