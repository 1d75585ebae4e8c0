// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! GridRep: iRacing identity and session import
//!
//! This crate provides the backend API that verifies iRacing members through
//! OAuth and imports their race results into a local SQLite cache.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod random;
pub mod routes;
pub mod services;

use config::Config;
use db::Database;
use services::{IracingClient, SessionImporter, TokenManager};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: Database,
    pub iracing: IracingClient,
    pub tokens: TokenManager,
    pub importer: SessionImporter,
}

impl AppState {
    /// Wire services together over an open database.
    pub fn new(config: Config, db: Database) -> anyhow::Result<Self> {
        let iracing = IracingClient::new(&config)?;
        let tokens = TokenManager::new(db.clone(), iracing.clone());
        let importer = SessionImporter::new(db.clone(), iracing.clone(), tokens.clone());

        Ok(Self {
            config,
            db,
            iracing,
            tokens,
            importer,
        })
    }
}
