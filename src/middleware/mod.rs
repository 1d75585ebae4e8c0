// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Middleware modules (authentication, correlation ids, security headers).

pub mod auth;
pub mod request_id;
pub mod security;

pub use auth::{require_viewer, VerifiedUser};
pub use request_id::assign_debug_id;
