// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-request correlation id.
//!
//! Every response carries `x-debug-id`; the same id is recorded on a tracing
//! span around the request so a user-reported id can be found in the logs.

use crate::random::correlation_id;
use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use tracing::Instrument;

pub const DEBUG_ID_HEADER: HeaderName = HeaderName::from_static("x-debug-id");

pub async fn assign_debug_id(req: Request, next: Next) -> Response {
    let id = correlation_id();

    let span = tracing::info_span!(
        "request",
        debug_id = %id,
        method = %req.method(),
        path = %req.uri().path()
    );
    let mut response = next.run(req).instrument(span).await;

    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(DEBUG_ID_HEADER, value);
    }
    response
}
