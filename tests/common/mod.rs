// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared test harness: in-memory database plus a fake iRacing server.

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use chrono::{Duration, Utc};
use gridrep::config::Config;
use gridrep::db::Database;
use gridrep::models::{AuthSession, OAuthTokenRecord, User};
use gridrep::routes::create_router;
use gridrep::services::iracing::masked_client_secret;
use gridrep::AppState;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Canned status and JSON body.
#[derive(Clone, Debug)]
pub struct Reply {
    pub status: u16,
    pub body: Value,
}

impl Reply {
    pub fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    pub fn status(status: u16, body: Value) -> Self {
        Self { status, body }
    }
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.body)).into_response()
    }
}

/// Fake iRacing OAuth + data API. Counts every request it sees.
pub struct FakeIracing {
    pub base_url: String,
    pub token_requests: AtomicUsize,
    pub refresh_requests: AtomicUsize,
    pub data_requests: AtomicUsize,
    /// Signed-link fetches that carried an Authorization header
    pub link_requests_with_auth: AtomicUsize,
    /// Answer data requests with `{ "link": ... }` indirection
    pub serve_via_link: AtomicBool,
    pub exchange_reply: Mutex<Reply>,
    pub refresh_reply: Mutex<Reply>,
    pub recent_reply: Mutex<Reply>,
    pub member_info_reply: Mutex<Reply>,
    pub results: Mutex<HashMap<i64, Reply>>,
}

#[allow(dead_code)]
impl FakeIracing {
    pub fn token_hits(&self) -> usize {
        self.token_requests.load(Ordering::SeqCst)
    }

    pub fn refresh_hits(&self) -> usize {
        self.refresh_requests.load(Ordering::SeqCst)
    }

    pub fn data_hits(&self) -> usize {
        self.data_requests.load(Ordering::SeqCst)
    }

    pub fn set_reply(slot: &Mutex<Reply>, reply: Reply) {
        *slot.lock().unwrap() = reply;
    }

    pub fn set_results(&self, subsession_id: i64, reply: Reply) {
        self.results.lock().unwrap().insert(subsession_id, reply);
    }
}

#[allow(dead_code)]
pub fn token_grant(access: &str, refresh: Option<&str>, scope: Option<&str>) -> Value {
    let mut body = json!({
        "access_token": access,
        "token_type": "Bearer",
        "expires_in": 600,
    });
    if let Some(refresh) = refresh {
        body["refresh_token"] = json!(refresh);
    }
    if let Some(scope) = scope {
        body["scope"] = json!(scope);
    }
    body
}

/// A result payload with practice, qualifying and race blocks.
#[allow(dead_code)]
pub fn race_payload(subsession_id: i64, race_member_ids: &[i64]) -> Value {
    let rows = |ids: &[i64]| -> Vec<Value> {
        ids.iter()
            .enumerate()
            .map(|(pos, id)| {
                json!({
                    "cust_id": id,
                    "display_name": format!("Racer {}", id),
                    "finish_position": pos,
                    "car_name": "Global Mazda MX-5 Cup",
                })
            })
            .collect()
    };

    json!({
        "subsession_id": subsession_id,
        "start_time": "2024-05-01T19:00:00Z",
        "series_name": "Global Mazda MX-5 Fanatec Cup",
        "track": { "track_name": "Okayama International Circuit" },
        "event_strength_of_field": 1734,
        "session_results": [
            { "simsession_type_name": "Open Practice", "simsession_type": 3, "results": rows(&[1, 2]) },
            { "simsession_type_name": "RACE", "simsession_type": 6, "results": rows(race_member_ids) },
            { "simsession_type_name": "Lone Qualifying", "simsession_type": 4, "results": rows(&[3]) },
        ],
    })
}

fn bearer_present(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .is_some_and(|h| h.starts_with("Bearer "))
}

fn maybe_link(fake: &FakeIracing, key: &str, reply: Reply) -> Response {
    if reply.status == 200 && fake.serve_via_link.load(Ordering::SeqCst) {
        let link = format!("{}/signed/{}", fake.base_url, key);
        return Json(json!({ "link": link, "expires": "2099-01-01T00:00:00Z" })).into_response();
    }
    reply.into_response()
}

async fn token_endpoint(
    State(fake): State<Arc<FakeIracing>>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    fake.token_requests.fetch_add(1, Ordering::SeqCst);

    let expected = masked_client_secret("test-client", "test_secret");
    if form.get("client_id").map(String::as_str) != Some("test-client")
        || form.get("client_secret") != Some(&expected)
    {
        return Reply::status(401, json!({ "error": "invalid_client" })).into_response();
    }

    match form.get("grant_type").map(String::as_str) {
        Some("authorization_code") => fake.exchange_reply.lock().unwrap().clone().into_response(),
        Some("refresh_token") => {
            fake.refresh_requests.fetch_add(1, Ordering::SeqCst);
            fake.refresh_reply.lock().unwrap().clone().into_response()
        }
        _ => Reply::status(400, json!({ "error": "unsupported_grant_type" })).into_response(),
    }
}

async fn recent_races(State(fake): State<Arc<FakeIracing>>, headers: HeaderMap) -> Response {
    fake.data_requests.fetch_add(1, Ordering::SeqCst);
    if !bearer_present(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let reply = fake.recent_reply.lock().unwrap().clone();
    maybe_link(&fake, "recent", reply)
}

async fn member_info(State(fake): State<Arc<FakeIracing>>) -> Response {
    fake.data_requests.fetch_add(1, Ordering::SeqCst);
    fake.member_info_reply.lock().unwrap().clone().into_response()
}

async fn member_get(State(fake): State<Arc<FakeIracing>>) -> Response {
    fake.data_requests.fetch_add(1, Ordering::SeqCst);
    StatusCode::NOT_FOUND.into_response()
}

async fn results_get(
    State(fake): State<Arc<FakeIracing>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    fake.data_requests.fetch_add(1, Ordering::SeqCst);
    if !bearer_present(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let Some(id) = query.get("subsession_id").and_then(|s| s.parse::<i64>().ok()) else {
        return Reply::status(400, json!({ "error": "missing subsession_id" })).into_response();
    };
    let reply = fake
        .results
        .lock()
        .unwrap()
        .get(&id)
        .cloned()
        .unwrap_or_else(|| Reply::status(404, json!({ "error": "not found" })));
    maybe_link(&fake, &format!("results-{}", id), reply)
}

async fn signed_link(
    State(fake): State<Arc<FakeIracing>>,
    Path(key): Path<String>,
    headers: HeaderMap,
) -> Response {
    if headers.contains_key("authorization") {
        fake.link_requests_with_auth.fetch_add(1, Ordering::SeqCst);
    }

    let reply = if key == "recent" {
        fake.recent_reply.lock().unwrap().clone()
    } else {
        let id = key.trim_start_matches("results-").parse::<i64>().unwrap_or(0);
        fake.results
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .unwrap_or_else(|| Reply::status(404, json!({})))
    };
    reply.into_response()
}

/// Start the fake provider on an ephemeral port.
pub async fn spawn_fake_iracing() -> Arc<FakeIracing> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let fake = Arc::new(FakeIracing {
        base_url: format!("http://{}", addr),
        token_requests: AtomicUsize::new(0),
        refresh_requests: AtomicUsize::new(0),
        data_requests: AtomicUsize::new(0),
        link_requests_with_auth: AtomicUsize::new(0),
        serve_via_link: AtomicBool::new(false),
        exchange_reply: Mutex::new(Reply::ok(token_grant(
            "access-1",
            Some("refresh-1"),
            Some("iracing.auth"),
        ))),
        refresh_reply: Mutex::new(Reply::ok(token_grant("access-2", None, None))),
        recent_reply: Mutex::new(Reply::ok(json!({
            "cust_id": 424242,
            "races": [],
        }))),
        member_info_reply: Mutex::new(Reply::ok(json!({
            "cust_id": 424242,
            "display_name": "Ayrton Testa",
        }))),
        results: Mutex::new(HashMap::new()),
    });

    let app = Router::new()
        .route("/oauth2/token", post(token_endpoint))
        .route("/data/stats/member_recent_races", get(recent_races))
        .route("/data/member/info", get(member_info))
        .route("/data/member/get", get(member_get))
        .route("/data/results/get", get(results_get))
        .route("/signed/{key}", get(signed_link))
        .with_state(fake.clone());

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    fake
}

/// Config pointing at the fake provider.
pub fn test_config(fake: &FakeIracing) -> Config {
    Config {
        iracing_oauth_url: format!("{}/oauth2", fake.base_url),
        iracing_data_url: fake.base_url.clone(),
        ..Config::test_default()
    }
}

/// Create a test app backed by an in-memory database and a fake provider.
/// Returns the router, the shared state and the fake.
#[allow(dead_code)]
pub async fn create_test_app() -> (axum::Router, Arc<AppState>, Arc<FakeIracing>) {
    let fake = spawn_fake_iracing().await;
    create_test_app_with_config(fake.clone(), test_config(&fake)).await
}

#[allow(dead_code)]
pub async fn create_test_app_with_config(
    fake: Arc<FakeIracing>,
    config: Config,
) -> (axum::Router, Arc<AppState>, Arc<FakeIracing>) {
    let db = Database::in_memory().await.unwrap();
    let state = Arc::new(AppState::new(config, db).unwrap());
    (create_router(state.clone()), state, fake)
}

/// Create a verified user with tokens expiring in `expires_in` and a login
/// session. Returns the user and a `Cookie` header value.
#[allow(dead_code)]
pub async fn seed_verified_user(
    state: &AppState,
    member_id: i64,
    expires_in: Duration,
    refresh_token: Option<&str>,
) -> (User, String) {
    let now = Utc::now();
    let user = state
        .db
        .upsert_user(&format!("user-{}", member_id), member_id, "Seeded Driver", now)
        .await
        .unwrap();

    state
        .db
        .set_tokens(&OAuthTokenRecord {
            user_id: user.id.clone(),
            access_token: "stored-access".to_string(),
            refresh_token: refresh_token.map(str::to_string),
            access_expires_at: now + expires_in,
            scope: Some("iracing.auth".to_string()),
            updated_at: now,
        })
        .await
        .unwrap();

    let session_id = format!("session-{}", member_id);
    state
        .db
        .insert_auth_session(&AuthSession {
            id: session_id.clone(),
            user_id: user.id.clone(),
            created_at: now,
            expires_at: now + Duration::days(30),
            last_seen_at: now,
        })
        .await
        .unwrap();

    (user, format!("gr_session={}", session_id))
}

#[allow(dead_code)]
pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
