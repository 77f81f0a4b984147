// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use activity_hub::config::Config;
use activity_hub::db::{DocumentStore, FirestoreDb, MemoryStore};
use activity_hub::middleware::auth::create_jwt;
use activity_hub::models::{Role, User};
use activity_hub::routes::create_router;
use activity_hub::services::GoogleIdentityVerifier;
use activity_hub::AppState;
use axum::body::Body;
use axum::http::{header, Method, Request, Response, StatusCode};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tower::ServiceExt;

/// Key id and secret of the static identity verifier used in tests.
pub const TEST_KID: &str = "test-kid";
pub const TEST_OIDC_SECRET: &[u8] = b"oidc-test-secret";

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Router plus handles for inspecting and breaking the store.
#[allow(dead_code)]
pub struct TestApp {
    pub router: axum::Router,
    pub state: Arc<AppState>,
    pub store: Arc<MemoryStore>,
}

/// Create a test app over the in-memory store with a static-key verifier.
#[allow(dead_code)]
pub fn create_test_app() -> TestApp {
    create_test_app_with_config(Config::test_default())
}

/// Same as [`create_test_app`] with a custom config; the store stays in memory.
#[allow(dead_code)]
pub fn create_test_app_with_config(config: Config) -> TestApp {
    let store = Arc::new(MemoryStore::new());

    let verifier = GoogleIdentityVerifier::new_with_static_key(
        &config,
        TEST_KID,
        Algorithm::HS256,
        DecodingKey::from_secret(TEST_OIDC_SECRET),
    )
    .expect("static verifier");

    let db: Arc<dyn DocumentStore> = store.clone();
    let state = Arc::new(AppState::new(config, db, Arc::new(verifier)));

    TestApp {
        router: create_router(state.clone()),
        state,
        store,
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

/// Sign a Google-style ID token the test verifier accepts.
#[allow(dead_code)]
pub fn id_token(subject: &str, name: &str, email: &str) -> String {
    let now = now_secs();
    let claims = serde_json::json!({
        "iss": "https://accounts.google.com",
        "aud": Config::test_default().google_client_id,
        "sub": subject,
        "iat": now,
        "exp": now + 600,
        "email": email,
        "email_verified": true,
        "name": name,
    });

    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some(TEST_KID.to_string());
    jsonwebtoken::encode(&header, &claims, &EncodingKey::from_secret(TEST_OIDC_SECRET)).unwrap()
}

/// Session token for `uid`, as the sign-in routes would issue it.
#[allow(dead_code)]
pub fn session_token(uid: &str) -> String {
    create_jwt(uid, &Config::test_default().jwt_signing_key, 1).unwrap()
}

/// Store a user directly, bypassing the sign-in flows.
#[allow(dead_code)]
pub async fn seed_user(store: &MemoryStore, uid: &str, role: Role) -> User {
    let user = User {
        uid: uid.to_string(),
        name: format!("User {uid}"),
        email: format!("{uid}@uni.edu"),
        photo_url: None,
        role,
        roll_no: None,
        faculty_id: None,
        branch: Some("CSE".to_string()),
        department: Some("CSE".to_string()),
        accreditation: None,
    };
    store.create_user(&user).await.unwrap()
}

/// Build a request with an optional Bearer session and JSON body.
#[allow(dead_code)]
pub fn request(
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Send one request and return the raw response.
#[allow(dead_code)]
pub async fn send_raw(app: &TestApp, req: Request<Body>) -> Response<Body> {
    app.router.clone().oneshot(req).await.unwrap()
}

/// Send one request and parse the JSON body (`Null` when empty).
#[allow(dead_code)]
pub async fn send(app: &TestApp, req: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = send_raw(app, req).await;
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
    };
    (status, json)
}

/// Minimal base64 PNG payload for submissions.
#[allow(dead_code)]
pub fn png_file() -> serde_json::Value {
    serde_json::json!({
        "name": "certificate.png",
        "contentType": "image/png",
        "data": "data:image/png;base64,iVBORw0KGgo=",
    })
}

/// Submission body with sensible defaults.
#[allow(dead_code)]
pub fn submission(title: &str, category: &str) -> serde_json::Value {
    serde_json::json!({
        "title": title,
        "description": "Took part and placed well",
        "category": category,
        "startDate": "2026-01-10",
        "endDate": "2026-01-12",
        "file": png_file(),
    })
}
