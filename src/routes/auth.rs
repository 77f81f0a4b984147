// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Google sign-in routes.
//!
//! Each flow takes a Google ID token from the client, verifies it, applies the
//! account rules and answers with a session cookie plus the resolved user.

use axum::{extract::State, routing::post, Json, Router};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

use crate::error::{AppError, Result};
use crate::middleware::auth::{create_jwt, SESSION_COOKIE};
use crate::models::{Accreditation, Dashboard, ProfileExtras, Role, User, VerifiedIdentity};
use crate::AppState;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/google", post(google_login))
        .route("/auth/google/signup", post(google_sign_up))
        .route("/auth/google/signin", post(google_sign_in))
        .route("/auth/logout", post(logout))
}

/// Bare login: only the ID token.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GoogleLoginRequest {
    #[validate(length(min = 1, message = "ID token is required"))]
    pub id_token: String,
}

/// Account creation with a requested role and its attributes.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SignUpRequest {
    #[validate(length(min = 1, message = "ID token is required"))]
    pub id_token: String,
    pub role: Role,
    #[validate(length(max = 64))]
    pub roll_no: Option<String>,
    #[validate(length(max = 64))]
    pub faculty_id: Option<String>,
    #[validate(length(max = 128))]
    pub branch: Option<String>,
    pub accreditation: Option<Accreditation>,
}

/// Returning sign-in. `identifier` is the roll number, faculty id or admin key
/// depending on `role`.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SignInRequest {
    #[validate(length(min = 1, message = "ID token is required"))]
    pub id_token: String,
    pub role: Role,
    #[validate(length(max = 256))]
    pub identifier: Option<String>,
}

/// Successful authentication.
#[derive(Debug, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct AuthResponse {
    pub user: User,
    pub dashboard: Dashboard,
    /// Same value as the session cookie, for clients that send a Bearer header
    pub token: String,
}

async fn verify(state: &AppState, id_token: &str) -> Result<VerifiedIdentity> {
    Ok(state.identity_verifier.verify_id_token(id_token.trim()).await?)
}

/// Issue the session for `user`: cookie plus JSON body.
fn start_session(state: &AppState, jar: CookieJar, user: User) -> Result<(CookieJar, Json<AuthResponse>)> {
    let ttl_days = state.config.session_ttl_days;
    let token = create_jwt(&user.uid, &state.config.jwt_signing_key, ttl_days)
        .map_err(AppError::Internal)?;

    let cookie = Cookie::build((SESSION_COOKIE, token.clone()))
        .path("/")
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::days(i64::from(ttl_days)));

    let dashboard = user.role.dashboard();
    Ok((
        jar.add(cookie),
        Json(AuthResponse {
            user,
            dashboard,
            token,
        }),
    ))
}

/// First-login bootstrap: fetch the account or create a student.
async fn google_login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(body): Json<GoogleLoginRequest>,
) -> Result<(CookieJar, Json<AuthResponse>)> {
    body.validate()?;
    let identity = verify(&state, &body.id_token).await?;
    let user = state.access.bootstrap_or_fetch(&identity).await?;
    start_session(&state, jar, user)
}

async fn google_sign_up(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(body): Json<SignUpRequest>,
) -> Result<(CookieJar, Json<AuthResponse>)> {
    body.validate()?;
    let identity = verify(&state, &body.id_token).await?;

    let extras = ProfileExtras {
        roll_no: body.roll_no,
        faculty_id: body.faculty_id,
        branch: body.branch,
        accreditation: body.accreditation,
    };
    let user = state
        .access
        .sign_up_with_role(&identity, body.role, &extras)
        .await?;
    start_session(&state, jar, user)
}

async fn google_sign_in(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(body): Json<SignInRequest>,
) -> Result<(CookieJar, Json<AuthResponse>)> {
    body.validate()?;
    let identity = verify(&state, &body.id_token).await?;
    let user = state
        .access
        .sign_in_existing(&identity, body.role, body.identifier.as_deref())
        .await?;
    start_session(&state, jar, user)
}

/// Clear the session cookie.
async fn logout(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(SESSION_COOKIE).path("/"))
}
