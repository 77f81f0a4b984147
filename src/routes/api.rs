// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API routes for authenticated users.

use crate::db::ActivityFilter;
use crate::error::{AppError, Result};
use crate::middleware::Session;
use crate::models::{Alert, Capability, DashboardStats, Dashboard, User};
use crate::AppState;
use axum::{
    extract::{Path, State},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// API routes (require authentication via JWT).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/me", get(get_me))
        .route("/api/stats", get(get_stats))
        .route("/api/users", get(list_users))
        .route(
            "/api/users/{uid}/derived-admin",
            post(grant_derived_admin).delete(revoke_derived_admin),
        )
}

// ─── User Profile ────────────────────────────────────────────

/// Current user response.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct MeResponse {
    pub user: User,
    pub dashboard: Dashboard,
    /// Latest broadcast notice, if any
    #[cfg_attr(feature = "binding-generation", ts(skip))]
    pub alert: Option<Alert>,
}

/// Get current user profile.
async fn get_me(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> Result<Json<MeResponse>> {
    let user = state
        .db
        .get_user(&session.uid)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user {}", session.uid)))?;

    // Alert banner is best-effort.
    let alert = match state.notices.latest_alert().await {
        Ok(alert) => alert,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to load latest alert");
            None
        }
    };

    Ok(Json(MeResponse {
        dashboard: user.role.dashboard(),
        user,
        alert,
    }))
}

// ─── Analytics ───────────────────────────────────────────────

/// Aggregate views, recomputed from a full read on every request.
async fn get_stats(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> Result<Json<DashboardStats>> {
    session.require(Capability::ViewAnalytics)?;

    let filter = ActivityFilter::default();
    let (activities, users) = tokio::try_join!(
        state.db.list_activities(&filter),
        state.db.list_users(),
    )?;

    tracing::debug!(
        activities = activities.len(),
        users = users.len(),
        "Computing dashboard stats"
    );
    Ok(Json(DashboardStats::compute(&activities, &users)))
}

// ─── User Management ─────────────────────────────────────────

async fn list_users(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> Result<Json<Vec<User>>> {
    Ok(Json(state.access.list_users(&session).await?))
}

async fn grant_derived_admin(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(uid): Path<String>,
) -> Result<Json<User>> {
    Ok(Json(state.access.grant_derived_admin(&session, &uid).await?))
}

async fn revoke_derived_admin(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(uid): Path<String>,
) -> Result<Json<User>> {
    Ok(Json(state.access.revoke_derived_admin(&session, &uid).await?))
}
