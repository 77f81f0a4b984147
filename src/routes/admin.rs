// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Elevation requests, complaints and broadcast alerts.

use crate::error::Result;
use crate::middleware::Session;
use crate::models::{Alert, Complaint, ComplaintUpdate, ElevationRequest};
use crate::AppState;
use axum::{
    extract::{Path, State},
    routing::{get, patch, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/elevation-requests",
            get(list_elevation_requests).post(request_elevation),
        )
        .route(
            "/api/elevation-requests/{id}/decision",
            post(decide_elevation),
        )
        .route("/api/complaints", get(list_complaints).post(file_complaint))
        .route("/api/complaints/{id}", patch(update_complaint))
        .route("/api/alerts", get(latest_alert).post(broadcast_alert))
}

// ─── Derived-admin Requests ──────────────────────────────────

async fn list_elevation_requests(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> Result<Json<Vec<ElevationRequest>>> {
    Ok(Json(state.access.list_elevation_requests(&session).await?))
}

async fn request_elevation(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> Result<Json<ElevationRequest>> {
    Ok(Json(state.access.request_elevation(&session).await?))
}

/// Admin decision. `requesterUid` must match the request.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct DecisionRequest {
    #[validate(length(min = 1, message = "Requester is required"))]
    pub requester_uid: String,
    pub approve: bool,
}

async fn decide_elevation(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
    Json(body): Json<DecisionRequest>,
) -> Result<Json<ElevationRequest>> {
    body.validate()?;
    let decided = state
        .access
        .decide_elevation(&session, &id, &body.requester_uid, body.approve)
        .await?;
    Ok(Json(decided))
}

// ─── Complaints ──────────────────────────────────────────────

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ComplaintRequest {
    #[validate(length(max = 5000))]
    #[serde(default)]
    pub message: String,
    #[validate(length(max = 64))]
    pub faculty_id: Option<String>,
}

async fn list_complaints(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> Result<Json<Vec<Complaint>>> {
    Ok(Json(state.notices.list_complaints(&session).await?))
}

async fn file_complaint(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Json(body): Json<ComplaintRequest>,
) -> Result<Json<Complaint>> {
    body.validate()?;
    let complaint = state
        .notices
        .file_complaint(&session, &body.message, body.faculty_id.as_deref())
        .await?;
    Ok(Json(complaint))
}

async fn update_complaint(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
    Json(update): Json<ComplaintUpdate>,
) -> Result<Json<Complaint>> {
    Ok(Json(
        state.notices.update_complaint(&session, &id, update).await?,
    ))
}

// ─── Alerts ──────────────────────────────────────────────────

#[derive(Debug, Deserialize, Validate)]
pub struct AlertRequest {
    #[validate(length(max = 1000))]
    #[serde(default)]
    pub message: String,
}

/// Latest alert, or `null` when none has been sent.
async fn latest_alert(State(state): State<Arc<AppState>>) -> Result<Json<Option<Alert>>> {
    Ok(Json(state.notices.latest_alert().await?))
}

async fn broadcast_alert(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Json(body): Json<AlertRequest>,
) -> Result<Json<Alert>> {
    body.validate()?;
    Ok(Json(
        state.notices.broadcast_alert(&session, &body.message).await?,
    ))
}
