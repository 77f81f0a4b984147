// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Activity submission, review, attachments and portfolio export.

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::middleware::Session;
use crate::models::stats::StatusCounts;
use crate::models::{Activity, ActivityStatus, Capability, InternshipDetails, ReviewDecision};
use crate::services::{ActivitySubmission, Attachment};
use crate::AppState;
use axum::{
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

/// Floor for the submission body limit.
const MIN_SUBMISSION_BODY_BYTES: usize = 8 * 1024 * 1024;

/// Room for the JSON fields around the encoded file.
const SUBMISSION_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Body limit for a submission carrying a base64 file of `max_upload_bytes`.
pub fn submission_body_limit(max_upload_bytes: usize) -> usize {
    let encoded = max_upload_bytes.div_ceil(3) * 4;
    (encoded + SUBMISSION_OVERHEAD_BYTES).max(MIN_SUBMISSION_BODY_BYTES)
}

pub fn routes(config: &Config) -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/activities",
            get(list_activities)
                .post(submit_activity)
                .layer(DefaultBodyLimit::max(submission_body_limit(
                    config.upload_limit(),
                ))),
        )
        .route("/api/activities/{id}", get(get_activity))
        .route("/api/activities/{id}/review", post(review_activity))
        .route("/api/files/{id}", get(get_file))
        .route("/api/portfolio.pdf", get(export_portfolio))
}

// ─── Listing ─────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ActivitiesQuery {
    /// `all` (default), `pending`, `approved` or `rejected`
    #[serde(default)]
    status: Option<String>,
}

fn parse_status_filter(raw: Option<&str>) -> Result<Option<ActivityStatus>> {
    match raw.map(str::trim).map(str::to_ascii_lowercase).as_deref() {
        None | Some("") | Some("all") => Ok(None),
        Some("pending") => Ok(Some(ActivityStatus::Pending)),
        Some("approved") => Ok(Some(ActivityStatus::Approved)),
        Some("rejected") => Ok(Some(ActivityStatus::Rejected)),
        Some(other) => Err(AppError::BadRequest(format!("unknown status filter: {other}"))),
    }
}

/// Activity list, newest first.
#[derive(Serialize)]
pub struct ActivitiesResponse {
    pub activities: Vec<Activity>,
    /// The caller's own status counts; students only
    pub counts: Option<StatusCounts>,
}

async fn list_activities(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Query(params): Query<ActivitiesQuery>,
) -> Result<Json<ActivitiesResponse>> {
    let status = parse_status_filter(params.status.as_deref())?;
    let activities = state.activities.list(&session, status).await?;

    let counts = if session.role.can(Capability::SubmitActivity) {
        Some(state.activities.my_counts(&session).await?)
    } else {
        None
    };

    Ok(Json(ActivitiesResponse { activities, counts }))
}

async fn get_activity(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
) -> Result<Json<Activity>> {
    Ok(Json(state.activities.get(&session, &id).await?))
}

// ─── Submission ──────────────────────────────────────────────

/// Uploaded file: raw base64 or a full `data:` URL.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct FilePayload {
    #[validate(length(min = 1, max = 255, message = "File name is required"))]
    pub name: String,
    pub content_type: String,
    pub data: String,
}

impl FilePayload {
    fn into_attachment(self) -> Result<Attachment> {
        let payload = match self.data.split_once(";base64,") {
            Some((prefix, payload)) if prefix.starts_with("data:") => payload,
            _ => self.data.as_str(),
        };
        let bytes = STANDARD
            .decode(payload.trim())
            .map_err(|_| AppError::Validation("File data is not valid base64".to_string()))?;

        Ok(Attachment {
            name: self.name.trim().to_string(),
            content_type: self.content_type.trim().to_ascii_lowercase(),
            bytes,
        })
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubmitActivityRequest {
    #[validate(length(max = 200))]
    #[serde(default)]
    pub title: String,
    #[validate(length(max = 5000))]
    #[serde(default)]
    pub description: String,
    #[validate(length(max = 100))]
    #[serde(default)]
    pub category: String,
    /// `YYYY-MM-DD`
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub stipend: Option<String>,
    #[serde(default)]
    pub company_worked: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[validate(nested)]
    pub file: Option<FilePayload>,
}

fn parse_date(raw: Option<&str>, field: &str) -> Result<Option<NaiveDate>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| AppError::Validation(format!("{field} must be a YYYY-MM-DD date"))),
    }
}

impl SubmitActivityRequest {
    fn into_submission(self) -> Result<ActivitySubmission> {
        Ok(ActivitySubmission {
            start_date: parse_date(self.start_date.as_deref(), "Start date")?,
            end_date: parse_date(self.end_date.as_deref(), "End date")?,
            attachment: self.file.map(FilePayload::into_attachment).transpose()?,
            title: self.title,
            description: self.description,
            category: self.category,
            internship: InternshipDetails {
                stipend: self.stipend,
                company_worked: self.company_worked,
                city: self.city,
            },
        })
    }
}

async fn submit_activity(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Json(body): Json<SubmitActivityRequest>,
) -> Result<Json<Activity>> {
    body.validate()?;
    let submission = body.into_submission()?;
    Ok(Json(state.activities.submit(&session, submission).await?))
}

// ─── Review ──────────────────────────────────────────────────

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRequest {
    pub decision: ReviewDecision,
    #[validate(length(max = 2000))]
    pub remarks: Option<String>,
}

async fn review_activity(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
    Json(body): Json<ReviewRequest>,
) -> Result<Json<Activity>> {
    body.validate()?;
    let activity = state
        .activities
        .review(&session, &id, body.decision, body.remarks.as_deref())
        .await?;
    Ok(Json(activity))
}

// ─── Downloads ───────────────────────────────────────────────

/// `Content-Disposition` with an ASCII fallback name and the exact UTF-8 name.
fn content_disposition(kind: &str, file_name: &str) -> Result<HeaderValue> {
    let fallback: String = file_name
        .chars()
        .map(|c| {
            if c.is_ascii_graphic() && c != '"' && c != '\\' {
                c
            } else {
                '_'
            }
        })
        .collect();

    HeaderValue::from_str(&format!(
        "{kind}; filename=\"{fallback}\"; filename*=UTF-8''{}",
        urlencoding::encode(file_name)
    ))
    .map_err(|e| AppError::Internal(e.into()))
}

/// Inline attachment bytes with their stored content type.
async fn get_file(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
) -> Result<Response> {
    let file = state.activities.file(&session, &id).await?;
    let bytes = file.decode().map_err(|e| {
        tracing::error!(file_id = %id, error = %e, "Stored file is corrupt");
        AppError::Internal(e.into())
    })?;

    let content_type =
        HeaderValue::from_str(&file.content_type).map_err(|e| AppError::Internal(e.into()))?;

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, content_disposition("inline", &file.name)?),
            (header::CACHE_CONTROL, HeaderValue::from_static("private, max-age=300")),
        ],
        bytes,
    )
        .into_response())
}

async fn export_portfolio(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> Result<Response> {
    let portfolio = state.portfolio.export(&session).await?;

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/pdf")),
            (
                header::CONTENT_DISPOSITION,
                content_disposition("attachment", &portfolio.file_name)?,
            ),
        ],
        portfolio.bytes,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_filter() {
        assert_eq!(parse_status_filter(None).unwrap(), None);
        assert_eq!(parse_status_filter(Some("all")).unwrap(), None);
        assert_eq!(
            parse_status_filter(Some("Pending")).unwrap(),
            Some(ActivityStatus::Pending)
        );
        assert!(parse_status_filter(Some("archived")).is_err());
    }

    #[test]
    fn test_body_limit_covers_encoded_upload() {
        assert_eq!(submission_body_limit(5 * 1024 * 1024), MIN_SUBMISSION_BODY_BYTES);
        let big = 20 * 1024 * 1024;
        assert!(submission_body_limit(big) > big * 4 / 3);
    }

    #[test]
    fn test_file_payload_accepts_data_url() {
        let payload = FilePayload {
            name: " cert.png ".to_string(),
            content_type: "IMAGE/PNG".to_string(),
            data: "data:image/png;base64,AQID".to_string(),
        };
        let attachment = payload.into_attachment().unwrap();
        assert_eq!(attachment.name, "cert.png");
        assert_eq!(attachment.content_type, "image/png");
        assert_eq!(attachment.bytes, vec![1, 2, 3]);
    }

    #[test]
    fn test_bad_date_is_validation_error() {
        assert!(matches!(
            parse_date(Some("15/01/2026"), "Start date"),
            Err(AppError::Validation(_))
        ));
        assert_eq!(parse_date(Some("  "), "Start date").unwrap(), None);
    }

    #[test]
    fn test_content_disposition_fallback() {
        let value = content_disposition("attachment", "Zoë \"Z\" Doe.pdf").unwrap();
        let value = value.to_str().unwrap();
        assert!(value.starts_with("attachment; filename=\"Zo__"));
        assert!(value.contains("filename*=UTF-8''Zo%C3%AB"));
    }
}
