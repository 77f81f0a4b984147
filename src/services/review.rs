// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Activity submission and review workflow.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};

use crate::db::{new_id, ActivityFilter, DocumentStore};
use crate::error::{AppError, Result};
use crate::middleware::Session;
use crate::models::file::check_attachment;
use crate::models::stats::StatusCounts;
use crate::models::{
    Activity, ActivityReview, ActivityStatus, Capability, InternshipDetails, ReviewDecision,
    StoredFile,
};

const UNKNOWN_REVIEWER: &str = "Unknown";

/// Uploaded attachment, already decoded.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Fields a student supplies when submitting an activity.
#[derive(Debug, Clone, Default)]
pub struct ActivitySubmission {
    pub title: String,
    pub description: String,
    pub category: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// Ignored unless the category is `Internship`.
    pub internship: InternshipDetails,
    pub attachment: Option<Attachment>,
}

#[derive(Clone)]
pub struct ActivityService {
    db: Arc<dyn DocumentStore>,
    max_upload_bytes: usize,
}

fn required(value: &str, field: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Whether the caller may see every student's records.
fn sees_all(session: &Session) -> bool {
    session.role.can(Capability::ReviewActivity) || session.role.can(Capability::ViewAnalytics)
}

impl ActivityService {
    pub fn new(db: Arc<dyn DocumentStore>, max_upload_bytes: usize) -> Self {
        Self {
            db,
            max_upload_bytes,
        }
    }

    /// Validate and store a new activity (always `pending`).
    ///
    /// The student's name and department are copied at submission time.
    pub async fn submit(&self, session: &Session, submission: ActivitySubmission) -> Result<Activity> {
        session.require(Capability::SubmitActivity)?;

        let title = required(&submission.title, "Title")?;
        let description = required(&submission.description, "Description")?;
        let category = required(&submission.category, "Category")?;

        if let (Some(start), Some(end)) = (submission.start_date, submission.end_date) {
            if end < start {
                return Err(AppError::Validation(
                    "End date cannot be before start date".to_string(),
                ));
            }
        }

        let attachment = submission
            .attachment
            .ok_or_else(|| AppError::Validation("File is required".to_string()))?;
        check_attachment(
            &attachment.content_type,
            attachment.bytes.len(),
            self.max_upload_bytes,
        )
        .map_err(AppError::Validation)?;

        let student = self
            .db
            .get_user(&session.uid)
            .await?
            .ok_or(AppError::InvalidToken)?;

        let now = Utc::now();
        let file = StoredFile::encode(
            new_id(),
            &session.uid,
            &attachment.name,
            &attachment.content_type,
            &attachment.bytes,
            now,
        );
        self.db.add_file(&file).await?;

        let internship = (category == crate::models::activity::INTERNSHIP_CATEGORY).then(|| {
            InternshipDetails {
                stipend: optional(submission.internship.stipend),
                company_worked: optional(submission.internship.company_worked),
                city: optional(submission.internship.city),
            }
        });

        let activity = Activity {
            id: new_id(),
            student_id: student.uid.clone(),
            student_name: student.name.clone(),
            student_department: student.department.clone(),
            title,
            description,
            category,
            start_date: submission.start_date,
            end_date: submission.end_date,
            internship,
            file_id: Some(file.id.clone()),
            file_url: None,
            file_name: file.name.clone(),
            file_type: file.content_type.clone(),
            file_size: Some(file.size),
            status: ActivityStatus::Pending,
            remarks: None,
            reviewed_at: None,
            reviewed_by: None,
            created_at: now,
        };
        self.db.add_activity(&activity).await?;

        tracing::info!(
            uid = %session.uid,
            activity_id = %activity.id,
            category = %activity.category,
            file_size = file.size,
            "Activity submitted"
        );
        Ok(activity)
    }

    /// Approve or reject a pending activity.
    ///
    /// Rejection needs remarks. The store refuses the write if the activity
    /// was decided in the meantime.
    pub async fn review(
        &self,
        session: &Session,
        activity_id: &str,
        decision: ReviewDecision,
        remarks: Option<&str>,
    ) -> Result<Activity> {
        session.require(Capability::ReviewActivity)?;

        let remarks = remarks
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string);
        if decision == ReviewDecision::Reject && remarks.is_none() {
            return Err(AppError::Validation(
                "Remarks are required when rejecting".to_string(),
            ));
        }

        let reviewed_by = if session.name.trim().is_empty() {
            UNKNOWN_REVIEWER.to_string()
        } else {
            session.name.clone()
        };

        let review = ActivityReview {
            status: decision.target_status(),
            remarks,
            reviewed_at: Utc::now(),
            reviewed_by,
        };

        let activity = self.db.review_activity(activity_id, &review).await?;

        tracing::info!(
            activity_id,
            reviewer = %session.uid,
            status = %activity.status,
            "Activity reviewed"
        );
        Ok(activity)
    }

    /// Students see their own records; reviewers and admins see all.
    pub async fn list(
        &self,
        session: &Session,
        status: Option<ActivityStatus>,
    ) -> Result<Vec<Activity>> {
        let student_id = if sees_all(session) {
            None
        } else {
            session.require(Capability::SubmitActivity)?;
            Some(session.uid.clone())
        };

        self.db
            .list_activities(&ActivityFilter { student_id, status })
            .await
    }

    pub async fn get(&self, session: &Session, activity_id: &str) -> Result<Activity> {
        let activity = self
            .db
            .get_activity(activity_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("activity {activity_id}")))?;

        if activity.student_id != session.uid && !sees_all(session) {
            // Same answer as a missing record.
            return Err(AppError::NotFound(format!("activity {activity_id}")));
        }
        Ok(activity)
    }

    /// Inline attachment, for its owner and for reviewers.
    pub async fn file(&self, session: &Session, file_id: &str) -> Result<StoredFile> {
        let file = self
            .db
            .get_file(file_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("file {file_id}")))?;

        if file.uid != session.uid && !sees_all(session) {
            return Err(AppError::NotFound(format!("file {file_id}")));
        }
        Ok(file)
    }

    /// Status counts over the caller's own activities.
    pub async fn my_counts(&self, session: &Session) -> Result<StatusCounts> {
        let activities = self
            .db
            .list_activities(&ActivityFilter {
                student_id: Some(session.uid.clone()),
                status: None,
            })
            .await?;
        Ok(StatusCounts::from_activities(&activities))
    }
}
