// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Activity record model for storage and API.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Category value that carries internship details.
pub const INTERNSHIP_CATEGORY: &str = "Internship";

/// Review state of a submitted activity.
///
/// `Pending` is initial; `Approved` and `Rejected` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityStatus {
    Pending,
    Approved,
    Rejected,
}

impl ActivityStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ActivityStatus::Pending => "pending",
            ActivityStatus::Approved => "approved",
            ActivityStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, ActivityStatus::Pending)
    }
}

impl std::fmt::Display for ActivityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Faculty decision on a pending activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewDecision {
    Approve,
    Reject,
}

impl ReviewDecision {
    pub fn target_status(self) -> ActivityStatus {
        match self {
            ReviewDecision::Approve => ActivityStatus::Approved,
            ReviewDecision::Reject => ActivityStatus::Rejected,
        }
    }
}

/// Internship-only fields. Present iff the category is `Internship`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InternshipDetails {
    pub stipend: Option<String>,
    pub company_worked: Option<String>,
    pub city: Option<String>,
}

/// Stored activity record in Firestore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ActivityRecord", into = "ActivityRecord")]
pub struct Activity {
    /// Document ID
    pub id: String,
    /// Owner uid
    pub student_id: String,
    /// Snapshot of the owner's name at submission time
    pub student_name: String,
    /// Snapshot of the owner's department at submission time
    pub student_department: Option<String>,
    pub title: String,
    pub description: String,
    pub category: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub internship: Option<InternshipDetails>,
    /// Inline file document id
    pub file_id: Option<String>,
    /// Legacy direct URL (older records only)
    pub file_url: Option<String>,
    pub file_name: String,
    pub file_type: String,
    pub file_size: Option<u64>,
    pub status: ActivityStatus,
    pub remarks: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields written by a single review, applied atomically.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityReview {
    pub status: ActivityStatus,
    pub remarks: Option<String>,
    pub reviewed_at: DateTime<Utc>,
    pub reviewed_by: String,
}

impl Activity {
    /// Apply a review to an in-memory record.
    pub fn apply_review(&mut self, review: &ActivityReview) {
        self.status = review.status;
        self.remarks = review.remarks.clone();
        self.reviewed_at = Some(review.reviewed_at);
        self.reviewed_by = Some(review.reviewed_by.clone());
    }

    pub fn is_internship(&self) -> bool {
        self.category == INTERNSHIP_CATEGORY
    }
}

/// Flat document shape. Internship keys are written (possibly as null) only
/// for internship records.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActivityRecord {
    id: String,
    student_id: String,
    student_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    student_department: Option<String>,
    title: String,
    description: String,
    category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    start_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    end_date: Option<NaiveDate>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    stipend: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    company_worked: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    city: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    file_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    file_url: Option<String>,
    file_name: String,
    file_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    file_size: Option<u64>,
    status: ActivityStatus,
    #[serde(default)]
    remarks: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reviewed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reviewed_by: Option<String>,
    created_at: DateTime<Utc>,
}

/// Distinguishes a present-but-null key from a missing one.
fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

impl From<ActivityRecord> for Activity {
    fn from(r: ActivityRecord) -> Self {
        let internship = (r.category == INTERNSHIP_CATEGORY).then(|| InternshipDetails {
            stipend: r.stipend.flatten(),
            company_worked: r.company_worked.flatten(),
            city: r.city.flatten(),
        });

        Self {
            id: r.id,
            student_id: r.student_id,
            student_name: r.student_name,
            student_department: r.student_department,
            title: r.title,
            description: r.description,
            category: r.category,
            start_date: r.start_date,
            end_date: r.end_date,
            internship,
            file_id: r.file_id,
            file_url: r.file_url,
            file_name: r.file_name,
            file_type: r.file_type,
            file_size: r.file_size,
            status: r.status,
            remarks: r.remarks,
            reviewed_at: r.reviewed_at,
            reviewed_by: r.reviewed_by,
            created_at: r.created_at,
        }
    }
}

impl From<Activity> for ActivityRecord {
    fn from(a: Activity) -> Self {
        let (stipend, company_worked, city) = match a.internship {
            Some(details) => (
                Some(details.stipend),
                Some(details.company_worked),
                Some(details.city),
            ),
            None => (None, None, None),
        };

        Self {
            id: a.id,
            student_id: a.student_id,
            student_name: a.student_name,
            student_department: a.student_department,
            title: a.title,
            description: a.description,
            category: a.category,
            start_date: a.start_date,
            end_date: a.end_date,
            stipend,
            company_worked,
            city,
            file_id: a.file_id,
            file_url: a.file_url,
            file_name: a.file_name,
            file_type: a.file_type,
            file_size: a.file_size,
            status: a.status,
            remarks: a.remarks,
            reviewed_at: a.reviewed_at,
            reviewed_by: a.reviewed_by,
            created_at: a.created_at,
        }
    }
}
