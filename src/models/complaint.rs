// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Student complaints and admin broadcast alerts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComplaintStatus {
    Open,
    Resolved,
}

/// Complaint filed by a student for admin attention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Complaint {
    pub id: String,
    pub student_uid: String,
    pub student_name: String,
    pub student_email: String,
    /// Faculty the complaint concerns, if named
    #[serde(default)]
    pub faculty_id: Option<String>,
    pub message: String,
    pub status: ComplaintStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_remarks: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Partial admin update: remarks and/or status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplaintUpdate {
    #[serde(default)]
    pub status: Option<ComplaintStatus>,
    #[serde(default)]
    pub admin_remarks: Option<String>,
}

impl ComplaintUpdate {
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.admin_remarks.is_none()
    }

    pub fn apply(&self, complaint: &mut Complaint) {
        if let Some(status) = self.status {
            complaint.status = status;
        }
        if let Some(remarks) = &self.admin_remarks {
            complaint.admin_remarks = Some(remarks.clone());
        }
    }
}

/// Broadcast notice shown on student dashboards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: String,
    pub message: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// Most recent alert, if any.
pub fn latest_alert(alerts: &[Alert]) -> Option<&Alert> {
    alerts.iter().max_by_key(|a| a.created_at)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_only_touches_given_fields() {
        let mut complaint = Complaint {
            id: "c1".to_string(),
            student_uid: "s1".to_string(),
            student_name: "S".to_string(),
            student_email: "s@uni.edu".to_string(),
            faculty_id: None,
            message: "Unfair grading".to_string(),
            status: ComplaintStatus::Open,
            admin_remarks: Some("Looking into it".to_string()),
            created_at: Utc::now(),
        };

        ComplaintUpdate {
            status: Some(ComplaintStatus::Resolved),
            admin_remarks: None,
        }
        .apply(&mut complaint);

        assert_eq!(complaint.status, ComplaintStatus::Resolved);
        assert_eq!(complaint.admin_remarks.as_deref(), Some("Looking into it"));
    }

    #[test]
    fn test_latest_alert() {
        let alert = |id: &str, at: &str| Alert {
            id: id.to_string(),
            message: id.to_string(),
            created_by: "admin".to_string(),
            created_at: at.parse().unwrap(),
        };
        let alerts = vec![
            alert("old", "2025-01-01T00:00:00Z"),
            alert("new", "2025-02-01T00:00:00Z"),
        ];
        assert_eq!(latest_alert(&alerts).map(|a| a.id.as_str()), Some("new"));
        assert!(latest_alert(&[]).is_none());
    }
}
