// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Derived-admin elevation requests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A faculty member's request for derived-admin privileges.
///
/// Terminal once approved or rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElevationRequest {
    pub id: String,
    pub requester_uid: String,
    pub requester_name: String,
    pub requester_email: String,
    pub status: RequestStatus,
    #[serde(default = "epoch")]
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<DateTime<Utc>>,
    /// uid of the deciding admin
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_by: Option<String>,
}

impl ElevationRequest {
    pub fn apply_decision(&mut self, decision: &ElevationDecision) {
        self.status = decision.status();
        self.decided_at = Some(decision.decided_at);
        self.decided_by = Some(decision.decided_by.clone());
    }
}

// Older request documents carry no timestamp.
fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::default()
}

/// Outcome of an admin decision, applied to the request (and on approval the
/// requester) in one atomic write.
#[derive(Debug, Clone, PartialEq)]
pub struct ElevationDecision {
    pub approve: bool,
    pub decided_by: String,
    pub decided_at: DateTime<Utc>,
}

impl ElevationDecision {
    pub fn status(&self) -> RequestStatus {
        if self.approve {
            RequestStatus::Approved
        } else {
            RequestStatus::Rejected
        }
    }
}

/// Pending requests first, then newest first.
pub fn sort_pending_first(requests: &mut [ElevationRequest]) {
    requests.sort_by(|a, b| {
        let a_pending = a.status != RequestStatus::Pending;
        let b_pending = b.status != RequestStatus::Pending;
        a_pending
            .cmp(&b_pending)
            .then_with(|| b.created_at.cmp(&a.created_at))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(id: &str, status: RequestStatus, created_at: &str) -> ElevationRequest {
        ElevationRequest {
            id: id.to_string(),
            requester_uid: format!("uid-{id}"),
            requester_name: "Prof".to_string(),
            requester_email: "prof@uni.edu".to_string(),
            status,
            created_at: created_at.parse().unwrap(),
            decided_at: None,
            decided_by: None,
        }
    }

    #[test]
    fn test_sort_pending_first() {
        let mut requests = vec![
            request("a", RequestStatus::Approved, "2025-01-03T00:00:00Z"),
            request("b", RequestStatus::Pending, "2025-01-01T00:00:00Z"),
            request("c", RequestStatus::Rejected, "2025-01-04T00:00:00Z"),
            request("d", RequestStatus::Pending, "2025-01-02T00:00:00Z"),
        ];
        sort_pending_first(&mut requests);

        let ids: Vec<&str> = requests.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["d", "b", "c", "a"]);
    }

    #[test]
    fn test_missing_created_at_defaults() {
        let json = serde_json::json!({
            "id": "r1",
            "requesterUid": "u1",
            "requesterName": "Prof",
            "requesterEmail": "p@uni.edu",
            "status": "pending"
        });
        let request: ElevationRequest = serde_json::from_value(json).unwrap();
        assert_eq!(request.created_at, DateTime::<Utc>::default());
    }
}
