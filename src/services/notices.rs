// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Student complaints and admin broadcast alerts.

use std::sync::Arc;

use chrono::Utc;

use crate::db::{new_id, DocumentStore};
use crate::error::{AppError, Result};
use crate::middleware::Session;
use crate::models::complaint::latest_alert;
use crate::models::{Alert, Capability, Complaint, ComplaintStatus, ComplaintUpdate};

#[derive(Clone)]
pub struct NoticeService {
    db: Arc<dyn DocumentStore>,
}

impl NoticeService {
    pub fn new(db: Arc<dyn DocumentStore>) -> Self {
        Self { db }
    }

    pub async fn file_complaint(
        &self,
        session: &Session,
        message: &str,
        faculty_id: Option<&str>,
    ) -> Result<Complaint> {
        session.require(Capability::FileComplaint)?;

        let message = message.trim();
        if message.is_empty() {
            return Err(AppError::Validation("Message is required".to_string()));
        }

        let complaint = Complaint {
            id: new_id(),
            student_uid: session.uid.clone(),
            student_name: session.name.clone(),
            student_email: session.email.clone(),
            faculty_id: faculty_id
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(str::to_string),
            message: message.to_string(),
            status: ComplaintStatus::Open,
            admin_remarks: None,
            created_at: Utc::now(),
        };
        self.db.put_complaint(&complaint).await?;

        tracing::info!(uid = %session.uid, complaint_id = %complaint.id, "Complaint filed");
        Ok(complaint)
    }

    /// Admins see every complaint; students see their own.
    pub async fn list_complaints(&self, session: &Session) -> Result<Vec<Complaint>> {
        let complaints = self.db.list_complaints().await?;
        if session.role.can(Capability::ManageComplaints) {
            return Ok(complaints);
        }

        session.require(Capability::FileComplaint)?;
        Ok(complaints
            .into_iter()
            .filter(|c| c.student_uid == session.uid)
            .collect())
    }

    pub async fn update_complaint(
        &self,
        session: &Session,
        complaint_id: &str,
        mut update: ComplaintUpdate,
    ) -> Result<Complaint> {
        session.require(Capability::ManageComplaints)?;

        update.admin_remarks = update.admin_remarks.map(|r| r.trim().to_string());
        if update.is_empty() {
            return Err(AppError::Validation(
                "Provide remarks and/or a status".to_string(),
            ));
        }

        let mut complaint = self
            .db
            .get_complaint(complaint_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("complaint {complaint_id}")))?;

        update.apply(&mut complaint);
        self.db.put_complaint(&complaint).await?;

        tracing::info!(
            complaint_id,
            admin = %session.uid,
            status = ?complaint.status,
            "Complaint updated"
        );
        Ok(complaint)
    }

    pub async fn broadcast_alert(&self, session: &Session, message: &str) -> Result<Alert> {
        session.require(Capability::BroadcastAlerts)?;

        let message = message.trim();
        if message.is_empty() {
            return Err(AppError::Validation("Message is required".to_string()));
        }

        let alert = Alert {
            id: new_id(),
            message: message.to_string(),
            created_by: session.name.clone(),
            created_at: Utc::now(),
        };
        self.db.add_alert(&alert).await?;

        tracing::info!(alert_id = %alert.id, admin = %session.uid, "Alert broadcast");
        Ok(alert)
    }

    /// Most recent alert, visible to everyone.
    pub async fn latest_alert(&self) -> Result<Option<Alert>> {
        let alerts = self.db.list_alerts().await?;
        Ok(latest_alert(&alerts).cloned())
    }
}
