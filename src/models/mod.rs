// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod activity;
pub mod complaint;
pub mod elevation;
pub mod file;
pub mod stats;
pub mod user;

pub use activity::{Activity, ActivityReview, ActivityStatus, InternshipDetails, ReviewDecision};
pub use complaint::{Alert, Complaint, ComplaintStatus, ComplaintUpdate};
pub use elevation::{ElevationDecision, ElevationRequest, RequestStatus};
pub use file::StoredFile;
pub use stats::DashboardStats;
pub use user::{Accreditation, Capability, Dashboard, ProfileExtras, Role, User, VerifiedIdentity};
