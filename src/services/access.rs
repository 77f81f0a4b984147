// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Account and role lifecycle.
//!
//! Decides what user record exists after each authentication event and
//! gates every role-changing mutation:
//! - bootstrap on first login (always `student`)
//! - account creation with a requested role (never `admin`)
//! - returning sign-in with role and identifier checks, plus the admin-key path
//! - derived-admin requests, decisions, grants and revocations

use std::sync::Arc;

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::db::{DocumentStore, RequestFilter, UserField};
use crate::error::{AppError, Result};
use crate::middleware::Session;
use crate::models::elevation::sort_pending_first;
use crate::models::{
    Capability, ElevationDecision, ElevationRequest, ProfileExtras, RequestStatus, Role, User,
    VerifiedIdentity,
};

type HmacSha256 = Hmac<Sha256>;

const DEFAULT_USER_NAME: &str = "Unknown User";
const DEFAULT_ADMIN_NAME: &str = "Admin User";
const ADMIN_KEY_CONTEXT: &[u8] = b"activity-hub admin key v1";

/// Keyed digest of an admin key; comparing tags is constant-time.
fn admin_key_tag(key: &str) -> Option<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(key.as_bytes()).ok()?;
    mac.update(ADMIN_KEY_CONTEXT);
    Some(mac)
}

/// Role and account rules over the user and request collections.
#[derive(Clone)]
pub struct AccessService {
    db: Arc<dyn DocumentStore>,
    /// `None` when no admin secret is configured; the admin path is then closed.
    admin_tag: Option<Vec<u8>>,
}

impl AccessService {
    pub fn new(db: Arc<dyn DocumentStore>, admin_secret: &str) -> Self {
        let secret = admin_secret.trim();
        let admin_tag = if secret.is_empty() {
            tracing::warn!("ADMIN_SECRET is empty; admin sign-in disabled");
            None
        } else {
            admin_key_tag(secret).map(|mac| mac.finalize().into_bytes().to_vec())
        };

        Self { db, admin_tag }
    }

    fn admin_key_matches(&self, candidate: &str) -> bool {
        let Some(expected) = &self.admin_tag else {
            return false;
        };
        admin_key_tag(candidate.trim())
            .map(|mac| mac.verify_slice(expected).is_ok())
            .unwrap_or(false)
    }

    // ─── Authentication events ───────────────────────────────────

    /// Return the stored user, creating a `student` record on first login.
    pub async fn bootstrap_or_fetch(&self, identity: &VerifiedIdentity) -> Result<User> {
        if let Some(user) = self.db.get_user(&identity.subject).await? {
            return Ok(user);
        }

        let user = User::from_identity(identity, Role::Student, DEFAULT_USER_NAME);
        let stored = self.db.create_user(&user).await?;

        tracing::info!(uid = %stored.uid, "Created user on first login");
        Ok(stored)
    }

    /// Account-creation flow.
    ///
    /// A requested `admin` (or `derived-admin`) role is ignored: the stored
    /// role, or `student` for a new account, is kept.
    pub async fn sign_up_with_role(
        &self,
        identity: &VerifiedIdentity,
        requested: Role,
        extras: &ProfileExtras,
    ) -> Result<User> {
        let existing = self.db.get_user(&identity.subject).await?;

        let role = match requested {
            Role::Student | Role::Faculty => requested,
            Role::Admin | Role::DerivedAdmin => {
                tracing::warn!(
                    uid = %identity.subject,
                    requested = %requested,
                    "Ignoring elevated role on sign-up"
                );
                existing.as_ref().map_or(Role::Student, |u| u.role)
            }
        };

        let Some(mut user) = existing else {
            let mut user = User::from_identity(identity, role, DEFAULT_USER_NAME);
            apply_extras(&mut user, extras);
            let stored = self.db.create_user(&user).await?;

            tracing::info!(uid = %stored.uid, role = %stored.role, "Account created via sign-up");
            return Ok(stored);
        };

        let mut fields = UserField::PROFILE.to_vec();
        user.merge_profile(identity);
        if user.role != role {
            user.role = role;
            fields.push(UserField::Role);
        }
        fields.extend(apply_extras(&mut user, extras));
        self.db.update_user_fields(&user, &fields).await?;

        tracing::info!(uid = %user.uid, role = %user.role, "Account updated via sign-up");
        Ok(user)
    }

    /// Returning-user flow. No failure path writes anything.
    pub async fn sign_in_existing(
        &self,
        identity: &VerifiedIdentity,
        claimed: Role,
        identifier: Option<&str>,
    ) -> Result<User> {
        let identifier = identifier.map(str::trim).filter(|id| !id.is_empty());

        if claimed == Role::Admin {
            if !identifier.is_some_and(|key| self.admin_key_matches(key)) {
                tracing::warn!(uid = %identity.subject, "Admin sign-in with invalid key");
                return Err(AppError::InvalidAdminKey);
            }
            return self.promote_to_admin(identity).await;
        }

        let mut user = self
            .db
            .get_user(&identity.subject)
            .await?
            .ok_or(AppError::AccountNotFound)?;

        if user.role != claimed {
            return Err(AppError::RoleMismatch);
        }

        if let (Some(given), Some(stored)) = (identifier, user.identifier_for(claimed)) {
            if given != stored {
                return Err(AppError::IdentifierMismatch(match claimed {
                    Role::Student => "Roll number",
                    _ => "Faculty ID",
                }));
            }
        }

        user.merge_profile(identity);
        self.db
            .update_user_fields(&user, &UserField::PROFILE)
            .await?;

        tracing::info!(uid = %user.uid, role = %user.role, "User signed in");
        Ok(user)
    }

    async fn promote_to_admin(&self, identity: &VerifiedIdentity) -> Result<User> {
        let mut user = match self.db.get_user(&identity.subject).await? {
            Some(user) => user,
            None => {
                let fresh = User::from_identity(identity, Role::Admin, DEFAULT_ADMIN_NAME);
                self.db.create_user(&fresh).await?
            }
        };

        user.merge_profile(identity);
        user.role = Role::Admin;
        let mut fields = UserField::PROFILE.to_vec();
        fields.push(UserField::Role);
        self.db.update_user_fields(&user, &fields).await?;

        tracing::info!(uid = %user.uid, "Admin signed in with admin key");
        Ok(user)
    }

    // ─── Derived-admin elevation ─────────────────────────────────

    /// Faculty asks for derived-admin privileges.
    ///
    /// Request ids are `<uid>-<n>` for the requester's n-th request, so two
    /// concurrent requests race for the same id and the store rejects one.
    pub async fn request_elevation(&self, session: &Session) -> Result<ElevationRequest> {
        session.require(Capability::RequestElevation)?;

        let mine = self
            .db
            .list_elevation_requests(&RequestFilter {
                requester_uid: Some(session.uid.clone()),
                status: None,
            })
            .await?;
        if mine.iter().any(|r| r.status == RequestStatus::Pending) {
            return Err(AppError::DuplicateRequest);
        }

        let request = ElevationRequest {
            id: format!("{}-{}", session.uid, mine.len() + 1),
            requester_uid: session.uid.clone(),
            requester_name: session.name.clone(),
            requester_email: session.email.clone(),
            status: RequestStatus::Pending,
            created_at: Utc::now(),
            decided_at: None,
            decided_by: None,
        };
        self.db.create_elevation_request(&request).await?;

        tracing::info!(uid = %session.uid, request_id = %request.id, "Elevation requested");
        Ok(request)
    }

    /// Requests visible to the caller: all of them for admins (pending
    /// first), otherwise only the caller's own.
    pub async fn list_elevation_requests(&self, session: &Session) -> Result<Vec<ElevationRequest>> {
        let filter = if session.role.can(Capability::DecideElevation) {
            RequestFilter::default()
        } else {
            session.require(Capability::RequestElevation)?;
            RequestFilter {
                requester_uid: Some(session.uid.clone()),
                status: None,
            }
        };

        let mut requests = self.db.list_elevation_requests(&filter).await?;
        sort_pending_first(&mut requests);
        Ok(requests)
    }

    /// Admin approves or rejects a pending request.
    ///
    /// `requester_uid` must name the request's requester.
    pub async fn decide_elevation(
        &self,
        session: &Session,
        request_id: &str,
        requester_uid: &str,
        approve: bool,
    ) -> Result<ElevationRequest> {
        session.require(Capability::DecideElevation)?;

        let request = self
            .db
            .get_elevation_request(request_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("request {request_id}")))?;
        if request.requester_uid != requester_uid {
            return Err(AppError::BadRequest(
                "requester does not match request".to_string(),
            ));
        }

        let decision = ElevationDecision {
            approve,
            decided_by: session.uid.clone(),
            decided_at: Utc::now(),
        };
        let decided = self.db.decide_elevation(request_id, &decision).await?;

        tracing::info!(
            request_id,
            requester_uid,
            status = %decided.status,
            admin = %session.uid,
            "Elevation decided"
        );
        Ok(decided)
    }

    /// Directly grant derived-admin to a faculty member.
    pub async fn grant_derived_admin(&self, session: &Session, uid: &str) -> Result<User> {
        self.change_role(session, uid, Role::Faculty, Role::DerivedAdmin)
            .await
    }

    /// Revoke derived-admin, returning the user to faculty.
    pub async fn revoke_derived_admin(&self, session: &Session, uid: &str) -> Result<User> {
        self.change_role(session, uid, Role::DerivedAdmin, Role::Faculty)
            .await
    }

    async fn change_role(&self, session: &Session, uid: &str, from: Role, to: Role) -> Result<User> {
        session.require(Capability::ManageDerivedAdmins)?;

        let user = self.db.set_user_role(uid, from, to).await?;

        tracing::info!(uid, from = %from, to = %to, admin = %session.uid, "Role changed");
        Ok(user)
    }

    /// All users, for admin-capable callers.
    pub async fn list_users(&self, session: &Session) -> Result<Vec<User>> {
        session.require(Capability::ViewUsers)?;
        self.db.list_users().await
    }
}

/// Merge role-specific attributes; `department` follows `branch`.
///
/// Returns the fields that were set.
fn apply_extras(user: &mut User, extras: &ProfileExtras) -> Vec<UserField> {
    let mut touched = Vec::new();
    let clean = |v: &Option<String>| {
        v.as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    if let Some(roll_no) = clean(&extras.roll_no) {
        user.roll_no = Some(roll_no);
        touched.push(UserField::RollNo);
    }
    if let Some(faculty_id) = clean(&extras.faculty_id) {
        user.faculty_id = Some(faculty_id);
        touched.push(UserField::FacultyId);
    }
    if let Some(branch) = clean(&extras.branch) {
        user.department = Some(branch.clone());
        user.branch = Some(branch);
        touched.extend([UserField::Branch, UserField::Department]);
    }
    if let Some(accreditation) = extras.accreditation {
        user.accreditation = Some(accreditation);
        touched.push(UserField::Accreditation);
    }
    touched
}
