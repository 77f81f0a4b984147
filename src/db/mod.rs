// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Database layer.
//!
//! [`DocumentStore`] is the narrow interface the services use. It is backed
//! by Firestore in production and by [`MemoryStore`] in tests and local runs.

pub mod firestore;
pub mod memory;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::Result;
use crate::models::{
    Activity, ActivityReview, ActivityStatus, Alert, Complaint, ElevationDecision,
    ElevationRequest, RequestStatus, Role, StoredFile, User,
};

pub use firestore::FirestoreDb;
pub use memory::MemoryStore;

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    pub const ACTIVITIES: &str = "activities";
    pub const ELEVATION_REQUESTS: &str = "derivedAdminRequests";
    pub const COMPLAINTS: &str = "complaints";
    pub const FILES: &str = "files";
    pub const ALERTS: &str = "alerts";
}

/// Collections that emit change notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Users,
    Activities,
    ElevationRequests,
    Complaints,
    Files,
    Alerts,
}

impl Collection {
    pub fn name(self) -> &'static str {
        match self {
            Collection::Users => collections::USERS,
            Collection::Activities => collections::ACTIVITIES,
            Collection::ElevationRequests => collections::ELEVATION_REQUESTS,
            Collection::Complaints => collections::COMPLAINTS,
            Collection::Files => collections::FILES,
            Collection::Alerts => collections::ALERTS,
        }
    }
}

impl std::str::FromStr for Collection {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            collections::USERS => Ok(Collection::Users),
            collections::ACTIVITIES => Ok(Collection::Activities),
            collections::ELEVATION_REQUESTS => Ok(Collection::ElevationRequests),
            collections::COMPLAINTS => Ok(Collection::Complaints),
            collections::FILES => Ok(Collection::Files),
            collections::ALERTS => Ok(Collection::Alerts),
            other => Err(format!("unknown collection: {other}")),
        }
    }
}

/// User document fields that a partial write may touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UserField {
    Name,
    Email,
    PhotoUrl,
    Role,
    RollNo,
    FacultyId,
    Branch,
    Department,
    Accreditation,
}

impl UserField {
    /// Fields refreshed from the identity provider on every sign-in.
    pub const PROFILE: [UserField; 3] = [UserField::Name, UserField::Email, UserField::PhotoUrl];

    /// Document field path (the serialized name).
    pub fn path(self) -> &'static str {
        match self {
            UserField::Name => "name",
            UserField::Email => "email",
            UserField::PhotoUrl => "photoURL",
            UserField::Role => "role",
            UserField::RollNo => "rollNo",
            UserField::FacultyId => "facultyId",
            UserField::Branch => "branch",
            UserField::Department => "department",
            UserField::Accreditation => "accreditation",
        }
    }

    /// Copy this field from `from` onto `to`.
    pub fn copy(self, from: &User, to: &mut User) {
        match self {
            UserField::Name => to.name.clone_from(&from.name),
            UserField::Email => to.email.clone_from(&from.email),
            UserField::PhotoUrl => to.photo_url.clone_from(&from.photo_url),
            UserField::Role => to.role = from.role,
            UserField::RollNo => to.roll_no.clone_from(&from.roll_no),
            UserField::FacultyId => to.faculty_id.clone_from(&from.faculty_id),
            UserField::Branch => to.branch.clone_from(&from.branch),
            UserField::Department => to.department.clone_from(&from.department),
            UserField::Accreditation => to.accreditation = from.accreditation,
        }
    }
}

/// Guard for a role transition: the stored role must still be `from`.
pub(crate) fn check_role(user: &User, from: Role) -> Result<()> {
    if user.role != from {
        return Err(crate::error::AppError::InvalidTransition(format!(
            "user is {}, expected {}",
            user.role, from
        )));
    }
    Ok(())
}

/// Equality filters for activity listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivityFilter {
    pub student_id: Option<String>,
    pub status: Option<ActivityStatus>,
}

impl ActivityFilter {
    pub fn matches(&self, activity: &Activity) -> bool {
        self.student_id
            .as_deref()
            .is_none_or(|id| activity.student_id == id)
            && self.status.is_none_or(|s| activity.status == s)
    }
}

/// Equality filters for elevation request listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestFilter {
    pub requester_uid: Option<String>,
    pub status: Option<RequestStatus>,
}

impl RequestFilter {
    pub fn matches(&self, request: &ElevationRequest) -> bool {
        self.requester_uid
            .as_deref()
            .is_none_or(|uid| request.requester_uid == uid)
            && self.status.is_none_or(|s| request.status == s)
    }
}

/// Generate a new document ID.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Buffered change notifications per store.
const CHANGE_BUFFER_SIZE: usize = 256;

/// Fan-out of "collection X changed" notifications to live subscribers.
#[derive(Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<Collection>,
}

impl ChangeFeed {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(CHANGE_BUFFER_SIZE);
        Self { tx }
    }

    /// Announce a committed write. Dropped silently when nobody listens.
    pub fn notify(&self, collection: Collection) {
        if let Ok(receivers) = self.tx.send(collection) {
            tracing::debug!(collection = collection.name(), receivers, "Change notified");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Collection> {
        self.tx.subscribe()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

/// Typed document operations used by the services.
///
/// Every write that succeeds is announced on [`DocumentStore::changes`].
#[async_trait]
pub trait DocumentStore: Send + Sync {
    // ─── Users ───────────────────────────────────────────────────
    async fn get_user(&self, uid: &str) -> Result<Option<User>>;
    /// Create the user document unless one already exists.
    ///
    /// Returns the stored document: `user` when it was created, otherwise
    /// the record that got there first.
    async fn create_user(&self, user: &User) -> Result<User>;
    /// Write only `fields` of `user` onto the existing document.
    ///
    /// Other fields, the role in particular, keep whatever is stored. Fails
    /// with `NotFound` when the document does not exist.
    async fn update_user_fields(&self, user: &User, fields: &[UserField]) -> Result<()>;
    /// Change a user's role if and only if it is still `from`.
    ///
    /// The role is re-read inside the write; anything else fails with
    /// `InvalidTransition` and nothing is written.
    async fn set_user_role(&self, uid: &str, from: Role, to: Role) -> Result<User>;
    async fn list_users(&self) -> Result<Vec<User>>;

    // ─── Files ───────────────────────────────────────────────────
    async fn add_file(&self, file: &StoredFile) -> Result<()>;
    async fn get_file(&self, id: &str) -> Result<Option<StoredFile>>;

    // ─── Activities ──────────────────────────────────────────────
    async fn add_activity(&self, activity: &Activity) -> Result<()>;
    async fn get_activity(&self, id: &str) -> Result<Option<Activity>>;
    /// Matching activities, newest first.
    async fn list_activities(&self, filter: &ActivityFilter) -> Result<Vec<Activity>>;
    /// Apply a review if and only if the activity is still pending.
    ///
    /// The status is re-read inside the write; a non-pending activity fails
    /// with `InvalidTransition` and nothing is written.
    async fn review_activity(&self, id: &str, review: &ActivityReview) -> Result<Activity>;

    // ─── Elevation requests ──────────────────────────────────────
    /// Create a request under its id; an existing id fails with
    /// `DuplicateRequest`.
    async fn create_elevation_request(&self, request: &ElevationRequest) -> Result<()>;
    async fn get_elevation_request(&self, id: &str) -> Result<Option<ElevationRequest>>;
    async fn list_elevation_requests(&self, filter: &RequestFilter)
        -> Result<Vec<ElevationRequest>>;
    /// Decide a pending request.
    ///
    /// Approval also sets the requester's role to derived-admin; both writes
    /// commit together or not at all.
    async fn decide_elevation(
        &self,
        id: &str,
        decision: &ElevationDecision,
    ) -> Result<ElevationRequest>;

    // ─── Complaints and alerts ───────────────────────────────────
    async fn put_complaint(&self, complaint: &Complaint) -> Result<()>;
    async fn get_complaint(&self, id: &str) -> Result<Option<Complaint>>;
    /// All complaints, newest first.
    async fn list_complaints(&self) -> Result<Vec<Complaint>>;
    async fn add_alert(&self, alert: &Alert) -> Result<()>;
    /// All alerts, newest first.
    async fn list_alerts(&self) -> Result<Vec<Alert>>;

    /// Subscribe to change notifications.
    fn changes(&self) -> broadcast::Receiver<Collection>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_names_round_trip() {
        for collection in [
            Collection::Users,
            Collection::Activities,
            Collection::ElevationRequests,
            Collection::Complaints,
            Collection::Files,
            Collection::Alerts,
        ] {
            assert_eq!(collection.name().parse::<Collection>(), Ok(collection));
        }
        assert!("tokens".parse::<Collection>().is_err());
    }

    #[test]
    fn test_new_id_is_unique() {
        assert_ne!(new_id(), new_id());
        assert_eq!(new_id().len(), 32);
    }

    #[test]
    fn test_user_field_copy_touches_one_field() {
        let identity = crate::models::VerifiedIdentity {
            subject: "u1".to_string(),
            display_name: "Ada".to_string(),
            email: "ada@uni.edu".to_string(),
            photo_url: None,
        };
        let mut stored = User::from_identity(&identity, Role::DerivedAdmin, "Unknown User");
        let mut stale = stored.clone();
        stale.role = Role::Faculty;
        stale.name = "Ada L.".to_string();

        for field in UserField::PROFILE {
            field.copy(&stale, &mut stored);
        }
        assert_eq!(stored.name, "Ada L.");
        assert_eq!(stored.role, Role::DerivedAdmin);
    }

    #[tokio::test]
    async fn test_change_feed_delivers_to_subscribers() {
        let feed = ChangeFeed::new();
        let mut rx = feed.subscribe();
        feed.notify(Collection::Alerts);
        assert_eq!(rx.recv().await.unwrap(), Collection::Alerts);
    }
}
