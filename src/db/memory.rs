// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Process-local document store.
//!
//! Used for tests and `STORE_BACKEND=memory` local runs. Supports failure
//! injection so tests can exercise backend outages and partial-write
//! scenarios.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::db::{
    check_role, ActivityFilter, ChangeFeed, Collection, DocumentStore, RequestFilter, UserField,
};
use crate::error::{AppError, Result};
use crate::models::{
    Activity, ActivityReview, ActivityStatus, Alert, Complaint, ElevationDecision,
    ElevationRequest, RequestStatus, Role, StoredFile, User,
};

#[derive(Default)]
struct Collections {
    users: HashMap<String, User>,
    activities: HashMap<String, Activity>,
    requests: HashMap<String, ElevationRequest>,
    complaints: HashMap<String, Complaint>,
    files: HashMap<String, StoredFile>,
    alerts: HashMap<String, Alert>,
}

#[derive(Default)]
struct Faults {
    unavailable: bool,
    failing_writes: HashSet<Collection>,
}

/// In-memory [`DocumentStore`].
pub struct MemoryStore {
    data: RwLock<Collections>,
    faults: RwLock<Faults>,
    feed: ChangeFeed,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            data: RwLock::new(Collections::default()),
            faults: RwLock::new(Faults::default()),
            feed: ChangeFeed::new(),
        }
    }

    /// Make every subsequent write to `collection` fail.
    pub fn fail_writes_to(&self, collection: Collection) {
        if let Ok(mut faults) = self.faults.write() {
            faults.failing_writes.insert(collection);
        }
    }

    /// Clear all injected write failures.
    pub fn clear_write_failures(&self) {
        if let Ok(mut faults) = self.faults.write() {
            faults.failing_writes.clear();
        }
    }

    /// Simulate the backend going away (every call fails).
    pub fn set_available(&self, available: bool) {
        if let Ok(mut faults) = self.faults.write() {
            faults.unavailable = !available;
        }
    }

    fn check_available(&self) -> Result<()> {
        let faults = self.faults.read().map_err(|_| poisoned())?;
        if faults.unavailable {
            return Err(AppError::BackendUnavailable(
                "memory store offline".to_string(),
            ));
        }
        Ok(())
    }

    fn check_writable(&self, collection: Collection) -> Result<()> {
        self.check_available()?;
        let faults = self.faults.read().map_err(|_| poisoned())?;
        if faults.failing_writes.contains(&collection) {
            return Err(AppError::BackendUnavailable(format!(
                "injected write failure on {}",
                collection.name()
            )));
        }
        Ok(())
    }

    fn read<T>(&self, f: impl FnOnce(&Collections) -> T) -> Result<T> {
        self.check_available()?;
        let data = self.data.read().map_err(|_| poisoned())?;
        Ok(f(&data))
    }

    fn write(&self, collection: Collection, f: impl FnOnce(&mut Collections)) -> Result<()> {
        self.try_write(collection, |data| {
            f(data);
            Ok(())
        })
    }

    /// Run a guarded write under the lock; announce it only if `f` succeeds.
    fn try_write<T>(
        &self,
        collection: Collection,
        f: impl FnOnce(&mut Collections) -> Result<T>,
    ) -> Result<T> {
        self.check_writable(collection)?;
        let result = {
            let mut data = self.data.write().map_err(|_| poisoned())?;
            f(&mut data)?
        };
        self.feed.notify(collection);
        Ok(result)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned() -> AppError {
    AppError::Internal(anyhow::anyhow!("memory store lock poisoned"))
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get_user(&self, uid: &str) -> Result<Option<User>> {
        self.read(|c| c.users.get(uid).cloned())
    }

    async fn create_user(&self, user: &User) -> Result<User> {
        self.try_write(Collection::Users, |c| {
            Ok(c.users
                .entry(user.uid.clone())
                .or_insert_with(|| user.clone())
                .clone())
        })
    }

    async fn update_user_fields(&self, user: &User, fields: &[UserField]) -> Result<()> {
        self.try_write(Collection::Users, |c| {
            let stored = c
                .users
                .get_mut(&user.uid)
                .ok_or_else(|| AppError::NotFound(format!("user {}", user.uid)))?;
            for field in fields {
                field.copy(user, stored);
            }
            Ok(())
        })
    }

    async fn set_user_role(&self, uid: &str, from: Role, to: Role) -> Result<User> {
        self.try_write(Collection::Users, |c| {
            let user = c
                .users
                .get_mut(uid)
                .ok_or_else(|| AppError::NotFound(format!("user {uid}")))?;
            check_role(user, from)?;
            user.role = to;
            Ok(user.clone())
        })
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        self.read(|c| {
            let mut users: Vec<User> = c.users.values().cloned().collect();
            users.sort_by(|a, b| a.name.cmp(&b.name));
            users
        })
    }

    async fn add_file(&self, file: &StoredFile) -> Result<()> {
        self.write(Collection::Files, |c| {
            c.files.insert(file.id.clone(), file.clone());
        })
    }

    async fn get_file(&self, id: &str) -> Result<Option<StoredFile>> {
        self.read(|c| c.files.get(id).cloned())
    }

    async fn add_activity(&self, activity: &Activity) -> Result<()> {
        self.write(Collection::Activities, |c| {
            c.activities.insert(activity.id.clone(), activity.clone());
        })
    }

    async fn get_activity(&self, id: &str) -> Result<Option<Activity>> {
        self.read(|c| c.activities.get(id).cloned())
    }

    async fn list_activities(&self, filter: &ActivityFilter) -> Result<Vec<Activity>> {
        self.read(|c| {
            let mut activities: Vec<Activity> = c
                .activities
                .values()
                .filter(|a| filter.matches(a))
                .cloned()
                .collect();
            activities.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            activities
        })
    }

    async fn review_activity(&self, id: &str, review: &ActivityReview) -> Result<Activity> {
        self.try_write(Collection::Activities, |c| {
            let activity = c
                .activities
                .get_mut(id)
                .ok_or_else(|| AppError::NotFound(format!("activity {id}")))?;
            if activity.status != ActivityStatus::Pending {
                return Err(AppError::InvalidTransition(format!(
                    "activity is already {}",
                    activity.status
                )));
            }
            activity.apply_review(review);
            Ok(activity.clone())
        })
    }

    async fn create_elevation_request(&self, request: &ElevationRequest) -> Result<()> {
        self.try_write(Collection::ElevationRequests, |c| {
            if c.requests.contains_key(&request.id) {
                return Err(AppError::DuplicateRequest);
            }
            c.requests.insert(request.id.clone(), request.clone());
            Ok(())
        })
    }

    async fn get_elevation_request(&self, id: &str) -> Result<Option<ElevationRequest>> {
        self.read(|c| c.requests.get(id).cloned())
    }

    async fn list_elevation_requests(
        &self,
        filter: &RequestFilter,
    ) -> Result<Vec<ElevationRequest>> {
        self.read(|c| {
            let mut requests: Vec<ElevationRequest> = c
                .requests
                .values()
                .filter(|r| filter.matches(r))
                .cloned()
                .collect();
            requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            requests
        })
    }

    async fn decide_elevation(
        &self,
        id: &str,
        decision: &ElevationDecision,
    ) -> Result<ElevationRequest> {
        self.check_writable(Collection::ElevationRequests)?;
        if decision.approve {
            self.check_writable(Collection::Users)?;
        }

        let decided = {
            let mut data = self.data.write().map_err(|_| poisoned())?;

            // Stage both documents before touching either.
            let mut request = data
                .requests
                .get(id)
                .cloned()
                .ok_or_else(|| AppError::NotFound(format!("request {id}")))?;
            if request.status != RequestStatus::Pending {
                return Err(AppError::InvalidTransition(format!(
                    "request is already {}",
                    request.status
                )));
            }
            request.apply_decision(decision);

            let promoted = if decision.approve {
                let mut user = data
                    .users
                    .get(&request.requester_uid)
                    .cloned()
                    .ok_or_else(|| AppError::NotFound(format!("user {}", request.requester_uid)))?;
                user.role = Role::DerivedAdmin;
                Some(user)
            } else {
                None
            };

            data.requests.insert(request.id.clone(), request.clone());
            if let Some(user) = promoted {
                data.users.insert(user.uid.clone(), user);
            }
            request
        };

        self.feed.notify(Collection::ElevationRequests);
        if decision.approve {
            self.feed.notify(Collection::Users);
        }
        Ok(decided)
    }

    async fn put_complaint(&self, complaint: &Complaint) -> Result<()> {
        self.write(Collection::Complaints, |c| {
            c.complaints.insert(complaint.id.clone(), complaint.clone());
        })
    }

    async fn get_complaint(&self, id: &str) -> Result<Option<Complaint>> {
        self.read(|c| c.complaints.get(id).cloned())
    }

    async fn list_complaints(&self) -> Result<Vec<Complaint>> {
        self.read(|c| {
            let mut complaints: Vec<Complaint> = c.complaints.values().cloned().collect();
            complaints.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            complaints
        })
    }

    async fn add_alert(&self, alert: &Alert) -> Result<()> {
        self.write(Collection::Alerts, |c| {
            c.alerts.insert(alert.id.clone(), alert.clone());
        })
    }

    async fn list_alerts(&self) -> Result<Vec<Alert>> {
        self.read(|c| {
            let mut alerts: Vec<Alert> = c.alerts.values().cloned().collect();
            alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            alerts
        })
    }

    fn changes(&self) -> broadcast::Receiver<Collection> {
        self.feed.subscribe()
    }
}
