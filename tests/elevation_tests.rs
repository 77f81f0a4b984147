// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Derived-admin requests, decisions, grants and revocations.

use std::sync::{Arc, Mutex};

use activity_hub::db::{
    ActivityFilter, Collection, DocumentStore, MemoryStore, RequestFilter, UserField,
};
use activity_hub::error::{AppError, Result};
use activity_hub::middleware::Session;
use activity_hub::models::{
    Activity, ActivityReview, Alert, Complaint, ElevationDecision, ElevationRequest,
    RequestStatus, Role, StoredFile, User, VerifiedIdentity,
};
use activity_hub::services::AccessService;
use async_trait::async_trait;
use axum::http::{Method, StatusCode};
use chrono::Utc;
use serde_json::json;
use tokio::sync::broadcast;

mod common;
use common::{create_test_app, request, seed_user, send, session_token, TestApp};

/// Store that lets another writer get in between a caller's read and its
/// follow-up write.
///
/// - Reading user `uid` approves request `request_id` before returning the
///   (now stale) user.
/// - Listing elevation requests yields to the scheduler before returning.
struct Interleaved {
    inner: Arc<MemoryStore>,
    approve_on_read: Mutex<Option<(String, String)>>,
}

impl Interleaved {
    fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            approve_on_read: Mutex::new(None),
        }
    }

    fn approve_when_read(&self, uid: &str, request_id: &str) {
        *self.approve_on_read.lock().unwrap() = Some((uid.to_string(), request_id.to_string()));
    }
}

#[async_trait]
impl DocumentStore for Interleaved {
    async fn get_user(&self, uid: &str) -> Result<Option<User>> {
        let stale = self.inner.get_user(uid).await?;
        let hook = {
            let mut slot = self.approve_on_read.lock().unwrap();
            match slot.as_ref() {
                Some((target, _)) if target == uid => slot.take(),
                _ => None,
            }
        };
        if let Some((_, request_id)) = hook {
            let decision = ElevationDecision {
                approve: true,
                decided_by: "admin".to_string(),
                decided_at: Utc::now(),
            };
            self.inner.decide_elevation(&request_id, &decision).await?;
        }
        Ok(stale)
    }

    async fn create_user(&self, user: &User) -> Result<User> {
        self.inner.create_user(user).await
    }

    async fn update_user_fields(&self, user: &User, fields: &[UserField]) -> Result<()> {
        self.inner.update_user_fields(user, fields).await
    }

    async fn set_user_role(&self, uid: &str, from: Role, to: Role) -> Result<User> {
        self.inner.set_user_role(uid, from, to).await
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        self.inner.list_users().await
    }

    async fn add_file(&self, file: &StoredFile) -> Result<()> {
        self.inner.add_file(file).await
    }

    async fn get_file(&self, id: &str) -> Result<Option<StoredFile>> {
        self.inner.get_file(id).await
    }

    async fn add_activity(&self, activity: &Activity) -> Result<()> {
        self.inner.add_activity(activity).await
    }

    async fn get_activity(&self, id: &str) -> Result<Option<Activity>> {
        self.inner.get_activity(id).await
    }

    async fn list_activities(&self, filter: &ActivityFilter) -> Result<Vec<Activity>> {
        self.inner.list_activities(filter).await
    }

    async fn review_activity(&self, id: &str, review: &ActivityReview) -> Result<Activity> {
        self.inner.review_activity(id, review).await
    }

    async fn create_elevation_request(&self, request: &ElevationRequest) -> Result<()> {
        self.inner.create_elevation_request(request).await
    }

    async fn get_elevation_request(&self, id: &str) -> Result<Option<ElevationRequest>> {
        self.inner.get_elevation_request(id).await
    }

    async fn list_elevation_requests(
        &self,
        filter: &RequestFilter,
    ) -> Result<Vec<ElevationRequest>> {
        let requests = self.inner.list_elevation_requests(filter).await?;
        tokio::task::yield_now().await;
        Ok(requests)
    }

    async fn decide_elevation(
        &self,
        id: &str,
        decision: &ElevationDecision,
    ) -> Result<ElevationRequest> {
        self.inner.decide_elevation(id, decision).await
    }

    async fn put_complaint(&self, complaint: &Complaint) -> Result<()> {
        self.inner.put_complaint(complaint).await
    }

    async fn get_complaint(&self, id: &str) -> Result<Option<Complaint>> {
        self.inner.get_complaint(id).await
    }

    async fn list_complaints(&self) -> Result<Vec<Complaint>> {
        self.inner.list_complaints().await
    }

    async fn add_alert(&self, alert: &Alert) -> Result<()> {
        self.inner.add_alert(alert).await
    }

    async fn list_alerts(&self) -> Result<Vec<Alert>> {
        self.inner.list_alerts().await
    }

    fn changes(&self) -> broadcast::Receiver<Collection> {
        self.inner.changes()
    }
}

async fn file_request(app: &TestApp, uid: &str) -> String {
    let (status, body) = send(
        app,
        request(
            Method::POST,
            "/api/elevation-requests",
            Some(&session_token(uid)),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "request failed: {body}");
    assert_eq!(body["status"], "pending");
    body["id"].as_str().unwrap().to_string()
}

async fn decide(app: &TestApp, request_id: &str, requester: &str, approve: bool) -> (StatusCode, serde_json::Value) {
    send(
        app,
        request(
            Method::POST,
            &format!("/api/elevation-requests/{request_id}/decision"),
            Some(&session_token("admin")),
            Some(json!({ "requesterUid": requester, "approve": approve })),
        ),
    )
    .await
}

#[tokio::test]
async fn test_only_faculty_may_request() {
    let app = create_test_app();
    seed_user(&app.store, "s1", Role::Student).await;

    let (status, _) = send(
        &app,
        request(
            Method::POST,
            "/api/elevation-requests",
            Some(&session_token("s1")),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_duplicate_pending_request_rejected() {
    let app = create_test_app();
    seed_user(&app.store, "f1", Role::Faculty).await;
    file_request(&app, "f1").await;

    let (status, body) = send(
        &app,
        request(
            Method::POST,
            "/api/elevation-requests",
            Some(&session_token("f1")),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "duplicate_request");
}

#[tokio::test]
async fn test_approval_promotes_requester() {
    let app = create_test_app();
    seed_user(&app.store, "f1", Role::Faculty).await;
    seed_user(&app.store, "admin", Role::Admin).await;
    let id = file_request(&app, "f1").await;

    let (status, body) = decide(&app, &id, "f1", true).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "approved");

    let user = app.store.get_user("f1").await.unwrap().unwrap();
    assert_eq!(user.role, Role::DerivedAdmin);

    // Derived admins review and see analytics but cannot manage elevation.
    let token = session_token("f1");
    let (status, _) = send(&app, request(Method::GET, "/api/stats", Some(&token), None)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = decide(&app, &id, "f1", false).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, _) = send(
        &app,
        request(
            Method::DELETE,
            "/api/users/f1/derived-admin",
            Some(&token),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_rejection_leaves_role() {
    let app = create_test_app();
    seed_user(&app.store, "f1", Role::Faculty).await;
    seed_user(&app.store, "admin", Role::Admin).await;
    let id = file_request(&app, "f1").await;

    let (status, body) = decide(&app, &id, "f1", false).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "rejected");
    assert_eq!(
        app.store.get_user("f1").await.unwrap().unwrap().role,
        Role::Faculty
    );

    // A decided request frees the requester to ask again.
    file_request(&app, "f1").await;
}

#[tokio::test]
async fn test_requester_mismatch() {
    let app = create_test_app();
    seed_user(&app.store, "f1", Role::Faculty).await;
    seed_user(&app.store, "admin", Role::Admin).await;
    let id = file_request(&app, "f1").await;

    let (status, _) = decide(&app, &id, "someone-else", true).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        app.store.get_user("f1").await.unwrap().unwrap().role,
        Role::Faculty
    );
}

#[tokio::test]
async fn test_failed_promotion_changes_nothing() {
    let app = create_test_app();
    seed_user(&app.store, "f1", Role::Faculty).await;
    seed_user(&app.store, "admin", Role::Admin).await;
    let id = file_request(&app, "f1").await;

    app.store.fail_writes_to(Collection::Users);
    let (status, _) = decide(&app, &id, "f1", true).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    app.store.clear_write_failures();
    let request = app.store.get_elevation_request(&id).await.unwrap().unwrap();
    assert_eq!(request.status, RequestStatus::Pending);
    assert_eq!(
        app.store.get_user("f1").await.unwrap().unwrap().role,
        Role::Faculty
    );

    // Retrying after the outage succeeds.
    let (status, _) = decide(&app, &id, "f1", true).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_admin_list_is_pending_first() {
    let app = create_test_app();
    seed_user(&app.store, "f1", Role::Faculty).await;
    seed_user(&app.store, "f2", Role::Faculty).await;
    seed_user(&app.store, "admin", Role::Admin).await;

    let first = file_request(&app, "f1").await;
    decide(&app, &first, "f1", false).await;
    file_request(&app, "f2").await;

    let (status, body) = send(
        &app,
        request(
            Method::GET,
            "/api/elevation-requests",
            Some(&session_token("admin")),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let list = body.as_array().unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0]["status"], "pending");
    assert_eq!(list[1]["status"], "rejected");

    // Faculty see only their own.
    let (_, body) = send(
        &app,
        request(
            Method::GET,
            "/api/elevation-requests",
            Some(&session_token("f2")),
            None,
        ),
    )
    .await;
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_direct_grant_and_revoke() {
    let app = create_test_app();
    seed_user(&app.store, "f1", Role::Faculty).await;
    seed_user(&app.store, "s1", Role::Student).await;
    seed_user(&app.store, "admin", Role::Admin).await;
    let admin = session_token("admin");

    let (status, body) = send(
        &app,
        request(Method::POST, "/api/users/f1/derived-admin", Some(&admin), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"], "derived-admin");

    let (status, body) = send(
        &app,
        request(Method::DELETE, "/api/users/f1/derived-admin", Some(&admin), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"], "faculty");

    // Only faculty can be elevated.
    let (status, _) = send(
        &app,
        request(Method::POST, "/api/users/s1/derived-admin", Some(&admin), None),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(
        &app,
        request(Method::POST, "/api/users/nobody/derived-admin", Some(&admin), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let pending = app
        .store
        .list_elevation_requests(&RequestFilter::default())
        .await
        .unwrap();
    assert!(pending.is_empty());
}

#[tokio::test]
async fn test_sign_in_keeps_approval_that_lands_mid_flight() {
    let store = Arc::new(MemoryStore::new());
    seed_user(&store, "f1", Role::Faculty).await;
    store
        .create_elevation_request(&ElevationRequest {
            id: "f1-1".to_string(),
            requester_uid: "f1".to_string(),
            requester_name: "User f1".to_string(),
            requester_email: "f1@uni.edu".to_string(),
            status: RequestStatus::Pending,
            created_at: Utc::now(),
            decided_at: None,
            decided_by: None,
        })
        .await
        .unwrap();

    let interleaved = Arc::new(Interleaved::new(store.clone()));
    interleaved.approve_when_read("f1", "f1-1");
    let access = AccessService::new(interleaved, "s3cret");

    let identity = VerifiedIdentity {
        subject: "f1".to_string(),
        display_name: "Prof Renamed".to_string(),
        email: "f1@uni.edu".to_string(),
        photo_url: None,
    };
    access
        .sign_in_existing(&identity, Role::Faculty, None)
        .await
        .unwrap();

    // The profile refresh landed without reverting the promotion.
    let user = store.get_user("f1").await.unwrap().unwrap();
    assert_eq!(user.name, "Prof Renamed");
    assert_eq!(user.role, Role::DerivedAdmin);
    let decided = store.get_elevation_request("f1-1").await.unwrap().unwrap();
    assert_eq!(decided.status, RequestStatus::Approved);
}

#[tokio::test]
async fn test_concurrent_requests_file_one() {
    let store = Arc::new(MemoryStore::new());
    let faculty = seed_user(&store, "f1", Role::Faculty).await;
    let access = AccessService::new(Arc::new(Interleaved::new(store.clone())), "s3cret");
    let session = Session::from_user(&faculty);

    // Both calls check for a pending request before either one writes.
    let (first, second) = tokio::join!(
        access.request_elevation(&session),
        access.request_elevation(&session)
    );

    let outcomes = [first, second];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(outcomes
        .iter()
        .any(|r| matches!(r, Err(AppError::DuplicateRequest))));

    let mine = store
        .list_elevation_requests(&RequestFilter {
            requester_uid: Some("f1".to_string()),
            status: None,
        })
        .await
        .unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].id, "f1-1");
}
