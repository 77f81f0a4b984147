// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides the [`DocumentStore`] operations for:
//! - Users (profiles and roles)
//! - Activities (submissions and reviews)
//! - Derived-admin requests
//! - Complaints, alerts and inline files
//!
//! Change notifications come from a Firestore listener on every watched
//! collection, so writes made by other instances reach live subscribers too.

use std::sync::Arc;

use async_trait::async_trait;
use firestore::errors::FirestoreError;
use firestore::{
    FirestoreListenEvent, FirestoreListener, FirestoreListenerTarget,
    FirestoreMemListenStateStorage, FirestoreWritePrecondition,
};
use tokio::sync::{broadcast, Mutex};

use crate::db::{
    check_role, collections, ActivityFilter, ChangeFeed, Collection, DocumentStore,
    RequestFilter, UserField,
};
use crate::error::{AppError, Result};
use crate::models::{
    Activity, ActivityReview, ActivityStatus, Alert, Complaint, ElevationDecision,
    ElevationRequest, RequestStatus, Role, StoredFile, User,
};

/// Collections watched for live snapshots. `files` is never subscribed to
/// and would stream every attachment payload.
const WATCHED: [Collection; 5] = [
    Collection::Users,
    Collection::Activities,
    Collection::ElevationRequests,
    Collection::Complaints,
    Collection::Alerts,
];

type ChangeListener = FirestoreListener<firestore::FirestoreDb, FirestoreMemListenStateStorage>;

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: firestore::FirestoreDb,
    feed: ChangeFeed,
    /// Kept alive for the lifetime of the client; dropping it stops the feed.
    listener: Arc<Mutex<ChangeListener>>,
}

fn backend(context: &str, e: impl std::fmt::Display) -> AppError {
    AppError::BackendUnavailable(format!("{context}: {e}"))
}

/// Collection of a changed document, from its full resource name
/// (`projects/p/databases/d/documents/<collection>/<id>`).
fn changed_collection(document_name: &str) -> Option<Collection> {
    document_name.rsplit('/').nth(1)?.parse().ok()
}

fn listen_event_collection(event: &FirestoreListenEvent) -> Option<Collection> {
    match event {
        FirestoreListenEvent::DocumentChange(change) => change
            .document
            .as_ref()
            .and_then(|doc| changed_collection(&doc.name)),
        FirestoreListenEvent::DocumentDelete(delete) => changed_collection(&delete.document),
        FirestoreListenEvent::DocumentRemove(remove) => changed_collection(&remove.document),
        _ => None,
    }
}

/// Start a listener that turns Firestore change events into feed notifications.
async fn listen_for_changes(
    client: &firestore::FirestoreDb,
    feed: ChangeFeed,
) -> Result<ChangeListener> {
    let mut listener = client
        .create_listener(FirestoreMemListenStateStorage::new())
        .await
        .map_err(|e| backend("Failed to create change listener", e))?;

    for (target_id, collection) in (1u32..).zip(WATCHED) {
        client
            .fluent()
            .select()
            .from(collection.name())
            .listen()
            .add_target(FirestoreListenerTarget::new(target_id), &mut listener)
            .map_err(|e| backend("Failed to add listen target", e))?;
    }

    listener
        .start(move |event| {
            let feed = feed.clone();
            async move {
                if let Some(collection) = listen_event_collection(&event) {
                    feed.notify(collection);
                }
                Ok(())
            }
        })
        .await
        .map_err(|e| backend("Failed to start change listener", e))?;

    Ok(listener)
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self> {
        // The emulator rejects real credentials; use an unauthenticated client.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| backend("Failed to connect to Firestore", e))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Self::with_client(client).await
    }

    async fn with_client(client: firestore::FirestoreDb) -> Result<Self> {
        let feed = ChangeFeed::new();
        let listener = listen_for_changes(&client, feed.clone()).await?;

        Ok(Self {
            client,
            feed,
            listener: Arc::new(Mutex::new(listener)),
        })
    }

    /// Stop the change listener. Live subscribers see no further snapshots.
    pub async fn shutdown(&self) -> Result<()> {
        self.listener
            .lock()
            .await
            .shutdown()
            .await
            .map_err(|e| backend("Failed to stop change listener", e))
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| backend("Failed to connect to Firestore Emulator", e))?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Self::with_client(client).await
    }

    async fn get_doc<T>(&self, collection: &str, id: &str) -> Result<Option<T>>
    where
        for<'de> T: serde::Deserialize<'de> + Send,
    {
        self.client
            .fluent()
            .select()
            .by_id_in(collection)
            .obj()
            .one(id)
            .await
            .map_err(|e| backend(collection, e))
    }

    async fn set_doc<T>(&self, collection: Collection, id: &str, doc: &T) -> Result<()>
    where
        T: serde::Serialize + Sync + Send,
        for<'de> T: serde::Deserialize<'de>,
    {
        let _: () = self
            .client
            .fluent()
            .update()
            .in_col(collection.name())
            .document_id(id)
            .object(doc)
            .execute()
            .await
            .map_err(|e| backend(collection.name(), e))?;
        Ok(())
    }

    /// Insert `doc` under `id`; `Ok(false)` when the document already exists.
    async fn insert_doc<T>(&self, collection: Collection, id: &str, doc: &T) -> Result<bool>
    where
        T: serde::Serialize + Sync + Send,
        for<'de> T: serde::Deserialize<'de>,
    {
        let inserted: std::result::Result<(), FirestoreError> = self
            .client
            .fluent()
            .insert()
            .into(collection.name())
            .document_id(id)
            .object(doc)
            .execute()
            .await;

        match inserted {
            Ok(()) => Ok(true),
            Err(FirestoreError::DataConflictError(_)) => Ok(false),
            Err(e) => Err(backend(collection.name(), e)),
        }
    }

    async fn list_all<T>(&self, collection: &str) -> Result<Vec<T>>
    where
        for<'de> T: serde::Deserialize<'de> + Send,
    {
        self.client
            .fluent()
            .select()
            .from(collection)
            .obj()
            .query()
            .await
            .map_err(|e| backend(collection, e))
    }

    /// Client whose reads join `transaction`, so they take part in conflict
    /// detection at commit.
    fn transactional_reader(
        &self,
        transaction: &firestore::FirestoreTransaction<'_>,
    ) -> firestore::FirestoreDb {
        self.client.clone_with_consistency_selector(
            firestore::FirestoreConsistencySelector::Transaction(
                transaction.transaction_id().clone(),
            ),
        )
    }
}

#[async_trait]
impl DocumentStore for FirestoreDb {
    // ─── User Operations ─────────────────────────────────────────

    async fn get_user(&self, uid: &str) -> Result<Option<User>> {
        self.get_doc(collections::USERS, uid).await
    }

    async fn create_user(&self, user: &User) -> Result<User> {
        if self.insert_doc(Collection::Users, &user.uid, user).await? {
            return Ok(user.clone());
        }
        self.get_user(&user.uid)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user {}", user.uid)))
    }

    async fn update_user_fields(&self, user: &User, fields: &[UserField]) -> Result<()> {
        let paths: Vec<&str> = fields.iter().map(|f| f.path()).collect();

        let updated: std::result::Result<(), FirestoreError> = self
            .client
            .fluent()
            .update()
            .fields(paths)
            .in_col(collections::USERS)
            .precondition(FirestoreWritePrecondition::Exists(true))
            .document_id(&user.uid)
            .object(user)
            .execute()
            .await;

        match updated {
            Ok(()) => Ok(()),
            Err(FirestoreError::DataNotFoundError(_)) => {
                Err(AppError::NotFound(format!("user {}", user.uid)))
            }
            Err(e) => Err(backend(collections::USERS, e)),
        }
    }

    async fn set_user_role(&self, uid: &str, from: Role, to: Role) -> Result<User> {
        let mut transaction = self
            .client
            .begin_transaction()
            .await
            .map_err(|e| backend("Failed to begin transaction", e))?;

        let current: Option<User> = self
            .transactional_reader(&transaction)
            .fluent()
            .select()
            .by_id_in(collections::USERS)
            .obj()
            .one(uid)
            .await
            .map_err(|e| backend("Failed to read user in transaction", e))?;

        let Some(mut user) = current else {
            let _ = transaction.rollback().await;
            return Err(AppError::NotFound(format!("user {uid}")));
        };
        if let Err(e) = check_role(&user, from) {
            let _ = transaction.rollback().await;
            return Err(e);
        }
        user.role = to;

        self.client
            .fluent()
            .update()
            .fields([UserField::Role.path()])
            .in_col(collections::USERS)
            .document_id(uid)
            .object(&user)
            .add_to_transaction(&mut transaction)
            .map_err(|e| backend("Failed to add role change to transaction", e))?;

        transaction
            .commit()
            .await
            .map_err(|e| backend("Role change commit failed", e))?;

        Ok(user)
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let mut users: Vec<User> = self.list_all(collections::USERS).await?;
        users.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(users)
    }

    // ─── File Operations ─────────────────────────────────────────

    async fn add_file(&self, file: &StoredFile) -> Result<()> {
        self.set_doc(Collection::Files, &file.id, file).await
    }

    async fn get_file(&self, id: &str) -> Result<Option<StoredFile>> {
        self.get_doc(collections::FILES, id).await
    }

    // ─── Activity Operations ─────────────────────────────────────

    async fn add_activity(&self, activity: &Activity) -> Result<()> {
        self.set_doc(Collection::Activities, &activity.id, activity)
            .await
    }

    async fn get_activity(&self, id: &str) -> Result<Option<Activity>> {
        self.get_doc(collections::ACTIVITIES, id).await
    }

    async fn list_activities(&self, filter: &ActivityFilter) -> Result<Vec<Activity>> {
        let student_id = filter.student_id.clone();
        let status = filter.status.map(|s| s.as_str());

        // No composite indexes exist for these filters; order client-side.
        let mut activities: Vec<Activity> = self
            .client
            .fluent()
            .select()
            .from(collections::ACTIVITIES)
            .filter(move |q| {
                q.for_all([
                    student_id
                        .as_ref()
                        .and_then(|id| q.field("studentId").eq(id.clone())),
                    status.and_then(|s| q.field("status").eq(s)),
                ])
            })
            .obj()
            .query()
            .await
            .map_err(|e| backend(collections::ACTIVITIES, e))?;

        activities.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(activities)
    }

    async fn review_activity(&self, id: &str, review: &ActivityReview) -> Result<Activity> {
        let mut transaction = self
            .client
            .begin_transaction()
            .await
            .map_err(|e| backend("Failed to begin transaction", e))?;

        // 1. Re-read the activity inside the transaction
        let current: Option<Activity> = self
            .transactional_reader(&transaction)
            .fluent()
            .select()
            .by_id_in(collections::ACTIVITIES)
            .obj()
            .one(id)
            .await
            .map_err(|e| backend("Failed to read activity in transaction", e))?;

        let Some(mut activity) = current else {
            let _ = transaction.rollback().await;
            return Err(AppError::NotFound(format!("activity {id}")));
        };

        // 2. Guard: a concurrent reviewer may have decided already
        if activity.status != ActivityStatus::Pending {
            let _ = transaction.rollback().await;
            return Err(AppError::InvalidTransition(format!(
                "activity is already {}",
                activity.status
            )));
        }

        activity.apply_review(review);

        // 3. Write and commit
        self.client
            .fluent()
            .update()
            .in_col(collections::ACTIVITIES)
            .document_id(id)
            .object(&activity)
            .add_to_transaction(&mut transaction)
            .map_err(|e| backend("Failed to add review to transaction", e))?;

        transaction
            .commit()
            .await
            .map_err(|e| backend("Review commit failed", e))?;

        tracing::info!(activity_id = id, status = %activity.status, "Activity reviewed");
        Ok(activity)
    }

    // ─── Derived-Admin Request Operations ────────────────────────

    async fn create_elevation_request(&self, request: &ElevationRequest) -> Result<()> {
        if self
            .insert_doc(Collection::ElevationRequests, &request.id, request)
            .await?
        {
            Ok(())
        } else {
            Err(AppError::DuplicateRequest)
        }
    }

    async fn get_elevation_request(&self, id: &str) -> Result<Option<ElevationRequest>> {
        self.get_doc(collections::ELEVATION_REQUESTS, id).await
    }

    async fn list_elevation_requests(
        &self,
        filter: &RequestFilter,
    ) -> Result<Vec<ElevationRequest>> {
        let requester_uid = filter.requester_uid.clone();
        let status = filter.status.map(|s| s.as_str());

        let mut requests: Vec<ElevationRequest> = self
            .client
            .fluent()
            .select()
            .from(collections::ELEVATION_REQUESTS)
            .filter(move |q| {
                q.for_all([
                    requester_uid
                        .as_ref()
                        .and_then(|uid| q.field("requesterUid").eq(uid.clone())),
                    status.and_then(|s| q.field("status").eq(s)),
                ])
            })
            .obj()
            .query()
            .await
            .map_err(|e| backend(collections::ELEVATION_REQUESTS, e))?;

        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(requests)
    }

    async fn decide_elevation(
        &self,
        id: &str,
        decision: &ElevationDecision,
    ) -> Result<ElevationRequest> {
        let mut transaction = self
            .client
            .begin_transaction()
            .await
            .map_err(|e| backend("Failed to begin transaction", e))?;
        let reader = self.transactional_reader(&transaction);

        // 1. Read the request and check it is still pending
        let current: Option<ElevationRequest> = reader
            .fluent()
            .select()
            .by_id_in(collections::ELEVATION_REQUESTS)
            .obj()
            .one(id)
            .await
            .map_err(|e| backend("Failed to read request in transaction", e))?;

        let Some(mut request) = current else {
            let _ = transaction.rollback().await;
            return Err(AppError::NotFound(format!("request {id}")));
        };
        if request.status != RequestStatus::Pending {
            let _ = transaction.rollback().await;
            return Err(AppError::InvalidTransition(format!(
                "request is already {}",
                request.status
            )));
        }
        request.apply_decision(decision);

        // 2. On approval, stage the requester's promotion in the same commit
        if decision.approve {
            let requester: Option<User> = reader
                .fluent()
                .select()
                .by_id_in(collections::USERS)
                .obj()
                .one(&request.requester_uid)
                .await
                .map_err(|e| backend("Failed to read requester in transaction", e))?;

            let Some(mut user) = requester else {
                let _ = transaction.rollback().await;
                return Err(AppError::NotFound(format!("user {}", request.requester_uid)));
            };
            user.role = Role::DerivedAdmin;

            self.client
                .fluent()
                .update()
                .fields([UserField::Role.path()])
                .in_col(collections::USERS)
                .document_id(&user.uid)
                .object(&user)
                .add_to_transaction(&mut transaction)
                .map_err(|e| backend("Failed to add role change to transaction", e))?;
        }

        self.client
            .fluent()
            .update()
            .in_col(collections::ELEVATION_REQUESTS)
            .document_id(id)
            .object(&request)
            .add_to_transaction(&mut transaction)
            .map_err(|e| backend("Failed to add decision to transaction", e))?;

        // 3. Commit both writes atomically
        transaction
            .commit()
            .await
            .map_err(|e| backend("Decision commit failed", e))?;

        tracing::info!(
            request_id = id,
            requester_uid = %request.requester_uid,
            status = %request.status,
            "Elevation request decided"
        );

        Ok(request)
    }

    // ─── Complaint and Alert Operations ──────────────────────────

    async fn put_complaint(&self, complaint: &Complaint) -> Result<()> {
        self.set_doc(Collection::Complaints, &complaint.id, complaint)
            .await
    }

    async fn get_complaint(&self, id: &str) -> Result<Option<Complaint>> {
        self.get_doc(collections::COMPLAINTS, id).await
    }

    async fn list_complaints(&self) -> Result<Vec<Complaint>> {
        let mut complaints: Vec<Complaint> = self.list_all(collections::COMPLAINTS).await?;
        complaints.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(complaints)
    }

    async fn add_alert(&self, alert: &Alert) -> Result<()> {
        self.set_doc(Collection::Alerts, &alert.id, alert).await
    }

    async fn list_alerts(&self) -> Result<Vec<Alert>> {
        let mut alerts: Vec<Alert> = self.list_all(collections::ALERTS).await?;
        alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(alerts)
    }

    fn changes(&self) -> broadcast::Receiver<Collection> {
        self.feed.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_changed_collection_from_document_name() {
        assert_eq!(
            changed_collection("projects/p/databases/(default)/documents/activities/a1"),
            Some(Collection::Activities)
        );
        assert_eq!(
            changed_collection("projects/p/databases/(default)/documents/derivedAdminRequests/f1-1"),
            Some(Collection::ElevationRequests)
        );
        assert_eq!(changed_collection("projects/p/databases/(default)/documents/tokens/t"), None);
        assert_eq!(changed_collection("users"), None);
    }
}
