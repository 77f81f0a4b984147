// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Live full-snapshot subscriptions.
//!
//! A subscription yields the complete current result set once immediately and
//! again after every change to its collection. Nothing is diffed; consumers
//! compare snapshots themselves if they need to. Dropping the stream
//! unsubscribes.

use std::sync::Arc;

use futures_util::stream::{self, BoxStream, StreamExt};
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;

use crate::db::{ActivityFilter, Collection, DocumentStore, RequestFilter};
use crate::error::{AppError, Result};
use crate::middleware::Session;
use crate::models::elevation::sort_pending_first;
use crate::models::Capability;

/// What part of a collection a subscriber may see.
#[derive(Debug, Clone)]
enum Scope {
    Activities(ActivityFilter),
    Users,
    Requests(RequestFilter),
    /// `Some(uid)` restricts to one student's complaints
    Complaints(Option<String>),
    Alerts,
}

impl Scope {
    fn for_session(session: &Session, collection: Collection) -> Result<Self> {
        let role = session.role;
        let own = || Some(session.uid.clone());

        match collection {
            Collection::Activities => {
                if role.can(Capability::ReviewActivity) || role.can(Capability::ViewAnalytics) {
                    Ok(Scope::Activities(ActivityFilter::default()))
                } else {
                    session.require(Capability::SubmitActivity)?;
                    Ok(Scope::Activities(ActivityFilter {
                        student_id: own(),
                        status: None,
                    }))
                }
            }
            Collection::Users => {
                session.require(Capability::ViewUsers)?;
                Ok(Scope::Users)
            }
            Collection::ElevationRequests => {
                if role.can(Capability::DecideElevation) {
                    Ok(Scope::Requests(RequestFilter::default()))
                } else {
                    session.require(Capability::RequestElevation)?;
                    Ok(Scope::Requests(RequestFilter {
                        requester_uid: own(),
                        status: None,
                    }))
                }
            }
            Collection::Complaints => {
                if role.can(Capability::ManageComplaints) {
                    Ok(Scope::Complaints(None))
                } else {
                    session.require(Capability::FileComplaint)?;
                    Ok(Scope::Complaints(own()))
                }
            }
            Collection::Alerts => Ok(Scope::Alerts),
            Collection::Files => Err(AppError::Forbidden(
                "files cannot be subscribed to".to_string(),
            )),
        }
    }

    async fn load(&self, db: &dyn DocumentStore) -> Result<Value> {
        let value = match self {
            Scope::Activities(filter) => serde_json::to_value(db.list_activities(filter).await?),
            Scope::Users => serde_json::to_value(db.list_users().await?),
            Scope::Requests(filter) => {
                let mut requests = db.list_elevation_requests(filter).await?;
                sort_pending_first(&mut requests);
                serde_json::to_value(requests)
            }
            Scope::Complaints(uid) => {
                let mut complaints = db.list_complaints().await?;
                if let Some(uid) = uid {
                    complaints.retain(|c| &c.student_uid == uid);
                }
                serde_json::to_value(complaints)
            }
            Scope::Alerts => serde_json::to_value(db.list_alerts().await?),
        };
        value.map_err(|e| AppError::Internal(e.into()))
    }
}

/// Where a subscription stands between items.
enum Phase {
    First,
    Running,
    /// Access was lost; the stream ends.
    Closed,
}

/// Re-derive the scope from the subscriber's current stored role.
async fn rescope(db: &dyn DocumentStore, uid: &str, collection: Collection) -> Result<Scope> {
    let user = db.get_user(uid).await?.ok_or(AppError::Unauthorized)?;
    Scope::for_session(&Session::from_user(&user), collection)
}

/// Factory for live snapshot streams.
#[derive(Clone)]
pub struct LiveSnapshots {
    db: Arc<dyn DocumentStore>,
}

impl LiveSnapshots {
    pub fn new(db: Arc<dyn DocumentStore>) -> Self {
        Self { db }
    }

    /// Subscribe to `collection` as seen by `session`.
    ///
    /// Authorization is checked up front and again before every reload, so
    /// a role change takes effect on the next snapshot. Losing access yields
    /// one `Err` item and ends the stream. A failed load yields an `Err`
    /// item and the stream keeps waiting for the next change.
    pub fn watch(
        &self,
        session: &Session,
        collection: Collection,
    ) -> Result<BoxStream<'static, Result<Value>>> {
        let scope = Scope::for_session(session, collection)?;

        // Subscribe before the first load so no change can slip between them.
        let changes = self.db.changes();
        let db = self.db.clone();
        let uid = session.uid.clone();

        tracing::debug!(uid = %uid, collection = collection.name(), "Live subscription opened");

        let snapshots = stream::unfold(
            (db, changes, scope, uid, Phase::First),
            move |(db, mut changes, mut scope, uid, phase)| async move {
                match phase {
                    Phase::Closed => return None,
                    Phase::First => {}
                    Phase::Running => {
                        loop {
                            match changes.recv().await {
                                Ok(changed) if changed == collection => break,
                                Ok(_) => continue,
                                Err(RecvError::Lagged(skipped)) => {
                                    tracing::debug!(skipped, "Live subscriber lagged; reloading");
                                    break;
                                }
                                Err(RecvError::Closed) => return None,
                            }
                        }

                        let access = rescope(db.as_ref(), &uid, collection).await;
                        match access {
                            Ok(fresh) => scope = fresh,
                            Err(e @ (AppError::Forbidden(_) | AppError::Unauthorized)) => {
                                tracing::info!(
                                    uid = %uid,
                                    collection = collection.name(),
                                    "Live subscription lost access"
                                );
                                return Some((Err(e), (db, changes, scope, uid, Phase::Closed)));
                            }
                            Err(e) => {
                                tracing::warn!(
                                    error = %e,
                                    collection = collection.name(),
                                    "Live access check failed"
                                );
                                return Some((Err(e), (db, changes, scope, uid, Phase::Running)));
                            }
                        }
                    }
                }

                let snapshot = scope.load(db.as_ref()).await;
                if let Err(e) = &snapshot {
                    tracing::warn!(error = %e, collection = collection.name(), "Live snapshot failed");
                }
                Some((snapshot, (db, changes, scope, uid, Phase::Running)))
            },
        );

        Ok(snapshots.boxed())
    }
}
