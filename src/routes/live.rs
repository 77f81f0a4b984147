// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Server-sent event stream of full collection snapshots.
//!
//! Each `snapshot` event carries the whole result set the caller may see. A
//! failed reload is reported as an `error` event and the stream stays open;
//! losing access to the collection sends one `error` event and closes it.

use crate::db::Collection;
use crate::error::{AppError, Result};
use crate::middleware::Session;
use crate::AppState;
use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Extension, Router,
};
use futures_util::stream::{Stream, StreamExt};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/live/{collection}", get(live_snapshots))
}

fn to_event(item: Result<serde_json::Value>) -> Event {
    match item {
        Ok(snapshot) => match Event::default().event("snapshot").json_data(snapshot) {
            Ok(event) => event,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode snapshot");
                Event::default().event("error").data("internal_error")
            }
        },
        Err(e) => Event::default().event("error").data(e.code()),
    }
}

async fn live_snapshots(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(collection): Path<String>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    let collection: Collection = collection.parse().map_err(AppError::NotFound)?;
    let snapshots = state.live.watch(&session, collection)?;

    let events = snapshots.map(|item| Ok::<_, Infallible>(to_event(item)));
    Ok(Sse::new(events).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL)))
}
