// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Server-sent events: engine events and progress changes.
//!
//! Each engine event is sent as an unnamed SSE message whose JSON carries a
//! `type` tag; progress changes are sent as `progress` events.

use crate::models::{EngineEvent, ProgressSnapshot};
use crate::AppState;
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Router,
};
use futures_util::stream::{self, Stream};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/events", get(event_stream))
}

struct Subscription {
    events: broadcast::Receiver<EngineEvent>,
    progress: watch::Receiver<ProgressSnapshot>,
}

async fn event_stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = Subscription {
        events: state.engine.events(),
        progress: state.engine.subscribe(),
    };
    tracing::debug!("Event stream opened");

    let stream = stream::unfold(subscription, |mut sub| async move {
        loop {
            let next = tokio::select! {
                received = sub.events.recv() => match received {
                    Ok(event) => Event::default().json_data(&event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Event stream lagged");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                },
                changed = sub.progress.changed() => {
                    if changed.is_err() {
                        return None;
                    }
                    let snapshot = sub.progress.borrow_and_update().clone();
                    Event::default().event("progress").json_data(&snapshot)
                }
            };
            match next {
                Ok(event) => return Some((Ok(event), sub)),
                Err(e) => tracing::warn!(error = %e, "Dropping unserializable event"),
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
