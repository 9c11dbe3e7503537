// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Manual position input from the UI shell.
//!
//! The main source is the stdin pump; these endpoints let a shell with its
//! own geolocation API push samples and outages directly.

use super::validate_body;
use crate::error::Result;
use crate::models::{Coordinate, PositionSample, ProgressSnapshot};
use crate::AppState;
use axum::{extract::State, routing::post, Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/positions", post(push_position))
        .route("/api/positions/unavailable", post(position_unavailable))
}

#[derive(Debug, Deserialize, Validate)]
pub struct PositionRequest {
    #[validate(range(min = -90.0, max = 90.0))]
    pub lat: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub lng: f64,
    #[validate(range(min = 0.0))]
    pub accuracy: f64,
    /// Defaults to the time the request is received
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

async fn push_position(
    State(state): State<Arc<AppState>>,
    Json(body): Json<PositionRequest>,
) -> Result<Json<ProgressSnapshot>> {
    validate_body(&body)?;
    let sample = PositionSample::new(
        Coordinate::new(body.lat, body.lng),
        body.accuracy,
        body.timestamp.unwrap_or_else(Utc::now),
    );
    // Spawned lookups and reports run detached
    let _ = state.engine.ingest_sample(sample);
    Ok(Json(state.engine.snapshot()))
}

#[derive(Debug, Deserialize, Validate)]
pub struct UnavailableRequest {
    #[validate(length(min = 1, max = 200))]
    pub reason: String,
}

async fn position_unavailable(
    State(state): State<Arc<AppState>>,
    Json(body): Json<UnavailableRequest>,
) -> Result<Json<ProgressSnapshot>> {
    validate_body(&body)?;
    state.engine.position_unavailable(body.reason);
    Ok(Json(state.engine.snapshot()))
}
