// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Progress reads and user actions.

use super::validate_body;
use crate::error::{AppError, Result};
use crate::models::{Money, PotSnapshot, ProgressSnapshot, UnitKind};
use crate::services::{RoundOutcome, StopView, UnitsOutcome};
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/progress", get(get_progress))
        .route("/api/stops", get(get_stops))
        .route("/api/stops/{stop_id}/prices", put(set_price))
        .route("/api/pot", get(get_pot))
        .route("/api/rounds", post(add_round))
        .route("/api/units", post(log_units))
        .route("/api/advance", post(advance))
        .route("/api/arrived", post(mark_arrived))
        .route("/api/finish", post(finish))
        .route("/api/refresh", post(refresh))
}

// ─── Reads ───────────────────────────────────────────────────

async fn get_progress(State(state): State<Arc<AppState>>) -> Json<ProgressSnapshot> {
    Json(state.engine.snapshot())
}

async fn get_stops(State(state): State<Arc<AppState>>) -> Json<Vec<StopView>> {
    Json(state.engine.stops())
}

/// Pot with its derived balance.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PotResponse {
    #[serde(flatten)]
    pub pot: PotSnapshot,
    pub balance: Money,
    pub unpaid_count: usize,
}

async fn get_pot(State(state): State<Arc<AppState>>) -> Result<Json<PotResponse>> {
    let pot = state
        .engine
        .pot()
        .ok_or_else(|| AppError::NotFound("pot not loaded".to_string()))?;
    Ok(Json(PotResponse {
        balance: pot.balance(),
        unpaid_count: pot.unpaid_count(),
        pot,
    }))
}

// ─── Ledger ──────────────────────────────────────────────────

async fn add_round(State(state): State<Arc<AppState>>) -> Result<Json<RoundOutcome>> {
    Ok(Json(state.engine.add_round().await?))
}

#[derive(Debug, Deserialize, Validate)]
pub struct UnitsRequest {
    pub unit: UnitKind,
    #[validate(range(min = 1, max = 50))]
    pub count: u32,
}

async fn log_units(
    State(state): State<Arc<AppState>>,
    Json(body): Json<UnitsRequest>,
) -> Result<Json<UnitsOutcome>> {
    validate_body(&body)?;
    Ok(Json(state.engine.log_units(body.unit, body.count).await?))
}

#[derive(Debug, Deserialize)]
pub struct PriceRequest {
    pub unit: UnitKind,
    pub price: Money,
}

async fn set_price(
    State(state): State<Arc<AppState>>,
    Path(stop_id): Path<String>,
    Json(body): Json<PriceRequest>,
) -> Result<StatusCode> {
    state
        .engine
        .set_unit_price(&stop_id, body.unit, body.price)?;
    Ok(StatusCode::NO_CONTENT)
}

// ─── Itinerary ───────────────────────────────────────────────

async fn advance(State(state): State<Arc<AppState>>) -> Result<Json<ProgressSnapshot>> {
    state.engine.advance()?;
    Ok(Json(state.engine.snapshot()))
}

async fn mark_arrived(State(state): State<Arc<AppState>>) -> Result<Json<ProgressSnapshot>> {
    state.engine.mark_arrived()?;
    Ok(Json(state.engine.snapshot()))
}

async fn finish(State(state): State<Arc<AppState>>) -> Result<Json<ProgressSnapshot>> {
    state.engine.finalize().await?;
    Ok(Json(state.engine.snapshot()))
}

async fn refresh(State(state): State<Arc<AppState>>) -> Result<Json<ProgressSnapshot>> {
    state.engine.refresh().await?;
    Ok(Json(state.engine.snapshot()))
}
