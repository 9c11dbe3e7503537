// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Outward progress contract published on every engine state change.

use serde::Serialize;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// State of the local position subscription.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "reason")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum SensorStatus {
    /// Subscribed, no sample yet
    #[default]
    Waiting,
    Active,
    /// Permission denied or no hardware; manual overrides only
    Unavailable(String),
    /// Subscription cancelled (route finalized or engine shut down)
    Stopped,
}

/// Everything the header / progress UI needs, without reaching into the engine.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ProgressSnapshot {
    pub current_stop_index: usize,
    pub current_stop_name: Option<String>,
    /// Meters to the current stop; `None` means "distance unknown"
    pub distance_to_current_stop: Option<f64>,
    pub is_at_current_stop: bool,
    pub completed_stop_count: usize,
    pub total_stop_count: usize,
    pub is_route_complete: bool,
    pub is_finalized: bool,
    pub current_stop_rounds: Option<u32>,
    pub current_stop_planned_rounds: Option<u32>,
    /// Positive means ahead of schedule
    #[cfg_attr(feature = "binding-generation", ts(type = "number | null"))]
    pub pacing_minutes: Option<i64>,
    pub sensor_status: SensorStatus,
}
