// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Place-lookup and stop-creation payloads.

use crate::models::Coordinate;
use serde::{Deserialize, Serialize};

/// Nearby-venue query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaceQuery {
    pub lat: f64,
    pub lng: f64,
    /// Search radius in meters
    pub radius: f64,
}

impl PlaceQuery {
    pub fn around(coordinate: Coordinate, radius: f64) -> Self {
        Self {
            lat: coordinate.lat,
            lng: coordinate.lng,
            radius,
        }
    }
}

/// Venue returned by the place-lookup collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceCandidate {
    pub place_id: String,
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    pub coordinate: Coordinate,
}

/// Body of the stop-creation call; the stop is appended at `order`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStopRequest {
    pub name: String,
    pub address: Option<String>,
    pub coordinate: Coordinate,
    pub place_id: String,
    pub planned_rounds: u32,
    pub order: usize,
}

impl NewStopRequest {
    pub fn from_candidate(candidate: &PlaceCandidate, planned_rounds: u32, order: usize) -> Self {
        Self {
            name: candidate.name.clone(),
            address: candidate.address.clone(),
            coordinate: candidate.coordinate,
            place_id: candidate.place_id.clone(),
            planned_rounds,
            order,
        }
    }
}

/// Best-effort gamification event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementEvent {
    pub participant_id: String,
    pub kind: String,
    pub stop_id: Option<String>,
}
