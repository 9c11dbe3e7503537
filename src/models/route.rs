// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Route and stop models as served by the route backend.

use crate::models::Coordinate;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Lifecycle of a route on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteStatus {
    #[default]
    Active,
    Completed,
}

/// A planned evening: an ordered list of stops.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub id: String,
    pub name: String,
    /// Participant who created the route; the only one that proposes new stops
    pub organizer_id: String,
    /// When the group set off (null until the route is started)
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: RouteStatus,
    /// Stops in itinerary order
    pub stops: Vec<Stop>,
}

impl Route {
    pub fn stop(&self, stop_id: &str) -> Option<&Stop> {
        self.stops.iter().find(|s| s.id == stop_id)
    }

    /// External place ids of all stops that have one.
    pub fn known_place_ids(&self) -> impl Iterator<Item = &str> {
        self.stops.iter().filter_map(|s| s.place_id.as_deref())
    }
}

/// A planned venue visit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct Stop {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    pub coordinate: Coordinate,
    pub planned_rounds: u32,
    #[serde(default)]
    pub max_rounds: Option<u32>,
    /// Server-confirmed round count
    #[serde(default)]
    pub actual_rounds: u32,
    /// Identifier in the place-lookup service
    #[serde(default)]
    pub place_id: Option<String>,
    pub planned_stay_minutes: u32,
    #[serde(default)]
    pub arrived_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub departed_at: Option<DateTime<Utc>>,
}

impl Stop {
    pub fn objective_met(&self, rounds: u32) -> bool {
        rounds >= self.planned_rounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_wire_format() {
        let json = r#"{
            "id": "r1",
            "name": "Friday",
            "organizerId": "u1",
            "stops": [
                {
                    "id": "s1",
                    "name": "The Anchor",
                    "coordinate": {"lat": 52.52, "lng": 13.405},
                    "plannedRounds": 2,
                    "placeId": "place-anchor",
                    "plannedStayMinutes": 45
                }
            ]
        }"#;
        let route: Route = serde_json::from_str(json).unwrap();

        assert_eq!(route.status, RouteStatus::Active);
        assert!(route.started_at.is_none());
        let stop = route.stop("s1").unwrap();
        assert_eq!(stop.actual_rounds, 0);
        assert_eq!(stop.max_rounds, None);
        assert_eq!(
            route.known_place_ids().collect::<Vec<_>>(),
            vec!["place-anchor"]
        );
    }
}
