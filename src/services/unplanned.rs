// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Unplanned-stop detection: notice when the actor stays put somewhere that
//! is not on the itinerary.

use crate::config::DwellSettings;
use crate::models::{Coordinate, PlaceCandidate, Stop};
use crate::services::distance::distance_m;
use crate::services::proximity::ProximityEvaluator;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq)]
enum DwellState {
    Idle,
    Tracking {
        reference: Coordinate,
        since: DateTime<Utc>,
    },
    /// This dwell already had its lookup (or was skipped); wait for movement.
    Evaluated {
        reference: Coordinate,
        since: DateTime<Utc>,
    },
}

/// A dwell that just crossed the window and should be looked up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DwellTrigger {
    pub reference: Coordinate,
    pub since: DateTime<Utc>,
}

/// Dwell watcher for one actor.
#[derive(Debug, Clone)]
pub struct DwellDetector {
    settings: DwellSettings,
    state: DwellState,
    /// Place ids with a stop creation in flight
    proposals: HashSet<String>,
}

impl DwellDetector {
    pub fn new(settings: DwellSettings) -> Self {
        Self {
            settings,
            state: DwellState::Idle,
            proposals: HashSet::new(),
        }
    }

    /// Feed one reliable sample. Returns a trigger at most once per dwell.
    pub fn on_sample(&mut self, coordinate: Coordinate, at: DateTime<Utc>) -> Option<DwellTrigger> {
        if !coordinate.is_known() {
            return None;
        }

        match self.state {
            DwellState::Idle => {
                self.state = DwellState::Tracking {
                    reference: coordinate,
                    since: at,
                };
                None
            }
            DwellState::Tracking { reference, since } | DwellState::Evaluated { reference, since }
                if distance_m(reference, coordinate) > self.settings.movement_threshold_m =>
            {
                tracing::trace!(
                    moved_m = distance_m(reference, coordinate),
                    dwell_secs = (at - since).num_seconds(),
                    "Dwell reset by movement"
                );
                self.state = DwellState::Tracking {
                    reference: coordinate,
                    since: at,
                };
                None
            }
            DwellState::Tracking { reference, since }
                if at - since >= Duration::seconds(self.settings.dwell_window_secs) =>
            {
                self.state = DwellState::Evaluated { reference, since };
                Some(DwellTrigger { reference, since })
            }
            DwellState::Tracking { .. } | DwellState::Evaluated { .. } => None,
        }
    }

    /// Drop any dwell in progress (route finalized or engine stopped).
    pub fn reset(&mut self) {
        self.state = DwellState::Idle;
        self.proposals.clear();
    }

    pub fn is_tracking(&self) -> bool {
        matches!(self.state, DwellState::Tracking { .. })
    }

    pub fn is_evaluated(&self) -> bool {
        matches!(self.state, DwellState::Evaluated { .. })
    }

    /// Record a stop creation in flight for `place_id`. False if one already is.
    pub fn begin_proposal(&mut self, place_id: &str) -> bool {
        self.proposals.insert(place_id.to_string())
    }

    pub fn finish_proposal(&mut self, place_id: &str) {
        self.proposals.remove(place_id);
    }

    pub fn is_proposing(&self, place_id: &str) -> bool {
        self.proposals.contains(place_id)
    }
}

/// Whether `coordinate` is within the at-bar radius of any itinerary stop.
pub fn near_known_stop(coordinate: Coordinate, stops: &[Stop], evaluator: &ProximityEvaluator) -> bool {
    stops
        .iter()
        .any(|s| evaluator.within_at_bar(coordinate, s.coordinate))
}

/// First candidate whose place id is neither on the itinerary nor already
/// being proposed.
pub fn select_candidate<'a>(
    candidates: &'a [PlaceCandidate],
    stops: &[Stop],
    detector: &DwellDetector,
) -> Option<&'a PlaceCandidate> {
    let known: HashSet<&str> = stops.iter().filter_map(|s| s.place_id.as_deref()).collect();
    candidates
        .iter()
        .find(|c| !known.contains(c.place_id.as_str()) && !detector.is_proposing(&c.place_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const M: f64 = 1.0 / 111_195.0;
    const HOME: Coordinate = Coordinate::new(52.50, 13.40);

    fn north(meters: f64) -> Coordinate {
        Coordinate::new(HOME.lat + meters * M, HOME.lng)
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 6, 21, 0, 0).unwrap()
    }

    fn minutes(m: i64) -> DateTime<Utc> {
        t0() + Duration::minutes(m)
    }

    fn candidate(id: &str) -> PlaceCandidate {
        PlaceCandidate {
            place_id: id.to_string(),
            name: format!("Bar {}", id),
            address: None,
            coordinate: HOME,
        }
    }

    fn stop_with_place(place_id: &str, at: Coordinate) -> Stop {
        Stop {
            id: format!("stop-{}", place_id),
            name: place_id.to_string(),
            address: None,
            coordinate: at,
            planned_rounds: 1,
            max_rounds: None,
            actual_rounds: 0,
            place_id: Some(place_id.to_string()),
            planned_stay_minutes: 30,
            arrived_at: None,
            departed_at: None,
        }
    }

    #[test]
    fn test_triggers_once_after_window() {
        let mut detector = DwellDetector::new(DwellSettings::default());

        assert_eq!(detector.on_sample(HOME, minutes(0)), None);
        assert_eq!(detector.on_sample(north(10.0), minutes(5)), None);
        assert_eq!(detector.on_sample(north(5.0), minutes(9)), None);

        let trigger = detector.on_sample(north(12.0), minutes(10)).unwrap();
        assert_eq!(trigger.reference, HOME);
        assert_eq!(trigger.since, t0());
        assert!(detector.is_evaluated());

        // Same dwell: never again
        assert_eq!(detector.on_sample(HOME, minutes(30)), None);
        assert_eq!(detector.on_sample(north(20.0), minutes(90)), None);
    }

    #[test]
    fn test_movement_resets_dwell() {
        let mut detector = DwellDetector::new(DwellSettings::default());

        detector.on_sample(HOME, minutes(0));
        assert_eq!(detector.on_sample(north(35.0), minutes(8)), None);
        assert!(detector.is_tracking());

        // Window now counts from minute 8
        assert_eq!(detector.on_sample(north(35.0), minutes(12)), None);
        let trigger = detector.on_sample(north(40.0), minutes(18)).unwrap();
        assert_eq!(trigger.since, minutes(8));
    }

    #[test]
    fn test_movement_after_evaluation_starts_new_dwell() {
        let mut detector = DwellDetector::new(DwellSettings::default());
        detector.on_sample(HOME, minutes(0));
        assert!(detector.on_sample(HOME, minutes(10)).is_some());

        detector.on_sample(north(500.0), minutes(15));
        assert!(detector.is_tracking());
        assert!(detector.on_sample(north(500.0), minutes(25)).is_some());
    }

    #[test]
    fn test_unknown_coordinates_are_ignored() {
        let mut detector = DwellDetector::new(DwellSettings::default());
        detector.on_sample(HOME, minutes(0));
        assert_eq!(detector.on_sample(Coordinate::new(0.0, 0.0), minutes(1)), None);
        assert!(detector.on_sample(HOME, minutes(10)).is_some());
    }

    #[test]
    fn test_reset_clears_dwell_and_proposals() {
        let mut detector = DwellDetector::new(DwellSettings::default());
        detector.on_sample(HOME, minutes(0));
        assert!(detector.begin_proposal("p1"));
        assert!(!detector.begin_proposal("p1"));

        detector.reset();
        assert!(!detector.is_tracking());
        assert!(!detector.is_proposing("p1"));
        assert_eq!(detector.on_sample(HOME, minutes(10)), None);
    }

    #[test]
    fn test_select_candidate_skips_known_and_pending_places() {
        let mut detector = DwellDetector::new(DwellSettings::default());
        let stops = vec![stop_with_place("anchor", north(2_000.0))];
        let candidates = vec![candidate("anchor"), candidate("crown"), candidate("swan")];

        let picked = select_candidate(&candidates, &stops, &detector).unwrap();
        assert_eq!(picked.place_id, "crown");

        detector.begin_proposal("crown");
        let picked = select_candidate(&candidates, &stops, &detector).unwrap();
        assert_eq!(picked.place_id, "swan");

        detector.begin_proposal("swan");
        assert!(select_candidate(&candidates, &stops, &detector).is_none());
    }

    #[test]
    fn test_near_known_stop() {
        let evaluator = ProximityEvaluator::new(crate::config::ProximityRadii::default());
        let stops = vec![stop_with_place("anchor", HOME)];
        assert!(near_known_stop(north(50.0), &stops, &evaluator));
        assert!(!near_known_stop(north(100.0), &stops, &evaluator));
    }
}
