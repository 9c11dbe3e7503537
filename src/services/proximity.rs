// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Stop proximity predicates built on the distance utility.
//!
//! Three radii with different meanings:
//! - check-in: tight, marks silent arrival at a stop
//! - at-bar: gates manual actions (add round, navigate)
//! - auto-advance: loose, lets the cursor move on to the next stop
//!
//! plus the relative rule used while still in a previous stop's vicinity.

use crate::config::ProximityRadii;
use crate::models::Coordinate;
use crate::services::distance::distance_m;

/// Proximity evaluator for one set of radii.
#[derive(Debug, Clone, Copy)]
pub struct ProximityEvaluator {
    radii: ProximityRadii,
}

impl ProximityEvaluator {
    pub fn new(radii: ProximityRadii) -> Self {
        Self { radii }
    }

    /// Is `actor` within `radius_m` of `stop`? Unknown coordinates never are.
    pub fn is_within(actor: Coordinate, stop: Coordinate, radius_m: f64) -> bool {
        if !actor.is_known() || !stop.is_known() {
            return false;
        }
        distance_m(actor, stop) <= radius_m
    }

    pub fn within_check_in(&self, actor: Coordinate, stop: Coordinate) -> bool {
        Self::is_within(actor, stop, self.radii.check_in_m)
    }

    pub fn within_at_bar(&self, actor: Coordinate, stop: Coordinate) -> bool {
        Self::is_within(actor, stop, self.radii.at_bar_m)
    }

    pub fn within_auto_advance(&self, actor: Coordinate, stop: Coordinate) -> bool {
        Self::is_within(actor, stop, self.radii.auto_advance_m)
    }

    /// Closer to `next` than to `current`, and beyond the far threshold of `current`.
    pub fn heading_to_next(&self, actor: Coordinate, current: Coordinate, next: Coordinate) -> bool {
        if !actor.is_known() || !current.is_known() || !next.is_known() {
            return false;
        }
        let to_current = distance_m(actor, current);
        let to_next = distance_m(actor, next);
        to_next < to_current && to_current > self.radii.far_threshold_m()
    }
}
