// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Itinerary cursor: where the group is in the planned sequence of stops.
//!
//! States:
//! - `index < total`: at stop `index`
//! - `index == total`: route complete, not yet finalized
//! - finalized: terminal, persisted remotely
//!
//! The index only moves forward. Auto-advance needs a next stop; manual
//! advance can also step from the last stop to "complete".

use crate::error::{AppError, Result};
use crate::models::{Coordinate, Stop};
use crate::services::proximity::ProximityEvaluator;
use std::collections::HashSet;

/// Why the cursor moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceReason {
    /// Inside the next stop's auto-advance radius
    NearNextStop,
    /// Objective met, closer to the next stop and far from the current one
    HeadingToNext,
    Manual,
}

impl AdvanceReason {
    pub fn is_automatic(self) -> bool {
        !matches!(self, AdvanceReason::Manual)
    }
}

/// A completed cursor move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Advance {
    pub from: usize,
    pub to: usize,
    pub reason: AdvanceReason,
}

#[derive(Debug, Clone, Default)]
pub struct ItineraryCursor {
    index: usize,
    total: usize,
    manual_arrivals: HashSet<String>,
    finalized: bool,
}

impl ItineraryCursor {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    /// Resume at `index` (clamped to `total`).
    pub fn at(index: usize, total: usize) -> Self {
        Self {
            index: index.min(total),
            total,
            ..Default::default()
        }
    }

    /// Cursor for a route the server already marks completed.
    pub fn finalized(total: usize) -> Self {
        Self {
            index: total,
            total,
            finalized: true,
            ..Default::default()
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// A stop was appended to the itinerary.
    pub fn set_total(&mut self, total: usize) {
        self.total = self.total.max(total);
    }

    /// Index of the current stop, `None` once the route is complete.
    pub fn current(&self) -> Option<usize> {
        (self.index < self.total).then_some(self.index)
    }

    pub fn completed_count(&self) -> usize {
        self.index.min(self.total)
    }

    pub fn is_complete(&self) -> bool {
        self.index >= self.total
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn has_manual_arrival(&self, stop_id: &str) -> bool {
        self.manual_arrivals.contains(stop_id)
    }

    /// At-bar predicate: manual override, or a known position inside the UI radius.
    pub fn is_at_bar(
        &self,
        evaluator: &ProximityEvaluator,
        actor: Option<Coordinate>,
        stop: &Stop,
    ) -> bool {
        self.has_manual_arrival(&stop.id)
            || actor.is_some_and(|a| evaluator.within_at_bar(a, stop.coordinate))
    }

    /// Decide whether the actor's position moves the cursor on.
    ///
    /// `rounds_at_current` is the (optimistic) round count at the current stop.
    pub fn evaluate_auto_advance(
        &self,
        evaluator: &ProximityEvaluator,
        actor: Option<Coordinate>,
        stops: &[Stop],
        rounds_at_current: u32,
    ) -> Option<AdvanceReason> {
        if self.finalized {
            return None;
        }
        let actor = actor?;
        let current = stops.get(self.current()?)?;
        let next = stops.get(self.index + 1)?;

        if evaluator.within_auto_advance(actor, next.coordinate) {
            return Some(AdvanceReason::NearNextStop);
        }

        if current.objective_met(rounds_at_current)
            && evaluator.heading_to_next(actor, current.coordinate, next.coordinate)
        {
            return Some(AdvanceReason::HeadingToNext);
        }

        None
    }

    /// Apply auto-advance if the position warrants it.
    pub fn auto_advance(
        &mut self,
        evaluator: &ProximityEvaluator,
        actor: Option<Coordinate>,
        stops: &[Stop],
        rounds_at_current: u32,
    ) -> Option<Advance> {
        let reason = self.evaluate_auto_advance(evaluator, actor, stops, rounds_at_current)?;
        let from = self.index;
        self.index += 1;
        Some(Advance {
            from,
            to: self.index,
            reason,
        })
    }

    /// Explicit user advance; from the last stop this lands on "complete".
    pub fn advance_manual(&mut self) -> Result<Advance> {
        if self.finalized {
            return Err(AppError::RouteFinalized);
        }
        let from = self.index;
        self.index = (self.index + 1).min(self.total);
        Ok(Advance {
            from,
            to: self.index,
            reason: AdvanceReason::Manual,
        })
    }

    /// Manual arrival override for the current stop (indoor signal loss).
    pub fn mark_arrived(&mut self, stop_id: &str) -> Result<()> {
        if self.finalized {
            return Err(AppError::RouteFinalized);
        }
        self.manual_arrivals.insert(stop_id.to_string());
        Ok(())
    }

    /// Check the finish preconditions without changing anything.
    pub fn check_finalize(
        &self,
        evaluator: &ProximityEvaluator,
        actor: Option<Coordinate>,
        stops: &[Stop],
        last_stop_rounds: u32,
    ) -> Result<()> {
        if self.finalized {
            return Err(AppError::RouteFinalized);
        }
        let last = stops
            .last()
            .ok_or_else(|| AppError::FinalizeRejected("route has no stops".to_string()))?;

        if self.index + 1 < self.total {
            return Err(AppError::FinalizeRejected(format!(
                "still at stop {} of {}",
                self.index + 1,
                self.total
            )));
        }
        if !last.objective_met(last_stop_rounds) {
            return Err(AppError::FinalizeRejected(format!(
                "{} of {} rounds logged at {}",
                last_stop_rounds, last.planned_rounds, last.name
            )));
        }
        if !self.is_at_bar(evaluator, actor, last) {
            return Err(AppError::FinalizeRejected(format!(
                "not at {}",
                last.name
            )));
        }
        Ok(())
    }

    /// Remote finalize succeeded.
    pub fn mark_finalized(&mut self) {
        self.index = self.total;
        self.finalized = true;
    }
}
