// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Consumption ledger: optimistic per-stop counters and round costing.
//!
//! The server is authoritative. Local counters are bumped immediately when a
//! round or unit is logged, set to the server count when the check-in
//! receipt arrives, and overwritten by every fresh route snapshot except for
//! stops with an operation still in flight.

use crate::error::{AppError, Result};
use crate::models::{ConsumptionCounters, Money, Participant, Stop, UnitKind, UnitPrices};
use crate::services::optimistic::Reversible;
use crate::services::proximity::ProximityEvaluator;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;

/// Counter change for one logged round or batch of units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterDelta {
    pub rounds: u32,
    pub unit: UnitKind,
    pub units: u32,
}

impl CounterDelta {
    /// One round for `people` (one drink unit each).
    pub fn round(people: u32) -> Self {
        Self {
            rounds: 1,
            unit: UnitKind::Drink,
            units: people,
        }
    }

    pub fn units(unit: UnitKind, count: u32) -> Self {
        Self {
            rounds: 0,
            unit,
            units: count,
        }
    }
}

/// A delta addressed to one stop's counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopDelta {
    pub stop_id: String,
    pub delta: CounterDelta,
}

impl<S: AsMut<ConsumptionLedger>> Reversible<S> for StopDelta {
    fn apply(&self, state: &mut S) {
        let counters = state.as_mut().entry(&self.stop_id);
        counters.rounds += self.delta.rounds;
        *counters.units.entry(self.delta.unit).or_insert(0) += self.delta.units;
    }

    fn revert(&self, state: &mut S) {
        let counters = state.as_mut().entry(&self.stop_id);
        counters.rounds = counters.rounds.saturating_sub(self.delta.rounds);
        let units = counters.units.entry(self.delta.unit).or_insert(0);
        *units = units.saturating_sub(self.delta.units);
    }
}

/// Per-stop optimistic counters.
#[derive(Debug, Clone)]
pub struct ConsumptionLedger {
    defaults: UnitPrices,
    counters: HashMap<String, ConsumptionCounters>,
    /// Bumped on every confirmed receipt.
    generation: u64,
    confirmed_at: HashMap<String, u64>,
}

impl AsMut<ConsumptionLedger> for ConsumptionLedger {
    fn as_mut(&mut self) -> &mut ConsumptionLedger {
        self
    }
}

impl ConsumptionLedger {
    pub fn new(defaults: UnitPrices) -> Self {
        Self {
            defaults,
            counters: HashMap::new(),
            generation: 0,
            confirmed_at: HashMap::new(),
        }
    }

    /// Stamp for a server read; pass it back to [`Self::reconcile`].
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the stop had a receipt confirmed after `generation` was taken.
    pub fn confirmed_since(&self, stop_id: &str, generation: u64) -> bool {
        self.confirmed_at
            .get(stop_id)
            .is_some_and(|&at| at > generation)
    }

    fn entry(&mut self, stop_id: &str) -> &mut ConsumptionCounters {
        let defaults = self.defaults;
        self.counters
            .entry(stop_id.to_string())
            .or_insert_with(|| ConsumptionCounters::new(0, &defaults))
    }

    pub fn counters(&self, stop_id: &str) -> Option<&ConsumptionCounters> {
        self.counters.get(stop_id)
    }

    /// Optimistic round count (0 for a stop never seen).
    pub fn rounds(&self, stop_id: &str) -> u32 {
        self.counters.get(stop_id).map_or(0, |c| c.rounds)
    }

    pub fn units(&self, stop_id: &str, kind: UnitKind) -> u32 {
        self.counters.get(stop_id).map_or(0, |c| c.units(kind))
    }

    pub fn price(&self, stop_id: &str, kind: UnitKind) -> Money {
        self.counters
            .get(stop_id)
            .map_or_else(|| self.defaults.get(kind), |c| c.price(kind))
    }

    /// Change a per-unit price. Already-logged rounds keep their cost.
    pub fn set_price(&mut self, stop_id: &str, kind: UnitKind, price: Money) -> Result<()> {
        if price.is_negative() {
            return Err(AppError::BadRequest(format!(
                "{} price cannot be negative",
                kind
            )));
        }
        self.entry(stop_id).prices.insert(kind, price);
        Ok(())
    }

    /// Cost of one round for `people` at the stop's current drink price.
    pub fn round_cost(&self, stop_id: &str, people: u32) -> Money {
        self.unit_cost(stop_id, UnitKind::Drink, people)
    }

    pub fn unit_cost(&self, stop_id: &str, kind: UnitKind, count: u32) -> Money {
        self.price(stop_id, kind).times(count)
    }

    /// Reject a round beyond the stop's optional maximum.
    pub fn check_round_allowed(&self, stop: &Stop) -> Result<()> {
        match stop.max_rounds {
            Some(max) if self.rounds(&stop.id) >= max => Err(AppError::BadRequest(format!(
                "{} allows at most {} rounds",
                stop.name, max
            ))),
            _ => Ok(()),
        }
    }

    /// Adopt the server-confirmed round count from a check-in receipt.
    pub fn confirm_rounds(&mut self, stop_id: &str, server_rounds: u32) {
        self.generation += 1;
        self.confirmed_at.insert(stop_id.to_string(), self.generation);
        self.entry(stop_id).rounds = server_rounds;
    }

    /// Overwrite local round counts from a server snapshot.
    ///
    /// `read_at` is [`Self::generation`] as taken before the snapshot was
    /// fetched. Stops with an operation in flight keep their optimistic count,
    /// and stops confirmed after `read_at` keep the newer receipt count.
    /// Returns the ids of stops whose count changed.
    pub fn reconcile(
        &mut self,
        stops: &[Stop],
        in_flight: &InFlightRegistry,
        read_at: u64,
    ) -> Vec<String> {
        let mut changed = Vec::new();
        for stop in stops {
            if in_flight.is_busy(&stop.id) {
                tracing::debug!(stop_id = %stop.id, "Skipping reconcile for stop with operation in flight");
                continue;
            }
            if self.confirmed_since(&stop.id, read_at) {
                tracing::debug!(stop_id = %stop.id, "Skipping reconcile for stop confirmed after snapshot read");
                continue;
            }
            let counters = self.entry(&stop.id);
            if counters.rounds != stop.actual_rounds {
                tracing::debug!(
                    stop_id = %stop.id,
                    local = counters.rounds,
                    server = stop.actual_rounds,
                    "Reconciling round count"
                );
                counters.rounds = stop.actual_rounds;
                changed.push(stop.id.clone());
            }
        }
        changed
    }
}

/// People at `stop` for a round: other locatable participants within the
/// at-bar radius, plus the acting user (who always counts).
pub fn people_present(
    actor_id: &str,
    participants: &[Participant],
    stop: &Stop,
    evaluator: &ProximityEvaluator,
    now: DateTime<Utc>,
    stale_after: Duration,
) -> u32 {
    let others = participants
        .iter()
        .filter(|p| p.id != actor_id)
        .filter_map(|p| p.locatable_position(now, stale_after))
        .filter(|c| evaluator.within_at_bar(*c, stop.coordinate))
        .count();
    u32::try_from(others).unwrap_or(u32::MAX).saturating_add(1)
}

#[derive(Debug, Default, Clone, Copy)]
struct InFlight {
    round: bool,
    units: u32,
}

impl InFlight {
    fn is_empty(&self) -> bool {
        !self.round && self.units == 0
    }
}

/// Which ledger operations are currently awaiting the server, per stop.
///
/// Shared between request handlers; entries are released when the returned
/// guard drops, whatever path the operation took.
#[derive(Debug, Clone, Default)]
pub struct InFlightRegistry {
    ops: Arc<DashMap<String, InFlight>>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the stop's round slot; a second round while one is pending is rejected.
    pub fn begin_round(&self, stop_id: &str) -> Result<InFlightGuard> {
        let mut entry = self.ops.entry(stop_id.to_string()).or_default();
        if entry.round {
            return Err(AppError::RoundInFlight(stop_id.to_string()));
        }
        entry.round = true;
        drop(entry);
        Ok(InFlightGuard {
            ops: Arc::clone(&self.ops),
            stop_id: stop_id.to_string(),
            round: true,
        })
    }

    /// Register a unit-log operation. These may overlap.
    pub fn begin_units(&self, stop_id: &str) -> InFlightGuard {
        self.ops.entry(stop_id.to_string()).or_default().units += 1;
        InFlightGuard {
            ops: Arc::clone(&self.ops),
            stop_id: stop_id.to_string(),
            round: false,
        }
    }

    pub fn is_busy(&self, stop_id: &str) -> bool {
        self.ops.get(stop_id).is_some_and(|op| !op.is_empty())
    }

    pub fn round_pending(&self, stop_id: &str) -> bool {
        self.ops.get(stop_id).is_some_and(|op| op.round)
    }
}

/// Releases an in-flight registration on drop.
#[derive(Debug)]
pub struct InFlightGuard {
    ops: Arc<DashMap<String, InFlight>>,
    stop_id: String,
    round: bool,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let round = self.round;
        self.ops.remove_if_mut(&self.stop_id, |_, op| {
            if round {
                op.round = false;
            } else {
                op.units = op.units.saturating_sub(1);
            }
            op.is_empty()
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProximityRadii;
    use crate::models::Coordinate;
    use crate::services::optimistic::Pending;

    const BAR: Coordinate = Coordinate::new(52.52, 13.405);

    fn stop(id: &str, actual: u32) -> Stop {
        Stop {
            id: id.to_string(),
            name: id.to_uppercase(),
            address: None,
            coordinate: BAR,
            planned_rounds: 2,
            max_rounds: None,
            actual_rounds: actual,
            place_id: None,
            planned_stay_minutes: 45,
            arrived_at: None,
            departed_at: None,
        }
    }

    fn participant(id: &str, lat: f64, lng: f64, now: DateTime<Utc>) -> Participant {
        Participant {
            id: id.to_string(),
            display_name: None,
            image: None,
            coordinate: Coordinate::new(lat, lng),
            last_seen_at: Some(now),
            is_active: true,
            is_guest: false,
        }
    }

    fn ledger() -> ConsumptionLedger {
        ConsumptionLedger::new(UnitPrices {
            drink: "1.50".parse().unwrap(),
            food: "8.00".parse().unwrap(),
        })
    }

    #[test]
    fn test_round_cost_is_exact() {
        let ledger = ledger();
        assert_eq!(ledger.round_cost("a", 3).to_string(), "4.50");
    }

    #[test]
    fn test_price_change_does_not_touch_counts() {
        let mut ledger = ledger();
        let delta = StopDelta {
            stop_id: "a".to_string(),
            delta: CounterDelta::round(3),
        };
        let _ = Pending::apply(&mut ledger, delta).commit();

        ledger.set_price("a", UnitKind::Drink, "2.00".parse().unwrap()).unwrap();
        assert_eq!(ledger.rounds("a"), 1);
        assert_eq!(ledger.units("a", UnitKind::Drink), 3);
        assert_eq!(ledger.round_cost("a", 3).to_string(), "6.00");
        // Other stops keep the default
        assert_eq!(ledger.price("b", UnitKind::Drink).to_string(), "1.50");

        assert!(ledger
            .set_price("a", UnitKind::Food, Money::from_cents(-1))
            .is_err());
    }

    #[test]
    fn test_rollback_restores_counters_exactly() {
        let mut ledger = ledger();
        ledger.confirm_rounds("a", 2);

        let pending = Pending::apply(
            &mut ledger,
            StopDelta {
                stop_id: "a".to_string(),
                delta: CounterDelta::round(4),
            },
        );
        assert_eq!(ledger.rounds("a"), 3);
        assert_eq!(ledger.units("a", UnitKind::Drink), 4);

        pending.rollback(&mut ledger);
        assert_eq!(ledger.rounds("a"), 2);
        assert_eq!(ledger.units("a", UnitKind::Drink), 0);
    }

    #[test]
    fn test_reconcile_skips_in_flight_stops() {
        let mut ledger = ledger();
        let registry = InFlightRegistry::new();
        ledger.confirm_rounds("a", 1);
        ledger.confirm_rounds("b", 1);

        let read_at = ledger.generation();
        let guard = registry.begin_round("a").unwrap();
        let changed = ledger.reconcile(&[stop("a", 5), stop("b", 3)], &registry, read_at);
        assert_eq!(changed, vec!["b".to_string()]);
        assert_eq!(ledger.rounds("a"), 1);
        assert_eq!(ledger.rounds("b"), 3);

        drop(guard);
        ledger.reconcile(&[stop("a", 5)], &registry, read_at);
        assert_eq!(ledger.rounds("a"), 5);
    }

    #[test]
    fn test_reconcile_keeps_receipt_newer_than_snapshot() {
        let mut ledger = ledger();
        let registry = InFlightRegistry::new();

        // Snapshot read before the receipt for round 1 arrived
        let read_at = ledger.generation();
        ledger.confirm_rounds("a", 1);
        assert!(ledger.confirmed_since("a", read_at));

        let changed = ledger.reconcile(&[stop("a", 0)], &registry, read_at);
        assert!(changed.is_empty());
        assert_eq!(ledger.rounds("a"), 1);

        // A later snapshot is authoritative again
        let read_at = ledger.generation();
        assert!(!ledger.confirmed_since("a", read_at));
        ledger.reconcile(&[stop("a", 0)], &registry, read_at);
        assert_eq!(ledger.rounds("a"), 0);
    }

    #[test]
    fn test_second_round_in_flight_is_rejected() {
        let registry = InFlightRegistry::new();
        let first = registry.begin_round("a").unwrap();
        assert!(matches!(
            registry.begin_round("a"),
            Err(AppError::RoundInFlight(_))
        ));
        // Different stop is independent
        assert!(registry.begin_round("b").is_ok());

        let units = registry.begin_units("a");
        drop(first);
        assert!(registry.is_busy("a"));
        assert!(!registry.round_pending("a"));
        drop(units);
        assert!(!registry.is_busy("a"));
    }

    #[test]
    fn test_max_rounds() {
        let mut ledger = ledger();
        let mut s = stop("a", 0);
        s.max_rounds = Some(2);
        ledger.confirm_rounds("a", 1);
        assert!(ledger.check_round_allowed(&s).is_ok());
        ledger.confirm_rounds("a", 2);
        assert!(ledger.check_round_allowed(&s).is_err());
    }

    #[test]
    fn test_people_present_excludes_unknown_positions() {
        let now = Utc::now();
        let evaluator = ProximityEvaluator::new(ProximityRadii::default());
        let stale = Duration::minutes(5);
        let s = stop("a", 0);

        let participants = vec![
            participant("me", 52.52, 13.405, now),
            participant("near", 52.5201, 13.405, now),
            participant("zero", 0.0, 0.0, now),
            participant("far", 52.53, 13.405, now),
        ];
        assert_eq!(people_present("me", &participants, &s, &evaluator, now, stale), 2);

        // Only (0,0) others: the actor still counts
        let lonely = vec![participant("zero", 0.0, 0.0, now)];
        assert_eq!(people_present("me", &lonely, &s, &evaluator, now, stale), 1);
        assert_eq!(people_present("me", &[], &s, &evaluator, now, stale), 1);
    }
}
