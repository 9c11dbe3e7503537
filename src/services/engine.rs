// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Live route progress engine.
//!
//! Wires the sampler, proximity evaluator, itinerary cursor, consumption
//! ledger, dwell detector and notification synthesizer together.
//!
//! Concurrency model:
//! - all component state lives behind one `std::sync::Mutex`, never held
//!   across an `.await`
//! - the sample path never awaits remote work; place lookups, stop creation
//!   and position reports are spawned
//! - progress is published on a `watch` channel after every change, and
//!   transient UI signals go out on a `broadcast` channel
//! - background tasks (position pump, periodic refresh, real-time updates)
//!   are aborted on finalize or shutdown

use crate::backend::RouteBackend;
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::{
    AchievementEvent, CheckInReceipt, CheckInRequest, ConsumptionCounters, DrinkLogRequest,
    EngineEvent, Money, NewStopRequest, Participant, PlaceQuery, PositionEvent, PositionReport,
    PositionSample, PotSnapshot, PotSpendRequest, ProgressSnapshot, RealtimeEvent, Route,
    RouteStatus, Stop, ToastLevel, UnitKind,
};
use crate::services::distance::distance_m;
use crate::services::itinerary::{Advance, ItineraryCursor};
use crate::services::ledger::{
    people_present, ConsumptionLedger, CounterDelta, InFlightRegistry, StopDelta,
};
use crate::services::optimistic::{lock, settle, Pending};
use crate::services::pace::{pacing_minutes, NotificationSynthesizer, PaceInputs};
use crate::services::proximity::ProximityEvaluator;
use crate::services::sampler::GeoSampler;
use crate::services::unplanned::{near_known_stop, select_candidate, DwellDetector, DwellTrigger};
use chrono::{DateTime, Duration, Utc};
use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

/// Maximum concurrent drink-log calls for one round.
const MAX_CONCURRENT_LOGS: usize = 4;

/// Buffered UI events per subscriber.
const EVENT_CHANNEL_CAPACITY: usize = 128;

/// What one position sample caused.
///
/// The spawned handles let callers (mostly tests) wait for the remote work
/// the sample kicked off; dropping them detaches the tasks.
#[derive(Debug, Default)]
pub struct SampleOutcome {
    pub reliable: bool,
    pub checked_in: bool,
    pub advanced: Option<Advance>,
    pub lookup: Option<JoinHandle<()>>,
    pub report: Option<JoinHandle<()>>,
}

/// Result of a successfully logged round.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundOutcome {
    pub stop_id: String,
    /// Server-confirmed round count
    pub rounds: u32,
    pub people: u32,
    pub cost: Money,
    pub pot: PotSnapshot,
}

/// Result of successfully logged itemized units.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitsOutcome {
    pub stop_id: String,
    pub unit: UnitKind,
    pub count: u32,
    pub cost: Money,
    pub pot: PotSnapshot,
}

/// A stop plus its local counters, for the itinerary list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopView {
    #[serde(flatten)]
    pub stop: Stop,
    pub counters: ConsumptionCounters,
    pub is_current: bool,
    pub manual_arrival: bool,
}

struct EngineState {
    route: Route,
    participants: Vec<Participant>,
    pot: Option<PotSnapshot>,
    sampler: GeoSampler,
    cursor: ItineraryCursor,
    ledger: ConsumptionLedger,
    dwell: DwellDetector,
    synthesizer: NotificationSynthesizer,
    last_report_at: Option<DateTime<Utc>>,
    finalizing: bool,
}

impl AsMut<ConsumptionLedger> for EngineState {
    fn as_mut(&mut self) -> &mut ConsumptionLedger {
        &mut self.ledger
    }
}

impl EngineState {
    fn current_stop(&self) -> Option<&Stop> {
        self.cursor
            .current()
            .and_then(|index| self.route.stops.get(index))
    }
}

struct Inner {
    config: Config,
    backend: Arc<dyn RouteBackend>,
    evaluator: ProximityEvaluator,
    state: Mutex<EngineState>,
    in_flight: InFlightRegistry,
    progress: watch::Sender<ProgressSnapshot>,
    events: broadcast::Sender<EngineEvent>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Handle to the engine; cheap to clone.
#[derive(Clone)]
pub struct RouteEngine {
    inner: Arc<Inner>,
}

impl RouteEngine {
    /// Fetch the route, participants and pot and build the engine.
    ///
    /// No background tasks are started; see [`RouteEngine::spawn_tasks`].
    pub async fn load(config: Config, backend: Arc<dyn RouteBackend>) -> Result<Self> {
        let route_id = config.route_id.clone();
        let (route, participants, pot) = tokio::try_join!(
            backend.get_route(&route_id),
            backend.get_participants(&route_id),
            backend.get_pot(&route_id),
        )?;

        let total = route.stops.len();
        let mut sampler = GeoSampler::new(config.max_accuracy_m);
        let cursor = if route.status == RouteStatus::Completed {
            sampler.stop();
            ItineraryCursor::finalized(total)
        } else {
            let departed = route
                .stops
                .iter()
                .take_while(|s| s.departed_at.is_some())
                .count();
            ItineraryCursor::at(departed, total)
        };

        let in_flight = InFlightRegistry::new();
        let mut ledger = ConsumptionLedger::new(config.default_prices);
        let read_at = ledger.generation();
        ledger.reconcile(&route.stops, &in_flight, read_at);

        tracing::info!(
            route_id = %route.id,
            stops = total,
            index = cursor.index(),
            finalized = cursor.is_finalized(),
            "Route loaded"
        );

        let state = EngineState {
            route,
            participants,
            pot: Some(pot),
            sampler,
            cursor,
            ledger,
            dwell: DwellDetector::new(config.dwell),
            synthesizer: NotificationSynthesizer::new(config.notifications),
            last_report_at: None,
            finalizing: false,
        };

        let (progress, _) = watch::channel(ProgressSnapshot::default());
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let engine = Self {
            inner: Arc::new(Inner {
                evaluator: ProximityEvaluator::new(config.radii),
                config,
                backend,
                state: Mutex::new(state),
                in_flight,
                progress,
                events,
                tasks: Mutex::new(Vec::new()),
            }),
        };
        engine.inner.publish(&lock(&engine.inner.state), Utc::now());
        Ok(engine)
    }

    /// Load the engine and start its background tasks.
    pub async fn start(
        config: Config,
        backend: Arc<dyn RouteBackend>,
        positions: mpsc::Receiver<PositionEvent>,
    ) -> Result<Self> {
        let engine = Self::load(config, backend).await?;
        engine.spawn_tasks(positions);
        Ok(engine)
    }

    /// Start the position pump, periodic refresh and real-time consumer.
    pub fn spawn_tasks(&self, mut positions: mpsc::Receiver<PositionEvent>) {
        let pump = {
            let engine = self.clone();
            tokio::spawn(async move {
                while let Some(event) = positions.recv().await {
                    engine.ingest(event);
                }
                tracing::info!("Position stream ended");
            })
        };

        let refresh = {
            let engine = self.clone();
            let period = std::time::Duration::from_secs(self.inner.config.refresh_interval_secs.max(1));
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                interval.tick().await;
                loop {
                    interval.tick().await;
                    if let Err(e) = engine.refresh().await {
                        tracing::warn!(error = %e, "Periodic refresh failed");
                    }
                }
            })
        };

        let realtime = {
            let engine = self.clone();
            tokio::spawn(async move {
                let route_id = engine.inner.config.route_id.clone();
                let mut updates = match engine.inner.backend.subscribe_updates(&route_id).await {
                    Ok(updates) => updates,
                    Err(e) => {
                        tracing::warn!(route_id = %route_id, error = %e, "Real-time updates unavailable");
                        return;
                    }
                };
                while let Some(event) = updates.recv().await {
                    engine.apply_realtime(event);
                }
            })
        };

        lock(&self.inner.tasks).extend([pump, refresh, realtime]);
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Latest progress snapshot.
    pub fn snapshot(&self) -> ProgressSnapshot {
        self.inner.progress.borrow().clone()
    }

    /// Progress updates; a new value is published on every state change.
    pub fn subscribe(&self) -> watch::Receiver<ProgressSnapshot> {
        self.inner.progress.subscribe()
    }

    /// Transient UI events (toasts, haptics, notifications, proposals).
    pub fn events(&self) -> broadcast::Receiver<EngineEvent> {
        self.inner.events.subscribe()
    }

    pub fn stops(&self) -> Vec<StopView> {
        let state = lock(&self.inner.state);
        let current = state.cursor.current();
        state
            .route
            .stops
            .iter()
            .enumerate()
            .map(|(index, stop)| StopView {
                stop: stop.clone(),
                counters: state.ledger.counters(&stop.id).cloned().unwrap_or_else(|| {
                    ConsumptionCounters::new(stop.actual_rounds, &self.inner.config.default_prices)
                }),
                is_current: current == Some(index),
                manual_arrival: state.cursor.has_manual_arrival(&stop.id),
            })
            .collect()
    }

    pub fn pot(&self) -> Option<PotSnapshot> {
        lock(&self.inner.state).pot.clone()
    }

    pub fn participants(&self) -> Vec<Participant> {
        lock(&self.inner.state).participants.clone()
    }

    /// Feed one event from the position stream.
    pub fn ingest(&self, event: PositionEvent) -> SampleOutcome {
        match event {
            PositionEvent::Sample(sample) => self.ingest_sample(sample),
            PositionEvent::Unavailable(reason) => {
                self.position_unavailable(reason);
                SampleOutcome::default()
            }
        }
    }

    /// Process one raw position sample. Never awaits.
    pub fn ingest_sample(&self, sample: PositionSample) -> SampleOutcome {
        let inner = &self.inner;
        let now = sample.timestamp;
        let mut outcome = SampleOutcome::default();

        let mut guard = lock(&inner.state);
        let state = &mut *guard;

        let Some(reading) = state.sampler.on_sample(sample) else {
            return outcome;
        };
        outcome.reliable = reading.reliable;
        if !reading.reliable || state.cursor.is_finalized() {
            inner.publish(state, now);
            return outcome;
        }
        let position = reading.coordinate();

        // Auto-advance on confirmed rounds only; a pending round may still roll back
        let rounds_here = state.current_stop().map_or(0, |s| s.actual_rounds);
        if let Some(advance) =
            state
                .cursor
                .auto_advance(&inner.evaluator, Some(position), &state.route.stops, rounds_here)
        {
            if let Some(from) = state.route.stops.get_mut(advance.from) {
                from.departed_at.get_or_insert(now);
            }
            tracing::info!(
                from = advance.from,
                to = advance.to,
                reason = ?advance.reason,
                "Auto-advanced to next stop"
            );
            inner.emit(EngineEvent::Advanced {
                from: advance.from,
                to: advance.to,
                automatic: advance.reason.is_automatic(),
            });
            outcome.advanced = Some(advance);
        }

        // Silent auto-check-in at the (possibly new) current stop
        if let Some(index) = state.cursor.current() {
            if let Some(stop) = state.route.stops.get_mut(index) {
                if stop.arrived_at.is_none()
                    && inner.evaluator.within_check_in(position, stop.coordinate)
                {
                    stop.arrived_at = Some(now);
                    tracing::info!(stop_id = %stop.id, index, "Auto check-in");
                    inner.emit(EngineEvent::CheckedIn {
                        stop_id: stop.id.clone(),
                    });
                    inner.emit(EngineEvent::toast(
                        ToastLevel::Info,
                        format!("Arrived at {}", stop.name),
                    ));
                    outcome.checked_in = true;
                }
            }
        }

        // Rate-limited own-position report
        let report_due = state.last_report_at.map_or(true, |last| {
            now - last >= Duration::seconds(inner.config.position_report_interval_secs)
        });
        if report_due {
            state.last_report_at = Some(now);
            let report = PositionReport {
                participant_id: inner.config.actor_id.clone(),
                coordinate: position,
                accuracy: reading.sample.accuracy,
                reported_at: now,
            };
            outcome.report = Some(self.spawn_position_report(report));
        }

        // Unplanned-stop detection, organizer only
        if state.route.organizer_id == inner.config.actor_id {
            if let Some(trigger) = state.dwell.on_sample(position, now) {
                if near_known_stop(trigger.reference, &state.route.stops, &inner.evaluator) {
                    tracing::debug!("Dwell at a known stop; no lookup");
                } else {
                    tracing::info!(
                        lat = trigger.reference.lat,
                        lng = trigger.reference.lng,
                        dwell_start = %trigger.since,
                        "Dwell away from known stops; looking up places"
                    );
                    outcome.lookup = Some(self.spawn_place_lookup(trigger));
                }
            }
        }

        inner.evaluate_notifications(state, now);
        inner.publish(state, now);
        outcome
    }

    /// The position stream reported an error or permission denial.
    pub fn position_unavailable(&self, reason: impl Into<String>) {
        let mut guard = lock(&self.inner.state);
        guard.sampler.on_unavailable(reason);
        self.inner.publish(&guard, Utc::now());
    }

    fn spawn_position_report(&self, report: PositionReport) -> JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            if let Err(e) = inner
                .backend
                .report_position(&inner.config.route_id, &report)
                .await
            {
                tracing::debug!(error = %e, "Position report failed");
            }
        })
    }

    fn spawn_place_lookup(&self, trigger: DwellTrigger) -> JoinHandle<()> {
        let engine = self.clone();
        tokio::spawn(async move { engine.propose_unplanned_stop(trigger).await })
    }

    /// Look up venues around a dwell and propose the first unknown one.
    /// Failures are logged and dropped; the dwell is not re-evaluated.
    async fn propose_unplanned_stop(&self, trigger: DwellTrigger) {
        let inner = &self.inner;
        let query = PlaceQuery::around(trigger.reference, inner.config.dwell.search_radius_m);

        let candidates = match inner.backend.nearby_places(&query).await {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::warn!(error = %e, "Place lookup failed");
                return;
            }
        };

        let request = {
            let mut guard = lock(&inner.state);
            let state = &mut *guard;
            if state.cursor.is_finalized() {
                return;
            }
            let Some(candidate) = select_candidate(&candidates, &state.route.stops, &state.dwell)
            else {
                tracing::debug!(candidates = candidates.len(), "No unknown place near dwell");
                return;
            };
            state.dwell.begin_proposal(&candidate.place_id);
            NewStopRequest::from_candidate(
                candidate,
                inner.config.dwell.proposed_rounds,
                state.route.stops.len(),
            )
        };

        let created = inner
            .backend
            .create_stop(&inner.config.route_id, &request)
            .await;

        let mut guard = lock(&inner.state);
        let state = &mut *guard;
        state.dwell.finish_proposal(&request.place_id);
        match created {
            Ok(stop) => {
                if state.route.stops.iter().any(|s| s.id == stop.id) {
                    return;
                }
                tracing::info!(stop_id = %stop.id, name = %stop.name, "Proposed unplanned stop");
                state.route.stops.push(stop.clone());
                state.cursor.set_total(state.route.stops.len());
                inner.emit(EngineEvent::StopProposed { stop });
                inner.publish(state, Utc::now());
            }
            Err(e) => {
                tracing::warn!(place_id = %request.place_id, error = %e, "Stop creation failed");
            }
        }
    }

    /// Log one round at the current stop for everyone present.
    pub async fn add_round(&self) -> Result<RoundOutcome> {
        let inner = &self.inner;
        let now = Utc::now();

        let (stop, people, cost, description, _flight, pending) = {
            let mut guard = lock(&inner.state);
            let state = &mut *guard;
            if state.cursor.is_finalized() {
                return Err(AppError::RouteFinalized);
            }
            let stop = state
                .current_stop()
                .cloned()
                .ok_or_else(|| AppError::BadRequest("route is complete".to_string()))?;
            if !state
                .cursor
                .is_at_bar(&inner.evaluator, state.sampler.position(), &stop)
            {
                return Err(AppError::NotAtStop);
            }
            state.ledger.check_round_allowed(&stop)?;
            let flight = inner.in_flight.begin_round(&stop.id)?;

            let people = people_present(
                &inner.config.actor_id,
                &state.participants,
                &stop,
                &inner.evaluator,
                now,
                Duration::seconds(inner.config.participant_stale_secs),
            );
            let price = state.ledger.price(&stop.id, UnitKind::Drink);
            let cost = state.ledger.round_cost(&stop.id, people);
            let pending = Pending::apply(
                state,
                StopDelta {
                    stop_id: stop.id.clone(),
                    delta: CounterDelta::round(people),
                },
            );
            let description = format!(
                "Round {} at {} ({} × {})",
                state.ledger.rounds(&stop.id),
                stop.name,
                people,
                price
            );
            inner.publish(state, now);
            (stop, people, cost, description, flight, pending)
        };

        tracing::debug!(stop_id = %stop.id, people, cost = %cost, "Logging round");

        let result = settle(
            &inner.state,
            pending,
            self.persist_round(&stop, people, cost, description, now),
        )
        .await;

        match result {
            Ok((receipt, pot)) => {
                {
                    let mut guard = lock(&inner.state);
                    let state = &mut *guard;
                    state.ledger.confirm_rounds(&stop.id, receipt.actual_rounds);
                    if let Some(s) = state.route.stops.iter_mut().find(|s| s.id == stop.id) {
                        s.actual_rounds = s.actual_rounds.max(receipt.actual_rounds);
                    }
                    state.pot = Some(pot.clone());
                    inner.emit(EngineEvent::RoundLogged {
                        stop_id: stop.id.clone(),
                        rounds: receipt.actual_rounds,
                        people,
                        cost,
                    });
                    inner.emit(EngineEvent::Haptic);
                    inner.emit(EngineEvent::toast(
                        ToastLevel::Success,
                        format!("Round {} logged at {} ({})", receipt.actual_rounds, stop.name, cost),
                    ));
                    inner.evaluate_notifications(state, now);
                    inner.publish(state, now);
                }
                tracing::info!(
                    stop_id = %stop.id,
                    rounds = receipt.actual_rounds,
                    people,
                    cost = %cost,
                    "Round logged"
                );
                self.record_achievement("round_logged", Some(stop.id.clone()))
                    .await;
                Ok(RoundOutcome {
                    stop_id: stop.id,
                    rounds: receipt.actual_rounds,
                    people,
                    cost,
                    pot,
                })
            }
            Err(e) => {
                tracing::warn!(stop_id = %stop.id, error = %e, "Round failed; rolled back");
                inner.emit(EngineEvent::toast(
                    ToastLevel::Error,
                    format!("Could not log round at {}", stop.name),
                ));
                inner.publish(&lock(&inner.state), Utc::now());
                Err(e)
            }
        }
    }

    /// Check-in, one drink log per person, then the pot spend.
    async fn persist_round(
        &self,
        stop: &Stop,
        people: u32,
        cost: Money,
        description: String,
        now: DateTime<Utc>,
    ) -> Result<(CheckInReceipt, PotSnapshot)> {
        let backend = &self.inner.backend;
        let route_id = &self.inner.config.route_id;

        let receipt = backend
            .check_in(
                route_id,
                &CheckInRequest {
                    stop_id: stop.id.clone(),
                    participant_id: self.inner.config.actor_id.clone(),
                    people_count: people,
                    checked_in_at: now,
                },
            )
            .await?;

        self.log_units_remote(&stop.id, UnitKind::Drink, people, now)
            .await?;

        let pot = backend
            .spend_from_pot(route_id, &PotSpendRequest::spend(cost, description))
            .await?;

        Ok((receipt, pot))
    }

    /// One drink-log call per unit, a few at a time.
    async fn log_units_remote(
        &self,
        stop_id: &str,
        unit: UnitKind,
        count: u32,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let backend = &self.inner.backend;
        let route_id = &self.inner.config.route_id;
        let request = DrinkLogRequest {
            stop_id: stop_id.to_string(),
            participant_id: self.inner.config.actor_id.clone(),
            unit,
            logged_at: now,
        };

        stream::iter(0..count)
            .map(|_| backend.log_drink(route_id, &request))
            .buffer_unordered(MAX_CONCURRENT_LOGS)
            .collect::<Vec<Result<()>>>()
            .await
            .into_iter()
            .collect::<Result<Vec<()>>>()?;

        Ok(())
    }

    /// Log itemized units (food, extra drinks) at the current stop.
    pub async fn log_units(&self, unit: UnitKind, count: u32) -> Result<UnitsOutcome> {
        if count == 0 {
            return Err(AppError::BadRequest("count must be at least 1".to_string()));
        }
        let inner = &self.inner;
        let now = Utc::now();

        let (stop, cost, _flight, pending) = {
            let mut guard = lock(&inner.state);
            let state = &mut *guard;
            if state.cursor.is_finalized() {
                return Err(AppError::RouteFinalized);
            }
            let stop = state
                .current_stop()
                .cloned()
                .ok_or_else(|| AppError::BadRequest("route is complete".to_string()))?;
            if !state
                .cursor
                .is_at_bar(&inner.evaluator, state.sampler.position(), &stop)
            {
                return Err(AppError::NotAtStop);
            }
            let flight = inner.in_flight.begin_units(&stop.id);
            let cost = state.ledger.unit_cost(&stop.id, unit, count);
            let pending = Pending::apply(
                state,
                StopDelta {
                    stop_id: stop.id.clone(),
                    delta: CounterDelta::units(unit, count),
                },
            );
            inner.publish(state, now);
            (stop, cost, flight, pending)
        };

        let description = format!("{} × {} at {}", count, unit, stop.name);
        let remote = async {
            self.log_units_remote(&stop.id, unit, count, now).await?;
            let pot = inner
                .backend
                .spend_from_pot(
                    &inner.config.route_id,
                    &PotSpendRequest::spend(cost, description),
                )
                .await?;
            Ok::<_, AppError>(pot)
        };

        match settle(&inner.state, pending, remote).await {
            Ok(pot) => {
                {
                    let mut guard = lock(&inner.state);
                    guard.pot = Some(pot.clone());
                    inner.emit(EngineEvent::UnitsLogged {
                        stop_id: stop.id.clone(),
                        unit,
                        count,
                        cost,
                    });
                    inner.emit(EngineEvent::Haptic);
                    inner.emit(EngineEvent::toast(
                        ToastLevel::Success,
                        format!("{} × {} logged ({})", count, unit, cost),
                    ));
                    inner.publish(&guard, now);
                }
                Ok(UnitsOutcome {
                    stop_id: stop.id,
                    unit,
                    count,
                    cost,
                    pot,
                })
            }
            Err(e) => {
                tracing::warn!(stop_id = %stop.id, unit = %unit, error = %e, "Unit log failed; rolled back");
                inner.emit(EngineEvent::toast(
                    ToastLevel::Error,
                    format!("Could not log {} at {}", unit, stop.name),
                ));
                inner.publish(&lock(&inner.state), Utc::now());
                Err(e)
            }
        }
    }

    /// Change a per-unit price for one stop.
    pub fn set_unit_price(&self, stop_id: &str, unit: UnitKind, price: Money) -> Result<()> {
        let mut guard = lock(&self.inner.state);
        let state = &mut *guard;
        if state.cursor.is_finalized() {
            return Err(AppError::RouteFinalized);
        }
        if state.route.stop(stop_id).is_none() {
            return Err(AppError::NotFound(format!("stop {}", stop_id)));
        }
        state.ledger.set_price(stop_id, unit, price)?;
        tracing::debug!(stop_id, unit = %unit, price = %price, "Unit price changed");
        Ok(())
    }

    /// Explicit user advance to the next stop (or to "complete").
    pub fn advance(&self) -> Result<Advance> {
        let now = Utc::now();
        let mut guard = lock(&self.inner.state);
        let state = &mut *guard;
        let advance = state.cursor.advance_manual()?;
        if advance.to != advance.from {
            if let Some(from) = state.route.stops.get_mut(advance.from) {
                from.departed_at.get_or_insert(now);
            }
            tracing::info!(from = advance.from, to = advance.to, "Manual advance");
            self.inner.emit(EngineEvent::Advanced {
                from: advance.from,
                to: advance.to,
                automatic: advance.reason.is_automatic(),
            });
        }
        self.inner.publish(state, now);
        Ok(advance)
    }

    /// Manual arrival at the current stop (GPS unavailable or indoors).
    pub fn mark_arrived(&self) -> Result<()> {
        let now = Utc::now();
        let mut guard = lock(&self.inner.state);
        let state = &mut *guard;
        if state.cursor.is_finalized() {
            return Err(AppError::RouteFinalized);
        }
        let index = state
            .cursor
            .current()
            .ok_or_else(|| AppError::BadRequest("route is complete".to_string()))?;
        let Some(stop) = state.route.stops.get_mut(index) else {
            return Err(AppError::NotFound(format!("stop #{}", index)));
        };
        state.cursor.mark_arrived(&stop.id)?;
        if stop.arrived_at.is_none() {
            stop.arrived_at = Some(now);
            self.inner.emit(EngineEvent::CheckedIn {
                stop_id: stop.id.clone(),
            });
        }
        tracing::info!(stop_id = %stop.id, "Manual arrival");
        self.inner.publish(state, now);
        Ok(())
    }

    /// Finish the route: check preconditions, persist, then tear down.
    pub async fn finalize(&self) -> Result<()> {
        let inner = &self.inner;
        {
            let mut guard = lock(&inner.state);
            let state = &mut *guard;
            if state.finalizing {
                return Err(AppError::BadRequest("finish already in progress".to_string()));
            }
            let last_rounds = state.route.stops.last().map_or(0, |s| s.actual_rounds);
            state.cursor.check_finalize(
                &inner.evaluator,
                state.sampler.position(),
                &state.route.stops,
                last_rounds,
            )?;
            state.finalizing = true;
        }

        let result = inner.backend.finalize_route(&inner.config.route_id).await;

        {
            let mut guard = lock(&inner.state);
            let state = &mut *guard;
            state.finalizing = false;
            let now = Utc::now();
            if let Err(e) = result {
                tracing::error!(error = %e, "Finalize failed");
                inner.emit(EngineEvent::Alert {
                    message: format!("Could not finish the route: {}", e),
                });
                inner.publish(state, now);
                return Err(e);
            }
            self.complete_locally(state, now);
            inner.emit(EngineEvent::Haptic);
            inner.emit(EngineEvent::toast(ToastLevel::Success, "Route finished"));
        }

        tracing::info!(route_id = %inner.config.route_id, "Route finalized");
        self.abort_tasks();
        self.record_achievement("route_completed", None).await;
        Ok(())
    }

    fn complete_locally(&self, state: &mut EngineState, now: DateTime<Utc>) {
        state.cursor.mark_finalized();
        state.route.status = RouteStatus::Completed;
        if let Some(last) = state.route.stops.last_mut() {
            last.departed_at.get_or_insert(now);
        }
        state.sampler.stop();
        state.dwell.reset();
        self.inner.emit(EngineEvent::Finalized);
        self.inner.publish(state, now);
    }

    /// Re-fetch route, participants and pot and reconcile local state.
    pub async fn refresh(&self) -> Result<()> {
        let inner = &self.inner;
        let route_id = &inner.config.route_id;
        let read_at = lock(&inner.state).ledger.generation();
        let (route, participants, pot) = tokio::try_join!(
            inner.backend.get_route(route_id),
            inner.backend.get_participants(route_id),
            inner.backend.get_pot(route_id),
        )?;

        let now = Utc::now();
        let finalized_remotely = {
            let mut guard = lock(&inner.state);
            let state = &mut *guard;

            let ledger = &state.ledger;
            merge_stops(&mut state.route.stops, route.stops, |stop_id| {
                inner.in_flight.is_busy(stop_id) || ledger.confirmed_since(stop_id, read_at)
            });
            state.route.name = route.name;
            state.route.started_at = route.started_at.or(state.route.started_at);
            state.cursor.set_total(state.route.stops.len());
            let changed = state
                .ledger
                .reconcile(&state.route.stops, &inner.in_flight, read_at);
            state.participants = participants;
            state.pot = Some(pot);

            if !changed.is_empty() {
                tracing::debug!(stops = ?changed, "Round counts reconciled from server");
            }

            let finalized_remotely =
                route.status == RouteStatus::Completed && !state.cursor.is_finalized();
            if finalized_remotely {
                tracing::info!("Route completed by another participant");
                self.complete_locally(state, now);
            } else {
                inner.evaluate_notifications(state, now);
                inner.publish(state, now);
            }
            finalized_remotely
        };

        if finalized_remotely {
            self.abort_tasks();
        }
        Ok(())
    }

    /// Apply one server-pushed update.
    pub fn apply_realtime(&self, event: RealtimeEvent) {
        let inner = &self.inner;
        match event {
            RealtimeEvent::ParticipantPosition { participant } => {
                if participant.id == inner.config.actor_id {
                    return;
                }
                let now = Utc::now();
                let mut guard = lock(&inner.state);
                let state = &mut *guard;
                match state
                    .participants
                    .iter()
                    .position(|p| p.id == participant.id)
                {
                    Some(i) => state.participants[i] = participant,
                    None => state.participants.push(participant),
                }
                inner.evaluate_notifications(state, now);
            }
            RealtimeEvent::Nudge {
                from_participant_id,
                message,
            } => {
                tracing::debug!(from = %from_participant_id, "Nudge received");
                inner.emit(EngineEvent::Nudge {
                    from: from_participant_id,
                    message,
                });
                inner.emit(EngineEvent::Haptic);
            }
        }
    }

    /// Stop the sampler and all background tasks.
    pub fn shutdown(&self) {
        {
            let mut guard = lock(&self.inner.state);
            guard.sampler.stop();
            guard.dwell.reset();
            self.inner.publish(&guard, Utc::now());
        }
        self.abort_tasks();
        tracing::info!("Engine shut down");
    }

    fn abort_tasks(&self) {
        for task in lock(&self.inner.tasks).drain(..) {
            task.abort();
        }
    }

    /// Best-effort gamification event; failures are only logged.
    async fn record_achievement(&self, kind: &str, stop_id: Option<String>) {
        let event = AchievementEvent {
            participant_id: self.inner.config.actor_id.clone(),
            kind: kind.to_string(),
            stop_id,
        };
        if let Err(e) = self
            .inner
            .backend
            .record_achievement(&self.inner.config.route_id, &event)
            .await
        {
            tracing::debug!(kind, error = %e, "Achievement not recorded");
        }
    }
}

impl Inner {
    fn emit(&self, event: EngineEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn publish(&self, state: &EngineState, now: DateTime<Utc>) {
        self.progress.send_replace(self.build_snapshot(state, now));
    }

    fn build_snapshot(&self, state: &EngineState, now: DateTime<Utc>) -> ProgressSnapshot {
        let position = state.sampler.position();
        let current = state.current_stop();
        ProgressSnapshot {
            current_stop_index: state.cursor.index(),
            current_stop_name: current.map(|s| s.name.clone()),
            distance_to_current_stop: current
                .zip(position)
                .map(|(stop, here)| distance_m(here, stop.coordinate)),
            is_at_current_stop: current
                .is_some_and(|s| state.cursor.is_at_bar(&self.evaluator, position, s)),
            completed_stop_count: state.cursor.completed_count(),
            total_stop_count: state.cursor.total(),
            is_route_complete: state.cursor.is_complete(),
            is_finalized: state.cursor.is_finalized(),
            current_stop_rounds: current.map(|s| state.ledger.rounds(&s.id)),
            current_stop_planned_rounds: current.map(|s| s.planned_rounds),
            pacing_minutes: pacing_minutes(
                &state.route.stops,
                state.cursor.index(),
                state.route.started_at,
                now,
            ),
            sensor_status: state.sampler.status().clone(),
        }
    }

    fn evaluate_notifications(&self, state: &mut EngineState, now: DateTime<Utc>) {
        if state.cursor.is_finalized() {
            return;
        }
        let Some(index) = state.cursor.current() else {
            return;
        };
        let Some(stop) = state.route.stops.get(index) else {
            return;
        };
        let stale = Duration::seconds(self.config.participant_stale_secs);

        let nearby = state
            .participants
            .iter()
            .filter(|p| p.id != self.config.actor_id)
            .filter(|p| {
                p.locatable_position(now, stale)
                    .is_some_and(|c| self.evaluator.within_at_bar(c, stop.coordinate))
            })
            .map(|p| p.display_name.clone().unwrap_or_else(|| p.id.clone()))
            .collect();
        let people = people_present(
            &self.config.actor_id,
            &state.participants,
            stop,
            &self.evaluator,
            now,
            stale,
        );
        let inputs = PaceInputs {
            stop,
            rounds: state.ledger.rounds(&stop.id),
            nearby,
            pot_balance: state.pot.as_ref().map(PotSnapshot::balance),
            next_round_cost: state.ledger.round_cost(&stop.id, people),
        };

        for notification in state.synthesizer.evaluate(&inputs, now) {
            tracing::debug!(kind = ?notification.kind, stop_id = ?notification.stop_id, "Notification");
            self.emit(EngineEvent::Notification(notification));
        }
    }
}

/// Merge a server stop list into the local one.
///
/// Server fields win, except that locally recorded arrival and departure
/// times are kept when the server has none, and stops for which
/// `keep_rounds` holds keep their local round count. Stops new on the server
/// are appended; local stops missing from the server are kept.
fn merge_stops(local: &mut Vec<Stop>, server: Vec<Stop>, keep_rounds: impl Fn(&str) -> bool) {
    for incoming in server {
        match local.iter_mut().find(|s| s.id == incoming.id) {
            Some(existing) => {
                let arrived_at = incoming.arrived_at.or(existing.arrived_at);
                let departed_at = incoming.departed_at.or(existing.departed_at);
                let actual_rounds = if keep_rounds(&existing.id) {
                    existing.actual_rounds
                } else {
                    incoming.actual_rounds
                };
                *existing = Stop {
                    arrived_at,
                    departed_at,
                    actual_rounds,
                    ..incoming
                };
            }
            None => local.push(incoming),
        }
    }
}
