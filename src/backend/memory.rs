// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-memory route backend for offline mode and tests.
//!
//! Behaves like the server for the calls the engine makes (round counts,
//! pot totals, appended stops) and records every write so tests can inspect
//! what was sent. Individual endpoints can be made to fail or to block until
//! released.

use super::{Endpoint, RouteBackend, UPDATE_CHANNEL_CAPACITY};
use crate::error::{AppError, Result};
use crate::models::{
    AchievementEvent, CheckInReceipt, CheckInRequest, DrinkLogRequest, NewStopRequest,
    Participant, PlaceCandidate, PlaceQuery, PositionReport, PotSnapshot, PotSpendRequest,
    RealtimeEvent, Route, RouteStatus, Stop,
};
use crate::services::optimistic::lock;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Notify};

#[derive(Debug, Default)]
struct MemoryState {
    route: Option<Route>,
    participants: Vec<Participant>,
    pot: PotSnapshot,
    places: Vec<PlaceCandidate>,

    failing: HashSet<Endpoint>,
    paused: HashMap<Endpoint, Arc<Notify>>,
    calls: HashMap<Endpoint, usize>,

    position_reports: Vec<PositionReport>,
    check_ins: Vec<CheckInRequest>,
    drink_logs: Vec<DrinkLogRequest>,
    spends: Vec<PotSpendRequest>,
    created_stops: Vec<NewStopRequest>,
    achievements: Vec<AchievementEvent>,

    update_senders: Vec<mpsc::Sender<RealtimeEvent>>,
    next_stop_id: usize,
}

/// Offline route fixture: the route plus whatever the server would hold.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteFixture {
    pub route: Route,
    #[serde(default)]
    pub participants: Vec<Participant>,
    #[serde(default)]
    pub pot: PotSnapshot,
    #[serde(default)]
    pub places: Vec<PlaceCandidate>,
}

/// Route backend held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryBackend {
    pub fn new(route: Route) -> Self {
        let backend = Self::default();
        lock(&backend.state).route = Some(route);
        backend
    }

    /// Load a [`RouteFixture`] from a JSON file.
    pub fn load_from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
        let fixture: RouteFixture = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path.display(), e))?;
        Ok(Self::new(fixture.route)
            .with_participants(fixture.participants)
            .with_pot(fixture.pot)
            .with_places(fixture.places))
    }

    pub fn with_participants(self, participants: Vec<Participant>) -> Self {
        lock(&self.state).participants = participants;
        self
    }

    pub fn with_pot(self, pot: PotSnapshot) -> Self {
        lock(&self.state).pot = pot;
        self
    }

    pub fn with_places(self, places: Vec<PlaceCandidate>) -> Self {
        lock(&self.state).places = places;
        self
    }

    /// Make every call to `endpoint` fail with a backend error.
    pub fn fail_on(&self, endpoint: Endpoint) {
        lock(&self.state).failing.insert(endpoint);
    }

    pub fn clear_failures(&self) {
        lock(&self.state).failing.clear();
    }

    /// Block calls to `endpoint` until the returned handle is notified.
    ///
    /// Each `notify_one()` releases one call.
    pub fn pause(&self, endpoint: Endpoint) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        lock(&self.state).paused.insert(endpoint, Arc::clone(&notify));
        notify
    }

    pub fn resume(&self, endpoint: Endpoint) {
        if let Some(notify) = lock(&self.state).paused.remove(&endpoint) {
            notify.notify_waiters();
        }
    }

    /// Replace a participant's server record (as another client would).
    pub fn upsert_participant(&self, participant: Participant) {
        let mut state = lock(&self.state);
        match state.participants.iter().position(|p| p.id == participant.id) {
            Some(i) => state.participants[i] = participant,
            None => state.participants.push(participant),
        }
    }

    /// Overwrite a stop's server round count (as another client would).
    pub fn set_actual_rounds(&self, stop_id: &str, rounds: u32) {
        let mut state = lock(&self.state);
        if let Some(stop) = state
            .route
            .as_mut()
            .and_then(|r| r.stops.iter_mut().find(|s| s.id == stop_id))
        {
            stop.actual_rounds = rounds;
        }
    }

    /// Push a real-time event to every open subscription.
    pub async fn push_update(&self, event: RealtimeEvent) {
        let senders = lock(&self.state).update_senders.clone();
        for sender in senders {
            let _ = sender.send(event.clone()).await;
        }
    }

    pub fn calls(&self, endpoint: Endpoint) -> usize {
        lock(&self.state).calls.get(&endpoint).copied().unwrap_or(0)
    }

    pub fn route(&self) -> Option<Route> {
        lock(&self.state).route.clone()
    }

    pub fn pot(&self) -> PotSnapshot {
        lock(&self.state).pot.clone()
    }

    pub fn check_ins(&self) -> Vec<CheckInRequest> {
        lock(&self.state).check_ins.clone()
    }

    pub fn drink_logs(&self) -> Vec<DrinkLogRequest> {
        lock(&self.state).drink_logs.clone()
    }

    pub fn spends(&self) -> Vec<PotSpendRequest> {
        lock(&self.state).spends.clone()
    }

    pub fn position_reports(&self) -> Vec<PositionReport> {
        lock(&self.state).position_reports.clone()
    }

    pub fn created_stops(&self) -> Vec<NewStopRequest> {
        lock(&self.state).created_stops.clone()
    }

    pub fn achievements(&self) -> Vec<AchievementEvent> {
        lock(&self.state).achievements.clone()
    }

    /// Count the call, then honour pause and failure injection.
    async fn enter(&self, endpoint: Endpoint) -> Result<()> {
        let paused = {
            let mut state = lock(&self.state);
            *state.calls.entry(endpoint).or_insert(0) += 1;
            state.paused.get(&endpoint).cloned()
        };
        if let Some(notify) = paused {
            notify.notified().await;
        }
        if lock(&self.state).failing.contains(&endpoint) {
            return Err(AppError::Backend(format!("{} unavailable", endpoint)));
        }
        Ok(())
    }

    fn with_route<T>(&self, route_id: &str, f: impl FnOnce(&mut Route) -> Result<T>) -> Result<T> {
        let mut state = lock(&self.state);
        match state.route.as_mut() {
            Some(route) if route.id == route_id => f(route),
            _ => Err(AppError::NotFound(format!("route {}", route_id))),
        }
    }
}

#[async_trait]
impl RouteBackend for MemoryBackend {
    async fn get_route(&self, route_id: &str) -> Result<Route> {
        self.enter(Endpoint::Route).await?;
        self.with_route(route_id, |route| Ok(route.clone()))
    }

    async fn get_participants(&self, route_id: &str) -> Result<Vec<Participant>> {
        self.enter(Endpoint::Participants).await?;
        self.with_route(route_id, |_| Ok(()))?;
        Ok(lock(&self.state).participants.clone())
    }

    async fn report_position(&self, _route_id: &str, report: &PositionReport) -> Result<()> {
        self.enter(Endpoint::ReportPosition).await?;
        let mut state = lock(&self.state);
        state.position_reports.push(report.clone());
        if let Some(p) = state
            .participants
            .iter_mut()
            .find(|p| p.id == report.participant_id)
        {
            p.coordinate = report.coordinate;
            p.last_seen_at = Some(report.reported_at);
        }
        Ok(())
    }

    async fn check_in(&self, route_id: &str, request: &CheckInRequest) -> Result<CheckInReceipt> {
        self.enter(Endpoint::CheckIn).await?;
        let receipt = self.with_route(route_id, |route| {
            let stop = route
                .stops
                .iter_mut()
                .find(|s| s.id == request.stop_id)
                .ok_or_else(|| AppError::NotFound(format!("stop {}", request.stop_id)))?;
            stop.actual_rounds += 1;
            Ok(CheckInReceipt {
                stop_id: stop.id.clone(),
                actual_rounds: stop.actual_rounds,
            })
        })?;
        lock(&self.state).check_ins.push(request.clone());
        Ok(receipt)
    }

    async fn log_drink(&self, _route_id: &str, request: &DrinkLogRequest) -> Result<()> {
        self.enter(Endpoint::DrinkLog).await?;
        lock(&self.state).drink_logs.push(request.clone());
        Ok(())
    }

    async fn get_pot(&self, _route_id: &str) -> Result<PotSnapshot> {
        self.enter(Endpoint::Pot).await?;
        Ok(lock(&self.state).pot.clone())
    }

    async fn spend_from_pot(
        &self,
        _route_id: &str,
        request: &PotSpendRequest,
    ) -> Result<PotSnapshot> {
        self.enter(Endpoint::PotSpend).await?;
        if request.action != "spend" {
            return Err(AppError::BadRequest(format!(
                "unknown pot action {}",
                request.action
            )));
        }
        let mut state = lock(&self.state);
        state.pot.spent += request.amount;
        state.spends.push(request.clone());
        Ok(state.pot.clone())
    }

    async fn nearby_places(&self, query: &PlaceQuery) -> Result<Vec<PlaceCandidate>> {
        self.enter(Endpoint::Places).await?;
        let center = crate::models::Coordinate::new(query.lat, query.lng);
        Ok(lock(&self.state)
            .places
            .iter()
            .filter(|p| crate::services::distance::distance_m(center, p.coordinate) <= query.radius)
            .cloned()
            .collect())
    }

    async fn create_stop(&self, route_id: &str, request: &NewStopRequest) -> Result<Stop> {
        self.enter(Endpoint::CreateStop).await?;
        let mut state = lock(&self.state);
        state.next_stop_id += 1;
        let stop = Stop {
            id: format!("proposed-{}", state.next_stop_id),
            name: request.name.clone(),
            address: request.address.clone(),
            coordinate: request.coordinate,
            planned_rounds: request.planned_rounds,
            max_rounds: None,
            actual_rounds: 0,
            place_id: Some(request.place_id.clone()),
            planned_stay_minutes: 30,
            arrived_at: None,
            departed_at: None,
        };
        let route = match state.route.as_mut() {
            Some(route) if route.id == route_id => route,
            _ => return Err(AppError::NotFound(format!("route {}", route_id))),
        };
        let at = request.order.min(route.stops.len());
        route.stops.insert(at, stop.clone());
        state.created_stops.push(request.clone());
        Ok(stop)
    }

    async fn finalize_route(&self, route_id: &str) -> Result<()> {
        self.enter(Endpoint::Finalize).await?;
        self.with_route(route_id, |route| {
            route.status = RouteStatus::Completed;
            Ok(())
        })
    }

    async fn record_achievement(&self, _route_id: &str, event: &AchievementEvent) -> Result<()> {
        self.enter(Endpoint::Achievement).await?;
        lock(&self.state).achievements.push(event.clone());
        Ok(())
    }

    async fn subscribe_updates(&self, route_id: &str) -> Result<mpsc::Receiver<RealtimeEvent>> {
        self.enter(Endpoint::Updates).await?;
        self.with_route(route_id, |_| Ok(()))?;
        let (tx, rx) = mpsc::channel(UPDATE_CHANNEL_CAPACITY);
        lock(&self.state).update_senders.push(tx);
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Coordinate, Money};
    use chrono::Utc;

    fn route() -> Route {
        Route {
            id: "r1".to_string(),
            name: "Friday".to_string(),
            organizer_id: "alice".to_string(),
            started_at: None,
            status: RouteStatus::Active,
            stops: vec![Stop {
                id: "s1".to_string(),
                name: "The Anchor".to_string(),
                address: None,
                coordinate: Coordinate::new(52.52, 13.405),
                planned_rounds: 2,
                max_rounds: None,
                actual_rounds: 0,
                place_id: Some("anchor".to_string()),
                planned_stay_minutes: 45,
                arrived_at: None,
                departed_at: None,
            }],
        }
    }

    #[tokio::test]
    async fn test_check_in_counts_rounds() {
        let backend = MemoryBackend::new(route());
        let request = CheckInRequest {
            stop_id: "s1".to_string(),
            participant_id: "alice".to_string(),
            people_count: 3,
            checked_in_at: Utc::now(),
        };
        assert_eq!(backend.check_in("r1", &request).await.unwrap().actual_rounds, 1);
        assert_eq!(backend.check_in("r1", &request).await.unwrap().actual_rounds, 2);
        assert_eq!(backend.check_ins().len(), 2);
        assert_eq!(backend.calls(Endpoint::CheckIn), 2);
    }

    #[tokio::test]
    async fn test_fail_on_endpoint() {
        let backend = MemoryBackend::new(route());
        backend.fail_on(Endpoint::PotSpend);

        let err = backend
            .spend_from_pot("r1", &PotSpendRequest::spend(Money::from_cents(450), "x"))
            .await
            .unwrap_err();
        assert!(err.is_backend_error());
        assert_eq!(backend.pot().spent, Money::ZERO);

        backend.clear_failures();
        let pot = backend
            .spend_from_pot("r1", &PotSpendRequest::spend(Money::from_cents(450), "x"))
            .await
            .unwrap();
        assert_eq!(pot.spent.to_string(), "4.50");
    }

    #[tokio::test]
    async fn test_load_fixture_file() {
        let path = std::env::temp_dir().join(format!("crawl-fixture-{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"{
                "route": {
                    "id": "r1",
                    "name": "Friday",
                    "organizerId": "alice",
                    "stops": [{
                        "id": "s1",
                        "name": "The Anchor",
                        "coordinate": {"lat": 52.52, "lng": 13.405},
                        "plannedRounds": 2,
                        "plannedStayMinutes": 45
                    }]
                },
                "pot": {"collected": "40.00", "spent": "0.00"}
            }"#,
        )
        .unwrap();

        let backend = MemoryBackend::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        let route = backend.get_route("r1").await.unwrap();
        assert_eq!(route.stops.len(), 1);
        assert_eq!(backend.pot().balance().to_string(), "40.00");
        assert!(backend.get_participants("r1").await.unwrap().is_empty());
    }

    #[test]
    fn test_load_fixture_missing_file() {
        let err = MemoryBackend::load_from_file("/nonexistent/route.json").unwrap_err();
        assert!(err.to_string().contains("Failed to read"));
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let backend = MemoryBackend::new(route());
        assert!(matches!(
            backend.get_route("nope").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_create_stop_appends() {
        let backend = MemoryBackend::new(route());
        let request = NewStopRequest {
            name: "The Crown".to_string(),
            address: None,
            coordinate: Coordinate::new(52.53, 13.41),
            place_id: "crown".to_string(),
            planned_rounds: 1,
            order: 1,
        };
        let stop = backend.create_stop("r1", &request).await.unwrap();
        assert_eq!(stop.place_id.as_deref(), Some("crown"));

        let route = backend.route().unwrap();
        assert_eq!(route.stops.len(), 2);
        assert_eq!(route.stops[1].id, stop.id);
    }
}
