// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use chrono::{DateTime, Duration, Utc};
use crawl_tracker::backend::MemoryBackend;
use crawl_tracker::config::Config;
use crawl_tracker::models::{
    Coordinate, EngineEvent, Participant, PlaceCandidate, PositionSample, PotSnapshot, Route,
    RouteStatus, Stop,
};
use crawl_tracker::routes::create_router;
use crawl_tracker::services::RouteEngine;
use crawl_tracker::AppState;
use std::sync::Arc;
use tokio::sync::broadcast;

pub const ROUTE_ID: &str = "route-1";
pub const ORGANIZER: &str = "organizer";
pub const GUEST: &str = "guest";

/// Roughly one meter of latitude in degrees.
const M: f64 = 1.0 / 111_195.0;
const ORIGIN: Coordinate = Coordinate::new(52.52, 13.405);

/// A point `meters` north of the first stop.
pub fn north(meters: f64) -> Coordinate {
    Coordinate::new(ORIGIN.lat + meters * M, ORIGIN.lng)
}

pub fn stop(id: &str, name: &str, at: Coordinate, planned_rounds: u32) -> Stop {
    Stop {
        id: id.to_string(),
        name: name.to_string(),
        address: None,
        coordinate: at,
        planned_rounds,
        max_rounds: None,
        actual_rounds: 0,
        place_id: Some(format!("place-{}", id)),
        planned_stay_minutes: 45,
        arrived_at: None,
        departed_at: None,
    }
}

/// Three stops 500 m apart heading north: A (2 rounds), B (1), C (1).
pub fn test_route() -> Route {
    Route {
        id: ROUTE_ID.to_string(),
        name: "Friday Crawl".to_string(),
        organizer_id: ORGANIZER.to_string(),
        started_at: Some(Utc::now() - Duration::minutes(20)),
        status: RouteStatus::Active,
        stops: vec![
            stop("a", "The Anchor", north(0.0), 2),
            stop("b", "The Bell", north(500.0), 1),
            stop("c", "The Crown", north(1000.0), 1),
        ],
    }
}

pub fn participant(id: &str, at: Coordinate) -> Participant {
    Participant {
        id: id.to_string(),
        display_name: Some(id.to_uppercase()),
        image: None,
        coordinate: at,
        last_seen_at: Some(Utc::now()),
        is_active: true,
        is_guest: false,
    }
}

#[allow(dead_code)]
pub fn place(place_id: &str, name: &str, at: Coordinate) -> PlaceCandidate {
    PlaceCandidate {
        place_id: place_id.to_string(),
        name: name.to_string(),
        address: None,
        coordinate: at,
    }
}

pub fn test_pot() -> PotSnapshot {
    PotSnapshot {
        collected: "100.00".parse().expect("valid money"),
        spent: "0.00".parse().expect("valid money"),
        contributions: Vec::new(),
    }
}

pub fn test_backend() -> MemoryBackend {
    MemoryBackend::new(test_route()).with_pot(test_pot())
}

pub fn test_config(actor_id: &str) -> Config {
    Config {
        route_id: ROUTE_ID.to_string(),
        actor_id: actor_id.to_string(),
        ..Config::test_default()
    }
}

/// Engine without background tasks, acting as `actor_id`.
pub async fn engine_as(backend: &MemoryBackend, actor_id: &str) -> RouteEngine {
    RouteEngine::load(test_config(actor_id), Arc::new(backend.clone()))
        .await
        .expect("engine should load")
}

/// Engine acting as the organizer.
pub async fn test_engine(backend: &MemoryBackend) -> RouteEngine {
    engine_as(backend, ORGANIZER).await
}

pub fn sample(at: Coordinate) -> PositionSample {
    PositionSample::new(at, 10.0, Utc::now())
}

#[allow(dead_code)]
pub fn sample_at(at: Coordinate, timestamp: DateTime<Utc>) -> PositionSample {
    PositionSample::new(at, 10.0, timestamp)
}

/// Everything currently buffered on an event receiver.
#[allow(dead_code)]
pub fn drain(rx: &mut broadcast::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Router over an engine, as the binary builds it.
#[allow(dead_code)]
pub fn create_test_app(engine: RouteEngine) -> axum::Router {
    let state = Arc::new(AppState {
        config: engine.config().clone(),
        engine,
    });
    create_router(state)
}

/// Wait until the backend has seen `count` calls to `endpoint`.
#[allow(dead_code)]
pub async fn wait_for_calls(
    backend: &MemoryBackend,
    endpoint: crawl_tracker::backend::Endpoint,
    count: usize,
) {
    for _ in 0..400 {
        if backend.calls(endpoint) >= count {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {} call(s) to {}", count, endpoint);
}
