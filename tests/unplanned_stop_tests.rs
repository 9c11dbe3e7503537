// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Dwell detection and unplanned-stop proposals.

mod common;

use chrono::{DateTime, Duration, Utc};
use common::*;
use crawl_tracker::backend::{Endpoint, MemoryBackend};
use crawl_tracker::models::EngineEvent;
use crawl_tracker::services::{RouteEngine, SampleOutcome};

fn minutes(t0: DateTime<Utc>, m: i64) -> DateTime<Utc> {
    t0 + Duration::minutes(m)
}

/// Stand still 400 m south of the first stop for the whole dwell window.
fn dwell_south(engine: &RouteEngine, t0: DateTime<Utc>) -> SampleOutcome {
    assert!(engine
        .ingest_sample(sample_at(north(-400.0), t0))
        .lookup
        .is_none());
    assert!(engine
        .ingest_sample(sample_at(north(-402.0), minutes(t0, 5)))
        .lookup
        .is_none());
    engine.ingest_sample(sample_at(north(-401.0), minutes(t0, 10)))
}

fn backend_with_places() -> MemoryBackend {
    test_backend().with_places(vec![
        // Already on the itinerary (stop "a")
        place("place-a", "The Anchor Annex", north(-395.0)),
        place("place-x", "The Hidden Tap", north(-390.0)),
    ])
}

#[tokio::test]
async fn test_dwell_proposes_unknown_place() {
    let backend = backend_with_places();
    let engine = test_engine(&backend).await;
    let mut events = engine.events();
    let t0 = Utc::now();

    let outcome = dwell_south(&engine, t0);
    outcome
        .lookup
        .expect("dwell should trigger a lookup")
        .await
        .unwrap();

    let created = backend.created_stops();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].place_id, "place-x");
    assert_eq!(created[0].order, 3);
    assert_eq!(created[0].planned_rounds, 1);

    let stops = engine.stops();
    assert_eq!(stops.len(), 4);
    assert_eq!(stops[3].stop.place_id.as_deref(), Some("place-x"));
    assert_eq!(engine.snapshot().total_stop_count, 4);
    assert!(drain(&mut events)
        .iter()
        .any(|e| matches!(e, EngineEvent::StopProposed { stop } if stop.name == "The Hidden Tap")));

    // One lookup per dwell
    let later = engine.ingest_sample(sample_at(north(-400.0), minutes(t0, 15)));
    assert!(later.lookup.is_none());
    assert_eq!(backend.calls(Endpoint::Places), 1);
}

#[tokio::test]
async fn test_movement_resets_dwell() {
    let backend = backend_with_places();
    let engine = test_engine(&backend).await;
    let t0 = Utc::now();

    engine.ingest_sample(sample_at(north(-400.0), t0));
    engine.ingest_sample(sample_at(north(-400.0), minutes(t0, 8)));
    // Moved 50 m: the window restarts here
    engine.ingest_sample(sample_at(north(-350.0), minutes(t0, 9)));
    let outcome = engine.ingest_sample(sample_at(north(-350.0), minutes(t0, 12)));
    assert!(outcome.lookup.is_none());

    let outcome = engine.ingest_sample(sample_at(north(-350.0), minutes(t0, 19)));
    outcome.lookup.expect("new dwell should trigger").await.unwrap();
    assert_eq!(backend.calls(Endpoint::Places), 1);
}

#[tokio::test]
async fn test_known_places_are_never_proposed_twice() {
    let backend = test_backend().with_places(vec![place(
        "place-a",
        "The Anchor Annex",
        north(-395.0),
    )]);
    let engine = test_engine(&backend).await;

    let outcome = dwell_south(&engine, Utc::now());
    outcome.lookup.expect("lookup").await.unwrap();

    assert_eq!(backend.calls(Endpoint::Places), 1);
    assert!(backend.created_stops().is_empty());
    assert_eq!(engine.stops().len(), 3);
}

#[tokio::test]
async fn test_dwell_at_known_stop_skips_lookup() {
    let backend = backend_with_places();
    let engine = test_engine(&backend).await;
    let t0 = Utc::now();

    engine.ingest_sample(sample_at(north(5.0), t0));
    let outcome = engine.ingest_sample(sample_at(north(4.0), minutes(t0, 11)));
    assert!(outcome.lookup.is_none());
    assert_eq!(backend.calls(Endpoint::Places), 0);
}

#[tokio::test]
async fn test_only_organizer_proposes() {
    let backend = backend_with_places();
    let engine = engine_as(&backend, GUEST).await;

    let outcome = dwell_south(&engine, Utc::now());
    assert!(outcome.lookup.is_none());
    assert_eq!(backend.calls(Endpoint::Places), 0);
}

#[tokio::test]
async fn test_lookup_failure_is_dropped() {
    let backend = backend_with_places();
    backend.fail_on(Endpoint::Places);
    let engine = test_engine(&backend).await;

    let outcome = dwell_south(&engine, Utc::now());
    outcome.lookup.expect("lookup").await.unwrap();

    assert!(backend.created_stops().is_empty());
    assert_eq!(engine.stops().len(), 3);
}

#[tokio::test]
async fn test_create_failure_leaves_itinerary_unchanged() {
    let backend = backend_with_places();
    backend.fail_on(Endpoint::CreateStop);
    let engine = test_engine(&backend).await;

    let outcome = dwell_south(&engine, Utc::now());
    outcome.lookup.expect("lookup").await.unwrap();

    assert_eq!(backend.calls(Endpoint::CreateStop), 1);
    assert_eq!(engine.stops().len(), 3);
    assert_eq!(engine.snapshot().total_stop_count, 3);
}
