// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - engine components and the orchestrator.

pub mod distance;
pub mod engine;
pub mod itinerary;
pub mod ledger;
pub mod optimistic;
pub mod pace;
pub mod proximity;
pub mod sampler;
pub mod unplanned;

pub use distance::distance_m;
pub use engine::{RoundOutcome, RouteEngine, SampleOutcome, StopView, UnitsOutcome};
pub use itinerary::{Advance, AdvanceReason, ItineraryCursor};
pub use ledger::{ConsumptionLedger, CounterDelta, InFlightRegistry};
pub use pace::{pacing_minutes, NotificationDedup, NotificationSynthesizer};
pub use proximity::ProximityEvaluator;
pub use sampler::GeoSampler;
pub use unplanned::DwellDetector;
