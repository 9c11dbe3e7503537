// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data models for the application.

pub mod consumption;
pub mod events;
pub mod money;
pub mod participant;
pub mod place;
pub mod position;
pub mod pot;
pub mod progress;
pub mod route;

pub use consumption::{
    CheckInReceipt, CheckInRequest, ConsumptionCounters, DrinkLogRequest, UnitKind, UnitPrices,
};
pub use events::{EngineEvent, Notification, NotificationKind, RealtimeEvent, ToastLevel};
pub use money::Money;
pub use participant::{Participant, PositionReport};
pub use place::{AchievementEvent, NewStopRequest, PlaceCandidate, PlaceQuery};
pub use position::{Coordinate, PositionEvent, PositionSample};
pub use pot::{PotContribution, PotSnapshot, PotSpendRequest};
pub use progress::{ProgressSnapshot, SensorStatus};
pub use route::{Route, RouteStatus, Stop};
