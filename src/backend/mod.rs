// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Remote collaborators: routes, participants, check-ins, drinks, pot,
//! place lookup and the real-time update stream.
//!
//! The engine only talks to the [`RouteBackend`] trait. [`HttpBackend`] is the
//! production implementation; [`MemoryBackend`] serves offline mode and tests.

pub mod http;
pub mod memory;

pub use http::HttpBackend;
pub use memory::MemoryBackend;

use crate::error::Result;
use crate::models::{
    AchievementEvent, CheckInReceipt, CheckInRequest, DrinkLogRequest, NewStopRequest,
    Participant, PlaceCandidate, PlaceQuery, PositionReport, PotSnapshot, PotSpendRequest,
    RealtimeEvent, Route, Stop,
};
use async_trait::async_trait;
use std::fmt;
use tokio::sync::mpsc;

/// Buffer of the real-time update channel.
pub const UPDATE_CHANNEL_CAPACITY: usize = 64;

/// One remote operation, for logging and fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Route,
    Participants,
    ReportPosition,
    CheckIn,
    DrinkLog,
    Pot,
    PotSpend,
    Places,
    CreateStop,
    Finalize,
    Achievement,
    Updates,
}

impl Endpoint {
    pub fn as_str(self) -> &'static str {
        match self {
            Endpoint::Route => "route",
            Endpoint::Participants => "participants",
            Endpoint::ReportPosition => "report_position",
            Endpoint::CheckIn => "check_in",
            Endpoint::DrinkLog => "drink_log",
            Endpoint::Pot => "pot",
            Endpoint::PotSpend => "pot_spend",
            Endpoint::Places => "places",
            Endpoint::CreateStop => "create_stop",
            Endpoint::Finalize => "finalize",
            Endpoint::Achievement => "achievement",
            Endpoint::Updates => "updates",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the engine needs from the server.
#[async_trait]
pub trait RouteBackend: Send + Sync {
    async fn get_route(&self, route_id: &str) -> Result<Route>;

    async fn get_participants(&self, route_id: &str) -> Result<Vec<Participant>>;

    async fn report_position(&self, route_id: &str, report: &PositionReport) -> Result<()>;

    /// One round at a stop; the receipt carries the server round count.
    async fn check_in(&self, route_id: &str, request: &CheckInRequest) -> Result<CheckInReceipt>;

    /// One consumed unit.
    async fn log_drink(&self, route_id: &str, request: &DrinkLogRequest) -> Result<()>;

    async fn get_pot(&self, route_id: &str) -> Result<PotSnapshot>;

    /// Returns the pot after the spend.
    async fn spend_from_pot(&self, route_id: &str, request: &PotSpendRequest) -> Result<PotSnapshot>;

    async fn nearby_places(&self, query: &PlaceQuery) -> Result<Vec<PlaceCandidate>>;

    /// Append a stop to the route; returns the created stop.
    async fn create_stop(&self, route_id: &str, request: &NewStopRequest) -> Result<Stop>;

    /// Mark the route completed.
    async fn finalize_route(&self, route_id: &str) -> Result<()>;

    async fn record_achievement(&self, route_id: &str, event: &AchievementEvent) -> Result<()>;

    /// Open the real-time update stream. The channel closes when the stream ends.
    async fn subscribe_updates(&self, route_id: &str) -> Result<mpsc::Receiver<RealtimeEvent>>;
}
