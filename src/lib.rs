// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Crawl-Tracker: live route progress for group venue crawls
//!
//! This crate provides the client-side progress engine (position sampling,
//! stop proximity, itinerary advancement, consumption ledger, unplanned-stop
//! detection, pacing) and a small local HTTP API the UI shell talks to.

pub mod backend;
pub mod config;
pub mod error;
pub mod input;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use services::RouteEngine;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub engine: RouteEngine,
}
