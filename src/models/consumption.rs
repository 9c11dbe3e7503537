// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-stop consumption counters and the check-in / drink-log payloads.

use crate::models::Money;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Kind of consumed unit tracked per stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    Drink,
    Food,
}

impl UnitKind {
    pub const ALL: [UnitKind; 2] = [UnitKind::Drink, UnitKind::Food];

    pub fn as_str(self) -> &'static str {
        match self {
            UnitKind::Drink => "drink",
            UnitKind::Food => "food",
        }
    }
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Default per-unit prices applied to stops without an override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitPrices {
    pub drink: Money,
    pub food: Money,
}

impl UnitPrices {
    pub fn get(&self, kind: UnitKind) -> Money {
        match kind {
            UnitKind::Drink => self.drink,
            UnitKind::Food => self.food,
        }
    }
}

impl Default for UnitPrices {
    fn default() -> Self {
        Self {
            drink: Money::from_cents(500),
            food: Money::from_cents(800),
        }
    }
}

/// Client-side optimistic copy of one stop's counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumptionCounters {
    pub rounds: u32,
    pub units: BTreeMap<UnitKind, u32>,
    pub prices: BTreeMap<UnitKind, Money>,
}

impl ConsumptionCounters {
    pub fn new(rounds: u32, defaults: &UnitPrices) -> Self {
        Self {
            rounds,
            units: UnitKind::ALL.iter().map(|k| (*k, 0)).collect(),
            prices: UnitKind::ALL.iter().map(|k| (*k, defaults.get(*k))).collect(),
        }
    }

    pub fn units(&self, kind: UnitKind) -> u32 {
        self.units.get(&kind).copied().unwrap_or(0)
    }

    pub fn price(&self, kind: UnitKind) -> Money {
        self.prices.get(&kind).copied().unwrap_or(Money::ZERO)
    }
}

/// Body of the check-in collaborator call (one per logged round).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckInRequest {
    pub stop_id: String,
    pub participant_id: String,
    pub people_count: u32,
    pub checked_in_at: DateTime<Utc>,
}

/// Server answer to a check-in: the authoritative round count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckInReceipt {
    pub stop_id: String,
    pub actual_rounds: u32,
}

/// Body of the drink-log collaborator call (one per consumed unit).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrinkLogRequest {
    pub stop_id: String,
    pub participant_id: String,
    pub unit: UnitKind,
    pub logged_at: DateTime<Utc>,
}
