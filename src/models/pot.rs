// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared pot snapshot and spend requests.

use crate::models::Money;
use serde::{Deserialize, Serialize};

/// Server view of the group's shared pot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PotSnapshot {
    pub collected: Money,
    pub spent: Money,
    #[serde(default)]
    pub contributions: Vec<PotContribution>,
}

impl PotSnapshot {
    pub fn balance(&self) -> Money {
        self.collected - self.spent
    }

    pub fn unpaid_count(&self) -> usize {
        self.contributions.iter().filter(|c| !c.paid).count()
    }
}

/// Whether a participant has paid into the pot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PotContribution {
    pub participant_id: String,
    pub paid: bool,
}

/// Body of `POST /pot` with `action = "spend"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PotSpendRequest {
    pub action: String,
    pub amount: Money,
    pub description: String,
}

impl PotSpendRequest {
    pub fn spend(amount: Money, description: impl Into<String>) -> Self {
        Self {
            action: "spend".to_string(),
            amount,
            description: description.into(),
        }
    }
}
