// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Pacing and deduplicated group notifications.

use crate::config::NotificationSettings;
use crate::models::{Money, Notification, NotificationKind, Stop};
use crate::time_utils::elapsed_minutes;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

/// Minutes ahead of schedule (negative when behind).
///
/// Planned stay is summed up to and including the current stop; once the
/// route is complete every stop counts. `None` until the route has started.
pub fn pacing_minutes(
    stops: &[Stop],
    current_index: usize,
    started_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<i64> {
    let started_at = started_at?;
    let planned: i64 = stops
        .iter()
        .take(current_index.saturating_add(1))
        .map(|s| i64::from(s.planned_stay_minutes))
        .sum();
    Some(planned - elapsed_minutes(started_at, now))
}

/// Inputs for one notification pass, gathered by the engine under its lock.
#[derive(Debug, Clone)]
pub struct PaceInputs<'a> {
    pub stop: &'a Stop,
    /// Optimistic round count at the stop
    pub rounds: u32,
    /// Display names of other participants currently at the stop
    pub nearby: Vec<String>,
    pub pot_balance: Option<Money>,
    pub next_round_cost: Money,
}

/// Every rule that currently holds, ignoring toggles and dedup.
pub fn candidate_notifications(inputs: &PaceInputs<'_>, now: DateTime<Utc>) -> Vec<Notification> {
    let stop = inputs.stop;
    let mut out = Vec::new();

    if let Some(arrived) = stop.arrived_at {
        let stayed = elapsed_minutes(arrived, now);
        if stayed > i64::from(stop.planned_stay_minutes) {
            out.push(Notification {
                kind: NotificationKind::TimeExceeded,
                stop_id: Some(stop.id.clone()),
                message: format!(
                    "{} min at {} (planned {} min)",
                    stayed, stop.name, stop.planned_stay_minutes
                ),
            });
        }
    }

    if stop.planned_rounds > 0 && stop.objective_met(inputs.rounds) {
        out.push(Notification {
            kind: NotificationKind::ObjectiveComplete,
            stop_id: Some(stop.id.clone()),
            message: format!("{} rounds done at {}", inputs.rounds, stop.name),
        });
    }

    if !inputs.nearby.is_empty() {
        out.push(Notification {
            kind: NotificationKind::ParticipantNearby,
            stop_id: Some(stop.id.clone()),
            message: format!("{} at {}", inputs.nearby.join(", "), stop.name),
        });
    }

    if let Some(balance) = inputs.pot_balance {
        if balance < inputs.next_round_cost {
            out.push(Notification {
                kind: NotificationKind::PotShortfall,
                stop_id: Some(stop.id.clone()),
                message: format!(
                    "Pot has {} left, next round costs {}",
                    balance, inputs.next_round_cost
                ),
            });
        }
    }

    out
}

type DedupKey = (NotificationKind, Option<String>);

/// Mutes a notification for `ttl` after it was surfaced, keyed by kind and stop.
#[derive(Debug, Clone)]
pub struct NotificationDedup {
    ttl: Duration,
    last_seen: HashMap<DedupKey, DateTime<Utc>>,
}

impl NotificationDedup {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            last_seen: HashMap::new(),
        }
    }

    /// Returns `true` if the notification should surface, and records it.
    pub fn should_emit(&mut self, notification: &Notification, now: DateTime<Utc>) -> bool {
        let key = (notification.kind, notification.stop_id.clone());
        if let Some(last) = self.last_seen.get(&key) {
            if now - *last < self.ttl {
                return false;
            }
        }
        self.last_seen.insert(key, now);
        true
    }

    /// Drop entries that can no longer suppress anything.
    pub fn cleanup(&mut self, now: DateTime<Utc>) {
        let ttl = self.ttl;
        self.last_seen.retain(|_, seen| now - *seen < ttl);
    }

    pub fn len(&self) -> usize {
        self.last_seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_seen.is_empty()
    }
}

/// Applies the notification toggles and the dedup cache.
#[derive(Debug, Clone)]
pub struct NotificationSynthesizer {
    settings: NotificationSettings,
    dedup: NotificationDedup,
}

impl NotificationSynthesizer {
    pub fn new(settings: NotificationSettings) -> Self {
        Self {
            settings,
            dedup: NotificationDedup::new(Duration::seconds(settings.dedup_ttl_secs)),
        }
    }

    /// Notifications to surface now.
    pub fn evaluate(&mut self, inputs: &PaceInputs<'_>, now: DateTime<Utc>) -> Vec<Notification> {
        let settings = self.settings;
        self.dedup.cleanup(now);
        candidate_notifications(inputs, now)
            .into_iter()
            .filter(|n| enabled(&settings, n.kind))
            .filter(|n| self.dedup.should_emit(n, now))
            .collect()
    }
}

fn enabled(settings: &NotificationSettings, kind: NotificationKind) -> bool {
    match kind {
        NotificationKind::TimeExceeded => settings.time_exceeded,
        NotificationKind::ObjectiveComplete => settings.objective_complete,
        NotificationKind::ParticipantNearby => settings.participant_nearby,
        NotificationKind::PotShortfall => settings.pot_shortfall,
    }
}
