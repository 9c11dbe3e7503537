// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Participant positions shared through the participants collaborator.

use crate::models::Coordinate;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Last reported position of one group member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    pub coordinate: Coordinate,
    /// Null means the participant never reported a position
    #[serde(default)]
    pub last_seen_at: Option<DateTime<Utc>>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    /// Guests join without a durable account
    #[serde(default)]
    pub is_guest: bool,
}

fn default_active() -> bool {
    true
}

impl Participant {
    /// Position usable for proximity, or `None` when it must be ignored.
    ///
    /// Unknown coordinates, a missing or stale `last_seen_at`, and inactive
    /// participants all yield `None`.
    pub fn locatable_position(&self, now: DateTime<Utc>, stale_after: Duration) -> Option<Coordinate> {
        if !self.is_active || !self.coordinate.is_known() {
            return None;
        }
        let seen = self.last_seen_at?;
        if now - seen > stale_after {
            return None;
        }
        Some(self.coordinate)
    }
}

/// Own-position report sent to the participants collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionReport {
    pub participant_id: String,
    pub coordinate: Coordinate,
    pub accuracy: f64,
    pub reported_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn participant(lat: f64, lng: f64, seen: Option<DateTime<Utc>>) -> Participant {
        Participant {
            id: "p1".to_string(),
            display_name: Some("Sam".to_string()),
            image: None,
            coordinate: Coordinate::new(lat, lng),
            last_seen_at: seen,
            is_active: true,
            is_guest: false,
        }
    }

    #[test]
    fn test_zero_position_is_not_locatable() {
        let now = Utc::now();
        let p = participant(0.0, 0.0, Some(now));
        assert_eq!(p.locatable_position(now, Duration::minutes(5)), None);
    }

    #[test]
    fn test_never_seen_is_not_locatable() {
        let now = Utc::now();
        let p = participant(52.5, 13.4, None);
        assert_eq!(p.locatable_position(now, Duration::minutes(5)), None);
    }

    #[test]
    fn test_stale_position_is_not_locatable() {
        let now = Utc::now();
        let p = participant(52.5, 13.4, Some(now - Duration::minutes(6)));
        assert_eq!(p.locatable_position(now, Duration::minutes(5)), None);

        let fresh = participant(52.5, 13.4, Some(now - Duration::minutes(1)));
        assert_eq!(
            fresh.locatable_position(now, Duration::minutes(5)),
            Some(Coordinate::new(52.5, 13.4))
        );
    }

    #[test]
    fn test_inactive_is_not_locatable() {
        let now = Utc::now();
        let mut p = participant(52.5, 13.4, Some(now));
        p.is_active = false;
        assert_eq!(p.locatable_position(now, Duration::minutes(5)), None);
    }
}
