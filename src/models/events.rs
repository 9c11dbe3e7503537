// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Events flowing into and out of the engine.

use crate::models::{Money, Participant, Stop, UnitKind};
use serde::{Deserialize, Serialize};

/// Kinds of pacing notification. Dedup is keyed on kind + stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    TimeExceeded,
    ObjectiveComplete,
    ParticipantNearby,
    PotShortfall,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub kind: NotificationKind,
    pub stop_id: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToastLevel {
    Success,
    Info,
    Error,
}

/// Transient signals for the UI layer (toasts, haptics, notifications...).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    CheckedIn {
        stop_id: String,
    },
    Advanced {
        from: usize,
        to: usize,
        automatic: bool,
    },
    RoundLogged {
        stop_id: String,
        rounds: u32,
        people: u32,
        cost: Money,
    },
    UnitsLogged {
        stop_id: String,
        unit: UnitKind,
        count: u32,
        cost: Money,
    },
    Haptic,
    Toast {
        level: ToastLevel,
        message: String,
    },
    /// Must be acknowledged by the user before continuing
    Alert {
        message: String,
    },
    Notification(Notification),
    StopProposed {
        stop: Stop,
    },
    Nudge {
        from: String,
        message: String,
    },
    Finalized,
}

impl EngineEvent {
    pub fn toast(level: ToastLevel, message: impl Into<String>) -> Self {
        EngineEvent::Toast {
            level,
            message: message.into(),
        }
    }
}

/// Server-pushed updates from the real-time stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RealtimeEvent {
    ParticipantPosition {
        participant: Participant,
    },
    #[serde(rename_all = "camelCase")]
    Nudge {
        from_participant_id: String,
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_realtime_event_parsing() {
        let json = r#"{"type":"nudge","fromParticipantId":"u2","message":"Drink up!"}"#;
        let event: RealtimeEvent = serde_json::from_str(json).unwrap();
        assert_eq!(
            event,
            RealtimeEvent::Nudge {
                from_participant_id: "u2".to_string(),
                message: "Drink up!".to_string(),
            }
        );

        let json = r#"{"type":"participant_position","participant":{
            "id":"u3","coordinate":{"lat":52.5,"lng":13.4},"lastSeenAt":"2026-03-01T20:00:00Z"}}"#;
        let event: RealtimeEvent = serde_json::from_str(json).unwrap();
        match event {
            RealtimeEvent::ParticipantPosition { participant } => {
                assert_eq!(participant.id, "u3");
                assert!(participant.is_active);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_engine_event_tagging() {
        let json = serde_json::to_value(EngineEvent::Advanced {
            from: 0,
            to: 1,
            automatic: true,
        })
        .unwrap();
        assert_eq!(json["type"], "advanced");
        assert_eq!(json["to"], 1);
    }
}
