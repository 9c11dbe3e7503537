// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Platform position stream read as newline-delimited JSON.
//!
//! Each line is either a sample (`{"lat":..,"lng":..,"accuracy":..,"timestamp":..}`,
//! with `timestamp` optional and defaulting to the time the line is read) or
//! an outage (`{"unavailable":"reason"}`). Lines that parse as neither are
//! logged and skipped; the stream itself never fails the engine.

use crate::models::{Coordinate, PositionEvent, PositionSample};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;

#[derive(Deserialize)]
#[serde(untagged)]
enum PositionLine {
    Sample {
        lat: f64,
        lng: f64,
        accuracy: f64,
        #[serde(default)]
        timestamp: Option<DateTime<Utc>>,
    },
    Unavailable {
        unavailable: String,
    },
}

/// Parse one line of the position stream.
pub fn parse_position_line(line: &str) -> Result<PositionEvent, serde_json::Error> {
    Ok(match serde_json::from_str(line)? {
        PositionLine::Sample {
            lat,
            lng,
            accuracy,
            timestamp,
        } => PositionEvent::Sample(PositionSample::new(
            Coordinate::new(lat, lng),
            accuracy,
            timestamp.unwrap_or_else(Utc::now),
        )),
        PositionLine::Unavailable { unavailable } => PositionEvent::Unavailable(unavailable),
    })
}

/// Forward every parsed line of `reader` into `tx` until EOF or the receiver closes.
pub async fn pump_positions<R>(reader: R, tx: mpsc::Sender<PositionEvent>) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match parse_position_line(line) {
            Ok(event) => {
                if tx.send(event).await.is_err() {
                    break;
                }
            }
            Err(e) => tracing::warn!(error = %e, "Skipping malformed position line"),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sample_line() {
        let event = parse_position_line(
            r#"{"lat":52.52,"lng":13.405,"accuracy":8.0,"timestamp":"2026-10-16T20:00:00Z"}"#,
        )
        .unwrap();
        match event {
            PositionEvent::Sample(sample) => {
                assert_eq!(sample.lat, 52.52);
                assert_eq!(sample.accuracy, 8.0);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_parse_sample_without_timestamp() {
        let before = Utc::now();
        let event = parse_position_line(r#"{"lat":52.52,"lng":13.405,"accuracy":8.0}"#).unwrap();
        match event {
            PositionEvent::Sample(sample) => {
                assert_eq!(sample.coordinate(), Coordinate::new(52.52, 13.405));
                assert!(sample.timestamp >= before);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_parse_unavailable_line() {
        assert_eq!(
            parse_position_line(r#"{"unavailable":"permission denied"}"#).unwrap(),
            PositionEvent::Unavailable("permission denied".to_string())
        );
    }

    #[test]
    fn test_parse_garbage_fails() {
        assert!(parse_position_line("not json").is_err());
        assert!(parse_position_line(r#"{"lat":1.0}"#).is_err());
    }

    #[tokio::test]
    async fn test_pump_skips_bad_lines() {
        let input = concat!(
            "{\"lat\":52.52,\"lng\":13.405,\"accuracy\":8.0,\"timestamp\":\"2026-10-16T20:00:00Z\"}\n",
            "\n",
            "garbage\n",
            "{\"unavailable\":\"timeout\"}\n",
        );
        let (tx, mut rx) = mpsc::channel(8);
        pump_positions(input.as_bytes(), tx).await.unwrap();

        assert!(matches!(rx.recv().await, Some(PositionEvent::Sample(_))));
        assert_eq!(
            rx.recv().await,
            Some(PositionEvent::Unavailable("timeout".to_string()))
        );
        assert_eq!(rx.recv().await, None);
    }
}
