// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Coordinates and raw position samples.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// A WGS84 coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Whether this coordinate can stand for a real location.
    ///
    /// (0,0) is what clients report before they have a fix, so it is never a
    /// real position here. Non-finite or out-of-range values are rejected too.
    pub fn is_known(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && self.lat.abs() <= 90.0
            && self.lng.abs() <= 180.0
            && !(self.lat == 0.0 && self.lng == 0.0)
    }

    /// Convert to a `geo` point (x = longitude, y = latitude).
    pub fn to_point(self) -> geo::Point<f64> {
        geo::Point::new(self.lng, self.lat)
    }
}

/// One sample from the platform position stream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    pub lat: f64,
    pub lng: f64,
    /// Reported horizontal uncertainty in meters.
    pub accuracy: f64,
    pub timestamp: DateTime<Utc>,
}

impl PositionSample {
    pub fn new(coordinate: Coordinate, accuracy: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            lat: coordinate.lat,
            lng: coordinate.lng,
            accuracy,
            timestamp,
        }
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.lat, self.lng)
    }
}

/// What the position stream delivers: a sample, or a non-fatal outage.
#[derive(Debug, Clone, PartialEq)]
pub enum PositionEvent {
    Sample(PositionSample),
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_coordinate_is_unknown() {
        assert!(!Coordinate::new(0.0, 0.0).is_known());
        assert!(Coordinate::new(0.0, 13.4).is_known());
        assert!(Coordinate::new(52.52, 0.0).is_known());
    }

    #[test]
    fn test_invalid_coordinates_are_unknown() {
        assert!(!Coordinate::new(f64::NAN, 13.4).is_known());
        assert!(!Coordinate::new(52.5, f64::INFINITY).is_known());
        assert!(!Coordinate::new(91.0, 13.4).is_known());
        assert!(!Coordinate::new(52.5, -181.0).is_known());
    }

    #[test]
    fn test_point_axis_order() {
        let p = Coordinate::new(52.52, 13.405).to_point();
        assert_eq!(p.x(), 13.405);
        assert_eq!(p.y(), 52.52);
    }

    #[test]
    fn test_sample_wire_format() {
        let json = r#"{"lat":52.52,"lng":13.405,"accuracy":12.0,"timestamp":"2026-03-01T20:00:00Z"}"#;
        let sample: PositionSample = serde_json::from_str(json).unwrap();
        assert_eq!(sample.coordinate(), Coordinate::new(52.52, 13.405));
        assert_eq!(sample.accuracy, 12.0);
    }
}
