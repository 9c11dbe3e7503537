// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Great-circle distance between coordinates.

use crate::models::Coordinate;
use geo::{Distance, Haversine};

/// Haversine distance in meters (mean Earth radius).
///
/// NaN in gives NaN out; callers filter unknown coordinates first.
pub fn distance_m(a: Coordinate, b: Coordinate) -> f64 {
    Haversine.distance(a.to_point(), b.to_point())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALEXANDERPLATZ: Coordinate = Coordinate::new(52.5219, 13.4132);
    const BRANDENBURG_GATE: Coordinate = Coordinate::new(52.5163, 13.3777);

    #[test]
    fn test_distance_is_symmetric() {
        let pairs = [
            (ALEXANDERPLATZ, BRANDENBURG_GATE),
            (Coordinate::new(-33.86, 151.21), Coordinate::new(51.5, -0.12)),
            (Coordinate::new(89.9, 0.1), Coordinate::new(-89.9, 179.9)),
        ];
        for (a, b) in pairs {
            assert!((distance_m(a, b) - distance_m(b, a)).abs() < 1e-6);
        }
    }

    #[test]
    fn test_distance_to_self_is_zero() {
        assert_eq!(distance_m(ALEXANDERPLATZ, ALEXANDERPLATZ), 0.0);
        let c = Coordinate::new(-12.3456, 98.7654);
        assert_eq!(distance_m(c, c), 0.0);
    }

    #[test]
    fn test_known_distance() {
        // Roughly 2.5 km across central Berlin
        let d = distance_m(ALEXANDERPLATZ, BRANDENBURG_GATE);
        assert!((2_400.0..2_600.0).contains(&d), "got {}", d);
    }

    #[test]
    fn test_nan_propagates() {
        let bad = Coordinate::new(f64::NAN, 13.4);
        assert!(distance_m(bad, ALEXANDERPLATZ).is_nan());
    }
}
