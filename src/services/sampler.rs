// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Geo sampler: accuracy filtering over the raw position stream.

use crate::models::{Coordinate, PositionSample, SensorStatus};

/// One filtered reading published to the rest of the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerReading {
    pub sample: PositionSample,
    pub reliable: bool,
}

impl SamplerReading {
    pub fn coordinate(&self) -> Coordinate {
        self.sample.coordinate()
    }
}

/// Keeps the latest reliable sample and the sensor status.
#[derive(Debug, Clone)]
pub struct GeoSampler {
    max_accuracy_m: f64,
    latest_reliable: Option<PositionSample>,
    last_was_reliable: bool,
    status: SensorStatus,
}

impl GeoSampler {
    pub fn new(max_accuracy_m: f64) -> Self {
        Self {
            max_accuracy_m,
            latest_reliable: None,
            last_was_reliable: false,
            status: SensorStatus::Waiting,
        }
    }

    /// Filter one sample. Returns `None` once the subscription is stopped.
    pub fn on_sample(&mut self, sample: PositionSample) -> Option<SamplerReading> {
        if self.status == SensorStatus::Stopped {
            return None;
        }

        let reliable = self.is_reliable(&sample);
        self.status = SensorStatus::Active;
        self.last_was_reliable = reliable;
        if reliable {
            self.latest_reliable = Some(sample);
        } else {
            tracing::debug!(
                accuracy = sample.accuracy,
                max_accuracy = self.max_accuracy_m,
                "Discarding unreliable position sample"
            );
        }

        Some(SamplerReading { sample, reliable })
    }

    /// Permission denied, hardware missing, or the stream errored.
    pub fn on_unavailable(&mut self, reason: impl Into<String>) {
        if self.status == SensorStatus::Stopped {
            return;
        }
        let reason = reason.into();
        tracing::warn!(reason = %reason, "Position stream unavailable");
        self.status = SensorStatus::Unavailable(reason);
    }

    /// Cancel the subscription. Terminal.
    pub fn stop(&mut self) {
        self.status = SensorStatus::Stopped;
    }

    pub fn status(&self) -> &SensorStatus {
        &self.status
    }

    pub fn latest_reliable(&self) -> Option<&PositionSample> {
        self.latest_reliable.as_ref()
    }

    pub fn last_was_reliable(&self) -> bool {
        self.last_was_reliable
    }

    /// Coordinate to use for proximity, or `None` when distance is unknown.
    pub fn position(&self) -> Option<Coordinate> {
        match self.status {
            SensorStatus::Active => self.latest_reliable.map(|s| s.coordinate()),
            _ => None,
        }
    }

    fn is_reliable(&self, sample: &PositionSample) -> bool {
        sample.coordinate().is_known()
            && sample.accuracy.is_finite()
            && sample.accuracy >= 0.0
            && sample.accuracy <= self.max_accuracy_m
    }
}
