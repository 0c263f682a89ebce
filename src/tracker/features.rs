//! Per-track running aggregates and bounded observation history.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::cluster::BoundingBox;
use crate::types::Timestamp;

/// One matched frame of a track, after the filter update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackObservation {
    pub timestamp: Timestamp,
    /// Filtered position
    pub x: f64,
    pub y: f64,
    /// Measured centroid height
    pub z: f64,
    pub vx: f64,
    pub vy: f64,
    pub bounding_box: BoundingBox,
    pub point_count: usize,
    pub noise_point_count: usize,
    pub intensity_mean: f64,
}

impl TrackObservation {
    #[inline]
    pub fn speed(&self) -> f64 {
        self.vx.hypot(self.vy)
    }
}

/// Fixed-capacity FIFO; the oldest entry is dropped on overflow.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, item: T) {
        while self.items.len() >= self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }

    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.items.len() > self.capacity {
            self.items.pop_front();
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn last(&self) -> Option<&T> {
        self.items.back()
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

/// Percentile of an ascending slice with linear interpolation between ranks.
pub fn percentile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let rank = q.clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            let frac = rank - lo as f64;
            sorted[lo] + (sorted[hi] - sorted[lo]) * frac
        }
    }
}

/// Running kinematic and appearance statistics of a track.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackFeatures {
    pub observation_count: u32,
    /// Observations that contributed a velocity estimate
    pub speed_count: u32,
    pub avg_speed: f64,
    pub peak_speed: f64,
    pub p50_speed: f64,
    pub p85_speed: f64,
    pub p95_speed: f64,
    pub avg_length: f64,
    pub avg_width: f64,
    pub avg_height: f64,
    pub max_height: f64,
    pub intensity_mean: f64,
    /// Direction of travel in radians, counter-clockwise from +x
    pub heading: f64,
    /// Distance travelled by the filtered position
    pub path_length: f64,
}

/// Accumulates [`TrackFeatures`] from observations.
#[derive(Debug, Clone)]
pub struct FeatureAccumulator {
    features: TrackFeatures,
    speed_samples: RingBuffer<f64>,
    sorted: Vec<f64>,
    last_position: Option<(f64, f64)>,
}

impl FeatureAccumulator {
    pub fn new(speed_sample_capacity: usize) -> Self {
        Self {
            features: TrackFeatures::default(),
            speed_samples: RingBuffer::new(speed_sample_capacity),
            sorted: Vec::new(),
            last_position: None,
        }
    }

    pub fn features(&self) -> &TrackFeatures {
        &self.features
    }

    pub fn set_speed_sample_capacity(&mut self, capacity: usize) {
        self.speed_samples.set_capacity(capacity);
    }

    /// Fold in an observation. `with_speed` is false for the birth
    /// observation, whose velocity is still the zero prior.
    pub fn record(&mut self, obs: &TrackObservation, with_speed: bool) {
        let f = &mut self.features;
        f.observation_count += 1;
        let n = f64::from(f.observation_count);

        f.avg_length += (obs.bounding_box.length - f.avg_length) / n;
        f.avg_width += (obs.bounding_box.width - f.avg_width) / n;
        f.avg_height += (obs.bounding_box.height - f.avg_height) / n;
        f.max_height = if f.observation_count == 1 {
            obs.bounding_box.height
        } else {
            f.max_height.max(obs.bounding_box.height)
        };
        f.intensity_mean += (obs.intensity_mean - f.intensity_mean) / n;

        if let Some((px, py)) = self.last_position {
            f.path_length += (obs.x - px).hypot(obs.y - py);
        }
        self.last_position = Some((obs.x, obs.y));

        if !with_speed {
            return;
        }
        let speed = obs.speed();
        if !speed.is_finite() {
            return;
        }
        f.speed_count += 1;
        f.avg_speed += (speed - f.avg_speed) / f64::from(f.speed_count);
        f.peak_speed = f.peak_speed.max(speed);
        if speed > 0.0 {
            f.heading = obs.vy.atan2(obs.vx);
        }

        self.speed_samples.push(speed);
        self.sorted.clear();
        self.sorted.extend(self.speed_samples.iter().copied());
        self.sorted.sort_by(f64::total_cmp);
        f.p50_speed = percentile(&self.sorted, 0.50);
        f.p85_speed = percentile(&self.sorted, 0.85);
        f.p95_speed = percentile(&self.sorted, 0.95);
    }
}
