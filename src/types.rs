//! Sensor-level data carried through the pipeline.

use serde::{Deserialize, Serialize};

/// Nanoseconds on the sensor's monotonic clock.
pub type Timestamp = u64;

const NANOS_PER_SEC: f64 = 1e9;

/// Convert a duration in seconds to nanoseconds, saturating at zero.
#[inline]
pub fn secs_to_nanos(secs: f64) -> u64 {
    if secs.is_finite() && secs > 0.0 {
        (secs * NANOS_PER_SEC) as u64
    } else {
        0
    }
}

/// Convert a nanosecond span to seconds.
#[inline]
pub fn nanos_to_secs(nanos: u64) -> f64 {
    nanos as f64 / NANOS_PER_SEC
}

/// One LiDAR return in sensor-local polar coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PolarPoint {
    /// Laser (ring) index
    pub ring: u16,
    /// Azimuth in radians, 0..2π
    pub azimuth: f64,
    /// Range in metres
    pub range: f64,
    /// Return intensity
    pub intensity: u8,
    pub timestamp: Timestamp,
}

impl PolarPoint {
    pub fn new(ring: u16, azimuth: f64, range: f64, intensity: u8, timestamp: Timestamp) -> Self {
        Self {
            ring,
            azimuth,
            range,
            intensity,
            timestamp,
        }
    }
}

/// One sensor rotation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub timestamp: Timestamp,
    pub points: Vec<PolarPoint>,
}

impl Frame {
    pub fn new(timestamp: Timestamp, points: Vec<PolarPoint>) -> Self {
        Self { timestamp, points }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// A foreground return expressed in the flat world frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorldPoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub intensity: u8,
}

impl WorldPoint {
    pub fn new(x: f64, y: f64, z: f64, intensity: u8) -> Self {
        Self { x, y, z, intensity }
    }

    /// Squared distance in the ground plane.
    #[inline]
    pub fn distance_xy_sq(&self, other: &WorldPoint) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }
}
