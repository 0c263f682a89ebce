//! Synthetic scenes for integration tests.

#![allow(dead_code)]

use std::f64::consts::TAU;

use lidartrack_rs::{Frame, PipelineConfig, PolarPoint, Timestamp};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};

pub const RINGS: usize = 16;
pub const BINS: usize = 360;
pub const FRAME_NS: Timestamp = 100_000_000;
/// Rings hit by objects in the scene.
pub const OBJECT_RINGS: std::ops::Range<usize> = 6..10;

/// Elevation of each ring in degrees, one degree apart.
pub fn ring_elevations() -> Vec<f64> {
    (0..RINGS).map(|r| -12.0 + r as f64).collect()
}

pub fn bin_center(bin: usize) -> f64 {
    (bin as f64 + 0.5) * TAU / BINS as f64
}

pub fn scene_config() -> PipelineConfig {
    let mut cfg = PipelineConfig::default();
    cfg.background.rings = RINGS;
    cfg.background.azimuth_bins = BINS;
    cfg.pose.translation = [0.0, 0.0, 3.0];
    cfg.pose.ring_elevations_deg = ring_elevations();
    cfg
}

/// Axis-aligned box seen from the sensor, `length` along x and `width` along y.
#[derive(Debug, Clone, Copy)]
pub struct BoxObject {
    pub x: f64,
    pub y: f64,
    pub length: f64,
    pub width: f64,
}

impl BoxObject {
    /// Returns placed so that their world x/y lie on a regular grid over the
    /// footprint, centred on (`x`, `y`).
    pub fn returns(&self, ts: Timestamp) -> Vec<PolarPoint> {
        let elevations = ring_elevations();
        let nx = (self.length / 0.1).round() as i64;
        let ny = (self.width / 0.3).round() as i64;
        let mut points = Vec::new();
        for i in 0..=nx {
            for j in 0..=ny {
                let wx = self.x - self.length / 2.0 + self.length * i as f64 / nx as f64;
                let wy = self.y - self.width / 2.0 + self.width * j as f64 / ny as f64;
                let azimuth = wy.atan2(wx).rem_euclid(TAU);
                let horizontal = wx.hypot(wy);
                for ring in OBJECT_RINGS {
                    let range = horizontal / elevations[ring].to_radians().cos();
                    points.push(PolarPoint::new(ring as u16, azimuth, range, 80, ts));
                }
            }
        }
        points
    }
}

/// Static scene: every cell sees a fixed range with Gaussian noise.
pub struct Scene {
    rng: StdRng,
    noise: Normal<f64>,
    ranges: Vec<f64>,
}

impl Scene {
    /// Same background range in every cell.
    pub fn uniform(seed: u64, range: f64, noise_std: f64) -> Self {
        Self::with_ranges(seed, vec![range; RINGS * BINS], noise_std)
    }

    /// Background range varying with ring and azimuth.
    pub fn varied(seed: u64, noise_std: f64) -> Self {
        let ranges = (0..RINGS * BINS)
            .map(|idx| {
                let ring = idx / BINS;
                let bin = idx % BINS;
                25.0 + 8.0 * (bin_center(bin) * 3.0).sin() + ring as f64 * 0.5
            })
            .collect();
        Self::with_ranges(seed, ranges, noise_std)
    }

    fn with_ranges(seed: u64, ranges: Vec<f64>, noise_std: f64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            noise: Normal::new(0.0, noise_std).unwrap(),
            ranges,
        }
    }

    pub fn true_range(&self, ring: usize, bin: usize) -> f64 {
        self.ranges[ring * BINS + bin]
    }

    /// One background return per cell, with `occluded` cells reporting
    /// `occluder_range` instead.
    pub fn frame_with(
        &mut self,
        ts: Timestamp,
        occluded: impl Fn(usize, usize) -> bool,
        occluder_range: f64,
    ) -> Frame {
        let mut points = Vec::with_capacity(RINGS * BINS);
        for ring in 0..RINGS {
            for bin in 0..BINS {
                let range = if occluded(ring, bin) {
                    occluder_range
                } else {
                    self.ranges[ring * BINS + bin] + self.noise.sample(&mut self.rng)
                };
                points.push(PolarPoint::new(ring as u16, bin_center(bin), range, 20, ts));
            }
        }
        Frame::new(ts, points)
    }

    pub fn frame(&mut self, ts: Timestamp) -> Frame {
        self.frame_with(ts, |_, _| false, 0.0)
    }

    /// Background plus the returns of `objects`.
    pub fn frame_with_objects(&mut self, ts: Timestamp, objects: &[BoxObject]) -> Frame {
        let mut frame = self.frame(ts);
        for object in objects {
            frame.points.extend(object.returns(ts));
        }
        frame
    }
}
