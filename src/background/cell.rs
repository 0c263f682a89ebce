//! A single (ring, azimuth bin) background cell.

use serde::{Deserialize, Serialize};

use crate::types::Timestamp;

/// Running estimate of the empty-scene range seen by one grid cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BackgroundCell {
    /// Estimated background range (metres), never negative
    pub mean_range: f64,
    /// Mean absolute deviation of accepted ranges
    pub spread: f64,
    /// Timestamp of the last accepted observation
    pub last_updated: Timestamp,
    /// Updates are suppressed while the frame timestamp is below this
    pub freeze_until: Timestamp,
    /// Observations accepted since the last reset
    pub accept_count: u32,
}

impl BackgroundCell {
    #[inline]
    pub fn is_seeded(&self, seed_observations: u32) -> bool {
        self.accept_count >= seed_observations
    }

    #[inline]
    pub fn is_frozen(&self, now: Timestamp) -> bool {
        now < self.freeze_until
    }

    /// Half-width of the acceptance band around `mean_range` for a return at `range`.
    #[inline]
    pub fn threshold(
        &self,
        range: f64,
        closeness_multiplier: f64,
        noise_relative: f64,
        safety_margin: f64,
        min_spread: f64,
    ) -> f64 {
        closeness_multiplier * (self.spread.max(min_spread) + noise_relative * range + safety_margin)
    }

    /// Fold a raw seeding observation into the running mean.
    pub fn seed(&mut self, range: f64, now: Timestamp) {
        let n = f64::from(self.accept_count + 1);
        if self.accept_count == 0 {
            self.mean_range = range;
            self.spread = 0.0;
        } else {
            let deviation = (range - self.mean_range).abs();
            self.mean_range += (range - self.mean_range) / n;
            self.spread += (deviation - self.spread) / n;
        }
        self.mean_range = self.mean_range.max(0.0);
        self.accept_count = self.accept_count.saturating_add(1);
        self.last_updated = now;
    }

    /// Exponential moving average update for an accepted background return.
    pub fn blend(&mut self, range: f64, alpha: f64, min_spread: f64, now: Timestamp) {
        let deviation = (range - self.mean_range).abs();
        self.mean_range = (self.mean_range + alpha * (range - self.mean_range)).max(0.0);
        self.spread = (self.spread + alpha * (deviation - self.spread)).max(min_spread);
        self.accept_count = self.accept_count.saturating_add(1);
        self.last_updated = now;
    }

    pub fn freeze(&mut self, until: Timestamp) {
        self.freeze_until = self.freeze_until.max(until);
    }

    /// Drop timestamps taken on another clock, keeping the learned range.
    pub fn clear_clock(&mut self) {
        self.freeze_until = 0;
        self.last_updated = 0;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
