//! A single persistent object track.

use log::warn;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::classifier::ObjectClass;
use crate::cluster::WorldCluster;
use crate::config::TrackerConfig;
use crate::tracker::features::{FeatureAccumulator, RingBuffer, TrackFeatures, TrackObservation};
use crate::tracker::kalman_filter::{KalmanFilter, is_well_conditioned};
use crate::tracker::track_state::TrackState;
use crate::types::{Timestamp, nanos_to_secs};

/// Single object track.
#[derive(Debug, Clone)]
pub struct TrackedObject {
    /// Unique, monotonically assigned identifier
    pub track_id: u64,
    pub state: TrackState,
    /// Kalman state `[x, y, vx, vy]`
    pub mean: Array1<f64>,
    /// Kalman state covariance (4x4)
    pub covariance: Array2<f64>,
    /// Matched frames, birth included
    pub hit_count: u32,
    /// Consecutive unmatched frames
    pub miss_count: u32,
    pub first_seen: Timestamp,
    pub last_seen: Timestamp,
    /// Time the state estimate refers to
    pub last_predicted: Timestamp,
    pub confirmed_at: Option<Timestamp>,
    pub deleted_at: Option<Timestamp>,
    pub class_label: ObjectClass,
    pub class_confidence: f64,
    /// Times the covariance had to be rebuilt
    pub covariance_recoveries: u32,
    needs_reinflation: bool,
    accumulator: FeatureAccumulator,
    history: RingBuffer<TrackObservation>,
}

impl TrackedObject {
    /// Create a tentative track from an unmatched cluster.
    pub fn new(
        track_id: u64,
        cluster: &WorldCluster,
        kalman_filter: &KalmanFilter,
        config: &TrackerConfig,
    ) -> Self {
        let (mean, covariance) = kalman_filter.initiate([cluster.x(), cluster.y()]);
        let now = cluster.timestamp;
        let mut track = Self {
            track_id,
            state: TrackState::Tentative,
            mean,
            covariance,
            hit_count: 1,
            miss_count: 0,
            first_seen: now,
            last_seen: now,
            last_predicted: now,
            confirmed_at: None,
            deleted_at: None,
            class_label: ObjectClass::Other,
            class_confidence: 0.0,
            covariance_recoveries: 0,
            needs_reinflation: false,
            accumulator: FeatureAccumulator::new(config.speed_sample_capacity),
            history: RingBuffer::new(config.history_capacity),
        };
        track.record(cluster, false);
        track
    }

    #[inline]
    pub fn position(&self) -> (f64, f64) {
        (self.mean[0], self.mean[1])
    }

    #[inline]
    pub fn velocity(&self) -> (f64, f64) {
        (self.mean[2], self.mean[3])
    }

    #[inline]
    pub fn speed(&self) -> f64 {
        self.mean[2].hypot(self.mean[3])
    }

    pub fn features(&self) -> &TrackFeatures {
        self.accumulator.features()
    }

    /// Matched observations, oldest first, bounded by the history capacity.
    pub fn history(&self) -> impl Iterator<Item = &TrackObservation> {
        self.history.iter()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn was_confirmed(&self) -> bool {
        self.confirmed_at.is_some()
    }

    /// Apply capacity changes from a reloaded config.
    pub fn reconfigure(&mut self, config: &TrackerConfig) {
        self.history.set_capacity(config.history_capacity);
        self.accumulator
            .set_speed_sample_capacity(config.speed_sample_capacity);
    }

    /// Prediction step length for a frame at `now`.
    fn step(&self, now: Timestamp, config: &TrackerConfig) -> f64 {
        let dt = nanos_to_secs(now.saturating_sub(self.last_predicted));
        if dt <= 0.0 {
            config.default_dt_secs
        } else {
            dt.min(config.max_dt_secs)
        }
    }

    /// Advance the state estimate to `now`, rebuilding the covariance first if
    /// the previous cycle left it unusable.
    pub fn predict(&mut self, kalman_filter: &KalmanFilter, now: Timestamp, config: &TrackerConfig) {
        let dt = self.step(now, config);
        if self.needs_reinflation || !is_well_conditioned(&self.covariance) {
            self.recover(kalman_filter, dt, config);
        }
        let (mean, covariance) = kalman_filter.predict(&self.mean, &self.covariance, dt);
        self.mean = mean;
        self.covariance = covariance;
        self.last_predicted = now.max(self.last_predicted);
    }

    fn recover(&mut self, kalman_filter: &KalmanFilter, dt: f64, config: &TrackerConfig) {
        warn!(
            "track {}: covariance unusable, re-inflating process noise",
            self.track_id
        );
        if self.mean.iter().any(|v| !v.is_finite()) {
            let (x, y) = self
                .history
                .last()
                .map(|o| (o.x, o.y))
                .unwrap_or((0.0, 0.0));
            self.mean = ndarray::array![x, y, 0.0, 0.0];
        }
        self.covariance = kalman_filter.reinflated_covariance(dt, config.covariance_reinflation);
        self.needs_reinflation = false;
        self.covariance_recoveries += 1;
    }

    /// Squared Mahalanobis distance to a cluster centroid; `None` if the
    /// projected covariance is singular.
    pub fn gating_distance(&self, kalman_filter: &KalmanFilter, cluster: &WorldCluster) -> Option<f64> {
        kalman_filter.gating_distance(&self.mean, &self.covariance, [cluster.x(), cluster.y()])
    }

    /// Correct the state with a matched cluster and update aggregates.
    ///
    /// Returns true when this hit confirms the track.
    pub fn update(
        &mut self,
        cluster: &WorldCluster,
        kalman_filter: &KalmanFilter,
        config: &TrackerConfig,
    ) -> bool {
        let measurement = [cluster.x(), cluster.y()];
        match kalman_filter.update(&self.mean, &self.covariance, measurement) {
            Some((mean, covariance)) => {
                self.mean = mean;
                self.covariance = covariance;
                if !is_well_conditioned(&self.covariance) {
                    self.needs_reinflation = true;
                }
            }
            None => {
                // Snap to the measurement, keep the velocity, rebuild next cycle.
                self.mean[0] = measurement[0];
                self.mean[1] = measurement[1];
                self.needs_reinflation = true;
            }
        }

        self.last_seen = cluster.timestamp;
        self.miss_count = 0;
        self.hit_count = self.hit_count.saturating_add(1);
        self.record(cluster, true);
        self.confirm_if_ready(config.hits_to_confirm, cluster.timestamp)
    }

    /// Promote a tentative track with enough hits. Returns true on promotion.
    pub fn confirm_if_ready(&mut self, hits_to_confirm: u32, now: Timestamp) -> bool {
        if self.state == TrackState::Tentative && self.hit_count >= hits_to_confirm {
            self.state = TrackState::Confirmed;
            self.confirmed_at = Some(now);
            return true;
        }
        false
    }

    /// Register an unmatched frame. Returns true when the track is deleted.
    pub fn mark_missed(&mut self, now: Timestamp, config: &TrackerConfig) -> bool {
        if !self.state.is_live() {
            return false;
        }
        self.miss_count = self.miss_count.saturating_add(1);
        if self.miss_count >= config.max_misses {
            self.mark_deleted(now);
            return true;
        }
        false
    }

    pub fn mark_deleted(&mut self, now: Timestamp) {
        self.state = TrackState::Deleted;
        self.deleted_at = Some(now);
    }

    fn record(&mut self, cluster: &WorldCluster, with_speed: bool) {
        let obs = TrackObservation {
            timestamp: cluster.timestamp,
            x: self.mean[0],
            y: self.mean[1],
            z: cluster.centroid[2],
            vx: self.mean[2],
            vy: self.mean[3],
            bounding_box: cluster.bounding_box,
            point_count: cluster.point_count,
            noise_point_count: cluster.noise_point_count,
            intensity_mean: cluster.intensity_mean,
        };
        self.accumulator.record(&obs, with_speed);
        self.history.push(obs);
    }

    /// Flat record for persistence and monitoring.
    pub fn snapshot(&self) -> TrackSnapshot {
        let f = self.features();
        TrackSnapshot {
            track_id: self.track_id,
            state: self.state,
            x: self.mean[0],
            y: self.mean[1],
            vx: self.mean[2],
            vy: self.mean[3],
            speed: self.speed(),
            hit_count: self.hit_count,
            miss_count: self.miss_count,
            first_seen: self.first_seen,
            last_seen: self.last_seen,
            features: f.clone(),
            class_label: self.class_label,
            class_confidence: self.class_confidence,
        }
    }
}

/// Point-in-time copy of a track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackSnapshot {
    pub track_id: u64,
    pub state: TrackState,
    pub x: f64,
    pub y: f64,
    pub vx: f64,
    pub vy: f64,
    pub speed: f64,
    pub hit_count: u32,
    pub miss_count: u32,
    pub first_seen: Timestamp,
    pub last_seen: Timestamp,
    #[serde(flatten)]
    pub features: TrackFeatures,
    pub class_label: ObjectClass,
    pub class_confidence: f64,
}
