//! Pipeline configuration.
//!
//! Every threshold used by the pipeline lives here. Values are supplied by the
//! host at startup and may be swapped at runtime through
//! [`Pipeline::apply_config`](crate::Pipeline::apply_config); only the grid
//! shape is fixed for the lifetime of a pipeline.

use serde::{Deserialize, Serialize};

use crate::classifier::ClassifierConfig;
use crate::error::ConfigError;

/// Background model and foreground extraction parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackgroundConfig {
    /// Number of laser rings covered by the grid.
    pub rings: usize,
    /// Azimuth bins per revolution.
    pub azimuth_bins: usize,
    /// EMA learning rate before the grid has settled.
    pub learning_rate: f64,
    /// EMA learning rate once `settle_frames` frames have been processed.
    pub post_settle_learning_rate: f64,
    pub settle_frames: u64,
    pub closeness_multiplier: f64,
    /// Range-proportional noise term (fraction of range).
    pub noise_relative: f64,
    /// Absolute noise floor in metres.
    pub safety_margin: f64,
    /// Lower clamp for a cell's spread.
    pub min_spread: f64,
    /// Raw observations used to seed a cell before EMA blending starts.
    pub seed_observations: u32,
    /// Deviating neighbor cells required to accept a foreground point.
    /// Zero disables confirmation.
    pub neighbor_confirmation_count: usize,
    pub neighbor_ring_radius: usize,
    pub neighbor_azimuth_radius: usize,
    pub freeze_duration_secs: f64,
    pub min_range: f64,
    pub max_range: f64,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            rings: 64,
            azimuth_bins: 1800,
            learning_rate: 0.02,
            post_settle_learning_rate: 0.005,
            settle_frames: 100,
            closeness_multiplier: 3.0,
            noise_relative: 0.01,
            safety_margin: 0.1,
            min_spread: 0.02,
            seed_observations: 5,
            neighbor_confirmation_count: 2,
            neighbor_ring_radius: 1,
            neighbor_azimuth_radius: 1,
            freeze_duration_secs: 5.0,
            min_range: 0.2,
            max_range: 200.0,
        }
    }
}

impl BackgroundConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        non_zero("background.rings", self.rings)?;
        non_zero("background.azimuth_bins", self.azimuth_bins)?;
        unit_interval("background.learning_rate", self.learning_rate)?;
        unit_interval(
            "background.post_settle_learning_rate",
            self.post_settle_learning_rate,
        )?;
        positive("background.closeness_multiplier", self.closeness_multiplier)?;
        non_negative("background.noise_relative", self.noise_relative)?;
        non_negative("background.safety_margin", self.safety_margin)?;
        positive("background.min_spread", self.min_spread)?;
        non_zero("background.seed_observations", self.seed_observations as usize)?;
        at_most(
            "background.neighbor_ring_radius",
            self.neighbor_ring_radius,
            self.rings,
        )?;
        at_most(
            "background.neighbor_azimuth_radius",
            self.neighbor_azimuth_radius,
            self.azimuth_bins,
        )?;
        non_negative("background.freeze_duration_secs", self.freeze_duration_secs)?;
        non_negative("background.min_range", self.min_range)?;
        if !(self.max_range > self.min_range) {
            return Err(ConfigError::OutOfRange {
                field: "background.max_range",
                value: self.max_range,
                min: self.min_range,
                max: f64::INFINITY,
            });
        }
        Ok(())
    }

    pub fn cell_count(&self) -> usize {
        self.rings * self.azimuth_bins
    }
}

/// DBSCAN parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringConfig {
    /// Neighborhood radius in metres (ground plane).
    pub eps: f64,
    /// Neighbors (including the point itself) required for a core point.
    pub min_points: usize,
    /// Noise points within `eps * noise_attach_factor` of a cluster are
    /// attributed to it.
    pub noise_attach_factor: f64,
    pub min_cluster_points: usize,
    /// Largest horizontal extent in metres a cluster may have.
    pub max_cluster_extent: f64,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            eps: 0.6,
            min_points: 5,
            noise_attach_factor: 2.0,
            min_cluster_points: 5,
            max_cluster_extent: 15.0,
        }
    }
}

impl ClusteringConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("clustering.eps", self.eps)?;
        non_zero("clustering.min_points", self.min_points)?;
        if !(self.noise_attach_factor >= 1.0) {
            return Err(ConfigError::OutOfRange {
                field: "clustering.noise_attach_factor",
                value: self.noise_attach_factor,
                min: 1.0,
                max: f64::INFINITY,
            });
        }
        positive("clustering.max_cluster_extent", self.max_cluster_extent)
    }
}

/// How clusters are assigned to predicted tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociationStrategy {
    /// Nearest-neighbor greedy matching on gated distances.
    #[default]
    Greedy,
    /// Globally optimal assignment over the gated cost matrix.
    Optimal,
}

/// Kalman filter and track lifecycle parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Position process noise (m² per second).
    pub process_noise_pos: f64,
    /// Velocity process noise ((m/s)² per second).
    pub process_noise_vel: f64,
    /// Centroid measurement variance (m²).
    pub measurement_noise: f64,
    pub initial_position_variance: f64,
    pub initial_velocity_variance: f64,
    /// Mahalanobis gate on the innovation.
    pub gating_distance_squared: f64,
    pub hits_to_confirm: u32,
    pub max_misses: u32,
    pub deleted_track_grace_period_secs: f64,
    pub max_tracks: usize,
    pub history_capacity: usize,
    pub speed_sample_capacity: usize,
    /// Prediction step used when consecutive frames share a timestamp.
    pub default_dt_secs: f64,
    pub max_dt_secs: f64,
    /// Multiplier on process noise applied when a covariance is rebuilt.
    pub covariance_reinflation: f64,
    pub association: AssociationStrategy,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            process_noise_pos: 0.1,
            process_noise_vel: 0.5,
            measurement_noise: 0.05,
            initial_position_variance: 0.05,
            initial_velocity_variance: 100.0,
            gating_distance_squared: 25.0,
            hits_to_confirm: 3,
            max_misses: 3,
            deleted_track_grace_period_secs: 5.0,
            max_tracks: 200,
            history_capacity: 128,
            speed_sample_capacity: 256,
            default_dt_secs: 0.1,
            max_dt_secs: 1.0,
            covariance_reinflation: 10.0,
            association: AssociationStrategy::Greedy,
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("tracker.process_noise_pos", self.process_noise_pos)?;
        positive("tracker.process_noise_vel", self.process_noise_vel)?;
        positive("tracker.measurement_noise", self.measurement_noise)?;
        positive(
            "tracker.initial_position_variance",
            self.initial_position_variance,
        )?;
        positive(
            "tracker.initial_velocity_variance",
            self.initial_velocity_variance,
        )?;
        positive(
            "tracker.gating_distance_squared",
            self.gating_distance_squared,
        )?;
        non_zero("tracker.hits_to_confirm", self.hits_to_confirm as usize)?;
        non_zero("tracker.max_misses", self.max_misses as usize)?;
        non_negative(
            "tracker.deleted_track_grace_period_secs",
            self.deleted_track_grace_period_secs,
        )?;
        non_zero("tracker.max_tracks", self.max_tracks)?;
        non_zero("tracker.history_capacity", self.history_capacity)?;
        non_zero("tracker.speed_sample_capacity", self.speed_sample_capacity)?;
        positive("tracker.default_dt_secs", self.default_dt_secs)?;
        positive("tracker.max_dt_secs", self.max_dt_secs)?;
        if !(self.covariance_reinflation >= 1.0) {
            return Err(ConfigError::OutOfRange {
                field: "tracker.covariance_reinflation",
                value: self.covariance_reinflation,
                min: 1.0,
                max: f64::INFINITY,
            });
        }
        Ok(())
    }
}

/// Sensor mounting pose and per-ring elevation angles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorPoseConfig {
    /// Sensor origin in the world frame (metres).
    pub translation: [f64; 3],
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
    /// Explicit elevation per ring in degrees. When empty, rings are spread
    /// linearly between `elevation_min_deg` and `elevation_max_deg`.
    pub ring_elevations_deg: Vec<f64>,
    pub elevation_min_deg: f64,
    pub elevation_max_deg: f64,
}

impl Default for SensorPoseConfig {
    fn default() -> Self {
        Self {
            translation: [0.0, 0.0, 0.0],
            roll: 0.0,
            pitch: 0.0,
            yaw: 0.0,
            ring_elevations_deg: Vec::new(),
            elevation_min_deg: -25.0,
            elevation_max_deg: 15.0,
        }
    }
}

impl SensorPoseConfig {
    pub fn validate(&self, rings: usize) -> Result<(), ConfigError> {
        if !self.ring_elevations_deg.is_empty() && self.ring_elevations_deg.len() != rings {
            return Err(ConfigError::RingElevationCount {
                expected: rings,
                got: self.ring_elevations_deg.len(),
            });
        }
        Ok(())
    }
}

/// Queue sizing for the input and output hand-off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub track_queue_capacity: usize,
    pub frame_queue_capacity: usize,
    /// Emit a background snapshot every N processed frames; zero disables.
    pub background_snapshot_interval_frames: u64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            track_queue_capacity: 1024,
            frame_queue_capacity: 8,
            background_snapshot_interval_frames: 600,
        }
    }
}

impl OutputConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        non_zero("output.track_queue_capacity", self.track_queue_capacity)?;
        non_zero("output.frame_queue_capacity", self.frame_queue_capacity)
    }
}

/// Complete pipeline configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub background: BackgroundConfig,
    pub clustering: ClusteringConfig,
    pub tracker: TrackerConfig,
    pub classifier: ClassifierConfig,
    pub pose: SensorPoseConfig,
    pub output: OutputConfig,
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.background.validate()?;
        self.clustering.validate()?;
        self.tracker.validate()?;
        self.classifier.validate()?;
        self.pose.validate(self.background.rings)?;
        self.output.validate()
    }

    /// Grid dimensions as `(rings, azimuth_bins)`.
    pub fn grid_shape(&self) -> (usize, usize) {
        (self.background.rings, self.background.azimuth_bins)
    }
}

pub(crate) fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { field, value })
    }
}

pub(crate) fn non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value,
            min: 0.0,
            max: f64::INFINITY,
        })
    }
}

pub(crate) fn unit_interval(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value,
            min: 0.0,
            max: 1.0,
        })
    }
}

pub(crate) fn non_zero(field: &'static str, value: usize) -> Result<(), ConfigError> {
    if value == 0 {
        Err(ConfigError::Zero { field })
    } else {
        Ok(())
    }
}

fn at_most(field: &'static str, value: usize, max: usize) -> Result<(), ConfigError> {
    if value <= max {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value: value as f64,
            min: 0.0,
            max: max as f64,
        })
    }
}
