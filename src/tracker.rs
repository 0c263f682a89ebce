//! Cluster-to-track association, state estimation and track lifecycle.

mod features;
mod kalman_filter;
mod lidar_tracker;
mod matching;
mod track_state;
mod tracked_object;

pub use features::{FeatureAccumulator, RingBuffer, TrackFeatures, TrackObservation, percentile};
pub use kalman_filter::{KalmanFilter, is_well_conditioned};
pub use lidar_tracker::{ObjectTracker, TrackerUpdate};
pub use matching::{
    AssignmentResult, GATED, assign, gated_distance_matrix, greedy_assignment, linear_assignment,
};
pub use track_state::TrackState;
pub use tracked_object::{TrackSnapshot, TrackedObject};
