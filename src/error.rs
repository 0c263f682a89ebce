//! Error types for configuration and frame processing.

use thiserror::Error;

use crate::types::Timestamp;

/// Invalid or incompatible configuration values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{field} must be positive, got {value}")]
    NotPositive { field: &'static str, value: f64 },

    #[error("{field} must be within [{min}, {max}], got {value}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("{field} must be non-zero")]
    Zero { field: &'static str },

    #[error("grid shape cannot change at runtime: {current:?} -> {requested:?} (rings, azimuth bins)")]
    GridShapeChange {
        current: (usize, usize),
        requested: (usize, usize),
    },

    #[error("sensor pose has {got} ring elevations, grid has {expected} rings")]
    RingElevationCount { expected: usize, got: usize },
}

/// Reasons a frame is not processed, plus plumbing failures.
///
/// Frame-level variants leave the grid and the track set untouched.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error("frame at {timestamp} contains no points")]
    EmptyFrame { timestamp: Timestamp },

    #[error("frame at {timestamp} has no valid points ({invalid} rejected)")]
    MalformedFrame { timestamp: Timestamp, invalid: usize },

    #[error("frame timestamp {received} precedes previous frame {previous}")]
    OutOfOrderFrame {
        previous: Timestamp,
        received: Timestamp,
    },

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("pipeline queue closed")]
    QueueClosed,
}
