//! Serializable views of the background grid.

use serde::{Deserialize, Serialize};

use crate::background::cell::BackgroundCell;
use crate::types::Timestamp;

/// Full copy of the grid, handed to the persistence layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackgroundSnapshot {
    pub timestamp: Timestamp,
    pub rings: usize,
    pub azimuth_bins: usize,
    pub frames_processed: u64,
    /// Row-major by ring, then azimuth bin
    pub cells: Vec<BackgroundCell>,
}

/// Aggregate grid state for monitoring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GridHealth {
    pub total_cells: usize,
    pub seeded_cells: usize,
    pub frozen_cells: usize,
    pub seeded_ratio: f64,
    pub settled: bool,
    pub frames_processed: u64,
}
