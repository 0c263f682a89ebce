//! Polar background grid indexed by (ring, azimuth bin).

use std::f64::consts::TAU;

use log::info;

use crate::background::cell::BackgroundCell;
use crate::background::snapshot::{BackgroundSnapshot, GridHealth};
use crate::config::BackgroundConfig;
use crate::error::ConfigError;
use crate::types::{Timestamp, secs_to_nanos};

/// Outcome of comparing one return against its cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointClass {
    /// Return cannot be placed in the grid
    Invalid,
    /// Cell is still seeding
    Unknown,
    Background,
    /// Deviates from the cell; awaiting neighbor confirmation
    Candidate,
}

/// Adaptive per-cell background model.
#[derive(Debug, Clone)]
pub struct BackgroundGrid {
    config: BackgroundConfig,
    cells: Vec<BackgroundCell>,
    /// Epoch in which each cell last held a foreground candidate, per
    /// deviation side: `[nearer, farther]` than the background.
    candidate_epoch: Vec<[u32; 2]>,
    epoch: u32,
    frames_processed: u64,
}

impl BackgroundGrid {
    pub fn new(config: BackgroundConfig) -> Self {
        let n = config.cell_count();
        Self {
            config,
            cells: vec![BackgroundCell::default(); n],
            candidate_epoch: vec![[0; 2]; n],
            epoch: 0,
            frames_processed: 0,
        }
    }

    pub fn config(&self) -> &BackgroundConfig {
        &self.config
    }

    /// Swap thresholds in place. The grid shape must not change.
    pub fn set_config(&mut self, config: BackgroundConfig) -> Result<(), ConfigError> {
        let current = self.shape();
        let requested = (config.rings, config.azimuth_bins);
        if current != requested {
            return Err(ConfigError::GridShapeChange { current, requested });
        }
        self.config = config;
        Ok(())
    }

    /// `(rings, azimuth_bins)`
    pub fn shape(&self) -> (usize, usize) {
        (self.config.rings, self.config.azimuth_bins)
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    pub fn is_settled(&self) -> bool {
        self.frames_processed >= self.config.settle_frames
    }

    /// Learning rate currently applied to accepted background returns.
    pub fn learning_rate(&self) -> f64 {
        if self.is_settled() {
            self.config.post_settle_learning_rate
        } else {
            self.config.learning_rate
        }
    }

    #[inline]
    pub fn azimuth_bin(&self, azimuth: f64) -> usize {
        let bins = self.config.azimuth_bins;
        let normalized = azimuth.rem_euclid(TAU);
        ((normalized / TAU * bins as f64) as usize).min(bins - 1)
    }

    /// Flat cell index for a return, or `None` when it lies outside the grid
    /// or its range is unusable.
    pub fn cell_index(&self, ring: u16, azimuth: f64, range: f64) -> Option<usize> {
        let ring = usize::from(ring);
        if ring >= self.config.rings || !azimuth.is_finite() || !range.is_finite() {
            return None;
        }
        if range < self.config.min_range || range > self.config.max_range {
            return None;
        }
        Some(ring * self.config.azimuth_bins + self.azimuth_bin(azimuth))
    }

    pub fn cell(&self, ring: usize, bin: usize) -> Option<&BackgroundCell> {
        if ring >= self.config.rings || bin >= self.config.azimuth_bins {
            return None;
        }
        self.cells.get(ring * self.config.azimuth_bins + bin)
    }

    pub fn cells(&self) -> &[BackgroundCell] {
        &self.cells
    }

    /// Start a new frame: candidate marks from earlier frames become stale.
    pub(crate) fn begin_frame(&mut self) {
        self.epoch = self.epoch.wrapping_add(1);
        if self.epoch == 0 {
            self.candidate_epoch.iter_mut().for_each(|e| *e = [0; 2]);
            self.epoch = 1;
        }
    }

    pub(crate) fn end_frame(&mut self) {
        self.frames_processed += 1;
    }

    /// Compare a return against its cell without mutating anything.
    pub(crate) fn evaluate(&self, idx: usize, range: f64) -> PointClass {
        let cfg = &self.config;
        let cell = &self.cells[idx];
        if !cell.is_seeded(cfg.seed_observations) {
            return PointClass::Unknown;
        }
        let band = cell.threshold(
            range,
            cfg.closeness_multiplier,
            cfg.noise_relative,
            cfg.safety_margin,
            cfg.min_spread,
        );
        if (range - cell.mean_range).abs() > band {
            PointClass::Candidate
        } else {
            PointClass::Background
        }
    }

    /// True when `range` lies in front of the cell's background.
    #[inline]
    pub(crate) fn is_nearer(&self, idx: usize, range: f64) -> bool {
        range < self.cells[idx].mean_range
    }

    pub(crate) fn mark_candidate(&mut self, idx: usize, nearer: bool) {
        self.candidate_epoch[idx][side(nearer)] = self.epoch;
    }

    /// Seeded cells around `idx` holding a candidate on the same side of
    /// their background in the current frame.
    pub(crate) fn neighbor_agreement(&self, idx: usize, nearer: bool) -> usize {
        let cfg = &self.config;
        let bins = cfg.azimuth_bins;
        let ring = idx / bins;
        let bin = idx % bins;
        let side = side(nearer);
        let ring_lo = ring.saturating_sub(cfg.neighbor_ring_radius);
        let ring_hi = ring
            .saturating_add(cfg.neighbor_ring_radius)
            .min(cfg.rings - 1);
        // Never wrap all the way around onto the cell itself.
        let az_radius = cfg.neighbor_azimuth_radius.min((bins - 1) / 2);

        let mut agree = 0;
        for r in ring_lo..=ring_hi {
            for offset in 0..=(2 * az_radius) {
                let b = (bin + bins + offset - az_radius) % bins;
                let n = r * bins + b;
                if n == idx {
                    continue;
                }
                if self.candidate_epoch[n][side] == self.epoch
                    && self.cells[n].is_seeded(cfg.seed_observations)
                {
                    agree += 1;
                }
            }
        }
        agree
    }

    /// Suppress background updates of a cell holding a confirmed object.
    pub(crate) fn freeze(&mut self, idx: usize, now: Timestamp) {
        let until = now.saturating_add(secs_to_nanos(self.config.freeze_duration_secs));
        self.cells[idx].freeze(until);
    }

    /// Fold a return into its cell: raw seeding while the cell warms up,
    /// EMA afterwards. Frozen cells are left untouched.
    pub(crate) fn accept(&mut self, idx: usize, range: f64, now: Timestamp) {
        let alpha = self.learning_rate();
        let seed_observations = self.config.seed_observations;
        let min_spread = self.config.min_spread;
        let cell = &mut self.cells[idx];
        if cell.is_frozen(now) {
            return;
        }
        if cell.is_seeded(seed_observations) {
            cell.blend(range, alpha, min_spread, now);
        } else {
            cell.seed(range, now);
        }
    }

    /// Clear every cell, including lingering frozen ones.
    pub fn reset(&mut self) {
        self.cells.iter_mut().for_each(BackgroundCell::reset);
        self.candidate_epoch.iter_mut().for_each(|e| *e = [0; 2]);
        self.epoch = 0;
        self.frames_processed = 0;
        info!("background grid reset ({} cells)", self.cells.len());
    }

    /// Forget every timestamp from the previous frame clock: freezes are
    /// lifted, learned ranges and seed counts stay.
    pub fn rebase_clock(&mut self) {
        self.cells.iter_mut().for_each(BackgroundCell::clear_clock);
        info!("background grid clock rebased ({} cells)", self.cells.len());
    }

    /// Clear a single cell. Returns false if the cell does not exist.
    pub fn reset_cell(&mut self, ring: usize, bin: usize) -> bool {
        if ring >= self.config.rings || bin >= self.config.azimuth_bins {
            return false;
        }
        self.cells[ring * self.config.azimuth_bins + bin].reset();
        true
    }

    pub fn health(&self, now: Timestamp) -> GridHealth {
        let seed_observations = self.config.seed_observations;
        let total_cells = self.cells.len();
        let mut seeded_cells = 0;
        let mut frozen_cells = 0;
        for cell in &self.cells {
            if cell.is_seeded(seed_observations) {
                seeded_cells += 1;
            }
            if cell.is_frozen(now) {
                frozen_cells += 1;
            }
        }
        GridHealth {
            total_cells,
            seeded_cells,
            frozen_cells,
            seeded_ratio: if total_cells > 0 {
                seeded_cells as f64 / total_cells as f64
            } else {
                0.0
            },
            settled: self.is_settled(),
            frames_processed: self.frames_processed,
        }
    }

    pub fn snapshot(&self, timestamp: Timestamp) -> BackgroundSnapshot {
        BackgroundSnapshot {
            timestamp,
            rings: self.config.rings,
            azimuth_bins: self.config.azimuth_bins,
            frames_processed: self.frames_processed,
            cells: self.cells.clone(),
        }
    }

    /// Load cell state from a snapshot of the same shape.
    pub fn restore(&mut self, snapshot: &BackgroundSnapshot) -> Result<(), ConfigError> {
        let current = self.shape();
        let requested = (snapshot.rings, snapshot.azimuth_bins);
        if current != requested || snapshot.cells.len() != self.cells.len() {
            return Err(ConfigError::GridShapeChange { current, requested });
        }
        self.cells.copy_from_slice(&snapshot.cells);
        self.frames_processed = snapshot.frames_processed;
        Ok(())
    }
}

#[inline]
fn side(nearer: bool) -> usize {
    if nearer { 0 } else { 1 }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> BackgroundConfig {
        BackgroundConfig {
            rings: 4,
            azimuth_bins: 8,
            seed_observations: 2,
            ..Default::default()
        }
    }

    #[test]
    fn test_azimuth_binning_wraps() {
        let grid = BackgroundGrid::new(small_config());
        assert_eq!(grid.azimuth_bin(0.0), 0);
        assert_eq!(grid.azimuth_bin(TAU - 1e-9), 7);
        assert_eq!(grid.azimuth_bin(TAU), 0);
        assert_eq!(grid.azimuth_bin(-0.1), 7);
    }

    #[test]
    fn test_cell_index_rejects_invalid_returns() {
        let grid = BackgroundGrid::new(small_config());
        assert_eq!(grid.cell_index(4, 0.0, 10.0), None);
        assert_eq!(grid.cell_index(0, f64::NAN, 10.0), None);
        assert_eq!(grid.cell_index(0, 0.0, f64::INFINITY), None);
        assert_eq!(grid.cell_index(0, 0.0, 0.05), None);
        assert_eq!(grid.cell_index(1, 0.0, 10.0), Some(8));
    }

    #[test]
    fn test_unseeded_cell_is_unknown() {
        let mut grid = BackgroundGrid::new(small_config());
        assert_eq!(grid.evaluate(0, 10.0), PointClass::Unknown);
        grid.accept(0, 10.0, 1);
        assert_eq!(grid.evaluate(0, 10.0), PointClass::Unknown);
        grid.accept(0, 10.0, 2);
        assert_eq!(grid.evaluate(0, 10.0), PointClass::Background);
        assert_eq!(grid.evaluate(0, 5.0), PointClass::Candidate);
    }

    #[test]
    fn test_frozen_cell_ignores_updates() {
        let mut grid = BackgroundGrid::new(small_config());
        grid.accept(3, 10.0, 0);
        grid.accept(3, 10.0, 0);
        grid.freeze(3, 1_000);
        grid.accept(3, 20.0, 2_000);
        assert_eq!(grid.cells()[3].mean_range, 10.0);
        assert_eq!(grid.cells()[3].accept_count, 2);
    }

    #[test]
    fn test_neighbor_agreement_wraps_azimuth() {
        let mut grid = BackgroundGrid::new(small_config());
        for idx in 0..grid.cells().len() {
            grid.accept(idx, 10.0, 0);
            grid.accept(idx, 10.0, 0);
        }
        grid.begin_frame();
        // ring 1, bins 7 and 0 are azimuth neighbors
        grid.mark_candidate(8 + 7, true);
        grid.mark_candidate(8, true);
        grid.mark_candidate(16, true);
        assert_eq!(grid.neighbor_agreement(8, true), 2);
        grid.begin_frame();
        assert_eq!(grid.neighbor_agreement(8, true), 0);
    }

    #[test]
    fn test_neighbors_must_deviate_on_the_same_side() {
        let mut grid = BackgroundGrid::new(small_config());
        for idx in 0..grid.cells().len() {
            grid.accept(idx, 10.0, 0);
            grid.accept(idx, 10.0, 0);
        }
        assert!(grid.is_nearer(9, 4.0));
        assert!(!grid.is_nearer(9, 14.0));

        grid.begin_frame();
        // An object in front of cell 9, a dropout behind cells 10 and 17.
        grid.mark_candidate(9, true);
        grid.mark_candidate(10, false);
        grid.mark_candidate(17, false);
        assert_eq!(grid.neighbor_agreement(9, true), 0);
        assert_eq!(grid.neighbor_agreement(9, false), 2);
        assert_eq!(grid.neighbor_agreement(10, false), 1);
    }

    #[test]
    fn test_learning_rate_drops_after_settling() {
        let mut grid = BackgroundGrid::new(BackgroundConfig {
            settle_frames: 2,
            ..small_config()
        });
        assert_eq!(grid.learning_rate(), grid.config().learning_rate);
        grid.end_frame();
        grid.end_frame();
        assert!(grid.is_settled());
        assert_eq!(grid.learning_rate(), grid.config().post_settle_learning_rate);
    }

    #[test]
    fn test_set_config_rejects_shape_change() {
        let mut grid = BackgroundGrid::new(small_config());
        let mut cfg = small_config();
        cfg.azimuth_bins = 16;
        assert!(grid.set_config(cfg).is_err());
        let cfg = BackgroundConfig {
            closeness_multiplier: 5.0,
            ..small_config()
        };
        assert!(grid.set_config(cfg).is_ok());
        assert_eq!(grid.config().closeness_multiplier, 5.0);
    }

    #[test]
    fn test_snapshot_restore() {
        let mut grid = BackgroundGrid::new(small_config());
        grid.accept(5, 7.5, 42);
        let snap = grid.snapshot(42);

        let mut other = BackgroundGrid::new(small_config());
        other.restore(&snap).unwrap();
        assert_eq!(other.cells()[5].mean_range, 7.5);

        let mut wrong = BackgroundGrid::new(BackgroundConfig {
            rings: 2,
            ..small_config()
        });
        assert!(wrong.restore(&snap).is_err());
    }

    #[test]
    fn test_rebase_clock_lifts_freezes() {
        let mut grid = BackgroundGrid::new(small_config());
        let t0: Timestamp = 1_700_000_000_000_000_000;
        grid.accept(4, 10.0, t0);
        grid.accept(4, 10.0, t0);
        grid.freeze(4, t0);
        grid.rebase_clock();
        assert_eq!(grid.health(0).frozen_cells, 0);
        assert_eq!(grid.cells()[4].accept_count, 2);

        // Learning resumes on the new clock.
        grid.accept(4, 12.0, 100);
        assert_eq!(grid.cells()[4].accept_count, 3);
        assert_eq!(grid.cells()[4].last_updated, 100);
    }

    #[test]
    fn test_reset_cell_clears_frozen_state() {
        let mut grid = BackgroundGrid::new(small_config());
        grid.accept(9, 10.0, 0);
        grid.freeze(9, 0);
        assert!(grid.reset_cell(1, 1));
        assert_eq!(grid.cell(1, 1), Some(&BackgroundCell::default()));
        assert!(!grid.reset_cell(9, 0));
    }
}
