//! Foreground extraction: runs the background grid over a whole frame.

use serde::{Deserialize, Serialize};

use crate::background::grid::{BackgroundGrid, PointClass};
use crate::types::Frame;

/// Per-frame classification counts.
///
/// `unknown` returns fall in cells that are still seeding and are excluded
/// from both `foreground` and `background`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ForegroundStats {
    pub total: usize,
    pub foreground: usize,
    pub background: usize,
    pub unknown: usize,
    pub invalid: usize,
    /// `foreground / (foreground + background)`
    pub foreground_fraction: f64,
}

impl ForegroundStats {
    /// Returns that landed in a grid cell.
    pub fn valid(&self) -> usize {
        self.total - self.invalid
    }
}

/// Foreground mask aligned with the frame's points.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForegroundResult {
    pub mask: Vec<bool>,
    pub stats: ForegroundStats,
}

impl ForegroundResult {
    /// Indices of foreground points.
    pub fn foreground_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.mask
            .iter()
            .enumerate()
            .filter_map(|(i, &fg)| if fg { Some(i) } else { None })
    }
}

#[derive(Debug, Clone, Copy)]
struct Decision {
    cell: usize,
    class: PointClass,
    /// Candidate lies in front of the background
    nearer: bool,
    learn: bool,
}

/// Applies a [`BackgroundGrid`] to frames, reusing its scratch buffers.
#[derive(Debug, Default)]
pub struct ForegroundExtractor {
    decisions: Vec<Decision>,
}

impl ForegroundExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify every point of `frame` and update the grid with accepted
    /// background returns.
    ///
    /// The grid is left untouched when the frame has no point that maps to a
    /// cell; the returned stats then report the rejected points.
    pub fn extract(&mut self, grid: &mut BackgroundGrid, frame: &Frame) -> ForegroundResult {
        let n = frame.points.len();
        let mut stats = ForegroundStats {
            total: n,
            ..Default::default()
        };
        if n == 0 {
            return ForegroundResult::default();
        }

        // Pass 1: evaluate against the grid as it was before this frame.
        self.decisions.clear();
        self.decisions.reserve(n);
        for p in &frame.points {
            let decision = match grid.cell_index(p.ring, p.azimuth, p.range) {
                Some(cell) => {
                    let class = grid.evaluate(cell, p.range);
                    Decision {
                        cell,
                        class,
                        nearer: class == PointClass::Candidate && grid.is_nearer(cell, p.range),
                        learn: matches!(class, PointClass::Background | PointClass::Unknown),
                    }
                }
                None => Decision {
                    cell: usize::MAX,
                    class: PointClass::Invalid,
                    nearer: false,
                    learn: false,
                },
            };
            if decision.class == PointClass::Invalid {
                stats.invalid += 1;
            }
            self.decisions.push(decision);
        }
        if stats.invalid == n {
            return ForegroundResult {
                mask: vec![false; n],
                stats,
            };
        }

        grid.begin_frame();
        for d in &self.decisions {
            if d.class == PointClass::Candidate {
                grid.mark_candidate(d.cell, d.nearer);
            }
        }

        // Pass 2: neighbor confirmation.
        let required = grid.config().neighbor_confirmation_count;
        let mut mask = vec![false; n];
        for (i, d) in self.decisions.iter().enumerate() {
            match d.class {
                PointClass::Candidate => {
                    if required == 0 || grid.neighbor_agreement(d.cell, d.nearer) >= required {
                        mask[i] = true;
                        stats.foreground += 1;
                    } else {
                        // Isolated spike: counted as background, never learned.
                        stats.background += 1;
                    }
                }
                PointClass::Background => stats.background += 1,
                PointClass::Unknown => stats.unknown += 1,
                PointClass::Invalid => {}
            }
        }

        // Pass 3: freeze cells holding objects, then learn the rest.
        for (i, d) in self.decisions.iter().enumerate() {
            if mask[i] {
                grid.freeze(d.cell, frame.timestamp);
            }
        }
        for (p, d) in frame.points.iter().zip(&self.decisions) {
            if d.learn {
                grid.accept(d.cell, p.range, frame.timestamp);
            }
        }
        grid.end_frame();

        let decided = stats.foreground + stats.background;
        stats.foreground_fraction = if decided > 0 {
            stats.foreground as f64 / decided as f64
        } else {
            0.0
        };

        ForegroundResult { mask, stats }
    }
}
