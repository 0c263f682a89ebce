//! Track-to-cluster association.

use log::trace;
use ndarray::Array2;

use crate::cluster::WorldCluster;
use crate::config::AssociationStrategy;
use crate::tracker::kalman_filter::KalmanFilter;
use crate::tracker::tracked_object::TrackedObject;

/// Cost of a pair that falls outside the gate.
pub const GATED: f64 = 1e6;

/// Gated squared-distance matrix between predicted tracks and clusters.
///
/// Mahalanobis distance is used; a track whose innovation covariance is
/// singular falls back to plain squared Euclidean distance for this frame.
pub fn gated_distance_matrix(
    tracks: &[&TrackedObject],
    clusters: &[WorldCluster],
    kalman_filter: &KalmanFilter,
    gate: f64,
) -> Array2<f64> {
    let mut dists = Array2::from_elem((tracks.len(), clusters.len()), GATED);
    for (i, t) in tracks.iter().enumerate() {
        for (j, c) in clusters.iter().enumerate() {
            let d = t.gating_distance(kalman_filter, c).unwrap_or_else(|| {
                let (x, y) = t.position();
                (c.x() - x).powi(2) + (c.y() - y).powi(2)
            });
            if d.is_finite() && d < gate {
                dists[[i, j]] = d;
            }
        }
    }
    dists
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssignmentResult {
    pub matches: Vec<(usize, usize)>,
    pub unmatched_tracks: Vec<usize>,
    pub unmatched_detections: Vec<usize>,
}

impl AssignmentResult {
    fn from_matches(matches: Vec<(usize, usize)>, num_rows: usize, num_cols: usize) -> Self {
        let mut row_used = vec![false; num_rows];
        let mut col_used = vec![false; num_cols];
        for &(r, c) in &matches {
            row_used[r] = true;
            col_used[c] = true;
        }
        Self {
            matches,
            unmatched_tracks: (0..num_rows).filter(|&r| !row_used[r]).collect(),
            unmatched_detections: (0..num_cols).filter(|&c| !col_used[c]).collect(),
        }
    }
}

pub fn assign(cost_matrix: &Array2<f64>, thresh: f64, strategy: AssociationStrategy) -> AssignmentResult {
    match strategy {
        AssociationStrategy::Greedy => greedy_assignment(cost_matrix, thresh),
        AssociationStrategy::Optimal => linear_assignment(cost_matrix, thresh),
    }
}

/// Repeatedly take the cheapest remaining pair below `thresh`.
///
/// Ties are broken by row then column so the result is deterministic.
pub fn greedy_assignment(cost_matrix: &Array2<f64>, thresh: f64) -> AssignmentResult {
    let (num_rows, num_cols) = cost_matrix.dim();
    let mut candidates: Vec<(f64, usize, usize)> = cost_matrix
        .indexed_iter()
        .filter(|&(_, &c)| c < thresh)
        .map(|((r, c), &cost)| (cost, r, c))
        .collect();
    candidates.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));

    let mut row_used = vec![false; num_rows];
    let mut col_used = vec![false; num_cols];
    let mut matches = Vec::new();
    for (cost, r, c) in candidates {
        if row_used[r] || col_used[c] {
            continue;
        }
        trace!("greedy match track#{} -> cluster#{} (d2 = {:.3})", r, c, cost);
        row_used[r] = true;
        col_used[c] = true;
        matches.push((r, c));
    }
    matches.sort_unstable();
    AssignmentResult::from_matches(matches, num_rows, num_cols)
}

/// Minimum-total-cost assignment (Jonker-Volgenant), keeping only pairs
/// below `thresh`.
pub fn linear_assignment(cost_matrix: &Array2<f64>, thresh: f64) -> AssignmentResult {
    let (num_rows, num_cols) = cost_matrix.dim();

    if num_rows == 0 || num_cols == 0 {
        return AssignmentResult::from_matches(Vec::new(), num_rows, num_cols);
    }

    let size = num_rows.max(num_cols);
    let mut padded = Array2::<f64>::from_elem((size, size), GATED);

    for i in 0..num_rows {
        for j in 0..num_cols {
            padded[[i, j]] = cost_matrix[[i, j]];
        }
    }

    let mut matches = vec![];
    match lapjv::lapjv(&padded) {
        Ok((row_to_col, _)) => {
            for (row_idx, &col_idx) in row_to_col.iter().enumerate() {
                if row_idx < num_rows
                    && col_idx < num_cols
                    && cost_matrix[[row_idx, col_idx]] < thresh
                {
                    matches.push((row_idx, col_idx));
                }
            }
        }
        Err(_) => {
            // Solver failure degrades to the greedy matcher.
            return greedy_assignment(cost_matrix, thresh);
        }
    }

    AssignmentResult::from_matches(matches, num_rows, num_cols)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_greedy_prefers_cheapest_pair() {
        let costs = array![[1.0, 0.5], [0.4, 2.0]];
        let res = greedy_assignment(&costs, 5.0);
        assert_eq!(res.matches, vec![(0, 1), (1, 0)]);
        assert!(res.unmatched_tracks.is_empty());
        assert!(res.unmatched_detections.is_empty());
    }

    #[test]
    fn test_greedy_respects_gate() {
        let costs = array![[GATED, 3.0], [GATED, GATED]];
        let res = greedy_assignment(&costs, 2.0);
        assert!(res.matches.is_empty());
        assert_eq!(res.unmatched_tracks, vec![0, 1]);
        assert_eq!(res.unmatched_detections, vec![0, 1]);
    }

    #[test]
    fn test_greedy_vs_optimal() {
        // Greedy grabs (0,0) first and strands row 1; optimal pairs both.
        let costs = array![[1.0, 2.0], [1.5, GATED]];
        let greedy = greedy_assignment(&costs, 10.0);
        assert_eq!(greedy.matches, vec![(0, 0)]);
        assert_eq!(greedy.unmatched_tracks, vec![1]);

        let optimal = linear_assignment(&costs, 10.0);
        assert_eq!(optimal.matches, vec![(0, 1), (1, 0)]);
    }

    #[test]
    fn test_empty_dimensions() {
        let costs = Array2::<f64>::zeros((0, 3));
        let res = assign(&costs, 1.0, AssociationStrategy::Optimal);
        assert_eq!(res.unmatched_detections, vec![0, 1, 2]);
        let costs = Array2::<f64>::zeros((2, 0));
        let res = assign(&costs, 1.0, AssociationStrategy::Greedy);
        assert_eq!(res.unmatched_tracks, vec![0, 1]);
    }
}
