//! Cluster geometry handed from the clusterer to the tracker.

use serde::{Deserialize, Serialize};

use crate::types::{Timestamp, WorldPoint};

/// Axis-aligned object extents in metres.
///
/// `length` is the larger horizontal extent and `width` the smaller one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub length: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(length: f64, width: f64, height: f64) -> Self {
        Self {
            length,
            width,
            height,
        }
    }

    /// Build from raw x/y/z extents, ordering the horizontal sides.
    pub fn from_extents(dx: f64, dy: f64, dz: f64) -> Self {
        Self {
            length: dx.max(dy),
            width: dx.min(dy),
            height: dz,
        }
    }
}

/// One density-connected group of foreground points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldCluster {
    pub centroid: [f64; 3],
    pub bounding_box: BoundingBox,
    pub point_count: usize,
    /// Points near this cluster that were not density-reachable
    pub noise_point_count: usize,
    pub intensity_mean: f64,
    /// Highest member point (world z)
    pub height_max: f64,
    pub timestamp: Timestamp,
}

impl WorldCluster {
    /// Summarise a non-empty set of member points.
    pub(crate) fn from_members(members: &[WorldPoint], timestamp: Timestamp) -> Option<Self> {
        let first = members.first()?;
        let mut min = [first.x, first.y, first.z];
        let mut max = min;
        let mut sum = [0.0; 3];
        let mut intensity = 0.0;
        for p in members {
            for (axis, v) in [p.x, p.y, p.z].into_iter().enumerate() {
                min[axis] = min[axis].min(v);
                max[axis] = max[axis].max(v);
                sum[axis] += v;
            }
            intensity += f64::from(p.intensity);
        }
        let n = members.len() as f64;
        Some(Self {
            centroid: [sum[0] / n, sum[1] / n, sum[2] / n],
            bounding_box: BoundingBox::from_extents(
                max[0] - min[0],
                max[1] - min[1],
                max[2] - min[2],
            ),
            point_count: members.len(),
            noise_point_count: 0,
            intensity_mean: intensity / n,
            height_max: max[2],
            timestamp,
        })
    }

    #[inline]
    pub fn x(&self) -> f64 {
        self.centroid[0]
    }

    #[inline]
    pub fn y(&self) -> f64 {
        self.centroid[1]
    }
}
