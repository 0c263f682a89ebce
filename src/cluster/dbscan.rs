//! Density-based clustering of foreground world points.

use std::cmp::Ordering;

use log::trace;

use crate::cluster::spatial::SpatialGrid;
use crate::cluster::world_cluster::WorldCluster;
use crate::config::ClusteringConfig;
use crate::types::{Timestamp, WorldPoint};

const UNASSIGNED: usize = usize::MAX;

/// Total order used to make clustering independent of input order.
fn canonical_cmp(a: &WorldPoint, b: &WorldPoint) -> Ordering {
    a.x.total_cmp(&b.x)
        .then(a.y.total_cmp(&b.y))
        .then(a.z.total_cmp(&b.z))
        .then(a.intensity.cmp(&b.intensity))
}

/// DBSCAN over the ground plane with a hash-grid neighbor index.
///
/// Only core points become cluster members. Every other point is noise and
/// counts towards the nearest cluster within the attach radius, which is
/// never smaller than `eps`.
#[derive(Debug, Clone)]
pub struct Clusterer {
    config: ClusteringConfig,
    index: SpatialGrid,
    sorted: Vec<WorldPoint>,
    offsets: Vec<usize>,
    neighbors: Vec<usize>,
    scratch: Vec<usize>,
}

impl Clusterer {
    pub fn new(config: ClusteringConfig) -> Self {
        let index = SpatialGrid::new(config.eps);
        Self {
            config,
            index,
            sorted: Vec::new(),
            offsets: Vec::new(),
            neighbors: Vec::new(),
            scratch: Vec::new(),
        }
    }

    pub fn config(&self) -> &ClusteringConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: ClusteringConfig) {
        self.index.set_cell_size(config.eps);
        self.config = config;
    }

    pub fn cluster(&mut self, points: &[WorldPoint], timestamp: Timestamp) -> Vec<WorldCluster> {
        let Self {
            config,
            index,
            sorted,
            offsets,
            neighbors,
            scratch,
        } = self;

        sorted.clear();
        sorted.extend(
            points
                .iter()
                .filter(|p| p.x.is_finite() && p.y.is_finite() && p.z.is_finite()),
        );
        if sorted.is_empty() {
            return Vec::new();
        }
        sorted.sort_by(canonical_cmp);
        let pts: &[WorldPoint] = sorted;
        let n = pts.len();

        index.build(pts);
        offsets.clear();
        neighbors.clear();
        offsets.push(0);
        for p in pts {
            index.within(pts, p, config.eps, scratch);
            neighbors.extend_from_slice(scratch);
            offsets.push(neighbors.len());
        }
        let offsets: &[usize] = offsets;
        let neighbors: &[usize] = neighbors;
        let nbrs = move |i: usize| &neighbors[offsets[i]..offsets[i + 1]];

        // Neighbor lists include the point itself.
        let core: Vec<bool> = (0..n).map(|i| nbrs(i).len() >= config.min_points).collect();

        let mut labels = vec![UNASSIGNED; n];
        let mut cluster_count = 0;
        let mut stack = Vec::new();
        for seed in 0..n {
            if !core[seed] || labels[seed] != UNASSIGNED {
                continue;
            }
            labels[seed] = cluster_count;
            stack.push(seed);
            while let Some(j) = stack.pop() {
                for &k in nbrs(j) {
                    if core[k] && labels[k] == UNASSIGNED {
                        labels[k] = cluster_count;
                        stack.push(k);
                    }
                }
            }
            cluster_count += 1;
        }

        let attach_radius = config.eps * config.noise_attach_factor.max(1.0);
        let mut noise_counts = vec![0usize; cluster_count];
        for i in 0..n {
            if labels[i] != UNASSIGNED {
                continue;
            }
            index.within(pts, &pts[i], attach_radius, scratch);
            let nearest = scratch
                .iter()
                .copied()
                .filter(|&k| labels[k] != UNASSIGNED)
                .min_by(|&a, &b| {
                    pts[i]
                        .distance_xy_sq(&pts[a])
                        .total_cmp(&pts[i].distance_xy_sq(&pts[b]))
                        .then(labels[a].cmp(&labels[b]))
                });
            if let Some(k) = nearest {
                noise_counts[labels[k]] += 1;
            }
        }

        let mut members: Vec<Vec<WorldPoint>> = vec![Vec::new(); cluster_count];
        for (p, &label) in pts.iter().zip(&labels) {
            if label != UNASSIGNED {
                members[label].push(*p);
            }
        }

        let clusters: Vec<WorldCluster> = members
            .iter()
            .zip(noise_counts)
            .filter_map(|(m, noise)| {
                let mut cluster = WorldCluster::from_members(m, timestamp)?;
                cluster.noise_point_count = noise;
                Some(cluster)
            })
            .filter(|c| {
                c.point_count >= config.min_cluster_points
                    && c.bounding_box.length <= config.max_cluster_extent
            })
            .collect();

        trace!(
            "clustered {} points into {} clusters ({} before filtering)",
            n,
            clusters.len(),
            cluster_count
        );
        clusters
    }
}
