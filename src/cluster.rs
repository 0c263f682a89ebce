//! Spatial clustering of foreground points.

mod dbscan;
mod spatial;
mod world_cluster;

pub use dbscan::Clusterer;
pub use spatial::SpatialGrid;
pub use world_cluster::{BoundingBox, WorldCluster};
