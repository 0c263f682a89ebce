//! LiDAR perception for fixed traffic sensors.
//!
//! Frames of polar returns go through an adaptive background model, are
//! transformed to the world frame, clustered with DBSCAN and tracked with a
//! constant-velocity Kalman filter per object. Confirmed tracks are classified
//! by rule and emitted as flat records.

pub mod background;
pub mod classifier;
pub mod cluster;
pub mod config;
pub mod error;
pub mod integration;
pub mod tracker;
pub mod transform;
pub mod types;

pub use background::{
    BackgroundCell, BackgroundGrid, BackgroundSnapshot, ForegroundExtractor, ForegroundResult,
    ForegroundStats, GridHealth, PointClass,
};
pub use classifier::{ClassConfidenceFloor, Classifier, ClassifierConfig, ObjectClass};
pub use cluster::{BoundingBox, Clusterer, WorldCluster};
pub use config::{
    AssociationStrategy, BackgroundConfig, ClusteringConfig, OutputConfig, PipelineConfig,
    SensorPoseConfig, TrackerConfig,
};
pub use error::{ConfigError, PipelineError};
pub use integration::{
    AsyncWriter, FrameOutput, MemoryStore, OutputRecord, Pipeline, PipelineCommand,
    PipelineRunner, PipelineStatus, ResetMode, StatusHandle, TrackEvent, TrackEventKind,
    TrackStore, TrackSummary,
};
pub use tracker::{
    ObjectTracker, TrackFeatures, TrackSnapshot, TrackState, TrackedObject, TrackerUpdate,
};
pub use transform::WorldTransformer;
pub use types::{Frame, PolarPoint, Timestamp, WorldPoint};
