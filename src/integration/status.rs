//! Monitoring snapshot shared between the pipeline thread and readers.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::background::{ForegroundStats, GridHealth};
use crate::classifier::ObjectClass;
use crate::tracker::{TrackState, TrackedObject};
use crate::types::Timestamp;

/// One line of the active-track summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackSummary {
    pub track_id: u64,
    pub state: TrackState,
    pub class_label: ObjectClass,
    pub class_confidence: f64,
    pub x: f64,
    pub y: f64,
    pub speed: f64,
    pub hit_count: u32,
    pub last_seen: Timestamp,
}

impl From<&TrackedObject> for TrackSummary {
    fn from(t: &TrackedObject) -> Self {
        let (x, y) = t.position();
        Self {
            track_id: t.track_id,
            state: t.state,
            class_label: t.class_label,
            class_confidence: t.class_confidence,
            x,
            y,
            speed: t.speed(),
            hit_count: t.hit_count,
            last_seen: t.last_seen,
        }
    }
}

/// Latest per-frame values plus running totals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineStatus {
    pub grid: GridHealth,
    pub last_frame: Option<Timestamp>,
    pub last_stats: ForegroundStats,
    pub last_cluster_count: usize,
    pub last_latency_micros: u64,
    /// Live tracks, tentative and confirmed
    pub tracks: Vec<TrackSummary>,
    pub frames_processed: u64,
    pub frames_skipped: u64,
    pub tracks_confirmed_total: u64,
    /// Output records the writer had to drop
    pub records_dropped: u64,
}

/// Cloneable read handle on the pipeline status.
///
/// The pipeline publishes once per frame under a short write lock; readers
/// get a copy and never hold the lock across their own work.
#[derive(Debug, Clone, Default)]
pub struct StatusHandle {
    inner: Arc<RwLock<PipelineStatus>>,
}

impl StatusHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> PipelineStatus {
        self.inner.read().clone()
    }

    pub fn grid_health(&self) -> GridHealth {
        self.inner.read().grid
    }

    pub fn frames_processed(&self) -> u64 {
        self.inner.read().frames_processed
    }

    pub(crate) fn update<F: FnOnce(&mut PipelineStatus)>(&self, f: F) {
        let mut status = self.inner.write();
        f(&mut status);
    }

    pub(crate) fn set_records_dropped(&self, dropped: u64) {
        self.inner.write().records_dropped = dropped;
    }
}
