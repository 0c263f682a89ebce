//! Pipeline driver: one frame in, track events out.

use std::time::{Duration, Instant};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::background::{BackgroundGrid, BackgroundSnapshot, ForegroundExtractor, ForegroundStats};
use crate::classifier::Classifier;
use crate::cluster::Clusterer;
use crate::config::PipelineConfig;
use crate::error::{ConfigError, PipelineError};
use crate::tracker::{ObjectTracker, TrackSnapshot, TrackerUpdate};
use crate::transform::WorldTransformer;
use crate::types::{Frame, Timestamp, WorldPoint};

use super::status::{StatusHandle, TrackSummary};

/// Why a track record is emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackEventKind {
    /// Tentative track promoted this frame
    Confirmed,
    /// Confirmed track matched again
    Updated,
    /// Previously confirmed track removed
    Deleted,
}

/// Flat track record for the persistence collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackEvent {
    pub kind: TrackEventKind,
    /// Frame that produced the event
    pub timestamp: Timestamp,
    pub snapshot: TrackSnapshot,
}

/// What happens to the background grid on [`Pipeline::reset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetMode {
    /// Clear tracks and the background grid
    Full,
    /// Clear tracks, keep the learned background (replay analysis)
    PreserveBackground,
}

/// Result of processing one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameOutput {
    pub timestamp: Timestamp,
    pub stats: ForegroundStats,
    pub cluster_count: usize,
    /// Track ids grouped by lifecycle outcome, tentative tracks included
    pub changes: TrackerUpdate,
    /// Records for persistence; tentative tracks never appear here
    pub events: Vec<TrackEvent>,
    pub latency: Duration,
}

/// Owns every stage of the perception pipeline and runs them in order.
///
/// Only the thread that owns the `Pipeline` mutates the grid and the tracks.
/// Monitoring goes through the [`StatusHandle`].
pub struct Pipeline {
    config: PipelineConfig,
    grid: BackgroundGrid,
    extractor: ForegroundExtractor,
    transformer: WorldTransformer,
    clusterer: Clusterer,
    tracker: ObjectTracker,
    classifier: Classifier,
    status: StatusHandle,
    world_points: Vec<WorldPoint>,
    last_timestamp: Option<Timestamp>,
    frames_processed: u64,
    frames_skipped: u64,
    tracks_confirmed_total: u64,
}

impl Pipeline {
    /// Build a pipeline from a validated configuration.
    pub fn new(config: PipelineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let transformer = WorldTransformer::new(&config.pose, config.background.rings);
        Ok(Self {
            grid: BackgroundGrid::new(config.background.clone()),
            extractor: ForegroundExtractor::new(),
            transformer,
            clusterer: Clusterer::new(config.clustering.clone()),
            tracker: ObjectTracker::new(config.tracker.clone()),
            classifier: Classifier::new(config.classifier.clone()),
            status: StatusHandle::new(),
            world_points: Vec::new(),
            last_timestamp: None,
            frames_processed: 0,
            frames_skipped: 0,
            tracks_confirmed_total: 0,
            config,
        })
    }

    /// Process a single frame.
    ///
    /// Empty, malformed and out-of-order frames are skipped with a warning and
    /// returned as errors; they leave the grid and the tracks untouched.
    pub fn process_frame(&mut self, frame: &Frame) -> Result<FrameOutput, PipelineError> {
        let start = Instant::now();
        let now = frame.timestamp;

        if frame.is_empty() {
            return Err(self.skip(PipelineError::EmptyFrame { timestamp: now }));
        }
        if let Some(previous) = self.last_timestamp {
            if now < previous {
                return Err(self.skip(PipelineError::OutOfOrderFrame {
                    previous,
                    received: now,
                }));
            }
        }

        // Step 1: background model
        let foreground = self.extractor.extract(&mut self.grid, frame);
        if foreground.stats.valid() == 0 {
            return Err(self.skip(PipelineError::MalformedFrame {
                timestamp: now,
                invalid: foreground.stats.invalid,
            }));
        }
        self.last_timestamp = Some(now);

        // Step 2: world frame and clustering
        self.transformer
            .transform_masked(frame, &foreground.mask, &mut self.world_points);
        let clusters = self.clusterer.cluster(&self.world_points, now);

        // Step 3: tracking and classification
        let changes = self.tracker.update(&clusters, now);
        for track in self.tracker.confirmed_mut() {
            self.classifier.apply(track);
        }

        let events = self.collect_events(&changes, now);
        self.frames_processed += 1;
        self.tracks_confirmed_total += changes.confirmed.len() as u64;

        let output = FrameOutput {
            timestamp: now,
            stats: foreground.stats,
            cluster_count: clusters.len(),
            changes,
            events,
            latency: start.elapsed(),
        };

        debug!(
            "frame {}: {}/{} foreground, {} clusters, {} live tracks, {} events in {:?}",
            now,
            output.stats.foreground,
            output.stats.total,
            output.cluster_count,
            self.tracker.live_count(),
            output.events.len(),
            output.latency
        );

        self.publish(&output);
        Ok(output)
    }

    fn collect_events(&self, changes: &TrackerUpdate, now: Timestamp) -> Vec<TrackEvent> {
        let mut events = Vec::new();
        let groups = [
            (TrackEventKind::Confirmed, &changes.confirmed),
            (TrackEventKind::Updated, &changes.updated),
            (TrackEventKind::Deleted, &changes.deleted),
        ];
        for (kind, ids) in groups {
            for &id in ids {
                let Some(track) = self.tracker.get(id) else {
                    continue;
                };
                if kind == TrackEventKind::Deleted && !track.was_confirmed() {
                    continue;
                }
                events.push(TrackEvent {
                    kind,
                    timestamp: now,
                    snapshot: track.snapshot(),
                });
            }
        }
        events
    }

    fn skip(&mut self, err: PipelineError) -> PipelineError {
        warn!("skipping frame: {}", err);
        self.frames_skipped += 1;
        let skipped = self.frames_skipped;
        self.status.update(|s| s.frames_skipped = skipped);
        err
    }

    fn publish(&self, output: &FrameOutput) {
        let grid = self.grid.health(output.timestamp);
        let tracks: Vec<TrackSummary> = self.tracker.live().map(TrackSummary::from).collect();
        let frames_processed = self.frames_processed;
        let tracks_confirmed_total = self.tracks_confirmed_total;
        self.status.update(|s| {
            s.grid = grid;
            s.last_frame = Some(output.timestamp);
            s.last_stats = output.stats;
            s.last_cluster_count = output.cluster_count;
            s.last_latency_micros = u64::try_from(output.latency.as_micros()).unwrap_or(u64::MAX);
            s.tracks = tracks;
            s.frames_processed = frames_processed;
            s.tracks_confirmed_total = tracks_confirmed_total;
        });
    }

    /// Hot-reload thresholds without discarding grid or track state.
    ///
    /// The whole config is rejected, and nothing changes, if it is invalid or
    /// alters the grid shape.
    pub fn apply_config(&mut self, config: PipelineConfig) -> Result<(), PipelineError> {
        if let Err(e) = self.check_reload(&config) {
            warn!("rejected configuration reload: {}", e);
            return Err(e.into());
        }
        self.grid.set_config(config.background.clone())?;
        self.transformer = WorldTransformer::new(&config.pose, config.background.rings);
        self.clusterer.set_config(config.clustering.clone());
        self.tracker.set_config(config.tracker.clone());
        self.classifier.set_config(config.classifier.clone());
        self.config = config;
        info!("configuration reloaded");
        Ok(())
    }

    fn check_reload(&self, config: &PipelineConfig) -> Result<(), ConfigError> {
        config.validate()?;
        let current = self.config.grid_shape();
        let requested = config.grid_shape();
        if current != requested {
            return Err(ConfigError::GridShapeChange { current, requested });
        }
        Ok(())
    }

    /// Flush live tracks to Deleted and optionally clear the background.
    ///
    /// Returns Deleted events for tracks that had been confirmed. The frame
    /// clock restarts, so the next source may begin at any timestamp; a
    /// preserved background keeps its ranges but not its freezes.
    pub fn reset(&mut self, mode: ResetMode) -> Vec<TrackEvent> {
        let now = self.last_timestamp.unwrap_or(0);
        let changes = self.tracker.flush(now);
        let events = self.collect_events(&changes, now);
        match mode {
            ResetMode::Full => self.grid.reset(),
            ResetMode::PreserveBackground => self.grid.rebase_clock(),
        }
        self.last_timestamp = None;
        info!(
            "pipeline reset ({:?}), {} tracks flushed",
            mode,
            changes.deleted.len()
        );

        let grid = self.grid.health(now);
        self.status.update(|s| {
            s.grid = grid;
            s.tracks.clear();
        });
        events
    }

    /// Clear one background cell, e.g. after a parked object left.
    pub fn reset_background_cell(&mut self, ring: usize, bin: usize) -> bool {
        self.grid.reset_cell(ring, bin)
    }

    pub fn background_snapshot(&self) -> BackgroundSnapshot {
        self.grid.snapshot(self.last_timestamp.unwrap_or(0))
    }

    /// Load a background snapshot. Freezes are dropped unless the snapshot was
    /// taken at the current frame time.
    pub fn restore_background(&mut self, snapshot: &BackgroundSnapshot) -> Result<(), ConfigError> {
        self.grid.restore(snapshot)?;
        if self.last_timestamp != Some(snapshot.timestamp) {
            self.grid.rebase_clock();
        }
        info!(
            "background restored from snapshot at {} ({} frames)",
            snapshot.timestamp, snapshot.frames_processed
        );
        Ok(())
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn grid(&self) -> &BackgroundGrid {
        &self.grid
    }

    pub fn tracker(&self) -> &ObjectTracker {
        &self.tracker
    }

    pub fn status_handle(&self) -> StatusHandle {
        self.status.clone()
    }

    pub fn last_timestamp(&self) -> Option<Timestamp> {
        self.last_timestamp
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    pub fn frames_skipped(&self) -> u64 {
        self.frames_skipped
    }
}
