//! Multi-object tracker over per-frame clusters.

use log::{debug, warn};

use crate::cluster::WorldCluster;
use crate::config::TrackerConfig;
use crate::tracker::kalman_filter::KalmanFilter;
use crate::tracker::matching::{self, AssignmentResult};
use crate::tracker::track_state::TrackState;
use crate::tracker::tracked_object::TrackedObject;
use crate::types::{Timestamp, secs_to_nanos};

/// Track ids touched by one tracker step, grouped by what happened.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackerUpdate {
    /// New tentative tracks
    pub born: Vec<u64>,
    /// Tracks promoted to Confirmed this step
    pub confirmed: Vec<u64>,
    /// Already-confirmed tracks matched this step
    pub updated: Vec<u64>,
    /// Tracks that reached the miss limit this step
    pub deleted: Vec<u64>,
    /// Tentative tracks dropped to make room under the track cap
    pub evicted: Vec<u64>,
    /// Deleted tracks removed after their grace period
    pub purged: Vec<u64>,
}

pub struct ObjectTracker {
    config: TrackerConfig,
    kalman_filter: KalmanFilter,
    tracks: Vec<TrackedObject>,
    next_id: u64,
}

impl Default for ObjectTracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

impl ObjectTracker {
    pub fn new(config: TrackerConfig) -> Self {
        let kalman_filter = KalmanFilter::new(&config);
        Self {
            config,
            kalman_filter,
            tracks: Vec::new(),
            next_id: 1,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Swap parameters in place. Existing tracks keep their state; history
    /// and speed sample buffers are resized to the new capacities.
    pub fn set_config(&mut self, config: TrackerConfig) {
        self.kalman_filter = KalmanFilter::new(&config);
        for track in &mut self.tracks {
            track.reconfigure(&config);
        }
        self.config = config;
    }

    /// Every retained track, deleted ones still in their grace period included.
    pub fn tracks(&self) -> &[TrackedObject] {
        &self.tracks
    }

    pub fn get(&self, track_id: u64) -> Option<&TrackedObject> {
        self.tracks.iter().find(|t| t.track_id == track_id)
    }

    pub fn live(&self) -> impl Iterator<Item = &TrackedObject> {
        self.tracks.iter().filter(|t| t.state.is_live())
    }

    pub fn live_count(&self) -> usize {
        self.live().count()
    }

    pub fn confirmed(&self) -> impl Iterator<Item = &TrackedObject> {
        self.tracks
            .iter()
            .filter(|t| t.state == TrackState::Confirmed)
    }

    pub fn confirmed_mut(&mut self) -> impl Iterator<Item = &mut TrackedObject> {
        self.tracks
            .iter_mut()
            .filter(|t| t.state == TrackState::Confirmed)
    }

    /// Id the next born track will receive.
    pub fn next_track_id(&self) -> u64 {
        self.next_id
    }

    /// Advance every live track to `now` and associate this frame's clusters.
    pub fn update(&mut self, clusters: &[WorldCluster], now: Timestamp) -> TrackerUpdate {
        let mut out = TrackerUpdate::default();
        self.purge(now, &mut out);

        // Step 1: predict live tracks to the frame time
        let live: Vec<usize> = (0..self.tracks.len())
            .filter(|&i| self.tracks[i].state.is_live())
            .collect();
        for &i in &live {
            self.tracks[i].predict(&self.kalman_filter, now, &self.config);
        }

        // Step 2: gated association
        let AssignmentResult {
            matches,
            unmatched_tracks,
            unmatched_detections,
        } = {
            let live_refs: Vec<&TrackedObject> = live.iter().map(|&i| &self.tracks[i]).collect();
            let dists = matching::gated_distance_matrix(
                &live_refs,
                clusters,
                &self.kalman_filter,
                self.config.gating_distance_squared,
            );
            matching::assign(
                &dists,
                self.config.gating_distance_squared,
                self.config.association,
            )
        };

        // Step 3: matched tracks
        for (r, c) in matches {
            let track = &mut self.tracks[live[r]];
            let was_confirmed = track.state == TrackState::Confirmed;
            if track.update(&clusters[c], &self.kalman_filter, &self.config) {
                debug!(
                    "track {} confirmed after {} hits",
                    track.track_id, track.hit_count
                );
                out.confirmed.push(track.track_id);
            } else if was_confirmed {
                out.updated.push(track.track_id);
            }
        }

        // Step 4: misses
        for r in unmatched_tracks {
            let track = &mut self.tracks[live[r]];
            if track.mark_missed(now, &self.config) {
                debug!(
                    "track {} deleted after {} misses ({})",
                    track.track_id,
                    track.miss_count,
                    if track.was_confirmed() { "confirmed" } else { "tentative" }
                );
                out.deleted.push(track.track_id);
            }
        }

        // Step 5: births
        let first_new_id = self.next_id;
        for c in unmatched_detections {
            self.spawn(&clusters[c], first_new_id, &mut out);
        }

        out
    }

    /// Delete every live track, e.g. when the upstream source changes.
    /// Deleted tracks still honour the grace period.
    pub fn flush(&mut self, now: Timestamp) -> TrackerUpdate {
        let mut out = TrackerUpdate::default();
        for track in self.tracks.iter_mut().filter(|t| t.state.is_live()) {
            track.mark_deleted(now);
            out.deleted.push(track.track_id);
        }
        if !out.deleted.is_empty() {
            debug!("flushed {} live tracks", out.deleted.len());
        }
        out
    }

    fn spawn(&mut self, cluster: &WorldCluster, first_new_id: u64, out: &mut TrackerUpdate) {
        if self.live_count() >= self.config.max_tracks {
            match self.eviction_candidate(first_new_id) {
                Some(idx) => {
                    let evicted = self.tracks.remove(idx);
                    debug!(
                        "track cap {} reached, evicted tentative track {}",
                        self.config.max_tracks, evicted.track_id
                    );
                    out.evicted.push(evicted.track_id);
                }
                None => {
                    warn!(
                        "track cap {} reached with no tentative track to evict, dropping cluster at ({:.2}, {:.2})",
                        self.config.max_tracks,
                        cluster.x(),
                        cluster.y()
                    );
                    return;
                }
            }
        }

        let track_id = self.next_id;
        self.next_id += 1;
        let mut track = TrackedObject::new(track_id, cluster, &self.kalman_filter, &self.config);
        debug!(
            "track {} born at ({:.2}, {:.2})",
            track_id,
            cluster.x(),
            cluster.y()
        );
        out.born.push(track_id);
        if track.confirm_if_ready(self.config.hits_to_confirm, cluster.timestamp) {
            out.confirmed.push(track_id);
        }
        self.tracks.push(track);
    }

    /// Weakest tentative track that was not born in the current step: fewest
    /// hits, then stalest, then oldest id.
    fn eviction_candidate(&self, first_new_id: u64) -> Option<usize> {
        self.tracks
            .iter()
            .enumerate()
            .filter(|(_, t)| t.state == TrackState::Tentative && t.track_id < first_new_id)
            .min_by_key(|(_, t)| (t.hit_count, t.last_seen, t.track_id))
            .map(|(i, _)| i)
    }

    fn purge(&mut self, now: Timestamp, out: &mut TrackerUpdate) {
        let grace = secs_to_nanos(self.config.deleted_track_grace_period_secs);
        self.tracks.retain(|t| {
            let expired = match t.deleted_at {
                Some(at) => now < at || now - at > grace,
                None => false,
            };
            if expired {
                out.purged.push(t.track_id);
            }
            !expired
        });
    }
}
