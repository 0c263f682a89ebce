use serde::{Deserialize, Serialize};

/// Track lifecycle state.
///
/// `Tentative -> Confirmed -> Deleted`, with `Deleted` reachable from any
/// state and terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackState {
    /// Newly created track, not yet confirmed
    #[default]
    Tentative,
    /// Validated object
    Confirmed,
    /// No longer tracked, kept for the grace period
    Deleted,
}

impl TrackState {
    #[inline]
    pub fn is_live(self) -> bool {
        !matches!(self, TrackState::Deleted)
    }
}
