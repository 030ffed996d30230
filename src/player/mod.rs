//! Player instance management for Playdeck
//!
//! This module holds the playback status model, the per-session
//! [`PlayerInstance`], the append-only [`PlayerRegistry`], and the
//! per-instance [`ProgressPoller`].

mod instance;
mod poller;
mod registry;

pub use instance::{PlayerInstance, ProgressCallback, SizeCallback, StatusCallback};
pub use poller::ProgressPoller;
pub use registry::PlayerRegistry;

use serde::Serialize;

/// Playback status of one player instance.
///
/// Exactly one status holds at any time. Transitions are driven only by
/// engine notifications or by explicit stop/clear/release calls, never
/// inferred from polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackStatus {
    /// Media source set, preparation started
    New,

    /// Buffering before playback
    Loading,

    /// Actively playing
    Playing,

    /// Loaded but paused
    Paused,

    /// Engine reported a fatal error; the instance stays addressable
    Error,

    /// Explicitly stopped mid-session
    Stopped,

    /// Never loaded, or explicitly cleared back to idle
    None,

    /// End of media reached
    Finished,
}

impl PlaybackStatus {
    /// Wire code used in notification payloads
    pub fn code(&self) -> u8 {
        match self {
            PlaybackStatus::New => 0,
            PlaybackStatus::Loading => 1,
            PlaybackStatus::Playing => 2,
            PlaybackStatus::Paused => 3,
            PlaybackStatus::Error => 4,
            PlaybackStatus::Stopped => 5,
            PlaybackStatus::None => 6,
            PlaybackStatus::Finished => 7,
        }
    }

    /// Whether a transition into this status shuts the progress poller down
    pub fn stops_polling(&self) -> bool {
        matches!(
            self,
            PlaybackStatus::Stopped
                | PlaybackStatus::None
                | PlaybackStatus::Error
                | PlaybackStatus::Finished
        )
    }

    /// Whether media is loaded (playing, paused, or still buffering)
    pub fn is_loaded(&self) -> bool {
        matches!(
            self,
            PlaybackStatus::Playing | PlaybackStatus::Paused | PlaybackStatus::Loading
        )
    }
}
