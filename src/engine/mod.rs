//! Engine adapter capability for Playdeck
//!
//! The media decoding engine is external to this crate: it is consumed
//! through the [`PlaybackEngine`] trait, one session per player instance.
//! Engines mandate a single execution context for all of their operations,
//! so every trait method is only ever invoked from the service command loop.
//!
//! [`SimEngine`] is a deterministic wall-clock simulation of such a session,
//! used by the demo binary and the integration tests.

mod sim;

#[cfg(test)]
pub mod mock;

pub use sim::{SimEngine, SimTimings};

use crate::utils::config::SourceConfig;
use crate::utils::error::Result;
use std::sync::Arc;
use std::time::Duration;

/// Opaque handle identifying a rendering surface the engine draws into
pub type SurfaceId = u64;

/// Engine playback states, as reported by the underlying session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// No media source set
    Idle,

    /// Media source set, buffering before playback can start
    Buffering,

    /// Ready to play (or playing, depending on play-when-ready)
    Ready,

    /// End of media reached
    Ended,
}

/// Notifications delivered by an engine session
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// Playback state transition
    StateChanged(EngineState),

    /// Actively-rendering flag flipped
    IsPlayingChanged(bool),

    /// Native video dimensions became known or changed
    VideoSizeChanged { width: u32, height: u32 },

    /// Fatal playback error
    Error { code: i32, message: String },
}

/// Listener slot for engine notifications
pub type EngineListener = Box<dyn FnMut(EngineEvent) + Send>;

/// One playback session of the underlying media engine.
///
/// Implementations deliver notifications synchronously through the installed
/// listener, either during the call that caused them or lazily during a
/// position/duration/state query on the same context.
pub trait PlaybackEngine: Send {
    /// Set the media source and begin preparation. A second call re-prepares
    /// and supersedes the previous source.
    fn prepare(&mut self, url: &str, streaming: bool) -> Result<()>;

    /// Enable or disable repeat-all mode
    fn set_repeat(&mut self, looped: bool);

    /// Set the play intent: start playback as soon as the session is ready
    fn set_play_when_ready(&mut self, play: bool);

    /// Current play intent
    fn play_when_ready(&self) -> bool;

    /// Stop playback
    fn stop(&mut self);

    /// Remove the current media source
    fn clear_media(&mut self);

    /// Seek to an absolute position in milliseconds
    fn seek_to(&mut self, position_ms: i64);

    /// Current playback position in milliseconds
    fn position_ms(&mut self) -> i64;

    /// Media duration in milliseconds, None while unknown
    fn duration_ms(&mut self) -> Option<i64>;

    /// Current engine playback state
    fn playback_state(&mut self) -> EngineState;

    /// Set session volume (0.0 - 1.0)
    fn set_volume(&mut self, volume: f32);

    /// Current session volume
    fn volume(&self) -> f32;

    /// Install or remove the event listener. At most one listener is active.
    fn set_listener(&mut self, listener: Option<EngineListener>);

    /// Attach or detach the rendering surface this session draws into
    fn set_output(&mut self, surface: Option<SurfaceId>);

    /// Currently attached rendering surface
    fn output(&self) -> Option<SurfaceId>;

    /// Release all session resources. The session is unusable afterwards.
    fn release(&mut self);
}

/// Factory producing engine sessions, injected into the service.
///
/// The factory receives the process-wide shared [`SourceSettings`].
pub type EngineFactory = Box<dyn FnMut(Arc<SourceSettings>) -> Box<dyn PlaybackEngine> + Send>;

/// Shared, read-only media source settings.
///
/// Built lazily once per service on first instance creation and handed to
/// every engine session, mirroring a shared data-source factory.
#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub allow_cross_protocol_redirects: bool,
}

impl From<&SourceConfig> for SourceSettings {
    fn from(config: &SourceConfig) -> Self {
        Self {
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            read_timeout: Duration::from_millis(config.read_timeout_ms),
            allow_cross_protocol_redirects: config.allow_cross_protocol_redirects,
        }
    }
}
