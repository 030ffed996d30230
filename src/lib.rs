//! Playdeck - a multi-instance video playback orchestration layer
//!
//! Playdeck sits between a UI layer that renders video surfaces and a
//! single-session media decoding engine. It lets client code address any
//! number of independent player instances by integer index, issue transport
//! commands to them, receive asynchronous status/progress notifications,
//! bind rendering surfaces to instances even when the surface appears before
//! its target instance exists, and mirror transport actions across a group
//! of synchronized instances.
//!
//! The decoding engine itself is external: it is consumed through the
//! [`engine::PlaybackEngine`] capability trait. A deterministic simulated
//! engine ([`engine::SimEngine`]) ships with the crate for the demo binary
//! and for integration testing.

pub mod binder;
pub mod engine;
pub mod player;
pub mod service;
pub mod sync;
pub mod utils;

pub use binder::{ResizeMode, SurfaceBinder, VideoSurface};
pub use engine::{EngineEvent, EngineState, PlaybackEngine, SimEngine, SimTimings, SurfaceId};
pub use player::{PlaybackStatus, PlayerInstance, PlayerRegistry};
pub use service::{PlayerEvent, PlayerService, ServiceBuilder};
pub use sync::{SyncAction, SyncCoordinator, SyncGroup};
pub use utils::{Config, PlaydeckError, Result};
