//! Surface late binding
//!
//! Rendering surfaces and player instances are created on independent
//! schedules. A surface declares which instance it wants (`player_instance`)
//! and whether it currently wants to be attached (`bound`); the
//! [`SurfaceBinder`] resolves that request immediately when the target
//! instance exists, or parks the surface in a pending queue until the
//! registry grows far enough.
//!
//! The pending queue drains only on the two documented triggers: registry
//! growth and a surface property change. Redundant drains are harmless.

use crate::engine::SurfaceId;
use crate::player::PlayerRegistry;
use log::{debug, info};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// How video content is fitted into its surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeMode {
    /// Stretch to fill the surface, ignoring aspect ratio
    Fill,

    /// Letterbox, preserving aspect ratio
    Fit,

    /// Preserve aspect ratio and crop the overflow
    FitCrop,
}

impl Default for ResizeMode {
    fn default() -> Self {
        ResizeMode::Fill
    }
}

struct SurfaceState {
    player_instance: i32,
    bound: bool,
    resize_mode: ResizeMode,
    video_size: Option<(u32, u32)>,
}

/// One rendering surface and its binding intent.
///
/// `player_instance` may name an instance that does not exist yet; a
/// negative value means "no target". Changing either property must be
/// followed by a `resolve` call for the change to take effect.
pub struct VideoSurface {
    id: SurfaceId,
    state: Mutex<SurfaceState>,
}

impl VideoSurface {
    pub fn new(id: SurfaceId, resize_mode: ResizeMode) -> Self {
        Self {
            id,
            state: Mutex::new(SurfaceState {
                player_instance: -1,
                bound: false,
                resize_mode,
                video_size: None,
            }),
        }
    }

    pub fn id(&self) -> SurfaceId {
        self.id
    }

    pub fn set_player_instance(&self, index: i32) {
        self.state.lock().player_instance = index;
    }

    pub fn player_instance(&self) -> i32 {
        self.state.lock().player_instance
    }

    pub fn set_bound(&self, bound: bool) {
        self.state.lock().bound = bound;
    }

    pub fn bound(&self) -> bool {
        self.state.lock().bound
    }

    pub fn set_resize_mode(&self, mode: ResizeMode) {
        self.state.lock().resize_mode = mode;
    }

    pub fn resize_mode(&self) -> ResizeMode {
        self.state.lock().resize_mode
    }

    /// Last video dimensions reported while attached
    pub fn video_size(&self) -> Option<(u32, u32)> {
        self.state.lock().video_size
    }

    /// Record new video dimensions and re-apply the configured resize mode
    fn apply_video_size(&self, width: u32, height: u32) {
        let mut state = self.state.lock();
        state.video_size = Some((width, height));
        debug!(
            "surface {}: video size {}x{}, resize mode {:?}",
            self.id, width, height, state.resize_mode
        );
    }
}

/// Callback the binder invokes when an attached instance reports new video
/// dimensions: (instance index, width, height)
pub type SizeNotifier = Arc<dyn Fn(usize, u32, u32) + Send + Sync>;

/// Resolves surface binding requests against the instance registry
pub struct SurfaceBinder {
    registry: Arc<PlayerRegistry>,
    pending: Mutex<Vec<Arc<VideoSurface>>>,
    size_notifier: Mutex<Option<SizeNotifier>>,
}

impl SurfaceBinder {
    pub fn new(registry: Arc<PlayerRegistry>) -> Self {
        Self {
            registry,
            pending: Mutex::new(Vec::new()),
            size_notifier: Mutex::new(None),
        }
    }

    /// Install the outbound size notification hook (last writer wins)
    pub fn set_size_notifier(&self, notifier: Option<SizeNotifier>) {
        *self.size_notifier.lock() = notifier;
    }

    /// Number of surfaces currently waiting for their target instance
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Apply a surface's current `(player_instance, bound)` declaration.
    ///
    /// A negative target is a no-op. An absent target parks the surface as
    /// pending (idempotently) when it wants binding, or drops a stale
    /// pending entry when the intent has flipped to unbind. A present
    /// target attaches or detaches immediately.
    pub fn resolve(&self, surface: &Arc<VideoSurface>) {
        let target = surface.player_instance();
        if target < 0 {
            return;
        }
        let index = target as usize;

        let Some(instance) = self.registry.get(index) else {
            let mut pending = self.pending.lock();
            if !surface.bound() {
                pending.retain(|s| s.id() != surface.id());
                return;
            }
            if pending.iter().all(|s| s.id() != surface.id()) {
                debug!(
                    "surface {}: instance {} not created yet, queueing",
                    surface.id(),
                    index
                );
                pending.push(Arc::clone(surface));
            }
            return;
        };

        self.pending.lock().retain(|s| s.id() != surface.id());

        if surface.bound() {
            info!("binding surface {} to instance {}", surface.id(), index);
            instance.attach_output(surface.id());

            let attached = Arc::clone(surface);
            let notifier = self.size_notifier.lock().clone();
            instance.set_on_size_changed(Some(Box::new(move |width, height| {
                attached.apply_video_size(width, height);
                if let Some(notify) = notifier.as_ref() {
                    notify(index, width, height);
                }
            })));
        } else {
            info!("unbinding surface {} from instance {}", surface.id(), index);
            instance.detach_output();
            instance.set_on_size_changed(None);
        }
    }

    /// Re-run resolution for every pending surface. Invoked whenever the
    /// registry grows; never called recursively from within itself.
    pub fn drain_pending(&self) {
        let parked: Vec<Arc<VideoSurface>> = self.pending.lock().clone();
        for surface in parked {
            self.resolve(&surface);
        }
    }

    /// Teardown hook for a destroyed surface: drop any pending entry and
    /// detach it from whichever instance still outputs to it.
    pub fn remove_surface(&self, id: SurfaceId) {
        self.pending.lock().retain(|s| s.id() != id);
        for instance in self.registry.snapshot() {
            if instance.output() == Some(id) {
                instance.detach_output();
                instance.set_on_size_changed(None);
            }
        }
        debug!("surface {} removed", id);
    }

    /// Drop every pending entry (service teardown)
    pub fn clear_pending(&self) {
        self.pending.lock().clear();
    }
}
