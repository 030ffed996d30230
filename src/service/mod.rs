//! The player service: command surface and engine-affinity loop
//!
//! Engine sessions tolerate exactly one execution context. The service
//! spawns one dedicated worker thread running a current-thread tokio runtime
//! and funnels every instance operation through it: commands posted by
//! callers, poll ticks posted by the progress pollers, and sync mirroring
//! all execute serialized on that loop. Callers never block; queries return
//! oneshot receivers and notifications flow out through a crossbeam channel.
//!
//! [`PlayerService`] is the caller-side handle; [`ServiceBuilder`] wires the
//! registry, binder, sync coordinator and engine factory together and spawns
//! the loop. One instance is created up front, so index 0 is always
//! addressable.

use crate::binder::{SurfaceBinder, VideoSurface};
use crate::engine::{EngineFactory, SimEngine, SimTimings, SourceSettings, SurfaceId};
use crate::player::{PlaybackStatus, PlayerInstance, PlayerRegistry, ProgressPoller};
use crate::sync::{SyncAction, SyncCoordinator, SyncGroup};
use crate::utils::config::Config;
use crate::utils::error::{PlaydeckError, Result};
use log::{debug, error, info, warn};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::{mpsc, oneshot};

/// Notification emitted to the UI layer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum PlayerEvent {
    StatusChanged {
        instance: usize,
        status: PlaybackStatus,
        code: u8,
    },
    ProgressChanged {
        instance: usize,
        /// Playback progress as a 0-1 fraction
        progress: f64,
        /// Media duration in seconds, 0 while unknown
        duration: f64,
    },
    VideoSizeChanged {
        instance: usize,
        width: u32,
        height: u32,
    },
}

enum ServiceCommand {
    CreateInstance,
    Load {
        instance: i32,
        url: String,
        streaming: bool,
        looped: bool,
        silent: bool,
    },
    Play(i32),
    Pause(i32),
    Stop(i32),
    Clear(i32),
    Seek {
        instance: i32,
        fraction: f64,
    },
    SeekForward {
        instance: i32,
        seconds: f64,
    },
    SeekRewind {
        instance: i32,
        seconds: f64,
    },
    SetVolume {
        instance: i32,
        volume: f32,
    },
    GetDuration {
        instance: i32,
        reply: oneshot::Sender<f64>,
    },
    GetProgress {
        instance: i32,
        reply: oneshot::Sender<f64>,
    },
    Synced {
        origin: usize,
        action: SyncAction,
    },
    ResolveSurface(Arc<VideoSurface>),
    RemoveSurface(SurfaceId),
    Shutdown,
}

/// The serialized engine-context loop. Owns the engine factory and is the
/// only code that ever touches an engine session.
struct CommandLoop {
    registry: Arc<PlayerRegistry>,
    binder: Arc<SurfaceBinder>,
    coordinator: SyncCoordinator,
    config: Config,
    engine_factory: EngineFactory,
    source_settings: OnceCell<Arc<SourceSettings>>,
    tick_tx: mpsc::UnboundedSender<usize>,
    event_tx: crossbeam_channel::Sender<PlayerEvent>,
}

impl CommandLoop {
    async fn run(
        mut self,
        mut cmd_rx: mpsc::UnboundedReceiver<ServiceCommand>,
        mut tick_rx: mpsc::UnboundedReceiver<usize>,
    ) {
        loop {
            tokio::select! {
                command = cmd_rx.recv() => {
                    match command {
                        Some(ServiceCommand::Shutdown) | None => break,
                        Some(command) => self.handle(command),
                    }
                }
                Some(index) = tick_rx.recv() => {
                    if let Some(instance) = self.registry.get(index) {
                        instance.poll_tick();
                    }
                }
            }
        }

        info!("shutting down, releasing {} instances", self.registry.len());
        self.registry.release_all();
        self.binder.clear_pending();
    }

    fn handle(&mut self, command: ServiceCommand) {
        match command {
            ServiceCommand::CreateInstance => {
                self.create_instance();
            }
            ServiceCommand::Load {
                instance,
                url,
                streaming,
                looped,
                silent,
            } => {
                if instance < 0 {
                    warn!("load: negative instance index {}", instance);
                    return;
                }
                let index = instance as usize;
                while self.registry.len() <= index {
                    self.create_instance();
                }
                if let Some(player) = self.registry.get(index) {
                    // A prior stop clears the status slot; a load restores it
                    self.wire_notifications(&player);
                    player.load(&url, streaming, looped);
                    if silent {
                        player.set_volume(0.0);
                    }
                }
            }
            ServiceCommand::Play(instance) => {
                if let Some(player) = self.lookup(instance, "play") {
                    player.play();
                }
            }
            ServiceCommand::Pause(instance) => {
                if let Some(player) = self.lookup(instance, "pause") {
                    player.pause();
                }
            }
            ServiceCommand::Stop(instance) => {
                if let Some(player) = self.lookup(instance, "stop") {
                    player.stop();
                    // The status subscription ends with the session
                    player.set_on_status(None);
                }
            }
            ServiceCommand::Clear(instance) => {
                if let Some(player) = self.lookup(instance, "clear") {
                    player.clear();
                }
            }
            ServiceCommand::Seek { instance, fraction } => {
                if let Some(player) = self.lookup(instance, "seek") {
                    player.seek(fraction);
                }
            }
            ServiceCommand::SeekForward { instance, seconds } => {
                if let Some(player) = self.lookup(instance, "seek_forward") {
                    player.seek_forward(seconds);
                }
            }
            ServiceCommand::SeekRewind { instance, seconds } => {
                if let Some(player) = self.lookup(instance, "seek_rewind") {
                    player.seek_rewind(seconds);
                }
            }
            ServiceCommand::SetVolume { instance, volume } => {
                if let Some(player) = self.lookup(instance, "set_volume") {
                    player.set_volume(volume);
                }
            }
            ServiceCommand::GetDuration { instance, reply } => {
                let duration = self
                    .lookup(instance, "get_duration")
                    .map(|player| player.duration_ms() as f64 / 1000.0)
                    .unwrap_or(0.0);
                let _ = reply.send(duration);
            }
            ServiceCommand::GetProgress { instance, reply } => {
                let progress = self
                    .lookup(instance, "get_progress")
                    .map(|player| player.progress())
                    .unwrap_or(0.0);
                let _ = reply.send(progress);
            }
            ServiceCommand::Synced { origin, action } => {
                // Local state first, then the mirrors
                self.apply_action(origin, action);
                for follower in self.coordinator.followers(origin) {
                    debug!("sync: mirroring {:?} from {} onto {}", action, origin, follower);
                    self.apply_action(follower, action);
                }
            }
            ServiceCommand::ResolveSurface(surface) => {
                self.binder.resolve(&surface);
            }
            ServiceCommand::RemoveSurface(id) => {
                self.binder.remove_surface(id);
            }
            ServiceCommand::Shutdown => {}
        }
    }

    fn lookup(&self, instance: i32, operation: &str) -> Option<Arc<PlayerInstance>> {
        if instance < 0 {
            warn!("{}: negative instance index {}", operation, instance);
            return None;
        }
        let found = self.registry.get(instance as usize);
        if found.is_none() {
            warn!("{}: instance {} does not exist", operation, instance);
        }
        found
    }

    fn apply_action(&self, index: usize, action: SyncAction) {
        let Some(player) = self.registry.get(index) else {
            warn!("sync: instance {} does not exist", index);
            return;
        };
        match action {
            SyncAction::Play => player.play(),
            SyncAction::Pause => player.pause(),
            SyncAction::Seek(fraction) => player.seek(fraction),
            SyncAction::SeekForward(seconds) => player.seek_forward(seconds),
            SyncAction::SeekRewind(seconds) => player.seek_rewind(seconds),
        }
    }

    /// Build an engine session and register a new instance; drains pending
    /// surface bindings afterwards since the registry just grew.
    fn create_instance(&mut self) -> usize {
        let settings = Arc::clone(self.source_settings.get_or_init(|| {
            debug!("initializing shared source settings");
            Arc::new(SourceSettings::from(&self.config.source))
        }));
        let engine = (self.engine_factory)(settings);

        let index = self.registry.len();
        let released = Arc::new(AtomicBool::new(false));
        let poller = ProgressPoller::new(
            index,
            self.config.playback.progress_interval(),
            self.tick_tx.clone(),
            tokio::runtime::Handle::current(),
            Arc::clone(&released),
        );
        let player = Arc::new(PlayerInstance::new(
            index,
            engine,
            poller,
            released,
            &self.config.playback,
        ));
        self.wire_notifications(&player);

        let index = self.registry.add(player);
        self.binder.drain_pending();
        index
    }

    fn wire_notifications(&self, player: &Arc<PlayerInstance>) {
        let index = player.index();

        let tx = self.event_tx.clone();
        player.set_on_status(Some(Box::new(move |status| {
            let _ = tx.send(PlayerEvent::StatusChanged {
                instance: index,
                status,
                code: status.code(),
            });
        })));

        let tx = self.event_tx.clone();
        player.set_on_progress(Some(Box::new(move |progress, duration| {
            let _ = tx.send(PlayerEvent::ProgressChanged {
                instance: index,
                progress,
                duration,
            });
        })));
    }
}

/// Caller-side handle to the player service.
///
/// All transport methods are fire-and-forget: they post a command onto the
/// engine context and return immediately. Queries return oneshot receivers.
/// Dropping the handle shuts the service down.
pub struct PlayerService {
    cmd_tx: mpsc::UnboundedSender<ServiceCommand>,
    registry: Arc<PlayerRegistry>,
    events: crossbeam_channel::Receiver<PlayerEvent>,
    created: AtomicUsize,
    muted: Mutex<HashMap<usize, bool>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl PlayerService {
    fn send(&self, command: ServiceCommand) {
        if self.cmd_tx.send(command).is_err() {
            warn!("command loop is gone, command dropped");
        }
    }

    /// Create a new instance and return its index immediately. The instance
    /// itself materializes asynchronously on the engine context.
    ///
    /// The returned index comes from a handle-side counter that `load` bumps
    /// past any auto-created range. It is only guaranteed to match the
    /// registry when `create_instance` and `load` are issued from a single
    /// caller; interleaving them from multiple threads can return an index
    /// that never materializes.
    pub fn create_instance(&self) -> usize {
        let index = self.created.fetch_add(1, Ordering::SeqCst);
        self.send(ServiceCommand::CreateInstance);
        index
    }

    /// Number of instances ever created
    pub fn instance_count(&self) -> usize {
        self.registry.len()
    }

    /// Registry access for read-only introspection
    pub fn registry(&self) -> &Arc<PlayerRegistry> {
        &self.registry
    }

    /// Load a media source into an instance, creating instances up to the
    /// requested index when needed. `silent` loads at volume 0.
    pub fn load(&self, instance: i32, url: impl Into<String>, streaming: bool, looped: bool, silent: bool) {
        if instance >= 0 {
            self.created.fetch_max(instance as usize + 1, Ordering::SeqCst);
        }
        self.send(ServiceCommand::Load {
            instance,
            url: url.into(),
            streaming,
            looped,
            silent,
        });
    }

    pub fn play(&self, instance: i32) {
        self.send(ServiceCommand::Play(instance));
    }

    pub fn pause(&self, instance: i32) {
        self.send(ServiceCommand::Pause(instance));
    }

    pub fn stop(&self, instance: i32) {
        self.send(ServiceCommand::Stop(instance));
    }

    pub fn clear(&self, instance: i32) {
        self.send(ServiceCommand::Clear(instance));
    }

    /// Seek to a fraction of the media duration (clamped to [0, 1])
    pub fn seek(&self, instance: i32, fraction: f64) {
        self.send(ServiceCommand::Seek { instance, fraction });
    }

    pub fn seek_forward(&self, instance: i32, seconds: f64) {
        self.send(ServiceCommand::SeekForward { instance, seconds });
    }

    pub fn seek_rewind(&self, instance: i32, seconds: f64) {
        self.send(ServiceCommand::SeekRewind { instance, seconds });
    }

    pub fn set_volume(&self, instance: i32, volume: f32) {
        self.send(ServiceCommand::SetVolume { instance, volume });
    }

    /// Mute or unmute an instance. Implemented as volume 0/1; the mute
    /// state itself lives in a service-held table, not in the engine.
    pub fn set_muted(&self, instance: i32, muted: bool) {
        if instance < 0 {
            warn!("set_muted: negative instance index {}", instance);
            return;
        }
        self.muted.lock().insert(instance as usize, muted);
        self.send(ServiceCommand::SetVolume {
            instance,
            volume: if muted { 0.0 } else { 1.0 },
        });
    }

    /// Last mute state recorded for the instance (false when never set)
    pub fn get_muted(&self, instance: i32) -> bool {
        if instance < 0 {
            return false;
        }
        self.muted
            .lock()
            .get(&(instance as usize))
            .copied()
            .unwrap_or(false)
    }

    /// Media duration in seconds; resolves to 0 for a negative index or any
    /// lookup failure
    pub fn get_duration(&self, instance: i32) -> oneshot::Receiver<f64> {
        let (reply, rx) = oneshot::channel();
        if instance < 0 {
            let _ = reply.send(0.0);
            return rx;
        }
        self.send(ServiceCommand::GetDuration { instance, reply });
        rx
    }

    /// Playback progress as a 0-1 fraction; resolves to 0 for a negative
    /// index or any lookup failure
    pub fn get_progress(&self, instance: i32) -> oneshot::Receiver<f64> {
        let (reply, rx) = oneshot::channel();
        if instance < 0 {
            let _ = reply.send(0.0);
            return rx;
        }
        self.send(ServiceCommand::GetProgress { instance, reply });
        rx
    }

    /// Apply a user-originated transport action to its origin instance and
    /// mirror it onto the origin's sync group
    pub fn dispatch_synced(&self, origin: i32, action: SyncAction) {
        if origin < 0 {
            warn!("dispatch_synced: negative origin index {}", origin);
            return;
        }
        self.send(ServiceCommand::Synced {
            origin: origin as usize,
            action,
        });
    }

    /// Re-run binding resolution for a surface after one of its properties
    /// changed
    pub fn resolve_surface(&self, surface: Arc<VideoSurface>) {
        self.send(ServiceCommand::ResolveSurface(surface));
    }

    /// Teardown hook for a destroyed surface
    pub fn remove_surface(&self, id: SurfaceId) {
        self.send(ServiceCommand::RemoveSurface(id));
    }

    /// Outbound notification stream. Cloning the receiver shares, not
    /// duplicates, the stream.
    pub fn events(&self) -> crossbeam_channel::Receiver<PlayerEvent> {
        self.events.clone()
    }

    /// Release every instance and join the engine worker. Idempotent.
    pub fn shutdown(&self) {
        let worker = self.worker.lock().take();
        if let Some(handle) = worker {
            let _ = self.cmd_tx.send(ServiceCommand::Shutdown);
            if handle.join().is_err() {
                error!("engine worker panicked during shutdown");
            }
        }
    }
}

impl Drop for PlayerService {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Builds and spawns a [`PlayerService`]
pub struct ServiceBuilder {
    config: Config,
    engine_factory: Option<EngineFactory>,
    sync_groups: Vec<SyncGroup>,
}

impl Default for ServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            engine_factory: None,
            sync_groups: Vec::new(),
        }
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Inject the engine session factory. Defaults to the simulated engine.
    pub fn engine_factory(mut self, factory: EngineFactory) -> Self {
        self.engine_factory = Some(factory);
        self
    }

    /// Declare a sync group. Groups must be disjoint.
    pub fn sync_group(mut self, group: SyncGroup) -> Self {
        self.sync_groups.push(group);
        self
    }

    /// Spawn the engine worker and create the first instance
    pub fn build(self) -> Result<PlayerService> {
        self.config.validate()?;

        let factory = self
            .engine_factory
            .unwrap_or_else(|| SimEngine::factory(SimTimings::default()));

        let registry = Arc::new(PlayerRegistry::new());
        let binder = Arc::new(SurfaceBinder::new(Arc::clone(&registry)));
        let (event_tx, event_rx) = crossbeam_channel::unbounded();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (tick_tx, tick_rx) = mpsc::unbounded_channel();

        let tx = event_tx.clone();
        binder.set_size_notifier(Some(Arc::new(move |instance, width, height| {
            let _ = tx.send(PlayerEvent::VideoSizeChanged {
                instance,
                width,
                height,
            });
        })));

        let command_loop = CommandLoop {
            registry: Arc::clone(&registry),
            binder: Arc::clone(&binder),
            coordinator: SyncCoordinator::new(self.sync_groups),
            config: self.config,
            engine_factory: factory,
            source_settings: OnceCell::new(),
            tick_tx,
            event_tx,
        };

        let worker = std::thread::Builder::new()
            .name("playdeck-engine".to_string())
            .spawn(move || {
                match tokio::runtime::Builder::new_current_thread()
                    .enable_time()
                    .build()
                {
                    Ok(runtime) => runtime.block_on(command_loop.run(cmd_rx, tick_rx)),
                    Err(e) => error!("failed to build engine runtime: {}", e),
                }
            })
            .map_err(|e| PlaydeckError::Internal(format!("failed to spawn engine worker: {}", e)))?;

        let service = PlayerService {
            cmd_tx,
            registry,
            events: event_rx,
            created: AtomicUsize::new(0),
            muted: Mutex::new(HashMap::new()),
            worker: Mutex::new(Some(worker)),
        };

        // Index 0 exists from the start
        service.create_instance();
        Ok(service)
    }
}
