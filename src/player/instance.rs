//! One playback session: a player instance
//!
//! A [`PlayerInstance`] owns one engine session, its playback status, the
//! notification callback slots, and its progress poller. All methods are
//! invoked on the service command loop (the engine context); the instance
//! itself is shareable so the registry can be read from other threads.
//!
//! Engine notifications are queued by the installed listener and drained
//! ("pumped") after each engine call and each poll tick. That keeps status
//! transitions synchronous on the engine context without callback
//! re-entrancy into the instance lock.
//!
//! Every method on a released instance is a logged no-op, never a fault, to
//! tolerate straggler calls from in-flight asynchronous work.

use crate::engine::{EngineEvent, EngineState, PlaybackEngine, SurfaceId};
use crate::player::{PlaybackStatus, ProgressPoller};
use crate::utils::config::PlaybackConfig;
use log::{debug, error, warn};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Status notification slot: invoked synchronously on every transition
pub type StatusCallback = Box<dyn FnMut(PlaybackStatus) + Send>;

/// Progress notification slot: (progress fraction 0-1, duration seconds)
pub type ProgressCallback = Box<dyn FnMut(f64, f64) + Send>;

/// Video dimension notification slot: (width, height)
pub type SizeCallback = Box<dyn FnMut(u32, u32) + Send>;

struct InstanceInner {
    engine: Box<dyn PlaybackEngine>,
    status: PlaybackStatus,
    autoplay: bool,
    on_status: Option<StatusCallback>,
    on_progress: Option<ProgressCallback>,
    on_size_changed: Option<SizeCallback>,
    events: Arc<Mutex<VecDeque<EngineEvent>>>,
}

/// One addressable, independently controllable playback session
pub struct PlayerInstance {
    index: usize,
    released: Arc<AtomicBool>,
    poller: ProgressPoller,
    pause_stops_poller: bool,
    inner: Mutex<InstanceInner>,
}

impl PlayerInstance {
    /// Create an instance around a fresh engine session.
    ///
    /// `released` must be the same flag handed to the poller, so a release
    /// terminates the polling task.
    pub fn new(
        index: usize,
        mut engine: Box<dyn PlaybackEngine>,
        poller: ProgressPoller,
        released: Arc<AtomicBool>,
        playback: &PlaybackConfig,
    ) -> Self {
        let events: Arc<Mutex<VecDeque<EngineEvent>>> = Arc::new(Mutex::new(VecDeque::new()));
        let queue = Arc::clone(&events);
        engine.set_listener(Some(Box::new(move |event| queue.lock().push_back(event))));
        engine.set_volume(playback.default_volume);
        Self {
            index,
            released,
            poller,
            pause_stops_poller: playback.pause_stops_poller,
            inner: Mutex::new(InstanceInner {
                engine,
                status: PlaybackStatus::None,
                autoplay: playback.autoplay,
                on_status: None,
                on_progress: None,
                on_size_changed: None,
                events,
            }),
        }
    }

    /// Stable registry index of this instance
    pub fn index(&self) -> usize {
        self.index
    }

    /// Whether this instance has been released
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Whether the progress poller is currently active
    pub fn is_polling(&self) -> bool {
        self.poller.is_running()
    }

    fn rejected(&self, operation: &str) -> bool {
        if self.is_released() {
            warn!("instance {}: {} ignored, instance is released", self.index, operation);
            return true;
        }
        false
    }

    /// Set the media source and begin preparation.
    ///
    /// Idempotent re-preparation: a second call supersedes the previous
    /// source. Resets status to New and (re)starts polling.
    pub fn load(&self, url: &str, streaming: bool, looped: bool) {
        if self.rejected("load") {
            return;
        }
        {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;

            if let Err(e) = inner.engine.prepare(url, streaming) {
                error!("instance {}: failed to prepare {}: {}", self.index, url, e);
                self.apply_status(inner, PlaybackStatus::Error);
                return;
            }

            let autoplay = inner.autoplay;
            inner.engine.set_play_when_ready(autoplay);
            inner.engine.set_repeat(looped);
            self.apply_status(inner, PlaybackStatus::New);
            self.pump(inner);
        }
        self.poller.start();
    }

    /// Set play intent. From Finished, seeks back to the start first.
    pub fn play(&self) {
        if self.rejected("play") {
            return;
        }
        {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;

            if inner.status == PlaybackStatus::Finished {
                self.seek_locked(inner, 0.0);
            }
            inner.engine.set_play_when_ready(true);
            self.pump(inner);
        }
        self.poller.start();
    }

    /// Clear play intent. Depending on policy the poller keeps running
    /// (progress is still meaningful while paused) or stops to conserve
    /// resources; the default stops it.
    pub fn pause(&self) {
        if self.rejected("pause") {
            return;
        }
        {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            inner.engine.set_play_when_ready(false);
            self.pump(inner);
        }
        if self.pause_stops_poller {
            self.poller.stop();
        }
    }

    /// Stop playback and clear the media source
    pub fn stop(&self) {
        if self.rejected("stop") {
            return;
        }
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        inner.engine.stop();
        inner.engine.clear_media();
        self.apply_status(inner, PlaybackStatus::Stopped);
        self.pump(inner);
    }

    /// Same as stop, but returns the instance to the never-loaded status
    pub fn clear(&self) {
        if self.rejected("clear") {
            return;
        }
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        inner.engine.stop();
        inner.engine.clear_media();
        self.apply_status(inner, PlaybackStatus::None);
        self.pump(inner);
    }

    /// Seek to a fraction of the media duration, clamped to [0, 1].
    ///
    /// Emits a progress notification synchronously so UI feedback does not
    /// wait for the next poll tick.
    pub fn seek(&self, fraction: f64) {
        if self.rejected("seek") {
            return;
        }
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        self.seek_locked(inner, fraction);
        self.pump(inner);
    }

    /// Seek forward by `seconds`, clamped to the media duration.
    /// Negative values are a no-op.
    pub fn seek_forward(&self, seconds: f64) {
        if self.rejected("seek_forward") || seconds < 0.0 {
            return;
        }
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let position = inner.engine.position_ms();
        let duration = inner.engine.duration_ms();
        let upper = duration.filter(|d| *d > 0).unwrap_or(i64::MAX);
        let target = ((position as f64) + seconds * 1000.0).min(upper as f64) as i64;

        inner.engine.seek_to(target);
        self.emit_progress(inner, Self::fraction_of(target, duration), duration.unwrap_or(0));
        self.pump(inner);
    }

    /// Seek backward by `seconds`, floored at position 0.
    /// Negative values are a no-op.
    pub fn seek_rewind(&self, seconds: f64) {
        if self.rejected("seek_rewind") || seconds < 0.0 {
            return;
        }
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let position = inner.engine.position_ms();
        let duration = inner.engine.duration_ms();
        let target = ((position as f64) - seconds * 1000.0).max(0.0) as i64;

        inner.engine.seek_to(target);
        self.emit_progress(inner, Self::fraction_of(target, duration), duration.unwrap_or(0));
        self.pump(inner);
    }

    /// Set session volume, clamped to [0, 1]
    pub fn set_volume(&self, volume: f32) {
        if self.rejected("set_volume") {
            return;
        }
        self.inner.lock().engine.set_volume(volume.clamp(0.0, 1.0));
    }

    /// Current session volume
    pub fn volume(&self) -> f32 {
        if self.is_released() {
            return 0.0;
        }
        self.inner.lock().engine.volume()
    }

    /// Whether a load starts playback once the session is ready
    pub fn set_autoplay(&self, autoplay: bool) {
        if self.rejected("set_autoplay") {
            return;
        }
        self.inner.lock().autoplay = autoplay;
    }

    pub fn autoplay(&self) -> bool {
        self.inner.lock().autoplay
    }

    /// Current playback status
    pub fn status(&self) -> PlaybackStatus {
        self.inner.lock().status
    }

    /// Media duration in milliseconds, 0 while unknown
    pub fn duration_ms(&self) -> i64 {
        if self.is_released() {
            return 0;
        }
        self.inner.lock().engine.duration_ms().unwrap_or(0)
    }

    /// Current playback position in milliseconds
    pub fn position_ms(&self) -> i64 {
        if self.is_released() {
            return 0;
        }
        self.inner.lock().engine.position_ms()
    }

    /// Playback progress in [0, 1]; 0 whenever the duration is unknown
    pub fn progress(&self) -> f64 {
        if self.is_released() {
            return 0.0;
        }
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let duration = inner.engine.duration_ms();
        let position = inner.engine.position_ms();
        Self::fraction_of(position, duration)
    }

    /// Overwrite the status notification slot (last writer wins)
    pub fn set_on_status(&self, callback: Option<StatusCallback>) {
        if self.is_released() {
            return;
        }
        self.inner.lock().on_status = callback;
    }

    /// Overwrite the progress notification slot (last writer wins)
    pub fn set_on_progress(&self, callback: Option<ProgressCallback>) {
        if self.is_released() {
            return;
        }
        self.inner.lock().on_progress = callback;
    }

    /// Overwrite the video size notification slot (last writer wins)
    pub fn set_on_size_changed(&self, callback: Option<SizeCallback>) {
        if self.is_released() {
            return;
        }
        self.inner.lock().on_size_changed = callback;
    }

    /// Attach the engine output to a rendering surface
    pub fn attach_output(&self, surface: SurfaceId) {
        if self.rejected("attach_output") {
            return;
        }
        let mut guard = self.inner.lock();
        if guard.engine.output() != Some(surface) {
            guard.engine.set_output(Some(surface));
        }
    }

    /// Surface the engine output is currently attached to
    pub fn output(&self) -> Option<SurfaceId> {
        if self.is_released() {
            return None;
        }
        self.inner.lock().engine.output()
    }

    /// Detach the engine output from its rendering surface
    pub fn detach_output(&self) {
        if self.rejected("detach_output") {
            return;
        }
        let mut guard = self.inner.lock();
        if guard.engine.output().is_some() {
            guard.engine.set_output(None);
        }
    }

    /// Release the engine session and all callback slots.
    ///
    /// Exactly-once: a second call is a silent no-op. The released flag is
    /// permanent; every later method call on this instance is ignored.
    pub fn release(&self) {
        if self
            .released
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        self.poller.stop();

        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        inner.engine.set_listener(None);
        inner.on_status = None;
        inner.on_progress = None;
        inner.on_size_changed = None;
        inner.events.lock().clear();
        inner.engine.release();
        debug!("instance {} released", self.index);
    }

    /// One progress poll tick: pump pending engine events, sample
    /// position/duration, and notify the progress slot. Emits on every tick
    /// regardless of whether the position changed.
    pub fn poll_tick(&self) {
        if self.is_released() {
            return;
        }
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        self.pump(inner);
        // Time queries promote lazy engine transitions (ready, ended)
        let _ = inner.engine.duration_ms();
        let _ = inner.engine.position_ms();
        self.pump(inner);

        let duration = inner.engine.duration_ms();
        let position = inner.engine.position_ms();
        self.emit_progress(inner, Self::fraction_of(position, duration), duration.unwrap_or(0));
    }

    fn fraction_of(position_ms: i64, duration_ms: Option<i64>) -> f64 {
        match duration_ms {
            Some(duration) if duration > 0 => {
                (position_ms as f64 / duration as f64).clamp(0.0, 1.0)
            }
            _ => 0.0,
        }
    }

    fn seek_locked(&self, inner: &mut InstanceInner, fraction: f64) {
        let clamped = fraction.clamp(0.0, 1.0);
        let duration = inner.engine.duration_ms().unwrap_or(0);
        inner.engine.seek_to((duration as f64 * clamped) as i64);
        self.emit_progress(inner, clamped, duration);
    }

    fn emit_progress(&self, inner: &mut InstanceInner, progress: f64, duration_ms: i64) {
        if let Some(callback) = inner.on_progress.as_mut() {
            callback(progress, duration_ms as f64 / 1000.0);
        }
    }

    fn apply_status(&self, inner: &mut InstanceInner, status: PlaybackStatus) {
        inner.status = status;
        if let Some(callback) = inner.on_status.as_mut() {
            callback(status);
        }
        if status.stops_polling() {
            self.poller.stop();
        }
    }

    /// Drain queued engine events and apply the resulting transitions
    fn pump(&self, inner: &mut InstanceInner) {
        loop {
            let event = inner.events.lock().pop_front();
            let Some(event) = event else { break };

            match event {
                // Idle is managed manually through stop/clear
                EngineEvent::StateChanged(EngineState::Idle) => {}
                EngineEvent::StateChanged(EngineState::Buffering) => {
                    self.apply_status(inner, PlaybackStatus::Loading);
                }
                EngineEvent::StateChanged(EngineState::Ready) => {
                    let playing = inner.engine.play_when_ready();
                    let status = if playing {
                        PlaybackStatus::Playing
                    } else {
                        PlaybackStatus::Paused
                    };
                    self.apply_status(inner, status);
                }
                EngineEvent::StateChanged(EngineState::Ended) => {
                    self.apply_status(inner, PlaybackStatus::Finished);
                }
                EngineEvent::IsPlayingChanged(playing) => {
                    if inner.engine.playback_state() == EngineState::Ready {
                        let status = if playing {
                            PlaybackStatus::Playing
                        } else {
                            PlaybackStatus::Paused
                        };
                        self.apply_status(inner, status);
                    }
                }
                EngineEvent::VideoSizeChanged { width, height } => {
                    if let Some(callback) = inner.on_size_changed.as_mut() {
                        callback(width, height);
                    }
                }
                EngineEvent::Error { code, message } => {
                    error!("instance {}: playback error {}: {}", self.index, code, message);
                    self.apply_status(inner, PlaybackStatus::Error);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::mock::{MockCall, MockEngine, MockHandle};
    use tokio::sync::mpsc;

    struct Fixture {
        _rt: tokio::runtime::Runtime,
        instance: PlayerInstance,
        engine: MockHandle,
        _ticks: mpsc::UnboundedReceiver<usize>,
    }

    fn fixture_with(playback: PlaybackConfig) -> Fixture {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let (tx, ticks) = mpsc::unbounded_channel();
        let (engine, handle) = MockEngine::new();
        let released = Arc::new(AtomicBool::new(false));
        let poller = ProgressPoller::new(
            0,
            std::time::Duration::from_millis(50),
            tx,
            rt.handle().clone(),
            Arc::clone(&released),
        );
        let instance = PlayerInstance::new(0, Box::new(engine), poller, released, &playback);
        Fixture {
            _rt: rt,
            instance,
            engine: handle,
            _ticks: ticks,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(PlaybackConfig::default())
    }

    fn status_sink(instance: &PlayerInstance) -> Arc<Mutex<Vec<PlaybackStatus>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        instance.set_on_status(Some(Box::new(move |status| sink.lock().push(status))));
        seen
    }

    fn progress_sink(instance: &PlayerInstance) -> Arc<Mutex<Vec<(f64, f64)>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        instance.set_on_progress(Some(Box::new(move |p, d| sink.lock().push((p, d)))));
        seen
    }

    #[test]
    fn test_status_sequence_through_engine_signals() {
        let f = fixture();
        let seen = status_sink(&f.instance);

        f.instance.load("https://example.com/a.m3u8", true, false);
        f.engine.emit(EngineEvent::StateChanged(EngineState::Buffering));
        f.instance.poll_tick();
        f.engine.set_state(EngineState::Ready);
        f.engine.emit(EngineEvent::StateChanged(EngineState::Ready));
        f.instance.poll_tick();
        f.engine.set_state(EngineState::Ended);
        f.engine.emit(EngineEvent::StateChanged(EngineState::Ended));
        f.instance.poll_tick();

        assert_eq!(
            *seen.lock(),
            vec![
                PlaybackStatus::New,
                PlaybackStatus::Loading,
                PlaybackStatus::Playing,
                PlaybackStatus::Finished,
            ]
        );
    }

    #[test]
    fn test_play_after_finished_seeks_to_zero_first() {
        let f = fixture();
        f.instance.load("file.mp4", false, false);
        f.engine.set_state(EngineState::Ended);
        f.engine.emit(EngineEvent::StateChanged(EngineState::Ended));
        f.instance.poll_tick();
        assert_eq!(f.instance.status(), PlaybackStatus::Finished);

        f.instance.play();

        let calls = f.engine.calls();
        let seek_at = calls
            .iter()
            .position(|c| *c == MockCall::SeekTo(0))
            .expect("play from finished must seek to 0");
        let resume_at = calls
            .iter()
            .rposition(|c| *c == MockCall::SetPlayWhenReady(true))
            .unwrap();
        assert!(seek_at < resume_at, "seek must precede the resume");
    }

    #[test]
    fn test_seek_clamps_and_notifies_synchronously() {
        let f = fixture();
        let seen = progress_sink(&f.instance);
        f.engine.set_duration(Some(10_000));

        f.instance.seek(1.5);
        f.instance.seek(-0.5);

        let calls = f.engine.calls();
        assert!(calls.contains(&MockCall::SeekTo(10_000)));
        assert!(calls.contains(&MockCall::SeekTo(0)));
        assert_eq!(*seen.lock(), vec![(1.0, 10.0), (0.0, 10.0)]);
    }

    #[test]
    fn test_relative_seek_bounds() {
        let f = fixture();
        f.engine.set_duration(Some(10_000));
        f.engine.set_position(9_000);
        f.instance.seek_forward(5.0);
        assert!(f.engine.calls().contains(&MockCall::SeekTo(10_000)));

        f.engine.set_position(2_000);
        f.instance.seek_rewind(10.0);
        assert!(f.engine.calls().contains(&MockCall::SeekTo(0)));
    }

    #[test]
    fn test_negative_relative_seek_is_noop() {
        let f = fixture();
        let before = f.engine.calls().len();
        f.instance.seek_forward(-5.0);
        f.instance.seek_rewind(-1.0);
        assert_eq!(f.engine.calls().len(), before);
    }

    #[test]
    fn test_progress_zero_without_duration() {
        let f = fixture();
        f.engine.set_position(5_000);
        assert_eq!(f.instance.progress(), 0.0);

        f.engine.set_duration(Some(10_000));
        assert_eq!(f.instance.progress(), 0.5);
    }

    #[test]
    fn test_poll_tick_emits_every_tick() {
        let f = fixture();
        let seen = progress_sink(&f.instance);
        f.engine.set_duration(Some(10_000));

        f.instance.poll_tick();
        f.instance.poll_tick();

        assert_eq!(*seen.lock(), vec![(0.0, 10.0), (0.0, 10.0)]);
    }

    #[test]
    fn test_release_is_exactly_once_and_methods_become_noops() {
        let f = fixture();
        f.instance.load("file.mp4", false, false);
        f.instance.release();
        f.instance.release();

        let calls = f.engine.calls();
        assert_eq!(calls.iter().filter(|c| **c == MockCall::Release).count(), 1);
        assert!(!f.engine.has_listener());

        let before = calls.len();
        f.instance.play();
        f.instance.pause();
        f.instance.seek(0.5);
        f.instance.load("other.mp4", false, false);
        f.instance.set_volume(0.3);
        assert_eq!(f.engine.calls().len(), before);
        assert!(f.instance.is_released());
        assert_eq!(f.instance.volume(), 0.0);
        assert!(!f.instance.is_polling());
    }

    #[test]
    fn test_volume_clamped() {
        let f = fixture();
        f.instance.set_volume(3.0);
        assert_eq!(f.engine.volume(), 1.0);
        f.instance.set_volume(-2.0);
        assert_eq!(f.engine.volume(), 0.0);
    }

    #[test]
    fn test_pause_poller_policy() {
        let f = fixture();
        f.instance.load("file.mp4", false, false);
        assert!(f.instance.is_polling());
        f.instance.pause();
        assert!(!f.instance.is_polling());

        let keep = fixture_with(PlaybackConfig {
            pause_stops_poller: false,
            ..PlaybackConfig::default()
        });
        keep.instance.load("file.mp4", false, false);
        keep.instance.pause();
        assert!(keep.instance.is_polling());
    }

    #[test]
    fn test_stop_and_clear_distinguish_statuses() {
        let f = fixture();
        f.instance.load("file.mp4", false, false);
        f.instance.stop();
        assert_eq!(f.instance.status(), PlaybackStatus::Stopped);
        assert!(!f.instance.is_polling());

        f.instance.load("file.mp4", false, false);
        f.instance.clear();
        assert_eq!(f.instance.status(), PlaybackStatus::None);
    }

    #[test]
    fn test_error_signal_maps_to_error_status() {
        let f = fixture();
        let seen = status_sink(&f.instance);
        f.instance.load("file.mp4", false, false);
        f.engine.emit(EngineEvent::Error {
            code: 2001,
            message: "network failed".to_string(),
        });
        f.instance.poll_tick();

        assert_eq!(f.instance.status(), PlaybackStatus::Error);
        assert!(seen.lock().contains(&PlaybackStatus::Error));
        assert!(!f.instance.is_polling());
    }

    #[test]
    fn test_callback_slot_last_writer_wins() {
        let f = fixture();
        let first = Arc::new(Mutex::new(Vec::new()));
        let second = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&first);
        f.instance
            .set_on_status(Some(Box::new(move |s| sink.lock().push(s))));
        let sink = Arc::clone(&second);
        f.instance
            .set_on_status(Some(Box::new(move |s| sink.lock().push(s))));

        f.instance.load("file.mp4", false, false);

        assert!(first.lock().is_empty());
        assert_eq!(*second.lock(), vec![PlaybackStatus::New]);
    }
}
