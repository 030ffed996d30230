//! Simulated playback engine
//!
//! A deterministic, wall-clock driven implementation of [`PlaybackEngine`]
//! with no real decoding behind it. Preparation takes a configurable delay,
//! position advances in real time while playing, and the session reports
//! Ended (or wraps, under repeat mode) at the configured media duration.
//!
//! State promotions happen lazily during position/duration/state queries,
//! which all run on the service command loop, so every event the engine
//! emits is observed on the engine context like a real engine requires.

use crate::engine::{EngineEvent, EngineListener, EngineState, PlaybackEngine, SourceSettings, SurfaceId};
use crate::utils::error::{PlaydeckError, Result};
use log::debug;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Timing knobs for the simulated session
#[derive(Debug, Clone)]
pub struct SimTimings {
    /// Time spent in Buffering before the session becomes Ready
    pub prepare_delay: Duration,

    /// Reported media duration
    pub media_duration: Duration,

    /// Native video dimensions reported once the session is Ready
    pub video_size: (u32, u32),
}

impl Default for SimTimings {
    fn default() -> Self {
        Self {
            prepare_delay: Duration::from_millis(200),
            media_duration: Duration::from_secs(10),
            video_size: (1920, 1080),
        }
    }
}

/// Simulated single-session playback engine
pub struct SimEngine {
    timings: SimTimings,
    source: Option<Arc<SourceSettings>>,
    url: Option<String>,
    state: EngineState,
    play_when_ready: bool,
    playing: bool,
    repeat: bool,
    volume: f32,
    position_ms: i64,
    duration: Option<i64>,
    prepared_at: Option<Instant>,
    playing_since: Option<Instant>,
    listener: Option<EngineListener>,
    output: Option<SurfaceId>,
    released: bool,
}

impl SimEngine {
    /// Create a simulated session with the given timings
    pub fn new(timings: SimTimings) -> Self {
        Self {
            timings,
            source: None,
            url: None,
            state: EngineState::Idle,
            play_when_ready: false,
            playing: false,
            repeat: false,
            volume: 1.0,
            position_ms: 0,
            duration: None,
            prepared_at: None,
            playing_since: None,
            listener: None,
            output: None,
            released: false,
        }
    }

    /// Create a session that carries the shared source settings
    pub fn with_source(timings: SimTimings, source: Arc<SourceSettings>) -> Self {
        let mut engine = Self::new(timings);
        engine.source = Some(source);
        engine
    }

    /// An [`crate::engine::EngineFactory`] producing simulated sessions
    pub fn factory(timings: SimTimings) -> crate::engine::EngineFactory {
        Box::new(move |source| Box::new(SimEngine::with_source(timings.clone(), source)))
    }

    fn emit(&mut self, event: EngineEvent) {
        if let Some(listener) = self.listener.as_mut() {
            listener(event);
        }
    }

    fn set_state(&mut self, state: EngineState) {
        if self.state != state {
            self.state = state;
            self.emit(EngineEvent::StateChanged(state));
        }
    }

    fn begin_playing(&mut self) {
        if !self.playing {
            self.playing = true;
            self.playing_since = Some(Instant::now());
            self.emit(EngineEvent::IsPlayingChanged(true));
        }
    }

    fn stop_playing(&mut self) {
        if self.playing {
            self.accumulate_position();
            self.playing = false;
            self.playing_since = None;
            self.emit(EngineEvent::IsPlayingChanged(false));
        }
    }

    fn accumulate_position(&mut self) {
        if let Some(since) = self.playing_since {
            self.position_ms += since.elapsed().as_millis() as i64;
            self.playing_since = Some(Instant::now());
        }
    }

    /// Apply all time-driven transitions that are due
    fn advance(&mut self) {
        if self.released {
            return;
        }

        if self.state == EngineState::Buffering {
            let ready = self
                .prepared_at
                .map(|at| at.elapsed() >= self.timings.prepare_delay)
                .unwrap_or(false);
            if ready {
                self.duration = Some(self.timings.media_duration.as_millis() as i64);
                self.set_state(EngineState::Ready);
                let (width, height) = self.timings.video_size;
                self.emit(EngineEvent::VideoSizeChanged { width, height });
                if self.play_when_ready {
                    self.begin_playing();
                }
            }
        }

        if self.playing {
            self.accumulate_position();
            if let Some(duration) = self.duration {
                if self.position_ms >= duration && duration > 0 {
                    if self.repeat {
                        self.position_ms %= duration;
                    } else {
                        self.position_ms = duration;
                        self.playing = false;
                        self.playing_since = None;
                        self.set_state(EngineState::Ended);
                    }
                }
            }
        }
    }
}

impl PlaybackEngine for SimEngine {
    fn prepare(&mut self, url: &str, streaming: bool) -> Result<()> {
        if self.released {
            return Err(PlaydeckError::Engine("session is released".to_string()));
        }
        if url.is_empty() {
            return Err(PlaydeckError::Engine("empty media url".to_string()));
        }

        debug!(
            "sim: preparing {} (streaming={}, timeouts={:?})",
            url,
            streaming,
            self.source.as_ref().map(|s| s.connect_timeout)
        );

        self.url = Some(url.to_string());
        self.position_ms = 0;
        self.duration = None;
        self.playing = false;
        self.playing_since = None;
        self.prepared_at = Some(Instant::now());
        self.set_state(EngineState::Buffering);
        Ok(())
    }

    fn set_repeat(&mut self, looped: bool) {
        self.repeat = looped;
    }

    fn set_play_when_ready(&mut self, play: bool) {
        if self.play_when_ready == play {
            return;
        }
        self.play_when_ready = play;
        if self.state == EngineState::Ready {
            if play {
                self.begin_playing();
            } else {
                self.stop_playing();
            }
        }
    }

    fn play_when_ready(&self) -> bool {
        self.play_when_ready
    }

    fn stop(&mut self) {
        self.playing = false;
        self.playing_since = None;
        self.set_state(EngineState::Idle);
    }

    fn clear_media(&mut self) {
        if let Some(url) = self.url.take() {
            debug!("sim: clearing {}", url);
        }
        self.duration = None;
        self.position_ms = 0;
        self.prepared_at = None;
        self.playing = false;
        self.playing_since = None;
        self.set_state(EngineState::Idle);
    }

    fn seek_to(&mut self, position_ms: i64) {
        self.advance();
        let upper = self.duration.unwrap_or(i64::MAX);
        self.position_ms = position_ms.clamp(0, upper);
        if self.playing {
            self.playing_since = Some(Instant::now());
        }
        // Seeking out of the ended state rewinds the session to Ready
        if self.state == EngineState::Ended {
            self.set_state(EngineState::Ready);
            if self.play_when_ready {
                self.begin_playing();
            }
        }
    }

    fn position_ms(&mut self) -> i64 {
        self.advance();
        self.position_ms
    }

    fn duration_ms(&mut self) -> Option<i64> {
        self.advance();
        self.duration
    }

    fn playback_state(&mut self) -> EngineState {
        self.advance();
        self.state
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
    }

    fn volume(&self) -> f32 {
        self.volume
    }

    fn set_listener(&mut self, listener: Option<EngineListener>) {
        self.listener = listener;
    }

    fn set_output(&mut self, surface: Option<SurfaceId>) {
        self.output = surface;
    }

    fn output(&self) -> Option<SurfaceId> {
        self.output
    }

    fn release(&mut self) {
        self.released = true;
        self.listener = None;
        self.playing = false;
        self.playing_since = None;
    }
}
