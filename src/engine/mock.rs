//! Scripted engine double for unit tests
//!
//! Records every call made to the session and lets tests inject engine
//! events by hand through a shared handle.

use crate::engine::{EngineEvent, EngineListener, EngineState, PlaybackEngine, SurfaceId};
use crate::utils::error::Result;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    Prepare(String, bool),
    SetRepeat(bool),
    SetPlayWhenReady(bool),
    Stop,
    ClearMedia,
    SeekTo(i64),
    SetVolume(f32),
    SetOutput(Option<SurfaceId>),
    Release,
}

#[derive(Default)]
struct MockState {
    calls: Vec<MockCall>,
    listener: Option<EngineListener>,
    play_when_ready: bool,
    volume: f32,
    position_ms: i64,
    duration_ms: Option<i64>,
    state: Option<EngineState>,
    output: Option<SurfaceId>,
}

/// Test-side handle to a [`MockEngine`]'s shared state
#[derive(Clone)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockHandle {
    /// Snapshot of the calls recorded so far
    pub fn calls(&self) -> Vec<MockCall> {
        self.state.lock().calls.clone()
    }

    /// Deliver an engine event through the installed listener
    pub fn emit(&self, event: EngineEvent) {
        let mut state = self.state.lock();
        if let Some(listener) = state.listener.as_mut() {
            listener(event);
        }
    }

    pub fn set_duration(&self, duration_ms: Option<i64>) {
        self.state.lock().duration_ms = duration_ms;
    }

    pub fn set_position(&self, position_ms: i64) {
        self.state.lock().position_ms = position_ms;
    }

    pub fn set_state(&self, state: EngineState) {
        self.state.lock().state = Some(state);
    }

    pub fn volume(&self) -> f32 {
        self.state.lock().volume
    }

    pub fn output(&self) -> Option<SurfaceId> {
        self.state.lock().output
    }

    pub fn has_listener(&self) -> bool {
        self.state.lock().listener.is_some()
    }
}

/// Recording engine session for unit tests
pub struct MockEngine {
    state: Arc<Mutex<MockState>>,
}

impl MockEngine {
    pub fn new() -> (Self, MockHandle) {
        let state = Arc::new(Mutex::new(MockState {
            volume: 1.0,
            ..MockState::default()
        }));
        let handle = MockHandle {
            state: Arc::clone(&state),
        };
        (Self { state }, handle)
    }
}

impl PlaybackEngine for MockEngine {
    fn prepare(&mut self, url: &str, streaming: bool) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(MockCall::Prepare(url.to_string(), streaming));
        state.state = Some(EngineState::Buffering);
        Ok(())
    }

    fn set_repeat(&mut self, looped: bool) {
        self.state.lock().calls.push(MockCall::SetRepeat(looped));
    }

    fn set_play_when_ready(&mut self, play: bool) {
        let mut state = self.state.lock();
        state.calls.push(MockCall::SetPlayWhenReady(play));
        state.play_when_ready = play;
    }

    fn play_when_ready(&self) -> bool {
        self.state.lock().play_when_ready
    }

    fn stop(&mut self) {
        self.state.lock().calls.push(MockCall::Stop);
    }

    fn clear_media(&mut self) {
        let mut state = self.state.lock();
        state.calls.push(MockCall::ClearMedia);
        state.duration_ms = None;
        state.position_ms = 0;
    }

    fn seek_to(&mut self, position_ms: i64) {
        let mut state = self.state.lock();
        state.calls.push(MockCall::SeekTo(position_ms));
        state.position_ms = position_ms;
    }

    fn position_ms(&mut self) -> i64 {
        self.state.lock().position_ms
    }

    fn duration_ms(&mut self) -> Option<i64> {
        self.state.lock().duration_ms
    }

    fn playback_state(&mut self) -> EngineState {
        self.state.lock().state.unwrap_or(EngineState::Idle)
    }

    fn set_volume(&mut self, volume: f32) {
        let mut state = self.state.lock();
        state.calls.push(MockCall::SetVolume(volume));
        state.volume = volume;
    }

    fn volume(&self) -> f32 {
        self.state.lock().volume
    }

    fn set_listener(&mut self, listener: Option<EngineListener>) {
        self.state.lock().listener = listener;
    }

    fn set_output(&mut self, surface: Option<SurfaceId>) {
        let mut state = self.state.lock();
        state.calls.push(MockCall::SetOutput(surface));
        state.output = surface;
    }

    fn output(&self) -> Option<SurfaceId> {
        self.state.lock().output
    }

    fn release(&mut self) {
        self.state.lock().calls.push(MockCall::Release);
    }
}
