//! Per-instance progress polling
//!
//! Each player instance owns one [`ProgressPoller`]: a repeating tokio task
//! that posts tick messages back into the service command loop at a fixed
//! cadence. The tick itself (sampling position/duration and notifying the
//! progress slot) runs on the engine context, not on the timer task.
//!
//! `start`/`stop` are idempotent. Cancellation is cooperative: the task
//! checks its flags at every tick and self-terminates permanently once the
//! owning instance is released. A generation counter guards restart races so
//! a stale task from a previous start can never double-fire.

use log::debug;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

pub struct ProgressPoller {
    index: usize,
    interval: Duration,
    tick_tx: mpsc::UnboundedSender<usize>,
    handle: Handle,
    running: Arc<AtomicBool>,
    generation: Arc<AtomicU64>,
    released: Arc<AtomicBool>,
}

impl ProgressPoller {
    /// Create a poller for the instance at `index`.
    ///
    /// `released` is the owning instance's released flag; once it flips the
    /// polling task terminates and can never be restarted.
    pub fn new(
        index: usize,
        interval: Duration,
        tick_tx: mpsc::UnboundedSender<usize>,
        handle: Handle,
        released: Arc<AtomicBool>,
    ) -> Self {
        Self {
            index,
            interval,
            tick_tx,
            handle,
            running: Arc::new(AtomicBool::new(false)),
            generation: Arc::new(AtomicU64::new(0)),
            released,
        }
    }

    /// Start the repeating task. A second call while running is a no-op.
    pub fn start(&self) {
        if self.released.load(Ordering::Acquire) {
            return;
        }
        if self.running.swap(true, Ordering::AcqRel) {
            return;
        }

        let my_generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let running = Arc::clone(&self.running);
        let generation = Arc::clone(&self.generation);
        let released = Arc::clone(&self.released);
        let tick_tx = self.tick_tx.clone();
        let index = self.index;
        let interval = self.interval;

        debug!("starting progress poller for instance {}", index);

        self.handle.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if released.load(Ordering::Acquire)
                    || !running.load(Ordering::Acquire)
                    || generation.load(Ordering::Acquire) != my_generation
                {
                    break;
                }
                if tick_tx.send(index).is_err() {
                    break;
                }
            }
            debug!("progress poller for instance {} terminated", index);
        });
    }

    /// Stop the repeating task. Safe to call at any time, any number of
    /// times; the task observes the flag at its next tick.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    /// Whether the poller is currently active
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}
