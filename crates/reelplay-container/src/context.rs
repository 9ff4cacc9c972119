//! Services a playback session depends on.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::mixer::{Mixer, NullMixer};

/// Millisecond time base.
pub trait TimeSource: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Wall-clock time since construction.
#[derive(Debug)]
pub struct SystemTimeSource {
    origin: Instant,
}

impl SystemTimeSource {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for SystemTimeSource {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Time that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualTimeSource {
    now: AtomicU64,
}

impl ManualTimeSource {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: AtomicU64::new(start_ms),
        }
    }

    pub fn set(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }

    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl TimeSource for ManualTimeSource {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Mixer and time base handed to a decoder.
#[derive(Clone)]
pub struct PlaybackContext {
    pub mixer: Arc<dyn Mixer>,
    pub time: Arc<dyn TimeSource>,
}

impl PlaybackContext {
    pub fn new(mixer: Arc<dyn Mixer>, time: Arc<dyn TimeSource>) -> Self {
        Self { mixer, time }
    }

    /// Silent playback against the wall clock.
    pub fn headless() -> Self {
        Self::new(Arc::new(NullMixer::new()), Arc::new(SystemTimeSource::new()))
    }

    pub fn now_ms(&self) -> u64 {
        self.time.now_ms()
    }
}

impl std::fmt::Debug for PlaybackContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackContext")
            .field("now_ms", &self.time.now_ms())
            .finish_non_exhaustive()
    }
}
