//! Session clock.

/// Playback direction and speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackRate {
    Reverse,
    #[default]
    Stopped,
    Normal,
}

impl PlaybackRate {
    pub fn factor(self) -> i64 {
        match self {
            Self::Reverse => -1,
            Self::Stopped => 0,
            Self::Normal => 1,
        }
    }
}

/// Maps host time to media time.
///
/// Times are milliseconds. `now` is always supplied by the caller so the clock
/// itself holds no reference to a time source.
#[derive(Debug, Clone, Default)]
pub struct SessionClock {
    rate: PlaybackRate,
    start_ms: i64,
    pause_level: u32,
    pause_start_ms: i64,
    last_time_change_ms: u64,
}

impl SessionClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rate(&self) -> PlaybackRate {
        self.rate
    }

    pub fn is_playing(&self) -> bool {
        self.rate != PlaybackRate::Stopped
    }

    pub fn is_paused(&self) -> bool {
        self.pause_level > 0
    }

    /// Media time of the last seek or rate change.
    pub fn last_time_change_ms(&self) -> u64 {
        self.last_time_change_ms
    }

    /// Current media time.
    ///
    /// `audio_elapsed_ms` is the play position reported for the live audio
    /// stream, if any; it is counted from the last time change.
    pub fn time_ms(&self, now_ms: u64, audio_elapsed_ms: Option<u64>) -> u64 {
        if !self.is_playing() {
            return self.last_time_change_ms;
        }

        let factor = self.rate.factor();
        if self.is_paused() {
            return (factor * (self.pause_start_ms - self.start_ms)).max(0) as u64;
        }

        if let Some(elapsed) = audio_elapsed_ms.filter(|&e| e > 0) {
            return elapsed + self.last_time_change_ms;
        }

        (factor * (now_ms as i64 - self.start_ms)).max(0) as u64
    }

    /// Change the rate, keeping the current media time.
    pub fn set_rate(&mut self, rate: PlaybackRate, now_ms: u64, current_ms: u64) {
        if rate == self.rate {
            return;
        }

        self.last_time_change_ms = current_ms;
        self.rate = rate;
        if rate == PlaybackRate::Stopped {
            self.pause_level = 0;
            return;
        }

        self.rebase(now_ms, current_ms);
    }

    /// Make `time_ms` the current media time.
    pub fn rebase(&mut self, now_ms: u64, time_ms: u64) {
        let now = now_ms as i64;
        self.start_ms = now - self.rate.factor() * time_ms as i64;
        self.last_time_change_ms = time_ms;
        if self.is_paused() {
            self.pause_start_ms = now;
        }
    }

    /// Nest a pause (`true`) or undo one (`false`).
    ///
    /// The first pause freezes time; the matching last resume shifts the
    /// start reference by the paused duration.
    pub fn pause(&mut self, paused: bool, now_ms: u64) {
        let now = now_ms as i64;
        if paused {
            if self.pause_level == 0 {
                self.pause_start_ms = now;
            }
            self.pause_level += 1;
        } else if self.pause_level > 0 {
            self.pause_level -= 1;
            if self.pause_level == 0 {
                self.start_ms += now - self.pause_start_ms;
            }
        }
    }

    /// Back to a stopped clock at time zero.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
