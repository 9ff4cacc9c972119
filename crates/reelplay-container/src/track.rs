//! Track lifecycle and the video frame cursor.

use reelplay_codec::{Palette, Surface};

use crate::error::Result;
use crate::header::FrameRate;

/// What a track carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Video,
    Audio,
}

/// Lifecycle of a track: Ready → Playing ⇄ Paused → Ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    Ready,
    Playing,
    Paused,
    Ended,
}

/// Started/paused flags shared by all track kinds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackStatus {
    pub started: bool,
    pub paused: bool,
}

/// One independently advancing stream of a container.
pub trait Track {
    fn kind(&self) -> TrackKind;

    /// Whether the track has nothing left to present.
    fn end_of_track(&self) -> bool;

    fn status(&self) -> TrackStatus;

    fn status_mut(&mut self) -> &mut TrackStatus;

    fn is_seekable(&self) -> bool {
        false
    }

    /// Whether [`Track::seek`] would accept `time_ms`. Must not change state.
    fn can_seek(&self, _time_ms: u64) -> bool {
        self.is_seekable()
    }

    /// Move to `time_ms`. Only called after [`Track::can_seek`] agreed.
    fn seek(&mut self, _time_ms: u64) -> Result<()> {
        Ok(())
    }

    fn on_start(&mut self) {}

    fn on_stop(&mut self) {}

    fn on_pause(&mut self, _paused: bool) {}

    fn start(&mut self) {
        let status = self.status_mut();
        status.started = true;
        status.paused = false;
        self.on_start();
    }

    fn stop(&mut self) {
        *self.status_mut() = TrackStatus::default();
        self.on_stop();
    }

    fn pause(&mut self, paused: bool) {
        self.status_mut().paused = paused;
        self.on_pause(paused);
    }

    fn state(&self) -> TrackState {
        let status = self.status();
        if self.end_of_track() {
            TrackState::Ended
        } else if !status.started {
            TrackState::Ready
        } else if status.paused {
            TrackState::Paused
        } else {
            TrackState::Playing
        }
    }
}

/// Position of a video track in its frame sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameCursor {
    current: i64,
    count: u32,
    rate: FrameRate,
    reversed: bool,
}

impl FrameCursor {
    pub fn new(count: u32, rate: FrameRate) -> Self {
        Self {
            current: -1,
            count,
            rate,
            reversed: false,
        }
    }

    /// Index of the last decoded frame (`-1` before the first one).
    pub fn current(&self) -> i64 {
        self.current
    }

    pub fn set_current(&mut self, frame: i64) {
        self.current = frame;
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn rate(&self) -> FrameRate {
        self.rate
    }

    pub fn is_reversed(&self) -> bool {
        self.reversed
    }

    /// Flip the direction. A cursor that has not decoded anything yet starts
    /// reverse playback from past the last frame.
    pub fn set_reversed(&mut self, reversed: bool) {
        self.reversed = reversed;
        if reversed && self.current < 0 {
            self.current = self.count as i64;
        }
    }

    pub fn is_ended(&self) -> bool {
        if self.reversed {
            self.current <= 0
        } else {
            self.current >= self.count as i64 - 1
        }
    }

    /// Frame the next decode produces.
    pub fn next_index(&self) -> i64 {
        if self.reversed {
            self.current - 1
        } else {
            self.current + 1
        }
    }

    /// Record that the next frame was decoded.
    pub fn advance(&mut self) {
        self.current = self.next_index();
    }

    pub fn frame_time_ms(&self, frame: u64) -> u64 {
        self.rate.frame_time_ms(frame)
    }

    /// Timestamp at which the next frame is due.
    pub fn next_frame_start_ms(&self) -> u64 {
        if self.is_ended() || self.current < 0 {
            return 0;
        }
        if self.reversed {
            self.frame_time_ms(self.current as u64)
        } else {
            self.frame_time_ms(self.current as u64 + 1)
        }
    }

    /// Total running time.
    pub fn duration_ms(&self) -> u64 {
        self.frame_time_ms(self.count as u64)
    }

    /// Frame shown at `time_ms`, if inside the sequence.
    pub fn frame_at_ms(&self, time_ms: u64) -> Option<u32> {
        let frame = self.rate.frame_at_ms(time_ms);
        (frame < self.count as u64).then_some(frame as u32)
    }

    /// Position the cursor so that `frame` is decoded next.
    pub fn seek_to_frame(&mut self, frame: u32) {
        self.current = if self.reversed {
            frame as i64 + 1
        } else {
            frame as i64 - 1
        };
    }
}

/// A track that produces frames into a surface.
pub trait VideoTrack: Track {
    fn cursor(&self) -> &FrameCursor;

    fn cursor_mut(&mut self) -> &mut FrameCursor;

    fn surface(&self) -> &Surface;

    /// Colour table of an indexed track.
    fn palette_mut(&mut self) -> Option<&mut Palette> {
        None
    }

    fn supports_reverse(&self) -> bool {
        false
    }

    fn width(&self) -> u32 {
        self.surface().width()
    }

    fn height(&self) -> u32 {
        self.surface().height()
    }
}
