//! Track set, clock and palette of one playback.

use reelplay_codec::palette::PALETTE_BYTES;
use reelplay_codec::Palette;

use crate::audio::PcmAudioTrack;
use crate::clock::{PlaybackRate, SessionClock};
use crate::context::PlaybackContext;
use crate::error::Result;
use crate::track::{Track, VideoTrack};

/// All tracks of a loaded container plus the clock that schedules them.
#[derive(Debug)]
pub struct Session<V> {
    context: PlaybackContext,
    clock: SessionClock,
    video: Vec<V>,
    audio: Vec<PcmAudioTrack>,
    loaded: bool,
    end_time_ms: Option<u64>,
    next_video: Option<usize>,
    palette: Palette,
}

impl<V: VideoTrack> Session<V> {
    pub fn new(context: PlaybackContext) -> Self {
        Self {
            context,
            clock: SessionClock::new(),
            video: Vec::new(),
            audio: Vec::new(),
            loaded: false,
            end_time_ms: None,
            next_video: None,
            palette: Palette::new(),
        }
    }

    pub fn context(&self) -> &PlaybackContext {
        &self.context
    }

    pub fn clock(&self) -> &SessionClock {
        &self.clock
    }

    pub fn add_video_track(&mut self, track: V) -> usize {
        self.video.push(track);
        self.select_next_video();
        self.video.len() - 1
    }

    pub fn add_audio_track(&mut self, track: PcmAudioTrack) -> usize {
        self.audio.push(track);
        self.audio.len() - 1
    }

    pub fn video_tracks(&self) -> &[V] {
        &self.video
    }

    pub fn video_track_mut(&mut self, index: usize) -> Option<&mut V> {
        self.video.get_mut(index)
    }

    pub fn audio_tracks(&self) -> &[PcmAudioTrack] {
        &self.audio
    }

    pub fn audio_track_mut(&mut self, index: usize) -> Option<&mut PcmAudioTrack> {
        self.audio.get_mut(index)
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn set_loaded(&mut self, loaded: bool) {
        self.loaded = loaded;
    }

    /// Tear down every track and return to an unloaded, stopped state.
    pub fn close(&mut self) {
        for track in &mut self.audio {
            track.stop();
        }
        for track in &mut self.video {
            track.stop();
        }
        self.audio.clear();
        self.video.clear();
        self.clock.reset();
        self.loaded = false;
        self.end_time_ms = None;
        self.next_video = None;
        self.palette = Palette::new();
    }

    pub fn rate(&self) -> PlaybackRate {
        self.clock.rate()
    }

    pub fn is_playing(&self) -> bool {
        self.clock.is_playing()
    }

    pub fn is_paused(&self) -> bool {
        self.clock.is_paused()
    }

    pub fn start(&mut self) -> bool {
        self.set_rate(PlaybackRate::Normal)
    }

    pub fn stop(&mut self) -> bool {
        self.set_rate(PlaybackRate::Stopped)
    }

    /// Change the playback rate. Returns `false` if the tracks cannot play at it.
    ///
    /// Reverse playback needs every video track to support it and no audio.
    pub fn set_rate(&mut self, rate: PlaybackRate) -> bool {
        let current = self.clock.rate();
        if rate == current {
            return true;
        }
        if rate == PlaybackRate::Reverse
            && (!self.audio.is_empty() || !self.video.iter().all(|t| t.supports_reverse()))
        {
            return false;
        }

        let now = self.context.now_ms();
        let time = self.time_ms();

        if rate == PlaybackRate::Stopped {
            for track in &mut self.audio {
                track.stop();
            }
            for track in &mut self.video {
                track.stop();
            }
        } else {
            let reversed = rate == PlaybackRate::Reverse;
            for track in &mut self.video {
                if track.cursor().is_reversed() != reversed {
                    track.cursor_mut().set_reversed(reversed);
                }
                if current == PlaybackRate::Stopped {
                    track.start();
                }
            }
            if current == PlaybackRate::Stopped {
                for track in &mut self.audio {
                    track.start();
                }
            }
        }

        self.clock.set_rate(rate, now, time);
        self.select_next_video();
        tracing::debug!(?rate, time_ms = time, "playback rate changed");
        true
    }

    /// Nest a pause or undo one.
    pub fn pause(&mut self, paused: bool) {
        let was_paused = self.clock.is_paused();
        self.clock.pause(paused, self.context.now_ms());
        let is_paused = self.clock.is_paused();
        if was_paused == is_paused {
            return;
        }
        for track in &mut self.audio {
            track.pause(is_paused);
        }
        for track in &mut self.video {
            track.pause(is_paused);
        }
    }

    /// Current media time in milliseconds.
    pub fn time_ms(&self) -> u64 {
        let audio = self
            .audio
            .iter()
            .find(|t| t.is_live())
            .map(|t| t.elapsed_ms());
        self.clock.time_ms(self.context.now_ms(), audio)
    }

    /// Milliseconds until the next frame is due; 0 means decode now.
    pub fn time_to_next_frame_ms(&self) -> u64 {
        if self.end_of_video() {
            return 0;
        }
        let Some(index) = self.next_video else {
            return 0;
        };

        let cursor = self.video[index].cursor();
        let next = cursor.next_frame_start_ms();
        let elapsed = self.time_ms();
        if cursor.is_reversed() {
            elapsed.saturating_sub(next)
        } else {
            next.saturating_sub(elapsed)
        }
    }

    pub fn end_time_ms(&self) -> Option<u64> {
        self.end_time_ms
    }

    /// Stop treating frames at or past `end_ms` as playable.
    pub fn set_end_time(&mut self, end_ms: Option<u64>) {
        self.end_time_ms = end_ms;
    }

    pub fn all_video_ended(&self) -> bool {
        self.video.iter().all(|t| t.end_of_track())
    }

    pub fn end_of_video(&self) -> bool {
        if !self.loaded {
            return true;
        }

        if let (Some(end), Some(index)) = (self.end_time_ms, self.next_video) {
            let cursor = self.video[index].cursor();
            if !cursor.is_reversed() && cursor.next_frame_start_ms() >= end {
                return true;
            }
        }

        self.all_video_ended() && self.audio.iter().all(|t| t.end_of_track())
    }

    /// Whether every track would accept a seek to `time_ms`.
    pub fn can_seek(&self, time_ms: u64) -> bool {
        self.loaded
            && self.video.iter().all(|t| t.can_seek(time_ms))
            && self.audio.iter().all(|t| t.can_seek(time_ms))
    }

    /// Seek every track to `time_ms`, or none of them.
    ///
    /// Returns `Ok(false)` without touching any state if a track refuses.
    pub fn seek(&mut self, time_ms: u64) -> Result<bool> {
        if !self.can_seek(time_ms) {
            tracing::debug!(time_ms, "seek refused");
            return Ok(false);
        }

        for track in &mut self.audio {
            track.seek(time_ms)?;
        }
        for track in &mut self.video {
            track.seek(time_ms)?;
        }

        self.clock.rebase(self.context.now_ms(), time_ms);
        self.select_next_video();

        if self.clock.is_playing() {
            for track in &mut self.audio {
                track.start();
                if self.clock.is_paused() {
                    track.pause(true);
                }
            }
        }
        tracing::debug!(time_ms, "seeked");
        Ok(true)
    }

    /// Video track whose frame is due first.
    pub fn next_video_track(&self) -> Option<usize> {
        self.next_video
    }

    fn select_next_video(&mut self) {
        let reversed = self.clock.rate() == PlaybackRate::Reverse;
        let mut best: Option<(usize, u64)> = None;
        for (index, track) in self.video.iter().enumerate() {
            if track.end_of_track() {
                continue;
            }
            let start = track.cursor().next_frame_start_ms();
            let better = match best {
                None => true,
                Some((_, best_start)) if reversed => start > best_start,
                Some((_, best_start)) => start < best_start,
            };
            if better {
                best = Some((index, start));
            }
        }
        self.next_video = best.map(|(index, _)| index);
    }

    /// Bookkeeping after `index` decoded a frame: merge its palette and pick
    /// the next track.
    pub fn after_decode(&mut self, index: usize) {
        if let Some(palette) = self.video.get_mut(index).and_then(|t| t.palette_mut()) {
            if palette.take_dirty() {
                let colors = *palette.colors();
                self.palette.replace(&colors);
            }
        }
        self.select_next_video();
    }

    /// Current palette and whether it changed since the last call.
    pub fn take_palette(&mut self) -> (&[u8; PALETTE_BYTES], bool) {
        let dirty = self.palette.take_dirty();
        (self.palette.colors(), dirty)
    }

    /// Current palette without touching the dirty flag.
    pub fn palette(&self) -> &Palette {
        &self.palette
    }
}
