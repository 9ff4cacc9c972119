//! Audio output boundary.
//!
//! The decoders never talk to audio hardware. They open a stream on a
//! [`Mixer`], push PCM buffers into it and ask it how much has been played.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

/// Layout of queued PCM: 8-bit samples are unsigned, 16-bit are signed little endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits: u16,
}

impl PcmFormat {
    /// Bytes per sample frame.
    pub fn frame_bytes(&self) -> usize {
        self.channels as usize * (self.bits as usize / 8)
    }

    pub fn bytes_per_second(&self) -> u64 {
        self.sample_rate as u64 * self.frame_bytes() as u64
    }

    /// Byte value of silence.
    pub fn silence(&self) -> u8 {
        if self.bits == 8 {
            0x80
        } else {
            0
        }
    }

    /// Playback time of `bytes` bytes.
    pub fn duration_ms(&self, bytes: u64) -> u64 {
        match self.bytes_per_second() {
            0 => 0,
            rate => bytes * 1000 / rate,
        }
    }
}

/// Identifies one open stream on a mixer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamHandle(pub u64);

/// Queue-and-report audio service.
pub trait Mixer: Send + Sync {
    /// Open a stream; it starts playing as soon as data is queued.
    fn play_stream(&self, format: PcmFormat) -> StreamHandle;

    /// Append PCM to a stream. Never blocks.
    fn queue_buffer(&self, handle: StreamHandle, pcm: Vec<u8>);

    /// No more buffers will be queued; the stream ends once drained.
    fn finish_stream(&self, handle: StreamHandle);

    /// Whether the stream still has something to play.
    fn is_active(&self, handle: StreamHandle) -> bool;

    /// Time played on the stream since it was opened.
    fn elapsed_ms(&self, handle: StreamHandle) -> u64;

    fn set_paused(&self, handle: StreamHandle, paused: bool);

    /// Drop the stream and everything queued on it.
    fn stop_stream(&self, handle: StreamHandle);
}

/// Mixer that discards all audio.
#[derive(Debug, Default)]
pub struct NullMixer {
    next: Mutex<u64>,
}

impl NullMixer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Mixer for NullMixer {
    fn play_stream(&self, _format: PcmFormat) -> StreamHandle {
        let mut next = self.next.lock();
        *next += 1;
        StreamHandle(*next)
    }

    fn queue_buffer(&self, _handle: StreamHandle, _pcm: Vec<u8>) {}

    fn finish_stream(&self, _handle: StreamHandle) {}

    fn is_active(&self, _handle: StreamHandle) -> bool {
        false
    }

    fn elapsed_ms(&self, _handle: StreamHandle) -> u64 {
        0
    }

    fn set_paused(&self, _handle: StreamHandle, _paused: bool) {}

    fn stop_stream(&self, _handle: StreamHandle) {}
}

#[derive(Debug)]
struct BufferedStream {
    format: PcmFormat,
    queue: VecDeque<u8>,
    played: u64,
    queued: u64,
    finished: bool,
    paused: bool,
}

#[derive(Debug, Default)]
struct BufferedState {
    next: u64,
    streams: HashMap<u64, BufferedStream>,
}

/// Mixer that holds PCM in memory until a consumer pulls it.
///
/// A host audio callback calls [`BufferedMixer::read`]. Underruns are padded
/// with silence and count as played time, so the clock keeps moving while the
/// decoder catches up.
#[derive(Debug, Default)]
pub struct BufferedMixer {
    state: Mutex<BufferedState>,
}

impl BufferedMixer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fill `out` from the stream and return how many bytes came from queued
    /// PCM. A paused, unknown or finished-and-drained stream yields silence
    /// without advancing.
    pub fn read(&self, handle: StreamHandle, out: &mut [u8]) -> usize {
        let mut state = self.state.lock();
        let Some(stream) = state.streams.get_mut(&handle.0) else {
            out.fill(0);
            return 0;
        };

        let silence = stream.format.silence();
        if stream.paused || (stream.finished && stream.queue.is_empty()) {
            out.fill(silence);
            return 0;
        }

        let available = stream.queue.len().min(out.len());
        for (dst, src) in out.iter_mut().zip(stream.queue.drain(..available)) {
            *dst = src;
        }
        out[available..].fill(silence);
        stream.played += out.len() as u64;
        available
    }

    /// Handles of all open streams, oldest first.
    pub fn handles(&self) -> Vec<StreamHandle> {
        let state = self.state.lock();
        let mut ids: Vec<u64> = state.streams.keys().copied().collect();
        ids.sort_unstable();
        ids.into_iter().map(StreamHandle).collect()
    }

    /// Format of an open stream.
    pub fn format(&self, handle: StreamHandle) -> Option<PcmFormat> {
        self.state.lock().streams.get(&handle.0).map(|s| s.format)
    }

    /// Bytes waiting to be read.
    pub fn queued_bytes(&self, handle: StreamHandle) -> usize {
        self.state
            .lock()
            .streams
            .get(&handle.0)
            .map_or(0, |s| s.queue.len())
    }

    /// Total bytes ever queued on the stream.
    pub fn total_queued(&self, handle: StreamHandle) -> u64 {
        self.state.lock().streams.get(&handle.0).map_or(0, |s| s.queued)
    }

    /// Drain everything queued so far without playing it.
    pub fn drain(&self, handle: StreamHandle) -> Vec<u8> {
        self.state
            .lock()
            .streams
            .get_mut(&handle.0)
            .map(|s| s.queue.drain(..).collect())
            .unwrap_or_default()
    }
}

impl Mixer for BufferedMixer {
    fn play_stream(&self, format: PcmFormat) -> StreamHandle {
        let mut state = self.state.lock();
        state.next += 1;
        let id = state.next;
        state.streams.insert(
            id,
            BufferedStream {
                format,
                queue: VecDeque::new(),
                played: 0,
                queued: 0,
                finished: false,
                paused: false,
            },
        );
        tracing::debug!(stream = id, ?format, "audio stream opened");
        StreamHandle(id)
    }

    fn queue_buffer(&self, handle: StreamHandle, pcm: Vec<u8>) {
        if let Some(stream) = self.state.lock().streams.get_mut(&handle.0) {
            stream.queued += pcm.len() as u64;
            stream.queue.extend(pcm);
        }
    }

    fn finish_stream(&self, handle: StreamHandle) {
        if let Some(stream) = self.state.lock().streams.get_mut(&handle.0) {
            stream.finished = true;
        }
    }

    fn is_active(&self, handle: StreamHandle) -> bool {
        self.state
            .lock()
            .streams
            .get(&handle.0)
            .is_some_and(|s| !s.finished || !s.queue.is_empty())
    }

    fn elapsed_ms(&self, handle: StreamHandle) -> u64 {
        self.state
            .lock()
            .streams
            .get(&handle.0)
            .map_or(0, |s| s.format.duration_ms(s.played))
    }

    fn set_paused(&self, handle: StreamHandle, paused: bool) {
        if let Some(stream) = self.state.lock().streams.get_mut(&handle.0) {
            stream.paused = paused;
        }
    }

    fn stop_stream(&self, handle: StreamHandle) {
        if self.state.lock().streams.remove(&handle.0).is_some() {
            tracing::debug!(stream = handle.0, "audio stream stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MONO8: PcmFormat = PcmFormat {
        sample_rate: 1000,
        channels: 1,
        bits: 8,
    };

    #[test]
    fn test_read_pads_with_silence() {
        let mixer = BufferedMixer::new();
        let h = mixer.play_stream(MONO8);
        mixer.queue_buffer(h, vec![1, 2, 3]);

        let mut out = [0u8; 5];
        assert_eq!(mixer.read(h, &mut out), 3);
        assert_eq!(out, [1, 2, 3, 0x80, 0x80]);
        assert_eq!(mixer.elapsed_ms(h), 5);
        assert!(mixer.is_active(h));
    }

    #[test]
    fn test_finished_stream_drains_then_goes_inactive() {
        let mixer = BufferedMixer::new();
        let h = mixer.play_stream(MONO8);
        mixer.queue_buffer(h, vec![9; 4]);
        mixer.finish_stream(h);
        assert!(mixer.is_active(h));

        let mut out = [0u8; 4];
        mixer.read(h, &mut out);
        assert!(!mixer.is_active(h));

        // Drained: the clock stops.
        mixer.read(h, &mut out);
        assert_eq!(mixer.elapsed_ms(h), 4);
    }

    #[test]
    fn test_paused_stream_does_not_advance() {
        let mixer = BufferedMixer::new();
        let h = mixer.play_stream(MONO8);
        mixer.queue_buffer(h, vec![1; 10]);
        mixer.set_paused(h, true);

        let mut out = [0u8; 4];
        assert_eq!(mixer.read(h, &mut out), 0);
        assert_eq!(mixer.elapsed_ms(h), 0);
        assert_eq!(mixer.queued_bytes(h), 10);
    }

    #[test]
    fn test_stop_forgets_stream() {
        let mixer = BufferedMixer::new();
        let h = mixer.play_stream(MONO8);
        mixer.stop_stream(h);
        assert!(!mixer.is_active(h));
        assert!(mixer.handles().is_empty());
    }

    #[test]
    fn test_duration() {
        let f = PcmFormat {
            sample_rate: 22050,
            channels: 2,
            bits: 16,
        };
        assert_eq!(f.frame_bytes(), 4);
        assert_eq!(f.duration_ms(88200), 1000);
    }
}
