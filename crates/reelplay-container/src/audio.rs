//! Push-model audio track.

use std::collections::VecDeque;
use std::sync::Arc;

use reelplay_codec::dpcm::{self, DpcmLayout};

use crate::error::Result;
use crate::mixer::{Mixer, PcmFormat, StreamHandle};
use crate::track::{Track, TrackKind, TrackStatus};

/// How an audio chunk is stored in the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioEncoding {
    /// PCM as-is.
    Raw,
    /// Huffman-coded DPCM.
    Dpcm,
}

/// Audio track that forwards decoded PCM to a mixer stream.
///
/// Buffers arriving before the track is started are held and flushed when
/// the stream opens.
pub struct PcmAudioTrack {
    mixer: Arc<dyn Mixer>,
    format: PcmFormat,
    encoding: AudioEncoding,
    handle: Option<StreamHandle>,
    pending: VecDeque<Vec<u8>>,
    finished: bool,
    status: TrackStatus,
}

impl PcmAudioTrack {
    pub fn new(mixer: Arc<dyn Mixer>, format: PcmFormat, encoding: AudioEncoding) -> Self {
        Self {
            mixer,
            format,
            encoding,
            handle: None,
            pending: VecDeque::new(),
            finished: false,
            status: TrackStatus::default(),
        }
    }

    pub fn format(&self) -> PcmFormat {
        self.format
    }

    pub fn encoding(&self) -> AudioEncoding {
        self.encoding
    }

    /// Mixer stream, while the track is started.
    pub fn handle(&self) -> Option<StreamHandle> {
        self.handle
    }

    /// Buffers waiting for the track to start.
    pub fn pending_buffers(&self) -> usize {
        self.pending.len()
    }

    /// Decode a container chunk and queue the PCM.
    pub fn queue_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        let pcm = match self.encoding {
            AudioEncoding::Raw => chunk.to_vec(),
            AudioEncoding::Dpcm => dpcm::decode(
                chunk,
                DpcmLayout {
                    stereo: self.format.channels == 2,
                    sixteen_bit: self.format.bits == 16,
                },
            )?,
        };
        self.queue_pcm(pcm);
        Ok(())
    }

    /// Queue decoded PCM.
    pub fn queue_pcm(&mut self, pcm: Vec<u8>) {
        if pcm.is_empty() {
            return;
        }
        match self.handle {
            Some(handle) => self.mixer.queue_buffer(handle, pcm),
            None => self.pending.push_back(pcm),
        }
    }

    /// No more chunks will arrive.
    pub fn finish(&mut self) {
        self.finished = true;
        if let Some(handle) = self.handle {
            self.mixer.finish_stream(handle);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Play position reported by the mixer.
    pub fn elapsed_ms(&self) -> u64 {
        self.handle.map_or(0, |h| self.mixer.elapsed_ms(h))
    }

    /// Whether the mixer is currently playing this track.
    pub fn is_live(&self) -> bool {
        self.handle.is_some() && !self.end_of_track()
    }
}

impl Track for PcmAudioTrack {
    fn kind(&self) -> TrackKind {
        TrackKind::Audio
    }

    fn end_of_track(&self) -> bool {
        self.finished
            && self.pending.is_empty()
            && self.handle.map_or(true, |h| !self.mixer.is_active(h))
    }

    fn status(&self) -> TrackStatus {
        self.status
    }

    fn status_mut(&mut self) -> &mut TrackStatus {
        &mut self.status
    }

    fn is_seekable(&self) -> bool {
        true
    }

    fn seek(&mut self, _time_ms: u64) -> Result<()> {
        if let Some(handle) = self.handle.take() {
            self.mixer.stop_stream(handle);
        }
        self.pending.clear();
        self.finished = false;
        Ok(())
    }

    fn on_start(&mut self) {
        if self.handle.is_some() {
            return;
        }
        let handle = self.mixer.play_stream(self.format);
        for pcm in self.pending.drain(..) {
            self.mixer.queue_buffer(handle, pcm);
        }
        if self.finished {
            self.mixer.finish_stream(handle);
        }
        self.handle = Some(handle);
    }

    fn on_stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.mixer.stop_stream(handle);
        }
    }

    fn on_pause(&mut self, paused: bool) {
        if let Some(handle) = self.handle {
            self.mixer.set_paused(handle, paused);
        }
    }
}

impl std::fmt::Debug for PcmAudioTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PcmAudioTrack")
            .field("format", &self.format)
            .field("encoding", &self.encoding)
            .field("handle", &self.handle)
            .field("pending", &self.pending.len())
            .field("finished", &self.finished)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mixer::BufferedMixer;
    use crate::track::TrackState;

    const FORMAT: PcmFormat = PcmFormat {
        sample_rate: 8000,
        channels: 1,
        bits: 8,
    };

    #[test]
    fn test_buffers_held_until_start() {
        let mixer = Arc::new(BufferedMixer::new());
        let mut track = PcmAudioTrack::new(mixer.clone(), FORMAT, AudioEncoding::Raw);

        track.queue_chunk(&[1, 2, 3]).unwrap();
        track.queue_chunk(&[4]).unwrap();
        assert_eq!(track.pending_buffers(), 2);
        assert_eq!(track.state(), TrackState::Ready);

        track.start();
        let handle = track.handle().unwrap();
        assert_eq!(track.pending_buffers(), 0);
        assert_eq!(mixer.queued_bytes(handle), 4);
        assert_eq!(track.state(), TrackState::Playing);
    }

    #[test]
    fn test_end_requires_finish_and_drained_mixer() {
        let mixer = Arc::new(BufferedMixer::new());
        let mut track = PcmAudioTrack::new(mixer.clone(), FORMAT, AudioEncoding::Raw);
        track.start();
        track.queue_pcm(vec![0x80; 8]);
        assert!(!track.end_of_track());

        track.finish();
        assert!(!track.end_of_track(), "mixer still has data");

        let handle = track.handle().unwrap();
        let mut out = [0u8; 8];
        mixer.read(handle, &mut out);
        assert!(track.end_of_track());
        assert_eq!(track.state(), TrackState::Ended);
    }

    #[test]
    fn test_finished_before_start_with_pending_is_not_ended() {
        let mixer = Arc::new(BufferedMixer::new());
        let mut track = PcmAudioTrack::new(mixer, FORMAT, AudioEncoding::Raw);
        track.queue_pcm(vec![1]);
        track.finish();
        assert!(!track.end_of_track());
    }

    #[test]
    fn test_seek_drops_stream() {
        let mixer = Arc::new(BufferedMixer::new());
        let mut track = PcmAudioTrack::new(mixer.clone(), FORMAT, AudioEncoding::Raw);
        track.start();
        track.queue_pcm(vec![1; 4]);
        track.finish();

        assert!(track.can_seek(1234));
        track.seek(1234).unwrap();
        assert!(track.handle().is_none());
        assert!(!track.is_finished());
        assert!(mixer.handles().is_empty());
    }
}
