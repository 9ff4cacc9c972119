//! The decoder interface shared by both containers.

use std::io::{Read, Seek, SeekFrom};

use bytes::Buf;
use reelplay_codec::palette::PALETTE_BYTES;
use reelplay_codec::Surface;

use crate::error::{ContainerError, Result};
use crate::header::ContainerInfo;
use crate::session::Session;
use crate::track::VideoTrack;

/// Maximum bytes read for one frame record, guarding against corrupt sizes.
pub const MAX_FRAME_BYTES: u64 = 64 * 1024 * 1024;

/// Seekable byte source a container is read from.
pub trait MediaStream: Read + Seek + Send {}

impl<T: Read + Seek + Send> MediaStream for T {}

/// Read `len` bytes at `offset`.
pub(crate) fn read_at(stream: &mut dyn MediaStream, offset: u64, len: u64, what: &'static str) -> Result<Vec<u8>> {
    if len > MAX_FRAME_BYTES {
        return Err(ContainerError::BudgetExceeded {
            what,
            size: len as usize,
            limit: MAX_FRAME_BYTES as usize,
        });
    }
    stream.seek(SeekFrom::Start(offset))?;
    let mut data = vec![0u8; len as usize];
    stream.read_exact(&mut data)?;
    Ok(data)
}

/// Total stream length, leaving the position at the start.
pub(crate) fn stream_len(stream: &mut dyn MediaStream) -> Result<u64> {
    let len = stream.seek(SeekFrom::End(0))?;
    stream.seek(SeekFrom::Start(0))?;
    Ok(len)
}

/// Read a table of `count` little-endian `u32` values.
pub(crate) fn read_u32_table(stream: &mut dyn MediaStream, count: usize) -> Result<Vec<u32>> {
    let mut raw = vec![0u8; count * 4];
    stream.read_exact(&mut raw)?;
    let mut buf = &raw[..];
    Ok((0..count).map(|_| buf.get_u32_le()).collect())
}

/// A container format that can be loaded and played frame by frame.
///
/// Implementors supply loading, teardown and per-frame packet reading. Frame
/// scheduling, seeking and palette handling come from the [`Session`].
pub trait ContainerDecoder {
    type Video: VideoTrack;

    /// Parse the container header and set up its tracks.
    fn load(&mut self, stream: Box<dyn MediaStream>) -> Result<()>;

    /// Drop the stream and every track.
    fn close(&mut self);

    fn session(&self) -> &Session<Self::Video>;

    fn session_mut(&mut self) -> &mut Session<Self::Video>;

    /// Read and decode the next frame of video track `track`, routing any
    /// audio the frame carries to the audio tracks.
    fn read_next_packet(&mut self, track: usize) -> Result<()>;

    /// Header summary, while loaded.
    fn info(&self) -> Option<ContainerInfo>;

    fn is_loaded(&self) -> bool {
        self.session().is_loaded()
    }

    /// Decode the frame that is due next and return the surface it went to.
    ///
    /// Returns `Ok(None)` when no video track has a frame left. On error the
    /// decoder is closed before the error is returned.
    fn decode_next_frame(&mut self) -> Result<Option<&Surface>> {
        if !self.is_loaded() {
            return Err(ContainerError::NotLoaded);
        }
        let Some(track) = self.session().next_video_track() else {
            return Ok(None);
        };

        if let Err(err) = self.read_next_packet(track) {
            tracing::warn!(track, error = %err, "frame decode failed, closing");
            self.close();
            return Err(err);
        }

        self.session_mut().after_decode(track);
        Ok(self.session().video_tracks().get(track).map(|t| t.surface()))
    }

    /// Milliseconds until [`ContainerDecoder::decode_next_frame`] should be called.
    fn time_to_next_frame_ms(&self) -> u64 {
        self.session().time_to_next_frame_ms()
    }

    fn end_of_video(&self) -> bool {
        self.session().end_of_video()
    }

    /// Seek every track to `time_ms`. `Ok(false)` means nothing moved.
    fn seek(&mut self, time_ms: u64) -> Result<bool> {
        if !self.is_loaded() {
            return Err(ContainerError::NotLoaded);
        }
        self.session_mut().seek(time_ms)
    }

    fn rewind(&mut self) -> Result<bool> {
        self.seek(0)
    }

    /// Current palette and whether it changed since the last call.
    fn take_palette(&mut self) -> (&[u8; PALETTE_BYTES], bool) {
        self.session_mut().take_palette()
    }
}
