//! CINE video track: tiles composited onto a persistent surface.

use std::sync::Arc;

use bytes::Buf;
use reelplay_codec::{decompress_framed, render_block, Palette, PixelFormat, Surface, TileRect};

use crate::error::{ContainerError, Result};
use crate::header::FrameRate;
use crate::track::{FrameCursor, Track, TrackKind, TrackStatus, VideoTrack};

/// Block tag bit marking an LZ77-compressed tile.
pub const LZ77_FLAG: u8 = 0x80;

/// Rectangle and tag preceding a tile's bytes.
pub const TILE_HEADER_SIZE: usize = 9;

/// Video track of a CINE file.
#[derive(Debug)]
pub struct CineVideoTrack {
    surface: Surface,
    palette: Option<Palette>,
    cursor: FrameCursor,
    keyframes: Arc<[bool]>,
    reversible: bool,
    scratch: Vec<u8>,
    status: TrackStatus,
}

impl CineVideoTrack {
    /// `palette` is the initial colour table of an indexed file, `None` for RGB.
    pub fn new(
        width: u32,
        height: u32,
        palette: Option<Palette>,
        rate: FrameRate,
        keyframes: Arc<[bool]>,
        reversible: bool,
        buffer_size: usize,
    ) -> Self {
        let format = if palette.is_some() {
            PixelFormat::Indexed8
        } else {
            PixelFormat::Rgb24
        };
        Self {
            surface: Surface::new(width, height, format),
            palette,
            cursor: FrameCursor::new(keyframes.len() as u32, rate),
            keyframes,
            reversible,
            scratch: vec![0; buffer_size],
            status: TrackStatus::default(),
        }
    }

    pub fn is_keyframe(&self, frame: u32) -> bool {
        self.keyframes.get(frame as usize).copied().unwrap_or(false)
    }

    /// Paint one video part.
    pub fn render_part(&mut self, frame: usize, part: &[u8]) -> Result<()> {
        if part.len() < TILE_HEADER_SIZE {
            return Err(ContainerError::invalid_frame(
                frame,
                format!("video part of {} bytes", part.len()),
            ));
        }

        let mut buf = part;
        let left = buf.get_i16_le() as i32;
        let top = buf.get_i16_le() as i32;
        let width = buf.get_u16_le() as u32;
        let height = buf.get_u16_le() as u32;
        let tag = buf.get_u8();
        let rect = TileRect::new(left, top, width, height);

        let consumed = if tag & LZ77_FLAG != 0 {
            let unpacked = decompress_framed(buf, &mut self.scratch)?;
            render_block(tag & !LZ77_FLAG, &mut self.surface, &self.scratch[..unpacked], rect)?
        } else {
            render_block(tag, &mut self.surface, buf, rect)?
        };
        tracing::trace!(frame, tag, ?rect, consumed, "tile");
        Ok(())
    }

    /// Apply a palette part body (`start u8, count u16`, triplets).
    pub fn apply_palette_part(&mut self, frame: usize, part: &[u8]) -> Result<()> {
        let Some(palette) = self.palette.as_mut() else {
            tracing::warn!(frame, "palette part in an RGB file ignored");
            return Ok(());
        };
        if part.len() < 3 {
            return Err(ContainerError::invalid_frame(frame, "truncated palette part"));
        }
        let mut buf = part;
        let start = buf.get_u8() as usize;
        let count = buf.get_u16_le() as usize;
        let triplets = buf
            .get(..count * 3)
            .ok_or_else(|| ContainerError::invalid_frame(frame, format!("palette part short of {count} entries")))?;
        palette.set_6bit_range(start, triplets);
        Ok(())
    }
}

impl Track for CineVideoTrack {
    fn kind(&self) -> TrackKind {
        TrackKind::Video
    }

    fn end_of_track(&self) -> bool {
        self.cursor.is_ended()
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

    fn can_seek(&self, time_ms: u64) -> bool {
        match self.cursor.frame_at_ms(time_ms) {
            Some(0) => true,
            Some(frame) => self.is_keyframe(frame),
            None => false,
        }
    }

    fn seek(&mut self, time_ms: u64) -> Result<()> {
        if let Some(frame) = self.cursor.frame_at_ms(time_ms) {
            self.cursor.seek_to_frame(frame);
        }
        Ok(())
    }
}

impl VideoTrack for CineVideoTrack {
    fn cursor(&self) -> &FrameCursor {
        &self.cursor
    }

    fn cursor_mut(&mut self) -> &mut FrameCursor {
        &mut self.cursor
    }

    fn surface(&self) -> &Surface {
        &self.surface
    }

    fn palette_mut(&mut self) -> Option<&mut Palette> {
        self.palette.as_mut()
    }

    fn supports_reverse(&self) -> bool {
        self.reversible
    }
}
