//! SMK animation container.
//!
//! A 104-byte header, per-frame size and type tables, four Huffman trees and
//! then the frame records. Each frame record holds an optional palette
//! delta, up to seven audio chunks and a block-coded video bitstream.

mod video;

use std::io::Read;
use std::sync::Arc;

use bytes::Buf;

use crate::audio::PcmAudioTrack;
use crate::context::PlaybackContext;
use crate::decoder::{read_at, read_u32_table, stream_len, ContainerDecoder, MediaStream};
use crate::error::{ContainerError, Result};
use crate::header::{AudioDescriptor, AudioTrackInfo, ContainerInfo, FrameRate};
use crate::options::DecoderOptions;
use crate::session::Session;
use crate::track::VideoTrack;

pub use video::{SmkVersion, SmkVideoTrack, VideoTrees, FLAG_RING_FRAME, FLAG_Y_DOUBLE, FLAG_Y_INTERLACE};

/// Size of the fixed header.
pub const HEADER_SIZE: usize = 104;

/// Number of audio slots in the header.
pub const AUDIO_TRACKS: usize = 7;

/// Frame type bit announcing a palette chunk.
pub const FRAME_PALETTE: u8 = 0x01;

/// Frame size bit marking a keyframe.
pub const FRAME_KEYFRAME: u32 = 0x01;

/// Largest tree block accepted.
const MAX_TREES_SIZE: u32 = 16 * 1024 * 1024;

/// Parsed fixed header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmkHeader {
    pub version: SmkVersion,
    pub width: u32,
    pub height: u32,
    pub frames: u32,
    pub frame_delay: i32,
    pub flags: u32,
    pub audio_sizes: [u32; AUDIO_TRACKS],
    pub trees_size: u32,
    /// Allocation sizes in bytes: MMap, MClr, Full, Type.
    pub tree_alloc: [u32; 4],
    pub audio: [AudioDescriptor; AUDIO_TRACKS],
}

impl SmkHeader {
    /// Parse the fixed header.
    pub fn parse(bytes: &[u8; HEADER_SIZE]) -> Result<Self> {
        let version = match &bytes[..4] {
            b"SMK2" => SmkVersion::Smk2,
            b"SMK4" => SmkVersion::Smk4,
            other => {
                return Err(ContainerError::invalid_header(format!("bad signature {other:02x?}")));
            }
        };

        let mut buf = &bytes[4..];
        let width = buf.get_u32_le();
        let height = buf.get_u32_le();
        let frames = buf.get_u32_le();
        let frame_delay = buf.get_i32_le();
        let flags = buf.get_u32_le();
        let audio_sizes = std::array::from_fn(|_| buf.get_u32_le());
        let trees_size = buf.get_u32_le();
        let tree_alloc = std::array::from_fn(|_| buf.get_u32_le());
        let audio = std::array::from_fn(|_| AudioDescriptor(buf.get_u32_le()));

        if width == 0 || height == 0 {
            return Err(ContainerError::invalid_header(format!("empty frame {width}x{height}")));
        }
        if frames == 0 {
            return Err(ContainerError::invalid_header("no frames"));
        }
        if trees_size > MAX_TREES_SIZE {
            return Err(ContainerError::BudgetExceeded {
                what: "tree block",
                size: trees_size as usize,
                limit: MAX_TREES_SIZE as usize,
            });
        }

        Ok(Self {
            version,
            width,
            height,
            frames,
            frame_delay,
            flags,
            audio_sizes,
            trees_size,
            tree_alloc,
            audio,
        })
    }

    /// Frame-table entries, including the ring frame.
    pub fn table_len(&self) -> usize {
        self.frames as usize + (self.flags & FLAG_RING_FRAME) as usize
    }

    pub fn frame_rate(&self) -> FrameRate {
        FrameRate::from_delay(self.frame_delay)
    }
}

fn overflow(frame: usize, need: usize, size: usize) -> ContainerError {
    ContainerError::FrameOverflow { frame, need, size }
}

#[derive(Debug, Clone, Copy)]
struct FrameEntry {
    offset: u64,
    size: u32,
    frame_type: u8,
}

/// Decoder for SMK2/SMK4 files.
pub struct SmkDecoder {
    options: DecoderOptions,
    session: Session<SmkVideoTrack>,
    stream: Option<Box<dyn MediaStream>>,
    header: Option<SmkHeader>,
    frames: Vec<FrameEntry>,
    keyframes: usize,
    /// Session audio track per header slot.
    audio_map: [Option<usize>; AUDIO_TRACKS],
}

impl SmkDecoder {
    pub fn new(context: PlaybackContext, options: DecoderOptions) -> Self {
        Self {
            options,
            session: Session::new(context),
            stream: None,
            header: None,
            frames: Vec::new(),
            keyframes: 0,
            audio_map: [None; AUDIO_TRACKS],
        }
    }

    pub fn header(&self) -> Option<&SmkHeader> {
        self.header.as_ref()
    }

    fn parse(&mut self, stream: &mut dyn MediaStream) -> Result<(SmkHeader, SmkVideoTrack)> {
        let file_len = stream_len(stream)?;
        let mut raw = [0u8; HEADER_SIZE];
        stream.read_exact(&mut raw)?;
        let header = SmkHeader::parse(&raw)?;

        let n = header.table_len();
        let tables = n as u64 * 5 + header.trees_size as u64;
        if HEADER_SIZE as u64 + tables > file_len {
            return Err(ContainerError::invalid_header(format!(
                "{n} frame entries and {} tree bytes do not fit in {file_len} bytes",
                header.trees_size
            )));
        }

        let sizes = read_u32_table(stream, n)?;
        let mut types = vec![0u8; n];
        stream.read_exact(&mut types)?;
        let mut trees_raw = vec![0u8; header.trees_size as usize];
        stream.read_exact(&mut trees_raw)?;

        let capacities = header
            .tree_alloc
            .map(|bytes| (bytes as usize / 4).min(self.options.max_tree_nodes));
        let trees = VideoTrees::read(&trees_raw, capacities)?;

        let mut offset = HEADER_SIZE as u64 + tables;
        self.frames = sizes
            .iter()
            .zip(&types)
            .map(|(&raw_size, &frame_type)| {
                let entry = FrameEntry {
                    offset,
                    size: raw_size & !3,
                    frame_type,
                };
                offset += entry.size as u64;
                entry
            })
            .collect();

        let keyframes: Arc<[bool]> = sizes
            .iter()
            .take(header.frames as usize)
            .map(|&raw_size| raw_size & FRAME_KEYFRAME != 0)
            .collect();
        self.keyframes = keyframes.iter().filter(|&&k| k).count();

        tracing::debug!(
            version = header.version.signature(),
            width = header.width,
            height = header.height,
            frames = header.frames,
            flags = header.flags,
            keyframes = self.keyframes,
            "SMK header"
        );

        let video = SmkVideoTrack::new(
            header.version,
            header.width,
            header.height,
            header.flags,
            header.frame_rate(),
            keyframes,
            trees,
        );
        Ok((header, video))
    }

    fn add_audio_tracks(&mut self, header: &SmkHeader) -> Result<()> {
        for (slot, descriptor) in header.audio.iter().enumerate() {
            let Some(encoding) = descriptor.encoding()? else {
                continue;
            };
            if !self.options.audio_enabled {
                tracing::debug!(slot, "audio disabled, skipping track");
                continue;
            }
            let track = PcmAudioTrack::new(self.session.context().mixer.clone(), descriptor.pcm_format(), encoding);
            self.audio_map[slot] = Some(self.session.add_audio_track(track));
        }
        Ok(())
    }

    /// Split and dispatch the chunks of `frame`.
    fn decode_record(&mut self, track: usize, frame: usize, data: &[u8]) -> Result<()> {
        let entry = self.frames[frame];
        let mut pos = 0usize;

        if entry.frame_type & FRAME_PALETTE != 0 {
            let Some(&units) = data.first() else {
                return Err(ContainerError::FrameOverflow {
                    frame,
                    need: 1,
                    size: data.len(),
                });
            };
            let len = units as usize * 4;
            if len == 0 {
                return Err(ContainerError::invalid_frame(frame, "zero-length palette chunk"));
            }
            let body = data
                .get(1..len)
                .ok_or_else(|| overflow(frame, len, data.len()))?;
            if let Some(video) = self.session.video_track_mut(track) {
                video.apply_palette_delta(body);
            }
            pos = len;
        }

        for slot in 0..AUDIO_TRACKS {
            if entry.frame_type & (2 << slot) == 0 {
                continue;
            }
            let head = data
                .get(pos..pos + 4)
                .ok_or_else(|| overflow(frame, pos + 4, data.len()))?;
            let chunk_len = u32::from_le_bytes([head[0], head[1], head[2], head[3]]) as usize;
            if chunk_len < 4 {
                return Err(ContainerError::invalid_frame(frame, format!("audio chunk of {chunk_len} bytes")));
            }
            let end = pos + chunk_len;
            let chunk = data
                .get(pos + 4..end)
                .ok_or_else(|| overflow(frame, end, data.len()))?;

            if let Some(index) = self.audio_map[slot] {
                if let Some(audio) = self.session.audio_track_mut(index) {
                    audio.queue_chunk(chunk)?;
                }
            }
            pos = end;
        }

        if let Some(video) = self.session.video_track_mut(track) {
            video.decode_frame(&data[pos..]);
        }
        Ok(())
    }
}

impl std::fmt::Debug for SmkDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmkDecoder")
            .field("options", &self.options)
            .field("header", &self.header)
            .field("frames", &self.frames.len())
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl ContainerDecoder for SmkDecoder {
    type Video = SmkVideoTrack;

    fn load(&mut self, mut stream: Box<dyn MediaStream>) -> Result<()> {
        self.close();

        let (header, video) = self.parse(stream.as_mut())?;
        self.session.add_video_track(video);
        if let Err(err) = self.add_audio_tracks(&header) {
            self.close();
            return Err(err);
        }

        self.header = Some(header);
        self.stream = Some(stream);
        self.session.set_loaded(true);
        Ok(())
    }

    fn close(&mut self) {
        self.session.close();
        self.stream = None;
        self.header = None;
        self.frames.clear();
        self.keyframes = 0;
        self.audio_map = [None; AUDIO_TRACKS];
    }

    fn session(&self) -> &Session<SmkVideoTrack> {
        &self.session
    }

    fn session_mut(&mut self) -> &mut Session<SmkVideoTrack> {
        &mut self.session
    }

    fn read_next_packet(&mut self, track: usize) -> Result<()> {
        let (next, count) = {
            let video = self.session.video_tracks().get(track).ok_or(ContainerError::NotLoaded)?;
            (video.cursor().next_index(), video.cursor().count())
        };
        if next < 0 || next >= count as i64 {
            return Err(ContainerError::invalid_frame(next.max(0) as usize, "past the last frame"));
        }
        let frame = next as usize;

        let entry = self.frames[frame];
        let stream = self.stream.as_mut().ok_or(ContainerError::NotLoaded)?;
        let data = read_at(stream.as_mut(), entry.offset, entry.size as u64, "frame record")?;

        tracing::debug!(frame, size = entry.size, frame_type = entry.frame_type, "SMK frame");
        self.decode_record(track, frame, &data)?;

        if let Some(video) = self.session.video_track_mut(track) {
            video.cursor_mut().advance();
        }
        if frame + 1 == count as usize {
            let tracks = self.session.audio_tracks().len();
            for index in 0..tracks {
                if let Some(audio) = self.session.audio_track_mut(index) {
                    audio.finish();
                }
            }
        }
        Ok(())
    }

    fn info(&self) -> Option<ContainerInfo> {
        let header = self.header.as_ref()?;
        let video = self.session.video_tracks().first()?;
        let audio_tracks = header
            .audio
            .iter()
            .enumerate()
            .filter(|(_, d)| d.is_present())
            .map(|(slot, &d)| AudioTrackInfo::from_descriptor(slot, d))
            .collect();

        Some(ContainerInfo {
            format: header.version.signature(),
            width: header.width,
            height: video.height(),
            frame_count: header.frames,
            frame_rate: header.frame_rate(),
            duration_ms: video.cursor().duration_ms(),
            keyframes: self.keyframes,
            audio_tracks,
            reversible: false,
        })
    }
}
