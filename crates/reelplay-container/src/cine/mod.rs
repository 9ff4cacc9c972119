//! CINE cinematic container.
//!
//! An 808-byte header with the initial palette, a frame table, and frames
//! made of length-prefixed parts (audio, video tile, palette range).

mod video;

use std::io::{Read, Seek, SeekFrom};
use std::sync::Arc;

use bytes::Buf;
use reelplay_codec::Palette;

use crate::audio::PcmAudioTrack;
use crate::context::PlaybackContext;
use crate::decoder::{stream_len, ContainerDecoder, MediaStream};
use crate::error::{ContainerError, Result};
use crate::header::{AudioDescriptor, AudioTrackInfo, ContainerInfo, FrameRate};
use crate::options::DecoderOptions;
use crate::session::Session;
use crate::track::VideoTrack;

pub use video::{CineVideoTrack, LZ77_FLAG, TILE_HEADER_SIZE};

/// Size of the fixed header.
pub const HEADER_SIZE: usize = 808;

/// Header flag: the surface holds packed RGB instead of palette indices.
pub const FLAG_RGB24: u32 = 0x01;
/// Header flag: frames may be played back to front.
pub const FLAG_REVERSIBLE: u32 = 0x02;

/// Bytes per frame-table entry.
pub const TABLE_ENTRY_SIZE: usize = 8;
/// Bytes before each part's body.
pub const PART_HEADER_SIZE: usize = 6;

/// Frame-table flag marking a keyframe.
pub const FRAME_KEYFRAME: u16 = 0x01;

/// Kind byte of a frame part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartKind {
    Audio,
    Video,
    Palette,
    Other(u8),
}

impl From<u8> for PartKind {
    fn from(kind: u8) -> Self {
        match kind {
            1 => Self::Audio,
            2 => Self::Video,
            3 => Self::Palette,
            other => Self::Other(other),
        }
    }
}

/// Parsed fixed header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CineHeader {
    pub width: u32,
    pub height: u32,
    pub frames: u32,
    pub frame_delay: i32,
    pub audio: AudioDescriptor,
    pub flags: u32,
    pub video_buffer_size: u32,
    /// 256 6-bit triplets.
    pub palette: Vec<u8>,
    pub table_offset: u32,
}

impl CineHeader {
    pub fn parse(bytes: &[u8; HEADER_SIZE]) -> Result<Self> {
        if &bytes[..4] != b"CINE" {
            return Err(ContainerError::invalid_header(format!(
                "bad signature {:02x?}",
                &bytes[..4]
            )));
        }

        let mut buf = &bytes[4..];
        let width = buf.get_u32_le();
        let height = buf.get_u32_le();
        let frames = buf.get_u32_le();
        let frame_delay = buf.get_i32_le();
        let audio = AudioDescriptor(buf.get_u32_le());
        let flags = buf.get_u32_le();
        let video_buffer_size = buf.get_u32_le();
        let palette = buf[..768].to_vec();
        buf.advance(768);
        let table_offset = buf.get_u32_le();

        if width == 0 || height == 0 || width > u16::MAX as u32 || height > u16::MAX as u32 {
            return Err(ContainerError::invalid_header(format!("bad frame size {width}x{height}")));
        }
        if frames == 0 {
            return Err(ContainerError::invalid_header("no frames"));
        }
        if video_buffer_size == 0 {
            return Err(ContainerError::invalid_header("zero video buffer size"));
        }

        Ok(Self {
            width,
            height,
            frames,
            frame_delay,
            audio,
            flags,
            video_buffer_size,
            palette,
            table_offset,
        })
    }

    pub fn frame_rate(&self) -> FrameRate {
        FrameRate::from_delay(self.frame_delay)
    }

    pub fn is_rgb(&self) -> bool {
        self.flags & FLAG_RGB24 != 0
    }

    pub fn is_reversible(&self) -> bool {
        self.flags & FLAG_REVERSIBLE != 0
    }
}

/// One frame-table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameEntry {
    pub offset: u32,
    pub parts: u16,
    pub flags: u16,
}

impl FrameEntry {
    pub fn is_keyframe(&self) -> bool {
        self.flags & FRAME_KEYFRAME != 0
    }
}

/// Decoder for CINE files.
pub struct CineDecoder {
    options: DecoderOptions,
    session: Session<CineVideoTrack>,
    stream: Option<Box<dyn MediaStream>>,
    header: Option<CineHeader>,
    frames: Vec<FrameEntry>,
    audio: Option<usize>,
}

impl CineDecoder {
    pub fn new(context: PlaybackContext, options: DecoderOptions) -> Self {
        Self {
            options,
            session: Session::new(context),
            stream: None,
            header: None,
            frames: Vec::new(),
            audio: None,
        }
    }

    pub fn header(&self) -> Option<&CineHeader> {
        self.header.as_ref()
    }

    pub fn frame_table(&self) -> &[FrameEntry] {
        &self.frames
    }

    /// Largest part body accepted.
    fn part_limit(&self) -> usize {
        self.options.part_limit()
    }

    fn parse(stream: &mut dyn MediaStream) -> Result<(CineHeader, Vec<FrameEntry>)> {
        let file_len = stream_len(stream)?;
        let mut raw = [0u8; HEADER_SIZE];
        stream.read_exact(&mut raw)?;
        let header = CineHeader::parse(&raw)?;

        let table_len = header.frames as u64 * TABLE_ENTRY_SIZE as u64;
        if header.table_offset as u64 + table_len > file_len {
            return Err(ContainerError::invalid_header(format!(
                "frame table at {} with {} entries does not fit in {file_len} bytes",
                header.table_offset, header.frames
            )));
        }

        stream.seek(SeekFrom::Start(header.table_offset as u64))?;
        let mut table = vec![0u8; table_len as usize];
        stream.read_exact(&mut table)?;
        let mut buf = &table[..];
        let frames = (0..header.frames)
            .map(|_| FrameEntry {
                offset: buf.get_u32_le(),
                parts: buf.get_u16_le(),
                flags: buf.get_u16_le(),
            })
            .collect();

        Ok((header, frames))
    }
}

impl std::fmt::Debug for CineDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CineDecoder")
            .field("options", &self.options)
            .field("frames", &self.frames.len())
            .field("audio", &self.audio)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl ContainerDecoder for CineDecoder {
    type Video = CineVideoTrack;

    fn load(&mut self, mut stream: Box<dyn MediaStream>) -> Result<()> {
        self.close();

        let (header, frames) = Self::parse(stream.as_mut())?;
        let encoding = header.audio.encoding()?;

        let keyframes: Arc<[bool]> = frames.iter().map(FrameEntry::is_keyframe).collect();
        let palette = (!header.is_rgb()).then(|| Palette::from_6bit(&header.palette));
        let reversible = header.is_reversible() && encoding.is_none();
        let video = CineVideoTrack::new(
            header.width,
            header.height,
            palette,
            header.frame_rate(),
            keyframes,
            reversible,
            header.video_buffer_size as usize,
        );
        self.session.add_video_track(video);

        match encoding {
            Some(encoding) if self.options.audio_enabled => {
                let track = PcmAudioTrack::new(
                    self.session.context().mixer.clone(),
                    header.audio.pcm_format(),
                    encoding,
                );
                self.audio = Some(self.session.add_audio_track(track));
            }
            Some(_) => tracing::debug!("audio disabled, skipping track"),
            None => {}
        }

        tracing::debug!(
            width = header.width,
            height = header.height,
            frames = header.frames,
            flags = header.flags,
            buffer = header.video_buffer_size,
            "CINE header"
        );

        self.header = Some(header);
        self.frames = frames;
        self.stream = Some(stream);
        self.session.set_loaded(true);
        Ok(())
    }

    fn close(&mut self) {
        self.session.close();
        self.stream = None;
        self.header = None;
        self.frames.clear();
        self.audio = None;
    }

    fn session(&self) -> &Session<CineVideoTrack> {
        &self.session
    }

    fn session_mut(&mut self) -> &mut Session<CineVideoTrack> {
        &mut self.session
    }

    fn read_next_packet(&mut self, track: usize) -> Result<()> {
        let (next, count, reversed) = {
            let video = self.session.video_tracks().get(track).ok_or(ContainerError::NotLoaded)?;
            let cursor = video.cursor();
            (cursor.next_index(), cursor.count(), cursor.is_reversed())
        };
        if next < 0 || next >= count as i64 {
            return Err(ContainerError::invalid_frame(next.max(0) as usize, "past the last frame"));
        }
        let frame = next as usize;
        let entry = self.frames[frame];
        let limit = self.part_limit();

        let stream = self.stream.as_mut().ok_or(ContainerError::NotLoaded)?;
        stream.seek(SeekFrom::Start(entry.offset as u64))?;
        tracing::debug!(frame, parts = entry.parts, offset = entry.offset, "CINE frame");

        for _ in 0..entry.parts {
            let mut head = [0u8; PART_HEADER_SIZE];
            stream.read_exact(&mut head)?;
            let mut buf = &head[..];
            let kind = PartKind::from(buf.get_u8());
            buf.advance(1);
            let size = buf.get_u32_le() as usize;
            if size > limit {
                return Err(ContainerError::BudgetExceeded {
                    what: "frame part",
                    size,
                    limit,
                });
            }

            let mut body = vec![0u8; size];
            stream.read_exact(&mut body)?;

            match kind {
                PartKind::Audio => {
                    if let Some(audio) = self.audio.and_then(|i| self.session.audio_track_mut(i)) {
                        audio.queue_chunk(&body)?;
                    }
                }
                PartKind::Video => {
                    if let Some(video) = self.session.video_track_mut(track) {
                        video.render_part(frame, &body)?;
                    }
                }
                PartKind::Palette => {
                    if let Some(video) = self.session.video_track_mut(track) {
                        video.apply_palette_part(frame, &body)?;
                    }
                }
                PartKind::Other(kind) => {
                    tracing::debug!(frame, kind, size, "skipping unknown part");
                }
            }
        }

        if let Some(video) = self.session.video_track_mut(track) {
            video.cursor_mut().advance();
        }
        if !reversed && frame + 1 == count as usize {
            if let Some(audio) = self.audio.and_then(|i| self.session.audio_track_mut(i)) {
                audio.finish();
            }
        }
        Ok(())
    }

    fn info(&self) -> Option<ContainerInfo> {
        let header = self.header.as_ref()?;
        let video = self.session.video_tracks().first()?;
        let audio_tracks = if header.audio.is_present() {
            vec![AudioTrackInfo::from_descriptor(0, header.audio)]
        } else {
            Vec::new()
        };

        Some(ContainerInfo {
            format: "CINE",
            width: header.width,
            height: header.height,
            frame_count: header.frames,
            frame_rate: header.frame_rate(),
            duration_ms: video.cursor().duration_ms(),
            keyframes: self.frames.iter().filter(|f| f.is_keyframe()).count(),
            audio_tracks,
            reversible: video.supports_reverse(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use reelplay_codec::{CodecError, Lz77Variant, PixelFormat, TileRect};

    use super::*;
    use crate::clock::PlaybackRate;
    use crate::context::ManualTimeSource;
    use crate::mixer::BufferedMixer;
    use crate::testkit::{audio_descriptor, pcm_ramp, CineBuilder, CineFrame, CinePart};

    fn load_with(bytes: Vec<u8>, options: DecoderOptions) -> Result<(CineDecoder, Arc<BufferedMixer>)> {
        let mixer = Arc::new(BufferedMixer::new());
        let context = PlaybackContext::new(mixer.clone(), Arc::new(ManualTimeSource::new(0)));
        let mut decoder = CineDecoder::new(context, options);
        decoder.load(Box::new(Cursor::new(bytes)))?;
        Ok((decoder, mixer))
    }

    fn load(bytes: Vec<u8>) -> Result<CineDecoder> {
        load_with(bytes, DecoderOptions::default()).map(|(decoder, _)| decoder)
    }

    fn full(width: u32, height: u32, value: u8) -> CinePart {
        CinePart::whole(TileRect::new(0, 0, width, height), vec![value; (width * height) as usize])
    }

    #[test]
    fn test_tiles_and_compression() {
        let pattern: Vec<u8> = (0..64).map(|i| (i / 3) as u8).collect();
        let bytes = CineBuilder::new(8, 8)
            .frame(CineFrame::new(vec![full(8, 8, 1)]).keyframe())
            .frame(CineFrame::new(vec![CinePart::compressed(
                TileRect::new(0, 0, 8, 8),
                2,
                pattern.clone(),
                Lz77Variant::Extended,
            )]))
            .frame(CineFrame::new(vec![CinePart::whole(TileRect::new(6, 6, 4, 4), vec![9; 16])]))
            .build();
        let mut decoder = load(bytes).unwrap();

        let surface = decoder.decode_next_frame().unwrap().unwrap();
        assert!(surface.pixels().iter().all(|&p| p == 1));

        let surface = decoder.decode_next_frame().unwrap().unwrap();
        assert_eq!(surface.pixels(), &pattern[..]);

        // Clipped tile: only the 2x2 corner lands.
        let surface = decoder.decode_next_frame().unwrap().unwrap();
        assert_eq!(&surface.row(5)[6..], &pattern[46..48]);
        assert_eq!(&surface.row(6)[6..], &[9, 9]);
        assert_eq!(&surface.row(7)[6..], &[9, 9]);
        assert!(decoder.decode_next_frame().unwrap().is_none());
    }

    #[test]
    fn test_initial_and_part_palettes() {
        let mut initial = vec![0u8; 768];
        initial[3..6].copy_from_slice(&[63, 32, 0]);
        let bytes = CineBuilder::new(4, 4)
            .palette(initial)
            .frame(CineFrame::new(vec![full(4, 4, 1)]))
            .frame(CineFrame::new(vec![
                CinePart::Palette {
                    start: 255,
                    triplets: vec![1, 1, 1, 2, 2, 2],
                },
                full(4, 4, 2),
            ]))
            .build();
        let mut decoder = load(bytes).unwrap();

        decoder.decode_next_frame().unwrap();
        let (colors, dirty) = decoder.take_palette();
        assert!(dirty);
        assert_eq!(&colors[3..6], &[0xFF, 0x82, 0]);

        decoder.decode_next_frame().unwrap();
        let (colors, dirty) = decoder.take_palette();
        assert!(dirty);
        assert_eq!(&colors[765..], &[4, 4, 4], "entries past 255 dropped");
    }

    #[test]
    fn test_rgb_surface() {
        let bytes = CineBuilder::new(2, 2)
            .flags(FLAG_RGB24)
            .frame(CineFrame::new(vec![CinePart::whole(
                TileRect::new(0, 0, 2, 2),
                (0..12).collect(),
            )]))
            .build();
        let mut decoder = load(bytes).unwrap();
        let surface = decoder.decode_next_frame().unwrap().unwrap();
        assert_eq!(surface.format(), PixelFormat::Rgb24);
        assert_eq!(surface.pixels(), &(0..12).collect::<Vec<u8>>()[..]);
    }

    #[test]
    fn test_audio_parts() {
        let pcm = pcm_ramp(300, 0x70);
        let bytes = CineBuilder::new(4, 4)
            .audio(audio_descriptor(11025, false, false, true))
            .frame(CineFrame::new(vec![CinePart::Audio(pcm[..150].to_vec()), full(4, 4, 0)]))
            .frame(CineFrame::new(vec![full(4, 4, 1), CinePart::Audio(pcm[150..].to_vec())]))
            .flags(FLAG_REVERSIBLE)
            .build();
        let (mut decoder, mixer) = load_with(bytes, DecoderOptions::default()).unwrap();
        assert!(!decoder.info().unwrap().reversible, "audio forbids reverse");

        decoder.session_mut().start();
        decoder.decode_next_frame().unwrap();
        decoder.decode_next_frame().unwrap();

        let track = &decoder.session().audio_tracks()[0];
        assert!(track.is_finished());
        assert_eq!(mixer.drain(track.handle().unwrap()), pcm);
    }

    #[test]
    fn test_unknown_parts_skipped() {
        let bytes = CineBuilder::new(4, 4)
            .frame(CineFrame::new(vec![
                CinePart::Raw {
                    kind: 42,
                    body: vec![0xAA; 10],
                },
                full(4, 4, 7),
            ]))
            .build();
        let mut decoder = load(bytes).unwrap();
        let surface = decoder.decode_next_frame().unwrap().unwrap();
        assert!(surface.pixels().iter().all(|&p| p == 7));
    }

    #[test]
    fn test_part_limit() {
        let bytes = CineBuilder::new(8, 8)
            .frame(CineFrame::new(vec![full(8, 8, 1)]))
            .build();
        let options = DecoderOptions {
            max_part_size: 16,
            ..Default::default()
        };
        let (mut decoder, _) = load_with(bytes, options).unwrap();
        assert!(matches!(
            decoder.decode_next_frame(),
            Err(ContainerError::BudgetExceeded { what: "frame part", .. })
        ));
        assert!(!decoder.is_loaded());
    }

    #[test]
    fn test_parts_larger_than_video_buffer() {
        // uncompressed tiles and audio are not staged in the video buffer
        let pcm = pcm_ramp(200, 0x10);
        let bytes = CineBuilder::new(8, 8)
            .video_buffer_size(16)
            .audio(audio_descriptor(11025, false, false, false))
            .frame(CineFrame::new(vec![CinePart::Audio(pcm.clone()), full(8, 8, 5)]))
            .build();
        let (mut decoder, mixer) = load_with(bytes, DecoderOptions::default()).unwrap();

        decoder.session_mut().start();
        decoder.decode_next_frame().unwrap().unwrap();
        let surface = decoder.session().video_tracks()[0].surface();
        assert!(surface.pixels().iter().all(|&p| p == 5));

        let track = &decoder.session().audio_tracks()[0];
        assert_eq!(mixer.drain(track.handle().unwrap()), pcm);
    }

    #[test]
    fn test_lz77_capacity_refusal() {
        let bytes = CineBuilder::new(8, 8)
            .video_buffer_size(100)
            .frame(CineFrame::new(vec![CinePart::compressed(
                TileRect::new(0, 0, 8, 8),
                2,
                vec![3; 200],
                Lz77Variant::Legacy,
            )]))
            .build();
        let mut decoder = load(bytes).unwrap();
        assert!(matches!(
            decoder.decode_next_frame(),
            Err(ContainerError::Codec(CodecError::DestinationTooSmall { need: 200, have: 100 }))
        ));
    }

    #[test]
    fn test_reverse_playback() {
        let mut builder = CineBuilder::new(4, 4).flags(FLAG_REVERSIBLE);
        for i in 0..3 {
            builder = builder.frame(CineFrame::new(vec![full(4, 4, i)]).keyframe());
        }
        let mut decoder = load(builder.build()).unwrap();
        assert!(decoder.info().unwrap().reversible);

        assert!(decoder.session_mut().set_rate(PlaybackRate::Reverse));
        for expected in [2u8, 1, 0] {
            let surface = decoder.decode_next_frame().unwrap().unwrap();
            assert_eq!(surface.pixels()[0], expected);
        }
        assert!(decoder.decode_next_frame().unwrap().is_none());
    }

    #[test]
    fn test_seek_to_keyframe() {
        let bytes = CineBuilder::new(4, 4)
            .frame(CineFrame::new(vec![full(4, 4, 0)]).keyframe())
            .frame(CineFrame::new(vec![full(4, 4, 1)]))
            .frame(CineFrame::new(vec![full(4, 4, 2)]).keyframe())
            .build();
        let mut decoder = load(bytes).unwrap();
        assert_eq!(decoder.frame_table().len(), 3);
        assert_eq!(decoder.info().unwrap().keyframes, 2);

        assert!(!decoder.seek(150).unwrap());
        assert!(decoder.seek(250).unwrap());
        let surface = decoder.decode_next_frame().unwrap().unwrap();
        assert_eq!(surface.pixels()[0], 2);
    }

    #[test]
    fn test_seek_past_the_end() {
        let bytes = CineBuilder::new(4, 4)
            .delay(-1)
            .frame(CineFrame::new(vec![full(4, 4, 0)]).keyframe())
            .frame(CineFrame::new(vec![full(4, 4, 1)]).keyframe())
            .build();
        let mut decoder = load(bytes).unwrap();
        assert!(!decoder.seek(u64::MAX / 1000).unwrap());
        assert!(!decoder.seek(u64::MAX).unwrap());
        assert!(decoder.seek(0).unwrap());
        let surface = decoder.decode_next_frame().unwrap().unwrap();
        assert_eq!(surface.pixels()[0], 0);
    }

    #[test]
    fn test_bad_header() {
        let mut bytes = CineBuilder::new(4, 4)
            .frame(CineFrame::new(vec![full(4, 4, 0)]))
            .build();
        bytes[0] = b'X';
        assert!(matches!(load(bytes), Err(ContainerError::InvalidHeader(_))));

        let bytes = CineBuilder::new(4, 4)
            .frame(CineFrame::new(vec![full(4, 4, 0)]))
            .build();
        assert!(matches!(
            load(bytes[..HEADER_SIZE].to_vec()),
            Err(ContainerError::InvalidHeader(_))
        ));
    }
}
