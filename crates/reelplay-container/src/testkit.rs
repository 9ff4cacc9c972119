//! Builders that synthesise SMK and CINE files for tests and benchmarks.
//!
//! The builders produce well-formed files from plain pixel and PCM data.
//! They panic on inputs they cannot encode.

use std::collections::BTreeSet;

use bytes::BufMut;
use reelplay_codec::dpcm::DpcmLayout;
use reelplay_codec::testkit::{encode_dpcm, lz77_compress, write_word_tree, BitWriter, WordEncoder, WordTreeSpec};
use reelplay_codec::{Lz77Variant, TileRect};

use crate::cine;
use crate::header::AudioDescriptor;
use crate::smk::{self, SmkVersion};

/// Largest run a builder emits in one type word.
const MAX_RUN: usize = 59;

fn audio_payload(descriptor: AudioDescriptor, pcm: &[u8]) -> Vec<u8> {
    if descriptor.is_compressed() {
        encode_dpcm(
            pcm,
            DpcmLayout {
                stereo: descriptor.is_stereo(),
                sixteen_bit: descriptor.is_16bit(),
            },
        )
    } else {
        pcm.to_vec()
    }
}

/// Descriptor for a present track.
pub fn audio_descriptor(sample_rate: u32, stereo: bool, sixteen_bit: bool, compressed: bool) -> AudioDescriptor {
    let mut bits = AudioDescriptor::PRESENT | (sample_rate & 0x00FF_FFFF);
    if stereo {
        bits |= AudioDescriptor::STEREO;
    }
    if sixteen_bit {
        bits |= AudioDescriptor::SIXTEEN_BIT;
    }
    if compressed {
        bits |= AudioDescriptor::COMPRESSED;
    }
    AudioDescriptor(bits)
}

/// One SMK frame: coded pixels plus optional palette and audio.
#[derive(Debug, Clone, Default)]
pub struct SmkFrame {
    pub pixels: Vec<u8>,
    /// 256 6-bit triplets, written as a literal palette chunk.
    pub palette: Option<Vec<u8>>,
    /// PCM per audio slot.
    pub audio: Vec<(usize, Vec<u8>)>,
    pub keyframe: bool,
}

impl SmkFrame {
    pub fn new(pixels: Vec<u8>) -> Self {
        Self {
            pixels,
            ..Default::default()
        }
    }

    pub fn with_palette(mut self, palette: Vec<u8>) -> Self {
        assert_eq!(palette.len(), 768, "palette must hold 256 triplets");
        self.palette = Some(palette);
        self
    }

    pub fn with_audio(mut self, slot: usize, pcm: Vec<u8>) -> Self {
        self.audio.push((slot, pcm));
        self
    }

    pub fn keyframe(mut self) -> Self {
        self.keyframe = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockOp {
    Skip,
    Fill(u8),
    Mono { colors: u16, map: u16 },
    Full([u16; 8]),
}

impl BlockOp {
    fn kind(self) -> u16 {
        match self {
            Self::Mono { .. } => 0,
            Self::Full(_) => 1,
            Self::Skip => 2,
            Self::Fill(_) => 3,
        }
    }

    /// Ops that may share one type word.
    fn same_run(self, other: Self) -> bool {
        match (self, other) {
            (Self::Fill(a), Self::Fill(b)) => a == b,
            _ => self.kind() == other.kind(),
        }
    }
}

fn word(lo: u8, hi: u8) -> u16 {
    lo as u16 | (hi as u16) << 8
}

/// Run of ops sharing one type word.
type Run = (u16, Vec<BlockOp>);

#[derive(Debug, Default)]
struct SymbolSets {
    mono_map: BTreeSet<u16>,
    mono_color: BTreeSet<u16>,
    full: BTreeSet<u16>,
    block_type: BTreeSet<u16>,
}

fn tree_spec(symbols: &BTreeSet<u16>) -> Option<WordTreeSpec> {
    if symbols.is_empty() {
        return None;
    }
    let markers: Vec<u16> = (0..=u16::MAX).rev().filter(|v| !symbols.contains(v)).take(3).collect();
    let markers = [markers[0], markers[1], markers[2]];
    let mut body: Vec<u16> = symbols.iter().copied().collect();
    body.extend_from_slice(&markers);
    body.sort_unstable();
    Some(WordTreeSpec::balanced(&body, markers))
}

fn encoder(spec: &Option<WordTreeSpec>) -> WordEncoder<'_> {
    match spec {
        Some(spec) => WordEncoder::new(spec),
        None => WordEncoder::trivial(),
    }
}

fn alloc_size(spec: &Option<WordTreeSpec>) -> u32 {
    match spec {
        // Every leaf and internal node plus three marker slots.
        Some(spec) => (spec.body.symbols().len() as u32 * 2 + 2) * 4,
        None => 4,
    }
}

/// Builds SMK2/SMK4 files.
#[derive(Debug, Clone)]
pub struct SmkBuilder {
    version: SmkVersion,
    width: u32,
    height: u32,
    delay: i32,
    flags: u32,
    audio: [AudioDescriptor; smk::AUDIO_TRACKS],
    tree_alloc: Option<[u32; 4]>,
    frames: Vec<SmkFrame>,
}

impl SmkBuilder {
    pub fn new(version: SmkVersion, width: u32, height: u32) -> Self {
        Self {
            version,
            width,
            height,
            delay: 100,
            flags: 0,
            audio: [AudioDescriptor::default(); smk::AUDIO_TRACKS],
            tree_alloc: None,
            frames: Vec::new(),
        }
    }

    pub fn delay(mut self, delay: i32) -> Self {
        self.delay = delay;
        self
    }

    pub fn flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    pub fn audio_track(mut self, slot: usize, descriptor: AudioDescriptor) -> Self {
        self.audio[slot] = descriptor;
        self
    }

    /// Override the tree allocation sizes written to the header.
    pub fn tree_alloc(mut self, alloc: [u32; 4]) -> Self {
        self.tree_alloc = Some(alloc);
        self
    }

    pub fn frame(mut self, frame: SmkFrame) -> Self {
        assert_eq!(
            frame.pixels.len(),
            (self.width * self.height) as usize,
            "frame pixels must cover the coded size"
        );
        self.frames.push(frame);
        self
    }

    fn block(&self, pixels: &[u8], block: usize) -> [u8; 16] {
        let blocks_wide = (self.width / 4) as usize;
        let x0 = (block % blocks_wide) * 4;
        let y0 = (block / blocks_wide) * 4;
        let mut out = [0u8; 16];
        for y in 0..4 {
            let at = (y0 + y) * self.width as usize + x0;
            out[y * 4..y * 4 + 4].copy_from_slice(&pixels[at..at + 4]);
        }
        out
    }

    fn block_op(block: [u8; 16], previous: Option<[u8; 16]>) -> BlockOp {
        if previous == Some(block) {
            return BlockOp::Skip;
        }
        let lo = block[0];
        if block.iter().all(|&p| p == lo) {
            return BlockOp::Fill(lo);
        }
        let Some(&hi) = block.iter().find(|&&p| p != lo) else {
            return BlockOp::Fill(lo);
        };
        if block.iter().all(|&p| p == lo || p == hi) {
            let map = block
                .iter()
                .enumerate()
                .fold(0u16, |map, (i, &p)| if p == hi { map | 1 << i } else { map });
            return BlockOp::Mono {
                colors: word(lo, hi),
                map,
            };
        }
        let mut words = [0u16; 8];
        for y in 0..4 {
            let row = &block[y * 4..y * 4 + 4];
            words[y * 2] = word(row[2], row[3]);
            words[y * 2 + 1] = word(row[0], row[1]);
        }
        BlockOp::Full(words)
    }

    fn frame_runs(&self, index: usize) -> Vec<Run> {
        let blocks_wide = (self.width / 4) as usize;
        let blocks = blocks_wide * (self.height / 4) as usize;
        let frame = &self.frames[index];
        let previous = (index > 0 && !frame.keyframe).then(|| &self.frames[index - 1]);

        let mut runs: Vec<Run> = Vec::new();
        for b in 0..blocks {
            let op = Self::block_op(
                self.block(&frame.pixels, b),
                previous.map(|p| self.block(&p.pixels, b)),
            );
            match runs.last_mut() {
                Some((_, ops)) if ops[0].same_run(op) && ops.len() < MAX_RUN => ops.push(op),
                _ => runs.push((0, vec![op])),
            }
        }
        for (type_word, ops) in &mut runs {
            let color = match ops[0] {
                BlockOp::Fill(c) => c,
                _ => 0,
            };
            *type_word = ops[0].kind() | ((ops.len() as u16 - 1) << 2) | (color as u16) << 8;
        }
        runs
    }

    fn video_bits(&self, runs: &[Run], specs: &[Option<WordTreeSpec>; 4]) -> Vec<u8> {
        let [map_spec, color_spec, full_spec, type_spec] = specs;
        let (mut map_enc, mut color_enc) = (encoder(map_spec), encoder(color_spec));
        let (mut full_enc, mut type_enc) = (encoder(full_spec), encoder(type_spec));

        let mut w = BitWriter::new();
        for (type_word, ops) in runs {
            type_enc.encode(&mut w, *type_word);
            if ops[0].kind() == 1 && self.version == SmkVersion::Smk4 {
                w.put_bits(0, 2);
            }
            for op in ops {
                match *op {
                    BlockOp::Mono { colors, map } => {
                        color_enc.encode(&mut w, colors);
                        map_enc.encode(&mut w, map);
                    }
                    BlockOp::Full(words) => {
                        for value in words {
                            full_enc.encode(&mut w, value);
                        }
                    }
                    BlockOp::Skip | BlockOp::Fill(_) => {}
                }
            }
        }
        w.finish()
    }

    fn record(&self, frame: &SmkFrame, video: &[u8]) -> (Vec<u8>, u8) {
        let mut data = Vec::new();
        let mut frame_type = 0u8;

        if let Some(palette) = &frame.palette {
            // Literal ops only, 3 bytes per entry.
            let mut chunk = vec![0u8];
            chunk.extend(palette.iter().map(|v| v & 0x3F));
            while chunk.len() % 4 != 0 {
                chunk.push(0);
            }
            chunk[0] = (chunk.len() / 4) as u8;
            data.extend_from_slice(&chunk);
            frame_type |= smk::FRAME_PALETTE;
        }

        for slot in 0..smk::AUDIO_TRACKS {
            let Some((_, pcm)) = frame.audio.iter().find(|(s, _)| *s == slot) else {
                continue;
            };
            let payload = audio_payload(self.audio[slot], pcm);
            data.put_u32_le(payload.len() as u32 + 4);
            data.extend_from_slice(&payload);
            frame_type |= 2 << slot;
        }

        data.extend_from_slice(video);
        while data.len() % 4 != 0 {
            data.push(0);
        }
        (data, frame_type)
    }

    pub fn build(&self) -> Vec<u8> {
        assert!(!self.frames.is_empty(), "an SMK file needs frames");

        let runs: Vec<Vec<Run>> = (0..self.frames.len()).map(|i| self.frame_runs(i)).collect();
        let mut sets = SymbolSets::default();
        for (type_word, ops) in runs.iter().flatten() {
            sets.block_type.insert(*type_word);
            for op in ops {
                match *op {
                    BlockOp::Mono { colors, map } => {
                        sets.mono_color.insert(colors);
                        sets.mono_map.insert(map);
                    }
                    BlockOp::Full(words) => sets.full.extend(words),
                    BlockOp::Skip | BlockOp::Fill(_) => {}
                }
            }
        }
        let specs = [
            tree_spec(&sets.mono_map),
            tree_spec(&sets.mono_color),
            tree_spec(&sets.full),
            tree_spec(&sets.block_type),
        ];

        let mut trees = BitWriter::new();
        for spec in &specs {
            write_word_tree(&mut trees, spec.as_ref());
        }
        let trees = trees.finish();
        let tree_alloc = self.tree_alloc.unwrap_or_else(|| {
            [
                alloc_size(&specs[0]),
                alloc_size(&specs[1]),
                alloc_size(&specs[2]),
                alloc_size(&specs[3]),
            ]
        });

        let mut records: Vec<(Vec<u8>, u8, bool)> = self
            .frames
            .iter()
            .zip(&runs)
            .enumerate()
            .map(|(i, (frame, runs))| {
                let video = self.video_bits(runs, &specs);
                let (data, frame_type) = self.record(frame, &video);
                (data, frame_type, i == 0 || frame.keyframe)
            })
            .collect();
        if self.flags & smk::FLAG_RING_FRAME != 0 {
            records.push(records[0].clone());
        }

        let mut audio_sizes = [0u32; smk::AUDIO_TRACKS];
        for frame in &self.frames {
            for (slot, pcm) in &frame.audio {
                audio_sizes[*slot] = audio_sizes[*slot].max(pcm.len() as u32);
            }
        }

        let mut out = Vec::new();
        out.put_slice(self.version.signature().as_bytes());
        out.put_u32_le(self.width);
        out.put_u32_le(self.height);
        out.put_u32_le(self.frames.len() as u32);
        out.put_i32_le(self.delay);
        out.put_u32_le(self.flags);
        for size in audio_sizes {
            out.put_u32_le(size);
        }
        out.put_u32_le(trees.len() as u32);
        for alloc in tree_alloc {
            out.put_u32_le(alloc);
        }
        for descriptor in self.audio {
            out.put_u32_le(descriptor.bits());
        }
        out.put_u32_le(0);
        debug_assert_eq!(out.len(), smk::HEADER_SIZE);

        for (data, _, keyframe) in &records {
            out.put_u32_le(data.len() as u32 | if *keyframe { smk::FRAME_KEYFRAME } else { 0 });
        }
        for (_, frame_type, _) in &records {
            out.put_u8(*frame_type);
        }
        out.put_slice(&trees);
        for (data, _, _) in &records {
            out.put_slice(data);
        }
        out
    }
}

/// One part of a CINE frame.
#[derive(Debug, Clone)]
pub enum CinePart {
    /// PCM, encoded per the file's audio descriptor.
    Audio(Vec<u8>),
    Video {
        rect: TileRect,
        tag: u8,
        payload: Vec<u8>,
        compress: Option<Lz77Variant>,
    },
    Palette {
        start: u8,
        triplets: Vec<u8>,
    },
    /// Arbitrary part written verbatim.
    Raw {
        kind: u8,
        body: Vec<u8>,
    },
}

impl CinePart {
    /// Uncompressed dense tile.
    pub fn whole(rect: TileRect, pixels: Vec<u8>) -> Self {
        Self::Video {
            rect,
            tag: 2,
            payload: pixels,
            compress: None,
        }
    }

    /// LZ77-compressed tile with an explicit block tag.
    pub fn compressed(rect: TileRect, tag: u8, payload: Vec<u8>, variant: Lz77Variant) -> Self {
        Self::Video {
            rect,
            tag,
            payload,
            compress: Some(variant),
        }
    }

    fn encode(&self, audio: AudioDescriptor) -> (u8, Vec<u8>) {
        match self {
            Self::Audio(pcm) => (1, audio_payload(audio, pcm)),
            Self::Video {
                rect,
                tag,
                payload,
                compress,
            } => {
                let mut body = Vec::new();
                body.put_i16_le(rect.left as i16);
                body.put_i16_le(rect.top as i16);
                body.put_u16_le(rect.width as u16);
                body.put_u16_le(rect.height as u16);
                match compress {
                    Some(variant) => {
                        body.put_u8(tag | cine::LZ77_FLAG);
                        body.put_u32_le(payload.len() as u32);
                        body.put_slice(&lz77_compress(payload, *variant));
                    }
                    None => {
                        body.put_u8(*tag);
                        body.put_slice(payload);
                    }
                }
                (2, body)
            }
            Self::Palette { start, triplets } => {
                let mut body = vec![*start];
                body.put_u16_le((triplets.len() / 3) as u16);
                body.put_slice(triplets);
                (3, body)
            }
            Self::Raw { kind, body } => (*kind, body.clone()),
        }
    }
}

/// One CINE frame.
#[derive(Debug, Clone, Default)]
pub struct CineFrame {
    pub parts: Vec<CinePart>,
    pub keyframe: bool,
}

impl CineFrame {
    pub fn new(parts: Vec<CinePart>) -> Self {
        Self { parts, keyframe: false }
    }

    pub fn keyframe(mut self) -> Self {
        self.keyframe = true;
        self
    }
}

/// Builds CINE files.
#[derive(Debug, Clone)]
pub struct CineBuilder {
    width: u32,
    height: u32,
    delay: i32,
    audio: AudioDescriptor,
    flags: u32,
    video_buffer_size: u32,
    palette: Vec<u8>,
    frames: Vec<CineFrame>,
}

impl CineBuilder {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            delay: 100,
            audio: AudioDescriptor::default(),
            flags: 0,
            video_buffer_size: width * height * 3,
            palette: vec![0; 768],
            frames: Vec::new(),
        }
    }

    pub fn delay(mut self, delay: i32) -> Self {
        self.delay = delay;
        self
    }

    pub fn audio(mut self, descriptor: AudioDescriptor) -> Self {
        self.audio = descriptor;
        self
    }

    pub fn flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    pub fn video_buffer_size(mut self, size: u32) -> Self {
        self.video_buffer_size = size;
        self
    }

    /// Initial palette as 256 6-bit triplets.
    pub fn palette(mut self, palette: Vec<u8>) -> Self {
        assert_eq!(palette.len(), 768, "palette must hold 256 triplets");
        self.palette = palette;
        self
    }

    pub fn frame(mut self, frame: CineFrame) -> Self {
        self.frames.push(frame);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut body = Vec::new();
        let mut table = Vec::new();
        for frame in &self.frames {
            table.put_u32_le((cine::HEADER_SIZE + body.len()) as u32);
            table.put_u16_le(frame.parts.len() as u16);
            table.put_u16_le(if frame.keyframe { cine::FRAME_KEYFRAME } else { 0 });
            for part in &frame.parts {
                let (kind, data) = part.encode(self.audio);
                body.put_u8(kind);
                body.put_u8(0);
                body.put_u32_le(data.len() as u32);
                body.put_slice(&data);
            }
        }

        let mut out = Vec::with_capacity(cine::HEADER_SIZE + body.len() + table.len());
        out.put_slice(b"CINE");
        out.put_u32_le(self.width);
        out.put_u32_le(self.height);
        out.put_u32_le(self.frames.len() as u32);
        out.put_i32_le(self.delay);
        out.put_u32_le(self.audio.bits());
        out.put_u32_le(self.flags);
        out.put_u32_le(self.video_buffer_size);
        out.put_slice(&self.palette);
        out.put_u32_le((cine::HEADER_SIZE + body.len()) as u32);
        out.put_u32_le(0);
        debug_assert_eq!(out.len(), cine::HEADER_SIZE);

        out.put_slice(&body);
        out.put_slice(&table);
        out
    }
}

/// Deterministic test pattern: `frame` shifts a diagonal gradient.
pub fn gradient(width: u32, height: u32, frame: u32) -> Vec<u8> {
    (0..height)
        .flat_map(|y| (0..width).map(move |x| ((x / 4 + y / 4 + frame) % 16) as u8))
        .collect()
}

/// Unsigned 8-bit ramp of `len` samples.
pub fn pcm_ramp(len: usize, start: u8) -> Vec<u8> {
    (0..len).map(|i| start.wrapping_add((i % 64) as u8)).collect()
}
