//! SMK video track: 4x4 block decoding driven by four word trees.

use std::sync::Arc;

use reelplay_codec::{BitReader, Palette, PixelFormat, Surface, WordTree};

use crate::error::Result;
use crate::header::FrameRate;
use crate::track::{FrameCursor, Track, TrackKind, TrackStatus, VideoTrack};

/// Header flag: the frame tables carry one extra ring frame.
pub const FLAG_RING_FRAME: u32 = 0x01;
/// Header flag: decoded rows go to even surface rows only.
pub const FLAG_Y_INTERLACE: u32 = 0x02;
/// Header flag: every decoded row is painted twice.
pub const FLAG_Y_DOUBLE: u32 = 0x04;

const BLOCK_MONO: u16 = 0;
const BLOCK_FULL: u16 = 1;
const BLOCK_SKIP: u16 = 2;

/// Bitstream revision from the signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmkVersion {
    Smk2,
    Smk4,
}

impl SmkVersion {
    pub fn signature(self) -> &'static str {
        match self {
            Self::Smk2 => "SMK2",
            Self::Smk4 => "SMK4",
        }
    }
}

/// Block count of a run-length index.
fn block_run(index: u16) -> usize {
    if index <= 58 {
        index as usize + 1
    } else {
        128 << (index - 59)
    }
}

/// The four per-file trees, in stream order.
#[derive(Debug, Clone)]
pub struct VideoTrees {
    pub mono_map: WordTree,
    pub mono_color: WordTree,
    pub full: WordTree,
    pub block_type: WordTree,
}

impl VideoTrees {
    /// Read all four trees from one LSB stream. `capacities` are in stream order.
    pub fn read(data: &[u8], capacities: [usize; 4]) -> Result<Self> {
        let mut reader = BitReader::lsb(data);
        let mono_map = WordTree::read(&mut reader, capacities[0])?;
        let mono_color = WordTree::read(&mut reader, capacities[1])?;
        let full = WordTree::read(&mut reader, capacities[2])?;
        let block_type = WordTree::read(&mut reader, capacities[3])?;
        if reader.is_eos() {
            tracing::warn!(bytes = data.len(), "tree data ended early");
        }
        Ok(Self {
            mono_map,
            mono_color,
            full,
            block_type,
        })
    }

    fn reset(&mut self) {
        self.mono_map.reset();
        self.mono_color.reset();
        self.full.reset();
        self.block_type.reset();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowLayout {
    Normal,
    Doubled,
    Interlaced,
}

impl RowLayout {
    fn from_flags(flags: u32) -> Self {
        if flags & FLAG_Y_DOUBLE != 0 {
            Self::Doubled
        } else if flags & FLAG_Y_INTERLACE != 0 {
            Self::Interlaced
        } else {
            Self::Normal
        }
    }
}

/// Paints block rows, mapping decoded rows to surface rows.
struct BlockWriter<'s> {
    surface: &'s mut Surface,
    layout: RowLayout,
    blocks_wide: usize,
}

impl BlockWriter<'_> {
    fn row(&mut self, block: usize, y: usize, pixels: [u8; 4]) {
        let x = (block % self.blocks_wide) * 4;
        let row = ((block / self.blocks_wide) * 4 + y) as u32;
        match self.layout {
            RowLayout::Normal => self.put(row, x, pixels),
            RowLayout::Doubled => {
                self.put(row * 2, x, pixels);
                self.put(row * 2 + 1, x, pixels);
            }
            RowLayout::Interlaced => self.put(row * 2, x, pixels),
        }
    }

    fn put(&mut self, row: u32, x: usize, pixels: [u8; 4]) {
        if let Some(dst) = self.surface.row_mut(row).get_mut(x..x + 4) {
            dst.copy_from_slice(&pixels);
        }
    }
}

/// Video track of an SMK file.
#[derive(Debug)]
pub struct SmkVideoTrack {
    version: SmkVersion,
    flags: u32,
    width: u32,
    height: u32,
    trees: VideoTrees,
    surface: Surface,
    palette: Palette,
    cursor: FrameCursor,
    keyframes: Arc<[bool]>,
    status: TrackStatus,
}

impl SmkVideoTrack {
    /// `width`/`height` are the coded dimensions; the surface is twice as
    /// tall when rows are doubled or interlaced.
    pub fn new(
        version: SmkVersion,
        width: u32,
        height: u32,
        flags: u32,
        rate: FrameRate,
        keyframes: Arc<[bool]>,
        trees: VideoTrees,
    ) -> Self {
        let surface_height = if flags & (FLAG_Y_INTERLACE | FLAG_Y_DOUBLE) != 0 {
            height * 2
        } else {
            height
        };
        Self {
            version,
            flags,
            width,
            height,
            trees,
            surface: Surface::new(width, surface_height, PixelFormat::Indexed8),
            palette: Palette::new(),
            cursor: FrameCursor::new(keyframes.len() as u32, rate),
            keyframes,
            status: TrackStatus::default(),
        }
    }

    pub fn version(&self) -> SmkVersion {
        self.version
    }

    pub fn flags(&self) -> u32 {
        self.flags
    }

    /// Coded height, before row doubling.
    pub fn coded_height(&self) -> u32 {
        self.height
    }

    pub fn is_keyframe(&self, frame: u32) -> bool {
        self.keyframes.get(frame as usize).copied().unwrap_or(false)
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    /// Apply the palette chunk body of the frame being decoded.
    pub(crate) fn apply_palette_delta(&mut self, body: &[u8]) {
        self.palette.apply_delta(body);
    }

    /// Decode one frame's video bitstream onto the surface.
    ///
    /// Running out of bits is not an error; the remaining blocks decode from
    /// zero bits.
    pub fn decode_frame(&mut self, data: &[u8]) {
        let Self {
            version,
            flags,
            width,
            height,
            trees,
            surface,
            ..
        } = &mut *self;

        trees.reset();
        let mut reader = BitReader::lsb(data);
        let blocks_wide = (*width / 4) as usize;
        let blocks = blocks_wide * (*height / 4) as usize;
        let mut writer = BlockWriter {
            surface,
            layout: RowLayout::from_flags(*flags),
            blocks_wide,
        };

        let mut block = 0usize;
        while block < blocks {
            let kind = trees.block_type.decode(&mut reader);
            let run = block_run((kind >> 2) & 0x3F);
            let end = (block + run).min(blocks);

            match kind & 3 {
                BLOCK_MONO => {
                    for b in block..end {
                        let colors = trees.mono_color.decode(&mut reader);
                        let mut map = trees.mono_map.decode(&mut reader);
                        let hi = (colors >> 8) as u8;
                        let lo = colors as u8;
                        for y in 0..4 {
                            let mut pixels = [0u8; 4];
                            for (x, pixel) in pixels.iter_mut().enumerate() {
                                *pixel = if map & (1 << x) != 0 { hi } else { lo };
                            }
                            writer.row(b, y, pixels);
                            map >>= 4;
                        }
                    }
                }
                BLOCK_FULL => {
                    let mode = match version {
                        SmkVersion::Smk2 => FullMode::Plain,
                        SmkVersion::Smk4 if reader.get_bit() => FullMode::Double,
                        SmkVersion::Smk4 if reader.get_bit() => FullMode::Half,
                        SmkVersion::Smk4 => FullMode::Plain,
                    };
                    for b in block..end {
                        decode_full(mode, &mut trees.full, &mut reader, &mut writer, b);
                    }
                }
                BLOCK_SKIP => {}
                _ => {
                    let color = (kind >> 8) as u8;
                    for b in block..end {
                        for y in 0..4 {
                            writer.row(b, y, [color; 4]);
                        }
                    }
                }
            }
            block = end;
        }

        if reader.is_eos() {
            tracing::debug!(frame = self.cursor.next_index(), "video bitstream ran short");
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FullMode {
    Plain,
    Double,
    Half,
}

fn split(word: u16) -> (u8, u8) {
    (word as u8, (word >> 8) as u8)
}

fn decode_full(mode: FullMode, full: &mut WordTree, reader: &mut BitReader<'_>, writer: &mut BlockWriter<'_>, block: usize) {
    match mode {
        FullMode::Plain => {
            for y in 0..4 {
                let (a_lo, a_hi) = split(full.decode(reader));
                let (b_lo, b_hi) = split(full.decode(reader));
                writer.row(block, y, [b_lo, b_hi, a_lo, a_hi]);
            }
        }
        FullMode::Double => {
            for half in 0..2 {
                let (lo, hi) = split(full.decode(reader));
                writer.row(block, half * 2, [lo, lo, hi, hi]);
                writer.row(block, half * 2 + 1, [lo, lo, hi, hi]);
            }
        }
        FullMode::Half => {
            for pair in 0..2 {
                let (a_lo, a_hi) = split(full.decode(reader));
                let (b_lo, b_hi) = split(full.decode(reader));
                let pixels = [b_lo, b_hi, a_lo, a_hi];
                writer.row(block, pair * 2, pixels);
                writer.row(block, pair * 2 + 1, pixels);
            }
        }
    }
}

impl Track for SmkVideoTrack {
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

    /// Only frame 0 and keyframes can be decoded without their predecessors.
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

impl VideoTrack for SmkVideoTrack {
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
        Some(&mut self.palette)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelplay_codec::testkit::{write_word_tree, BitWriter, WordEncoder, WordTreeSpec};

    #[test]
    fn test_block_run_table() {
        assert_eq!(block_run(0), 1);
        assert_eq!(block_run(58), 59);
        assert_eq!(block_run(59), 128);
        assert_eq!(block_run(60), 256);
        assert_eq!(block_run(63), 2048);
    }

    const MARKERS: [u16; 3] = [0xFFF0, 0xFFF1, 0xFFF2];

    fn spec(values: &[u16]) -> WordTreeSpec {
        let mut all = values.to_vec();
        all.extend_from_slice(&MARKERS);
        all.sort_unstable();
        all.dedup();
        WordTreeSpec::balanced(&all, MARKERS)
    }

    fn type_word(kind: u16, run: usize, color: u8) -> u16 {
        kind | (((run - 1) as u16) << 2) | ((color as u16) << 8)
    }

    /// Trees: trivial mono pair, a full tree over `full`, a type tree over `types`.
    fn track(
        version: SmkVersion,
        width: u32,
        height: u32,
        flags: u32,
        full: &WordTreeSpec,
        types: &WordTreeSpec,
    ) -> SmkVideoTrack {
        let mut w = BitWriter::new();
        write_word_tree(&mut w, None);
        write_word_tree(&mut w, None);
        write_word_tree(&mut w, Some(full));
        write_word_tree(&mut w, Some(types));
        let trees = VideoTrees::read(&w.finish(), [1 << 12; 4]).unwrap();
        SmkVideoTrack::new(
            version,
            width,
            height,
            flags,
            FrameRate::from_delay(100),
            Arc::from(vec![true]),
            trees,
        )
    }

    #[test]
    fn test_fill_and_skip_runs() {
        let fill = type_word(3, 1, 7);
        let skip = type_word(2, 1, 0);
        let types = spec(&[fill, skip]);
        let full = spec(&[0]);
        let mut track = track(SmkVersion::Smk2, 8, 4, 0, &full, &types);

        let mut w = BitWriter::new();
        let mut enc = WordEncoder::new(&types);
        enc.encode(&mut w, fill);
        enc.encode(&mut w, skip);
        track.decode_frame(&w.finish());

        let surface = track.surface();
        for y in 0..4 {
            assert_eq!(&surface.row(y)[..4], &[7; 4]);
            assert_eq!(&surface.row(y)[4..], &[0; 4]);
        }
    }

    #[test]
    fn test_full_block_modes() {
        let rows: [[u8; 4]; 4] = [[1, 2, 3, 4], [5, 6, 7, 8], [9, 10, 11, 12], [13, 14, 15, 16]];
        let word = |lo: u8, hi: u8| lo as u16 | (hi as u16) << 8;
        let mut symbols = Vec::new();
        for row in &rows {
            symbols.push(word(row[2], row[3]));
            symbols.push(word(row[0], row[1]));
        }
        let full_type = type_word(1, 1, 0);
        let types = spec(&[full_type]);
        let full = spec(&symbols);

        // SMK4 plain mode reads two zero mode bits first.
        let mut track = track(SmkVersion::Smk4, 4, 4, 0, &full, &types);
        let mut w = BitWriter::new();
        WordEncoder::new(&types).encode(&mut w, full_type);
        w.put_bits(0, 2);
        let mut enc = WordEncoder::new(&full);
        for &s in &symbols {
            enc.encode(&mut w, s);
        }
        track.decode_frame(&w.finish());
        for (y, row) in rows.iter().enumerate() {
            assert_eq!(track.surface().row(y as u32), row);
        }

        // Double mode: two symbols, each a pair of 2x2 quads.
        let mut track = self::track(SmkVersion::Smk4, 4, 4, 0, &full, &types);
        let mut w = BitWriter::new();
        WordEncoder::new(&types).encode(&mut w, full_type);
        w.put_bit(true);
        let mut enc = WordEncoder::new(&full);
        enc.encode(&mut w, symbols[0]);
        enc.encode(&mut w, symbols[1]);
        track.decode_frame(&w.finish());
        let s = track.surface();
        assert_eq!(s.row(0), &[3, 3, 4, 4]);
        assert_eq!(s.row(1), &[3, 3, 4, 4]);
        assert_eq!(s.row(2), &[1, 1, 2, 2]);
        assert_eq!(s.row(3), &[1, 1, 2, 2]);

        // Half mode: two symbol pairs, each row painted twice.
        let mut track = self::track(SmkVersion::Smk4, 4, 4, 0, &full, &types);
        let mut w = BitWriter::new();
        WordEncoder::new(&types).encode(&mut w, full_type);
        w.put_bit(false);
        w.put_bit(true);
        let mut enc = WordEncoder::new(&full);
        for &s in &symbols[..4] {
            enc.encode(&mut w, s);
        }
        track.decode_frame(&w.finish());
        let s = track.surface();
        assert_eq!(s.row(0), &rows[0]);
        assert_eq!(s.row(1), &rows[0]);
        assert_eq!(s.row(2), &rows[1]);
        assert_eq!(s.row(3), &rows[1]);
    }

    #[test]
    fn test_doubled_and_interlaced_rows() {
        let fill = type_word(3, 1, 9);
        let types = spec(&[fill]);
        let full = spec(&[0]);

        let mut doubled = track(SmkVersion::Smk2, 4, 4, FLAG_Y_DOUBLE, &full, &types);
        let mut interlaced = track(SmkVersion::Smk2, 4, 4, FLAG_Y_INTERLACE, &full, &types);
        let mut w = BitWriter::new();
        WordEncoder::new(&types).encode(&mut w, fill);
        let data = w.finish();
        doubled.decode_frame(&data);
        interlaced.decode_frame(&data);

        assert_eq!(doubled.surface().height(), 8);
        assert_eq!(doubled.coded_height(), 4);
        for y in 0..8 {
            assert_eq!(doubled.surface().row(y), &[9; 4]);
            let expected = if y % 2 == 0 { [9; 4] } else { [0; 4] };
            assert_eq!(interlaced.surface().row(y), &expected);
        }
    }

    #[test]
    fn test_long_run_is_clamped_to_frame() {
        // Run index 63 covers 2048 blocks; the frame only has 2.
        let fill = 3 | (63 << 2) | (5 << 8);
        let types = spec(&[fill]);
        let full = spec(&[0]);
        let mut track = track(SmkVersion::Smk2, 8, 4, 0, &full, &types);
        let mut w = BitWriter::new();
        WordEncoder::new(&types).encode(&mut w, fill);
        track.decode_frame(&w.finish());
        assert!(track.surface().pixels().iter().all(|&p| p == 5));
    }

    #[test]
    fn test_keyframe_seek_rules() {
        let types = spec(&[0]);
        let full = spec(&[0]);
        let mut w = BitWriter::new();
        for s in [None, None, Some(&full), Some(&types)] {
            write_word_tree(&mut w, s);
        }
        let trees = VideoTrees::read(&w.finish(), [1 << 12; 4]).unwrap();
        let mut track = SmkVideoTrack::new(
            SmkVersion::Smk2,
            4,
            4,
            0,
            FrameRate::from_delay(100),
            Arc::from(vec![true, false, false, true]),
            trees,
        );

        assert!(track.can_seek(0));
        assert!(!track.can_seek(150));
        assert!(track.can_seek(300));
        assert!(!track.can_seek(400));
        track.seek(300).unwrap();
        assert_eq!(track.cursor().next_index(), 3);
    }
}
