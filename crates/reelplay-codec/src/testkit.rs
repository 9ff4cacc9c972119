//! Encoders for building test fixtures.
//!
//! Everything here is the inverse of a decoder in this crate and is only
//! meant for synthesising inputs: functions panic on inputs they cannot
//! represent instead of returning errors.

use std::collections::HashMap;

use crate::dpcm::DpcmLayout;
use crate::lz77::{Lz77Variant, EXTENDED_MAGIC, WINDOW_SIZE};

/// LSB-first bit writer, the inverse of `BitReader::lsb`.
#[derive(Debug, Clone, Default)]
pub struct BitWriter {
    bytes: Vec<u8>,
    bits: usize,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_bit(&mut self, bit: bool) {
        if self.bits % 8 == 0 {
            self.bytes.push(0);
        }
        if bit {
            if let Some(last) = self.bytes.last_mut() {
                *last |= 1 << (self.bits % 8);
            }
        }
        self.bits += 1;
    }

    /// Write the low `n` bits of `value`, least significant first.
    pub fn put_bits(&mut self, value: u32, n: u32) {
        for i in 0..n {
            self.put_bit((value >> i) & 1 != 0);
        }
    }

    pub fn bits_written(&self) -> usize {
        self.bits
    }

    pub fn finish(self) -> Vec<u8> {
        self.bytes
    }
}

/// Prefix code tree used to describe and drive the Huffman decoders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeTree<T> {
    Leaf(T),
    Node(Box<CodeTree<T>>, Box<CodeTree<T>>),
}

impl<T: Copy + PartialEq + std::fmt::Debug> CodeTree<T> {
    pub fn leaf(value: T) -> Self {
        Self::Leaf(value)
    }

    pub fn node(zero: Self, one: Self) -> Self {
        Self::Node(Box::new(zero), Box::new(one))
    }

    /// Roughly balanced tree over `symbols`.
    ///
    /// # Panics
    ///
    /// Panics if `symbols` is empty.
    pub fn balanced(symbols: &[T]) -> Self {
        assert!(!symbols.is_empty(), "a code tree needs at least one symbol");
        if symbols.len() == 1 {
            return Self::Leaf(symbols[0]);
        }
        let mid = symbols.len() / 2;
        Self::node(Self::balanced(&symbols[..mid]), Self::balanced(&symbols[mid..]))
    }

    /// Maximally unbalanced tree: the first symbol has code `1`, the next `01`, and so on.
    pub fn chain(symbols: &[T]) -> Self {
        assert!(!symbols.is_empty(), "a code tree needs at least one symbol");
        if symbols.len() == 1 {
            return Self::Leaf(symbols[0]);
        }
        Self::node(Self::chain(&symbols[1..]), Self::Leaf(symbols[0]))
    }

    /// Code bits of `symbol`, in stream order.
    pub fn code(&self, symbol: T) -> Option<Vec<bool>> {
        match self {
            Self::Leaf(value) => (*value == symbol).then(Vec::new),
            Self::Node(zero, one) => {
                for (bit, child) in [(false, zero), (true, one)] {
                    if let Some(mut rest) = child.code(symbol) {
                        rest.insert(0, bit);
                        return Some(rest);
                    }
                }
                None
            }
        }
    }

    /// Leaf values in pre-order.
    pub fn symbols(&self) -> Vec<T> {
        match self {
            Self::Leaf(value) => vec![*value],
            Self::Node(zero, one) => {
                let mut all = zero.symbols();
                all.extend(one.symbols());
                all
            }
        }
    }

    pub fn contains(&self, symbol: T) -> bool {
        self.code(symbol).is_some()
    }

    /// Write the code of `symbol`.
    ///
    /// # Panics
    ///
    /// Panics if the tree has no leaf for `symbol`.
    pub fn encode(&self, w: &mut BitWriter, symbol: T) {
        let code = self
            .code(symbol)
            .unwrap_or_else(|| panic!("symbol {symbol:?} not in tree"));
        for bit in code {
            w.put_bit(bit);
        }
    }

    fn write_shape<F>(&self, w: &mut BitWriter, leaf: &mut F)
    where
        F: FnMut(&mut BitWriter, T),
    {
        match self {
            Self::Leaf(value) => {
                w.put_bit(false);
                leaf(w, *value);
            }
            Self::Node(zero, one) => {
                w.put_bit(true);
                zero.write_shape(w, leaf);
                one.write_shape(w, leaf);
            }
        }
    }
}

impl CodeTree<u8> {
    /// Serialise as a non-trivial byte tree (presence bit, body, closing bit).
    pub fn write_byte_tree(&self, w: &mut BitWriter) {
        w.put_bit(true);
        self.write_shape(w, &mut |w, value| w.put_bits(value as u32, 8));
        w.put_bit(false);
    }
}

/// Serialise an optional byte tree; `None` writes the trivial tree.
pub fn write_byte_tree(w: &mut BitWriter, tree: Option<&CodeTree<u8>>) {
    match tree {
        Some(tree) => tree.write_byte_tree(w),
        None => w.put_bit(false),
    }
}

fn distinct<T: Copy + Ord>(values: impl Iterator<Item = T>) -> Vec<T> {
    let mut all: Vec<T> = values.collect();
    all.sort_unstable();
    all.dedup();
    all
}

/// Description of a word tree.
#[derive(Debug, Clone)]
pub struct WordTreeSpec {
    pub low: CodeTree<u8>,
    pub high: CodeTree<u8>,
    pub markers: [u16; 3],
    pub body: CodeTree<u16>,
}

impl WordTreeSpec {
    /// Balanced body over `values` with sub-trees covering their bytes.
    pub fn balanced(values: &[u16], markers: [u16; 3]) -> Self {
        let lows = distinct(values.iter().map(|v| (v & 0xFF) as u8));
        let highs = distinct(values.iter().map(|v| (v >> 8) as u8));
        Self {
            low: CodeTree::balanced(&lows),
            high: CodeTree::balanced(&highs),
            markers,
            body: CodeTree::balanced(values),
        }
    }

    /// Serialise as a non-trivial word tree.
    pub fn write(&self, w: &mut BitWriter) {
        w.put_bit(true);
        self.low.write_byte_tree(w);
        self.high.write_byte_tree(w);
        for marker in self.markers {
            w.put_bits(marker as u32, 16);
        }
        let (low, high) = (&self.low, &self.high);
        self.body.write_shape(w, &mut |w, value| {
            low.encode(w, (value & 0xFF) as u8);
            high.encode(w, (value >> 8) as u8);
        });
        w.put_bit(false);
    }

    /// Write the code of the body leaf holding `value`, ignoring marker slots.
    pub fn encode_leaf(&self, w: &mut BitWriter, value: u16) {
        self.body.encode(w, value);
    }
}

/// Serialise an optional word tree; `None` writes the trivial tree.
pub fn write_word_tree(w: &mut BitWriter, spec: Option<&WordTreeSpec>) {
    match spec {
        Some(spec) => spec.write(w),
        None => w.put_bit(false),
    }
}

/// Encoder mirroring the decoder's recently-used marker slots.
#[derive(Debug)]
pub struct WordEncoder<'a> {
    spec: Option<&'a WordTreeSpec>,
    recent: [u16; 3],
    marker_hits: usize,
}

impl<'a> WordEncoder<'a> {
    pub fn new(spec: &'a WordTreeSpec) -> Self {
        Self {
            spec: Some(spec),
            recent: [0; 3],
            marker_hits: 0,
        }
    }

    /// Encoder for the trivial tree; it can only produce zeros.
    pub fn trivial() -> Self {
        Self {
            spec: None,
            recent: [0; 3],
            marker_hits: 0,
        }
    }

    /// Number of symbols emitted through a marker slot.
    pub fn marker_hits(&self) -> usize {
        self.marker_hits
    }

    /// Forget the recently-used values, as the decoder's `reset()` does.
    pub fn reset(&mut self) {
        self.recent = [0; 3];
    }

    /// Emit `value`, preferring a marker slot that currently holds it.
    ///
    /// # Panics
    ///
    /// Panics if `value` is reachable neither through a marker slot nor a
    /// plain leaf.
    pub fn encode(&mut self, w: &mut BitWriter, value: u16) {
        let Some(spec) = self.spec else {
            assert_eq!(value, 0, "trivial word tree only encodes 0");
            return;
        };

        let via_marker = (0..3).find(|&j| self.recent[j] == value && spec.body.contains(spec.markers[j]));
        match via_marker {
            Some(j) => {
                spec.body.encode(w, spec.markers[j]);
                self.marker_hits += 1;
            }
            None => {
                assert!(
                    !spec.markers.contains(&value),
                    "value {value:#06x} collides with a marker"
                );
                spec.body.encode(w, value);
            }
        }

        if value != self.recent[0] {
            self.recent[2] = self.recent[1];
            self.recent[1] = self.recent[0];
            self.recent[0] = value;
        }
    }
}

/// Greedy reference compressor for `lz77::decompress`.
///
/// Matches are taken only against earlier input (never the pre-filled
/// window) and no further back than the window can safely hold.
pub fn lz77_compress(data: &[u8], variant: Lz77Variant) -> Vec<u8> {
    const MAX_DISTANCE: usize = WINDOW_SIZE - 300;
    const MAX_CANDIDATES: usize = 256;

    let mut out = Vec::new();
    if variant == Lz77Variant::Extended {
        out.extend_from_slice(&EXTENDED_MAGIC);
    }

    let cursor = variant.initial_cursor();
    let max_len = variant.max_length();
    let mut heads: HashMap<[u8; 3], Vec<usize>> = HashMap::new();
    let mut control_at = 0usize;
    let mut items = 8u32;
    let mut p = 0usize;

    while p < data.len() {
        if items == 8 {
            control_at = out.len();
            out.push(0);
            items = 0;
        }

        let mut best_len = 0;
        let mut best_from = 0;
        if p + 3 <= data.len() {
            let key = [data[p], data[p + 1], data[p + 2]];
            if let Some(candidates) = heads.get(&key) {
                for &q in candidates.iter().rev().take(MAX_CANDIDATES) {
                    if p - q > MAX_DISTANCE {
                        break;
                    }
                    let mut len = 0;
                    while len < max_len && p + len < data.len() && data[q + len] == data[p + len] {
                        len += 1;
                    }
                    if len > best_len {
                        best_len = len;
                        best_from = q;
                    }
                    if len == max_len {
                        break;
                    }
                }
            }
        }

        let step = if best_len >= 3 {
            let offset = (cursor + best_from) & (WINDOW_SIZE - 1);
            let (nibble, extra) = match variant {
                Lz77Variant::Extended if best_len >= 18 => (15, Some((best_len - 18) as u8)),
                _ => (best_len - 3, None),
            };
            out.push(offset as u8);
            out.push((((offset >> 4) & 0xF0) | nibble) as u8);
            out.extend(extra);
            best_len
        } else {
            out[control_at] |= 0x80 >> items;
            out.push(data[p]);
            1
        };

        for at in p..p + step {
            if at + 3 <= data.len() {
                heads
                    .entry([data[at], data[at + 1], data[at + 2]])
                    .or_default()
                    .push(at);
            }
        }
        p += step;
        items += 1;
    }

    out
}

/// Encode PCM bytes as a Huffman-DPCM chunk (unpacked size included).
///
/// # Panics
///
/// Panics if an 8-bit delta does not fit in a signed byte or `pcm` is not a
/// whole number of sample frames.
pub fn encode_dpcm(pcm: &[u8], layout: DpcmLayout) -> Vec<u8> {
    let frame_bytes = layout.frame_bytes();
    let channels = layout.channels();
    assert_eq!(pcm.len() % frame_bytes, 0, "partial sample frame");

    let sample = |frame: usize, channel: usize| -> i32 {
        let at = frame * frame_bytes + channel * layout.bytes_per_sample();
        if layout.sixteen_bit {
            i16::from_le_bytes([pcm[at], pcm[at + 1]]) as i32
        } else {
            pcm[at] as i32
        }
    };

    // Symbol stream per tree, in decode order.
    let frames = pcm.len() / frame_bytes;
    let mut streams: Vec<Vec<u8>> = vec![Vec::new(); frame_bytes];
    let mut order: Vec<(usize, u8)> = Vec::new();
    for frame in 1..frames {
        for channel in 0..channels {
            let current = sample(frame, channel);
            let previous = sample(frame - 1, channel);
            if layout.sixteen_bit {
                let delta = (current as i16).wrapping_sub(previous as i16) as u16;
                for (k, byte) in [(0, delta as u8), (1, (delta >> 8) as u8)] {
                    streams[channel * 2 + k].push(byte);
                    order.push((channel * 2 + k, byte));
                }
            } else {
                let delta = current - previous;
                assert!((-128..=127).contains(&delta), "8-bit delta {delta} out of range");
                streams[channel].push(delta as i8 as u8);
                order.push((channel, delta as i8 as u8));
            }
        }
    }

    let trees: Vec<Option<CodeTree<u8>>> = streams
        .iter()
        .map(|stream| {
            let symbols = distinct(stream.iter().copied());
            (!symbols.is_empty()).then(|| CodeTree::balanced(&symbols))
        })
        .collect();

    let mut w = BitWriter::new();
    w.put_bits(pcm.len() as u32, 32);
    w.put_bit(true);
    w.put_bit(layout.stereo);
    w.put_bit(layout.sixteen_bit);
    for tree in &trees {
        write_byte_tree(&mut w, tree.as_ref());
    }

    let put_base = |w: &mut BitWriter, value: i32| {
        if layout.sixteen_bit {
            w.put_bits((value as i16 as u16).swap_bytes() as u32, 16);
        } else {
            w.put_bits(value as u32 & 0xFF, 8);
        }
    };
    if frames > 0 {
        if layout.stereo {
            put_base(&mut w, sample(0, 1));
        }
        put_base(&mut w, sample(0, 0));
    }

    for (tree, byte) in order {
        if let Some(tree) = &trees[tree] {
            tree.encode(&mut w, byte);
        }
    }
    w.finish()
}
