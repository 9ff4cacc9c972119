//! Self-describing Huffman trees stored as flat node arrays.
//!
//! A tree is serialised in the bitstream in pre-order: every node starts with
//! one bit, `0` for a leaf (followed by its symbol) and `1` for an internal
//! node (followed by its two subtrees). Decoding builds the tree straight into
//! a `Vec<u32>` arena:
//!
//! - a leaf slot holds the symbol value,
//! - an internal slot holds `NODE_FLAG | left_subtree_size`; the `0` child is
//!   the next slot and the `1` child sits right after the left subtree.
//!
//! A 256-entry prefix table resolves the first (up to) eight code bits in one
//! lookup. Word trees additionally keep three "recently used" marker slots that
//! implement the "repeat one of the last three values" trick.

use crate::bitreader::BitReader;
use crate::error::{CodecError, Result};

/// Tag of an internal node in the flat array.
pub const NODE_FLAG: u32 = 0x8000_0000;

/// Codes longer than this cannot be produced by a conforming encoder.
pub const MAX_DEPTH: u32 = 32;

/// Upper bound on the nodes of a tree with 8-bit leaves (255 internal + 256 leaves).
pub const BYTE_TREE_CAPACITY: usize = 512;

#[derive(Debug, Clone, Copy, Default)]
struct PrefixEntry {
    node: u32,
    bits: u8,
}

/// Arena shared by both tree flavours.
#[derive(Debug, Clone)]
struct FlatTree {
    nodes: Vec<u32>,
    prefix: Box<[PrefixEntry; 256]>,
    capacity: usize,
}

impl FlatTree {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(capacity.min(1 << 16)),
            prefix: Box::new([PrefixEntry::default(); 256]),
            capacity,
        }
    }

    /// Single leaf holding `value`; decoding consumes no bits.
    fn trivial(value: u32) -> Self {
        let mut tree = Self::with_capacity(1);
        tree.nodes.push(value);
        tree
    }

    fn push(&mut self, value: u32) -> Result<usize> {
        if self.nodes.len() >= self.capacity {
            return Err(CodecError::TreeOverflow {
                nodes: self.nodes.len() + 1,
                capacity: self.capacity,
            });
        }
        self.nodes.push(value);
        Ok(self.nodes.len() - 1)
    }

    fn mark_prefix(&mut self, node: usize, prefix: u32, depth: u32) {
        if depth > 8 {
            return;
        }
        let step = 1usize << depth;
        let mut code = prefix as usize;
        while code < 256 {
            self.prefix[code] = PrefixEntry {
                node: node as u32,
                bits: depth as u8,
            };
            code += step;
        }
    }

    /// Build the subtree rooted at the current bitstream position.
    ///
    /// `leaf` reads a leaf's symbol and returns the value to store in its slot.
    fn build<F>(&mut self, reader: &mut BitReader<'_>, prefix: u32, depth: u32, leaf: &mut F) -> Result<()>
    where
        F: FnMut(&mut BitReader<'_>, usize) -> u32,
    {
        if depth >= MAX_DEPTH {
            return Err(CodecError::TreeTooDeep(depth));
        }

        let index = self.push(0)?;
        self.mark_prefix(index, prefix, depth);

        if !reader.get_bit() {
            self.nodes[index] = leaf(reader, index);
            return Ok(());
        }

        self.build(reader, prefix, depth + 1, leaf)?;
        let left_size = self.nodes.len() - index - 1;
        self.nodes[index] = NODE_FLAG | left_size as u32;
        self.build(reader, prefix | (1 << depth), depth + 1, leaf)
    }

    /// Walk from the prefix-table entry to a leaf and return its slot.
    fn walk(&self, reader: &mut BitReader<'_>) -> usize {
        let entry = self.prefix[reader.peek_bits(8) as usize];
        reader.skip(entry.bits as usize);

        let mut index = entry.node as usize;
        while self.nodes[index] & NODE_FLAG != 0 {
            let left_size = (self.nodes[index] & !NODE_FLAG) as usize;
            index = if reader.get_bit() {
                index + 1 + left_size
            } else {
                index + 1
            };
        }
        index
    }
}

/// Tree with 8-bit leaves.
#[derive(Debug, Clone)]
pub struct ByteTree {
    tree: FlatTree,
}

impl ByteTree {
    /// Read a tree description from `reader`.
    ///
    /// A leading `0` bit yields the trivial tree that always decodes to 0.
    pub fn read(reader: &mut BitReader<'_>) -> Result<Self> {
        if !reader.get_bit() {
            return Ok(Self {
                tree: FlatTree::trivial(0),
            });
        }

        let mut tree = FlatTree::with_capacity(BYTE_TREE_CAPACITY);
        tree.build(reader, 0, 0, &mut |r, _| r.get_bits(8))?;
        // Closing bit
        reader.skip(1);

        tracing::trace!(nodes = tree.nodes.len(), "byte tree");
        Ok(Self { tree })
    }

    /// Decode one symbol.
    pub fn decode(&self, reader: &mut BitReader<'_>) -> u8 {
        self.tree.nodes[self.tree.walk(reader)] as u8
    }

    /// Number of slots in the arena.
    pub fn len(&self) -> usize {
        self.tree.nodes.len()
    }

    /// Whether the arena is empty (never true for a built tree).
    pub fn is_empty(&self) -> bool {
        self.tree.nodes.is_empty()
    }
}

/// Tree with 16-bit leaves composed from two byte trees, with three MRU marker slots.
#[derive(Debug, Clone)]
pub struct WordTree {
    tree: FlatTree,
    markers: [u16; 3],
    last: [usize; 3],
}

impl WordTree {
    /// Read a word tree description, allowing at most `capacity` slots
    /// (appended marker slots included).
    pub fn read(reader: &mut BitReader<'_>, capacity: usize) -> Result<Self> {
        if !reader.get_bit() {
            return Ok(Self {
                tree: FlatTree::trivial(0),
                markers: [0; 3],
                last: [0; 3],
            });
        }

        let low = ByteTree::read(reader)?;
        let high = ByteTree::read(reader)?;
        let markers = [
            reader.get_bits(16) as u16,
            reader.get_bits(16) as u16,
            reader.get_bits(16) as u16,
        ];

        let mut found: [Option<usize>; 3] = [None; 3];
        let mut tree = FlatTree::with_capacity(capacity);
        tree.build(reader, 0, 0, &mut |r, index| {
            let lo = low.decode(r) as u32;
            let hi = high.decode(r) as u32;
            let value = lo | (hi << 8);

            let mut stored = value;
            for (slot, marker) in found.iter_mut().zip(markers) {
                if marker as u32 == value {
                    *slot = Some(index);
                    stored = 0;
                }
            }
            stored
        })?;
        // Closing bit
        reader.skip(1);

        let mut last = [0usize; 3];
        for (slot, found) in last.iter_mut().zip(found) {
            *slot = match found {
                Some(index) => index,
                None => tree.push(0)?,
            };
        }

        tracing::trace!(nodes = tree.nodes.len(), ?markers, ?last, "word tree");
        Ok(Self {
            tree,
            markers,
            last,
        })
    }

    /// Decode one symbol and update the recently-used slots.
    pub fn decode(&mut self, reader: &mut BitReader<'_>) -> u16 {
        let index = self.tree.walk(reader);
        let value = self.tree.nodes[index];

        let nodes = &mut self.tree.nodes;
        let [l0, l1, l2] = self.last;
        if value != nodes[l0] {
            nodes[l2] = nodes[l1];
            nodes[l1] = nodes[l0];
            nodes[l0] = value;
        }
        value as u16
    }

    /// Clear the values held by the three marker slots.
    ///
    /// The tree shape and prefix table are untouched.
    pub fn reset(&mut self) {
        for &slot in &self.last {
            self.tree.nodes[slot] = 0;
        }
    }

    /// Marker values read from the stream.
    pub fn markers(&self) -> [u16; 3] {
        self.markers
    }

    /// Arena slots currently serving as marker slots.
    pub fn marker_slots(&self) -> [usize; 3] {
        self.last
    }

    /// Raw arena contents.
    pub fn nodes(&self) -> &[u32] {
        &self.tree.nodes
    }

    /// Number of slots in the arena.
    pub fn len(&self) -> usize {
        self.tree.nodes.len()
    }

    /// Whether the arena is empty (never true for a built tree).
    pub fn is_empty(&self) -> bool {
        self.tree.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{BitWriter, CodeTree, WordEncoder, WordTreeSpec};

    fn byte_tree_abc() -> CodeTree<u8> {
        // a = 0, b = 10, c = 11
        CodeTree::node(
            CodeTree::leaf(b'a'),
            CodeTree::node(CodeTree::leaf(b'b'), CodeTree::leaf(b'c')),
        )
    }

    #[test]
    fn test_trivial_byte_tree() {
        let mut w = BitWriter::new();
        w.put_bit(false);
        w.put_bits(0b1010, 4);
        let data = w.finish();

        let mut reader = BitReader::lsb(&data);
        let tree = ByteTree::read(&mut reader).unwrap();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.decode(&mut reader), 0);
        assert_eq!(reader.position(), 1, "trivial codes consume nothing");
    }

    #[test]
    fn test_flat_layout() {
        let mut w = BitWriter::new();
        byte_tree_abc().write_byte_tree(&mut w);
        let data = w.finish();

        let mut reader = BitReader::lsb(&data);
        let tree = ByteTree::read(&mut reader).unwrap();
        // root, a, node, b, c
        assert_eq!(
            tree.tree.nodes,
            vec![NODE_FLAG | 1, b'a' as u32, NODE_FLAG | 1, b'b' as u32, b'c' as u32]
        );
        assert_eq!(tree.tree.prefix[0b000].node, 1);
        assert_eq!(tree.tree.prefix[0b000].bits, 1);
        assert_eq!(tree.tree.prefix[0b001].node, 3);
        assert_eq!(tree.tree.prefix[0b011].node, 4);
        assert_eq!(tree.tree.prefix[0b011].bits, 2);
    }

    #[test]
    fn test_byte_round_trip() {
        let tree_spec = byte_tree_abc();
        let message = b"abacabbccaab";

        let mut w = BitWriter::new();
        tree_spec.write_byte_tree(&mut w);
        for &symbol in message {
            tree_spec.encode(&mut w, symbol);
        }
        let data = w.finish();

        let mut reader = BitReader::lsb(&data);
        let tree = ByteTree::read(&mut reader).unwrap();
        let decoded: Vec<u8> = (0..message.len()).map(|_| tree.decode(&mut reader)).collect();
        assert_eq!(&decoded, message);
        assert!(!reader.is_eos());
    }

    #[test]
    fn test_deep_codes_walk_past_prefix_table() {
        // Degenerate chain: codes 1, 01, 001, ... up to 12 bits deep.
        let symbols: Vec<u8> = (0..13).collect();
        let tree_spec = CodeTree::chain(&symbols);
        let message = [12u8, 0, 11, 5, 12, 9, 10];

        let mut w = BitWriter::new();
        tree_spec.write_byte_tree(&mut w);
        for &symbol in &message {
            tree_spec.encode(&mut w, symbol);
        }
        let data = w.finish();

        let mut reader = BitReader::lsb(&data);
        let tree = ByteTree::read(&mut reader).unwrap();
        for &expected in &message {
            assert_eq!(tree.decode(&mut reader), expected);
        }
    }

    #[test]
    fn test_truncated_tree_does_not_panic() {
        // A lone "internal node" bit followed by nothing: zero-fill yields leaves.
        let data = [0b0000_0011];
        let mut reader = BitReader::lsb(&data);
        let tree = ByteTree::read(&mut reader).unwrap();
        assert_eq!(tree.decode(&mut reader), 0);
        assert!(reader.is_eos());
    }

    #[test]
    fn test_word_tree_overflow_is_an_error() {
        let spec = WordTreeSpec::balanced(&[1, 2, 3, 4, 5, 6, 7, 8], [0x100, 0x200, 0x300]);
        let mut w = BitWriter::new();
        spec.write(&mut w);
        let data = w.finish();

        let mut reader = BitReader::lsb(&data);
        let err = WordTree::read(&mut reader, 8).unwrap_err();
        assert!(matches!(err, CodecError::TreeOverflow { capacity: 8, .. }));
    }

    #[test]
    fn test_word_round_trip_with_markers() {
        let markers = [0xF000, 0xF001, 0xF002];
        let spec = WordTreeSpec::balanced(
            &[0x0102, 0x0304, 0x0506, 0x0708, 0xF000, 0xF001, 0xF002],
            markers,
        );
        let message = [
            0x0102, 0x0304, 0x0102, 0x0102, 0x0506, 0x0304, 0x0708, 0x0708, 0x0102,
        ];

        let mut w = BitWriter::new();
        spec.write(&mut w);
        let mut encoder = WordEncoder::new(&spec);
        for &value in &message {
            encoder.encode(&mut w, value);
        }
        assert!(encoder.marker_hits() > 0, "fixture must exercise marker slots");
        let data = w.finish();

        let mut reader = BitReader::lsb(&data);
        let mut tree = WordTree::read(&mut reader, 1024).unwrap();
        assert_eq!(tree.markers(), markers);
        let decoded: Vec<u16> = message.iter().map(|_| tree.decode(&mut reader)).collect();
        assert_eq!(decoded, message);
    }

    #[test]
    fn test_missing_markers_get_appended_slots() {
        let spec = WordTreeSpec::balanced(&[0x0010, 0x0020], [0xAAAA, 0xBBBB, 0xCCCC]);
        let mut w = BitWriter::new();
        spec.write(&mut w);
        let data = w.finish();

        let mut reader = BitReader::lsb(&data);
        let tree = WordTree::read(&mut reader, 64).unwrap();
        // root + two leaves, then three appended slots
        assert_eq!(tree.len(), 6);
        assert_eq!(tree.marker_slots(), [3, 4, 5]);
        assert!(tree.nodes()[3..].iter().all(|&v| v == 0));
    }

    #[test]
    fn test_mru_shift_and_reset() {
        let spec = WordTreeSpec::balanced(&[0x0011, 0x0022, 0x0033, 0x0044], [0xA, 0xB, 0xC]);
        let values = [0x0011, 0x0022, 0x0022, 0x0033];

        let mut w = BitWriter::new();
        spec.write(&mut w);
        for &value in &values {
            spec.encode_leaf(&mut w, value);
        }
        let data = w.finish();

        let mut reader = BitReader::lsb(&data);
        let mut tree = WordTree::read(&mut reader, 64).unwrap();
        let before_prefix = tree.tree.prefix.clone();
        let shape: Vec<u32> = tree.nodes()[..7].to_vec();

        for _ in &values {
            tree.decode(&mut reader);
        }
        let slots = tree.marker_slots();
        let cached: Vec<u32> = slots.iter().map(|&s| tree.nodes()[s]).collect();
        // Repeated 0x22 does not shift the cache.
        assert_eq!(cached, vec![0x0033, 0x0022, 0x0011]);

        tree.reset();
        assert!(slots.iter().all(|&s| tree.nodes()[s] == 0));
        assert_eq!(&tree.nodes()[..7], &shape[..], "reset touches only marker slots");
        assert!(tree
            .tree
            .prefix
            .iter()
            .zip(before_prefix.iter())
            .all(|(a, b)| a.node == b.node && a.bits == b.bits));
    }

    #[test]
    fn test_trivial_word_tree() {
        let data = [0u8; 2];
        let mut reader = BitReader::lsb(&data);
        let mut tree = WordTree::read(&mut reader, 16).unwrap();
        assert_eq!(tree.marker_slots(), [0, 0, 0]);
        assert_eq!(tree.decode(&mut reader), 0);
        assert_eq!(tree.decode(&mut reader), 0);
        tree.reset();
        assert_eq!(tree.nodes(), &[0]);
    }
}
