//! Reelplay-Codec: bitstream and pixel primitives for SMK and CINE video
//!
//! This crate holds everything that turns compressed bytes into pixels and
//! PCM without knowing about container layout or timing.
//!
//! # Modules
//!
//! - `bitreader` - Bit cursor with LSB-first and 16-bit MSB-first orders
//! - `huffman` - Flat-array byte and word Huffman trees with a prefix table
//! - `lz77` - Sliding-window decompressor with both window conventions
//! - `blit` - Tile compositing (whole, sparse, RLE, scaled) with clipping
//! - `surface` / `palette` - Framebuffer and colour table with dirty tracking
//! - `dpcm` - Huffman-coded DPCM audio chunks
//!
//! # Error model
//!
//! Running off the end of a bitstream is never an error: the bit reader
//! yields zero bits and raises a flag. Errors are reserved for input whose
//! structure is wrong (oversized trees, truncated tiles, invalid runs).

pub mod bitreader;
pub mod blit;
pub mod dpcm;
pub mod error;
pub mod huffman;
pub mod lz77;
pub mod palette;
pub mod surface;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;

pub use bitreader::{BitOrder, BitReader};
pub use blit::{render_block, BlockRenderer, Scale, TileRect};
pub use dpcm::DpcmLayout;
pub use error::{CodecError, Result};
pub use huffman::{ByteTree, WordTree};
pub use lz77::{decompress, decompress_framed, Lz77Variant};
pub use palette::{expand_6bit, Palette, PALETTE_BYTES};
pub use surface::{PixelFormat, Surface};
