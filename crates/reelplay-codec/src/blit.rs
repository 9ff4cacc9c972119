//! Tile compositing for CINE video parts.
//!
//! Each video part paints one rectangular tile whose bytes are laid out for
//! the *whole* tile. The destination is clipped to the surface (and to the
//! tile), but the source is always consumed as if nothing were clipped, so
//! that the next row and the next tile start where the encoder put them.

use crate::error::{CodecError, Result};
use crate::surface::Surface;

/// Destination rectangle of a tile, in surface pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TileRect {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

impl TileRect {
    pub fn new(left: i32, top: i32, width: u32, height: u32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }
}

/// Destination pixels covered by one source pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scale {
    pub x: u32,
    pub y: u32,
}

impl Scale {
    pub const ONE: Self = Self { x: 1, y: 1 };
    pub const QUARTER_WIDTH: Self = Self { x: 4, y: 1 };
    pub const HALF_HEIGHT: Self = Self { x: 1, y: 2 };

    /// Source pixels per row for a tile `width` wide.
    pub fn source_columns(self, width: u32) -> usize {
        width.div_ceil(self.x) as usize
    }

    /// Source rows for a tile `height` tall.
    pub fn source_rows(self, height: u32) -> usize {
        height.div_ceil(self.y) as usize
    }
}

/// Bounds-checked read position in a tile's source bytes.
#[derive(Debug)]
pub struct SourceCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> SourceCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    pub fn byte(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos + n;
        if end > self.data.len() {
            return Err(CodecError::TruncatedBlock {
                offset: self.pos,
                need: n,
                have: self.data.len() - self.pos,
            });
        }
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }
}

/// Writes source pixels into a surface, clipped to the surface and the tile.
pub struct Painter<'s> {
    surface: &'s mut Surface,
    rect: TileRect,
    scale: Scale,
    bpp: usize,
}

impl<'s> Painter<'s> {
    pub fn new(surface: &'s mut Surface, rect: TileRect, scale: Scale) -> Self {
        let bpp = surface.bytes_per_pixel();
        Self {
            surface,
            rect,
            scale,
            bpp,
        }
    }

    pub fn bytes_per_pixel(&self) -> usize {
        self.bpp
    }

    pub fn columns(&self) -> usize {
        self.scale.source_columns(self.rect.width)
    }

    pub fn rows(&self) -> usize {
        self.scale.source_rows(self.rect.height)
    }

    /// Clipped destination span `[start, end)` on one axis.
    fn span(origin: i32, extent: u32, index: usize, step: u32, limit: u32) -> (i64, i64) {
        let tile_start = origin as i64;
        let tile_end = tile_start + extent as i64;
        let start = tile_start + index as i64 * step as i64;
        let end = (start + step as i64).min(tile_end).min(limit as i64);
        (start.max(0), end)
    }

    /// Paint consecutive source pixels starting at source column `col` of row `row`.
    pub fn put(&mut self, col: usize, row: usize, pixels: &[u8]) {
        let (y0, y1) = Self::span(self.rect.top, self.rect.height, row, self.scale.y, self.surface.height());
        if y0 >= y1 {
            return;
        }

        for (i, pixel) in pixels.chunks_exact(self.bpp).enumerate() {
            let (x0, x1) = Self::span(
                self.rect.left,
                self.rect.width,
                col + i,
                self.scale.x,
                self.surface.width(),
            );
            if x0 >= x1 {
                continue;
            }
            for y in y0..y1 {
                let line = self.surface.row_mut(y as u32);
                for x in x0..x1 {
                    let at = x as usize * self.bpp;
                    line[at..at + self.bpp].copy_from_slice(pixel);
                }
            }
        }
    }
}

/// One tile encoding.
pub trait BlockRenderer {
    /// Paint the tile, consuming exactly its unclipped geometry from `src`.
    fn render(&self, painter: &mut Painter<'_>, src: &mut SourceCursor<'_>) -> Result<()>;

    /// Source-to-destination scale of this encoding.
    fn scale(&self) -> Scale;
}

/// Dense rows.
#[derive(Debug)]
pub struct Whole {
    pub scale: Scale,
}

impl BlockRenderer for Whole {
    fn render(&self, painter: &mut Painter<'_>, src: &mut SourceCursor<'_>) -> Result<()> {
        let row_bytes = painter.columns() * painter.bytes_per_pixel();
        for row in 0..painter.rows() {
            let pixels = src.take(row_bytes)?;
            painter.put(0, row, pixels);
        }
        Ok(())
    }

    fn scale(&self) -> Scale {
        self.scale
    }
}

/// Rows of copy runs and transparent holes.
///
/// A copy run longer than the rest of the row is clamped to the row and the
/// source advances by the clamped count.
#[derive(Debug)]
pub struct Sparse {
    pub scale: Scale,
}

impl BlockRenderer for Sparse {
    fn render(&self, painter: &mut Painter<'_>, src: &mut SourceCursor<'_>) -> Result<()> {
        let bpp = painter.bytes_per_pixel();
        let columns = painter.columns();
        for row in 0..painter.rows() {
            let mut col = 0;
            while col < columns {
                let run = src.byte()?;
                let count = (run & 0x7F) as usize + 1;
                if run & 0x80 != 0 {
                    let count = count.min(columns - col);
                    let pixels = src.take(count * bpp)?;
                    painter.put(col, row, pixels);
                    col += count;
                } else {
                    col += count;
                }
            }
        }
        Ok(())
    }

    fn scale(&self) -> Scale {
        self.scale
    }
}

/// Sparse rows whose copy runs may carry pair-wise run length coding.
///
/// Runs are clamped to the row like [`Sparse`]. A pair token covering more
/// than what is left of its run paints only that remainder but still
/// consumes its whole payload.
#[derive(Debug)]
pub struct Rle;

/// First payload byte that switches a copy run to pair tokens.
pub const RLE_MARKER: u8 = 0xFF;

impl Rle {
    fn expand(
        painter: &mut Painter<'_>,
        src: &mut SourceCursor<'_>,
        row: usize,
        mut col: usize,
        count: usize,
    ) -> Result<()> {
        let bpp = painter.bytes_per_pixel();
        let end = col + count;

        if count % 2 == 1 {
            let pixel = src.take(bpp)?;
            painter.put(col, row, pixel);
            col += 1;
        }

        while col < end {
            let token = src.byte()?;
            let pairs = (token & 0x7F) as usize;
            if pairs == 0 {
                return Err(CodecError::invalid_run(format!(
                    "zero-length RLE token {token:#04x} at offset {}",
                    src.position() - 1
                )));
            }

            if token & 0x80 != 0 {
                let pixels = src.take(pairs * 2 * bpp)?;
                let paint = (pairs * 2).min(end - col);
                painter.put(col, row, &pixels[..paint * bpp]);
                col += paint;
            } else {
                let pattern = src.take(2 * bpp)?;
                for _ in 0..pairs {
                    if col >= end {
                        break;
                    }
                    let paint = (end - col).min(2);
                    painter.put(col, row, &pattern[..paint * bpp]);
                    col += paint;
                }
            }
        }
        Ok(())
    }
}

impl BlockRenderer for Rle {
    fn render(&self, painter: &mut Painter<'_>, src: &mut SourceCursor<'_>) -> Result<()> {
        let bpp = painter.bytes_per_pixel();
        let columns = painter.columns();
        for row in 0..painter.rows() {
            let mut col = 0;
            while col < columns {
                let run = src.byte()?;
                let count = (run & 0x7F) as usize + 1;
                if run & 0x80 == 0 {
                    col += count;
                    continue;
                }

                let count = count.min(columns - col);
                if src.peek() == Some(RLE_MARKER) {
                    src.byte()?;
                    Self::expand(painter, src, row, col, count)?;
                } else {
                    let pixels = src.take(count * bpp)?;
                    painter.put(col, row, pixels);
                }
                col += count;
            }
        }
        Ok(())
    }

    fn scale(&self) -> Scale {
        Scale::ONE
    }
}

static SPARSE: Sparse = Sparse { scale: Scale::ONE };
static WHOLE: Whole = Whole { scale: Scale::ONE };
static RLE: Rle = Rle;
static WHOLE_QUARTER_WIDTH: Whole = Whole {
    scale: Scale::QUARTER_WIDTH,
};
static WHOLE_HALF_HEIGHT: Whole = Whole {
    scale: Scale::HALF_HEIGHT,
};
static SPARSE_HALF_HEIGHT: Sparse = Sparse {
    scale: Scale::HALF_HEIGHT,
};

/// Renderer for a block tag (LZ77 flag already stripped).
pub fn renderer_for(tag: u8) -> &'static dyn BlockRenderer {
    match tag {
        2 => &WHOLE,
        3 => &RLE,
        4 => &WHOLE_QUARTER_WIDTH,
        5 => &WHOLE_HALF_HEIGHT,
        6 => &SPARSE_HALF_HEIGHT,
        _ => &SPARSE,
    }
}

/// Render one tile with the encoding selected by `tag` and return the number
/// of source bytes consumed.
pub fn render_block(tag: u8, dst: &mut Surface, src: &[u8], rect: TileRect) -> Result<usize> {
    let renderer = renderer_for(tag);
    let mut cursor = SourceCursor::new(src);
    let mut painter = Painter::new(dst, rect, renderer.scale());
    renderer.render(&mut painter, &mut cursor)?;
    Ok(cursor.position())
}
