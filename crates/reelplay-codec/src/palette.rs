//! 256-entry colour table and the two palette update encodings.

/// Size of a palette in bytes.
pub const PALETTE_BYTES: usize = 768;

/// Expand a 6-bit colour component to 8 bits.
pub fn expand_6bit(value: u8) -> u8 {
    let v = value & 0x3F;
    (v << 2) | (v >> 4)
}

/// RGB palette with a dirty flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    colors: [u8; PALETTE_BYTES],
    dirty: bool,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            colors: [0; PALETTE_BYTES],
            dirty: false,
        }
    }
}

impl Palette {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from 256 packed 6-bit triplets.
    pub fn from_6bit(triplets: &[u8]) -> Self {
        let mut palette = Self::new();
        palette.set_6bit_range(0, triplets);
        palette
    }

    pub fn colors(&self) -> &[u8; PALETTE_BYTES] {
        &self.colors
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Mark the palette changed.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Return the dirty flag and clear it.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    /// Replace every entry, raising the dirty flag if anything differs.
    pub fn replace(&mut self, colors: &[u8; PALETTE_BYTES]) {
        if self.colors != *colors {
            self.colors = *colors;
            self.dirty = true;
        }
    }

    /// Overwrite entries from `start` with 6-bit triplets. Entries past 255 are dropped.
    pub fn set_6bit_range(&mut self, start: usize, triplets: &[u8]) {
        for (i, rgb) in triplets.chunks_exact(3).enumerate() {
            let index = start + i;
            if index >= 256 {
                break;
            }
            let at = index * 3;
            self.colors[at] = expand_6bit(rgb[0]);
            self.colors[at + 1] = expand_6bit(rgb[1]);
            self.colors[at + 2] = expand_6bit(rgb[2]);
        }
        self.dirty = true;
    }

    /// Apply an SMK palette delta body (the bytes after the length byte).
    ///
    /// Opcodes, until 256 entries are covered:
    /// - `1nnnnnnn`: keep the next `n + 1` entries,
    /// - `01nnnnnn s`: copy `n + 1` entries of the previous palette starting at `s`,
    /// - `00rrrrrr g b`: one literal 6-bit triplet.
    ///
    /// Truncated bodies stop where the data ends.
    pub fn apply_delta(&mut self, body: &[u8]) {
        let previous = self.colors;
        let mut data = body.iter().copied();
        let mut index = 0usize;

        while index < 256 {
            let Some(op) = data.next() else {
                tracing::warn!(entries = index, "palette delta ended early");
                break;
            };

            if op & 0x80 != 0 {
                index += (op & 0x7F) as usize + 1;
            } else if op & 0x40 != 0 {
                let count = (op & 0x3F) as usize + 1;
                let Some(source) = data.next() else {
                    break;
                };
                let source = source as usize;
                let count = count.min(256 - index).min(256 - source);
                self.colors[index * 3..(index + count) * 3]
                    .copy_from_slice(&previous[source * 3..(source + count) * 3]);
                index += count;
            } else {
                let (Some(g), Some(b)) = (data.next(), data.next()) else {
                    break;
                };
                let at = index * 3;
                self.colors[at] = expand_6bit(op);
                self.colors[at + 1] = expand_6bit(g);
                self.colors[at + 2] = expand_6bit(b);
                index += 1;
            }
        }

        self.dirty = true;
    }
}
