//! Bit-level cursor over a byte buffer.
//!
//! Reads past the end of the buffer never fail: they produce zero bits and
//! raise the end-of-stream flag. Frame size bookkeeping in both container
//! formats is occasionally off by a few bytes, so decode loops are expected
//! to run into the end and terminate on their own symbol budgets.

/// Extra bits the position may run past the end before it stops moving.
pub const PADDING_BITS: usize = 64;

/// Bit order of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitOrder {
    /// Bits are taken from each byte starting at the least significant bit;
    /// multi-bit values are assembled LSB first.
    Lsb8,
    /// The buffer is a sequence of little-endian 16-bit words, each consumed
    /// from its most significant bit; multi-bit values are assembled MSB first.
    /// A trailing odd byte is ignored.
    Msb16,
}

/// Bit reader over a borrowed buffer.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
    len: usize,
    order: BitOrder,
    eos: bool,
}

impl<'a> BitReader<'a> {
    /// Create a reader positioned at the first bit of `data`.
    pub fn new(data: &'a [u8], order: BitOrder) -> Self {
        let len = match order {
            BitOrder::Lsb8 => data.len() * 8,
            BitOrder::Msb16 => (data.len() / 2) * 16,
        };
        Self {
            data,
            pos: 0,
            len,
            order,
            eos: false,
        }
    }

    /// Shorthand for an LSB-first reader.
    pub fn lsb(data: &'a [u8]) -> Self {
        Self::new(data, BitOrder::Lsb8)
    }

    /// Shorthand for a 16-bit word, MSB-first reader.
    pub fn msb16(data: &'a [u8]) -> Self {
        Self::new(data, BitOrder::Msb16)
    }

    /// Bit order of this reader.
    pub fn order(&self) -> BitOrder {
        self.order
    }

    /// Current position in bits.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Length of the stream in bits.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the stream holds no bits at all.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bits left before the end of the buffer.
    pub fn remaining(&self) -> usize {
        self.len.saturating_sub(self.pos)
    }

    /// Whether a read has gone past the end of the buffer.
    pub fn is_eos(&self) -> bool {
        self.eos
    }

    /// Return the next `n` bits (`n <= 32`) without consuming them.
    ///
    /// Bits past the end read as zero; the end flag is left alone.
    pub fn peek_bits(&self, n: u32) -> u32 {
        debug_assert!(n <= 32, "peek of {n} bits");
        if n == 0 {
            return 0;
        }
        match self.order {
            BitOrder::Lsb8 => self.peek_lsb(n),
            BitOrder::Msb16 => self.peek_msb16(n),
        }
    }

    /// Consume one bit.
    pub fn get_bit(&mut self) -> bool {
        let bit = self.peek_bits(1) != 0;
        self.skip(1);
        bit
    }

    /// Consume `n` bits (`n <= 32`) and return them.
    pub fn get_bits(&mut self, n: u32) -> u32 {
        let value = self.peek_bits(n);
        self.skip(n as usize);
        value
    }

    /// Advance by `n` bits.
    pub fn skip(&mut self, n: usize) {
        let target = self.pos.saturating_add(n);
        if target > self.len {
            self.eos = true;
        }
        self.pos = target.min(self.len + PADDING_BITS);
    }

    fn byte_at(&self, index: usize) -> u8 {
        if index * 8 >= self.len {
            0
        } else {
            self.data[index]
        }
    }

    fn peek_lsb(&self, n: u32) -> u32 {
        let first = self.pos >> 3;
        let shift = self.pos & 7;
        let mut acc = 0u64;
        for k in 0..5 {
            acc |= (self.byte_at(first + k) as u64) << (8 * k);
        }
        let mask = if n == 32 { u32::MAX as u64 } else { (1u64 << n) - 1 };
        ((acc >> shift) & mask) as u32
    }

    fn peek_msb16(&self, n: u32) -> u32 {
        let mut value = 0u32;
        for i in 0..n as usize {
            let bit_index = self.pos + i;
            let bit = if bit_index >= self.len {
                0
            } else {
                let word = bit_index >> 4;
                let word = u16::from_le_bytes([self.data[word * 2], self.data[word * 2 + 1]]);
                ((word >> (15 - (bit_index & 15))) & 1) as u32
            };
            value = (value << 1) | bit;
        }
        value
    }
}
