//! Sliding-window LZ77 decompressor used by CINE video parts.
//!
//! Two window conventions exist. Streams that begin with the four magic bytes
//! [`EXTENDED_MAGIC`] start writing at window offset 273 and can escape to
//! lengths above 18; all other streams start at offset 4078 and carry the
//! length in a single nibble.

use crate::error::{CodecError, Result};

/// Usable window size.
pub const WINDOW_SIZE: usize = 4096;

/// Slack past the window end; the first `WINDOW_SLACK` bytes are mirrored there
/// so a run can be read without wrapping.
pub const WINDOW_SLACK: usize = 274;

/// Leading bytes selecting the extended convention.
pub const EXTENDED_MAGIC: [u8; 4] = [0x34, 0x12, 0x78, 0x56];

/// Value used to pre-fill the window ahead of the initial cursor.
const FILL: u8 = 0x20;

/// Extra length added to an escaped length byte.
const ESCAPE_BIAS: usize = 0x12;

const WINDOW_MASK: usize = WINDOW_SIZE - 1;

/// Window convention of a compressed stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lz77Variant {
    /// Cursor 4078, no length escape.
    Legacy,
    /// Magic-prefixed; cursor 273, length escape at 18.
    Extended,
}

impl Lz77Variant {
    /// Detect the convention from the head of a stream.
    pub fn detect(src: &[u8]) -> Self {
        if src.starts_with(&EXTENDED_MAGIC) {
            Self::Extended
        } else {
            Self::Legacy
        }
    }

    /// Initial window write position.
    pub fn initial_cursor(self) -> usize {
        match self {
            Self::Legacy => 4078,
            Self::Extended => 273,
        }
    }

    /// Decoded length that signals an extra length byte.
    ///
    /// The legacy sentinel is 0, which no decoded length (always >= 3) matches.
    pub fn escape(self) -> usize {
        match self {
            Self::Legacy => 0,
            Self::Extended => 0x12,
        }
    }

    /// Longest run a token can express.
    pub fn max_length(self) -> usize {
        match self {
            Self::Legacy => 18,
            Self::Extended => 0xFF + ESCAPE_BIAS,
        }
    }
}

/// Rolling history buffer.
struct Window {
    buf: Vec<u8>,
    cursor: usize,
}

impl Window {
    fn new(cursor: usize) -> Self {
        let mut buf = vec![0u8; WINDOW_SIZE + WINDOW_SLACK];
        buf[..cursor].fill(FILL);
        let mirrored = cursor.min(WINDOW_SLACK);
        buf.copy_within(..mirrored, WINDOW_SIZE);
        Self { buf, cursor }
    }

    fn push(&mut self, byte: u8) {
        self.buf[self.cursor] = byte;
        if self.cursor < WINDOW_SLACK {
            self.buf[WINDOW_SIZE + self.cursor] = byte;
        }
        self.cursor = (self.cursor + 1) & WINDOW_MASK;
    }

    fn get(&self, index: usize) -> u8 {
        self.buf[index]
    }
}

/// Decompress `src` into `dest`, producing at most `declared` bytes.
///
/// Returns the number of bytes written, which is less than `declared` only if
/// `src` ran out first. A `declared` size larger than `dest` is refused
/// before anything is written.
pub fn decompress(src: &[u8], declared: usize, dest: &mut [u8]) -> Result<usize> {
    if declared > dest.len() {
        return Err(CodecError::DestinationTooSmall {
            need: declared,
            have: dest.len(),
        });
    }

    let variant = Lz77Variant::detect(src);
    let mut pos = match variant {
        Lz77Variant::Extended => EXTENDED_MAGIC.len(),
        Lz77Variant::Legacy => 0,
    };
    let mut window = Window::new(variant.initial_cursor());
    let mut out = 0usize;

    'outer: while out < declared {
        let Some(&control) = src.get(pos) else {
            break;
        };
        pos += 1;

        for bit in (0..8).rev() {
            if out >= declared {
                break 'outer;
            }

            if control & (1 << bit) != 0 {
                let Some(&literal) = src.get(pos) else {
                    break 'outer;
                };
                pos += 1;
                dest[out] = literal;
                out += 1;
                window.push(literal);
                continue;
            }

            let (Some(&b0), Some(&b1)) = (src.get(pos), src.get(pos + 1)) else {
                break 'outer;
            };
            pos += 2;

            let offset = b0 as usize | ((b1 as usize & 0xF0) << 4);
            let mut length = (b1 as usize & 0x0F) + 3;
            if length == variant.escape() {
                let Some(&extra) = src.get(pos) else {
                    break 'outer;
                };
                pos += 1;
                length = extra as usize + ESCAPE_BIAS;
            }

            // Byte by byte: a run may read bytes it has just written.
            for k in 0..length {
                if out >= declared {
                    break 'outer;
                }
                let byte = window.get(offset + k);
                dest[out] = byte;
                out += 1;
                window.push(byte);
            }
        }
    }

    if out < declared {
        tracing::warn!(produced = out, declared, "LZ77 input exhausted early");
    }
    Ok(out)
}

/// Decompress a stream prefixed with its declared size (u32 little endian).
pub fn decompress_framed(src: &[u8], dest: &mut [u8]) -> Result<usize> {
    let Some(head) = src.get(..4) else {
        return Err(CodecError::TruncatedBlock {
            offset: 0,
            need: 4,
            have: src.len(),
        });
    };
    let declared = u32::from_le_bytes([head[0], head[1], head[2], head[3]]) as usize;
    decompress(&src[4..], declared, dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::lz77_compress;

    fn corpus() -> Vec<Vec<u8>> {
        let mut text = Vec::new();
        for i in 0..200u32 {
            text.extend_from_slice(format!("frame {i} of the reel, frame {} again; ", i % 7).as_bytes());
        }
        let mut noise = Vec::new();
        let mut seed = 0x1234_5678u32;
        for _ in 0..5000 {
            seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            noise.push((seed >> 24) as u8);
        }
        vec![
            Vec::new(),
            b"a".to_vec(),
            b"abababababababababababababababab".to_vec(),
            vec![0u8; 3000],
            text,
            noise,
        ]
    }

    #[test]
    fn test_identity_both_variants() {
        for variant in [Lz77Variant::Legacy, Lz77Variant::Extended] {
            for data in corpus() {
                let packed = lz77_compress(&data, variant);
                assert_eq!(Lz77Variant::detect(&packed), variant);

                let mut out = vec![0u8; data.len()];
                let produced = decompress(&packed, data.len(), &mut out).unwrap();
                assert_eq!(produced, data.len());
                assert_eq!(out, data, "{variant:?} round trip of {} bytes", data.len());
            }
        }
    }

    #[test]
    fn test_overlapping_run_replicates_pattern() {
        // Literals "ab" at cursor 4078/4079, then a run of 10 from 4078.
        let src = [0b1100_0000, b'a', b'b', 0xEE, 0xF7];
        let mut out = [0u8; 12];
        let n = decompress(&src, 12, &mut out).unwrap();
        assert_eq!(n, 12);
        assert_eq!(&out, b"abababababab");
    }

    #[test]
    fn test_extended_escape_length() {
        // One literal at 273 (0x111), then an escaped run: nibble 15 -> 18 -> extra 2 -> 20
        let mut src = EXTENDED_MAGIC.to_vec();
        src.extend_from_slice(&[0b1000_0000, b'z', 0x11, 0x1F, 0x02]);
        let mut out = [0u8; 21];
        let n = decompress(&src, 21, &mut out).unwrap();
        assert_eq!(n, 21);
        assert!(out.iter().all(|&b| b == b'z'));
    }

    #[test]
    fn test_prefilled_window_reads_spaces() {
        // Legacy run of 3 from offset 0, inside the space-filled region.
        let src = [0x00, 0x00, 0x00];
        let mut out = [0u8; 3];
        assert_eq!(decompress(&src, 3, &mut out).unwrap(), 3);
        assert_eq!(&out, b"   ");
    }

    #[test]
    fn test_declared_larger_than_destination_is_refused() {
        let mut out = [0xAAu8; 4];
        let err = decompress(&[0xFF, 1, 2, 3, 4, 5, 6, 7, 8], 8, &mut out).unwrap_err();
        assert!(matches!(err, CodecError::DestinationTooSmall { need: 8, have: 4 }));
        assert_eq!(out, [0xAA; 4]);
    }

    #[test]
    fn test_output_stops_at_declared() {
        let src = [0xFF, 1, 2, 3, 4, 5, 6, 7, 8];
        let mut out = [0u8; 16];
        assert_eq!(decompress(&src, 5, &mut out).unwrap(), 5);
        assert_eq!(&out[..6], &[1, 2, 3, 4, 5, 0]);
    }

    #[test]
    fn test_truncated_input_returns_short_count() {
        let src = [0xFF, 1, 2];
        let mut out = [0u8; 8];
        assert_eq!(decompress(&src, 8, &mut out).unwrap(), 2);
    }

    #[test]
    fn test_framed() {
        let data = b"framed framed framed".to_vec();
        let packed = lz77_compress(&data, Lz77Variant::Extended);
        let mut framed = (data.len() as u32).to_le_bytes().to_vec();
        framed.extend_from_slice(&packed);

        let mut out = vec![0u8; 64];
        let n = decompress_framed(&framed, &mut out).unwrap();
        assert_eq!(&out[..n], &data[..]);

        assert!(matches!(
            decompress_framed(&[1, 2], &mut out),
            Err(CodecError::TruncatedBlock { need: 4, have: 2, .. })
        ));
    }
}
