//! Huffman-coded DPCM audio.
//!
//! Chunk layout (after the container's size field):
//!
//! ```text
//! u32 LE   unpacked size in bytes
//! bit      data present
//! bit      stereo
//! bit      16-bit
//! trees    one byte tree per output byte of a sample frame (1, 2 or 4)
//! bases    per channel, right channel first; 16-bit bases are stored big endian
//! deltas   per sample frame, per channel: low (and high) byte of a signed delta
//! ```
//!
//! The bases are emitted as the first sample frame. 8-bit output is unsigned
//! and saturates; 16-bit output is signed little endian and wraps.

use crate::bitreader::BitReader;
use crate::error::{CodecError, Result};
use crate::huffman::ByteTree;

/// Largest unpacked size accepted for one chunk.
pub const MAX_UNPACKED_SIZE: usize = 16 << 20;

/// Sample layout expected by the track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DpcmLayout {
    pub stereo: bool,
    pub sixteen_bit: bool,
}

impl DpcmLayout {
    pub fn channels(self) -> usize {
        if self.stereo {
            2
        } else {
            1
        }
    }

    pub fn bytes_per_sample(self) -> usize {
        if self.sixteen_bit {
            2
        } else {
            1
        }
    }

    /// Bytes per sample frame (all channels).
    pub fn frame_bytes(self) -> usize {
        self.channels() * self.bytes_per_sample()
    }
}

/// Decode one compressed chunk into PCM bytes.
///
/// Output is truncated to whole sample frames within the unpacked size. A
/// chunk whose "present" bit is clear decodes to nothing.
pub fn decode(chunk: &[u8], layout: DpcmLayout) -> Result<Vec<u8>> {
    let Some(head) = chunk.get(..4) else {
        return Err(CodecError::TruncatedBlock {
            offset: 0,
            need: 4,
            have: chunk.len(),
        });
    };
    let unpacked = u32::from_le_bytes([head[0], head[1], head[2], head[3]]) as usize;
    if unpacked > MAX_UNPACKED_SIZE {
        return Err(CodecError::BudgetExceeded {
            what: "unpacked audio",
            size: unpacked,
            limit: MAX_UNPACKED_SIZE,
        });
    }

    let mut reader = BitReader::lsb(&chunk[4..]);
    if !reader.get_bit() {
        return Ok(Vec::new());
    }

    let stereo = reader.get_bit();
    let sixteen_bit = reader.get_bit();
    if stereo != layout.stereo || sixteen_bit != layout.sixteen_bit {
        return Err(CodecError::AudioMismatch(format!(
            "chunk is stereo={stereo} 16-bit={sixteen_bit}, track is stereo={} 16-bit={}",
            layout.stereo, layout.sixteen_bit
        )));
    }

    let mut trees = Vec::with_capacity(layout.frame_bytes());
    for _ in 0..layout.frame_bytes() {
        trees.push(ByteTree::read(&mut reader)?);
    }

    let read_base = |reader: &mut BitReader<'_>| -> i32 {
        if sixteen_bit {
            (reader.get_bits(16) as u16).swap_bytes() as i16 as i32
        } else {
            reader.get_bits(8) as i32
        }
    };
    let mut bases = [0i32; 2];
    if stereo {
        bases[1] = read_base(&mut reader);
    }
    bases[0] = read_base(&mut reader);

    let frame_bytes = layout.frame_bytes();
    let frames = unpacked / frame_bytes;
    let channels = layout.channels();
    let mut out = Vec::with_capacity(frames * frame_bytes);

    let emit = |out: &mut Vec<u8>, sample: i32| {
        if sixteen_bit {
            out.extend_from_slice(&(sample as i16).to_le_bytes());
        } else {
            out.push(sample as u8);
        }
    };

    if frames > 0 {
        for &base in &bases[..channels] {
            emit(&mut out, base);
        }
    }

    for _ in 1..frames {
        for (channel, base) in bases[..channels].iter_mut().enumerate() {
            if sixteen_bit {
                let lo = trees[channel * 2].decode(&mut reader) as u16;
                let hi = trees[channel * 2 + 1].decode(&mut reader) as u16;
                let delta = (lo | (hi << 8)) as i16;
                *base = (*base as i16).wrapping_add(delta) as i32;
            } else {
                let delta = trees[channel].decode(&mut reader) as i8 as i32;
                *base = (*base + delta).clamp(0, 255);
            }
            emit(&mut out, *base);
        }
    }

    if reader.is_eos() {
        tracing::warn!(unpacked, "audio chunk bitstream ran short");
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{encode_dpcm, BitWriter, CodeTree};

    #[test]
    fn test_mono_8bit_round_trip() {
        let samples: Vec<u8> = vec![128, 130, 120, 200, 250, 255, 250, 130, 128];
        let layout = DpcmLayout {
            stereo: false,
            sixteen_bit: false,
        };
        let chunk = encode_dpcm(&samples, layout);
        assert_eq!(decode(&chunk, layout).unwrap(), samples);
    }

    #[test]
    fn test_8bit_saturates() {
        // One single-leaf tree whose only delta is +127, base 200.
        let mut w = BitWriter::new();
        w.put_bits(3, 32);
        w.put_bit(true);
        w.put_bit(false);
        w.put_bit(false);
        CodeTree::leaf(0x7F).write_byte_tree(&mut w);
        w.put_bits(200, 8);
        let chunk = w.finish();

        let layout = DpcmLayout {
            stereo: false,
            sixteen_bit: false,
        };
        assert_eq!(decode(&chunk, layout).unwrap(), vec![200, 255, 255]);
    }

    #[test]
    fn test_stereo_16bit_round_trip() {
        let samples: [i16; 10] = [-300, 1200, -280, 1100, 32000, -32000, -32768, 32767, 5, -5];
        let pcm: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        let layout = DpcmLayout {
            stereo: true,
            sixteen_bit: true,
        };
        let chunk = encode_dpcm(&pcm, layout);
        assert_eq!(decode(&chunk, layout).unwrap(), pcm);
    }

    #[test]
    fn test_stereo_8bit_round_trip() {
        let pcm: Vec<u8> = vec![10, 200, 11, 190, 12, 180, 13, 170];
        let layout = DpcmLayout {
            stereo: true,
            sixteen_bit: false,
        };
        let chunk = encode_dpcm(&pcm, layout);
        assert_eq!(decode(&chunk, layout).unwrap(), pcm);
    }

    #[test]
    fn test_layout_mismatch() {
        let layout = DpcmLayout {
            stereo: false,
            sixteen_bit: false,
        };
        let chunk = encode_dpcm(&[1, 2, 3], layout);
        let err = decode(
            &chunk,
            DpcmLayout {
                stereo: true,
                sixteen_bit: false,
            },
        )
        .unwrap_err();
        assert!(matches!(err, CodecError::AudioMismatch(_)));
    }

    #[test]
    fn test_absent_data() {
        let chunk = [8, 0, 0, 0, 0b0000_0000];
        let layout = DpcmLayout {
            stereo: false,
            sixteen_bit: true,
        };
        assert!(decode(&chunk, layout).unwrap().is_empty());
    }

    #[test]
    fn test_budget() {
        let chunk = [0, 0, 0, 0x02, 0xFF];
        let layout = DpcmLayout {
            stereo: false,
            sixteen_bit: false,
        };
        assert!(matches!(
            decode(&chunk, layout),
            Err(CodecError::BudgetExceeded { .. })
        ));
    }
}
