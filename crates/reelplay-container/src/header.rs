//! Header fields shared by both container formats.

#[cfg(feature = "serialize")]
use serde::Serialize;

use crate::audio::AudioEncoding;
use crate::error::{ContainerError, Result};
use crate::mixer::PcmFormat;

/// Frames per second as a reduced fraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(Serialize))]
pub struct FrameRate {
    num: u64,
    den: u64,
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

impl FrameRate {
    /// Build `num / den`, reduced. A zero term yields 1000 fps.
    pub fn new(num: u64, den: u64) -> Self {
        if num == 0 || den == 0 {
            return Self { num: 1000, den: 1 };
        }
        let g = gcd(num, den);
        Self {
            num: num / g,
            den: den / g,
        }
    }

    /// Derive the rate from a header frame delay.
    ///
    /// A positive delay is in milliseconds, a negative one in units of 10
    /// microseconds, and zero means 1000 fps.
    pub fn from_delay(delay: i32) -> Self {
        let delay = delay as i64;
        if delay > 0 {
            Self::new(1000, delay as u64)
        } else if delay < 0 {
            Self::new(100_000, (-delay) as u64)
        } else {
            Self::new(1000, 1)
        }
    }

    pub fn num(&self) -> u64 {
        self.num
    }

    pub fn den(&self) -> u64 {
        self.den
    }

    pub fn as_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }

    /// Start time of `frame` in milliseconds, saturating at `u64::MAX`.
    pub fn frame_time_ms(&self, frame: u64) -> u64 {
        let ms = frame as u128 * 1000 * self.den as u128 / self.num as u128;
        u64::try_from(ms).unwrap_or(u64::MAX)
    }

    /// Frame displayed at `time_ms`, saturating at `u64::MAX`.
    pub fn frame_at_ms(&self, time_ms: u64) -> u64 {
        let frame = time_ms as u128 * self.num as u128 / (1000 * self.den as u128);
        u64::try_from(frame).unwrap_or(u64::MAX)
    }
}

/// Per-track audio descriptor bitfield.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AudioDescriptor(pub u32);

impl AudioDescriptor {
    pub const COMPRESSED: u32 = 1 << 31;
    pub const PRESENT: u32 = 1 << 30;
    pub const SIXTEEN_BIT: u32 = 1 << 29;
    pub const STEREO: u32 = 1 << 28;
    pub const RDFT: u32 = 1 << 27;
    pub const DCT: u32 = 1 << 26;

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn is_present(&self) -> bool {
        self.0 & Self::PRESENT != 0
    }

    pub fn is_compressed(&self) -> bool {
        self.0 & Self::COMPRESSED != 0
    }

    pub fn is_16bit(&self) -> bool {
        self.0 & Self::SIXTEEN_BIT != 0
    }

    pub fn is_stereo(&self) -> bool {
        self.0 & Self::STEREO != 0
    }

    pub fn sample_rate(&self) -> u32 {
        self.0 & 0x00FF_FFFF
    }

    pub fn pcm_format(&self) -> PcmFormat {
        PcmFormat {
            sample_rate: self.sample_rate(),
            channels: if self.is_stereo() { 2 } else { 1 },
            bits: if self.is_16bit() { 16 } else { 8 },
        }
    }

    /// Payload encoding of a present track.
    ///
    /// Returns `None` for an absent track and an error for the transform
    /// codecs, which are not implemented.
    pub fn encoding(&self) -> Result<Option<AudioEncoding>> {
        if !self.is_present() {
            return Ok(None);
        }
        if self.0 & Self::RDFT != 0 {
            return Err(ContainerError::unsupported("RDFT audio"));
        }
        if self.0 & Self::DCT != 0 {
            return Err(ContainerError::unsupported("DCT audio"));
        }
        if self.sample_rate() == 0 {
            return Err(ContainerError::invalid_header("audio track with zero sample rate"));
        }
        Ok(Some(if self.is_compressed() {
            AudioEncoding::Dpcm
        } else {
            AudioEncoding::Raw
        }))
    }
}

/// Summary of a loaded container.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serialize", derive(Serialize))]
pub struct ContainerInfo {
    pub format: &'static str,
    pub width: u32,
    pub height: u32,
    pub frame_count: u32,
    pub frame_rate: FrameRate,
    pub duration_ms: u64,
    pub keyframes: usize,
    pub audio_tracks: Vec<AudioTrackInfo>,
    pub reversible: bool,
}

/// Summary of one audio track.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(Serialize))]
pub struct AudioTrackInfo {
    pub index: usize,
    pub sample_rate: u32,
    pub channels: u16,
    pub bits: u16,
    pub compressed: bool,
}

impl AudioTrackInfo {
    pub fn from_descriptor(index: usize, descriptor: AudioDescriptor) -> Self {
        let format = descriptor.pcm_format();
        Self {
            index,
            sample_rate: format.sample_rate,
            channels: format.channels,
            bits: format.bits,
            compressed: descriptor.is_compressed(),
        }
    }
}
