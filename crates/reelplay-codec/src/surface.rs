//! Framebuffer types.

use crate::error::{CodecError, Result};

/// Pixel layout of a [`Surface`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelFormat {
    /// One palette index per pixel.
    #[default]
    Indexed8,
    /// Packed 8-bit R, G, B.
    Rgb24,
}

impl PixelFormat {
    /// Bytes per pixel.
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Indexed8 => 1,
            Self::Rgb24 => 3,
        }
    }
}

/// A mutable framebuffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Surface {
    width: u32,
    height: u32,
    pitch: usize,
    format: PixelFormat,
    pixels: Vec<u8>,
}

impl Surface {
    /// Allocate a zeroed surface.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        let pitch = width as usize * format.bytes_per_pixel();
        Self {
            width,
            height,
            pitch,
            format,
            pixels: vec![0; pitch * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Bytes per row.
    pub fn pitch(&self) -> usize {
        self.pitch
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn bytes_per_pixel(&self) -> usize {
        self.format.bytes_per_pixel()
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    /// Row `y`, or an empty slice when out of range.
    pub fn row(&self, y: u32) -> &[u8] {
        if y >= self.height {
            return &[];
        }
        let start = y as usize * self.pitch;
        &self.pixels[start..start + self.pitch]
    }

    /// Mutable row `y`, or an empty slice when out of range.
    pub fn row_mut(&mut self, y: u32) -> &mut [u8] {
        if y >= self.height {
            return &mut [];
        }
        let start = y as usize * self.pitch;
        &mut self.pixels[start..start + self.pitch]
    }

    /// Bytes of the pixel at (`x`, `y`), if inside the surface.
    pub fn pixel(&self, x: u32, y: u32) -> Option<&[u8]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let bpp = self.bytes_per_pixel();
        let start = y as usize * self.pitch + x as usize * bpp;
        Some(&self.pixels[start..start + bpp])
    }

    /// Overwrite every byte with `value`.
    pub fn fill(&mut self, value: u8) {
        self.pixels.fill(value);
    }

    /// Convert to packed RGB using `palette` for indexed surfaces.
    pub fn to_rgb(&self, palette: &[u8; 768]) -> Vec<u8> {
        match self.format {
            PixelFormat::Rgb24 => self.pixels.clone(),
            PixelFormat::Indexed8 => {
                let mut rgb = Vec::with_capacity(self.pixels.len() * 3);
                for &index in &self.pixels {
                    let at = index as usize * 3;
                    rgb.extend_from_slice(&palette[at..at + 3]);
                }
                rgb
            }
        }
    }

    /// Require an indexed surface.
    pub fn expect_indexed(&self) -> Result<()> {
        match self.format {
            PixelFormat::Indexed8 => Ok(()),
            PixelFormat::Rgb24 => Err(CodecError::unsupported("operation needs an indexed surface")),
        }
    }
}
