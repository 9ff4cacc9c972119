//! Frame and audio export.
//!
//! Frames are written as RGB PNGs through `image`; indexed surfaces are
//! resolved against the palette current at the time of the frame. Audio
//! tracks are collected from a [`BufferedMixer`] and written as PCM WAV.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use bytes::BufMut;
use reelplay_codec::palette::PALETTE_BYTES;
use reelplay_codec::{PixelFormat, Surface};
use reelplay_container::{BufferedMixer, PcmFormat};

use crate::config::ExportConfig;
use crate::player::Player;

/// Size of the RIFF/WAVE header written before the samples.
pub const WAV_HEADER_SIZE: usize = 44;

/// Convert a surface to an RGB image.
pub fn surface_to_rgb(surface: &Surface, palette: &[u8; PALETTE_BYTES]) -> Result<image::RgbImage> {
    let (width, height) = (surface.width(), surface.height());
    let mut rgb = Vec::with_capacity(width as usize * height as usize * 3);
    for y in 0..height {
        let row = surface.row(y);
        match surface.format() {
            PixelFormat::Rgb24 => rgb.extend_from_slice(row),
            PixelFormat::Indexed8 => {
                for &index in row {
                    let at = index as usize * 3;
                    rgb.extend_from_slice(&palette[at..at + 3]);
                }
            }
        }
    }

    image::RgbImage::from_raw(width, height, rgb)
        .with_context(|| format!("Surface of {}x{} does not fit an RGB image", width, height))
}

/// Write one frame as a PNG.
pub fn write_png(path: &Path, surface: &Surface, palette: &[u8; PALETTE_BYTES]) -> Result<()> {
    surface_to_rgb(surface, palette)?
        .save_with_format(path, image::ImageFormat::Png)
        .with_context(|| format!("Failed to write frame: {}", path.display()))
}

/// RIFF/WAVE file bytes for `pcm` in `format`.
pub fn wav_bytes(format: PcmFormat, pcm: &[u8]) -> Vec<u8> {
    let data_len = pcm.len() as u32;
    let mut out = Vec::with_capacity(WAV_HEADER_SIZE + pcm.len());

    out.put_slice(b"RIFF");
    out.put_u32_le(36 + data_len);
    out.put_slice(b"WAVE");

    out.put_slice(b"fmt ");
    out.put_u32_le(16);
    out.put_u16_le(1);
    out.put_u16_le(format.channels);
    out.put_u32_le(format.sample_rate);
    out.put_u32_le(format.bytes_per_second() as u32);
    out.put_u16_le(format.frame_bytes() as u16);
    out.put_u16_le(format.bits);

    out.put_slice(b"data");
    out.put_u32_le(data_len);
    out.put_slice(pcm);
    out
}

/// Write `pcm` as a WAV file.
pub fn write_wav(path: &Path, format: PcmFormat, pcm: &[u8]) -> Result<()> {
    std::fs::write(path, wav_bytes(format, pcm))
        .with_context(|| format!("Failed to write audio: {}", path.display()))
}

/// What an extraction produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    pub frames_decoded: u32,
    pub frames: Vec<PathBuf>,
    pub audio: Vec<PathBuf>,
}

/// Decode `player` as fast as possible into `out_dir`.
///
/// `mixer` must be the mixer the player was loaded with; queued audio is
/// drained from it once the last frame is decoded.
pub fn extract(
    player: &mut Player,
    mixer: &Arc<BufferedMixer>,
    config: &ExportConfig,
    out_dir: &Path,
) -> Result<ExtractSummary> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create output directory: {}", out_dir.display()))?;

    let mut summary = ExtractSummary::default();
    let stride = config.frame_stride.max(1);
    player.start();

    while !player.end_of_video() {
        if !player.decode_next_frame()? {
            break;
        }
        summary.frames_decoded += 1;

        let frame = player.current_frame();
        let (colors, _) = player.take_palette();
        let colors = *colors;
        if frame % stride as i64 != 0 {
            continue;
        }

        let Some(surface) = player.surface() else {
            break;
        };
        let path = out_dir.join(format!("frame_{:05}.png", frame));
        write_png(&path, surface, &colors)?;
        tracing::debug!("Wrote {}", path.display());
        summary.frames.push(path);
    }

    if config.write_audio {
        for (index, (handle, format)) in player.audio_streams().into_iter().enumerate() {
            let pcm = mixer.drain(handle);
            if pcm.is_empty() {
                continue;
            }
            let path = out_dir.join(format!("audio_{}.wav", index));
            write_wav(&path, format, &pcm)?;
            tracing::debug!("Wrote {} ({} bytes of PCM)", path.display(), pcm.len());
            summary.audio.push(path);
        }
    }

    player.stop();
    Ok(summary)
}
