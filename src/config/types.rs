use reelplay_container::DecoderOptions;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub playback: PlaybackConfig,

    #[serde(default)]
    pub decode: DecodeConfig,

    #[serde(default)]
    pub export: ExportConfig,
}

impl Config {
    /// Options handed to the container decoders.
    pub fn decoder_options(&self) -> DecoderOptions {
        DecoderOptions {
            audio_enabled: self.playback.audio,
            max_tree_nodes: self.decode.max_tree_nodes,
            max_part_size: self.decode.max_part_size,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PlaybackConfig {
    /// Decode and queue audio tracks
    #[serde(default = "default_true")]
    pub audio: bool,

    /// Treat frames starting at or after this time (ms) as past the end
    #[serde(default)]
    pub end_time_ms: Option<u64>,

    /// Seek here before playing. Only frame 0 and keyframes are reachable.
    #[serde(default)]
    pub start_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            audio: true,
            end_time_ms: None,
            start_ms: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DecodeConfig {
    /// Node cap for any single SMK word tree
    #[serde(default = "default_max_tree_nodes")]
    pub max_tree_nodes: usize,

    /// Largest CINE frame part accepted, in bytes
    #[serde(default = "default_max_part_size")]
    pub max_part_size: usize,
}

fn default_max_tree_nodes() -> usize {
    DecoderOptions::default().max_tree_nodes
}

fn default_max_part_size() -> usize {
    DecoderOptions::default().max_part_size
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            max_tree_nodes: default_max_tree_nodes(),
            max_part_size: default_max_part_size(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ExportConfig {
    /// Default directory for `extract` when `-o` is not given
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Write every Nth decoded frame
    #[serde(default = "default_frame_stride")]
    pub frame_stride: u32,

    /// Write each audio track as a WAV file
    #[serde(default = "default_true")]
    pub write_audio: bool,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("frames")
}

fn default_frame_stride() -> u32 {
    1
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            frame_stride: default_frame_stride(),
            write_audio: true,
        }
    }
}

fn default_true() -> bool {
    true
}
