//! Format-agnostic wrapper over the two container decoders.
//!
//! [`Player`] picks the decoder from the file signature and forwards the
//! playback calls, so the CLI and the exporters never match on the format.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result};
use reelplay_codec::palette::PALETTE_BYTES;
use reelplay_codec::Surface;
use reelplay_container::probe::detect_format_from_reader;
use reelplay_container::{
    CineDecoder, ContainerDecoder, ContainerFormat, ContainerInfo, DecoderOptions, MediaStream,
    PcmFormat, PlaybackContext, SmkDecoder, StreamHandle, VideoTrack,
};

use crate::config::Config;

/// A loaded SMK or CINE file.
#[derive(Debug)]
pub enum Player {
    Smk(SmkDecoder),
    Cine(CineDecoder),
}

macro_rules! with_decoder {
    ($player:expr, $d:ident => $body:expr) => {
        match $player {
            Player::Smk($d) => $body,
            Player::Cine($d) => $body,
        }
    };
}

impl Player {
    /// Detect the format of `stream` and load it.
    pub fn load<S: MediaStream + 'static>(
        mut stream: S,
        options: DecoderOptions,
        context: PlaybackContext,
    ) -> reelplay_container::Result<Self> {
        let format = detect_format_from_reader(&mut stream)?;
        let mut player = if format.is_smk() {
            Player::Smk(SmkDecoder::new(context, options))
        } else {
            Player::Cine(CineDecoder::new(context, options))
        };
        with_decoder!(&mut player, d => d.load(Box::new(stream)))?;
        tracing::debug!(%format, "container loaded");
        Ok(player)
    }

    /// Open a file and apply the playback settings of `config`.
    pub fn open(path: &Path, config: &Config, context: PlaybackContext) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
        let mut player = Self::load(BufReader::new(file), config.decoder_options(), context)
            .with_context(|| format!("Failed to load {:?}", path))?;

        player.set_end_time(config.playback.end_time_ms);
        if config.playback.start_ms > 0 && !player.seek(config.playback.start_ms)? {
            tracing::warn!(
                "Cannot start at {} ms (not a keyframe), starting from the beginning",
                config.playback.start_ms
            );
        }
        Ok(player)
    }

    pub fn format(&self) -> ContainerFormat {
        match self {
            Player::Smk(d) => match d.header().map(|h| h.version) {
                Some(reelplay_container::SmkVersion::Smk4) => ContainerFormat::Smk4,
                _ => ContainerFormat::Smk2,
            },
            Player::Cine(_) => ContainerFormat::Cine,
        }
    }

    pub fn info(&self) -> Option<ContainerInfo> {
        with_decoder!(self, d => d.info())
    }

    pub fn is_loaded(&self) -> bool {
        with_decoder!(self, d => d.is_loaded())
    }

    pub fn start(&mut self) -> bool {
        with_decoder!(self, d => d.session_mut().start())
    }

    pub fn stop(&mut self) -> bool {
        with_decoder!(self, d => d.session_mut().stop())
    }

    pub fn pause(&mut self, paused: bool) {
        with_decoder!(self, d => d.session_mut().pause(paused))
    }

    pub fn set_end_time(&mut self, end_ms: Option<u64>) {
        with_decoder!(self, d => d.session_mut().set_end_time(end_ms))
    }

    pub fn time_ms(&self) -> u64 {
        with_decoder!(self, d => d.session().time_ms())
    }

    pub fn time_to_next_frame_ms(&self) -> u64 {
        with_decoder!(self, d => d.time_to_next_frame_ms())
    }

    pub fn end_of_video(&self) -> bool {
        with_decoder!(self, d => d.end_of_video())
    }

    /// Decode the next frame. Returns `false` once no frame is left.
    pub fn decode_next_frame(&mut self) -> reelplay_container::Result<bool> {
        with_decoder!(self, d => d.decode_next_frame().map(|s| s.is_some()))
    }

    /// Surface of the first video track.
    pub fn surface(&self) -> Option<&Surface> {
        with_decoder!(self, d => d.session().video_tracks().first().map(|t| t.surface()))
    }

    /// Index of the last decoded frame, `-1` before the first.
    pub fn current_frame(&self) -> i64 {
        with_decoder!(self, d => d
            .session()
            .video_tracks()
            .first()
            .map_or(-1, |t| t.cursor().current()))
    }

    pub fn take_palette(&mut self) -> (&[u8; PALETTE_BYTES], bool) {
        with_decoder!(self, d => d.take_palette())
    }

    pub fn seek(&mut self, time_ms: u64) -> reelplay_container::Result<bool> {
        with_decoder!(self, d => d.seek(time_ms))
    }

    pub fn rewind(&mut self) -> reelplay_container::Result<bool> {
        with_decoder!(self, d => d.rewind())
    }

    /// Mixer streams opened by the audio tracks. Empty until [`Player::start`].
    pub fn audio_streams(&self) -> Vec<(StreamHandle, PcmFormat)> {
        with_decoder!(self, d => d
            .session()
            .audio_tracks()
            .iter()
            .filter_map(|t| t.handle().map(|h| (h, t.format())))
            .collect())
    }

    pub fn close(&mut self) {
        with_decoder!(self, d => d.close())
    }
}
