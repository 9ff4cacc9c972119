//! Real-time headless playback.
//!
//! Frames are decoded when the session clock says they are due. A pump
//! stands in for the audio device: it pulls PCM from the [`BufferedMixer`] at
//! the stream's byte rate so the audio-driven clock keeps moving.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use reelplay_container::{BufferedMixer, StreamHandle, TimeSource};

use crate::player::Player;

/// Longest single sleep between scheduling checks.
pub const MAX_SLEEP_MS: u64 = 10;

/// Counters from one playback run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaybackStats {
    pub frames: u32,
    pub palette_changes: u32,
    pub audio_bytes: u64,
    pub media_time_ms: u64,
}

/// Pulls PCM from a mixer as a sound card would.
#[derive(Debug)]
pub struct AudioPump {
    mixer: Arc<BufferedMixer>,
    last_ms: HashMap<StreamHandle, u64>,
    scratch: Vec<u8>,
}

impl AudioPump {
    pub fn new(mixer: Arc<BufferedMixer>) -> Self {
        Self {
            mixer,
            last_ms: HashMap::new(),
            scratch: Vec::new(),
        }
    }

    /// Consume what every stream would have played up to `now_ms`.
    /// Returns the number of queued bytes consumed.
    pub fn pump(&mut self, now_ms: u64) -> u64 {
        let mut consumed = 0;
        for handle in self.mixer.handles() {
            let Some(format) = self.mixer.format(handle) else {
                continue;
            };
            let last = *self.last_ms.entry(handle).or_insert(now_ms);
            let due = format.bytes_per_second() * now_ms.saturating_sub(last) / 1000;
            let due = due as usize / format.frame_bytes().max(1) * format.frame_bytes().max(1);
            if due == 0 {
                continue;
            }
            self.scratch.resize(due, 0);
            consumed += self.mixer.read(handle, &mut self.scratch) as u64;
            self.last_ms.insert(handle, now_ms);
        }
        consumed
    }
}

/// Play until the end of the video, sleeping between frames.
///
/// `on_frame` is called after every decoded frame with the player positioned
/// on it.
pub fn run(
    player: &mut Player,
    mixer: Arc<BufferedMixer>,
    time: Arc<dyn TimeSource>,
    mut on_frame: impl FnMut(&mut Player),
) -> Result<PlaybackStats> {
    let mut stats = PlaybackStats::default();
    let mut pump = AudioPump::new(mixer);
    player.start();

    while !player.end_of_video() {
        stats.audio_bytes += pump.pump(time.now_ms());

        let wait = player.time_to_next_frame_ms();
        if wait > 0 {
            std::thread::sleep(Duration::from_millis(wait.min(MAX_SLEEP_MS)));
            continue;
        }

        if !player.decode_next_frame()? {
            break;
        }
        stats.frames += 1;
        if player.take_palette().1 {
            stats.palette_changes += 1;
        }
        on_frame(player);
    }

    stats.media_time_ms = player.time_ms();
    player.stop();
    tracing::info!(
        frames = stats.frames,
        palette_changes = stats.palette_changes,
        media_time_ms = stats.media_time_ms,
        "Playback finished"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use reelplay_container::{Mixer, PcmFormat};

    use super::*;

    #[test]
    fn test_pump_consumes_at_byte_rate() {
        let mixer = Arc::new(BufferedMixer::new());
        let handle = mixer.play_stream(PcmFormat {
            sample_rate: 1000,
            channels: 1,
            bits: 16,
        });
        mixer.queue_buffer(handle, vec![0; 4000]);

        let mut pump = AudioPump::new(mixer.clone());
        assert_eq!(pump.pump(100), 0, "first call only records the start");
        assert_eq!(pump.pump(600), 1000);
        assert_eq!(mixer.queued_bytes(handle), 3000);
        assert_eq!(mixer.elapsed_ms(handle), 500);
    }
}
