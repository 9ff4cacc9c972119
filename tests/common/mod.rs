//! Fixture files shared by the integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use reelplay_codec::TileRect;
use reelplay_container::testkit::{
    audio_descriptor, gradient, pcm_ramp, CineBuilder, CineFrame, CinePart, SmkBuilder, SmkFrame,
};
use reelplay_container::SmkVersion;

/// Three-frame 16x16 SMK2 with no audio.
pub fn smk_bytes() -> Vec<u8> {
    let mut builder = SmkBuilder::new(SmkVersion::Smk2, 16, 16).delay(20);
    for i in 0..3 {
        builder = builder.frame(SmkFrame::new(gradient(16, 16, i)));
    }
    builder.build()
}

/// `frames` solid 4x4 keyframes; frame `i` is filled with `i`. Audio, when
/// asked for, is raw 8-bit mono with `samples` bytes per frame.
pub fn cine_bytes(frames: u8, delay: i32, samples: Option<usize>) -> Vec<u8> {
    let mut builder = CineBuilder::new(4, 4).delay(delay);
    if samples.is_some() {
        builder = builder.audio(audio_descriptor(8000, false, false, false));
    }
    for i in 0..frames {
        let mut parts = vec![CinePart::whole(TileRect::new(0, 0, 4, 4), vec![i; 16])];
        if let Some(samples) = samples {
            parts.push(CinePart::Audio(pcm_ramp(samples, i)));
        }
        builder = builder.frame(CineFrame::new(parts).keyframe());
    }
    builder.build()
}

pub fn write_fixture(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}
