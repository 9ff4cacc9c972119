//! Benchmarks for whole-file decoding
//!
//! Loads synthesised SMK and CINE files and decodes every frame.

use std::io::Cursor;

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use reelplay::player::Player;
use reelplay_codec::{Lz77Variant, TileRect};
use reelplay_container::testkit::{gradient, CineBuilder, CineFrame, CinePart, SmkBuilder, SmkFrame};
use reelplay_container::{DecoderOptions, PlaybackContext, SmkVersion};

const WIDTH: u32 = 320;
const HEIGHT: u32 = 200;
const FRAMES: u32 = 30;

fn smk_file(version: SmkVersion) -> Vec<u8> {
    let mut builder = SmkBuilder::new(version, WIDTH, HEIGHT);
    for i in 0..FRAMES {
        let mut pixels = gradient(WIDTH, HEIGHT, i / 3);
        // Some detail so the full-block path is exercised.
        for (p, noise) in pixels.iter_mut().zip((0..).map(|n: u32| n.wrapping_mul(2_654_435_761) >> 28)).step_by(5) {
            *p ^= noise as u8;
        }
        builder = builder.frame(SmkFrame::new(pixels));
    }
    builder.build()
}

fn cine_file() -> Vec<u8> {
    let mut builder = CineBuilder::new(WIDTH, HEIGHT);
    for i in 0..FRAMES {
        let part = CinePart::compressed(
            TileRect::new(0, 0, WIDTH, HEIGHT),
            2,
            gradient(WIDTH, HEIGHT, i),
            Lz77Variant::Extended,
        );
        builder = builder.frame(CineFrame::new(vec![part]).keyframe());
    }
    builder.build()
}

fn decode_all(bytes: &[u8]) -> u32 {
    let mut player = Player::load(
        Cursor::new(bytes.to_vec()),
        DecoderOptions::default(),
        PlaybackContext::headless(),
    )
    .unwrap();
    let mut frames = 0;
    while player.decode_next_frame().unwrap() {
        frames += 1;
    }
    frames
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_decode");
    group.throughput(Throughput::Elements(FRAMES as u64));

    for (name, bytes) in [
        ("smk2", smk_file(SmkVersion::Smk2)),
        ("smk4", smk_file(SmkVersion::Smk4)),
        ("cine", cine_file()),
    ] {
        group.bench_function(name, |b| b.iter(|| decode_all(black_box(&bytes))));
    }

    group.finish();
}

criterion_group!(benches, bench_decode);
criterion_main!(benches);
