//! CLI end-to-end tests
//!
//! Tests for the reelplay command-line interface.

mod common;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::process::Command;
use tempfile::tempdir;

/// Get a command for the reelplay binary
#[allow(deprecated)]
fn reelplay_cmd() -> Command {
    Command::cargo_bin("reelplay").unwrap()
}

#[test]
fn test_cli_no_args_shows_help() {
    let mut cmd = reelplay_cmd();
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_help_flag() {
    let mut cmd = reelplay_cmd();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("reelplay"))
        .stdout(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_version_command() {
    let mut cmd = reelplay_cmd();
    cmd.arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_cli_extract_help() {
    let mut cmd = reelplay_cmd();
    cmd.args(["extract", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("PNG frames"));
}

#[test]
fn test_cli_info_nonexistent_file() {
    let mut cmd = reelplay_cmd();
    cmd.args(["info", "/nonexistent/path/intro.smk"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn test_cli_info_smk() {
    let temp = tempdir().unwrap();
    let file = common::write_fixture(temp.path(), "intro.smk", &common::smk_bytes());

    let mut cmd = reelplay_cmd();
    cmd.arg("info")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("Format: SMK2"))
        .stdout(predicate::str::contains("Size: 16x16"))
        .stdout(predicate::str::contains("Frames: 3 (1 keyframes)"))
        .stdout(predicate::str::contains("Audio Tracks: 0"));
}

#[test]
fn test_cli_info_json() {
    let temp = tempdir().unwrap();
    let file = common::write_fixture(temp.path(), "scene.cin", &common::cine_bytes(4, 50, Some(100)));

    let output = reelplay_cmd().arg("info").arg(&file).arg("--json").output().unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["format"], "CINE");
    assert_eq!(json["frame_count"], 4);
    assert_eq!(json["keyframes"], 4);
    assert_eq!(json["duration_ms"], 200);
    assert_eq!(json["audio_tracks"][0]["sample_rate"], 8000);
    assert_eq!(json["reversible"], false);
}

#[test]
fn test_cli_info_rejects_unknown_format() {
    let temp = tempdir().unwrap();
    let file = common::write_fixture(temp.path(), "song.wav", b"RIFF\0\0\0\0WAVEfmt ");

    let mut cmd = reelplay_cmd();
    cmd.arg("info")
        .arg(&file)
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown container signature"));
}

#[test]
fn test_cli_extract_frames_and_audio() {
    let temp = tempdir().unwrap();
    let file = common::write_fixture(temp.path(), "scene.cin", &common::cine_bytes(3, 50, Some(100)));
    let out = temp.path().join("out");

    let mut cmd = reelplay_cmd();
    cmd.arg("extract")
        .arg(&file)
        .arg("-o")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("Decoded 3 frames"));

    for frame in 0..3 {
        assert!(out.join(format!("frame_{:05}.png", frame)).exists());
    }
    let wav = fs::read(out.join("audio_0.wav")).unwrap();
    assert_eq!(&wav[..4], b"RIFF");
    assert_eq!(wav.len(), 44 + 300);
}

#[test]
fn test_cli_extract_stride() {
    let temp = tempdir().unwrap();
    let file = common::write_fixture(temp.path(), "intro.smk", &common::smk_bytes());
    let out = temp.path().join("out");

    let mut cmd = reelplay_cmd();
    cmd.arg("extract")
        .arg(&file)
        .args(["--stride", "2", "-o"])
        .arg(&out)
        .assert()
        .success();

    assert!(out.join("frame_00000.png").exists());
    assert!(!out.join("frame_00001.png").exists());
    assert!(out.join("frame_00002.png").exists());
}

#[test]
fn test_cli_play() {
    let temp = tempdir().unwrap();
    let file = common::write_fixture(temp.path(), "scene.cin", &common::cine_bytes(3, 10, None));

    let mut cmd = reelplay_cmd();
    cmd.arg("play")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("Played 3 frames"));
}

#[test]
fn test_cli_validate_config() {
    let temp = tempdir().unwrap();
    let config_file = temp.path().join("reelplay.toml");
    fs::write(
        &config_file,
        r#"
[playback]
audio = false
end_time_ms = 5000

[export]
frame_stride = 5
"#,
    )
    .unwrap();

    let mut cmd = reelplay_cmd();
    cmd.arg("validate")
        .arg(&config_file)
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"))
        .stdout(predicate::str::contains("Frame stride: 5"));
}

#[test]
fn test_cli_validate_rejects_zero_stride() {
    let temp = tempdir().unwrap();
    let config_file = temp.path().join("reelplay.toml");
    fs::write(&config_file, "[export]\nframe_stride = 0\n").unwrap();

    let mut cmd = reelplay_cmd();
    cmd.args(["--config"])
        .arg(&config_file)
        .arg("validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("frame_stride"));
}
