//! Reelplay - SMK and CINE playback
//!
//! This library crate exposes configuration, the format-agnostic player and
//! the exporters to the binary and the integration tests.

pub mod config;
pub mod export;
pub mod playback;
pub mod player;
