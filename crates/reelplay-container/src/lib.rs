//! Reelplay-Container: SMK and CINE containers and synchronized playback
//!
//! This crate parses the two container formats, feeds their per-frame
//! chunks to the codecs in `reelplay-codec`, and schedules frames against a
//! session clock that follows the audio mixer when audio is playing.
//!
//! # Modules
//!
//! - `decoder` - The `ContainerDecoder` trait and stream helpers
//! - `smk` - SMK2/SMK4 header, frame records and 4x4 block video
//! - `cine` - CINE header, frame table and tile/LZ77 video
//! - `session` / `clock` / `track` - Track lifecycle, frame cursor and timing
//! - `audio` / `mixer` / `context` - PCM tracks and the services they use
//! - `probe` - Signature detection
//!
//! # Example
//!
//! ```no_run
//! use reelplay_container::{ContainerDecoder, DecoderOptions, PlaybackContext, SmkDecoder};
//!
//! let file = std::fs::File::open("intro.smk")?;
//! let mut decoder = SmkDecoder::new(PlaybackContext::headless(), DecoderOptions::default());
//! decoder.load(Box::new(std::io::BufReader::new(file)))?;
//! decoder.session_mut().start();
//!
//! while !decoder.end_of_video() {
//!     if decoder.time_to_next_frame_ms() == 0 {
//!         decoder.decode_next_frame()?;
//!     }
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod audio;
pub mod cine;
pub mod clock;
pub mod context;
pub mod decoder;
pub mod error;
pub mod header;
pub mod mixer;
pub mod options;
pub mod probe;
pub mod session;
pub mod smk;
pub mod track;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;

pub use audio::{AudioEncoding, PcmAudioTrack};
pub use cine::{CineDecoder, CineVideoTrack};
pub use clock::{PlaybackRate, SessionClock};
pub use context::{ManualTimeSource, PlaybackContext, SystemTimeSource, TimeSource};
pub use decoder::{ContainerDecoder, MediaStream};
pub use error::{ContainerError, Result};
pub use header::{AudioDescriptor, AudioTrackInfo, ContainerInfo, FrameRate};
pub use mixer::{BufferedMixer, Mixer, NullMixer, PcmFormat, StreamHandle};
pub use options::DecoderOptions;
pub use probe::{detect_format, ContainerFormat};
pub use session::Session;
pub use smk::{SmkDecoder, SmkVersion, SmkVideoTrack};
pub use track::{FrameCursor, Track, TrackKind, TrackState, VideoTrack};
