//! Error types for reelplay-container.

use std::io;
use thiserror::Error;

use reelplay_codec::CodecError;

/// Result type for reelplay-container operations.
pub type Result<T> = std::result::Result<T, ContainerError>;

/// Error type for reelplay-container operations.
#[derive(Debug, Error)]
pub enum ContainerError {
    /// I/O error while reading the container stream.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Block, tree or audio chunk failed to decode.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Signature or header fields are not valid.
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// A frame's chunks do not fit in its recorded size.
    #[error("Frame {frame} overflows: need {need} bytes, frame holds {size}")]
    FrameOverflow { frame: usize, need: usize, size: usize },

    /// A frame or part record is malformed.
    #[error("Invalid frame {frame}: {reason}")]
    InvalidFrame { frame: usize, reason: String },

    /// A length field exceeds its budget.
    #[error("Budget exceeded: {what} of {size} bytes (limit {limit})")]
    BudgetExceeded {
        what: &'static str,
        size: usize,
        limit: usize,
    },

    /// Feature of the format family that is not implemented.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Operation needs a loaded container.
    #[error("No container loaded")]
    NotLoaded,
}

impl ContainerError {
    /// Create an invalid header error.
    pub fn invalid_header(msg: impl Into<String>) -> Self {
        Self::InvalidHeader(msg.into())
    }

    /// Create an invalid frame error.
    pub fn invalid_frame(frame: usize, reason: impl Into<String>) -> Self {
        Self::InvalidFrame {
            frame,
            reason: reason.into(),
        }
    }

    /// Create an unsupported error.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }
}
