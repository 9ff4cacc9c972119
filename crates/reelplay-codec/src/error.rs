//! Error types for reelplay-codec.

use thiserror::Error;

/// Result type for reelplay-codec operations.
pub type Result<T> = std::result::Result<T, CodecError>;

/// Structural failures while decoding a block, tree or chunk.
///
/// Bit-level truncation never surfaces here: the bit reader zero-fills past
/// the end of its buffer. These variants describe input whose *structure* is
/// wrong, which aborts the current decode call.
#[derive(Debug, Error)]
pub enum CodecError {
    /// A Huffman tree grew past its allocation.
    #[error("Huffman tree overflow: {nodes} nodes exceed capacity {capacity}")]
    TreeOverflow { nodes: usize, capacity: usize },

    /// A Huffman tree nested deeper than any code can be.
    #[error("Huffman tree depth {0} exceeds limit")]
    TreeTooDeep(u32),

    /// Destination buffer cannot hold the declared output.
    #[error("Destination too small: need {need} bytes, have {have}")]
    DestinationTooSmall { need: usize, have: usize },

    /// Source bytes ran out before the tile geometry was satisfied.
    #[error("Truncated block: need {need} bytes at offset {offset}, have {have}")]
    TruncatedBlock {
        offset: usize,
        need: usize,
        have: usize,
    },

    /// A run or count that would never terminate or exceeds its budget.
    #[error("Invalid run: {0}")]
    InvalidRun(String),

    /// Audio chunk header disagrees with the track descriptor.
    #[error("Audio format mismatch: {0}")]
    AudioMismatch(String),

    /// Declared size exceeds the fixed per-chunk budget.
    #[error("Budget exceeded: {what} of {size} bytes (limit {limit})")]
    BudgetExceeded {
        what: &'static str,
        size: usize,
        limit: usize,
    },

    /// Pixel format not supported by the operation.
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl CodecError {
    /// Create an invalid-run error.
    pub fn invalid_run(msg: impl Into<String>) -> Self {
        Self::InvalidRun(msg.into())
    }

    /// Create an unsupported error.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }
}
