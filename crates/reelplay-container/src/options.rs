//! Decoder limits and switches.

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// Hard ceiling for a single CINE part, whatever the options say.
pub const PART_SIZE_CEILING: usize = 16 * 1024 * 1024;

/// Options handed to a container decoder at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serialize", serde(default))]
pub struct DecoderOptions {
    /// Create audio tracks. When off, audio chunks are skipped.
    pub audio_enabled: bool,
    /// Upper bound on the node count of any one SMK word tree.
    pub max_tree_nodes: usize,
    /// Upper bound on a CINE part, clamped to [`PART_SIZE_CEILING`].
    pub max_part_size: usize,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self {
            audio_enabled: true,
            max_tree_nodes: 1 << 18,
            max_part_size: PART_SIZE_CEILING,
        }
    }
}

impl DecoderOptions {
    /// Effective part limit.
    pub fn part_limit(&self) -> usize {
        self.max_part_size.min(PART_SIZE_CEILING)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_part_limit_is_clamped() {
        let options = DecoderOptions {
            max_part_size: usize::MAX,
            ..Default::default()
        };
        assert_eq!(options.part_limit(), PART_SIZE_CEILING);

        let options = DecoderOptions {
            max_part_size: 4096,
            ..Default::default()
        };
        assert_eq!(options.part_limit(), 4096);
    }
}
