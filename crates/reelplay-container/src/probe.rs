//! Container format detection

use std::io::{Read, Seek};

use crate::error::{ContainerError, Result};

/// Recognised container formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerFormat {
    /// Huffman-coded animation, original bitstream
    Smk2,
    /// Huffman-coded animation with the extra full-block modes
    Smk4,
    /// LZ77/tile-compressed cinematic
    Cine,
}

impl ContainerFormat {
    pub fn is_smk(self) -> bool {
        matches!(self, Self::Smk2 | Self::Smk4)
    }
}

impl std::fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContainerFormat::Smk2 => write!(f, "SMK2"),
            ContainerFormat::Smk4 => write!(f, "SMK4"),
            ContainerFormat::Cine => write!(f, "CINE"),
        }
    }
}

/// Identify a container by its leading signature.
pub fn detect_format(bytes: &[u8]) -> Option<ContainerFormat> {
    match bytes.get(..4)? {
        b"SMK2" => Some(ContainerFormat::Smk2),
        b"SMK4" => Some(ContainerFormat::Smk4),
        b"CINE" => Some(ContainerFormat::Cine),
        _ => None,
    }
}

/// Identify a container from a reader, leaving it rewound.
pub fn detect_format_from_reader<R: Read + Seek>(reader: &mut R) -> Result<ContainerFormat> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    reader.rewind()?;

    detect_format(&magic).ok_or_else(|| {
        ContainerError::unsupported(format!("unknown container signature {magic:02x?}"))
    })
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn test_detect_format() {
        assert_eq!(detect_format(b"SMK2rest"), Some(ContainerFormat::Smk2));
        assert_eq!(detect_format(b"SMK4"), Some(ContainerFormat::Smk4));
        assert_eq!(detect_format(b"CINE\0\0"), Some(ContainerFormat::Cine));
        assert_eq!(detect_format(b"SMK3"), None);
        assert_eq!(detect_format(b"SM"), None);
    }

    #[test]
    fn test_detect_from_reader_rewinds() {
        let mut reader = Cursor::new(b"CINE....".to_vec());
        assert_eq!(detect_format_from_reader(&mut reader).unwrap(), ContainerFormat::Cine);
        assert_eq!(reader.position(), 0);

        let mut reader = Cursor::new(b"RIFF....".to_vec());
        assert!(matches!(
            detect_format_from_reader(&mut reader),
            Err(ContainerError::Unsupported(_))
        ));
    }
}
