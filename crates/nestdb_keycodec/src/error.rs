//! Error types for key-path encoding and decoding.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while parsing an encoded key.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// A level segment opened with a separator but never closed.
    #[error("unterminated level segment at offset {offset}")]
    UnterminatedLevel {
        /// Byte offset of the opening separator.
        offset: usize,
    },

    /// A level segment contained no part bytes between its separators.
    #[error("empty level segment at offset {offset}")]
    EmptyLevel {
        /// Byte offset of the opening separator.
        offset: usize,
    },

    /// The buffer ended after its level segments with no key part left.
    #[error("missing key part after level segments")]
    MissingKeyPart,

    /// An encoded part contained a byte outside the part alphabet.
    #[error("byte {byte:#04x} at offset {offset} is outside the part alphabet")]
    InvalidPartByte {
        /// The offending byte.
        byte: u8,
        /// Byte offset within the encoded key.
        offset: usize,
    },
}

impl CodecError {
    /// Creates an unterminated level segment error.
    #[must_use]
    pub fn unterminated_level(offset: usize) -> Self {
        Self::UnterminatedLevel { offset }
    }

    /// Creates an empty level segment error.
    #[must_use]
    pub fn empty_level(offset: usize) -> Self {
        Self::EmptyLevel { offset }
    }

    /// Creates an invalid part byte error.
    #[must_use]
    pub fn invalid_part_byte(byte: u8, offset: usize) -> Self {
        Self::InvalidPartByte { byte, offset }
    }
}
