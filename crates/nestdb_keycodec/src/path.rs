//! Key-path encoding, decoding, and range helpers.

use crate::error::{CodecError, CodecResult};
use crate::part::{decode_part, encode_part, SEP};
use std::fmt;

/// An ordered sequence of byte-string parts identifying a record.
///
/// The last part is the key proper; everything before it is the level path.
/// An empty path is normalized to a single empty part when encoded.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KeyPath(Vec<Vec<u8>>);

impl KeyPath {
    /// Creates an empty key path.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a key path from raw parts.
    #[must_use]
    pub fn from_parts(parts: Vec<Vec<u8>>) -> Self {
        Self(parts)
    }

    /// Returns the parts of this path.
    #[must_use]
    pub fn parts(&self) -> &[Vec<u8>] {
        &self.0
    }

    /// Consumes the path, returning its parts.
    #[must_use]
    pub fn into_parts(self) -> Vec<Vec<u8>> {
        self.0
    }

    /// Returns the number of parts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the path has no parts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Appends a part to the path.
    pub fn push(&mut self, part: impl Into<Vec<u8>>) {
        self.0.push(part.into());
    }

    /// Returns a new path with `part` prepended.
    #[must_use]
    pub fn prefixed_with(&self, part: impl Into<Vec<u8>>) -> Self {
        let mut parts = Vec::with_capacity(self.0.len() + 1);
        parts.push(part.into());
        parts.extend(self.0.iter().cloned());
        Self(parts)
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "/")?;
            }
            match std::str::from_utf8(part) {
                Ok(s) => write!(f, "{s}")?,
                Err(_) => {
                    for byte in part {
                        write!(f, "\\x{byte:02x}")?;
                    }
                }
            }
        }
        Ok(())
    }
}

impl<T: Into<Vec<u8>>> From<Vec<T>> for KeyPath {
    fn from(parts: Vec<T>) -> Self {
        Self(parts.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Vec<u8>>, const N: usize> From<[T; N]> for KeyPath {
    fn from(parts: [T; N]) -> Self {
        Self(parts.into_iter().map(Into::into).collect())
    }
}

impl FromIterator<Vec<u8>> for KeyPath {
    fn from_iter<I: IntoIterator<Item = Vec<u8>>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Encodes a full key path to its flat byte form.
///
/// An N-part path produces `N - 1` separator-wrapped level segments followed
/// by the encoded key part with no surrounding separators. An empty path is
/// treated as a path of one empty part.
#[must_use]
pub fn encode_key_path<P: AsRef<[u8]>>(path: &[P]) -> Vec<u8> {
    let Some((key_part, levels)) = path.split_last() else {
        return encode_part(b"");
    };

    let mut out = Vec::new();
    for level in levels {
        out.push(SEP);
        out.extend_from_slice(&encode_part(level.as_ref()));
        out.push(SEP);
    }
    out.extend_from_slice(&encode_part(key_part.as_ref()));
    out
}

/// Encodes a level path: every part becomes a complete separator-wrapped
/// level segment.
///
/// The result is the common prefix of all keys stored under that level,
/// which makes it the natural base for iterator range bounds.
#[must_use]
pub fn encode_level_path<P: AsRef<[u8]>>(levels: &[P]) -> Vec<u8> {
    let mut out = Vec::new();
    for level in levels {
        out.push(SEP);
        out.extend_from_slice(&encode_part(level.as_ref()));
        out.push(SEP);
    }
    out
}

/// Decodes a flat encoded key back into its key path.
///
/// Level segments are peeled greedily from the left for as long as the
/// buffer opens with a separator; whatever remains is the key part. A buffer
/// that does not start with a separator is a bare key part.
///
/// # Errors
///
/// Fails if a level segment is left unterminated or empty, if no key part
/// remains after the level segments, or if a part contains bytes outside
/// the part alphabet.
pub fn decode_key(bytes: &[u8]) -> CodecResult<KeyPath> {
    let mut parts = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() && bytes[pos] == SEP {
        let start = pos + 1;
        let close = bytes[start..]
            .iter()
            .position(|&b| b == SEP)
            .map(|i| start + i)
            .ok_or_else(|| CodecError::unterminated_level(pos))?;
        if close == start {
            return Err(CodecError::empty_level(pos));
        }
        parts.push(decode_part(&bytes[start..close], start)?);
        pos = close + 1;
    }

    if pos >= bytes.len() {
        return Err(CodecError::MissingKeyPart);
    }
    parts.push(decode_part(&bytes[pos..], pos)?);

    Ok(KeyPath(parts))
}

/// Returns the lexicographic successor of `bytes` as a range upper bound.
///
/// The rightmost byte below `0xFF` is incremented and everything after it
/// dropped; `None` means no finite successor exists. For an encoded level
/// path the last byte is always the separator, so the successor is simply
/// the same prefix with its final byte bumped, and the half-open range
/// `[level, next_lex(level))` covers exactly the keys under that level.
#[must_use]
pub fn next_lex(bytes: &[u8]) -> Option<Vec<u8>> {
    let mut out = bytes.to_vec();
    loop {
        match out.last_mut() {
            None => return None,
            Some(last) if *last == u8::MAX => {
                out.pop();
            }
            Some(last) => {
                *last += 1;
                return Some(out);
            }
        }
    }
}
