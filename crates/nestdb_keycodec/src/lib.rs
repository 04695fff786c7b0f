//! # NestDB KeyCodec
//!
//! Reversible encoding of hierarchical key paths onto a single flat,
//! lexicographically ordered byte-key space.
//!
//! A key path is an ordered sequence of byte-string parts. The last part is
//! the key proper; the parts before it form the level path (the namespace).
//! The encoded form follows this grammar:
//!
//! ```text
//! encoded-key := level* key-part
//! level       := SEP part SEP
//! ```
//!
//! where `SEP` is `0x00`, an empty part encodes to the single marker byte
//! `0x01`, and a non-empty part is re-encoded in base-128 over the alphabet
//! `0x02..=0x81`. Encoded parts therefore never contain the separator or the
//! empty marker, which makes parsing unambiguous and lets parts carry
//! arbitrary bytes - including `0x00` - without breaking prefix scans.
//!
//! ## Why this shape
//!
//! The underlying engine orders flat byte keys lexicographically. Escaping
//! the separator would break that ordering; length-prefixing parts would
//! break cross-level prefix scans. Re-encoding parts into an alphabet
//! disjoint from the separator keeps both properties, and the empty marker
//! sorts before any non-empty part.
//!
//! ## Example
//!
//! ```
//! use nestdb_keycodec::{decode_key, encode_key_path, KeyPath};
//!
//! let path = KeyPath::from(["users", "alice"]);
//! let encoded = encode_key_path(path.parts());
//! assert_eq!(decode_key(&encoded).unwrap(), path);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod part;
mod path;

pub use error::{CodecError, CodecResult};
pub use part::{decode_part, encode_part, EMPTY_MARKER, SEP};
pub use path::{decode_key, encode_key_path, encode_level_path, next_lex, KeyPath};
