//! At-rest encryption for stored values.
//!
//! Encryption is optional and supplied by the caller as a key plus an AEAD
//! implementation (see [`Cipher`]). When configured, serialized values are
//! sealed before they reach the engine and unsealed on the way back; the
//! engine only ever sees ciphertext. Keys are never written to disk - a
//! canary record validates the key at open instead.

mod aes;

pub use aes::{Aes256GcmCipher, EncryptionKey, KEY_SIZE, NONCE_SIZE, TAG_SIZE};

use crate::error::{CoreError, CoreResult};
use std::fmt;
use std::sync::Arc;

/// An authenticated encryption scheme supplied by the caller.
///
/// Implementations must be deterministic about failure: a decryption that
/// does not authenticate returns `None`, never garbage.
pub trait Cipher: Send + Sync {
    /// Encrypts `plaintext` under `key`.
    fn encrypt(&self, key: &[u8], plaintext: &[u8]) -> CoreResult<Vec<u8>>;

    /// Decrypts `ciphertext` under `key`.
    ///
    /// Returns `None` when the ciphertext does not authenticate (wrong key
    /// or corrupted data).
    fn decrypt(&self, key: &[u8], ciphertext: &[u8]) -> Option<Vec<u8>>;
}

/// Encryption configuration: a key paired with the AEAD that uses it.
#[derive(Clone)]
pub struct Crypto {
    /// The encryption key.
    pub key: EncryptionKey,
    /// The AEAD implementation.
    pub cipher: Arc<dyn Cipher>,
}

impl Crypto {
    /// Creates a configuration using the built-in AES-256-GCM cipher.
    #[must_use]
    pub fn aes256gcm(key: EncryptionKey) -> Self {
        Self {
            key,
            cipher: Arc::new(Aes256GcmCipher),
        }
    }

    /// Seals plaintext bytes for storage.
    pub(crate) fn seal(&self, plaintext: &[u8]) -> CoreResult<Vec<u8>> {
        self.cipher.encrypt(self.key.as_bytes(), plaintext)
    }

    /// Unseals stored bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Decrypt`] when the AEAD rejects the ciphertext.
    pub(crate) fn unseal(&self, stored: &[u8]) -> CoreResult<Vec<u8>> {
        self.cipher
            .decrypt(self.key.as_bytes(), stored)
            .ok_or_else(|| CoreError::decrypt("ciphertext did not authenticate"))
    }
}

impl fmt::Debug for Crypto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Crypto").field("key", &self.key).finish()
    }
}

/// Seals already-serialized value bytes if crypto is configured.
pub(crate) fn seal_value(crypto: Option<&Crypto>, plaintext: Vec<u8>) -> CoreResult<Vec<u8>> {
    match crypto {
        Some(crypto) => crypto.seal(&plaintext),
        None => Ok(plaintext),
    }
}

/// Unseals stored value bytes if crypto is configured.
pub(crate) fn unseal_value(crypto: Option<&Crypto>, stored: &[u8]) -> CoreResult<Vec<u8>> {
    match crypto {
        Some(crypto) => crypto.unseal(stored),
        None => Ok(stored.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_unseal_roundtrip() {
        let crypto = Crypto::aes256gcm(EncryptionKey::generate());
        let sealed = seal_value(Some(&crypto), b"payload".to_vec()).unwrap();
        assert_ne!(sealed, b"payload");
        assert_eq!(unseal_value(Some(&crypto), &sealed).unwrap(), b"payload");
    }

    #[test]
    fn no_crypto_passes_through() {
        let sealed = seal_value(None, b"payload".to_vec()).unwrap();
        assert_eq!(sealed, b"payload");
        assert_eq!(unseal_value(None, &sealed).unwrap(), b"payload");
    }

    #[test]
    fn wrong_key_is_decrypt_error() {
        let crypto = Crypto::aes256gcm(EncryptionKey::generate());
        let other = Crypto::aes256gcm(EncryptionKey::generate());

        let sealed = crypto.seal(b"secret").unwrap();
        let result = unseal_value(Some(&other), &sealed);
        assert!(matches!(result, Err(CoreError::Decrypt { .. })));
    }
}
