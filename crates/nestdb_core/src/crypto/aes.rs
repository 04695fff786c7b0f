//! Built-in AES-256-GCM cipher.

use crate::crypto::Cipher;
use crate::error::{CoreError, CoreResult};
use aes_gcm::{
    aead::{generic_array::GenericArray, Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of the AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;
/// Size of the GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;
/// Size of the GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// Encryption key for the built-in cipher.
///
/// The key is automatically zeroized when dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey {
    bytes: [u8; KEY_SIZE],
}

impl EncryptionKey {
    /// Generates a new random encryption key.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Creates a key from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the slice is not exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(CoreError::invalid_key_size(bytes.len(), KEY_SIZE));
        }
        let mut key_bytes = [0u8; KEY_SIZE];
        key_bytes.copy_from_slice(bytes);
        Ok(Self { bytes: key_bytes })
    }

    /// Derives a key from a password using HKDF-SHA256.
    ///
    /// HKDF is appropriate when the input material already has high entropy;
    /// for low-entropy user passwords prefer a dedicated password hash in
    /// front of it.
    pub fn derive_from_password(password: &[u8], salt: &[u8]) -> CoreResult<Self> {
        use hkdf::Hkdf;
        use sha2::Sha256;

        let hk = Hkdf::<Sha256>::new(Some(salt), password);
        let mut bytes = [0u8; KEY_SIZE];
        hk.expand(b"nestdb-encryption-key-v1", &mut bytes)
            .map_err(|_| CoreError::encrypt("HKDF expand failed"))?;
        Ok(Self { bytes })
    }

    /// Returns the key bytes.
    ///
    /// # Security
    ///
    /// Don't log or serialize the result.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// AES-256-GCM implementation of [`Cipher`].
///
/// Output format: `nonce (12 bytes) || ciphertext || tag (16 bytes)` with a
/// fresh random nonce per encryption.
#[derive(Debug, Default, Clone, Copy)]
pub struct Aes256GcmCipher;

impl Cipher for Aes256GcmCipher {
    fn encrypt(&self, key: &[u8], plaintext: &[u8]) -> CoreResult<Vec<u8>> {
        if key.len() != KEY_SIZE {
            return Err(CoreError::invalid_key_size(key.len(), KEY_SIZE));
        }
        let cipher = Aes256Gcm::new(GenericArray::from_slice(key));

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| CoreError::encrypt("encryption error"))?;

        let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        result.extend_from_slice(&nonce_bytes);
        result.extend(ciphertext);
        Ok(result)
    }

    fn decrypt(&self, key: &[u8], ciphertext: &[u8]) -> Option<Vec<u8>> {
        if key.len() != KEY_SIZE || ciphertext.len() < NONCE_SIZE + TAG_SIZE {
            return None;
        }
        let cipher = Aes256Gcm::new(GenericArray::from_slice(key));
        let nonce = Nonce::from_slice(&ciphertext[..NONCE_SIZE]);
        cipher.decrypt(nonce, &ciphertext[NONCE_SIZE..]).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_produces_distinct_keys() {
        let key1 = EncryptionKey::generate();
        let key2 = EncryptionKey::generate();
        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn key_from_bytes() {
        let bytes = [42u8; KEY_SIZE];
        let key = EncryptionKey::from_bytes(&bytes).unwrap();
        assert_eq!(key.as_bytes(), &bytes);
    }

    #[test]
    fn key_wrong_size() {
        assert!(EncryptionKey::from_bytes(&[0u8; 16]).is_err());
        assert!(EncryptionKey::from_bytes(&[0u8; 64]).is_err());
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let key = EncryptionKey::generate();
        let cipher = Aes256GcmCipher;

        let ciphertext = cipher.encrypt(key.as_bytes(), b"hello").unwrap();
        assert_ne!(&ciphertext[NONCE_SIZE..], b"hello");

        let plaintext = cipher.decrypt(key.as_bytes(), &ciphertext).unwrap();
        assert_eq!(plaintext, b"hello");
    }

    #[test]
    fn nonces_differ_between_encryptions() {
        let key = EncryptionKey::generate();
        let cipher = Aes256GcmCipher;

        let ct1 = cipher.encrypt(key.as_bytes(), b"same").unwrap();
        let ct2 = cipher.encrypt(key.as_bytes(), b"same").unwrap();
        assert_ne!(ct1, ct2);
    }

    #[test]
    fn decrypt_with_wrong_key_returns_none() {
        let cipher = Aes256GcmCipher;
        let ciphertext = cipher
            .encrypt(EncryptionKey::generate().as_bytes(), b"secret")
            .unwrap();

        let other = EncryptionKey::generate();
        assert!(cipher.decrypt(other.as_bytes(), &ciphertext).is_none());
    }

    #[test]
    fn decrypt_corrupted_returns_none() {
        let key = EncryptionKey::generate();
        let cipher = Aes256GcmCipher;

        let mut ciphertext = cipher.encrypt(key.as_bytes(), b"data").unwrap();
        let len = ciphertext.len();
        ciphertext[len - 1] ^= 0xFF;

        assert!(cipher.decrypt(key.as_bytes(), &ciphertext).is_none());
    }

    #[test]
    fn decrypt_too_short_returns_none() {
        let key = EncryptionKey::generate();
        assert!(Aes256GcmCipher.decrypt(key.as_bytes(), &[0u8; 10]).is_none());
    }

    #[test]
    fn derive_key_is_deterministic() {
        let key1 = EncryptionKey::derive_from_password(b"password", b"salt").unwrap();
        let key2 = EncryptionKey::derive_from_password(b"password", b"salt").unwrap();
        assert_eq!(key1.as_bytes(), key2.as_bytes());

        let key3 = EncryptionKey::derive_from_password(b"password", b"pepper").unwrap();
        assert_ne!(key1.as_bytes(), key3.as_bytes());
    }

    #[test]
    fn empty_plaintext_roundtrip() {
        let key = EncryptionKey::generate();
        let cipher = Aes256GcmCipher;
        let ciphertext = cipher.encrypt(key.as_bytes(), b"").unwrap();
        assert_eq!(cipher.decrypt(key.as_bytes(), &ciphertext).unwrap(), b"");
    }
}
