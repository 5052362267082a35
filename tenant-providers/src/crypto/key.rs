//! Symmetric key material.

use super::error::CryptoError;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use rand::RngCore;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Key length in bytes (AES-256).
pub const KEY_LEN: usize = 32;

/// A 32-byte AES-256 key, wiped from memory on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey([u8; KEY_LEN]);

impl EncryptionKey {
    /// Generate a fresh random key.
    #[must_use]
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut key);
        Self(key)
    }

    /// Copy key material, which must be exactly 32 bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKey`] for any other length.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let key: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidKey {
                actual: bytes.len(),
            })?;
        Ok(Self(key))
    }

    /// Decode a base64 key (standard alphabet, surrounding whitespace ignored).
    ///
    /// # Errors
    ///
    /// Fails if the text is not base64 or does not decode to 32 bytes.
    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let bytes = Zeroizing::new(
            STANDARD
                .decode(encoded.trim())
                .map_err(|_| CryptoError::InvalidKeyEncoding("not standard base64".into()))?,
        );
        Self::from_bytes(&bytes)
    }

    /// Encode as base64 for storage in a secret manager or environment.
    #[must_use]
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    /// Raw key bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey([REDACTED])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_is_random() {
        let a = EncryptionKey::generate();
        let b = EncryptionKey::generate();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_base64_round_trip() {
        let key = EncryptionKey::generate();
        let decoded = EncryptionKey::from_base64(&key.to_base64()).unwrap();
        assert_eq!(key.as_bytes(), decoded.as_bytes());
    }

    #[test]
    fn test_from_base64_rejects_wrong_length() {
        let short = STANDARD.encode([7u8; 16]);
        assert_eq!(
            EncryptionKey::from_base64(&short).unwrap_err(),
            CryptoError::InvalidKey { actual: 16 }
        );

        let long = STANDARD.encode([7u8; 33]);
        assert!(matches!(
            EncryptionKey::from_base64(&long),
            Err(CryptoError::InvalidKey { actual: 33 })
        ));
    }

    #[test]
    fn test_from_base64_rejects_garbage() {
        assert!(matches!(
            EncryptionKey::from_base64("not base64!!"),
            Err(CryptoError::InvalidKeyEncoding(_))
        ));
    }

    #[test]
    fn test_from_base64_trims_whitespace() {
        let key = EncryptionKey::generate();
        let padded = format!("  {}\n", key.to_base64());
        assert!(EncryptionKey::from_base64(&padded).is_ok());
    }

    #[test]
    fn test_debug_redacted() {
        let key = EncryptionKey::from_bytes(&[0xAB; 32]).unwrap();
        let debug = format!("{key:?}");
        assert_eq!(debug, "EncryptionKey([REDACTED])");
    }
}
