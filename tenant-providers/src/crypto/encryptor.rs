//! AES-256-GCM encryptor for provider credential blobs.

use super::error::CryptoError;
use super::key::{EncryptionKey, KEY_LEN};
use crate::types::ConfigMap;
use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use rand::RngCore;
use zeroize::Zeroizing;

/// Nonce length in bytes (96 bits).
pub const NONCE_LEN: usize = 12;

/// Authentication tag length in bytes.
pub const TAG_LEN: usize = 16;

/// Encrypts and decrypts credential blobs under one fixed key.
///
/// Output format: `base64(nonce || ciphertext || tag)`. The encryptor holds no
/// mutable state and is safe to share across tasks.
#[derive(Clone)]
pub struct Encryptor {
    cipher: Aes256Gcm,
}

impl Encryptor {
    /// Create an encryptor from raw key bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKey`] unless `key` is exactly 32 bytes.
    pub fn new(key: &[u8]) -> Result<Self, CryptoError> {
        if key.len() != KEY_LEN {
            return Err(CryptoError::InvalidKey { actual: key.len() });
        }
        Ok(Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)),
        })
    }

    /// Create an encryptor from a validated key.
    #[must_use]
    pub fn from_key(key: &EncryptionKey) -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes())),
        }
    }

    /// Encrypt `plaintext` with a fresh random nonce.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Encryption`] if the AEAD rejects the input.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String, CryptoError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| CryptoError::Encryption(e.to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend(ciphertext);
        Ok(STANDARD.encode(sealed))
    }

    /// Authenticate and decrypt a value produced by [`Encryptor::encrypt`].
    ///
    /// # Errors
    ///
    /// - [`CryptoError::InvalidCiphertext`] for bad base64 or a value shorter
    ///   than nonce plus tag
    /// - [`CryptoError::AuthenticationFailed`] for a wrong key or any
    ///   modification of the sealed bytes
    pub fn decrypt(&self, encoded: &str) -> Result<Vec<u8>, CryptoError> {
        let sealed = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CryptoError::invalid_ciphertext(format!("bad encoding: {e}")))?;

        if sealed.len() < NONCE_LEN + TAG_LEN {
            return Err(CryptoError::invalid_ciphertext(format!(
                "{} bytes is shorter than the minimum of {}",
                sealed.len(),
                NONCE_LEN + TAG_LEN
            )));
        }

        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| CryptoError::AuthenticationFailed)
    }

    /// Serialize and encrypt a configuration map.
    ///
    /// # Errors
    ///
    /// Propagates encryption failures.
    pub fn encrypt_config(&self, config: &ConfigMap) -> Result<String, CryptoError> {
        let plaintext = Zeroizing::new(
            serde_json::to_vec(config).map_err(|e| CryptoError::Encryption(e.to_string()))?,
        );
        self.encrypt(&plaintext)
    }

    /// Decrypt and parse a configuration map.
    ///
    /// # Errors
    ///
    /// Decryption errors as for [`Encryptor::decrypt`];
    /// [`CryptoError::MalformedPayload`] when the authenticated plaintext is
    /// not a JSON object. The parse error never quotes the plaintext.
    pub fn decrypt_config(&self, encoded: &str) -> Result<ConfigMap, CryptoError> {
        let plaintext = Zeroizing::new(self.decrypt(encoded)?);
        serde_json::from_slice::<ConfigMap>(&plaintext).map_err(|e| {
            CryptoError::MalformedPayload(format!(
                "{:?} error at line {} column {}",
                e.classify(),
                e.line(),
                e.column()
            ))
        })
    }
}

impl std::fmt::Debug for Encryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Encryptor").finish_non_exhaustive()
    }
}
