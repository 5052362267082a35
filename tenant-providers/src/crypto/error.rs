//! Error types for credential encryption.

use thiserror::Error;

/// Errors from [`Encryptor`](super::Encryptor) and key handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// Key material is not exactly 32 bytes
    #[error("invalid encryption key: expected 32 bytes, got {actual}")]
    InvalidKey {
        /// Length that was supplied
        actual: usize,
    },

    /// Key text is not valid base64
    #[error("invalid encryption key encoding: {0}")]
    InvalidKeyEncoding(String),

    /// Ciphertext is malformed (bad encoding or too short)
    #[error("invalid ciphertext: {0}")]
    InvalidCiphertext(String),

    /// Authentication tag mismatch: wrong key, corruption or tampering
    #[error("ciphertext authentication failed")]
    AuthenticationFailed,

    /// Encryption itself failed
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Plaintext authenticated but is not a configuration object
    #[error("decrypted payload is not a configuration object: {0}")]
    MalformedPayload(String),
}

impl CryptoError {
    /// Create an invalid ciphertext error.
    #[must_use]
    pub fn invalid_ciphertext(msg: impl Into<String>) -> Self {
        Self::InvalidCiphertext(msg.into())
    }
}
