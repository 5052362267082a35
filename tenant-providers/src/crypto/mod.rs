//! Authenticated encryption of stored provider credentials.
//!
//! Credentials are sealed with AES-256-GCM under a single process-wide key.
//! Each ciphertext carries its own random nonce, so encryption is never
//! deterministic, and any corruption or wrong key is detected on decrypt.

pub mod encryptor;
pub mod error;
pub mod key;

pub use encryptor::Encryptor;
pub use error::CryptoError;
pub use key::EncryptionKey;
