//! Property-based tests for credential encryption.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use proptest::prelude::*;
use tenant_providers::{CryptoError, EncryptionKey, Encryptor};
use test_utils::{
    config_map_strategy, key_bytes_strategy, plaintext_strategy, wrong_length_key_strategy,
};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Decrypting an encrypted value yields the original bytes.
    #[test]
    fn prop_encrypt_decrypt_round_trip(
        key in key_bytes_strategy(),
        plaintext in plaintext_strategy(),
    ) {
        let encryptor = Encryptor::new(&key).unwrap();
        let sealed = encryptor.encrypt(&plaintext).unwrap();
        prop_assert_eq!(encryptor.decrypt(&sealed).unwrap(), plaintext);
    }

    /// Two encryptions of the same plaintext never produce the same output.
    #[test]
    fn prop_nonce_is_fresh(key in key_bytes_strategy(), plaintext in plaintext_strategy()) {
        let encryptor = Encryptor::new(&key).unwrap();
        let a = encryptor.encrypt(&plaintext).unwrap();
        let b = encryptor.encrypt(&plaintext).unwrap();
        prop_assert_ne!(a, b);
    }

    /// Flipping any bit of the sealed value fails authentication.
    #[test]
    fn prop_tampering_is_detected(
        key in key_bytes_strategy(),
        plaintext in plaintext_strategy(),
        position in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let encryptor = Encryptor::new(&key).unwrap();
        let mut sealed = STANDARD.decode(encryptor.encrypt(&plaintext).unwrap()).unwrap();
        let i = position.index(sealed.len());
        sealed[i] ^= 1 << bit;
        let result = encryptor.decrypt(&STANDARD.encode(&sealed));
        prop_assert!(matches!(result, Err(CryptoError::AuthenticationFailed)));
    }

    /// A different key cannot open the value.
    #[test]
    fn prop_wrong_key_fails(
        key in key_bytes_strategy(),
        other in key_bytes_strategy(),
        plaintext in plaintext_strategy(),
    ) {
        prop_assume!(key != other);
        let sealed = Encryptor::new(&key).unwrap().encrypt(&plaintext).unwrap();
        let result = Encryptor::new(&other).unwrap().decrypt(&sealed);
        prop_assert!(matches!(result, Err(CryptoError::AuthenticationFailed)));
    }

    /// Keys must be exactly 32 bytes.
    #[test]
    fn prop_wrong_key_length_rejected(key in wrong_length_key_strategy()) {
        let len = key.len();
        let rejected = matches!(
            Encryptor::new(&key),
            Err(CryptoError::InvalidKey { actual }) if actual == len
        );
        prop_assert!(rejected);
        prop_assert!(EncryptionKey::from_bytes(&key).is_err());
    }

    /// Configuration maps survive sealing unchanged.
    #[test]
    fn prop_config_round_trip(key in key_bytes_strategy(), config in config_map_strategy()) {
        let encryptor = Encryptor::new(&key).unwrap();
        let sealed = encryptor.encrypt_config(&config).unwrap();
        prop_assert_eq!(encryptor.decrypt_config(&sealed).unwrap(), config);
    }

    /// Base64 key text round-trips and never appears in decode errors.
    #[test]
    fn prop_key_base64_round_trip(key in key_bytes_strategy()) {
        let encoded = EncryptionKey::from_bytes(&key).unwrap().to_base64();
        let decoded = EncryptionKey::from_base64(&encoded).unwrap();
        prop_assert_eq!(decoded.as_bytes(), &key);

        let garbled = format!("{encoded}!");
        let err = EncryptionKey::from_base64(&garbled).unwrap_err();
        prop_assert!(!err.to_string().contains(&encoded));
    }
}

#[test]
fn test_short_ciphertext_is_malformed_not_auth_failure() {
    let encryptor = Encryptor::new(&[1; 32]).unwrap();
    let short = STANDARD.encode([0u8; 27]);
    assert!(matches!(
        encryptor.decrypt(&short),
        Err(CryptoError::InvalidCiphertext(_))
    ));
    assert!(matches!(
        encryptor.decrypt("%%% not base64"),
        Err(CryptoError::InvalidCiphertext(_))
    ));
}

#[test]
fn test_non_object_payload_is_malformed() {
    let encryptor = Encryptor::new(&[2; 32]).unwrap();
    let sealed = encryptor.encrypt(b"[\"sk_live_topsecret\"]").unwrap();
    let err = encryptor.decrypt_config(&sealed).unwrap_err();
    assert!(matches!(err, CryptoError::MalformedPayload(_)));
    assert!(!err.to_string().contains("topsecret"));
}
