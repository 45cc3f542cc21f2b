//! Message-level AES-256-GCM, extended with explicit associated data — the
//! envelope's `message_id | source | destination | timestamp` — via
//! `aead::Payload { msg, aad }` rather than a plain-bytes encrypt/decrypt
//! pair.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};

use alicia_core::AliciaError;

/// Build the associated data string: `message_id | source | destination |
/// timestamp`.
pub fn build_aad(message_id: &str, source: &str, destination: &str, timestamp: &str) -> Vec<u8> {
    format!("{message_id}|{source}|{destination}|{timestamp}").into_bytes()
}

pub struct EncryptedPayload {
    pub ciphertext: Vec<u8>,
    pub nonce: String,
}

/// Encrypt `plaintext` under `key` with the given associated data. Returns
/// the ciphertext (tag appended, as AES-GCM does) and the hex-encoded
/// 96-bit nonce to carry on the wire as `security.nonce`.
pub fn encrypt(key: &[u8; 32], plaintext: &[u8], aad: &[u8]) -> Result<EncryptedPayload, AliciaError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, Payload { msg: plaintext, aad })
        .map_err(|_| AliciaError::Internal("encryption failed".into()))?;

    Ok(EncryptedPayload {
        ciphertext,
        nonce: hex::encode(nonce),
    })
}

/// Decrypt `ciphertext` under `key`, verifying `aad` and the GCM tag.
/// Any mismatch (bad tag, wrong key, tampered AAD) is reported uniformly as
/// `DecryptFailed` so the caller never distinguishes the failure mode.
pub fn decrypt(
    key: &[u8; 32],
    nonce_hex: &str,
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, AliciaError> {
    let nonce_bytes = hex::decode(nonce_hex)
        .map_err(|_| AliciaError::DecryptFailed("malformed nonce encoding".into()))?;
    if nonce_bytes.len() != 12 {
        return Err(AliciaError::DecryptFailed("nonce must be 96 bits".into()));
    }
    let nonce = Nonce::from_slice(&nonce_bytes);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    cipher
        .decrypt(nonce, Payload { msg: ciphertext, aad })
        .map_err(|_| AliciaError::DecryptFailed("authentication tag mismatch".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> [u8; 32] {
        [7u8; 32]
    }

    #[test]
    fn roundtrip_with_matching_aad_succeeds() {
        let aad = build_aad("m1", "stt", "service:dialog", "2026-01-01T00:00:00Z");
        let encrypted = encrypt(&key(), b"hello", &aad).unwrap();
        let decrypted = decrypt(&key(), &encrypted.nonce, &encrypted.ciphertext, &aad).unwrap();
        assert_eq!(decrypted, b"hello");
    }

    #[test]
    fn tampered_aad_is_rejected() {
        let aad = build_aad("m1", "stt", "service:dialog", "2026-01-01T00:00:00Z");
        let encrypted = encrypt(&key(), b"hello", &aad).unwrap();
        let wrong_aad = build_aad("m2", "stt", "service:dialog", "2026-01-01T00:00:00Z");
        let result = decrypt(&key(), &encrypted.nonce, &encrypted.ciphertext, &wrong_aad);
        assert!(matches!(result, Err(AliciaError::DecryptFailed(_))));
    }

    #[test]
    fn wrong_key_is_rejected() {
        let aad = build_aad("m1", "stt", "service:dialog", "2026-01-01T00:00:00Z");
        let encrypted = encrypt(&key(), b"hello", &aad).unwrap();
        let result = decrypt(&[9u8; 32], &encrypted.nonce, &encrypted.ciphertext, &aad);
        assert!(matches!(result, Err(AliciaError::DecryptFailed(_))));
    }

    proptest::proptest! {
        /// `decrypt(encrypt(p, aad)) == p` for arbitrary plaintext, and
        /// flipping any bit of the ciphertext causes `decrypt_failed`.
        #[test]
        fn roundtrip_holds_and_any_bit_flip_is_caught(plaintext in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..64), flip_byte_idx in 0usize..64, flip_bit in 0u8..8) {
            let aad = build_aad("m1", "stt", "service:dialog", "2026-01-01T00:00:00Z");
            let encrypted = encrypt(&key(), &plaintext, &aad).unwrap();
            let decrypted = decrypt(&key(), &encrypted.nonce, &encrypted.ciphertext, &aad).unwrap();
            proptest::prop_assert_eq!(&decrypted, &plaintext);

            let mut tampered = encrypted.ciphertext.clone();
            let idx = flip_byte_idx % tampered.len().max(1);
            if !tampered.is_empty() {
                tampered[idx] ^= 1 << flip_bit;
                let result = decrypt(&key(), &encrypted.nonce, &tampered, &aad);
                proptest::prop_assert!(matches!(result, Err(AliciaError::DecryptFailed(_))));
            }
        }
    }
}
