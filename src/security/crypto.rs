//! AES-256-GCM envelope for the Config Store's secrets: a
//! single root key loaded at startup, 12-byte random nonce prepended to
//! the ciphertext.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use rand::RngCore;
use thiserror::Error;
use zeroize::Zeroizing;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("root key must be 32 bytes after base64 decode, got {0}")]
    BadKeyLength(usize),
    #[error("root key is not valid base64: {0}")]
    BadKeyEncoding(String),
    #[error("encryption failed")]
    EncryptFailed,
    #[error("ciphertext too short to contain a nonce")]
    Truncated,
    #[error("decryption failed — wrong key or corrupted data")]
    DecryptFailed,
    #[error("decrypted plaintext is not valid utf-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}

const NONCE_LEN: usize = 12;

/// Holds the decoded 32-byte root key. Zeroized on drop so it does not
/// linger in memory after the config store is torn down.
pub struct RootKey(Zeroizing<Vec<u8>>);

impl RootKey {
    /// Decode a base64 root key, as read from the environment.
    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        use base64::Engine;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| CryptoError::BadKeyEncoding(e.to_string()))?;
        if bytes.len() != 32 {
            return Err(CryptoError::BadKeyLength(bytes.len()));
        }
        Ok(Self(Zeroizing::new(bytes)))
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new_from_slice(&self.0).expect("key length validated in from_base64")
    }
}

/// Encrypt `plaintext`, returning `nonce || ciphertext+tag`.
pub fn encrypt(key: &RootKey, plaintext: &str) -> Result<Vec<u8>, CryptoError> {
    let cipher = key.cipher();
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|_| CryptoError::EncryptFailed)?;

    let mut packed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    packed.extend_from_slice(&nonce_bytes);
    packed.extend_from_slice(&ciphertext);
    Ok(packed)
}

/// Decrypt a blob produced by [`encrypt`].
pub fn decrypt(key: &RootKey, packed: &[u8]) -> Result<String, CryptoError> {
    if packed.len() < NONCE_LEN {
        return Err(CryptoError::Truncated);
    }
    let (nonce_bytes, ciphertext) = packed.split_at(NONCE_LEN);
    let nonce = Nonce::from_slice(nonce_bytes);

    let cipher = key.cipher();
    let plaintext = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| CryptoError::DecryptFailed)?;
    Ok(String::from_utf8(plaintext)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;

    fn test_key() -> RootKey {
        let raw = [0x42u8; 32];
        let encoded = base64::engine::general_purpose::STANDARD.encode(raw);
        RootKey::from_base64(&encoded).unwrap()
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let key = test_key();
        let ciphertext = encrypt(&key, "sk-super-secret-api-key").unwrap();
        assert_ne!(ciphertext, b"sk-super-secret-api-key");
        let plaintext = decrypt(&key, &ciphertext).unwrap();
        assert_eq!(plaintext, "sk-super-secret-api-key");
    }

    #[test]
    fn nonce_is_prepended_and_varies() {
        let key = test_key();
        let a = encrypt(&key, "same-plaintext").unwrap();
        let b = encrypt(&key, "same-plaintext").unwrap();
        assert_ne!(a[..NONCE_LEN], b[..NONCE_LEN], "nonces must be random per call");
        assert_ne!(a, b, "ciphertext must differ due to nonce");
    }

    #[test]
    fn wrong_key_fails_to_decrypt() {
        let key_a = test_key();
        let raw_b = [0x24u8; 32];
        let key_b = RootKey::from_base64(&base64::engine::general_purpose::STANDARD.encode(raw_b)).unwrap();
        let ciphertext = encrypt(&key_a, "secret").unwrap();
        assert!(decrypt(&key_b, &ciphertext).is_err());
    }

    #[test]
    fn truncated_ciphertext_errors() {
        let key = test_key();
        let err = decrypt(&key, &[0u8; 4]).unwrap_err();
        assert!(matches!(err, CryptoError::Truncated));
    }

    #[test]
    fn bad_key_length_rejected() {
        let short = base64::engine::general_purpose::STANDARD.encode([0u8; 16]);
        assert!(matches!(
            RootKey::from_base64(&short),
            Err(CryptoError::BadKeyLength(16))
        ));
    }
}
