// Symmetric encryption using XChaCha20-Poly1305 AEAD
// Content keys, key wrapping and group messages all go through here

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};
use zeroize::ZeroizeOnDrop;

use super::random::random_array;
use super::EngineResult;
use crate::error::FoundationStatus;

pub const KEY_SIZE: usize = 32;
pub const NONCE_SIZE: usize = 24;

/// Symmetric key (zeroized on drop)
#[derive(Clone, ZeroizeOnDrop)]
pub struct SymmetricKey {
    key: [u8; KEY_SIZE],
}

impl SymmetricKey {
    pub fn new(key: [u8; KEY_SIZE]) -> Self {
        Self { key }
    }

    pub fn generate() -> EngineResult<Self> {
        Ok(Self::new(random_array()?))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.key
    }

    /// Must be exactly 32 bytes
    pub fn from_slice(slice: &[u8]) -> EngineResult<Self> {
        let key: [u8; KEY_SIZE] = slice
            .try_into()
            .map_err(|_| FoundationStatus::BadEncryptedData)?;
        Ok(Self { key })
    }
}

pub fn generate_nonce() -> EngineResult<[u8; NONCE_SIZE]> {
    random_array()
}

/// Encrypt under a caller-chosen nonce
pub fn encrypt_with_nonce(
    key: &SymmetricKey,
    nonce: &[u8; NONCE_SIZE],
    plaintext: &[u8],
    associated_data: &[u8],
) -> EngineResult<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    let payload = Payload {
        msg: plaintext,
        aad: associated_data,
    };

    cipher
        .encrypt(XNonce::from_slice(nonce), payload)
        .map_err(|_| FoundationStatus::UnhandledThirdpartyError)
}

/// Encrypt under a fresh random nonce, returned alongside the ciphertext
pub fn encrypt(
    key: &SymmetricKey,
    plaintext: &[u8],
    associated_data: &[u8],
) -> EngineResult<([u8; NONCE_SIZE], Vec<u8>)> {
    let nonce = generate_nonce()?;
    let ciphertext = encrypt_with_nonce(key, &nonce, plaintext, associated_data)?;
    Ok((nonce, ciphertext))
}

pub fn decrypt(
    key: &SymmetricKey,
    nonce: &[u8; NONCE_SIZE],
    ciphertext: &[u8],
    associated_data: &[u8],
) -> EngineResult<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    let payload = Payload {
        msg: ciphertext,
        aad: associated_data,
    };

    cipher
        .decrypt(XNonce::from_slice(nonce), payload)
        .map_err(|_| FoundationStatus::AuthFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encryption_with_aad() {
        let key = SymmetricKey::generate().unwrap();
        let (nonce, ct) = encrypt(&key, b"Secret message", b"header").unwrap();
        assert_eq!(decrypt(&key, &nonce, &ct, b"header").unwrap(), b"Secret message");
    }

    #[test]
    fn test_tampered_ciphertext() {
        let key = SymmetricKey::generate().unwrap();
        let (nonce, mut ct) = encrypt(&key, b"Secret message", &[]).unwrap();
        ct[0] ^= 1;
        assert_eq!(decrypt(&key, &nonce, &ct, &[]), Err(FoundationStatus::AuthFailed));
    }

    #[test]
    fn test_wrong_key_or_aad() {
        let key1 = SymmetricKey::generate().unwrap();
        let key2 = SymmetricKey::generate().unwrap();
        let (nonce, ct) = encrypt(&key1, b"Secret", b"v1").unwrap();

        assert!(decrypt(&key2, &nonce, &ct, b"v1").is_err());
        assert!(decrypt(&key1, &nonce, &ct, b"v2").is_err());
    }

    #[test]
    fn test_unique_nonces() {
        let key = SymmetricKey::generate().unwrap();
        let (n1, _) = encrypt(&key, b"Test", &[]).unwrap();
        let (n2, _) = encrypt(&key, b"Test", &[]).unwrap();
        assert_ne!(n1, n2);
    }

    #[test]
    fn test_invalid_key_length() {
        assert!(SymmetricKey::from_slice(&[42u8; 16]).is_err());
        assert!(SymmetricKey::from_slice(&[42u8; 32]).is_ok());
    }
}
