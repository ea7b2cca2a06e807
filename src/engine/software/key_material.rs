// Ed25519 key material as the software engine exports it
// One tag byte followed by the raw 32-byte seed or verifying key; X25519
// forms are derived on demand for key agreement

use curve25519_dalek::edwards::CompressedEdwardsY;
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use sha2::{Digest, Sha256, Sha512};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::Zeroizing;

use super::kdf::derive_signing_seed;
use super::random::random_array;
use super::EngineResult;
use crate::error::FoundationStatus;

const ED25519_TAG: u8 = 0x01;
const RAW_KEY_SIZE: usize = 32;
const EXPORTED_KEY_SIZE: usize = 1 + RAW_KEY_SIZE;
pub const SIGNATURE_SIZE: usize = 64;

/// Accepted length range for caller-supplied key material
pub const MIN_KEY_MATERIAL_LEN: usize = 32;
pub const MAX_KEY_MATERIAL_LEN: usize = 512;

const SHORT_IDENTIFIER_LEN: usize = 8;

fn untag(bytes: &[u8], status: FoundationStatus) -> EngineResult<[u8; RAW_KEY_SIZE]> {
    match bytes.split_first() {
        Some((&ED25519_TAG, raw)) if bytes.len() == EXPORTED_KEY_SIZE => {
            raw.try_into().map_err(|_| status)
        }
        _ => Err(status),
    }
}

fn tag(raw: &[u8; RAW_KEY_SIZE]) -> Vec<u8> {
    let mut out = Vec::with_capacity(EXPORTED_KEY_SIZE);
    out.push(ED25519_TAG);
    out.extend_from_slice(raw);
    out
}

pub struct PrivateKey {
    signing: SigningKey,
}

impl PrivateKey {
    pub fn generate() -> EngineResult<Self> {
        let seed = Zeroizing::new(random_array::<RAW_KEY_SIZE>()?);
        Ok(Self {
            signing: SigningKey::from_bytes(&seed),
        })
    }

    /// Deterministic key from caller material of 32..=512 bytes
    pub fn from_key_material(material: &[u8]) -> EngineResult<Self> {
        if !(MIN_KEY_MATERIAL_LEN..=MAX_KEY_MATERIAL_LEN).contains(&material.len()) {
            return Err(FoundationStatus::BadArguments);
        }
        let seed = derive_signing_seed(material)?;
        Ok(Self {
            signing: SigningKey::from_bytes(&seed),
        })
    }

    pub fn import(bytes: &[u8]) -> EngineResult<Self> {
        let seed = Zeroizing::new(untag(bytes, FoundationStatus::BadDerPrivateKey)?);
        Ok(Self {
            signing: SigningKey::from_bytes(&seed),
        })
    }

    pub fn export(&self) -> Zeroizing<Vec<u8>> {
        Zeroizing::new(tag(&self.signing.to_bytes()))
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            verifying: self.signing.verifying_key(),
        }
    }

    pub fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_SIZE] {
        self.signing.sign(message).to_bytes()
    }

    pub fn to_x25519(&self) -> StaticSecret {
        StaticSecret::from(self.signing.to_scalar_bytes())
    }
}

#[derive(Clone)]
pub struct PublicKey {
    verifying: VerifyingKey,
}

impl PublicKey {
    pub fn import(bytes: &[u8]) -> EngineResult<Self> {
        let raw = untag(bytes, FoundationStatus::BadDerPublicKey)?;
        let verifying =
            VerifyingKey::from_bytes(&raw).map_err(|_| FoundationStatus::BadEd25519PublicKey)?;
        Ok(Self { verifying })
    }

    pub fn export(&self) -> Vec<u8> {
        tag(self.verifying.as_bytes())
    }

    pub fn identifier(&self, sha256: bool) -> Vec<u8> {
        let raw = self.verifying.as_bytes();
        if sha256 {
            Sha256::digest(raw).to_vec()
        } else {
            Sha512::digest(raw)[..SHORT_IDENTIFIER_LEN].to_vec()
        }
    }

    /// Strict verification; a malformed signature simply fails
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        let Ok(bytes) = <[u8; SIGNATURE_SIZE]>::try_from(signature) else {
            return false;
        };
        let signature = Signature::from_bytes(&bytes);
        self.verifying.verify_strict(message, &signature).is_ok()
    }

    pub fn to_x25519(&self) -> EngineResult<X25519PublicKey> {
        let edwards = CompressedEdwardsY(self.verifying.to_bytes())
            .decompress()
            .ok_or(FoundationStatus::BadEd25519PublicKey)?;
        Ok(X25519PublicKey::from(edwards.to_montgomery().to_bytes()))
    }
}
