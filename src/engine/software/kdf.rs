// Key derivation using HKDF-SHA256
// Every derived key is bound to a distinct info label

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroizing;

use super::symmetric::{SymmetricKey, KEY_SIZE};
use super::EngineResult;
use crate::error::FoundationStatus;

const KEK_INFO: &[u8] = b"keyveil-kek-v1";
const GROUP_MESSAGE_INFO: &[u8] = b"keyveil-group-message-v1";
const SEED_INFO: &[u8] = b"keyveil-ed25519-seed-v1";

pub fn derive_keys(
    input_key_material: &[u8],
    salt: &[u8],
    info: &[u8],
    output_length: usize,
) -> EngineResult<Zeroizing<Vec<u8>>> {
    let hk = Hkdf::<Sha256>::new(Some(salt), input_key_material);

    let mut output = Zeroizing::new(vec![0u8; output_length]);
    hk.expand(info, &mut output)
        .map_err(|_| FoundationStatus::UnhandledThirdpartyError)?;

    Ok(output)
}

fn derive_array(ikm: &[u8], salt: &[u8], info: &[u8]) -> EngineResult<Zeroizing<[u8; KEY_SIZE]>> {
    let derived = derive_keys(ikm, salt, info, KEY_SIZE)?;
    let mut out = Zeroizing::new([0u8; KEY_SIZE]);
    out.copy_from_slice(&derived);
    Ok(out)
}

/// Key-encryption key for one recipient, from an X25519 shared secret
pub fn derive_kek(
    shared_secret: &[u8],
    ephemeral_public: &[u8; 32],
    recipient_public: &[u8; 32],
) -> EngineResult<SymmetricKey> {
    let mut salt = Vec::with_capacity(64);
    salt.extend_from_slice(ephemeral_public);
    salt.extend_from_slice(recipient_public);
    Ok(SymmetricKey::new(*derive_array(shared_secret, &salt, KEK_INFO)?))
}

/// Message key for a group epoch
pub fn derive_group_message_key(
    epoch_key: &[u8; 32],
    session_id: &[u8; 32],
    epoch: u32,
) -> EngineResult<SymmetricKey> {
    let mut info = GROUP_MESSAGE_INFO.to_vec();
    info.extend_from_slice(&epoch.to_le_bytes());
    Ok(SymmetricKey::new(*derive_array(epoch_key, session_id, &info)?))
}

/// Ed25519 seed from caller key material
pub fn derive_signing_seed(key_material: &[u8]) -> EngineResult<Zeroizing<[u8; 32]>> {
    derive_array(key_material, &[], SEED_INFO)
}
