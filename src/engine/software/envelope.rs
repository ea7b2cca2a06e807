// Multi-recipient hybrid encryption
// A random content key encrypts the data; each recipient gets that key
// wrapped under an ephemeral X25519 agreement with their public key

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::kdf::derive_kek;
use super::key_material::{PrivateKey, PublicKey};
use super::padding::{pad_to_frame, unpad};
use super::random::random_array;
use super::symmetric::{self, SymmetricKey, NONCE_SIZE};
use super::EngineResult;
use crate::error::FoundationStatus;

const FORMAT_VERSION: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct KeyRecipient {
    key_id: Vec<u8>,
    ephemeral_public: [u8; 32],
    nonce: [u8; NONCE_SIZE],
    wrapped_key: Vec<u8>,
}

/// Everything a recipient needs to decrypt besides the ciphertext
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageInfo {
    version: u8,
    recipients: Vec<KeyRecipient>,
    nonce: [u8; NONCE_SIZE],
    padded: bool,
}

impl MessageInfo {
    pub fn to_bytes(&self) -> EngineResult<Vec<u8>> {
        bincode::serialize(self).map_err(|_| FoundationStatus::BadMessageInfo)
    }

    pub fn from_bytes(bytes: &[u8]) -> EngineResult<Self> {
        let info: Self = bincode::deserialize(bytes).map_err(|_| FoundationStatus::BadMessageInfo)?;
        if info.version != FORMAT_VERSION {
            return Err(FoundationStatus::BadMessageInfo);
        }
        Ok(info)
    }
}

#[derive(Serialize, Deserialize)]
struct SealedMessage {
    info: MessageInfo,
    ciphertext: Vec<u8>,
}

/// Plaintext layout of sign-then-encrypt messages
#[derive(Serialize, Deserialize)]
struct SignedPayload {
    signer_id: Vec<u8>,
    signature: Vec<u8>,
    data: Vec<u8>,
}

/// Options shared by every encrypting call
#[derive(Debug, Clone, Copy)]
pub struct SealOptions {
    pub padding_frame: Option<usize>,
    pub sha256_ids: bool,
}

fn wrap_for(
    content_key: &SymmetricKey,
    recipient: &PublicKey,
    sha256_ids: bool,
) -> EngineResult<KeyRecipient> {
    let key_id = recipient.identifier(sha256_ids);
    let recipient_x = recipient.to_x25519()?;

    let ephemeral = x25519_dalek::StaticSecret::from(*Zeroizing::new(random_array::<32>()?));
    let ephemeral_public = x25519_dalek::PublicKey::from(&ephemeral);
    let shared = ephemeral.diffie_hellman(&recipient_x);
    if !shared.was_contributory() {
        return Err(FoundationStatus::SharedKeyExchangeFailed);
    }

    let kek = derive_kek(shared.as_bytes(), ephemeral_public.as_bytes(), recipient_x.as_bytes())?;
    let (nonce, wrapped_key) = symmetric::encrypt(&kek, content_key.as_bytes(), &key_id)?;

    Ok(KeyRecipient {
        key_id,
        ephemeral_public: ephemeral_public.to_bytes(),
        nonce,
        wrapped_key,
    })
}

fn unwrap_with(
    recipient: &KeyRecipient,
    private_key: &PrivateKey,
) -> EngineResult<SymmetricKey> {
    let secret = private_key.to_x25519();
    let own_public = x25519_dalek::PublicKey::from(&secret);
    let shared = secret.diffie_hellman(&x25519_dalek::PublicKey::from(recipient.ephemeral_public));
    if !shared.was_contributory() {
        return Err(FoundationStatus::SharedKeyExchangeFailed);
    }

    let kek = derive_kek(shared.as_bytes(), &recipient.ephemeral_public, own_public.as_bytes())?;
    let content_key = Zeroizing::new(
        symmetric::decrypt(&kek, &recipient.nonce, &recipient.wrapped_key, &recipient.key_id)
            .map_err(|_| FoundationStatus::KeyRecipientPrivateKeyIsWrong)?,
    );
    SymmetricKey::from_slice(&content_key)
}

/// Encrypt `data` for every recipient, returning header and ciphertext apart
pub fn seal_detached(
    data: &[u8],
    recipients: &[PublicKey],
    options: SealOptions,
) -> EngineResult<(MessageInfo, Vec<u8>)> {
    if recipients.is_empty() {
        return Err(FoundationStatus::BadArguments);
    }

    let content_key = SymmetricKey::generate()?;
    let info = MessageInfo {
        version: FORMAT_VERSION,
        recipients: recipients
            .iter()
            .map(|r| wrap_for(&content_key, r, options.sha256_ids))
            .collect::<EngineResult<_>>()?,
        nonce: symmetric::generate_nonce()?,
        padded: options.padding_frame.is_some(),
    };

    let plaintext = match options.padding_frame {
        Some(frame) => Zeroizing::new(pad_to_frame(data, frame)?),
        None => Zeroizing::new(data.to_vec()),
    };

    // The header is authenticated along with the content
    let aad = info.to_bytes()?;
    let ciphertext = symmetric::encrypt_with_nonce(&content_key, &info.nonce, &plaintext, &aad)?;
    Ok((info, ciphertext))
}

/// Decrypt a detached ciphertext as the holder of `private_key`
pub fn open_detached(
    info: &MessageInfo,
    ciphertext: &[u8],
    private_key: &PrivateKey,
    sha256_ids: bool,
) -> EngineResult<Vec<u8>> {
    let key_id = private_key.public_key().identifier(sha256_ids);
    let recipient = info
        .recipients
        .iter()
        .find(|r| r.key_id == key_id)
        .ok_or(FoundationStatus::KeyRecipientIsNotFound)?;

    let content_key = unwrap_with(recipient, private_key)?;
    let aad = info.to_bytes()?;
    let plaintext = Zeroizing::new(symmetric::decrypt(&content_key, &info.nonce, ciphertext, &aad)?);

    if info.padded {
        unpad(&plaintext)
    } else {
        Ok(plaintext.to_vec())
    }
}

/// Attach the header to its ciphertext
pub fn join(info: MessageInfo, ciphertext: Vec<u8>) -> EngineResult<Vec<u8>> {
    bincode::serialize(&SealedMessage { info, ciphertext })
        .map_err(|_| FoundationStatus::BadMessageInfo)
}

pub fn seal(data: &[u8], recipients: &[PublicKey], options: SealOptions) -> EngineResult<Vec<u8>> {
    let (info, ciphertext) = seal_detached(data, recipients, options)?;
    join(info, ciphertext)
}

pub fn open(data: &[u8], private_key: &PrivateKey, sha256_ids: bool) -> EngineResult<Vec<u8>> {
    let sealed: SealedMessage =
        bincode::deserialize(data).map_err(|_| FoundationStatus::NoMessageInfo)?;
    if sealed.info.version != FORMAT_VERSION {
        return Err(FoundationStatus::BadMessageInfo);
    }
    open_detached(&sealed.info, &sealed.ciphertext, private_key, sha256_ids)
}

/// Signed plaintext ready for sealing
pub fn sign_payload(data: &[u8], signer: &PrivateKey, sha256_ids: bool) -> EngineResult<Vec<u8>> {
    let payload = SignedPayload {
        signer_id: signer.public_key().identifier(sha256_ids),
        signature: signer.sign(data).to_vec(),
        data: data.to_vec(),
    };
    bincode::serialize(&payload).map_err(|_| FoundationStatus::BadMessageInfoFooter)
}

/// Check a signed plaintext against the first verifier whose id matches
pub fn verify_payload(
    payload: &[u8],
    verifiers: &[PublicKey],
    sha256_ids: bool,
) -> EngineResult<Vec<u8>> {
    let payload: SignedPayload =
        bincode::deserialize(payload).map_err(|_| FoundationStatus::BadMessageInfoFooter)?;

    let signer = verifiers
        .iter()
        .find(|key| key.identifier(sha256_ids) == payload.signer_id)
        .ok_or(FoundationStatus::InvalidSignature)?;

    if !signer.verify(&payload.data, &payload.signature) {
        return Err(FoundationStatus::InvalidSignature);
    }
    Ok(payload.data)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAIN: SealOptions = SealOptions {
        padding_frame: None,
        sha256_ids: false,
    };

    #[test]
    fn test_every_recipient_can_open() {
        let a = PrivateKey::generate().unwrap();
        let b = PrivateKey::generate().unwrap();
        let sealed = seal(b"hello", &[a.public_key(), b.public_key()], PLAIN).unwrap();

        assert_eq!(open(&sealed, &a, false).unwrap(), b"hello");
        assert_eq!(open(&sealed, &b, false).unwrap(), b"hello");
    }

    #[test]
    fn test_stranger_is_not_a_recipient() {
        let a = PrivateKey::generate().unwrap();
        let c = PrivateKey::generate().unwrap();
        let sealed = seal(b"hello", &[a.public_key()], PLAIN).unwrap();
        assert_eq!(open(&sealed, &c, false), Err(FoundationStatus::KeyRecipientIsNotFound));
    }

    #[test]
    fn test_padding_hides_length() {
        let a = PrivateKey::generate().unwrap();
        let options = SealOptions {
            padding_frame: Some(160),
            sha256_ids: false,
        };
        let (_, short) = seal_detached(b"a", &[a.public_key()], options).unwrap();
        let (info, long) = seal_detached(&[7u8; 100], &[a.public_key()], options).unwrap();
        assert_eq!(short.len(), long.len());
        assert_eq!(open_detached(&info, &long, &a, false).unwrap(), vec![7u8; 100]);
    }

    #[test]
    fn test_header_is_authenticated() {
        let a = PrivateKey::generate().unwrap();
        let (mut info, ct) = seal_detached(b"data", &[a.public_key()], PLAIN).unwrap();
        info.padded = true;
        assert_eq!(open_detached(&info, &ct, &a, false), Err(FoundationStatus::AuthFailed));
    }

    #[test]
    fn test_signed_payload() {
        let signer = PrivateKey::generate().unwrap();
        let other = PrivateKey::generate().unwrap();
        let payload = sign_payload(b"data", &signer, false).unwrap();

        assert_eq!(verify_payload(&payload, &[signer.public_key()], false).unwrap(), b"data");
        assert_eq!(
            verify_payload(&payload, &[other.public_key()], false),
            Err(FoundationStatus::InvalidSignature)
        );
    }
}
