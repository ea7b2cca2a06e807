// Epoch-based group messaging
// Each epoch token carries a fresh epoch key; regular messages are encrypted
// under a key derived from the newest epoch and signed by the sender

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::kdf::derive_group_message_key;
use super::key_material::{PrivateKey, PublicKey};
use super::random::random_array;
use super::symmetric::{self, NONCE_SIZE};
use super::EngineResult;
use crate::error::FoundationStatus;

pub const SESSION_ID_LEN: usize = 32;

/// Largest plaintext a single group message may carry
pub const MAX_PLAIN_TEXT_LEN: usize = 30188;

/// Shortest group id the engine accepts
pub const MIN_GROUP_ID_LEN: usize = 10;

const FORMAT_VERSION: u8 = 1;

#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
struct EpochKey([u8; 32]);

#[derive(Serialize, Deserialize)]
enum MessageBody {
    Epoch {
        key: EpochKey,
    },
    Regular {
        nonce: [u8; NONCE_SIZE],
        ciphertext: Vec<u8>,
        signature: Vec<u8>,
    },
}

#[derive(Serialize, Deserialize)]
pub struct GroupSessionMessage {
    version: u8,
    session_id: [u8; SESSION_ID_LEN],
    epoch: u32,
    body: MessageBody,
}

impl GroupSessionMessage {
    pub fn from_bytes(bytes: &[u8]) -> EngineResult<Self> {
        let message: Self =
            bincode::deserialize(bytes).map_err(|_| FoundationStatus::ProtobufError)?;
        if message.version != FORMAT_VERSION {
            return Err(FoundationStatus::ProtobufError);
        }
        Ok(message)
    }

    pub fn to_bytes(&self) -> EngineResult<Vec<u8>> {
        bincode::serialize(self).map_err(|_| FoundationStatus::ProtobufError)
    }

    pub fn session_id(&self) -> &[u8; SESSION_ID_LEN] {
        &self.session_id
    }

    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    fn new_epoch(session_id: [u8; SESSION_ID_LEN], epoch: u32) -> EngineResult<Self> {
        Ok(Self {
            version: FORMAT_VERSION,
            session_id,
            epoch,
            body: MessageBody::Epoch {
                key: EpochKey(random_array()?),
            },
        })
    }
}

/// Validated, contiguous run of epochs starting at 0
pub struct EpochLog {
    session_id: [u8; SESSION_ID_LEN],
    keys: Vec<EpochKey>,
}

impl EpochLog {
    pub fn parse(tokens: &[Vec<u8>]) -> EngineResult<Self> {
        let mut session_id = None;
        let mut keys = Vec::with_capacity(tokens.len());

        for token in tokens {
            let message = GroupSessionMessage::from_bytes(token)?;
            let MessageBody::Epoch { key } = &message.body else {
                return Err(FoundationStatus::ProtobufError);
            };

            match session_id {
                None => session_id = Some(message.session_id),
                Some(id) if id != message.session_id => {
                    return Err(FoundationStatus::SessionIdDoesntMatch);
                }
                Some(_) => {}
            }

            let expected = keys.len() as u32;
            if message.epoch < expected {
                return Err(FoundationStatus::DuplicateEpoch);
            }
            if message.epoch > expected {
                return Err(FoundationStatus::EpochNotFound);
            }
            keys.push(key.clone());
        }

        let session_id = session_id.ok_or(FoundationStatus::BadArguments)?;
        Ok(Self { session_id, keys })
    }

    pub fn session_id(&self) -> &[u8; SESSION_ID_LEN] {
        &self.session_id
    }

    pub fn current_epoch(&self) -> u32 {
        (self.keys.len() - 1) as u32
    }

    /// Token for the epoch after the current one
    pub fn next_epoch(&self) -> EngineResult<GroupSessionMessage> {
        let next = self
            .current_epoch()
            .checked_add(1)
            .ok_or(FoundationStatus::BadArguments)?;
        GroupSessionMessage::new_epoch(self.session_id, next)
    }
}

pub fn session_id_for(group_id: &[u8]) -> [u8; SESSION_ID_LEN] {
    let digest = Sha512::digest(group_id);
    let mut id = [0u8; SESSION_ID_LEN];
    id.copy_from_slice(&digest[..SESSION_ID_LEN]);
    id
}

/// Epoch 0 token for a brand new session
pub fn first_epoch(group_id: &[u8]) -> EngineResult<GroupSessionMessage> {
    if group_id.len() < MIN_GROUP_ID_LEN {
        return Err(FoundationStatus::BadArguments);
    }
    GroupSessionMessage::new_epoch(session_id_for(group_id), 0)
}

fn header(session_id: &[u8; SESSION_ID_LEN], epoch: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(SESSION_ID_LEN + 4);
    out.extend_from_slice(session_id);
    out.extend_from_slice(&epoch.to_le_bytes());
    out
}

fn signed_bytes(header: &[u8], nonce: &[u8], ciphertext: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(header.len() + nonce.len() + ciphertext.len());
    out.extend_from_slice(header);
    out.extend_from_slice(nonce);
    out.extend_from_slice(ciphertext);
    out
}

/// Encrypt under the newest epoch and sign as `sender`
pub fn encrypt(log: &EpochLog, data: &[u8], sender: &PrivateKey) -> EngineResult<GroupSessionMessage> {
    if data.len() > MAX_PLAIN_TEXT_LEN {
        return Err(FoundationStatus::PlainTextTooLong);
    }

    let epoch = log.current_epoch();
    let key = derive_group_message_key(&log.keys[epoch as usize].0, &log.session_id, epoch)?;
    let header = header(&log.session_id, epoch);
    let (nonce, ciphertext) = symmetric::encrypt(&key, data, &header)?;
    let signature = sender.sign(&signed_bytes(&header, &nonce, &ciphertext)).to_vec();

    Ok(GroupSessionMessage {
        version: FORMAT_VERSION,
        session_id: log.session_id,
        epoch,
        body: MessageBody::Regular {
            nonce,
            ciphertext,
            signature,
        },
    })
}

/// Verify and decrypt a regular message from `sender`
pub fn decrypt(log: &EpochLog, message: &GroupSessionMessage, sender: &PublicKey) -> EngineResult<Vec<u8>> {
    let MessageBody::Regular {
        nonce,
        ciphertext,
        signature,
    } = &message.body
    else {
        return Err(FoundationStatus::BadArguments);
    };

    if message.session_id != log.session_id {
        return Err(FoundationStatus::SessionIdDoesntMatch);
    }
    let epoch_key = log
        .keys
        .get(message.epoch as usize)
        .ok_or(FoundationStatus::EpochNotFound)?;

    let header = header(&message.session_id, message.epoch);
    if !sender.verify(&signed_bytes(&header, nonce, ciphertext), signature) {
        return Err(FoundationStatus::InvalidSignature);
    }

    let key = derive_group_message_key(&epoch_key.0, &log.session_id, message.epoch)?;
    symmetric::decrypt(&key, nonce, ciphertext, &header)
}
