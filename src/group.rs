// Group session epoch protocol
// Append-only log of epoch tokens plus the session identity derived from
// the group id; all cipher work happens in the engine

use std::fmt;
use std::sync::Arc;

use crate::codec::{normalize, Data, WireText};
use crate::engine::{Engine, GroupMessageInfo, GroupSessionInfo};
use crate::error::{CryptoError, Result};
use crate::keys::{checked_private_key_value, PrivateKeyHandle, PublicKeyHandle, SecretStore};

pub const SESSION_ID_LEN: usize = 32;

/// 32-byte session identifier, shown as lowercase hex
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId([u8; SESSION_ID_LEN]);

impl SessionId {
    pub fn from_bytes(bytes: [u8; SESSION_ID_LEN]) -> Self {
        Self(bytes)
    }

    pub(crate) fn from_wire(wire: &WireText) -> Result<Self> {
        let bytes = wire.decode()?;
        let bytes: [u8; SESSION_ID_LEN] = bytes.try_into().map_err(|b: Vec<u8>| {
            CryptoError::malformed_response(
                "sessionId",
                format!("expected {} bytes, got {}", SESSION_ID_LEN, b.len()),
            )
        })?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; SESSION_ID_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.to_hex())
    }
}

/// Header of a group message or epoch token, readable without any key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMessage {
    pub session_id: SessionId,
    pub epoch_number: u32,
    pub data: WireText,
}

impl GroupMessage {
    pub(crate) fn from_info(info: GroupMessageInfo) -> Result<Self> {
        Ok(Self {
            session_id: SessionId::from_wire(&info.session_id)?,
            epoch_number: info.epoch_number,
            data: info.data,
        })
    }
}

/// Read the header of `data` through `engine`
pub(crate) fn parse_message<E: Engine>(engine: &E, message_data: impl Into<Data>) -> Result<GroupMessage> {
    let data = normalize(Some(&message_data.into()), Some("base64"), "messageData")?;
    tracing::trace!(op = "group_parse_message", "engine call");
    GroupMessage::from_info(engine.group_parse_message(&data).into_result()?)
}

/// One participant's view of a group session.
///
/// Holds every epoch token learned so far, indexed by epoch number.
/// Encryption always uses the newest epoch; decryption works for any epoch
/// recorded here. Mutation takes `&mut self`, so sharing a session across
/// threads needs a lock around it.
pub struct GroupSession<E: Engine> {
    engine: Arc<E>,
    store: Arc<SecretStore>,
    session_id: SessionId,
    current_epoch: u32,
    epoch_messages: Vec<WireText>,
}

impl<E: Engine> GroupSession<E> {
    pub(crate) fn from_info(engine: Arc<E>, store: Arc<SecretStore>, info: GroupSessionInfo) -> Result<Self> {
        let expected = info.epoch_messages.len().checked_sub(1).ok_or_else(|| {
            CryptoError::malformed_response("epochMessages", "session has no epochs")
        })?;
        if expected != info.current_epoch_number as usize {
            return Err(CryptoError::EpochOutOfSequence {
                expected: expected as u32,
                actual: info.current_epoch_number,
            });
        }

        Ok(Self {
            engine,
            store,
            session_id: SessionId::from_wire(&info.session_id)?,
            current_epoch: info.current_epoch_number,
            epoch_messages: info.epoch_messages,
        })
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn current_epoch_number(&self) -> u32 {
        self.current_epoch
    }

    /// Epoch tokens in wire form, oldest first
    pub fn epoch_messages(&self) -> &[WireText] {
        &self.epoch_messages
    }

    /// Encrypt under the newest epoch, signed with `private_key`.
    /// String data is read as UTF-8.
    pub fn encrypt(&self, data: impl Into<Data>, private_key: &PrivateKeyHandle) -> Result<Vec<u8>> {
        let data = normalize(Some(&data.into()), Some("utf8"), "data")?;
        let private = checked_private_key_value(&self.store, private_key)?;

        tracing::trace!(op = "group_encrypt", epoch = self.current_epoch, "engine call");
        self.engine
            .group_encrypt(&data, &private, &self.epoch_messages)
            .into_result()?
            .decode()
    }

    /// Verify against `public_key` and decrypt. String data is read as base64.
    pub fn decrypt(&self, encrypted_data: impl Into<Data>, public_key: &PublicKeyHandle) -> Result<Vec<u8>> {
        let data = normalize(Some(&encrypted_data.into()), Some("base64"), "encryptedData")?;

        tracing::trace!(op = "group_decrypt", "engine call");
        self.engine
            .group_decrypt(&data, public_key.value(), &self.epoch_messages)
            .into_result()?
            .decode_secret()
    }

    /// Rotate to a fresh epoch.
    ///
    /// The counter and the token log change together or not at all.
    pub fn add_new_epoch(&mut self) -> Result<GroupMessage> {
        tracing::trace!(op = "group_add_new_epoch", epoch = self.current_epoch, "engine call");
        let info = self.engine.group_add_new_epoch(&self.epoch_messages).into_result()?;

        let expected = self
            .current_epoch
            .checked_add(1)
            .ok_or(CryptoError::EpochOutOfSequence {
                expected: u32::MAX,
                actual: info.epoch_number,
            })?;
        if info.epoch_number != expected {
            return Err(CryptoError::EpochOutOfSequence {
                expected,
                actual: info.epoch_number,
            });
        }

        let message = GroupMessage::from_info(info)?;
        if message.session_id != self.session_id {
            return Err(CryptoError::malformed_response(
                "sessionId",
                format!("epoch belongs to session {}", message.session_id),
            ));
        }

        self.epoch_messages.push(message.data.clone());
        self.current_epoch = expected;
        tracing::debug!(session = %self.session_id, epoch = expected, "group session advanced");
        Ok(message)
    }

    /// All epoch tokens as raw bytes, ready to hand to another participant
    pub fn export(&self) -> Result<Vec<Vec<u8>>> {
        self.epoch_messages.iter().map(WireText::decode).collect()
    }

    /// Read a message header without decrypting it
    pub fn parse_message(&self, message_data: impl Into<Data>) -> Result<GroupMessage> {
        parse_message(self.engine.as_ref(), message_data)
    }
}

impl<E: Engine> fmt::Debug for GroupSession<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupSession")
            .field("session_id", &self.session_id)
            .field("current_epoch", &self.current_epoch)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facade::Crypto;

    #[test]
    fn test_session_id_hex() {
        let id = SessionId::from_bytes([0xab; SESSION_ID_LEN]);
        assert_eq!(id.to_string(), "ab".repeat(SESSION_ID_LEN));
        assert!(format!("{:?}", id).starts_with("SessionId(abab"));
    }

    #[test]
    fn test_session_id_length_checked() {
        let err = SessionId::from_wire(&WireText::encode(&[1u8; 16])).unwrap_err();
        assert!(matches!(err, CryptoError::MalformedResponse { .. }));
    }

    #[test]
    fn test_log_grows_with_epochs() {
        let crypto = Crypto::software();
        let mut session = crypto.generate_group_session("group-id-0001").unwrap();
        assert_eq!(session.current_epoch_number(), 0);
        assert_eq!(session.export().unwrap().len(), 1);

        let message = session.add_new_epoch().unwrap();
        assert_eq!(message.epoch_number, 1);
        assert_eq!(message.session_id, session.session_id());
        assert_eq!(session.epoch_messages().len(), 2);
        assert_eq!(session.epoch_messages()[1], message.data);
    }

    #[test]
    fn test_parse_routes_by_header() {
        let crypto = Crypto::software();
        let keys = crypto.generate_keys(None).unwrap();
        let mut session = crypto.generate_group_session("group-id-0001").unwrap();
        session.add_new_epoch().unwrap();

        let ciphertext = session.encrypt("hi", &keys.private_key).unwrap();
        let header = session.parse_message(ciphertext).unwrap();
        assert_eq!(header.session_id, session.session_id());
        assert_eq!(header.epoch_number, 1);
    }

    use crate::algorithm::{HashAlgorithm, KeyPairType};
    use crate::engine::{BlindInfo, DetachedInfo, KeyPairInfo, PublicKeyInfo, SoftwareEngine};
    use crate::error::Envelope;
    use parking_lot::Mutex;

    enum Skew {
        SkipEpoch,
        ForeignSession,
    }

    /// Software engine whose next epoch rotation is tampered with once
    #[derive(Default)]
    struct SkewedEngine {
        inner: SoftwareEngine,
        skew: Mutex<Option<Skew>>,
    }

    impl SkewedEngine {
        fn arm(&self, skew: Skew) {
            *self.skew.lock() = Some(skew);
        }
    }

    impl Engine for SkewedEngine {
        fn generate_random_data(&self, size: u32) -> Envelope<WireText> {
            self.inner.generate_random_data(size)
        }
        fn compute_hash(&self, data: &WireText) -> Envelope<WireText> {
            self.inner.compute_hash(data)
        }
        fn compute_hash_with_algorithm(&self, data: &WireText, algorithm: HashAlgorithm) -> Envelope<WireText> {
            self.inner.compute_hash_with_algorithm(data, algorithm)
        }
        fn generate_key_pair(&self) -> Envelope<KeyPairInfo> {
            self.inner.generate_key_pair()
        }
        fn generate_key_pair_of_type(&self, key_type: KeyPairType) -> Envelope<KeyPairInfo> {
            self.inner.generate_key_pair_of_type(key_type)
        }
        fn generate_key_pair_using_seed(&self, seed: &WireText) -> Envelope<KeyPairInfo> {
            self.inner.generate_key_pair_using_seed(seed)
        }
        fn generate_key_pair_with_type_and_seed(&self, key_type: KeyPairType, seed: &WireText) -> Envelope<KeyPairInfo> {
            self.inner.generate_key_pair_with_type_and_seed(key_type, seed)
        }
        fn encrypt(&self, data: &WireText, public_keys: &[WireText], enable_padding: bool) -> Envelope<WireText> {
            self.inner.encrypt(data, public_keys, enable_padding)
        }
        fn decrypt(&self, data: &WireText, private_key: &WireText) -> Envelope<WireText> {
            self.inner.decrypt(data, private_key)
        }
        fn generate_signature(&self, data: &WireText, private_key: &WireText) -> Envelope<WireText> {
            self.inner.generate_signature(data, private_key)
        }
        fn verify_signature(&self, signature: &WireText, data: &WireText, public_key: &WireText) -> Envelope<bool> {
            self.inner.verify_signature(signature, data, public_key)
        }
        fn sign_and_encrypt(
            &self,
            data: &WireText,
            private_key: &WireText,
            public_keys: &[WireText],
            enable_padding: bool,
        ) -> Envelope<WireText> {
            self.inner.sign_and_encrypt(data, private_key, public_keys, enable_padding)
        }
        fn decrypt_and_verify(&self, data: &WireText, private_key: &WireText, public_keys: &[WireText]) -> Envelope<WireText> {
            self.inner.decrypt_and_verify(data, private_key, public_keys)
        }
        fn sign_then_encrypt(
            &self,
            data: &WireText,
            private_key: &WireText,
            public_keys: &[WireText],
            enable_padding: bool,
        ) -> Envelope<WireText> {
            self.inner.sign_then_encrypt(data, private_key, public_keys, enable_padding)
        }
        fn decrypt_then_verify(&self, data: &WireText, private_key: &WireText, public_keys: &[WireText]) -> Envelope<WireText> {
            self.inner.decrypt_then_verify(data, private_key, public_keys)
        }
        fn sign_then_encrypt_detached(
            &self,
            data: &WireText,
            private_key: &WireText,
            public_keys: &[WireText],
            enable_padding: bool,
        ) -> Envelope<DetachedInfo> {
            self.inner.sign_then_encrypt_detached(data, private_key, public_keys, enable_padding)
        }
        fn decrypt_then_verify_detached(
            &self,
            data: &WireText,
            metadata: &WireText,
            private_key: &WireText,
            public_keys: &[WireText],
        ) -> Envelope<WireText> {
            self.inner.decrypt_then_verify_detached(data, metadata, private_key, public_keys)
        }
        fn extract_public_key(&self, private_key: &WireText) -> Envelope<PublicKeyInfo> {
            self.inner.extract_public_key(private_key)
        }
        fn get_private_key_identifier(&self, private_key: &WireText) -> Envelope<WireText> {
            self.inner.get_private_key_identifier(private_key)
        }
        fn get_public_key_identifier(&self, public_key: &WireText) -> Envelope<WireText> {
            self.inner.get_public_key_identifier(public_key)
        }
        fn generate_group_session(&self, group_id: &WireText) -> Envelope<GroupSessionInfo> {
            self.inner.generate_group_session(group_id)
        }
        fn import_group_session(&self, epoch_messages: &[WireText]) -> Envelope<GroupSessionInfo> {
            self.inner.import_group_session(epoch_messages)
        }
        fn group_encrypt(&self, data: &WireText, private_key: &WireText, epoch_messages: &[WireText]) -> Envelope<WireText> {
            self.inner.group_encrypt(data, private_key, epoch_messages)
        }
        fn group_decrypt(&self, data: &WireText, public_key: &WireText, epoch_messages: &[WireText]) -> Envelope<WireText> {
            self.inner.group_decrypt(data, public_key, epoch_messages)
        }
        fn group_add_new_epoch(&self, epoch_messages: &[WireText]) -> Envelope<GroupMessageInfo> {
            let envelope = self.inner.group_add_new_epoch(epoch_messages);
            match (self.skew.lock().take(), envelope) {
                (Some(Skew::SkipEpoch), Envelope::Result(mut info)) => {
                    info.epoch_number += 1;
                    Envelope::Result(info)
                }
                (Some(Skew::ForeignSession), Envelope::Result(mut info)) => {
                    info.session_id = WireText::encode(&[0x5a; SESSION_ID_LEN]);
                    Envelope::Result(info)
                }
                (_, envelope) => envelope,
            }
        }
        fn group_parse_message(&self, data: &WireText) -> Envelope<GroupMessageInfo> {
            self.inner.group_parse_message(data)
        }
        fn blind(&self, password: &WireText) -> Envelope<BlindInfo> {
            self.inner.blind(password)
        }
        fn deblind(&self, transformed_password: &WireText, blinding_secret: &WireText) -> Envelope<WireText> {
            self.inner.deblind(transformed_password, blinding_secret)
        }
    }

    #[test]
    fn test_rejected_rotation_leaves_state_untouched() {
        let crypto = Crypto::new(SkewedEngine::default());
        let mut session = crypto.generate_group_session("group-id-0001").unwrap();
        session.add_new_epoch().unwrap();
        let tokens_before = session.epoch_messages().to_vec();

        crypto.engine().arm(Skew::SkipEpoch);
        let err = session.add_new_epoch().unwrap_err();
        assert!(matches!(err, CryptoError::EpochOutOfSequence { expected: 2, actual: 3 }));
        assert_eq!(session.current_epoch_number(), 1);
        assert_eq!(session.epoch_messages(), &tokens_before[..]);

        crypto.engine().arm(Skew::ForeignSession);
        let err = session.add_new_epoch().unwrap_err();
        assert!(matches!(err, CryptoError::MalformedResponse { ref field, .. } if field == "sessionId"));
        assert_eq!(session.current_epoch_number(), 1);
        assert_eq!(session.epoch_messages(), &tokens_before[..]);

        // unarmed again, rotation proceeds normally
        assert_eq!(session.add_new_epoch().unwrap().epoch_number, 2);
        assert_eq!(session.epoch_messages().len(), 3);
    }

    #[test]
    fn test_argument_labels_name_the_parameter() {
        let crypto = Crypto::software();
        let keys = crypto.generate_keys(None).unwrap();
        let session = crypto.generate_group_session("group-id-0001").unwrap();

        let err = session.decrypt(Data::tagged("00", "klingon"), &keys.public_key).unwrap_err();
        assert!(matches!(err, CryptoError::InvalidArgument { ref label, .. } if label == "encryptedData"));

        let err = session.parse_message(Data::tagged("00", "klingon")).unwrap_err();
        assert!(matches!(err, CryptoError::InvalidArgument { ref label, .. } if label == "messageData"));
    }

    #[test]
    fn test_inconsistent_engine_session_rejected() {
        let crypto = Crypto::software();
        let info = GroupSessionInfo {
            session_id: WireText::encode(&[0u8; SESSION_ID_LEN]),
            current_epoch_number: 3,
            epoch_messages: vec![WireText::encode(b"token")],
        };
        let err = GroupSession::from_info(crypto.engine().clone(), crypto.store().clone(), info).unwrap_err();
        assert!(matches!(err, CryptoError::EpochOutOfSequence { expected: 0, actual: 3 }));
    }
}
