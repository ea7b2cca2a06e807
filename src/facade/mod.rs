// Crypto facade
// Validates and canonicalizes caller input, resolves key handles, then
// makes exactly one engine call per operation

pub mod files;

use std::sync::Arc;

use zeroize::Zeroizing;

use crate::algorithm::{HashAlgorithm, KeyPairType};
use crate::brainkey::BrainkeyCrypto;
use crate::codec::{normalize, Data, WireText};
use crate::config::CryptoConfig;
use crate::engine::{Engine, SoftwareEngine};
use crate::error::{CryptoError, Envelope, Result};
use crate::group::{self, GroupMessage, GroupSession, SessionId, SESSION_ID_LEN};
use crate::keys::{
    checked_private_key_value, checked_public_key_values, wrap_key_pair, wrap_private_key,
    wrap_public_key, KeyIdentifier, KeyPair, PrivateKeyHandle, PublicKeyHandle, SecretStore,
};

/// Shortest group id accepted for a group session
pub const MIN_GROUP_ID_BYTE_LENGTH: usize = 10;

/// Ciphertext and message info produced separately
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetachedMessage {
    pub encrypted_data: Vec<u8>,
    pub metadata: Vec<u8>,
}

/// Entry point for every crypto operation.
///
/// Owns the secret store its private key handles resolve against; handles
/// issued by one `Crypto` are invalid on another.
pub struct Crypto<E: Engine = SoftwareEngine> {
    engine: Arc<E>,
    store: Arc<SecretStore>,
    config: CryptoConfig,
}

impl Crypto<SoftwareEngine> {
    /// Facade over the bundled software engine with default settings
    pub fn software() -> Self {
        Self::new(SoftwareEngine::default())
    }
}

impl<E: Engine> Crypto<E> {
    pub fn new(engine: E) -> Self {
        Self::with_config(engine, CryptoConfig::default())
    }

    pub fn with_config(engine: E, config: CryptoConfig) -> Self {
        Self {
            engine: Arc::new(engine),
            store: SecretStore::new(),
            config,
        }
    }

    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    pub fn store(&self) -> &Arc<SecretStore> {
        &self.store
    }

    pub fn config(&self) -> &CryptoConfig {
        &self.config
    }

    fn call<T>(&self, op: &'static str, f: impl FnOnce(&E) -> Envelope<T>) -> Result<T> {
        tracing::trace!(op, "engine call");
        f(&self.engine).into_result()
    }

    /// Password hardening bound to the same engine
    pub fn brainkey(&self) -> BrainkeyCrypto<E> {
        BrainkeyCrypto::new(Arc::clone(&self.engine))
    }

    pub fn get_random_bytes(&self, size: usize) -> Result<Vec<u8>> {
        let size = u32::try_from(size).map_err(|_| {
            CryptoError::invalid_argument("size", format!("must not exceed {} bytes", u32::MAX))
        })?;
        self.call("generate_random_data", |e| e.generate_random_data(size))?
            .decode()
    }

    /// Hash `data`; the engine default (SHA-512) applies when no algorithm
    /// is given. String data is read as UTF-8.
    pub fn calculate_hash(&self, data: impl Into<Data>, algorithm: Option<HashAlgorithm>) -> Result<Vec<u8>> {
        let data = normalize(Some(&data.into()), Some("utf8"), "data")?;
        let hash = match algorithm {
            Some(algorithm) => self.call("compute_hash_with_algorithm", |e| {
                e.compute_hash_with_algorithm(&data, algorithm)
            })?,
            None => self.call("compute_hash", |e| e.compute_hash(&data))?,
        };
        hash.decode()
    }

    pub fn generate_keys(&self, key_type: Option<KeyPairType>) -> Result<KeyPair> {
        let info = match key_type {
            Some(key_type) => self.call("generate_key_pair_of_type", |e| e.generate_key_pair_of_type(key_type))?,
            None => self.call("generate_key_pair", |e| e.generate_key_pair())?,
        };
        wrap_key_pair(&self.store, &info)
    }

    /// Deterministic key pair from caller-supplied seed material.
    /// String material is read as base64.
    pub fn generate_keys_from_key_material(
        &self,
        key_material: impl Into<Data>,
        key_type: Option<KeyPairType>,
    ) -> Result<KeyPair> {
        let seed = Zeroizing::new(normalize(Some(&key_material.into()), Some("base64"), "keyMaterial")?);
        let info = match key_type {
            Some(key_type) => self.call("generate_key_pair_with_type_and_seed", |e| {
                e.generate_key_pair_with_type_and_seed(key_type, &seed)
            })?,
            None => self.call("generate_key_pair_using_seed", |e| e.generate_key_pair_using_seed(&seed))?,
        };
        wrap_key_pair(&self.store, &info)
    }

    pub fn import_private_key(&self, raw_private_key: impl Into<Data>) -> Result<PrivateKeyHandle> {
        let value = Zeroizing::new(normalize(Some(&raw_private_key.into()), Some("base64"), "rawPrivateKey")?);
        let identifier = self.call("get_private_key_identifier", |e| e.get_private_key_identifier(&value))?;
        wrap_private_key(&self.store, KeyIdentifier::from_wire(&identifier)?, &value)
    }

    pub fn import_public_key(&self, raw_public_key: impl Into<Data>) -> Result<PublicKeyHandle> {
        let value = normalize(Some(&raw_public_key.into()), Some("base64"), "rawPublicKey")?;
        let identifier = self.call("get_public_key_identifier", |e| e.get_public_key_identifier(&value))?;
        Ok(PublicKeyHandle::new(KeyIdentifier::from_wire(&identifier)?, value))
    }

    /// Raw private key material, exactly as stored
    pub fn export_private_key(&self, private_key: &PrivateKeyHandle) -> Result<Zeroizing<Vec<u8>>> {
        let value = checked_private_key_value(&self.store, private_key)?;
        value.decode().map(Zeroizing::new)
    }

    pub fn export_public_key(&self, public_key: &PublicKeyHandle) -> Result<Vec<u8>> {
        public_key.exported_material()
    }

    pub fn extract_public_key(&self, private_key: &PrivateKeyHandle) -> Result<PublicKeyHandle> {
        let private = checked_private_key_value(&self.store, private_key)?;
        let info = self.call("extract_public_key", |e| e.extract_public_key(&private))?;
        wrap_public_key(&info)
    }

    /// Encrypt for every key in `public_keys`. String data is read as UTF-8.
    pub fn encrypt(
        &self,
        data: impl Into<Data>,
        public_keys: &[PublicKeyHandle],
        enable_padding: bool,
    ) -> Result<Vec<u8>> {
        let data = normalize(Some(&data.into()), Some("utf8"), "data")?;
        let recipients = checked_public_key_values(public_keys)?;
        self.call("encrypt", |e| e.encrypt(&data, &recipients, enable_padding))?
            .decode()
    }

    /// String data is read as base64
    pub fn decrypt(&self, encrypted_data: impl Into<Data>, private_key: &PrivateKeyHandle) -> Result<Vec<u8>> {
        let data = normalize(Some(&encrypted_data.into()), Some("base64"), "encryptedData")?;
        let private = checked_private_key_value(&self.store, private_key)?;
        self.call("decrypt", |e| e.decrypt(&data, &private))?.decode_secret()
    }

    pub fn calculate_signature(&self, data: impl Into<Data>, private_key: &PrivateKeyHandle) -> Result<Vec<u8>> {
        let data = normalize(Some(&data.into()), Some("utf8"), "data")?;
        let private = checked_private_key_value(&self.store, private_key)?;
        self.call("generate_signature", |e| e.generate_signature(&data, &private))?
            .decode()
    }

    /// Data strings are UTF-8, signature strings base64
    pub fn verify_signature(
        &self,
        data: impl Into<Data>,
        signature: impl Into<Data>,
        public_key: &PublicKeyHandle,
    ) -> Result<bool> {
        let data = normalize(Some(&data.into()), Some("utf8"), "data")?;
        let signature = normalize(Some(&signature.into()), Some("base64"), "signature")?;
        self.call("verify_signature", |e| {
            e.verify_signature(&signature, &data, public_key.value())
        })
    }

    pub fn sign_and_encrypt(
        &self,
        data: impl Into<Data>,
        private_key: &PrivateKeyHandle,
        public_keys: &[PublicKeyHandle],
        enable_padding: bool,
    ) -> Result<Vec<u8>> {
        let data = normalize(Some(&data.into()), Some("utf8"), "data")?;
        let private = checked_private_key_value(&self.store, private_key)?;
        let recipients = checked_public_key_values(public_keys)?;
        self.call("sign_and_encrypt", |e| {
            e.sign_and_encrypt(&data, &private, &recipients, enable_padding)
        })?
        .decode()
    }

    pub fn decrypt_and_verify(
        &self,
        encrypted_data: impl Into<Data>,
        private_key: &PrivateKeyHandle,
        public_keys: &[PublicKeyHandle],
    ) -> Result<Vec<u8>> {
        let data = normalize(Some(&encrypted_data.into()), Some("base64"), "encryptedData")?;
        let private = checked_private_key_value(&self.store, private_key)?;
        let verifiers = checked_public_key_values(public_keys)?;
        self.call("decrypt_and_verify", |e| e.decrypt_and_verify(&data, &private, &verifiers))?
            .decode_secret()
    }

    pub fn sign_then_encrypt(
        &self,
        data: impl Into<Data>,
        private_key: &PrivateKeyHandle,
        public_keys: &[PublicKeyHandle],
        enable_padding: bool,
    ) -> Result<Vec<u8>> {
        let data = normalize(Some(&data.into()), Some("utf8"), "data")?;
        let private = checked_private_key_value(&self.store, private_key)?;
        let recipients = checked_public_key_values(public_keys)?;
        self.call("sign_then_encrypt", |e| {
            e.sign_then_encrypt(&data, &private, &recipients, enable_padding)
        })?
        .decode()
    }

    pub fn decrypt_then_verify(
        &self,
        encrypted_data: impl Into<Data>,
        private_key: &PrivateKeyHandle,
        public_keys: &[PublicKeyHandle],
    ) -> Result<Vec<u8>> {
        let data = normalize(Some(&encrypted_data.into()), Some("base64"), "encryptedData")?;
        let private = checked_private_key_value(&self.store, private_key)?;
        let verifiers = checked_public_key_values(public_keys)?;
        self.call("decrypt_then_verify", |e| e.decrypt_then_verify(&data, &private, &verifiers))?
            .decode_secret()
    }

    pub fn sign_then_encrypt_detached(
        &self,
        data: impl Into<Data>,
        private_key: &PrivateKeyHandle,
        public_keys: &[PublicKeyHandle],
        enable_padding: bool,
    ) -> Result<DetachedMessage> {
        let data = normalize(Some(&data.into()), Some("utf8"), "data")?;
        let private = checked_private_key_value(&self.store, private_key)?;
        let recipients = checked_public_key_values(public_keys)?;
        let info = self.call("sign_then_encrypt_detached", |e| {
            e.sign_then_encrypt_detached(&data, &private, &recipients, enable_padding)
        })?;
        Ok(DetachedMessage {
            encrypted_data: info.encrypted_data.decode()?,
            metadata: info.metadata.decode()?,
        })
    }

    /// Both `encrypted_data` and `metadata` strings are read as base64
    pub fn decrypt_then_verify_detached(
        &self,
        encrypted_data: impl Into<Data>,
        metadata: impl Into<Data>,
        private_key: &PrivateKeyHandle,
        public_keys: &[PublicKeyHandle],
    ) -> Result<Vec<u8>> {
        let data = normalize(Some(&encrypted_data.into()), Some("base64"), "encryptedData")?;
        let metadata = normalize(Some(&metadata.into()), Some("base64"), "metadata")?;
        let private = checked_private_key_value(&self.store, private_key)?;
        let verifiers = checked_public_key_values(public_keys)?;
        self.call("decrypt_then_verify_detached", |e| {
            e.decrypt_then_verify_detached(&data, &metadata, &private, &verifiers)
        })?
        .decode_secret()
    }

    fn checked_group_id(&self, group_id: Data) -> Result<WireText> {
        let group_id = normalize(Some(&group_id), Some("utf8"), "groupId")?;
        let actual = group_id.decode()?.len();
        if actual < MIN_GROUP_ID_BYTE_LENGTH {
            return Err(CryptoError::GroupIdTooShort {
                min: MIN_GROUP_ID_BYTE_LENGTH,
                actual,
            });
        }
        Ok(group_id)
    }

    /// Session id a group id maps to, without creating a session.
    /// String ids are read as UTF-8.
    pub fn calculate_group_session_id(&self, group_id: impl Into<Data>) -> Result<SessionId> {
        let group_id = self.checked_group_id(group_id.into())?;
        let hash = self
            .call("compute_hash_with_algorithm", |e| {
                e.compute_hash_with_algorithm(&group_id, HashAlgorithm::Sha512)
            })?
            .decode()?;

        let mut id = [0u8; SESSION_ID_LEN];
        let prefix = hash.get(..SESSION_ID_LEN).ok_or_else(|| {
            CryptoError::malformed_response("hash", format!("shorter than {} bytes", SESSION_ID_LEN))
        })?;
        id.copy_from_slice(prefix);
        Ok(SessionId::from_bytes(id))
    }

    /// Fresh session at epoch 0. String ids are read as UTF-8.
    pub fn generate_group_session(&self, group_id: impl Into<Data>) -> Result<GroupSession<E>> {
        let group_id = self.checked_group_id(group_id.into())?;
        let info = self.call("generate_group_session", |e| e.generate_group_session(&group_id))?;
        let session = GroupSession::from_info(Arc::clone(&self.engine), Arc::clone(&self.store), info)?;
        tracing::debug!(session = %session.session_id(), "group session created");
        Ok(session)
    }

    /// Rebuild a session from exported epoch tokens, oldest first.
    /// String tokens are read as base64.
    pub fn import_group_session<I>(&self, epoch_messages: I) -> Result<GroupSession<E>>
    where
        I: IntoIterator,
        I::Item: Into<Data>,
    {
        let tokens = epoch_messages
            .into_iter()
            .map(|token| normalize(Some(&token.into()), Some("base64"), "epochMessages"))
            .collect::<Result<Vec<_>>>()?;
        if tokens.is_empty() {
            return Err(CryptoError::invalid_argument(
                "epochMessages",
                "at least one epoch message is required",
            ));
        }

        let info = self.call("import_group_session", |e| e.import_group_session(&tokens))?;
        let session = GroupSession::from_info(Arc::clone(&self.engine), Arc::clone(&self.store), info)?;
        tracing::debug!(
            session = %session.session_id(),
            epoch = session.current_epoch_number(),
            "group session imported"
        );
        Ok(session)
    }

    /// Read the session id and epoch of a group message, for routing
    pub fn parse_group_message(&self, message_data: impl Into<Data>) -> Result<GroupMessage> {
        group::parse_message(self.engine.as_ref(), message_data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_bytes() {
        let crypto = Crypto::software();
        assert_eq!(crypto.get_random_bytes(24).unwrap().len(), 24);
    }

    #[test]
    fn test_hash_default_and_explicit() {
        let crypto = Crypto::software();
        let default = crypto.calculate_hash("abc", None).unwrap();
        let sha512 = crypto.calculate_hash(b"abc", Some(HashAlgorithm::Sha512)).unwrap();
        assert_eq!(default, sha512);
        assert_eq!(
            hex::encode(crypto.calculate_hash("abc", Some(HashAlgorithm::Sha256)).unwrap()),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_import_export_round_trip() {
        let crypto = Crypto::software();
        let keys = crypto.generate_keys(None).unwrap();

        let raw_private = crypto.export_private_key(&keys.private_key).unwrap();
        let raw_public = crypto.export_public_key(&keys.public_key).unwrap();

        let private = crypto.import_private_key(raw_private.to_vec()).unwrap();
        let public = crypto.import_public_key(raw_public.clone()).unwrap();
        assert_eq!(private.identifier, keys.private_key.identifier);
        assert_eq!(public, keys.public_key);
        assert_eq!(*crypto.export_private_key(&private).unwrap(), *raw_private);
    }

    #[test]
    fn test_extract_public_key() {
        let crypto = Crypto::software();
        let keys = crypto.generate_keys(Some(KeyPairType::Ed25519)).unwrap();
        assert_eq!(crypto.extract_public_key(&keys.private_key).unwrap(), keys.public_key);
    }

    #[test]
    fn test_key_material_is_deterministic() {
        let crypto = Crypto::software();
        let seed = [9u8; 32];
        let a = crypto.generate_keys_from_key_material(&seed, None).unwrap();
        let b = crypto
            .generate_keys_from_key_material(&seed, Some(KeyPairType::Ed25519))
            .unwrap();
        assert_eq!(a.public_key, b.public_key);
        assert!(!a.private_key.same_key_handle(&b.private_key));
    }

    #[test]
    fn test_signature_round_trip() {
        let crypto = Crypto::software();
        let keys = crypto.generate_keys(None).unwrap();
        let signature = crypto.calculate_signature("message", &keys.private_key).unwrap();

        assert!(crypto.verify_signature("message", signature.clone(), &keys.public_key).unwrap());
        assert!(!crypto.verify_signature("tampered", signature, &keys.public_key).unwrap());
    }

    #[test]
    fn test_encrypt_decrypt_with_padding() {
        let crypto = Crypto::software();
        let keys = crypto.generate_keys(None).unwrap();
        let ciphertext = crypto.encrypt("hello", &[keys.public_key.clone()], true).unwrap();
        assert_eq!(crypto.decrypt(ciphertext, &keys.private_key).unwrap(), b"hello");
    }

    #[test]
    fn test_sign_and_encrypt_round_trip() {
        let crypto = Crypto::software();
        let keys = crypto.generate_keys(None).unwrap();
        let public = [keys.public_key.clone()];
        let ciphertext = crypto.sign_and_encrypt("data", &keys.private_key, &public, false).unwrap();
        assert_eq!(crypto.decrypt_and_verify(ciphertext, &keys.private_key, &public).unwrap(), b"data");
    }

    #[test]
    fn test_detached_round_trip() {
        let crypto = Crypto::software();
        let keys = crypto.generate_keys(None).unwrap();
        let public = [keys.public_key.clone()];
        let detached = crypto
            .sign_then_encrypt_detached("detached", &keys.private_key, &public, false)
            .unwrap();
        let plain = crypto
            .decrypt_then_verify_detached(detached.encrypted_data, detached.metadata, &keys.private_key, &public)
            .unwrap();
        assert_eq!(plain, b"detached");
    }

    #[test]
    fn test_handles_do_not_cross_instances() {
        let a = Crypto::software();
        let b = Crypto::software();
        let keys = a.generate_keys(None).unwrap();
        assert!(matches!(
            b.export_private_key(&keys.private_key),
            Err(CryptoError::InvalidKeyHandle(_))
        ));
    }

    #[test]
    fn test_short_group_id_is_local() {
        let crypto = Crypto::software();
        let err = crypto.calculate_group_session_id("too short").unwrap_err();
        assert!(matches!(err, CryptoError::GroupIdTooShort { min: 10, actual: 9 }));
        assert!(crypto.generate_group_session(b"123456789").is_err());
        assert_eq!(crypto.engine().call_count(), 0);
    }

    #[test]
    fn test_ciphertext_arguments_are_labelled() {
        let crypto = Crypto::software();
        let keys = crypto.generate_keys(None).unwrap();
        let public = [keys.public_key.clone()];
        let bad = || Data::tagged("00", "klingon");
        let label_of = |err: CryptoError| match err {
            CryptoError::InvalidArgument { label, .. } => label,
            other => panic!("unexpected error {:?}", other),
        };

        assert_eq!(label_of(crypto.decrypt(bad(), &keys.private_key).unwrap_err()), "encryptedData");
        assert_eq!(
            label_of(crypto.decrypt_then_verify(bad(), &keys.private_key, &public).unwrap_err()),
            "encryptedData"
        );
        assert_eq!(label_of(crypto.parse_group_message(bad()).unwrap_err()), "messageData");
    }

    #[test]
    fn test_import_requires_tokens() {
        let crypto = Crypto::software();
        let err = crypto.import_group_session(Vec::<Vec<u8>>::new()).unwrap_err();
        assert!(matches!(err, CryptoError::InvalidArgument { ref label, .. } if label == "epochMessages"));
    }

    #[test]
    fn test_sha256_fingerprints_drive_recipient_and_signer_matching() {
        use crate::config::SoftwareEngineConfig;

        let crypto = Crypto::new(SoftwareEngine::new(SoftwareEngineConfig {
            sha256_fingerprints: true,
            ..Default::default()
        }));
        let alice = crypto.generate_keys(None).unwrap();
        let bob = crypto.generate_keys(None).unwrap();
        assert_eq!(alice.public_key.identifier.as_bytes().len(), 32);
        assert_eq!(alice.private_key.identifier, alice.public_key.identifier);

        let raw_public = crypto.export_public_key(&alice.public_key).unwrap();
        assert_eq!(crypto.import_public_key(raw_public).unwrap(), alice.public_key);

        let ciphertext = crypto
            .sign_then_encrypt("fingerprinted", &alice.private_key, &[bob.public_key.clone()], true)
            .unwrap();
        let plain = crypto
            .decrypt_then_verify(ciphertext.clone(), &bob.private_key, &[alice.public_key.clone()])
            .unwrap();
        assert_eq!(plain, b"fingerprinted");

        let err = crypto
            .decrypt_then_verify(ciphertext, &alice.private_key, &[alice.public_key.clone()])
            .unwrap_err();
        assert_eq!(err.status(), Some(crate::error::FoundationStatus::KeyRecipientIsNotFound));

        // short ids from a default engine never match these keys
        let short = Crypto::software();
        let bob_short = short.import_private_key(crypto.export_private_key(&bob.private_key).unwrap().to_vec()).unwrap();
        assert_eq!(bob_short.identifier.as_bytes().len(), 8);
    }

    #[test]
    fn test_unsupported_key_type_maps_to_engine_error() {
        let crypto = Crypto::software();
        let err = crypto.generate_keys(Some(KeyPairType::Rsa2048)).unwrap_err();
        assert!(matches!(err, CryptoError::Engine(_)));
        assert_eq!(err.status(), Some(crate::error::FoundationStatus::UnsupportedAlgorithm));
    }
}
