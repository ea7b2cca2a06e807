// Pure-Rust engine behind the facade
// Ed25519 keys, X25519 + XChaCha20-Poly1305 hybrid encryption, epoch
// group sessions and ristretto255 password blinding

pub mod brainkey;
pub mod envelope;
pub mod group;
pub mod kdf;
pub mod key_material;
pub mod padding;
pub mod random;
pub mod symmetric;

use std::sync::atomic::{AtomicU64, Ordering};

use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};
use zeroize::Zeroizing;

use super::{BlindInfo, DetachedInfo, Engine, GroupMessageInfo, GroupSessionInfo, KeyPairInfo, PublicKeyInfo};
use crate::algorithm::{HashAlgorithm, KeyPairType};
use crate::codec::WireText;
use crate::config::SoftwareEngineConfig;
use crate::error::{Envelope, FoundationStatus};

use envelope::{MessageInfo, SealOptions};
use group::{EpochLog, GroupSessionMessage};
use key_material::{PrivateKey, PublicKey};

pub type EngineResult<T> = Result<T, FoundationStatus>;

fn bytes(wire: &WireText) -> EngineResult<Zeroizing<Vec<u8>>> {
    wire.decode()
        .map(Zeroizing::new)
        .map_err(|_| FoundationStatus::BadBase64)
}

fn private_key(wire: &WireText) -> EngineResult<PrivateKey> {
    PrivateKey::import(&bytes(wire)?)
}

fn public_key(wire: &WireText) -> EngineResult<PublicKey> {
    PublicKey::import(&bytes(wire)?)
}

fn public_keys(wires: &[WireText]) -> EngineResult<Vec<PublicKey>> {
    if wires.is_empty() {
        return Err(FoundationStatus::BadArguments);
    }
    wires.iter().map(public_key).collect()
}

fn epoch_log(wires: &[WireText]) -> EngineResult<EpochLog> {
    let tokens = wires
        .iter()
        .map(|w| w.decode().map_err(|_| FoundationStatus::BadBase64))
        .collect::<EngineResult<Vec<_>>>()?;
    EpochLog::parse(&tokens)
}

fn ensure_supported(key_type: KeyPairType) -> EngineResult<()> {
    match key_type {
        KeyPairType::Ed25519 => Ok(()),
        _ => Err(FoundationStatus::UnsupportedAlgorithm),
    }
}

fn digest(algorithm: HashAlgorithm, data: &[u8]) -> Vec<u8> {
    match algorithm {
        HashAlgorithm::Sha224 => Sha224::digest(data).to_vec(),
        HashAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
        HashAlgorithm::Sha384 => Sha384::digest(data).to_vec(),
        HashAlgorithm::Sha512 => Sha512::digest(data).to_vec(),
    }
}

/// In-process engine with no external runtime.
///
/// Only Ed25519 key pairs are supported; other key types report
/// `UnsupportedAlgorithm`. Every call bumps a counter so callers can tell
/// whether a request ever reached the engine.
pub struct SoftwareEngine {
    config: SoftwareEngineConfig,
    calls: AtomicU64,
}

impl Default for SoftwareEngine {
    fn default() -> Self {
        Self::new(SoftwareEngineConfig::default())
    }
}

impl SoftwareEngine {
    pub fn new(config: SoftwareEngineConfig) -> Self {
        Self {
            config,
            calls: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &SoftwareEngineConfig {
        &self.config
    }

    /// Number of engine calls made so far
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    fn call<T>(&self, op: &'static str, f: impl FnOnce() -> EngineResult<T>) -> Envelope<T> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(op, "software engine call");

        match f() {
            Ok(value) => Envelope::ok(value),
            Err(status) => {
                let info = crate::error::ErrorInfo::foundation(status)
                    .with_detail(format!("keyveil::engine::software::{}", op));
                Envelope::Error(info)
            }
        }
    }

    fn seal_options(&self, enable_padding: bool) -> SealOptions {
        SealOptions {
            padding_frame: enable_padding.then_some(self.config.padding_frame),
            sha256_ids: self.config.sha256_fingerprints,
        }
    }

    fn key_pair_info(&self, key: &PrivateKey) -> KeyPairInfo {
        let public = key.public_key();
        KeyPairInfo {
            identifier: WireText::encode(&public.identifier(self.config.sha256_fingerprints)),
            private_key: WireText::encode(&key.export()),
            public_key: WireText::encode(&public.export()),
        }
    }

    fn signed_seal(
        &self,
        data: &WireText,
        private: &WireText,
        recipients: &[WireText],
        enable_padding: bool,
    ) -> EngineResult<(MessageInfo, Vec<u8>)> {
        let signer = private_key(private)?;
        let recipients = public_keys(recipients)?;
        let payload = Zeroizing::new(envelope::sign_payload(
            &bytes(data)?,
            &signer,
            self.config.sha256_fingerprints,
        )?);
        envelope::seal_detached(&payload, &recipients, self.seal_options(enable_padding))
    }

    fn group_info(&self, log: &EpochLog, tokens: Vec<WireText>) -> GroupSessionInfo {
        GroupSessionInfo {
            session_id: WireText::encode(log.session_id()),
            current_epoch_number: log.current_epoch(),
            epoch_messages: tokens,
        }
    }
}

fn message_info(message: &GroupSessionMessage, data: Vec<u8>) -> GroupMessageInfo {
    GroupMessageInfo {
        session_id: WireText::encode(message.session_id()),
        epoch_number: message.epoch(),
        data: WireText::encode(&data),
    }
}

impl Engine for SoftwareEngine {
    fn generate_random_data(&self, size: u32) -> Envelope<WireText> {
        self.call("generate_random_data", || {
            if size > self.config.max_random_size {
                return Err(FoundationStatus::RngRequestedDataTooBig);
            }
            random::secure_random_bytes(size as usize).map(|b| WireText::encode(&b))
        })
    }

    fn compute_hash(&self, data: &WireText) -> Envelope<WireText> {
        self.call("compute_hash", || {
            Ok(WireText::encode(&digest(HashAlgorithm::Sha512, &bytes(data)?)))
        })
    }

    fn compute_hash_with_algorithm(&self, data: &WireText, algorithm: HashAlgorithm) -> Envelope<WireText> {
        self.call("compute_hash_with_algorithm", || {
            Ok(WireText::encode(&digest(algorithm, &bytes(data)?)))
        })
    }

    fn generate_key_pair(&self) -> Envelope<KeyPairInfo> {
        self.call("generate_key_pair", || Ok(self.key_pair_info(&PrivateKey::generate()?)))
    }

    fn generate_key_pair_of_type(&self, key_type: KeyPairType) -> Envelope<KeyPairInfo> {
        self.call("generate_key_pair_of_type", || {
            ensure_supported(key_type)?;
            Ok(self.key_pair_info(&PrivateKey::generate()?))
        })
    }

    fn generate_key_pair_using_seed(&self, seed: &WireText) -> Envelope<KeyPairInfo> {
        self.call("generate_key_pair_using_seed", || {
            Ok(self.key_pair_info(&PrivateKey::from_key_material(&bytes(seed)?)?))
        })
    }

    fn generate_key_pair_with_type_and_seed(&self, key_type: KeyPairType, seed: &WireText) -> Envelope<KeyPairInfo> {
        self.call("generate_key_pair_with_type_and_seed", || {
            ensure_supported(key_type)?;
            Ok(self.key_pair_info(&PrivateKey::from_key_material(&bytes(seed)?)?))
        })
    }

    fn encrypt(&self, data: &WireText, keys: &[WireText], enable_padding: bool) -> Envelope<WireText> {
        self.call("encrypt", || {
            let recipients = public_keys(keys)?;
            let sealed = envelope::seal(&bytes(data)?, &recipients, self.seal_options(enable_padding))?;
            Ok(WireText::encode(&sealed))
        })
    }

    fn decrypt(&self, data: &WireText, private: &WireText) -> Envelope<WireText> {
        self.call("decrypt", || {
            let key = private_key(private)?;
            let plain = Zeroizing::new(envelope::open(&bytes(data)?, &key, self.config.sha256_fingerprints)?);
            Ok(WireText::encode(&plain))
        })
    }

    fn generate_signature(&self, data: &WireText, private: &WireText) -> Envelope<WireText> {
        self.call("generate_signature", || {
            let key = private_key(private)?;
            Ok(WireText::encode(&key.sign(&bytes(data)?)))
        })
    }

    fn verify_signature(&self, signature: &WireText, data: &WireText, public: &WireText) -> Envelope<bool> {
        self.call("verify_signature", || {
            let key = public_key(public)?;
            Ok(key.verify(&bytes(data)?, &bytes(signature)?))
        })
    }

    fn sign_and_encrypt(
        &self,
        data: &WireText,
        private: &WireText,
        keys: &[WireText],
        enable_padding: bool,
    ) -> Envelope<WireText> {
        self.sign_then_encrypt(data, private, keys, enable_padding)
    }

    fn decrypt_and_verify(&self, data: &WireText, private: &WireText, keys: &[WireText]) -> Envelope<WireText> {
        self.decrypt_then_verify(data, private, keys)
    }

    fn sign_then_encrypt(
        &self,
        data: &WireText,
        private: &WireText,
        keys: &[WireText],
        enable_padding: bool,
    ) -> Envelope<WireText> {
        self.call("sign_then_encrypt", || {
            let (info, ciphertext) = self.signed_seal(data, private, keys, enable_padding)?;
            Ok(WireText::encode(&envelope::join(info, ciphertext)?))
        })
    }

    fn decrypt_then_verify(&self, data: &WireText, private: &WireText, keys: &[WireText]) -> Envelope<WireText> {
        self.call("decrypt_then_verify", || {
            let key = private_key(private)?;
            let verifiers = public_keys(keys)?;
            let sha256_ids = self.config.sha256_fingerprints;

            let payload = Zeroizing::new(envelope::open(&bytes(data)?, &key, sha256_ids)?);
            let plain = Zeroizing::new(envelope::verify_payload(&payload, &verifiers, sha256_ids)?);
            Ok(WireText::encode(&plain))
        })
    }

    fn sign_then_encrypt_detached(
        &self,
        data: &WireText,
        private: &WireText,
        keys: &[WireText],
        enable_padding: bool,
    ) -> Envelope<DetachedInfo> {
        self.call("sign_then_encrypt_detached", || {
            let (info, ciphertext) = self.signed_seal(data, private, keys, enable_padding)?;
            Ok(DetachedInfo {
                encrypted_data: WireText::encode(&ciphertext),
                metadata: WireText::encode(&info.to_bytes()?),
            })
        })
    }

    fn decrypt_then_verify_detached(
        &self,
        data: &WireText,
        metadata: &WireText,
        private: &WireText,
        keys: &[WireText],
    ) -> Envelope<WireText> {
        self.call("decrypt_then_verify_detached", || {
            let key = private_key(private)?;
            let verifiers = public_keys(keys)?;
            let info = MessageInfo::from_bytes(&bytes(metadata)?)?;
            let sha256_ids = self.config.sha256_fingerprints;

            let payload = Zeroizing::new(envelope::open_detached(&info, &bytes(data)?, &key, sha256_ids)?);
            let plain = Zeroizing::new(envelope::verify_payload(&payload, &verifiers, sha256_ids)?);
            Ok(WireText::encode(&plain))
        })
    }

    fn extract_public_key(&self, private: &WireText) -> Envelope<PublicKeyInfo> {
        self.call("extract_public_key", || {
            let public = private_key(private)?.public_key();
            Ok(PublicKeyInfo {
                identifier: WireText::encode(&public.identifier(self.config.sha256_fingerprints)),
                public_key: WireText::encode(&public.export()),
            })
        })
    }

    fn get_private_key_identifier(&self, private: &WireText) -> Envelope<WireText> {
        self.call("get_private_key_identifier", || {
            let public = private_key(private)?.public_key();
            Ok(WireText::encode(&public.identifier(self.config.sha256_fingerprints)))
        })
    }

    fn get_public_key_identifier(&self, public: &WireText) -> Envelope<WireText> {
        self.call("get_public_key_identifier", || {
            Ok(WireText::encode(&public_key(public)?.identifier(self.config.sha256_fingerprints)))
        })
    }

    fn generate_group_session(&self, group_id: &WireText) -> Envelope<GroupSessionInfo> {
        self.call("generate_group_session", || {
            let token = WireText::encode(&group::first_epoch(&bytes(group_id)?)?.to_bytes()?);
            let tokens = vec![token];
            let log = epoch_log(&tokens)?;
            Ok(self.group_info(&log, tokens))
        })
    }

    fn import_group_session(&self, epoch_messages: &[WireText]) -> Envelope<GroupSessionInfo> {
        self.call("import_group_session", || {
            let log = epoch_log(epoch_messages)?;
            Ok(self.group_info(&log, epoch_messages.to_vec()))
        })
    }

    fn group_encrypt(&self, data: &WireText, private: &WireText, epoch_messages: &[WireText]) -> Envelope<WireText> {
        self.call("group_encrypt", || {
            let log = epoch_log(epoch_messages)?;
            let sender = private_key(private)?;
            let message = group::encrypt(&log, &bytes(data)?, &sender)?;
            Ok(WireText::encode(&message.to_bytes()?))
        })
    }

    fn group_decrypt(&self, data: &WireText, public: &WireText, epoch_messages: &[WireText]) -> Envelope<WireText> {
        self.call("group_decrypt", || {
            let message = GroupSessionMessage::from_bytes(&bytes(data)?)?;
            let log = epoch_log(epoch_messages)?;
            let sender = public_key(public)?;
            let plain = Zeroizing::new(group::decrypt(&log, &message, &sender)?);
            Ok(WireText::encode(&plain))
        })
    }

    fn group_add_new_epoch(&self, epoch_messages: &[WireText]) -> Envelope<GroupMessageInfo> {
        self.call("group_add_new_epoch", || {
            let log = epoch_log(epoch_messages)?;
            let next = log.next_epoch()?;
            let data = next.to_bytes()?;
            Ok(message_info(&next, data))
        })
    }

    fn group_parse_message(&self, data: &WireText) -> Envelope<GroupMessageInfo> {
        self.call("group_parse_message", || {
            let raw = bytes(data)?;
            let message = GroupSessionMessage::from_bytes(&raw)?;
            Ok(message_info(&message, raw.to_vec()))
        })
    }

    fn blind(&self, password: &WireText) -> Envelope<BlindInfo> {
        self.call("blind", || {
            let blinded = brainkey::blind(&bytes(password)?)?;
            Ok(BlindInfo {
                blinded_password: WireText::encode(&blinded.blinded_point),
                blinding_secret: WireText::encode(&*blinded.blinding_secret),
            })
        })
    }

    fn deblind(&self, transformed_password: &WireText, blinding_secret: &WireText) -> Envelope<WireText> {
        self.call("deblind", || {
            let point = brainkey::deblind(&bytes(transformed_password)?, &bytes(blinding_secret)?)?;
            Ok(WireText::encode(&point))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> SoftwareEngine {
        SoftwareEngine::default()
    }

    fn status_of<T: std::fmt::Debug>(envelope: Envelope<T>) -> FoundationStatus {
        envelope.into_result().unwrap_err().status().unwrap()
    }

    #[test]
    fn test_random_size_limit() {
        let engine = engine();
        let random = engine.generate_random_data(16).into_result().unwrap();
        assert_eq!(random.decode().unwrap().len(), 16);
        assert_eq!(
            status_of(engine.generate_random_data(u32::MAX)),
            FoundationStatus::RngRequestedDataTooBig
        );
    }

    #[test]
    fn test_hash_lengths() {
        let engine = engine();
        let data = WireText::encode(b"abc");
        for algorithm in HashAlgorithm::ALL {
            let hash = engine.compute_hash_with_algorithm(&data, *algorithm).into_result().unwrap();
            assert_eq!(hash.decode().unwrap().len(), algorithm.output_len());
        }
        let default = engine.compute_hash(&data).into_result().unwrap();
        assert_eq!(default.decode().unwrap().len(), 64);
    }

    #[test]
    fn test_unsupported_key_type() {
        assert_eq!(
            status_of(engine().generate_key_pair_of_type(KeyPairType::Secp256r1)),
            FoundationStatus::UnsupportedAlgorithm
        );
    }

    #[test]
    fn test_sign_then_encrypt_round_trip() {
        let engine = engine();
        let a = engine.generate_key_pair().into_result().unwrap();
        let b = engine.generate_key_pair().into_result().unwrap();
        let data = WireText::encode(b"secret");

        let sealed = engine
            .sign_then_encrypt(&data, &a.private_key, &[b.public_key.clone()], true)
            .into_result()
            .unwrap();
        let opened = engine
            .decrypt_then_verify(&sealed, &b.private_key, &[a.public_key.clone()])
            .into_result()
            .unwrap();
        assert_eq!(opened, data);
    }

    #[test]
    fn test_detached_round_trip() {
        let engine = engine();
        let a = engine.generate_key_pair().into_result().unwrap();
        let data = WireText::encode(b"detached");

        let detached = engine
            .sign_then_encrypt_detached(&data, &a.private_key, &[a.public_key.clone()], false)
            .into_result()
            .unwrap();
        let opened = engine
            .decrypt_then_verify_detached(
                &detached.encrypted_data,
                &detached.metadata,
                &a.private_key,
                &[a.public_key.clone()],
            )
            .into_result()
            .unwrap();
        assert_eq!(opened, data);
    }

    #[test]
    fn test_identifiers_agree() {
        let engine = engine();
        let pair = engine.generate_key_pair().into_result().unwrap();
        let from_private = engine.get_private_key_identifier(&pair.private_key).into_result().unwrap();
        let from_public = engine.get_public_key_identifier(&pair.public_key).into_result().unwrap();
        assert_eq!(from_private, pair.identifier);
        assert_eq!(from_public, pair.identifier);
    }

    #[test]
    fn test_failures_carry_native_detail() {
        let engine = engine();
        let err = engine
            .decrypt(&WireText::encode(b"junk"), &WireText::encode(b"bad key"))
            .into_result()
            .unwrap_err();
        let fault = err.fault().unwrap();
        assert_eq!(fault.status, Some(FoundationStatus::BadDerPrivateKey));
        assert_eq!(fault.native_detail.as_deref(), Some("keyveil::engine::software::decrypt"));
    }

    #[test]
    fn test_call_counter() {
        let engine = engine();
        assert_eq!(engine.call_count(), 0);
        let _ = engine.generate_key_pair();
        let _ = engine.compute_hash(&WireText::encode(b"x"));
        assert_eq!(engine.call_count(), 2);
    }

    #[test]
    fn test_parse_group_message() {
        let engine = engine();
        let session = engine
            .generate_group_session(&WireText::encode(b"group-id-0001"))
            .into_result()
            .unwrap();
        let parsed = engine
            .group_parse_message(&session.epoch_messages[0])
            .into_result()
            .unwrap();
        assert_eq!(parsed.session_id, session.session_id);
        assert_eq!(parsed.epoch_number, 0);
        assert_eq!(parsed.data, session.epoch_messages[0]);
    }
}
