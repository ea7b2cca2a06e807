// Foreign-call boundary to the crypto engine
// One method per logical operation; byte data travels as wire text

pub mod software;

use serde::{Deserialize, Serialize};

use crate::algorithm::{HashAlgorithm, KeyPairType};
use crate::codec::WireText;
use crate::error::Envelope;

pub use software::SoftwareEngine;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyPairInfo {
    pub identifier: WireText,
    pub private_key: WireText,
    pub public_key: WireText,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyInfo {
    pub identifier: WireText,
    pub public_key: WireText,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetachedInfo {
    pub encrypted_data: WireText,
    pub metadata: WireText,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSessionInfo {
    pub session_id: WireText,
    pub current_epoch_number: u32,
    pub epoch_messages: Vec<WireText>,
}

/// Header of a group message or epoch token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMessageInfo {
    pub session_id: WireText,
    pub epoch_number: u32,
    pub data: WireText,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlindInfo {
    pub blinded_password: WireText,
    pub blinding_secret: WireText,
}

/// The crypto engine as seen from the facade.
///
/// Implementations own all cipher, signature and hash math. Each call either
/// yields a result or an [`crate::error::ErrorInfo`]; the facade never hands
/// the envelope itself to callers.
pub trait Engine: Send + Sync + 'static {
    fn generate_random_data(&self, size: u32) -> Envelope<WireText>;

    /// Hash with the engine's default algorithm
    fn compute_hash(&self, data: &WireText) -> Envelope<WireText>;
    fn compute_hash_with_algorithm(&self, data: &WireText, algorithm: HashAlgorithm) -> Envelope<WireText>;

    fn generate_key_pair(&self) -> Envelope<KeyPairInfo>;
    fn generate_key_pair_of_type(&self, key_type: KeyPairType) -> Envelope<KeyPairInfo>;
    fn generate_key_pair_using_seed(&self, seed: &WireText) -> Envelope<KeyPairInfo>;
    fn generate_key_pair_with_type_and_seed(&self, key_type: KeyPairType, seed: &WireText) -> Envelope<KeyPairInfo>;

    fn encrypt(&self, data: &WireText, public_keys: &[WireText], enable_padding: bool) -> Envelope<WireText>;
    fn decrypt(&self, data: &WireText, private_key: &WireText) -> Envelope<WireText>;

    fn generate_signature(&self, data: &WireText, private_key: &WireText) -> Envelope<WireText>;
    fn verify_signature(&self, signature: &WireText, data: &WireText, public_key: &WireText) -> Envelope<bool>;

    fn sign_and_encrypt(
        &self,
        data: &WireText,
        private_key: &WireText,
        public_keys: &[WireText],
        enable_padding: bool,
    ) -> Envelope<WireText>;
    fn decrypt_and_verify(&self, data: &WireText, private_key: &WireText, public_keys: &[WireText]) -> Envelope<WireText>;

    fn sign_then_encrypt(
        &self,
        data: &WireText,
        private_key: &WireText,
        public_keys: &[WireText],
        enable_padding: bool,
    ) -> Envelope<WireText>;
    fn decrypt_then_verify(&self, data: &WireText, private_key: &WireText, public_keys: &[WireText]) -> Envelope<WireText>;

    fn sign_then_encrypt_detached(
        &self,
        data: &WireText,
        private_key: &WireText,
        public_keys: &[WireText],
        enable_padding: bool,
    ) -> Envelope<DetachedInfo>;
    fn decrypt_then_verify_detached(
        &self,
        data: &WireText,
        metadata: &WireText,
        private_key: &WireText,
        public_keys: &[WireText],
    ) -> Envelope<WireText>;

    fn extract_public_key(&self, private_key: &WireText) -> Envelope<PublicKeyInfo>;
    fn get_private_key_identifier(&self, private_key: &WireText) -> Envelope<WireText>;
    fn get_public_key_identifier(&self, public_key: &WireText) -> Envelope<WireText>;

    fn generate_group_session(&self, group_id: &WireText) -> Envelope<GroupSessionInfo>;
    fn import_group_session(&self, epoch_messages: &[WireText]) -> Envelope<GroupSessionInfo>;
    fn group_encrypt(&self, data: &WireText, private_key: &WireText, epoch_messages: &[WireText]) -> Envelope<WireText>;
    fn group_decrypt(&self, data: &WireText, public_key: &WireText, epoch_messages: &[WireText]) -> Envelope<WireText>;
    fn group_add_new_epoch(&self, epoch_messages: &[WireText]) -> Envelope<GroupMessageInfo>;
    fn group_parse_message(&self, data: &WireText) -> Envelope<GroupMessageInfo>;

    fn blind(&self, password: &WireText) -> Envelope<BlindInfo>;
    fn deblind(&self, transformed_password: &WireText, blinding_secret: &WireText) -> Envelope<WireText>;
}
