// keyveil library - client-side facade over an asymmetric crypto engine

pub mod algorithm;
pub mod brainkey;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod facade;
pub mod group;
pub mod keys;

pub use algorithm::{HashAlgorithm, KeyPairType};
pub use brainkey::{BlindResult, BrainkeyCrypto};
pub use codec::{Data, Encoding, WireText};
pub use config::{AppConfig, CryptoConfig, SoftwareEngineConfig};
pub use engine::{Engine, SoftwareEngine};
pub use error::{CryptoError, EngineFault, ErrorInfo, FoundationStatus, Result};
pub use facade::{Crypto, DetachedMessage, MIN_GROUP_ID_BYTE_LENGTH};
pub use group::{GroupMessage, GroupSession, SessionId};
pub use keys::{KeyIdentifier, KeyPair, PrivateKeyHandle, PublicKeyHandle};
