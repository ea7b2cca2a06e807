// Fixed enumerations of key pair types and hash algorithms

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CryptoError, Result};

/// Key pair types the engine may be asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyPairType {
    #[serde(rename = "ED25519")]
    Ed25519,
    #[serde(rename = "CURVE25519")]
    Curve25519,
    #[serde(rename = "SECP256R1")]
    Secp256r1,
    #[serde(rename = "RSA2048")]
    Rsa2048,
    #[serde(rename = "RSA4096")]
    Rsa4096,
    #[serde(rename = "RSA8192")]
    Rsa8192,
    #[serde(rename = "CURVE25519_ED25519")]
    Curve25519Ed25519,
    #[serde(rename = "CURVE25519_ROUND5_ED25519_FALCON")]
    Curve25519Round5Ed25519Falcon,
}

impl KeyPairType {
    pub const ALL: &'static [KeyPairType] = &[
        KeyPairType::Ed25519,
        KeyPairType::Curve25519,
        KeyPairType::Secp256r1,
        KeyPairType::Rsa2048,
        KeyPairType::Rsa4096,
        KeyPairType::Rsa8192,
        KeyPairType::Curve25519Ed25519,
        KeyPairType::Curve25519Round5Ed25519Falcon,
    ];

    pub fn name(self) -> &'static str {
        match self {
            KeyPairType::Ed25519 => "ED25519",
            KeyPairType::Curve25519 => "CURVE25519",
            KeyPairType::Secp256r1 => "SECP256R1",
            KeyPairType::Rsa2048 => "RSA2048",
            KeyPairType::Rsa4096 => "RSA4096",
            KeyPairType::Rsa8192 => "RSA8192",
            KeyPairType::Curve25519Ed25519 => "CURVE25519_ED25519",
            KeyPairType::Curve25519Round5Ed25519Falcon => "CURVE25519_ROUND5_ED25519_FALCON",
        }
    }
}

impl fmt::Display for KeyPairType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for KeyPairType {
    type Err = CryptoError;

    fn from_str(name: &str) -> Result<Self> {
        // RSA_2048 and RSA2048 are both in circulation
        let wanted = name.replace("RSA_", "RSA");
        KeyPairType::ALL
            .iter()
            .copied()
            .find(|t| t.name().eq_ignore_ascii_case(&wanted))
            .ok_or_else(|| {
                let names: Vec<&str> = KeyPairType::ALL.iter().map(|t| t.name()).collect();
                CryptoError::invalid_argument(
                    "keyPairType",
                    format!("invalid type of key pair \"{}\", expected one of {}", name, names.join(", ")),
                )
            })
    }
}

/// Hash algorithms accepted by `calculate_hash`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HashAlgorithm {
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    pub const ALL: &'static [HashAlgorithm] = &[
        HashAlgorithm::Sha224,
        HashAlgorithm::Sha256,
        HashAlgorithm::Sha384,
        HashAlgorithm::Sha512,
    ];

    pub fn name(self) -> &'static str {
        match self {
            HashAlgorithm::Sha224 => "SHA224",
            HashAlgorithm::Sha256 => "SHA256",
            HashAlgorithm::Sha384 => "SHA384",
            HashAlgorithm::Sha512 => "SHA512",
        }
    }

    /// Digest length in bytes
    pub fn output_len(self) -> usize {
        match self {
            HashAlgorithm::Sha224 => 28,
            HashAlgorithm::Sha256 => 32,
            HashAlgorithm::Sha384 => 48,
            HashAlgorithm::Sha512 => 64,
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = CryptoError;

    fn from_str(name: &str) -> Result<Self> {
        let wanted = name.replace('-', "");
        HashAlgorithm::ALL
            .iter()
            .copied()
            .find(|a| a.name().eq_ignore_ascii_case(&wanted))
            .ok_or_else(|| {
                let names: Vec<&str> = HashAlgorithm::ALL.iter().map(|a| a.name()).collect();
                CryptoError::invalid_argument(
                    "algorithm",
                    format!("invalid hash algorithm \"{}\", expected one of {}", name, names.join(", ")),
                )
            })
    }
}
