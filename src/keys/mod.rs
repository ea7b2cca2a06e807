// Opaque key handles
// Public handles are plain values; private handles reach their secret only
// through the secret store

pub mod secret_store;
pub mod secure_buffer;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::codec::WireText;
use crate::engine::{KeyPairInfo, PublicKeyInfo};
use crate::error::{CryptoError, Result};

pub use secret_store::SecretStore;
pub use secure_buffer::SecureBuffer;

use secret_store::SecretLease;

/// Short engine-computed name of a key pair
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KeyIdentifier(Vec<u8>);

impl KeyIdentifier {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub(crate) fn from_wire(wire: &WireText) -> Result<Self> {
        wire.decode().map(Self)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl fmt::Display for KeyIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for KeyIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyIdentifier({})", self.to_hex())
    }
}

/// Public half of a key pair, fully transparent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyHandle {
    pub identifier: KeyIdentifier,
    value: WireText,
}

impl PublicKeyHandle {
    pub(crate) fn new(identifier: KeyIdentifier, value: WireText) -> Self {
        Self { identifier, value }
    }

    /// Exported key material in wire form
    pub fn value(&self) -> &WireText {
        &self.value
    }

    /// Exported key material as raw bytes
    pub fn exported_material(&self) -> Result<Vec<u8>> {
        self.value.decode()
    }
}

/// Private half of a key pair.
///
/// Only the identifier is a field. Cloning shares the same secret store
/// entry; the entry goes away when the last clone drops. Serializing or
/// printing a handle yields the identifier and nothing else, and a handle
/// rebuilt from serialized form has no secret behind it.
#[derive(Clone, Serialize, Deserialize)]
pub struct PrivateKeyHandle {
    pub identifier: KeyIdentifier,
    #[serde(skip)]
    lease: Option<Arc<SecretLease>>,
}

impl PrivateKeyHandle {
    /// A handle with no secret behind it. Every private-key operation on it
    /// fails with `InvalidKeyHandle`.
    pub fn detached(identifier: KeyIdentifier) -> Self {
        Self {
            identifier,
            lease: None,
        }
    }

    /// True when both handles share one secret store entry
    pub fn same_key_handle(&self, other: &PrivateKeyHandle) -> bool {
        match (&self.lease, &other.lease) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for PrivateKeyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKeyHandle")
            .field("identifier", &self.identifier)
            .finish_non_exhaustive()
    }
}

/// Both halves of a freshly generated or imported key pair
#[derive(Debug, Clone)]
pub struct KeyPair {
    pub private_key: PrivateKeyHandle,
    pub public_key: PublicKeyHandle,
}

/// Create a private handle and register its material with `store`
pub(crate) fn wrap_private_key(
    store: &Arc<SecretStore>,
    identifier: KeyIdentifier,
    material: &WireText,
) -> Result<PrivateKeyHandle> {
    let secret = Zeroizing::new(material.decode()?);
    Ok(PrivateKeyHandle {
        identifier,
        lease: Some(store.register(&secret)),
    })
}

/// Wrap an engine key pair into handles
pub(crate) fn wrap_key_pair(store: &Arc<SecretStore>, info: &KeyPairInfo) -> Result<KeyPair> {
    let identifier = KeyIdentifier::from_wire(&info.identifier)?;
    let private_key = wrap_private_key(store, identifier.clone(), &info.private_key)?;
    let public_key = PublicKeyHandle::new(identifier, info.public_key.clone());
    Ok(KeyPair {
        private_key,
        public_key,
    })
}

pub(crate) fn wrap_public_key(info: &PublicKeyInfo) -> Result<PublicKeyHandle> {
    Ok(PublicKeyHandle::new(
        KeyIdentifier::from_wire(&info.identifier)?,
        info.public_key.clone(),
    ))
}

/// Private material for `handle`, failing if `store` holds none for it
pub(crate) fn checked_private_key_value(
    store: &SecretStore,
    handle: &PrivateKeyHandle,
) -> Result<Zeroizing<WireText>> {
    handle
        .lease
        .as_ref()
        .and_then(|lease| store.lookup(lease.slot()))
        .ok_or_else(|| {
            CryptoError::InvalidKeyHandle(format!(
                "private key {} has no secret in this key store",
                handle.identifier
            ))
        })
}

/// Wire values of a non-empty list of public keys
pub(crate) fn checked_public_key_values(keys: &[PublicKeyHandle]) -> Result<Vec<WireText>> {
    if keys.is_empty() {
        return Err(CryptoError::invalid_argument(
            "publicKeys",
            "at least one public key is required",
        ));
    }
    Ok(keys.iter().map(|key| key.value.clone()).collect())
}
