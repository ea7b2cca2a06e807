// Password hardening
// Blind a password before it leaves the client, deblind the server's answer

use std::fmt;
use std::sync::Arc;

use zeroize::Zeroizing;

use crate::codec::{normalize, Data};
use crate::engine::Engine;
use crate::error::Result;

/// Output of [`BrainkeyCrypto::blind`]
pub struct BlindResult {
    /// Safe to send to the hardening server
    pub blinded_password: Vec<u8>,
    /// Keep locally; needed to deblind the server's reply
    pub blinding_secret: Zeroizing<Vec<u8>>,
}

impl fmt::Debug for BlindResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlindResult")
            .field("blinded_password", &hex::encode(&self.blinded_password))
            .finish_non_exhaustive()
    }
}

pub struct BrainkeyCrypto<E: Engine> {
    engine: Arc<E>,
}

impl<E: Engine> BrainkeyCrypto<E> {
    pub fn new(engine: Arc<E>) -> Self {
        Self { engine }
    }

    /// String passwords are read as UTF-8
    pub fn blind(&self, password: impl Into<Data>) -> Result<BlindResult> {
        let password = Zeroizing::new(normalize(Some(&password.into()), Some("utf8"), "password")?);

        tracing::trace!(op = "blind", "engine call");
        let info = self.engine.blind(&password).into_result()?;
        Ok(BlindResult {
            blinded_password: info.blinded_password.decode()?,
            blinding_secret: Zeroizing::new(info.blinding_secret.decode_secret()?),
        })
    }

    /// String inputs are read as base64
    pub fn deblind(
        &self,
        transformed_password: impl Into<Data>,
        blinding_secret: impl Into<Data>,
    ) -> Result<Zeroizing<Vec<u8>>> {
        let transformed = normalize(Some(&transformed_password.into()), Some("base64"), "transformedPassword")?;
        let secret = Zeroizing::new(normalize(Some(&blinding_secret.into()), Some("base64"), "blindingSecret")?);

        tracing::trace!(op = "deblind", "engine call");
        let deblinded = self.engine.deblind(&transformed, &secret).into_result()?;
        deblinded.decode_secret().map(Zeroizing::new)
    }
}
