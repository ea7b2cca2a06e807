// Password blinding over ristretto255
// The blinded point reveals nothing about the password; the server's
// transformation survives deblinding unchanged

use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use rand::rngs::OsRng;
use sha2::Sha512;
use zeroize::Zeroizing;

use super::EngineResult;
use crate::error::FoundationStatus;

pub const MIN_PASSWORD_LEN: usize = 1;
pub const MAX_PASSWORD_LEN: usize = 128;
const POINT_LEN: usize = 32;
const SCALAR_LEN: usize = 32;

pub struct Blinded {
    pub blinded_point: [u8; POINT_LEN],
    pub blinding_secret: Zeroizing<[u8; SCALAR_LEN]>,
}

fn decode_point(bytes: &[u8]) -> EngineResult<RistrettoPoint> {
    if bytes.len() != POINT_LEN {
        return Err(FoundationStatus::InvalidBrainkeyPointLen);
    }
    CompressedRistretto::from_slice(bytes)
        .map_err(|_| FoundationStatus::InvalidBrainkeyPointLen)?
        .decompress()
        .ok_or(FoundationStatus::BrainkeyInvalidPoint)
}

pub fn blind(password: &[u8]) -> EngineResult<Blinded> {
    if !(MIN_PASSWORD_LEN..=MAX_PASSWORD_LEN).contains(&password.len()) {
        return Err(FoundationStatus::InvalidBrainkeyPasswordLen);
    }

    let point = RistrettoPoint::hash_from_bytes::<Sha512>(password);
    let factor = Scalar::random(&mut OsRng);
    let blinded = point * factor;

    Ok(Blinded {
        blinded_point: blinded.compress().to_bytes(),
        blinding_secret: Zeroizing::new(factor.to_bytes()),
    })
}

pub fn deblind(transformed: &[u8], blinding_secret: &[u8]) -> EngineResult<[u8; POINT_LEN]> {
    let point = decode_point(transformed)?;

    let secret: [u8; SCALAR_LEN] = blinding_secret
        .try_into()
        .map_err(|_| FoundationStatus::InvalidBrainkeyFactorLen)?;
    let factor: Option<Scalar> = Scalar::from_canonical_bytes(secret).into();
    let factor = factor
        .filter(|f| *f != Scalar::ZERO)
        .ok_or(FoundationStatus::InvalidIdentitySecret)?;

    Ok((point * factor.invert()).compress().to_bytes())
}
