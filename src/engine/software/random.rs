// Random generation for the software engine
// Thin wrapper over the system CSPRNG

use rand::rngs::OsRng;
use rand::RngCore;

use super::EngineResult;
use crate::error::FoundationStatus;

/// Fill a fresh buffer of `length` bytes from the OS
pub fn secure_random_bytes(length: usize) -> EngineResult<Vec<u8>> {
    let mut buffer = vec![0u8; length];
    OsRng
        .try_fill_bytes(&mut buffer)
        .map_err(|_| FoundationStatus::RandomFailed)?;
    Ok(buffer)
}

/// Fixed-size random array, for keys and nonces
pub fn random_array<const N: usize>() -> EngineResult<[u8; N]> {
    let mut out = [0u8; N];
    OsRng
        .try_fill_bytes(&mut out)
        .map_err(|_| FoundationStatus::RandomFailed)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_bytes_length() {
        assert_eq!(secure_random_bytes(32).unwrap().len(), 32);
        assert!(secure_random_bytes(0).unwrap().is_empty());
    }

    #[test]
    fn test_random_bytes_uniqueness() {
        let a: [u8; 32] = random_array().unwrap();
        let b: [u8; 32] = random_array().unwrap();
        assert_ne!(a, b);
    }
}
