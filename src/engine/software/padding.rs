// Length-hiding padding for plaintext before encryption

use super::EngineResult;
use crate::error::FoundationStatus;

const LENGTH_PREFIX: usize = 4;

/// Pad to a multiple of `frame` bytes behind a big-endian u32 length
pub fn pad_to_frame(data: &[u8], frame: usize) -> EngineResult<Vec<u8>> {
    let data_len = u32::try_from(data.len()).map_err(|_| FoundationStatus::BadArguments)?;
    let frame = frame.max(1);

    let unpadded_size = LENGTH_PREFIX + data.len();
    let total_length = unpadded_size.div_ceil(frame) * frame;

    let mut padded = Vec::with_capacity(total_length);
    padded.extend_from_slice(&data_len.to_be_bytes());
    padded.extend_from_slice(data);
    padded.resize(total_length, 0);

    Ok(padded)
}

pub fn unpad(padded: &[u8]) -> EngineResult<Vec<u8>> {
    let prefix: [u8; LENGTH_PREFIX] = padded
        .get(..LENGTH_PREFIX)
        .and_then(|p| p.try_into().ok())
        .ok_or(FoundationStatus::InvalidPadding)?;
    let data_len = u32::from_be_bytes(prefix) as usize;

    let body = &padded[LENGTH_PREFIX..];
    if data_len > body.len() || body[data_len..].iter().any(|&b| b != 0) {
        return Err(FoundationStatus::InvalidPadding);
    }

    Ok(body[..data_len].to_vec())
}
