//! PCM16 little-endian decoding

use crate::{Error, Result};

/// Decode little-endian signed 16-bit samples
///
/// # Errors
///
/// Returns error if the payload has a dangling byte
pub fn decode_pcm16(bytes: &[u8]) -> Result<Vec<i16>> {
    if bytes.len() % 2 != 0 {
        return Err(Error::Audio(format!(
            "PCM16 payload has odd length {}",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

/// Convert PCM16 samples to f32 in [-1.0, 1.0)
#[must_use]
pub fn pcm16_to_f32(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| f32::from(s) / 32768.0).collect()
}
