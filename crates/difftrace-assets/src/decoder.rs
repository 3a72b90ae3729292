//! Pure numeric routines for packed attention tensors.
//!
//! Buffers hold little-endian IEEE-754 binary16 words with no header, row-major.

use half::f16;
use serde::{Deserialize, Serialize};

use crate::error::DecodeError;

/// Lower bound applied to every element before normalising to a distribution.
pub const PROBABILITY_FLOOR: f64 = 1e-8;

/// A decoded 2D attention map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttentionMap {
    pub map: Vec<f32>,
    /// `[height, width]`
    pub shape: [usize; 2],
}

impl AttentionMap {
    #[inline]
    pub fn height(&self) -> usize {
        self.shape[0]
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.shape[1]
    }

    /// Value at `(row, col)`, if inside the map.
    pub fn at(&self, row: usize, col: usize) -> Option<f32> {
        if row >= self.height() || col >= self.width() {
            return None;
        }
        self.map.get(row * self.width() + col).copied()
    }
}

/// Decode a single binary16 word.
#[inline]
pub fn f16_to_f32(bits: u16) -> f32 {
    f16::from_bits(bits).to_f32()
}

/// Decode `len` words starting at word `start` of a packed buffer.
pub fn decode_half_slice(buffer: &[u8], start: usize, len: usize) -> Result<Vec<f32>, DecodeError> {
    let words = word_count(buffer)?;
    let end = start
        .checked_add(len)
        .filter(|end| *end <= words)
        .ok_or(DecodeError::SliceOutOfRange { start, len, words })?;

    Ok(buffer[start * 2..end * 2]
        .chunks_exact(2)
        .map(|word| f16_to_f32(u16::from_le_bytes([word[0], word[1]])))
        .collect())
}

/// Decode the `[height, width]` map of one token from a `[num_tokens, height, width]` tensor.
pub fn decode_cross_slice(buffer: &[u8], shape: &[usize], token_index: usize) -> Result<AttentionMap, DecodeError> {
    let [num_tokens, height, width] = *shape else {
        return Err(malformed("cross", shape, "expected [num_tokens, height, width]"));
    };
    let plane = checked_plane("cross", shape, &[num_tokens, height, width])? / num_tokens;

    if token_index >= num_tokens {
        return Err(DecodeError::TokenOutOfBounds {
            index: token_index,
            num_tokens,
        });
    }
    expect_words(buffer, shape, plane * num_tokens)?;

    let map = decode_half_slice(buffer, token_index * plane, plane)?;
    Ok(AttentionMap { map, shape: [height, width] })
}

/// Decode a whole `[height, width]` self-attention tensor.
pub fn decode_self_slice(buffer: &[u8], shape: &[usize]) -> Result<AttentionMap, DecodeError> {
    let [height, width] = *shape else {
        return Err(malformed("self", shape, "expected [height, width]"));
    };
    let plane = checked_plane("self", shape, &[height, width])?;
    expect_words(buffer, shape, plane)?;

    let map = decode_half_slice(buffer, 0, plane)?;
    Ok(AttentionMap { map, shape: [height, width] })
}

/// Symmetric Jensen-Shannon divergence between two maps, in nats.
///
/// Both inputs are floor-clamped and normalised first, so zeros never reach `ln`.
/// The result lies in `[0, ln 2]`.
pub fn js_divergence(left: &[f32], right: &[f32]) -> Result<f64, DecodeError> {
    if left.len() != right.len() {
        return Err(DecodeError::DivergenceLengthMismatch {
            left: left.len(),
            right: right.len(),
        });
    }

    let p = normalise(left);
    let q = normalise(right);

    let (mut sum_p, mut sum_q) = (0.0f64, 0.0f64);
    for (&pi, &qi) in p.iter().zip(&q) {
        let m = 0.5 * (pi + qi);
        sum_p += pi * (pi / m).ln();
        sum_q += qi * (qi / m).ln();
    }
    Ok(0.5 * (sum_p + sum_q))
}

/// Shannon entropy of a map treated as a distribution, in nats.
pub fn entropy(map: &[f32]) -> f64 {
    normalise(map).iter().map(|p| -p * p.ln()).sum()
}

/// Floor-clamp every element and divide by the clamped sum.
///
/// Non-finite values are treated as the floor.
fn normalise(values: &[f32]) -> Vec<f64> {
    let clamped: Vec<f64> = values
        .iter()
        .map(|&v| {
            let v = f64::from(v);
            if v.is_finite() { v.max(PROBABILITY_FLOOR) } else { PROBABILITY_FLOOR }
        })
        .collect();
    let total: f64 = clamped.iter().sum();
    clamped.into_iter().map(|v| v / total).collect()
}

fn word_count(buffer: &[u8]) -> Result<usize, DecodeError> {
    if buffer.len() % 2 != 0 {
        return Err(DecodeError::OddByteLength { bytes: buffer.len() });
    }
    Ok(buffer.len() / 2)
}

fn expect_words(buffer: &[u8], shape: &[usize], expected: usize) -> Result<(), DecodeError> {
    let actual = word_count(buffer)?;
    if actual != expected {
        return Err(DecodeError::LengthMismatch {
            shape: shape.to_vec(),
            expected,
            actual,
        });
    }
    Ok(())
}

/// Product of the dimensions, rejecting zero extents and overflow.
fn checked_plane(kind: &'static str, shape: &[usize], dims: &[usize]) -> Result<usize, DecodeError> {
    if dims.contains(&0) {
        return Err(malformed(kind, shape, "dimensions must be positive"));
    }
    dims.iter()
        .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
        .ok_or_else(|| malformed(kind, shape, "element count overflows"))
}

fn malformed(kind: &'static str, shape: &[usize], reason: &'static str) -> DecodeError {
    DecodeError::MalformedShape {
        kind,
        shape: shape.to_vec(),
        reason,
    }
}

#[cfg(test)]
#[path = "decoder.test.rs"]
mod tests;
