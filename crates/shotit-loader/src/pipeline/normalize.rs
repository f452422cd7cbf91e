//! Histogram hash to unit vector conversion.

use rayon::prelude::*;
use thiserror::Error;

use crate::pipeline::FrameHashRecord;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("vector dimension must be greater than zero")]
    ZeroDimension,
    #[error("token #{position} `{token}` is not a hexadecimal value")]
    InvalidToken { position: usize, token: String },
}

/// Vectors for a run of records plus how many hashes had to be truncated.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedBatch {
    pub vectors: Vec<Vec<f32>>,
    pub truncated: usize,
}

/// Parses `histogram` as whitespace separated hex tokens and returns a
/// length-`dim` unit vector.
///
/// Each token is an unsigned hex number in `0..=u32::MAX`; a sign or a value
/// past that range is an invalid token. Tokens fill the vector from the left;
/// missing positions stay zero and tokens past `dim` are dropped. The norm is accumulated exactly in integer
/// space before a single square root. A zero norm yields the zero vector.
pub fn normalize(histogram: &str, dim: usize) -> Result<Vec<f32>, NormalizeError> {
    normalize_counted(histogram, dim).map(|(vector, _)| vector)
}

fn normalize_counted(histogram: &str, dim: usize) -> Result<(Vec<f32>, bool), NormalizeError> {
    if dim == 0 {
        return Err(NormalizeError::ZeroDimension);
    }

    let mut values = vec![0_u32; dim];
    let mut truncated = false;
    for (position, token) in histogram.split_whitespace().enumerate() {
        let invalid = || NormalizeError::InvalidToken {
            position,
            token: token.to_string(),
        };
        // from_str_radix tolerates a leading `+`.
        if !token.bytes().all(|byte| byte.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        let value = u32::from_str_radix(token, 16).map_err(|_| invalid())?;
        match values.get_mut(position) {
            Some(slot) => *slot = value,
            None => truncated = true,
        }
    }

    let sum_of_squares: u128 = values
        .iter()
        .map(|&value| u128::from(u64::from(value) * u64::from(value)))
        .sum();
    if sum_of_squares == 0 {
        return Ok((vec![0.0; dim], truncated));
    }

    let norm = (sum_of_squares as f64).sqrt();
    let vector = values
        .iter()
        .map(|&value| (f64::from(value) / norm) as f32)
        .collect();
    Ok((vector, truncated))
}

/// Normalizes every record's histogram hash, `chunk` records per parallel work
/// item. Output order matches input order.
pub fn normalize_records(
    records: &[FrameHashRecord],
    dim: usize,
    chunk: usize,
) -> Result<NormalizedBatch, NormalizeError> {
    let chunk = chunk.max(1);
    let chunks = records
        .par_chunks(chunk)
        .map(|slice| {
            slice
                .iter()
                .map(|record| normalize_counted(&record.histogram_hash, dim))
                .collect::<Result<Vec<_>, _>>()
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut vectors = Vec::with_capacity(records.len());
    let mut truncated = 0_usize;
    for (vector, was_truncated) in chunks.into_iter().flatten() {
        truncated += usize::from(was_truncated);
        vectors.push(vector);
    }
    debug_assert_eq!(vectors.len(), records.len());
    Ok(NormalizedBatch { vectors, truncated })
}
