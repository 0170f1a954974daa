//! Vector primitives shared by the stores, the search engine and the
//! concept algebra.
//!
//! Everything here is pure CPU work: no I/O, no locks, no suspension.
//!
//! - [`vec_to_blob`] / [`blob_to_vec`]: little-endian f32 BLOB codec
//! - [`dot`], [`l2_norm`], [`normalize`]: basic linear algebra
//! - [`cosine_similarity`]: `dot(a,b) / (|a| |b|)`, clamped to `[-1, 1]`
//! - [`rank_by_score`]: deterministic top-k ordering

use std::cmp::Ordering;

use crate::error::{Error, Result};

/// Norms below this are treated as zero.
pub const ZERO_EPSILON: f32 = 1e-6;

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// ```rust
/// use concept_search::vector::{blob_to_vec, vec_to_blob};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12);
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector. Trailing bytes that do not form a
/// whole f32 are ignored; callers check the resulting length.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Scale `v` to unit length.
///
/// Fails with [`Error::ZeroVector`] instead of dividing by (nearly) zero.
pub fn normalize(v: &[f32]) -> Result<Vec<f32>> {
    let norm = l2_norm(v);
    if !norm.is_finite() || norm < ZERO_EPSILON {
        return Err(Error::ZeroVector);
    }
    Ok(v.iter().map(|x| x / norm).collect())
}

/// Compute cosine similarity between two vectors.
///
/// Returns a value in `[-1.0, 1.0]`; `0.0` for empty vectors, vectors of
/// different lengths, or when either vector has zero length.
///
/// ```text
///            a · b
/// cos(θ) = ─────────
///          ‖a‖ × ‖b‖
/// ```
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON || !denom.is_finite() {
        return 0.0;
    }

    (dot / denom).clamp(-1.0, 1.0)
}

/// Sort `(id, score)` pairs by score descending, ties broken by id
/// ascending, and keep the first `limit`.
pub fn rank_by_score<S: PartialOrd + Copy>(
    mut scored: Vec<(String, S)>,
    limit: usize,
) -> Vec<(String, S)> {
    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    scored.truncate(limit);
    scored
}
