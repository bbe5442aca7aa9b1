// SPDX-License-Identifier: MIT OR Apache-2.0

//! Vector helpers shared by the embedding and search layers.

/// Tolerance used when checking that a vector has unit length.
pub const UNIT_NORM_TOLERANCE: f32 = 1e-4;

pub fn l2_norm(vector: &[f32]) -> f32 {
    vector.iter().map(|v| v * v).sum::<f32>().sqrt()
}

/// Scale `vector` to unit length in place.
///
/// Returns `false` and leaves the vector untouched when its norm is zero or
/// not finite.
pub fn l2_normalize(vector: &mut [f32]) -> bool {
    let norm = l2_norm(vector);
    if norm == 0.0 || !norm.is_finite() {
        return false;
    }
    for value in vector.iter_mut() {
        *value /= norm;
    }
    true
}

pub fn is_unit(vector: &[f32]) -> bool {
    (l2_norm(vector) - 1.0).abs() <= UNIT_NORM_TOLERANCE
}

/// Inner product, summed left to right so the result never depends on
/// how callers split the work.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).fold(0.0, |acc, (x, y)| acc + x * y)
}
