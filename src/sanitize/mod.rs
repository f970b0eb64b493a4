//! Numerical hygiene for feature vectors, gradients and probabilities.

use rand::Rng;

use crate::types::MAX_FEATURE_ABS;

/// Log-loss stabilizer
pub const LOSS_EPSILON: f64 = 1e-15;

/// Check whether a slice contains NaN or Inf
pub fn has_invalid_values(arr: &[f64]) -> bool {
    arr.iter().any(|&x| x.is_nan() || x.is_infinite())
}

/// Replace non-finite entries with 0 and clamp the rest to ±MAX_FEATURE_ABS
pub fn sanitize_feature_vector(x: &mut [f64]) {
    for val in x.iter_mut() {
        if val.is_nan() || val.is_infinite() {
            *val = 0.0;
        } else if *val > MAX_FEATURE_ABS {
            *val = MAX_FEATURE_ABS;
        } else if *val < -MAX_FEATURE_ABS {
            *val = -MAX_FEATURE_ABS;
        }
    }
}

pub fn l2_norm(x: &[f64]) -> f64 {
    x.iter().map(|v| v * v).sum::<f64>().sqrt()
}

/// Rescale `grad` in place so its L2 norm does not exceed `cap`.
///
/// Returns the norm before clipping and whether the vector was rescaled. Vectors at or
/// under the cap are left bit-for-bit unchanged.
pub fn clip_gradient(grad: &mut [f64], cap: f64) -> (f64, bool) {
    let norm = l2_norm(grad);
    if !norm.is_finite() || norm <= cap || norm == 0.0 {
        return (norm, false);
    }

    let scale = cap / norm;
    for g in grad.iter_mut() {
        *g *= scale;
    }
    (norm, true)
}

/// Logistic function, split by sign so large |z| never overflows `exp`.
pub fn sigmoid(z: f64) -> f64 {
    if z.is_nan() {
        return 0.5;
    }
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// ε-stabilized binary cross-entropy for a prediction `p` and a 0/1 label
pub fn binary_cross_entropy(p: f64, label: f64) -> f64 {
    -(label * (p + LOSS_EPSILON).ln() + (1.0 - label) * (1.0 - p + LOSS_EPSILON).ln())
}

/// Xavier/Glorot uniform initialization
pub fn xavier_uniform<R: Rng>(rng: &mut R, fan_in: usize, fan_out: usize) -> Vec<f64> {
    let limit = (6.0 / (fan_in + fan_out).max(1) as f64).sqrt();
    (0..fan_in).map(|_| rng.gen_range(-limit..=limit)).collect()
}
