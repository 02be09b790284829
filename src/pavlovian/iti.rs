//! Exponential inter-trial-interval sampling.
//!
//! Draws from a truncated exponential via inverse transform on a quantized
//! uniform: `iti = mean * -ln(k / 10000)` for `k` uniform in `[1, 10000]`.
//! The log is computed without libm by halving the argument into `[1, 2)`
//! while accumulating ln 2, then a third-order Taylor expansion around 1.

use rand::Rng;
use rand::rngs::SmallRng;

const LN_2: f32 = 0.693_147_2;
/// ln(10000); -ln(k/10000) = ln(10000) - ln(k).
const LN_10000: f32 = 9.210_34;

/// Approximate `-ln(k / 10000)` for `k` in `[1, 10000]`.
pub fn approx_neg_ln_u(k: u16) -> f32 {
    let mut x = k as f32;
    let mut ln_k = 0.0_f32;
    while x >= 2.0 {
        x *= 0.5;
        ln_k += LN_2;
    }
    let d = x - 1.0;
    ln_k += d - 0.5 * d * d + 0.333_333 * d * d * d;
    LN_10000 - ln_k
}

/// Sample one ITI, clamped to `[min_ms, max_ms]`.
pub fn sample_iti(mean_ms: u32, min_ms: u32, max_ms: u32, rng: &mut SmallRng) -> u32 {
    let k = rng.gen_range(1..=10_000_u16);
    let iti = mean_ms as f32 * approx_neg_ln_u(k);
    (iti as u32).clamp(min_ms, max_ms)
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════
