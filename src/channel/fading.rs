//! Deterministic block fading
//!
//! Slow time variation of the channel across blocks. Tap (or antenna) `k`
//! is scaled by
//!
//!   g_k(n) = 0.8 + 0.2 · cos(2π n / T_k)
//!
//! with periods T = (51, 39, 33, 21) blocks, so the gain stays in [0.6, 1.0]
//! and every tap cycles at its own rate.

use std::f64::consts::PI;

use crate::config::FADING_PERIODS;
use crate::error::{Result, SimError};

const FADING_CENTER: f64 = 0.8;

/// Per-tap gains for block `index`
pub fn fading_gains(n_taps: usize, index: usize) -> Result<Vec<f64>> {
    if n_taps > FADING_PERIODS.len() {
        return Err(SimError::InvalidConfig(format!(
            "fading supports at most {} taps, got {}",
            FADING_PERIODS.len(),
            n_taps
        )));
    }

    Ok(FADING_PERIODS[..n_taps]
        .iter()
        .map(|&period| {
            FADING_CENTER + (1.0 - FADING_CENTER) * (2.0 * PI * index as f64 / period).cos()
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_zero_is_unity() {
        let gains = fading_gains(4, 0).unwrap();
        for g in gains {
            assert!((g - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_gain_bounds() {
        for index in 0..200 {
            for g in fading_gains(4, index).unwrap() {
                assert!((0.6 - 1e-12..=1.0 + 1e-12).contains(&g), "gain {} out of range", g);
            }
        }
    }

    #[test]
    fn test_periodic() {
        let a = fading_gains(1, 3).unwrap();
        let b = fading_gains(1, 3 + 51).unwrap();
        assert!((a[0] - b[0]).abs() < 1e-9);
    }

    #[test]
    fn test_too_many_taps() {
        assert!(fading_gains(5, 0).is_err());
    }
}
