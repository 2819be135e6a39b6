//! Single-user ISI channel with additive white Gaussian noise
//!
//! Exponentially decaying taps h_k = exp(−γk), γ = 0.5. The received sample
//! at position t mixes the L symbols s[t..t+L]:
//!
//!   y[t] = Σ_i h[L−1−i] · s[t+i] + w[t],   w ~ N(0, 10^(−snr/10))
//!
//! Only fully convolved positions are kept, so a word of n symbols yields
//! n − L samples.

use ndarray::{s, Array2, Axis};

use super::fading::fading_gains;
use super::noise::{noise_power_from_snr, NoiseGenerator};
use crate::error::{Result, SimError};

/// Tap decay rate
pub const GAMMA: f64 = 0.5;

/// Attenuation applied when the channel does not fade
pub const STATIC_ATTENUATION: f64 = 0.8;

pub struct IsiAwgnChannel;

impl IsiAwgnChannel {
    /// Tap profile `[1, memory_length]` for block `index`
    pub fn calculate_response(memory_length: usize, fading: bool, index: usize) -> Result<Array2<f64>> {
        if memory_length == 0 {
            return Err(SimError::InvalidConfig("memory_length must be at least 1".into()));
        }

        let mut h = Array2::from_shape_fn((1, memory_length), |(_, k)| (-GAMMA * k as f64).exp());
        if fading {
            let gains = fading_gains(memory_length, index)?;
            for (tap, gain) in h.iter_mut().zip(gains) {
                *tap *= gain;
            }
        } else {
            h *= STATIC_ATTENUATION;
        }
        Ok(h)
    }

    /// Noiseless sliding-block convolution of a `[n, 1]` symbol column
    pub fn convolve(symbols: &Array2<f64>, h: &Array2<f64>, memory_length: usize) -> Result<Array2<f64>> {
        if memory_length == 0 {
            return Err(SimError::InvalidConfig("memory_length must be at least 1".into()));
        }
        if h.ncols() != memory_length {
            return Err(SimError::shape("channel taps", memory_length, h.ncols()));
        }
        if symbols.ncols() != 1 {
            return Err(SimError::shape("SISO symbol streams", 1, symbols.ncols()));
        }
        let n = symbols.nrows();
        if n <= memory_length {
            return Err(SimError::shape("signal length", memory_length + 1, n));
        }

        let out_len = n - memory_length;
        let column = symbols.index_axis(Axis(1), 0);
        let mut conv = Array2::zeros((out_len, 1));
        // Shifted copy i of the signal is weighted by the reversed tap L-1-i
        for i in 0..memory_length {
            let tap = h[[0, memory_length - 1 - i]];
            let shifted = column.slice(s![i..i + out_len]);
            conv.column_mut(0).scaled_add(tap, &shifted);
        }
        Ok(conv)
    }

    /// Convolve and add noise at the given SNR
    pub fn transmit(
        symbols: &Array2<f64>,
        h: &Array2<f64>,
        snr_db: f64,
        memory_length: usize,
        noise: &mut NoiseGenerator,
    ) -> Result<Array2<f64>> {
        let conv = Self::convolve(symbols, h, memory_length)?;
        noise.set_power(noise_power_from_snr(snr_db));
        let w = noise.sample_array(conv.nrows(), conv.ncols());
        Ok(conv + w)
    }
}
