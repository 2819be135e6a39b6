//! Multi-user spatially exponentially decaying (SED) channel
//!
//! Memoryless K-user, N-antenna channel: H[a, u] = exp(−|a − u|), so each
//! antenna mostly hears its nearest user. Per block
//!
//!   y[t] = H · s[t] + w[t],   w ~ N(0, 10^(−snr/10) · I)
//!
//! With fading, row `a` of H is scaled by the block gain of antenna `a`.

use ndarray::Array2;

use super::fading::fading_gains;
use super::noise::{noise_power_from_snr, NoiseGenerator};
use crate::error::{Result, SimError};

pub struct SedChannel;

impl SedChannel {
    /// Channel matrix `[n_ant, n_user]` for block `index`
    pub fn calculate_response(n_ant: usize, n_user: usize, fading: bool, index: usize) -> Result<Array2<f64>> {
        if n_ant == 0 || n_user == 0 {
            return Err(SimError::InvalidConfig("n_ant and n_user must be at least 1".into()));
        }

        let mut h = Array2::from_shape_fn((n_ant, n_user), |(a, u)| {
            (-(a as f64 - u as f64).abs()).exp()
        });
        if fading {
            let gains = fading_gains(n_ant, index)?;
            for (mut row, gain) in h.rows_mut().into_iter().zip(gains) {
                row *= gain;
            }
        }
        Ok(h)
    }

    /// Noiseless mixing of `[n, n_user]` symbols into `[n, n_ant]` samples
    pub fn convolve(symbols: &Array2<f64>, h: &Array2<f64>) -> Result<Array2<f64>> {
        if symbols.ncols() != h.ncols() {
            return Err(SimError::shape("MIMO user streams", h.ncols(), symbols.ncols()));
        }
        Ok(symbols.dot(&h.t()))
    }

    pub fn transmit(
        symbols: &Array2<f64>,
        h: &Array2<f64>,
        snr_db: f64,
        noise: &mut NoiseGenerator,
    ) -> Result<Array2<f64>> {
        let conv = Self::convolve(symbols, h)?;
        noise.set_power(noise_power_from_snr(snr_db));
        let w = noise.sample_array(conv.nrows(), conv.ncols());
        Ok(conv + w)
    }
}
