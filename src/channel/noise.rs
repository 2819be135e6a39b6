//! Seeded Gaussian noise source
//!
//! Uses Box-Muller transform for Gaussian samples. Every generator owns its
//! own ChaCha8 stream so a run replays exactly from the configured seed.

use ndarray::Array2;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::f64::consts::PI;

/// AWGN generator with configurable power
pub struct NoiseGenerator {
    /// Standard deviation (sqrt of noise power)
    std_dev: f64,

    rng: ChaCha8Rng,

    /// Cached second sample from Box-Muller
    cached: Option<f64>,
}

impl NoiseGenerator {
    /// Generator whose seed is drawn from a parent stream
    pub fn new(noise_power: f64, seed_rng: &mut ChaCha8Rng) -> Self {
        let seed: u64 = seed_rng.gen();
        Self::from_seed(noise_power, seed)
    }

    pub fn from_seed(noise_power: f64, seed: u64) -> Self {
        Self {
            std_dev: noise_power.max(0.0).sqrt(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            cached: None,
        }
    }

    /// Change the noise power; the random stream continues where it was
    pub fn set_power(&mut self, noise_power: f64) {
        self.std_dev = noise_power.max(0.0).sqrt();
    }

    pub fn std_dev(&self) -> f64 {
        self.std_dev
    }

    /// Next N(0, 1) draw
    pub fn next_standard(&mut self) -> f64 {
        if let Some(cached) = self.cached.take() {
            return cached;
        }

        let u1: f64 = self.rng.gen();
        let u2: f64 = self.rng.gen();

        // Avoid log(0)
        let u1 = u1.max(1e-10);

        let r = (-2.0 * u1.ln()).sqrt();
        let theta = 2.0 * PI * u2;

        self.cached = Some(r * theta.sin());
        r * theta.cos()
    }

    /// Next sample at the configured power
    pub fn next_sample(&mut self) -> f64 {
        self.next_standard() * self.std_dev
    }

    /// Matrix of independent samples at the configured power
    pub fn sample_array(&mut self, rows: usize, cols: usize) -> Array2<f64> {
        Array2::from_shape_simple_fn((rows, cols), || self.next_sample())
    }
}

/// Noise power for a given SNR in dB (unit signal power)
#[inline]
pub fn noise_power_from_snr(snr_db: f64) -> f64 {
    10.0_f64.powf(-snr_db / 10.0)
}
