//! Bit ↔ symbol mapping
//!
//! BPSK: bit 0 → +1, bit 1 → −1.

use ndarray::Array2;

use crate::config::ModulationType;

/// Symbol alphabet mapping trait
pub trait Modulator: Send + Sync {
    /// Map a bit word to real-valued symbols
    fn modulate(&self, bits: &Array2<u8>) -> Array2<f64>;
}

/// Binary Phase Shift Keying
#[derive(Debug, Clone, Copy, Default)]
pub struct Bpsk;

impl Modulator for Bpsk {
    fn modulate(&self, bits: &Array2<u8>) -> Array2<f64> {
        bits.mapv(|b| 1.0 - 2.0 * f64::from(b & 0x01))
    }
}

/// Modulator for a configured scheme
pub fn modulator_for(modulation: ModulationType) -> Box<dyn Modulator> {
    match modulation {
        ModulationType::Bpsk => Box::new(Bpsk),
    }
}
