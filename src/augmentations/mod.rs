//! Pilot augmentation schemes
//!
//! Every scheme turns one labeled pilot pair into a new labeled pair of the
//! same shape. The pipeline calls `augment` `aug_factor` times per block and
//! only lets the first call refresh the scheme's hyper-parameters.

pub mod adaptive;
pub mod resample;
pub mod states;

use ndarray::Array2;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::channel::modulator::{modulator_for, Modulator};
use crate::channel::ChannelSimulator;
use crate::config::{AugmenterType, SimConfig};
use crate::error::Result;

pub use adaptive::{smooth, AdaptiveAugmenter, StateStatistics};

/// Pilot augmentation capability
pub trait Augmenter: Send {
    fn name(&self) -> &'static str;

    /// Produce one synthetic (received, transmitted) pair from the pilot
    fn augment(
        &mut self,
        rx: &Array2<f64>,
        tx: &Array2<u8>,
        h: &Array2<f64>,
        snr_db: f64,
        update_hyper_params: bool,
    ) -> Result<(Array2<f64>, Array2<u8>)>;
}

/// Returns the pilot pair unchanged
#[derive(Debug, Default)]
pub struct NoAugmenter;

impl Augmenter for NoAugmenter {
    fn name(&self) -> &'static str {
        "None"
    }

    fn augment(
        &mut self,
        rx: &Array2<f64>,
        tx: &Array2<u8>,
        _h: &Array2<f64>,
        _snr_db: f64,
        _update_hyper_params: bool,
    ) -> Result<(Array2<f64>, Array2<u8>)> {
        Ok((rx.clone(), tx.clone()))
    }
}

/// Flips random pilot bits and re-transmits them through the known response
pub struct ChannelResampleAugmenter {
    simulator: ChannelSimulator,
    modulator: Box<dyn Modulator>,
    mask_rng: ChaCha8Rng,
}

impl ChannelResampleAugmenter {
    pub fn new(config: &SimConfig, seed: u64) -> Self {
        let mut seed_rng = ChaCha8Rng::seed_from_u64(seed);
        let channel_seed: u64 = seed_rng.gen();
        let mask_seed: u64 = seed_rng.gen();

        Self {
            simulator: ChannelSimulator::new(config.topology(), channel_seed),
            modulator: modulator_for(config.modulation_type),
            mask_rng: ChaCha8Rng::seed_from_u64(mask_seed),
        }
    }
}

impl Augmenter for ChannelResampleAugmenter {
    fn name(&self) -> &'static str {
        "ChannelResample"
    }

    fn augment(
        &mut self,
        _rx: &Array2<f64>,
        tx: &Array2<u8>,
        h: &Array2<f64>,
        snr_db: f64,
        _update_hyper_params: bool,
    ) -> Result<(Array2<f64>, Array2<u8>)> {
        let rng = &mut self.mask_rng;
        let new_tx = tx.mapv(|b| b ^ u8::from(rng.gen_bool(0.5)));
        let new_rx = self
            .simulator
            .transmit_bits(&new_tx, h, snr_db, self.modulator.as_ref())?;
        Ok((new_rx, new_tx))
    }
}

/// Augmenter for the configured scheme
pub fn build_augmenter(config: &SimConfig, seed: u64) -> Box<dyn Augmenter> {
    match config.augmenter_type {
        AugmenterType::Adaptive => Box::new(AdaptiveAugmenter::new(
            config.topology(),
            config.alpha1,
            config.alpha2,
            seed,
        )),
        AugmenterType::None => Box::new(NoAugmenter),
        AugmenterType::ChannelResample => Box::new(ChannelResampleAugmenter::new(config, seed)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelModel;

    fn config() -> SimConfig {
        SimConfig {
            memory_length: 2,
            pilot_size: 30,
            val_block_length: 60,
            fading_in_channel: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_no_augmenter_passthrough() {
        let mut model = ChannelModel::new(&config());
        let block = model.sample_block(0, 10.0).unwrap();
        let mut augmenter = NoAugmenter;
        let (rx, tx) = augmenter.augment(&block.rx, &block.tx, &block.h, 10.0, true).unwrap();
        assert_eq!(rx, block.rx);
        assert_eq!(tx, block.tx);
    }

    #[test]
    fn test_channel_resample_is_consistent_with_channel() {
        let config = config();
        let mut model = ChannelModel::new(&config);
        let block = model.sample_block(0, 10.0).unwrap();
        let mut augmenter = ChannelResampleAugmenter::new(&config, 5);

        // Noiseless re-transmission must equal the channel applied to the new bits
        let (rx, tx) = augmenter
            .augment(&block.rx, &block.tx, &block.h, f64::INFINITY, true)
            .unwrap();
        assert_eq!(rx.dim(), block.rx.dim());
        assert_ne!(tx, block.tx);

        let mut reference = ChannelSimulator::new(config.topology(), 0);
        let expected = reference
            .transmit_bits(&tx, &block.h, f64::INFINITY, &crate::channel::Bpsk)
            .unwrap();
        for (a, b) in rx.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn test_factory_names() {
        for (kind, name) in [
            (AugmenterType::Adaptive, "Adaptive"),
            (AugmenterType::None, "None"),
            (AugmenterType::ChannelResample, "ChannelResample"),
        ] {
            let config = SimConfig {
                augmenter_type: kind,
                ..config()
            };
            assert_eq!(build_augmenter(&config, 0).name(), name);
        }
    }
}
