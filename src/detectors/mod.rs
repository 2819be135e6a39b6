//! Trainable detectors
//!
//! A detector is fitted online on each block's (augmented) pilot and then
//! maps received samples back to bits.

pub mod compute;
pub mod deepsic;
pub mod estimator;
pub mod vnet;

use ndarray::{concatenate, Array2, Axis};

use crate::config::{DetectorType, SimConfig};
use crate::error::{Result, SimError};

pub use compute::ComputeContext;
pub use deepsic::{DeepSicTrainer, EstimatorGrid};
pub use estimator::{Estimator, Mlp, TrainSchedule};
pub use vnet::ViterbiNetTrainer;

/// One labeled transmission: `tx` is `[n, n_user]` bits, `rx` is `[n, n_streams]`
///
/// Words in a training set are separate transmissions; no window or state
/// spans two of them.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingWord {
    pub tx: Array2<u8>,
    pub rx: Array2<f64>,
}

impl TrainingWord {
    pub fn new(tx: Array2<u8>, rx: Array2<f64>) -> Self {
        Self { tx, rx }
    }

    fn check(&self, n_user: usize, n_streams: usize) -> Result<()> {
        if self.tx.ncols() != n_user {
            return Err(SimError::shape("transmitted users", n_user, self.tx.ncols()));
        }
        if self.rx.ncols() != n_streams {
            return Err(SimError::shape("received streams", n_streams, self.rx.ncols()));
        }
        if self.tx.nrows() != self.rx.nrows() {
            return Err(SimError::shape("training rows", self.tx.nrows(), self.rx.nrows()));
        }
        Ok(())
    }
}

/// Stack per-word arrays into one training batch
fn stack<T: Clone>(what: &'static str, parts: &[Array2<T>]) -> Result<Array2<T>> {
    let views: Vec<_> = parts.iter().map(|a| a.view()).collect();
    let width = parts.first().map_or(0, |a| a.ncols());
    concatenate(Axis(0), &views).map_err(|_| SimError::shape(what, width, parts.len()))
}

pub trait Detector: Send {
    fn name(&self) -> &'static str;

    /// Fit on the pilot and its synthetic companions
    fn online_training(&mut self, words: &[TrainingWord]) -> Result<()>;

    /// Hard bit decisions `[n, n_user]`
    fn forward(&self, rx: &Array2<f64>) -> Result<Array2<u8>>;

    /// Every trainable parameter, in a fixed order
    fn parameter_snapshot(&self) -> Vec<f32>;
}

/// Detector for the configured algorithm
pub fn build_detector(config: &SimConfig, seed: u64) -> Result<Box<dyn Detector>> {
    config.validate()?;
    match config.detector_type {
        DetectorType::DeepSIC => Ok(Box::new(DeepSicTrainer::new(config, seed))),
        DetectorType::ViterbiNet => Ok(Box::new(ViterbiNetTrainer::new(config, seed)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChannelType;

    #[test]
    fn test_factory() {
        let deepsic = build_detector(&SimConfig::default(), 0).unwrap();
        assert_eq!(deepsic.name(), "DeepSIC");

        let vnet = SimConfig {
            detector_type: DetectorType::ViterbiNet,
            ..Default::default()
        };
        assert_eq!(build_detector(&vnet, 0).unwrap().name(), "ViterbiNet");

        let bad = SimConfig {
            channel_type: ChannelType::Mimo,
            ..vnet
        };
        assert!(build_detector(&bad, 0).is_err());
    }

    #[test]
    fn test_factory_rejects_memoryless_siso() {
        let config = SimConfig {
            memory_length: 0,
            ..Default::default()
        };
        assert!(matches!(build_detector(&config, 0), Err(SimError::InvalidConfig(_))));
    }

    #[test]
    fn test_word_checks_and_stacking() {
        let word = TrainingWord::new(Array2::zeros((4, 2)), Array2::zeros((4, 3)));
        assert!(word.check(2, 3).is_ok());
        assert!(word.check(1, 3).is_err());
        assert!(TrainingWord::new(Array2::zeros((4, 2)), Array2::zeros((5, 3))).check(2, 3).is_err());

        let stacked = stack("rows", &[Array2::<u8>::zeros((2, 2)), Array2::ones((3, 2))]).unwrap();
        assert_eq!(stacked.dim(), (5, 2));
        assert_eq!(stacked[[4, 1]], 1);
        assert!(stack("rows", &[Array2::<u8>::zeros((2, 2)), Array2::zeros((1, 3))]).is_err());
    }
}
