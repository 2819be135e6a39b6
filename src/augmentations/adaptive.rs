//! Adaptive pilot augmentation
//!
//! Fits a state-conditional Gaussian model to the pilot: every channel state
//! gets a center (sample mean) and a spread (sample standard deviation) per
//! received stream. The estimates are exponentially smoothed against the
//! previous pilots, then new labeled pairs are drawn from the model:
//!
//!   y_syn[t] = center[state(t)] + spread[state(t)] · N(0, 1)
//!
//! for a fresh uniformly random bit word.

use ndarray::{Array2, Zip};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, warn};

use super::resample::resample_to_reference;
use super::states::{observed_states, states_for};
use super::Augmenter;
use crate::channel::NoiseGenerator;
use crate::config::Topology;
use crate::error::{Result, SimError};

/// Per-state centers and spreads, `[n_states, n_streams]` each
#[derive(Debug, Clone, PartialEq)]
pub struct StateStatistics {
    pub centers: Array2<f64>,
    pub spreads: Array2<f64>,
}

impl StateStatistics {
    pub fn n_states(&self) -> usize {
        self.centers.nrows()
    }
}

/// Blend a new estimate into the prior one
///
/// `alpha1` weighs the new centers, `alpha2` the new spreads; both results
/// are convex combinations of the two inputs.
pub fn smooth(prior: &StateStatistics, new: &StateStatistics, alpha1: f64, alpha2: f64) -> StateStatistics {
    let blend = |new: &Array2<f64>, prior: &Array2<f64>, alpha: f64| {
        Zip::from(new).and(prior).map_collect(|&n, &p| alpha * n + (1.0 - alpha) * p)
    };
    StateStatistics {
        centers: blend(&new.centers, &prior.centers, alpha1),
        spreads: blend(&new.spreads, &prior.spreads, alpha2),
    }
}

pub struct AdaptiveAugmenter {
    topology: Topology,
    alpha1: f64,
    alpha2: f64,
    stats: Option<StateStatistics>,
    bit_rng: ChaCha8Rng,
    noise: NoiseGenerator,
}

impl AdaptiveAugmenter {
    pub fn new(topology: Topology, alpha1: f64, alpha2: f64, seed: u64) -> Self {
        let mut seed_rng = ChaCha8Rng::seed_from_u64(seed);
        let bit_seed: u64 = seed_rng.gen();
        let noise = NoiseGenerator::new(1.0, &mut seed_rng);

        Self {
            topology,
            alpha1,
            alpha2,
            stats: None,
            bit_rng: ChaCha8Rng::seed_from_u64(bit_seed),
            noise,
        }
    }

    /// Smoothed statistics, `None` before the first pilot
    pub fn statistics(&self) -> Option<&StateStatistics> {
        self.stats.as_ref()
    }

    /// Per-state statistics of one pilot
    ///
    /// Only samples whose state is fixed by pilot bits are used; for SISO
    /// the last L−1 samples also carry the following data bits and are
    /// skipped. Unobserved states get center 0. Spreads that cannot be
    /// estimated (fewer than two samples) take the mean of the estimated
    /// spreads of the same stream.
    pub fn estimate_current_parameters(&self, rx: &Array2<f64>, tx: &Array2<u8>) -> Result<StateStatistics> {
        if rx.nrows() != tx.nrows() {
            return Err(SimError::shape("pilot rows", tx.nrows(), rx.nrows()));
        }
        let n_streams = self.topology.n_streams();
        if rx.ncols() != n_streams {
            return Err(SimError::shape("received streams", n_streams, rx.ncols()));
        }

        let n_states = self.topology.n_states();
        let states = observed_states(self.topology, tx)?;

        let mut counts = vec![0usize; n_states];
        let mut sums = Array2::<f64>::zeros((n_states, n_streams));
        for (t, &state) in states.iter().enumerate() {
            counts[state] += 1;
            for c in 0..n_streams {
                sums[[state, c]] += rx[[t, c]];
            }
        }

        let centers = Array2::from_shape_fn((n_states, n_streams), |(state, c)| {
            if counts[state] > 0 {
                sums[[state, c]] / counts[state] as f64
            } else {
                0.0
            }
        });

        let mut squares = Array2::<f64>::zeros((n_states, n_streams));
        for (t, &state) in states.iter().enumerate() {
            for c in 0..n_streams {
                squares[[state, c]] += (rx[[t, c]] - centers[[state, c]]).powi(2);
            }
        }
        let mut spreads = Array2::from_shape_fn((n_states, n_streams), |(state, c)| {
            if counts[state] > 1 {
                (squares[[state, c]] / (counts[state] - 1) as f64).sqrt()
            } else {
                f64::NAN
            }
        });

        for mut column in spreads.columns_mut() {
            let defined: Vec<f64> = column.iter().copied().filter(|s| !s.is_nan()).collect();
            let fill = if defined.is_empty() {
                warn!("no channel state observed twice in pilot; spreads fall back to 0");
                0.0
            } else {
                defined.iter().sum::<f64>() / defined.len() as f64
            };
            column.mapv_inplace(|s| if s.is_nan() { fill } else { s });
        }

        Ok(StateStatistics { centers, spreads })
    }

    /// Fold a new estimate into the smoothed statistics
    pub fn update_smoothed_parameters(&mut self, new: StateStatistics) {
        self.stats = Some(match self.stats.take() {
            None => new,
            Some(prior) => smooth(&prior, &new, self.alpha1, self.alpha2),
        });
        debug!(alpha1 = self.alpha1, alpha2 = self.alpha2, "updated state statistics");
    }

    fn synthesize(&mut self, shape: (usize, usize)) -> Result<(Array2<f64>, Array2<u8>)> {
        let stats = self.stats.as_ref().ok_or(SimError::MissingStatistics)?;
        let rng = &mut self.bit_rng;
        let new_tx = Array2::from_shape_simple_fn(shape, || u8::from(rng.gen_bool(0.5)));
        let states = states_for(self.topology, &new_tx)?;

        let n_streams = self.topology.n_streams();
        let mut new_rx = Array2::<f64>::zeros((new_tx.nrows(), n_streams));
        for (t, &state) in states.iter().enumerate() {
            for c in 0..n_streams {
                new_rx[[t, c]] = stats.centers[[state, c]] + stats.spreads[[state, c]] * self.noise.next_standard();
            }
        }
        Ok((new_rx, new_tx))
    }
}

impl Augmenter for AdaptiveAugmenter {
    fn name(&self) -> &'static str {
        "Adaptive"
    }

    fn augment(
        &mut self,
        rx: &Array2<f64>,
        tx: &Array2<u8>,
        _h: &Array2<f64>,
        _snr_db: f64,
        update_hyper_params: bool,
    ) -> Result<(Array2<f64>, Array2<u8>)> {
        if update_hyper_params {
            let current = self.estimate_current_parameters(rx, tx)?;
            self.update_smoothed_parameters(current);
        }
        let (new_rx, new_tx) = self.synthesize(tx.dim())?;
        resample_to_reference(new_rx, new_tx, rx, &mut self.bit_rng)
    }
}
