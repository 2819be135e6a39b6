//! DeepSIC: iterative soft interference cancellation
//!
//! A grid of K users × I iterations of binary estimators. Estimator (u, i)
//! sees the received observation plus the current soft estimates of every
//! interfering symbol and outputs P(bit_u = 1). Detection runs all I
//! iterations from uninformative priors (0.5) and slices the final
//! probabilities at 0.5.
//!
//! The interfering symbols depend on the topology:
//! - MIMO: the other users at the same time index; the observation is the
//!   received antenna vector.
//! - SISO: the neighbouring symbols t+d, 0 < |d| < L, of the single user;
//!   the observation is the received window y[t−L+1..=t], i.e. every sample
//!   that symbol t contributes to.

use ndarray::{Array2, Axis};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use super::compute::ComputeContext;
use super::estimator::{infer, train, Mlp, TrainSchedule};
use super::{stack, Detector, TrainingWord};
use crate::config::{SimConfig, Topology};
use crate::error::{Result, SimError};

pub const HIDDEN_SIZE: usize = 60;
const CLASSES: usize = 2;
const HALF: f64 = 0.5;

/// Bipolar symbol to probability: −1 → 0, +1 → 1
#[inline]
pub fn symbol_to_prob(s: f64) -> f64 {
    HALF * (s + 1.0)
}

/// Hard decision on a probability: [0, 0.5) → −1, [0.5, 1] → +1
#[inline]
pub fn prob_to_symbol(p: f64) -> f64 {
    if p >= HALF {
        1.0
    } else {
        -1.0
    }
}

/// Every user index except `user`
pub fn other_users(user: usize, n_user: usize) -> Vec<usize> {
    (0..n_user).filter(|&k| k != user).collect()
}

/// Uninformative priors for `rows` positions of `n_user` users
pub fn initial_probabilities(rows: usize, n_user: usize) -> Array2<f64> {
    Array2::from_elem((rows, n_user), HALF)
}

/// Input width of one estimator for a topology
pub fn feature_dim(topology: Topology) -> usize {
    match topology {
        Topology::Siso { memory_length } => memory_length + 2 * memory_length.saturating_sub(1),
        Topology::Mimo { n_user, n_ant } => n_ant + n_user - 1,
    }
}

/// Estimator inputs for `user`: observation followed by interferer probabilities
pub fn build_features(topology: Topology, rx: &Array2<f64>, probs: &Array2<f64>, user: usize) -> Array2<f64> {
    let n = rx.nrows();
    let mut features = Array2::zeros((n, feature_dim(topology)));
    match topology {
        Topology::Siso { memory_length } => {
            let span = memory_length.saturating_sub(1) as isize;
            for t in 0..n {
                let mut row = features.row_mut(t);
                for (k, offset) in (-span..=0).enumerate() {
                    let idx = t as isize + offset;
                    if idx >= 0 {
                        row[k] = rx[[idx as usize, 0]];
                    }
                }
                let neighbours = (-span..=span).filter(|&d| d != 0);
                for (k, d) in neighbours.enumerate() {
                    let idx = t as isize + d;
                    row[memory_length + k] = if idx >= 0 && (idx as usize) < n {
                        probs[[idx as usize, 0]]
                    } else {
                        HALF
                    };
                }
            }
        }
        Topology::Mimo { n_user, n_ant } => {
            let others = other_users(user, n_user);
            for t in 0..n {
                let mut row = features.row_mut(t);
                for a in 0..n_ant {
                    row[a] = rx[[t, a]];
                }
                for (k, &other) in others.iter().enumerate() {
                    row[n_ant + k] = probs[[t, other]];
                }
            }
        }
    }
    features
}

/// Estimators keyed by (user, iteration)
#[derive(Debug, Clone, PartialEq)]
pub struct EstimatorGrid {
    n_user: usize,
    iterations: usize,
    /// Iteration-major so one iteration's users form a contiguous slice
    cells: Vec<Vec<Mlp>>,
}

impl EstimatorGrid {
    pub fn new(n_user: usize, iterations: usize, input_dim: usize, rng: &mut ChaCha8Rng) -> Self {
        let cells = (0..iterations)
            .map(|_| {
                (0..n_user)
                    .map(|_| Mlp::new(&[input_dim, HIDDEN_SIZE, CLASSES], rng))
                    .collect()
            })
            .collect();
        Self {
            n_user,
            iterations,
            cells,
        }
    }

    pub fn n_user(&self) -> usize {
        self.n_user
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn get(&self, user: usize, iteration: usize) -> &Mlp {
        &self.cells[iteration][user]
    }

    fn iteration_mut(&mut self, iteration: usize) -> &mut [Mlp] {
        &mut self.cells[iteration]
    }
}

pub struct DeepSicTrainer {
    topology: Topology,
    iterations: usize,
    schedule: TrainSchedule,
    fading: bool,
    ctx: ComputeContext,
    init_rng: ChaCha8Rng,
    grid: EstimatorGrid,
}

impl DeepSicTrainer {
    pub fn new(config: &SimConfig, seed: u64) -> Self {
        let topology = config.topology();
        let mut init_rng = ChaCha8Rng::seed_from_u64(seed);
        let grid = EstimatorGrid::new(topology.n_user(), config.iterations, feature_dim(topology), &mut init_rng);

        Self {
            topology,
            iterations: config.iterations,
            schedule: TrainSchedule {
                epochs: config.epochs,
                learning_rate: config.learning_rate as f32,
            },
            fading: config.fading_in_channel,
            ctx: ComputeContext::new(config.parallel_training),
            init_rng,
            grid,
        }
    }

    pub fn grid(&self) -> &EstimatorGrid {
        &self.grid
    }

    /// Start-of-block step: a static channel gets a fresh grid, a fading
    /// channel keeps fine-tuning the previous one
    pub(crate) fn prepare_grid(&mut self) {
        if !self.fading {
            self.grid = EstimatorGrid::new(
                self.topology.n_user(),
                self.iterations,
                feature_dim(self.topology),
                &mut self.init_rng,
            );
        }
    }

    fn check_shapes(&self, rx: &Array2<f64>) -> Result<()> {
        let n_streams = self.topology.n_streams();
        if rx.ncols() != n_streams {
            return Err(SimError::shape("received streams", n_streams, rx.ncols()));
        }
        Ok(())
    }

    /// One user's batch: features built word by word, then stacked
    fn user_batch(&self, words: &[TrainingWord], probs: &[Array2<f64>], user: usize) -> Result<(Array2<f64>, Vec<usize>)> {
        let features: Vec<Array2<f64>> = words
            .iter()
            .zip(probs)
            .map(|(word, p)| build_features(self.topology, &word.rx, p, user))
            .collect();
        let targets = words
            .iter()
            .flat_map(|word| word.tx.column(user).to_vec())
            .map(|b| usize::from(b & 0x01))
            .collect();
        Ok((stack("estimator features", &features)?, targets))
    }

    /// Train every user's estimator of one iteration
    fn train_models(&mut self, iteration: usize, words: &[TrainingWord], probs: &[Array2<f64>]) -> Result<()> {
        let batches = (0..self.topology.n_user())
            .map(|user| self.user_batch(words, probs, user))
            .collect::<Result<Vec<_>>>()?;

        let schedule = self.schedule;
        let ctx = self.ctx;
        let losses = ctx.for_each_independent(self.grid.iteration_mut(iteration), |user, model| {
            let (features, targets) = &batches[user];
            train(model, features, targets, &schedule, &ctx)
        });

        for (user, loss) in losses.into_iter().enumerate() {
            let loss = loss?;
            debug!(iteration, user, loss, "trained DeepSIC estimator");
        }
        Ok(())
    }

    /// Run iteration `iteration`'s estimators over `rx` given the current priors
    fn calculate_posteriors(&self, iteration: usize, probs: &Array2<f64>, rx: &Array2<f64>) -> Array2<f64> {
        let mut next = Array2::zeros(probs.raw_dim());
        for user in 0..self.topology.n_user() {
            let features = build_features(self.topology, rx, probs, user);
            let output = infer(self.grid.get(user, iteration), &features, &self.ctx);
            next.column_mut(user).assign(&output.index_axis(Axis(1), 1));
        }
        next
    }

    /// Final soft estimates after all iterations, starting from 0.5 priors
    pub fn soft_forward(&self, rx: &Array2<f64>) -> Result<Array2<f64>> {
        self.check_shapes(rx)?;
        let mut probs = initial_probabilities(rx.nrows(), self.topology.n_user());
        for iteration in 0..self.iterations {
            probs = self.calculate_posteriors(iteration, &probs, rx);
        }
        Ok(probs)
    }
}

impl Detector for DeepSicTrainer {
    fn name(&self) -> &'static str {
        "DeepSIC"
    }

    fn online_training(&mut self, words: &[TrainingWord]) -> Result<()> {
        let (n_user, n_streams) = (self.topology.n_user(), self.topology.n_streams());
        for word in words {
            word.check(n_user, n_streams)?;
        }

        self.prepare_grid();

        // Iteration 0 learns from the true labels as side information
        let label_probs: Vec<Array2<f64>> = words.iter().map(|w| w.tx.mapv(|b| f64::from(b & 0x01))).collect();
        self.train_models(0, words, &label_probs)?;

        let mut probs: Vec<Array2<f64>> = words
            .iter()
            .map(|w| initial_probabilities(w.rx.nrows(), n_user))
            .collect();
        for iteration in 1..self.iterations {
            probs = words
                .iter()
                .zip(&probs)
                .map(|(word, p)| self.calculate_posteriors(iteration - 1, p, &word.rx))
                .collect();
            self.train_models(iteration, words, &probs)?;
        }
        Ok(())
    }

    fn forward(&self, rx: &Array2<f64>) -> Result<Array2<u8>> {
        let probs = self.soft_forward(rx)?;
        Ok(probs.mapv(|p| symbol_to_prob(prob_to_symbol(p)) as u8))
    }

    fn parameter_snapshot(&self) -> Vec<f32> {
        self.grid.cells.iter().flatten().flat_map(Mlp::parameters_flat).collect()
    }
}
