//! ViterbiNet: learned state likelihoods with a Viterbi decoder
//!
//! SISO only. A network maps each received sample to a distribution over
//! the 2^L channel states; the decoder then finds the minimum-cost state
//! path with cost −log p(state | y_t). Consecutive states overlap in L−1
//! bits, so state s' can only follow ((s' & mask) << 1) | b for b ∈ {0, 1}.
//! The detected bit at t is the lowest bit of the state at t.

use ndarray::{s, Array2};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, warn};

use super::compute::ComputeContext;
use super::estimator::{log_softmax_rows, train, Mlp, TrainSchedule};
use super::{stack, Detector, TrainingWord};
use crate::augmentations::states::calculate_complete_states;
use crate::config::{SimConfig, Topology};
use crate::error::{Result, SimError};

const HIDDEN: [usize; 2] = [100, 50];

pub struct ViterbiNetTrainer {
    memory_length: usize,
    n_states: usize,
    schedule: TrainSchedule,
    from_scratch: bool,
    ctx: ComputeContext,
    init_rng: ChaCha8Rng,
    net: Mlp,
}

fn build_net(n_states: usize, rng: &mut ChaCha8Rng) -> Mlp {
    Mlp::new(&[1, HIDDEN[0], HIDDEN[1], n_states], rng)
}

impl ViterbiNetTrainer {
    pub fn new(config: &SimConfig, seed: u64) -> Result<Self> {
        let memory_length = match config.topology() {
            Topology::Siso { memory_length } => memory_length,
            Topology::Mimo { .. } => {
                return Err(SimError::UnsupportedDetector(
                    "ViterbiNet requires a SISO channel".to_string(),
                ))
            }
        };
        let n_states = 1usize << memory_length;
        let mut init_rng = ChaCha8Rng::seed_from_u64(seed);
        let net = build_net(n_states, &mut init_rng);

        Ok(Self {
            memory_length,
            n_states,
            schedule: TrainSchedule {
                epochs: config.vnet_epochs,
                learning_rate: config.learning_rate as f32,
            },
            from_scratch: config.from_scratch_flag,
            ctx: ComputeContext::new(config.parallel_training),
            init_rng,
            net,
        })
    }

    pub fn net(&self) -> &Mlp {
        &self.net
    }

    fn check_rx(rx: &Array2<f64>) -> Result<()> {
        if rx.ncols() != 1 {
            return Err(SimError::shape("SISO received streams", 1, rx.ncols()));
        }
        Ok(())
    }

    /// Per-sample state log-likelihoods `[n, n_states]`
    pub fn state_log_probs(&self, rx: &Array2<f64>) -> Result<Array2<f64>> {
        Self::check_rx(rx)?;
        let logits = self.net.logits(&self.ctx.prepare(rx));
        Ok(log_softmax_rows(&logits).mapv(f64::from))
    }
}

/// Minimum-cost state path through the sliding-window trellis
pub fn viterbi_decode(log_probs: &Array2<f64>, memory_length: usize) -> Vec<usize> {
    let n = log_probs.nrows();
    let n_states = log_probs.ncols();
    if n == 0 || n_states == 0 {
        return Vec::new();
    }
    let mask = (1usize << memory_length.saturating_sub(1)) - 1;

    let mut metric: Vec<f64> = (0..n_states).map(|s| -log_probs[[0, s]]).collect();
    let mut back = vec![vec![0usize; n_states]; n];

    for t in 1..n {
        let mut next = vec![f64::INFINITY; n_states];
        for (s, slot) in next.iter_mut().enumerate() {
            let base = (s & mask) << 1;
            let (prev, cost) = [base, base | 1]
                .into_iter()
                .map(|p| (p, metric[p]))
                .fold((base, f64::INFINITY), |best, cand| if cand.1 < best.1 { cand } else { best });
            back[t][s] = prev;
            *slot = cost - log_probs[[t, s]];
        }
        metric = next;
    }

    let mut state = metric
        .iter()
        .enumerate()
        .fold((0usize, f64::INFINITY), |best, (s, &m)| if m < best.1 { (s, m) } else { best })
        .0;
    let mut path = vec![0usize; n];
    for t in (0..n).rev() {
        path[t] = state;
        state = back[t][state];
    }
    path
}

impl Detector for ViterbiNetTrainer {
    fn name(&self) -> &'static str {
        "ViterbiNet"
    }

    fn online_training(&mut self, words: &[TrainingWord]) -> Result<()> {
        for word in words {
            word.check(1, 1)?;
        }
        if self.from_scratch {
            self.net = build_net(self.n_states, &mut self.init_rng);
        }

        // Only samples whose whole state window lies inside their word
        let mut inputs = Vec::with_capacity(words.len());
        let mut targets = Vec::new();
        for word in words {
            let states = calculate_complete_states(self.memory_length, &word.tx)?;
            inputs.push(word.rx.slice(s![..states.len(), ..]).to_owned());
            targets.extend(states);
        }
        if targets.is_empty() {
            warn!(memory_length = self.memory_length, "no complete state windows to train on");
            return Ok(());
        }

        let inputs = stack("ViterbiNet inputs", &inputs)?;
        let loss = train(&mut self.net, &inputs, &targets, &self.schedule, &self.ctx)?;
        debug!(loss, rows = targets.len(), states = self.n_states, "trained ViterbiNet");
        Ok(())
    }

    fn forward(&self, rx: &Array2<f64>) -> Result<Array2<u8>> {
        let log_probs = self.state_log_probs(rx)?;
        let path = viterbi_decode(&log_probs, self.memory_length);
        Ok(Array2::from_shape_fn((path.len(), 1), |(t, _)| (path[t] & 0x01) as u8))
    }

    fn parameter_snapshot(&self) -> Vec<f32> {
        self.net.parameters_flat()
    }
}
