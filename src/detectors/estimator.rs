//! Trainable estimators
//!
//! A small fully connected ReLU network with a softmax head, trained on the
//! full batch with Adam to minimize mean cross-entropy for a fixed number of
//! epochs. A fresh optimizer is created on every `fit`, so no optimizer state
//! survives between blocks.

use ndarray::{Array2, Axis};
use rand::Rng;
use rand_chacha::ChaCha8Rng;

use super::compute::ComputeContext;
use crate::error::{Result, SimError};

/// Epoch budget and step size for one training call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainSchedule {
    pub epochs: usize,
    pub learning_rate: f32,
}

/// Classifier capability shared by all detectors
pub trait Estimator: Send {
    /// Fit class labels `targets` (one per input row); returns the last loss
    fn fit(&mut self, inputs: &Array2<f32>, targets: &[usize], schedule: &TrainSchedule) -> Result<f32>;

    /// Class probabilities, one row per input row
    fn predict(&self, inputs: &Array2<f32>) -> Array2<f32>;
}

/// Train an estimator on channel data through the compute context
pub fn train<E: Estimator + ?Sized>(
    estimator: &mut E,
    inputs: &Array2<f64>,
    targets: &[usize],
    schedule: &TrainSchedule,
    ctx: &ComputeContext,
) -> Result<f32> {
    estimator.fit(&ctx.prepare(inputs), targets, schedule)
}

/// Class probabilities for channel data, back in f64
pub fn infer<E: Estimator + ?Sized>(estimator: &E, inputs: &Array2<f64>, ctx: &ComputeContext) -> Array2<f64> {
    estimator.predict(&ctx.prepare(inputs)).mapv(f64::from)
}

/// Row-wise numerically stable log-softmax
pub fn log_softmax_rows(logits: &Array2<f32>) -> Array2<f32> {
    let mut out = logits.clone();
    for mut row in out.rows_mut() {
        let max = row.fold(f32::NEG_INFINITY, |m, &x| m.max(x));
        let lse = row.mapv(|x| (x - max).exp()).sum().ln();
        row.mapv_inplace(|x| (x - max) - lse);
    }
    out
}

pub fn softmax_rows(logits: &Array2<f32>) -> Array2<f32> {
    log_softmax_rows(logits).mapv(f32::exp)
}

// ----------------------------------------
// Adam
// ----------------------------------------

#[derive(Clone, Debug)]
struct Adam {
    beta1: f32,
    beta2: f32,
    eps: f32,
    t: i32,
    m: Array2<f32>,
    v: Array2<f32>,
}

impl Adam {
    fn new(shape: (usize, usize)) -> Self {
        Self {
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            t: 0,
            m: Array2::zeros(shape),
            v: Array2::zeros(shape),
        }
    }

    fn step(&mut self, params: &mut Array2<f32>, grads: &Array2<f32>, lr: f32) {
        self.t += 1;

        self.m = &self.m * self.beta1 + grads * (1.0 - self.beta1);
        self.v = &self.v * self.beta2 + grads.mapv(|g| g * g) * (1.0 - self.beta2);

        let bias1 = 1.0 - self.beta1.powi(self.t);
        let bias2 = 1.0 - self.beta2.powi(self.t);
        let eps = self.eps;

        ndarray::Zip::from(params)
            .and(&self.m)
            .and(&self.v)
            .for_each(|p, &m, &v| {
                let m_hat = m / bias1;
                let v_hat = v / bias2;
                *p -= lr * m_hat / (v_hat.sqrt() + eps);
            });
    }
}

// ----------------------------------------
// Dense layers
// ----------------------------------------

#[derive(Clone, Debug, PartialEq)]
struct Dense {
    /// `[fan_in, fan_out]`
    weight: Array2<f32>,
    /// `[1, fan_out]`
    bias: Array2<f32>,
}

impl Dense {
    /// Uniform ±1/√fan_in initialization
    fn new(fan_in: usize, fan_out: usize, rng: &mut ChaCha8Rng) -> Self {
        let bound = 1.0 / (fan_in.max(1) as f32).sqrt();
        let mut draw = || rng.gen_range(-bound..bound);
        Self {
            weight: Array2::from_shape_simple_fn((fan_in, fan_out), &mut draw),
            bias: Array2::from_shape_simple_fn((1, fan_out), &mut draw),
        }
    }

    fn forward(&self, x: &Array2<f32>) -> Array2<f32> {
        x.dot(&self.weight) + &self.bias
    }
}

/// Fully connected ReLU network with linear output logits
#[derive(Clone, Debug, PartialEq)]
pub struct Mlp {
    layers: Vec<Dense>,
}

impl Mlp {
    /// `sizes = [input, hidden.., classes]`
    pub fn new(sizes: &[usize], rng: &mut ChaCha8Rng) -> Self {
        let layers = sizes
            .windows(2)
            .map(|pair| Dense::new(pair[0], pair[1], rng))
            .collect();
        Self { layers }
    }

    pub fn input_dim(&self) -> usize {
        self.layers.first().map_or(0, |l| l.weight.nrows())
    }

    pub fn output_dim(&self) -> usize {
        self.layers.last().map_or(0, |l| l.weight.ncols())
    }

    /// All weights and biases, layer by layer
    pub fn parameters_flat(&self) -> Vec<f32> {
        let mut v = Vec::new();
        for layer in &self.layers {
            v.extend(layer.weight.iter().copied());
            v.extend(layer.bias.iter().copied());
        }
        v
    }

    pub fn logits(&self, x: &Array2<f32>) -> Array2<f32> {
        let last = self.layers.len().saturating_sub(1);
        let mut a = x.clone();
        for (l, layer) in self.layers.iter().enumerate() {
            a = layer.forward(&a);
            if l < last {
                a.mapv_inplace(|v| v.max(0.0));
            }
        }
        a
    }

    /// Forward pass keeping every layer input and pre-activation
    fn forward_cached(&self, x: &Array2<f32>) -> (Vec<Array2<f32>>, Vec<Array2<f32>>) {
        let last = self.layers.len().saturating_sub(1);
        let mut inputs = Vec::with_capacity(self.layers.len());
        let mut pre = Vec::with_capacity(self.layers.len());
        let mut a = x.clone();
        for (l, layer) in self.layers.iter().enumerate() {
            let z = layer.forward(&a);
            inputs.push(a);
            a = if l < last { z.mapv(|v| v.max(0.0)) } else { z.clone() };
            pre.push(z);
        }
        (inputs, pre)
    }

    fn check_batch(&self, inputs: &Array2<f32>, targets: &[usize]) -> Result<()> {
        if inputs.ncols() != self.input_dim() {
            return Err(SimError::shape("estimator input features", self.input_dim(), inputs.ncols()));
        }
        if inputs.nrows() != targets.len() {
            return Err(SimError::shape("training targets", inputs.nrows(), targets.len()));
        }
        if let Some(&bad) = targets.iter().find(|&&t| t >= self.output_dim()) {
            return Err(SimError::shape("target class", self.output_dim(), bad));
        }
        Ok(())
    }
}

fn mean_cross_entropy(log_probs: &Array2<f32>, targets: &[usize]) -> f32 {
    if targets.is_empty() {
        return 0.0;
    }
    let total: f32 = targets
        .iter()
        .enumerate()
        .map(|(i, &t)| -log_probs[[i, t]])
        .sum();
    total / targets.len() as f32
}

impl Estimator for Mlp {
    fn fit(&mut self, inputs: &Array2<f32>, targets: &[usize], schedule: &TrainSchedule) -> Result<f32> {
        self.check_batch(inputs, targets)?;

        if schedule.epochs == 0 || targets.is_empty() {
            return Ok(mean_cross_entropy(&log_softmax_rows(&self.logits(inputs)), targets));
        }

        let mut opt_w: Vec<Adam> = self.layers.iter().map(|l| Adam::new(l.weight.dim())).collect();
        let mut opt_b: Vec<Adam> = self.layers.iter().map(|l| Adam::new(l.bias.dim())).collect();
        let batch = targets.len() as f32;
        let mut loss = 0.0;

        for _ in 0..schedule.epochs {
            let (layer_inputs, pre) = self.forward_cached(inputs);
            let log_probs = match pre.last() {
                Some(z) => log_softmax_rows(z),
                None => return Ok(0.0),
            };
            loss = mean_cross_entropy(&log_probs, targets);

            // d(mean CE)/d(logits) = (softmax - onehot) / batch
            let mut grad = log_probs.mapv(f32::exp);
            for (i, &t) in targets.iter().enumerate() {
                grad[[i, t]] -= 1.0;
            }
            grad /= batch;

            for l in (0..self.layers.len()).rev() {
                let grad_w = layer_inputs[l].t().dot(&grad);
                let grad_b = grad.sum_axis(Axis(0)).insert_axis(Axis(0));
                let grad_prev = if l > 0 {
                    let relu_mask = pre[l - 1].mapv(|z| if z > 0.0 { 1.0 } else { 0.0 });
                    Some(grad.dot(&self.layers[l].weight.t()) * relu_mask)
                } else {
                    None
                };

                opt_w[l].step(&mut self.layers[l].weight, &grad_w, schedule.learning_rate);
                opt_b[l].step(&mut self.layers[l].bias, &grad_b, schedule.learning_rate);

                if let Some(g) = grad_prev {
                    grad = g;
                }
            }
        }

        Ok(loss)
    }

    fn predict(&self, inputs: &Array2<f32>) -> Array2<f32> {
        softmax_rows(&self.logits(inputs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::SeedableRng;

    fn schedule(epochs: usize) -> TrainSchedule {
        TrainSchedule {
            epochs,
            learning_rate: 1e-2,
        }
    }

    #[test]
    fn test_softmax_rows_normalized() {
        let p = softmax_rows(&array![[1.0f32, 2.0, 3.0], [1000.0, 1000.0, -1000.0]]);
        for row in p.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-5);
        }
        assert!((p[[1, 0]] - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_log_softmax_large_logits() {
        let lp = log_softmax_rows(&array![[1000.0f32, 1000.0, -1000.0], [-5000.0, -5001.0, -4999.0]]);
        assert!((lp[[0, 0]] - (-std::f32::consts::LN_2)).abs() < 1e-6);
        assert_eq!(lp[[0, 0]], lp[[0, 1]]);
        for row in lp.rows() {
            let total: f32 = row.iter().map(|x| x.exp()).sum();
            assert!((total - 1.0).abs() < 1e-6, "row sums to {}", total);
        }
    }

    #[test]
    fn test_shapes() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let mlp = Mlp::new(&[3, 8, 2], &mut rng);
        assert_eq!(mlp.input_dim(), 3);
        assert_eq!(mlp.output_dim(), 2);
        assert_eq!(mlp.parameters_flat().len(), 3 * 8 + 8 + 8 * 2 + 2);
        assert_eq!(mlp.predict(&Array2::zeros((5, 3))).dim(), (5, 2));
    }

    #[test]
    fn test_same_seed_same_weights() {
        let a = Mlp::new(&[2, 4, 2], &mut ChaCha8Rng::seed_from_u64(3));
        let b = Mlp::new(&[2, 4, 2], &mut ChaCha8Rng::seed_from_u64(3));
        assert_eq!(a, b);
    }

    #[test]
    fn test_learns_sign_of_input() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut mlp = Mlp::new(&[1, 16, 2], &mut rng);
        let x = Array2::from_shape_fn((64, 1), |(i, _)| (i as f32 - 31.5) / 16.0);
        let targets: Vec<usize> = x.iter().map(|&v| usize::from(v > 0.0)).collect();

        let before = mlp.fit(&x, &targets, &schedule(0)).unwrap();
        let after = mlp.fit(&x, &targets, &schedule(300)).unwrap();
        assert!(after < before, "loss {} -> {}", before, after);

        let probs = mlp.predict(&x);
        let correct = targets
            .iter()
            .enumerate()
            .filter(|(i, t)| (probs[[*i, 1]] > 0.5) == (**t == 1))
            .count();
        assert!(correct >= 58, "only {} of 64 correct", correct);
    }

    #[test]
    fn test_zero_epochs_leaves_weights() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let mut mlp = Mlp::new(&[2, 4, 2], &mut rng);
        let before = mlp.clone();
        mlp.fit(&Array2::ones((3, 2)), &[0, 1, 0], &schedule(0)).unwrap();
        assert_eq!(mlp, before);
    }

    #[test]
    fn test_bad_batches_rejected() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let mut mlp = Mlp::new(&[2, 4, 2], &mut rng);
        assert!(mlp.fit(&Array2::ones((3, 3)), &[0, 1, 0], &schedule(1)).is_err());
        assert!(mlp.fit(&Array2::ones((3, 2)), &[0, 1], &schedule(1)).is_err());
        assert!(mlp.fit(&Array2::ones((2, 2)), &[0, 2], &schedule(1)).is_err());
    }

    #[test]
    fn test_train_through_context() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let mut mlp = Mlp::new(&[1, 8, 2], &mut rng);
        let ctx = ComputeContext::sequential();
        let x = array![[-1.0f64], [-0.5], [0.5], [1.0]];
        train(&mut mlp, &x, &[0, 0, 1, 1], &schedule(200), &ctx).unwrap();
        let probs = infer(&mlp, &x, &ctx);
        assert!(probs[[0, 1]] < 0.5 && probs[[3, 1]] > 0.5);
    }
}
