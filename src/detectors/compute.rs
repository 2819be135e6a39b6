//! Compute context for estimator training and inference
//!
//! The only place that decides numeric precision and whether independent
//! estimators may be trained concurrently. Detectors hand their f64 channel
//! data through `prepare` and never branch on the compute target themselves.

use ndarray::Array2;
use rayon::prelude::*;

/// Training precision and scheduling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComputeContext {
    parallel: bool,
}

impl ComputeContext {
    pub fn new(parallel: bool) -> Self {
        Self { parallel }
    }

    pub fn sequential() -> Self {
        Self::new(false)
    }

    /// Convert channel data to estimator precision
    pub fn prepare(&self, data: &Array2<f64>) -> Array2<f32> {
        data.mapv(|x| x as f32)
    }

    /// Run `f` over mutually independent items, concurrently when allowed
    ///
    /// Results keep the order of `items`.
    pub fn for_each_independent<T, R, F>(&self, items: &mut [T], f: F) -> Vec<R>
    where
        T: Send,
        R: Send,
        F: Fn(usize, &mut T) -> R + Sync + Send,
    {
        if self.parallel {
            items
                .par_iter_mut()
                .enumerate()
                .map(|(i, item)| f(i, item))
                .collect()
        } else {
            items.iter_mut().enumerate().map(|(i, item)| f(i, item)).collect()
        }
    }
}

impl Default for ComputeContext {
    fn default() -> Self {
        Self::new(true)
    }
}
