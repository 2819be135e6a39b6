//! Final reshaping of synthetic pairs
//!
//! Synthetic words must match the batch shape of the reference received
//! word they were generated for. Larger syntheses are subsampled without
//! replacement, keeping row order.

use ndarray::{Array2, Axis};
use rand::seq::index::sample;
use rand_chacha::ChaCha8Rng;

use crate::error::{Result, SimError};

pub fn resample_to_reference(
    rx: Array2<f64>,
    tx: Array2<u8>,
    reference: &Array2<f64>,
    rng: &mut ChaCha8Rng,
) -> Result<(Array2<f64>, Array2<u8>)> {
    if rx.nrows() != tx.nrows() {
        return Err(SimError::shape("synthetic word rows", rx.nrows(), tx.nrows()));
    }
    if rx.ncols() != reference.ncols() {
        return Err(SimError::shape("synthetic received streams", reference.ncols(), rx.ncols()));
    }

    let target = reference.nrows();
    if rx.nrows() == target {
        return Ok((rx, tx));
    }
    if rx.nrows() < target {
        return Err(SimError::shape("synthetic word rows", target, rx.nrows()));
    }

    let mut rows = sample(rng, rx.nrows(), target).into_vec();
    rows.sort_unstable();
    Ok((rx.select(Axis(0), &rows), tx.select(Axis(0), &rows)))
}
