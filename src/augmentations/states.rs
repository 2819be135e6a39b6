//! Channel-state labelling
//!
//! SISO: the state at position t packs the L bits b[t..t+L] as
//! Σ_i b[t+i]·2^i, with zero bits assumed past the end of the word (the
//! same padding the transmitter uses).
//!
//! MIMO: the state packs the simultaneous bits of all users, Σ_u b[t,u]·2^u.

use ndarray::Array2;

use crate::config::Topology;
use crate::error::{Result, SimError};

/// Sliding-window states of a `[n, 1]` bit word
pub fn calculate_states(memory_length: usize, bits: &Array2<u8>) -> Result<Vec<usize>> {
    if bits.ncols() != 1 {
        return Err(SimError::shape("SISO bit streams", 1, bits.ncols()));
    }
    let n = bits.nrows();
    Ok((0..n)
        .map(|t| {
            (0..memory_length)
                .filter(|&i| t + i < n && bits[[t + i, 0]] & 0x01 == 1)
                .fold(0usize, |state, i| state | (1 << i))
        })
        .collect())
}

/// Per-row states of a `[n, n_user]` bit word
pub fn calculate_mimo_states(n_user: usize, bits: &Array2<u8>) -> Result<Vec<usize>> {
    if bits.ncols() != n_user {
        return Err(SimError::shape("MIMO user streams", n_user, bits.ncols()));
    }
    Ok(bits
        .rows()
        .into_iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .filter(|(_, b)| **b & 0x01 == 1)
                .fold(0usize, |state, (u, _)| state | (1 << u))
        })
        .collect())
}

/// SISO states whose whole window lies inside the word
///
/// A received sample at t depends on b[t..t+L]; for a slice cut out of a
/// longer transmission the last L−1 windows reach past the slice, so only
/// the first n−L+1 states are known.
pub fn calculate_complete_states(memory_length: usize, bits: &Array2<u8>) -> Result<Vec<usize>> {
    let mut states = calculate_states(memory_length, bits)?;
    states.truncate((bits.nrows() + 1).saturating_sub(memory_length.max(1)));
    Ok(states)
}

/// States fully determined by the word's own bits
pub fn observed_states(topology: Topology, bits: &Array2<u8>) -> Result<Vec<usize>> {
    match topology {
        Topology::Siso { memory_length } => calculate_complete_states(memory_length, bits),
        Topology::Mimo { n_user, .. } => calculate_mimo_states(n_user, bits),
    }
}

/// States for whichever topology is active
pub fn states_for(topology: Topology, bits: &Array2<u8>) -> Result<Vec<usize>> {
    match topology {
        Topology::Siso { memory_length } => calculate_states(memory_length, bits),
        Topology::Mimo { n_user, .. } => calculate_mimo_states(n_user, bits),
    }
}
