//! Run configuration
//!
//! One immutable `SimConfig` is built at process start, validated once and
//! handed by reference to every component constructor. Names follow the
//! option keys external loaders use (`channel_type`, `memory_length`, ...).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};

/// Fading periodicities (in blocks) supported by the channel models
pub const FADING_PERIODS: [f64; 4] = [51.0, 39.0, 33.0, 21.0];

/// Upper bound on state bits so the state alphabet stays enumerable
pub const MAX_STATE_BITS: usize = 16;

/// Channel topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelType {
    /// Single-user ISI channel with memory
    #[serde(rename = "SISO")]
    Siso,
    /// Multi-user, multi-antenna memoryless channel
    #[serde(rename = "MIMO")]
    Mimo,
}

impl FromStr for ChannelType {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "SISO" => Ok(ChannelType::Siso),
            "MIMO" => Ok(ChannelType::Mimo),
            other => Err(SimError::UnsupportedChannelType(other.to_string())),
        }
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelType::Siso => write!(f, "SISO"),
            ChannelType::Mimo => write!(f, "MIMO"),
        }
    }
}

/// Modulation scheme
///
/// Only binary signalling is mapped in this crate; higher orders come from
/// an external mapping table and are rejected by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModulationType {
    #[serde(rename = "BPSK")]
    Bpsk,
}

impl FromStr for ModulationType {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "BPSK" => Ok(ModulationType::Bpsk),
            other => Err(SimError::UnsupportedModulation(other.to_string())),
        }
    }
}

/// Detector family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetectorType {
    DeepSIC,
    ViterbiNet,
}

impl FromStr for DetectorType {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "DeepSIC" => Ok(DetectorType::DeepSIC),
            "ViterbiNet" => Ok(DetectorType::ViterbiNet),
            other => Err(SimError::UnsupportedDetector(other.to_string())),
        }
    }
}

/// Pilot augmentation scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AugmenterType {
    Adaptive,
    None,
    ChannelResample,
}

impl FromStr for AugmenterType {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Adaptive" => Ok(AugmenterType::Adaptive),
            "None" => Ok(AugmenterType::None),
            "ChannelResample" => Ok(AugmenterType::ChannelResample),
            other => Err(SimError::UnsupportedAugmenter(other.to_string())),
        }
    }
}

/// Resolved channel topology with its dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
    Siso { memory_length: usize },
    Mimo { n_user: usize, n_ant: usize },
}

impl Topology {
    /// Number of transmitted bit streams
    pub fn n_user(&self) -> usize {
        match *self {
            Topology::Siso { .. } => 1,
            Topology::Mimo { n_user, .. } => n_user,
        }
    }

    /// Number of received sample streams
    pub fn n_streams(&self) -> usize {
        match *self {
            Topology::Siso { .. } => 1,
            Topology::Mimo { n_ant, .. } => n_ant,
        }
    }

    /// Bits that make up one channel state
    pub fn state_bits(&self) -> usize {
        match *self {
            Topology::Siso { memory_length } => memory_length,
            Topology::Mimo { n_user, .. } => n_user,
        }
    }

    /// Size of the channel-state alphabet
    pub fn n_states(&self) -> usize {
        1 << self.state_bits()
    }
}

/// Process-wide simulation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub channel_type: ChannelType,
    pub memory_length: usize,
    pub n_user: usize,
    pub n_ant: usize,
    pub modulation_type: ModulationType,
    pub pilot_size: usize,
    pub val_block_length: usize,
    pub blocks_num: usize,
    pub val_snr: f64,
    pub fading_in_channel: bool,
    pub from_scratch_flag: bool,
    pub seed: u64,
    pub detector_type: DetectorType,
    pub augmenter_type: AugmenterType,
    /// Synthetic pilot-sized words appended to each real pilot
    pub aug_factor: usize,
    /// Center smoothing weight on the newest estimate
    pub alpha1: f64,
    /// Spread smoothing weight on the newest estimate
    pub alpha2: f64,
    pub iterations: usize,
    pub epochs: usize,
    pub vnet_epochs: usize,
    pub learning_rate: f64,
    pub parallel_training: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            channel_type: ChannelType::Siso,
            memory_length: 4,
            n_user: 4,
            n_ant: 4,
            modulation_type: ModulationType::Bpsk,
            pilot_size: 50,
            val_block_length: 5050,
            blocks_num: 10,
            val_snr: 10.0,
            fading_in_channel: true,
            from_scratch_flag: true,
            seed: 0,
            detector_type: DetectorType::DeepSIC,
            augmenter_type: AugmenterType::Adaptive,
            aug_factor: 4,
            alpha1: 1.0,
            alpha2: 1.0,
            iterations: 5,
            epochs: 250,
            vnet_epochs: 750,
            learning_rate: 1e-3,
            parallel_training: true,
        }
    }
}

impl SimConfig {
    /// Topology with the dimensions that apply to it
    pub fn topology(&self) -> Topology {
        match self.channel_type {
            ChannelType::Siso => Topology::Siso {
                memory_length: self.memory_length,
            },
            ChannelType::Mimo => Topology::Mimo {
                n_user: self.n_user,
                n_ant: self.n_ant,
            },
        }
    }

    /// Check every cross-field constraint before any component is built
    pub fn validate(&self) -> Result<()> {
        let topology = self.topology();
        match topology {
            Topology::Siso { memory_length } => {
                if memory_length == 0 {
                    return Err(SimError::InvalidConfig(
                        "memory_length must be at least 1".into(),
                    ));
                }
                if self.pilot_size <= memory_length {
                    return Err(SimError::InvalidConfig(format!(
                        "pilot_size {} must exceed memory_length {}",
                        self.pilot_size, memory_length
                    )));
                }
                if self.fading_in_channel && memory_length > FADING_PERIODS.len() {
                    return Err(SimError::InvalidConfig(format!(
                        "fading supports at most {} taps, got memory_length {}",
                        FADING_PERIODS.len(),
                        memory_length
                    )));
                }
            }
            Topology::Mimo { n_user, n_ant } => {
                if n_user == 0 || n_ant == 0 {
                    return Err(SimError::InvalidConfig(
                        "n_user and n_ant must be at least 1".into(),
                    ));
                }
                if self.fading_in_channel && n_ant > FADING_PERIODS.len() {
                    return Err(SimError::InvalidConfig(format!(
                        "fading supports at most {} antennas, got n_ant {}",
                        FADING_PERIODS.len(),
                        n_ant
                    )));
                }
                if self.detector_type == DetectorType::ViterbiNet {
                    return Err(SimError::UnsupportedDetector(
                        "ViterbiNet requires a SISO channel".into(),
                    ));
                }
            }
        }

        if topology.state_bits() > MAX_STATE_BITS {
            return Err(SimError::InvalidConfig(format!(
                "{} state bits exceed the supported {}",
                topology.state_bits(),
                MAX_STATE_BITS
            )));
        }
        if self.pilot_size == 0 || self.pilot_size >= self.val_block_length {
            return Err(SimError::InvalidConfig(format!(
                "pilot_size {} must be in 1..{}",
                self.pilot_size, self.val_block_length
            )));
        }
        if !(0.0..=1.0).contains(&self.alpha1) || !(0.0..=1.0).contains(&self.alpha2) {
            return Err(SimError::InvalidConfig(
                "smoothing coefficients must lie in [0, 1]".into(),
            ));
        }
        if self.iterations == 0 {
            return Err(SimError::InvalidConfig("iterations must be at least 1".into()));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(SimError::InvalidConfig(
                "learning_rate must be positive".into(),
            ));
        }
        Ok(())
    }
}
