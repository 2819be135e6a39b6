//! Augmented SIC - online-trained symbol detection over simulated channels
//!
//! Simulates block transmissions over a SISO ISI channel or a MIMO
//! spatially-coupled channel, extends each block's short pilot with
//! synthetic words drawn from per-state received statistics, and trains
//! DeepSIC (or ViterbiNet) detectors online on the result. Elixir drives
//! whole pipelines through the NIF in `nif`.

pub mod augmentations;
pub mod channel;
pub mod config;
pub mod detectors;
pub mod error;
pub mod nif;
pub mod pipeline;
pub mod slab;

pub use augmentations::{build_augmenter, AdaptiveAugmenter, Augmenter, StateStatistics};
pub use channel::{Block, ChannelModel, ChannelSimulator};
pub use config::{AugmenterType, ChannelType, DetectorType, ModulationType, SimConfig, Topology};
pub use detectors::{build_detector, DeepSicTrainer, Detector, TrainingWord, ViterbiNetTrainer};
pub use error::{Result, SimError};
pub use pipeline::{BlockResult, DetectionPipeline, Evaluation};

rustler::init!("Elixir.AugmentedSic.Nif");
