//! Error types for simulation, augmentation and detection

use thiserror::Error;

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, SimError>;

/// Errors surfaced to the driving loop
///
/// Numerical degeneracy (unobserved channel states) is resolved in place
/// and never shows up here.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimError {
    /// Channel topology name not recognized
    #[error("unsupported channel type: {0}")]
    UnsupportedChannelType(String),

    /// Modulation scheme name not recognized or not handled
    #[error("unsupported modulation type: {0}")]
    UnsupportedModulation(String),

    /// Detector name not recognized, or not valid for the topology
    #[error("unsupported detector: {0}")]
    UnsupportedDetector(String),

    /// Augmentation scheme name not recognized
    #[error("unsupported augmenter: {0}")]
    UnsupportedAugmenter(String),

    /// Configuration values that cannot work together
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Array dimensions disagree with what the operation requires
    #[error("shape mismatch in {what}: expected {expected}, got {actual}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Synthetic words requested before any pilot statistics exist
    #[error("augmenter has no state statistics yet; run a pilot update first")]
    MissingStatistics,
}

impl SimError {
    pub(crate) fn shape(what: &'static str, expected: usize, actual: usize) -> Self {
        SimError::ShapeMismatch {
            what,
            expected,
            actual,
        }
    }
}
