//! Typed errors raised at the episode engine boundary
//!
//! Collaborator seams (navigation, detection, stop loading, log writing)
//! report failures through `anyhow`. Everything the engine itself rejects is
//! an [`EngineError`]: a malformed detector frame, an unknown action index,
//! a call made in the wrong episode phase, or a configuration that would
//! produce unreachable states.

use thiserror::Error;

/// Errors produced by the episode engine
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// Action index outside the discrete action set
    #[error("action index {0} is outside the action set")]
    InvalidAction(i64),

    /// Detector embedding has the wrong length
    #[error("detector embedding has {actual} values, expected {expected}")]
    EmbeddingDimension {
        /// Length required by the configuration
        expected: usize,
        /// Length actually received
        actual: usize,
    },

    /// Frame confidence is not a finite value in [0, 1]
    #[error("detector confidence {0} is not in [0, 1]")]
    InvalidConfidence(f64),

    /// Biggest primary box area is not a finite fraction in [0, 1]
    #[error("primary box area {0} is not in [0, 1]")]
    InvalidBoxArea(f64),

    /// Embedding holds a NaN or infinite value
    #[error("detector embedding value {value} at index {index} is not finite")]
    NonFiniteEmbedding {
        /// Position in the embedding
        index: usize,
        /// Value found
        value: f32,
    },

    /// A per-label confidence is not a finite value in [0, 1]
    #[error("confidence {score} for label '{label}' is not in [0, 1]")]
    InvalidLabelScore {
        /// Detector label
        label: String,
        /// Value found
        score: f64,
    },

    /// A bounding box carries out-of-range geometry or confidence
    #[error("bounding box {index} is malformed: {reason}")]
    InvalidBox {
        /// Position of the box in detector order
        index: usize,
        /// What is wrong with it
        reason: String,
    },

    /// A kept bounding box has a class id the one-hot encoding cannot hold
    #[error("class id {class_id} is outside the {num_classes} configured classes")]
    ClassOutOfRange {
        /// Offending class id
        class_id: usize,
        /// Configured number of classes
        num_classes: usize,
    },

    /// `step` was called before any `reset`
    #[error("no episode in progress; call reset first")]
    NotReset,

    /// `step` was called after the episode returned done
    #[error("episode already terminated; call reset to start a new one")]
    EpisodeTerminated,

    /// Engine was constructed with an invalid configuration
    #[error("invalid engine configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Configuration problems detected at engine construction
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// A count that is used as a divisor or a size was zero
    #[error("{0} must be positive")]
    Zero(&'static str),

    /// A scalar that must be strictly positive and finite was not
    #[error("{field} must be a positive finite number, got {value}")]
    NonPositive {
        /// Field name
        field: &'static str,
        /// Value found
        value: f64,
    },

    /// A penalty that must be non-positive was positive or not finite
    #[error("{field} must be a finite penalty (<= 0), got {value}")]
    PositivePenalty {
        /// Field name
        field: &'static str,
        /// Value found
        value: f64,
    },

    /// After-found budget leaves no room before the forced cutoff
    #[error(
        "free_steps_after_found ({free}) must be smaller than max_steps_after_found ({max})"
    )]
    UnreachableAfterFound {
        /// Configured free steps after found
        free: usize,
        /// Configured hard cutoff after found
        max: usize,
    },

    /// Minimum episode length is not below the forced timeout
    #[error("min_steps ({min}) must be smaller than max_steps ({max})")]
    MinStepsNotBelowMax {
        /// Configured minimum steps
        min: usize,
        /// Configured maximum steps
        max: usize,
    },

    /// No detector label counts as primary evidence
    #[error("primary_labels must name at least one detector label")]
    NoPrimaryLabels,
}
