//! Episode engine configuration
//!
//! Every reward constant, budget and observation dimension the engine uses
//! lives in [`EngineConfig`]. A configuration is validated once, when the
//! engine is built, and is never mutated afterwards; parallel environments
//! each own their own copy.

use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Number of scalars in the spatial/meta segment of an observation
pub const SPATIAL_DIM: usize = 9;

/// Scalars per bounding box before the one-hot class block:
/// x center, y center, area, confidence
pub const BOX_GEOMETRY_DIM: usize = 4;

/// Episode engine configuration
///
/// Default values are the ones the stop-search agent was trained with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Steps the agent must take before it may give up without evidence
    pub min_steps: usize,

    /// Hard episode length; reaching it forces the episode to end
    pub max_steps: usize,

    /// Steps allowed after first detection before the episode is forced to end
    pub max_steps_after_found: usize,

    /// Steps after first detection that carry no lingering penalty
    pub free_steps_after_found: usize,

    /// Return-to-start presses allowed before each press is penalized
    pub free_spacebar_presses: usize,

    /// Multiplier applied to the detector confidence
    pub dampen_scalar: f64,

    /// Reward for trying to finish before `min_steps` with nothing found
    pub premature_end: f64,

    /// Bonus for confirming the target again after it was already found
    pub consecutive_boost: f64,

    /// Penalty per return-to-start press once the free presses are used
    pub spacebar_penalty: f64,

    /// Penalty per step beyond `free_steps_after_found`
    pub after_found_punishment: f64,

    /// Reward for an accepted finish
    pub move_on_reward: f64,

    /// Extra reward for finishing within `free_steps_after_found`
    pub efficiency_bonus: f64,

    /// Multiplier applied to the biggest primary box area
    pub size_scalar: f64,

    /// Cap on the box size bonus
    pub max_size_bonus: f64,

    /// Number of detector classes (one-hot width)
    pub num_classes: usize,

    /// Bounding boxes kept per frame (K)
    pub boxes_kept: usize,

    /// Length of the detector embedding
    pub embedding_dim: usize,

    /// Detector labels that prove the target is present
    pub primary_labels: Vec<String>,

    /// Share of secondary-label confidence added to the frame confidence
    pub secondary_boost: f64,

    /// Reward when an episode is cut off by either step limit
    pub forced_end_penalty: f64,

    /// Reward for a finish accepted with too few viewpoints
    pub underevidenced_finish_penalty: f64,

    /// Reward for a finish rejected because of too few viewpoints
    pub underevidenced_reject_penalty: f64,

    /// Distinct viewpoints required for a fully evidenced finish
    pub min_finish_viewpoints: usize,

    /// Viewpoint count at which the observation feature saturates
    pub viewpoint_saturation: usize,

    /// Distance scale (meters) of the tanh distance feature
    pub distance_scale_m: f64,

    /// Zoom count at which the zoom feature saturates
    pub zoom_saturation: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_steps: 25,
            max_steps: 35,
            max_steps_after_found: 20,
            free_steps_after_found: 7,
            free_spacebar_presses: 2,
            dampen_scalar: 0.6,
            premature_end: -0.7,
            consecutive_boost: 0.2,
            spacebar_penalty: 0.3,
            after_found_punishment: 0.15,
            move_on_reward: 0.1,
            efficiency_bonus: 0.3,
            size_scalar: 7.0,
            max_size_bonus: 0.2,
            num_classes: 5,
            boxes_kept: 3,
            embedding_dim: 512,
            primary_labels: vec!["shelter".to_string(), "sign".to_string()],
            secondary_boost: 0.35,
            forced_end_penalty: -0.85,
            underevidenced_finish_penalty: -0.3,
            underevidenced_reject_penalty: -0.4,
            min_finish_viewpoints: 2,
            viewpoint_saturation: 3,
            distance_scale_m: 50.0,
            zoom_saturation: 2,
        }
    }
}

impl EngineConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration from a JSON file and validate it
    ///
    /// Missing fields take their default values.
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading engine config {}", path.display()))?;
        let config: Self = serde_json::from_str(&contents)
            .with_context(|| format!("parsing engine config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Length of the per-box descriptor block
    pub fn box_descriptor_dim(&self) -> usize {
        BOX_GEOMETRY_DIM + self.num_classes
    }

    /// Length of a full observation vector
    pub fn frame_dim(&self) -> usize {
        self.embedding_dim + self.boxes_kept * self.box_descriptor_dim() + SPATIAL_DIM
    }

    /// Whether a detector label counts as primary evidence
    pub fn is_primary_label(&self, label: &str) -> bool {
        self.primary_labels.iter().any(|l| l == label)
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        let counts = [
            ("max_steps", self.max_steps),
            ("max_steps_after_found", self.max_steps_after_found),
            ("free_steps_after_found", self.free_steps_after_found),
            ("free_spacebar_presses", self.free_spacebar_presses),
            ("num_classes", self.num_classes),
            ("boxes_kept", self.boxes_kept),
            ("viewpoint_saturation", self.viewpoint_saturation),
            ("zoom_saturation", self.zoom_saturation),
        ];
        for (field, value) in counts {
            if value == 0 {
                return Err(ConfigError::Zero(field));
            }
        }

        let positives = [
            ("dampen_scalar", self.dampen_scalar),
            ("distance_scale_m", self.distance_scale_m),
        ];
        for (field, value) in positives {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::NonPositive { field, value });
            }
        }

        let non_negatives = [
            ("consecutive_boost", self.consecutive_boost),
            ("spacebar_penalty", self.spacebar_penalty),
            ("after_found_punishment", self.after_found_punishment),
            ("move_on_reward", self.move_on_reward),
            ("efficiency_bonus", self.efficiency_bonus),
            ("size_scalar", self.size_scalar),
            ("max_size_bonus", self.max_size_bonus),
            ("secondary_boost", self.secondary_boost),
        ];
        for (field, value) in non_negatives {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::NonPositive { field, value });
            }
        }

        let penalties = [
            ("premature_end", self.premature_end),
            ("forced_end_penalty", self.forced_end_penalty),
            ("underevidenced_finish_penalty", self.underevidenced_finish_penalty),
            ("underevidenced_reject_penalty", self.underevidenced_reject_penalty),
        ];
        for (field, value) in penalties {
            if !(value.is_finite() && value <= 0.0) {
                return Err(ConfigError::PositivePenalty { field, value });
            }
        }

        if self.free_steps_after_found >= self.max_steps_after_found {
            return Err(ConfigError::UnreachableAfterFound {
                free: self.free_steps_after_found,
                max: self.max_steps_after_found,
            });
        }
        if self.min_steps >= self.max_steps {
            return Err(ConfigError::MinStepsNotBelowMax {
                min: self.min_steps,
                max: self.max_steps,
            });
        }
        if self.primary_labels.is_empty() {
            return Err(ConfigError::NoPrimaryLabels);
        }
        Ok(())
    }

    /// Set minimum steps before an unevidenced finish is accepted
    pub fn min_steps(mut self, steps: usize) -> Self {
        self.min_steps = steps;
        self
    }

    /// Set maximum episode length
    pub fn max_steps(mut self, steps: usize) -> Self {
        self.max_steps = steps;
        self
    }

    /// Set the forced cutoff after first detection
    pub fn max_steps_after_found(mut self, steps: usize) -> Self {
        self.max_steps_after_found = steps;
        self
    }

    /// Set the penalty-free steps after first detection
    pub fn free_steps_after_found(mut self, steps: usize) -> Self {
        self.free_steps_after_found = steps;
        self
    }

    /// Set the penalty-free return-to-start presses
    pub fn free_spacebar_presses(mut self, presses: usize) -> Self {
        self.free_spacebar_presses = presses;
        self
    }

    /// Set the confidence dampening multiplier
    pub fn dampen_scalar(mut self, scalar: f64) -> Self {
        self.dampen_scalar = scalar;
        self
    }

    /// Set the premature finish reward
    pub fn premature_end(mut self, reward: f64) -> Self {
        self.premature_end = reward;
        self
    }

    /// Set number of detector classes
    pub fn num_classes(mut self, classes: usize) -> Self {
        self.num_classes = classes;
        self
    }

    /// Set bounding boxes kept per frame
    pub fn boxes_kept(mut self, boxes: usize) -> Self {
        self.boxes_kept = boxes;
        self
    }

    /// Set detector embedding length
    pub fn embedding_dim(mut self, dim: usize) -> Self {
        self.embedding_dim = dim;
        self
    }

    /// Set the primary evidence labels
    pub fn primary_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_labels = labels.into_iter().map(Into::into).collect();
        self
    }
}
