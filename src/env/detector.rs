//! Object detector contract
//!
//! The detector model itself lives outside this crate. It plugs in through
//! the [`Detector`] trait and hands the engine one [`DetectorOutput`] per
//! frame: a scalar confidence, the primary-evidence flag, per-label
//! confidences, the biggest primary box area, a fixed-length embedding and
//! the raw boxes in detector order.

use std::collections::BTreeMap;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::{config::EngineConfig, types::Frame, types::Stop};
use crate::error::EngineError;

/// One detected bounding box, in normalized image coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxDetection {
    /// Class label
    pub label: String,
    /// Class index used for the one-hot encoding
    pub class_id: usize,
    /// Box center x in [0, 1]
    pub x_center: f64,
    /// Box center y in [0, 1]
    pub y_center: f64,
    /// Box width in [0, 1]
    pub width: f64,
    /// Box height in [0, 1]
    pub height: f64,
    /// Detection confidence in [0, 1]
    pub confidence: f64,
}

impl BoxDetection {
    /// Create a box from its center, size and confidence
    pub fn new(
        label: impl Into<String>,
        class_id: usize,
        center: (f64, f64),
        size: (f64, f64),
        confidence: f64,
    ) -> Self {
        Self {
            label: label.into(),
            class_id,
            x_center: center.0,
            y_center: center.1,
            width: size.0,
            height: size.1,
            confidence,
        }
    }

    /// Fraction of the image covered by the box
    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    fn check(&self, index: usize, num_classes: usize) -> Result<(), EngineError> {
        let fields = [
            ("x_center", self.x_center),
            ("y_center", self.y_center),
            ("width", self.width),
            ("height", self.height),
            ("confidence", self.confidence),
        ];
        for (name, value) in fields {
            if !unit_interval(value) {
                return Err(EngineError::InvalidBox {
                    index,
                    reason: format!("{} = {} is not in [0, 1]", name, value),
                });
            }
        }
        if self.class_id >= num_classes {
            return Err(EngineError::ClassOutOfRange {
                class_id: self.class_id,
                num_classes,
            });
        }
        Ok(())
    }
}

fn unit_interval(value: f64) -> bool {
    value.is_finite() && (0.0..=1.0).contains(&value)
}

/// Detector result for a single frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorOutput {
    /// Frame confidence that the target is visible, in [0, 1]
    pub confidence: f64,
    /// Whether any box carries a primary evidence label
    pub found: bool,
    /// Best confidence per detected label
    pub labels: BTreeMap<String, f64>,
    /// Area of the biggest primary evidence box, in [0, 1]
    pub biggest_primary_area: f64,
    /// Pooled backbone features
    pub embedding: Vec<f32>,
    /// Boxes in detector order
    pub boxes: Vec<BoxDetection>,
}

impl DetectorOutput {
    /// An empty frame: nothing detected, zero embedding
    pub fn empty(embedding_dim: usize) -> Self {
        Self {
            confidence: 0.0,
            found: false,
            labels: BTreeMap::new(),
            biggest_primary_area: 0.0,
            embedding: vec![0.0; embedding_dim],
            boxes: Vec::new(),
        }
    }

    /// Build a frame result from raw boxes, scoring them with [`summarize_boxes`]
    pub fn from_boxes(
        boxes: Vec<BoxDetection>,
        embedding: Vec<f32>,
        config: &EngineConfig,
    ) -> Self {
        let summary = summarize_boxes(&boxes, config);
        Self {
            confidence: summary.confidence,
            found: summary.found,
            labels: summary.labels,
            biggest_primary_area: summary.biggest_primary_area,
            embedding,
            boxes,
        }
    }

    /// Check the frame against the engine's input contract
    pub fn validate(&self, config: &EngineConfig) -> Result<(), EngineError> {
        if self.embedding.len() != config.embedding_dim {
            return Err(EngineError::EmbeddingDimension {
                expected: config.embedding_dim,
                actual: self.embedding.len(),
            });
        }
        if !unit_interval(self.confidence) {
            return Err(EngineError::InvalidConfidence(self.confidence));
        }
        if !unit_interval(self.biggest_primary_area) {
            return Err(EngineError::InvalidBoxArea(self.biggest_primary_area));
        }
        if let Some(index) = self.embedding.iter().position(|v| !v.is_finite()) {
            return Err(EngineError::NonFiniteEmbedding {
                index,
                value: self.embedding[index],
            });
        }
        let bad_label = self.labels.iter().find(|(_, score)| !unit_interval(**score));
        if let Some((label, &score)) = bad_label {
            return Err(EngineError::InvalidLabelScore {
                label: label.clone(),
                score,
            });
        }
        for (index, detection) in self.boxes.iter().enumerate() {
            detection.check(index, config.num_classes)?;
        }
        Ok(())
    }
}

/// Scalar evidence extracted from a set of boxes
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BoxSummary {
    /// Combined confidence, in [0, 1]
    pub confidence: f64,
    /// Whether a primary evidence box is present
    pub found: bool,
    /// Best confidence per label
    pub labels: BTreeMap<String, f64>,
    /// Area of the biggest primary evidence box
    pub biggest_primary_area: f64,
}

/// Score a frame's boxes
///
/// The strongest primary box sets the base confidence. Secondary boxes add
/// `secondary_boost` times their summed confidence, where the sum is capped
/// so the total cannot exceed 1.
pub fn summarize_boxes(boxes: &[BoxDetection], config: &EngineConfig) -> BoxSummary {
    let mut primary = 0.0_f64;
    let mut secondary = 0.0_f64;
    let mut summary = BoxSummary::default();

    for detection in boxes {
        let best = summary.labels.entry(detection.label.clone()).or_insert(detection.confidence);
        *best = best.max(detection.confidence);

        if config.is_primary_label(&detection.label) {
            primary = primary.max(detection.confidence);
            summary.found = true;
            summary.biggest_primary_area = summary.biggest_primary_area.max(detection.area());
        } else {
            secondary += detection.confidence;
        }
    }

    let secondary = secondary.min(1.0 - primary);
    summary.confidence = (primary + config.secondary_boost * secondary).min(1.0);
    summary
}

/// Object detector collaborator
///
/// Implementations must be deterministic for identical frames so that
/// episodes can be replayed.
pub trait Detector {
    /// Called once per episode before the first frame of `stop`
    fn begin_episode(&mut self, _stop: &Stop) {}

    /// Run detection on a frame
    fn detect(&mut self, frame: &Frame) -> Result<DetectorOutput>;
}

/// Class labels of the stop detector, indexed by class id
pub const DEFAULT_CLASS_LABELS: [&str; 5] = ["shelter", "sign", "bench", "trash_can", "route_map"];
