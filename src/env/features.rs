//! Observation vector construction
//!
//! An observation is the concatenation, in this order, of:
//!
//! ```text
//! [ detector embedding | K box descriptors | 9 spatial/meta scalars ]
//! ```
//!
//! Each box descriptor is `[x_center, y_center, area, confidence]` followed
//! by a one-hot class block. Boxes are taken in detector order, truncated to
//! K and zero-padded when fewer are present.
//!
//! The spatial/meta segment is:
//!
//! | # | feature | value |
//! |---|---------|-------|
//! | 0 | delta_lat | pose.lat − anchor.lat |
//! | 1 | delta_lon | pose.lon − anchor.lon |
//! | 2 | dist_scaled | tanh(haversine(anchor, pose) / distance_scale_m) |
//! | 3 | heading_sin | sin(normalize_angle(pose.heading − anchor.heading)) |
//! | 4 | heading_cos | cos(normalize_angle(pose.heading − anchor.heading)) |
//! | 5 | viewpoints | min(viewpoints / viewpoint_saturation, 1) |
//! | 6 | since_found | min(steps_since_found / free_steps_after_found, 1) |
//! | 7 | presses | min(space_presses / free_spacebar_presses, 1) |
//! | 8 | zoom | 2·min(zoom / zoom_saturation, 1) − 1 |
//!
//! Viewpoint bookkeeping is not done here: the engine first asks
//! [`FeatureAssembler::primary_in_kept`] whether the frame confirms the
//! target, records the viewpoint, and only then assembles the observation
//! with the updated count.

use super::{
    config::{EngineConfig, BOX_GEOMETRY_DIM, SPATIAL_DIM},
    detector::{BoxDetection, DetectorOutput},
    geo::{haversine_distance, normalize_angle},
    reward::EpisodeCounters,
    types::Pose,
};

/// Builds fixed-length observation vectors
#[derive(Debug, Clone, Copy)]
pub struct FeatureAssembler<'a> {
    config: &'a EngineConfig,
}

impl<'a> FeatureAssembler<'a> {
    /// Create an assembler for a configuration
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    /// Whether one of the first K boxes carries a primary evidence label
    pub fn primary_in_kept(&self, detection: &DetectorOutput) -> bool {
        detection
            .boxes
            .iter()
            .take(self.config.boxes_kept)
            .any(|b| self.config.is_primary_label(&b.label))
    }

    /// Flattened descriptors of the first K boxes, zero-padded to K
    pub fn box_descriptors(&self, boxes: &[BoxDetection]) -> Vec<f32> {
        let block = BOX_GEOMETRY_DIM + self.config.num_classes;
        let mut out = vec![0.0_f32; self.config.boxes_kept * block];

        for (slot, detection) in out.chunks_exact_mut(block).zip(boxes) {
            slot[0] = detection.x_center as f32;
            slot[1] = detection.y_center as f32;
            slot[2] = detection.area() as f32;
            slot[3] = detection.confidence as f32;
            if detection.class_id < self.config.num_classes {
                slot[BOX_GEOMETRY_DIM + detection.class_id] = 1.0;
            }
        }
        out
    }

    /// Pose deltas relative to the anchor plus the episode meta-counters
    pub fn spatial_vector(
        &self,
        anchor: &Pose,
        pose: &Pose,
        counters: &EpisodeCounters,
        viewpoint_count: usize,
    ) -> [f32; SPATIAL_DIM] {
        let config = self.config;

        let delta_lat = pose.lat - anchor.lat;
        let delta_lon = pose.lon - anchor.lon;

        let dist = haversine_distance(anchor.lat, anchor.lon, pose.lat, pose.lon);
        let dist_scaled = (dist / config.distance_scale_m).tanh();

        let delta_heading = normalize_angle(pose.heading - anchor.heading);

        let viewpoints = saturate(viewpoint_count, config.viewpoint_saturation);
        let since_found = saturate(counters.steps_since_found, config.free_steps_after_found);
        let presses = saturate(counters.space_presses, config.free_spacebar_presses);
        let zoom = 2.0 * saturate(counters.zoom_amt, config.zoom_saturation) - 1.0;

        [
            delta_lat as f32,
            delta_lon as f32,
            dist_scaled as f32,
            delta_heading.sin() as f32,
            delta_heading.cos() as f32,
            viewpoints as f32,
            since_found as f32,
            presses as f32,
            zoom as f32,
        ]
    }

    /// Full observation vector of length [`EngineConfig::frame_dim`]
    pub fn assemble(
        &self,
        detection: &DetectorOutput,
        anchor: &Pose,
        pose: &Pose,
        counters: &EpisodeCounters,
        viewpoint_count: usize,
    ) -> Vec<f32> {
        let mut observation = Vec::with_capacity(self.config.frame_dim());
        observation.extend_from_slice(&detection.embedding);
        observation.extend(self.box_descriptors(&detection.boxes));
        observation.extend(self.spatial_vector(anchor, pose, counters, viewpoint_count));
        observation
    }
}

// min(count / limit, 1); limit is non-zero for a validated config
fn saturate(count: usize, limit: usize) -> f64 {
    (count as f64 / limit as f64).min(1.0)
}
