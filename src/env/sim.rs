//! Offline stand-ins for the imagery service and the detector
//!
//! [`SimNavigator`] reproduces the street-level movement model without any
//! network access: panoramas sit on a square grid around the stop, walking
//! probes a few meters ahead until it reaches another panorama, and
//! everything beyond the coverage radius has no imagery. [`SyntheticDetector`]
//! "sees" a known-positive stop whenever it lies close enough in front of the
//! camera. [`ScriptedDetector`] replays fixed outputs for tests.

use std::{
    collections::{HashSet, VecDeque},
    f64::consts::PI,
};

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use super::{
    action::Action,
    config::EngineConfig,
    detector::{BoxDetection, Detector, DetectorOutput, DEFAULT_CLASS_LABELS},
    geo::{
        bearing, haversine_distance, normalize_angle_deg, offset_position, wrap_heading,
        EQUATORIAL_RADIUS_M,
    },
    navigation::{NavOutcome, Navigator, RetryPolicy},
    types::{Frame, Pose, Stop},
};

/// Movement model parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Degrees turned per rotate action
    pub rotate_deg: f64,
    /// First probe distance of a walk (meters)
    pub step_m: f64,
    /// Distance between neighbouring panoramas (meters)
    pub pano_spacing_m: f64,
    /// Imagery exists within this distance of the stop (meters)
    pub coverage_radius_m: f64,
    /// How far south of the stop the start panorama is looked up (meters)
    pub start_offset_m: f64,
    /// Highest zoom level
    pub max_zoom: u32,
    /// Bound on the walk loop
    pub retry: RetryPolicy,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            rotate_deg: 45.0,
            step_m: 3.0,
            pano_spacing_m: 10.0,
            coverage_radius_m: 80.0,
            start_offset_m: 12.0,
            max_zoom: 3,
            retry: RetryPolicy::default(),
        }
    }
}

/// Grid-of-panoramas navigator
#[derive(Debug, Clone, Default)]
pub struct SimNavigator {
    config: SimConfig,
    unavailable: HashSet<String>,
    center: Option<(f64, f64)>,
    start: Option<Frame>,
    current: Option<Frame>,
}

impl SimNavigator {
    /// Create a navigator
    pub fn new(config: SimConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Stops (by name) for which the service has no imagery at all
    pub fn with_unavailable<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unavailable.extend(names.into_iter().map(Into::into));
        self
    }

    /// Movement model parameters
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Start frame of the current stop
    pub fn start(&self) -> Option<&Frame> {
        self.start.as_ref()
    }

    // Panorama covering a coordinate, or None outside coverage
    fn snap(&self, lat: f64, lon: f64, heading: f64) -> Option<Pose> {
        let (center_lat, center_lon) = self.center?;
        if haversine_distance(center_lat, center_lon, lat, lon) > self.config.coverage_radius_m {
            return None;
        }

        let m_per_deg_lat = EQUATORIAL_RADIUS_M * PI / 180.0;
        let m_per_deg_lon = m_per_deg_lat * center_lat.to_radians().cos();
        let spacing = self.config.pano_spacing_m;

        let row = ((lat - center_lat) * m_per_deg_lat / spacing).round() as i64;
        let col = ((lon - center_lon) * m_per_deg_lon / spacing).round() as i64;

        let pano_lat = center_lat + row as f64 * spacing / m_per_deg_lat;
        let pano_lon = center_lon + col as f64 * spacing / m_per_deg_lon;
        let pano_id = format!("sim_{}_{}", row, col);
        Some(Pose::new(pano_lat, pano_lon, heading).with_pano(pano_id))
    }

    fn render(pose: Pose) -> Result<Frame> {
        let image = serde_json::to_vec(&pose)?;
        Ok(Frame::new(pose, image))
    }

    fn walk(&self, from: &Pose, direction: f64) -> Result<Option<Pose>> {
        let retry = self.config.retry;
        retry.advance(self.config.step_m, from.pano_id.as_deref(), |distance| {
            let (lat, lon) = offset_position(from.lat, from.lon, direction, distance);
            Ok(self.snap(lat, lon, from.heading))
        })
    }
}

impl Navigator for SimNavigator {
    fn goto_stop(&mut self, stop: &Stop) -> Result<NavOutcome> {
        if self.unavailable.contains(&stop.name) {
            return Ok(NavOutcome::NoImagery);
        }
        self.center = Some((stop.latitude, stop.longitude));

        let (lat, lon) = offset_position(
            stop.latitude,
            stop.longitude,
            180.0,
            self.config.start_offset_m,
        );
        let Some(mut pose) = self.snap(lat, lon, 0.0) else {
            return Ok(NavOutcome::NoImagery);
        };
        pose.heading = match stop.initial_heading {
            Some(heading) => wrap_heading(heading),
            None => bearing(pose.lat, pose.lon, stop.latitude, stop.longitude),
        };

        let frame = Self::render(pose)?;
        self.start = Some(frame.clone());
        self.current = Some(frame.clone());
        Ok(NavOutcome::Moved(frame))
    }

    fn apply(&mut self, action: Action) -> Result<NavOutcome> {
        let current = self.current.as_ref().ok_or_else(|| {
            anyhow!("navigator has no frame; goto_stop must come first")
        })?;
        let mut pose = current.pose.clone();

        match action {
            Action::Finish => return Ok(NavOutcome::Moved(current.clone())),
            Action::ResetToStart => {
                let start = self
                    .start
                    .clone()
                    .ok_or_else(|| anyhow!("navigator has no start frame"))?;
                self.current = Some(start.clone());
                return Ok(NavOutcome::Moved(start));
            }
            Action::RotateLeft => {
                pose.heading = wrap_heading(pose.heading - self.config.rotate_deg)
            }
            Action::RotateRight => {
                pose.heading = wrap_heading(pose.heading + self.config.rotate_deg)
            }
            Action::ZoomIn => {
                let zoom = pose.zoom.unwrap_or(0) + 1;
                pose.zoom = Some(zoom.min(self.config.max_zoom));
            }
            Action::Forward | Action::Backward => {
                let direction = if action == Action::Forward {
                    pose.heading
                } else {
                    pose.heading - 180.0
                };
                match self.walk(&pose, direction)? {
                    Some(next) => pose = next,
                    None => return Ok(NavOutcome::NoImagery),
                }
            }
        }

        let frame = Self::render(pose)?;
        self.current = Some(frame.clone());
        Ok(NavOutcome::Moved(frame))
    }

    fn current(&self) -> Option<&Frame> {
        self.current.as_ref()
    }
}

/// Geometry-driven detector for simulated episodes
///
/// A known-positive stop produces a sign box (plus a weaker bench box) when
/// it is within `visible_range_m` and no more than `half_fov_deg` off the
/// camera axis. Closer and more centered stops score higher; zooming in
/// enlarges the boxes. Expects the default class label set.
#[derive(Debug, Clone)]
pub struct SyntheticDetector {
    config: EngineConfig,
    stop: Option<Stop>,
    /// Farthest distance at which the stop is visible (meters)
    pub visible_range_m: f64,
    /// Half of the horizontal field of view (degrees)
    pub half_fov_deg: f64,
}

impl SyntheticDetector {
    /// Create a detector producing outputs for `config`
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            stop: None,
            visible_range_m: 40.0,
            half_fov_deg: 45.0,
        }
    }

    fn embedding(&self, pose: &Pose, confidence: f64) -> Vec<f32> {
        let seed = (pose.lat + pose.lon) * 1e4 + pose.heading.to_radians();
        (0..self.config.embedding_dim)
            .map(|i| {
                let wave = (seed + i as f64 * 0.618).sin();
                (0.5 * wave + 0.5 * confidence) as f32
            })
            .collect()
    }
}

impl Detector for SyntheticDetector {
    fn begin_episode(&mut self, stop: &Stop) {
        self.stop = Some(stop.clone());
    }

    fn detect(&mut self, frame: &Frame) -> Result<DetectorOutput> {
        let pose = &frame.pose;
        let mut boxes = Vec::new();

        if let Some(stop) = self.stop.as_ref().filter(|s| s.is_known_positive) {
            let distance = haversine_distance(pose.lat, pose.lon, stop.latitude, stop.longitude);
            let to_stop = bearing(pose.lat, pose.lon, stop.latitude, stop.longitude);
            let off_axis = normalize_angle_deg(to_stop - pose.heading);

            if distance <= self.visible_range_m && off_axis.abs() <= self.half_fov_deg {
                let closeness = 1.0 - distance / self.visible_range_m;
                let centered = 1.0 - off_axis.abs() / self.half_fov_deg;
                let zoom = f64::from(pose.zoom.unwrap_or(0));

                let confidence = (0.3 + 0.4 * closeness + 0.25 * centered).min(0.95);
                let x = 0.5 + 0.5 * off_axis / self.half_fov_deg;
                let side = ((0.04 + 0.2 * closeness) * (1.0 + 0.5 * zoom)).min(0.9);

                boxes.push(BoxDetection::new(
                    DEFAULT_CLASS_LABELS[1],
                    1,
                    (x, 0.45),
                    (side * 0.5, side),
                    confidence,
                ));
                boxes.push(BoxDetection::new(
                    DEFAULT_CLASS_LABELS[2],
                    2,
                    (x, 0.8),
                    (side, side * 0.4),
                    confidence * 0.5,
                ));
            }
        }

        let summary_conf = boxes.first().map_or(0.0, |b| b.confidence);
        let embedding = self.embedding(pose, summary_conf);
        Ok(DetectorOutput::from_boxes(boxes, embedding, &self.config))
    }
}

/// Detector replaying a fixed sequence of outputs
///
/// Once the script runs out every frame gets an empty output.
#[derive(Debug, Clone)]
pub struct ScriptedDetector {
    script: VecDeque<DetectorOutput>,
    fallback: DetectorOutput,
    frames_seen: usize,
    episodes: usize,
}

impl ScriptedDetector {
    /// Create a detector replaying `script`
    pub fn new<I>(script: I, embedding_dim: usize) -> Self
    where
        I: IntoIterator<Item = DetectorOutput>,
    {
        Self {
            script: script.into_iter().collect(),
            fallback: DetectorOutput::empty(embedding_dim),
            frames_seen: 0,
            episodes: 0,
        }
    }

    /// Frames detected so far
    pub fn frames_seen(&self) -> usize {
        self.frames_seen
    }

    /// Episodes started so far
    pub fn episodes(&self) -> usize {
        self.episodes
    }
}

impl Detector for ScriptedDetector {
    fn begin_episode(&mut self, _stop: &Stop) {
        self.episodes += 1;
    }

    fn detect(&mut self, _frame: &Frame) -> Result<DetectorOutput> {
        self.frames_seen += 1;
        let output = self.script.pop_front();
        Ok(output.unwrap_or_else(|| self.fallback.clone()))
    }
}
