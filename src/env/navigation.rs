//! Navigation collaborator contract
//!
//! A [`Navigator`] owns the camera: it jumps to a stop's start panorama,
//! rotates, walks between panoramas and reports the frame it ends up on.
//! Walking asks the imagery service for the panorama a few meters ahead;
//! when that is still the current panorama the distance grows, bounded by
//! a [`RetryPolicy`].

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::{
    action::Action,
    types::{Frame, Pose, Stop},
};

/// What a navigation request produced
#[derive(Debug, Clone, PartialEq)]
pub enum NavOutcome {
    /// The camera now shows this frame
    Moved(Frame),
    /// No imagery where the request would have taken the camera; the camera
    /// did not move
    NoImagery,
}

impl NavOutcome {
    /// The captured frame, if any
    pub fn frame(&self) -> Option<&Frame> {
        match self {
            NavOutcome::Moved(frame) => Some(frame),
            NavOutcome::NoImagery => None,
        }
    }
}

/// Camera control over a street-level imagery service
pub trait Navigator {
    /// Jump to the start panorama of `stop` and make it the episode's start
    /// pose
    fn goto_stop(&mut self, stop: &Stop) -> Result<NavOutcome>;

    /// Apply a camera action
    ///
    /// [`Action::Finish`] never moves the camera; implementations return the
    /// current frame for it.
    fn apply(&mut self, action: Action) -> Result<NavOutcome>;

    /// Frame the camera currently shows
    fn current(&self) -> Option<&Frame>;
}

/// Bound on the "walk until the panorama changes" loop
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Probes before giving up
    pub max_attempts: usize,
    /// Meters added to the walking distance after each probe
    pub growth_m: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            growth_m: 3.0,
        }
    }
}

impl RetryPolicy {
    /// Create a retry policy
    pub fn new(max_attempts: usize, growth_m: f64) -> Self {
        Self {
            max_attempts,
            growth_m,
        }
    }

    /// Distance of the probe with index `attempt`
    pub fn distance(&self, base_m: f64, attempt: usize) -> f64 {
        base_m + attempt as f64 * self.growth_m
    }

    /// Walk away from the current panorama
    ///
    /// `probe(distance)` asks the imagery service for the panorama at that
    /// distance along the walking direction and returns its pose, or `None`
    /// when there is no coverage there. The first probe whose panorama
    /// differs from `current_pano` wins. Returns `None` when every attempt
    /// landed on the current panorama or outside coverage.
    pub fn advance<F>(
        &self,
        base_m: f64,
        current_pano: Option<&str>,
        mut probe: F,
    ) -> Result<Option<Pose>>
    where
        F: FnMut(f64) -> Result<Option<Pose>>,
    {
        for attempt in 0..self.max_attempts {
            let distance = self.distance(base_m, attempt);
            if let Some(pose) = probe(distance)? {
                if pose.pano_id.is_none() || pose.pano_id.as_deref() != current_pano {
                    return Ok(Some(pose));
                }
            }
        }
        Ok(None)
    }
}
