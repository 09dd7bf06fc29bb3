//! Records exchanged between the engine and its collaborators

use serde::{Deserialize, Serialize};

/// A transit stop the agent searches for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    /// Recorded latitude of the stop
    pub latitude: f64,
    /// Recorded longitude of the stop
    pub longitude: f64,
    /// Display name
    pub name: String,
    /// Whether prior evidence confirms the stop exists
    pub is_known_positive: bool,
    /// Heading to start the camera at, if known
    pub initial_heading: Option<f64>,
}

impl Stop {
    /// Create a stop without an initial heading
    pub fn new(
        latitude: f64,
        longitude: f64,
        name: impl Into<String>,
        is_known_positive: bool,
    ) -> Self {
        Self {
            latitude,
            longitude,
            name: name.into(),
            is_known_positive,
            initial_heading: None,
        }
    }

    /// Set the heading the camera starts at
    pub fn with_heading(mut self, heading: f64) -> Self {
        self.initial_heading = Some(heading);
        self
    }

    /// Coordinates formatted as `lat,lon`
    pub fn coords(&self) -> String {
        format!("{},{}", self.latitude, self.longitude)
    }
}

/// Camera pose snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// Latitude in degrees
    pub lat: f64,
    /// Longitude in degrees
    pub lon: f64,
    /// Compass heading in degrees, [0, 360)
    pub heading: f64,
    /// Zoom level, if the imagery service reports one
    pub zoom: Option<u32>,
    /// Panorama identifier, if known
    pub pano_id: Option<String>,
}

impl Pose {
    /// Create a pose without zoom or panorama information
    pub fn new(lat: f64, lon: f64, heading: f64) -> Self {
        Self {
            lat,
            lon,
            heading,
            zoom: None,
            pano_id: None,
        }
    }

    /// Attach a panorama identifier
    pub fn with_pano(mut self, pano_id: impl Into<String>) -> Self {
        self.pano_id = Some(pano_id.into());
        self
    }
}

/// Encoded image bytes as delivered by the imagery service
pub type ImageBytes = Vec<u8>;

/// One captured camera frame
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Pose the frame was captured at
    pub pose: Pose,
    /// Encoded image
    pub image: ImageBytes,
}

impl Frame {
    /// Create a frame
    pub fn new(pose: Pose, image: ImageBytes) -> Self {
        Self { pose, image }
    }
}
