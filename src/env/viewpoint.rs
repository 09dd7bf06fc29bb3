//! Deduplicated viewpoints of a confirmed target
//!
//! A viewpoint is the camera position and heading at which the target was
//! seen, rounded so that re-capturing the same panorama from the same angle
//! does not count twice. Keys are kept in insertion order so replays and
//! logs are deterministic.

use serde::{Deserialize, Serialize};

/// Decimal places kept for latitude/longitude in a viewpoint key
pub const COORD_DECIMALS: i32 = 6;

/// Decimal places kept for heading in a viewpoint key
pub const HEADING_DECIMALS: i32 = 1;

/// Rounding-based deduplication key for a viewpoint
///
/// Coordinates are stored as fixed-point integers so that equality is exact
/// and independent of float formatting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ViewpointKey {
    lat_e6: i64,
    lon_e6: i64,
    heading_e1: i64,
}

impl ViewpointKey {
    /// Build the key for a pose
    pub fn new(lat: f64, lon: f64, heading: f64) -> Self {
        Self {
            lat_e6: round_scaled(lat, COORD_DECIMALS),
            lon_e6: round_scaled(lon, COORD_DECIMALS),
            heading_e1: round_scaled(heading, HEADING_DECIMALS),
        }
    }

    /// Rounded latitude
    pub fn lat(&self) -> f64 {
        self.lat_e6 as f64 / 10f64.powi(COORD_DECIMALS)
    }

    /// Rounded longitude
    pub fn lon(&self) -> f64 {
        self.lon_e6 as f64 / 10f64.powi(COORD_DECIMALS)
    }

    /// Rounded heading
    pub fn heading(&self) -> f64 {
        self.heading_e1 as f64 / 10f64.powi(HEADING_DECIMALS)
    }
}

// Rounds the exact binary value, not `value * 10^d`, which can land on a
// spurious tie. Formatting is correctly rounded, ties to even.
fn round_scaled(value: f64, decimals: i32) -> i64 {
    if !value.is_finite() {
        return 0;
    }
    let places = usize::try_from(decimals).unwrap_or(0);
    format!("{:.*}", places, value).replacen('.', "", 1).parse().unwrap_or(0)
}

/// Ordered set of viewpoints at which the target was confirmed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewpointSet {
    keys: Vec<ViewpointKey>,
}

impl ViewpointSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a pose; returns true only for a confirmed, previously unseen key
    ///
    /// A pose without confirmation (`found == false`) is ignored.
    pub fn observe(&mut self, lat: f64, lon: f64, heading: f64, found: bool) -> bool {
        if !found {
            return false;
        }
        let key = ViewpointKey::new(lat, lon, heading);
        if self.keys.contains(&key) {
            return false;
        }
        self.keys.push(key);
        true
    }

    /// Number of distinct viewpoints
    pub fn count(&self) -> usize {
        self.keys.len()
    }

    /// Whether no viewpoint has been recorded
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Viewpoints in the order they were first seen
    pub fn keys(&self) -> &[ViewpointKey] {
        &self.keys
    }

    /// Forget every viewpoint
    pub fn clear(&mut self) {
        self.keys.clear();
    }
}
