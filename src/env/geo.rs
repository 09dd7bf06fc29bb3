//! Spherical geometry helpers
//!
//! Pure functions over WGS84 latitude/longitude in degrees. Inputs are
//! expected to satisfy |lat| <= 90; out-of-range input yields a meaningless
//! (possibly NaN) result but never panics.

use std::f64::consts::PI;

/// Mean Earth radius used for great-circle distances (meters)
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Equatorial radius used by the local flat-earth movement model (meters)
pub const EQUATORIAL_RADIUS_M: f64 = 6_378_137.0;

/// Great-circle distance between two coordinates in meters (haversine)
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    EARTH_RADIUS_M * 2.0 * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Initial bearing from one coordinate to another, degrees in [0, 360)
pub fn bearing(from_lat: f64, from_lon: f64, to_lat: f64, to_lon: f64) -> f64 {
    let dlon = (to_lon - from_lon).to_radians();
    let from_lat = from_lat.to_radians();
    let to_lat = to_lat.to_radians();

    let x = dlon.sin() * to_lat.cos();
    let y = from_lat.cos() * to_lat.sin() - from_lat.sin() * to_lat.cos() * dlon.cos();

    let deg = (x.atan2(y).to_degrees() + 360.0) % 360.0;
    // -0.0 and values rounding up to exactly 360 both belong at 0
    if deg >= 360.0 || deg == 0.0 {
        0.0
    } else {
        deg
    }
}

/// Shortest signed angular difference for an angle in degrees, in radians
///
/// Computed as `atan2(sin(x), cos(x))`, so headings on either side of the
/// 0/360 seam map to nearby values. The result lies in (-π, π].
pub fn normalize_angle(degrees: f64) -> f64 {
    let rad = degrees.to_radians();
    let wrapped = rad.sin().atan2(rad.cos());
    if wrapped <= -PI {
        wrapped + 2.0 * PI
    } else {
        wrapped
    }
}

/// [`normalize_angle`] expressed in degrees, in (-180, 180]
pub fn normalize_angle_deg(degrees: f64) -> f64 {
    normalize_angle(degrees).to_degrees()
}

/// Wrap a compass heading into [0, 360)
pub fn wrap_heading(degrees: f64) -> f64 {
    let wrapped = degrees.rem_euclid(360.0);
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Move `distance_m` meters from a coordinate along a compass heading
///
/// Uses a local flat-earth approximation, accurate for the few-meter hops a
/// street-level camera makes between panoramas.
pub fn offset_position(lat: f64, lon: f64, heading_deg: f64, distance_m: f64) -> (f64, f64) {
    let heading = heading_deg.to_radians();
    let angular = distance_m / EQUATORIAL_RADIUS_M;
    let new_lat = lat + angular * heading.cos() * (180.0 / PI);
    let new_lon = lon + angular * heading.sin() * (180.0 / PI) / lat.to_radians().cos();
    (new_lat, new_lon)
}
