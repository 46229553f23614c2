/// WGS84 semi-major axis (meters).
pub const WGS84_A: f64 = 6_378_137.0;
/// WGS84 flattening.
pub const WGS84_F: f64 = 1.0 / 298.257_223_563;

/// Mean Earth radius (meters) used by the map engine's Mercator unit space.
pub const EARTH_MEAN_RADIUS_M: f64 = 6_371_008.8;

/// Equatorial circumference of the sphere the projection is built on.
pub fn earth_circumference_m() -> f64 {
    2.0 * std::f64::consts::PI * EARTH_MEAN_RADIUS_M
}

/// Length of the parallel at `lat_deg`.
pub fn circumference_at_latitude_m(lat_deg: f64) -> f64 {
    earth_circumference_m() * lat_deg.to_radians().cos()
}
