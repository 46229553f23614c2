//! Web Mercator unit space used by the host map engine.
//!
//! The whole world spans `[0, 1]` on both axes with `y` growing southwards.
//! `z` is expressed in the same units, which is why converting meters requires
//! the latitude-dependent scale from [`meter_in_mercator_units`].

use crate::geo::LngLat;

use super::geodesy::{circumference_at_latitude_m, earth_circumference_m};

/// Latitude where the square Web Mercator world is clipped.
pub const MAX_MERCATOR_LAT: f64 = 85.051_128_779_806_59;

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct MercatorCoordinate {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl MercatorCoordinate {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Projects `p` at `altitude_m` above the ellipsoid.
    pub fn from_lng_lat(p: LngLat, altitude_m: f64) -> Self {
        let lat = clamp_lat(p.lat());
        Self {
            x: mercator_x_from_lng(p.lng()),
            y: mercator_y_from_lat(lat),
            z: altitude_m / circumference_at_latitude_m(lat),
        }
    }

    /// Inverse projection of the planar part; `z` is ignored.
    pub fn to_lng_lat(self) -> Option<LngLat> {
        let lng = self.x * 360.0 - 180.0;
        let y2 = 180.0 - self.y * 360.0;
        let lat = 360.0 / std::f64::consts::PI * (y2 * std::f64::consts::PI / 180.0).exp().atan()
            - 90.0;
        LngLat::new(lng, lat).ok()
    }
}

pub fn mercator_x_from_lng(lng: f64) -> f64 {
    (180.0 + lng) / 360.0
}

pub fn mercator_y_from_lat(lat: f64) -> f64 {
    let lat = clamp_lat(lat);
    let s = (std::f64::consts::FRAC_PI_4 + lat * std::f64::consts::PI / 360.0)
        .tan()
        .ln();
    (180.0 - 180.0 / std::f64::consts::PI * s) / 360.0
}

/// Projected units per real-world meter at `lat_deg`.
///
/// Mercator stretches distances by `1 / cos(lat)`, so this must be computed
/// per anchor.
pub fn meter_in_mercator_units(lat_deg: f64) -> f64 {
    let lat = clamp_lat(lat_deg);
    1.0 / earth_circumference_m() / lat.to_radians().cos()
}

fn clamp_lat(lat: f64) -> f64 {
    lat.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT)
}
