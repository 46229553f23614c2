use serde::{Deserialize, Serialize};

/// Rejected geographic input.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum GeoError {
    #[error("latitude must be finite, got {0}")]
    NonFiniteLatitude(f64),
    #[error("longitude must be finite, got {0}")]
    NonFiniteLongitude(f64),
    #[error("latitude {0} outside [-90, 90]")]
    LatitudeOutOfRange(f64),
    #[error("longitude {0} outside [-180, 180]")]
    LongitudeOutOfRange(f64),
}

/// WGS84 position in degrees.
///
/// Field order follows the map engine convention (`[lng, lat]`), which is also
/// the serialized array order.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "[f64; 2]", try_from = "[f64; 2]")]
pub struct LngLat {
    lng: f64,
    lat: f64,
}

impl LngLat {
    /// Validating constructor. Every `LngLat` in the data model went through here.
    pub fn new(lng: f64, lat: f64) -> Result<Self, GeoError> {
        if !lat.is_finite() {
            return Err(GeoError::NonFiniteLatitude(lat));
        }
        if !lng.is_finite() {
            return Err(GeoError::NonFiniteLongitude(lng));
        }
        if !(-90.0..=90.0).contains(&lat) {
            return Err(GeoError::LatitudeOutOfRange(lat));
        }
        if !(-180.0..=180.0).contains(&lng) {
            return Err(GeoError::LongitudeOutOfRange(lng));
        }
        Ok(Self { lng, lat })
    }

    pub fn lng(&self) -> f64 {
        self.lng
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }

    pub fn to_array(self) -> [f64; 2] {
        [self.lng, self.lat]
    }
}

impl From<LngLat> for [f64; 2] {
    fn from(p: LngLat) -> Self {
        p.to_array()
    }
}

impl TryFrom<[f64; 2]> for LngLat {
    type Error = GeoError;

    fn try_from([lng, lat]: [f64; 2]) -> Result<Self, Self::Error> {
        Self::new(lng, lat)
    }
}

/// Camera target supplied from outside the engine (query string, click, etc).
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraTarget {
    pub center: LngLat,
    pub zoom: f64,
}

impl CameraTarget {
    pub fn new(center: LngLat, zoom: f64) -> Self {
        Self { center, zoom }
    }
}
