use foundation::math::normalize_degrees;
use foundation::{GeoError, LngLat};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error(transparent)]
    Geo(#[from] GeoError),
    #[error("{field} must be a finite number")]
    NonFinite { field: &'static str },
    #[error("{field} is not a number: {raw:?}")]
    NotANumber { field: &'static str, raw: String },
    #[error("scale must be positive, got {0}")]
    NonPositiveScale(f64),
    #[error("asset path must not be empty")]
    EmptyAssetPath,
}

/// Placement of a 3D asset at a site's real-world position.
///
/// Constructed only through [`ModelAnchor::new`], so render paths can rely on
/// finite values, `scale > 0` and `yaw_deg` in `[0, 360)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ModelAnchorRecord", into = "ModelAnchorRecord")]
pub struct ModelAnchor {
    asset: String,
    anchor: LngLat,
    altitude_m: f64,
    yaw_deg: f64,
    scale: f64,
}

impl ModelAnchor {
    pub fn new(
        asset: impl Into<String>,
        anchor: LngLat,
        altitude_m: f64,
        yaw_deg: f64,
        scale: f64,
    ) -> Result<Self, ValidationError> {
        let asset = asset.into();
        if asset.trim().is_empty() {
            return Err(ValidationError::EmptyAssetPath);
        }
        if !altitude_m.is_finite() {
            return Err(ValidationError::NonFinite { field: "altitude" });
        }
        if !yaw_deg.is_finite() {
            return Err(ValidationError::NonFinite { field: "yaw" });
        }
        if !scale.is_finite() {
            return Err(ValidationError::NonFinite { field: "scale" });
        }
        if scale <= 0.0 {
            return Err(ValidationError::NonPositiveScale(scale));
        }
        Ok(Self {
            asset,
            anchor,
            altitude_m,
            yaw_deg: normalize_degrees(yaw_deg),
            scale,
        })
    }

    pub fn asset(&self) -> &str {
        &self.asset
    }

    pub fn anchor(&self) -> LngLat {
        self.anchor
    }

    pub fn altitude_m(&self) -> f64 {
        self.altitude_m
    }

    /// Configured yaw, already wrapped to `[0, 360)`.
    pub fn yaw_deg(&self) -> f64 {
        self.yaw_deg
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }
}

/// Wire shape of a model anchor as stored by the data store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelAnchorRecord {
    pub asset: String,
    pub lng: f64,
    pub lat: f64,
    #[serde(default)]
    pub altitude_m: f64,
    #[serde(default)]
    pub yaw_deg: f64,
    #[serde(default = "default_scale")]
    pub scale: f64,
}

fn default_scale() -> f64 {
    1.0
}

impl TryFrom<ModelAnchorRecord> for ModelAnchor {
    type Error = ValidationError;

    fn try_from(r: ModelAnchorRecord) -> Result<Self, Self::Error> {
        let anchor = LngLat::new(r.lng, r.lat)?;
        ModelAnchor::new(r.asset, anchor, r.altitude_m, r.yaw_deg, r.scale)
    }
}

impl From<ModelAnchor> for ModelAnchorRecord {
    fn from(m: ModelAnchor) -> Self {
        Self {
            asset: m.asset,
            lng: m.anchor.lng(),
            lat: m.anchor.lat(),
            altitude_m: m.altitude_m,
            yaw_deg: m.yaw_deg,
            scale: m.scale,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ModelAnchor, ValidationError};
    use foundation::LngLat;

    fn here() -> LngLat {
        LngLat::new(100.5, 13.7).unwrap()
    }

    #[test]
    fn yaw_is_normalized_on_construction() {
        let m = ModelAnchor::new("models/a.glb", here(), 0.0, 370.0, 1.0).unwrap();
        assert_eq!(m.yaw_deg(), 10.0);
        let m = ModelAnchor::new("models/a.glb", here(), 0.0, -90.0, 1.0).unwrap();
        assert_eq!(m.yaw_deg(), 270.0);
    }

    #[test]
    fn rejects_invalid_numbers() {
        assert_eq!(
            ModelAnchor::new("a.glb", here(), 0.0, 0.0, 0.0).unwrap_err(),
            ValidationError::NonPositiveScale(0.0)
        );
        assert_eq!(
            ModelAnchor::new("a.glb", here(), f64::NAN, 0.0, 1.0).unwrap_err(),
            ValidationError::NonFinite { field: "altitude" }
        );
        assert_eq!(
            ModelAnchor::new("a.glb", here(), 0.0, 0.0, f64::INFINITY).unwrap_err(),
            ValidationError::NonFinite { field: "scale" }
        );
        assert_eq!(
            ModelAnchor::new("  ", here(), 0.0, 0.0, 1.0).unwrap_err(),
            ValidationError::EmptyAssetPath
        );
    }

    #[test]
    fn record_deserialization_validates() {
        let ok: ModelAnchor = serde_json::from_str(
            r#"{"asset":"m.glb","lng":100.5,"lat":13.7,"altitudeM":2.0,"yawDeg":45.0,"scale":1.5}"#,
        )
        .unwrap();
        assert_eq!(ok.scale(), 1.5);
        assert_eq!(ok.altitude_m(), 2.0);

        let bad = serde_json::from_str::<ModelAnchor>(r#"{"asset":"m.glb","lng":100.5,"lat":13.7,"scale":-1}"#);
        assert!(bad.is_err());
    }
}
