//! Boundary checks for numeric input coming from records and forms.

use foundation::LngLat;
use scene::{ModelAnchor, ValidationError};
use serde::Deserialize;
use serde_json::Value;

/// Reads a finite number from a JSON number or a numeric string.
pub fn number(value: &Value, field: &'static str) -> Result<f64, ValidationError> {
    let v = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_str(s),
        _ => None,
    };
    let Some(v) = v else {
        return Err(ValidationError::NotANumber {
            field,
            raw: value.to_string(),
        });
    };
    if !v.is_finite() {
        return Err(ValidationError::NonFinite { field });
    }
    Ok(v)
}

fn parse_str(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    s.parse::<f64>().ok()
}

/// Parses a text field, as typed into a form.
pub fn text_number(raw: &str, field: &'static str) -> Result<f64, ValidationError> {
    let v = parse_str(raw).ok_or_else(|| ValidationError::NotANumber {
        field,
        raw: raw.to_string(),
    })?;
    if !v.is_finite() {
        return Err(ValidationError::NonFinite { field });
    }
    Ok(v)
}

pub fn position(lng: &Value, lat: &Value) -> Result<LngLat, ValidationError> {
    let lng = number(lng, "longitude")?;
    let lat = number(lat, "latitude")?;
    Ok(LngLat::new(lng, lat)?)
}

/// Model placement form as submitted by the anchor editor.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ModelAnchorForm {
    pub asset: String,
    pub lng: String,
    pub lat: String,
    pub altitude_m: String,
    pub yaw_deg: String,
    pub scale: String,
}

impl ModelAnchorForm {
    /// Blank altitude and yaw default to zero, blank scale to one.
    pub fn parse(&self) -> Result<ModelAnchor, ValidationError> {
        let lng = text_number(&self.lng, "longitude")?;
        let lat = text_number(&self.lat, "latitude")?;
        let altitude = or_default(&self.altitude_m, "altitude", 0.0)?;
        let yaw = or_default(&self.yaw_deg, "yaw", 0.0)?;
        let scale = or_default(&self.scale, "scale", 1.0)?;
        ModelAnchor::new(
            self.asset.trim(),
            LngLat::new(lng, lat)?,
            altitude,
            yaw,
            scale,
        )
    }
}

fn or_default(raw: &str, field: &'static str, default: f64) -> Result<f64, ValidationError> {
    if raw.trim().is_empty() {
        Ok(default)
    } else {
        text_number(raw, field)
    }
}
