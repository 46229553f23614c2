use catalog::StorageConfig;
use foundation::{CameraTarget, LngLat};
use gpu::{DEFAULT_ADVISORY_MEMORY_GB, RotationConfig};
use layers::{CameraPolicy, ClusterStyle};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{field}: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("query parameter {param}: {reason}")]
    Query { param: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    pub default_opacity: f64,
    /// Whether selecting a site shows its overlay right away.
    pub visible_on_select: bool,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            default_opacity: 0.8,
            visible_on_select: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub filter_debounce_ms: f64,
    /// Length of the detail panel's open/close transition.
    pub panel_resize_delay_ms: f64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            filter_debounce_ms: 300.0,
            panel_resize_delay_ms: 350.0,
        }
    }
}

fn default_advisory_memory_gb() -> f64 {
    DEFAULT_ADVISORY_MEMORY_GB
}

fn default_model_cache_mb() -> usize {
    256
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewerConfig {
    #[serde(default)]
    pub cluster: ClusterStyle,
    #[serde(default)]
    pub camera: CameraPolicy,
    #[serde(default)]
    pub overlay: OverlayConfig,
    #[serde(default)]
    pub rotation: RotationConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default = "default_advisory_memory_gb")]
    pub advisory_memory_gb: f64,
    #[serde(default = "default_model_cache_mb")]
    pub model_cache_mb: usize,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            cluster: ClusterStyle::default(),
            camera: CameraPolicy::default(),
            overlay: OverlayConfig::default(),
            rotation: RotationConfig::default(),
            storage: StorageConfig::default(),
            timing: TimingConfig::default(),
            advisory_memory_gb: default_advisory_memory_gb(),
            model_cache_mb: default_model_cache_mb(),
        }
    }
}

impl ViewerConfig {
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let cfg: ViewerConfig = serde_json::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let o = self.overlay.default_opacity;
        if !(o.is_finite() && (0.0..=1.0).contains(&o)) {
            return Err(ConfigError::Invalid {
                field: "overlay.default_opacity",
                reason: format!("{o} is outside [0, 1]"),
            });
        }
        let r = self.rotation.degrees_per_px;
        if !r.is_finite() || r == 0.0 {
            return Err(ConfigError::Invalid {
                field: "rotation.degrees_per_px",
                reason: format!("{r} would make dragging a no-op"),
            });
        }
        for (field, v) in [
            ("timing.filter_debounce_ms", self.timing.filter_debounce_ms),
            ("timing.panel_resize_delay_ms", self.timing.panel_resize_delay_ms),
        ] {
            if !v.is_finite() || v < 0.0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: format!("{v} is not a duration"),
                });
            }
        }
        Ok(())
    }

    pub fn model_cache_bytes(&self) -> usize {
        self.model_cache_mb.saturating_mul(1024 * 1024)
    }
}

/// Zoom used when the page supplies a position but no zoom.
pub const DEFAULT_QUERY_ZOOM: f64 = 14.0;
pub const MAX_ZOOM: f64 = 24.0;

/// Camera target supplied by the host page (`?lat=..&lng=..&zoom=..`).
pub struct InitialCamera;

impl InitialCamera {
    /// Parses a URL query string. Returns `Ok(None)` when no position is given.
    pub fn from_query(query: &str) -> Result<Option<CameraTarget>, ConfigError> {
        let (mut lat, mut lng, mut zoom) = (None, None, None);
        for pair in query.trim_start_matches('?').split('&') {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            match key {
                "lat" => lat = Some(parse_param("lat", value)?),
                "lng" | "lon" => lng = Some(parse_param("lng", value)?),
                "zoom" => zoom = Some(parse_param("zoom", value)?),
                _ => {}
            }
        }
        let (lat, lng) = match (lat, lng) {
            (None, None) => return Ok(None),
            (Some(lat), Some(lng)) => (lat, lng),
            (None, Some(_)) => {
                return Err(ConfigError::Query {
                    param: "lat",
                    reason: "missing while lng is set".into(),
                });
            }
            (Some(_), None) => {
                return Err(ConfigError::Query {
                    param: "lng",
                    reason: "missing while lat is set".into(),
                });
            }
        };
        let center = LngLat::new(lng, lat).map_err(|e| ConfigError::Query {
            param: "lat/lng",
            reason: e.to_string(),
        })?;
        let zoom = zoom.unwrap_or(DEFAULT_QUERY_ZOOM);
        if !(0.0..=MAX_ZOOM).contains(&zoom) {
            return Err(ConfigError::Query {
                param: "zoom",
                reason: format!("{zoom} is outside [0, {MAX_ZOOM}]"),
            });
        }
        Ok(Some(CameraTarget::new(center, zoom)))
    }
}

fn parse_param(param: &'static str, raw: &str) -> Result<f64, ConfigError> {
    let v: f64 = raw.trim().parse().map_err(|_| ConfigError::Query {
        param,
        reason: format!("{raw:?} is not a number"),
    })?;
    if !v.is_finite() {
        return Err(ConfigError::Query {
            param,
            reason: "must be finite".into(),
        });
    }
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, DEFAULT_QUERY_ZOOM, InitialCamera, ViewerConfig};
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_document_takes_defaults() {
        let cfg = ViewerConfig::from_json_str("{}").unwrap();
        assert_eq!(cfg, ViewerConfig::default());
        assert_eq!(cfg.cluster.cluster_radius_px, 50);
        assert_eq!(cfg.overlay.default_opacity, 0.8);
        assert_eq!(cfg.timing.filter_debounce_ms, 300.0);
        assert_eq!(cfg.rotation.degrees_per_px, 0.5);
        assert_eq!(cfg.advisory_memory_gb, 4.0);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = ViewerConfig::from_json_str(
            r#"{ "overlay": { "default_opacity": 0.5 }, "timing": { "panel_resize_delay_ms": 200 } }"#,
        )
        .unwrap();
        assert_eq!(cfg.overlay.default_opacity, 0.5);
        assert!(!cfg.overlay.visible_on_select);
        assert_eq!(cfg.timing.panel_resize_delay_ms, 200.0);
        assert_eq!(cfg.timing.filter_debounce_ms, 300.0);
    }

    #[test]
    fn rejects_out_of_range_values() {
        let err = ViewerConfig::from_json_str(r#"{ "overlay": { "default_opacity": 3 } }"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "overlay.default_opacity", .. }));
        assert!(ViewerConfig::from_json_str("[").is_err());
    }

    #[test]
    fn query_camera() {
        let t = InitialCamera::from_query("?lat=13.75&lng=100.5&zoom=9")
            .unwrap()
            .unwrap();
        assert_eq!(t.center.to_array(), [100.5, 13.75]);
        assert_eq!(t.zoom, 9.0);

        let t = InitialCamera::from_query("lng=100.5&lat=13.75&tab=map")
            .unwrap()
            .unwrap();
        assert_eq!(t.zoom, DEFAULT_QUERY_ZOOM);

        assert!(InitialCamera::from_query("").unwrap().is_none());
        assert!(InitialCamera::from_query("?tab=list").unwrap().is_none());
    }

    #[test]
    fn query_rejects_bad_values() {
        assert!(InitialCamera::from_query("lat=95&lng=0").is_err());
        assert!(InitialCamera::from_query("lat=abc&lng=0").is_err());
        assert!(InitialCamera::from_query("lat=NaN&lng=0").is_err());
        assert!(InitialCamera::from_query("lat=1").is_err());
        assert!(InitialCamera::from_query("lat=1&lng=2&zoom=99").is_err());
    }
}
