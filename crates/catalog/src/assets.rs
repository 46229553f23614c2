use serde::{Deserialize, Serialize};

/// Bucket selector for stored assets.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetClass {
    SiteImage,
    OverlayImage,
    Model,
}

/// Public object-storage location, one bucket per asset class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub base_url: String,
    pub site_image_bucket: String,
    pub overlay_bucket: String,
    pub model_bucket: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_url: "https://storage.local/storage/v1/object/public".to_string(),
            site_image_bucket: "site-images".to_string(),
            overlay_bucket: "overlays".to_string(),
            model_bucket: "models".to_string(),
        }
    }
}

impl StorageConfig {
    pub fn bucket(&self, class: AssetClass) -> &str {
        match class {
            AssetClass::SiteImage => &self.site_image_bucket,
            AssetClass::OverlayImage => &self.overlay_bucket,
            AssetClass::Model => &self.model_bucket,
        }
    }
}

fn is_absolute(path: &str) -> bool {
    let lower = path.get(..8).unwrap_or(path).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://") || path.starts_with("data:")
}

/// Turns a stored asset path into a fetchable URL.
///
/// Absolute URLs (and `data:` URIs) pass through unchanged. Returns `None` for
/// a blank path.
pub fn resolve(path: &str, class: AssetClass, config: &StorageConfig) -> Option<String> {
    let path = path.trim();
    if path.is_empty() {
        return None;
    }
    if is_absolute(path) {
        return Some(path.to_string());
    }
    let base = config.base_url.trim_end_matches('/');
    let bucket = config.bucket(class).trim_matches('/');
    let key = path.trim_start_matches('/');
    Some(format!("{base}/{bucket}/{key}"))
}
