use std::collections::HashMap;
use std::fmt;

use foundation::{ClientId, LngLat, SiteId};
use serde::{Deserialize, Serialize};

use crate::model::ModelAnchor;
use crate::overlay::OverlayAsset;

/// Discrete category tag driving point color and the category filter.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Category(String);

impl Category {
    pub fn new(tag: impl Into<String>) -> Self {
        Category(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SiteStatus {
    Active,
    Hidden,
}

/// A geolocated entity as read from the data store snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub id: SiteId,
    pub name: String,
    pub position: LngLat,
    pub category: Category,
    pub province: String,
    pub year: i32,
    #[serde(default)]
    pub client_id: Option<ClientId>,
    #[serde(default)]
    pub status: Option<SiteStatus>,
    #[serde(default)]
    pub overlay: Option<OverlayAsset>,
    #[serde(default)]
    pub model: Option<ModelAnchor>,
}

impl Site {
    /// An active site without client, overlay or model.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        position: LngLat,
        category: impl Into<String>,
        province: impl Into<String>,
        year: i32,
    ) -> Self {
        Self {
            id: SiteId::new(id),
            name: name.into(),
            position,
            category: Category::new(category),
            province: province.into(),
            year,
            client_id: None,
            status: Some(SiteStatus::Active),
            overlay: None,
            model: None,
        }
    }

    pub fn with_client(mut self, client: impl Into<String>) -> Self {
        self.client_id = Some(ClientId::new(client));
        self
    }

    pub fn with_status(mut self, status: Option<SiteStatus>) -> Self {
        self.status = status;
        self
    }

    pub fn with_overlay(mut self, overlay: OverlayAsset) -> Self {
        self.overlay = Some(overlay);
        self
    }

    pub fn with_model(mut self, model: ModelAnchor) -> Self {
        self.model = Some(model);
        self
    }

    /// Only explicitly active sites reach the public map.
    pub fn is_active(&self) -> bool {
        self.status == Some(SiteStatus::Active)
    }

    /// The overlay if it is fully calibrated.
    pub fn calibrated_overlay(&self) -> Option<&OverlayAsset> {
        self.overlay.as_ref().filter(|o| o.is_complete())
    }
}

/// Id lookup over a site snapshot. Rebuilt whenever the snapshot is replaced.
#[derive(Debug, Default, Clone)]
pub struct SiteIndex {
    sites: Vec<Site>,
    by_id: HashMap<SiteId, usize>,
}

impl SiteIndex {
    pub fn new(sites: Vec<Site>) -> Self {
        let mut by_id = HashMap::with_capacity(sites.len());
        for (i, site) in sites.iter().enumerate() {
            // Later duplicates win, matching snapshot replacement semantics.
            by_id.insert(site.id.clone(), i);
        }
        Self { sites, by_id }
    }

    pub fn get(&self, id: &SiteId) -> Option<&Site> {
        self.by_id.get(id).and_then(|&i| self.sites.get(i))
    }

    pub fn sites(&self) -> &[Site] {
        &self.sites
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{Site, SiteIndex, SiteStatus};
    use foundation::{LngLat, SiteId};

    fn site(id: &str) -> Site {
        Site::new(id, id, LngLat::new(100.0, 14.0).unwrap(), "solar", "Bangkok", 2020)
    }

    #[test]
    fn only_explicit_active_status_is_active() {
        assert!(site("a").is_active());
        assert!(!site("a").with_status(Some(SiteStatus::Hidden)).is_active());
        assert!(!site("a").with_status(None).is_active());
    }

    #[test]
    fn index_resolves_by_id() {
        let index = SiteIndex::new(vec![site("a"), site("b")]);
        assert_eq!(index.len(), 2);
        assert_eq!(index.get(&SiteId::new("b")).map(|s| s.name.as_str()), Some("b"));
        assert!(index.get(&SiteId::new("zz")).is_none());
    }

    #[test]
    fn deserializes_store_shape() {
        let raw = r#"{
            "id": "s1", "name": "Plant", "position": [100.5, 13.7],
            "category": "solar", "province": "Bangkok", "year": 2021,
            "client_id": "c9", "status": "hidden"
        }"#;
        let s: Site = serde_json::from_str(raw).unwrap();
        assert_eq!(s.status, Some(SiteStatus::Hidden));
        assert_eq!(s.client_id.as_ref().map(|c| c.as_str()), Some("c9"));
        assert!(s.overlay.is_none());
    }
}
