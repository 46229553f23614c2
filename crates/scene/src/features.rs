use foundation::{ClientId, GeoBounds, LngLat, SiteId};
use serde_json::{Value, json};

use crate::filter::FilterPredicate;
use crate::site::{Category, Site};

/// Attributes carried on each point so hit-testing and styling never need
/// anything but the id to get back to the full site.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureProperties {
    pub category: Category,
    pub province: String,
    pub year: i32,
    pub client_id: Option<ClientId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub id: SiteId,
    pub position: LngLat,
    pub properties: FeatureProperties,
}

impl Feature {
    fn from_site(site: &Site) -> Self {
        Self {
            id: site.id.clone(),
            position: site.position,
            properties: FeatureProperties {
                category: site.category.clone(),
                province: site.province.clone(),
                year: site.year,
                client_id: site.client_id.clone(),
            },
        }
    }

    pub fn to_geojson(&self) -> Value {
        json!({
            "type": "Feature",
            "id": self.id.as_str(),
            "geometry": {
                "type": "Point",
                "coordinates": self.position.to_array(),
            },
            "properties": {
                "id": self.id.as_str(),
                "category": self.properties.category.as_str(),
                "province": self.properties.province,
                "year": self.properties.year,
                "client_id": self.properties.client_id.as_ref().map(|c| c.as_str()),
            },
        })
    }
}

/// Point set handed to the map's clustered source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn contains(&self, id: &SiteId) -> bool {
        self.features.iter().any(|f| &f.id == id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &SiteId> + '_ {
        self.features.iter().map(|f| &f.id)
    }

    pub fn bounds(&self) -> Option<GeoBounds> {
        GeoBounds::from_points(self.features.iter().map(|f| f.position))
    }

    pub fn to_geojson(&self) -> Value {
        let mut out = json!({
            "type": "FeatureCollection",
            "features": self.features.iter().map(Feature::to_geojson).collect::<Vec<_>>(),
        });
        if let Some(b) = self.bounds() {
            out["bbox"] = json!(b.to_bbox());
        }
        out
    }
}

/// Builds the map's point set: active sites passing `predicate`, in input order.
pub fn build_features(sites: &[Site], predicate: &FilterPredicate) -> FeatureCollection {
    let features = sites
        .iter()
        .filter(|s| s.is_active() && predicate.matches(s))
        .map(Feature::from_site)
        .collect();
    FeatureCollection { features }
}
