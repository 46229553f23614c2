use serde::Serialize;
use serde_json::{Map, Value, json};

pub const SITES_SOURCE: &str = "sites";
pub const CLUSTER_LAYER: &str = "clusters";
pub const CLUSTER_COUNT_LAYER: &str = "cluster-count";
pub const POINT_LAYER: &str = "unclustered-point";
pub const HALO_LAYER: &str = "highlight-halo";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerKind {
    Circle,
    Symbol,
    Raster,
}

/// Style-layer description in the host engine's JSON style format.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerSpec {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: LayerKind,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<Value>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub paint: Map<String, Value>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub layout: Map<String, Value>,
}

impl LayerSpec {
    pub fn new(id: impl Into<String>, kind: LayerKind, source: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            source: source.into(),
            filter: None,
            paint: Map::new(),
            layout: Map::new(),
        }
    }

    pub fn with_filter(mut self, filter: Value) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn paint(mut self, name: &str, value: Value) -> Self {
        self.paint.insert(name.to_string(), value);
        self
    }

    pub fn layout(mut self, name: &str, value: Value) -> Self {
        self.layout.insert(name.to_string(), value);
        self
    }

    pub fn with_visibility(self, visible: bool) -> Self {
        self.layout("visibility", visibility_value(visible))
    }

    /// Layers without an explicit `visibility` are visible.
    pub fn is_visible(&self) -> bool {
        self.layout.get("visibility") != Some(&visibility_value(false))
    }
}

pub fn visibility_value(visible: bool) -> Value {
    json!(if visible { "visible" } else { "none" })
}

/// Filter matching features whose `id` property equals `id`; an empty id matches nothing.
pub fn id_filter(id: &str) -> Value {
    json!(["==", ["get", "id"], id])
}

#[cfg(test)]
mod tests {
    use super::{LayerKind, LayerSpec, id_filter};
    use serde_json::json;

    #[test]
    fn serializes_to_style_json() {
        let spec = LayerSpec::new("halo", LayerKind::Circle, "sites")
            .with_filter(id_filter(""))
            .paint("circle-radius", json!(12));
        let v = serde_json::to_value(&spec).unwrap();
        assert_eq!(v["type"], "circle");
        assert_eq!(v["filter"], json!(["==", ["get", "id"], ""]));
        assert!(v.get("layout").is_none());
    }

    #[test]
    fn visibility_defaults_to_visible() {
        let spec = LayerSpec::new("a", LayerKind::Raster, "s");
        assert!(spec.is_visible());
        assert!(!spec.with_visibility(false).is_visible());
    }
}
