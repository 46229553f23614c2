use std::collections::BTreeMap;

use scene::Category;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::layer::{
    CLUSTER_COUNT_LAYER, CLUSTER_LAYER, HALO_LAYER, LayerKind, LayerSpec, POINT_LAYER,
    SITES_SOURCE, id_filter,
};

/// Category to color lookup with an explicit fallback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryPalette {
    pub colors: BTreeMap<Category, String>,
    pub fallback: String,
}

impl Default for CategoryPalette {
    fn default() -> Self {
        Self {
            colors: BTreeMap::new(),
            fallback: "#64748b".to_string(),
        }
    }
}

impl CategoryPalette {
    pub fn color_for(&self, category: &Category) -> &str {
        self.colors
            .get(category)
            .map(String::as_str)
            .unwrap_or(self.fallback.as_str())
    }

    /// `match` expression over the `category` property.
    pub fn expression(&self) -> Value {
        if self.colors.is_empty() {
            return json!(self.fallback);
        }
        let mut expr = vec![json!("match"), json!(["get", "category"])];
        for (category, color) in &self.colors {
            expr.push(json!(category.as_str()));
            expr.push(json!(color));
        }
        expr.push(json!(self.fallback));
        Value::Array(expr)
    }
}

/// Cluster appearance from `min_count` upwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountStep {
    pub min_count: u32,
    pub color: String,
    pub radius: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HaloStyle {
    pub color: String,
    pub radius: f64,
    pub opacity: f64,
}

impl Default for HaloStyle {
    fn default() -> Self {
        Self {
            color: "#facc15".to_string(),
            radius: 14.0,
            opacity: 0.6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterStyle {
    pub cluster_radius_px: u32,
    pub cluster_max_zoom: u32,
    /// Sorted by `min_count`; the first step applies from zero.
    pub steps: Vec<CountStep>,
    pub count_text_size: f64,
    pub point_radius: f64,
    pub point_stroke_color: String,
    pub palette: CategoryPalette,
    pub halo: HaloStyle,
}

impl Default for ClusterStyle {
    fn default() -> Self {
        Self {
            cluster_radius_px: 50,
            cluster_max_zoom: 14,
            steps: vec![
                CountStep {
                    min_count: 0,
                    color: "#51bbd6".to_string(),
                    radius: 20.0,
                },
                CountStep {
                    min_count: 10,
                    color: "#f1f075".to_string(),
                    radius: 30.0,
                },
                CountStep {
                    min_count: 50,
                    color: "#f28cb1".to_string(),
                    radius: 40.0,
                },
            ],
            count_text_size: 12.0,
            point_radius: 6.0,
            point_stroke_color: "#ffffff".to_string(),
            palette: CategoryPalette::default(),
            halo: HaloStyle::default(),
        }
    }
}

impl ClusterStyle {
    fn step_expression(&self, pick: impl Fn(&CountStep) -> Value) -> Value {
        let Some(first) = self.steps.first() else {
            return json!(0);
        };
        if self.steps.len() == 1 {
            return pick(first);
        }
        let mut expr = vec![json!("step"), json!(["get", "point_count"]), pick(first)];
        for step in &self.steps[1..] {
            expr.push(json!(step.min_count));
            expr.push(pick(step));
        }
        Value::Array(expr)
    }

    pub fn cluster_layer(&self) -> LayerSpec {
        LayerSpec::new(CLUSTER_LAYER, LayerKind::Circle, SITES_SOURCE)
            .with_filter(json!(["has", "point_count"]))
            .paint("circle-color", self.step_expression(|s| json!(s.color)))
            .paint("circle-radius", self.step_expression(|s| json!(s.radius)))
    }

    pub fn cluster_count_layer(&self) -> LayerSpec {
        LayerSpec::new(CLUSTER_COUNT_LAYER, LayerKind::Symbol, SITES_SOURCE)
            .with_filter(json!(["has", "point_count"]))
            .layout("text-field", json!(["get", "point_count_abbreviated"]))
            .layout("text-size", json!(self.count_text_size))
    }

    pub fn point_layer(&self) -> LayerSpec {
        LayerSpec::new(POINT_LAYER, LayerKind::Circle, SITES_SOURCE)
            .with_filter(json!(["!", ["has", "point_count"]]))
            .paint("circle-color", self.palette.expression())
            .paint("circle-radius", json!(self.point_radius))
            .paint("circle-stroke-width", json!(1))
            .paint("circle-stroke-color", json!(self.point_stroke_color))
    }

    /// Starts with an empty id filter, so nothing is highlighted.
    pub fn halo_layer(&self) -> LayerSpec {
        LayerSpec::new(HALO_LAYER, LayerKind::Circle, SITES_SOURCE)
            .with_filter(id_filter(""))
            .paint("circle-color", json!(self.halo.color))
            .paint("circle-radius", json!(self.halo.radius))
            .paint("circle-opacity", json!(self.halo.opacity))
    }

    /// Layers in draw order.
    pub fn layers(&self) -> [LayerSpec; 4] {
        [
            self.cluster_layer(),
            self.cluster_count_layer(),
            self.halo_layer(),
            self.point_layer(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::{CategoryPalette, ClusterStyle};
    use pretty_assertions::assert_eq;
    use scene::Category;
    use serde_json::json;

    #[test]
    fn palette_falls_back_for_unknown_categories() {
        let mut palette = CategoryPalette::default();
        palette.colors.insert(Category::new("wind"), "#0ea5e9".into());
        assert_eq!(palette.color_for(&Category::new("wind")), "#0ea5e9");
        assert_eq!(palette.color_for(&Category::new("coal")), "#64748b");
        assert_eq!(
            palette.expression(),
            json!(["match", ["get", "category"], "wind", "#0ea5e9", "#64748b"])
        );
    }

    #[test]
    fn count_steps_become_step_expression() {
        let layer = ClusterStyle::default().cluster_layer();
        assert_eq!(
            layer.paint["circle-color"],
            json!(["step", ["get", "point_count"], "#51bbd6", 10, "#f1f075", 50, "#f28cb1"])
        );
        assert_eq!(
            layer.paint["circle-radius"],
            json!(["step", ["get", "point_count"], 20.0, 10, 30.0, 50, 40.0])
        );
    }

    #[test]
    fn style_deserializes_with_defaults() {
        let style: ClusterStyle = serde_json::from_str(r#"{ "cluster_radius_px": 40 }"#).unwrap();
        assert_eq!(style.cluster_radius_px, 40);
        assert_eq!(style.cluster_max_zoom, 14);
        assert_eq!(style.steps.len(), 3);
    }
}
