//! In-memory [`MapEngine`] for tests and offline tools.

use std::collections::BTreeMap;

use foundation::LngLat;
use serde_json::Value;

use crate::engine::{CameraMove, EngineError, MapEngine, MarkerId, SourceSpec};
use crate::layer::{LayerSpec, visibility_value};

#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub at: LngLat,
    pub color: String,
    pub draggable: bool,
}

#[derive(Debug)]
pub struct HeadlessEngine {
    ready: bool,
    zoom: f64,
    sources: BTreeMap<String, SourceSpec>,
    layers: Vec<LayerSpec>,
    custom_layers: Vec<String>,
    markers: BTreeMap<MarkerId, Marker>,
    next_marker: MarkerId,
    camera_moves: Vec<CameraMove>,
    expansion_requests: Vec<(String, u64)>,
    gestures_enabled: bool,
    source_writes: usize,
    paint_writes: usize,
    resizes: usize,
    repaints: usize,
}

impl Default for HeadlessEngine {
    fn default() -> Self {
        Self {
            ready: false,
            zoom: 5.0,
            sources: BTreeMap::new(),
            layers: Vec::new(),
            custom_layers: Vec::new(),
            markers: BTreeMap::new(),
            next_marker: 1,
            camera_moves: Vec::new(),
            expansion_requests: Vec::new(),
            gestures_enabled: true,
            source_writes: 0,
            paint_writes: 0,
            resizes: 0,
            repaints: 0,
        }
    }
}

impl HeadlessEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ready() -> Self {
        Self {
            ready: true,
            ..Self::default()
        }
    }

    pub fn set_ready(&mut self) {
        self.ready = true;
    }

    pub fn set_zoom(&mut self, zoom: f64) {
        self.zoom = zoom;
    }

    pub fn source(&self, id: &str) -> Option<&SourceSpec> {
        self.sources.get(id)
    }

    pub fn source_ids(&self) -> Vec<&str> {
        self.sources.keys().map(String::as_str).collect()
    }

    /// Image sources currently present.
    pub fn image_source_count(&self) -> usize {
        self.sources
            .values()
            .filter(|s| matches!(s, SourceSpec::Image { .. }))
            .count()
    }

    pub fn layer(&self, id: &str) -> Option<&LayerSpec> {
        self.layers.iter().find(|l| l.id == id)
    }

    pub fn layer_ids(&self) -> Vec<&str> {
        self.layers.iter().map(|l| l.id.as_str()).collect()
    }

    pub fn custom_layers(&self) -> &[String] {
        &self.custom_layers
    }

    pub fn markers(&self) -> &BTreeMap<MarkerId, Marker> {
        &self.markers
    }

    pub fn camera_moves(&self) -> &[CameraMove] {
        &self.camera_moves
    }

    pub fn last_camera(&self) -> Option<&CameraMove> {
        self.camera_moves.last()
    }

    pub fn expansion_requests(&self) -> &[(String, u64)] {
        &self.expansion_requests
    }

    pub fn gestures_enabled(&self) -> bool {
        self.gestures_enabled
    }

    pub fn source_writes(&self) -> usize {
        self.source_writes
    }

    pub fn paint_writes(&self) -> usize {
        self.paint_writes
    }

    pub fn resizes(&self) -> usize {
        self.resizes
    }

    pub fn repaints(&self) -> usize {
        self.repaints
    }

    fn ensure_ready(&self) -> Result<(), EngineError> {
        if self.ready {
            Ok(())
        } else {
            Err(EngineError::NotReady)
        }
    }

    fn layer_mut(&mut self, id: &str) -> Result<&mut LayerSpec, EngineError> {
        self.layers
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or_else(|| EngineError::UnknownLayer(id.to_string()))
    }
}

impl MapEngine for HeadlessEngine {
    fn is_ready(&self) -> bool {
        self.ready
    }

    fn zoom(&self) -> f64 {
        self.zoom
    }

    fn add_source(&mut self, id: &str, spec: SourceSpec) -> Result<(), EngineError> {
        self.ensure_ready()?;
        if self.sources.contains_key(id) {
            return Err(EngineError::DuplicateSource(id.to_string()));
        }
        self.sources.insert(id.to_string(), spec);
        self.source_writes += 1;
        Ok(())
    }

    fn set_source_data(&mut self, id: &str, data: Value) -> Result<(), EngineError> {
        self.ensure_ready()?;
        match self.sources.get_mut(id) {
            Some(SourceSpec::GeoJson { data: current, .. }) => {
                *current = data;
                self.source_writes += 1;
                Ok(())
            }
            Some(SourceSpec::Image { .. }) => Err(EngineError::Rejected(format!(
                "{id} is not a GeoJSON source"
            ))),
            None => Err(EngineError::UnknownSource(id.to_string())),
        }
    }

    fn set_image_coordinates(
        &mut self,
        id: &str,
        coordinates: [[f64; 2]; 4],
    ) -> Result<(), EngineError> {
        self.ensure_ready()?;
        match self.sources.get_mut(id) {
            Some(SourceSpec::Image {
                coordinates: current,
                ..
            }) => {
                *current = coordinates;
                Ok(())
            }
            Some(SourceSpec::GeoJson { .. }) => {
                Err(EngineError::Rejected(format!("{id} is not an image source")))
            }
            None => Err(EngineError::UnknownSource(id.to_string())),
        }
    }

    fn has_source(&self, id: &str) -> bool {
        self.sources.contains_key(id)
    }

    fn remove_source(&mut self, id: &str) {
        self.sources.remove(id);
    }

    fn add_layer(&mut self, spec: LayerSpec) -> Result<(), EngineError> {
        self.ensure_ready()?;
        if self.has_layer(&spec.id) {
            return Err(EngineError::DuplicateLayer(spec.id));
        }
        if !self.sources.contains_key(&spec.source) {
            return Err(EngineError::UnknownSource(spec.source));
        }
        self.layers.push(spec);
        Ok(())
    }

    fn has_layer(&self, id: &str) -> bool {
        self.layers.iter().any(|l| l.id == id) || self.custom_layers.iter().any(|l| l == id)
    }

    fn remove_layer(&mut self, id: &str) {
        self.layers.retain(|l| l.id != id);
    }

    fn set_layer_visibility(&mut self, id: &str, visible: bool) -> Result<(), EngineError> {
        let layer = self.layer_mut(id)?;
        layer
            .layout
            .insert("visibility".to_string(), visibility_value(visible));
        Ok(())
    }

    fn set_paint_property(
        &mut self,
        layer: &str,
        name: &str,
        value: Value,
    ) -> Result<(), EngineError> {
        let layer = self.layer_mut(layer)?;
        layer.paint.insert(name.to_string(), value);
        self.paint_writes += 1;
        Ok(())
    }

    fn set_filter(&mut self, layer: &str, filter: Value) -> Result<(), EngineError> {
        let layer = self.layer_mut(layer)?;
        layer.filter = Some(filter);
        Ok(())
    }

    fn request_cluster_expansion_zoom(&mut self, source: &str, cluster_id: u64) {
        self.expansion_requests.push((source.to_string(), cluster_id));
    }

    fn move_camera(&mut self, camera: CameraMove) {
        self.zoom = camera.zoom;
        self.camera_moves.push(camera);
    }

    fn resize(&mut self) {
        self.resizes += 1;
    }

    fn trigger_repaint(&mut self) {
        self.repaints += 1;
    }

    fn set_gestures_enabled(&mut self, enabled: bool) {
        self.gestures_enabled = enabled;
    }

    fn add_marker(&mut self, at: LngLat, color: &str, draggable: bool) -> MarkerId {
        let id = self.next_marker;
        self.next_marker += 1;
        self.markers.insert(
            id,
            Marker {
                at,
                color: color.to_string(),
                draggable,
            },
        );
        id
    }

    fn move_marker(&mut self, marker: MarkerId, at: LngLat) {
        if let Some(m) = self.markers.get_mut(&marker) {
            m.at = at;
        }
    }

    fn remove_marker(&mut self, marker: MarkerId) {
        self.markers.remove(&marker);
    }

    fn add_custom_layer(&mut self, id: &str) -> Result<(), EngineError> {
        self.ensure_ready()?;
        if self.has_layer(id) {
            return Err(EngineError::DuplicateLayer(id.to_string()));
        }
        self.custom_layers.push(id.to_string());
        Ok(())
    }

    fn remove_custom_layer(&mut self, id: &str) {
        self.custom_layers.retain(|l| l != id);
    }
}

#[cfg(test)]
mod tests {
    use super::HeadlessEngine;
    use crate::engine::{EngineError, MapEngine, SourceSpec};
    use crate::layer::{LayerKind, LayerSpec};
    use serde_json::json;

    #[test]
    fn mutations_before_ready_are_rejected() {
        let mut engine = HeadlessEngine::new();
        let err = engine
            .add_source("s", SourceSpec::GeoJson { data: json!({}), cluster: None })
            .unwrap_err();
        assert_eq!(err, EngineError::NotReady);
    }

    #[test]
    fn layers_need_their_source_and_unique_ids() {
        let mut engine = HeadlessEngine::ready();
        let spec = LayerSpec::new("l", LayerKind::Circle, "s");
        assert_eq!(
            engine.add_layer(spec.clone()),
            Err(EngineError::UnknownSource("s".to_string()))
        );
        engine
            .add_source("s", SourceSpec::GeoJson { data: json!({}), cluster: None })
            .unwrap();
        engine.add_layer(spec.clone()).unwrap();
        assert_eq!(
            engine.add_layer(spec),
            Err(EngineError::DuplicateLayer("l".to_string()))
        );
        engine.set_layer_visibility("l", false).unwrap();
        assert!(!engine.layer("l").unwrap().is_visible());
    }
}
