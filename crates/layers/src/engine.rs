//! Command surface of the host map engine.
//!
//! Everything the core asks of the engine goes through [`MapEngine`]. Calls
//! arrive on the UI thread only; implementations are free to be `!Send`.

use foundation::LngLat;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::layer::LayerSpec;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("map engine is not ready")]
    NotReady,
    #[error("source already exists: {0}")]
    DuplicateSource(String),
    #[error("layer already exists: {0}")]
    DuplicateLayer(String),
    #[error("unknown source: {0}")]
    UnknownSource(String),
    #[error("unknown layer: {0}")]
    UnknownLayer(String),
    #[error("map engine rejected the call: {0}")]
    Rejected(String),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterOptions {
    pub radius_px: u32,
    pub max_zoom: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SourceSpec {
    GeoJson {
        data: Value,
        cluster: Option<ClusterOptions>,
    },
    /// Image draped over four corners in `topLeft, topRight, bottomRight,
    /// bottomLeft` order.
    Image {
        url: String,
        coordinates: [[f64; 2]; 4],
    },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CameraMotion {
    Ease,
    Fly,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CameraMove {
    pub center: LngLat,
    pub zoom: f64,
    pub duration_ms: u32,
    pub motion: CameraMotion,
}

pub type MarkerId = u64;

pub trait MapEngine {
    fn is_ready(&self) -> bool;
    fn zoom(&self) -> f64;

    fn add_source(&mut self, id: &str, spec: SourceSpec) -> Result<(), EngineError>;
    fn set_source_data(&mut self, id: &str, data: Value) -> Result<(), EngineError>;
    fn set_image_coordinates(
        &mut self,
        id: &str,
        coordinates: [[f64; 2]; 4],
    ) -> Result<(), EngineError>;
    fn has_source(&self, id: &str) -> bool;
    fn remove_source(&mut self, id: &str);

    fn add_layer(&mut self, spec: LayerSpec) -> Result<(), EngineError>;
    fn has_layer(&self, id: &str) -> bool;
    fn remove_layer(&mut self, id: &str);
    fn set_layer_visibility(&mut self, id: &str, visible: bool) -> Result<(), EngineError>;
    fn set_paint_property(&mut self, layer: &str, name: &str, value: Value)
    -> Result<(), EngineError>;
    fn set_filter(&mut self, layer: &str, filter: Value) -> Result<(), EngineError>;

    /// Asks the clustering index for the expansion zoom of `cluster_id`. The
    /// answer arrives later through the host's event path.
    fn request_cluster_expansion_zoom(&mut self, source: &str, cluster_id: u64);

    fn move_camera(&mut self, camera: CameraMove);
    fn resize(&mut self);
    fn trigger_repaint(&mut self);

    /// Pan and zoom gestures, switched together.
    fn set_gestures_enabled(&mut self, enabled: bool);

    fn add_marker(&mut self, at: LngLat, color: &str, draggable: bool) -> MarkerId;
    fn move_marker(&mut self, marker: MarkerId, at: LngLat);
    fn remove_marker(&mut self, marker: MarkerId);

    /// Registers a custom 3D layer drawing into the engine's own GPU context.
    fn add_custom_layer(&mut self, id: &str) -> Result<(), EngineError>;
    fn remove_custom_layer(&mut self, id: &str);
}

/// Removes a layer and then its source, each only if present.
pub fn remove_layer_and_source<E: MapEngine + ?Sized>(engine: &mut E, layer: &str, source: &str) {
    if engine.has_layer(layer) {
        engine.remove_layer(layer);
    }
    if engine.has_source(source) {
        engine.remove_source(source);
    }
}
