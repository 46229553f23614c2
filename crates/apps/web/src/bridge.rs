use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use foundation::LngLat;
use layers::{
    CLUSTER_LAYER, CameraMotion, CameraMove, EngineError, LayerSpec, MapEngine, MarkerId,
    POINT_LAYER, SourceSpec, visibility_value,
};
use serde_json::{Value, json};
use wasm_bindgen::prelude::*;
use web_sys::HtmlCanvasElement;

// Thin shims over the page's map object. Every call that the map library may
// reject is wrapped so the rejection surfaces as a Rust error instead of a throw.
#[wasm_bindgen(inline_js = "
export function geoviz_map_loaded(map) { return !!map.isStyleLoaded(); }
export function geoviz_map_zoom(map) { return map.getZoom(); }
export function geoviz_map_canvas(map) { return map.getCanvas(); }

export function geoviz_add_source(map, id, spec) { map.addSource(id, spec); }
export function geoviz_set_source_data(map, id, data) {
    const src = map.getSource(id);
    if (!src) throw new Error('unknown source ' + id);
    src.setData(data);
}
export function geoviz_set_image_coordinates(map, id, coords) {
    const src = map.getSource(id);
    if (!src) throw new Error('unknown source ' + id);
    src.setCoordinates(coords);
}
export function geoviz_has_source(map, id) { return !!map.getSource(id); }
export function geoviz_remove_source(map, id) { map.removeSource(id); }

export function geoviz_add_layer(map, spec) { map.addLayer(spec); }
export function geoviz_has_layer(map, id) { return !!map.getLayer(id); }
export function geoviz_remove_layer(map, id) { map.removeLayer(id); }
export function geoviz_set_layout_property(map, layer, name, value) { map.setLayoutProperty(layer, name, value); }
export function geoviz_set_paint_property(map, layer, name, value) { map.setPaintProperty(layer, name, value); }
export function geoviz_set_filter(map, layer, filter) { map.setFilter(layer, filter); }

export function geoviz_cluster_expansion_zoom(map, source, clusterId, done) {
    const src = map.getSource(source);
    if (!src) return;
    const res = src.getClusterExpansionZoom(clusterId, (err, zoom) => {
        if (!err) done(clusterId, zoom);
    });
    if (res && typeof res.then === 'function') {
        res.then((zoom) => done(clusterId, zoom), () => {});
    }
}

export function geoviz_move_camera(map, fly, lng, lat, zoom, duration) {
    const opts = { center: [lng, lat], zoom, duration };
    if (fly) map.flyTo(opts); else map.easeTo(opts);
}
export function geoviz_resize(map) { map.resize(); }
export function geoviz_trigger_repaint(map) { map.triggerRepaint(); }
export function geoviz_set_gestures(map, enabled) {
    for (const h of [map.dragPan, map.scrollZoom, map.boxZoom, map.doubleClickZoom, map.touchZoomRotate, map.keyboard]) {
        if (!h) continue;
        if (enabled) h.enable(); else h.disable();
    }
}

export function geoviz_add_marker(map, id, lng, lat, color, draggable, onDragEnd) {
    const marker = new globalThis.maplibregl.Marker({ color, draggable });
    marker.setLngLat([lng, lat]).addTo(map);
    if (draggable) {
        marker.on('dragend', () => {
            const p = marker.getLngLat();
            onDragEnd(id, p.lng, p.lat);
        });
    }
    return marker;
}
export function geoviz_move_marker(marker, lng, lat) { marker.setLngLat([lng, lat]); }
export function geoviz_remove_marker(marker) { marker.remove(); }

export function geoviz_add_custom_layer(map, id, render) {
    map.addLayer({
        id,
        type: 'custom',
        renderingMode: '3d',
        render: (_gl, args) => {
            const m = args && args.defaultProjectionData
                ? args.defaultProjectionData.mainMatrix
                : args;
            render(Float64Array.from(m));
        },
    });
}
export function geoviz_remove_custom_layer(map, id) {
    if (map.getLayer(id)) map.removeLayer(id);
}

export function geoviz_wire_events(map, pointLayer, clusterLayer, onLoad, onPoint, onHover, onCluster, onClick) {
    if (map.isStyleLoaded()) queueMicrotask(() => onLoad()); else map.once('load', () => onLoad());
    map.on('click', pointLayer, (e) => {
        const f = e.features && e.features[0];
        if (f && f.properties) onPoint(String(f.properties.id));
    });
    map.on('mousemove', pointLayer, (e) => {
        const f = e.features && e.features[0];
        onHover(f && f.properties ? String(f.properties.id) : null);
    });
    map.on('mouseleave', pointLayer, () => onHover(null));
    map.on('click', clusterLayer, (e) => {
        const f = e.features && e.features[0];
        if (!f) return;
        const [lng, lat] = f.geometry.coordinates;
        onCluster(f.properties.cluster_id, lng, lat);
    });
    map.on('click', (e) => onClick(e.lngLat.lng, e.lngLat.lat));
}
")]
extern "C" {
    fn geoviz_map_loaded(map: &JsValue) -> bool;
    fn geoviz_map_zoom(map: &JsValue) -> f64;
    fn geoviz_map_canvas(map: &JsValue) -> HtmlCanvasElement;

    #[wasm_bindgen(catch)]
    fn geoviz_add_source(map: &JsValue, id: &str, spec: &JsValue) -> Result<(), JsValue>;
    #[wasm_bindgen(catch)]
    fn geoviz_set_source_data(map: &JsValue, id: &str, data: &JsValue) -> Result<(), JsValue>;
    #[wasm_bindgen(catch)]
    fn geoviz_set_image_coordinates(map: &JsValue, id: &str, coords: &JsValue) -> Result<(), JsValue>;
    fn geoviz_has_source(map: &JsValue, id: &str) -> bool;
    #[wasm_bindgen(catch)]
    fn geoviz_remove_source(map: &JsValue, id: &str) -> Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    fn geoviz_add_layer(map: &JsValue, spec: &JsValue) -> Result<(), JsValue>;
    fn geoviz_has_layer(map: &JsValue, id: &str) -> bool;
    #[wasm_bindgen(catch)]
    fn geoviz_remove_layer(map: &JsValue, id: &str) -> Result<(), JsValue>;
    #[wasm_bindgen(catch)]
    fn geoviz_set_layout_property(
        map: &JsValue,
        layer: &str,
        name: &str,
        value: &JsValue,
    ) -> Result<(), JsValue>;
    #[wasm_bindgen(catch)]
    fn geoviz_set_paint_property(
        map: &JsValue,
        layer: &str,
        name: &str,
        value: &JsValue,
    ) -> Result<(), JsValue>;
    #[wasm_bindgen(catch)]
    fn geoviz_set_filter(map: &JsValue, layer: &str, filter: &JsValue) -> Result<(), JsValue>;

    fn geoviz_cluster_expansion_zoom(
        map: &JsValue,
        source: &str,
        cluster_id: f64,
        done: &Closure<dyn FnMut(f64, f64)>,
    );

    fn geoviz_move_camera(map: &JsValue, fly: bool, lng: f64, lat: f64, zoom: f64, duration: u32);
    fn geoviz_resize(map: &JsValue);
    fn geoviz_trigger_repaint(map: &JsValue);
    fn geoviz_set_gestures(map: &JsValue, enabled: bool);

    fn geoviz_add_marker(
        map: &JsValue,
        id: f64,
        lng: f64,
        lat: f64,
        color: &str,
        draggable: bool,
        on_drag_end: &Closure<dyn FnMut(f64, f64, f64)>,
    ) -> JsValue;
    fn geoviz_move_marker(marker: &JsValue, lng: f64, lat: f64);
    fn geoviz_remove_marker(marker: &JsValue);

    #[wasm_bindgen(catch)]
    fn geoviz_add_custom_layer(
        map: &JsValue,
        id: &str,
        render: &Closure<dyn FnMut(js_sys::Float64Array)>,
    ) -> Result<(), JsValue>;
    fn geoviz_remove_custom_layer(map: &JsValue, id: &str);

    fn geoviz_wire_events(
        map: &JsValue,
        point_layer: &str,
        cluster_layer: &str,
        on_load: &Closure<dyn FnMut()>,
        on_point: &Closure<dyn FnMut(String)>,
        on_hover: &Closure<dyn FnMut(JsValue)>,
        on_cluster: &Closure<dyn FnMut(f64, f64, f64)>,
        on_click: &Closure<dyn FnMut(f64, f64)>,
    );
}

/// Page input forwarded by the map.
pub struct MapHandlers {
    pub on_load: Closure<dyn FnMut()>,
    pub on_point: Closure<dyn FnMut(String)>,
    pub on_hover: Closure<dyn FnMut(JsValue)>,
    pub on_cluster: Closure<dyn FnMut(f64, f64, f64)>,
    pub on_click: Closure<dyn FnMut(f64, f64)>,
    pub on_marker_drag: Closure<dyn FnMut(f64, f64, f64)>,
    pub render: Closure<dyn FnMut(js_sys::Float64Array)>,
}

/// Answers that arrive asynchronously from the map library.
#[derive(Debug, Default)]
pub struct Inbox {
    pub expansion_zooms: Vec<(u64, f64)>,
}

/// [`MapEngine`] over the page's map instance.
pub struct JsMapEngine {
    map: JsValue,
    handlers: MapHandlers,
    inbox: Rc<RefCell<Inbox>>,
    on_expansion: Closure<dyn FnMut(f64, f64)>,
    markers: HashMap<MarkerId, JsValue>,
    next_marker: MarkerId,
}

impl JsMapEngine {
    pub fn new(map: JsValue, handlers: MapHandlers) -> Self {
        let inbox = Rc::new(RefCell::new(Inbox::default()));
        let sink = Rc::clone(&inbox);
        let on_expansion = Closure::wrap(Box::new(move |cluster_id: f64, zoom: f64| {
            if let Ok(mut inbox) = sink.try_borrow_mut() {
                inbox.expansion_zooms.push((cluster_id as u64, zoom));
            }
        }) as Box<dyn FnMut(f64, f64)>);

        geoviz_wire_events(
            &map,
            POINT_LAYER,
            CLUSTER_LAYER,
            &handlers.on_load,
            &handlers.on_point,
            &handlers.on_hover,
            &handlers.on_cluster,
            &handlers.on_click,
        );

        Self {
            map,
            handlers,
            inbox,
            on_expansion,
            markers: HashMap::new(),
            next_marker: 1,
        }
    }

    pub fn canvas(&self) -> HtmlCanvasElement {
        geoviz_map_canvas(&self.map)
    }

    pub fn take_expansion_zooms(&self) -> Vec<(u64, f64)> {
        self.inbox
            .try_borrow_mut()
            .map(|mut inbox| std::mem::take(&mut inbox.expansion_zooms))
            .unwrap_or_default()
    }
}

fn to_js(value: &Value) -> Result<JsValue, EngineError> {
    js_sys::JSON::parse(&value.to_string()).map_err(|e| rejected(&e))
}

fn rejected(err: &JsValue) -> EngineError {
    let msg = err
        .as_string()
        .or_else(|| {
            js_sys::Reflect::get(err, &JsValue::from_str("message"))
                .ok()
                .and_then(|m| m.as_string())
        })
        .unwrap_or_else(|| format!("{err:?}"));
    EngineError::Rejected(msg)
}

fn source_json(spec: &SourceSpec) -> Value {
    match spec {
        SourceSpec::GeoJson { data, cluster } => {
            let mut v = json!({ "type": "geojson", "data": data });
            if let Some(c) = cluster {
                v["cluster"] = json!(true);
                v["clusterRadius"] = json!(c.radius_px);
                v["clusterMaxZoom"] = json!(c.max_zoom);
            }
            v
        }
        SourceSpec::Image { url, coordinates } => {
            json!({ "type": "image", "url": url, "coordinates": coordinates })
        }
    }
}

impl MapEngine for JsMapEngine {
    fn is_ready(&self) -> bool {
        geoviz_map_loaded(&self.map)
    }

    fn zoom(&self) -> f64 {
        geoviz_map_zoom(&self.map)
    }

    fn add_source(&mut self, id: &str, spec: SourceSpec) -> Result<(), EngineError> {
        if self.has_source(id) {
            return Err(EngineError::DuplicateSource(id.to_string()));
        }
        let spec = to_js(&source_json(&spec))?;
        geoviz_add_source(&self.map, id, &spec).map_err(|e| rejected(&e))
    }

    fn set_source_data(&mut self, id: &str, data: Value) -> Result<(), EngineError> {
        if !self.has_source(id) {
            return Err(EngineError::UnknownSource(id.to_string()));
        }
        let data = to_js(&data)?;
        geoviz_set_source_data(&self.map, id, &data).map_err(|e| rejected(&e))
    }

    fn set_image_coordinates(
        &mut self,
        id: &str,
        coordinates: [[f64; 2]; 4],
    ) -> Result<(), EngineError> {
        if !self.has_source(id) {
            return Err(EngineError::UnknownSource(id.to_string()));
        }
        let coords = to_js(&json!(coordinates))?;
        geoviz_set_image_coordinates(&self.map, id, &coords).map_err(|e| rejected(&e))
    }

    fn has_source(&self, id: &str) -> bool {
        geoviz_has_source(&self.map, id)
    }

    fn remove_source(&mut self, id: &str) {
        if let Err(e) = geoviz_remove_source(&self.map, id) {
            web_sys::console::warn_1(&JsValue::from_str(&format!(
                "remove source {id}: {}",
                rejected(&e)
            )));
        }
    }

    fn add_layer(&mut self, spec: LayerSpec) -> Result<(), EngineError> {
        if self.has_layer(&spec.id) {
            return Err(EngineError::DuplicateLayer(spec.id));
        }
        let value = serde_json::to_value(&spec).map_err(|e| EngineError::Rejected(e.to_string()))?;
        let js = to_js(&value)?;
        geoviz_add_layer(&self.map, &js).map_err(|e| rejected(&e))
    }

    fn has_layer(&self, id: &str) -> bool {
        geoviz_has_layer(&self.map, id)
    }

    fn remove_layer(&mut self, id: &str) {
        if let Err(e) = geoviz_remove_layer(&self.map, id) {
            web_sys::console::warn_1(&JsValue::from_str(&format!(
                "remove layer {id}: {}",
                rejected(&e)
            )));
        }
    }

    fn set_layer_visibility(&mut self, id: &str, visible: bool) -> Result<(), EngineError> {
        if !self.has_layer(id) {
            return Err(EngineError::UnknownLayer(id.to_string()));
        }
        let value = to_js(&visibility_value(visible))?;
        geoviz_set_layout_property(&self.map, id, "visibility", &value).map_err(|e| rejected(&e))
    }

    fn set_paint_property(
        &mut self,
        layer: &str,
        name: &str,
        value: Value,
    ) -> Result<(), EngineError> {
        if !self.has_layer(layer) {
            return Err(EngineError::UnknownLayer(layer.to_string()));
        }
        let value = to_js(&value)?;
        geoviz_set_paint_property(&self.map, layer, name, &value).map_err(|e| rejected(&e))
    }

    fn set_filter(&mut self, layer: &str, filter: Value) -> Result<(), EngineError> {
        if !self.has_layer(layer) {
            return Err(EngineError::UnknownLayer(layer.to_string()));
        }
        let filter = to_js(&filter)?;
        geoviz_set_filter(&self.map, layer, &filter).map_err(|e| rejected(&e))
    }

    fn request_cluster_expansion_zoom(&mut self, source: &str, cluster_id: u64) {
        geoviz_cluster_expansion_zoom(&self.map, source, cluster_id as f64, &self.on_expansion);
    }

    fn move_camera(&mut self, camera: CameraMove) {
        geoviz_move_camera(
            &self.map,
            camera.motion == CameraMotion::Fly,
            camera.center.lng(),
            camera.center.lat(),
            camera.zoom,
            camera.duration_ms,
        );
    }

    fn resize(&mut self) {
        geoviz_resize(&self.map);
    }

    fn trigger_repaint(&mut self) {
        geoviz_trigger_repaint(&self.map);
    }

    fn set_gestures_enabled(&mut self, enabled: bool) {
        geoviz_set_gestures(&self.map, enabled);
    }

    fn add_marker(&mut self, at: LngLat, color: &str, draggable: bool) -> MarkerId {
        let id = self.next_marker;
        self.next_marker += 1;
        let marker = geoviz_add_marker(
            &self.map,
            id as f64,
            at.lng(),
            at.lat(),
            color,
            draggable,
            &self.handlers.on_marker_drag,
        );
        self.markers.insert(id, marker);
        id
    }

    fn move_marker(&mut self, marker: MarkerId, at: LngLat) {
        if let Some(m) = self.markers.get(&marker) {
            geoviz_move_marker(m, at.lng(), at.lat());
        }
    }

    fn remove_marker(&mut self, marker: MarkerId) {
        if let Some(m) = self.markers.remove(&marker) {
            geoviz_remove_marker(&m);
        }
    }

    fn add_custom_layer(&mut self, id: &str) -> Result<(), EngineError> {
        if self.has_layer(id) {
            return Err(EngineError::DuplicateLayer(id.to_string()));
        }
        geoviz_add_custom_layer(&self.map, id, &self.handlers.render).map_err(|e| rejected(&e))
    }

    fn remove_custom_layer(&mut self, id: &str) {
        geoviz_remove_custom_layer(&self.map, id);
    }
}
