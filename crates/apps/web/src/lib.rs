use std::cell::RefCell;

use catalog::validate::ModelAnchorForm;
use catalog::{InMemorySiteStore, Snapshot};
use console_error_panic_hook::set_once;
use foundation::LngLat;
use foundation::math::Mat4;
use gpu::{DeviceProfile, LoadTicket, ModelViewState};
use layers::{CalibrationState, Tooltip};
use scene::{Corner, FilterPredicate};
use serde_json::{Value, json};
use streaming::load_model;
use viewer::{InitialCamera, PanelMapOrchestrator, ViewerConfig, ViewerEvent};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::spawn_local;
use web_sys::WebGl2RenderingContext;

mod bridge;
mod http;
mod webgl;

use bridge::{JsMapEngine, MapHandlers};
use http::HttpFetcher;
use webgl::WebGlContext;

type Viewer = PanelMapOrchestrator<JsMapEngine, WebGlContext>;

struct WebViewer {
    viewer: Viewer,
    /// Write-back target for saves; the page persists what it returns.
    store: InMemorySiteStore,
}

thread_local! {
    static STATE: RefCell<Option<WebViewer>> = const { RefCell::new(None) };
}

/// Runs `f` against the live viewer. Calls before `init` or re-entrant calls
/// from inside a map callback fall through to `R::default()`.
fn with_viewer<F, R>(f: F) -> R
where
    F: FnOnce(&mut WebViewer) -> R,
    R: Default,
{
    STATE
        .try_with(|state| match state.try_borrow_mut() {
            Ok(mut s) => s.as_mut().map(f).unwrap_or_default(),
            Err(_) => R::default(),
        })
        .unwrap_or_default()
}

fn try_with_viewer<F, R>(f: F) -> Result<R, JsValue>
where
    F: FnOnce(&mut WebViewer) -> Result<R, JsValue>,
{
    STATE
        .try_with(|state| {
            let mut s = state
                .try_borrow_mut()
                .map_err(|_| JsValue::from_str("viewer is busy"))?;
            let w = s
                .as_mut()
                .ok_or_else(|| JsValue::from_str("viewer is not initialised"))?;
            f(w)
        })
        .map_err(|_| JsValue::from_str("viewer state unavailable"))?
}

fn js_error(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

fn to_js(value: &Value) -> JsValue {
    js_sys::JSON::parse(&value.to_string()).unwrap_or(JsValue::NULL)
}

#[wasm_bindgen(start)]
pub fn start() -> Result<(), JsValue> {
    set_once();
    Ok(())
}

fn map_handlers() -> MapHandlers {
    MapHandlers {
        on_load: Closure::wrap(Box::new(|| with_viewer(|w| w.viewer.on_map_ready())) as Box<dyn FnMut()>),
        on_point: Closure::wrap(Box::new(|id: String| {
            with_viewer(|w| w.viewer.point_clicked(&id))
        }) as Box<dyn FnMut(String)>),
        on_hover: Closure::wrap(Box::new(|id: JsValue| {
            let id = id.as_string();
            with_viewer(|w| w.viewer.point_hovered(id.as_deref()))
        }) as Box<dyn FnMut(JsValue)>),
        on_cluster: Closure::wrap(Box::new(|cluster_id: f64, lng: f64, lat: f64| {
            if let Ok(center) = LngLat::new(lng, lat) {
                with_viewer(|w| w.viewer.cluster_clicked(cluster_id as u64, center));
            }
        }) as Box<dyn FnMut(f64, f64, f64)>),
        on_click: Closure::wrap(Box::new(|lng: f64, lat: f64| {
            let Ok(at) = LngLat::new(lng, lat) else {
                return;
            };
            with_viewer(|w| {
                if w.viewer.calibration().is_some() {
                    w.viewer.calibration_click(at);
                }
            });
        }) as Box<dyn FnMut(f64, f64)>),
        on_marker_drag: Closure::wrap(Box::new(|marker: f64, lng: f64, lat: f64| {
            if let Ok(at) = LngLat::new(lng, lat) {
                with_viewer(|w| {
                    w.viewer.calibration_marker_dragged(marker as u64, at);
                });
            }
        }) as Box<dyn FnMut(f64, f64, f64)>),
        render: Closure::wrap(Box::new(|matrix: js_sys::Float64Array| {
            let Some(camera) = Mat4::from_cols_slice(&matrix.to_vec()) else {
                return;
            };
            with_viewer(|w| w.viewer.render_frame(&camera));
        }) as Box<dyn FnMut(js_sys::Float64Array)>),
    }
}

fn device_profile() -> DeviceProfile {
    let memory_gb = web_sys::window()
        .and_then(|w| js_sys::Reflect::get(&w.navigator(), &JsValue::from_str("deviceMemory")).ok())
        .and_then(|v| v.as_f64());
    DeviceProfile { memory_gb }
}

fn initial_camera() -> Option<foundation::CameraTarget> {
    let search = web_sys::window()?.location().search().ok()?;
    match InitialCamera::from_query(&search) {
        Ok(target) => target,
        Err(e) => {
            web_sys::console::warn_1(&JsValue::from_str(&format!("ignoring camera in URL: {e}")));
            None
        }
    }
}

/// Attaches the viewer to the page's map instance.
///
/// `config_json` may be omitted for defaults. The map must run on a WebGL2
/// canvas; the model layer draws into that same context.
#[wasm_bindgen]
pub fn init(map: JsValue, config_json: Option<String>) -> Result<(), JsValue> {
    set_once();
    let config = match config_json {
        Some(s) => ViewerConfig::from_json_str(&s).map_err(js_error)?,
        None => ViewerConfig::default(),
    };
    let engine = JsMapEngine::new(map, map_handlers());
    let gl = engine
        .canvas()
        .get_context("webgl2")?
        .ok_or_else(|| JsValue::from_str("map canvas has no webgl2 context"))?
        .dyn_into::<WebGl2RenderingContext>()?;

    let mut viewer = PanelMapOrchestrator::new(engine, WebGlContext::new(gl), config)
        .with_initial_camera(initial_camera());
    viewer.set_device_profile(device_profile());

    STATE.with(|s| {
        *s.borrow_mut() = Some(WebViewer {
            viewer,
            store: InMemorySiteStore::new(),
        });
    });
    Ok(())
}

/// Replaces the site data. Returns an ingest summary.
#[wasm_bindgen]
pub fn load_snapshot(json: &str) -> Result<JsValue, JsValue> {
    let (snapshot, report) = Snapshot::from_json_str(json).map_err(js_error)?;
    for r in &report.rejected {
        web_sys::console::warn_1(&JsValue::from_str(&format!(
            "site record {} rejected: {}",
            r.record, r.reason
        )));
    }
    try_with_viewer(|w| {
        w.store = InMemorySiteStore::from_snapshot(&snapshot);
        let changed = w.viewer.replace_snapshot(snapshot).map_err(js_error)?;
        Ok(to_js(&json!({
            "changed": changed,
            "accepted": report.accepted,
            "rejected": report.rejected.len(),
            "droppedOverlays": report.dropped_overlays,
            "droppedModels": report.dropped_models,
        })))
    })
}

/// Queues a filter from its JSON form; it applies on a later `tick`.
#[wasm_bindgen]
pub fn set_filter(json: &str, now_ms: f64) -> Result<(), JsValue> {
    let predicate: FilterPredicate = serde_json::from_str(json).map_err(js_error)?;
    with_viewer(|w| w.viewer.set_filter(predicate, now_ms));
    Ok(())
}

#[wasm_bindgen]
pub fn facets() -> JsValue {
    with_viewer(|w| {
        let f = w.viewer.facets();
        let clients: Vec<Value> = f
            .clients
            .iter()
            .map(|(id, name)| json!({ "id": id.as_str(), "name": name }))
            .collect();
        let categories: Vec<String> = f.categories.iter().map(|c| c.to_string()).collect();
        to_js(&json!({
            "categories": categories,
            "provinces": f.provinces,
            "years": f.years,
            "clients": clients,
        }))
    })
}

/// Per-frame pump: applies settled input and returns pending events.
#[wasm_bindgen]
pub fn tick(now_ms: f64) -> JsValue {
    with_viewer(|w| {
        for (cluster_id, zoom) in w.viewer.engine().take_expansion_zooms() {
            w.viewer.cluster_expansion_zoom(cluster_id, zoom);
        }
        w.viewer.tick(now_ms);
        let events: Vec<Value> = w
            .viewer
            .drain_events()
            .into_iter()
            .map(|s| event_json(s.frame_index, &s.event))
            .collect();
        to_js(&Value::Array(events))
    })
}

fn tooltip_json(t: &Tooltip) -> Value {
    json!({
        "site": t.site.as_str(),
        "name": t.name,
        "category": t.category,
        "province": t.province,
        "year": t.year,
    })
}

fn model_state_json(state: &ModelViewState) -> Value {
    match state {
        ModelViewState::Inactive => json!({ "state": "inactive" }),
        ModelViewState::Loading { percent } => json!({ "state": "loading", "percent": percent }),
        ModelViewState::Ready => json!({ "state": "ready" }),
        ModelViewState::Error { message, attempts } => {
            json!({ "state": "error", "message": message, "attempts": attempts })
        }
    }
}

fn event_json(frame: u64, event: &ViewerEvent) -> Value {
    match event {
        ViewerEvent::SelectionChanged(site) => {
            json!({ "type": "selection", "frame": frame, "site": site })
        }
        ViewerEvent::Hover(tooltip) => json!({
            "type": "hover",
            "frame": frame,
            "tooltip": tooltip.as_ref().map(tooltip_json),
        }),
        ViewerEvent::ModelState(state) => json!({
            "type": "model",
            "frame": frame,
            "state": model_state_json(state),
        }),
    }
}

#[wasm_bindgen]
pub fn select_site(id: Option<String>) -> bool {
    with_viewer(|w| w.viewer.select_site(id.map(foundation::SiteId::new)))
}

#[wasm_bindgen]
pub fn close_panel() {
    with_viewer(|w| w.viewer.close_panel());
}

#[wasm_bindgen]
pub fn set_overlay_visible(visible: bool) -> bool {
    with_viewer(|w| w.viewer.set_overlay_visible(visible))
}

#[wasm_bindgen]
pub fn set_overlay_opacity(opacity: f64) -> Option<f64> {
    with_viewer(|w| w.viewer.set_overlay_opacity(opacity))
}

fn spawn_load(ticket: LoadTicket) {
    let token = ticket.token;
    spawn_local(async move {
        let mut on_progress = |pct: u8| {
            with_viewer(|w| w.viewer.model_progress(token, pct));
        };
        let result = load_model(&HttpFetcher, &ticket.url, &mut on_progress).await;
        if let Err(e) = &result {
            web_sys::console::warn_1(&JsValue::from_str(&format!(
                "model load for {} failed: {e}",
                ticket.site
            )));
        }
        with_viewer(|w| w.viewer.model_loaded(token, result));
    });
}

#[wasm_bindgen]
pub fn view_3d() {
    if let Some(ticket) = with_viewer(|w| w.viewer.view_3d()) {
        spawn_load(ticket);
    }
}

#[wasm_bindgen]
pub fn retry_3d() {
    if let Some(ticket) = with_viewer(|w| w.viewer.retry_3d()) {
        spawn_load(ticket);
    }
}

#[wasm_bindgen]
pub fn exit_3d() {
    with_viewer(|w| w.viewer.exit_3d());
}

#[wasm_bindgen]
pub fn model_state() -> JsValue {
    with_viewer(|w| to_js(&model_state_json(&w.viewer.model_state())))
}

#[wasm_bindgen]
pub fn model_pointer_down(x: f64) -> bool {
    with_viewer(|w| w.viewer.model_pointer_down(x))
}

#[wasm_bindgen]
pub fn model_pointer_move(x: f64) -> bool {
    with_viewer(|w| w.viewer.model_pointer_move(x))
}

#[wasm_bindgen]
pub fn model_pointer_up() {
    with_viewer(|w| w.viewer.model_pointer_up());
}

#[wasm_bindgen]
pub fn reset_model_rotation() {
    with_viewer(|w| w.viewer.reset_model_rotation());
}

#[wasm_bindgen]
pub fn model_advisory() -> Option<String> {
    with_viewer(|w| w.viewer.model_advisory())
}

#[wasm_bindgen]
pub fn dismiss_model_advisory() {
    with_viewer(|w| w.viewer.dismiss_model_advisory());
}

#[wasm_bindgen]
pub fn begin_calibration(site: &str, image: Option<String>) -> Result<(), JsValue> {
    let site = foundation::SiteId::new(site);
    try_with_viewer(|w| {
        w.viewer
            .begin_calibration(&site, image.as_deref())
            .map_err(js_error)
    })
}

#[wasm_bindgen]
pub fn calibration_status() -> JsValue {
    with_viewer(|w| {
        let Some(c) = w.viewer.calibration() else {
            return to_js(&json!({ "state": "idle" }));
        };
        let state = match c.state() {
            CalibrationState::Idle => "idle",
            CalibrationState::Calibrating => "calibrating",
            CalibrationState::Complete => "complete",
        };
        to_js(&json!({
            "state": state,
            "site": c.site().as_str(),
            "nextCorner": c.next_corner().label(),
            "filled": c.filled(),
        }))
    })
}

/// Moves a placed corner; `corner` is `topLeft`, `topRight`, `bottomRight` or `bottomLeft`.
#[wasm_bindgen]
pub fn calibration_drag(corner: &str, lng: f64, lat: f64) -> Result<bool, JsValue> {
    let corner: Corner = serde_json::from_value(json!(corner)).map_err(js_error)?;
    let at = LngLat::new(lng, lat).map_err(js_error)?;
    Ok(with_viewer(|w| w.viewer.calibration_drag(corner, at).is_some()))
}

#[wasm_bindgen]
pub fn calibration_reset() {
    with_viewer(|w| w.viewer.calibration_reset());
}

#[wasm_bindgen]
pub fn cancel_calibration() {
    with_viewer(|w| w.viewer.cancel_calibration());
}

/// Saves the calibrated overlay and returns the stored record.
#[wasm_bindgen]
pub fn save_calibration() -> Result<JsValue, JsValue> {
    try_with_viewer(|w| {
        let WebViewer { viewer, store } = w;
        let asset = viewer.save_calibration(store).map_err(js_error)?;
        let value = serde_json::to_value(&asset).map_err(js_error)?;
        Ok(to_js(&value))
    })
}

/// Validates and saves a model anchor from the edit form's JSON.
#[wasm_bindgen]
pub fn save_model_anchor(site: &str, form_json: &str) -> Result<JsValue, JsValue> {
    let form: ModelAnchorForm = serde_json::from_str(form_json).map_err(js_error)?;
    let site = foundation::SiteId::new(site);
    try_with_viewer(|w| {
        let WebViewer { viewer, store } = w;
        let anchor = viewer
            .save_model_anchor(store, &site, &form)
            .map_err(js_error)?;
        let value = serde_json::to_value(&anchor).map_err(js_error)?;
        Ok(to_js(&value))
    })
}
