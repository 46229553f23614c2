use std::collections::HashMap;

use foundation::{CameraTarget, LngLat, SiteId};
use runtime::{EventBus, Frame, Stamped};
use scene::{FeatureCollection, OverlayAsset, Site, SiteIndex};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::engine::{
    CameraMotion, CameraMove, ClusterOptions, MapEngine, SourceSpec, remove_layer_and_source,
};
use crate::layer::{HALO_LAYER, SITES_SOURCE, id_filter};
use crate::raster::{OverlayDisplay, overlay_layer_id, overlay_source_id};
use crate::symbology::ClusterStyle;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraPolicy {
    /// Point clicks zoom in to at least this level and never zoom out.
    pub min_click_zoom: f64,
    pub ease_duration_ms: u32,
    pub fly_duration_ms: u32,
}

impl Default for CameraPolicy {
    fn default() -> Self {
        Self {
            min_click_zoom: 12.0,
            ease_duration_ms: 600,
            fly_duration_ms: 1600,
        }
    }
}

/// Hover card content for a point.
#[derive(Debug, Clone, PartialEq)]
pub struct Tooltip {
    pub site: SiteId,
    pub name: String,
    pub category: String,
    pub province: String,
    pub year: i32,
}

impl Tooltip {
    fn for_site(site: &Site) -> Self {
        Self {
            site: site.id.clone(),
            name: site.name.clone(),
            category: site.category.to_string(),
            province: site.province.clone(),
            year: site.year,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MapEvent {
    SiteSelected(Site),
    Hover(Option<Tooltip>),
}

/// Owner of the single map engine instance.
///
/// All mutation of the engine is routed through this type. Calls made before
/// the engine reported ready are remembered and applied in [`on_ready`]
/// (latest value wins), never failed.
///
/// [`on_ready`]: ClusterMapController::on_ready
#[derive(Debug)]
pub struct ClusterMapController<E: MapEngine> {
    engine: E,
    style: ClusterStyle,
    camera: CameraPolicy,
    ready: bool,
    index: SiteIndex,
    pending_data: Option<Value>,
    highlighted: Option<SiteId>,
    hovered: Option<SiteId>,
    pending_camera: Option<CameraMove>,
    last_fly_target: Option<CameraTarget>,
    expanding: HashMap<u64, LngLat>,
    overlay: OverlayDisplay,
    events: EventBus<MapEvent>,
    frame: Frame,
}

impl<E: MapEngine> ClusterMapController<E> {
    pub fn new(engine: E, style: ClusterStyle, camera: CameraPolicy) -> Self {
        Self {
            engine,
            style,
            camera,
            ready: false,
            index: SiteIndex::default(),
            pending_data: None,
            highlighted: None,
            hovered: None,
            pending_camera: None,
            last_fly_target: None,
            expanding: HashMap::new(),
            overlay: OverlayDisplay::new(),
            events: EventBus::new(),
            frame: Frame::new(0, 0.0),
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn highlighted(&self) -> Option<&SiteId> {
        self.highlighted.as_ref()
    }

    pub fn overlay(&self) -> &OverlayDisplay {
        &self.overlay
    }

    pub fn set_frame(&mut self, frame: Frame) {
        self.frame = frame;
    }

    /// Sites used to resolve clicked feature ids.
    pub fn set_site_index(&mut self, index: SiteIndex) {
        self.index = index;
    }

    /// Creates the point source and its layers, then flushes queued calls.
    pub fn on_ready(&mut self) {
        if self.ready {
            return;
        }
        let data = self
            .pending_data
            .take()
            .unwrap_or_else(|| FeatureCollection::empty().to_geojson());
        let source = SourceSpec::GeoJson {
            data,
            cluster: Some(ClusterOptions {
                radius_px: self.style.cluster_radius_px,
                max_zoom: self.style.cluster_max_zoom,
            }),
        };
        if let Err(e) = self.engine.add_source(SITES_SOURCE, source) {
            warn!(error = %e, "site source rejected");
            return;
        }
        for layer in self.style.layers() {
            let id = layer.id.clone();
            if let Err(e) = self.engine.add_layer(layer) {
                warn!(layer = %id, error = %e, "site layer rejected");
            }
        }
        self.ready = true;
        self.apply_halo();
        if let Some(camera) = self.pending_camera.take() {
            self.engine.move_camera(camera);
        }
        info!("map ready");
    }

    /// Replaces the point source data; queued until ready.
    pub fn set_features(&mut self, features: &FeatureCollection) {
        let data = features.to_geojson();
        if !self.ready {
            debug!(count = features.len(), "features queued until map ready");
            self.pending_data = Some(data);
            return;
        }
        if let Err(e) = self.engine.set_source_data(SITES_SOURCE, data) {
            warn!(error = %e, "site source update failed");
        }
    }

    /// Selects the clicked point and eases to it. Returns the resolved site.
    pub fn on_point_click(&mut self, feature_id: &str) -> Option<Site> {
        let id = SiteId::new(feature_id);
        let Some(site) = self.index.get(&id).cloned() else {
            debug!(feature = feature_id, "clicked feature not in snapshot");
            return None;
        };
        self.events.emit(self.frame, MapEvent::SiteSelected(site.clone()));
        self.set_highlighted(Some(id));
        let zoom = self.engine.zoom().max(self.camera.min_click_zoom);
        self.move_camera(CameraMove {
            center: site.position,
            zoom,
            duration_ms: self.camera.ease_duration_ms,
            motion: CameraMotion::Ease,
        });
        Some(site)
    }

    /// Hover highlights temporarily; leaving restores the selection halo.
    pub fn on_point_hover(&mut self, feature_id: Option<&str>) {
        let site = feature_id.and_then(|f| self.index.get(&SiteId::new(f)));
        let tooltip = site.map(Tooltip::for_site);
        let hovered = site.map(|s| s.id.clone());
        if hovered == self.hovered {
            return;
        }
        self.hovered = hovered;
        self.apply_halo();
        self.events.emit(self.frame, MapEvent::Hover(tooltip));
    }

    /// Asks the engine for the cluster's expansion zoom.
    pub fn on_cluster_click(&mut self, cluster_id: u64, center: LngLat) {
        if !self.ready {
            return;
        }
        self.expanding.insert(cluster_id, center);
        self.engine
            .request_cluster_expansion_zoom(SITES_SOURCE, cluster_id);
    }

    /// Engine answer to [`on_cluster_click`](Self::on_cluster_click).
    pub fn on_cluster_expansion_zoom(&mut self, cluster_id: u64, zoom: f64) {
        let Some(center) = self.expanding.remove(&cluster_id) else {
            debug!(cluster_id, "expansion zoom for unknown cluster");
            return;
        };
        if !zoom.is_finite() {
            return;
        }
        self.move_camera(CameraMove {
            center,
            zoom,
            duration_ms: self.camera.ease_duration_ms,
            motion: CameraMotion::Ease,
        });
    }

    pub fn set_highlighted(&mut self, id: Option<SiteId>) {
        self.highlighted = id;
        self.apply_halo();
    }

    /// Flies to `target` once; repeating the same target is a no-op.
    pub fn fly_to(&mut self, target: CameraTarget) -> bool {
        if self.last_fly_target == Some(target) {
            return false;
        }
        self.last_fly_target = Some(target);
        self.move_camera(CameraMove {
            center: target.center,
            zoom: target.zoom,
            duration_ms: self.camera.fly_duration_ms,
            motion: CameraMotion::Fly,
        });
        true
    }

    /// Shows the calibrated overlay of `site`, replacing any other.
    pub fn show_overlay(
        &mut self,
        site: &SiteId,
        asset: &OverlayAsset,
        url: &str,
        visible: bool,
        opacity: f64,
    ) -> bool {
        self.overlay
            .show(&mut self.engine, site, asset, url, visible, opacity)
    }

    pub fn set_overlay_visible(&mut self, visible: bool) -> bool {
        self.overlay.set_visible(&mut self.engine, visible)
    }

    pub fn set_overlay_opacity(&mut self, opacity: f64) -> Option<f64> {
        self.overlay.set_opacity(&mut self.engine, opacity)
    }

    /// Removes the raster source/layer pair of `site`; no-op if absent.
    pub fn cleanup_overlay(&mut self, site: &SiteId) {
        if self.overlay.active_site() == Some(site) {
            self.overlay.clear(&mut self.engine);
        } else {
            remove_layer_and_source(
                &mut self.engine,
                &overlay_layer_id(site),
                &overlay_source_id(site),
            );
        }
    }

    pub fn resize(&mut self) {
        if self.ready {
            self.engine.resize();
        }
    }

    pub fn drain_events(&mut self) -> Vec<Stamped<MapEvent>> {
        self.events.drain()
    }

    fn move_camera(&mut self, camera: CameraMove) {
        if self.ready {
            self.engine.move_camera(camera);
        } else {
            self.pending_camera = Some(camera);
        }
    }

    fn apply_halo(&mut self) {
        if !self.ready {
            return;
        }
        let id = self
            .hovered
            .as_ref()
            .or(self.highlighted.as_ref())
            .map(SiteId::as_str)
            .unwrap_or("");
        if let Err(e) = self.engine.set_filter(HALO_LAYER, id_filter(id)) {
            warn!(error = %e, "halo filter update failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{CameraPolicy, ClusterMapController, MapEvent};
    use crate::engine::{CameraMotion, MapEngine, SourceSpec};
    use crate::headless::HeadlessEngine;
    use crate::layer::{HALO_LAYER, SITES_SOURCE, id_filter};
    use crate::raster::overlay_source_id;
    use crate::symbology::ClusterStyle;
    use foundation::{CameraTarget, LngLat, SiteId};
    use scene::{FilterPredicate, OverlayAsset, OverlayBounds, Site, SiteIndex, build_features};

    fn sites() -> Vec<Site> {
        vec![
            Site::new("a", "Alpha", LngLat::new(100.0, 14.0).unwrap(), "wind", "P1", 2020),
            Site::new("b", "Bravo", LngLat::new(101.0, 15.0).unwrap(), "solar", "P2", 2021),
        ]
    }

    fn controller(engine: HeadlessEngine) -> ClusterMapController<HeadlessEngine> {
        let mut c = ClusterMapController::new(engine, ClusterStyle::default(), CameraPolicy::default());
        c.set_site_index(SiteIndex::new(sites()));
        c
    }

    fn feature_count(engine: &HeadlessEngine) -> usize {
        match engine.source(SITES_SOURCE) {
            Some(SourceSpec::GeoJson { data, .. }) => data["features"].as_array().map_or(0, |a| a.len()),
            _ => 0,
        }
    }

    #[test]
    fn features_before_ready_are_applied_on_ready() {
        let mut c = controller(HeadlessEngine::new());
        let features = build_features(&sites(), &FilterPredicate::any());
        c.set_features(&features);
        c.set_highlighted(Some(SiteId::new("b")));
        assert!(c.engine().source_ids().is_empty());

        c.engine_mut().set_ready();
        c.on_ready();
        assert_eq!(feature_count(c.engine()), 2);
        assert_eq!(c.engine().layer_ids().len(), 4);
        assert_eq!(c.engine().layer(HALO_LAYER).unwrap().filter, Some(id_filter("b")));
    }

    #[test]
    fn set_features_is_idempotent() {
        let mut c = controller(HeadlessEngine::ready());
        c.on_ready();
        let features = build_features(&sites(), &FilterPredicate::any());
        c.set_features(&features);
        c.set_features(&features);
        assert_eq!(feature_count(c.engine()), 2);
        assert_eq!(c.engine().source_ids(), vec![SITES_SOURCE]);
    }

    #[test]
    fn point_click_selects_and_never_zooms_out() {
        let mut engine = HeadlessEngine::ready();
        engine.set_zoom(15.0);
        let mut c = controller(engine);
        c.on_ready();

        let site = c.on_point_click("a").expect("resolved");
        assert_eq!(site.name, "Alpha");
        let cam = c.engine().last_camera().unwrap();
        assert_eq!(cam.zoom, 15.0);
        assert_eq!(cam.motion, CameraMotion::Ease);

        c.engine_mut().set_zoom(3.0);
        c.on_point_click("b");
        assert_eq!(c.engine().last_camera().unwrap().zoom, 12.0);

        let events: Vec<MapEvent> = c.drain_events().into_iter().map(|s| s.event).collect();
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], MapEvent::SiteSelected(s) if s.id.as_str() == "a"));
        assert_eq!(c.highlighted(), Some(&SiteId::new("b")));
    }

    #[test]
    fn unknown_click_is_ignored() {
        let mut c = controller(HeadlessEngine::ready());
        c.on_ready();
        assert!(c.on_point_click("zz").is_none());
        assert!(c.drain_events().is_empty());
        assert!(c.engine().camera_moves().is_empty());
    }

    #[test]
    fn cluster_click_eases_to_expansion_zoom() {
        let mut c = controller(HeadlessEngine::ready());
        c.on_ready();
        let center = LngLat::new(100.5, 14.5).unwrap();
        c.on_cluster_click(7, center);
        assert_eq!(c.engine().expansion_requests(), &[(SITES_SOURCE.to_string(), 7)]);
        c.on_cluster_expansion_zoom(7, 9.0);
        let cam = c.engine().last_camera().unwrap();
        assert_eq!((cam.center, cam.zoom), (center, 9.0));
        c.on_cluster_expansion_zoom(7, 11.0);
        assert_eq!(c.engine().camera_moves().len(), 1);
    }

    #[test]
    fn hover_overrides_highlight_until_left() {
        let mut c = controller(HeadlessEngine::ready());
        c.on_ready();
        c.set_highlighted(Some(SiteId::new("a")));
        c.on_point_hover(Some("b"));
        assert_eq!(c.engine().layer(HALO_LAYER).unwrap().filter, Some(id_filter("b")));
        c.on_point_hover(None);
        assert_eq!(c.engine().layer(HALO_LAYER).unwrap().filter, Some(id_filter("a")));

        let events: Vec<MapEvent> = c.drain_events().into_iter().map(|s| s.event).collect();
        match &events[..] {
            [MapEvent::Hover(Some(t)), MapEvent::Hover(None)] => assert_eq!(t.name, "Bravo"),
            other => panic!("unexpected events {other:?}"),
        }
    }

    #[test]
    fn fly_to_is_applied_once_per_target() {
        let mut c = controller(HeadlessEngine::new());
        let target = CameraTarget::new(LngLat::new(100.0, 13.0).unwrap(), 8.0);
        assert!(c.fly_to(target));
        assert!(!c.fly_to(target));
        c.engine_mut().set_ready();
        c.on_ready();
        assert_eq!(c.engine().camera_moves().len(), 1);
        assert_eq!(c.engine().last_camera().unwrap().motion, CameraMotion::Fly);
        assert!(!c.fly_to(target));
        assert_eq!(c.engine().camera_moves().len(), 1);
    }

    #[test]
    fn cleanup_overlay_is_idempotent() {
        let mut c = controller(HeadlessEngine::ready());
        c.on_ready();
        let a = SiteId::new("a");
        let p = |lng: f64, lat: f64| LngLat::new(lng, lat).unwrap();
        let asset = OverlayAsset::new(
            "a.png",
            OverlayBounds {
                top_left: p(100.0, 14.1),
                top_right: p(100.1, 14.1),
                bottom_right: p(100.1, 14.0),
                bottom_left: p(100.0, 14.0),
            },
        );
        assert!(c.show_overlay(&a, &asset, "u", true, 0.8));
        assert!(c.engine().has_source(&overlay_source_id(&a)));
        c.cleanup_overlay(&a);
        c.cleanup_overlay(&a);
        assert!(!c.engine().has_source(&overlay_source_id(&a)));
        assert!(c.overlay().active_site().is_none());
    }

    #[test]
    fn resize_before_ready_is_dropped() {
        let mut c = controller(HeadlessEngine::new());
        c.resize();
        assert_eq!(c.engine().resizes(), 0);
    }
}
