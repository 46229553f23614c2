use std::collections::HashMap;
use std::sync::Arc;

use catalog::validate::ModelAnchorForm;
use catalog::{AssetClass, CatalogError, SiteStore, Snapshot, SnapshotStore, resolve};
use formats::ModelScene;
use foundation::math::Mat4;
use foundation::{CameraTarget, LngLat, SiteId};
use gpu::{DeviceProfile, GpuContext, LoadTicket, ModelAnchorRenderer, ModelViewState};
use layers::{ClusterMapController, MapEngine, MapEvent, MarkerId, Tooltip};
use runtime::{Debouncer, EventBus, Frame, FrameClock, GenerationToken, Stamped};
use scene::{
    Corner, Facets, FeatureCollection, FilterPredicate, ModelAnchor, OverlayAsset, OverlayBounds,
    RenderHandle, Site, SiteIndex, ValidationError, ViewportSelection, build_features,
};
use streaming::{AssetCache, LoadError, MemoryBudget};
use tracing::{debug, info, warn};

use crate::calibration::CalibrationSession;
use crate::config::ViewerConfig;

#[derive(Debug, thiserror::Error)]
pub enum ViewerError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("unknown site {0}")]
    UnknownSite(SiteId),
    #[error("site {0} has no overlay image")]
    NoImage(SiteId),
    #[error("no calibration in progress")]
    NoCalibration,
    #[error("calibration has {filled} of 4 corners")]
    IncompleteCalibration { filled: usize },
}

/// Outbound notifications for the surrounding page.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewerEvent {
    SelectionChanged(Option<Site>),
    Hover(Option<Tooltip>),
    ModelState(ModelViewState),
}

/// Selection glue between the point map, the overlay display, calibration and
/// the 3D model renderer.
///
/// Every selection change releases the previous site's overlay and model
/// before anything is created for the new one.
pub struct PanelMapOrchestrator<E: MapEngine, G: GpuContext> {
    config: ViewerConfig,
    map: ClusterMapController<E>,
    gpu: G,
    snapshots: SnapshotStore,
    index: SiteIndex,
    facets: Facets,
    predicate: FilterPredicate,
    filter_input: Debouncer<FilterPredicate>,
    features: FeatureCollection,
    selection: ViewportSelection,
    tooltip: Option<Tooltip>,
    panel_open: bool,
    resize_due_at: Option<f64>,
    initial_camera: Option<CameraTarget>,
    initial_camera_applied: bool,
    calibration: Option<CalibrationSession>,
    model: ModelAnchorRenderer,
    models: AssetCache,
    inflight: HashMap<GenerationToken, String>,
    pinned: Option<String>,
    device: DeviceProfile,
    clock: FrameClock,
    events: EventBus<ViewerEvent>,
}

impl<E: MapEngine, G: GpuContext> PanelMapOrchestrator<E, G> {
    pub fn new(engine: E, gpu: G, config: ViewerConfig) -> Self {
        let map = ClusterMapController::new(engine, config.cluster.clone(), config.camera.clone());
        Self {
            map,
            gpu,
            snapshots: SnapshotStore::new(),
            index: SiteIndex::default(),
            facets: Facets::default(),
            predicate: FilterPredicate::any(),
            filter_input: Debouncer::new(config.timing.filter_debounce_ms),
            features: FeatureCollection::empty(),
            selection: ViewportSelection::new(config.overlay.default_opacity),
            tooltip: None,
            panel_open: false,
            resize_due_at: None,
            initial_camera: None,
            initial_camera_applied: false,
            calibration: None,
            model: ModelAnchorRenderer::new(config.rotation),
            models: AssetCache::new(MemoryBudget::new(config.model_cache_bytes())),
            inflight: HashMap::new(),
            pinned: None,
            device: DeviceProfile::default(),
            clock: FrameClock::new(),
            events: EventBus::new(),
            config,
        }
    }

    /// Camera target from the page URL, applied on first readiness only.
    pub fn with_initial_camera(mut self, target: Option<CameraTarget>) -> Self {
        self.initial_camera = target;
        self
    }

    pub fn set_device_profile(&mut self, device: DeviceProfile) {
        self.device = device;
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn map(&self) -> &ClusterMapController<E> {
        &self.map
    }

    pub fn engine(&self) -> &E {
        self.map.engine()
    }

    pub fn engine_mut(&mut self) -> &mut E {
        self.map.engine_mut()
    }

    pub fn gpu(&self) -> &G {
        &self.gpu
    }

    pub fn gpu_mut(&mut self) -> &mut G {
        &mut self.gpu
    }

    pub fn snapshot(&self) -> &Arc<Snapshot> {
        self.snapshots.current()
    }

    pub fn features(&self) -> &FeatureCollection {
        &self.features
    }

    pub fn facets(&self) -> &Facets {
        &self.facets
    }

    pub fn predicate(&self) -> &FilterPredicate {
        &self.predicate
    }

    pub fn selection(&self) -> &ViewportSelection {
        &self.selection
    }

    pub fn selected_site(&self) -> Option<&Site> {
        self.selection.site().and_then(|id| self.index.get(id))
    }

    pub fn tooltip(&self) -> Option<&Tooltip> {
        self.tooltip.as_ref()
    }

    pub fn is_panel_open(&self) -> bool {
        self.panel_open
    }

    pub fn model_state(&self) -> ModelViewState {
        self.model.state()
    }

    pub fn model_renderer(&self) -> &ModelAnchorRenderer {
        &self.model
    }

    pub fn model_cache(&self) -> &AssetCache {
        &self.models
    }

    pub fn calibration(&self) -> Option<&CalibrationSession> {
        self.calibration.as_ref()
    }

    pub fn drain_events(&mut self) -> Vec<Stamped<ViewerEvent>> {
        self.events.drain()
    }

    /// Takes a new data-store snapshot. Identical content is ignored.
    pub fn replace_snapshot(&mut self, snapshot: Snapshot) -> Result<bool, CatalogError> {
        if !self.snapshots.replace(snapshot)? {
            return Ok(false);
        }
        let current = Arc::clone(self.snapshots.current());
        self.index = SiteIndex::new(current.sites.clone());
        self.map.set_site_index(self.index.clone());
        self.facets = Facets::collect(&current.sites, &current.clients);
        self.rebuild_features();
        self.refresh_selection();
        info!(sites = current.sites.len(), clients = current.clients.len(), "snapshot applied");
        Ok(true)
    }

    /// Queues a filter change; it is applied once input settles (see [`tick`](Self::tick)).
    pub fn set_filter(&mut self, predicate: FilterPredicate, now_ms: f64) {
        self.filter_input.push(predicate, now_ms);
    }

    /// Advances time: settles debounced filters and fires due panel resizes.
    pub fn tick(&mut self, now_ms: f64) -> Frame {
        let frame = self.clock.tick(now_ms);
        self.map.set_frame(frame);
        if let Some(predicate) = self.filter_input.poll(now_ms) {
            if predicate != self.predicate {
                self.predicate = predicate;
                self.rebuild_features();
            }
        }
        if self.resize_due_at.is_some_and(|due| now_ms >= due) {
            self.resize_due_at = None;
            self.map.resize();
        }
        frame
    }

    pub fn on_map_ready(&mut self) {
        self.map.on_ready();
        if !self.initial_camera_applied {
            self.initial_camera_applied = true;
            if let Some(target) = self.initial_camera {
                debug!(zoom = target.zoom, "applying initial camera");
                self.map.fly_to(target);
            }
        }
    }

    pub fn fly_to(&mut self, target: CameraTarget) -> bool {
        self.map.fly_to(target)
    }

    /// Selects `id` (or clears with `None`). Returns whether the selection changed.
    ///
    /// Unknown ids are ignored.
    pub fn select_site(&mut self, id: Option<SiteId>) -> bool {
        let site = match &id {
            Some(id) => match self.index.get(id) {
                Some(s) if s.is_active() => Some(s.clone()),
                Some(_) => {
                    debug!(site = %id, "selection of inactive site ignored");
                    return false;
                }
                None => {
                    debug!(site = %id, "selection of unknown site ignored");
                    return false;
                }
            },
            None => None,
        };
        let has_overlay = site.as_ref().is_some_and(|s| s.calibrated_overlay().is_some());
        let Some(change) = self.selection.select(id.clone(), has_overlay) else {
            return false;
        };

        if let Some(previous) = &change.previous {
            self.map.cleanup_overlay(previous);
        }
        if self.model.is_active() || change.previous_model.is_some() {
            self.release_model();
            self.emit(ViewerEvent::ModelState(self.model.state()));
        }
        if let Some(session) = self.calibration.take() {
            session.close(self.map.engine_mut());
        }

        self.map.set_highlighted(id);
        if let Some(site) = &site {
            let visible = self
                .selection
                .set_overlay_visible(self.config.overlay.visible_on_select);
            self.show_overlay_for(site, visible);
        }
        self.set_panel_open(site.is_some());
        self.emit(ViewerEvent::SelectionChanged(site));
        true
    }

    /// Routes events emitted by the map since the last call.
    pub fn handle_map_events(&mut self) -> usize {
        let events = self.map.drain_events();
        let n = events.len();
        for stamped in events {
            match stamped.event {
                MapEvent::SiteSelected(site) => {
                    self.select_site(Some(site.id));
                }
                MapEvent::Hover(tooltip) => {
                    self.tooltip = tooltip.clone();
                    self.emit(ViewerEvent::Hover(tooltip));
                }
            }
        }
        n
    }

    /// Host input: a click on an unclustered point.
    pub fn point_clicked(&mut self, feature_id: &str) {
        if self.calibration.is_some() {
            return;
        }
        self.map.on_point_click(feature_id);
        self.handle_map_events();
    }

    pub fn point_hovered(&mut self, feature_id: Option<&str>) {
        self.map.on_point_hover(feature_id);
        self.handle_map_events();
    }

    pub fn cluster_clicked(&mut self, cluster_id: u64, center: LngLat) {
        self.map.on_cluster_click(cluster_id, center);
    }

    pub fn cluster_expansion_zoom(&mut self, cluster_id: u64, zoom: f64) {
        self.map.on_cluster_expansion_zoom(cluster_id, zoom);
    }

    /// Returns whether the overlay is visible afterwards; sites without one stay off.
    pub fn set_overlay_visible(&mut self, visible: bool) -> bool {
        if !self.selection.overlay_available() {
            return false;
        }
        let visible = self.selection.set_overlay_visible(visible);
        self.map.set_overlay_visible(visible)
    }

    pub fn set_overlay_opacity(&mut self, opacity: f64) -> Option<f64> {
        if !self.selection.overlay_available() {
            return None;
        }
        let opacity = self.selection.set_overlay_opacity(opacity);
        self.map.set_overlay_opacity(opacity)
    }

    /// Enters 3D mode for the selected site.
    ///
    /// Returns the load the host must run, or `None` when there is nothing to
    /// load (no model, or the parsed model was cached).
    pub fn view_3d(&mut self) -> Option<LoadTicket> {
        let id = self.selection.site()?.clone();
        let anchor = self.index.get(&id)?.model.clone()?;
        let Some(url) = resolve(anchor.asset(), AssetClass::Model, &self.config.storage) else {
            warn!(site = %id, "model asset path is blank");
            return None;
        };
        self.release_model();

        let ticket = self
            .model
            .activate(self.map.engine_mut(), &mut self.gpu, id, anchor, url.clone());
        self.selection.attach_model(RenderHandle(ticket.token.value()));
        self.emit(ViewerEvent::ModelState(self.model.state()));

        if let Some(scene) = self.models.get(&url) {
            debug!(url = %url, "model served from cache");
            self.model.complete(self.map.engine_mut(), ticket.token, Ok(scene));
            self.models.pin(&url);
            self.pinned = Some(url);
            self.emit(ViewerEvent::ModelState(self.model.state()));
            return None;
        }
        self.inflight.insert(ticket.token, url);
        Some(ticket)
    }

    pub fn model_progress(&mut self, token: GenerationToken, percent: u8) -> bool {
        let applied = self.model.on_progress(token, percent);
        if applied {
            self.emit(ViewerEvent::ModelState(self.model.state()));
        }
        applied
    }

    /// Delivers a finished load. Stale results are cached but never shown.
    pub fn model_loaded(&mut self, token: GenerationToken, result: Result<ModelScene, LoadError>) -> bool {
        let url = self.inflight.remove(&token);
        let result = match result {
            Ok(scene) => {
                let scene = Arc::new(scene);
                if let Some(url) = &url {
                    if let Err(e) = self.models.insert(url.clone(), Arc::clone(&scene)) {
                        debug!(url = %url, error = %e, "model not cached");
                    }
                }
                Ok(scene)
            }
            Err(e) => Err(e.to_string()),
        };
        let applied = self.model.complete(self.map.engine_mut(), token, result);
        if applied {
            if self.model.state() == ModelViewState::Ready {
                if let Some(url) = url {
                    self.models.pin(&url);
                    self.pinned = Some(url);
                }
            }
            self.emit(ViewerEvent::ModelState(self.model.state()));
        }
        applied
    }

    pub fn retry_3d(&mut self) -> Option<LoadTicket> {
        let ticket = self.model.retry()?;
        self.inflight.insert(ticket.token, ticket.url.clone());
        self.selection.attach_model(RenderHandle(ticket.token.value()));
        self.emit(ViewerEvent::ModelState(self.model.state()));
        Some(ticket)
    }

    pub fn exit_3d(&mut self) {
        if !self.model.is_active() {
            return;
        }
        self.release_model();
        self.emit(ViewerEvent::ModelState(self.model.state()));
    }

    /// Custom-layer draw hook; `camera` is the host's projection matrix for this frame.
    pub fn render_frame(&mut self, camera: &Mat4) -> bool {
        let before = self.model.state();
        let drawn = self.model.render(self.map.engine_mut(), &mut self.gpu, camera);
        let after = self.model.state();
        if after != before {
            self.emit(ViewerEvent::ModelState(after));
        }
        drawn
    }

    pub fn model_pointer_down(&mut self, x: f64) -> bool {
        self.model.pointer_down(self.map.engine_mut(), x)
    }

    pub fn model_pointer_move(&mut self, x: f64) -> bool {
        self.model.pointer_move(self.map.engine_mut(), x)
    }

    pub fn model_pointer_up(&mut self) {
        self.model.pointer_up(self.map.engine_mut());
    }

    pub fn reset_model_rotation(&mut self) {
        self.model.reset_rotation(self.map.engine_mut());
    }

    pub fn model_advisory(&self) -> Option<String> {
        self.model
            .advisory(&self.device, self.config.advisory_memory_gb)
    }

    pub fn dismiss_model_advisory(&mut self) {
        self.model.dismiss_advisory();
    }

    /// Closes the detail panel, releasing everything tied to the selection.
    pub fn close_panel(&mut self) {
        if !self.select_site(None) {
            self.set_panel_open(false);
        }
    }

    /// Starts placing corners for `site`.
    ///
    /// `image` defaults to the site's current overlay image. The display
    /// overlay of that site is removed while the draft is shown.
    pub fn begin_calibration(&mut self, site: &SiteId, image: Option<&str>) -> Result<(), ViewerError> {
        let record = self
            .index
            .get(site)
            .cloned()
            .ok_or_else(|| ViewerError::UnknownSite(site.clone()))?;
        let image = image
            .map(str::to_string)
            .or_else(|| record.overlay.as_ref().map(|o| o.image.clone()))
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ViewerError::NoImage(site.clone()))?;
        let url = resolve(&image, AssetClass::OverlayImage, &self.config.storage)
            .ok_or_else(|| ViewerError::NoImage(site.clone()))?;

        if let Some(previous) = self.calibration.take() {
            previous.close(self.map.engine_mut());
        }
        self.map.cleanup_overlay(site);
        if self.selection.site() == Some(site) {
            self.selection.set_overlay_visible(false);
        }
        info!(site = %site, image = %image, "calibration started");
        self.calibration = Some(CalibrationSession::begin(
            self.map.engine_mut(),
            site.clone(),
            image,
            url,
            record.overlay.as_ref(),
        ));
        Ok(())
    }

    pub fn calibration_click(&mut self, at: LngLat) -> Option<OverlayBounds> {
        let session = self.calibration.as_mut()?;
        session.click(self.map.engine_mut(), at)
    }

    pub fn calibration_drag(&mut self, corner: Corner, at: LngLat) -> Option<OverlayBounds> {
        let session = self.calibration.as_mut()?;
        session.drag(self.map.engine_mut(), corner, at)
    }

    pub fn calibration_marker_dragged(&mut self, marker: MarkerId, at: LngLat) -> Option<OverlayBounds> {
        let session = self.calibration.as_mut()?;
        session.drag_marker(self.map.engine_mut(), marker, at)
    }

    pub fn calibration_reset(&mut self) {
        if let Some(session) = self.calibration.as_mut() {
            session.reset(self.map.engine_mut());
        }
    }

    /// Drops the session without saving and restores the display overlay.
    pub fn cancel_calibration(&mut self) {
        if let Some(session) = self.calibration.take() {
            session.close(self.map.engine_mut());
            self.refresh_selection();
        }
    }

    /// Writes the calibrated overlay through `store` and ends the session.
    pub fn save_calibration<S: SiteStore + ?Sized>(&mut self, store: &mut S) -> Result<OverlayAsset, ViewerError> {
        let session = self.calibration.as_ref().ok_or(ViewerError::NoCalibration)?;
        let asset = session.asset().ok_or(ViewerError::IncompleteCalibration {
            filled: session.filled(),
        })?;
        let site = session.site().clone();
        store.save_overlay(&site, asset.clone())?;

        if let Some(session) = self.calibration.take() {
            session.close(self.map.engine_mut());
        }
        let saved = asset.clone();
        self.apply_local_edit(&site, move |s| s.overlay = Some(saved))?;
        Ok(asset)
    }

    /// Validates an anchor form and writes it through `store`.
    pub fn save_model_anchor<S: SiteStore + ?Sized>(
        &mut self,
        store: &mut S,
        site: &SiteId,
        form: &ModelAnchorForm,
    ) -> Result<ModelAnchor, ViewerError> {
        let anchor = form.parse()?;
        store.save_model(site, anchor.clone())?;
        if self.model.site() == Some(site) {
            self.exit_3d();
        }
        let saved = anchor.clone();
        self.apply_local_edit(site, move |s| s.model = Some(saved))?;
        Ok(anchor)
    }

    fn apply_local_edit(&mut self, id: &SiteId, edit: impl FnOnce(&mut Site)) -> Result<(), ViewerError> {
        let mut snapshot = Snapshot::clone(self.snapshots.current());
        let site = snapshot
            .sites
            .iter_mut()
            .find(|s| &s.id == id)
            .ok_or_else(|| ViewerError::UnknownSite(id.clone()))?;
        edit(site);
        self.replace_snapshot(snapshot)?;
        Ok(())
    }

    fn rebuild_features(&mut self) {
        self.features = build_features(self.index.sites(), &self.predicate);
        debug!(features = self.features.len(), "features rebuilt");
        self.map.set_features(&self.features);
    }

    /// Re-reads the selected site after its record may have changed.
    fn refresh_selection(&mut self) {
        let Some(id) = self.selection.site().cloned() else {
            return;
        };
        let Some(site) = self.index.get(&id).filter(|s| s.is_active()).cloned() else {
            self.select_site(None);
            return;
        };
        if self.calibration.as_ref().is_some_and(|c| c.site() == &id) {
            return;
        }
        let has_overlay = site.calibrated_overlay().is_some();
        self.selection.set_overlay_available(has_overlay);
        if has_overlay {
            self.show_overlay_for(&site, self.selection.overlay_visible());
        } else {
            self.map.cleanup_overlay(&id);
        }
        if site.model.is_none() && self.model.site() == Some(&id) {
            self.exit_3d();
        }
    }

    fn show_overlay_for(&mut self, site: &Site, visible: bool) {
        let Some(asset) = site.calibrated_overlay() else {
            return;
        };
        let Some(url) = resolve(&asset.image, AssetClass::OverlayImage, &self.config.storage) else {
            warn!(site = %site.id, "overlay image path is blank");
            return;
        };
        let opacity = self.selection.overlay_opacity();
        self.map.show_overlay(&site.id, asset, &url, visible, opacity);
    }

    fn release_model(&mut self) {
        self.model.exit(self.map.engine_mut(), &mut self.gpu);
        if let Some(url) = self.pinned.take() {
            self.models.unpin(&url);
        }
        self.selection.detach_model();
    }

    fn set_panel_open(&mut self, open: bool) {
        if self.panel_open == open {
            return;
        }
        self.panel_open = open;
        let now = self.clock.current().time_ms;
        self.resize_due_at = Some(now + self.config.timing.panel_resize_delay_ms);
    }

    fn emit(&mut self, event: ViewerEvent) {
        self.events.emit(self.clock.current(), event);
    }
}
