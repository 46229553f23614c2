use foundation::SiteId;
use scene::{OverlayAsset, OverlayBounds, clamp_opacity};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::engine::{MapEngine, SourceSpec, remove_layer_and_source};
use crate::layer::{LayerKind, LayerSpec};

pub fn overlay_source_id(site: &SiteId) -> String {
    format!("overlay-{site}")
}

pub fn overlay_layer_id(site: &SiteId) -> String {
    format!("overlay-layer-{site}")
}

#[derive(Debug, Clone, PartialEq)]
struct ActiveOverlay {
    site: SiteId,
    url: String,
    bounds: OverlayBounds,
    visible: bool,
    opacity: f64,
    /// Source and layer exist in the engine.
    created: bool,
}

/// Display side of the site overlay: at most one raster source at a time.
///
/// The raster is only fetched once it is first shown; hiding keeps the layer
/// around with visibility off.
#[derive(Debug, Default)]
pub struct OverlayDisplay {
    active: Option<ActiveOverlay>,
}

impl OverlayDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_site(&self) -> Option<&SiteId> {
        self.active.as_ref().map(|a| &a.site)
    }

    pub fn is_visible(&self) -> bool {
        self.active.as_ref().is_some_and(|a| a.visible && a.created)
    }

    pub fn opacity(&self) -> Option<f64> {
        self.active.as_ref().map(|a| a.opacity)
    }

    /// Makes `asset` the displayed overlay for `site`.
    ///
    /// Any overlay of another site is removed first. Returns `false` when the
    /// asset is not fully calibrated, in which case nothing is shown.
    pub fn show<E: MapEngine + ?Sized>(
        &mut self,
        engine: &mut E,
        site: &SiteId,
        asset: &OverlayAsset,
        url: &str,
        visible: bool,
        opacity: f64,
    ) -> bool {
        if self.active.as_ref().is_some_and(|a| &a.site != site) {
            self.clear(engine);
        }
        let Some(bounds) = asset.bounds() else {
            debug!(site = %site, "overlay not calibrated; nothing to show");
            return false;
        };

        let stale = self
            .active
            .as_ref()
            .is_some_and(|a| a.url != url || a.bounds != bounds);
        if stale {
            self.clear(engine);
        }

        if self.active.is_none() {
            self.active = Some(ActiveOverlay {
                site: site.clone(),
                url: url.to_string(),
                bounds,
                visible: false,
                opacity: clamp_opacity(opacity),
                created: false,
            });
        }
        self.set_opacity(engine, opacity);
        self.set_visible(engine, visible);
        true
    }

    /// Returns whether the overlay is visible afterwards.
    pub fn set_visible<E: MapEngine + ?Sized>(&mut self, engine: &mut E, visible: bool) -> bool {
        let Some(active) = self.active.as_mut() else {
            return false;
        };
        active.visible = visible;
        if visible && !active.created {
            active.created = create(engine, active);
        } else if active.created {
            let layer = overlay_layer_id(&active.site);
            if let Err(e) = engine.set_layer_visibility(&layer, visible) {
                warn!(layer = %layer, error = %e, "overlay visibility update failed");
            }
        }
        active.visible && active.created
    }

    /// Applies a clamped opacity to the existing layer; returns the applied value.
    pub fn set_opacity<E: MapEngine + ?Sized>(&mut self, engine: &mut E, opacity: f64) -> Option<f64> {
        let active = self.active.as_mut()?;
        active.opacity = clamp_opacity(opacity);
        if active.created {
            let layer = overlay_layer_id(&active.site);
            if let Err(e) = engine.set_paint_property(&layer, "raster-opacity", json!(active.opacity)) {
                warn!(layer = %layer, error = %e, "overlay opacity update failed");
            }
        }
        Some(active.opacity)
    }

    /// Removes source and layer of the active overlay, if any.
    pub fn clear<E: MapEngine + ?Sized>(&mut self, engine: &mut E) {
        if let Some(active) = self.active.take() {
            remove_layer_and_source(
                engine,
                &overlay_layer_id(&active.site),
                &overlay_source_id(&active.site),
            );
            debug!(site = %active.site, "overlay removed");
        }
    }
}

fn create<E: MapEngine + ?Sized>(engine: &mut E, active: &ActiveOverlay) -> bool {
    if !engine.is_ready() {
        debug!(site = %active.site, "engine not ready; overlay deferred");
        return false;
    }
    let source = overlay_source_id(&active.site);
    let layer = overlay_layer_id(&active.site);
    // An identically named leftover is replaced, never duplicated.
    remove_layer_and_source(engine, &layer, &source);

    let spec = SourceSpec::Image {
        url: active.url.clone(),
        coordinates: active.bounds.to_coordinates(),
    };
    if let Err(e) = engine.add_source(&source, spec) {
        warn!(source = %source, error = %e, "overlay source rejected");
        return false;
    }
    let layer_spec = LayerSpec::new(layer.as_str(), LayerKind::Raster, source.as_str())
        .paint("raster-opacity", json!(active.opacity))
        .paint("raster-fade-duration", json!(0))
        .with_visibility(active.visible);
    if let Err(e) = engine.add_layer(layer_spec) {
        warn!(layer = %layer, error = %e, "overlay layer rejected");
        engine.remove_source(&source);
        return false;
    }
    info!(site = %active.site, opacity = active.opacity, "overlay shown");
    true
}

#[cfg(test)]
mod tests {
    use super::{OverlayDisplay, overlay_layer_id, overlay_source_id};
    use crate::engine::MapEngine;
    use crate::headless::HeadlessEngine;
    use foundation::{LngLat, SiteId};
    use scene::{CornerSet, OverlayAsset, OverlayBounds};
    use serde_json::json;

    fn bounds(dx: f64) -> OverlayBounds {
        let p = |lng: f64, lat: f64| LngLat::new(lng + dx, lat).unwrap();
        OverlayBounds {
            top_left: p(100.0, 14.0),
            top_right: p(100.1, 14.0),
            bottom_right: p(100.1, 13.9),
            bottom_left: p(100.0, 13.9),
        }
    }

    #[test]
    fn hidden_overlay_is_not_fetched_until_shown() {
        let mut engine = HeadlessEngine::ready();
        let mut display = OverlayDisplay::new();
        let a = SiteId::new("a");
        assert!(display.show(&mut engine, &a, &OverlayAsset::new("a.png", bounds(0.0)), "u/a.png", false, 0.8));
        assert_eq!(engine.image_source_count(), 0);

        assert!(display.set_visible(&mut engine, true));
        assert!(engine.has_source(&overlay_source_id(&a)));
        let layer = engine.layer(&overlay_layer_id(&a)).unwrap();
        assert_eq!(layer.paint["raster-opacity"], json!(0.8));

        assert!(!display.set_visible(&mut engine, false));
        assert!(engine.has_source(&overlay_source_id(&a)));
        assert!(!engine.layer(&overlay_layer_id(&a)).unwrap().is_visible());
    }

    #[test]
    fn opacity_updates_the_existing_layer() {
        let mut engine = HeadlessEngine::ready();
        let mut display = OverlayDisplay::new();
        let a = SiteId::new("a");
        display.show(&mut engine, &a, &OverlayAsset::new("a.png", bounds(0.0)), "u", true, 0.8);
        let writes = engine.source_writes();

        assert_eq!(display.set_opacity(&mut engine, 0.01), Some(0.05));
        assert_eq!(engine.source_writes(), writes);
        let layer = engine.layer(&overlay_layer_id(&a)).unwrap();
        assert_eq!(layer.paint["raster-opacity"], json!(0.05));
    }

    #[test]
    fn switching_sites_removes_previous_overlay_first() {
        let mut engine = HeadlessEngine::ready();
        let mut display = OverlayDisplay::new();
        let a = SiteId::new("a");
        let b = SiteId::new("b");
        display.show(&mut engine, &a, &OverlayAsset::new("a.png", bounds(0.0)), "ua", true, 0.8);
        display.show(&mut engine, &b, &OverlayAsset::new("b.png", bounds(1.0)), "ub", true, 0.8);

        assert_eq!(engine.image_source_count(), 1);
        assert!(!engine.has_source(&overlay_source_id(&a)));
        assert!(engine.has_source(&overlay_source_id(&b)));
        assert_eq!(display.active_site(), Some(&b));
    }

    #[test]
    fn partial_overlay_is_never_rendered() {
        let mut engine = HeadlessEngine::ready();
        let mut display = OverlayDisplay::new();
        let partial = OverlayAsset::partial("p.png", CornerSet::new());
        assert!(!display.show(&mut engine, &SiteId::new("p"), &partial, "u", true, 0.8));
        assert_eq!(engine.image_source_count(), 0);
        assert!(!display.set_visible(&mut engine, true));
    }

    #[test]
    fn clear_is_idempotent() {
        let mut engine = HeadlessEngine::ready();
        let mut display = OverlayDisplay::new();
        let a = SiteId::new("a");
        display.show(&mut engine, &a, &OverlayAsset::new("a.png", bounds(0.0)), "u", true, 0.8);
        display.clear(&mut engine);
        display.clear(&mut engine);
        assert_eq!(engine.image_source_count(), 0);
        assert!(engine.layer_ids().is_empty());
    }
}
