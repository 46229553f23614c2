use foundation::LngLat;
use scene::{Corner, CornerSet, OverlayBounds};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::engine::{MapEngine, MarkerId, SourceSpec, remove_layer_and_source};
use crate::layer::{LayerKind, LayerSpec};

pub const DRAFT_SOURCE: &str = "calibration-draft";
pub const DRAFT_LAYER: &str = "calibration-draft-layer";
pub const DRAFT_OPACITY: f64 = 0.6;

/// Marker colors in corner order, so the operator can tell handles apart.
pub const CORNER_COLORS: [&str; 4] = ["#ef4444", "#22c55e", "#3b82f6", "#f59e0b"];

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CalibrationState {
    Idle,
    Calibrating,
    Complete,
}

/// Four-click calibration of one overlay image.
///
/// Clicks fill corners in `topLeft, topRight, bottomRight, bottomLeft` order
/// and the cursor wraps, so a fifth click replaces the top-left corner. A draft
/// raster exists only while all four corners are set.
#[derive(Debug)]
pub struct OverlayCalibrationEngine {
    image_url: Option<String>,
    corners: CornerSet,
    markers: [Option<MarkerId>; 4],
    cursor: usize,
    state: CalibrationState,
}

impl Default for OverlayCalibrationEngine {
    fn default() -> Self {
        Self {
            image_url: None,
            corners: CornerSet::new(),
            markers: [None; 4],
            cursor: 0,
            state: CalibrationState::Idle,
        }
    }
}

impl OverlayCalibrationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> CalibrationState {
        self.state
    }

    /// Corner the next click assigns.
    pub fn next_corner(&self) -> Corner {
        Corner::ALL[self.cursor]
    }

    pub fn corners(&self) -> &CornerSet {
        &self.corners
    }

    pub fn image_url(&self) -> Option<&str> {
        self.image_url.as_deref()
    }

    pub fn is_complete(&self) -> bool {
        self.state == CalibrationState::Complete
    }

    pub fn bounds(&self) -> Option<OverlayBounds> {
        self.corners.bounds()
    }

    /// Corner a draggable marker stands for.
    pub fn corner_of_marker(&self, marker: MarkerId) -> Option<Corner> {
        let i = self.markers.iter().position(|m| *m == Some(marker))?;
        Corner::from_index(i)
    }

    /// Starts calibrating `image_url`, discarding any previous progress.
    pub fn begin<E: MapEngine + ?Sized>(&mut self, engine: &mut E, image_url: impl Into<String>) {
        self.clear_engine_state(engine);
        self.corners.clear();
        self.cursor = 0;
        self.image_url = Some(image_url.into());
        self.state = CalibrationState::Calibrating;
        debug!("calibration started");
    }

    /// Like [`begin`](Self::begin), but seeded with previously saved corners.
    pub fn begin_with<E: MapEngine + ?Sized>(
        &mut self,
        engine: &mut E,
        image_url: impl Into<String>,
        corners: CornerSet,
    ) -> Option<OverlayBounds> {
        self.begin(engine, image_url);
        for corner in Corner::ALL {
            if let Some(at) = corners.get(corner) {
                self.place(engine, corner, at);
            }
        }
        self.cursor = Corner::ALL
            .iter()
            .position(|c| corners.get(*c).is_none())
            .unwrap_or(0);
        self.revalidate(engine)
    }

    /// Assigns the clicked point to the cursor corner.
    ///
    /// Returns the finished bounds whenever all four corners are set.
    pub fn click<E: MapEngine + ?Sized>(&mut self, engine: &mut E, at: LngLat) -> Option<OverlayBounds> {
        if self.state == CalibrationState::Idle {
            debug!("calibration click without image ignored");
            return None;
        }
        let corner = self.next_corner();
        self.place(engine, corner, at);
        self.cursor = (self.cursor + 1) % Corner::ALL.len();
        self.revalidate(engine)
    }

    /// Moves an already placed corner; unset corners cannot be dragged.
    pub fn drag_corner<E: MapEngine + ?Sized>(
        &mut self,
        engine: &mut E,
        corner: Corner,
        at: LngLat,
    ) -> Option<OverlayBounds> {
        if self.state == CalibrationState::Idle || self.corners.get(corner).is_none() {
            return None;
        }
        self.place(engine, corner, at);
        self.revalidate(engine)
    }

    /// Clears corners, markers and draft raster; keeps the image.
    pub fn reset<E: MapEngine + ?Sized>(&mut self, engine: &mut E) {
        self.clear_engine_state(engine);
        self.corners.clear();
        self.cursor = 0;
        self.state = if self.image_url.is_some() {
            CalibrationState::Calibrating
        } else {
            CalibrationState::Idle
        };
    }

    /// Leaves calibration entirely.
    pub fn close<E: MapEngine + ?Sized>(&mut self, engine: &mut E) {
        self.reset(engine);
        self.image_url = None;
        self.state = CalibrationState::Idle;
    }

    fn place<E: MapEngine + ?Sized>(&mut self, engine: &mut E, corner: Corner, at: LngLat) {
        self.corners.set(corner, at);
        let i = corner.index();
        match self.markers[i] {
            Some(marker) => engine.move_marker(marker, at),
            None => self.markers[i] = Some(engine.add_marker(at, CORNER_COLORS[i], true)),
        }
    }

    fn revalidate<E: MapEngine + ?Sized>(&mut self, engine: &mut E) -> Option<OverlayBounds> {
        let Some(bounds) = self.corners.bounds() else {
            self.state = CalibrationState::Calibrating;
            return None;
        };
        if self.state != CalibrationState::Complete {
            info!("calibration complete");
        }
        self.state = CalibrationState::Complete;
        self.update_draft(engine, &bounds);
        Some(bounds)
    }

    fn update_draft<E: MapEngine + ?Sized>(&self, engine: &mut E, bounds: &OverlayBounds) {
        let Some(url) = self.image_url.as_deref() else {
            return;
        };
        if engine.has_source(DRAFT_SOURCE) {
            if let Err(e) = engine.set_image_coordinates(DRAFT_SOURCE, bounds.to_coordinates()) {
                warn!(error = %e, "draft overlay update failed");
            }
            return;
        }
        let spec = SourceSpec::Image {
            url: url.to_string(),
            coordinates: bounds.to_coordinates(),
        };
        if let Err(e) = engine.add_source(DRAFT_SOURCE, spec) {
            warn!(error = %e, "draft overlay source rejected");
            return;
        }
        let layer = LayerSpec::new(DRAFT_LAYER, LayerKind::Raster, DRAFT_SOURCE)
            .paint("raster-opacity", json!(DRAFT_OPACITY));
        if let Err(e) = engine.add_layer(layer) {
            warn!(error = %e, "draft overlay layer rejected");
            engine.remove_source(DRAFT_SOURCE);
        }
    }

    fn clear_engine_state<E: MapEngine + ?Sized>(&mut self, engine: &mut E) {
        for marker in self.markers.iter_mut().filter_map(Option::take) {
            engine.remove_marker(marker);
        }
        remove_layer_and_source(engine, DRAFT_LAYER, DRAFT_SOURCE);
    }
}

#[cfg(test)]
mod tests {
    use super::{CORNER_COLORS, CalibrationState, DRAFT_SOURCE, OverlayCalibrationEngine};
    use crate::engine::{MapEngine, SourceSpec};
    use crate::headless::HeadlessEngine;
    use foundation::LngLat;
    use scene::Corner;

    fn p(lng: f64, lat: f64) -> LngLat {
        LngLat::new(lng, lat).unwrap()
    }

    fn four_clicks(cal: &mut OverlayCalibrationEngine, engine: &mut HeadlessEngine) {
        assert!(cal.click(engine, p(100.0, 14.0)).is_none());
        assert!(cal.click(engine, p(101.0, 14.0)).is_none());
        assert!(cal.click(engine, p(101.0, 13.0)).is_none());
        let bounds = cal.click(engine, p(100.0, 13.0)).expect("complete");
        assert_eq!(bounds.top_left, p(100.0, 14.0));
        assert_eq!(bounds.top_right, p(101.0, 14.0));
        assert_eq!(bounds.bottom_right, p(101.0, 13.0));
        assert_eq!(bounds.bottom_left, p(100.0, 13.0));
    }

    #[test]
    fn clicks_before_image_are_ignored() {
        let mut engine = HeadlessEngine::ready();
        let mut cal = OverlayCalibrationEngine::new();
        assert!(cal.click(&mut engine, p(1.0, 1.0)).is_none());
        assert_eq!(cal.state(), CalibrationState::Idle);
        assert!(engine.markers().is_empty());
    }

    #[test]
    fn incomplete_calibration_draws_markers_only() {
        let mut engine = HeadlessEngine::ready();
        let mut cal = OverlayCalibrationEngine::new();
        cal.begin(&mut engine, "img.png");
        cal.click(&mut engine, p(100.0, 14.0));
        cal.click(&mut engine, p(101.0, 14.0));
        cal.click(&mut engine, p(101.0, 13.0));

        assert!(!cal.is_complete());
        assert!(cal.bounds().is_none());
        assert_eq!(engine.image_source_count(), 0);
        let colors: Vec<&str> = engine.markers().values().map(|m| m.color.as_str()).collect();
        assert_eq!(colors, CORNER_COLORS[..3].to_vec());
        assert_eq!(cal.next_corner(), Corner::BottomLeft);
    }

    #[test]
    fn four_clicks_complete_and_draw_draft() {
        let mut engine = HeadlessEngine::ready();
        let mut cal = OverlayCalibrationEngine::new();
        cal.begin(&mut engine, "img.png");
        four_clicks(&mut cal, &mut engine);
        assert!(cal.is_complete());
        assert!(engine.has_source(DRAFT_SOURCE));
        assert_eq!(cal.next_corner(), Corner::TopLeft);
    }

    #[test]
    fn dragging_a_corner_keeps_the_others() {
        let mut engine = HeadlessEngine::ready();
        let mut cal = OverlayCalibrationEngine::new();
        cal.begin(&mut engine, "img.png");
        four_clicks(&mut cal, &mut engine);

        let before = cal.bounds().unwrap();
        let after = cal
            .drag_corner(&mut engine, Corner::TopRight, p(101.5, 14.2))
            .expect("still complete");
        assert_eq!(after.top_right, p(101.5, 14.2));
        assert_eq!(after.top_left, before.top_left);
        assert_eq!(after.bottom_right, before.bottom_right);
        assert_eq!(after.bottom_left, before.bottom_left);
        assert_eq!(engine.markers().len(), 4);
        match engine.source(DRAFT_SOURCE) {
            Some(SourceSpec::Image { coordinates, .. }) => assert_eq!(coordinates[1], [101.5, 14.2]),
            other => panic!("unexpected draft source {other:?}"),
        }
    }

    #[test]
    fn dragging_an_unset_corner_is_ignored() {
        let mut engine = HeadlessEngine::ready();
        let mut cal = OverlayCalibrationEngine::new();
        cal.begin(&mut engine, "img.png");
        cal.click(&mut engine, p(100.0, 14.0));
        assert!(cal.drag_corner(&mut engine, Corner::BottomLeft, p(0.0, 0.0)).is_none());
        assert!(cal.corners().get(Corner::BottomLeft).is_none());
    }

    #[test]
    fn reset_removes_markers_and_draft() {
        let mut engine = HeadlessEngine::ready();
        let mut cal = OverlayCalibrationEngine::new();
        cal.begin(&mut engine, "img.png");
        four_clicks(&mut cal, &mut engine);
        cal.reset(&mut engine);

        assert_eq!(cal.state(), CalibrationState::Calibrating);
        assert_eq!(cal.next_corner(), Corner::TopLeft);
        assert!(engine.markers().is_empty());
        assert!(!engine.has_source(DRAFT_SOURCE));
        assert_eq!(cal.corners().filled(), 0);
    }

    #[test]
    fn seeded_corners_resume_at_first_gap() {
        let mut engine = HeadlessEngine::ready();
        let mut cal = OverlayCalibrationEngine::new();
        let mut seed = scene::CornerSet::new();
        seed.set(Corner::TopLeft, p(100.0, 14.0));
        seed.set(Corner::TopRight, p(101.0, 14.0));
        assert!(cal.begin_with(&mut engine, "img.png", seed).is_none());
        assert_eq!(cal.next_corner(), Corner::BottomRight);
        assert_eq!(engine.markers().len(), 2);
    }

    #[test]
    fn markers_map_back_to_corners() {
        let mut engine = HeadlessEngine::ready();
        let mut cal = OverlayCalibrationEngine::new();
        cal.begin(&mut engine, "img.png");
        cal.click(&mut engine, p(100.0, 14.0));
        cal.click(&mut engine, p(101.0, 14.0));

        let ids: Vec<_> = engine.markers().keys().copied().collect();
        assert_eq!(cal.corner_of_marker(ids[0]), Some(Corner::TopLeft));
        assert_eq!(cal.corner_of_marker(ids[1]), Some(Corner::TopRight));
        assert_eq!(cal.corner_of_marker(999), None);
    }
}
