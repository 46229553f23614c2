use foundation::{LngLat, SiteId};
use layers::{CalibrationState, MapEngine, MarkerId, OverlayCalibrationEngine};
use scene::{Corner, OverlayAsset, OverlayBounds};

/// Corner-placement session for one site's overlay image.
///
/// `image` is the storage path written back on save; the calibration engine
/// itself works with the resolved URL.
#[derive(Debug)]
pub struct CalibrationSession {
    site: SiteId,
    image: String,
    engine: OverlayCalibrationEngine,
}

impl CalibrationSession {
    /// Starts calibrating, seeded with `existing` corners when they belong to the same image.
    pub fn begin<E: MapEngine + ?Sized>(
        map: &mut E,
        site: SiteId,
        image: String,
        url: String,
        existing: Option<&OverlayAsset>,
    ) -> Self {
        let mut engine = OverlayCalibrationEngine::new();
        match existing.filter(|o| o.image == image) {
            Some(o) => {
                engine.begin_with(map, url, o.corners);
            }
            None => engine.begin(map, url),
        }
        Self {
            site,
            image,
            engine,
        }
    }

    pub fn site(&self) -> &SiteId {
        &self.site
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn state(&self) -> CalibrationState {
        self.engine.state()
    }

    pub fn next_corner(&self) -> Corner {
        self.engine.next_corner()
    }

    pub fn is_complete(&self) -> bool {
        self.engine.is_complete()
    }

    pub fn bounds(&self) -> Option<OverlayBounds> {
        self.engine.bounds()
    }

    pub fn filled(&self) -> usize {
        self.engine.corners().filled()
    }

    pub fn click<E: MapEngine + ?Sized>(&mut self, map: &mut E, at: LngLat) -> Option<OverlayBounds> {
        self.engine.click(map, at)
    }

    pub fn drag<E: MapEngine + ?Sized>(
        &mut self,
        map: &mut E,
        corner: Corner,
        at: LngLat,
    ) -> Option<OverlayBounds> {
        self.engine.drag_corner(map, corner, at)
    }

    /// Drag end of a corner marker placed by this session.
    pub fn drag_marker<E: MapEngine + ?Sized>(
        &mut self,
        map: &mut E,
        marker: MarkerId,
        at: LngLat,
    ) -> Option<OverlayBounds> {
        let corner = self.engine.corner_of_marker(marker)?;
        self.drag(map, corner, at)
    }

    pub fn reset<E: MapEngine + ?Sized>(&mut self, map: &mut E) {
        self.engine.reset(map);
    }

    /// The record to persist, once all four corners are placed.
    pub fn asset(&self) -> Option<OverlayAsset> {
        self.bounds()
            .map(|b| OverlayAsset::new(self.image.clone(), b))
    }

    pub fn close<E: MapEngine + ?Sized>(mut self, map: &mut E) {
        self.engine.close(map);
    }
}
