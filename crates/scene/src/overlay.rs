use foundation::{GeoBounds, LngLat};
use serde::{Deserialize, Serialize};

/// Corner slots of an overlay quadrilateral, in the fixed winding order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomRight,
    BottomLeft,
}

impl Corner {
    /// Winding order used everywhere: calibration clicks, storage, image sources.
    pub const ALL: [Corner; 4] = [
        Corner::TopLeft,
        Corner::TopRight,
        Corner::BottomRight,
        Corner::BottomLeft,
    ];

    pub fn index(self) -> usize {
        match self {
            Corner::TopLeft => 0,
            Corner::TopRight => 1,
            Corner::BottomRight => 2,
            Corner::BottomLeft => 3,
        }
    }

    pub fn from_index(index: usize) -> Option<Corner> {
        Corner::ALL.get(index).copied()
    }

    pub fn label(self) -> &'static str {
        match self {
            Corner::TopLeft => "top-left",
            Corner::TopRight => "top-right",
            Corner::BottomRight => "bottom-right",
            Corner::BottomLeft => "bottom-left",
        }
    }
}

/// A fully calibrated quadrilateral. Only complete quads can be rendered.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayBounds {
    pub top_left: LngLat,
    pub top_right: LngLat,
    pub bottom_right: LngLat,
    pub bottom_left: LngLat,
}

impl OverlayBounds {
    pub fn corner(&self, corner: Corner) -> LngLat {
        match corner {
            Corner::TopLeft => self.top_left,
            Corner::TopRight => self.top_right,
            Corner::BottomRight => self.bottom_right,
            Corner::BottomLeft => self.bottom_left,
        }
    }

    /// Corners in winding order.
    pub fn corners(&self) -> [LngLat; 4] {
        [
            self.top_left,
            self.top_right,
            self.bottom_right,
            self.bottom_left,
        ]
    }

    /// `[[lng, lat]; 4]` in winding order, the layout image sources take.
    pub fn to_coordinates(&self) -> [[f64; 2]; 4] {
        self.corners().map(LngLat::to_array)
    }

    pub fn envelope(&self) -> GeoBounds {
        let [a, b, c, d] = self.corners();
        let mut env = GeoBounds::from_point(a);
        env.extend(b);
        env.extend(c);
        env.extend(d);
        env
    }
}

/// Possibly partial set of corners, as produced mid-calibration or read
/// from a record that was saved before calibration finished.
#[derive(Debug, Copy, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CornerSet {
    slots: [Option<LngLat>; 4],
}

impl CornerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, corner: Corner) -> Option<LngLat> {
        self.slots[corner.index()]
    }

    pub fn set(&mut self, corner: Corner, at: LngLat) {
        self.slots[corner.index()] = Some(at);
    }

    pub fn clear(&mut self) {
        self.slots = [None; 4];
    }

    pub fn filled(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_complete(&self) -> bool {
        self.filled() == 4
    }

    /// The finished quad, or `None` while any corner is missing.
    pub fn bounds(&self) -> Option<OverlayBounds> {
        let [Some(tl), Some(tr), Some(br), Some(bl)] = self.slots else {
            return None;
        };
        Some(OverlayBounds {
            top_left: tl,
            top_right: tr,
            bottom_right: br,
            bottom_left: bl,
        })
    }
}

impl From<OverlayBounds> for CornerSet {
    fn from(b: OverlayBounds) -> Self {
        Self {
            slots: b.corners().map(Some),
        }
    }
}

/// Raster image draped over the map for one site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayAsset {
    /// Storage path or absolute URL of the image.
    pub image: String,
    pub corners: CornerSet,
}

impl OverlayAsset {
    pub fn new(image: impl Into<String>, bounds: OverlayBounds) -> Self {
        Self {
            image: image.into(),
            corners: bounds.into(),
        }
    }

    pub fn partial(image: impl Into<String>, corners: CornerSet) -> Self {
        Self {
            image: image.into(),
            corners,
        }
    }

    /// Renderable bounds; `None` for partially calibrated overlays.
    pub fn bounds(&self) -> Option<OverlayBounds> {
        self.corners.bounds()
    }

    pub fn is_complete(&self) -> bool {
        self.corners.is_complete()
    }
}

#[cfg(test)]
mod tests {
    use super::{Corner, CornerSet, OverlayAsset};
    use foundation::LngLat;

    fn p(lng: f64, lat: f64) -> LngLat {
        LngLat::new(lng, lat).unwrap()
    }

    #[test]
    fn corner_index_round_trip() {
        for (i, c) in Corner::ALL.iter().enumerate() {
            assert_eq!(c.index(), i);
            assert_eq!(Corner::from_index(i), Some(*c));
        }
        assert_eq!(Corner::from_index(4), None);
    }

    #[test]
    fn partial_set_has_no_bounds() {
        let mut set = CornerSet::new();
        set.set(Corner::TopLeft, p(100.0, 14.0));
        set.set(Corner::TopRight, p(100.1, 14.0));
        set.set(Corner::BottomRight, p(100.1, 13.9));
        assert_eq!(set.filled(), 3);
        assert!(set.bounds().is_none());

        set.set(Corner::BottomLeft, p(100.0, 13.9));
        let b = set.bounds().expect("complete");
        assert_eq!(b.corner(Corner::BottomLeft), p(100.0, 13.9));
        assert_eq!(
            b.to_coordinates(),
            [[100.0, 14.0], [100.1, 14.0], [100.1, 13.9], [100.0, 13.9]]
        );
    }

    #[test]
    fn asset_completeness_follows_corners() {
        let partial = OverlayAsset::partial("plans/a.png", CornerSet::new());
        assert!(!partial.is_complete());
        assert!(partial.bounds().is_none());
    }

    #[test]
    fn serialized_bounds_use_named_corners() {
        let mut set = CornerSet::new();
        for (i, c) in Corner::ALL.iter().enumerate() {
            set.set(*c, p(100.0 + i as f64 * 0.01, 13.0));
        }
        let json = serde_json::to_value(set.bounds().unwrap()).unwrap();
        assert_eq!(json["topLeft"], serde_json::json!([100.0, 13.0]));
        assert!(json.get("bottomLeft").is_some());
    }
}
