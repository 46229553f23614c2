use crate::geo::LngLat;

/// Axis-aligned geographic envelope in degrees.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct GeoBounds {
    pub min: [f64; 2],
    pub max: [f64; 2],
}

impl GeoBounds {
    pub fn from_point(p: LngLat) -> Self {
        Self {
            min: p.to_array(),
            max: p.to_array(),
        }
    }

    /// Envelope of `points`, or `None` when empty.
    pub fn from_points<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = LngLat>,
    {
        let mut iter = points.into_iter();
        let mut out = Self::from_point(iter.next()?);
        for p in iter {
            out.extend(p);
        }
        Some(out)
    }

    pub fn extend(&mut self, p: LngLat) {
        self.min[0] = self.min[0].min(p.lng());
        self.min[1] = self.min[1].min(p.lat());
        self.max[0] = self.max[0].max(p.lng());
        self.max[1] = self.max[1].max(p.lat());
    }

    pub fn center(&self) -> [f64; 2] {
        [
            (self.min[0] + self.max[0]) * 0.5,
            (self.min[1] + self.max[1]) * 0.5,
        ]
    }

    pub fn contains(&self, p: LngLat) -> bool {
        p.lng() >= self.min[0]
            && p.lng() <= self.max[0]
            && p.lat() >= self.min[1]
            && p.lat() <= self.max[1]
    }

    /// GeoJSON `bbox` order: `[west, south, east, north]`.
    pub fn to_bbox(&self) -> [f64; 4] {
        [self.min[0], self.min[1], self.max[0], self.max[1]]
    }
}
