use foundation::math::{Mat4, MercatorCoordinate, Vec3, meter_in_mercator_units};
use scene::ModelAnchor;

/// Where a model sits in the host's Mercator unit space and how big a meter is there.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct AnchorTransform {
    pub origin: MercatorCoordinate,
    /// Mercator units per model unit, with the anchor's own scale folded in.
    pub unit_scale: f64,
}

impl AnchorTransform {
    pub fn new(anchor: &ModelAnchor) -> Self {
        let at = anchor.anchor();
        Self {
            origin: MercatorCoordinate::from_lng_lat(at, anchor.altitude_m()),
            unit_scale: meter_in_mercator_units(at.lat()) * anchor.scale(),
        }
    }

    /// Model-to-world matrix for a given yaw.
    ///
    /// Models are authored y-up in meters; the map is z-up with y growing
    /// south, hence the y flip and the quarter turn about x.
    pub fn model_matrix(&self, yaw_deg: f64) -> Mat4 {
        let s = self.unit_scale;
        Mat4::translation(Vec3::new(self.origin.x, self.origin.y, self.origin.z))
            .multiply(&Mat4::scale(Vec3::new(s, -s, s)))
            .multiply(&Mat4::rotation_x(std::f64::consts::FRAC_PI_2))
            .multiply(&Mat4::rotation_y(yaw_deg.to_radians()))
    }
}

#[cfg(test)]
mod tests {
    use super::AnchorTransform;
    use foundation::LngLat;
    use foundation::math::{Vec3, meter_in_mercator_units};
    use scene::ModelAnchor;

    fn anchor(lat: f64, scale: f64) -> ModelAnchor {
        ModelAnchor::new("m.glb", LngLat::new(100.5, lat).unwrap(), 0.0, 0.0, scale).unwrap()
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-15_f64.max(b.abs() * 1e-9)
    }

    #[test]
    fn scale_includes_latitude_and_model_scale() {
        let t = AnchorTransform::new(&anchor(60.0, 2.0));
        assert!(close(t.unit_scale, meter_in_mercator_units(60.0) * 2.0));
    }

    #[test]
    fn model_up_maps_to_map_up() {
        let t = AnchorTransform::new(&anchor(13.75, 1.0));
        let m = t.model_matrix(0.0);
        let base = m.transform_point(Vec3::ZERO);
        let up = m.transform_point(Vec3::new(0.0, 1.0, 0.0));
        assert!(close(base.x, t.origin.x));
        assert!(close(up.z - base.z, t.unit_scale));
        assert!(close(up.x, base.x));
    }

    #[test]
    fn yaw_turns_about_vertical_axis() {
        let t = AnchorTransform::new(&anchor(0.0, 1.0));
        let a = t.model_matrix(0.0).transform_point(Vec3::new(1.0, 0.0, 0.0));
        let b = t.model_matrix(90.0).transform_point(Vec3::new(1.0, 0.0, 0.0));
        let c = t.model_matrix(360.0).transform_point(Vec3::new(1.0, 0.0, 0.0));
        assert!(close(a.z, b.z));
        assert!((a.x - b.x).abs() > t.unit_scale * 0.5);
        assert!(close(a.x, c.x));
    }
}
