use super::Vec3;

/// Column-major 4x4 matrix, laid out the way WebGL uniforms expect.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Mat4(pub [f64; 16]);

impl Default for Mat4 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mat4 {
    pub const IDENTITY: Mat4 = Mat4([
        1.0, 0.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0, //
        0.0, 0.0, 0.0, 1.0,
    ]);

    /// Builds from a host-provided column-major array (f32 or f64 source).
    pub fn from_cols_slice(values: &[f64]) -> Option<Self> {
        let arr: [f64; 16] = values.try_into().ok()?;
        if arr.iter().any(|v| !v.is_finite()) {
            return None;
        }
        Some(Mat4(arr))
    }

    #[inline]
    fn at(&self, row: usize, col: usize) -> f64 {
        self.0[col * 4 + row]
    }

    pub fn translation(t: Vec3) -> Self {
        let mut m = Self::IDENTITY;
        m.0[12] = t.x;
        m.0[13] = t.y;
        m.0[14] = t.z;
        m
    }

    pub fn scale(s: Vec3) -> Self {
        let mut m = Self::IDENTITY;
        m.0[0] = s.x;
        m.0[5] = s.y;
        m.0[10] = s.z;
        m
    }

    pub fn rotation_x(rad: f64) -> Self {
        let (s, c) = rad.sin_cos();
        let mut m = Self::IDENTITY;
        m.0[5] = c;
        m.0[6] = s;
        m.0[9] = -s;
        m.0[10] = c;
        m
    }

    pub fn rotation_y(rad: f64) -> Self {
        let (s, c) = rad.sin_cos();
        let mut m = Self::IDENTITY;
        m.0[0] = c;
        m.0[2] = -s;
        m.0[8] = s;
        m.0[10] = c;
        m
    }

    pub fn rotation_z(rad: f64) -> Self {
        let (s, c) = rad.sin_cos();
        let mut m = Self::IDENTITY;
        m.0[0] = c;
        m.0[1] = s;
        m.0[4] = -s;
        m.0[5] = c;
        m
    }

    /// Translation * rotation (unit quaternion `[x, y, z, w]`) * scale.
    pub fn from_trs(t: Vec3, q: [f64; 4], s: Vec3) -> Self {
        let [x, y, z, w] = q;
        let (x2, y2, z2) = (x + x, y + y, z + z);
        let (xx, xy, xz) = (x * x2, x * y2, x * z2);
        let (yy, yz, zz) = (y * y2, y * z2, z * z2);
        let (wx, wy, wz) = (w * x2, w * y2, w * z2);
        Mat4([
            (1.0 - (yy + zz)) * s.x,
            (xy + wz) * s.x,
            (xz - wy) * s.x,
            0.0,
            (xy - wz) * s.y,
            (1.0 - (xx + zz)) * s.y,
            (yz + wx) * s.y,
            0.0,
            (xz + wy) * s.z,
            (yz - wx) * s.z,
            (1.0 - (xx + yy)) * s.z,
            0.0,
            t.x,
            t.y,
            t.z,
            1.0,
        ])
    }

    /// `self * rhs` (apply `rhs` first).
    pub fn multiply(&self, rhs: &Mat4) -> Mat4 {
        let mut out = [0.0; 16];
        for col in 0..4 {
            for row in 0..4 {
                let mut acc = 0.0;
                for k in 0..4 {
                    acc += self.at(row, k) * rhs.at(k, col);
                }
                out[col * 4 + row] = acc;
            }
        }
        Mat4(out)
    }

    /// Transforms a point (w = 1) with perspective divide.
    pub fn transform_point(&self, p: Vec3) -> Vec3 {
        let x = self.at(0, 0) * p.x + self.at(0, 1) * p.y + self.at(0, 2) * p.z + self.at(0, 3);
        let y = self.at(1, 0) * p.x + self.at(1, 1) * p.y + self.at(1, 2) * p.z + self.at(1, 3);
        let z = self.at(2, 0) * p.x + self.at(2, 1) * p.y + self.at(2, 2) * p.z + self.at(2, 3);
        let w = self.at(3, 0) * p.x + self.at(3, 1) * p.y + self.at(3, 2) * p.z + self.at(3, 3);
        if w.abs() < f64::EPSILON || w == 1.0 {
            return Vec3::new(x, y, z);
        }
        Vec3::new(x / w, y / w, z / w)
    }

    pub fn to_f32(&self) -> [f32; 16] {
        self.0.map(|v| v as f32)
    }
}

impl std::ops::Mul for Mat4 {
    type Output = Mat4;

    fn mul(self, rhs: Mat4) -> Mat4 {
        self.multiply(&rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::Mat4;
    use crate::math::Vec3;

    fn assert_vec_close(a: Vec3, b: Vec3) {
        let d = (a - b).length();
        assert!(d < 1e-12, "expected {a:?} ~= {b:?}");
    }

    #[test]
    fn identity_is_neutral() {
        let t = Mat4::translation(Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(Mat4::IDENTITY * t, t);
        assert_eq!(t * Mat4::IDENTITY, t);
    }

    #[test]
    fn trs_with_identity_rotation_is_translate_scale() {
        let t = Vec3::new(1.0, 2.0, 3.0);
        let s = Vec3::new(2.0, 3.0, 4.0);
        let m = Mat4::from_trs(t, [0.0, 0.0, 0.0, 1.0], s);
        assert_eq!(m, Mat4::translation(t) * Mat4::scale(s));
    }

    #[test]
    fn trs_quaternion_matches_axis_rotation() {
        let half = std::f64::consts::FRAC_PI_4;
        let q = [0.0, 0.0, half.sin(), half.cos()];
        let m = Mat4::from_trs(Vec3::ZERO, q, Vec3::new(1.0, 1.0, 1.0));
        let p = m.transform_point(Vec3::new(1.0, 0.0, 0.0));
        assert_vec_close(p, Vec3::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn composition_applies_right_to_left() {
        let m = Mat4::translation(Vec3::new(10.0, 0.0, 0.0)) * Mat4::scale(Vec3::new(2.0, 2.0, 2.0));
        assert_vec_close(m.transform_point(Vec3::new(1.0, 1.0, 1.0)), Vec3::new(12.0, 2.0, 2.0));
    }

    #[test]
    fn rotation_x_maps_y_up_to_z_up() {
        let m = Mat4::rotation_x(std::f64::consts::FRAC_PI_2);
        assert_vec_close(m.transform_point(Vec3::new(0.0, 1.0, 0.0)), Vec3::new(0.0, 0.0, 1.0));
    }

    #[test]
    fn rotation_y_and_z_quarter_turns() {
        let ry = Mat4::rotation_y(std::f64::consts::FRAC_PI_2);
        assert_vec_close(ry.transform_point(Vec3::new(1.0, 0.0, 0.0)), Vec3::new(0.0, 0.0, -1.0));
        let rz = Mat4::rotation_z(std::f64::consts::FRAC_PI_2);
        assert_vec_close(rz.transform_point(Vec3::new(1.0, 0.0, 0.0)), Vec3::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn from_slice_rejects_bad_input() {
        assert!(Mat4::from_cols_slice(&[0.0; 15]).is_none());
        let mut v = [0.0; 16];
        v[3] = f64::NAN;
        assert!(Mat4::from_cols_slice(&v).is_none());
        assert_eq!(Mat4::from_cols_slice(&Mat4::IDENTITY.0), Some(Mat4::IDENTITY));
    }
}
