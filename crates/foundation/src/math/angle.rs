/// Wraps `deg` into `[0, 360)`. Non-finite input maps to `0`.
pub fn normalize_degrees(deg: f64) -> f64 {
    if !deg.is_finite() {
        return 0.0;
    }
    let d = deg.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs.
    if d >= 360.0 { 0.0 } else { d }
}

/// Wraps `deg` into `[-180, 180)`.
pub fn normalize_degrees_signed(deg: f64) -> f64 {
    let d = normalize_degrees(deg);
    if d >= 180.0 { d - 360.0 } else { d }
}

/// Effective yaw: configured offset plus the live drag offset, wrapped to `[0, 360)`.
pub fn compose_yaw(configured_deg: f64, drag_deg: f64) -> f64 {
    normalize_degrees(configured_deg + drag_deg)
}
