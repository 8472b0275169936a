//! Planar geometry helpers for heading and range computation.
//!
//! All angles are degrees in `(-180, 180]` measured counter-clockwise from
//! the +X axis; distances are in the caller's unit (millimetres everywhere
//! in this workspace).

/// Heading from `from` to `to` in degrees.
pub fn angle_between(from: (f64, f64), to: (f64, f64)) -> f64 {
    (to.1 - from.1).atan2(to.0 - from.0).to_degrees()
}

/// Euclidean distance between two points.
pub fn distance(a: (f64, f64), b: (f64, f64)) -> f64 {
    (b.0 - a.0).hypot(b.1 - a.1)
}

/// Smallest signed difference `target - current`, wrapped into
/// `(-180, 180]`. Steering corrections must never take the long way round.
pub fn wrap_degrees(delta: f64) -> f64 {
    let mut d = delta % 360.0;
    if d > 180.0 {
        d -= 360.0;
    } else if d <= -180.0 {
        d += 360.0;
    }
    d
}
