//! Angle and rounding helpers shared by the estimators.

use std::f32::consts::PI;

/// Computes sine and cosine for an angle in degrees.
pub(crate) fn sin_cos_deg(angle_deg: f32) -> (f32, f32) {
    angle_deg.to_radians().sin_cos()
}

/// Maps an undirected angle into [0, pi).
pub(crate) fn wrap_half_turn(angle: f32) -> f32 {
    let wrapped = angle.rem_euclid(PI);
    // rem_euclid can round up to exactly pi for tiny negative inputs.
    if wrapped >= PI {
        0.0
    } else {
        wrapped
    }
}

/// Maps a directed angle into [0, 2pi).
pub(crate) fn wrap_full_turn(angle: f32) -> f32 {
    let wrapped = angle.rem_euclid(2.0 * PI);
    if wrapped >= 2.0 * PI {
        0.0
    } else {
        wrapped
    }
}

/// Maps a directed angle into [-pi, pi].
pub(crate) fn wrap_signed(angle: f32) -> f32 {
    let wrapped = wrap_full_turn(angle);
    if wrapped > PI {
        wrapped - 2.0 * PI
    } else {
        wrapped
    }
}

/// Smallest absolute difference between two directed angles, in [0, pi].
pub(crate) fn angular_distance(a: f32, b: f32) -> f32 {
    let diff = (a - b).abs() % (2.0 * PI);
    diff.min(2.0 * PI - diff)
}

/// Rounds to the nearest integer, halves away from zero.
pub(crate) fn round_i(value: f32) -> i64 {
    value.round() as i64
}

/// Makes a kernel size odd by bumping even sizes up by one.
pub(crate) fn odd_size(size: usize) -> usize {
    if size % 2 == 0 {
        size + 1
    } else {
        size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sin_cos_deg_matches_quadrants() {
        let (sin, cos) = sin_cos_deg(90.0);
        assert!(sin > 0.999);
        assert!(cos.abs() < 1e-6);
    }

    #[test]
    fn half_turn_wraps_negative_and_large_angles() {
        assert!((wrap_half_turn(-0.25) - (PI - 0.25)).abs() < 1e-6);
        assert!((wrap_half_turn(PI + 0.5) - 0.5).abs() < 1e-5);
        assert!(wrap_half_turn(-1e-9) < PI);
    }

    #[test]
    fn signed_wrap_stays_in_range() {
        for step in -40..40 {
            let angle = step as f32 * 0.37;
            let wrapped = wrap_signed(angle);
            assert!((-PI..=PI).contains(&wrapped), "{angle} -> {wrapped}");
            assert!((wrapped.sin() - angle.sin()).abs() < 1e-4);
        }
    }

    #[test]
    fn angular_distance_is_symmetric_and_bounded() {
        let d = angular_distance(0.1, 2.0 * PI - 0.1);
        assert!((d - 0.2).abs() < 1e-5);
        assert!((angular_distance(0.0, PI) - PI).abs() < 1e-6);
        assert_eq!(angular_distance(1.0, 2.0), angular_distance(2.0, 1.0));
    }

    #[test]
    fn odd_size_bumps_even_values() {
        assert_eq!(odd_size(4), 5);
        assert_eq!(odd_size(7), 7);
    }
}
