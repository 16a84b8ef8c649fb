//! 2-D vector helpers for the plane geometry and particle filters

use nalgebra::Vector2;

pub type Vec2 = Vector2<f64>;

/// Unit vector for a compass heading (radians, clockwise from +y)
pub fn heading_vector(heading: f64) -> Vec2 {
    Vec2::new(heading.sin(), heading.cos())
}

/// Compass bearing in degrees [0, 360) of the direction `from -> to`
pub fn bearing_deg(from: Vec2, to: Vec2) -> f64 {
    let d = to - from;
    wrap_deg(d.x.atan2(d.y).to_degrees())
}

/// Wrap any angle in degrees into [0, 360)
pub fn wrap_deg(deg: f64) -> f64 {
    let wrapped = deg.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Compass heading in radians to degrees in [0, 360)
pub fn heading_deg(heading: f64) -> f64 {
    wrap_deg(heading.to_degrees())
}

/// Normalize an angle to [-π, π]
pub fn normalize_angle(mut angle: f64) -> f64 {
    while angle > std::f64::consts::PI {
        angle -= 2.0 * std::f64::consts::PI;
    }
    while angle < -std::f64::consts::PI {
        angle += 2.0 * std::f64::consts::PI;
    }
    angle
}

/// Signed difference `to - from` in degrees, normalized to [-180, 180]
pub fn angle_diff_deg(from: f64, to: f64) -> f64 {
    normalize_angle((to - from).to_radians()).to_degrees()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_normalize_angle() {
        assert_relative_eq!(normalize_angle(3.0 * std::f64::consts::PI), std::f64::consts::PI, epsilon = 1e-9);
        assert_relative_eq!(normalize_angle(-1.5 * std::f64::consts::PI), 0.5 * std::f64::consts::PI, epsilon = 1e-9);
    }

    #[test]
    fn test_angle_diff_wraps() {
        assert_relative_eq!(angle_diff_deg(350.0, 10.0), 20.0, epsilon = 1e-9);
        assert_relative_eq!(angle_diff_deg(10.0, 350.0), -20.0, epsilon = 1e-9);
        assert_relative_eq!(angle_diff_deg(0.0, 90.0), 90.0, epsilon = 1e-9);
    }

    #[test]
    fn test_heading_vector() {
        let v = heading_vector(std::f64::consts::FRAC_PI_2);
        assert_relative_eq!(v.x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(v.y, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_wrap_deg_any_turn_count() {
        assert_relative_eq!(wrap_deg(-30.0), 330.0, epsilon = 1e-9);
        assert_relative_eq!(wrap_deg(-750.0), 330.0, epsilon = 1e-9);
        assert_relative_eq!(wrap_deg(1090.0), 10.0, epsilon = 1e-9);
        assert!(wrap_deg(-1e-15) < 360.0);
        assert_relative_eq!(heading_deg(-5.0 * std::f64::consts::PI), 180.0, epsilon = 1e-9);
    }

    #[test]
    fn test_bearing() {
        let o = Vec2::new(0.0, 0.0);
        assert_relative_eq!(bearing_deg(o, Vec2::new(0.0, 5.0)), 0.0, epsilon = 1e-9);
        assert_relative_eq!(bearing_deg(o, Vec2::new(5.0, 0.0)), 90.0, epsilon = 1e-9);
        assert_relative_eq!(bearing_deg(o, Vec2::new(-5.0, 0.0)), 270.0, epsilon = 1e-9);
    }
}
