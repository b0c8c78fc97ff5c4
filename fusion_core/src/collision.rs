//! Braking-distance proximity warning.
//!
//! A target closer than the observer's braking distance plus a fixed margin
//! is flagged. The margin stands in for the unknown target velocity. This is
//! a single-tick check, there is no trajectory prediction.

use crate::types::EntityState;
use nalgebra::{distance, Point2};

/// m/s → km/h
pub const MS_TO_KMH: f64 = 3.6;

/// Braking distance (meters) at `speed_ms`: `((km/h / 10)²) / 2`.
pub fn braking_distance(speed_ms: f64) -> f64 {
    let speed_kmh = speed_ms * MS_TO_KMH;
    (speed_kmh / 10.0).powi(2) / 2.0
}

/// Outcome of one observer → target check.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CollisionCheck {
    /// Straight-line distance observer → target (meters)
    pub distance: f64,
    pub braking_distance: f64,
    pub crashing: bool,
}

/// Evaluate the proximity warning for a target seen by `observer`.
pub fn evaluate(observer: &EntityState, target: &Point2<f64>, margin_m: f64) -> CollisionCheck {
    let d = distance(&observer.position(), target);
    let braking = braking_distance(observer.speed);
    CollisionCheck {
        distance: d,
        braking_distance: braking,
        crashing: d < braking + margin_m,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn stationary_observer_flags_close_target() {
        let observer = EntityState::vehicle(0.0, 0.0, 0.0, 0.0);
        let check = evaluate(&observer, &Point2::new(0.5, 0.0), 1.0);
        assert_abs_diff_eq!(check.braking_distance, 0.0);
        assert!(check.crashing);
    }

    #[test]
    fn fast_observer_with_distant_target() {
        let observer = EntityState::vehicle(0.0, 0.0, 0.0, 50.0 / MS_TO_KMH);
        let check = evaluate(&observer, &Point2::new(0.0, 40.0), 1.0);
        assert_abs_diff_eq!(check.braking_distance, 12.5, epsilon = 1e-9);
        assert_abs_diff_eq!(check.distance, 40.0, epsilon = 1e-12);
        assert!(!check.crashing);
    }

    #[test]
    fn target_inside_braking_distance() {
        // 13.9 m/s ≈ 50 km/h → ~12.5 m braking, target at 10 m
        let observer = EntityState::vehicle(5.0, 5.0, 0.0, 13.9);
        let check = evaluate(&observer, &Point2::new(15.0, 5.0), 1.0);
        assert!(check.braking_distance > 12.4 && check.braking_distance < 12.6);
        assert!(check.crashing);
    }
}
