//! Synthetic scene actors and their motion.
//!
//! Each actor has a 2D pose (position, heading in degrees on the unit
//! circle) and a speed. A `MotionSpec` describes how it moves; the scenario
//! builder steps every actor once per recorded tick.

use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};

/// What an actor looks like to a camera.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorKind {
    Vehicle,
    Pedestrian,
}

/// Describes actor motion.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum MotionSpec {
    /// Does not move.
    Stationary,
    /// Follow a closed loop of waypoints at a cruise speed (m/s).
    Loop {
        waypoints: Vec<[f64; 2]>,
        speed: f64,
    },
    /// Loop, but crawl at `slow_speed` while within `radius` of `center`.
    QueueAt {
        waypoints: Vec<[f64; 2]>,
        speed: f64,
        center: [f64; 2],
        radius: f64,
        slow_speed: f64,
    },
}

/// A simulated actor with ground-truth state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub kind: ActorKind,
    pub x: f64,
    pub y: f64,
    /// Degrees, unit circle
    pub heading: f64,
    /// m/s
    pub speed: f64,
    pub motion: MotionSpec,
    /// Index of the waypoint currently steered to
    #[serde(default)]
    pub next_waypoint: usize,
}

impl Actor {
    /// Create an actor placed on the first waypoint of its motion (if any).
    pub fn new(id: impl Into<String>, kind: ActorKind, motion: MotionSpec) -> Self {
        let (x, y, next_waypoint) = match &motion {
            MotionSpec::Loop { waypoints, .. } | MotionSpec::QueueAt { waypoints, .. }
                if !waypoints.is_empty() =>
            {
                (waypoints[0][0], waypoints[0][1], 1 % waypoints.len())
            }
            _ => (0.0, 0.0, 0),
        };
        let mut actor = Self {
            id: id.into(),
            kind,
            x,
            y,
            heading: 0.0,
            speed: 0.0,
            motion,
            next_waypoint,
        };
        actor.face_next_waypoint();
        actor
    }

    /// Place the actor at an explicit pose.
    pub fn at(mut self, x: f64, y: f64, heading: f64) -> Self {
        self.x = x;
        self.y = y;
        self.heading = heading;
        self
    }

    pub fn position(&self) -> Point2<f64> {
        Point2::new(self.x, self.y)
    }

    fn waypoints(&self) -> Option<&[[f64; 2]]> {
        match &self.motion {
            MotionSpec::Loop { waypoints, .. } | MotionSpec::QueueAt { waypoints, .. }
                if !waypoints.is_empty() =>
            {
                Some(waypoints.as_slice())
            }
            _ => None,
        }
    }

    fn face_next_waypoint(&mut self) {
        if let Some(wps) = self.waypoints() {
            let wp = wps[self.next_waypoint % wps.len()];
            let (dx, dy) = (wp[0] - self.x, wp[1] - self.y);
            if dx != 0.0 || dy != 0.0 {
                self.heading = dy.atan2(dx).to_degrees();
            }
        }
    }

    fn target_speed(&self) -> f64 {
        match &self.motion {
            MotionSpec::Stationary => 0.0,
            MotionSpec::Loop { speed, .. } => *speed,
            MotionSpec::QueueAt {
                speed,
                center,
                radius,
                slow_speed,
                ..
            } => {
                let d = (self.position() - Point2::new(center[0], center[1])).norm();
                if d < *radius {
                    *slow_speed
                } else {
                    *speed
                }
            }
        }
    }

    /// Propagate the actor by `dt` seconds.
    pub fn step(&mut self, dt: f64) {
        self.speed = self.target_speed();
        let Some(wps) = self.waypoints().map(|w| w.to_vec()) else {
            return;
        };
        let mut travel = self.speed * dt;
        // Consume waypoints reached within this step
        for _ in 0..wps.len() {
            let wp = wps[self.next_waypoint % wps.len()];
            let to_wp = Vector2::new(wp[0] - self.x, wp[1] - self.y);
            let d = to_wp.norm();
            if d > travel || d == 0.0 && travel == 0.0 {
                if d > 0.0 {
                    let step = to_wp / d * travel;
                    self.x += step.x;
                    self.y += step.y;
                }
                break;
            }
            self.x = wp[0];
            self.y = wp[1];
            travel -= d;
            self.next_waypoint = (self.next_waypoint + 1) % wps.len();
        }
        self.face_next_waypoint();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn square() -> Vec<[f64; 2]> {
        vec![[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0]]
    }

    #[test]
    fn loop_moves_toward_next_waypoint() {
        let mut a = Actor::new(
            "vehicle_1",
            ActorKind::Vehicle,
            MotionSpec::Loop {
                waypoints: square(),
                speed: 4.0,
            },
        );
        assert_abs_diff_eq!(a.heading, 0.0);
        a.step(1.0);
        assert_abs_diff_eq!(a.x, 4.0, epsilon = 1e-12);
        assert_abs_diff_eq!(a.y, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(a.speed, 4.0);
    }

    #[test]
    fn loop_turns_corners() {
        let mut a = Actor::new(
            "vehicle_1",
            ActorKind::Vehicle,
            MotionSpec::Loop {
                waypoints: square(),
                speed: 12.0,
            },
        );
        a.step(1.0);
        assert_abs_diff_eq!(a.x, 10.0, epsilon = 1e-12);
        assert_abs_diff_eq!(a.y, 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(a.heading, 90.0, epsilon = 1e-9);
    }

    #[test]
    fn queue_slows_near_center() {
        let mut a = Actor::new(
            "vehicle_1",
            ActorKind::Vehicle,
            MotionSpec::QueueAt {
                waypoints: square(),
                speed: 10.0,
                center: [0.0, 0.0],
                radius: 5.0,
                slow_speed: 1.0,
            },
        );
        a.step(1.0);
        assert_abs_diff_eq!(a.speed, 1.0);
        assert_abs_diff_eq!(a.x, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn stationary_stays_put() {
        let mut a = Actor::new("pedestrian_1", ActorKind::Pedestrian, MotionSpec::Stationary)
            .at(3.0, 4.0, 90.0);
        a.step(1.0);
        assert_eq!((a.x, a.y, a.heading, a.speed), (3.0, 4.0, 90.0, 0.0));
    }
}
