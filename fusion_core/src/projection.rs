//! Detection projection: 2D bounding box → estimated world-frame position.
//!
//! # Steps per detection
//! 1. Range from box height via the pinhole relation (class reference height)
//! 2. Ground-range correction when observed from an elevated fixed sensor
//! 3. Bearing from the horizontal box centre
//! 4. Polar offset from the observer's position along `heading + bearing`
//!
//! Degenerate boxes (`height <= 0`) and frames without a width do not
//! project; callers skip them.

use crate::types::{Detection, EntityState};
use camera_models::{ground_distance, CameraParams, ObjectClass};
use nalgebra::{Point2, Vector2};

/// A detection resolved to a world position. Derived, never persisted.
#[derive(Clone, Debug, PartialEq)]
pub struct ProjectedDetection {
    /// `parentId-detectionId`
    pub id: String,
    pub class: ObjectClass,
    /// Estimated range from the observer (meters)
    pub distance: f64,
    /// Bearing relative to the observer heading (degrees)
    pub bearing_offset: f64,
    pub position: Point2<f64>,
}

/// Project one detection seen by an entity in state `parent`.
///
/// `mount_height` is the camera height above the road for fixed sensors and
/// `None` for vehicles.
pub fn project_detection(
    detection: &Detection,
    parent: &EntityState,
    image_width: f64,
    camera: &CameraParams,
    mount_height: Option<f64>,
) -> Option<ProjectedDetection> {
    let raw = camera.distance_from_box_height(detection.class, detection.height_in_frame())?;
    let bearing_offset = camera.bearing_offset(detection.box_center_x(), image_width)?;

    let distance = match mount_height {
        Some(h) if parent.is_fixed_sensor => ground_distance(raw, h),
        _ => raw,
    };

    let target_angle = (parent.heading + bearing_offset).to_radians();
    let offset = Vector2::new(target_angle.cos(), target_angle.sin()) * distance;

    Some(ProjectedDetection {
        id: detection.agent_id(),
        class: detection.class,
        distance,
        bearing_offset,
        position: parent.position() + offset,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EntityId;
    use approx::assert_abs_diff_eq;
    use camera_models::MountTransform;

    fn detection(class: ObjectClass, xmin: f64, xmax: f64, ymin: f64, ymax: f64) -> Detection {
        Detection {
            parent_id: EntityId::new("vehicle_1"),
            detection_id: "0".into(),
            class,
            xmin,
            xmax,
            ymin,
            ymax,
        }
    }

    #[test]
    fn centred_box_projects_along_heading() {
        let cam = CameraParams::default();
        let parent = EntityState::vehicle(10.0, 20.0, 90.0, 5.0);
        // Car, 100 px tall → 4.5 m, centred in an 800 px frame
        let det = detection(ObjectClass::Car, 350.0, 450.0, 200.0, 300.0);
        let p = project_detection(&det, &parent, 800.0, &cam, None).unwrap();
        assert_eq!(p.id, "vehicle_1-0");
        assert_abs_diff_eq!(p.distance, 4.5, epsilon = 1e-12);
        assert_abs_diff_eq!(p.bearing_offset, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(p.position.x, 10.0, epsilon = 1e-9);
        assert_abs_diff_eq!(p.position.y, 24.5, epsilon = 1e-9);
    }

    #[test]
    fn bearing_rotates_target() {
        let cam = CameraParams::default();
        let parent = EntityState::vehicle(0.0, 0.0, 0.0, 0.0);
        // Person, 170 px tall → 3 m, centre at 3/4 width → +22.5°
        let det = detection(ObjectClass::Person, 550.0, 650.0, 100.0, 270.0);
        let p = project_detection(&det, &parent, 800.0, &cam, None).unwrap();
        assert_abs_diff_eq!(p.distance, 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(p.bearing_offset, 22.5, epsilon = 1e-12);
        let a = 22.5_f64.to_radians();
        assert_abs_diff_eq!(p.position.x, 3.0 * a.cos(), epsilon = 1e-9);
        assert_abs_diff_eq!(p.position.y, 3.0 * a.sin(), epsilon = 1e-9);
    }

    #[test]
    fn distance_positive_for_positive_height() {
        let cam = CameraParams::default();
        let parent = EntityState::vehicle(0.0, 0.0, 0.0, 0.0);
        for h in [0.5, 1.0, 17.0, 240.0, 1080.0] {
            let det = detection(ObjectClass::Car, 0.0, 10.0, 0.0, h);
            let p = project_detection(&det, &parent, 800.0, &cam, None).unwrap();
            assert!(p.distance > 0.0);
        }
    }

    #[test]
    fn degenerate_box_is_skipped() {
        let cam = CameraParams::default();
        let parent = EntityState::vehicle(0.0, 0.0, 0.0, 0.0);
        let flat = detection(ObjectClass::Car, 0.0, 10.0, 50.0, 50.0);
        let inverted = detection(ObjectClass::Car, 0.0, 10.0, 60.0, 50.0);
        assert!(project_detection(&flat, &parent, 800.0, &cam, None).is_none());
        assert!(project_detection(&inverted, &parent, 800.0, &cam, None).is_none());
    }

    #[test]
    fn elevated_sensor_uses_ground_range() {
        let cam = CameraParams::default();
        let mount = MountTransform {
            x: 0.0,
            y: 0.0,
            heading: 0.0,
            height: 20.0,
        };
        let parent = EntityState::fixed_sensor(&mount);
        // Car box height giving a raw 25 m estimate: 1500*30/(25*100) = 18 px
        let far = detection(ObjectClass::Car, 390.0, 410.0, 100.0, 118.0);
        let p = project_detection(&far, &parent, 800.0, &cam, Some(mount.height)).unwrap();
        assert_abs_diff_eq!(p.distance, 15.0, epsilon = 1e-9);

        // Raw 20 m (22.5 px) stays unmodified
        let near = detection(ObjectClass::Car, 390.0, 410.0, 100.0, 122.5);
        let p = project_detection(&near, &parent, 800.0, &cam, Some(mount.height)).unwrap();
        assert_abs_diff_eq!(p.distance, 20.0, epsilon = 1e-9);
    }

    #[test]
    fn vehicle_ignores_mount_height() {
        let cam = CameraParams::default();
        let parent = EntityState::vehicle(0.0, 0.0, 0.0, 0.0);
        let det = detection(ObjectClass::Car, 390.0, 410.0, 100.0, 118.0);
        let p = project_detection(&det, &parent, 800.0, &cam, Some(20.0)).unwrap();
        assert_abs_diff_eq!(p.distance, 25.0, epsilon = 1e-9);
    }
}
