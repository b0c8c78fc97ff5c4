//! Monocular pinhole camera model used to turn bounding boxes into ranges.
//!
//! # Conventions
//! - Headings and bearings are degrees on the unit circle (0° = +x, CCW).
//! - Box coordinates are pixels with the origin at the top-left corner.
//! - Reference heights are millimetres, the focal constant is in the units
//!   of the historical calibration, so `ref * focal / px` yields centimetres.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Object classes the fusion engine consumes. Everything else the detector
/// reports is discarded by the detection client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectClass {
    Car,
    Person,
}

impl ObjectClass {
    /// Parse a detector label. Returns `None` for labels outside the vocabulary.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "car" => Some(ObjectClass::Car),
            "person" => Some(ObjectClass::Person),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ObjectClass::Car => "car",
            ObjectClass::Person => "person",
        }
    }
}

impl fmt::Display for ObjectClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Intrinsic parameters shared by every camera in a scene.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraParams {
    /// Horizontal field of view (degrees)
    pub fov_deg: f64,
    /// Focal-length constant of the monocular range estimate
    pub focal_length: f64,
    /// Real-world height of a car (mm)
    pub car_height_mm: f64,
    /// Real-world height of a person (mm)
    pub person_height_mm: f64,
}

impl Default for CameraParams {
    fn default() -> Self {
        Self {
            fov_deg: 90.0,
            focal_length: 30.0,
            car_height_mm: 1500.0,
            person_height_mm: 1700.0,
        }
    }
}

impl CameraParams {
    /// Reference real-world height (mm) for a class.
    pub fn reference_height_mm(&self, class: ObjectClass) -> f64 {
        match class {
            ObjectClass::Car => self.car_height_mm,
            ObjectClass::Person => self.person_height_mm,
        }
    }

    /// Raw monocular range estimate (metres) from the box height in pixels.
    /// `None` for degenerate boxes (`height_px <= 0`).
    pub fn distance_from_box_height(&self, class: ObjectClass, height_px: f64) -> Option<f64> {
        if !(height_px > 0.0) {
            return None;
        }
        let distance_cm = self.reference_height_mm(class) * self.focal_length / height_px;
        Some(distance_cm / 100.0)
    }

    /// Inverse of [`Self::distance_from_box_height`]: the box height (pixels)
    /// an object of `class` produces at `distance_m`.
    pub fn box_height_at_distance(&self, class: ObjectClass, distance_m: f64) -> Option<f64> {
        if !(distance_m > 0.0) {
            return None;
        }
        Some(self.reference_height_mm(class) * self.focal_length / (distance_m * 100.0))
    }

    /// Bearing (degrees) of a pixel column relative to the optical axis.
    /// Zero at the image centre, `±fov/2` at the borders.
    pub fn bearing_offset(&self, center_x: f64, image_width: f64) -> Option<f64> {
        if !(image_width > 0.0) {
            return None;
        }
        Some(center_x / image_width * self.fov_deg - self.fov_deg / 2.0)
    }

    /// Pixel column at which a bearing offset appears. Inverse of
    /// [`Self::bearing_offset`].
    pub fn column_for_bearing(&self, bearing_deg: f64, image_width: f64) -> f64 {
        (bearing_deg + self.fov_deg / 2.0) / self.fov_deg * image_width
    }

    /// True if `bearing_deg` lies inside the horizontal field of view.
    pub fn in_fov(&self, bearing_deg: f64) -> bool {
        bearing_deg.abs() <= self.fov_deg / 2.0
    }
}

/// Static pose of a fixed roadside camera. Supplied once at setup.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MountTransform {
    pub x: f64,
    pub y: f64,
    /// Boresight heading (degrees)
    pub heading: f64,
    /// Height of the camera above the road (m)
    #[serde(default = "default_mount_height")]
    pub height: f64,
}

fn default_mount_height() -> f64 {
    20.0
}

impl MountTransform {
    /// Correct a slant range measured from an elevated mount to a ground
    /// range with `sqrt(d² − h²)`. Ranges not longer than the mount height
    /// are returned unchanged.
    pub fn ground_distance(&self, slant_m: f64) -> f64 {
        ground_distance(slant_m, self.height)
    }
}

/// Right-triangle ground-range correction for an elevated camera.
pub fn ground_distance(slant_m: f64, mount_height_m: f64) -> f64 {
    let radicand = slant_m * slant_m - mount_height_m * mount_height_m;
    if radicand > 0.0 {
        radicand.sqrt()
    } else {
        slant_m
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
