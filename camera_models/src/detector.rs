//! Object-detector contract: camera frames in, labelled bounding boxes out.
//!
//! The detector itself is an external collaborator (a neural network, a
//! recorded result file, a simulator). The fusion runtime only sees this
//! trait.

use serde::{Deserialize, Serialize};

/// One camera image handed to a detector.
///
/// `pixels` is opaque to the runtime: encoded image bytes for real
/// detectors, empty for detectors that key on `(entity_id, tick)`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CameraFrame {
    pub entity_id: String,
    pub tick: u64,
    pub width: u32,
    pub height: u32,
    #[serde(skip)]
    pub pixels: Vec<u8>,
}

/// A single detector output box, class label still untyped.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    pub class: String,
    #[serde(default = "full_confidence")]
    pub confidence: f64,
    pub xmin: f64,
    pub xmax: f64,
    pub ymin: f64,
    pub ymax: f64,
}

fn full_confidence() -> f64 {
    1.0
}

impl RawDetection {
    pub fn new(class: &str, xmin: f64, xmax: f64, ymin: f64, ymax: f64) -> Self {
        Self {
            class: class.to_string(),
            confidence: 1.0,
            xmin,
            xmax,
            ymin,
            ymax,
        }
    }

    pub fn width(&self) -> f64 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> f64 {
        self.ymax - self.ymin
    }
}

/// Trait for an object detector.
pub trait ObjectDetector {
    /// Model name, used in run identifiers.
    fn name(&self) -> &str;
    /// Detect objects in one frame.
    fn detect(&mut self, frame: &CameraFrame) -> anyhow::Result<Vec<RawDetection>>;
}

impl<D: ObjectDetector + ?Sized> ObjectDetector for Box<D> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn detect(&mut self, frame: &CameraFrame) -> anyhow::Result<Vec<RawDetection>> {
        (**self).detect(frame)
    }
}
