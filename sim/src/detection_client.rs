//! Detection client: wraps an object detector and turns its raw output into
//! typed detections for one observing entity.
//!
//! # Filtering
//! - labels other than `car` / `person` are dropped
//! - for vehicles, a car box hugging the bottom edge and spanning most of the
//!   frame width is the observer's own bonnet and is dropped

use camera_models::{CameraFrame, ObjectClass, ObjectDetector, RawDetection};
use fusion_core::{Detection, EntityId};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Own-body filter thresholds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionFilterConfig {
    /// Boxes whose bottom lies within this fraction of the frame height
    /// from the bottom edge are candidates for the observer's own body
    pub bottom_band: f64,
    /// Minimum box width (fraction of frame width) for an own-body box
    pub min_body_width: f64,
}

impl Default for DetectionFilterConfig {
    fn default() -> Self {
        Self {
            bottom_band: 0.05,
            min_body_width: 0.5,
        }
    }
}

/// Result of running the detector on one frame.
#[derive(Clone, Debug, Default)]
pub struct ClientOutput {
    pub detections: Vec<Detection>,
    /// Unfiltered detector output, kept for the result store
    pub raw: Vec<RawDetection>,
}

pub struct DetectionClient {
    detector: Box<dyn ObjectDetector>,
    pub config: DetectionFilterConfig,
}

impl DetectionClient {
    pub fn new(detector: Box<dyn ObjectDetector>, config: DetectionFilterConfig) -> Self {
        Self { detector, config }
    }

    pub fn model_name(&self) -> &str {
        self.detector.name()
    }

    /// True if `raw` is plausibly the observing vehicle itself.
    pub fn is_own_body(&self, raw: &RawDetection, frame: &CameraFrame) -> bool {
        let (w, h) = (frame.width as f64, frame.height as f64);
        raw.ymax >= h * (1.0 - self.config.bottom_band)
            && raw.width() >= w * self.config.min_body_width
    }

    /// Run the detector on `frame` and keep the detections fusion consumes.
    pub fn detect(
        &mut self,
        parent: &EntityId,
        frame: &CameraFrame,
        is_fixed_sensor: bool,
    ) -> anyhow::Result<ClientOutput> {
        let raw = self.detector.detect(frame)?;
        let mut detections = Vec::with_capacity(raw.len());
        for r in &raw {
            let Some(class) = ObjectClass::from_label(&r.class) else {
                trace!(entity = %parent, label = %r.class, "discarding class");
                continue;
            };
            if !is_fixed_sensor && class == ObjectClass::Car && self.is_own_body(r, frame) {
                trace!(entity = %parent, "discarding own-body detection");
                continue;
            }
            detections.push(Detection {
                parent_id: parent.clone(),
                detection_id: detections.len().to_string(),
                class,
                xmin: r.xmin,
                xmax: r.xmax,
                ymin: r.ymin,
                ymax: r.ymax,
            });
        }
        Ok(ClientOutput { detections, raw })
    }
}
