//! Synthetic object detector.
//!
//! Renders the ground-truth actors of a scene into bounding boxes as seen by
//! each entity's camera, using the inverse of the pinhole range model:
//! - FOV and range culling
//! - miss probability (1 - P_D)
//! - multiplicative box-height jitter and column jitter
//! - the observer's own bonnet at the bottom of vehicle frames
//! - occasional boxes of classes fusion does not consume

use crate::actor::ActorKind;
use crate::replay::{ActorState, SceneFile};
use anyhow::bail;
use camera_models::{CameraFrame, CameraParams, ObjectClass, ObjectDetector, RawDetection};
use fusion_core::{FusionError, FusionResult, Tick};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Detector quality presets, from fastest/least accurate to slowest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ModelProfile {
    Nano,
    Small,
    Medium,
    Large,
    Xlarge,
}

impl ModelProfile {
    pub const ALL: [ModelProfile; 5] = [
        ModelProfile::Nano,
        ModelProfile::Small,
        ModelProfile::Medium,
        ModelProfile::Large,
        ModelProfile::Xlarge,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ModelProfile::Nano => "nano",
            ModelProfile::Small => "small",
            ModelProfile::Medium => "medium",
            ModelProfile::Large => "large",
            ModelProfile::Xlarge => "xlarge",
        }
    }

    /// Resolve a model name. Unknown names are a detector load failure.
    pub fn from_name(name: &str) -> FusionResult<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| FusionError::DetectorLoad {
                model: name.to_string(),
                reason: "no such model profile".into(),
            })
    }

    pub fn config(&self) -> CameraSimConfig {
        let (p_detection, max_range, height_jitter, p_spurious) = match self {
            ModelProfile::Nano => (0.60, 40.0, 0.15, 0.30),
            ModelProfile::Small => (0.70, 50.0, 0.12, 0.20),
            ModelProfile::Medium => (0.80, 60.0, 0.08, 0.15),
            ModelProfile::Large => (0.88, 70.0, 0.06, 0.10),
            ModelProfile::Xlarge => (0.93, 80.0, 0.05, 0.05),
        };
        CameraSimConfig {
            p_detection,
            max_range,
            height_jitter,
            p_spurious,
            ..Default::default()
        }
    }
}

/// Rendering parameters of the synthetic detector.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSimConfig {
    pub camera: CameraParams,
    /// Probability an actor in view is detected
    pub p_detection: f64,
    /// Ground range beyond which nothing is detected (m)
    pub max_range: f64,
    /// Objects closer than this are not rendered (m)
    pub min_range: f64,
    /// Relative box-height noise amplitude (uniform ±)
    pub height_jitter: f64,
    /// Box-column noise amplitude (pixels, uniform ±)
    pub column_jitter_px: f64,
    /// Probability per frame of an extra out-of-vocabulary box
    pub p_spurious: f64,
    /// Probability per vehicle frame of the own-bonnet box
    pub p_own_body: f64,
    /// Image row of the horizon as a fraction of the frame height
    pub horizon: f64,
}

impl Default for CameraSimConfig {
    fn default() -> Self {
        Self {
            camera: CameraParams::default(),
            p_detection: 0.8,
            max_range: 60.0,
            min_range: 1.0,
            height_jitter: 0.08,
            column_jitter_px: 4.0,
            p_spurious: 0.15,
            p_own_body: 0.5,
            horizon: 0.55,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Pose {
    x: f64,
    y: f64,
    heading: f64,
    /// Camera height above the road, fixed sensors only
    height: Option<f64>,
}

/// One camera-carrying entity of the scene.
#[derive(Clone, Debug)]
enum Observer {
    Fixed(Pose),
    Vehicle(Vec<Pose>),
}

impl Observer {
    fn pose_at(&self, tick: Tick) -> Option<Pose> {
        match self {
            Observer::Fixed(p) => Some(*p),
            Observer::Vehicle(poses) => poses.get(tick as usize).copied(),
        }
    }
}

fn wrap_deg(a: f64) -> f64 {
    (a + 180.0).rem_euclid(360.0) - 180.0
}

/// Ground-truth driven detector.
pub struct CameraSimulator {
    name: String,
    pub config: CameraSimConfig,
    observers: HashMap<String, Observer>,
    ground_truth: HashMap<Tick, Vec<ActorState>>,
    rng: ChaCha8Rng,
}

impl CameraSimulator {
    pub fn new(profile: ModelProfile, scene: &SceneFile, seed: u64) -> Self {
        Self::with_config(profile.name(), profile.config(), scene, seed)
    }

    pub fn with_config(
        name: impl Into<String>,
        config: CameraSimConfig,
        scene: &SceneFile,
        seed: u64,
    ) -> Self {
        let observers = scene
            .entities
            .iter()
            .map(|e| {
                let observer = match &e.mount {
                    Some(m) => Observer::Fixed(Pose {
                        x: m.x,
                        y: m.y,
                        heading: m.heading,
                        height: Some(m.height),
                    }),
                    None => Observer::Vehicle(
                        e.states
                            .iter()
                            .map(|s| Pose {
                                x: s.x,
                                y: s.y,
                                heading: s.heading,
                                height: None,
                            })
                            .collect(),
                    ),
                };
                (e.id.to_string(), observer)
            })
            .collect();
        let ground_truth = scene
            .ground_truth
            .iter()
            .map(|f| (f.tick, f.actors.clone()))
            .collect();
        Self {
            name: name.into(),
            config,
            observers,
            ground_truth,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Box for one actor, or `None` if it is culled or missed.
    fn render(
        &mut self,
        pose: &Pose,
        actor: &ActorState,
        frame: &CameraFrame,
    ) -> Option<RawDetection> {
        let cfg = &self.config;
        let (dx, dy) = (actor.x - pose.x, actor.y - pose.y);
        let ground = dx.hypot(dy);
        if ground < cfg.min_range || ground > cfg.max_range {
            return None;
        }
        let bearing = wrap_deg(dy.atan2(dx).to_degrees() - pose.heading);
        if !cfg.camera.in_fov(bearing) {
            return None;
        }
        if self.rng.gen::<f64>() > cfg.p_detection {
            return None;
        }

        let class = match actor.kind {
            ActorKind::Vehicle => ObjectClass::Car,
            ActorKind::Pedestrian => ObjectClass::Person,
        };
        let slant = match pose.height {
            Some(h) => ground.hypot(h),
            None => ground,
        };
        let nominal = cfg.camera.box_height_at_distance(class, slant)?;
        let height = nominal * (1.0 + cfg.height_jitter * (2.0 * self.rng.gen::<f64>() - 1.0));
        let width = match class {
            ObjectClass::Car => height * 2.0,
            ObjectClass::Person => height * 0.4,
        };
        let (w, h) = (frame.width as f64, frame.height as f64);
        let cx = cfg.camera.column_for_bearing(bearing, w)
            + cfg.column_jitter_px * (2.0 * self.rng.gen::<f64>() - 1.0);
        let ymin = h * cfg.horizon - height * 0.5;

        let mut det = RawDetection::new(
            class.label(),
            cx - width / 2.0,
            cx + width / 2.0,
            ymin,
            ymin + height,
        );
        det.confidence = 0.5 + 0.5 * self.rng.gen::<f64>();
        Some(det)
    }
}

impl ObjectDetector for CameraSimulator {
    fn name(&self) -> &str {
        &self.name
    }

    fn detect(&mut self, frame: &CameraFrame) -> anyhow::Result<Vec<RawDetection>> {
        let Some(observer) = self.observers.get(&frame.entity_id) else {
            bail!("frame from unknown entity `{}`", frame.entity_id);
        };
        let is_vehicle = matches!(observer, Observer::Vehicle(_));
        let Some(pose) = observer.pose_at(frame.tick) else {
            return Ok(Vec::new());
        };
        let actors = self.ground_truth.get(&frame.tick).cloned().unwrap_or_default();

        let mut out = Vec::new();
        for actor in actors.iter().filter(|a| a.id != frame.entity_id) {
            if let Some(det) = self.render(&pose, actor, frame) {
                out.push(det);
            }
        }

        let (w, h) = (frame.width as f64, frame.height as f64);
        if is_vehicle && self.rng.gen::<f64>() < self.config.p_own_body {
            out.push(RawDetection::new("car", 0.1 * w, 0.9 * w, 0.85 * h, h));
        }
        if self.rng.gen::<f64>() < self.config.p_spurious {
            let x = self.rng.gen::<f64>() * (w - 20.0);
            out.push(RawDetection::new("traffic light", x, x + 12.0, 0.1 * h, 0.1 * h + 30.0));
        }
        Ok(out)
    }
}
