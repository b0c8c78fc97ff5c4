//! Fundamental types used across the entire workspace.

use camera_models::{MountTransform, ObjectClass};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Discrete simulation step index.
pub type Tick = u64;

// ---------------------------------------------------------------------------
// Identifier types
// ---------------------------------------------------------------------------

/// Scene entity identifier (`vehicle_1`, `camera_2`, ...).
///
/// Ordering is plain byte-wise string order: `vehicle_10` sorts before
/// `vehicle_2`. Entities run, and win deduplication, in this order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// Entity state
// ---------------------------------------------------------------------------

/// Kinematic snapshot of one entity at one tick.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub is_fixed_sensor: bool,
    /// World position (meters)
    pub x: f64,
    pub y: f64,
    /// Heading (degrees, unit circle, 0° = +x)
    pub heading: f64,
    /// Speed (m/s), 0 for fixed sensors
    pub speed: f64,
}

impl EntityState {
    pub fn vehicle(x: f64, y: f64, heading: f64, speed: f64) -> Self {
        Self {
            is_fixed_sensor: false,
            x,
            y,
            heading,
            speed,
        }
    }

    /// State of a roadside sensor, synthesised from its static mount.
    pub fn fixed_sensor(mount: &MountTransform) -> Self {
        Self {
            is_fixed_sensor: true,
            x: mount.x,
            y: mount.y,
            heading: mount.heading,
            speed: 0.0,
        }
    }

    pub fn position(&self) -> Point2<f64> {
        Point2::new(self.x, self.y)
    }
}

// ---------------------------------------------------------------------------
// Detections and per-entity output
// ---------------------------------------------------------------------------

/// A typed, filtered detection in the parent entity's image.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub parent_id: EntityId,
    /// Unique within (parent, tick)
    pub detection_id: String,
    pub class: ObjectClass,
    pub xmin: f64,
    pub xmax: f64,
    pub ymin: f64,
    pub ymax: f64,
}

impl Detection {
    pub fn height_in_frame(&self) -> f64 {
        self.ymax - self.ymin
    }

    pub fn box_center_x(&self) -> f64 {
        self.xmin + (self.xmax - self.xmin) / 2.0
    }

    /// `parentId-detectionId`
    pub fn agent_id(&self) -> String {
        format!("{}-{}", self.parent_id, self.detection_id)
    }
}

/// Everything one entity publishes for one tick.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub entity_id: EntityId,
    pub state: EntityState,
    pub detections: Vec<Detection>,
    /// Width of the frame the detections refer to (pixels)
    pub image_width: u32,
    pub image_height: u32,
    /// Scene source had no frame for this entity at this tick
    #[serde(default)]
    pub frame_missing: bool,
}

// ---------------------------------------------------------------------------
// World model
// ---------------------------------------------------------------------------

/// Kind of node in the fused world model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentType {
    Vehicle,
    Person,
    Rsu,
}

impl From<ObjectClass> for AgentType {
    fn from(class: ObjectClass) -> Self {
        match class {
            ObjectClass::Car => AgentType::Vehicle,
            ObjectClass::Person => AgentType::Person,
        }
    }
}

/// One node of the fused world model for one tick.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldAgent {
    pub id: String,
    pub x: f64,
    pub y: f64,
    #[serde(rename = "type")]
    pub agent_type: AgentType,
    /// Derived from a projected detection rather than ground-truth state
    pub is_detected: bool,
    /// Resolves to an agent already added earlier in the tick
    pub matches_existing: bool,
    pub crashing: bool,
    pub nearest_intersection_id: Option<String>,
    /// Unknown (`None`) for detected agents
    pub heading: Option<f64>,
    pub speed: Option<f64>,
    pub tick: Tick,
    /// Observing entity, for detected agents
    pub parent_id: Option<EntityId>,
}

impl WorldAgent {
    pub fn position(&self) -> Point2<f64> {
        Point2::new(self.x, self.y)
    }
}

/// A known intersection of the map.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Intersection {
    pub id: String,
    pub x: f64,
    pub y: f64,
}

impl Intersection {
    pub fn position(&self) -> Point2<f64> {
        Point2::new(self.x, self.y)
    }
}

/// Congestion classification of an intersection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CongestionStatus {
    #[default]
    Low,
    Congested,
}

/// Per-tick traffic summary of one intersection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntersectionStatus {
    pub id: String,
    pub car_count: usize,
    pub human_count: usize,
    /// Roadside units within range (informational, not used for status)
    pub rsu_count: usize,
    /// Known vehicle speeds (m/s)
    pub speeds: Vec<f64>,
    pub status: CongestionStatus,
    pub tick: Tick,
}

/// The fused output of one tick, as appended to the result store.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TickRecord {
    pub tick: Tick,
    pub agents: Vec<WorldAgent>,
    pub intersections: Vec<IntersectionStatus>,
    /// Entities that had no camera frame this tick
    pub gaps: Vec<EntityId>,
}
