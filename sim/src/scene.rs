//! Scene source contract: where entity states, camera frames and map data
//! come from.
//!
//! A scene source is read-only and indexed by `(entity, tick)`. Vehicles
//! report a kinematic state every tick; fixed roadside sensors report none
//! and are described once by their mount transform.

use camera_models::{CameraFrame, MountTransform};
use fusion_core::{EntityId, EntityState, Intersection, Tick};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Descriptive data about a recorded run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub map_name: String,
    pub frame_count: u64,
    pub vehicle_count: usize,
    pub sensor_count: usize,
    pub pedestrian_count: usize,
    /// Frames each intersection was congested in the recording
    #[serde(default)]
    pub congestion_statistics: BTreeMap<String, u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Source of per-tick entity data for a run.
pub trait SceneSource {
    /// Scene name, used in run identifiers.
    fn name(&self) -> &str;
    fn entity_ids(&self) -> Vec<EntityId>;
    /// Number of ticks in the recording.
    fn simulation_length(&self) -> u64;
    /// Kinematic state. `None` for fixed sensors.
    fn state_at(&self, entity: &EntityId, tick: Tick) -> Option<EntityState>;
    /// Camera frame. `None` when the recording has a gap.
    fn image_at(&self, entity: &EntityId, tick: Tick) -> Option<CameraFrame>;
    fn intersections(&self) -> Vec<Intersection>;
    fn map_waypoints(&self) -> Vec<[f64; 2]>;
    fn run_metadata(&self) -> RunMetadata;
    /// Static pose of a fixed sensor; `None` for vehicles.
    fn sensor_mount(&self, entity: &EntityId) -> Option<MountTransform>;
}
