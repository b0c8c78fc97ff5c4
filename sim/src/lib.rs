//! `sim`: Scene replay runtime: scene sources, entity processes, tick
//! scheduler, result store and synthetic scenarios.

pub mod actor;
pub mod camera_sim;
pub mod channel;
pub mod detection_client;
pub mod entity;
pub mod replay;
pub mod scenarios;
pub mod scene;
pub mod scheduler;
pub mod store;

pub use actor::{Actor, ActorKind, MotionSpec};
pub use camera_sim::{CameraSimConfig, CameraSimulator, ModelProfile};
pub use detection_client::{DetectionClient, DetectionFilterConfig};
pub use replay::{
    load_detections, load_scene, save_json, RecordedDetector, RecordedScene, SceneFile,
};
pub use scenarios::{Scenario, ScenarioKind};
pub use scene::{RunMetadata, SceneSource};
pub use scheduler::{AbortHandle, Scheduler, SchedulerConfig};
pub use store::{run_id, JsonlResultStore, MemoryStore, ResultStore, RunInfo};
