//! Recorded scenes: serialize/deserialize scene logs and the detections
//! produced on them, and replay both through the scene-source and detector
//! contracts.

use crate::{actor::ActorKind, scene::RunMetadata, scene::SceneSource};
use anyhow::{bail, Context};
use camera_models::{CameraFrame, MountTransform, ObjectDetector, RawDetection};
use fusion_core::{EntityId, EntityState, Intersection, Tick};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::{BufReader, BufWriter};
use std::path::Path;

// ---------------------------------------------------------------------------
// File format
// ---------------------------------------------------------------------------

/// A full recorded scene.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SceneFile {
    pub name: String,
    pub metadata: RunMetadata,
    pub frame_width: u32,
    pub frame_height: u32,
    pub entities: Vec<SceneEntity>,
    pub intersections: Vec<Intersection>,
    #[serde(default)]
    pub waypoints: Vec<[f64; 2]>,
    /// Every actor of the scene, sampled each tick
    #[serde(default)]
    pub ground_truth: Vec<GroundTruthFrame>,
    /// Camera frames absent from the recording
    #[serde(default)]
    pub missing_frames: Vec<FrameRef>,
}

/// One camera-carrying entity of a scene.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SceneEntity {
    pub id: EntityId,
    /// Present for fixed sensors only
    #[serde(default)]
    pub mount: Option<MountTransform>,
    /// One sample per tick for vehicles, empty for fixed sensors
    #[serde(default)]
    pub states: Vec<StateSample>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateSample {
    pub x: f64,
    pub y: f64,
    pub heading: f64,
    pub speed: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GroundTruthFrame {
    pub tick: Tick,
    pub actors: Vec<ActorState>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActorState {
    pub id: String,
    pub kind: ActorKind,
    pub x: f64,
    pub y: f64,
    pub heading: f64,
    pub speed: f64,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameRef {
    pub entity: EntityId,
    pub tick: Tick,
}

/// Detector output recorded per (entity, tick).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DetectionsFile {
    pub model: String,
    pub frames: Vec<DetectionFrame>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DetectionFrame {
    pub entity: EntityId,
    pub tick: Tick,
    pub detections: Vec<RawDetection>,
}

/// Save any serializable log to a JSON file.
pub fn save_json<T: Serialize>(value: &T, path: &Path) -> anyhow::Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("creating {}", path.display()))?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, value)?;
    Ok(())
}

fn load_json<T: for<'de> Deserialize<'de>>(path: &Path) -> anyhow::Result<T> {
    let file =
        std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let reader = BufReader::new(file);
    serde_json::from_reader(reader).with_context(|| format!("parsing {}", path.display()))
}

/// Load a scene file from JSON.
pub fn load_scene(path: &Path) -> anyhow::Result<SceneFile> {
    load_json(path)
}

/// Load a detections file from JSON.
pub fn load_detections(path: &Path) -> anyhow::Result<DetectionsFile> {
    load_json(path)
}

// ---------------------------------------------------------------------------
// Scene source over a recorded scene
// ---------------------------------------------------------------------------

/// Replays a [`SceneFile`] as a [`SceneSource`].
pub struct RecordedScene {
    file: SceneFile,
    index: BTreeMap<EntityId, usize>,
    missing: HashSet<FrameRef>,
}

impl RecordedScene {
    /// Index a scene. Fails on duplicate entity ids or an empty recording.
    pub fn new(file: SceneFile) -> anyhow::Result<Self> {
        if file.metadata.frame_count == 0 {
            bail!("scene `{}` has no frames", file.name);
        }
        let mut index = BTreeMap::new();
        for (i, entity) in file.entities.iter().enumerate() {
            if index.insert(entity.id.clone(), i).is_some() {
                bail!("scene `{}` lists entity `{}` twice", file.name, entity.id);
            }
        }
        let missing = file.missing_frames.iter().cloned().collect();
        Ok(Self {
            file,
            index,
            missing,
        })
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        Self::new(load_scene(path)?)
    }

    pub fn file(&self) -> &SceneFile {
        &self.file
    }

    fn entity(&self, id: &EntityId) -> Option<&SceneEntity> {
        self.index.get(id).map(|&i| &self.file.entities[i])
    }
}

impl SceneSource for RecordedScene {
    fn name(&self) -> &str {
        &self.file.name
    }

    fn entity_ids(&self) -> Vec<EntityId> {
        self.index.keys().cloned().collect()
    }

    fn simulation_length(&self) -> u64 {
        self.file.metadata.frame_count
    }

    fn state_at(&self, entity: &EntityId, tick: Tick) -> Option<EntityState> {
        let s = self.entity(entity)?.states.get(tick as usize)?;
        Some(EntityState::vehicle(s.x, s.y, s.heading, s.speed))
    }

    fn image_at(&self, entity: &EntityId, tick: Tick) -> Option<CameraFrame> {
        self.entity(entity)?;
        if tick >= self.simulation_length() {
            return None;
        }
        let key = FrameRef {
            entity: entity.clone(),
            tick,
        };
        if self.missing.contains(&key) {
            return None;
        }
        Some(CameraFrame {
            entity_id: entity.to_string(),
            tick,
            width: self.file.frame_width,
            height: self.file.frame_height,
            pixels: Vec::new(),
        })
    }

    fn intersections(&self) -> Vec<Intersection> {
        self.file.intersections.clone()
    }

    fn map_waypoints(&self) -> Vec<[f64; 2]> {
        self.file.waypoints.clone()
    }

    fn run_metadata(&self) -> RunMetadata {
        self.file.metadata.clone()
    }

    fn sensor_mount(&self, entity: &EntityId) -> Option<MountTransform> {
        self.entity(entity)?.mount.clone()
    }
}

// ---------------------------------------------------------------------------
// Detector over recorded detections
// ---------------------------------------------------------------------------

/// Replays a [`DetectionsFile`]: frames are looked up by (entity, tick).
pub struct RecordedDetector {
    model: String,
    frames: HashMap<(String, Tick), Vec<RawDetection>>,
}

impl RecordedDetector {
    pub fn new(file: DetectionsFile) -> Self {
        let frames = file
            .frames
            .into_iter()
            .map(|f| ((f.entity.0, f.tick), f.detections))
            .collect();
        Self {
            model: file.model,
            frames,
        }
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        Ok(Self::new(load_detections(path)?))
    }
}

impl ObjectDetector for RecordedDetector {
    fn name(&self) -> &str {
        &self.model
    }

    fn detect(&mut self, frame: &CameraFrame) -> anyhow::Result<Vec<RawDetection>> {
        Ok(self
            .frames
            .get(&(frame.entity_id.clone(), frame.tick))
            .cloned()
            .unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn two_vehicle_scene() -> SceneFile {
        SceneFile {
            name: "unit".into(),
            metadata: RunMetadata {
                map_name: "Town00".into(),
                frame_count: 2,
                vehicle_count: 1,
                sensor_count: 1,
                ..Default::default()
            },
            frame_width: 800,
            frame_height: 600,
            entities: vec![
                SceneEntity {
                    id: "vehicle_1".into(),
                    mount: None,
                    states: vec![
                        StateSample {
                            x: 0.0,
                            y: 0.0,
                            heading: 0.0,
                            speed: 5.0,
                        },
                        StateSample {
                            x: 5.0,
                            y: 0.0,
                            heading: 0.0,
                            speed: 5.0,
                        },
                    ],
                },
                SceneEntity {
                    id: "camera_1".into(),
                    mount: Some(MountTransform {
                        x: 10.0,
                        y: 10.0,
                        heading: 270.0,
                        height: 20.0,
                    }),
                    states: vec![],
                },
            ],
            intersections: vec![Intersection {
                id: "intersection_1".into(),
                x: 0.0,
                y: 0.0,
            }],
            waypoints: vec![[0.0, 0.0], [10.0, 0.0]],
            ground_truth: vec![],
            missing_frames: vec![FrameRef {
                entity: "vehicle_1".into(),
                tick: 1,
            }],
        }
    }

    #[test]
    fn recorded_scene_answers_contract() {
        let scene = RecordedScene::new(two_vehicle_scene()).unwrap();
        let ids = scene.entity_ids();
        assert_eq!(ids, vec![EntityId::new("camera_1"), EntityId::new("vehicle_1")]);
        assert_eq!(scene.simulation_length(), 2);

        let v = EntityId::new("vehicle_1");
        let c = EntityId::new("camera_1");
        assert_eq!(scene.state_at(&v, 1).unwrap().x, 5.0);
        assert!(scene.state_at(&c, 0).is_none());
        assert!(scene.sensor_mount(&c).is_some());
        assert!(scene.sensor_mount(&v).is_none());

        assert!(scene.image_at(&v, 0).is_some());
        assert!(scene.image_at(&v, 1).is_none(), "recorded gap");
        assert!(scene.image_at(&c, 1).is_some());
        assert!(scene.image_at(&c, 2).is_none(), "past the end");
        assert!(scene.image_at(&"nobody".into(), 0).is_none());
    }

    #[test]
    fn duplicate_entities_rejected() {
        let mut file = two_vehicle_scene();
        file.entities.push(file.entities[0].clone());
        assert!(RecordedScene::new(file).is_err());
    }

    #[test]
    fn scene_file_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene.json");
        save_json(&two_vehicle_scene(), &path).unwrap();
        let scene = RecordedScene::load(&path).unwrap();
        assert_eq!(scene.name(), "unit");
        assert_eq!(scene.map_waypoints().len(), 2);
        assert_eq!(scene.run_metadata().map_name, "Town00");
    }

    #[test]
    fn recorded_detector_keys_on_entity_and_tick() {
        let mut det = RecordedDetector::new(DetectionsFile {
            model: "medium".into(),
            frames: vec![DetectionFrame {
                entity: "vehicle_1".into(),
                tick: 3,
                detections: vec![RawDetection::new("car", 1.0, 2.0, 3.0, 4.0)],
            }],
        });
        let frame = CameraFrame {
            entity_id: "vehicle_1".into(),
            tick: 3,
            width: 800,
            height: 600,
            pixels: vec![],
        };
        assert_eq!(det.name(), "medium");
        assert_eq!(det.detect(&frame).unwrap().len(), 1);
        let other = CameraFrame { tick: 4, ..frame };
        assert!(det.detect(&other).unwrap().is_empty());
    }
}
