//! Entity process: one camera-carrying participant of a run.
//!
//! Each tick the process reads its state and frame from the scene, runs the
//! detection client and publishes exactly one [`OutputRecord`] to its slot.

use crate::{channel::SlotWriter, detection_client::DetectionClient, scene::SceneSource};
use camera_models::{MountTransform, RawDetection};
use fusion_core::{EntityId, EntityState, FusionError, FusionResult, OutputRecord, Tick};
use tracing::{debug, warn};

#[derive(Clone, Debug)]
pub struct EntityProcess {
    pub id: EntityId,
    /// Present for fixed roadside sensors
    pub mount: Option<MountTransform>,
    last_raw: Vec<RawDetection>,
}

impl EntityProcess {
    pub fn new(id: EntityId, mount: Option<MountTransform>) -> Self {
        Self {
            id,
            mount,
            last_raw: Vec::new(),
        }
    }

    pub fn is_fixed_sensor(&self) -> bool {
        self.mount.is_some()
    }

    /// Raw detector output of the last tick, handed over to the result store.
    pub fn take_raw(&mut self) -> Vec<RawDetection> {
        std::mem::take(&mut self.last_raw)
    }

    fn state_at(&self, scene: &dyn SceneSource, tick: Tick) -> FusionResult<EntityState> {
        if let Some(mount) = &self.mount {
            return Ok(EntityState::fixed_sensor(mount));
        }
        scene
            .state_at(&self.id, tick)
            .ok_or_else(|| FusionError::MissingState {
                tick,
                entity: self.id.clone(),
            })
    }

    /// Produce and publish this entity's record for `tick`.
    pub fn advance_one_tick(
        &mut self,
        tick: Tick,
        scene: &dyn SceneSource,
        client: &mut DetectionClient,
        slot: SlotWriter<'_>,
    ) -> FusionResult<()> {
        let state = self.state_at(scene, tick)?;

        let Some(frame) = scene.image_at(&self.id, tick) else {
            warn!(tick, entity = %self.id, "camera frame missing, publishing empty record");
            self.last_raw.clear();
            return slot.write(OutputRecord {
                entity_id: self.id.clone(),
                state,
                detections: Vec::new(),
                image_width: 0,
                image_height: 0,
                frame_missing: true,
            });
        };

        let out = client
            .detect(&self.id, &frame, self.is_fixed_sensor())
            .map_err(|e| FusionError::Detector {
                tick,
                entity: self.id.clone(),
                reason: format!("{e:#}"),
            })?;
        debug!(
            tick,
            entity = %self.id,
            raw = out.raw.len(),
            kept = out.detections.len(),
            "entity detections"
        );
        self.last_raw = out.raw;

        slot.write(OutputRecord {
            entity_id: self.id.clone(),
            state,
            detections: out.detections,
            image_width: frame.width,
            image_height: frame.height,
            frame_missing: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        channel::SlotTable,
        detection_client::DetectionFilterConfig,
        replay::{
            DetectionFrame, DetectionsFile, FrameRef, RecordedDetector, RecordedScene, SceneEntity,
            SceneFile, StateSample,
        },
        scene::RunMetadata,
    };
    use fusion_core::Intersection;

    fn scene() -> RecordedScene {
        RecordedScene::new(SceneFile {
            name: "entity".into(),
            metadata: RunMetadata {
                frame_count: 2,
                ..Default::default()
            },
            frame_width: 800,
            frame_height: 600,
            entities: vec![
                SceneEntity {
                    id: "vehicle_1".into(),
                    mount: None,
                    states: vec![StateSample {
                        x: 1.0,
                        y: 2.0,
                        heading: 90.0,
                        speed: 3.0,
                    }],
                },
                SceneEntity {
                    id: "camera_1".into(),
                    mount: Some(MountTransform {
                        x: 10.0,
                        y: 0.0,
                        heading: 180.0,
                        height: 12.0,
                    }),
                    states: vec![],
                },
            ],
            intersections: vec![Intersection {
                id: "intersection_1".into(),
                x: 0.0,
                y: 0.0,
            }],
            waypoints: vec![],
            ground_truth: vec![],
            missing_frames: vec![FrameRef {
                entity: "camera_1".into(),
                tick: 1,
            }],
        })
        .unwrap()
    }

    fn client() -> DetectionClient {
        let detector = RecordedDetector::new(DetectionsFile {
            model: "medium".into(),
            frames: vec![DetectionFrame {
                entity: "vehicle_1".into(),
                tick: 0,
                detections: vec![
                    camera_models::RawDetection::new("car", 100.0, 160.0, 250.0, 290.0),
                    camera_models::RawDetection::new("bicycle", 300.0, 330.0, 250.0, 290.0),
                ],
            }],
        });
        DetectionClient::new(Box::new(detector), DetectionFilterConfig::default())
    }

    #[test]
    fn vehicle_publishes_state_and_filtered_detections() {
        let scene = scene();
        let mut client = client();
        let id = EntityId::new("vehicle_1");
        let mut table = SlotTable::new([id.clone()]);
        table.begin_tick(0);
        let mut entity = EntityProcess::new(id.clone(), None);
        entity
            .advance_one_tick(0, &scene, &mut client, table.writer(&id).unwrap())
            .unwrap();

        let records = table.drain().unwrap();
        assert_eq!(records[0].state.x, 1.0);
        assert_eq!(records[0].detections.len(), 1);
        assert_eq!(records[0].image_width, 800);
        assert_eq!(entity.take_raw().len(), 2);
        assert!(entity.take_raw().is_empty());
    }

    #[test]
    fn vehicle_without_state_is_fatal() {
        let scene = scene();
        let mut client = client();
        let id = EntityId::new("vehicle_1");
        let mut table = SlotTable::new([id.clone()]);
        table.begin_tick(1);
        let mut entity = EntityProcess::new(id.clone(), None);
        let err = entity
            .advance_one_tick(1, &scene, &mut client, table.writer(&id).unwrap())
            .unwrap_err();
        assert_eq!(err, FusionError::MissingState { tick: 1, entity: id });
    }

    #[test]
    fn fixed_sensor_gap_publishes_empty_record() {
        let scene = scene();
        let mut client = client();
        let id = EntityId::new("camera_1");
        let mount = scene.sensor_mount(&id);
        let mut table = SlotTable::new([id.clone()]);
        table.begin_tick(1);
        let mut entity = EntityProcess::new(id.clone(), mount);
        entity
            .advance_one_tick(1, &scene, &mut client, table.writer(&id).unwrap())
            .unwrap();

        let records = table.drain().unwrap();
        assert!(records[0].frame_missing);
        assert!(records[0].detections.is_empty());
        assert!(records[0].state.is_fixed_sensor);
        assert_eq!(records[0].state.x, 10.0);
        assert_eq!(records[0].state.speed, 0.0);
    }
}
