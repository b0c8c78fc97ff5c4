//! Fusion processor: turns one tick of per-entity output records into the
//! fused world model.
//!
//! # Processing steps per tick
//! 1. Order records by entity id (dedup depends on iteration order)
//! 2. Project every detection to a world position
//! 3. Collision check observer → detection
//! 4. Dedup against detected agents of earlier entities
//! 5. Assign the nearest intersection to every agent
//! 6. Append the entity's own agent followed by its detections
//! 7. Classify every intersection from the finished agent list

use crate::{
    collision,
    congestion::{classify_intersections, nearest_intersection},
    error::{FusionError, FusionResult},
    projection::project_detection,
    types::{AgentType, EntityId, Intersection, OutputRecord, Tick, TickRecord, WorldAgent},
    world::{MatchRadii, WorldModel},
};
use camera_models::CameraParams;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, time::Instant};
use tracing::debug;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Configuration for the fusion processor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    pub camera: CameraParams,
    /// Dedup radius for cars (m)
    pub car_match_radius: f64,
    /// Dedup radius for persons (m)
    pub person_match_radius: f64,
    /// Agents farther than this from every intersection are unassigned (m)
    pub intersection_radius: f64,
    /// Average vehicle speed below which an intersection is congested (km/h)
    pub congestion_speed_kmh: f64,
    /// Added to the braking distance for the collision warning (m)
    pub collision_margin_m: f64,
    /// Mount height of fixed sensors with no explicit height (m)
    pub rsu_mount_height: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            camera: CameraParams::default(),
            car_match_radius: 15.0,
            person_match_radius: 6.0,
            intersection_radius: 30.0,
            congestion_speed_kmh: 15.0,
            collision_margin_m: 1.0,
            rsu_mount_height: 20.0,
        }
    }
}

impl FusionConfig {
    /// Reject values that make the geometry meaningless.
    pub fn validate(&self) -> FusionResult<()> {
        let positive = [
            ("camera.fov_deg", self.camera.fov_deg),
            ("camera.focal_length", self.camera.focal_length),
            ("camera.car_height_mm", self.camera.car_height_mm),
            ("camera.person_height_mm", self.camera.person_height_mm),
            ("car_match_radius", self.car_match_radius),
            ("person_match_radius", self.person_match_radius),
            ("intersection_radius", self.intersection_radius),
            ("congestion_speed_kmh", self.congestion_speed_kmh),
        ];
        for (name, value) in positive {
            if !(value > 0.0) {
                return Err(FusionError::InvalidConfig(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }
        for (name, value) in [
            ("collision_margin_m", self.collision_margin_m),
            ("rsu_mount_height", self.rsu_mount_height),
        ] {
            if !(value >= 0.0) {
                return Err(FusionError::InvalidConfig(format!(
                    "{name} must not be negative, got {value}"
                )));
            }
        }
        Ok(())
    }

    pub fn match_radii(&self) -> MatchRadii {
        MatchRadii {
            car: self.car_match_radius,
            person: self.person_match_radius,
        }
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Counters collected while fusing one tick.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FusionStats {
    pub entities: usize,
    /// Detections that projected to a world position
    pub projected: usize,
    /// Detections skipped because their box was degenerate
    pub skipped: usize,
    /// Projected detections that resolved to an earlier agent
    pub duplicates: usize,
    /// Detections inside their observer's braking distance
    pub crash_warnings: usize,
    pub gaps: usize,
    pub elapsed_us: u64,
}

/// Outputs of one fusion step.
#[derive(Clone, Debug)]
pub struct FusionOutput {
    pub record: TickRecord,
    pub stats: FusionStats,
}

// ---------------------------------------------------------------------------
// Processor
// ---------------------------------------------------------------------------

/// Stateless per-tick fusion over a fixed set of intersections.
pub struct FusionProcessor {
    pub config: FusionConfig,
    intersections: Vec<Intersection>,
    /// Explicit mount heights of fixed sensors
    mount_heights: BTreeMap<EntityId, f64>,
}

impl FusionProcessor {
    /// Create a processor. Fails on invalid config or missing intersections.
    pub fn new(config: FusionConfig, intersections: Vec<Intersection>) -> FusionResult<Self> {
        config.validate()?;
        if intersections.is_empty() {
            return Err(FusionError::NoIntersections);
        }
        Ok(Self {
            config,
            intersections,
            mount_heights: BTreeMap::new(),
        })
    }

    /// Use known per-sensor mount heights instead of the configured default.
    pub fn with_mount_heights(mut self, heights: BTreeMap<EntityId, f64>) -> Self {
        self.mount_heights = heights;
        self
    }

    pub fn intersections(&self) -> &[Intersection] {
        &self.intersections
    }

    fn nearest_intersection_id(&self, position: &Point2<f64>) -> Option<String> {
        nearest_intersection(position, &self.intersections, self.config.intersection_radius)
            .map(|i| i.id.clone())
    }

    /// Fuse the output records of every entity for `tick`.
    pub fn process_tick(&self, tick: Tick, mut records: Vec<OutputRecord>) -> FusionOutput {
        let start = Instant::now();
        records.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));

        let n_detections: usize = records.iter().map(|r| r.detections.len()).sum();
        let mut world = WorldModel::with_capacity(records.len() + n_detections);
        let mut stats = FusionStats {
            entities: records.len(),
            ..Default::default()
        };
        let mut gaps = Vec::new();
        let radii = self.config.match_radii();
        let margin = self.config.collision_margin_m;

        for record in &records {
            if record.frame_missing {
                gaps.push(record.entity_id.clone());
            }
            let parent = &record.state;
            let mount_height = parent.is_fixed_sensor.then(|| {
                self.mount_heights
                    .get(&record.entity_id)
                    .copied()
                    .unwrap_or(self.config.rsu_mount_height)
            });

            let mut detected = Vec::with_capacity(record.detections.len());
            for detection in &record.detections {
                let Some(projected) = project_detection(
                    detection,
                    parent,
                    record.image_width as f64,
                    &self.config.camera,
                    mount_height,
                ) else {
                    debug!(
                        tick,
                        id = %detection.agent_id(),
                        height = detection.height_in_frame(),
                        "skipping degenerate detection"
                    );
                    stats.skipped += 1;
                    continue;
                };

                let check = collision::evaluate(parent, &projected.position, margin);
                let matched = world
                    .find_match(&projected.position, projected.class, &record.entity_id, &radii)
                    .map(|a| a.id.clone());
                if let Some(existing) = &matched {
                    debug!(tick, id = %projected.id, %existing, "detection matches existing agent");
                    stats.duplicates += 1;
                }
                if check.crashing {
                    stats.crash_warnings += 1;
                }
                stats.projected += 1;

                detected.push(WorldAgent {
                    nearest_intersection_id: self.nearest_intersection_id(&projected.position),
                    id: projected.id,
                    x: projected.position.x,
                    y: projected.position.y,
                    agent_type: AgentType::from(projected.class),
                    is_detected: true,
                    matches_existing: matched.is_some(),
                    crashing: check.crashing,
                    heading: None,
                    speed: None,
                    tick,
                    parent_id: Some(record.entity_id.clone()),
                });
            }

            let own = WorldAgent {
                id: record.entity_id.to_string(),
                x: parent.x,
                y: parent.y,
                agent_type: if parent.is_fixed_sensor {
                    AgentType::Rsu
                } else {
                    AgentType::Vehicle
                },
                is_detected: false,
                matches_existing: false,
                crashing: detected.iter().any(|a| a.crashing),
                nearest_intersection_id: self.nearest_intersection_id(&parent.position()),
                heading: Some(parent.heading),
                speed: Some(parent.speed),
                tick,
                parent_id: None,
            };
            world.extend(std::iter::once(own).chain(detected));
        }

        let agents = world.into_agents();
        let intersections = classify_intersections(
            &agents,
            &self.intersections,
            self.config.congestion_speed_kmh,
            tick,
        );
        stats.gaps = gaps.len();
        stats.elapsed_us = start.elapsed().as_micros() as u64;

        FusionOutput {
            record: TickRecord {
                tick,
                agents,
                intersections,
                gaps,
            },
            stats,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CongestionStatus, Detection, EntityState};
    use camera_models::ObjectClass;

    const WIDTH: u32 = 800;

    fn intersections() -> Vec<Intersection> {
        vec![
            Intersection {
                id: "intersection_1".into(),
                x: 0.0,
                y: 0.0,
            },
            Intersection {
                id: "intersection_2".into(),
                x: 200.0,
                y: 0.0,
            },
        ]
    }

    /// Car box centred in frame, tall enough to project `distance_m` ahead.
    fn car_ahead(parent: &str, id: &str, distance_m: f64) -> Detection {
        let h = CameraParams::default()
            .box_height_at_distance(ObjectClass::Car, distance_m)
            .unwrap();
        Detection {
            parent_id: parent.into(),
            detection_id: id.into(),
            class: ObjectClass::Car,
            xmin: 380.0,
            xmax: 420.0,
            ymin: 300.0,
            ymax: 300.0 + h,
        }
    }

    fn record(id: &str, state: EntityState, detections: Vec<Detection>) -> OutputRecord {
        OutputRecord {
            entity_id: id.into(),
            state,
            detections,
            image_width: WIDTH,
            image_height: 600,
            frame_missing: false,
        }
    }

    fn processor() -> FusionProcessor {
        FusionProcessor::new(FusionConfig::default(), intersections()).unwrap()
    }

    #[test]
    fn two_entities_without_detections() {
        let out = processor().process_tick(
            0,
            vec![
                record("vehicle_2", EntityState::vehicle(10.0, 0.0, 0.0, 10.0), vec![]),
                record("vehicle_1", EntityState::vehicle(-10.0, 0.0, 180.0, 10.0), vec![]),
            ],
        );
        let agents = &out.record.agents;
        assert_eq!(agents.len(), 2);
        assert!(agents.iter().all(|a| !a.is_detected));
        assert_eq!(agents[0].id, "vehicle_1", "records are fused in id order");
        for status in &out.record.intersections {
            assert_eq!(status.human_count, 0);
            assert_eq!(status.status, CongestionStatus::Low);
        }
    }

    #[test]
    fn agent_count_is_detections_plus_entities() {
        let out = processor().process_tick(
            4,
            vec![
                record(
                    "vehicle_1",
                    EntityState::vehicle(0.0, 0.0, 0.0, 5.0),
                    vec![car_ahead("vehicle_1", "0", 20.0), car_ahead("vehicle_1", "1", 40.0)],
                ),
                record(
                    "vehicle_2",
                    EntityState::vehicle(100.0, 0.0, 90.0, 5.0),
                    vec![car_ahead("vehicle_2", "0", 10.0)],
                ),
            ],
        );
        assert_eq!(out.record.agents.len(), 3 + 2);
        assert_eq!(out.stats.projected, 3);
        assert!(out.record.agents.iter().all(|a| a.tick == 4));
    }

    #[test]
    fn degenerate_boxes_are_skipped() {
        let mut flat = car_ahead("vehicle_1", "0", 20.0);
        flat.ymax = flat.ymin;
        let out = processor().process_tick(
            0,
            vec![record("vehicle_1", EntityState::vehicle(0.0, 0.0, 0.0, 0.0), vec![flat])],
        );
        assert_eq!(out.record.agents.len(), 1);
        assert_eq!(out.stats.skipped, 1);
    }

    #[test]
    fn second_observer_duplicates_first() {
        // Both observers see the same car at (20, 0)
        let out = processor().process_tick(
            0,
            vec![
                record(
                    "vehicle_b",
                    EntityState::vehicle(40.0, 0.0, 180.0, 5.0),
                    vec![car_ahead("vehicle_b", "0", 20.0)],
                ),
                record(
                    "vehicle_a",
                    EntityState::vehicle(0.0, 0.0, 0.0, 5.0),
                    vec![car_ahead("vehicle_a", "0", 20.0)],
                ),
            ],
        );
        let a = out.record.agents.iter().find(|a| a.id == "vehicle_a-0").unwrap();
        let b = out.record.agents.iter().find(|a| a.id == "vehicle_b-0").unwrap();
        assert!(!a.matches_existing, "first in id order is kept");
        assert!(b.matches_existing);
        assert_eq!(out.stats.duplicates, 1);
    }

    #[test]
    fn same_observer_never_dedups_itself() {
        let out = processor().process_tick(
            0,
            vec![record(
                "vehicle_a",
                EntityState::vehicle(0.0, 0.0, 0.0, 5.0),
                vec![car_ahead("vehicle_a", "0", 20.0), car_ahead("vehicle_a", "1", 21.0)],
            )],
        );
        assert!(out.record.agents.iter().all(|a| !a.matches_existing));
    }

    #[test]
    fn fusion_is_deterministic() {
        let records = vec![
            record(
                "vehicle_1",
                EntityState::vehicle(0.0, 0.0, 0.0, 5.0),
                vec![car_ahead("vehicle_1", "0", 20.0), car_ahead("vehicle_1", "1", 8.0)],
            ),
            record(
                "vehicle_2",
                EntityState::vehicle(30.0, 5.0, 180.0, 5.0),
                vec![car_ahead("vehicle_2", "0", 12.0)],
            ),
            record(
                "vehicle_3",
                EntityState::vehicle(20.0, -20.0, 90.0, 5.0),
                vec![car_ahead("vehicle_3", "0", 18.0)],
            ),
        ];
        let p = processor();
        let first = p.process_tick(0, records.clone());
        let mut shuffled = records;
        shuffled.reverse();
        let second = p.process_tick(0, shuffled);
        let flags = |o: &FusionOutput| {
            o.record
                .agents
                .iter()
                .map(|a| (a.id.clone(), a.matches_existing))
                .collect::<Vec<_>>()
        };
        assert_eq!(flags(&first), flags(&second));
    }

    #[test]
    fn crashing_marks_detection_and_observer() {
        let out = processor().process_tick(
            0,
            vec![record(
                "vehicle_1",
                EntityState::vehicle(0.0, 0.0, 0.0, 0.0),
                vec![car_ahead("vehicle_1", "0", 0.5)],
            )],
        );
        let own = out.record.agents.iter().find(|a| a.id == "vehicle_1").unwrap();
        let det = out.record.agents.iter().find(|a| a.id == "vehicle_1-0").unwrap();
        assert!(det.crashing);
        assert!(own.crashing);
        assert_eq!(out.stats.crash_warnings, 1);
    }

    #[test]
    fn far_agents_have_no_intersection() {
        let out = processor().process_tick(
            0,
            vec![record("vehicle_1", EntityState::vehicle(0.0, 100.0, 0.0, 0.0), vec![])],
        );
        assert!(out.record.agents[0].nearest_intersection_id.is_none());
    }

    #[test]
    fn rsu_detections_use_mount_height() {
        let mount = camera_models::MountTransform {
            x: -25.0,
            y: 0.0,
            heading: 0.0,
            height: 20.0,
        };
        let p = processor().with_mount_heights(BTreeMap::from([(EntityId::new("camera_1"), 20.0)]));
        let out = p.process_tick(
            0,
            vec![record(
                "camera_1",
                EntityState::fixed_sensor(&mount),
                vec![car_ahead("camera_1", "0", 25.0)],
            )],
        );
        let det = out.record.agents.iter().find(|a| a.is_detected).unwrap();
        approx::assert_abs_diff_eq!(det.x, -10.0, epsilon = 1e-9);
        let rsu = out.record.agents.iter().find(|a| !a.is_detected).unwrap();
        assert_eq!(rsu.agent_type, AgentType::Rsu);
        assert_eq!(out.record.intersections[0].rsu_count, 1);
    }

    #[test]
    fn gaps_are_reported() {
        let mut missing = record("vehicle_1", EntityState::vehicle(0.0, 0.0, 0.0, 0.0), vec![]);
        missing.frame_missing = true;
        let out = processor().process_tick(2, vec![missing]);
        assert_eq!(out.record.gaps, vec![EntityId::new("vehicle_1")]);
        assert_eq!(out.stats.gaps, 1);
    }

    #[test]
    fn invalid_setup_is_rejected() {
        assert_eq!(
            FusionProcessor::new(FusionConfig::default(), vec![]).err(),
            Some(FusionError::NoIntersections)
        );
        let cfg = FusionConfig {
            car_match_radius: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            FusionProcessor::new(cfg, intersections()),
            Err(FusionError::InvalidConfig(_))
        ));
    }
}
