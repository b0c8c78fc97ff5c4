//! Scenario definitions.
//!
//! Each scenario is a named layout of roads, intersections, camera vehicles,
//! background traffic, pedestrians and roadside sensors. Recording a
//! scenario steps every actor and produces a [`SceneFile`]. All scenarios
//! are deterministic given the same seed.

use crate::{
    actor::{Actor, ActorKind, MotionSpec},
    replay::{ActorState, FrameRef, GroundTruthFrame, SceneEntity, SceneFile, StateSample},
    scene::RunMetadata,
};
use camera_models::MountTransform;
use fusion_core::{collision::MS_TO_KMH, EntityId, Intersection};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which pre-defined scenario to build.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
pub enum ScenarioKind {
    /// One four-way intersection, free-flowing traffic, one RSU
    SingleIntersection,
    /// One intersection where traffic queues, one RSU
    Congested,
    /// Two intersections on one arterial, queueing at the second, two RSUs
    TwoIntersections,
}

impl ScenarioKind {
    pub fn scene_name(&self) -> &'static str {
        match self {
            ScenarioKind::SingleIntersection => "single_intersection",
            ScenarioKind::Congested => "congested",
            ScenarioKind::TwoIntersections => "two_intersections",
        }
    }
}

/// Ground-truth congestion rule applied while recording.
const GT_RADIUS_M: f64 = 30.0;
const GT_CONGESTED_KMH: f64 = 15.0;

/// A fully configured synthetic scenario.
#[derive(Clone, Debug)]
pub struct Scenario {
    pub name: String,
    pub seed: u64,
    pub frame_count: u64,
    /// Seconds per tick
    pub dt: f64,
    pub frame_width: u32,
    pub frame_height: u32,
    pub actors: Vec<Actor>,
    /// Actor ids of the vehicles that carry a camera
    pub camera_vehicles: Vec<String>,
    pub rsus: Vec<(EntityId, MountTransform)>,
    pub intersections: Vec<Intersection>,
    pub waypoints: Vec<[f64; 2]>,
    /// Per (entity, tick) probability that the camera frame is lost
    pub gap_probability: f64,
}

/// Rectangular loop along a road: outbound on one lane, back on the other.
fn lane_loop(from: [f64; 2], to: [f64; 2], half_width: f64) -> Vec<[f64; 2]> {
    let (dx, dy) = (to[0] - from[0], to[1] - from[1]);
    let len = dx.hypot(dy);
    // Right-hand normal
    let (nx, ny) = (dy / len * half_width, -dx / len * half_width);
    vec![
        [from[0] + nx, from[1] + ny],
        [to[0] + nx, to[1] + ny],
        [to[0] - nx, to[1] - ny],
        [from[0] - nx, from[1] - ny],
    ]
}

fn loop_length(waypoints: &[[f64; 2]]) -> f64 {
    (0..waypoints.len())
        .map(|i| {
            let (a, b) = (waypoints[i], waypoints[(i + 1) % waypoints.len()]);
            (b[0] - a[0]).hypot(b[1] - a[1])
        })
        .sum()
}

struct Builder {
    rng: ChaCha8Rng,
    actors: Vec<Actor>,
    camera_vehicles: Vec<String>,
    n_vehicles: usize,
    n_pedestrians: usize,
}

impl Builder {
    fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            actors: Vec::new(),
            camera_vehicles: Vec::new(),
            n_vehicles: 0,
            n_pedestrians: 0,
        }
    }

    /// Spread `count` vehicles evenly along a loop; the first `cameras` of
    /// them carry a camera.
    fn vehicles(
        &mut self,
        route: &[[f64; 2]],
        count: usize,
        cameras: usize,
        queue: Option<([f64; 2], f64)>,
    ) {
        let perimeter = loop_length(route);
        for i in 0..count {
            let speed = self.rng.gen_range(8.0..12.0);
            let motion = match queue {
                Some((center, slow_speed)) => MotionSpec::QueueAt {
                    waypoints: route.to_vec(),
                    speed,
                    center,
                    radius: 25.0,
                    slow_speed,
                },
                None => MotionSpec::Loop {
                    waypoints: route.to_vec(),
                    speed,
                },
            };
            self.n_vehicles += 1;
            let id = if i < cameras {
                let id = format!("vehicle_{}", self.camera_vehicles.len() + 1);
                self.camera_vehicles.push(id.clone());
                id
            } else {
                format!("npc_{}", self.n_vehicles)
            };
            let mut actor = Actor::new(id, ActorKind::Vehicle, motion);
            // Advance along the loop to the vehicle's start offset
            let offset = perimeter * i as f64 / count as f64 + self.rng.gen_range(0.0..5.0);
            actor.step(offset / speed);
            self.actors.push(actor);
        }
    }

    /// Pedestrians walking the sidewalk square around `center`, plus a few
    /// standing at its corners.
    fn pedestrians(&mut self, center: [f64; 2], walking: usize, standing: usize) {
        let [cx, cy] = center;
        let square = vec![
            [cx - 9.0, cy - 9.0],
            [cx + 9.0, cy - 9.0],
            [cx + 9.0, cy + 9.0],
            [cx - 9.0, cy + 9.0],
        ];
        for i in 0..walking {
            self.n_pedestrians += 1;
            let speed = self.rng.gen_range(1.0..1.8);
            let mut actor = Actor::new(
                format!("pedestrian_{}", self.n_pedestrians),
                ActorKind::Pedestrian,
                MotionSpec::Loop {
                    waypoints: square.clone(),
                    speed,
                },
            );
            actor.step(72.0 * i as f64 / walking as f64 / speed);
            self.actors.push(actor);
        }
        for i in 0..standing {
            self.n_pedestrians += 1;
            let corner = square[i % square.len()];
            self.actors.push(
                Actor::new(
                    format!("pedestrian_{}", self.n_pedestrians),
                    ActorKind::Pedestrian,
                    MotionSpec::Stationary,
                )
                .at(corner[0], corner[1], 0.0),
            );
        }
    }
}

/// RSU mounted on the corner of an intersection, looking across it.
fn corner_rsu(index: usize, center: [f64; 2]) -> (EntityId, MountTransform) {
    (
        EntityId::new(format!("rsu_{index}")),
        MountTransform {
            x: center[0] - 12.0,
            y: center[1] - 12.0,
            heading: 45.0,
            height: 20.0,
        },
    )
}

impl Scenario {
    /// Build the named scenario. Uses `seed` for repeatability.
    pub fn build(kind: ScenarioKind, seed: u64) -> Self {
        let mut scenario = match kind {
            ScenarioKind::SingleIntersection => Self::single_intersection(seed, None),
            ScenarioKind::Congested => Self::single_intersection(seed, Some(([0.0, 0.0], 1.5))),
            ScenarioKind::TwoIntersections => Self::two_intersections(seed),
        };
        scenario.name = kind.scene_name().to_string();
        scenario
    }

    fn base(
        seed: u64,
        builder: Builder,
        rsus: Vec<(EntityId, MountTransform)>,
        intersections: Vec<Intersection>,
        waypoints: Vec<[f64; 2]>,
    ) -> Self {
        Self {
            name: String::new(),
            seed,
            frame_count: 200,
            dt: 0.1,
            frame_width: 800,
            frame_height: 600,
            actors: builder.actors,
            camera_vehicles: builder.camera_vehicles,
            rsus,
            intersections,
            waypoints,
            gap_probability: 0.01,
        }
    }

    // -----------------------------------------------------------------------
    // One four-way intersection at the origin
    // -----------------------------------------------------------------------
    fn single_intersection(seed: u64, queue: Option<([f64; 2], f64)>) -> Self {
        let mut b = Builder::new(seed);
        let east_west = lane_loop([-90.0, 0.0], [90.0, 0.0], 3.0);
        let north_south = lane_loop([0.0, -90.0], [0.0, 90.0], 3.0);
        b.vehicles(&east_west, 6, 2, queue);
        b.vehicles(&north_south, 6, 2, queue);
        b.pedestrians([0.0, 0.0], 3, 2);

        let waypoints = east_west.iter().chain(&north_south).copied().collect();
        Self::base(
            seed,
            b,
            vec![corner_rsu(1, [0.0, 0.0])],
            vec![Intersection {
                id: "intersection_1".into(),
                x: 0.0,
                y: 0.0,
            }],
            waypoints,
        )
    }

    // -----------------------------------------------------------------------
    // Two intersections on an east-west arterial
    // -----------------------------------------------------------------------
    fn two_intersections(seed: u64) -> Self {
        let mut b = Builder::new(seed);
        let arterial = lane_loop([-90.0, 0.0], [240.0, 0.0], 3.0);
        let cross_1 = lane_loop([0.0, -90.0], [0.0, 90.0], 3.0);
        let cross_2 = lane_loop([150.0, -90.0], [150.0, 90.0], 3.0);
        b.vehicles(&arterial, 8, 2, None);
        b.vehicles(&cross_1, 4, 1, None);
        b.vehicles(&cross_2, 6, 1, Some(([150.0, 0.0], 1.5)));
        b.pedestrians([0.0, 0.0], 2, 1);
        b.pedestrians([150.0, 0.0], 2, 1);

        let waypoints = arterial
            .iter()
            .chain(&cross_1)
            .chain(&cross_2)
            .copied()
            .collect();
        Self::base(
            seed,
            b,
            vec![corner_rsu(1, [0.0, 0.0]), corner_rsu(2, [150.0, 0.0])],
            vec![
                Intersection {
                    id: "intersection_1".into(),
                    x: 0.0,
                    y: 0.0,
                },
                Intersection {
                    id: "intersection_2".into(),
                    x: 150.0,
                    y: 0.0,
                },
            ],
            waypoints,
        )
    }

    fn ground_truth_congestion(&self, counts: &mut BTreeMap<String, u64>) {
        for inter in &self.intersections {
            let speeds: Vec<f64> = self
                .actors
                .iter()
                .filter(|a| a.kind == ActorKind::Vehicle)
                .filter(|a| (a.position() - inter.position()).norm() < GT_RADIUS_M)
                .map(|a| a.speed * MS_TO_KMH)
                .collect();
            let entry = counts.entry(inter.id.clone()).or_insert(0);
            let mean = speeds.iter().sum::<f64>() / speeds.len().max(1) as f64;
            if !speeds.is_empty() && mean < GT_CONGESTED_KMH {
                *entry += 1;
            }
        }
    }

    /// Step every actor through the scenario and record the scene.
    pub fn record(mut self) -> SceneFile {
        let mut gap_rng = ChaCha8Rng::seed_from_u64(self.seed.wrapping_add(1));
        let mut states: BTreeMap<String, Vec<StateSample>> = self
            .camera_vehicles
            .iter()
            .map(|id| (id.clone(), Vec::with_capacity(self.frame_count as usize)))
            .collect();
        let mut ground_truth = Vec::with_capacity(self.frame_count as usize);
        let mut congestion = BTreeMap::new();
        let mut missing_frames = Vec::new();
        let entity_ids: Vec<EntityId> = self
            .rsus
            .iter()
            .map(|(id, _)| id.clone())
            .chain(self.camera_vehicles.iter().map(EntityId::new))
            .collect();

        for tick in 0..self.frame_count {
            for actor in &self.actors {
                if let Some(samples) = states.get_mut(&actor.id) {
                    samples.push(StateSample {
                        x: actor.x,
                        y: actor.y,
                        heading: actor.heading,
                        speed: actor.speed,
                    });
                }
            }
            ground_truth.push(GroundTruthFrame {
                tick,
                actors: self
                    .actors
                    .iter()
                    .map(|a| ActorState {
                        id: a.id.clone(),
                        kind: a.kind,
                        x: a.x,
                        y: a.y,
                        heading: a.heading,
                        speed: a.speed,
                    })
                    .collect(),
            });
            self.ground_truth_congestion(&mut congestion);
            // Never drop the first frame, so every entity is seen once
            for id in &entity_ids {
                if tick > 0 && gap_rng.gen::<f64>() < self.gap_probability {
                    missing_frames.push(FrameRef {
                        entity: id.clone(),
                        tick,
                    });
                }
            }
            for actor in &mut self.actors {
                actor.step(self.dt);
            }
        }

        let entities = self
            .rsus
            .iter()
            .map(|(id, mount)| SceneEntity {
                id: id.clone(),
                mount: Some(mount.clone()),
                states: Vec::new(),
            })
            .chain(states.into_iter().map(|(id, states)| SceneEntity {
                id: EntityId::new(id),
                mount: None,
                states,
            }))
            .collect();
        let pedestrian_count = self
            .actors
            .iter()
            .filter(|a| a.kind == ActorKind::Pedestrian)
            .count();

        SceneFile {
            metadata: RunMetadata {
                map_name: "synthetic".into(),
                frame_count: self.frame_count,
                vehicle_count: self.camera_vehicles.len(),
                sensor_count: self.rsus.len(),
                pedestrian_count,
                congestion_statistics: congestion,
                extra: Default::default(),
            },
            name: self.name,
            frame_width: self.frame_width,
            frame_height: self.frame_height,
            entities,
            intersections: self.intersections,
            waypoints: self.waypoints,
            ground_truth,
            missing_frames,
        }
    }
}
