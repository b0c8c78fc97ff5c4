//! Intersection assignment and per-tick congestion classification.
//!
//! # Classification
//! Only agents assigned to the intersection with `matches_existing == false`
//! count. With at least one vehicle, the mean known vehicle speed (km/h) is
//! compared against the threshold: below → `congested`, otherwise `low`.
//! An intersection without vehicles stays `low`.

use crate::{
    collision::MS_TO_KMH,
    types::{AgentType, CongestionStatus, Intersection, IntersectionStatus, Tick, WorldAgent},
};
use nalgebra::{distance, Point2};

/// Closest intersection strictly closer than `max_distance`. Ties keep the
/// first intersection in list order.
pub fn nearest_intersection<'a>(
    position: &Point2<f64>,
    intersections: &'a [Intersection],
    max_distance: f64,
) -> Option<&'a Intersection> {
    let mut best: Option<(&Intersection, f64)> = None;
    for intersection in intersections {
        let d = distance(position, &intersection.position());
        if d >= max_distance {
            continue;
        }
        match best {
            Some((_, best_d)) if d >= best_d => {}
            _ => best = Some((intersection, d)),
        }
    }
    best.map(|(i, _)| i)
}

/// Mean speed in km/h of speeds given in m/s. Empty input → 0.
pub fn average_speed_kmh(speeds_ms: &[f64]) -> f64 {
    if speeds_ms.is_empty() {
        return 0.0;
    }
    speeds_ms.iter().sum::<f64>() / speeds_ms.len() as f64 * MS_TO_KMH
}

/// Classify every intersection from scratch using this tick's agents.
pub fn classify_intersections(
    agents: &[WorldAgent],
    intersections: &[Intersection],
    threshold_kmh: f64,
    tick: Tick,
) -> Vec<IntersectionStatus> {
    intersections
        .iter()
        .map(|intersection| classify_one(agents, intersection, threshold_kmh, tick))
        .collect()
}

fn classify_one(
    agents: &[WorldAgent],
    intersection: &Intersection,
    threshold_kmh: f64,
    tick: Tick,
) -> IntersectionStatus {
    let mut car_count = 0;
    let mut human_count = 0;
    let mut rsu_count = 0;
    let mut speeds = Vec::new();

    let assigned = agents.iter().filter(|a| {
        !a.matches_existing
            && a.nearest_intersection_id.as_deref() == Some(intersection.id.as_str())
    });
    for agent in assigned {
        match agent.agent_type {
            AgentType::Vehicle => {
                car_count += 1;
                if let Some(speed) = agent.speed {
                    speeds.push(speed);
                }
            }
            AgentType::Person => human_count += 1,
            AgentType::Rsu => rsu_count += 1,
        }
    }

    let status = if car_count > 0 && average_speed_kmh(&speeds) < threshold_kmh {
        CongestionStatus::Congested
    } else {
        CongestionStatus::Low
    };

    IntersectionStatus {
        id: intersection.id.clone(),
        car_count,
        human_count,
        rsu_count,
        speeds,
        status,
        tick,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
