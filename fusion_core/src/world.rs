//! Per-tick world-model assembly and cross-entity deduplication.
//!
//! Agents are appended entity by entity in ascending id order. A projected
//! detection matches an existing agent when an already-added *detected*
//! agent from an earlier entity has the same class and lies within the
//! class radius. Matched detections stay in the world model for rendering
//! but are excluded from intersection counts.

use crate::types::{AgentType, EntityId, WorldAgent};
use camera_models::ObjectClass;
use nalgebra::{distance, Point2};

/// Match radii per class (meters).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MatchRadii {
    pub car: f64,
    pub person: f64,
}

impl MatchRadii {
    pub fn for_class(&self, class: ObjectClass) -> f64 {
        match class {
            ObjectClass::Car => self.car,
            ObjectClass::Person => self.person,
        }
    }
}

impl Default for MatchRadii {
    fn default() -> Self {
        Self {
            car: 15.0,
            person: 6.0,
        }
    }
}

/// Append-only list of the agents of one tick.
#[derive(Clone, Debug, Default)]
pub struct WorldModel {
    agents: Vec<WorldAgent>,
}

impl WorldModel {
    pub fn with_capacity(n: usize) -> Self {
        Self {
            agents: Vec::with_capacity(n),
        }
    }

    /// First earlier detected agent that a new detection of `class` at
    /// `position`, observed by `observer`, resolves to.
    pub fn find_match(
        &self,
        position: &Point2<f64>,
        class: ObjectClass,
        observer: &EntityId,
        radii: &MatchRadii,
    ) -> Option<&WorldAgent> {
        let agent_type = AgentType::from(class);
        let radius = radii.for_class(class);
        self.agents.iter().find(|a| {
            a.is_detected
                && a.agent_type == agent_type
                && a.parent_id.as_ref() != Some(observer)
                && distance(&a.position(), position) < radius
        })
    }

    pub fn extend(&mut self, agents: impl IntoIterator<Item = WorldAgent>) {
        self.agents.extend(agents);
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn agents(&self) -> &[WorldAgent] {
        &self.agents
    }

    pub fn into_agents(self) -> Vec<WorldAgent> {
        self.agents
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detected(id: &str, parent: &str, class: ObjectClass, x: f64, y: f64) -> WorldAgent {
        WorldAgent {
            id: id.into(),
            x,
            y,
            agent_type: class.into(),
            is_detected: true,
            matches_existing: false,
            crashing: false,
            nearest_intersection_id: None,
            heading: None,
            speed: None,
            tick: 0,
            parent_id: Some(EntityId::new(parent)),
        }
    }

    #[test]
    fn car_within_radius_matches() {
        let mut world = WorldModel::default();
        world.extend([detected("a-0", "a", ObjectClass::Car, 0.0, 0.0)]);
        let radii = MatchRadii::default();
        let hit = world.find_match(&Point2::new(14.0, 0.0), ObjectClass::Car, &"b".into(), &radii);
        assert_eq!(hit.map(|a| a.id.as_str()), Some("a-0"));
        let miss = world.find_match(&Point2::new(16.0, 0.0), ObjectClass::Car, &"b".into(), &radii);
        assert!(miss.is_none());
    }

    #[test]
    fn classes_never_cross_match() {
        let mut world = WorldModel::default();
        world.extend([detected("a-0", "a", ObjectClass::Car, 0.0, 0.0)]);
        let radii = MatchRadii::default();
        let p = Point2::new(1.0, 0.0);
        assert!(world.find_match(&p, ObjectClass::Person, &"b".into(), &radii).is_none());
    }

    #[test]
    fn person_radius_is_tighter() {
        let mut world = WorldModel::default();
        world.extend([detected("a-0", "a", ObjectClass::Person, 0.0, 0.0)]);
        let radii = MatchRadii::default();
        assert!(world
            .find_match(&Point2::new(5.0, 0.0), ObjectClass::Person, &"b".into(), &radii)
            .is_some());
        assert!(world
            .find_match(&Point2::new(7.0, 0.0), ObjectClass::Person, &"b".into(), &radii)
            .is_none());
    }

    #[test]
    fn own_detections_and_ground_truth_are_ignored() {
        let mut world = WorldModel::default();
        let mut truth = detected("b", "b", ObjectClass::Car, 0.0, 0.0);
        truth.is_detected = false;
        truth.parent_id = None;
        world.extend([truth, detected("a-0", "a", ObjectClass::Car, 0.0, 0.0)]);
        let radii = MatchRadii::default();
        let p = Point2::new(0.0, 0.0);
        assert!(world.find_match(&p, ObjectClass::Car, &"a".into(), &radii).is_none());
    }
}
