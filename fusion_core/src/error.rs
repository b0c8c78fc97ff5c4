//! Error taxonomy of a fusion run.
//!
//! Configuration errors abort before the first tick. Runtime errors abort
//! the run at the tick they occur and name the entity involved. Data gaps
//! and degenerate geometry are not errors: they are absorbed into the
//! tick output.

use crate::types::{EntityId, Tick};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FusionError {
    #[error("scene has no entities")]
    NoEntities,
    #[error("unknown entity id `{0}`")]
    UnknownEntity(EntityId),
    #[error("scene has no intersection data")]
    NoIntersections,
    #[error("fixed sensor `{0}` has no mount transform")]
    MissingMount(EntityId),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("detector `{model}` failed to load: {reason}")]
    DetectorLoad { model: String, reason: String },
    #[error("tick {tick}: no output record from entity `{entity}`")]
    MissingSlot { tick: Tick, entity: EntityId },
    #[error("tick {tick}: entity `{entity}` wrote its slot twice")]
    DuplicateWrite { tick: Tick, entity: EntityId },
    #[error("tick {tick}: vehicle `{entity}` has no kinematic state")]
    MissingState { tick: Tick, entity: EntityId },
    #[error("tick {tick}: detector failed on entity `{entity}`: {reason}")]
    Detector {
        tick: Tick,
        entity: EntityId,
        reason: String,
    },
}

impl FusionError {
    /// True for errors raised while setting a run up, before any tick ran.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            FusionError::NoEntities
                | FusionError::UnknownEntity(_)
                | FusionError::NoIntersections
                | FusionError::MissingMount(_)
                | FusionError::InvalidConfig(_)
                | FusionError::DetectorLoad { .. }
        )
    }

    /// Tick at which a runtime error occurred.
    pub fn tick(&self) -> Option<Tick> {
        match self {
            FusionError::MissingSlot { tick, .. }
            | FusionError::DuplicateWrite { tick, .. }
            | FusionError::MissingState { tick, .. }
            | FusionError::Detector { tick, .. } => Some(*tick),
            _ => None,
        }
    }
}

pub type FusionResult<T> = Result<T, FusionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostics_name_tick_and_entity() {
        let err = FusionError::MissingSlot {
            tick: 7,
            entity: EntityId::new("vehicle_3"),
        };
        assert_eq!(err.to_string(), "tick 7: no output record from entity `vehicle_3`");
        assert_eq!(err.tick(), Some(7));
        assert!(!err.is_configuration());
        assert!(FusionError::NoIntersections.is_configuration());
    }
}
