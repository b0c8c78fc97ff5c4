//! `fusion_core`: Per-tick fusion of multi-agent camera detections.
//!
//! # Module layout
//! - [`types`]      Entity state, detections, output records, world agents
//! - [`error`]      Configuration and runtime error taxonomy
//! - [`projection`] Bounding box → world position (pinhole approximation)
//! - [`world`]      Per-tick world model and cross-entity deduplication
//! - [`collision`]  Braking-distance proximity warning
//! - [`congestion`] Intersection assignment and congestion classification
//! - [`processor`]  Fusion processor orchestrating one tick
//! - [`metrics`]    Run-level counters and congestion shares

pub mod collision;
pub mod congestion;
pub mod error;
pub mod metrics;
pub mod processor;
pub mod projection;
pub mod types;
pub mod world;

pub use error::{FusionError, FusionResult};
pub use processor::{FusionConfig, FusionOutput, FusionProcessor, FusionStats};
pub use types::{
    AgentType, CongestionStatus, Detection, EntityId, EntityState, Intersection,
    IntersectionStatus, OutputRecord, Tick, TickRecord, WorldAgent,
};
