//! `camera_models`: Pinhole camera geometry and the object-detector contract.

pub mod camera;
pub mod detector;

pub use camera::{ground_distance, CameraParams, MountTransform, ObjectClass};
pub use detector::{CameraFrame, ObjectDetector, RawDetection};
