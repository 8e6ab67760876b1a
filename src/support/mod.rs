//! Runtime-facing support for consuming a tile set: per-tile frames, an
//! implicit silhouette classifier, and ray projection (C11).

pub mod frame;
pub mod ray_classifier;
pub mod silhouette;

pub use frame::Frame;
pub use ray_classifier::{Classification, ProjectingRayClassifier};
pub use silhouette::ImplicitSilhouette;
