//! Scene model and math primitives for global structure-from-motion
//! positioning.
//!
//! This crate contains:
//! - linear algebra type aliases (`Real`, `Vec3`, `Iso3`, ...) and
//!   axis-aligned bounding boxes,
//! - the in-memory scene model (cameras, images, tracks, view graph) owned
//!   by the caller and mutated in place by the positioner,
//! - deterministic synthetic scenes for tests.

/// Linear algebra type aliases and bounding-box helpers.
pub mod math;
/// Cameras, images, tracks, and the view graph.
pub mod scene;
/// Deterministic synthetic scene generation for tests.
pub mod synthetic;

pub use math::*;
pub use scene::*;
