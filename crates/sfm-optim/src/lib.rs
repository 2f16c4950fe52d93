//! Global positioning built on a backend-agnostic robust least-squares
//! interface.
//!
//! Layering, bottom up:
//! - [`ir`]: solver-independent problem representation (parameter blocks,
//!   residual blocks, robust losses, ordering hints),
//! - [`factors`]: residual evaluators, generic over [`nalgebra::RealField`]
//!   for automatic differentiation,
//! - [`backend`]: adapters compiling the IR onto a concrete solver
//!   (currently tiny-solver),
//! - [`problems`]: the global positioning problem itself.

pub mod backend;
pub mod factors;
pub mod ir;
pub mod problems;

pub use crate::problems::global_positioning::{
    ConstraintType, GlobalPositioner, GlobalPositionerOptions,
};
