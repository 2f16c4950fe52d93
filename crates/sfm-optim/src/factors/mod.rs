//! Residual factor implementations with automatic differentiation support.
//!
//! Factors compute the difference between observed measurements and
//! predictions from estimated parameters. Evaluators are generic over
//! [`nalgebra::RealField`] so backends can run them on `f64` or on dual
//! numbers for automatic differentiation. Constants are lifted with
//! `T::from_f64`, values are `.clone()`d liberally (cheap for dual numbers),
//! and parameter dimensions are checked with `debug_assert!`.

pub mod direction;
