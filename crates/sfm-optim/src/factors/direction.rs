//! Pairwise direction residual.
//!
//! Shared by camera-to-camera and camera-to-point constraints: the direction
//! between two unknown 3D endpoints must match a measured unit direction up
//! to a strictly positive scale, which absorbs the unknown magnitude of
//! direction-only measurements.

use nalgebra::{DVector, DVectorView, RealField, SVector};

/// Pairwise direction residual on `f64` inputs.
///
/// Residual: `sqrt(weight) * (direction - scale * (to - from))`.
pub fn pairwise_direction_residual(
    from: &DVector<f64>,
    to: &DVector<f64>,
    scale: &DVector<f64>,
    direction: [f64; 3],
    weight: f64,
) -> SVector<f64, 3> {
    pairwise_direction_residual_generic(from.as_view(), to.as_view(), scale.as_view(), direction, weight)
}

/// Generic evaluator for backend adapters.
pub(crate) fn pairwise_direction_residual_generic<T: RealField>(
    from: DVectorView<'_, T>,
    to: DVectorView<'_, T>,
    scale: DVectorView<'_, T>,
    direction: [f64; 3],
    weight: f64,
) -> SVector<T, 3> {
    debug_assert!(from.len() == 3, "from endpoint must have 3 params");
    debug_assert!(to.len() == 3, "to endpoint must have 3 params");
    debug_assert!(scale.len() == 1, "scale must have 1 param");

    let s = scale[0].clone();
    let sqrt_w = T::from_f64(weight.sqrt()).unwrap();

    let mut residual = SVector::<T, 3>::zeros();
    for k in 0..3 {
        let measured = T::from_f64(direction[k]).unwrap();
        let baseline = to[k].clone() - from[k].clone();
        residual[k] = (measured - s.clone() * baseline) * sqrt_w.clone();
    }
    residual
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dvec(values: &[f64]) -> DVector<f64> {
        DVector::from_row_slice(values)
    }

    #[test]
    fn residual_vanishes_at_consistent_geometry() {
        let from = dvec(&[1.0, 2.0, 3.0]);
        let to = dvec(&[4.0, 2.0, 7.0]);
        // baseline (3, 0, 4), length 5
        let direction = [0.6, 0.0, 0.8];
        let scale = dvec(&[1.0 / 5.0]);
        let r = pairwise_direction_residual(&from, &to, &scale, direction, 1.0);
        assert!(r.norm() < 1e-14, "residual {r:?} should vanish");
    }

    #[test]
    fn residual_scales_with_sqrt_weight() {
        let from = dvec(&[0.0, 0.0, 0.0]);
        let to = dvec(&[1.0, 0.0, 0.0]);
        let scale = dvec(&[1.0]);
        let direction = [0.0, 1.0, 0.0];
        let r1 = pairwise_direction_residual(&from, &to, &scale, direction, 1.0);
        let r4 = pairwise_direction_residual(&from, &to, &scale, direction, 4.0);
        assert!((r4.norm() - 2.0 * r1.norm()).abs() < 1e-12);
    }

    #[test]
    fn scale_stretches_the_baseline_term() {
        let from = dvec(&[0.0, 0.0, 0.0]);
        let to = dvec(&[0.0, 0.0, 2.0]);
        let direction = [0.0, 0.0, 1.0];
        let r = pairwise_direction_residual(&from, &to, &dvec(&[0.5]), direction, 1.0);
        assert!(r.norm() < 1e-14);
        let r = pairwise_direction_residual(&from, &to, &dvec(&[1.0]), direction, 1.0);
        assert!((r[2] + 1.0).abs() < 1e-14);
    }
}
