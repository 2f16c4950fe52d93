use anyhow::{ensure, Result};
use std::collections::HashSet;

/// Identifier for a parameter block in the IR.
///
/// This is stable within a `ProblemIR` instance and is used by residual
/// blocks to reference their parameter dependencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParamId(pub usize);

/// Bounds for a single parameter index.
///
/// Bounds are applied after each update in backends that support them. An
/// unbounded side is expressed with an infinite limit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bound {
    pub idx: usize,
    pub lower: f64,
    pub upper: f64,
}

/// Fixed parameter mask for a block, interpreted per index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedMask {
    fixed_indices: HashSet<usize>,
}

impl FixedMask {
    /// Creates a mask with no fixed indices.
    pub fn all_free() -> Self {
        Self {
            fixed_indices: HashSet::new(),
        }
    }

    /// Creates a mask with all indices fixed.
    pub fn all_fixed(dim: usize) -> Self {
        Self {
            fixed_indices: (0..dim).collect(),
        }
    }

    /// Returns `true` if the index is fixed.
    pub fn is_fixed(&self, idx: usize) -> bool {
        self.fixed_indices.contains(&idx)
    }

    /// Returns `true` if all indices `[0, dim)` are fixed.
    pub fn is_all_fixed(&self, dim: usize) -> bool {
        self.fixed_indices.len() == dim
    }

    /// Iterates over fixed indices.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.fixed_indices.iter().copied()
    }

    /// Returns `true` if no indices are fixed.
    pub fn is_empty(&self) -> bool {
        self.fixed_indices.is_empty()
    }
}

/// Robust loss applied to a residual block.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum RobustLoss {
    #[default]
    None,
    Huber {
        scale: f64,
    },
    Cauchy {
        scale: f64,
    },
}

impl RobustLoss {
    /// Loss for a residual that has been pre-multiplied by `sqrt(weight)`.
    ///
    /// Scaling the kernel threshold by `sqrt(weight)` as well makes the
    /// robustified cost exactly `weight * rho(s)` with an unchanged inlier
    /// region, i.e. a Ceres-style scaled loss.
    pub fn scaled(self, weight: f64) -> Self {
        let factor = weight.sqrt();
        match self {
            RobustLoss::None => RobustLoss::None,
            RobustLoss::Huber { scale } => RobustLoss::Huber {
                scale: scale * factor,
            },
            RobustLoss::Cauchy { scale } => RobustLoss::Cauchy {
                scale: scale * factor,
            },
        }
    }
}

/// Backend-agnostic factor kinds.
///
/// Each factor kind implies its parameter layout and residual dimension.
/// All parameter blocks are Euclidean vectors.
#[derive(Debug, Clone, PartialEq)]
pub enum FactorKind {
    /// Direction between two 3D endpoints against a measured unit direction,
    /// with a strictly positive per-term scale absorbing the unknown
    /// magnitude.
    ///
    /// Parameters: `[from(3), to(3), scale(1)]`.
    /// Residual: `sqrt(weight) * (direction - scale * (to - from))`.
    PairwiseDirection { direction: [f64; 3], weight: f64 },
}

impl FactorKind {
    /// Residual dimension implied by the factor.
    pub fn residual_dim(&self) -> usize {
        match self {
            FactorKind::PairwiseDirection { .. } => 3,
        }
    }
}

/// Parameter block definition in the IR.
#[derive(Debug, Clone)]
pub struct ParamBlock {
    pub id: ParamId,
    pub name: String,
    pub dim: usize,
    pub fixed: FixedMask,
    pub bounds: Option<Vec<Bound>>,
    /// Elimination-ordering hint: blocks in lower groups are eliminated
    /// first. Backends may ignore it; it never affects the solution.
    pub ordering_group: Option<usize>,
}

/// Residual block definition in the IR.
///
/// The order of `params` must match the factor's expected parameter order.
#[derive(Debug, Clone)]
pub struct ResidualBlock {
    pub params: Vec<ParamId>,
    pub loss: RobustLoss,
    pub factor: FactorKind,
    pub residual_dim: usize,
}

/// Backend-agnostic optimization problem representation.
///
/// Backends compile this IR into solver-specific problems.
#[derive(Debug, Default, Clone)]
pub struct ProblemIR {
    pub params: Vec<ParamBlock>,
    pub residuals: Vec<ResidualBlock>,
}

impl ProblemIR {
    /// Creates an empty IR.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a parameter block and returns its `ParamId`.
    pub fn add_param_block(
        &mut self,
        name: impl Into<String>,
        dim: usize,
        fixed: FixedMask,
        bounds: Option<Vec<Bound>>,
    ) -> ParamId {
        let id = ParamId(self.params.len());
        self.params.push(ParamBlock {
            id,
            name: name.into(),
            dim,
            fixed,
            bounds,
            ordering_group: None,
        });
        id
    }

    /// Assigns the elimination-ordering group of a parameter block.
    pub fn set_ordering_group(&mut self, id: ParamId, group: usize) {
        self.params[id.0].ordering_group = Some(group);
    }

    /// Adds a residual block to the IR.
    pub fn add_residual_block(&mut self, residual: ResidualBlock) {
        self.residuals.push(residual);
    }

    /// Finds a parameter by name.
    pub fn param_by_name(&self, name: &str) -> Option<ParamId> {
        self.params.iter().find(|p| p.name == name).map(|p| p.id)
    }

    /// Validates internal consistency and factor expectations.
    pub fn validate(&self) -> Result<()> {
        for (idx, param) in self.params.iter().enumerate() {
            ensure!(
                param.id.0 == idx,
                "param id mismatch: expected {}, got {:?}",
                idx,
                param.id
            );
            ensure!(param.dim > 0, "param {} has zero dimension", param.name);
            for fixed_idx in param.fixed.iter() {
                ensure!(
                    fixed_idx < param.dim,
                    "param {} fixed index {} out of range",
                    param.name,
                    fixed_idx
                );
            }
            if let Some(bounds) = &param.bounds {
                for bound in bounds {
                    ensure!(
                        bound.idx < param.dim,
                        "param {} bound index {} out of range",
                        param.name,
                        bound.idx
                    );
                    ensure!(
                        bound.lower <= bound.upper,
                        "param {} bound lower {} > upper {}",
                        param.name,
                        bound.lower,
                        bound.upper
                    );
                }
            }
            if let Some(group) = param.ordering_group {
                ensure!(
                    group <= 1,
                    "param {} ordering group {} out of range (two groups supported)",
                    param.name,
                    group
                );
            }
        }

        for (r_idx, residual) in self.residuals.iter().enumerate() {
            ensure!(
                residual.residual_dim == residual.factor.residual_dim(),
                "residual {} dim {} does not match factor expectation {}",
                r_idx,
                residual.residual_dim,
                residual.factor.residual_dim()
            );
            for param in &residual.params {
                ensure!(
                    param.0 < self.params.len(),
                    "residual {} references missing param {:?}",
                    r_idx,
                    param
                );
            }

            match &residual.factor {
                FactorKind::PairwiseDirection { direction, weight } => {
                    ensure!(
                        residual.params.len() == 3,
                        "pairwise direction factor requires 3 params [from, to, scale]"
                    );
                    let from = &self.params[residual.params[0].0];
                    let to = &self.params[residual.params[1].0];
                    let scale = &self.params[residual.params[2].0];
                    ensure!(
                        from.dim == 3 && to.dim == 3,
                        "pairwise direction factor expects 3D endpoints, got {} and {}",
                        from.dim,
                        to.dim
                    );
                    ensure!(
                        scale.dim == 1,
                        "pairwise direction factor expects a 1D scale, got {}",
                        scale.dim
                    );
                    let norm2: f64 = direction.iter().map(|d| d * d).sum();
                    ensure!(
                        direction.iter().all(|d| d.is_finite()) && (norm2 - 1.0).abs() < 1e-6,
                        "residual {} direction must be a unit vector",
                        r_idx
                    );
                    ensure!(
                        weight.is_finite() && *weight > 0.0,
                        "residual {} weight must be positive, got {}",
                        r_idx,
                        weight
                    );
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn direction_block(params: Vec<ParamId>) -> ResidualBlock {
        ResidualBlock {
            params,
            loss: RobustLoss::Huber { scale: 0.1 },
            factor: FactorKind::PairwiseDirection {
                direction: [0.0, 0.0, 1.0],
                weight: 1.0,
            },
            residual_dim: 3,
        }
    }

    fn two_endpoints_and_scale(ir: &mut ProblemIR) -> (ParamId, ParamId, ParamId) {
        let a = ir.add_param_block("a", 3, FixedMask::all_free(), None);
        let b = ir.add_param_block("b", 3, FixedMask::all_free(), None);
        let s = ir.add_param_block("s", 1, FixedMask::all_free(), None);
        (a, b, s)
    }

    #[test]
    fn valid_problem_passes_validation() {
        let mut ir = ProblemIR::new();
        let (a, b, s) = two_endpoints_and_scale(&mut ir);
        ir.add_residual_block(direction_block(vec![a, b, s]));
        assert!(ir.validate().is_ok());
    }

    #[test]
    fn wrong_scale_dimension_is_rejected() {
        let mut ir = ProblemIR::new();
        let a = ir.add_param_block("a", 3, FixedMask::all_free(), None);
        let b = ir.add_param_block("b", 3, FixedMask::all_free(), None);
        let s = ir.add_param_block("s", 2, FixedMask::all_free(), None);
        ir.add_residual_block(direction_block(vec![a, b, s]));
        assert!(ir.validate().is_err());
    }

    #[test]
    fn non_unit_direction_is_rejected() {
        let mut ir = ProblemIR::new();
        let (a, b, s) = two_endpoints_and_scale(&mut ir);
        ir.add_residual_block(ResidualBlock {
            factor: FactorKind::PairwiseDirection {
                direction: [0.0, 0.0, 2.0],
                weight: 1.0,
            },
            ..direction_block(vec![a, b, s])
        });
        assert!(ir.validate().is_err());
    }

    #[test]
    fn out_of_range_ordering_group_is_rejected() {
        let mut ir = ProblemIR::new();
        let a = ir.add_param_block("a", 3, FixedMask::all_free(), None);
        ir.set_ordering_group(a, 2);
        assert!(ir.validate().is_err());
    }

    #[test]
    fn scaled_huber_matches_scaled_loss_cost() {
        let loss = RobustLoss::Huber { scale: 0.1 };
        let RobustLoss::Huber { scale } = loss.scaled(0.25) else {
            panic!("kernel changed kind");
        };
        // threshold scales with sqrt(w): 0.1 * 0.5
        assert!((scale - 0.05).abs() < 1e-15);
        assert_eq!(RobustLoss::None.scaled(0.25), RobustLoss::None);
    }
}
