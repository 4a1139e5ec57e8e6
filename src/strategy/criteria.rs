//! Convergence criteria for the nonlinear iteration loop.

use crate::linalg::solver::norm;

/// Decides when the nonlinear iteration may stop.
///
/// A criterion is stateful within one solution step: `initialize` is
/// called before the first iteration and may capture reference norms.
pub trait ConvergenceCriterion {
    /// Reset per-step state.
    fn initialize(&mut self);

    /// Check convergence after one solve/update cycle.
    fn converged(&mut self, dx: &[f64], rhs: &[f64]) -> bool;

    fn name(&self) -> &str;
}

/// Converges on the solution increment norm, absolute or relative to
/// the first iteration's increment.
pub struct IncrementNormCriterion {
    pub rel_tolerance: f64,
    pub abs_tolerance: f64,
    reference: Option<f64>,
}

impl IncrementNormCriterion {
    pub fn new(rel_tolerance: f64, abs_tolerance: f64) -> Self {
        Self {
            rel_tolerance,
            abs_tolerance,
            reference: None,
        }
    }
}

impl ConvergenceCriterion for IncrementNormCriterion {
    fn initialize(&mut self) {
        self.reference = None;
    }

    fn converged(&mut self, dx: &[f64], _rhs: &[f64]) -> bool {
        let dx_norm = norm(dx);
        let reference = *self.reference.get_or_insert(dx_norm);

        dx_norm <= self.abs_tolerance
            || (reference > 0.0 && dx_norm / reference <= self.rel_tolerance)
    }

    fn name(&self) -> &str {
        "increment norm"
    }
}

/// Converges on the residual norm, absolute or relative to the first
/// iteration's residual.
pub struct ResidualNormCriterion {
    pub rel_tolerance: f64,
    pub abs_tolerance: f64,
    reference: Option<f64>,
}

impl ResidualNormCriterion {
    pub fn new(rel_tolerance: f64, abs_tolerance: f64) -> Self {
        Self {
            rel_tolerance,
            abs_tolerance,
            reference: None,
        }
    }
}

impl ConvergenceCriterion for ResidualNormCriterion {
    fn initialize(&mut self) {
        self.reference = None;
    }

    fn converged(&mut self, _dx: &[f64], rhs: &[f64]) -> bool {
        let r_norm = norm(rhs);
        let reference = *self.reference.get_or_insert(r_norm);

        r_norm <= self.abs_tolerance
            || (reference > 0.0 && r_norm / reference <= self.rel_tolerance)
    }

    fn name(&self) -> &str {
        "residual norm"
    }
}
