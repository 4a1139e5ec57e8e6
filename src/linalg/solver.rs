//! Linear solver interface.
//!
//! The solving core treats the linear solver as an opaque collaborator:
//! it hands over the assembled CSR matrix and right-hand side and gets
//! back the solution vector plus run statistics. Singular or
//! ill-conditioned systems are reported as errors and never retried
//! with altered parameters; that decision belongs to the outer driver.

use sprs::CsMat;

use crate::error::Result;

/// Statistics from one linear solve.
#[derive(Debug, Clone, Default)]
pub struct SolverStats {
    /// Number of iterations (0 for direct solvers).
    pub iterations: usize,
    /// Final residual norm ||b - Ax||.
    pub residual_norm: f64,
    /// Relative residual ||b - Ax|| / ||b||.
    pub relative_residual: f64,
    /// Whether the solver reached its tolerance.
    pub converged: bool,
}

/// Solves A*x = b on the assembled sparse system.
pub trait LinearSolver {
    /// Solve the linear system.
    ///
    /// # Errors
    /// Fails on a singular system or an exhausted iteration budget.
    #[allow(non_snake_case)]
    fn solve(&mut self, A: &CsMat<f64>, b: &[f64]) -> Result<(Vec<f64>, SolverStats)>;

    /// Solver name for diagnostics.
    fn name(&self) -> &str;
}

/// L2 norm of a vector.
pub fn norm(v: &[f64]) -> f64 {
    v.iter().map(|&x| x * x).sum::<f64>().sqrt()
}

/// Sparse matrix-vector product y = A*x.
#[allow(non_snake_case)]
pub fn spmv(A: &CsMat<f64>, x: &[f64]) -> Vec<f64> {
    let mut y = vec![0.0; A.rows()];
    for (row_idx, row) in A.outer_iterator().enumerate() {
        let mut sum = 0.0;
        for (col_idx, &val) in row.iter() {
            sum += val * x[col_idx];
        }
        y[row_idx] = sum;
    }
    y
}

/// Residual norm ||b - Ax||.
#[allow(non_snake_case)]
pub fn residual_norm(A: &CsMat<f64>, x: &[f64], b: &[f64]) -> f64 {
    let ax = spmv(A, x);
    b.iter()
        .zip(ax.iter())
        .map(|(&bi, &axi)| (bi - axi) * (bi - axi))
        .sum::<f64>()
        .sqrt()
}

/// Relative residual ||b - Ax|| / ||b||, falling back to the absolute
/// norm for a near-zero right-hand side.
#[allow(non_snake_case)]
pub fn relative_residual(A: &CsMat<f64>, x: &[f64], b: &[f64]) -> f64 {
    let r = residual_norm(A, x, b);
    let b_norm = norm(b);
    if b_norm < 1e-14 {
        r
    } else {
        r / b_norm
    }
}
