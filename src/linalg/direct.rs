//! Direct solver (dense LU).
//!
//! Densifies the CSR matrix and factorizes with nalgebra's LU. Fine for
//! the small-to-medium systems the core is exercised with; large runs
//! should plug an external sparse backend into [`LinearSolver`].

use sprs::CsMat;

use crate::error::{Error, Result};
use crate::linalg::solver::{relative_residual, residual_norm, LinearSolver, SolverStats};

/// Dense LU direct solver.
pub struct DirectSolver {
    name: String,
}

impl DirectSolver {
    pub fn new() -> Self {
        Self {
            name: "Direct (dense LU)".to_string(),
        }
    }
}

impl Default for DirectSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl LinearSolver for DirectSolver {
    #[allow(non_snake_case)]
    fn solve(&mut self, A: &CsMat<f64>, b: &[f64]) -> Result<(Vec<f64>, SolverStats)> {
        let n = b.len();

        let mut dense = nalgebra::DMatrix::zeros(n, n);
        for (row_idx, row) in A.outer_iterator().enumerate() {
            for (col_idx, &val) in row.iter() {
                dense[(row_idx, col_idx)] = val;
            }
        }

        let lu = dense.lu();
        let rhs = nalgebra::DVector::from_column_slice(b);
        let x_vec = lu.solve(&rhs).ok_or_else(|| {
            Error::Solver(format!("LU factorization failed: singular {}x{} system", n, n))
        })?;

        let x: Vec<f64> = x_vec.iter().copied().collect();

        let stats = SolverStats {
            iterations: 0,
            residual_norm: residual_norm(A, &x, b),
            relative_residual: relative_residual(A, &x, b),
            converged: true,
        };

        Ok((x, stats))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use sprs::TriMat;

    #[test]
    fn test_direct_solver_simple() {
        // [2 1; 1 2] x = [3; 3] -> x = [1; 1]
        let mut tri = TriMat::new((2, 2));
        tri.add_triplet(0, 0, 2.0);
        tri.add_triplet(0, 1, 1.0);
        tri.add_triplet(1, 0, 1.0);
        tri.add_triplet(1, 1, 2.0);
        let a = tri.to_csr::<usize>();

        let mut solver = DirectSolver::new();
        let (x, stats) = solver.solve(&a, &[3.0, 3.0]).unwrap();

        assert_relative_eq!(x[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(x[1], 1.0, epsilon = 1e-12);
        assert!(stats.converged);
    }

    #[test]
    fn test_singular_system_is_an_error() {
        let mut tri = TriMat::new((2, 2));
        tri.add_triplet(0, 0, 1.0);
        tri.add_triplet(0, 1, 1.0);
        tri.add_triplet(1, 0, 1.0);
        tri.add_triplet(1, 1, 1.0);
        let a = tri.to_csr::<usize>();

        let mut solver = DirectSolver::new();
        assert!(solver.solve(&a, &[1.0, 2.0]).is_err());
    }
}
