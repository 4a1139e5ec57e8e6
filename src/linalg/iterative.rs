//! Iterative solvers.
//!
//! Jacobi-preconditioned conjugate gradient for the symmetric
//! positive-definite systems the block builder produces.

use sprs::CsMat;

use crate::error::{Error, Result};
use crate::linalg::solver::{norm, relative_residual, spmv, LinearSolver, SolverStats};

/// Conjugate gradient with diagonal (Jacobi) preconditioning.
pub struct ConjugateGradient {
    name: String,
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl ConjugateGradient {
    pub fn new(max_iterations: usize, tolerance: f64) -> Self {
        Self {
            name: "Conjugate Gradient (Jacobi)".to_string(),
            max_iterations,
            tolerance,
        }
    }
}

impl Default for ConjugateGradient {
    fn default() -> Self {
        Self::new(1000, 1e-10)
    }
}

impl LinearSolver for ConjugateGradient {
    #[allow(non_snake_case)]
    fn solve(&mut self, A: &CsMat<f64>, b: &[f64]) -> Result<(Vec<f64>, SolverStats)> {
        let n = b.len();
        let b_norm = norm(b);

        // Trivial right-hand side: the zero vector solves the system.
        if b_norm < 1e-300 {
            return Ok((vec![0.0; n], SolverStats {
                converged: true,
                ..Default::default()
            }));
        }

        // Diagonal preconditioner.
        let mut inv_diag = vec![1.0; n];
        for (row_idx, row) in A.outer_iterator().enumerate() {
            for (col_idx, &val) in row.iter() {
                if col_idx == row_idx {
                    if val.abs() < 1e-300 {
                        return Err(Error::Solver(format!(
                            "zero diagonal at equation {} in CG preconditioner",
                            row_idx
                        )));
                    }
                    inv_diag[row_idx] = 1.0 / val;
                }
            }
        }

        let mut x = vec![0.0; n];
        let mut r = b.to_vec();
        let mut z: Vec<f64> = r.iter().zip(&inv_diag).map(|(&ri, &di)| ri * di).collect();
        let mut p = z.clone();
        let mut rz: f64 = r.iter().zip(&z).map(|(&ri, &zi)| ri * zi).sum();

        for iteration in 0..self.max_iterations {
            let ap = spmv(A, &p);
            let p_ap: f64 = p.iter().zip(&ap).map(|(&pi, &api)| pi * api).sum();
            if p_ap.abs() < 1e-300 {
                return Err(Error::Solver(format!(
                    "CG breakdown at iteration {}: p^T A p = {}",
                    iteration, p_ap
                )));
            }

            let alpha = rz / p_ap;
            for i in 0..n {
                x[i] += alpha * p[i];
                r[i] -= alpha * ap[i];
            }

            let r_norm = norm(&r);
            if r_norm / b_norm < self.tolerance {
                let stats = SolverStats {
                    iterations: iteration + 1,
                    residual_norm: r_norm,
                    relative_residual: relative_residual(A, &x, b),
                    converged: true,
                };
                return Ok((x, stats));
            }

            for i in 0..n {
                z[i] = r[i] * inv_diag[i];
            }
            let rz_new: f64 = r.iter().zip(&z).map(|(&ri, &zi)| ri * zi).sum();
            let beta = rz_new / rz;
            rz = rz_new;
            for i in 0..n {
                p[i] = z[i] + beta * p[i];
            }
        }

        Err(Error::Solver(format!(
            "CG failed to converge within {} iterations (relative residual {:.3e})",
            self.max_iterations,
            norm(&r) / b_norm
        )))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
