//! Nonlinear solving strategy.
//!
//! Composes a time integrator, the builder-and-solver, a linear solver
//! and a convergence criterion into the per-step iteration loop:
//! predict -> build -> solve -> update -> check, repeated up to the
//! iteration budget.

use std::collections::HashMap;

use log::{debug, warn};

use crate::error::Result;
use crate::fem::assembly::BuilderAndSolver;
use crate::fem::constraints::ConstraintStore;
use crate::fem::dof::DofRegistry;
use crate::fem::time_integration::TimeIntegrator;
use crate::linalg::solver::norm;
use crate::linalg::{LinearSolver, SolverStats};
use crate::model::{DofKey, ModelPart, ProcessContext, SubPart};
use crate::strategy::criteria::ConvergenceCriterion;

/// Strategy behavior switches.
#[derive(Debug, Clone)]
pub struct StrategyConfig {
    /// Nonlinear iteration budget per step.
    pub max_iterations: usize,
    /// Rebuild Dof numbering (and drop the assembled system) on every
    /// step. Trades memory and setup time for correctness when the
    /// topology or the active Dof set changes between steps.
    pub reform_dofs_each_step: bool,
    /// Accumulate reaction forces at fixed Dofs after convergence.
    pub compute_reactions: bool,
    /// Assemble entity contributions in parallel.
    pub parallel_build: bool,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            max_iterations: 20,
            reform_dofs_each_step: false,
            compute_reactions: false,
            parallel_build: true,
        }
    }
}

/// Outcome of one solution step.
#[derive(Debug, Clone)]
pub struct SolveReport {
    pub iterations: usize,
    pub converged: bool,
    /// Norm of the last solution increment.
    pub correction_norm: f64,
    /// Statistics of the last linear solve.
    pub solver: SolverStats,
}

/// Orchestrates scheme, builder, solver and criterion for one model
/// (or a scoped sub-model).
pub struct SolvingStrategy<S, T, C>
where
    S: LinearSolver,
    T: TimeIntegrator,
    C: ConvergenceCriterion,
{
    pub scheme: T,
    pub solver: S,
    pub criterion: C,
    pub config: StrategyConfig,
    builder: BuilderAndSolver,
    registry: Option<DofRegistry>,
    reactions: HashMap<DofKey, f64>,
}

impl<S, T, C> SolvingStrategy<S, T, C>
where
    S: LinearSolver,
    T: TimeIntegrator,
    C: ConvergenceCriterion,
{
    pub fn new(scheme: T, solver: S, criterion: C, config: StrategyConfig) -> Self {
        let builder = BuilderAndSolver::new(config.parallel_build);
        Self {
            scheme,
            solver,
            criterion,
            config,
            builder,
            registry: None,
            reactions: HashMap::new(),
        }
    }

    /// Solve one step over the scoped entities and return the final
    /// correction norm inside the report.
    ///
    /// Non-convergence within the iteration budget is reported, not
    /// fatal: the outer simulation driver decides whether to cut the
    /// time step and retry.
    pub fn solve_step(
        &mut self,
        model: &mut ModelPart,
        ctx: &mut ProcessContext,
        stores: &[&ConstraintStore],
        scope: Option<&SubPart>,
    ) -> Result<SolveReport> {
        self.scheme.initialize_solution_step(model, ctx)?;

        if self.config.reform_dofs_each_step || self.registry.is_none() {
            self.registry = Some(DofRegistry::build(model, scope, stores)?);
        }
        let registry = self.registry.as_ref().expect("registry built above");

        self.scheme.predict(model, ctx)?;
        self.criterion.initialize();

        let mut report = SolveReport {
            iterations: 0,
            converged: false,
            correction_norm: 0.0,
            solver: SolverStats::default(),
        };

        for iteration in 1..=self.config.max_iterations {
            let (dx, rhs, stats) = self.builder.build_and_solve(
                model,
                ctx,
                &self.scheme,
                registry,
                stores,
                scope,
                &mut self.solver,
            )?;

            self.scheme.update(model, registry, ctx, &dx)?;
            self.builder.update_slave_dofs(model, stores);

            report.iterations = iteration;
            report.correction_norm = norm(&dx);
            report.solver = stats;
            report.converged = self.criterion.converged(&dx, &rhs);

            debug!(
                "iteration {}: |dx| = {:.6e}, converged = {}",
                iteration, report.correction_norm, report.converged
            );

            if report.converged {
                break;
            }
        }

        if !report.converged {
            warn!(
                "step {} did not converge within {} iterations (|dx| = {:.3e})",
                ctx.step, self.config.max_iterations, report.correction_norm
            );
        }

        if self.config.compute_reactions {
            self.reactions =
                self.builder
                    .calculate_reactions(model, ctx, &self.scheme, registry, scope)?;
        }

        self.scheme.finalize_solution_step(model, ctx)?;

        if self.config.reform_dofs_each_step {
            self.clear();
        }

        Ok(report)
    }

    /// Release the assembled system and the Dof numbering, forcing a
    /// rebuild on the next call.
    pub fn clear(&mut self) {
        self.registry = None;
        debug!("solving strategy cleared");
    }

    /// Reactions at fixed Dofs from the last converged step (empty
    /// unless `compute_reactions` is set).
    pub fn reactions(&self) -> &HashMap<DofKey, f64> {
        &self.reactions
    }
}
