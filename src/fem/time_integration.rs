//! Time-integration schemes.
//!
//! A scheme drives the per-step state machine
//! `initialize_solution_step -> (predict -> assemble -> solve ->
//! update)* -> finalize_solution_step`, owns the integration
//! coefficients and converts element mass/damping/stiffness matrices
//! into the effective local system the builder assembles.

use log::debug;
use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::fem::dof::DofRegistry;
use crate::model::{
    BdfCoefficients, DofVariable, Element, ModelPart, Node, ProcessContext,
};

/// Per-step integration policy.
///
/// `Send + Sync` so scheme references can cross into the parallel
/// assembly loop.
pub trait TimeIntegrator: Send + Sync {
    /// Prepare the step: validate the time step, publish integration
    /// coefficients into the context, promote fixity flags.
    fn initialize_solution_step(
        &mut self,
        model: &mut ModelPart,
        ctx: &mut ProcessContext,
    ) -> Result<()>;

    /// Extrapolate a trial solution for the new step.
    fn predict(&self, model: &mut ModelPart, ctx: &ProcessContext) -> Result<()>;

    /// Effective local system of one entity for the current step.
    fn combine_local_system(
        &self,
        entity: &dyn Element,
        model: &ModelPart,
        ctx: &ProcessContext,
    ) -> Result<(DMatrix<f64>, DVector<f64>)>;

    /// Push the solved increment onto the free Dofs and refresh the
    /// buffered time derivatives.
    fn update(
        &self,
        model: &mut ModelPart,
        registry: &DofRegistry,
        ctx: &ProcessContext,
        dx: &[f64],
    ) -> Result<()>;

    /// Close the step.
    fn finalize_solution_step(&mut self, model: &mut ModelPart, ctx: &ProcessContext)
        -> Result<()>;
}

/// Incremental-update static scheme.
///
/// Passes element systems through unchanged and applies increments
/// directly; used for quasi-static solves and the mesh-motion system.
#[derive(Debug, Clone, Default)]
pub struct StaticScheme;

impl StaticScheme {
    pub fn new() -> Self {
        Self
    }
}

impl TimeIntegrator for StaticScheme {
    fn initialize_solution_step(
        &mut self,
        _model: &mut ModelPart,
        _ctx: &mut ProcessContext,
    ) -> Result<()> {
        Ok(())
    }

    fn predict(&self, _model: &mut ModelPart, _ctx: &ProcessContext) -> Result<()> {
        Ok(())
    }

    fn combine_local_system(
        &self,
        entity: &dyn Element,
        model: &ModelPart,
        ctx: &ProcessContext,
    ) -> Result<(DMatrix<f64>, DVector<f64>)> {
        entity.calculate_local_system(model, ctx)
    }

    fn update(
        &self,
        model: &mut ModelPart,
        registry: &DofRegistry,
        _ctx: &ProcessContext,
        dx: &[f64],
    ) -> Result<()> {
        for (eq, key) in registry.free_dofs() {
            *model.node_mut(key.node).value_mut(key.variable, 0) += dx[eq];
        }
        Ok(())
    }

    fn finalize_solution_step(
        &mut self,
        _model: &mut ModelPart,
        _ctx: &ProcessContext,
    ) -> Result<()> {
        Ok(())
    }
}

/// Displacement-based BDF scheme of order 1 or 2.
///
/// Time derivatives follow the fixed linear recurrences
/// `v_n = sum_k c_k * d_{n-k}` and `a_n = sum_k c_k * v_{n-k}` with the
/// coefficients published in the process context.
#[derive(Debug, Clone)]
pub struct BdfScheme {
    order: usize,
}

impl BdfScheme {
    /// Create a scheme of the given integration order (1 or 2).
    pub fn new(order: usize) -> Result<Self> {
        if order == 0 || order > 2 {
            return Err(Error::Config(format!(
                "unsupported BDF integration order {} (supported: 1, 2)",
                order
            )));
        }
        Ok(Self { order })
    }

    pub fn order(&self) -> usize {
        self.order
    }

    /// Refresh velocity and acceleration of one node from the buffered
    /// displacement/velocity history.
    fn update_derivatives(node: &mut Node, bdf: &BdfCoefficients) {
        for comp in 0..3 {
            let d = DofVariable::displacement(comp);
            let v = DofVariable::velocity(comp);
            let a = DofVariable::acceleration(comp);

            let mut velocity = 0.0;
            for k in 0..=bdf.order {
                velocity += bdf.c[k] * node.value(d, k);
            }
            node.set_value(v, 0, velocity);

            let mut acceleration = 0.0;
            for k in 0..=bdf.order {
                acceleration += bdf.c[k] * node.value(v, k);
            }
            node.set_value(a, 0, acceleration);
        }
    }

    fn coefficients(ctx: &ProcessContext) -> Result<BdfCoefficients> {
        ctx.bdf.ok_or_else(|| {
            Error::Numeric(
                "BDF coefficients missing from process context; \
                 was initialize_solution_step called?"
                    .to_string(),
            )
        })
    }
}

impl TimeIntegrator for BdfScheme {
    /// Validates the time step, computes the BDF coefficients and fixes
    /// the displacement component wherever its velocity or acceleration
    /// is fixed (those Dofs are determined by the recurrence, not by
    /// the solver).
    fn initialize_solution_step(
        &mut self,
        model: &mut ModelPart,
        ctx: &mut ProcessContext,
    ) -> Result<()> {
        if model.buffer_size() < self.order + 1 {
            return Err(Error::Config(format!(
                "BDF order {} needs a buffer of {} solution steps, model '{}' has {}",
                self.order,
                self.order + 1,
                model.name,
                model.buffer_size()
            )));
        }
        ctx.bdf = Some(BdfCoefficients::new(self.order, ctx.delta_time)?);

        model.nodes_mut().par_iter_mut().for_each(|node| {
            for comp in 0..3 {
                let fixed_derivative = node.is_fixed(DofVariable::acceleration(comp))
                    || node.is_fixed(DofVariable::velocity(comp));
                if fixed_derivative {
                    node.fix(DofVariable::displacement(comp));
                }
            }
        });

        debug!("bdf{} scheme initialized, dt = {}", self.order, ctx.delta_time);
        Ok(())
    }

    /// Per-component decision tree, applied independently to X/Y/Z:
    /// acceleration-fixed beats velocity-fixed beats free (quadratic
    /// extrapolation from the previous step).
    fn predict(&self, model: &mut ModelPart, ctx: &ProcessContext) -> Result<()> {
        let bdf = Self::coefficients(ctx)?;
        let dt = ctx.delta_time;

        model.nodes_mut().par_iter_mut().for_each(|node| {
            for comp in 0..3 {
                let d = DofVariable::displacement(comp);
                let v = DofVariable::velocity(comp);
                let a = DofVariable::acceleration(comp);

                if node.is_fixed(a) {
                    // Invert a = sum_k c_k * v_k for the current velocity,
                    // then v = sum_k c_k * d_k for the displacement.
                    let mut velocity = node.value(a, 0);
                    for k in 1..=bdf.order {
                        velocity -= bdf.c[k] * node.value(v, k);
                    }
                    velocity /= bdf.c[0];
                    node.set_value(v, 0, velocity);

                    let mut displacement = velocity;
                    for k in 1..=bdf.order {
                        displacement -= bdf.c[k] * node.value(d, k);
                    }
                    displacement /= bdf.c[0];
                    node.set_value(d, 0, displacement);
                } else if node.is_fixed(v) {
                    let mut displacement = node.value(v, 0);
                    for k in 1..=bdf.order {
                        displacement -= bdf.c[k] * node.value(d, k);
                    }
                    displacement /= bdf.c[0];
                    node.set_value(d, 0, displacement);
                } else if !node.is_fixed(d) {
                    let displacement = node.value(d, 1)
                        + dt * node.value(v, 1)
                        + 0.5 * dt * dt * node.value(a, 1);
                    node.set_value(d, 0, displacement);
                }
            }

            Self::update_derivatives(node, &bdf);
        });

        Ok(())
    }

    /// Effective system: `LHS = K + c0*C + c0^2*M`,
    /// `RHS = r - M*a - C*v` with the buffered derivative values.
    fn combine_local_system(
        &self,
        entity: &dyn Element,
        model: &ModelPart,
        ctx: &ProcessContext,
    ) -> Result<(DMatrix<f64>, DVector<f64>)> {
        let bdf = Self::coefficients(ctx)?;
        let (mut lhs, mut rhs) = entity.calculate_local_system(model, ctx)?;
        let mass = entity.calculate_mass_matrix(model);
        let damping = entity.calculate_damping_matrix(model);

        let dofs = entity.dof_list();
        let n = dofs.len();
        if lhs.nrows() != n || rhs.len() != n {
            return Err(Error::Topology(format!(
                "entity {} local system size {}x{} does not match its {} dofs",
                entity.id(),
                lhs.nrows(),
                rhs.len(),
                n
            )));
        }

        let velocity = DVector::from_iterator(
            n,
            dofs.iter().map(|key| match key.variable.time_derivative() {
                Some(v) => model.node(key.node).value(v, 0),
                None => 0.0,
            }),
        );
        let acceleration = DVector::from_iterator(
            n,
            dofs.iter().map(|key| {
                key.variable
                    .time_derivative()
                    .and_then(DofVariable::time_derivative)
                    .map_or(0.0, |a| model.node(key.node).value(a, 0))
            }),
        );

        let c0 = bdf.c0();
        rhs -= &mass * acceleration + &damping * velocity;
        lhs += c0 * c0 * mass + c0 * damping;

        Ok((lhs, rhs))
    }

    fn update(
        &self,
        model: &mut ModelPart,
        registry: &DofRegistry,
        ctx: &ProcessContext,
        dx: &[f64],
    ) -> Result<()> {
        let bdf = Self::coefficients(ctx)?;

        for (eq, key) in registry.free_dofs() {
            *model.node_mut(key.node).value_mut(key.variable, 0) += dx[eq];
        }

        model.nodes_mut().par_iter_mut().for_each(|node| {
            Self::update_derivatives(node, &bdf);
        });

        Ok(())
    }

    fn finalize_solution_step(
        &mut self,
        _model: &mut ModelPart,
        _ctx: &ProcessContext,
    ) -> Result<()> {
        Ok(())
    }
}
