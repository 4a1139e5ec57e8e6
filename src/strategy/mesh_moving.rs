//! Mesh-moving strategy.
//!
//! Solves a synthetic elastic system over a shadow "mesh part" (spring
//! elements spanning the edges of the physical elements, sharing the
//! same node table) to propagate prescribed boundary motion into the
//! interior, derives the mesh velocity by backward differences and
//! commits `reference + displacement` as the new physical coordinates.

use std::collections::BTreeSet;

use log::{debug, info};

use crate::error::{Error, Result};
use crate::fem::time_integration::StaticScheme;
use crate::linalg::LinearSolver;
use crate::model::{DofVariable, MeshMotionElement, ModelPart, ProcessContext, SubPart};
use crate::strategy::criteria::IncrementNormCriterion;
use crate::strategy::solving::{SolvingStrategy, StrategyConfig};

/// Moves the mesh by solving a displacement-like system over synthetic
/// mesh-deformation elements.
pub struct MeshMovingStrategy<S: LinearSolver> {
    inner: SolvingStrategy<S, StaticScheme, IncrementNormCriterion>,
    mesh_part: SubPart,
    velocity_order: usize,
    reform_dofs_each_step: bool,
}

impl<S: LinearSolver> MeshMovingStrategy<S> {
    /// Build the shadow mesh part over `model`'s elements and set up
    /// the inner linear strategy.
    ///
    /// `velocity_order` selects the backward-difference formula for the
    /// mesh velocity: 1 for `(d_n - d_{n-1})/dt`, 2 for
    /// `(1.5 d_n - 2 d_{n-1} + 0.5 d_{n-2})/dt`.
    pub fn new(
        model: &mut ModelPart,
        solver: S,
        velocity_order: usize,
        reform_dofs_each_step: bool,
    ) -> Result<Self> {
        if velocity_order != 1 && velocity_order != 2 {
            return Err(Error::Config(format!(
                "mesh velocity order must be 1 or 2, got {}",
                velocity_order
            )));
        }
        if velocity_order == 2 && model.buffer_size() < 3 {
            return Err(Error::Config(format!(
                "second-order mesh velocity needs a buffer of 3 solution steps, \
                 model '{}' has {}",
                model.name,
                model.buffer_size()
            )));
        }

        for comp in 0..3 {
            model.register_variable(DofVariable::mesh_displacement(comp));
            model.register_variable(DofVariable::mesh_velocity(comp));
        }

        let mesh_part = Self::generate_mesh_part(model);
        info!(
            "mesh part generated: {} synthetic elements over {} nodes",
            mesh_part.elements.len(),
            mesh_part.nodes.len()
        );

        let inner = SolvingStrategy::new(
            StaticScheme::new(),
            solver,
            IncrementNormCriterion::new(1e-10, 1e-12),
            StrategyConfig {
                max_iterations: 2,
                reform_dofs_each_step: false,
                compute_reactions: false,
                parallel_build: true,
            },
        );

        Ok(Self {
            inner,
            mesh_part,
            velocity_order,
            reform_dofs_each_step,
        })
    }

    /// One spring element per unique element edge of the physical mesh.
    fn generate_mesh_part(model: &mut ModelPart) -> SubPart {
        let mut edges = BTreeSet::new();
        for element in model.elements() {
            let nodes = element.node_ids();
            for pair in nodes.windows(2) {
                let (a, b) = (pair[0].min(pair[1]), pair[0].max(pair[1]));
                edges.insert((a, b));
            }
        }

        let mut part = SubPart::new("mesh_part");
        let mut nodes = BTreeSet::new();
        for (id, (a, b)) in edges.into_iter().enumerate() {
            part.elements
                .push(model.add_element(Box::new(MeshMotionElement::new(id, [a, b], 1.0))));
            nodes.insert(a);
            nodes.insert(b);
        }
        part.nodes = nodes.into_iter().collect();
        part
    }

    /// Solve the mesh motion for the current step.
    ///
    /// Resets the coordinates to the reference configuration, solves
    /// the shadow system, derives the mesh velocity and commits the new
    /// physical coordinates. Returns the final correction norm.
    pub fn solve(&mut self, model: &mut ModelPart, ctx: &mut ProcessContext) -> Result<f64> {
        model.reset_to_reference();

        let mesh_part = &self.mesh_part;
        let report = self.inner.solve_step(model, ctx, &[], Some(mesh_part))?;

        self.calculate_mesh_velocities(model, ctx)?;
        model.commit_mesh_displacement();

        if self.reform_dofs_each_step {
            self.inner.clear();
        }

        debug!(
            "mesh motion solved in {} iterations, |dx| = {:.3e}",
            report.iterations, report.correction_norm
        );
        Ok(report.correction_norm)
    }

    /// Backward-difference mesh velocity of the chosen order.
    ///
    /// A negative time step (adjoint, reverse-time runs) is
    /// sign-corrected to its magnitude.
    pub fn calculate_mesh_velocities(
        &self,
        model: &mut ModelPart,
        ctx: &ProcessContext,
    ) -> Result<()> {
        let mut dt = ctx.delta_time;
        if dt == 0.0 {
            return Err(Error::Numeric(
                "mesh velocity requires a non-zero time step".to_string(),
            ));
        }
        if dt < 0.0 {
            dt = -dt;
        }
        let coeff = 1.0 / dt;

        for &node_id in &self.mesh_part.nodes {
            let node = model.node_mut(node_id);
            for comp in 0..3 {
                let d = DofVariable::mesh_displacement(comp);
                let v = DofVariable::mesh_velocity(comp);

                let velocity = if self.velocity_order == 1 {
                    coeff * (node.value(d, 0) - node.value(d, 1))
                } else {
                    coeff
                        * (1.5 * node.value(d, 0) - 2.0 * node.value(d, 1)
                            + 0.5 * node.value(d, 2))
                };
                node.set_value(v, 0, velocity);
            }
        }

        Ok(())
    }

    /// Re-baseline the reference configuration to the current one
    /// (optimization iterations change the reference).
    pub fn update_reference_mesh(&self, model: &mut ModelPart) {
        model.update_reference();
    }

    pub fn mesh_part(&self) -> &SubPart {
        &self.mesh_part
    }

    /// Drop the inner system and numbering.
    pub fn clear(&mut self) {
        self.inner.clear();
    }
}
