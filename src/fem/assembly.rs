//! Global sparse assembly with constraint elimination.
//!
//! The builder owns the global system for the duration of one
//! assemble-solve cycle. Per entity it requests the effective local
//! system from the scheme and the governing Dof list, resolves every
//! local Dof through the constraint stores and the registry, and
//! scatter-adds the contribution into a triplet matrix:
//!
//! - free Dofs keep their own equation row/column;
//! - slave Dofs are eliminated before insertion: their rows/columns are
//!   redistributed to the master Dofs weighted by the constraint
//!   weights, and the constraint gap contributes to the right-hand
//!   side;
//! - fixed (Dirichlet) Dofs are removed from the active set entirely,
//!   their known values entering through the residual.
//!
//! The parallel path computes per-entity contributions with rayon and
//! merges the thread-local triplet lists sequentially, so the assembled
//! matrix is independent of the iteration order.

use std::collections::HashMap;

use log::debug;
use rayon::prelude::*;
use sprs::{CsMat, TriMat};

use crate::error::{Error, Result};
use crate::fem::constraints::ConstraintStore;
use crate::fem::dof::{DofRegistry, DofStatus};
use crate::fem::time_integration::TimeIntegrator;
use crate::linalg::{LinearSolver, SolverStats};
use crate::model::{DofKey, Element, ModelPart, ProcessContext, SubPart};

/// Assembles and solves the global sparse system.
pub struct BuilderAndSolver {
    /// Compute per-entity contributions in parallel.
    pub parallel: bool,
}

/// Resolution of one local Dof against the numbering and constraints.
enum Resolved {
    /// Free unknown: scatter to its own equation.
    Free(usize),
    /// Dirichlet: dropped from the active set.
    Fixed,
    /// Slave: redistribute to master equations; `gap` is the current
    /// violation of the constraint relation, moved to the RHS.
    Slave { targets: Vec<(usize, f64)>, gap: f64 },
}

impl Resolved {
    fn targets(&self) -> &[(usize, f64)] {
        match self {
            Resolved::Free(_) => &[],
            Resolved::Fixed => &[],
            Resolved::Slave { targets, .. } => targets,
        }
    }

    fn gap(&self) -> f64 {
        match self {
            Resolved::Slave { gap, .. } => *gap,
            _ => 0.0,
        }
    }
}

/// One entity's contribution to the reduced global system.
struct Contribution {
    triplets: Vec<(usize, usize, f64)>,
    rhs: Vec<(usize, f64)>,
}

impl Default for BuilderAndSolver {
    fn default() -> Self {
        Self { parallel: true }
    }
}

impl BuilderAndSolver {
    pub fn new(parallel: bool) -> Self {
        Self { parallel }
    }

    /// Assemble the reduced system `A * dx = b` over the scoped
    /// elements and conditions.
    pub fn build(
        &self,
        model: &ModelPart,
        ctx: &ProcessContext,
        scheme: &dyn TimeIntegrator,
        registry: &DofRegistry,
        stores: &[&ConstraintStore],
        scope: Option<&SubPart>,
    ) -> Result<(CsMat<f64>, Vec<f64>)> {
        let n = registry.free_count();
        if n == 0 {
            return Err(Error::Topology(
                "assembly has no free degrees of freedom".to_string(),
            ));
        }

        let entities: Vec<&dyn Element> = model
            .scoped_elements(scope)
            .into_iter()
            .chain(model.scoped_conditions(scope))
            .collect();

        let contributions: Vec<Contribution> = if self.parallel {
            entities
                .par_iter()
                .map(|entity| self.entity_contribution(model, ctx, scheme, registry, stores, *entity))
                .collect::<Result<Vec<_>>>()?
        } else {
            entities
                .iter()
                .map(|entity| self.entity_contribution(model, ctx, scheme, registry, stores, *entity))
                .collect::<Result<Vec<_>>>()?
        };

        // Sequential merge; duplicate triplets accumulate on conversion.
        let mut triplets = TriMat::new((n, n));
        let mut rhs = vec![0.0; n];
        for contribution in contributions {
            for (row, col, value) in contribution.triplets {
                triplets.add_triplet(row, col, value);
            }
            for (row, value) in contribution.rhs {
                rhs[row] += value;
            }
        }

        if rhs.iter().any(|v| !v.is_finite()) {
            return Err(Error::Numeric(
                "non-finite entry in assembled right-hand side".to_string(),
            ));
        }

        debug!(
            "assembled {} equations from {} entities ({} triplets)",
            n,
            entities.len(),
            triplets.nnz()
        );

        Ok((triplets.to_csr(), rhs))
    }

    /// Assemble, solve and return the solution increment on the free
    /// equations.
    pub fn build_and_solve(
        &self,
        model: &ModelPart,
        ctx: &ProcessContext,
        scheme: &dyn TimeIntegrator,
        registry: &DofRegistry,
        stores: &[&ConstraintStore],
        scope: Option<&SubPart>,
        solver: &mut dyn LinearSolver,
    ) -> Result<(Vec<f64>, Vec<f64>, SolverStats)> {
        let (lhs, rhs) = self.build(model, ctx, scheme, registry, stores, scope)?;
        let (dx, stats) = solver.solve(&lhs, &rhs)?;
        Ok((dx, rhs, stats))
    }

    /// Re-derive every slave Dof from its masters, store by store in
    /// registration order.
    pub fn update_slave_dofs(&self, model: &mut ModelPart, stores: &[&ConstraintStore]) {
        for store in stores {
            store.apply_to_slaves(model);
        }
    }

    /// Reaction forces at fixed Dofs: the negated residual of the
    /// updated state, accumulated entity by entity.
    pub fn calculate_reactions(
        &self,
        model: &ModelPart,
        ctx: &ProcessContext,
        scheme: &dyn TimeIntegrator,
        registry: &DofRegistry,
        scope: Option<&SubPart>,
    ) -> Result<HashMap<DofKey, f64>> {
        let mut reactions = HashMap::new();

        for entity in model
            .scoped_elements(scope)
            .into_iter()
            .chain(model.scoped_conditions(scope))
        {
            let (_, rhs) = scheme.combine_local_system(entity, model, ctx)?;
            for (i, key) in entity.dof_list().into_iter().enumerate() {
                if registry.status_of(key)? == DofStatus::Fixed {
                    *reactions.entry(key).or_insert(0.0) -= rhs[i];
                }
            }
        }

        Ok(reactions)
    }

    fn entity_contribution(
        &self,
        model: &ModelPart,
        ctx: &ProcessContext,
        scheme: &dyn TimeIntegrator,
        registry: &DofRegistry,
        stores: &[&ConstraintStore],
        entity: &dyn Element,
    ) -> Result<Contribution> {
        let (lhs, rhs) = scheme.combine_local_system(entity, model, ctx)?;
        let dofs = entity.dof_list();
        let n = dofs.len();

        if lhs.nrows() != n || lhs.ncols() != n || rhs.len() != n {
            return Err(Error::Topology(format!(
                "entity {} produced a {}x{} system and {} rhs entries for {} dofs",
                entity.id(),
                lhs.nrows(),
                lhs.ncols(),
                rhs.len(),
                n
            )));
        }

        let resolved: Vec<Resolved> = dofs
            .iter()
            .map(|&key| self.resolve_dof(model, registry, stores, key, entity.id()))
            .collect::<Result<Vec<_>>>()?;

        let mut out = Contribution {
            triplets: Vec::with_capacity(n * n),
            rhs: Vec::with_capacity(n),
        };

        for (i, res_i) in resolved.iter().enumerate() {
            // Free rows scatter with unit weight; slave rows through
            // their master targets; fixed rows are dropped.
            let own;
            let row_targets: &[(usize, f64)] = match res_i {
                Resolved::Free(eq) => {
                    own = [(*eq, 1.0)];
                    &own
                }
                Resolved::Fixed => &[],
                Resolved::Slave { .. } => res_i.targets(),
            };

            for &(eq_i, w_i) in row_targets {
                if !rhs[i].is_finite() {
                    return Err(Error::Numeric(format!(
                        "entity {} produced a non-finite rhs entry at local dof {}",
                        entity.id(),
                        i
                    )));
                }
                out.rhs.push((eq_i, w_i * rhs[i]));

                for (j, res_j) in resolved.iter().enumerate() {
                    let k = lhs[(i, j)];
                    if k == 0.0 {
                        continue;
                    }
                    if !k.is_finite() {
                        return Err(Error::Numeric(format!(
                            "entity {} produced a non-finite stiffness entry ({}, {})",
                            entity.id(),
                            i,
                            j
                        )));
                    }

                    let gap = res_j.gap();
                    if gap != 0.0 {
                        out.rhs.push((eq_i, -w_i * k * gap));
                    }

                    match res_j {
                        Resolved::Free(eq_j) => {
                            out.triplets.push((eq_i, *eq_j, w_i * k));
                        }
                        Resolved::Fixed => {
                            // Increment of a fixed dof is zero; its value is
                            // already inside the residual.
                        }
                        Resolved::Slave { targets, .. } => {
                            for &(eq_j, w_j) in targets {
                                out.triplets.push((eq_i, eq_j, w_i * w_j * k));
                            }
                        }
                    }
                }
            }
        }

        Ok(out)
    }

    /// Resolve one Dof into its scatter targets. Slave resolution is
    /// single-pass: a master that is itself a slave of a later store is
    /// not re-resolved within this assembly.
    fn resolve_dof(
        &self,
        model: &ModelPart,
        registry: &DofRegistry,
        stores: &[&ConstraintStore],
        key: DofKey,
        entity_id: usize,
    ) -> Result<Resolved> {
        match registry.status_of(key)? {
            DofStatus::Free(eq) => Ok(Resolved::Free(eq)),
            DofStatus::Fixed => Ok(Resolved::Fixed),
            DofStatus::Slave => {
                let record = stores
                    .iter()
                    .find_map(|store| store.record(key))
                    .ok_or_else(|| {
                        Error::Topology(format!(
                            "entity {}: dof (node {}, {:?}) is flagged slave but no \
                             constraint store holds a record for it",
                            entity_id, key.node, key.variable
                        ))
                    })?;

                let mut targets = Vec::with_capacity(record.masters.len());
                let mut relation_value = record.constant;
                for edge in &record.masters {
                    relation_value += edge.weight
                        * model.node(edge.master.node).value(edge.master.variable, 0);
                    match registry.status_of(edge.master)? {
                        DofStatus::Free(eq) => targets.push((eq, edge.weight)),
                        // Fixed master: zero increment, nothing to scatter.
                        DofStatus::Fixed => {}
                        // Master re-targeted as a slave elsewhere: applied in
                        // registration order, never re-resolved mid-assembly.
                        DofStatus::Slave => {}
                    }
                }

                let gap = relation_value - model.node(key.node).value(key.variable, 0);
                Ok(Resolved::Slave { targets, gap })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fem::time_integration::StaticScheme;
    use crate::linalg::DirectSolver;
    use crate::model::{BarElement, DofVariable, PointLoadCondition};
    use approx::assert_relative_eq;
    use nalgebra::Point3;

    /// Three-node bar chain, left end fixed, unit load at the right end.
    fn bar_model() -> ModelPart {
        let mut model = ModelPart::new("bar", 2);
        model.register_variable(DofVariable::DisplacementX);
        for i in 0..3 {
            model.add_node(Point3::new(i as f64, 0.0, 0.0));
        }
        model.add_element(Box::new(BarElement::new(0, [0, 1], 100.0, 1.0)));
        model.add_element(Box::new(BarElement::new(1, [1, 2], 100.0, 1.0)));
        model.add_condition(Box::new(PointLoadCondition::new(
            0,
            2,
            DofVariable::DisplacementX,
            1.0,
        )));
        model.node_mut(0).fix(DofVariable::DisplacementX);
        model
    }

    fn dense(mat: &CsMat<f64>) -> Vec<Vec<f64>> {
        let mut out = vec![vec![0.0; mat.cols()]; mat.rows()];
        for (row_idx, row) in mat.outer_iterator().enumerate() {
            for (col_idx, &val) in row.iter() {
                out[row_idx][col_idx] = val;
            }
        }
        out
    }

    #[test]
    fn test_dirichlet_dofs_leave_the_system() {
        let model = bar_model();
        let registry = DofRegistry::build(&model, None, &[]).unwrap();
        let builder = BuilderAndSolver::new(false);
        let scheme = StaticScheme::new();
        let ctx = ProcessContext::new(1.0);

        let (lhs, rhs) = builder
            .build(&model, &ctx, &scheme, &registry, &[], None)
            .unwrap();

        // Two free equations for three dofs (one fixed).
        assert_eq!(lhs.rows(), 2);
        assert_eq!(rhs.len(), 2);
        let k = dense(&lhs);
        assert_relative_eq!(k[0][0], 200.0);
        assert_relative_eq!(k[0][1], -100.0);
        assert_relative_eq!(k[1][1], 100.0);
    }

    #[test]
    fn test_serial_and_parallel_builds_agree() {
        let model = bar_model();
        let registry = DofRegistry::build(&model, None, &[]).unwrap();
        let scheme = StaticScheme::new();
        let ctx = ProcessContext::new(1.0);

        let (lhs_s, rhs_s) = BuilderAndSolver::new(false)
            .build(&model, &ctx, &scheme, &registry, &[], None)
            .unwrap();
        let (lhs_p, rhs_p) = BuilderAndSolver::new(true)
            .build(&model, &ctx, &scheme, &registry, &[], None)
            .unwrap();

        let (a, b) = (dense(&lhs_s), dense(&lhs_p));
        for (row_a, row_b) in a.iter().zip(&b) {
            for (va, vb) in row_a.iter().zip(row_b) {
                assert_relative_eq!(va, vb, epsilon = 1e-14);
            }
        }
        for (va, vb) in rhs_s.iter().zip(&rhs_p) {
            assert_relative_eq!(va, vb, epsilon = 1e-14);
        }
    }

    #[test]
    fn test_assembly_is_element_order_independent() {
        let mut model = ModelPart::new("bar", 2);
        model.register_variable(DofVariable::DisplacementX);
        for i in 0..3 {
            model.add_node(Point3::new(i as f64, 0.0, 0.0));
        }
        // Same chain, elements added in reverse order.
        model.add_element(Box::new(BarElement::new(1, [1, 2], 100.0, 1.0)));
        model.add_element(Box::new(BarElement::new(0, [0, 1], 100.0, 1.0)));
        model.node_mut(0).fix(DofVariable::DisplacementX);

        let reference = bar_model();
        let scheme = StaticScheme::new();
        let ctx = ProcessContext::new(1.0);
        let builder = BuilderAndSolver::new(false);

        let reg_a = DofRegistry::build(&reference, None, &[]).unwrap();
        let reg_b = DofRegistry::build(&model, None, &[]).unwrap();
        let (lhs_a, _) = builder
            .build(&reference, &ctx, &scheme, &reg_a, &[], None)
            .unwrap();
        let (lhs_b, _) = builder
            .build(&model, &ctx, &scheme, &reg_b, &[], None)
            .unwrap();

        let (a, b) = (dense(&lhs_a), dense(&lhs_b));
        for (row_a, row_b) in a.iter().zip(&b) {
            for (va, vb) in row_a.iter().zip(row_b) {
                assert_relative_eq!(va, vb, epsilon = 1e-14);
            }
        }
    }

    #[test]
    fn test_slave_elimination_redistributes_to_master() {
        // Tie node 1 rigidly to node 2: u1 = u2. The chain then behaves
        // as a single spring between the fixed end and the tied pair.
        let mut model = bar_model();
        let mut store = ConstraintStore::new("tie");
        store.add_constraint(
            &mut model,
            DofKey::new(1, DofVariable::DisplacementX),
            DofKey::new(2, DofVariable::DisplacementX),
            1.0,
            0.0,
        );

        let stores = [&store];
        let registry = DofRegistry::build(&model, None, &stores).unwrap();
        assert_eq!(registry.free_count(), 1);

        let builder = BuilderAndSolver::new(false);
        let scheme = StaticScheme::new();
        let ctx = ProcessContext::new(1.0);
        let mut solver = DirectSolver::new();

        let (dx, _, _) = builder
            .build_and_solve(&model, &ctx, &scheme, &registry, &stores, None, &mut solver)
            .unwrap();
        scheme.update(&mut model, &registry, &ctx, &dx).unwrap();
        builder.update_slave_dofs(&mut model, &stores);

        // Eliminated system: k_eff = 100 (element 0 between fixed node 0
        // and the tied pair; element 1 carries no strain), F = 1.
        assert_relative_eq!(
            model.node(2).value(DofVariable::DisplacementX, 0),
            0.01,
            epsilon = 1e-10
        );
        assert_relative_eq!(
            model.node(1).value(DofVariable::DisplacementX, 0),
            0.01,
            epsilon = 1e-10
        );
    }

    #[test]
    fn test_constraint_constant_enters_rhs() {
        // u1 = u2 + 0.005: an offset tie. The gap shows up in the
        // right-hand side and the slave lands exactly on the relation.
        let mut model = bar_model();
        let mut store = ConstraintStore::new("tie");
        store.add_constraint(
            &mut model,
            DofKey::new(1, DofVariable::DisplacementX),
            DofKey::new(2, DofVariable::DisplacementX),
            1.0,
            0.005,
        );

        let stores = [&store];
        let registry = DofRegistry::build(&model, None, &stores).unwrap();
        let builder = BuilderAndSolver::new(false);
        let scheme = StaticScheme::new();
        let ctx = ProcessContext::new(1.0);
        let mut solver = DirectSolver::new();

        let (dx, _, _) = builder
            .build_and_solve(&model, &ctx, &scheme, &registry, &stores, None, &mut solver)
            .unwrap();
        scheme.update(&mut model, &registry, &ctx, &dx).unwrap();
        builder.update_slave_dofs(&mut model, &stores);

        let u1 = model.node(1).value(DofVariable::DisplacementX, 0);
        let u2 = model.node(2).value(DofVariable::DisplacementX, 0);
        assert_relative_eq!(u1, u2 + 0.005, epsilon = 1e-10);
    }

    #[test]
    fn test_reactions_balance_applied_load() {
        let mut model = bar_model();
        let registry = DofRegistry::build(&model, None, &[]).unwrap();
        let builder = BuilderAndSolver::new(false);
        let scheme = StaticScheme::new();
        let ctx = ProcessContext::new(1.0);
        let mut solver = DirectSolver::new();

        let (dx, _, _) = builder
            .build_and_solve(&model, &ctx, &scheme, &registry, &[], None, &mut solver)
            .unwrap();
        scheme.update(&mut model, &registry, &ctx, &dx).unwrap();

        let reactions = builder
            .calculate_reactions(&model, &ctx, &scheme, &registry, None)
            .unwrap();
        let r = reactions[&DofKey::new(0, DofVariable::DisplacementX)];
        assert_relative_eq!(r, -1.0, epsilon = 1e-10);
    }

    #[test]
    fn test_empty_system_is_an_error() {
        let mut model = bar_model();
        for i in 0..3 {
            model.node_mut(i).fix(DofVariable::DisplacementX);
        }
        let registry = DofRegistry::build(&model, None, &[]).unwrap();
        let builder = BuilderAndSolver::new(false);
        let scheme = StaticScheme::new();
        let ctx = ProcessContext::new(1.0);

        assert!(builder
            .build(&model, &ctx, &scheme, &registry, &[], None)
            .is_err());
    }
}
