//! Overlapping-mesh (chimera) coupling.
//!
//! Couples two overlapping, non-conforming mesh regions by tying each
//! boundary node of one region to the nodes of the enclosing element in
//! the other region through weighted master-slave constraints. Four
//! constraint stores coexist (patch/background x velocity/pressure) and
//! are rebuilt every solution step.

use std::str::FromStr;

use log::{debug, info};

use crate::coupling::locator::PointLocator;
use crate::coupling::normals::calculate_nodal_normals_and_mass;
use crate::error::{Error, Result};
use crate::fem::constraints::ConstraintStore;
use crate::model::{DofKey, DofVariable, ModelPart, SubPart};

/// Constraint application strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CouplingType {
    /// Interpolation coupling: master-slave edges weighted by the
    /// shape functions of the enclosing element.
    NearestElement,
    /// Interpolation coupling plus the zero-net-flux correction across
    /// the interface.
    Conservative,
}

impl FromStr for CouplingType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "nearest_element" => Ok(CouplingType::NearestElement),
            "conservative" => Ok(CouplingType::Conservative),
            other => Err(Error::Config(format!(
                "coupling type must be 'nearest_element' or 'conservative', got '{}'",
                other
            ))),
        }
    }
}

/// Which boundary nodes receive a pressure constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressureCoupling {
    /// Every boundary node.
    All,
    /// A single reference node, anchoring the pressure gauge.
    One,
    /// No pressure coupling.
    None,
}

impl FromStr for PressureCoupling {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "all" => Ok(PressureCoupling::All),
            "one" => Ok(PressureCoupling::One),
            "none" => Ok(PressureCoupling::None),
            other => Err(Error::Config(format!(
                "pressure coupling must be 'all', 'one' or 'none', got '{}'",
                other
            ))),
        }
    }
}

/// Which side of the overlap a boundary belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Patch,
    Background,
}

/// Chimera coupling parameters.
#[derive(Debug, Clone)]
pub struct ChimeraConfig {
    pub coupling_type: CouplingType,
    pub pressure_coupling: PressureCoupling,
    /// Reference node for the `one` pressure mode; first boundary node
    /// when unset.
    pub pressure_node: Option<usize>,
    /// Overlap distance between the meshes; must be positive.
    pub overlap_distance: f64,
    /// Spatial dimension (2 or 3).
    pub dim: usize,
}

/// Overlapping-mesh coupling process.
///
/// Owns the four constraint stores in registration order: patch
/// velocity, patch pressure, background velocity, background pressure.
pub struct ChimeraCoupling {
    config: ChimeraConfig,
    pub patch_velocity: ConstraintStore,
    pub patch_pressure: ConstraintStore,
    pub background_velocity: ConstraintStore,
    pub background_pressure: ConstraintStore,
}

impl ChimeraCoupling {
    /// Validate the configuration and set up empty constraint stores.
    pub fn new(config: ChimeraConfig) -> Result<Self> {
        if config.overlap_distance <= 0.0 {
            return Err(Error::Config(format!(
                "overlap distance must be positive, got {}",
                config.overlap_distance
            )));
        }
        if config.dim != 2 && config.dim != 3 {
            return Err(Error::Config(format!(
                "chimera coupling supports dim 2 or 3, got {}",
                config.dim
            )));
        }

        Ok(Self {
            config,
            patch_velocity: ConstraintStore::new("patch_velocity"),
            patch_pressure: ConstraintStore::new("patch_pressure"),
            background_velocity: ConstraintStore::new("background_velocity"),
            background_pressure: ConstraintStore::new("background_pressure"),
        })
    }

    pub fn config(&self) -> &ChimeraConfig {
        &self.config
    }

    /// Constraint stores in registration order, for numbering and
    /// assembly.
    pub fn stores(&self) -> Vec<&ConstraintStore> {
        vec![
            &self.patch_velocity,
            &self.patch_pressure,
            &self.background_velocity,
            &self.background_pressure,
        ]
    }

    /// Formulate the coupling for one background/patch pair:
    /// the patch boundary is constrained against the background region
    /// and the hole boundary against the patch region.
    pub fn formulate(
        &mut self,
        model: &mut ModelPart,
        patch_boundary: &SubPart,
        background: &SubPart,
        hole_boundary: &SubPart,
        patch: &SubPart,
    ) -> Result<()> {
        let background_locator = PointLocator::new(model, background, self.config.dim)?;
        let patch_locator = PointLocator::new(model, patch, self.config.dim)?;

        info!(
            "formulating chimera: background '{}' <- patch boundary '{}', \
             patch '{}' <- hole boundary '{}'",
            background.name, patch_boundary.name, patch.name, hole_boundary.name
        );

        match self.config.coupling_type {
            CouplingType::NearestElement => {
                self.couple_boundary(model, patch_boundary, &background_locator, Side::Patch)?;
                self.couple_boundary(model, hole_boundary, &patch_locator, Side::Background)?;
            }
            CouplingType::Conservative => {
                calculate_nodal_normals_and_mass(model, patch_boundary, 1.0)?;
                calculate_nodal_normals_and_mass(model, hole_boundary, -1.0)?;
                self.couple_conservative(model, patch_boundary, &background_locator, Side::Patch)?;
                self.couple_conservative(model, hole_boundary, &patch_locator, Side::Background)?;
            }
        }

        Ok(())
    }

    /// Interpolation coupling of one boundary against a located region.
    ///
    /// Returns the number of boundary nodes that found an enclosing
    /// element; nodes without one are left unconstrained and not
    /// visited, so later passes can still claim them.
    pub fn couple_boundary(
        &mut self,
        model: &mut ModelPart,
        boundary: &SubPart,
        locator: &PointLocator,
        side: Side,
    ) -> Result<usize> {
        let (store_v, store_p) = match side {
            Side::Patch => (&mut self.patch_velocity, &mut self.patch_pressure),
            Side::Background => (&mut self.background_velocity, &mut self.background_pressure),
        };
        let config = &self.config;

        let mut coupled = 0;
        for &node_id in &boundary.nodes {
            let already_coupled = model.node(node_id).visited;
            let point = model.node(node_id).coords;
            let hit = locator.locate(model, &point);

            // A re-coupled node first drops its stale edges.
            if already_coupled && hit.is_some() {
                for comp in 0..config.dim {
                    store_v.remove_constraint(
                        model,
                        DofKey::new(node_id, DofVariable::velocity(comp)),
                    );
                }
                if config.pressure_coupling == PressureCoupling::All {
                    store_p.remove_constraint(model, DofKey::new(node_id, DofVariable::Pressure));
                }
            }

            let hit = match hit {
                Some(hit) => hit,
                None => {
                    debug!(
                        "boundary node {} of '{}' found no enclosing element",
                        node_id, boundary.name
                    );
                    continue;
                }
            };

            // Seed the slave values with the interpolated master state.
            for comp in 0..config.dim {
                model
                    .node_mut(node_id)
                    .set_value(DofVariable::velocity(comp), 0, 0.0);
            }
            if config.pressure_coupling == PressureCoupling::All {
                model.node_mut(node_id).set_value(DofVariable::Pressure, 0, 0.0);
            }

            for (&master_node, &weight) in hit.nodes.iter().zip(&hit.weights) {
                for comp in 0..config.dim {
                    let variable = DofVariable::velocity(comp);
                    let master_value = model.node(master_node).value(variable, 0);
                    *model.node_mut(node_id).value_mut(variable, 0) += weight * master_value;
                    store_v.add_constraint(
                        model,
                        DofKey::new(node_id, variable),
                        DofKey::new(master_node, variable),
                        weight,
                        0.0,
                    );
                }

                if config.pressure_coupling == PressureCoupling::All {
                    let master_value = model.node(master_node).value(DofVariable::Pressure, 0);
                    *model.node_mut(node_id).value_mut(DofVariable::Pressure, 0) +=
                        weight * master_value;
                    store_p.add_constraint(
                        model,
                        DofKey::new(node_id, DofVariable::Pressure),
                        DofKey::new(master_node, DofVariable::Pressure),
                        weight,
                        0.0,
                    );
                }
            }

            // Previous-step slot follows the seeded state.
            let node = model.node_mut(node_id);
            if node.buffer_size() > 1 {
                for comp in 0..config.dim {
                    let variable = DofVariable::velocity(comp);
                    let value = node.value(variable, 0);
                    node.set_value(variable, 1, value);
                }
                if config.pressure_coupling == PressureCoupling::All {
                    let value = node.value(DofVariable::Pressure, 0);
                    node.set_value(DofVariable::Pressure, 1, value);
                }
            }

            node.visited = true;
            coupled += 1;
        }

        if self.config.pressure_coupling == PressureCoupling::One {
            self.couple_one_pressure(model, boundary, locator, side)?;
        }

        info!(
            "{} of {} nodes from '{}' coupled",
            coupled,
            boundary.nodes.len(),
            boundary.name
        );
        Ok(coupled)
    }

    /// Anchor the pressure gauge at a single reference node, skipping
    /// nodes already claimed by a velocity-coupling pass.
    fn couple_one_pressure(
        &mut self,
        model: &mut ModelPart,
        boundary: &SubPart,
        locator: &PointLocator,
        side: Side,
    ) -> Result<()> {
        let store_p = match side {
            Side::Patch => &mut self.patch_pressure,
            Side::Background => &mut self.background_pressure,
        };

        let node_id = match self.config.pressure_node {
            Some(id) => {
                if !boundary.nodes.contains(&id) {
                    return Err(Error::Config(format!(
                        "pressure coupling node {} is not part of boundary '{}'",
                        id, boundary.name
                    )));
                }
                id
            }
            None => *boundary.nodes.first().ok_or_else(|| {
                Error::Topology(format!("boundary '{}' has no nodes", boundary.name))
            })?,
        };

        if model.node(node_id).visited {
            debug!(
                "pressure reference node {} already coupled, skipping",
                node_id
            );
            return Ok(());
        }

        let point = model.node(node_id).coords;
        let hit = match locator.locate(model, &point) {
            Some(hit) => hit,
            None => return Ok(()),
        };

        model.node_mut(node_id).set_value(DofVariable::Pressure, 0, 0.0);
        for (&master_node, &weight) in hit.nodes.iter().zip(&hit.weights) {
            let master_value = model.node(master_node).value(DofVariable::Pressure, 0);
            *model.node_mut(node_id).value_mut(DofVariable::Pressure, 0) += weight * master_value;
            store_p.add_constraint(
                model,
                DofKey::new(node_id, DofVariable::Pressure),
                DofKey::new(master_node, DofVariable::Pressure),
                weight,
                0.0,
            );
        }
        let node = model.node_mut(node_id);
        if node.buffer_size() > 1 {
            let value = node.value(DofVariable::Pressure, 0);
            node.set_value(DofVariable::Pressure, 1, value);
        }
        node.visited = true;

        info!(
            "pressure gauge anchored at node {} ({:.4}, {:.4}, {:.4})",
            node_id, point.x, point.y, point.z
        );
        Ok(())
    }

    /// Conservative coupling: interpolation pass plus the zero-net-flux
    /// correction derived from `R^T M^{-1} R`.
    fn couple_conservative(
        &mut self,
        model: &mut ModelPart,
        boundary: &SubPart,
        locator: &PointLocator,
        side: Side,
    ) -> Result<()> {
        self.couple_boundary(model, boundary, locator, side)?;

        let dim = self.config.dim;
        let (store_v, store_p) = match side {
            Side::Patch => (&mut self.patch_velocity, &mut self.patch_pressure),
            Side::Background => (&mut self.background_velocity, &mut self.background_pressure),
        };

        let mut rt_minv_r = 0.0;
        for &node_id in &boundary.nodes {
            let (normal, mass) = {
                let node = model.node(node_id);
                (node.normal, node.nodal_mass)
            };
            if normal.norm() <= 0.0 {
                return Err(Error::Numeric(format!(
                    "zero-norm nodal normal on interface node {} of '{}'",
                    node_id, boundary.name
                )));
            }
            if mass <= 0.0 {
                return Err(Error::Numeric(format!(
                    "non-positive nodal mass {} on interface node {} of '{}'",
                    mass, node_id, boundary.name
                )));
            }

            for comp in 0..dim {
                let r = normal[comp];
                store_v
                    .add_nodal_normal_to_slave_dof(DofKey::new(node_id, DofVariable::velocity(comp)), r);
                rt_minv_r += r * r / mass;
            }
            store_p.add_nodal_normal_to_slave_dof(DofKey::new(node_id, DofVariable::Pressure), 0.0);
        }

        store_v.set_rt_minv_r(rt_minv_r);
        debug!("RtMinvR of '{}' = {:.6e}", boundary.name, rt_minv_r);

        store_v.calculate_conservative_corrections(model)?;
        store_v.apply_conservative_corrections(model);
        Ok(())
    }

    /// Clear every constraint set and the node bookkeeping flags at the
    /// end of the solution step.
    pub fn finalize_solution_step(&mut self, model: &mut ModelPart) {
        self.patch_velocity.clear();
        self.patch_pressure.clear();
        self.background_velocity.clear();
        self.background_pressure.clear();

        for node in model.nodes_mut() {
            node.visited = false;
            node.slave = false;
        }
        info!("chimera constraint sets cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SurfaceCondition;
    use approx::assert_relative_eq;
    use nalgebra::Point3;

    fn config(coupling: CouplingType, pressure: PressureCoupling) -> ChimeraConfig {
        ChimeraConfig {
            coupling_type: coupling,
            pressure_coupling: pressure,
            pressure_node: None,
            overlap_distance: 0.05,
            dim: 2,
        }
    }

    /// Background square of two triangles plus two free-standing patch
    /// boundary nodes, one inside and one far outside.
    fn setup() -> (ModelPart, SubPart, SubPart) {
        let mut model = ModelPart::new("chimera", 2);
        for comp in 0..2 {
            model.register_variable(DofVariable::velocity(comp));
        }
        model.register_variable(DofVariable::Pressure);

        model.add_node(Point3::new(0.0, 0.0, 0.0));
        model.add_node(Point3::new(1.0, 0.0, 0.0));
        model.add_node(Point3::new(1.0, 1.0, 0.0));
        model.add_node(Point3::new(0.0, 1.0, 0.0));

        let mut background = SubPart::new("background");
        background
            .elements
            .push(model.add_element(Box::new(SurfaceCondition::new(0, vec![0, 1, 2]))));
        background
            .elements
            .push(model.add_element(Box::new(SurfaceCondition::new(1, vec![0, 2, 3]))));

        let inside = model.add_node(Point3::new(0.5, 0.25, 0.0));
        let outside = model.add_node(Point3::new(5.0, 5.0, 0.0));
        let mut boundary = SubPart::new("patch_boundary");
        boundary.nodes = vec![inside, outside];

        (model, background, boundary)
    }

    #[test]
    fn test_overlap_distance_must_be_positive() {
        let mut cfg = config(CouplingType::NearestElement, PressureCoupling::None);
        cfg.overlap_distance = 0.0;
        assert!(ChimeraCoupling::new(cfg).is_err());
    }

    #[test]
    fn test_nearest_element_couples_found_nodes_only() {
        let (mut model, background, boundary) = setup();
        // Linear velocity field on the background.
        for i in 0..4 {
            let p = model.node(i).coords;
            model.node_mut(i).set_value(DofVariable::VelocityX, 0, p.x + 2.0 * p.y);
        }

        let mut chimera =
            ChimeraCoupling::new(config(CouplingType::NearestElement, PressureCoupling::None))
                .unwrap();
        let locator = PointLocator::new(&model, &background, 2).unwrap();
        let coupled = chimera
            .couple_boundary(&mut model, &boundary, &locator, Side::Patch)
            .unwrap();

        assert_eq!(coupled, 1);
        let inside = boundary.nodes[0];
        let outside = boundary.nodes[1];

        assert!(model.node(inside).visited);
        assert!(model.node(inside).slave);
        assert!(chimera
            .patch_velocity
            .is_slave(DofKey::new(inside, DofVariable::VelocityX)));

        // Interpolated seed equals the linear field, copied to slot 1.
        assert_relative_eq!(
            model.node(inside).value(DofVariable::VelocityX, 0),
            1.0,
            epsilon = 1e-12
        );
        assert_relative_eq!(
            model.node(inside).value(DofVariable::VelocityX, 1),
            1.0,
            epsilon = 1e-12
        );

        // The unfound node falls back to its own free equation.
        assert!(!model.node(outside).visited);
        assert!(!chimera
            .patch_velocity
            .is_slave(DofKey::new(outside, DofVariable::VelocityX)));
    }

    #[test]
    fn test_recoupling_replaces_stale_edges() {
        let (mut model, background, boundary) = setup();
        let mut chimera =
            ChimeraCoupling::new(config(CouplingType::NearestElement, PressureCoupling::None))
                .unwrap();
        let locator = PointLocator::new(&model, &background, 2).unwrap();

        chimera
            .couple_boundary(&mut model, &boundary, &locator, Side::Patch)
            .unwrap();
        let first = chimera.patch_velocity.len();
        chimera
            .couple_boundary(&mut model, &boundary, &locator, Side::Patch)
            .unwrap();

        assert_eq!(chimera.patch_velocity.len(), first);
    }

    #[test]
    fn test_pressure_all_adds_pressure_constraints() {
        let (mut model, background, boundary) = setup();
        let mut chimera =
            ChimeraCoupling::new(config(CouplingType::NearestElement, PressureCoupling::All))
                .unwrap();
        let locator = PointLocator::new(&model, &background, 2).unwrap();
        chimera
            .couple_boundary(&mut model, &boundary, &locator, Side::Patch)
            .unwrap();

        let inside = boundary.nodes[0];
        assert!(chimera
            .patch_pressure
            .is_slave(DofKey::new(inside, DofVariable::Pressure)));
    }

    #[test]
    fn test_pressure_one_skips_already_coupled_reference() {
        let (mut model, background, boundary) = setup();
        let mut chimera =
            ChimeraCoupling::new(config(CouplingType::NearestElement, PressureCoupling::One))
                .unwrap();
        let locator = PointLocator::new(&model, &background, 2).unwrap();
        chimera
            .couple_boundary(&mut model, &boundary, &locator, Side::Patch)
            .unwrap();

        // Reference node (first boundary node) was velocity-coupled, so
        // no pressure anchor is added.
        assert!(chimera.patch_pressure.is_empty());
    }

    #[test]
    fn test_finalize_clears_stores_and_flags() {
        let (mut model, background, boundary) = setup();
        let mut chimera =
            ChimeraCoupling::new(config(CouplingType::NearestElement, PressureCoupling::None))
                .unwrap();
        let locator = PointLocator::new(&model, &background, 2).unwrap();
        chimera
            .couple_boundary(&mut model, &boundary, &locator, Side::Patch)
            .unwrap();

        chimera.finalize_solution_step(&mut model);

        assert!(chimera.patch_velocity.is_empty());
        let inside = boundary.nodes[0];
        assert!(!model.node(inside).visited);
        assert!(!model.node(inside).slave);
    }
}
