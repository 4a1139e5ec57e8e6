//! Master-slave (multi-point) constraint store.
//!
//! A store is an arena of constraint records indexed by slave Dof,
//! rebuilt each solution step by the coupling layer rather than mutated
//! incrementally. Several stores may coexist (e.g. separate velocity
//! and pressure sets for the patch and background of an overlapping
//! mesh); the builder applies them independently, in registration
//! order, in a single elimination pass.

use std::collections::{BTreeMap, HashMap};

use log::{debug, info};

use crate::error::{Error, Result};
use crate::model::{DofKey, ModelPart};

/// One weighted master edge of a constraint record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MasterEdge {
    pub master: DofKey,
    pub weight: f64,
}

/// Linear relation tying one slave Dof to its masters:
/// `u_slave = sum_i weight_i * u_master_i + constant`.
#[derive(Debug, Clone, Default)]
pub struct ConstraintRecord {
    pub masters: Vec<MasterEdge>,
    pub constant: f64,
}

/// Named arena of master-slave constraints.
pub struct ConstraintStore {
    name: String,
    records: BTreeMap<DofKey, ConstraintRecord>,
    /// Nodal-normal components attached to slave Dofs; used by the
    /// conservative (zero-net-flux) correction.
    normals: HashMap<DofKey, f64>,
    /// Per-slave additive corrections computed by the conservative pass.
    corrections: HashMap<DofKey, f64>,
    /// R^T M^{-1} R over the interface this store constrains.
    rt_minv_r: f64,
}

impl ConstraintStore {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            records: BTreeMap::new(),
            normals: HashMap::new(),
            corrections: HashMap::new(),
            rt_minv_r: 0.0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Insert or overwrite the (slave -> master) weighted edge and mark
    /// the slave's node. Re-adding an edge for the same master replaces
    /// its weight; the constant of the record is replaced as well.
    pub fn add_constraint(
        &mut self,
        model: &mut ModelPart,
        slave: DofKey,
        master: DofKey,
        weight: f64,
        constant: f64,
    ) {
        model.node_mut(slave.node).slave = true;
        let record = self.records.entry(slave).or_default();
        match record.masters.iter_mut().find(|e| e.master == master) {
            Some(edge) => edge.weight = weight,
            None => record.masters.push(MasterEdge { master, weight }),
        }
        record.constant = constant;
    }

    /// Delete every edge of `slave` and clear its node's slave flag.
    pub fn remove_constraint(&mut self, model: &mut ModelPart, slave: DofKey) {
        self.records.remove(&slave);
        self.normals.remove(&slave);
        self.corrections.remove(&slave);
        model.node_mut(slave.node).slave = false;
    }

    /// Attach the nodal-normal component used by the conservative
    /// correction. This is an annotation, not a constraint edge.
    pub fn add_nodal_normal_to_slave_dof(&mut self, slave: DofKey, normal_component: f64) {
        self.normals.insert(slave, normal_component);
    }

    /// Whether `key` is a slave of this store.
    pub fn is_slave(&self, key: DofKey) -> bool {
        self.records.contains_key(&key)
    }

    /// Constraint record of `key`, if it is a slave here.
    pub fn record(&self, key: DofKey) -> Option<&ConstraintRecord> {
        self.records.get(&key)
    }

    /// Slaves in deterministic (node, variable) order.
    pub fn slaves(&self) -> impl Iterator<Item = (&DofKey, &ConstraintRecord)> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn set_rt_minv_r(&mut self, value: f64) {
        self.rt_minv_r = value;
    }

    pub fn rt_minv_r(&self) -> f64 {
        self.rt_minv_r
    }

    /// Drop all records, annotations and corrections.
    ///
    /// Node slave flags are owned by the coupling layer, which clears
    /// them together with the visited flags at end of step.
    pub fn clear(&mut self) {
        self.records.clear();
        self.normals.clear();
        self.corrections.clear();
        self.rt_minv_r = 0.0;
        debug!("constraint store '{}' cleared", self.name);
    }

    /// Update every slave Dof value from its masters:
    /// `u_s = sum w_i * u_m_i + constant` (current step buffer).
    pub fn apply_to_slaves(&self, model: &mut ModelPart) {
        for (slave, record) in &self.records {
            let mut value = record.constant;
            for edge in &record.masters {
                value += edge.weight * model.node(edge.master.node).value(edge.master.variable, 0);
            }
            model
                .node_mut(slave.node)
                .set_value(slave.variable, 0, value);
        }
    }

    /// Net normal flux through the constrained interface:
    /// `sum_s R_s * u_s` over the annotated slave Dofs.
    pub fn normal_flux(&self, model: &ModelPart) -> f64 {
        self.records
            .keys()
            .map(|slave| {
                let normal = self.normals.get(slave).copied().unwrap_or(0.0);
                normal * model.node(slave.node).value(slave.variable, 0)
            })
            .sum()
    }

    /// Compute the per-slave corrections that cancel the aggregate
    /// normal flux through the interface:
    /// `c_s = -sum_o (R_s * R_o) / (m_s * RtMinvR) * u_o`.
    ///
    /// # Errors
    /// Fails if `RtMinvR` is not positive or a slave node carries a
    /// zero nodal mass.
    pub fn calculate_conservative_corrections(&mut self, model: &ModelPart) -> Result<()> {
        if self.records.is_empty() {
            return Ok(());
        }
        if self.rt_minv_r <= 0.0 {
            return Err(Error::Numeric(format!(
                "constraint store '{}': RtMinvR = {} is not positive; \
                 were nodal normals and masses computed?",
                self.name, self.rt_minv_r
            )));
        }

        // Snapshot (normal, value, mass) per slave so the O(n^2)
        // accumulation does not re-query the mesh.
        let slaves: Vec<(DofKey, f64, f64, f64)> = self
            .records
            .keys()
            .map(|&slave| {
                let node = model.node(slave.node);
                let normal = self.normals.get(&slave).copied().unwrap_or(0.0);
                (slave, normal, node.value(slave.variable, 0), node.nodal_mass)
            })
            .collect();

        self.corrections.clear();
        for &(slave, normal, _, mass) in &slaves {
            if mass <= 0.0 {
                return Err(Error::Numeric(format!(
                    "constraint store '{}': slave node {} has non-positive nodal mass {}",
                    self.name, slave.node, mass
                )));
            }
            let mut constant = 0.0;
            for &(_, normal_other, value_other, _) in &slaves {
                constant -= (normal * normal_other) / (mass * self.rt_minv_r) * value_other;
            }
            self.corrections.insert(slave, constant);
        }

        info!(
            "conservative correction of '{}' calculated ({} slave dofs)",
            self.name,
            slaves.len()
        );
        Ok(())
    }

    /// Add the computed corrections into the current and previous
    /// solution-step buffer slots of every slave Dof.
    pub fn apply_conservative_corrections(&self, model: &mut ModelPart) {
        for (slave, &correction) in &self.corrections {
            let node = model.node_mut(slave.node);
            *node.value_mut(slave.variable, 0) += correction;
            if node.buffer_size() > 1 {
                *node.value_mut(slave.variable, 1) += correction;
            }
        }
        info!("conservative correction of '{}' applied", self.name);
    }
}
