//! Degree-of-freedom registry and equation numbering.
//!
//! Before each assembly pass the registry walks the Dof lists of every
//! scoped element and condition and assigns a dense, gapless equation
//! numbering to the free Dofs. Fixed (Dirichlet) Dofs and slave Dofs
//! (covered by a master-slave constraint) are excluded from the free
//! numbering but remain known to the registry so the builder can
//! eliminate them.

use std::collections::{BTreeSet, HashMap};

use log::debug;

use crate::error::{Error, Result};
use crate::fem::constraints::ConstraintStore;
use crate::model::{DofKey, ModelPart, SubPart};

/// Classification of one Dof within the current numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DofStatus {
    /// Free unknown with its equation id.
    Free(usize),
    /// Dirichlet-fixed: removed from the active set.
    Fixed,
    /// Slave of a master-slave constraint: eliminated to its masters.
    Slave,
}

/// Equation numbering for one assembly pass.
///
/// Invariant: free equation ids form the contiguous range
/// `0..free_count()`, assigned in (node, variable) order, and
/// `free_count() == total_count() - fixed_count() - slave_count()`.
#[derive(Debug)]
pub struct DofRegistry {
    status: HashMap<DofKey, DofStatus>,
    free: Vec<DofKey>,
    n_fixed: usize,
    n_slave: usize,
}

impl DofRegistry {
    /// Build the numbering from the Dof lists of the scoped entities.
    ///
    /// Must be rebuilt whenever the active Dof set changes (fixity
    /// changes, constraints added or removed, scope changes).
    ///
    /// # Errors
    /// Fails fast with [`Error::UnregisteredDof`] if any entity
    /// references a variable not registered on the model part.
    pub fn build(
        model: &ModelPart,
        scope: Option<&SubPart>,
        stores: &[&ConstraintStore],
    ) -> Result<Self> {
        let mut keys = BTreeSet::new();

        for entity in model
            .scoped_elements(scope)
            .into_iter()
            .chain(model.scoped_conditions(scope))
        {
            for key in entity.dof_list() {
                if !model.is_registered(key.variable) {
                    return Err(Error::UnregisteredDof {
                        node: key.node,
                        variable: key.variable,
                    });
                }
                if key.node >= model.num_nodes() {
                    return Err(Error::Topology(format!(
                        "entity {} references node {} outside the node table ({} nodes)",
                        entity.id(),
                        key.node,
                        model.num_nodes()
                    )));
                }
                keys.insert(key);
            }
        }

        let mut status = HashMap::with_capacity(keys.len());
        let mut free = Vec::new();
        let mut n_fixed = 0;
        let mut n_slave = 0;

        for key in keys {
            let entry = if stores.iter().any(|s| s.is_slave(key)) {
                n_slave += 1;
                DofStatus::Slave
            } else if model.node(key.node).is_fixed(key.variable) {
                n_fixed += 1;
                DofStatus::Fixed
            } else {
                free.push(key);
                DofStatus::Free(free.len() - 1)
            };
            status.insert(key, entry);
        }

        debug!(
            "dof numbering: {} free, {} fixed, {} slave",
            free.len(),
            n_fixed,
            n_slave
        );

        Ok(Self {
            status,
            free,
            n_fixed,
            n_slave,
        })
    }

    /// Status of `key` within this numbering.
    ///
    /// # Errors
    /// Fails if the Dof never appeared in any entity's Dof list.
    pub fn status_of(&self, key: DofKey) -> Result<DofStatus> {
        self.status.get(&key).copied().ok_or(Error::UnregisteredDof {
            node: key.node,
            variable: key.variable,
        })
    }

    /// Free Dofs in equation-id order.
    pub fn free_dofs(&self) -> impl Iterator<Item = (usize, DofKey)> + '_ {
        self.free.iter().copied().enumerate()
    }

    /// All numbered Dofs with their status.
    pub fn all_dofs(&self) -> impl Iterator<Item = (&DofKey, &DofStatus)> {
        self.status.iter()
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    pub fn fixed_count(&self) -> usize {
        self.n_fixed
    }

    pub fn slave_count(&self) -> usize {
        self.n_slave
    }

    pub fn total_count(&self) -> usize {
        self.status.len()
    }
}
