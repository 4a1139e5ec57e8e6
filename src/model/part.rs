//! Model part: the owner of nodes, elements and conditions.

use std::fs;
use std::path::Path;

use log::info;
use nalgebra::Point3;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::elements::Element;
use crate::model::node::Node;
use crate::model::variables::DofVariable;

/// The full mesh of one physical domain.
///
/// The model part exclusively owns its node table. Derived views
/// ([`SubPart`]) hold indices into that table, never copies, so a node
/// updated through the solution loop is seen by every view.
pub struct ModelPart {
    pub name: String,
    nodes: Vec<Node>,
    elements: Vec<Box<dyn Element>>,
    conditions: Vec<Box<dyn Element>>,
    registered: Vec<DofVariable>,
    buffer_size: usize,
}

/// Non-owning view over a subset of a model part.
///
/// Used for boundary regions, overlapping-mesh patches and the shadow
/// mesh-motion part. Indices refer to the owning [`ModelPart`] tables.
#[derive(Debug, Clone, Default)]
pub struct SubPart {
    pub name: String,
    pub nodes: Vec<usize>,
    pub elements: Vec<usize>,
    pub conditions: Vec<usize>,
}

impl SubPart {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }
}

#[derive(Serialize, Deserialize)]
struct NodeCheckpoint {
    id: usize,
    coords: [f64; 3],
    reference: [f64; 3],
}

#[derive(Serialize, Deserialize)]
struct ModelCheckpoint {
    name: String,
    buffer_size: usize,
    nodes: Vec<NodeCheckpoint>,
}

impl ModelPart {
    /// Create an empty model part with the given history buffer depth.
    pub fn new(name: &str, buffer_size: usize) -> Self {
        assert!(buffer_size >= 1, "buffer size must be at least 1, got {}", buffer_size);

        Self {
            name: name.to_string(),
            nodes: Vec::new(),
            elements: Vec::new(),
            conditions: Vec::new(),
            registered: Vec::new(),
            buffer_size,
        }
    }

    /// Register a solution variable; Dofs of unregistered variables are
    /// rejected during system setup.
    pub fn register_variable(&mut self, variable: DofVariable) {
        if !self.registered.contains(&variable) {
            self.registered.push(variable);
        }
    }

    /// Whether `variable` has been registered on this model part.
    pub fn is_registered(&self, variable: DofVariable) -> bool {
        self.registered.contains(&variable)
    }

    /// Append a node; returns its id.
    pub fn add_node(&mut self, coords: Point3<f64>) -> usize {
        let id = self.nodes.len();
        self.nodes.push(Node::new(id, coords, self.buffer_size));
        id
    }

    /// Append an element; returns its index.
    pub fn add_element(&mut self, element: Box<dyn Element>) -> usize {
        self.elements.push(element);
        self.elements.len() - 1
    }

    /// Append a condition; returns its index.
    pub fn add_condition(&mut self, condition: Box<dyn Element>) -> usize {
        self.conditions.push(condition);
        self.conditions.len() - 1
    }

    pub fn node(&self, id: usize) -> &Node {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: usize) -> &mut Node {
        &mut self.nodes[id]
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn nodes_mut(&mut self) -> &mut [Node] {
        &mut self.nodes
    }

    pub fn elements(&self) -> &[Box<dyn Element>] {
        &self.elements
    }

    pub fn conditions(&self) -> &[Box<dyn Element>] {
        &self.conditions
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Elements selected by `scope`, or all elements when `scope` is `None`.
    pub fn scoped_elements(&self, scope: Option<&SubPart>) -> Vec<&dyn Element> {
        match scope {
            Some(part) => part.elements.iter().map(|&i| self.elements[i].as_ref()).collect(),
            None => self.elements.iter().map(|e| e.as_ref()).collect(),
        }
    }

    /// Conditions selected by `scope`, or all conditions when `scope` is `None`.
    pub fn scoped_conditions(&self, scope: Option<&SubPart>) -> Vec<&dyn Element> {
        match scope {
            Some(part) => part.conditions.iter().map(|&i| self.conditions[i].as_ref()).collect(),
            None => self.conditions.iter().map(|c| c.as_ref()).collect(),
        }
    }

    /// Collect a sub-part of all nodes satisfying `predicate`.
    pub fn sub_part_where<F>(&self, name: &str, predicate: F) -> SubPart
    where
        F: Fn(&Node) -> bool,
    {
        let mut part = SubPart::new(name);
        part.nodes = self
            .nodes
            .iter()
            .filter(|n| predicate(n))
            .map(|n| n.id)
            .collect();
        part
    }

    /// Start a new solution step: rotate every node's history buffer.
    pub fn advance_solution_step(&mut self) {
        for node in &mut self.nodes {
            node.advance_step();
        }
    }

    /// Reset current coordinates to the reference configuration.
    pub fn reset_to_reference(&mut self) {
        for node in &mut self.nodes {
            node.coords = node.reference;
        }
    }

    /// Commit `reference + mesh displacement` as the new coordinates.
    pub fn commit_mesh_displacement(&mut self) {
        for node in &mut self.nodes {
            let d = node.vector_value(DofVariable::mesh_displacement, 0);
            node.coords = node.reference + d;
        }
    }

    /// Re-baseline the reference configuration to the current one.
    pub fn update_reference(&mut self) {
        for node in &mut self.nodes {
            node.reference = node.coords;
        }
    }

    /// Persist the base state (node ids and geometry) as JSON.
    ///
    /// Derived numeric state (solution buffers, flags, constraint data)
    /// is deliberately not part of the checkpoint; restoring it is each
    /// component's own responsibility.
    pub fn save_checkpoint<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let checkpoint = ModelCheckpoint {
            name: self.name.clone(),
            buffer_size: self.buffer_size,
            nodes: self
                .nodes
                .iter()
                .map(|n| NodeCheckpoint {
                    id: n.id,
                    coords: [n.coords.x, n.coords.y, n.coords.z],
                    reference: [n.reference.x, n.reference.y, n.reference.z],
                })
                .collect(),
        };
        let json = serde_json::to_string_pretty(&checkpoint)
            .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
        fs::write(path, json)?;
        info!("checkpoint of model part '{}' written ({} nodes)", self.name, self.nodes.len());
        Ok(())
    }

    /// Rebuild a model part from a checkpoint written by
    /// [`save_checkpoint`](Self::save_checkpoint). Elements, conditions
    /// and registered variables must be re-attached by the caller.
    pub fn load_checkpoint<P: AsRef<Path>>(path: P) -> Result<ModelPart> {
        let json = fs::read_to_string(path)?;
        let checkpoint: ModelCheckpoint = serde_json::from_str(&json)
            .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;

        let mut model = ModelPart::new(&checkpoint.name, checkpoint.buffer_size);
        for entry in checkpoint.nodes {
            let id = model.add_node(Point3::new(entry.coords[0], entry.coords[1], entry.coords[2]));
            if id != entry.id {
                return Err(Error::Topology(format!(
                    "checkpoint node ids are not dense: expected {}, got {}",
                    id, entry.id
                )));
            }
            model.node_mut(id).reference =
                Point3::new(entry.reference[0], entry.reference[1], entry.reference[2]);
        }
        Ok(model)
    }
}
