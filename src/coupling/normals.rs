//! Interface normals and nodal masses.
//!
//! The conservative coupling variant needs, per interface node, an
//! outward nodal normal and a lumped nodal mass (the node's share of
//! the facet areas). Both are accumulated from the boundary conditions
//! (2-node edges in 2D, 3-node triangles in 3D) of the interface
//! sub-part.

use nalgebra::Vector3;

use crate::error::{Error, Result};
use crate::model::{ModelPart, SubPart};

/// Reset and recompute nodal normals and masses on the interface.
///
/// Facet normals are oriented away from the interface centroid and
/// flipped by `sign` (+1 for the patch boundary, -1 for the hole
/// boundary, matching the two sides of an overlap region). Each facet
/// distributes `normal / n_nodes` and `|normal| / n_nodes` to its
/// nodes.
pub fn calculate_nodal_normals_and_mass(
    model: &mut ModelPart,
    boundary: &SubPart,
    sign: f64,
) -> Result<()> {
    if boundary.conditions.is_empty() {
        return Err(Error::Topology(format!(
            "interface '{}' has no boundary conditions to compute normals from",
            boundary.name
        )));
    }

    for &node_id in &boundary.nodes {
        let node = model.node_mut(node_id);
        node.normal = Vector3::zeros();
        node.nodal_mass = 0.0;
    }

    // Interface centroid, used to orient facet normals outward.
    let mut centre = Vector3::zeros();
    for &node_id in &boundary.nodes {
        centre += model.node(node_id).coords.coords;
    }
    if boundary.nodes.is_empty() {
        return Err(Error::Topology(format!(
            "interface '{}' has no nodes",
            boundary.name
        )));
    }
    centre /= boundary.nodes.len() as f64;

    for &cond_idx in &boundary.conditions {
        let geometry: Vec<usize> = model.conditions()[cond_idx].node_ids().to_vec();
        let normal = facet_normal(model, &geometry, &centre)? * sign;

        let coeff = 1.0 / geometry.len() as f64;
        let mass = normal.norm();
        for &node_id in &geometry {
            let node = model.node_mut(node_id);
            node.normal += coeff * normal;
            node.nodal_mass += coeff * mass;
        }
    }

    Ok(())
}

/// Outward facet normal: edge normal `(dy, -dx)` in 2D, half cross
/// product in 3D, flipped if it points toward the centroid.
fn facet_normal(
    model: &ModelPart,
    geometry: &[usize],
    centre: &Vector3<f64>,
) -> Result<Vector3<f64>> {
    let p0 = model.node(geometry[0]).coords;

    let mut normal = match geometry.len() {
        2 => {
            let p1 = model.node(geometry[1]).coords;
            Vector3::new(p1.y - p0.y, -(p1.x - p0.x), 0.0)
        }
        3 => {
            let p1 = model.node(geometry[1]).coords;
            let p2 = model.node(geometry[2]).coords;
            0.5 * (p1 - p0).cross(&(p2 - p0))
        }
        n => {
            return Err(Error::Topology(format!(
                "interface facets must have 2 or 3 nodes, got {}",
                n
            )))
        }
    };

    if normal.norm() <= 0.0 {
        return Err(Error::Numeric(format!(
            "zero-norm normal on interface facet with first node {}",
            geometry[0]
        )));
    }

    let to_facet = p0.coords - centre;
    if normal.dot(&to_facet) < 0.0 {
        normal = -normal;
    }
    Ok(normal)
}
