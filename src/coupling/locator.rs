//! Bin-based point location over simplex meshes.
//!
//! Overlapping-mesh coupling needs, for every boundary node of one
//! region, the element of the other region that encloses it plus the
//! shape-function weights at that point. A uniform bin grid over the
//! element bounding boxes keeps the search close to O(1) per query.

use nalgebra::Point3;

use crate::error::{Error, Result};
use crate::model::{ModelPart, SubPart};
use std::collections::HashMap;

/// A located point: the enclosing element, its geometry nodes and the
/// interpolation (shape-function) weights at the query point.
#[derive(Debug, Clone)]
pub struct LocatedPoint {
    pub element: usize,
    pub nodes: Vec<usize>,
    pub weights: Vec<f64>,
}

/// Uniform-grid point locator over the simplex elements of a sub-part.
pub struct PointLocator {
    dim: usize,
    cell_size: f64,
    /// (element index, geometry node ids) of every searchable simplex.
    simplices: Vec<(usize, Vec<usize>)>,
    bins: HashMap<(i64, i64, i64), Vec<usize>>,
    tolerance: f64,
}

impl PointLocator {
    /// Build the search structure over the elements of `scope`.
    ///
    /// `dim` selects the simplex type: 2 for triangles, 3 for
    /// tetrahedra (the first `dim + 1` geometry nodes are used).
    pub fn new(model: &ModelPart, scope: &SubPart, dim: usize) -> Result<Self> {
        if dim != 2 && dim != 3 {
            return Err(Error::Config(format!(
                "point locator supports dim 2 or 3, got {}",
                dim
            )));
        }

        let mut simplices = Vec::with_capacity(scope.elements.len());
        let mut mean_extent = 0.0;
        for &elem_idx in &scope.elements {
            let entity = &model.elements()[elem_idx];
            let nodes = entity.node_ids();
            if nodes.len() < dim + 1 {
                return Err(Error::Topology(format!(
                    "element {} has {} nodes, a {}-simplex needs {}",
                    entity.id(),
                    nodes.len(),
                    dim,
                    dim + 1
                )));
            }
            let geometry: Vec<usize> = nodes[..dim + 1].to_vec();
            let (lo, hi) = Self::bounding_box(model, &geometry);
            mean_extent += (hi - lo).norm();
            simplices.push((elem_idx, geometry));
        }

        if simplices.is_empty() {
            return Err(Error::Topology(
                "point locator built over an empty element set".to_string(),
            ));
        }
        let cell_size = (mean_extent / simplices.len() as f64).max(1e-12);

        let mut locator = Self {
            dim,
            cell_size,
            simplices,
            bins: HashMap::new(),
            tolerance: 1e-10,
        };
        locator.update_search_database(model);
        Ok(locator)
    }

    /// Rebuild the bins from the current node coordinates. Call after
    /// the target mesh has moved.
    pub fn update_search_database(&mut self, model: &ModelPart) {
        self.bins.clear();
        for (slot, (_, geometry)) in self.simplices.iter().enumerate() {
            let (lo, hi) = Self::bounding_box(model, geometry);
            let (i0, j0, k0) = self.cell_of(&lo);
            let (i1, j1, k1) = self.cell_of(&hi);
            for i in i0..=i1 {
                for j in j0..=j1 {
                    for k in k0..=k1 {
                        self.bins.entry((i, j, k)).or_default().push(slot);
                    }
                }
            }
        }
    }

    /// Find the simplex enclosing `point`.
    ///
    /// Returns `None` when no element encloses the point; the caller
    /// treats that as a soft condition, not an error.
    pub fn locate(&self, model: &ModelPart, point: &Point3<f64>) -> Option<LocatedPoint> {
        let candidates = self.bins.get(&self.cell_of(point))?;
        for &slot in candidates {
            let (elem_idx, ref geometry) = self.simplices[slot];
            if let Some(weights) = self.barycentric(model, geometry, point) {
                return Some(LocatedPoint {
                    element: elem_idx,
                    nodes: geometry.clone(),
                    weights,
                });
            }
        }
        None
    }

    fn bounding_box(model: &ModelPart, geometry: &[usize]) -> (Point3<f64>, Point3<f64>) {
        let first = model.node(geometry[0]).coords;
        let mut lo = first;
        let mut hi = first;
        for &n in &geometry[1..] {
            let p = model.node(n).coords;
            for c in 0..3 {
                lo[c] = lo[c].min(p[c]);
                hi[c] = hi[c].max(p[c]);
            }
        }
        (lo, hi)
    }

    fn cell_of(&self, p: &Point3<f64>) -> (i64, i64, i64) {
        (
            (p.x / self.cell_size).floor() as i64,
            (p.y / self.cell_size).floor() as i64,
            (p.z / self.cell_size).floor() as i64,
        )
    }

    /// Barycentric weights of `point` in the simplex, or `None` if the
    /// point lies outside (within tolerance) or the simplex is
    /// degenerate.
    fn barycentric(
        &self,
        model: &ModelPart,
        geometry: &[usize],
        point: &Point3<f64>,
    ) -> Option<Vec<f64>> {
        let p0 = model.node(geometry[0]).coords;

        let weights = if self.dim == 2 {
            let p1 = model.node(geometry[1]).coords;
            let p2 = model.node(geometry[2]).coords;
            let det = (p1.x - p0.x) * (p2.y - p0.y) - (p2.x - p0.x) * (p1.y - p0.y);
            if det.abs() < 1e-300 {
                return None;
            }
            let l1 = ((point.x - p0.x) * (p2.y - p0.y) - (p2.x - p0.x) * (point.y - p0.y)) / det;
            let l2 = ((p1.x - p0.x) * (point.y - p0.y) - (point.x - p0.x) * (p1.y - p0.y)) / det;
            vec![1.0 - l1 - l2, l1, l2]
        } else {
            let m = nalgebra::Matrix3::from_columns(&[
                model.node(geometry[1]).coords - p0,
                model.node(geometry[2]).coords - p0,
                model.node(geometry[3]).coords - p0,
            ]);
            let rhs = point - p0;
            let l = m.lu().solve(&rhs)?;
            vec![1.0 - l.x - l.y - l.z, l.x, l.y, l.z]
        };

        if weights.iter().all(|&w| w >= -self.tolerance) {
            Some(weights)
        } else {
            None
        }
    }
}
