//! Element and condition interfaces.
//!
//! The solving core treats element physics as an opaque numeric
//! provider: an entity exposes the Dofs it governs and produces local
//! matrices/vectors on demand. The right-hand side is returned in
//! residual form (`f_ext - K*u`), so the assembled system solves for a
//! solution increment.
//!
//! The concrete types in this module are the minimal collaborators the
//! core needs to be exercised end-to-end: an axial bar, a point load, a
//! synthetic mesh-deformation spring and a bare interface facet.

use nalgebra::{DMatrix, DVector};

use crate::error::{Error, Result};
use crate::model::context::ProcessContext;
use crate::model::part::ModelPart;
use crate::model::variables::{DofKey, DofVariable};

/// One assembled entity: an element or a boundary condition.
pub trait Element: Send + Sync {
    /// Entity identifier.
    fn id(&self) -> usize;

    /// Node ids of the entity's geometry, in local order.
    fn node_ids(&self) -> &[usize];

    /// Dofs governed by this entity, aligned with the local system rows.
    fn dof_list(&self) -> Vec<DofKey>;

    /// Local stiffness matrix and residual right-hand side.
    fn calculate_local_system(
        &self,
        model: &ModelPart,
        ctx: &ProcessContext,
    ) -> Result<(DMatrix<f64>, DVector<f64>)>;

    /// Local mass matrix (zero by default for quasi-static entities).
    fn calculate_mass_matrix(&self, _model: &ModelPart) -> DMatrix<f64> {
        let n = self.dof_list().len();
        DMatrix::zeros(n, n)
    }

    /// Local damping matrix (zero by default).
    fn calculate_damping_matrix(&self, _model: &ModelPart) -> DMatrix<f64> {
        let n = self.dof_list().len();
        DMatrix::zeros(n, n)
    }
}

/// Two-node axial bar (1D, displacement along x).
#[derive(Debug, Clone)]
pub struct BarElement {
    pub id: usize,
    nodes: [usize; 2],
    pub youngs_modulus: f64,
    pub area: f64,
    pub density: f64,
}

impl BarElement {
    pub fn new(id: usize, nodes: [usize; 2], youngs_modulus: f64, area: f64) -> Self {
        Self {
            id,
            nodes,
            youngs_modulus,
            area,
            density: 0.0,
        }
    }

    pub fn with_density(mut self, density: f64) -> Self {
        self.density = density;
        self
    }

    fn length(&self, model: &ModelPart) -> Result<f64> {
        let a = model.node(self.nodes[0]).reference;
        let b = model.node(self.nodes[1]).reference;
        let length = (b - a).norm();
        if length <= 0.0 {
            return Err(Error::Topology(format!(
                "bar element {} has zero length (nodes {} and {})",
                self.id, self.nodes[0], self.nodes[1]
            )));
        }
        Ok(length)
    }
}

impl Element for BarElement {
    fn id(&self) -> usize {
        self.id
    }

    fn node_ids(&self) -> &[usize] {
        &self.nodes
    }

    fn dof_list(&self) -> Vec<DofKey> {
        self.nodes
            .iter()
            .map(|&n| DofKey::new(n, DofVariable::DisplacementX))
            .collect()
    }

    fn calculate_local_system(
        &self,
        model: &ModelPart,
        _ctx: &ProcessContext,
    ) -> Result<(DMatrix<f64>, DVector<f64>)> {
        let k = self.youngs_modulus * self.area / self.length(model)?;

        let mut lhs = DMatrix::zeros(2, 2);
        lhs[(0, 0)] = k;
        lhs[(0, 1)] = -k;
        lhs[(1, 0)] = -k;
        lhs[(1, 1)] = k;

        let u = DVector::from_iterator(
            2,
            self.nodes
                .iter()
                .map(|&n| model.node(n).value(DofVariable::DisplacementX, 0)),
        );
        let rhs = -&lhs * u;

        Ok((lhs, rhs))
    }

    fn calculate_mass_matrix(&self, model: &ModelPart) -> DMatrix<f64> {
        // Lumped mass; zero-length geometry already fails the stiffness path.
        let length = self.length(model).unwrap_or(0.0);
        let half = 0.5 * self.density * self.area * length;
        DMatrix::from_diagonal_element(2, 2, half)
    }
}

/// Nodal point load on a single Dof.
#[derive(Debug, Clone)]
pub struct PointLoadCondition {
    pub id: usize,
    node: [usize; 1],
    pub variable: DofVariable,
    pub value: f64,
}

impl PointLoadCondition {
    pub fn new(id: usize, node: usize, variable: DofVariable, value: f64) -> Self {
        Self {
            id,
            node: [node],
            variable,
            value,
        }
    }
}

impl Element for PointLoadCondition {
    fn id(&self) -> usize {
        self.id
    }

    fn node_ids(&self) -> &[usize] {
        &self.node
    }

    fn dof_list(&self) -> Vec<DofKey> {
        vec![DofKey::new(self.node[0], self.variable)]
    }

    fn calculate_local_system(
        &self,
        _model: &ModelPart,
        _ctx: &ProcessContext,
    ) -> Result<(DMatrix<f64>, DVector<f64>)> {
        Ok((DMatrix::zeros(1, 1), DVector::from_element(1, self.value)))
    }
}

/// Two-node synthetic spring used by the mesh-moving strategy.
///
/// The spring stiffness scales with the inverse reference length, so
/// short edges resist deformation harder and the mesh quality is
/// preserved near refined regions.
#[derive(Debug, Clone)]
pub struct MeshMotionElement {
    pub id: usize,
    nodes: [usize; 2],
    pub stiffness: f64,
}

impl MeshMotionElement {
    pub fn new(id: usize, nodes: [usize; 2], stiffness: f64) -> Self {
        Self { id, nodes, stiffness }
    }
}

impl Element for MeshMotionElement {
    fn id(&self) -> usize {
        self.id
    }

    fn node_ids(&self) -> &[usize] {
        &self.nodes
    }

    fn dof_list(&self) -> Vec<DofKey> {
        let mut dofs = Vec::with_capacity(6);
        for &n in &self.nodes {
            for comp in 0..3 {
                dofs.push(DofKey::new(n, DofVariable::mesh_displacement(comp)));
            }
        }
        dofs
    }

    fn calculate_local_system(
        &self,
        model: &ModelPart,
        _ctx: &ProcessContext,
    ) -> Result<(DMatrix<f64>, DVector<f64>)> {
        let a = model.node(self.nodes[0]).reference;
        let b = model.node(self.nodes[1]).reference;
        let length = (b - a).norm();
        if length <= 0.0 {
            return Err(Error::Topology(format!(
                "mesh motion element {} has zero reference length",
                self.id
            )));
        }
        let k = self.stiffness / length;

        let mut lhs = DMatrix::zeros(6, 6);
        for comp in 0..3 {
            lhs[(comp, comp)] = k;
            lhs[(comp, 3 + comp)] = -k;
            lhs[(3 + comp, comp)] = -k;
            lhs[(3 + comp, 3 + comp)] = k;
        }

        let u = DVector::from_iterator(
            6,
            self.nodes.iter().flat_map(|&n| {
                (0..3).map(move |comp| (n, comp))
            })
            .map(|(n, comp)| model.node(n).value(DofVariable::mesh_displacement(comp), 0)),
        );
        let rhs = -&lhs * u;

        Ok((lhs, rhs))
    }
}

/// Bare boundary facet (2-node edge or 3-node triangle).
///
/// Carries geometry only: the coupling layer uses it to compute
/// interface normals and nodal masses. It governs no Dofs.
#[derive(Debug, Clone)]
pub struct SurfaceCondition {
    pub id: usize,
    nodes: Vec<usize>,
}

impl SurfaceCondition {
    pub fn new(id: usize, nodes: Vec<usize>) -> Self {
        Self { id, nodes }
    }
}

impl Element for SurfaceCondition {
    fn id(&self) -> usize {
        self.id
    }

    fn node_ids(&self) -> &[usize] {
        &self.nodes
    }

    fn dof_list(&self) -> Vec<DofKey> {
        Vec::new()
    }

    fn calculate_local_system(
        &self,
        _model: &ModelPart,
        _ctx: &ProcessContext,
    ) -> Result<(DMatrix<f64>, DVector<f64>)> {
        Ok((DMatrix::zeros(0, 0), DVector::zeros(0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Point3;

    fn two_node_model() -> ModelPart {
        let mut model = ModelPart::new("bar", 2);
        model.register_variable(DofVariable::DisplacementX);
        model.add_node(Point3::new(0.0, 0.0, 0.0));
        model.add_node(Point3::new(2.0, 0.0, 0.0));
        model
    }

    #[test]
    fn test_bar_stiffness() {
        let model = two_node_model();
        let bar = BarElement::new(0, [0, 1], 100.0, 0.5);
        let ctx = ProcessContext::new(1.0);

        let (lhs, rhs) = bar.calculate_local_system(&model, &ctx).unwrap();

        // k = E*A/L = 100*0.5/2 = 25
        assert_relative_eq!(lhs[(0, 0)], 25.0);
        assert_relative_eq!(lhs[(0, 1)], -25.0);
        assert_relative_eq!(rhs[0], 0.0);
        assert_relative_eq!(rhs[1], 0.0);
    }

    #[test]
    fn test_bar_residual_accounts_for_current_state() {
        let mut model = two_node_model();
        model
            .node_mut(1)
            .set_value(DofVariable::DisplacementX, 0, 0.1);
        let bar = BarElement::new(0, [0, 1], 100.0, 0.5);
        let ctx = ProcessContext::new(1.0);

        let (_, rhs) = bar.calculate_local_system(&model, &ctx).unwrap();
        assert_relative_eq!(rhs[0], 2.5);
        assert_relative_eq!(rhs[1], -2.5);
    }

    #[test]
    fn test_bar_zero_length_is_topology_error() {
        let mut model = ModelPart::new("degenerate", 1);
        model.register_variable(DofVariable::DisplacementX);
        model.add_node(Point3::origin());
        model.add_node(Point3::origin());
        let bar = BarElement::new(0, [0, 1], 1.0, 1.0);
        let ctx = ProcessContext::new(1.0);

        assert!(bar.calculate_local_system(&model, &ctx).is_err());
    }

    #[test]
    fn test_lumped_mass() {
        let model = two_node_model();
        let bar = BarElement::new(0, [0, 1], 100.0, 0.5).with_density(3.0);
        let m = bar.calculate_mass_matrix(&model);
        // rho*A*L/2 = 3*0.5*2/2 = 1.5 per node
        assert_relative_eq!(m[(0, 0)], 1.5);
        assert_relative_eq!(m[(1, 1)], 1.5);
        assert_relative_eq!(m[(0, 1)], 0.0);
    }

    #[test]
    fn test_point_load() {
        let model = two_node_model();
        let load = PointLoadCondition::new(0, 1, DofVariable::DisplacementX, 7.0);
        let ctx = ProcessContext::new(1.0);
        let (lhs, rhs) = load.calculate_local_system(&model, &ctx).unwrap();
        assert_eq!(lhs.nrows(), 1);
        assert_relative_eq!(rhs[0], 7.0);
    }

    #[test]
    fn test_mesh_motion_dof_list() {
        let spring = MeshMotionElement::new(0, [0, 1], 1.0);
        let dofs = spring.dof_list();
        assert_eq!(dofs.len(), 6);
        assert_eq!(dofs[0].variable, DofVariable::MeshDisplacementX);
        assert_eq!(dofs[5].variable, DofVariable::MeshDisplacementZ);
    }

    #[test]
    fn test_surface_condition_has_no_dofs() {
        let facet = SurfaceCondition::new(0, vec![0, 1]);
        assert!(facet.dof_list().is_empty());
    }
}
