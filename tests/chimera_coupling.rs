//! Overlapping-mesh coupling scenarios: a patch square embedded in a
//! background square, coupled through interpolated master-slave
//! constraints in both directions.

use approx::assert_relative_eq;
use nalgebra::{DMatrix, DVector, Point3};

use fea_core::{
    ChimeraConfig, ChimeraCoupling, CouplingType, DofKey, DofRegistry, DofVariable, Element,
    ModelPart, PressureCoupling, ProcessContext, SubPart, SurfaceCondition,
};

/// Stand-in physics kernel: carries the velocity and pressure Dofs of a
/// triangle without contributing a local system. The coupling layer
/// only needs the Dof lists and geometry.
struct VelocityTriangle {
    id: usize,
    nodes: [usize; 3],
}

impl Element for VelocityTriangle {
    fn id(&self) -> usize {
        self.id
    }

    fn node_ids(&self) -> &[usize] {
        &self.nodes
    }

    fn dof_list(&self) -> Vec<DofKey> {
        let mut dofs = Vec::with_capacity(9);
        for &n in &self.nodes {
            dofs.push(DofKey::new(n, DofVariable::VelocityX));
            dofs.push(DofKey::new(n, DofVariable::VelocityY));
            dofs.push(DofKey::new(n, DofVariable::Pressure));
        }
        dofs
    }

    fn calculate_local_system(
        &self,
        _model: &ModelPart,
        _ctx: &ProcessContext,
    ) -> fea_core::Result<(DMatrix<f64>, DVector<f64>)> {
        let n = 9;
        Ok((DMatrix::identity(n, n), DVector::zeros(n)))
    }
}

struct Overlap {
    model: ModelPart,
    background: SubPart,
    patch: SubPart,
    patch_boundary: SubPart,
    hole_boundary: SubPart,
}

/// Background square [0,2]^2 and patch square [0.5,1.5]^2, each split
/// into two triangles; the patch boundary edge and a hole boundary edge
/// live strictly inside the other region.
fn build_overlap() -> Overlap {
    let mut model = ModelPart::new("overlap", 2);
    for var in [
        DofVariable::VelocityX,
        DofVariable::VelocityY,
        DofVariable::Pressure,
    ] {
        model.register_variable(var);
    }

    // Background nodes 0-3.
    model.add_node(Point3::new(0.0, 0.0, 0.0));
    model.add_node(Point3::new(2.0, 0.0, 0.0));
    model.add_node(Point3::new(2.0, 2.0, 0.0));
    model.add_node(Point3::new(0.0, 2.0, 0.0));
    // Patch nodes 4-7.
    model.add_node(Point3::new(0.5, 0.5, 0.0));
    model.add_node(Point3::new(1.5, 0.5, 0.0));
    model.add_node(Point3::new(1.5, 1.5, 0.0));
    model.add_node(Point3::new(0.5, 1.5, 0.0));
    // Hole boundary nodes 8-9 (background side of the overlap).
    model.add_node(Point3::new(0.8, 0.8, 0.0));
    model.add_node(Point3::new(1.2, 0.8, 0.0));

    let mut background = SubPart::new("background");
    background.elements.push(model.add_element(Box::new(VelocityTriangle {
        id: 0,
        nodes: [0, 1, 2],
    })));
    background.elements.push(model.add_element(Box::new(VelocityTriangle {
        id: 1,
        nodes: [0, 2, 3],
    })));

    let mut patch = SubPart::new("patch");
    patch.elements.push(model.add_element(Box::new(VelocityTriangle {
        id: 2,
        nodes: [4, 5, 6],
    })));
    patch.elements.push(model.add_element(Box::new(VelocityTriangle {
        id: 3,
        nodes: [4, 6, 7],
    })));

    // Remnant background element around the hole; it carries the Dofs
    // of the hole boundary nodes but takes part in no search scope.
    model.add_element(Box::new(VelocityTriangle {
        id: 4,
        nodes: [8, 9, 0],
    }));

    let mut patch_boundary = SubPart::new("patch_boundary");
    patch_boundary.nodes = vec![4, 5];
    patch_boundary
        .conditions
        .push(model.add_condition(Box::new(SurfaceCondition::new(0, vec![4, 5]))));

    let mut hole_boundary = SubPart::new("hole_boundary");
    hole_boundary.nodes = vec![8, 9];
    hole_boundary
        .conditions
        .push(model.add_condition(Box::new(SurfaceCondition::new(1, vec![8, 9]))));

    Overlap {
        model,
        background,
        patch,
        patch_boundary,
        hole_boundary,
    }
}

fn config(coupling_type: CouplingType) -> ChimeraConfig {
    ChimeraConfig {
        coupling_type,
        pressure_coupling: PressureCoupling::All,
        pressure_node: None,
        overlap_distance: 0.05,
        dim: 2,
    }
}

/// Impose a linear velocity field on the region corner nodes.
fn seed_linear_field(model: &mut ModelPart, nodes: &[usize]) {
    for &i in nodes {
        let p = model.node(i).coords;
        model
            .node_mut(i)
            .set_value(DofVariable::VelocityX, 0, 1.0 + 2.0 * p.x + 3.0 * p.y);
        model
            .node_mut(i)
            .set_value(DofVariable::VelocityY, 0, 0.5 - p.x);
        model.node_mut(i).set_value(DofVariable::Pressure, 0, 4.0 * p.y);
    }
}

#[test]
fn nearest_element_couples_both_directions() {
    let mut overlap = build_overlap();
    seed_linear_field(&mut overlap.model, &[0, 1, 2, 3, 4, 5, 6, 7]);

    let mut chimera = ChimeraCoupling::new(config(CouplingType::NearestElement)).unwrap();
    chimera
        .formulate(
            &mut overlap.model,
            &overlap.patch_boundary,
            &overlap.background,
            &overlap.hole_boundary,
            &overlap.patch,
        )
        .unwrap();

    // Every boundary node found a host and became a slave.
    for &node in &[4usize, 5] {
        assert!(overlap.model.node(node).visited);
        assert!(chimera
            .patch_velocity
            .is_slave(DofKey::new(node, DofVariable::VelocityX)));
        assert!(chimera
            .patch_pressure
            .is_slave(DofKey::new(node, DofVariable::Pressure)));
    }
    for &node in &[8usize, 9] {
        assert!(chimera
            .background_velocity
            .is_slave(DofKey::new(node, DofVariable::VelocityY)));
    }

    // Interpolated seed reproduces the linear background field at the
    // patch boundary, in both buffer slots.
    let p = overlap.model.node(4).coords;
    let expected = 1.0 + 2.0 * p.x + 3.0 * p.y;
    assert_relative_eq!(
        overlap.model.node(4).value(DofVariable::VelocityX, 0),
        expected,
        epsilon = 1e-12
    );
    assert_relative_eq!(
        overlap.model.node(4).value(DofVariable::VelocityX, 1),
        expected,
        epsilon = 1e-12
    );
}

#[test]
fn slave_dofs_leave_the_free_numbering() {
    let mut overlap = build_overlap();
    let mut chimera = ChimeraCoupling::new(config(CouplingType::NearestElement)).unwrap();
    chimera
        .formulate(
            &mut overlap.model,
            &overlap.patch_boundary,
            &overlap.background,
            &overlap.hole_boundary,
            &overlap.patch,
        )
        .unwrap();

    let stores = chimera.stores();
    let registry = DofRegistry::build(&overlap.model, None, &stores).unwrap();

    // 10 nodes x 3 dofs; boundary nodes 4, 5, 8, 9 are fully coupled
    // (VelocityX, VelocityY, Pressure each).
    assert_eq!(registry.total_count(), 30);
    assert_eq!(registry.slave_count(), 12);
    assert_eq!(registry.free_count(), 18);
    assert_eq!(
        registry.free_count(),
        registry.total_count() - registry.fixed_count() - registry.slave_count()
    );
}

#[test]
fn conservative_coupling_is_flux_neutral() {
    let mut overlap = build_overlap();
    seed_linear_field(&mut overlap.model, &[0, 1, 2, 3, 4, 5, 6, 7]);

    let mut chimera = ChimeraCoupling::new(config(CouplingType::Conservative)).unwrap();
    chimera
        .formulate(
            &mut overlap.model,
            &overlap.patch_boundary,
            &overlap.background,
            &overlap.hole_boundary,
            &overlap.patch,
        )
        .unwrap();

    // Sum of (nodal normal component x corrected slave value) over the
    // constrained interface dofs vanishes on each side.
    assert_relative_eq!(
        chimera.patch_velocity.normal_flux(&overlap.model),
        0.0,
        epsilon = 1e-10
    );
    assert_relative_eq!(
        chimera.background_velocity.normal_flux(&overlap.model),
        0.0,
        epsilon = 1e-10
    );
}

#[test]
fn finalize_restores_an_unconstrained_model() {
    let mut overlap = build_overlap();
    let mut chimera = ChimeraCoupling::new(config(CouplingType::NearestElement)).unwrap();
    chimera
        .formulate(
            &mut overlap.model,
            &overlap.patch_boundary,
            &overlap.background,
            &overlap.hole_boundary,
            &overlap.patch,
        )
        .unwrap();
    chimera.finalize_solution_step(&mut overlap.model);

    for store in chimera.stores() {
        assert!(store.is_empty(), "store '{}' not cleared", store.name());
    }
    for node in overlap.model.nodes() {
        assert!(!node.visited);
        assert!(!node.slave);
    }

    // With the constraints gone, the numbering is fully free again.
    let registry = DofRegistry::build(&overlap.model, None, &[]).unwrap();
    assert_eq!(registry.slave_count(), 0);
    assert_eq!(registry.free_count(), registry.total_count());
}
