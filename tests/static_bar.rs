//! End-to-end static scenario: a 2-element bar with one fixed end and a
//! unit force at the free end must reproduce the analytic displacement
//! F*L/(E*A) per element span.

use approx::assert_relative_eq;
use nalgebra::Point3;

use fea_core::{
    BarElement, DofKey, DofRegistry, DofVariable, DirectSolver, IncrementNormCriterion, ModelPart,
    PointLoadCondition, ProcessContext, SolvingStrategy, StaticScheme, StrategyConfig,
};

const YOUNGS_MODULUS: f64 = 210e9;
const AREA: f64 = 1e-4;
const FORCE: f64 = 1000.0;

fn build_bar() -> ModelPart {
    let mut model = ModelPart::new("cantilever_bar", 2);
    model.register_variable(DofVariable::DisplacementX);

    model.add_node(Point3::new(0.0, 0.0, 0.0));
    model.add_node(Point3::new(1.0, 0.0, 0.0));
    model.add_node(Point3::new(2.0, 0.0, 0.0));

    model.add_element(Box::new(BarElement::new(0, [0, 1], YOUNGS_MODULUS, AREA)));
    model.add_element(Box::new(BarElement::new(1, [1, 2], YOUNGS_MODULUS, AREA)));
    model.add_condition(Box::new(PointLoadCondition::new(
        0,
        2,
        DofVariable::DisplacementX,
        FORCE,
    )));

    model.node_mut(0).fix(DofVariable::DisplacementX);
    model
}

#[test]
fn bar_reproduces_analytic_displacement() {
    let mut model = build_bar();
    let mut ctx = ProcessContext::new(1.0);

    let mut strategy = SolvingStrategy::new(
        StaticScheme::new(),
        DirectSolver::new(),
        IncrementNormCriterion::new(1e-12, 1e-14),
        StrategyConfig {
            compute_reactions: true,
            ..Default::default()
        },
    );

    let report = strategy.solve_step(&mut model, &mut ctx, &[], None).unwrap();
    assert!(report.converged);

    // u(x) = F*x/(E*A)
    let u_mid = model.node(1).value(DofVariable::DisplacementX, 0);
    let u_tip = model.node(2).value(DofVariable::DisplacementX, 0);
    let expected_tip = FORCE * 2.0 / (YOUNGS_MODULUS * AREA);

    assert_relative_eq!(u_mid, expected_tip / 2.0, max_relative = 1e-10);
    assert_relative_eq!(u_tip, expected_tip, max_relative = 1e-10);

    // The support carries the full applied load.
    let reaction = strategy.reactions()[&DofKey::new(0, DofVariable::DisplacementX)];
    assert_relative_eq!(reaction, -FORCE, max_relative = 1e-10);
}

#[test]
fn free_equation_count_matches_dof_arithmetic() {
    let mut model = build_bar();
    model.node_mut(2).fix(DofVariable::DisplacementX);

    let registry = DofRegistry::build(&model, None, &[]).unwrap();

    assert_eq!(registry.total_count(), 3);
    assert_eq!(registry.fixed_count(), 2);
    assert_eq!(registry.slave_count(), 0);
    assert_eq!(
        registry.free_count(),
        registry.total_count() - registry.fixed_count() - registry.slave_count()
    );

    // Ids are a contiguous range starting at 0.
    let ids: Vec<usize> = registry.free_dofs().map(|(eq, _)| eq).collect();
    assert_eq!(ids, vec![0]);
}
