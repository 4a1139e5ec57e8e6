//! Multi-physics finite-element solving core.
//!
//! This crate is the builder-and-solver / solving-strategy layer of an
//! FEA framework: it takes a discretized model (nodes, elements,
//! conditions, degrees of freedom), assembles the global sparse linear
//! system from per-element contributions, applies constraints
//! (Dirichlet fixities and master-slave relations), invokes a linear
//! solver and feeds the result back into the model state through a
//! time-integration scheme.
//!
//! Element physics kernels are external collaborators consumed through
//! the narrow [`model::Element`] trait; the crate ships only the
//! minimal concrete entities needed to exercise the core.

pub mod config;
pub mod coupling;
pub mod error;
pub mod fem;
pub mod linalg;
pub mod model;
pub mod strategy;

pub use config::CoreConfig;
pub use coupling::{ChimeraConfig, ChimeraCoupling, CouplingType, PointLocator, PressureCoupling};
pub use error::{Error, Result};
pub use fem::{BdfScheme, BuilderAndSolver, ConstraintStore, DofRegistry, DofStatus, StaticScheme, TimeIntegrator};
pub use linalg::{ConjugateGradient, DirectSolver, LinearSolver, SolverStats};
pub use model::{
    BarElement, BdfCoefficients, DofKey, DofVariable, Element, MeshMotionElement, ModelPart, Node,
    PointLoadCondition, ProcessContext, SubPart, SurfaceCondition,
};
pub use strategy::{
    ConvergenceCriterion, IncrementNormCriterion, MeshMovingStrategy, ResidualNormCriterion,
    SolveReport, SolvingStrategy, StrategyConfig,
};
