pub mod criteria;
pub mod mesh_moving;
pub mod solving;

pub use criteria::{ConvergenceCriterion, IncrementNormCriterion, ResidualNormCriterion};
pub use mesh_moving::MeshMovingStrategy;
pub use solving::{SolveReport, SolvingStrategy, StrategyConfig};
