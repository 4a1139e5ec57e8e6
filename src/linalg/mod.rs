pub mod direct;
pub mod iterative;
pub mod solver;

pub use direct::DirectSolver;
pub use iterative::ConjugateGradient;
pub use solver::{LinearSolver, SolverStats};
