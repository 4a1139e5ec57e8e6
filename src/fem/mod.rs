pub mod assembly;
pub mod constraints;
pub mod dof;
pub mod time_integration;

pub use assembly::BuilderAndSolver;
pub use constraints::{ConstraintRecord, ConstraintStore, MasterEdge};
pub use dof::{DofRegistry, DofStatus};
pub use time_integration::{BdfScheme, StaticScheme, TimeIntegrator};
