pub mod chimera;
pub mod locator;
pub mod normals;

pub use chimera::{ChimeraConfig, ChimeraCoupling, CouplingType, PressureCoupling, Side};
pub use locator::{LocatedPoint, PointLocator};
pub use normals::calculate_nodal_normals_and_mass;
