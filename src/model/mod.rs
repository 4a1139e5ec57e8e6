pub mod context;
pub mod elements;
pub mod node;
pub mod part;
pub mod variables;

pub use context::{BdfCoefficients, ProcessContext};
pub use elements::{BarElement, Element, MeshMotionElement, PointLoadCondition, SurfaceCondition};
pub use node::Node;
pub use part::{ModelPart, SubPart};
pub use variables::{DofKey, DofVariable, VARIABLE_COUNT};
