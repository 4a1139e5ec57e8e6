//! Mesh nodes with buffered solution-step values.

use nalgebra::{Point3, Vector3};

use crate::model::variables::{DofVariable, VARIABLE_COUNT};

/// A mesh node.
///
/// Holds the current and reference (original) position plus a
/// time-indexed buffer of solution-step values: `step = 0` is the
/// current step, `step = 1` the previous one, and so on up to the
/// buffer size chosen by the owning model part.
///
/// The slave/visited flags and the nodal normal/mass are working state
/// for the constraint and coupling layers; they are not part of the
/// persisted base state.
#[derive(Debug, Clone)]
pub struct Node {
    /// Node identifier (dense index into the owning model part).
    pub id: usize,
    /// Current position.
    pub coords: Point3<f64>,
    /// Reference (original) position.
    pub reference: Point3<f64>,
    /// Solution-step buffer: `buffer[step][variable]`.
    buffer: Vec<[f64; VARIABLE_COUNT]>,
    /// Per-variable Dirichlet fixity.
    fixed: [bool; VARIABLE_COUNT],
    /// Set while any constraint store holds this node's Dofs as slaves.
    pub slave: bool,
    /// Set once the coupling pass has successfully constrained this node.
    pub visited: bool,
    /// Lumped interface mass (|condition normal| share).
    pub nodal_mass: f64,
    /// Accumulated nodal normal on a coupling interface.
    pub normal: Vector3<f64>,
}

impl Node {
    /// Create a node at `coords` with `buffer_size` solution steps.
    ///
    /// # Panics
    /// Panics if `buffer_size` is zero.
    pub fn new(id: usize, coords: Point3<f64>, buffer_size: usize) -> Self {
        assert!(buffer_size >= 1, "buffer size must be at least 1, got {}", buffer_size);

        Self {
            id,
            coords,
            reference: coords,
            buffer: vec![[0.0; VARIABLE_COUNT]; buffer_size],
            fixed: [false; VARIABLE_COUNT],
            slave: false,
            visited: false,
            nodal_mass: 0.0,
            normal: Vector3::zeros(),
        }
    }

    /// Number of buffered solution steps.
    pub fn buffer_size(&self) -> usize {
        self.buffer.len()
    }

    /// Buffered value of `variable` at history position `step`.
    pub fn value(&self, variable: DofVariable, step: usize) -> f64 {
        self.buffer[step][variable.index()]
    }

    /// Set the buffered value of `variable` at history position `step`.
    pub fn set_value(&mut self, variable: DofVariable, step: usize, value: f64) {
        self.buffer[step][variable.index()] = value;
    }

    /// Mutable access to the buffered value of `variable` at `step`.
    pub fn value_mut(&mut self, variable: DofVariable, step: usize) -> &mut f64 {
        &mut self.buffer[step][variable.index()]
    }

    /// Buffered vector value of a three-component family at `step`.
    ///
    /// `family` must return the variable of a spatial component,
    /// e.g. `DofVariable::velocity`.
    pub fn vector_value(&self, family: fn(usize) -> DofVariable, step: usize) -> Vector3<f64> {
        Vector3::new(
            self.value(family(0), step),
            self.value(family(1), step),
            self.value(family(2), step),
        )
    }

    /// Fix `variable` (Dirichlet): it leaves the free equation set.
    pub fn fix(&mut self, variable: DofVariable) {
        self.fixed[variable.index()] = true;
    }

    /// Release the fixity of `variable`.
    pub fn free(&mut self, variable: DofVariable) {
        self.fixed[variable.index()] = false;
    }

    /// Whether `variable` is fixed on this node.
    pub fn is_fixed(&self, variable: DofVariable) -> bool {
        self.fixed[variable.index()]
    }

    /// Rotate the solution buffer at the start of a new step.
    ///
    /// History positions shift back by one; the current step keeps the
    /// previous values as its starting guess.
    pub fn advance_step(&mut self) {
        for step in (1..self.buffer.len()).rev() {
            self.buffer[step] = self.buffer[step - 1];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node() -> Node {
        Node::new(0, Point3::new(1.0, 2.0, 3.0), 3)
    }

    #[test]
    fn test_new_node_zero_initialized() {
        let n = node();
        assert_eq!(n.reference, n.coords);
        for step in 0..3 {
            for var in DofVariable::ALL {
                assert_eq!(n.value(var, step), 0.0);
            }
        }
        assert!(!n.slave);
        assert!(!n.visited);
    }

    #[test]
    fn test_value_roundtrip() {
        let mut n = node();
        n.set_value(DofVariable::Pressure, 0, 42.0);
        n.set_value(DofVariable::Pressure, 1, 41.0);
        assert_eq!(n.value(DofVariable::Pressure, 0), 42.0);
        assert_eq!(n.value(DofVariable::Pressure, 1), 41.0);
    }

    #[test]
    fn test_fixity_flags() {
        let mut n = node();
        assert!(!n.is_fixed(DofVariable::DisplacementX));
        n.fix(DofVariable::DisplacementX);
        assert!(n.is_fixed(DofVariable::DisplacementX));
        assert!(!n.is_fixed(DofVariable::DisplacementY));
        n.free(DofVariable::DisplacementX);
        assert!(!n.is_fixed(DofVariable::DisplacementX));
    }

    #[test]
    fn test_advance_step_shifts_history() {
        let mut n = node();
        n.set_value(DofVariable::DisplacementX, 0, 3.0);
        n.set_value(DofVariable::DisplacementX, 1, 2.0);
        n.set_value(DofVariable::DisplacementX, 2, 1.0);

        n.advance_step();

        // Current value carries forward as the starting guess.
        assert_eq!(n.value(DofVariable::DisplacementX, 0), 3.0);
        assert_eq!(n.value(DofVariable::DisplacementX, 1), 3.0);
        assert_eq!(n.value(DofVariable::DisplacementX, 2), 2.0);
    }

    #[test]
    fn test_vector_value() {
        let mut n = node();
        n.set_value(DofVariable::VelocityX, 0, 1.0);
        n.set_value(DofVariable::VelocityY, 0, 2.0);
        n.set_value(DofVariable::VelocityZ, 0, 3.0);
        let v = n.vector_value(DofVariable::velocity, 0);
        assert_eq!(v, Vector3::new(1.0, 2.0, 3.0));
    }

    #[test]
    #[should_panic(expected = "buffer size must be at least 1")]
    fn test_zero_buffer_size_panics() {
        Node::new(0, Point3::origin(), 0);
    }
}
