//! Nodal solution variables and Dof identification.

use serde::{Deserialize, Serialize};

/// Number of buffered variables stored per node.
pub const VARIABLE_COUNT: usize = 16;

/// One scalar nodal variable.
///
/// Vector quantities (displacement, velocity, ...) are stored as their
/// X/Y/Z components so a Dof is always a single scalar unknown.
#[repr(usize)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DofVariable {
    DisplacementX = 0,
    DisplacementY = 1,
    DisplacementZ = 2,
    VelocityX = 3,
    VelocityY = 4,
    VelocityZ = 5,
    AccelerationX = 6,
    AccelerationY = 7,
    AccelerationZ = 8,
    Pressure = 9,
    MeshDisplacementX = 10,
    MeshDisplacementY = 11,
    MeshDisplacementZ = 12,
    MeshVelocityX = 13,
    MeshVelocityY = 14,
    MeshVelocityZ = 15,
}

impl DofVariable {
    /// All variables in storage order.
    pub const ALL: [DofVariable; VARIABLE_COUNT] = [
        DofVariable::DisplacementX,
        DofVariable::DisplacementY,
        DofVariable::DisplacementZ,
        DofVariable::VelocityX,
        DofVariable::VelocityY,
        DofVariable::VelocityZ,
        DofVariable::AccelerationX,
        DofVariable::AccelerationY,
        DofVariable::AccelerationZ,
        DofVariable::Pressure,
        DofVariable::MeshDisplacementX,
        DofVariable::MeshDisplacementY,
        DofVariable::MeshDisplacementZ,
        DofVariable::MeshVelocityX,
        DofVariable::MeshVelocityY,
        DofVariable::MeshVelocityZ,
    ];

    /// Buffer slot of this variable.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Spatial component (0/1/2) for vector families; 0 for scalars.
    pub fn component(self) -> usize {
        use DofVariable::*;
        match self {
            DisplacementX | VelocityX | AccelerationX | MeshDisplacementX | MeshVelocityX => 0,
            DisplacementY | VelocityY | AccelerationY | MeshDisplacementY | MeshVelocityY => 1,
            DisplacementZ | VelocityZ | AccelerationZ | MeshDisplacementZ | MeshVelocityZ => 2,
            Pressure => 0,
        }
    }

    /// Displacement component for the given spatial direction.
    pub fn displacement(component: usize) -> Self {
        debug_assert!(component < 3);
        Self::ALL[component]
    }

    /// Velocity component for the given spatial direction.
    pub fn velocity(component: usize) -> Self {
        debug_assert!(component < 3);
        Self::ALL[3 + component]
    }

    /// Acceleration component for the given spatial direction.
    pub fn acceleration(component: usize) -> Self {
        debug_assert!(component < 3);
        Self::ALL[6 + component]
    }

    /// Mesh-displacement component for the given spatial direction.
    pub fn mesh_displacement(component: usize) -> Self {
        debug_assert!(component < 3);
        Self::ALL[10 + component]
    }

    /// Mesh-velocity component for the given spatial direction.
    pub fn mesh_velocity(component: usize) -> Self {
        debug_assert!(component < 3);
        Self::ALL[13 + component]
    }

    /// First time derivative of this variable, if one is buffered.
    ///
    /// Displacement -> velocity -> acceleration; mesh displacement ->
    /// mesh velocity. Scalars such as pressure have no derivative chain.
    pub fn time_derivative(self) -> Option<Self> {
        match self {
            DofVariable::DisplacementX => Some(DofVariable::VelocityX),
            DofVariable::DisplacementY => Some(DofVariable::VelocityY),
            DofVariable::DisplacementZ => Some(DofVariable::VelocityZ),
            DofVariable::VelocityX => Some(DofVariable::AccelerationX),
            DofVariable::VelocityY => Some(DofVariable::AccelerationY),
            DofVariable::VelocityZ => Some(DofVariable::AccelerationZ),
            DofVariable::MeshDisplacementX => Some(DofVariable::MeshVelocityX),
            DofVariable::MeshDisplacementY => Some(DofVariable::MeshVelocityY),
            DofVariable::MeshDisplacementZ => Some(DofVariable::MeshVelocityZ),
            _ => None,
        }
    }
}

/// Identifies one scalar unknown: a (node, variable) pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DofKey {
    pub node: usize,
    pub variable: DofVariable,
}

impl DofKey {
    pub fn new(node: usize, variable: DofVariable) -> Self {
        Self { node, variable }
    }
}
