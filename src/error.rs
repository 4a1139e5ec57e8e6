//! Error types for the solving core.
//!
//! All failures are fatal for the current solution step and unwind
//! immediately; nothing is partially committed to the global system.

use thiserror::Error;

use crate::model::DofVariable;

/// Result type alias using the core [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the solving core.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid configuration detected at setup (reported with the offending value).
    #[error("configuration error: {0}")]
    Config(String),

    /// An element or condition references a Dof whose variable was never
    /// registered on the model part.
    #[error("node {node} references unregistered dof variable {variable:?}")]
    UnregisteredDof { node: usize, variable: DofVariable },

    /// Mesh/topology inconsistency (bad node index, empty geometry, ...).
    #[error("topology error: {0}")]
    Topology(String),

    /// Numeric failure during assembly or correction (zero-norm normal,
    /// non-finite entry, non-positive time step where one is required).
    #[error("numeric error: {0}")]
    Numeric(String),

    /// The linear solver reported failure (singular or ill-conditioned
    /// system, iteration budget exhausted). Never retried automatically.
    #[error("linear solver error: {0}")]
    Solver(String),

    /// I/O failure while reading configuration or checkpoint files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
