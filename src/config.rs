//! Configuration for the solving core.
//!
//! Reads TOML files into structured sections and validates them
//! eagerly: invalid values (non-positive overlap distance, unknown mode
//! strings, unsupported orders) are fatal at setup and reported with
//! the offending value.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::coupling::{CouplingType, PressureCoupling};
use crate::error::{Error, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CoreConfig {
    pub solver: SolverConfig,
    pub time: TimeConfig,
    pub strategy: StrategySection,
    pub coupling: CouplingSection,
}

/// Linear solver selection.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SolverConfig {
    /// "direct" or "cg".
    pub linear_solver: String,
    #[serde(default = "default_solver_iterations")]
    pub max_iterations: usize,
    #[serde(default = "default_solver_tolerance")]
    pub tolerance: f64,
}

fn default_solver_iterations() -> usize {
    1000
}
fn default_solver_tolerance() -> f64 {
    1e-10
}

/// Time stepping and integration orders.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimeConfig {
    /// Step size; negative values are reserved for adjoint runs.
    pub delta_time: f64,
    #[serde(default = "default_order")]
    pub bdf_order: usize,
    /// Backward-difference order for the mesh velocity (1 or 2).
    #[serde(default = "default_order")]
    pub velocity_order: usize,
}

fn default_order() -> usize {
    2
}

/// Nonlinear strategy controls.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StrategySection {
    #[serde(default = "default_nonlinear_iterations")]
    pub max_nonlinear_iterations: usize,
    #[serde(default = "default_nonlinear_tolerance")]
    pub nonlinear_tolerance: f64,
    #[serde(default)]
    pub reform_dofs_each_step: bool,
    #[serde(default)]
    pub compute_reactions: bool,
}

fn default_nonlinear_iterations() -> usize {
    20
}
fn default_nonlinear_tolerance() -> f64 {
    1e-8
}

/// Overlapping-mesh coupling controls.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CouplingSection {
    /// "nearest_element" or "conservative".
    pub coupling_type: String,
    /// "all", "one" or "none".
    pub pressure_coupling: String,
    /// Reference node for the "one" pressure mode.
    pub pressure_coupling_node: Option<usize>,
    /// Overlap distance between patch and background; must be positive.
    pub overlap_distance: f64,
    #[serde(default = "default_dim")]
    pub dim: usize,
}

fn default_dim() -> usize {
    3
}

impl CoreConfig {
    /// Load and validate a configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate a configuration from a TOML string.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: CoreConfig = toml::from_str(contents)
            .map_err(|e| Error::Config(format!("failed to parse configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check every section; the first offending value is fatal.
    pub fn validate(&self) -> Result<()> {
        match self.solver.linear_solver.as_str() {
            "direct" | "cg" => {}
            other => {
                return Err(Error::Config(format!(
                    "unknown linear solver '{}' (expected 'direct' or 'cg')",
                    other
                )))
            }
        }
        if self.solver.max_iterations == 0 {
            return Err(Error::Config(
                "solver.max_iterations must be at least 1".to_string(),
            ));
        }

        if self.time.delta_time == 0.0 {
            return Err(Error::Config("time.delta_time must be non-zero".to_string()));
        }
        if self.time.bdf_order == 0 || self.time.bdf_order > 2 {
            return Err(Error::Config(format!(
                "time.bdf_order must be 1 or 2, got {}",
                self.time.bdf_order
            )));
        }
        if self.time.velocity_order != 1 && self.time.velocity_order != 2 {
            return Err(Error::Config(format!(
                "time.velocity_order must be 1 or 2, got {}",
                self.time.velocity_order
            )));
        }

        if self.strategy.max_nonlinear_iterations == 0 {
            return Err(Error::Config(
                "strategy.max_nonlinear_iterations must be at least 1".to_string(),
            ));
        }

        self.coupling_type()?;
        self.pressure_coupling()?;
        if self.coupling.overlap_distance <= 0.0 {
            return Err(Error::Config(format!(
                "coupling.overlap_distance must be positive, got {}",
                self.coupling.overlap_distance
            )));
        }
        if self.coupling.dim != 2 && self.coupling.dim != 3 {
            return Err(Error::Config(format!(
                "coupling.dim must be 2 or 3, got {}",
                self.coupling.dim
            )));
        }

        Ok(())
    }

    /// Parsed coupling type.
    pub fn coupling_type(&self) -> Result<CouplingType> {
        CouplingType::from_str(&self.coupling.coupling_type)
    }

    /// Parsed pressure coupling mode.
    pub fn pressure_coupling(&self) -> Result<PressureCoupling> {
        PressureCoupling::from_str(&self.coupling.pressure_coupling)
    }
}
