//! Runtime configuration for the VCHOS engine.
//!
//! Everything here tunes numerics, never physics: circuit parameters live in
//! [`CircuitParameters`](crate::circuit::CircuitParameters).

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VchosError};
use crate::wavefunction::Grid1d;

/// Settings for the harmonic-length Nelder-Mead search.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Convergence threshold on both simplex energy spread and simplex size.
    /// Deliberately coarse: the lengths only seed the full eigen-solve.
    pub tolerance: f64,
    /// Edge length of the initial simplex around all-ones lengths.
    pub initial_step: f64,
    /// Iteration cap; exceeding it is an `OptimizationFailure`.
    pub max_iterations: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-1,
            initial_step: 0.25,
            max_iterations: 400,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VchosConfig {
    /// Lattice vectors whose Gaussian weight exp(-¼ dᵗd) does not exceed
    /// this value are dropped from the periodic continuation.
    pub nearest_neighbor_cutoff: f64,
    /// Largest absolute value allowed in any component of a candidate vector.
    pub maximum_site_length: u32,
    /// Coordinate tolerance when deduplicating minima.
    pub minima_tolerance: f64,
    /// Worker threads for lattice filtering. 1 runs synchronously.
    pub num_workers: usize,
    /// Relative cutoff on overlap eigenvalues in the fallback eigen-solve.
    pub overlap_threshold: f64,
    pub optimizer: OptimizerConfig,
    /// Grid for periodic coordinates in wavefunction plots.
    pub periodic_grid: Grid1d,
    /// Grid for an extended first coordinate in wavefunction plots.
    pub extended_grid: Grid1d,
}

impl Default for VchosConfig {
    fn default() -> Self {
        Self {
            nearest_neighbor_cutoff: 1e-15,
            maximum_site_length: 2,
            minima_tolerance: 1e-3,
            num_workers: 1,
            overlap_threshold: 1e-10,
            optimizer: OptimizerConfig::default(),
            periodic_grid: Grid1d::new(-PI / 2.0, 3.0 * PI / 2.0, 100),
            extended_grid: Grid1d::new(-6.0 * PI, 6.0 * PI, 200),
        }
    }
}

impl VchosConfig {
    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<()> {
        if !(self.nearest_neighbor_cutoff > 0.0 && self.nearest_neighbor_cutoff < 1.0) {
            return Err(VchosError::Configuration(format!(
                "nearest_neighbor_cutoff must be in (0, 1), got {}",
                self.nearest_neighbor_cutoff
            )));
        }
        if self.maximum_site_length == 0 {
            return Err(VchosError::Configuration(
                "maximum_site_length must be >= 1".to_string(),
            ));
        }
        if self.minima_tolerance <= 0.0 {
            return Err(VchosError::Configuration(format!(
                "minima_tolerance must be > 0, got {}",
                self.minima_tolerance
            )));
        }
        if self.num_workers == 0 {
            return Err(VchosError::Configuration(
                "num_workers must be >= 1".to_string(),
            ));
        }
        if !(self.overlap_threshold > 0.0 && self.overlap_threshold < 1.0) {
            return Err(VchosError::Configuration(format!(
                "overlap_threshold must be in (0, 1), got {}",
                self.overlap_threshold
            )));
        }
        if self.optimizer.tolerance <= 0.0 || self.optimizer.initial_step <= 0.0 {
            return Err(VchosError::Configuration(format!(
                "optimizer tolerance and initial_step must be > 0, got {} and {}",
                self.optimizer.tolerance, self.optimizer.initial_step
            )));
        }
        if self.optimizer.max_iterations == 0 {
            return Err(VchosError::Configuration(
                "optimizer max_iterations must be >= 1".to_string(),
            ));
        }
        for (name, grid) in [
            ("periodic_grid", &self.periodic_grid),
            ("extended_grid", &self.extended_grid),
        ] {
            if grid.pt_count < 2 || grid.max_val <= grid.min_val {
                return Err(VchosError::Configuration(format!(
                    "{name} must span a positive range with >= 2 points, got {grid:?}"
                )));
            }
        }
        Ok(())
    }

    /// Load from JSON string. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }
}
