//! Circuit description consumed by the VCHOS engine.
//!
//! The potential is assumed to have the form
//!
//!   U(φ) = −Σ_j EJ_j cos φ_j − EJ_b cos(Σ_j b_j φ_j + 2π f)
//!
//! with one junction per degree of freedom and an optional boundary junction
//! (coefficients b_j) closing the loop. Concrete circuits supply the minima,
//! the capacitance matrix and the charging-energy matrix.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Result, VchosError};
use crate::{DMat, DVec};

/// Source of parameter versions, shared by every parameter set in the process.
static NEXT_VERSION: AtomicU64 = AtomicU64::new(1);

fn next_version() -> u64 {
    NEXT_VERSION.fetch_add(1, Ordering::Relaxed)
}

/// Fine-structure constant α.
pub const FINE_STRUCTURE: f64 = 7.2973525693e-3;
/// Elementary charge in natural units, e = √(4πα).
pub const ELEMENTARY_CHARGE: f64 = 0.302_822_120_872_088_76;
/// Impedance scale Z0 = 1/(2e)².
pub const Z0: f64 = 2.726_244_579_463_328_3;
/// Flux quantum Φ0 = 1/(2e).
pub const PHI0: f64 = 1.651_134_331_138_241_6;

/// Raw circuit parameters, tagged with a version counter.
///
/// Versions are unique across all parameter sets, and every setter draws a
/// fresh one. Derived artifacts (Xi matrices, neighbor tables, optimized
/// lengths) built for another version are stale, including after the whole
/// circuit is replaced. Clones share the version of identical parameters.
#[derive(Debug, Clone)]
pub struct CircuitParameters {
    ej: Vec<f64>,
    ng: Vec<f64>,
    flux: f64,
    boundary_coefficients: Vec<f64>,
    dof: usize,
    periodic_dof: usize,
    num_exc: usize,
    max_lattice_radius: usize,
    version: u64,
}

impl CircuitParameters {
    /// Build and validate a parameter set.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        dof: usize,
        periodic_dof: usize,
        ej: Vec<f64>,
        ng: Vec<f64>,
        flux: f64,
        boundary_coefficients: Vec<f64>,
        num_exc: usize,
        max_lattice_radius: usize,
    ) -> Result<Self> {
        let params = Self::new_unchecked(
            dof,
            periodic_dof,
            ej,
            ng,
            flux,
            boundary_coefficients,
            num_exc,
            max_lattice_radius,
        );
        params.validate()?;
        Ok(params)
    }

    /// Layout known to be consistent (used by the reference circuits).
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new_unchecked(
        dof: usize,
        periodic_dof: usize,
        ej: Vec<f64>,
        ng: Vec<f64>,
        flux: f64,
        boundary_coefficients: Vec<f64>,
        num_exc: usize,
        max_lattice_radius: usize,
    ) -> Self {
        Self {
            ej,
            ng,
            flux,
            boundary_coefficients,
            dof,
            periodic_dof,
            num_exc,
            max_lattice_radius,
            version: next_version(),
        }
    }

    /// Check that array lengths agree with the junction layout.
    pub fn validate(&self) -> Result<()> {
        if self.dof == 0 {
            return Err(VchosError::Configuration(
                "circuit must have at least one degree of freedom".to_string(),
            ));
        }
        if self.periodic_dof > self.dof {
            return Err(VchosError::Configuration(format!(
                "periodic dof ({}) exceeds total dof ({})",
                self.periodic_dof, self.dof
            )));
        }
        if !self.boundary_coefficients.is_empty() && self.boundary_coefficients.len() != self.dof {
            return Err(VchosError::Configuration(format!(
                "boundary coefficients have length {}, expected {} (dof)",
                self.boundary_coefficients.len(),
                self.dof
            )));
        }
        let expected_ej = self.junction_count();
        if self.ej.len() != expected_ej {
            return Err(VchosError::Configuration(format!(
                "EJ list has length {}, expected {} ({} dof{})",
                self.ej.len(),
                expected_ej,
                self.dof,
                if self.has_boundary_junction() { " + boundary junction" } else { "" }
            )));
        }
        if self.ng.len() != self.dof {
            return Err(VchosError::Configuration(format!(
                "ng list has length {}, expected {} (dof)",
                self.ng.len(),
                self.dof
            )));
        }
        if self.ej.iter().chain(&self.ng).any(|x| !x.is_finite()) || !self.flux.is_finite() {
            return Err(VchosError::Configuration(
                "EJ, ng and flux must be finite".to_string(),
            ));
        }
        Ok(())
    }

    pub fn dof(&self) -> usize {
        self.dof
    }

    pub fn periodic_dof(&self) -> usize {
        self.periodic_dof
    }

    /// Number of non-compact coordinates; they precede the periodic ones.
    pub fn extended_dof(&self) -> usize {
        self.dof - self.periodic_dof
    }

    pub fn ej(&self) -> &[f64] {
        &self.ej
    }

    pub fn ng(&self) -> &[f64] {
        &self.ng
    }

    pub fn flux(&self) -> f64 {
        self.flux
    }

    pub fn boundary_coefficients(&self) -> &[f64] {
        &self.boundary_coefficients
    }

    pub fn num_exc(&self) -> usize {
        self.num_exc
    }

    pub fn max_lattice_radius(&self) -> usize {
        self.max_lattice_radius
    }

    /// Current parameter version.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Whether a boundary junction closes the loop.
    pub fn has_boundary_junction(&self) -> bool {
        !self.boundary_coefficients.is_empty()
    }

    /// Total number of Josephson junctions.
    pub fn junction_count(&self) -> usize {
        self.dof + usize::from(self.has_boundary_junction())
    }

    /// EJ of the boundary junction, if any.
    pub fn boundary_ej(&self) -> Option<f64> {
        if self.has_boundary_junction() {
            self.ej.last().copied()
        } else {
            None
        }
    }

    /// Fock states per minimum: (num_exc + 1)^dof.
    pub fn states_per_minimum(&self) -> usize {
        (self.num_exc + 1).pow(self.dof as u32)
    }

    /// Mark the parameters as changed. Concrete circuits call this when a
    /// quantity they own (e.g. a charging energy) is mutated.
    pub fn touch(&mut self) {
        self.version = next_version();
    }

    pub fn set_ej(&mut self, ej: Vec<f64>) {
        self.ej = ej;
        self.touch();
    }

    /// Set a single junction energy.
    pub fn set_ej_at(&mut self, junction: usize, value: f64) {
        if let Some(slot) = self.ej.get_mut(junction) {
            *slot = value;
        }
        self.touch();
    }

    pub fn set_ng(&mut self, ng: Vec<f64>) {
        self.ng = ng;
        self.touch();
    }

    pub fn set_flux(&mut self, flux: f64) {
        self.flux = flux;
        self.touch();
    }

    pub fn set_boundary_coefficients(&mut self, coefficients: Vec<f64>) {
        self.boundary_coefficients = coefficients;
        self.touch();
    }

    pub fn set_num_exc(&mut self, num_exc: usize) {
        self.num_exc = num_exc;
        self.touch();
    }

    pub fn set_max_lattice_radius(&mut self, radius: usize) {
        self.max_lattice_radius = radius;
        self.touch();
    }
}

/// Capability set a concrete circuit exposes to the engine.
pub trait CircuitModel {
    /// Raw parameters (EJ, ng, flux, boundary coefficients, truncation).
    fn parameters(&self) -> &CircuitParameters;

    /// Mutable access; every setter on the result bumps the version.
    fn parameters_mut(&mut self) -> &mut CircuitParameters;

    /// Classical potential energy at phase `phi`.
    fn potential(&self, phi: &DVec) -> f64;

    /// Locally stable configurations. Duplicates and unnormalized
    /// coordinates are allowed; the engine cleans them up.
    fn find_minima(&self) -> Vec<DVec>;

    /// Capacitance matrix C (must be symmetric positive definite).
    fn build_capacitance_matrix(&self) -> DMat;

    /// Charging-energy matrix EC = e²/2 · C⁻¹.
    fn build_ec_matrix(&self) -> DMat;
}
