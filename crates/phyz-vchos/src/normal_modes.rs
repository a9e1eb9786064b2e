//! Harmonic approximation around a potential minimum.
//!
//! Expanding U(φ) to second order at a minimum gives the "gamma" matrix
//! (inverse inductances EJ/Φ0²). Solving γ·v = ω²·C·v yields the normal
//! modes, and the Xi matrix packs their directions and harmonic lengths:
//!
//!   Xi[:, i] = v_i · ℓ_i · ω_i^(−1/2) · √(1/Z0)
//!
//! so that Xiᵗ·C·Xi = Ω⁻¹/Z0 when every length scale ℓ_i = 1. The variational
//! optimizer moves ℓ away from 1 to lower the energy.

use nalgebra::{Cholesky, SymmetricEigen};

use crate::circuit::{CircuitParameters, PHI0, Z0};
use crate::error::{Result, VchosError};
use crate::{DMat, DVec};

/// Relative asymmetry tolerated in a capacitance matrix.
const SYMMETRY_TOL: f64 = 1e-10;

/// Normal modes of the linearized circuit at one minimum.
#[derive(Debug, Clone)]
pub struct NormalModes {
    /// Squared mode frequencies ω², ascending.
    pub omega_squared: DVec,
    /// C-orthonormal mode vectors (columns): vᵢᵗ·C·vⱼ = δᵢⱼ.
    pub eigenvectors: DMat,
}

impl NormalModes {
    /// Mode frequencies ω.
    pub fn omega(&self) -> DVec {
        self.omega_squared.map(f64::sqrt)
    }

    /// Xi matrix with per-mode length scale factors.
    pub fn xi_matrix(&self, lengths: &[f64]) -> DMat {
        let mut xi = self.eigenvectors.clone();
        let norm = (1.0 / Z0).sqrt();
        for (i, mut col) in xi.column_iter_mut().enumerate() {
            col *= lengths[i] * self.omega_squared[i].powf(-0.25) * norm;
        }
        xi
    }
}

/// Linearized potential (second derivative of U) at `minimum`.
pub fn build_gamma_matrix(params: &CircuitParameters, minimum: &DVec) -> DMat {
    let dim = params.dof();
    let ej = params.ej();
    let phi0_sq = PHI0 * PHI0;
    let mut gamma = DMat::zeros(dim, dim);

    for j in 0..dim {
        gamma[(j, j)] = ej[j] / phi0_sq * minimum[j].cos();
    }

    if let Some(ej_b) = params.boundary_ej() {
        let b = params.boundary_coefficients();
        let phase: f64 = (0..dim).map(|j| b[j] * minimum[j]).sum::<f64>()
            + 2.0 * std::f64::consts::PI * params.flux();
        let c = ej_b / phi0_sq * phase.cos();
        for j in 0..dim {
            for k in 0..dim {
                gamma[(j, k)] += c * b[j] * b[k];
            }
        }
    }

    gamma
}

/// Solve γ·v = ω²·C·v for the minimum with index `minimum`.
///
/// C must be symmetric positive definite; anything else is an
/// `IllPosedCapacitance` error. A negative ω² means the point is not a
/// minimum of the potential and is reported as a numerical failure.
pub fn eigensystem_normal_modes(
    gamma: &DMat,
    capacitance: &DMat,
    minimum: usize,
) -> Result<NormalModes> {
    let dim = gamma.nrows();
    if capacitance.shape() != (dim, dim) {
        return Err(VchosError::IllPosedCapacitance {
            minimum,
            reason: format!(
                "shape {:?} does not match {dim} degrees of freedom",
                capacitance.shape()
            ),
        });
    }
    let scale = capacitance.amax().max(f64::MIN_POSITIVE);
    if (capacitance - capacitance.transpose()).amax() > SYMMETRY_TOL * scale {
        return Err(VchosError::IllPosedCapacitance {
            minimum,
            reason: "matrix is not symmetric".to_string(),
        });
    }
    let chol = Cholesky::new(capacitance.clone()).ok_or_else(|| VchosError::IllPosedCapacitance {
        minimum,
        reason: "matrix is not positive definite".to_string(),
    })?;
    let l = chol.l();

    let triangular_failure = || VchosError::IllPosedCapacitance {
        minimum,
        reason: "singular Cholesky factor".to_string(),
    };
    // A = L⁻¹ γ L⁻ᵗ
    let l_inv_gamma = l.solve_lower_triangular(gamma).ok_or_else(triangular_failure)?;
    let a = l
        .solve_lower_triangular(&l_inv_gamma.transpose())
        .ok_or_else(triangular_failure)?;
    let a = (&a + a.transpose()) * 0.5;

    let eig = SymmetricEigen::new(a);
    let mut order: Vec<usize> = (0..dim).collect();
    order.sort_by(|&i, &j| eig.eigenvalues[i].total_cmp(&eig.eigenvalues[j]));

    let omega_squared = DVec::from_iterator(dim, order.iter().map(|&i| eig.eigenvalues[i]));
    if let Some(bad) = omega_squared.iter().find(|&&w| w <= 0.0) {
        return Err(VchosError::NumericalFailure {
            stage: format!("normal modes at minimum {minimum}"),
            reason: format!("non-positive squared frequency {bad:.3e}; point is not a minimum"),
        });
    }

    let mut y = DMat::zeros(dim, dim);
    for (col, &i) in order.iter().enumerate() {
        y.set_column(col, &eig.eigenvectors.column(i));
    }
    let eigenvectors = l
        .transpose()
        .solve_upper_triangular(&y)
        .ok_or_else(triangular_failure)?;

    Ok(NormalModes {
        omega_squared,
        eigenvectors,
    })
}
