//! Generalized Hermitian eigenproblem T·x = E·S·x.
//!
//! The primary path reduces the pencil with the Cholesky factor of S
//! (S = L·Lᴴ, A = L⁻¹·T·L⁻ᴴ) and diagonalizes A with `SymmetricEigen`.
//! When S is not numerically positive definite, which happens when the
//! displaced-oscillator basis is overcomplete, the solver falls back to
//! canonical orthogonalization: eigenvectors of S with eigenvalues below
//! `overlap_threshold · λ_max` are projected out before diagonalizing.

use nalgebra::{Cholesky, SymmetricEigen};

use crate::error::{Result, VchosError};
use crate::{CMat, CVec, C64};

/// Eigenvalues and eigenstates of the generalized problem.
#[derive(Debug, Clone)]
pub struct Spectrum {
    /// Eigenvalues in ascending order.
    pub energies: Vec<f64>,
    /// Corresponding S-normalized eigenvectors, phase standardized.
    pub states: Vec<CVec>,
}

impl Spectrum {
    /// Ground state energy.
    pub fn ground_energy(&self) -> f64 {
        self.energies[0]
    }

    /// Ground state vector.
    pub fn ground_state(&self) -> &CVec {
        &self.states[0]
    }

    /// Spectral gap (E_1 - E_0).
    pub fn gap(&self) -> f64 {
        if self.energies.len() < 2 {
            return 0.0;
        }
        self.energies[1] - self.energies[0]
    }

    /// Eigenvectors as the columns of one matrix.
    pub fn state_matrix(&self) -> CMat {
        let rows = self.states.first().map_or(0, |s| s.len());
        CMat::from_fn(rows, self.states.len(), |i, j| self.states[j][i])
    }
}

/// Rotate the global phase so that the largest-magnitude entry is real and
/// positive. The first entry attaining the maximum wins ties.
pub fn standardize_phase(values: &mut [C64]) {
    let mut best: Option<C64> = None;
    for &z in values.iter() {
        if best.map_or(true, |b| z.norm() > b.norm()) {
            best = Some(z);
        }
    }
    let Some(pivot) = best else { return };
    if pivot.norm() == 0.0 {
        return;
    }
    let rotation = C64::from_polar(1.0, -pivot.arg());
    for z in values.iter_mut() {
        *z *= rotation;
    }
}

fn hermitian_part(m: &CMat) -> CMat {
    (m + m.adjoint()) * C64::new(0.5, 0.0)
}

/// Collect the `count` lowest eigenpairs of a Hermitian `a`, mapped back to
/// the original basis through `back`.
fn lowest_eigenpairs(
    a: CMat,
    count: usize,
    back: impl Fn(&CMat) -> Option<CMat>,
) -> Option<Spectrum> {
    let eig = SymmetricEigen::new(a);
    let mut order: Vec<usize> = (0..eig.eigenvalues.len()).collect();
    order.sort_by(|&i, &j| eig.eigenvalues[i].total_cmp(&eig.eigenvalues[j]));
    order.truncate(count);

    let mut y = CMat::zeros(eig.eigenvectors.nrows(), order.len());
    for (col, &i) in order.iter().enumerate() {
        y.set_column(col, &eig.eigenvectors.column(i));
    }
    let x = back(&y)?;

    let energies = order.iter().map(|&i| eig.eigenvalues[i]).collect();
    let states = x
        .column_iter()
        .map(|c| {
            let mut v = c.into_owned();
            standardize_phase(v.as_mut_slice());
            v
        })
        .collect();
    Some(Spectrum { energies, states })
}

fn cholesky_path(t: &CMat, s: &CMat, count: usize, overlap_threshold: f64) -> Option<Spectrum> {
    let chol = Cholesky::new(hermitian_part(s))?;
    let l = chol.l();
    // Pivots bound the conditioning of S from below; a vanishing one means
    // the factorization only succeeded by rounding.
    let scale = s.diagonal().iter().map(|z| z.re).fold(0.0, f64::max);
    let well_posed = l
        .diagonal()
        .iter()
        .all(|z| z.re.is_finite() && z.norm_sqr() > overlap_threshold * scale);
    if !well_posed {
        return None;
    }
    let l_inv_t = l.solve_lower_triangular(t)?;
    let a = l.solve_lower_triangular(&l_inv_t.adjoint())?;
    let l_adjoint = l.adjoint();
    lowest_eigenpairs(hermitian_part(&a), count, |y| l_adjoint.solve_upper_triangular(y))
}

fn canonical_orthogonalization_path(
    t: &CMat,
    s: &CMat,
    count: usize,
    overlap_threshold: f64,
) -> Result<Spectrum> {
    let failure = |reason: String| VchosError::NumericalFailure {
        stage: "generalized eigen-solve (fallback)".to_string(),
        reason,
    };

    let overlap = SymmetricEigen::new(hermitian_part(s));
    let lambda_max = overlap.eigenvalues.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !(lambda_max > 0.0) {
        return Err(failure("inner-product matrix has no positive eigenvalue".to_string()));
    }
    let kept: Vec<usize> = (0..overlap.eigenvalues.len())
        .filter(|&i| overlap.eigenvalues[i] > overlap_threshold * lambda_max)
        .collect();
    if kept.len() < count {
        return Err(failure(format!(
            "only {} independent basis vectors for {count} requested eigenvalues",
            kept.len()
        )));
    }

    let mut x = CMat::zeros(s.nrows(), kept.len());
    for (col, &i) in kept.iter().enumerate() {
        let scale = C64::new(overlap.eigenvalues[i].sqrt().recip(), 0.0);
        x.set_column(col, &(overlap.eigenvectors.column(i) * scale));
    }
    let a = x.adjoint() * t * &x;
    lowest_eigenpairs(hermitian_part(&a), count, |y| Some(&x * y))
        .ok_or_else(|| failure("projection back to the original basis failed".to_string()))
}

/// Lowest `count` eigenpairs of the pencil (T, S).
pub fn solve_generalized(
    t: &CMat,
    s: &CMat,
    count: usize,
    overlap_threshold: f64,
) -> Result<Spectrum> {
    let dim = t.nrows();
    if t.shape() != s.shape() || t.ncols() != dim {
        return Err(VchosError::Configuration(format!(
            "transfer matrix {:?} and inner-product matrix {:?} must be square and equal in shape",
            t.shape(),
            s.shape()
        )));
    }
    if count == 0 || count > dim {
        return Err(VchosError::Configuration(format!(
            "requested {count} eigenvalues from a {dim}-dimensional basis"
        )));
    }

    if let Some(spectrum) = cholesky_path(t, s, count, overlap_threshold) {
        return Ok(spectrum);
    }
    log::warn!(
        "singular inner product matrix ({dim}x{dim}); falling back to canonical orthogonalization"
    );
    canonical_orthogonalization_path(t, s, count, overlap_threshold)
}
