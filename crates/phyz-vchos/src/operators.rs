//! Operator algebra in the truncated Fock space of one minimum.
//!
//! Each minimum carries `(num_exc + 1)^dof` states: a product of truncated
//! oscillator ladders, with mode 0 as the most significant tensor factor.
//!
//! Phase operators are normal ordered with Baker–Campbell–Hausdorff:
//!
//!   exp(iφ_j) = BCH_j · exp(i c·a†/√2) · exp(i c·a/√2),   BCH_j = exp(−¼ c·c)
//!
//! with c the j-th row of Xi (or Xiᵗ·b for the boundary junction).
//!
//! Translations by 2π along periodic direction i are generated once per Xi
//! as exp(2π Σ_j Xi⁻¹[j,i] a_j/√2); translation by an arbitrary lattice
//! vector is then a product of integer powers, so only the minima-pair
//! offset needs a fresh exponential.

use std::f64::consts::{PI, SQRT_2};

use crate::{CMat, DMat, DVec, C64};

/// Single-mode annihilation operator on `levels` states.
pub fn annihilation(levels: usize) -> CMat {
    let mut a = CMat::zeros(levels, levels);
    for n in 1..levels {
        a[(n - 1, n)] = C64::new((n as f64).sqrt(), 0.0);
    }
    a
}

/// Ladder operators a_μ for every mode, embedded in the full per-minimum space.
#[derive(Debug, Clone)]
pub struct LadderOperators {
    pub dof: usize,
    pub levels: usize,
    a: Vec<CMat>,
}

impl LadderOperators {
    pub fn new(dof: usize, num_exc: usize) -> Self {
        let levels = num_exc + 1;
        let single = annihilation(levels);
        let identity = CMat::identity(levels, levels);
        let a = (0..dof)
            .map(|mu| {
                (0..dof).fold(CMat::identity(1, 1), |acc, k| {
                    if k == mu {
                        acc.kronecker(&single)
                    } else {
                        acc.kronecker(&identity)
                    }
                })
            })
            .collect();
        Self { dof, levels, a }
    }

    /// Per-minimum Hilbert space dimension.
    pub fn dim(&self) -> usize {
        self.levels.pow(self.dof as u32)
    }

    pub fn identity(&self) -> CMat {
        CMat::identity(self.dim(), self.dim())
    }

    /// Annihilation operator of mode `mu`.
    pub fn a(&self, mu: usize) -> &CMat {
        &self.a[mu]
    }

    /// Creation operator of mode `mu` (the ladder entries are real).
    pub fn a_dagger(&self, mu: usize) -> CMat {
        self.a[mu].transpose()
    }

    /// Σ_k coeffs[k] · a_k
    pub fn linear_combination(&self, coeffs: &[C64]) -> CMat {
        let mut out = CMat::zeros(self.dim(), self.dim());
        for (k, &c) in coeffs.iter().enumerate() {
            out += &self.a[k] * c;
        }
        out
    }
}

/// BCH-ordered exp(iφ) for a phase whose normal-mode coefficients are `c`.
pub fn exp_i_phi_operator(c: &DVec, ladder: &LadderOperators) -> CMat {
    let coeffs: Vec<C64> = c.iter().map(|&x| C64::new(0.0, x / SQRT_2)).collect();
    let exp_a = ladder.linear_combination(&coeffs).exp();
    let bch = (-0.25 * c.dot(c)).exp();
    exp_a.transpose() * exp_a * C64::new(bch, 0.0)
}

/// Normal-mode coefficients of each junction phase: rows of Xi, followed by
/// Xiᵗ·b for the boundary junction when present.
pub fn junction_coefficients(xi: &DMat, boundary: Option<&[f64]>) -> Vec<DVec> {
    let mut rows: Vec<DVec> = (0..xi.nrows()).map(|j| xi.row(j).transpose()).collect();
    if let Some(b) = boundary {
        rows.push(xi.transpose() * DVec::from_column_slice(b));
    }
    rows
}

/// exp(iφ_j) for every junction, boundary junction last.
pub fn build_all_exp_i_phi_operators(
    xi: &DMat,
    boundary: Option<&[f64]>,
    ladder: &LadderOperators,
) -> Vec<CMat> {
    junction_coefficients(xi, boundary)
        .iter()
        .map(|c| exp_i_phi_operator(c, ladder))
        .collect()
}

/// Ground-state expectation of each exp(iφ_j): just the BCH factors.
pub fn one_state_exp_i_phi_factors(xi: &DMat, boundary: Option<&[f64]>) -> Vec<f64> {
    junction_coefficients(xi, boundary)
        .iter()
        .map(|c| (-0.25 * c.dot(c)).exp())
        .collect()
}

/// Per-direction 2π translation generators and their inverses.
#[derive(Debug, Clone)]
pub struct TranslationGenerators {
    forward: Vec<CMat>,
    backward: Vec<CMat>,
}

impl TranslationGenerators {
    pub fn new(xi_inv: &DMat, ladder: &LadderOperators) -> Self {
        let dim = xi_inv.nrows();
        let mut forward = Vec::with_capacity(dim);
        let mut backward = Vec::with_capacity(dim);
        for i in 0..dim {
            let coeffs: Vec<C64> = (0..dim)
                .map(|j| C64::new(2.0 * PI * xi_inv[(j, i)] / SQRT_2, 0.0))
                .collect();
            let generator = ladder.linear_combination(&coeffs);
            forward.push(generator.exp());
            backward.push((-generator).exp());
        }
        Self { forward, backward }
    }

    /// E_i^n for signed n. Lattice components are bounded by the search
    /// radius, far inside u32.
    fn power(&self, direction: usize, n: i64) -> CMat {
        let exponent = n.unsigned_abs() as u32;
        if n >= 0 {
            self.forward[direction].pow(exponent)
        } else {
            self.backward[direction].pow(exponent)
        }
    }

    /// Creation-side and annihilation-side operators translating by the
    /// lattice vector `neighbor`, composed with the pair's base translation.
    pub fn local_translation_operators(
        &self,
        pair: &PairTranslation,
        neighbor: &[i64],
    ) -> (CMat, CMat) {
        let dim = pair.exp_minima_difference.nrows();
        let mut a_dagger_side = CMat::identity(dim, dim);
        let mut a_side = CMat::identity(dim, dim);
        for (j, &n) in neighbor.iter().enumerate() {
            if n == 0 {
                continue;
            }
            a_dagger_side = a_dagger_side * self.power(j, n).transpose();
            a_side = a_side * self.power(j, -n);
        }
        (
            pair.exp_minima_difference.transpose() * a_dagger_side,
            a_side * &pair.exp_minima_difference_inv,
        )
    }
}

/// Fractional translation between two minima: exp(Σ_j d_j a_j/√2) with
/// d = Xi⁻¹·(φ_p − φ_m), and its inverse.
#[derive(Debug, Clone)]
pub struct PairTranslation {
    exp_minima_difference: CMat,
    exp_minima_difference_inv: CMat,
}

impl PairTranslation {
    pub fn new(minima_diff_rotated: &DVec, ladder: &LadderOperators) -> Self {
        let coeffs: Vec<C64> = minima_diff_rotated
            .iter()
            .map(|&d| C64::new(d / SQRT_2, 0.0))
            .collect();
        let generator = ladder.linear_combination(&coeffs);
        Self {
            exp_minima_difference: generator.exp(),
            exp_minima_difference_inv: (-generator).exp(),
        }
    }
}
