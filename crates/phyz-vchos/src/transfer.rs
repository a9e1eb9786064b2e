//! Periodic continuation: transfer and inner-product matrices.
//!
//! For every minima pair (m, p) with m <= p and every retained lattice
//! vector ν, the block (m, p) receives
//!
//!   T_a†(ν) · [c(ν) · F(2πν, φ_m, φ_p)] · T_a(ν)
//!
//! where F is a local operator (kinetic, potential, or the identity for the
//! overlap), T are the creation/annihilation-side translation operators and
//!
//!   c(ν) = exp(−i ng·δ) · exp(−¼ |Xi⁻¹δ|²),   δ = 2πν + φ_p − φ_m.
//!
//! Lower blocks are filled with the conjugate transpose of the upper ones.
//! A scalar version of the same sums (ground state of one minimum only) is
//! used by the variational optimizer.

use std::f64::consts::{PI, SQRT_2};

use crate::circuit::CircuitParameters;
use crate::error::{Result, VchosError};
use crate::lattice::{LatticeVector, NeighborTable};
use crate::operators::{
    build_all_exp_i_phi_operators, LadderOperators, PairTranslation, TranslationGenerators,
};
use crate::{CMat, DMat, DVec, C64};

/// Operator evaluated between a basis state at `minima_m` and the image of
/// a basis state at `minima_p` shifted by `phi_neighbor`.
pub trait LocalOperator {
    fn local(&self, phi_neighbor: &DVec, minima_m: &DVec, minima_p: &DVec) -> CMat;
}

/// Identity; its periodic continuation is the inner-product matrix.
pub struct Overlap {
    dim: usize,
}

impl Overlap {
    pub fn new(ladder: &LadderOperators) -> Self {
        Self { dim: ladder.dim() }
    }
}

impl LocalOperator for Overlap {
    fn local(&self, _phi_neighbor: &DVec, _minima_m: &DVec, _minima_p: &DVec) -> CMat {
        CMat::identity(self.dim, self.dim)
    }
}

/// Charging energy 4·nᵗ·EC·n in the displaced-oscillator basis.
pub struct KineticTerm {
    xi_inv: DMat,
    /// EC_t = Xi⁻¹·EC·Xi⁻ᵗ
    ec_t: DMat,
    /// Displacement-independent quadratic part.
    quadratic: CMat,
    /// a_i − a_i† for each mode.
    antisymmetric: Vec<CMat>,
    identity: CMat,
}

impl KineticTerm {
    pub fn new(ec: &DMat, xi_inv: &DMat, ladder: &LadderOperators) -> Self {
        let ec_t = xi_inv * ec * xi_inv.transpose();
        let dof = ladder.dof;
        let dim = ladder.dim();
        let mut quadratic = CMat::zeros(dim, dim);
        for i in 0..dof {
            let ai = ladder.a(i);
            let ai_dag = ladder.a_dagger(i);
            for k in 0..dof {
                let ak = ladder.a(k);
                let ak_dag = ladder.a_dagger(k);
                let pair = ai * ak + &ai_dag * &ak_dag - &ai_dag * ak - &ak_dag * ai;
                quadratic += pair * C64::new(-2.0 * ec_t[(i, k)], 0.0);
            }
        }
        let antisymmetric = (0..dof).map(|i| ladder.a(i) - ladder.a_dagger(i)).collect();
        Self {
            xi_inv: xi_inv.clone(),
            ec_t,
            quadratic,
            antisymmetric,
            identity: ladder.identity(),
        }
    }

    pub fn ec_t(&self) -> &DMat {
        &self.ec_t
    }
}

/// Scalar kinetic contribution: 2·tr(EC_t) − dᵗ·EC_t·d.
fn kinetic_offset(ec_t: &DMat, delta_phi_rotated: &DVec) -> f64 {
    2.0 * ec_t.trace() - delta_phi_rotated.dot(&(ec_t * delta_phi_rotated))
}

impl LocalOperator for KineticTerm {
    fn local(&self, phi_neighbor: &DVec, minima_m: &DVec, minima_p: &DVec) -> CMat {
        let delta_phi = phi_neighbor + (minima_p - minima_m);
        let d = &self.xi_inv * delta_phi;
        let weights = &self.ec_t * &d;

        let mut out = self.quadratic.clone();
        for (i, op) in self.antisymmetric.iter().enumerate() {
            out -= op * C64::new(4.0 * weights[i] / SQRT_2, 0.0);
        }
        out += &self.identity * C64::new(kinetic_offset(&self.ec_t, &d), 0.0);
        out
    }
}

/// Phase factors exp(iφ̄_j) of each junction at the midpoint φ̄, with the
/// boundary junction (flux included) last.
fn junction_phases(params: &CircuitParameters, phi_bar: &DVec) -> Vec<C64> {
    let dof = params.dof();
    let mut phases: Vec<C64> = (0..dof).map(|j| C64::from_polar(1.0, phi_bar[j])).collect();
    if params.has_boundary_junction() {
        let b = params.boundary_coefficients();
        let angle = 2.0 * PI * params.flux() + (0..dof).map(|i| b[i] * phi_bar[i]).sum::<f64>();
        phases.push(C64::from_polar(1.0, angle));
    }
    phases
}

fn midpoint(phi_neighbor: &DVec, minima_m: &DVec, minima_p: &DVec) -> DVec {
    (phi_neighbor + minima_m + minima_p) * 0.5
}

/// Josephson energy Σ_j EJ_j (1 − cos φ_j), boundary junction included.
pub struct PotentialTerm {
    params: CircuitParameters,
    exp_i_phi: Vec<CMat>,
    identity: CMat,
}

impl PotentialTerm {
    pub fn new(params: &CircuitParameters, xi: &DMat, ladder: &LadderOperators) -> Self {
        let boundary = params
            .has_boundary_junction()
            .then(|| params.boundary_coefficients());
        Self {
            params: params.clone(),
            exp_i_phi: build_all_exp_i_phi_operators(xi, boundary, ladder),
            identity: ladder.identity(),
        }
    }
}

impl LocalOperator for PotentialTerm {
    fn local(&self, phi_neighbor: &DVec, minima_m: &DVec, minima_p: &DVec) -> CMat {
        let phi_bar = midpoint(phi_neighbor, minima_m, minima_p);
        let phases = junction_phases(&self.params, &phi_bar);
        let ej = self.params.ej();
        let offset: f64 = ej.iter().sum();
        let mut out = &self.identity * C64::new(offset, 0.0);
        for (j, (op, &phase)) in self.exp_i_phi.iter().zip(&phases).enumerate() {
            let shifted = op * phase;
            let hermitian_part = &shifted + shifted.map(|z| z.conj());
            out -= hermitian_part * C64::new(0.5 * ej[j], 0.0);
        }
        out
    }
}

/// Kinetic plus potential: the full transfer-matrix integrand.
pub struct TransferTerm {
    pub kinetic: KineticTerm,
    pub potential: PotentialTerm,
}

impl LocalOperator for TransferTerm {
    fn local(&self, phi_neighbor: &DVec, minima_m: &DVec, minima_p: &DVec) -> CMat {
        self.kinetic.local(phi_neighbor, minima_m, minima_p)
            + self.potential.local(phi_neighbor, minima_m, minima_p)
    }
}

/// Everything the periodic continuation reads. All fields must belong to the
/// same parameter version.
pub struct ContinuationInputs<'a> {
    pub params: &'a CircuitParameters,
    pub minima: &'a [DVec],
    pub xi_inv: &'a DMat,
    pub neighbors: &'a NeighborTable,
}

/// Offset-charge phase times Gaussian suppression for displacement δ.
pub fn exp_product_coefficient(ng: &[f64], delta_phi: &DVec, xi_inv: &DMat) -> C64 {
    let rotated = xi_inv * delta_phi;
    let charge_phase: f64 = ng.iter().zip(delta_phi.iter()).map(|(n, d)| n * d).sum();
    C64::from_polar((-0.25 * rotated.dot(&rotated)).exp(), -charge_phase)
}

fn lattice_phase(neighbor: &[i64]) -> DVec {
    DVec::from_iterator(neighbor.len(), neighbor.iter().map(|&n| 2.0 * PI * n as f64))
}

/// Sum of translated local contributions for one minima pair.
fn periodic_continuation_for_pair<L: LocalOperator>(
    term: &L,
    inputs: &ContinuationInputs<'_>,
    generators: &TranslationGenerators,
    ladder: &LadderOperators,
    (m, p): (usize, usize),
    neighbors: &[LatticeVector],
) -> CMat {
    let minima_m = &inputs.minima[m];
    let minima_p = &inputs.minima[p];
    let minima_diff = minima_p - minima_m;
    let pair = PairTranslation::new(&(inputs.xi_inv * &minima_diff), ladder);

    let dim = ladder.dim();
    let mut block = CMat::zeros(dim, dim);
    for neighbor in neighbors {
        let phi_neighbor = lattice_phase(neighbor);
        let shifted = &phi_neighbor + &minima_diff;
        let coefficient = exp_product_coefficient(inputs.params.ng(), &shifted, inputs.xi_inv);
        let (a_dagger_side, a_side) = generators.local_translation_operators(&pair, neighbor);
        let element = term.local(&phi_neighbor, minima_m, minima_p) * coefficient;
        block += a_dagger_side * element * a_side;
    }
    block
}

/// Copy the conjugate transpose of every upper block into the lower half.
pub fn populate_hermitian_matrix(
    matrix: &mut CMat,
    minima_count: usize,
    states_per_minimum: usize,
) {
    let n = states_per_minimum;
    for m in 0..minima_count {
        for p in m + 1..minima_count {
            let upper = matrix.view((m * n, p * n), (n, n)).adjoint();
            let mut lower = matrix.view_mut((p * n, m * n), (n, n));
            lower += &upper;
        }
    }
}

/// Assemble the full Hermitian matrix of a local operator.
///
/// Pairs are visited in ascending order so that assembly is deterministic.
pub fn periodic_continuation<L: LocalOperator>(
    term: &L,
    inputs: &ContinuationInputs<'_>,
    ladder: &LadderOperators,
) -> Result<CMat> {
    let generators = TranslationGenerators::new(inputs.xi_inv, ladder);
    let count = inputs.minima.len();
    let n = ladder.dim();
    let mut matrix = CMat::zeros(count * n, count * n);

    for m in 0..count {
        for p in m..count {
            let neighbors = inputs.neighbors.get(m, p).ok_or_else(|| VchosError::NumericalFailure {
                stage: format!("periodic continuation for minima pair ({m}, {p})"),
                reason: "neighbor table has no entry for this pair".to_string(),
            })?;
            let block = periodic_continuation_for_pair(
                term,
                inputs,
                &generators,
                ladder,
                (m, p),
                neighbors,
            );
            let mut target = matrix.view_mut((m * n, p * n), (n, n));
            target += &block;
        }
    }

    populate_hermitian_matrix(&mut matrix, count, n);
    Ok(matrix)
}

/// Ground-state-only ingredients for the variational energy estimate.
pub struct ScalarTransfer<'a> {
    pub params: &'a CircuitParameters,
    pub xi_inv: &'a DMat,
    pub ec_t: DMat,
    pub exp_i_phi: Vec<f64>,
}

impl ScalarTransfer<'_> {
    fn local_potential(&self, phi_neighbor: &DVec, minimum: &DVec) -> f64 {
        let phi_bar = midpoint(phi_neighbor, minimum, minimum);
        let phases = junction_phases(self.params, &phi_bar);
        let ej = self.params.ej();
        let mut potential: f64 = ej.iter().sum();
        for (j, (&factor, phase)) in self.exp_i_phi.iter().zip(&phases).enumerate() {
            // z + z̄ = 2 Re z
            potential -= ej[j] * factor * phase.re;
        }
        potential
    }

    /// (transfer, inner product) for the ground state of `minimum` summed
    /// over its self-pair lattice vectors.
    pub fn transfer_and_inner(&self, minimum: &DVec, neighbors: &[LatticeVector]) -> (C64, C64) {
        let mut transfer = C64::new(0.0, 0.0);
        let mut inner = C64::new(0.0, 0.0);
        for neighbor in neighbors {
            let phi_neighbor = lattice_phase(neighbor);
            let coefficient = exp_product_coefficient(self.params.ng(), &phi_neighbor, self.xi_inv);
            let d = self.xi_inv * &phi_neighbor;
            let local =
                kinetic_offset(&self.ec_t, &d) + self.local_potential(&phi_neighbor, minimum);
            transfer += coefficient * local;
            inner += coefficient;
        }
        (transfer, inner)
    }
}

/// Largest modulus of M − M†.
pub fn hermitian_error(matrix: &CMat) -> f64 {
    (matrix - matrix.adjoint()).camax()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lattice::{build_neighbor_table, FilterSettings};
    use approx::assert_relative_eq;

    fn transmon(num_exc: usize, ng: f64) -> CircuitParameters {
        CircuitParameters::new(1, 1, vec![15.0], vec![ng], 0.0, vec![], num_exc, 3).unwrap()
    }

    // Xi for EJ = 15, EC = 0.3: Xi² = √(8 EC / EJ) = 0.4
    fn transmon_xi() -> DMat {
        DMat::from_element(1, 1, 0.4f64.sqrt())
    }

    fn table(minima: &[DVec], xi_inv: &DMat, periodic_dof: usize) -> NeighborTable {
        let settings = FilterSettings {
            cutoff: 1e-15,
            maximum_site_length: 2,
            max_radius: 3,
            extended_dof: 0,
            periodic_dof,
        };
        build_neighbor_table(minima, xi_inv, &settings, 1).unwrap()
    }

    #[test]
    fn test_coefficient_zero_displacement_is_one() {
        let c = exp_product_coefficient(&[0.3], &DVec::zeros(1), &DMat::identity(1, 1));
        assert_relative_eq!(c.re, 1.0);
        assert_relative_eq!(c.im, 0.0);
    }

    #[test]
    fn test_transmon_ground_state_energy() {
        let params = transmon(0, 0.0);
        let xi = transmon_xi();
        let xi_inv = xi.clone().try_inverse().unwrap();
        let minima = vec![DVec::zeros(1)];
        let neighbors = table(&minima, &xi_inv, 1);
        let ladder = LadderOperators::new(1, 0);
        let inputs = ContinuationInputs {
            params: &params,
            minima: &minima,
            xi_inv: &xi_inv,
            neighbors: &neighbors,
        };
        let term = TransferTerm {
            kinetic: KineticTerm::new(&DMat::from_element(1, 1, 0.3), &xi_inv, &ladder),
            potential: PotentialTerm::new(&params, &xi, &ladder),
        };
        let t = periodic_continuation(&term, &inputs, &ladder).unwrap();
        let s = periodic_continuation(&Overlap::new(&ladder), &inputs, &ladder).unwrap();
        // kinetic 2·EC/Xi² = 1.5, potential EJ(1 − e^{−Xi²/4}) ≈ 1.4274
        let expected = 1.5 + 15.0 * (1.0 - (-0.1f64).exp());
        assert_relative_eq!((t[(0, 0)] / s[(0, 0)]).re, expected, epsilon = 1e-7);
    }

    #[test]
    fn test_scalar_matches_one_state_matrix() {
        let params = transmon(0, 0.2);
        let xi = transmon_xi();
        let xi_inv = xi.clone().try_inverse().unwrap();
        let ec = DMat::from_element(1, 1, 0.3);
        let minima = vec![DVec::zeros(1)];
        let neighbors = table(&minima, &xi_inv, 1);
        let ladder = LadderOperators::new(1, 0);
        let inputs = ContinuationInputs {
            params: &params,
            minima: &minima,
            xi_inv: &xi_inv,
            neighbors: &neighbors,
        };
        let term = TransferTerm {
            kinetic: KineticTerm::new(&ec, &xi_inv, &ladder),
            potential: PotentialTerm::new(&params, &xi, &ladder),
        };
        let t = periodic_continuation(&term, &inputs, &ladder).unwrap();
        let s = periodic_continuation(&Overlap::new(&ladder), &inputs, &ladder).unwrap();

        let scalar = ScalarTransfer {
            params: &params,
            xi_inv: &xi_inv,
            ec_t: &xi_inv * &ec * xi_inv.transpose(),
            exp_i_phi: crate::operators::one_state_exp_i_phi_factors(&xi, None),
        };
        let (ts, ss) = scalar.transfer_and_inner(&minima[0], neighbors.get(0, 0).unwrap());
        assert_relative_eq!(ts.re, t[(0, 0)].re, epsilon = 1e-10);
        assert_relative_eq!(ss.re, s[(0, 0)].re, epsilon = 1e-10);
    }

    #[test]
    fn test_two_minima_matrices_hermitian() {
        let params = CircuitParameters::new(
            2,
            2,
            vec![1.0, 1.0, 0.8],
            vec![0.1, -0.3],
            0.15,
            vec![1.0, -1.0],
            2,
            2,
        )
        .unwrap();
        let xi = DMat::from_row_slice(2, 2, &[0.9, 0.2, -0.1, 1.1]);
        let xi_inv = xi.clone().try_inverse().unwrap();
        let ec = DMat::from_row_slice(2, 2, &[0.5, 0.1, 0.1, 0.4]);
        let minima = vec![
            DVec::from_vec(vec![0.3, -0.2]),
            DVec::from_vec(vec![-0.4, 0.5]),
        ];
        let neighbors = table(&minima, &xi_inv, 2);
        let ladder = LadderOperators::new(2, 2);
        let inputs = ContinuationInputs {
            params: &params,
            minima: &minima,
            xi_inv: &xi_inv,
            neighbors: &neighbors,
        };
        let term = TransferTerm {
            kinetic: KineticTerm::new(&ec, &xi_inv, &ladder),
            potential: PotentialTerm::new(&params, &xi, &ladder),
        };
        let t = periodic_continuation(&term, &inputs, &ladder).unwrap();
        let s = periodic_continuation(&Overlap::new(&ladder), &inputs, &ladder).unwrap();
        assert_eq!(t.shape(), (18, 18));
        assert!(hermitian_error(&s) < 1e-10, "overlap error {}", hermitian_error(&s));
        assert!(hermitian_error(&t) < 1e-10, "transfer error {}", hermitian_error(&t));
    }

    #[test]
    fn test_populate_hermitian_mirrors_blocks() {
        let mut m = CMat::zeros(4, 4);
        m[(0, 2)] = C64::new(1.0, 2.0);
        m[(1, 3)] = C64::new(-0.5, 0.25);
        populate_hermitian_matrix(&mut m, 2, 2);
        assert_eq!(m[(2, 0)], C64::new(1.0, -2.0));
        assert_eq!(m[(3, 1)], C64::new(-0.5, -0.25));
    }

    #[test]
    fn test_hermitian_error_is_largest_modulus() {
        let mut m = CMat::zeros(2, 2);
        m[(0, 1)] = C64::new(3.0, 4.0);
        m[(1, 1)] = C64::new(0.0, 2.0);
        assert_relative_eq!(hermitian_error(&m), 5.0, epsilon = 1e-14);
        let h = &m + m.adjoint();
        assert_eq!(hermitian_error(&h), 0.0);
    }
}
