//! Three-junction flux qubit.
//!
//! Junctions 1 and 2 act on the node phases φ1 and φ2; the third (usually
//! the smaller one, α·EJ) closes the loop and sees φ1 − φ2 + 2πf:
//!
//!   U = −EJ1 cos φ1 − EJ2 cos φ2 − EJ3 cos(φ1 − φ2 + 2πf)

use std::f64::consts::PI;

use crate::circuit::{CircuitModel, CircuitParameters, ELEMENTARY_CHARGE};
use crate::error::{Result, VchosError};
use crate::{DMat, DVec};

/// Seeds per axis for the minima search.
const SEEDS_PER_AXIS: usize = 8;
const DESCENT_MAX_STEPS: usize = 20_000;
const GRADIENT_TOL: f64 = 1e-10;

#[derive(Debug, Clone)]
pub struct FluxQubit {
    params: CircuitParameters,
    /// Junction charging energies ECJ1..3.
    ecj: [f64; 3],
    /// Gate/shunt charging energies of the two islands.
    ecg: [f64; 2],
}

fn check_positive(name: &str, values: &[f64]) -> Result<()> {
    match values.iter().find(|&&x| !(x > 0.0 && x.is_finite())) {
        Some(bad) => Err(VchosError::Configuration(format!("{name} must be positive, got {bad}"))),
        None => Ok(()),
    }
}

impl FluxQubit {
    pub fn new(
        ej: [f64; 3],
        ecj: [f64; 3],
        ecg: [f64; 2],
        ng: [f64; 2],
        flux: f64,
        num_exc: usize,
        max_lattice_radius: usize,
    ) -> Result<Self> {
        check_positive("ECJ", &ecj)?;
        check_positive("ECg", &ecg)?;
        let params = CircuitParameters::new(
            2,
            2,
            ej.to_vec(),
            ng.to_vec(),
            flux,
            vec![1.0, -1.0],
            num_exc,
            max_lattice_radius,
        )?;
        Ok(Self { params, ecj, ecg })
    }

    /// EJ1 = EJ2 = 1, α = 0.8, ECJ = 0.016 (ECJ3 = ECJ/α), ECg = 0.83,
    /// f = 0.46, 4 levels per mode and lattice radius 2.
    pub fn default_params() -> Self {
        Self {
            params: CircuitParameters::new_unchecked(
                2,
                2,
                vec![1.0, 1.0, 0.8],
                vec![0.0, 0.0],
                0.46,
                vec![1.0, -1.0],
                3,
                2,
            ),
            ecj: [0.016, 0.016, 0.02],
            ecg: [0.83, 0.83],
        }
    }

    pub fn ecj(&self) -> [f64; 3] {
        self.ecj
    }

    pub fn ecg(&self) -> [f64; 2] {
        self.ecg
    }

    pub fn set_flux(&mut self, flux: f64) {
        self.params.set_flux(flux);
    }

    pub fn set_ej(&mut self, junction: usize, ej: f64) {
        self.params.set_ej_at(junction, ej);
    }

    pub fn set_ecj(&mut self, ecj: [f64; 3]) {
        self.ecj = ecj;
        self.params.touch();
    }

    pub fn set_ecg(&mut self, ecg: [f64; 2]) {
        self.ecg = ecg;
        self.params.touch();
    }

    fn loop_phase(&self, phi: &DVec) -> f64 {
        phi[0] - phi[1] + 2.0 * PI * self.params.flux()
    }

    fn gradient(&self, phi: &DVec) -> DVec {
        let ej = self.params.ej();
        let s = ej[2] * self.loop_phase(phi).sin();
        DVec::from_vec(vec![ej[0] * phi[0].sin() + s, ej[1] * phi[1].sin() - s])
    }

    fn hessian(&self, phi: &DVec) -> DMat {
        let ej = self.params.ej();
        let c = ej[2] * self.loop_phase(phi).cos();
        DMat::from_row_slice(2, 2, &[ej[0] * phi[0].cos() + c, -c, -c, ej[1] * phi[1].cos() + c])
    }

    /// Steepest descent from `seed`; `None` if it ends anywhere but a strict
    /// local minimum.
    fn descend(&self, seed: DVec) -> Option<DVec> {
        let ej = self.params.ej();
        let step = 1.0 / ej.iter().map(|x| x.abs()).sum::<f64>().max(f64::MIN_POSITIVE);
        let mut phi = seed;
        for _ in 0..DESCENT_MAX_STEPS {
            let g = self.gradient(&phi);
            if g.norm() < GRADIENT_TOL {
                break;
            }
            phi -= g * step;
        }
        let h = self.hessian(&phi);
        let stable = h[(0, 0)] > 0.0 && h.determinant() > 0.0;
        (stable && self.gradient(&phi).norm() < 1e3 * GRADIENT_TOL).then_some(phi)
    }
}

impl CircuitModel for FluxQubit {
    fn parameters(&self) -> &CircuitParameters {
        &self.params
    }

    fn parameters_mut(&mut self) -> &mut CircuitParameters {
        &mut self.params
    }

    fn potential(&self, phi: &DVec) -> f64 {
        let ej = self.params.ej();
        -ej[0] * phi[0].cos() - ej[1] * phi[1].cos() - ej[2] * self.loop_phase(phi).cos()
    }

    fn find_minima(&self) -> Vec<DVec> {
        let spacing = 2.0 * PI / SEEDS_PER_AXIS as f64;
        let mut minima = Vec::new();
        for i in 0..SEEDS_PER_AXIS {
            for j in 0..SEEDS_PER_AXIS {
                let seed = DVec::from_vec(vec![-PI + spacing * i as f64, -PI + spacing * j as f64]);
                if let Some(minimum) = self.descend(seed) {
                    minima.push(minimum);
                }
            }
        }
        minima
    }

    fn build_capacitance_matrix(&self) -> DMat {
        let e2 = ELEMENTARY_CHARGE * ELEMENTARY_CHARGE;
        let cj = self.ecj.map(|ec| e2 / (2.0 * ec));
        let cg = self.ecg.map(|ec| e2 / (2.0 * ec));
        DMat::from_row_slice(
            2,
            2,
            &[cj[0] + cj[2] + cg[0], -cj[2], -cj[2], cj[1] + cj[2] + cg[1]],
        )
    }

    fn build_ec_matrix(&self) -> DMat {
        let e2 = ELEMENTARY_CHARGE * ELEMENTARY_CHARGE;
        // Non-invertible C is reported by the normal-mode solve, which runs first.
        self.build_capacitance_matrix()
            .try_inverse()
            .map(|inv| inv * (e2 / 2.0))
            .unwrap_or_else(|| DMat::from_element(2, 2, f64::NAN))
    }
}
