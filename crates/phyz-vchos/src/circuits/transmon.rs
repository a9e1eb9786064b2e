//! Single-junction transmon: H = 4EC(n − ng)² − EJ cos φ.

use crate::circuit::{CircuitModel, CircuitParameters, ELEMENTARY_CHARGE};
use crate::error::{Result, VchosError};
use crate::{DMat, DVec};

#[derive(Debug, Clone)]
pub struct Transmon {
    params: CircuitParameters,
    ec: f64,
}

impl Transmon {
    pub fn new(
        ej: f64,
        ec: f64,
        ng: f64,
        num_exc: usize,
        max_lattice_radius: usize,
    ) -> Result<Self> {
        if !(ec > 0.0 && ec.is_finite()) {
            return Err(VchosError::Configuration(format!("EC must be positive, got {ec}")));
        }
        let radius = max_lattice_radius;
        let params = CircuitParameters::new(1, 1, vec![ej], vec![ng], 0.0, vec![], num_exc, radius)?;
        Ok(Self { params, ec })
    }

    /// EJ = 15, EC = 0.3, ng = 0 with 5 levels and lattice radius 3.
    pub fn default_params() -> Self {
        Self {
            params: CircuitParameters::new_unchecked(
                1,
                1,
                vec![15.0],
                vec![0.0],
                0.0,
                vec![],
                4,
                3,
            ),
            ec: 0.3,
        }
    }

    pub fn ej(&self) -> f64 {
        self.params.ej()[0]
    }

    pub fn ec(&self) -> f64 {
        self.ec
    }

    pub fn ng(&self) -> f64 {
        self.params.ng()[0]
    }

    pub fn set_ej(&mut self, ej: f64) {
        self.params.set_ej_at(0, ej);
    }

    pub fn set_ec(&mut self, ec: f64) {
        self.ec = ec;
        self.params.touch();
    }

    pub fn set_ng(&mut self, ng: f64) {
        self.params.set_ng(vec![ng]);
    }
}

impl CircuitModel for Transmon {
    fn parameters(&self) -> &CircuitParameters {
        &self.params
    }

    fn parameters_mut(&mut self) -> &mut CircuitParameters {
        &mut self.params
    }

    fn potential(&self, phi: &DVec) -> f64 {
        -self.ej() * phi[0].cos()
    }

    fn find_minima(&self) -> Vec<DVec> {
        vec![DVec::zeros(1)]
    }

    fn build_capacitance_matrix(&self) -> DMat {
        DMat::from_element(1, 1, ELEMENTARY_CHARGE * ELEMENTARY_CHARGE / (2.0 * self.ec))
    }

    fn build_ec_matrix(&self) -> DMat {
        DMat::from_element(1, 1, self.ec)
    }
}
