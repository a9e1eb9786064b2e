//! Integration tests for the VCHOS engine.

use approx::assert_relative_eq;
use phyz_vchos::{
    circuits::{FluxQubit, Transmon},
    transfer::hermitian_error,
    CircuitModel, CircuitParameters, DMat, DVec, Vchos, VchosConfig, VchosError,
};

fn small_flux_qubit(flux: f64) -> FluxQubit {
    FluxQubit::new(
        [1.0, 1.0, 0.8],
        [0.016, 0.016, 0.02],
        [0.83, 0.83],
        [0.0, 0.0],
        flux,
        2,
        1,
    )
    .unwrap()
}

#[test]
fn test_flux_qubit_matrices_hermitian() {
    let mut vchos = Vchos::new(small_flux_qubit(0.46), VchosConfig::default()).unwrap();
    let t = vchos.transfer_matrix().unwrap();
    let s = vchos.inner_product_matrix().unwrap();
    assert_eq!(t.shape(), (18, 18));
    assert_eq!(vchos.hilbert_dim().unwrap(), 18);
    assert!(hermitian_error(&t) < 1e-10, "transfer error {}", hermitian_error(&t));
    assert!(hermitian_error(&s) < 1e-10, "overlap error {}", hermitian_error(&s));
}

#[test]
fn test_flux_qubit_spectrum_ascending() {
    let mut vchos = Vchos::new(small_flux_qubit(0.46), VchosConfig::default()).unwrap();
    let energies = vchos.eigenvalues(4).unwrap();
    assert_eq!(energies.len(), 4);
    for pair in energies.windows(2) {
        assert!(pair[0] <= pair[1]);
    }
}

#[test]
fn test_transmon_spectrum() {
    let mut vchos = Vchos::new(Transmon::default_params(), VchosConfig::default()).unwrap();
    let spectrum = vchos.eigensystem(3).unwrap();
    let energies = &spectrum.energies;
    assert_eq!(spectrum.ground_energy(), energies[0]);
    assert_eq!(spectrum.ground_state().len(), vchos.hilbert_dim().unwrap());
    // √(8 EJ EC)/2 − EC/4 above the potential minimum
    assert!(energies[0] > 2.85 && energies[0] < 2.95, "E0 = {}", energies[0]);
    // √(8 EJ EC) − EC
    assert_relative_eq!(energies[1] - energies[0], 5.7, epsilon = 0.1);
    assert!(energies[2] - energies[1] < energies[1] - energies[0]);
}

#[test]
fn test_eigensystem_idempotent() {
    let mut vchos = Vchos::new(small_flux_qubit(0.5), VchosConfig::default()).unwrap();
    let first = vchos.eigensystem(3).unwrap();
    let second = vchos.eigensystem(3).unwrap();
    assert_eq!(first.energies, second.energies);
    for (a, b) in first.states.iter().zip(&second.states) {
        assert!((a - b).norm() < 1e-12);
    }
}

#[test]
fn test_flux_change_invalidates_spectrum() {
    let mut vchos = Vchos::new(small_flux_qubit(0.5), VchosConfig::default()).unwrap();
    let symmetric = vchos.eigenvalues(2).unwrap();
    let minima_before = vchos.sorted_minima().unwrap();
    vchos.circuit_mut().set_flux(0.45);
    let biased = vchos.eigenvalues(2).unwrap();
    let minima_after = vchos.sorted_minima().unwrap();
    assert!((minima_before[0].clone() - &minima_after[0]).norm() > 1e-3);
    // Away from the sweet spot the two wells split further apart.
    assert!(biased[1] - biased[0] > symmetric[1] - symmetric[0]);
}

#[test]
fn test_neighbor_table_pairs() {
    let mut vchos = Vchos::new(small_flux_qubit(0.46), VchosConfig::default()).unwrap();
    let table = vchos.nearest_neighbors().unwrap();
    let pairs: Vec<(usize, usize)> = table.iter().map(|(k, _)| k).collect();
    assert_eq!(pairs, vec![(0, 0), (0, 1), (1, 1)]);
    assert_eq!(table.get(0, 0), table.get(1, 1));
    assert!(table.get(0, 0).unwrap().contains(&vec![0, 0]));
    assert_eq!(table.get(1, 0), table.get(0, 1));
}

#[test]
fn test_flux_qubit_wavefunction() {
    let mut config = VchosConfig::default();
    config.periodic_grid.pt_count = 40;
    let mut vchos = Vchos::new(small_flux_qubit(0.5), config).unwrap();
    let wf = vchos.wavefunction(0).unwrap();
    assert_eq!(wf.amplitudes.shape(), (40, 40));
    let peak = wf
        .amplitudes
        .iter()
        .copied()
        .max_by(|a, b| a.norm().total_cmp(&b.norm()))
        .unwrap();
    assert!(peak.re > 0.0);
    assert_relative_eq!(peak.im, 0.0, epsilon = 1e-12);
}

#[test]
fn test_xi_matrices_and_lengths() {
    let mut vchos = Vchos::new(small_flux_qubit(0.46), VchosConfig::default()).unwrap();
    let lengths = vchos.optimized_lengths().unwrap();
    assert_eq!(lengths.len(), 2);
    assert_eq!(lengths[0], lengths[1]);
    let xi = vchos.xi_matrix(0).unwrap();
    assert_eq!(xi.shape(), (2, 2));
    assert!(xi.determinant().abs() > 0.0);
    let omega = vchos.omega_matrix(1).unwrap();
    assert!(omega[0] > 0.0 && omega[0] <= omega[1]);
}

#[test]
fn test_config_from_json() {
    let json = r#"{"num_workers": 2, "optimizer": {"tolerance": 0.05}}"#;
    let config = VchosConfig::from_json(json).unwrap();
    assert_eq!(config.num_workers, 2);
    assert_relative_eq!(config.optimizer.tolerance, 0.05);
    assert_eq!(config.optimizer.max_iterations, 400);

    let mut serial = Vchos::new(Transmon::default_params(), VchosConfig::default()).unwrap();
    let mut pooled = Vchos::new(Transmon::default_params(), config).unwrap();
    assert_eq!(
        serial.nearest_neighbors().unwrap().get(0, 0),
        pooled.nearest_neighbors().unwrap().get(0, 0)
    );
}

/// Circuit whose minima search comes back empty.
struct Unbound {
    params: CircuitParameters,
}

impl CircuitModel for Unbound {
    fn parameters(&self) -> &CircuitParameters {
        &self.params
    }

    fn parameters_mut(&mut self) -> &mut CircuitParameters {
        &mut self.params
    }

    fn potential(&self, phi: &DVec) -> f64 {
        -phi[0].cos()
    }

    fn find_minima(&self) -> Vec<DVec> {
        Vec::new()
    }

    fn build_capacitance_matrix(&self) -> DMat {
        DMat::identity(1, 1)
    }

    fn build_ec_matrix(&self) -> DMat {
        DMat::identity(1, 1)
    }
}

#[test]
fn test_no_minima_reported() {
    let params = CircuitParameters::new(1, 1, vec![1.0], vec![0.0], 0.0, vec![], 1, 1).unwrap();
    let mut vchos = Vchos::new(Unbound { params }, VchosConfig::default()).unwrap();
    assert!(matches!(vchos.eigenvalues(1), Err(VchosError::NoMinima)));
}
