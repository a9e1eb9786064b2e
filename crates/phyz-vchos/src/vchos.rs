//! The VCHOS engine.
//!
//! Derived state is cached lazily and tagged with the parameter version it
//! was computed from:
//!
//! - minima, normal modes and the EC matrix: keyed by version
//! - optimized harmonic lengths: keyed by version
//! - the neighbor table: keyed by version and the lengths it was filtered with
//!
//! Every public operation first brings the chain up to date, so a parameter
//! change through [`Vchos::circuit_mut`] can never be observed half-applied.

use std::f64::consts::PI;

use crate::circuit::{CircuitModel, CircuitParameters};
use crate::config::VchosConfig;
use crate::error::{Result, VchosError};
use crate::lattice::{
    build_neighbor_table, filter_for_minima_pair, worker_pool, FilterSettings, NeighborTable,
};
use crate::minima::sorted_minima;
use crate::normal_modes::{build_gamma_matrix, eigensystem_normal_modes, NormalModes};
use crate::operators::LadderOperators;
use crate::optimize::{optimize_harmonic_lengths, VariationalProblem};
use crate::spectrum::{solve_generalized, Spectrum};
use crate::transfer::{
    periodic_continuation, ContinuationInputs, KineticTerm, Overlap, PotentialTerm, TransferTerm,
};
use crate::wavefunction::{reconstruct, WaveFunctionOnGrid, WavefunctionInputs};
use crate::{CMat, DMat, DVec};

struct Basis {
    version: u64,
    minima: Vec<DVec>,
    modes: Vec<NormalModes>,
    ec: DMat,
}

struct Lengths {
    version: u64,
    lengths: Vec<f64>,
}

struct Neighbors {
    version: u64,
    lengths: Vec<f64>,
    table: NeighborTable,
}

#[derive(Default)]
struct DerivedCache {
    basis: Option<Basis>,
    lengths: Option<Lengths>,
    neighbors: Option<Neighbors>,
}

/// Everything one matrix assembly needs, owned and mutually consistent.
struct Assembly {
    params: CircuitParameters,
    minima: Vec<DVec>,
    ec: DMat,
    xi: DMat,
    xi_inv: DMat,
    neighbors: NeighborTable,
    ladder: LadderOperators,
}

impl Assembly {
    fn inputs(&self) -> ContinuationInputs<'_> {
        ContinuationInputs {
            params: &self.params,
            minima: &self.minima,
            xi_inv: &self.xi_inv,
            neighbors: &self.neighbors,
        }
    }

    fn transfer_term(&self) -> TransferTerm {
        TransferTerm {
            kinetic: KineticTerm::new(&self.ec, &self.xi_inv, &self.ladder),
            potential: PotentialTerm::new(&self.params, &self.xi, &self.ladder),
        }
    }
}

fn invert(xi: &DMat, stage: &str) -> Result<DMat> {
    xi.clone().try_inverse().ok_or_else(|| VchosError::SingularBasis {
        stage: stage.to_string(),
    })
}

fn filter_settings(params: &CircuitParameters, config: &VchosConfig) -> FilterSettings {
    FilterSettings {
        cutoff: config.nearest_neighbor_cutoff,
        maximum_site_length: config.maximum_site_length,
        max_radius: params.max_lattice_radius(),
        extended_dof: params.extended_dof(),
        periodic_dof: params.periodic_dof(),
    }
}

fn build_basis<C: CircuitModel>(circuit: &C, config: &VchosConfig) -> Result<Basis> {
    let params = circuit.parameters();
    params.validate()?;
    let dof = params.dof();
    let minima = sorted_minima(circuit, config.minima_tolerance)?;
    let capacitance = circuit.build_capacitance_matrix();
    let ec = circuit.build_ec_matrix();
    if ec.shape() != (dof, dof) {
        return Err(VchosError::Configuration(format!(
            "EC matrix has shape {:?}, expected ({dof}, {dof})",
            ec.shape()
        )));
    }
    let modes = minima
        .iter()
        .enumerate()
        .map(|(i, m)| eigensystem_normal_modes(&build_gamma_matrix(params, m), &capacitance, i))
        .collect::<Result<Vec<_>>>()?;
    log::debug!(
        "rebuilt minima and normal modes ({} minima) for parameter version {}",
        minima.len(),
        params.version()
    );
    Ok(Basis {
        version: params.version(),
        minima,
        modes,
        ec,
    })
}

fn current_basis<'a, C: CircuitModel>(
    circuit: &C,
    config: &VchosConfig,
    slot: &'a mut Option<Basis>,
) -> Result<&'a Basis> {
    let version = circuit.parameters().version();
    let basis = match slot.take() {
        Some(b) if b.version == version => b,
        _ => build_basis(circuit, config)?,
    };
    Ok(&*slot.insert(basis))
}

/// Optimize lengths at minimum 0 with the self-pair neighbors of the
/// unit-length basis.
fn compute_lengths<C: CircuitModel>(
    circuit: &C,
    config: &VchosConfig,
    basis: &Basis,
) -> Result<Vec<f64>> {
    let params = circuit.parameters();
    let modes = &basis.modes[0];
    let unit = vec![1.0; params.dof()];
    let xi_inv = invert(&modes.xi_matrix(&unit), "length optimization")?;
    let pool = worker_pool(config.num_workers)?;
    let neighbors = filter_for_minima_pair(
        &DVec::zeros(params.dof()),
        &xi_inv,
        &filter_settings(params, config),
        pool.as_ref(),
    );
    let problem = VariationalProblem {
        params,
        modes,
        ec: &basis.ec,
        minimum_location: &basis.minima[0],
        neighbors: &neighbors,
    };
    optimize_harmonic_lengths(&problem, 0, &config.optimizer)
}

fn current_lengths<'a, C: CircuitModel>(
    circuit: &C,
    config: &VchosConfig,
    basis: &Basis,
    slot: &'a mut Option<Lengths>,
) -> Result<&'a [f64]> {
    let version = circuit.parameters().version();
    let lengths = match slot.take() {
        Some(l) if l.version == version => l,
        _ => {
            log::debug!("optimizing harmonic lengths for parameter version {version}");
            Lengths {
                version,
                lengths: compute_lengths(circuit, config, basis)?,
            }
        }
    };
    Ok(slot.insert(lengths).lengths.as_slice())
}

fn current_neighbors<'a>(
    params: &CircuitParameters,
    config: &VchosConfig,
    basis: &Basis,
    lengths: &[f64],
    xi_inv: &DMat,
    slot: &'a mut Option<Neighbors>,
) -> Result<&'a NeighborTable> {
    let version = params.version();
    let neighbors = match slot.take() {
        Some(n) if n.version == version && n.lengths == lengths => n,
        _ => {
            log::debug!("rebuilding neighbor table for parameter version {version}");
            Neighbors {
                version,
                lengths: lengths.to_vec(),
                table: build_neighbor_table(
                    &basis.minima,
                    xi_inv,
                    &filter_settings(params, config),
                    config.num_workers,
                )?,
            }
        }
    };
    Ok(&slot.insert(neighbors).table)
}

/// Variational tight-binding solver for one circuit.
pub struct Vchos<C: CircuitModel> {
    circuit: C,
    config: VchosConfig,
    cache: DerivedCache,
}

impl<C: CircuitModel> Vchos<C> {
    /// Validates both the configuration and the circuit parameters.
    pub fn new(circuit: C, config: VchosConfig) -> Result<Self> {
        config.validate()?;
        circuit.parameters().validate()?;
        Ok(Self {
            circuit,
            config,
            cache: DerivedCache::default(),
        })
    }

    pub fn circuit(&self) -> &C {
        &self.circuit
    }

    /// Mutable access to the circuit. Changes made through parameter setters
    /// (or followed by `touch()`) invalidate every cached artifact.
    pub fn circuit_mut(&mut self) -> &mut C {
        &mut self.circuit
    }

    pub fn config(&self) -> &VchosConfig {
        &self.config
    }

    fn params(&self) -> &CircuitParameters {
        self.circuit.parameters()
    }

    fn prepare(&mut self) -> Result<Assembly> {
        let circuit = &self.circuit;
        let config = &self.config;
        let params = circuit.parameters();
        params.validate()?;

        let cache = &mut self.cache;
        let basis = current_basis(circuit, config, &mut cache.basis)?;
        let lengths = current_lengths(circuit, config, basis, &mut cache.lengths)?;
        let xi = basis.modes[0].xi_matrix(lengths);
        let xi_inv = invert(&xi, "periodic continuation")?;
        let neighbors =
            current_neighbors(params, config, basis, lengths, &xi_inv, &mut cache.neighbors)?;

        Ok(Assembly {
            params: params.clone(),
            minima: basis.minima.clone(),
            ec: basis.ec.clone(),
            neighbors: neighbors.clone(),
            ladder: LadderOperators::new(params.dof(), params.num_exc()),
            xi,
            xi_inv,
        })
    }

    /// Minima, normalized and deduplicated, ascending by potential.
    pub fn sorted_minima(&mut self) -> Result<Vec<DVec>> {
        Ok(current_basis(&self.circuit, &self.config, &mut self.cache.basis)?
            .minima
            .clone())
    }

    /// (num_exc + 1)^dof
    pub fn number_states_per_minimum(&self) -> usize {
        self.params().states_per_minimum()
    }

    /// Total basis size: minima count times states per minimum.
    pub fn hilbert_dim(&mut self) -> Result<usize> {
        let minima = self.sorted_minima()?.len();
        Ok(minima * self.number_states_per_minimum())
    }

    fn modes(&mut self, minimum: usize) -> Result<NormalModes> {
        let basis = current_basis(&self.circuit, &self.config, &mut self.cache.basis)?;
        basis.modes.get(minimum).cloned().ok_or_else(|| {
            VchosError::Configuration(format!(
                "minimum index {minimum} out of range ({} minima)",
                basis.minima.len()
            ))
        })
    }

    /// Normal-mode frequencies at `minimum`, ascending.
    pub fn omega_matrix(&mut self, minimum: usize) -> Result<DVec> {
        Ok(self.modes(minimum)?.omega())
    }

    /// Xi matrix of `minimum` with the optimized lengths applied.
    pub fn xi_matrix(&mut self, minimum: usize) -> Result<DMat> {
        let lengths = self.shared_lengths()?;
        Ok(self.modes(minimum)?.xi_matrix(&lengths))
    }

    fn shared_lengths(&mut self) -> Result<Vec<f64>> {
        let cache = &mut self.cache;
        let basis = current_basis(&self.circuit, &self.config, &mut cache.basis)?;
        Ok(current_lengths(&self.circuit, &self.config, basis, &mut cache.lengths)?.to_vec())
    }

    /// Harmonic length scales for every minimum. Lengths found at minimum 0
    /// are shared by all minima.
    pub fn optimized_lengths(&mut self) -> Result<Vec<Vec<f64>>> {
        let lengths = self.shared_lengths()?;
        let count = self.sorted_minima()?.len();
        Ok(vec![lengths; count])
    }

    /// Rerun the length optimization unconditionally. The neighbor table is
    /// rebuilt on next use since newly relevant lattice vectors may appear.
    pub fn optimize_lengths(&mut self) -> Result<Vec<f64>> {
        let version = self.params().version();
        let basis = current_basis(&self.circuit, &self.config, &mut self.cache.basis)?;
        let lengths = compute_lengths(&self.circuit, &self.config, basis)?;
        self.cache.lengths = Some(Lengths {
            version,
            lengths: lengths.clone(),
        });
        self.cache.neighbors = None;
        Ok(lengths)
    }

    /// Retained lattice vectors per minima pair for the current basis.
    pub fn nearest_neighbors(&mut self) -> Result<NeighborTable> {
        Ok(self.prepare()?.neighbors)
    }

    /// For each minima pair, the largest ratio of the directional harmonic
    /// length 4·(uᵗ·Xi⁻ᵗ·Xi⁻¹·u)^(−1/2) to half the distance to a retained
    /// periodic image. Values near or above 1 mean neighboring basis states
    /// overlap strongly.
    pub fn harmonic_length_ratios(&mut self) -> Result<Vec<((usize, usize), f64)>> {
        let assembly = self.prepare()?;
        let delta_inv = assembly.xi_inv.transpose() * &assembly.xi_inv;
        let ratios = assembly
            .neighbors
            .iter()
            .map(|((m, p), vectors)| {
                let diff = &assembly.minima[p] - &assembly.minima[m];
                let same_minimum = diff.amax() <= 1e-8;
                let ratio = vectors
                    .iter()
                    .filter(|v| !(same_minimum && v.iter().all(|&n| n == 0)))
                    .filter_map(|v| {
                        let lattice = v.iter().map(|&n| 2.0 * PI * n as f64);
                        let image = DVec::from_iterator(v.len(), lattice) + &diff;
                        let half_distance = image.norm() / 2.0;
                        if half_distance == 0.0 {
                            return None;
                        }
                        let unit = image.normalize();
                        let harmonic = 4.0 * unit.dot(&(&delta_inv * &unit)).powf(-0.5);
                        Some(harmonic / half_distance)
                    })
                    .fold(0.0, f64::max);
                ((m, p), ratio)
            })
            .collect();
        Ok(ratios)
    }

    /// Kinetic plus potential periodic continuation.
    pub fn transfer_matrix(&mut self) -> Result<CMat> {
        let assembly = self.prepare()?;
        periodic_continuation(&assembly.transfer_term(), &assembly.inputs(), &assembly.ladder)
    }

    /// Gram matrix of the displaced-oscillator basis.
    pub fn inner_product_matrix(&mut self) -> Result<CMat> {
        let assembly = self.prepare()?;
        periodic_continuation(&Overlap::new(&assembly.ladder), &assembly.inputs(), &assembly.ladder)
    }

    pub fn kinetic_matrix(&mut self) -> Result<CMat> {
        let assembly = self.prepare()?;
        let kinetic = KineticTerm::new(&assembly.ec, &assembly.xi_inv, &assembly.ladder);
        periodic_continuation(&kinetic, &assembly.inputs(), &assembly.ladder)
    }

    pub fn potential_matrix(&mut self) -> Result<CMat> {
        let assembly = self.prepare()?;
        let potential = PotentialTerm::new(&assembly.params, &assembly.xi, &assembly.ladder);
        periodic_continuation(&potential, &assembly.inputs(), &assembly.ladder)
    }

    fn solve(&mut self, count: usize) -> Result<(Assembly, Spectrum)> {
        let assembly = self.prepare()?;
        let inputs = assembly.inputs();
        let transfer = periodic_continuation(&assembly.transfer_term(), &inputs, &assembly.ladder)?;
        let overlap = Overlap::new(&assembly.ladder);
        let inner = periodic_continuation(&overlap, &inputs, &assembly.ladder)?;
        let spectrum = solve_generalized(&transfer, &inner, count, self.config.overlap_threshold)?;
        Ok((assembly, spectrum))
    }

    /// Lowest `count` energies, ascending.
    pub fn eigenvalues(&mut self, count: usize) -> Result<Vec<f64>> {
        Ok(self.solve(count)?.1.energies)
    }

    /// Lowest `count` energies with S-normalized, phase-standardized states.
    pub fn eigensystem(&mut self, count: usize) -> Result<Spectrum> {
        Ok(self.solve(count)?.1)
    }

    /// Eigenstate `which` on the configured phase grid. Two degrees of
    /// freedom only; an extended first coordinate uses the extended grid.
    pub fn wavefunction(&mut self, which: usize) -> Result<WaveFunctionOnGrid> {
        if self.params().dof() != 2 {
            return Err(VchosError::Configuration(format!(
                "wavefunctions are only available for 2 degrees of freedom, circuit has {}",
                self.params().dof()
            )));
        }
        let (assembly, spectrum) = self.solve(which + 1)?;
        let phi_1 = if assembly.params.extended_dof() > 0 {
            self.config.extended_grid.clone()
        } else {
            self.config.periodic_grid.clone()
        };
        reconstruct(&WavefunctionInputs {
            params: &assembly.params,
            minima: &assembly.minima,
            xi: &assembly.xi,
            state: &spectrum.states[which],
            phi_1,
            phi_2: self.config.periodic_grid.clone(),
        })
    }
}
