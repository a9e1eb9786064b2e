#![allow(clippy::needless_range_loop)]
//! Variational tight-binding (VCHOS) spectra for superconducting circuits.
//!
//! Circuits whose potential is a sum of Josephson cosines are expanded in a
//! basis of displaced harmonic-oscillator states, one Fock ladder per
//! classical minimum. Because those states are not orthogonal, the
//! Hamiltonian becomes a generalized eigenproblem
//!
//!   T·x = E·S·x
//!
//! where the transfer matrix T and the inner-product matrix S are sums over
//! lattice translations of every minimum (periodic continuation).
//!
//! # Modules
//!
//! - [`circuit`]: `CircuitModel` trait, versioned `CircuitParameters`, constants
//! - [`circuits`]: Reference circuits (transmon, three-junction flux qubit)
//! - [`minima`]: Normalization, deduplication and ordering of minima
//! - [`normal_modes`]: Linearized potential, normal modes, Xi matrix
//! - [`lattice`]: Lattice-vector enumeration and Gaussian filtering
//! - [`operators`]: Ladder, phase and translation operators in Fock space
//! - [`transfer`]: Periodic continuation of transfer and overlap matrices
//! - [`optimize`]: Variational harmonic-length optimization
//! - [`spectrum`]: Generalized Hermitian eigensolver with fallback
//! - [`wavefunction`]: Phase-space wavefunctions on a 2D grid
//! - [`vchos`]: The `Vchos` engine with its version-tagged cache
//!
//! # Example
//!
//! ```no_run
//! use phyz_vchos::{circuits::Transmon, Vchos, VchosConfig};
//!
//! let transmon = Transmon::default_params();
//! let mut vchos = Vchos::new(transmon, VchosConfig::default()).unwrap();
//! let energies = vchos.eigenvalues(3).unwrap();
//! assert!(energies[1] > energies[0]);
//! ```

pub mod circuit;
pub mod circuits;
pub mod config;
pub mod error;
pub mod lattice;
pub mod minima;
pub mod normal_modes;
pub mod operators;
pub mod optimize;
pub mod spectrum;
pub mod transfer;
pub mod vchos;
pub mod wavefunction;

pub use circuit::{CircuitModel, CircuitParameters};
pub use config::{OptimizerConfig, VchosConfig};
pub use error::{Result, VchosError};
pub use spectrum::Spectrum;
pub use vchos::Vchos;
pub use wavefunction::{Grid1d, WaveFunctionOnGrid};

use nalgebra as na;

/// Complex scalar used for all operator algebra.
pub type C64 = num_complex::Complex64;
/// Dynamic real vector.
pub type DVec = na::DVector<f64>;
/// Dynamic real matrix.
pub type DMat = na::DMatrix<f64>;
/// Dynamic complex vector.
pub type CVec = na::DVector<C64>;
/// Dynamic complex matrix.
pub type CMat = na::DMatrix<C64>;
