//! Phase-space wavefunctions of two-degree-of-freedom circuits.
//!
//! An eigenvector is a set of Fock amplitudes per minimum. On a grid point φ
//! the wavefunction is the sum, over every minimum and every lattice image
//! within the cube [−R, R]^periodic_dof, of
//!
//!   |det Xi|^(−1/2) · exp(−i ng·δ) · Σ_{s1,s2} a_{s1 s2} ψ_{s1}(x_1) ψ_{s2}(x_2)
//!
//! with δ = 2πν − φ_m the image offset and x = Xi⁻¹·(φ + δ) the normal-mode
//! coordinates.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::circuit::CircuitParameters;
use crate::error::{Result, VchosError};
use crate::spectrum::standardize_phase;
use crate::{CMat, CVec, DMat, DVec, C64};

/// Evenly spaced points, both endpoints included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid1d {
    pub min_val: f64,
    pub max_val: f64,
    pub pt_count: usize,
}

impl Grid1d {
    pub fn new(min_val: f64, max_val: f64, pt_count: usize) -> Self {
        Self {
            min_val,
            max_val,
            pt_count,
        }
    }

    pub fn linspace(&self) -> Vec<f64> {
        match self.pt_count {
            0 => Vec::new(),
            1 => vec![self.min_val],
            n => {
                let step = (self.max_val - self.min_val) / (n - 1) as f64;
                (0..n).map(|i| self.min_val + step * i as f64).collect()
            }
        }
    }
}

/// Complex amplitudes on a 2D grid; `amplitudes[(i, j)]` is the value at
/// `(phi_1[i], phi_2[j])`.
#[derive(Debug, Clone)]
pub struct WaveFunctionOnGrid {
    pub phi_1: Grid1d,
    pub phi_2: Grid1d,
    pub amplitudes: CMat,
}

impl WaveFunctionOnGrid {
    /// Σ |ψ|² times the grid cell area.
    pub fn norm_squared(&self) -> f64 {
        let cell = |g: &Grid1d| {
            if g.pt_count > 1 {
                (g.max_val - g.min_val) / (g.pt_count - 1) as f64
            } else {
                1.0
            }
        };
        let total: f64 = self.amplitudes.iter().map(|z| z.norm_sqr()).sum();
        total * cell(&self.phi_1) * cell(&self.phi_2)
    }
}

/// Normalized harmonic-oscillator eigenfunctions ψ_0..ψ_{levels−1} at `x`.
///
/// ψ_n = √(2/n)·x·ψ_{n−1} − √((n−1)/n)·ψ_{n−2}, which stays finite where the
/// bare Hermite polynomials overflow.
pub fn harmonic_oscillator_values(levels: usize, x: f64) -> Vec<f64> {
    let mut values = Vec::with_capacity(levels);
    if levels == 0 {
        return values;
    }
    values.push(PI.powf(-0.25) * (-0.5 * x * x).exp());
    if levels > 1 {
        values.push(2f64.sqrt() * x * values[0]);
    }
    for n in 2..levels {
        let nf = n as f64;
        let next = (2.0 / nf).sqrt() * x * values[n - 1] - ((nf - 1.0) / nf).sqrt() * values[n - 2];
        values.push(next);
    }
    values
}

/// Every integer vector in [−radius, radius]^dims.
fn lattice_cube(radius: i64, dims: usize) -> Vec<Vec<i64>> {
    let mut out = vec![Vec::with_capacity(dims)];
    for _ in 0..dims {
        out = out
            .into_iter()
            .flat_map(|prefix| {
                (-radius..=radius).map(move |n| {
                    let mut v = prefix.clone();
                    v.push(n);
                    v
                })
            })
            .collect();
    }
    out
}

/// What the reconstruction reads from the engine.
pub struct WavefunctionInputs<'a> {
    pub params: &'a CircuitParameters,
    pub minima: &'a [DVec],
    pub xi: &'a DMat,
    pub state: &'a CVec,
    pub phi_1: Grid1d,
    pub phi_2: Grid1d,
}

/// Evaluate an eigenvector on the grid `phi_1 × phi_2`.
pub fn reconstruct(inputs: &WavefunctionInputs<'_>) -> Result<WaveFunctionOnGrid> {
    let params = inputs.params;
    if params.dof() != 2 {
        return Err(VchosError::Configuration(format!(
            "wavefunctions are only available for 2 degrees of freedom, circuit has {}",
            params.dof()
        )));
    }
    let xi_inv = inputs.xi.clone().try_inverse().ok_or_else(|| VchosError::SingularBasis {
        stage: "wavefunction reconstruction".to_string(),
    })?;
    let normalization = inputs.xi.determinant().abs().powf(-0.5);

    let levels = params.num_exc() + 1;
    let per_minimum = levels * levels;
    if inputs.state.len() != inputs.minima.len() * per_minimum {
        return Err(VchosError::Configuration(format!(
            "state has {} entries, expected {} minima x {per_minimum} states",
            inputs.state.len(),
            inputs.minima.len()
        )));
    }

    let phi_1 = inputs.phi_1.linspace();
    let phi_2 = inputs.phi_2.linspace();
    let mut amplitudes = CMat::zeros(phi_1.len(), phi_2.len());
    let extended = params.extended_dof();
    let images = lattice_cube(params.max_lattice_radius() as i64, params.periodic_dof());

    for (m, minimum) in inputs.minima.iter().enumerate() {
        let coefficients = DMat::from_fn(levels, levels, |s1, s2| {
            inputs.state[m * per_minimum + s1 * levels + s2].re
        });
        for image in &images {
            let mut offset = -minimum.clone();
            for (k, &n) in image.iter().enumerate() {
                offset[extended + k] += 2.0 * PI * n as f64;
            }
            let charge_phase: f64 = params.ng().iter().zip(offset.iter()).map(|(n, d)| n * d).sum();
            let prefactor = C64::from_polar(normalization, -charge_phase);

            for (i, &x1) in phi_1.iter().enumerate() {
                for (j, &x2) in phi_2.iter().enumerate() {
                    let shifted = DVec::from_vec(vec![x1 + offset[0], x2 + offset[1]]);
                    let modes = &xi_inv * shifted;
                    let psi_1 = harmonic_oscillator_values(levels, modes[0]);
                    let psi_2 = harmonic_oscillator_values(levels, modes[1]);
                    let value = psi_1.iter().enumerate().fold(0.0, |acc, (s1, &p1)| {
                        acc + p1
                            * psi_2
                                .iter()
                                .enumerate()
                                .map(|(s2, &p2)| coefficients[(s1, s2)] * p2)
                                .sum::<f64>()
                    });
                    amplitudes[(i, j)] += prefactor * value;
                }
            }
        }
    }

    standardize_phase(amplitudes.as_mut_slice());
    Ok(WaveFunctionOnGrid {
        phi_1: inputs.phi_1.clone(),
        phi_2: inputs.phi_2.clone(),
        amplitudes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn params(radius: usize) -> CircuitParameters {
        let ej = vec![1.0, 1.0, 0.8];
        CircuitParameters::new(2, 2, ej, vec![0.0, 0.0], 0.0, vec![1.0, -1.0], 0, radius).unwrap()
    }

    #[test]
    fn test_linspace_endpoints() {
        let g = Grid1d::new(-1.0, 1.0, 5);
        assert_eq!(g.linspace(), vec![-1.0, -0.5, 0.0, 0.5, 1.0]);
        assert_eq!(Grid1d::new(2.0, 3.0, 1).linspace(), vec![2.0]);
    }

    #[test]
    fn test_oscillator_functions_orthonormal() {
        let grid = Grid1d::new(-12.0, 12.0, 4001).linspace();
        let dx = grid[1] - grid[0];
        let values: Vec<Vec<f64>> =
            grid.iter().map(|&x| harmonic_oscillator_values(5, x)).collect();
        for a in 0..5 {
            for b in 0..5 {
                let integral: f64 = values.iter().map(|v| v[a] * v[b]).sum::<f64>() * dx;
                let expected = if a == b { 1.0 } else { 0.0 };
                assert_relative_eq!(integral, expected, epsilon = 1e-8);
            }
        }
    }

    #[test]
    fn test_lattice_cube_size() {
        let cube = lattice_cube(1, 2);
        assert_eq!(cube.len(), 9);
        assert!(cube.contains(&vec![-1, 1]));
        assert_eq!(lattice_cube(2, 0), vec![Vec::<i64>::new()]);
    }

    #[test]
    fn test_single_gaussian_profile() {
        let p = params(0);
        let xi = DMat::from_diagonal(&DVec::from_vec(vec![0.5, 0.8]));
        let minima = vec![DVec::zeros(2)];
        let state = CVec::from_vec(vec![C64::new(1.0, 0.0)]);
        let grid = Grid1d::new(-1.0, 1.0, 5);
        let wf = reconstruct(&WavefunctionInputs {
            params: &p,
            minima: &minima,
            xi: &xi,
            state: &state,
            phi_1: grid.clone(),
            phi_2: grid,
        })
        .unwrap();
        assert_eq!(wf.amplitudes.shape(), (5, 5));
        // (phi_1, phi_2) = (0.5, -1.0) sits at index (3, 0)
        let x1: f64 = 0.5 / 0.5;
        let x2: f64 = -1.0 / 0.8;
        let expected = (0.4f64).powf(-0.5) / PI.sqrt() * (-0.5 * (x1 * x1 + x2 * x2)).exp();
        assert_relative_eq!(wf.amplitudes[(3, 0)].re, expected, epsilon = 1e-12);
        assert_relative_eq!(wf.amplitudes[(3, 0)].im, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_only_two_degrees_of_freedom() {
        let p = CircuitParameters::new(1, 1, vec![15.0], vec![0.0], 0.0, vec![], 0, 1).unwrap();
        let xi = DMat::identity(1, 1);
        let minima = vec![DVec::zeros(1)];
        let state = CVec::from_vec(vec![C64::new(1.0, 0.0)]);
        let grid = Grid1d::new(-1.0, 1.0, 3);
        let result = reconstruct(&WavefunctionInputs {
            params: &p,
            minima: &minima,
            xi: &xi,
            state: &state,
            phi_1: grid.clone(),
            phi_2: grid,
        });
        assert!(matches!(result, Err(VchosError::Configuration(_))));
    }

    #[test]
    fn test_images_add_periodic_copies() {
        let xi = DMat::identity(2, 2) * 0.5;
        let minima = vec![DVec::zeros(2)];
        let state = CVec::from_vec(vec![C64::new(1.0, 0.0)]);
        let grid = Grid1d::new(0.0, 2.0 * PI, 3);
        let inputs = |p: &CircuitParameters| {
            reconstruct(&WavefunctionInputs {
                params: p,
                minima: &minima,
                xi: &xi,
                state: &state,
                phi_1: grid.clone(),
                phi_2: grid.clone(),
            })
            .unwrap()
        };
        let single = inputs(&params(0));
        let periodic = inputs(&params(1));
        // (2π, 2π) is the image of the origin
        assert_relative_eq!(
            periodic.amplitudes[(2, 2)].re,
            single.amplitudes[(0, 0)].re,
            epsilon = 1e-10
        );
        assert!(single.amplitudes[(2, 2)].norm() < 1e-12);
    }
}
