//! Variational tuning of the harmonic length scales.
//!
//! Starting from ℓ = 1 (the pure harmonic approximation), each Xi column is
//! stretched to minimize the single-state energy estimate
//!
//!   E(ℓ) = Re[ Σ_ν c(ν) t(ν) / Σ_ν c(ν) ]
//!
//! i.e. the scalar periodic continuation of the ground state of one minimum.
//! The search is derivative-free (Nelder-Mead) with a coarse tolerance.

use crate::circuit::CircuitParameters;
use crate::config::OptimizerConfig;
use crate::error::{Result, VchosError};
use crate::lattice::LatticeVector;
use crate::normal_modes::NormalModes;
use crate::operators::one_state_exp_i_phi_factors;
use crate::transfer::ScalarTransfer;
use crate::{DMat, DVec};

/// Result of a Nelder-Mead run.
#[derive(Debug, Clone)]
pub struct NelderMeadOutcome {
    pub x: Vec<f64>,
    pub value: f64,
    pub iterations: usize,
    pub converged: bool,
    /// Larger of the final simplex energy spread and simplex size.
    pub spread: f64,
}

/// Minimize `f` starting from `x0`.
///
/// Converged once every vertex lies within `tolerance` of the best one, both
/// in position and in function value.
pub fn nelder_mead<F>(mut f: F, x0: &[f64], config: &OptimizerConfig) -> NelderMeadOutcome
where
    F: FnMut(&[f64]) -> f64,
{
    let n = x0.len();
    let mut eval = |x: &[f64]| {
        let v = f(x);
        if v.is_finite() {
            v
        } else {
            f64::INFINITY
        }
    };

    let mut simplex: Vec<Vec<f64>> = Vec::with_capacity(n + 1);
    simplex.push(x0.to_vec());
    for i in 0..n {
        let mut vertex = x0.to_vec();
        vertex[i] += config.initial_step;
        simplex.push(vertex);
    }
    let mut values: Vec<f64> = simplex.iter().map(|x| eval(x)).collect();

    let mut iterations = 0;
    let spread = loop {
        let mut order: Vec<usize> = (0..=n).collect();
        order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
        simplex = order.iter().map(|&i| simplex[i].clone()).collect();
        values = order.iter().map(|&i| values[i]).collect();

        let x_spread = simplex[1..]
            .iter()
            .flat_map(|v| v.iter().zip(&simplex[0]).map(|(a, b)| (a - b).abs()))
            .fold(0.0, f64::max);
        let f_spread = values[1..]
            .iter()
            .map(|v| (v - values[0]).abs())
            .fold(0.0, f64::max);
        let spread = x_spread.max(f_spread);
        if x_spread <= config.tolerance && f_spread <= config.tolerance {
            return NelderMeadOutcome {
                x: simplex[0].clone(),
                value: values[0],
                iterations,
                converged: true,
                spread,
            };
        }
        if iterations >= config.max_iterations {
            break spread;
        }
        iterations += 1;

        let mut centroid = vec![0.0; n];
        for vertex in &simplex[..n] {
            for (c, x) in centroid.iter_mut().zip(vertex) {
                *c += x / n as f64;
            }
        }
        let along = |t: f64| -> Vec<f64> {
            centroid
                .iter()
                .zip(&simplex[n])
                .map(|(c, w)| c + t * (c - w))
                .collect()
        };

        let reflected = along(1.0);
        let f_reflected = eval(&reflected);
        if f_reflected < values[0] {
            let expanded = along(2.0);
            let f_expanded = eval(&expanded);
            if f_expanded < f_reflected {
                simplex[n] = expanded;
                values[n] = f_expanded;
            } else {
                simplex[n] = reflected;
                values[n] = f_reflected;
            }
        } else if f_reflected < values[n - 1] {
            simplex[n] = reflected;
            values[n] = f_reflected;
        } else {
            let (contracted, f_contracted) = if f_reflected < values[n] {
                let c = along(0.5);
                let fc = eval(&c);
                (c, fc)
            } else {
                let c = along(-0.5);
                let fc = eval(&c);
                (c, fc)
            };
            if f_contracted < values[n].min(f_reflected) {
                simplex[n] = contracted;
                values[n] = f_contracted;
            } else {
                // Shrink toward the best vertex.
                for i in 1..=n {
                    let shrunk: Vec<f64> = simplex[i]
                        .iter()
                        .zip(&simplex[0])
                        .map(|(x, b)| b + 0.5 * (x - b))
                        .collect();
                    values[i] = eval(&shrunk);
                    simplex[i] = shrunk;
                }
            }
        }
    };

    NelderMeadOutcome {
        x: simplex[0].clone(),
        value: values[0],
        iterations,
        converged: false,
        spread,
    }
}

/// Inputs of the single-state variational energy for one minimum.
pub struct VariationalProblem<'a> {
    pub params: &'a CircuitParameters,
    pub modes: &'a NormalModes,
    pub ec: &'a DMat,
    pub minimum_location: &'a DVec,
    /// Self-pair lattice vectors of the minimum.
    pub neighbors: &'a [LatticeVector],
}

impl VariationalProblem<'_> {
    /// Ground-state energy estimate with length scales `lengths`.
    pub fn energy(&self, lengths: &[f64]) -> f64 {
        let xi = self.modes.xi_matrix(lengths);
        let Some(xi_inv) = xi.clone().try_inverse() else {
            return f64::INFINITY;
        };
        let boundary = self
            .params
            .has_boundary_junction()
            .then(|| self.params.boundary_coefficients());
        let scalar = ScalarTransfer {
            params: self.params,
            xi_inv: &xi_inv,
            ec_t: &xi_inv * self.ec * xi_inv.transpose(),
            exp_i_phi: one_state_exp_i_phi_factors(&xi, boundary),
        };
        let (transfer, inner) = scalar.transfer_and_inner(self.minimum_location, self.neighbors);
        (transfer / inner).re
    }
}

/// Optimize the length scales of minimum `minimum`, starting from all ones.
///
/// Non-convergence is an error carrying the minimum index and the tolerance
/// actually reached.
pub fn optimize_harmonic_lengths(
    problem: &VariationalProblem<'_>,
    minimum: usize,
    config: &OptimizerConfig,
) -> Result<Vec<f64>> {
    let start = vec![1.0; problem.params.dof()];
    let outcome = nelder_mead(|l| problem.energy(l), &start, config);
    log::debug!(
        "length optimization at minimum {minimum}: {} iterations, energy {:.6}, spread {:.3e}",
        outcome.iterations,
        outcome.value,
        outcome.spread
    );
    if !outcome.converged {
        return Err(VchosError::OptimizationFailure {
            minimum,
            iterations: outcome.iterations,
            achieved_tolerance: outcome.spread,
        });
    }
    log::info!("completed harmonic length optimization for the m={minimum} minimum");
    Ok(outcome.x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn tight() -> OptimizerConfig {
        OptimizerConfig {
            tolerance: 1e-8,
            initial_step: 0.5,
            max_iterations: 2000,
        }
    }

    #[test]
    fn test_quadratic_bowl() {
        let f = |x: &[f64]| (x[0] - 1.5).powi(2) + 2.0 * (x[1] + 0.5).powi(2);
        let out = nelder_mead(f, &[0.0, 0.0], &tight());
        assert!(out.converged);
        assert!((out.x[0] - 1.5).abs() < 1e-3);
        assert!((out.x[1] + 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_rosenbrock() {
        let f = |x: &[f64]| (1.0 - x[0]).powi(2) + 100.0 * (x[1] - x[0] * x[0]).powi(2);
        let out = nelder_mead(f, &[-1.2, 1.0], &tight());
        assert!(out.converged);
        assert!((out.x[0] - 1.0).abs() < 1e-2, "{:?}", out.x);
    }

    #[test]
    fn test_iteration_cap_reports_failure() {
        let config = OptimizerConfig {
            tolerance: 1e-14,
            initial_step: 1.0,
            max_iterations: 3,
        };
        let out = nelder_mead(|x: &[f64]| (x[0] - 10.0).powi(2), &[0.0], &config);
        assert!(!out.converged);
        assert_eq!(out.iterations, 3);
        assert!(out.spread.is_finite() && out.spread > config.tolerance);

        // No steps taken: the spread is that of the starting simplex,
        // max(|1 − 0|, |81 − 100|).
        let start = nelder_mead(
            |x: &[f64]| (x[0] - 10.0).powi(2),
            &[0.0],
            &OptimizerConfig {
                max_iterations: 0,
                ..config
            },
        );
        assert_eq!(start.iterations, 0);
        assert_relative_eq!(start.spread, 19.0, epsilon = 1e-12);
    }

    #[test]
    fn test_non_finite_values_avoided() {
        let f = |x: &[f64]| if x[0] < 0.5 { f64::NAN } else { (x[0] - 1.0).powi(2) };
        let out = nelder_mead(f, &[0.6], &tight());
        assert!((out.x[0] - 1.0).abs() < 1e-3);
    }
}
