//! Classical minima: normalization, deduplication, ordering.
//!
//! Periodic coordinates are only defined modulo 2π, so a minimum found at
//! φ and one found at φ + 2πn are the same physical configuration. The
//! engine keeps one representative per class, sorted by potential energy.

use std::f64::consts::PI;

use crate::circuit::CircuitModel;
use crate::error::{Result, VchosError};
use crate::DVec;

const TWO_PI: f64 = 2.0 * PI;

/// Reduce the periodic coordinates of `minimum` into (−π, π].
///
/// The first `extended_dof` coordinates are non-compact and left untouched.
pub fn normalize_minimum(minimum: &DVec, extended_dof: usize) -> DVec {
    let mut out = minimum.clone();
    for i in extended_dof..out.len() {
        let wrapped = out[i].rem_euclid(TWO_PI);
        out[i] = if wrapped > PI { wrapped - TWO_PI } else { wrapped };
    }
    out
}

/// `true` if `candidate` is not equivalent to any minimum in `known`.
pub fn is_new_minimum(candidate: &DVec, known: &[DVec], extended_dof: usize, tol: f64) -> bool {
    !known.iter().any(|m| {
        (0..m.len()).all(|i| {
            let diff = m[i] - candidate[i];
            if i < extended_dof {
                diff.abs() <= tol
            } else {
                let wrapped = diff.rem_euclid(TWO_PI);
                wrapped.abs() <= tol || (wrapped - TWO_PI).abs() <= tol
            }
        })
    })
}

/// Keep the first representative of every equivalence class.
pub fn filter_repeated_minima(minima: &[DVec], extended_dof: usize, tol: f64) -> Vec<DVec> {
    let mut filtered: Vec<DVec> = Vec::with_capacity(minima.len());
    for m in minima {
        if is_new_minimum(m, &filtered, extended_dof, tol) {
            filtered.push(m.clone());
        }
    }
    filtered
}

/// Normalized, deduplicated minima and their potential values, ascending by
/// potential.
pub fn sorted_potential_values_and_minima<C: CircuitModel + ?Sized>(
    circuit: &C,
    tol: f64,
) -> Result<Vec<(f64, DVec)>> {
    let params = circuit.parameters();
    let extended = params.extended_dof();
    let raw = circuit.find_minima();
    if raw.is_empty() {
        return Err(VchosError::NoMinima);
    }
    if let Some(bad) = raw.iter().find(|m| m.len() != params.dof()) {
        return Err(VchosError::Configuration(format!(
            "minimum has {} coordinates, expected {} (dof)",
            bad.len(),
            params.dof()
        )));
    }
    let normalized: Vec<DVec> = raw.iter().map(|m| normalize_minimum(m, extended)).collect();
    let unique = filter_repeated_minima(&normalized, extended, tol);

    let mut valued: Vec<(f64, DVec)> = unique
        .into_iter()
        .map(|m| (circuit.potential(&m), m))
        .collect();
    valued.sort_by(|a, b| a.0.total_cmp(&b.0));
    Ok(valued)
}

/// Minima locations ascending by potential value.
pub fn sorted_minima<C: CircuitModel + ?Sized>(circuit: &C, tol: f64) -> Result<Vec<DVec>> {
    Ok(sorted_potential_values_and_minima(circuit, tol)?
        .into_iter()
        .map(|(_, m)| m)
        .collect())
}
