//! Lattice translation vectors for the periodic continuation.
//!
//! A basis state centered at minimum p overlaps with the 2π-translated images
//! of minimum m. Each image ν contributes with a Gaussian weight
//!
//!   w(ν) = exp(−¼ dᵗd),   d = Xi⁻¹·(2πν + Δ),   Δ = φ_p − φ_m
//!
//! so only a handful of vectors matter. Candidates are enumerated shell by
//! shell: for radius r, every composition of r into `periodic_dof`
//! non-negative parts bounded by the maximum site length, together with all
//! sign reflections of its non-zero entries. Vectors whose weight does not
//! exceed the cutoff are discarded.
//!
//! Shells are independent, so they may be filtered on a rayon pool.

use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::sync::Arc;

use rayon::prelude::*;

use crate::error::{Result, VchosError};
use crate::{DMat, DVec};

/// Integer lattice vector over all degrees of freedom. Extended components
/// are always zero.
pub type LatticeVector = Vec<i64>;

/// Compositions of `radius` into `parts` non-negative integers, starting at
/// `[radius, 0, ..., 0]` and ending at `[0, ..., 0, radius]`.
#[derive(Debug, Clone)]
pub struct Compositions {
    radius: i64,
    next: Option<Vec<i64>>,
}

impl Compositions {
    pub fn new(radius: u32, parts: usize) -> Self {
        let next = if parts == 0 {
            None
        } else {
            let mut first = vec![0; parts];
            first[0] = i64::from(radius);
            Some(first)
        };
        Self {
            radius: i64::from(radius),
            next,
        }
    }
}

impl Iterator for Compositions {
    type Item = Vec<i64>;

    fn next(&mut self) -> Option<Vec<i64>> {
        let current = self.next.take()?;
        let n = current.len();
        if current[n - 1] != self.radius {
            // Move one unit out of the last non-zero part before the tail.
            let k = (0..n - 1).rev().find(|&i| current[i] != 0).unwrap_or(0);
            let mut following = vec![0; n];
            following[..k].copy_from_slice(&current[..k]);
            following[k] = current[k] - 1;
            following[k + 1] = self.radius - following[..=k].iter().sum::<i64>();
            self.next = Some(following);
        }
        Some(current)
    }
}

/// All sign reflections of the non-zero entries of a vector, beginning with
/// the vector itself and ending with its full negation.
#[derive(Debug, Clone)]
pub struct Reflections {
    base: Vec<i64>,
    nonzero: Vec<usize>,
    mask: u64,
    total: u64,
}

impl Reflections {
    pub fn new(base: Vec<i64>) -> Self {
        let nonzero: Vec<usize> = (0..base.len()).filter(|&i| base[i] != 0).collect();
        let total = 1u64 << nonzero.len();
        Self {
            base,
            nonzero,
            mask: 0,
            total,
        }
    }
}

impl Iterator for Reflections {
    type Item = Vec<i64>;

    fn next(&mut self) -> Option<Vec<i64>> {
        if self.mask >= self.total {
            return None;
        }
        let k = self.nonzero.len();
        let mut out = self.base.clone();
        for (bit, &idx) in self.nonzero.iter().enumerate() {
            if (self.mask >> (k - 1 - bit)) & 1 == 1 {
                out[idx] = -out[idx];
            }
        }
        self.mask += 1;
        Some(out)
    }
}

/// Parameters shared by every filtering task.
#[derive(Debug, Clone, Copy)]
pub struct FilterSettings {
    pub cutoff: f64,
    pub maximum_site_length: u32,
    pub max_radius: usize,
    pub extended_dof: usize,
    pub periodic_dof: usize,
}

/// Gaussian suppression weight of the periodic vector `periodic` (periodic
/// components only) for a pair whose rotated minima offset is `minima_diff`.
pub fn gaussian_weight(
    minima_diff: &DVec,
    xi_inv: &DMat,
    periodic: &[i64],
    extended_dof: usize,
) -> f64 {
    let dim = minima_diff.len();
    let mut phi = DVec::zeros(dim);
    for (i, &n) in periodic.iter().enumerate() {
        phi[extended_dof + i] = 2.0 * PI * n as f64;
    }
    let d = xi_inv * phi + minima_diff;
    (-0.25 * d.dot(&d)).exp()
}

fn embed(periodic: &[i64], extended_dof: usize) -> LatticeVector {
    let mut full = vec![0; extended_dof];
    full.extend_from_slice(periodic);
    full
}

/// Retained vectors of a single radius shell.
pub fn filter_shell(
    radius: u32,
    minima_diff: &DVec,
    xi_inv: &DMat,
    settings: &FilterSettings,
) -> Vec<LatticeVector> {
    let bound = i64::from(settings.maximum_site_length);
    Compositions::new(radius, settings.periodic_dof)
        .filter(|c| c.iter().all(|&x| x <= bound))
        .flat_map(Reflections::new)
        .filter(|v| {
            gaussian_weight(minima_diff, xi_inv, v, settings.extended_dof) > settings.cutoff
        })
        .map(|v| embed(&v, settings.extended_dof))
        .collect()
}

/// Retained vectors for one minima pair, shells in ascending radius order
/// followed by the zero vector when it survives the cutoff.
pub fn filter_for_minima_pair(
    minima_diff: &DVec,
    xi_inv: &DMat,
    settings: &FilterSettings,
    pool: Option<&rayon::ThreadPool>,
) -> Vec<LatticeVector> {
    let radii: Vec<u32> = (1..=settings.max_radius as u32).collect();
    let shells: Vec<Vec<LatticeVector>> = match pool {
        Some(pool) => pool.install(|| {
            radii
                .par_iter()
                .map(|&r| filter_shell(r, minima_diff, xi_inv, settings))
                .collect()
        }),
        None => radii
            .iter()
            .map(|&r| filter_shell(r, minima_diff, xi_inv, settings))
            .collect(),
    };

    let mut vectors: Vec<LatticeVector> = shells.into_iter().flatten().collect();
    let zero = vec![0; settings.periodic_dof];
    if gaussian_weight(minima_diff, xi_inv, &zero, settings.extended_dof) > settings.cutoff {
        vectors.push(embed(&zero, settings.extended_dof));
    }
    vectors
}

/// Retained lattice vectors for every unordered minima pair.
///
/// Entries are stored for `m <= p`. All self-pairs share one table, which
/// assumes the lattice geometry is the same around every minimum.
#[derive(Debug, Clone, Default)]
pub struct NeighborTable {
    entries: BTreeMap<(usize, usize), Arc<Vec<LatticeVector>>>,
}

impl NeighborTable {
    /// Vectors for the pair (m, p); the pair is reordered so that m <= p.
    pub fn get(&self, m: usize, p: usize) -> Option<&[LatticeVector]> {
        let key = if m <= p { (m, p) } else { (p, m) };
        self.entries.get(&key).map(|v| v.as_slice())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over `((m, p), vectors)` in ascending pair order.
    pub fn iter(&self) -> impl Iterator<Item = ((usize, usize), &[LatticeVector])> {
        self.entries.iter().map(|(&k, v)| (k, v.as_slice()))
    }
}

/// Build a worker pool, or `None` for synchronous execution.
pub fn worker_pool(num_workers: usize) -> Result<Option<rayon::ThreadPool>> {
    if num_workers <= 1 {
        return Ok(None);
    }
    rayon::ThreadPoolBuilder::new()
        .num_threads(num_workers)
        .build()
        .map(Some)
        .map_err(|e| VchosError::Configuration(format!("failed to start lattice worker pool: {e}")))
}

/// Filter lattice vectors for every minima pair, in ascending pair order.
pub fn build_neighbor_table(
    minima: &[DVec],
    xi_inv: &DMat,
    settings: &FilterSettings,
    num_workers: usize,
) -> Result<NeighborTable> {
    let pool = worker_pool(num_workers)?;
    let n = minima.len();
    let mut entries = BTreeMap::new();
    if n == 0 {
        return Ok(NeighborTable { entries });
    }

    let dim = minima[0].len();
    let self_table = Arc::new(filter_for_minima_pair(
        &DVec::zeros(dim),
        xi_inv,
        settings,
        pool.as_ref(),
    ));
    log::info!("completed m=0, p=0 minima pair computation");

    for m in 0..n {
        entries.insert((m, m), Arc::clone(&self_table));
        for p in m + 1..n {
            let minima_diff = xi_inv * (&minima[p] - &minima[m]);
            let vectors = filter_for_minima_pair(&minima_diff, xi_inv, settings, pool.as_ref());
            log::info!("completed m={m}, p={p} minima pair computation");
            entries.insert((m, p), Arc::new(vectors));
        }
    }

    Ok(NeighborTable { entries })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(periodic_dof: usize, max_radius: usize) -> FilterSettings {
        FilterSettings {
            cutoff: 1e-15,
            maximum_site_length: 2,
            max_radius,
            extended_dof: 0,
            periodic_dof,
        }
    }

    #[test]
    fn test_compositions_of_three_into_three() {
        let all: Vec<Vec<i64>> = Compositions::new(3, 3).collect();
        // C(5, 2) = 10 weak compositions
        assert_eq!(all.len(), 10);
        assert_eq!(all[0], vec![3, 0, 0]);
        assert_eq!(all[1], vec![2, 1, 0]);
        assert_eq!(all.last().unwrap(), &vec![0, 0, 3]);
        assert!(all.iter().all(|c| c.iter().sum::<i64>() == 3));
    }

    #[test]
    fn test_single_part_composition() {
        let all: Vec<Vec<i64>> = Compositions::new(4, 1).collect();
        assert_eq!(all, vec![vec![4]]);
    }

    #[test]
    fn test_reflections_cover_nonzero_signs() {
        let all: Vec<Vec<i64>> = Reflections::new(vec![1, 0, 2]).collect();
        assert_eq!(all.len(), 4);
        assert_eq!(all[0], vec![1, 0, 2]);
        assert_eq!(all[3], vec![-1, 0, -2]);
        assert!(all.iter().all(|v| v[1] == 0));
    }

    #[test]
    fn test_site_length_bound() {
        let s = FilterSettings {
            cutoff: 0.0,
            ..settings(2, 3)
        };
        let shell = filter_shell(3, &DVec::zeros(2), &DMat::zeros(2, 2), &s);
        // compositions (2,1), (1,2), each with 4 reflections; (3,0), (0,3) excluded
        assert_eq!(shell.len(), 8);
        assert!(shell.iter().all(|v| v.iter().all(|x| x.abs() <= 2)));
    }

    #[test]
    fn test_self_pair_keeps_zero_and_is_symmetric() {
        let xi_inv = DMat::from_row_slice(2, 2, &[0.9, 0.2, -0.1, 1.3]);
        let vectors = filter_for_minima_pair(&DVec::zeros(2), &xi_inv, &settings(2, 3), None);
        assert!(vectors.contains(&vec![0, 0]));
        for v in &vectors {
            let neg: Vec<i64> = v.iter().map(|x| -x).collect();
            assert!(vectors.contains(&neg), "missing negation of {v:?}");
        }
    }

    #[test]
    fn test_wide_basis_keeps_more_vectors() {
        let origin = DVec::zeros(1);
        let narrow =
            filter_for_minima_pair(&origin, &DMat::from_element(1, 1, 2.0), &settings(1, 4), None);
        let wide =
            filter_for_minima_pair(&origin, &DMat::from_element(1, 1, 0.5), &settings(1, 4), None);
        assert!(wide.len() > narrow.len());
        assert_eq!(narrow, vec![vec![0]]);
    }

    #[test]
    fn test_extended_components_are_zero() {
        let s = FilterSettings {
            extended_dof: 1,
            periodic_dof: 1,
            ..settings(1, 2)
        };
        let xi_inv = DMat::from_row_slice(2, 2, &[1.0, 0.0, 0.0, 0.6]);
        let vectors = filter_for_minima_pair(&DVec::zeros(2), &xi_inv, &s, None);
        assert!(vectors.len() > 1);
        assert!(vectors.iter().all(|v| v.len() == 2 && v[0] == 0));
    }

    #[test]
    fn test_worker_pool_matches_serial() {
        let xi_inv = DMat::from_row_slice(2, 2, &[0.7, 0.1, 0.1, 0.8]);
        let diff = DVec::from_vec(vec![0.3, -0.2]);
        let s = settings(2, 4);
        let serial = filter_for_minima_pair(&diff, &xi_inv, &s, None);
        let pool = worker_pool(3).unwrap();
        let parallel = filter_for_minima_pair(&diff, &xi_inv, &s, pool.as_ref());
        assert_eq!(serial, parallel);
    }

    #[test]
    fn test_identical_minima_share_entries() {
        let m = DVec::from_vec(vec![0.4, -0.4]);
        let minima = vec![m.clone(), m];
        let xi_inv = DMat::from_row_slice(2, 2, &[0.8, 0.0, 0.0, 0.8]);
        let table = build_neighbor_table(&minima, &xi_inv, &settings(2, 3), 1).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.get(0, 0), table.get(1, 1));
        assert_eq!(table.get(0, 0), table.get(0, 1));
        assert_eq!(table.get(1, 0), table.get(0, 1));
    }
}
