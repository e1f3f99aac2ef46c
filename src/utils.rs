//! Miscellaneous utilities shared across the calibrators.
//!
//! Starts with a small wrapper around `rand` used by the subset samplers,
//! followed by the numeric helpers the estimators need.

use std::marker::PhantomData;

use nalgebra::{DMatrix, DVector};
use rand::distributions::uniform::SampleUniform;
use rand::distributions::Uniform;
use rand::prelude::*;

use crate::error::Error;

/// Uniform integer random-number generator.
///
/// By default this uses an entropy-seeded RNG, but test code can construct
/// it from a fixed seed for reproducible behavior.
pub struct UniformRandomGenerator<T>
where
    T: Copy + SampleUniform + PartialOrd,
{
    rng: StdRng,
    _marker: PhantomData<T>,
}

impl<T> UniformRandomGenerator<T>
where
    T: Copy + SampleUniform + PartialOrd,
{
    /// Construct with a random seed.
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
            _marker: PhantomData,
        }
    }

    /// Construct with a fixed seed.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            _marker: PhantomData,
        }
    }

    /// Seeded when `seed` is set, entropy-seeded otherwise.
    pub fn from_optional_seed(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::from_seed(seed),
            None => Self::new(),
        }
    }

    /// Generate a set of unique random integers in `[min, max]` into `out`.
    ///
    /// Rejection based, fine for the small subsets minimal solvers draw.
    /// Returns `false` when the range holds fewer values than requested.
    pub fn gen_unique(&mut self, out: &mut [T], min: T, max: T) -> bool
    where
        T: Eq + TryInto<usize>,
    {
        let bounds: (Result<usize, _>, Result<usize, _>) = (max.try_into(), min.try_into());
        let span = match bounds {
            (Ok(hi), Ok(lo)) if hi >= lo => hi - lo + 1,
            _ => return false,
        };
        if out.len() > span {
            return false;
        }

        let dist = Uniform::new_inclusive(min, max);
        for i in 0..out.len() {
            loop {
                let candidate = self.rng.sample(&dist);
                if out[..i].iter().all(|&v| v != candidate) {
                    out[i] = candidate;
                    break;
                }
            }
        }
        true
    }
}

impl<T> Default for UniformRandomGenerator<T>
where
    T: Copy + SampleUniform + PartialOrd,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Lower median of `values`, reordering the slice. `None` when empty.
///
/// For an even count this is the smaller of the two middle values.
pub fn lower_median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let k = (values.len() - 1) / 2;
    let (_, median, _) = values.select_nth_unstable_by(k, |a, b| a.total_cmp(b));
    Some(*median)
}

/// Relative singular value below which a normal system is rank deficient.
const RANK_TOLERANCE: f64 = 1e-10;

/// Solve the weighted linear least-squares problem `min ‖W(Ax - b)‖²` through
/// its normal equations.
///
/// `weights` holds one weight per row of `a`. Fails with
/// [`Error::SingularModel`] when `AᵀWA` is rank deficient.
pub fn solve_weighted_least_squares(
    a: &DMatrix<f64>,
    b: &DVector<f64>,
    weights: &DVector<f64>,
) -> Result<DVector<f64>, Error> {
    let mut wa = a.clone();
    let mut wb = b.clone();
    for (i, w) in weights.iter().enumerate() {
        wa.row_mut(i).scale_mut(*w);
        wb[i] *= *w;
    }

    let normal = wa.transpose() * &wa;
    let rhs = wa.transpose() * wb;
    solve_normal_equations(normal, &rhs)
}

/// Solve `N x = rhs` for a symmetric positive semi-definite `N`, rejecting
/// rank deficient systems.
pub fn solve_normal_equations(
    normal: DMatrix<f64>,
    rhs: &DVector<f64>,
) -> Result<DVector<f64>, Error> {
    let svd = normal.svd(true, true);
    let max_sv = svd.singular_values.max();
    if !(max_sv > 0.0 && max_sv.is_finite()) {
        return Err(Error::SingularModel);
    }
    let min_sv = svd.singular_values.min();
    if min_sv <= RANK_TOLERANCE * max_sv {
        return Err(Error::SingularModel);
    }
    svd.solve(rhs, 0.0).map_err(|_| Error::SingularModel)
}

/// Inverse of a symmetric positive definite matrix, `None` when singular.
pub fn spd_inverse(matrix: DMatrix<f64>) -> Option<DMatrix<f64>> {
    matrix.cholesky().map(|c| c.inverse())
}
