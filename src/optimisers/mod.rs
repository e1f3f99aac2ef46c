//! Final refinement of the best hypothesis.

use nalgebra::DMatrix;

use crate::core::Estimator;
use crate::error::Error;

/// Refined model with its fit statistics.
#[derive(Debug, Clone)]
pub struct Refinement<M> {
    pub model: M,
    /// Covariance of the free parameters, when requested and available.
    pub covariance: Option<DMatrix<f64>>,
    pub converged: bool,
    pub iterations: usize,
    pub chi_sq: f64,
    pub mse: f64,
}

/// Local optimization strategy, refining a model using its inliers.
///
/// After the search has picked the best hypothesis, the final optimizer
/// re-estimates it from the whole inlier set.
///
/// ## Example: custom refinement
///
/// ```rust
/// use accel_consensus::core::Estimator;
/// use accel_consensus::optimisers::{LocalOptimizer, Refinement};
/// use accel_consensus::Error;
///
/// struct KeepModel;
///
/// impl<E: Estimator> LocalOptimizer<E> for KeepModel {
///     fn run(
///         &mut self,
///         _estimator: &E,
///         _inliers: &[usize],
///         model: &E::Model,
///     ) -> Result<Refinement<E::Model>, Error> {
///         Ok(Refinement {
///             model: model.clone(),
///             covariance: None,
///             converged: true,
///             iterations: 0,
///             chi_sq: 0.0,
///             mse: 0.0,
///         })
///     }
/// }
/// ```
pub trait LocalOptimizer<E: Estimator> {
    /// Run local optimization on `model` over `inliers`.
    fn run(
        &mut self,
        estimator: &E,
        inliers: &[usize],
        model: &E::Model,
    ) -> Result<Refinement<E::Model>, Error>;
}

/// Concrete optimizers.
pub mod local;

pub use local::NonlinearRefiner;
