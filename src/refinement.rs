//! Damped least-squares refinement of the error matrix.
//!
//! The weighted residuals of a measurement subset are exposed through the
//! argmin problem traits ([`Operator`], [`Jacobian`], [`CostFunction`]) and
//! minimised with a Levenberg-Marquardt loop. Only the free
//! parameters of the layout are updated, so the common-axis constraint holds
//! at every step.

use argmin::core::{CostFunction, Jacobian, Operator};
use log::debug;
use nalgebra::{DMatrix, DVector};

use crate::error::Error;
use crate::estimators::MeasurementModel;
use crate::settings::RefinerSettings;
use crate::utils::spd_inverse;

/// Cost below which the fit is exact to machine precision.
const NEGLIGIBLE_COST: f64 = 1e-24;
const MIN_DAMPING: f64 = 1e-12;
const MAX_DAMPING: f64 = 1e12;
const MIN_DIAGONAL: f64 = 1e-12;

/// Weighted residuals of a subset of measurements, as a function of the free
/// parameters of the error matrix.
pub struct CalibrationProblem<'m, 'a> {
    model: &'m MeasurementModel<'a>,
    indices: &'m [usize],
}

impl<'m, 'a> CalibrationProblem<'m, 'a> {
    pub fn new(model: &'m MeasurementModel<'a>, indices: &'m [usize]) -> Self {
        Self { model, indices }
    }

    /// Number of stacked residual components.
    pub fn residual_count(&self) -> usize {
        self.indices.len() * self.model.kind().dimension()
    }
}

impl Operator for CalibrationProblem<'_, '_> {
    type Param = DVector<f64>;
    type Output = DVector<f64>;

    fn apply(&self, param: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
        let ma = self.model.layout().from_params(param);
        let dim = self.model.kind().dimension();
        let measurements = self.model.measurements();

        let mut out = DVector::zeros(self.residual_count());
        for (k, &i) in self.indices.iter().enumerate() {
            let r = self
                .model
                .residual_vector(&ma, i)
                .ok_or_else(|| argmin::core::Error::msg("singular gain matrix"))?;
            let w = measurements[i].weight();
            out.rows_mut(k * dim, dim).copy_from(&(r * w));
        }

        if out.iter().any(|v| !v.is_finite()) {
            return Err(argmin::core::Error::msg("non-finite residual"));
        }
        Ok(out)
    }
}

impl Jacobian for CalibrationProblem<'_, '_> {
    type Param = DVector<f64>;
    type Jacobian = DMatrix<f64>;

    fn jacobian(&self, param: &Self::Param) -> Result<Self::Jacobian, argmin::core::Error> {
        let ma = self.model.layout().from_params(param);
        let dim = self.model.kind().dimension();
        let measurements = self.model.measurements();

        let mut out = DMatrix::zeros(self.residual_count(), param.len());
        for (k, &i) in self.indices.iter().enumerate() {
            let jac = self
                .model
                .jacobian(&ma, i)
                .ok_or_else(|| argmin::core::Error::msg("singular gain matrix"))?;
            let w = measurements[i].weight();
            out.rows_mut(k * dim, dim).copy_from(&(jac * w));
        }
        Ok(out)
    }
}

impl CostFunction for CalibrationProblem<'_, '_> {
    type Param = DVector<f64>;
    type Output = f64;

    /// Weighted sum of squared residuals.
    fn cost(&self, param: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
        Ok(self.apply(param)?.norm_squared())
    }
}

/// Result of a Levenberg-Marquardt run.
#[derive(Debug, Clone)]
pub struct LmOutcome {
    pub params: DVector<f64>,
    /// `(JᵀJ)⁻¹` at the solution, `None` when singular.
    pub covariance: Option<DMatrix<f64>>,
    /// False when the iteration cap was hit first.
    pub converged: bool,
    pub iterations: usize,
    /// Weighted sum of squared residuals at the solution.
    pub chi_sq: f64,
    pub residual_count: usize,
}

impl LmOutcome {
    /// Mean squared weighted residual.
    pub fn mse(&self) -> f64 {
        if self.residual_count == 0 {
            0.0
        } else {
            self.chi_sq / self.residual_count as f64
        }
    }
}

fn numerical(e: argmin::core::Error) -> Error {
    Error::NumericalFailure(e.to_string())
}

/// Minimise the problem's weighted cost from `initial`.
///
/// Iterates until the relative cost decrease falls to `settings.tolerance`,
/// no damped step decreases the cost any more, or `settings.max_iterations`
/// is reached (reported as not converged).
pub fn levenberg_marquardt(
    problem: &CalibrationProblem<'_, '_>,
    initial: DVector<f64>,
    settings: &RefinerSettings,
) -> Result<LmOutcome, Error> {
    let mut params = initial;
    let mut cost = problem.cost(&params).map_err(numerical)?;
    let mut lambda = settings.initial_damping;
    let mut converged = false;
    let mut iterations = 0;

    while iterations < settings.max_iterations {
        if cost <= NEGLIGIBLE_COST {
            converged = true;
            break;
        }
        iterations += 1;

        let residuals = problem.apply(&params).map_err(numerical)?;
        let jac = problem.jacobian(&params).map_err(numerical)?;
        let jtj = jac.transpose() * &jac;
        let neg_grad = -(jac.transpose() * &residuals);

        let mut step = None;
        while lambda <= MAX_DAMPING {
            let mut damped = jtj.clone();
            for k in 0..damped.nrows() {
                damped[(k, k)] += lambda * jtj[(k, k)].max(MIN_DIAGONAL);
            }

            if let Some(chol) = damped.cholesky() {
                let candidate = &params + chol.solve(&neg_grad);
                if let Ok(candidate_cost) = problem.cost(&candidate) {
                    if candidate_cost < cost {
                        step = Some((candidate, candidate_cost));
                        break;
                    }
                }
            }
            lambda *= 10.0;
        }

        let Some((candidate, candidate_cost)) = step else {
            // no damped step decreases the cost: local minimum
            converged = true;
            break;
        };

        let decrease = (cost - candidate_cost) / cost;
        params = candidate;
        cost = candidate_cost;
        lambda = (lambda / 10.0).max(MIN_DAMPING);

        if decrease <= settings.tolerance {
            converged = true;
            break;
        }
    }

    if !converged {
        debug!(
            "refinement stopped at the iteration cap ({}), cost {:.6e}",
            settings.max_iterations, cost
        );
    }

    let jac = problem.jacobian(&params).map_err(numerical)?;
    let covariance = spd_inverse(jac.transpose() * &jac);

    Ok(LmOutcome {
        params,
        covariance,
        converged,
        iterations,
        chi_sq: cost,
        residual_count: problem.residual_count(),
    })
}
