use log::debug;

use crate::core::Estimator;
use crate::error::Error;
use crate::estimators::{MeasurementModel, ResidualKind};
use crate::refinement::{levenberg_marquardt, CalibrationProblem};
use crate::settings::RefinerSettings;
use crate::types::ErrorMatrix;

use super::{LocalOptimizer, Refinement};

/// Polishes the best hypothesis over its inliers.
///
/// With vector residuals the inliers are first refit by weighted linear least
/// squares; the Levenberg-Marquardt loop then runs from that estimate (or from
/// the hypothesis itself with gravity-norm residuals).
pub struct NonlinearRefiner {
    settings: RefinerSettings,
    keep_covariance: bool,
}

impl NonlinearRefiner {
    pub fn new(settings: RefinerSettings, keep_covariance: bool) -> Self {
        Self {
            settings,
            keep_covariance,
        }
    }
}

impl<'a> LocalOptimizer<MeasurementModel<'a>> for NonlinearRefiner {
    fn run(
        &mut self,
        estimator: &MeasurementModel<'a>,
        inliers: &[usize],
        model: &ErrorMatrix,
    ) -> Result<Refinement<ErrorMatrix>, Error> {
        if inliers.len() < estimator.sample_size() {
            return Err(Error::NotEnoughMeasurements {
                required: estimator.sample_size(),
                provided: inliers.len(),
            });
        }

        let start = match estimator.kind() {
            ResidualKind::Vector => match estimator.solve_linear(inliers) {
                Ok(refit) => refit,
                Err(e) => {
                    debug!("inlier refit failed ({}), refining the hypothesis", e);
                    *model
                }
            },
            ResidualKind::GravityNorm => *model,
        };

        let layout = estimator.layout();
        let problem = CalibrationProblem::new(estimator, inliers);
        let outcome = levenberg_marquardt(&problem, layout.to_params(&start), &self.settings)?;
        let mse = outcome.mse();

        Ok(Refinement {
            model: layout.from_params(&outcome.params),
            covariance: if self.keep_covariance {
                outcome.covariance
            } else {
                None
            },
            converged: outcome.converged,
            iterations: outcome.iterations,
            chi_sq: outcome.chi_sq,
            mse,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::earth::NedPosition;
    use crate::estimators::predict_specific_force;
    use crate::measurements::Measurement;
    use nalgebra::{Matrix3, UnitQuaternion, Vector3};

    #[test]
    fn refines_noisy_inliers_towards_truth() {
        let g = NedPosition::new(0.9, 0.2, 300.0).gravity();
        let bias = Vector3::new(0.05, -0.02, 0.01);
        let ma = Matrix3::new(
            2e-3, -1e-3, 5e-4, //
            3e-4, 1e-3, -2e-4, //
            -6e-4, 4e-4, -1.5e-3,
        );
        let data: Vec<Measurement> = (0..30)
            .map(|k| {
                let k = k as f64;
                let q = UnitQuaternion::from_euler_angles(0.9 * k, 0.4 * k - 1.2, 1.3 * k);
                let mut f = predict_specific_force(&ma, &bias, &g, Some(&q));
                f += Vector3::new((3.1 * k).sin(), (2.3 * k).cos(), (0.7 * k).sin()) * 1e-5;
                Measurement::with_orientation(f, 1e-5, q)
            })
            .collect();

        let model = MeasurementModel::new(
            &data,
            bias,
            g,
            false,
            ErrorMatrix::zeros(),
            RefinerSettings::default(),
        )
        .unwrap();

        let inliers: Vec<usize> = (0..30).collect();
        let mut refiner = NonlinearRefiner::new(RefinerSettings::default(), true);
        let refined = refiner.run(&model, &inliers, &ErrorMatrix::zeros()).unwrap();

        assert!(refined.converged);
        assert!((refined.model - ma).abs().max() < 1e-5);
        assert!(refined.chi_sq > 0.0);
        assert!((refined.mse - refined.chi_sq / 90.0).abs() < 1e-12);
        assert_eq!(refined.covariance.unwrap().shape(), (9, 9));

        let mut refiner = NonlinearRefiner::new(RefinerSettings::default(), false);
        let refined = refiner.run(&model, &inliers, &ErrorMatrix::zeros()).unwrap();
        assert!(refined.covariance.is_none());
    }

    #[test]
    fn too_few_inliers_are_rejected() {
        let g = NedPosition::new(0.9, 0.2, 300.0).gravity();
        let q = UnitQuaternion::identity();
        let data = vec![Measurement::with_orientation(-g, 1e-3, q); 2];
        let model = MeasurementModel::new(
            &data,
            Vector3::zeros(),
            g,
            true,
            ErrorMatrix::zeros(),
            RefinerSettings::default(),
        )
        .unwrap();
        let mut refiner = NonlinearRefiner::new(RefinerSettings::default(), true);
        assert!(matches!(
            refiner.run(&model, &[0, 1], &ErrorMatrix::zeros()),
            Err(Error::NotEnoughMeasurements { .. })
        ));
    }
}
