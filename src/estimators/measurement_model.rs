//! Known-position accelerometer measurement model.
//!
//! Relates the measured specific force to the one expected at the known
//! position through `f_meas = bias + (I + Ma) · f_true`, and generates error
//! matrix hypotheses from subsets of measurements.

use nalgebra::{DMatrix, DVector, Matrix3, UnitQuaternion, Vector3};

use crate::core::Estimator;
use crate::earth::specific_force_at_rest;
use crate::error::Error;
use crate::measurements::Measurement;
use crate::models::ParameterLayout;
use crate::refinement::{levenberg_marquardt, CalibrationProblem};
use crate::settings::RefinerSettings;
use crate::types::ErrorMatrix;
use crate::utils::solve_weighted_least_squares;

/// `|det(I + Ma)|` below which a hypothesis is rejected.
const MIN_GAIN_DETERMINANT: f64 = 1e-6;

/// Which part of the specific force the residuals compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResidualKind {
    /// Full 3-component residual; needs the attitude of every measurement.
    Vector,
    /// Gravity magnitude only; used when some attitude is unknown.
    GravityNorm,
}

impl ResidualKind {
    /// Components per measurement.
    pub fn dimension(&self) -> usize {
        match self {
            Self::Vector => 3,
            Self::GravityNorm => 1,
        }
    }

    /// Minimal subset size for this kind.
    pub fn minimum_subset_size(&self, common_axis: bool) -> usize {
        match (self, common_axis) {
            (Self::Vector, false) => 4,
            (Self::Vector, true) => 3,
            (Self::GravityNorm, _) => 7,
        }
    }

    /// Vector residuals when every measurement is attitude tagged.
    pub fn for_measurements(measurements: &[Measurement]) -> Self {
        if measurements.iter().all(|m| m.orientation.is_some()) {
            Self::Vector
        } else {
            Self::GravityNorm
        }
    }
}

/// Specific force an accelerometer with error matrix `ma` and `bias` reports
/// at rest, given the local NED gravity and its body-to-NED attitude.
pub fn predict_specific_force(
    ma: &ErrorMatrix,
    bias: &Vector3<f64>,
    gravity_ned: &Vector3<f64>,
    orientation: Option<&UnitQuaternion<f64>>,
) -> Vector3<f64> {
    bias + (Matrix3::identity() + ma) * specific_force_at_rest(gravity_ned, orientation)
}

/// Measurement model over a borrowed measurement set.
#[derive(Debug, Clone)]
pub struct MeasurementModel<'a> {
    measurements: &'a [Measurement],
    bias: Vector3<f64>,
    gravity_norm: f64,
    /// Body-frame specific force expected for each measurement (vector kind).
    expected: Vec<Vector3<f64>>,
    layout: ParameterLayout,
    kind: ResidualKind,
    initial_ma: ErrorMatrix,
    refiner: RefinerSettings,
}

impl<'a> MeasurementModel<'a> {
    /// Fails with [`Error::OrientationRequired`] when some attitude is missing
    /// in general mode and with [`Error::InvalidStandardDeviation`] on a bad
    /// weight.
    pub fn new(
        measurements: &'a [Measurement],
        bias: Vector3<f64>,
        gravity_ned: Vector3<f64>,
        common_axis: bool,
        initial_ma: ErrorMatrix,
        refiner: RefinerSettings,
    ) -> Result<Self, Error> {
        if let Some(index) = measurements.iter().position(|m| !m.has_valid_std_dev()) {
            return Err(Error::InvalidStandardDeviation(index));
        }

        let kind = ResidualKind::for_measurements(measurements);
        if kind == ResidualKind::GravityNorm && !common_axis {
            return Err(Error::OrientationRequired);
        }

        let layout = ParameterLayout::new(common_axis);
        let expected = match kind {
            ResidualKind::Vector => measurements
                .iter()
                .map(|m| specific_force_at_rest(&gravity_ned, m.orientation.as_ref()))
                .collect(),
            ResidualKind::GravityNorm => Vec::new(),
        };

        Ok(Self {
            measurements,
            bias,
            gravity_norm: gravity_ned.norm(),
            expected,
            layout,
            kind,
            initial_ma: layout.constrain(&initial_ma),
            refiner,
        })
    }

    pub fn kind(&self) -> ResidualKind {
        self.kind
    }

    pub fn layout(&self) -> ParameterLayout {
        self.layout
    }

    pub fn measurements(&self) -> &'a [Measurement] {
        self.measurements
    }

    pub fn refiner_settings(&self) -> &RefinerSettings {
        &self.refiner
    }

    /// Predicted specific force of measurement `index` (vector kind).
    pub fn predict(&self, ma: &ErrorMatrix, index: usize) -> Option<Vector3<f64>> {
        let f_true = self.expected.get(index)?;
        Some(self.bias + (Matrix3::identity() + ma) * f_true)
    }

    /// Unweighted residual components of measurement `index`, `None` when
    /// `I + Ma` cannot be inverted.
    pub fn residual_vector(&self, ma: &ErrorMatrix, index: usize) -> Option<DVector<f64>> {
        let y = self.measurements[index].specific_force - self.bias;
        match self.kind {
            ResidualKind::Vector => {
                let r = y - (Matrix3::identity() + ma) * self.expected[index];
                Some(DVector::from_column_slice(r.as_slice()))
            }
            ResidualKind::GravityNorm => {
                let a_inv = (Matrix3::identity() + ma).try_inverse()?;
                Some(DVector::from_element(1, (a_inv * y).norm() - self.gravity_norm))
            }
        }
    }

    /// Unweighted jacobian of [`Self::residual_vector`] with respect to the
    /// free parameters.
    pub fn jacobian(&self, ma: &ErrorMatrix, index: usize) -> Option<DMatrix<f64>> {
        let entries = self.layout.entries();
        let mut jac = DMatrix::zeros(self.kind.dimension(), entries.len());
        match self.kind {
            ResidualKind::Vector => {
                let f = &self.expected[index];
                for (p, &(row, col)) in entries.iter().enumerate() {
                    jac[(row, p)] = -f[col];
                }
            }
            ResidualKind::GravityNorm => {
                let a_inv = (Matrix3::identity() + ma).try_inverse()?;
                let u = a_inv * (self.measurements[index].specific_force - self.bias);
                let u_norm = u.norm();
                if u_norm == 0.0 {
                    return None;
                }
                let w = a_inv.transpose() * u;
                for (p, &(row, col)) in entries.iter().enumerate() {
                    jac[(0, p)] = -w[row] * u[col] / u_norm;
                }
            }
        }
        Some(jac)
    }

    /// Weighted linear least-squares hypothesis over `indices` (vector kind).
    pub fn solve_linear(&self, indices: &[usize]) -> Result<ErrorMatrix, Error> {
        if self.kind != ResidualKind::Vector {
            return Err(Error::OrientationRequired);
        }

        let entries = self.layout.entries();
        let rows = 3 * indices.len();
        let mut a = DMatrix::zeros(rows, entries.len());
        let mut b = DVector::zeros(rows);
        let mut weights = DVector::zeros(rows);

        for (k, &i) in indices.iter().enumerate() {
            let m = &self.measurements[i];
            let f = &self.expected[i];
            // (f_meas - bias - f_true)_row = sum_col Ma[row][col] * f_true[col]
            let rhs = m.specific_force - self.bias - f;
            for row in 0..3 {
                b[3 * k + row] = rhs[row];
                weights[3 * k + row] = m.weight();
            }
            for (p, &(row, col)) in entries.iter().enumerate() {
                a[(3 * k + row, p)] = f[col];
            }
        }

        let params = solve_weighted_least_squares(&a, &b, &weights)?;
        Ok(self.layout.from_params(&params))
    }

    /// Weighted sum of squared residuals over `indices`.
    pub fn chi_sq(&self, ma: &ErrorMatrix, indices: &[usize]) -> f64 {
        indices
            .iter()
            .map(|&i| match self.residual_vector(ma, i) {
                Some(r) => r.norm_squared() * self.measurements[i].weight().powi(2),
                None => f64::INFINITY,
            })
            .sum()
    }

    /// Damped non-linear hypothesis over `indices`, starting at `initial`.
    pub fn solve_nonlinear(
        &self,
        indices: &[usize],
        initial: &ErrorMatrix,
    ) -> Result<ErrorMatrix, Error> {
        let problem = CalibrationProblem::new(self, indices);
        let outcome =
            levenberg_marquardt(&problem, self.layout.to_params(initial), &self.refiner)?;
        Ok(self.layout.from_params(&outcome.params))
    }
}

impl Estimator for MeasurementModel<'_> {
    type Model = ErrorMatrix;

    fn point_count(&self) -> usize {
        self.measurements.len()
    }

    fn sample_size(&self) -> usize {
        self.kind.minimum_subset_size(self.layout.is_common_axis())
    }

    fn is_valid_sample(&self, sample: &[usize]) -> bool {
        sample.len() >= self.sample_size() && sample.iter().all(|&i| i < self.measurements.len())
    }

    fn estimate_model(&self, sample: &[usize]) -> Result<ErrorMatrix, Error> {
        match self.kind {
            ResidualKind::Vector => self.solve_linear(sample),
            ResidualKind::GravityNorm => self.solve_nonlinear(sample, &self.initial_ma),
        }
    }

    fn is_valid_model(&self, model: &ErrorMatrix) -> bool {
        model.iter().all(|v| v.is_finite())
            && (Matrix3::identity() + model).determinant().abs() > MIN_GAIN_DETERMINANT
    }

    fn residual(&self, model: &ErrorMatrix, index: usize) -> f64 {
        self.residual_vector(model, index)
            .map(|r| r.norm())
            .unwrap_or(f64::INFINITY)
    }
}
