//! High-level entry point: one configuration struct and a single `create`.
//!
//! ```rust
//! use accel_consensus::api::{create, CalibratorConfig};
//! use accel_consensus::earth::{specific_force_at_rest, NedPosition};
//! use accel_consensus::{Measurement, RobustMethod};
//! use nalgebra::UnitQuaternion;
//!
//! let position = NedPosition::new(0.7, 0.04, 100.0);
//! let gravity = position.gravity();
//! let measurements: Vec<Measurement> = (0..20)
//!     .map(|k| {
//!         let k = k as f64;
//!         let q = UnitQuaternion::from_euler_angles(0.7 * k, 0.3 * k - 1.0, 1.1 * k);
//!         Measurement::with_orientation(specific_force_at_rest(&gravity, Some(&q)), 1e-3, q)
//!     })
//!     .collect();
//!
//! let calibrator = create(CalibratorConfig::new(
//!     RobustMethod::Ransac,
//!     position.into(),
//!     &measurements,
//! ))
//! .unwrap();
//! let result = calibrator.calibrate().unwrap();
//! assert!(result.ma.abs().max() < 1e-9);
//! ```

use nalgebra::{DMatrix, Vector3};

use crate::calibrator::{CalibrationListener, RobustCalibrator};
use crate::earth::Position;
use crate::error::Error;
use crate::measurements::Measurement;
use crate::models::ErrorMatrixExt;
use crate::settings::{EstimatorSettings, RobustMethod};
use crate::types::ErrorMatrix;

/// Result of a robust calibration.
#[derive(Debug, Clone)]
pub struct EstimationResult {
    /// Estimated error matrix; upper triangular in common-axis mode.
    pub ma: ErrorMatrix,
    /// Indices of the inlier measurements, ascending.
    pub inliers: Vec<usize>,
    /// Fitness of the best hypothesis: inlier count (RANSAC, PROSAC),
    /// truncated cost (MSAC) or median squared residual (LMedS, PROMedS).
    pub fitness: f64,
    /// Search iterations consumed.
    pub iterations: usize,
    /// Covariance of the free parameters after refinement.
    pub covariance: Option<DMatrix<f64>>,
    /// Refinement met its tolerance before the iteration cap.
    pub converged: bool,
    /// `ma` comes from the final refinement rather than the raw hypothesis.
    pub refined: bool,
    /// Weighted sum of squared inlier residuals.
    pub chi_sq: f64,
    /// `chi_sq` per residual component.
    pub mse: f64,
}

impl EstimationResult {
    pub fn sx(&self) -> f64 {
        self.ma.scale_factors()[0]
    }

    pub fn sy(&self) -> f64 {
        self.ma.scale_factors()[1]
    }

    pub fn sz(&self) -> f64 {
        self.ma.scale_factors()[2]
    }

    pub fn mxy(&self) -> f64 {
        self.ma[(0, 1)]
    }

    pub fn mxz(&self) -> f64 {
        self.ma[(0, 2)]
    }

    pub fn myx(&self) -> f64 {
        self.ma[(1, 0)]
    }

    pub fn myz(&self) -> f64 {
        self.ma[(1, 2)]
    }

    pub fn mzx(&self) -> f64 {
        self.ma[(2, 0)]
    }

    pub fn mzy(&self) -> f64 {
        self.ma[(2, 1)]
    }

    pub fn inlier_count(&self) -> usize {
        self.inliers.len()
    }
}

/// Everything a robust calibrator is built from. Optional fields fall back to
/// zero bias, zero initial matrix, general mode and the method's default
/// settings.
pub struct CalibratorConfig<'a> {
    pub method: RobustMethod,
    pub position: Position,
    pub measurements: &'a [Measurement],
    pub common_axis_used: bool,
    pub bias: Option<Vector3<f64>>,
    pub initial_ma: Option<ErrorMatrix>,
    /// Only kept by PROSAC and PROMedS; other methods ignore them.
    pub quality_scores: Option<Vec<f64>>,
    pub listener: Option<Box<dyn CalibrationListener + 'a>>,
    pub settings: Option<EstimatorSettings>,
}

impl<'a> CalibratorConfig<'a> {
    pub fn new(method: RobustMethod, position: Position, measurements: &'a [Measurement]) -> Self {
        Self {
            method,
            position,
            measurements,
            common_axis_used: false,
            bias: None,
            initial_ma: None,
            quality_scores: None,
            listener: None,
            settings: None,
        }
    }

    pub fn with_common_axis(mut self, common_axis_used: bool) -> Self {
        self.common_axis_used = common_axis_used;
        self
    }

    pub fn with_bias(mut self, bias: Vector3<f64>) -> Self {
        self.bias = Some(bias);
        self
    }

    pub fn with_initial_ma(mut self, initial_ma: ErrorMatrix) -> Self {
        self.initial_ma = Some(initial_ma);
        self
    }

    pub fn with_quality_scores(mut self, quality_scores: Vec<f64>) -> Self {
        self.quality_scores = Some(quality_scores);
        self
    }

    pub fn with_listener(mut self, listener: impl CalibrationListener + 'a) -> Self {
        self.listener = Some(Box::new(listener));
        self
    }

    pub fn with_settings(mut self, settings: EstimatorSettings) -> Self {
        self.settings = Some(settings);
        self
    }
}

/// Build the calibrator for `config.method`.
///
/// Fails with [`Error::QualityScoresMismatch`] when PROSAC or PROMedS receive
/// scores whose length differs from the measurement count, and with
/// [`Error::InvalidParameter`] on out-of-range settings or on a threshold given
/// to a median-based method. Missing inputs are
/// only reported when calibrating.
pub fn create(config: CalibratorConfig<'_>) -> Result<RobustCalibrator<'_>, Error> {
    let mut calibrator = RobustCalibrator::new(
        config.method,
        config.position,
        config.measurements,
        config.common_axis_used,
    );
    if let Some(settings) = config.settings {
        calibrator.set_settings(settings)?;
    }
    if let Some(bias) = config.bias {
        calibrator.set_bias(bias)?;
    }
    if let Some(initial_ma) = config.initial_ma {
        calibrator.set_initial_ma(initial_ma)?;
    }
    if let Some(scores) = config.quality_scores {
        calibrator.set_quality_scores(Some(scores))?;
    }
    if let Some(listener) = config.listener {
        calibrator.set_listener(Some(listener))?;
    }
    Ok(calibrator)
}
