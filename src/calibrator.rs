//! Robust known-position accelerometer calibrator.
//!
//! [`RobustCalibrator`] binds one [`RobustMethod`] to a measurement set, a
//! known position and a known bias, and estimates the error matrix `Ma` with
//! the consensus pipeline. A run is synchronous: [`RobustCalibrator::calibrate`]
//! drives the whole search on the calling thread and notifies the optional
//! [`CalibrationListener`] inline.

use std::cell::Cell;

use log::{info, warn};
use nalgebra::Vector3;

use crate::api::EstimationResult;
use crate::choices::Strategies;
use crate::core::{IterationObserver, RobustPipeline, Scoring};
use crate::earth::{EcefPosition, NedPosition, Position};
use crate::error::Error;
use crate::estimators::{MeasurementModel, ResidualKind};
use crate::measurements::Measurement;
use crate::optimisers::NonlinearRefiner;
use crate::settings::{EstimatorSettings, RobustMethod, DEFAULT_THRESHOLD};
use crate::types::ErrorMatrix;

/// Lifecycle of a calibrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CalibratorState {
    #[default]
    Idle,
    Running,
    Succeeded,
    Failed,
}

/// Receives calibration events, synchronously from the calibrating thread.
///
/// Callbacks run inline with the search loop and should return quickly.
pub trait CalibrationListener {
    fn on_calibrate_start(&self, _calibrator: &RobustCalibrator<'_>) {}

    fn on_calibrate_end(&self, _calibrator: &RobustCalibrator<'_>) {}

    /// `iteration` is 1-based.
    fn on_calibrate_next_iteration(&self, _calibrator: &RobustCalibrator<'_>, _iteration: usize) {}

    /// `progress` lies in [0, 1].
    fn on_calibrate_progress_change(&self, _calibrator: &RobustCalibrator<'_>, _progress: f64) {}

    /// Checked at the top of every iteration; returning `true` ends the search
    /// with the best hypothesis found so far.
    fn is_cancelled(&self, _calibrator: &RobustCalibrator<'_>) -> bool {
        false
    }
}

pub struct RobustCalibrator<'a> {
    method: RobustMethod,
    position: EcefPosition,
    measurements: &'a [Measurement],
    common_axis_used: bool,
    bias: Vector3<f64>,
    initial_ma: ErrorMatrix,
    quality_scores: Option<Vec<f64>>,
    listener: Option<Box<dyn CalibrationListener + 'a>>,
    settings: EstimatorSettings,
    state: Cell<CalibratorState>,
}

/// Marks the run failed if it unwinds while running.
struct RunGuard<'c> {
    state: &'c Cell<CalibratorState>,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if self.state.get() == CalibratorState::Running {
            self.state.set(CalibratorState::Failed);
        }
    }
}

/// Forwards pipeline events to the listener, throttling progress updates.
struct ListenerBridge<'c, 'a> {
    calibrator: &'c RobustCalibrator<'a>,
    listener: Option<&'c (dyn CalibrationListener + 'a)>,
    progress_delta: f64,
    last_progress: Option<f64>,
}

impl ListenerBridge<'_, '_> {
    fn notify_progress(&mut self, progress: f64) {
        let advanced = match self.last_progress {
            None => true,
            Some(last) => progress - last >= self.progress_delta && progress > last,
        };
        if advanced {
            self.last_progress = Some(progress);
            if let Some(listener) = self.listener {
                listener.on_calibrate_progress_change(self.calibrator, progress);
            }
        }
    }

    fn finish(&mut self) {
        if self.last_progress != Some(1.0) {
            self.last_progress = Some(1.0);
            if let Some(listener) = self.listener {
                listener.on_calibrate_progress_change(self.calibrator, 1.0);
            }
        }
    }
}

impl IterationObserver for ListenerBridge<'_, '_> {
    fn on_iteration(&mut self, iteration: usize) {
        if let Some(listener) = self.listener {
            listener.on_calibrate_next_iteration(self.calibrator, iteration);
        }
    }

    fn on_progress(&mut self, completed: usize, max_iterations: usize) {
        if max_iterations == 0 {
            return;
        }
        let progress = (completed as f64 / max_iterations as f64).min(1.0);
        // the final notification is left to `finish`
        if progress < 1.0 {
            self.notify_progress(progress);
        }
    }

    fn should_stop(&mut self) -> bool {
        self.listener
            .is_some_and(|listener| listener.is_cancelled(self.calibrator))
    }
}

impl<'a> RobustCalibrator<'a> {
    /// Calibrator with zero bias, zero initial matrix and the method's default
    /// settings.
    pub fn new(
        method: RobustMethod,
        position: Position,
        measurements: &'a [Measurement],
        common_axis_used: bool,
    ) -> Self {
        Self {
            method,
            position: position.to_ecef(),
            measurements,
            common_axis_used,
            bias: Vector3::zeros(),
            initial_ma: ErrorMatrix::zeros(),
            quality_scores: None,
            listener: None,
            settings: EstimatorSettings::for_method(method),
            state: Cell::new(CalibratorState::Idle),
        }
    }

    pub fn method(&self) -> RobustMethod {
        self.method
    }

    pub fn measurements(&self) -> &'a [Measurement] {
        self.measurements
    }

    pub fn ecef_position(&self) -> EcefPosition {
        self.position
    }

    pub fn ned_position(&self) -> NedPosition {
        self.position.to_ned()
    }

    pub fn is_common_axis_used(&self) -> bool {
        self.common_axis_used
    }

    pub fn bias(&self) -> Vector3<f64> {
        self.bias
    }

    pub fn initial_ma(&self) -> ErrorMatrix {
        self.initial_ma
    }

    /// Quality scores; always `None` for methods that do not rank
    /// measurements.
    pub fn quality_scores(&self) -> Option<&[f64]> {
        self.quality_scores.as_deref()
    }

    pub fn settings(&self) -> &EstimatorSettings {
        &self.settings
    }

    pub fn confidence(&self) -> f64 {
        self.settings.confidence
    }

    pub fn max_iterations(&self) -> usize {
        self.settings.max_iterations
    }

    pub fn threshold(&self) -> Option<f64> {
        self.settings.threshold
    }

    pub fn stop_threshold(&self) -> f64 {
        self.settings.stop_threshold
    }

    pub fn progress_delta(&self) -> f64 {
        self.settings.progress_delta
    }

    pub fn has_listener(&self) -> bool {
        self.listener.is_some()
    }

    pub fn state(&self) -> CalibratorState {
        self.state.get()
    }

    pub fn is_running(&self) -> bool {
        self.state.get() == CalibratorState::Running
    }

    /// Expected NED gravity at the calibration position.
    pub fn gravity(&self) -> Vector3<f64> {
        self.ned_position().gravity()
    }

    /// Residual kind the current measurements lead to.
    pub fn residual_kind(&self) -> ResidualKind {
        ResidualKind::for_measurements(self.measurements)
    }

    /// Minimal subset size for the current measurements and mode.
    pub fn minimum_required_measurements(&self) -> usize {
        self.residual_kind()
            .minimum_subset_size(self.common_axis_used)
    }

    pub fn is_ready(&self) -> bool {
        self.check_ready().is_ok()
    }

    /// Reports the first missing or invalid input.
    pub fn check_ready(&self) -> Result<(), Error> {
        self.settings.validate()?;
        if self.method.requires_threshold() && self.settings.threshold.is_none() {
            return Err(Error::MissingThreshold);
        }
        if self.method.requires_quality_scores() {
            match &self.quality_scores {
                None => return Err(Error::MissingQualityScores),
                Some(scores) if scores.len() != self.measurements.len() => {
                    return Err(Error::QualityScoresMismatch {
                        expected: self.measurements.len(),
                        provided: scores.len(),
                    })
                }
                Some(_) => {}
            }
        }

        let required = self.minimum_required_measurements();
        if self.measurements.len() < required {
            return Err(Error::NotEnoughMeasurements {
                required,
                provided: self.measurements.len(),
            });
        }
        if self.residual_kind() == ResidualKind::GravityNorm && !self.common_axis_used {
            return Err(Error::OrientationRequired);
        }
        if let Some(index) = self
            .measurements
            .iter()
            .position(|m| !m.has_valid_std_dev())
        {
            return Err(Error::InvalidStandardDeviation(index));
        }
        Ok(())
    }

    fn check_unlocked(&self) -> Result<(), Error> {
        if self.is_running() {
            Err(Error::Locked)
        } else {
            Ok(())
        }
    }

    pub fn set_method(&mut self, method: RobustMethod) -> Result<(), Error> {
        self.check_unlocked()?;
        self.method = method;
        if !method.requires_quality_scores() {
            self.quality_scores = None;
        }
        if method.is_median_based() {
            self.settings.threshold = None;
        } else if self.settings.threshold.is_none() {
            self.settings.threshold = Some(DEFAULT_THRESHOLD);
        }
        Ok(())
    }

    pub fn set_measurements(&mut self, measurements: &'a [Measurement]) -> Result<(), Error> {
        self.check_unlocked()?;
        self.measurements = measurements;
        Ok(())
    }

    pub fn set_position(&mut self, position: impl Into<Position>) -> Result<(), Error> {
        self.check_unlocked()?;
        self.position = position.into().to_ecef();
        Ok(())
    }

    pub fn set_common_axis_used(&mut self, common_axis_used: bool) -> Result<(), Error> {
        self.check_unlocked()?;
        self.common_axis_used = common_axis_used;
        Ok(())
    }

    pub fn set_bias(&mut self, bias: Vector3<f64>) -> Result<(), Error> {
        self.check_unlocked()?;
        self.bias = bias;
        Ok(())
    }

    pub fn set_initial_ma(&mut self, initial_ma: ErrorMatrix) -> Result<(), Error> {
        self.check_unlocked()?;
        self.initial_ma = initial_ma;
        Ok(())
    }

    /// Quality scores are only kept by PROSAC and PROMedS, which require one
    /// per measurement; other methods accept and discard them.
    pub fn set_quality_scores(&mut self, quality_scores: Option<Vec<f64>>) -> Result<(), Error> {
        self.check_unlocked()?;
        if !self.method.requires_quality_scores() {
            self.quality_scores = None;
            return Ok(());
        }
        if let Some(scores) = &quality_scores {
            if scores.len() != self.measurements.len() {
                return Err(Error::QualityScoresMismatch {
                    expected: self.measurements.len(),
                    provided: scores.len(),
                });
            }
        }
        self.quality_scores = quality_scores;
        Ok(())
    }

    pub fn set_listener(
        &mut self,
        listener: Option<Box<dyn CalibrationListener + 'a>>,
    ) -> Result<(), Error> {
        self.check_unlocked()?;
        self.listener = listener;
        Ok(())
    }

    pub fn set_settings(&mut self, settings: EstimatorSettings) -> Result<(), Error> {
        self.check_unlocked()?;
        settings.validate()?;
        if self.method.is_median_based() && settings.threshold.is_some() {
            return Err(Error::InvalidParameter(
                "median-based methods take no inlier threshold",
            ));
        }
        self.settings = settings;
        Ok(())
    }

    pub fn set_confidence(&mut self, confidence: f64) -> Result<(), Error> {
        self.set_settings(EstimatorSettings {
            confidence,
            ..self.settings.clone()
        })
    }

    pub fn set_max_iterations(&mut self, max_iterations: usize) -> Result<(), Error> {
        self.set_settings(EstimatorSettings {
            max_iterations,
            ..self.settings.clone()
        })
    }

    /// Rejected for LMedS and PROMedS, which classify inliers from the median
    /// residual instead.
    pub fn set_threshold(&mut self, threshold: f64) -> Result<(), Error> {
        self.set_settings(EstimatorSettings {
            threshold: Some(threshold),
            ..self.settings.clone()
        })
    }

    pub fn set_stop_threshold(&mut self, stop_threshold: f64) -> Result<(), Error> {
        self.set_settings(EstimatorSettings {
            stop_threshold,
            ..self.settings.clone()
        })
    }

    pub fn set_progress_delta(&mut self, progress_delta: f64) -> Result<(), Error> {
        self.set_settings(EstimatorSettings {
            progress_delta,
            ..self.settings.clone()
        })
    }

    pub fn set_refine_result(&mut self, refine_result: bool) -> Result<(), Error> {
        self.check_unlocked()?;
        self.settings.refine_result = refine_result;
        Ok(())
    }

    pub fn set_keep_covariance(&mut self, keep_covariance: bool) -> Result<(), Error> {
        self.check_unlocked()?;
        self.settings.keep_covariance = keep_covariance;
        Ok(())
    }

    pub fn set_seed(&mut self, seed: Option<u64>) -> Result<(), Error> {
        self.check_unlocked()?;
        self.settings.seed = seed;
        Ok(())
    }

    /// Estimate the error matrix.
    ///
    /// Fails with [`Error::Locked`] when called while a calibration on this
    /// instance is running (e.g. from a listener callback), with a
    /// configuration error when an input is missing, and with
    /// [`Error::NoValidModel`] when no subset produced a valid hypothesis.
    /// A refinement that fails or does not converge is not an error: the best
    /// hypothesis is kept and [`EstimationResult::converged`] is false.
    pub fn calibrate(&self) -> Result<EstimationResult, Error> {
        self.check_unlocked()?;
        self.check_ready()?;

        let model = MeasurementModel::new(
            self.measurements,
            self.bias,
            self.gravity(),
            self.common_axis_used,
            self.initial_ma,
            self.settings.refiner,
        )?;
        let strategies =
            Strategies::for_method(self.method, &self.settings, self.quality_scores())?;

        self.state.set(CalibratorState::Running);
        let _guard = RunGuard { state: &self.state };

        info!(
            "{} calibration started: {} measurements, {:?} residuals, common axis {}",
            self.method,
            self.measurements.len(),
            model.kind(),
            self.common_axis_used
        );

        let listener = self.listener.as_deref();
        if let Some(listener) = listener {
            listener.on_calibrate_start(self);
        }

        let mut bridge = ListenerBridge {
            calibrator: self,
            listener,
            progress_delta: self.settings.progress_delta,
            last_progress: None,
        };

        let optimizer = self
            .settings
            .refine_result
            .then(|| NonlinearRefiner::new(self.settings.refiner, self.settings.keep_covariance));

        let mut pipeline = RobustPipeline::new(
            self.settings.max_iterations,
            model,
            strategies.sampler,
            strategies.scoring,
            strategies.termination,
            optimizer,
        );

        if let Err(e) = pipeline.run(&mut bridge) {
            self.state.set(CalibratorState::Failed);
            return Err(e);
        }

        let (Some(best_model), Some(best_score)) = (pipeline.best_model, pipeline.best_score)
        else {
            self.state.set(CalibratorState::Failed);
            return Err(Error::NoValidModel);
        };
        let fitness = pipeline.scoring.fitness(&best_score);
        let inliers = pipeline.best_inliers;

        let result = match pipeline.refinement {
            Some(refinement) => {
                if !refinement.converged {
                    warn!(
                        "refinement did not converge after {} iterations",
                        refinement.iterations
                    );
                }
                EstimationResult {
                    ma: refinement.model,
                    inliers,
                    fitness,
                    iterations: pipeline.iteration,
                    covariance: refinement.covariance,
                    converged: refinement.converged,
                    refined: true,
                    chi_sq: refinement.chi_sq,
                    mse: refinement.mse,
                }
            }
            None => {
                let estimator = &pipeline.estimator;
                let chi_sq = estimator.chi_sq(&best_model, &inliers);
                let residual_count = inliers.len() * estimator.kind().dimension();
                EstimationResult {
                    ma: best_model,
                    fitness,
                    iterations: pipeline.iteration,
                    covariance: None,
                    converged: false,
                    refined: false,
                    chi_sq,
                    mse: if residual_count > 0 {
                        chi_sq / residual_count as f64
                    } else {
                        0.0
                    },
                    inliers,
                }
            }
        };

        bridge.finish();
        info!(
            "{} calibration finished: {} iterations, {}/{} inliers, fitness {:.6e}",
            self.method,
            result.iterations,
            result.inliers.len(),
            self.measurements.len(),
            result.fitness
        );

        if let Some(listener) = listener {
            listener.on_calibrate_end(self);
        }
        self.state.set(CalibratorState::Succeeded);
        Ok(result)
    }
}
