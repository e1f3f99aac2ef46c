//! Configuration types for the robust calibrators.
//!
//! Every struct implements [`Default`] with the values the calibrators start
//! from; the robust method decides which of the fields are actually used.

use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Default confidence that at least one sampled subset is outlier free.
pub const DEFAULT_CONFIDENCE: f64 = 0.99;

/// Default iteration budget.
pub const DEFAULT_MAX_ITERATIONS: usize = 5000;

/// Default inlier threshold for threshold-based methods, in m/s².
pub const DEFAULT_THRESHOLD: f64 = 1e-2;

/// Default stop threshold for median-based methods, in m/s².
pub const DEFAULT_STOP_THRESHOLD: f64 = 1e-3;

/// Default progress notification granularity.
pub const DEFAULT_PROGRESS_DELTA: f64 = 0.05;

/// Robust estimation method.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RobustMethod {
    /// Uniform sampling, inlier-count scoring.
    Ransac,
    /// Uniform sampling, least median of squared residuals.
    #[default]
    Lmeds,
    /// Uniform sampling, truncated quadratic loss.
    Msac,
    /// Quality-ranked progressive sampling, inlier-count scoring.
    Prosac,
    /// Quality-ranked progressive sampling, least median of squared residuals.
    Promeds,
}

impl RobustMethod {
    /// All supported methods.
    pub const ALL: [RobustMethod; 5] = [
        Self::Ransac,
        Self::Lmeds,
        Self::Msac,
        Self::Prosac,
        Self::Promeds,
    ];

    /// Methods classifying inliers against a residual threshold.
    pub fn requires_threshold(&self) -> bool {
        matches!(self, Self::Ransac | Self::Msac | Self::Prosac)
    }

    /// Methods ranking measurements by their quality scores.
    pub fn requires_quality_scores(&self) -> bool {
        matches!(self, Self::Prosac | Self::Promeds)
    }

    /// Methods scoring hypotheses with the median squared residual.
    pub fn is_median_based(&self) -> bool {
        matches!(self, Self::Lmeds | Self::Promeds)
    }
}

impl fmt::Display for RobustMethod {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Ransac => write!(f, "RANSAC"),
            Self::Lmeds => write!(f, "LMedS"),
            Self::Msac => write!(f, "MSAC"),
            Self::Prosac => write!(f, "PROSAC"),
            Self::Promeds => write!(f, "PROMedS"),
        }
    }
}

impl FromStr for RobustMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ransac" => Ok(Self::Ransac),
            "lmeds" => Ok(Self::Lmeds),
            "msac" => Ok(Self::Msac),
            "prosac" => Ok(Self::Prosac),
            "promeds" => Ok(Self::Promeds),
            _ => Err(Error::InvalidParameter("unknown robust method")),
        }
    }
}

/// Settings of the damped least-squares refinement.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RefinerSettings {
    /// Iteration cap; reaching it without meeting `tolerance` flags the
    /// result as not converged.
    pub max_iterations: usize,
    /// Relative change of the weighted cost below which iteration stops.
    pub tolerance: f64,
    /// Initial Levenberg-Marquardt damping factor.
    pub initial_damping: f64,
}

impl Default for RefinerSettings {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            tolerance: 1e-12,
            initial_damping: 1e-3,
        }
    }
}

/// Settings shared by every robust method.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EstimatorSettings {
    /// Probability that at least one sampled subset is outlier free, in (0, 1).
    pub confidence: f64,
    /// Upper bound on the number of search iterations.
    pub max_iterations: usize,
    /// Inlier residual threshold (m/s²). Used by RANSAC, MSAC and PROSAC.
    pub threshold: Option<f64>,
    /// Median residual (m/s²) at which LMedS and PROMedS stop early. Also the
    /// floor of their robust inlier scale.
    pub stop_threshold: f64,
    /// Minimal progress change between two listener notifications, in [0, 1].
    pub progress_delta: f64,
    /// Refine the best hypothesis on its inliers once the search ends.
    pub refine_result: bool,
    /// Keep the covariance of the refined parameters.
    pub keep_covariance: bool,
    /// Seed of the subset sampler. `None` seeds from entropy.
    pub seed: Option<u64>,
    pub refiner: RefinerSettings,
}

impl Default for EstimatorSettings {
    fn default() -> Self {
        Self {
            confidence: DEFAULT_CONFIDENCE,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            threshold: None,
            stop_threshold: DEFAULT_STOP_THRESHOLD,
            progress_delta: DEFAULT_PROGRESS_DELTA,
            refine_result: true,
            keep_covariance: true,
            seed: None,
            refiner: RefinerSettings::default(),
        }
    }
}

impl EstimatorSettings {
    /// Default settings for a method: threshold-based methods get
    /// [`DEFAULT_THRESHOLD`], median-based ones none.
    pub fn for_method(method: RobustMethod) -> Self {
        Self {
            threshold: method.requires_threshold().then_some(DEFAULT_THRESHOLD),
            ..Self::default()
        }
    }

    /// Checks value ranges. Method-specific requirements are checked by the
    /// calibrator.
    pub fn validate(&self) -> Result<(), Error> {
        if !(self.confidence > 0.0 && self.confidence < 1.0) {
            return Err(Error::InvalidParameter("confidence must lie in (0, 1)"));
        }
        if self.max_iterations == 0 {
            return Err(Error::InvalidParameter("max_iterations must be positive"));
        }
        if let Some(threshold) = self.threshold {
            if !(threshold > 0.0 && threshold.is_finite()) {
                return Err(Error::InvalidParameter("threshold must be positive"));
            }
        }
        if !(self.stop_threshold >= 0.0 && self.stop_threshold.is_finite()) {
            return Err(Error::InvalidParameter(
                "stop_threshold must be non-negative",
            ));
        }
        if !(0.0..=1.0).contains(&self.progress_delta) {
            return Err(Error::InvalidParameter("progress_delta must lie in [0, 1]"));
        }
        if self.refiner.max_iterations == 0 {
            return Err(Error::InvalidParameter(
                "refiner max_iterations must be positive",
            ));
        }
        if !(self.refiner.tolerance >= 0.0 && self.refiner.initial_damping > 0.0) {
            return Err(Error::InvalidParameter("invalid refiner settings"));
        }
        Ok(())
    }
}
