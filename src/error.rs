//! Errors reported by the calibrators.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Fewer measurements than the minimal subset of the selected residual model.
    #[error("not enough measurements: {provided} provided, {required} required")]
    NotEnoughMeasurements { required: usize, provided: usize },

    /// PROSAC and PROMedS rank measurements by quality: scores are mandatory.
    #[error("quality scores are required by the selected method")]
    MissingQualityScores,

    #[error("expected {expected} quality scores, got {provided}")]
    QualityScoresMismatch { expected: usize, provided: usize },

    /// RANSAC, MSAC and PROSAC classify inliers against a residual threshold.
    #[error("inlier threshold is required by the selected method")]
    MissingThreshold,

    #[error("measurement #{0}: standard deviation must be finite and positive")]
    InvalidStandardDeviation(usize),

    /// Without orientations only the gravity norm is observable, which pins
    /// the error matrix down up to a rotation.
    #[error("orientation-free measurements require common-axis mode")]
    OrientationRequired,

    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),

    /// A calibration is in progress on this instance.
    #[error("calibrator is locked: calibration in progress")]
    Locked,

    /// The selected measurements do not constrain every free parameter.
    #[error("singular model: degenerate measurement subset")]
    SingularModel,

    /// The iteration budget was spent without any valid hypothesis.
    #[error("no valid model found within the iteration budget")]
    NoValidModel,

    #[error("numerical failure: {0}")]
    NumericalFailure(String),
}

impl Error {
    /// True for the configuration errors raised before a calibration starts.
    pub fn is_not_ready(&self) -> bool {
        matches!(
            self,
            Self::NotEnoughMeasurements { .. }
                | Self::MissingQualityScores
                | Self::QualityScoresMismatch { .. }
                | Self::MissingThreshold
                | Self::InvalidStandardDeviation(_)
                | Self::OrientationRequired
                | Self::InvalidParameter(_)
        )
    }
}
