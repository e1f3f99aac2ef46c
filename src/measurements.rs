//! Accelerometer measurements taken at rest.

use nalgebra::{UnitQuaternion, Vector3};

/// Specific force sample with its standard deviation and, optionally, the
/// body-to-NED attitude it was taken at.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    /// Measured specific force in the body frame (m/s²).
    pub specific_force: Vector3<f64>,
    /// Standard deviation of the specific force (m/s²); residuals are
    /// weighted by its inverse during refinement.
    pub std_dev: f64,
    /// Body-to-NED attitude when known.
    pub orientation: Option<UnitQuaternion<f64>>,
}

impl Measurement {
    pub fn new(specific_force: Vector3<f64>, std_dev: f64) -> Self {
        Self {
            specific_force,
            std_dev,
            orientation: None,
        }
    }

    pub fn with_orientation(
        specific_force: Vector3<f64>,
        std_dev: f64,
        orientation: UnitQuaternion<f64>,
    ) -> Self {
        Self {
            specific_force,
            std_dev,
            orientation: Some(orientation),
        }
    }

    /// Weight applied to this measurement's residuals.
    pub fn weight(&self) -> f64 {
        1.0 / self.std_dev
    }

    pub(crate) fn has_valid_std_dev(&self) -> bool {
        self.std_dev.is_finite() && self.std_dev > 0.0
    }
}
