//! Shared numeric aliases.
//!
//! The calibration core works with small fixed-size `nalgebra` types for the
//! physical quantities and dynamic ones for the parameter vectors, whose
//! length depends on the calibration mode.

use nalgebra::{DVector, Matrix3};

/// 3x3 scale-factor and cross-coupling error matrix (`Ma`).
///
/// Measured specific force relates to the true one through
/// `f_meas = bias + (I + Ma) * f_true`.
pub type ErrorMatrix = Matrix3<f64>;

/// Free-parameter vector of an [`ErrorMatrix`] (9 or 6 entries).
pub type ParamVector = DVector<f64>;
