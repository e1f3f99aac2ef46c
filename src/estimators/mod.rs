//! Estimators generating error matrix hypotheses.
//!
//! A single measurement model covers both residual kinds: full specific-force
//! vectors when every attitude is known, gravity magnitude otherwise.

pub mod measurement_model;

pub use measurement_model::{predict_specific_force, MeasurementModel, ResidualKind};
