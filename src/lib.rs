//! # Accel Consensus - Robust Known-Position Accelerometer Calibration
//!
//! `accel_consensus` estimates the scale-factor and cross-coupling error
//! matrix `Ma` of a triaxial accelerometer from specific-force samples taken
//! at rest at a precisely known position, with a known bias, while rejecting
//! outlier samples:
//!
//! ```text
//! f_meas = bias + (I + Ma) · f_true
//! ```
//!
//! Five robust methods are available: RANSAC, LMedS, MSAC, PROSAC and
//! PROMedS. They share one consensus pipeline and differ only in the
//! sampler, scoring and termination strategies plugged into it.
//!
//! ## Quick Start
//!
//! ```rust
//! use accel_consensus::earth::{specific_force_at_rest, NedPosition};
//! use accel_consensus::{create, CalibratorConfig, Measurement, RobustMethod};
//! use nalgebra::{Matrix3, UnitQuaternion};
//!
//! let position = NedPosition::new(41.38_f64.to_radians(), 2.17_f64.to_radians(), 120.0);
//! let gravity = position.gravity();
//! let ma = Matrix3::new(1e-3, 2e-4, -1e-4, 0.0, -5e-4, 3e-4, 0.0, 0.0, 8e-4);
//!
//! let measurements: Vec<Measurement> = (0..30)
//!     .map(|k| {
//!         let k = k as f64;
//!         let q = UnitQuaternion::from_euler_angles(0.9 * k, 0.4 * k - 1.2, 1.3 * k);
//!         let f = (Matrix3::identity() + ma) * specific_force_at_rest(&gravity, Some(&q));
//!         Measurement::with_orientation(f, 1e-3, q)
//!     })
//!     .collect();
//!
//! let calibrator = create(
//!     CalibratorConfig::new(RobustMethod::Lmeds, position.into(), &measurements)
//!         .with_common_axis(true),
//! )
//! .unwrap();
//! let result = calibrator.calibrate().unwrap();
//! assert!((result.ma - ma).abs().max() < 1e-9);
//! println!("sx = {:e}, {} inliers", result.sx(), result.inliers.len());
//! ```
//!
//! ## Extending the Library
//!
//! The pipeline in [`core`] is generic over its strategies:
//!
//! - **[`Estimator`](core::Estimator)**: hypothesis generation and residuals
//! - **[`Sampler`](core::Sampler)**: minimal subset selection
//! - **[`Scoring`](core::Scoring)**: hypothesis scoring and inlier classification
//! - **[`TerminationCriterion`](core::TerminationCriterion)**: stopping rule
//! - **[`LocalOptimizer`](optimisers::LocalOptimizer)**: final refinement
//!
//! ### Example: Custom Sampler
//!
//! ```rust
//! use accel_consensus::core::Sampler;
//!
//! /// Always draws the first measurements.
//! struct FirstSampler;
//!
//! impl Sampler for FirstSampler {
//!     fn sample(&mut self, point_count: usize, sample_size: usize, out: &mut [usize]) -> bool {
//!         if sample_size > point_count {
//!             return false;
//!         }
//!         for (i, index) in out.iter_mut().take(sample_size).enumerate() {
//!             *index = i;
//!         }
//!         true
//!     }
//! }
//! ```
//!
//! ## Modules
//!
//! - **[`api`](api)**: `create` entry point and the estimation result
//! - **[`calibrator`](calibrator)**: the robust calibrator and its listener
//! - **[`core`](core)**: core traits and the consensus pipeline
//! - **[`estimators`](estimators)**: the known-position measurement model
//! - **[`samplers`](samplers)**: uniform and PROSAC sampling
//! - **[`scoring`](scoring)**: RANSAC, MSAC and LMedS scoring
//! - **[`termination`](termination)**: adaptive and fixed iteration budgets
//! - **[`optimisers`](optimisers)**: final non-linear refinement
//! - **[`refinement`](refinement)**: Levenberg-Marquardt over argmin problems
//! - **[`earth`](earth)**: WGS84 positions and normal gravity
//! - **[`settings`](settings)**: configuration types

pub mod api;
pub mod calibrator;
pub mod choices;
pub mod core;
pub mod earth;
pub mod error;
pub mod estimators;
pub mod measurements;
pub mod models;
pub mod optimisers;
pub mod refinement;
pub mod samplers;
pub mod scoring;
pub mod settings;
pub mod termination;
pub mod types;
pub mod utils;

// Re-export high-level API
pub use api::{create, CalibratorConfig, EstimationResult};
pub use calibrator::{CalibrationListener, CalibratorState, RobustCalibrator};

// Re-export core traits for easy access
pub use core::{Estimator, Sampler, Scoring, TerminationCriterion};
pub use optimisers::LocalOptimizer;

pub use earth::{EcefPosition, NedPosition, Position};
pub use error::Error;
pub use measurements::Measurement;
pub use models::ErrorMatrixExt;
pub use settings::{EstimatorSettings, RefinerSettings, RobustMethod};
pub use types::ErrorMatrix;
