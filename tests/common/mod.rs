//! Synthetic calibration data shared by the integration tests.

#![allow(dead_code)]

use std::f64::consts::{FRAC_PI_2, PI};
use std::sync::Once;

use accel_consensus::earth::NedPosition;
use accel_consensus::estimators::predict_specific_force;
use accel_consensus::models::ParameterLayout;
use accel_consensus::{ErrorMatrix, Measurement};
use log::LevelFilter;
use nalgebra::{UnitQuaternion, Vector3};
use rand::prelude::*;

static INIT: Once = Once::new();

pub fn init_logger() {
    INIT.call_once(|| {
        env_logger::builder()
            .is_test(true)
            .filter_level(LevelFilter::Debug)
            .init();
    });
}

pub const STD_DEV: f64 = 1e-3;

/// Measurements taken at rest at a known position.
pub struct Scenario {
    pub position: NedPosition,
    pub bias: Vector3<f64>,
    pub ma: ErrorMatrix,
    pub measurements: Vec<Measurement>,
    pub outliers: Vec<usize>,
    pub quality_scores: Vec<f64>,
}

/// How the quality scores relate to the corruption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ranking {
    /// Higher for clean measurements, with some overlap.
    InliersFirst,
    /// The corrupted measurements carry the highest scores.
    OutliersFirst,
    /// Every measurement scores the same.
    Flat,
}

pub struct ScenarioBuilder {
    pub seed: u64,
    pub count: usize,
    pub outlier_ratio: f64,
    /// Half-width of the uniform noise added to each component (m/s²).
    pub noise: f64,
    pub oriented: bool,
    pub common_axis: bool,
    pub ranking: Ranking,
}

impl Default for ScenarioBuilder {
    fn default() -> Self {
        Self {
            seed: 42,
            count: 40,
            outlier_ratio: 0.0,
            noise: 0.0,
            oriented: true,
            common_axis: false,
            ranking: Ranking::InliersFirst,
        }
    }
}

impl ScenarioBuilder {
    pub fn build(&self) -> Scenario {
        let mut rng = StdRng::seed_from_u64(self.seed);

        let position = NedPosition::new(
            rng.gen_range(-1.2..1.2),
            rng.gen_range(-PI..PI),
            rng.gen_range(0.0..2000.0),
        );
        let gravity = position.gravity();
        let bias = Vector3::from_fn(|_, _| rng.gen_range(-0.1..0.1));

        let ma = ErrorMatrix::from_fn(|r, c| {
            if r == c {
                rng.gen_range(-2e-3..2e-3)
            } else {
                rng.gen_range(-5e-4..5e-4)
            }
        });
        let ma = ParameterLayout::new(self.common_axis).constrain(&ma);

        let outlier_count = (self.outlier_ratio * self.count as f64).round() as usize;
        let mut outliers = rand::seq::index::sample(&mut rng, self.count, outlier_count).into_vec();
        outliers.sort_unstable();

        let mut measurements = Vec::with_capacity(self.count);
        let mut quality_scores = Vec::with_capacity(self.count);
        for i in 0..self.count {
            let attitude = UnitQuaternion::from_euler_angles(
                rng.gen_range(-PI..PI),
                rng.gen_range(-FRAC_PI_2..FRAC_PI_2),
                rng.gen_range(-PI..PI),
            );
            let mut f = predict_specific_force(&ma, &bias, &gravity, Some(&attitude));
            if self.noise > 0.0 {
                f += Vector3::from_fn(|_, _| rng.gen_range(-self.noise..self.noise));
            }

            let corrupted = outliers.binary_search(&i).is_ok();
            if corrupted {
                let magnitude = rng.gen_range(0.5..2.0);
                let sign = if rng.gen_bool(0.5) { 1.0 } else { -1.0 };
                f += f.normalize() * sign * magnitude;
            }
            quality_scores.push(match (self.ranking, corrupted) {
                (Ranking::InliersFirst, true) => rng.gen_range(0.0..0.6),
                (Ranking::InliersFirst, false) => rng.gen_range(0.5..1.0),
                (Ranking::OutliersFirst, true) => rng.gen_range(1.5..2.0),
                (Ranking::OutliersFirst, false) => rng.gen_range(0.0..1.0),
                (Ranking::Flat, _) => 1.0,
            });

            measurements.push(if self.oriented {
                Measurement::with_orientation(f, STD_DEV, attitude)
            } else {
                Measurement::new(f, STD_DEV)
            });
        }

        Scenario {
            position,
            bias,
            ma,
            measurements,
            outliers,
            quality_scores,
        }
    }
}

/// Largest absolute entry-wise difference.
pub fn max_abs_diff(a: &ErrorMatrix, b: &ErrorMatrix) -> f64 {
    (a - b).abs().max()
}
