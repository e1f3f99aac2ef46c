//! Example: accelerometer calibration at a known position
//!
//! Simulates a static tumble test of a slightly miscalibrated accelerometer,
//! corrupts a quarter of the samples and recovers the error matrix with each
//! robust method. Run with `RUST_LOG=debug` to follow the search.

use std::f64::consts::{FRAC_PI_2, PI};

use accel_consensus::earth::NedPosition;
use accel_consensus::estimators::predict_specific_force;
use accel_consensus::*;
use nalgebra::{Matrix3, UnitQuaternion, Vector3};
use rand::Rng;

struct ProgressPrinter;

impl CalibrationListener for ProgressPrinter {
    fn on_calibrate_progress_change(&self, _calibrator: &RobustCalibrator<'_>, progress: f64) {
        println!("    progress {:5.1}%", 100.0 * progress);
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    println!("=== Known-Position Accelerometer Calibration ===\n");

    let position = NedPosition::new(41.3825_f64.to_radians(), 2.1769_f64.to_radians(), 120.0);
    let gravity = position.gravity();
    let bias = Vector3::new(0.08, -0.05, 0.12);
    let ma = Matrix3::new(
        1.5e-3, 2.0e-4, -3.0e-4, //
        1.0e-4, -8.0e-4, 4.0e-4, //
        -2.0e-4, 3.0e-4, 6.0e-4,
    );

    let n_total = 60;
    let n_outliers = 15;
    let noise = 5e-4;
    let mut rng = rand::thread_rng();

    let mut measurements = Vec::with_capacity(n_total);
    let mut quality_scores = Vec::with_capacity(n_total);
    for i in 0..n_total {
        let attitude = UnitQuaternion::from_euler_angles(
            rng.gen_range(-PI..PI),
            rng.gen_range(-FRAC_PI_2..FRAC_PI_2),
            rng.gen_range(-PI..PI),
        );
        let mut f = predict_specific_force(&ma, &bias, &gravity, Some(&attitude));
        f += Vector3::from_fn(|_, _| rng.gen_range(-noise..noise));

        // the last samples were taken while the unit was still moving
        if i >= n_total - n_outliers {
            f += Vector3::from_fn(|_, _| rng.gen_range(-1.5..1.5));
            quality_scores.push(rng.gen_range(0.0..0.5));
        } else {
            quality_scores.push(rng.gen_range(0.4..1.0));
        }
        measurements.push(Measurement::with_orientation(f, noise, attitude));
    }

    println!(
        "Generated {} measurements, {} of them corrupted",
        n_total, n_outliers
    );
    println!("Local gravity: {:.5} m/s²\n", gravity.norm());

    for method in RobustMethod::ALL {
        println!("{}:", method);
        let settings = EstimatorSettings {
            progress_delta: 0.25,
            ..EstimatorSettings::for_method(method)
        };
        let calibrator = create(
            CalibratorConfig::new(method, position.into(), &measurements)
                .with_bias(bias)
                .with_quality_scores(quality_scores.clone())
                .with_listener(ProgressPrinter)
                .with_settings(settings),
        )?;
        let result = calibrator.calibrate()?;

        println!(
            "  {} inliers, {} iterations, fitness {:.3e}, converged {}",
            result.inlier_count(),
            result.iterations,
            result.fitness,
            result.converged
        );
        println!(
            "  scale factors [{:+.6}, {:+.6}, {:+.6}]",
            result.sx(),
            result.sy(),
            result.sz()
        );
        println!(
            "  cross coupling [{:+.6}, {:+.6}, {:+.6}, {:+.6}, {:+.6}, {:+.6}]",
            result.mxy(),
            result.mxz(),
            result.myx(),
            result.myz(),
            result.mzx(),
            result.mzy()
        );
        println!(
            "  max error {:.3e}\n",
            (result.ma - ma).abs().max()
        );
    }

    Ok(())
}
