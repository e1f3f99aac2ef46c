//! Integration tests for the robust calibrators.
//!
//! Every method is run end to end through `create` on synthetic measurements
//! generated from a known error matrix.

mod common;

use accel_consensus::termination::required_iterations;
use accel_consensus::{
    create, CalibratorConfig, CalibratorState, Error, ErrorMatrix, ErrorMatrixExt,
    EstimationResult, EstimatorSettings, RobustMethod,
};
use common::{init_logger, max_abs_diff, Ranking, Scenario, ScenarioBuilder};
use nalgebra::Vector3;
use rstest::*;

fn calibrate(scenario: &Scenario, method: RobustMethod, common_axis: bool) -> EstimationResult {
    calibrate_with(scenario, method, common_axis, |_| {})
}

fn calibrate_with(
    scenario: &Scenario,
    method: RobustMethod,
    common_axis: bool,
    tune: impl FnOnce(&mut EstimatorSettings),
) -> EstimationResult {
    let mut settings = EstimatorSettings::for_method(method);
    settings.seed = Some(7);
    tune(&mut settings);

    let config = CalibratorConfig::new(method, scenario.position.into(), &scenario.measurements)
        .with_common_axis(common_axis)
        .with_bias(scenario.bias)
        .with_quality_scores(scenario.quality_scores.clone())
        .with_settings(settings);

    let calibrator = create(config).unwrap();
    assert!(calibrator.is_ready());
    let result = calibrator.calibrate().unwrap();
    assert_eq!(calibrator.state(), CalibratorState::Succeeded);
    result
}

#[rstest]
fn noise_free_data_is_recovered_exactly(
    #[values(
        RobustMethod::Ransac,
        RobustMethod::Lmeds,
        RobustMethod::Msac,
        RobustMethod::Prosac,
        RobustMethod::Promeds
    )]
    method: RobustMethod,
    #[values(false, true)] common_axis: bool,
) {
    init_logger();
    let scenario = ScenarioBuilder {
        common_axis,
        ..Default::default()
    }
    .build();

    let result = calibrate(&scenario, method, common_axis);

    assert!(
        max_abs_diff(&result.ma, &scenario.ma) < 1e-6,
        "{}: {} != {}",
        method,
        result.ma,
        scenario.ma
    );
    assert_eq!(result.inliers.len(), scenario.measurements.len());
    assert!(result.refined);
    assert!(result.converged);
    assert_eq!(result.ma.is_upper_triangular(), common_axis);
    if common_axis {
        assert_eq!(result.myx(), 0.0);
        assert_eq!(result.mzx(), 0.0);
        assert_eq!(result.mzy(), 0.0);
    }
}

#[rstest]
#[case(RobustMethod::Ransac)]
#[case(RobustMethod::Lmeds)]
#[case(RobustMethod::Msac)]
#[case(RobustMethod::Prosac)]
#[case(RobustMethod::Promeds)]
fn thirty_percent_outliers_are_rejected(#[case] method: RobustMethod) {
    init_logger();
    let scenario = ScenarioBuilder {
        seed: 3,
        count: 60,
        outlier_ratio: 0.3,
        noise: 1e-4,
        ..Default::default()
    }
    .build();

    let result = calibrate(&scenario, method, false);

    assert!(
        max_abs_diff(&result.ma, &scenario.ma) < 1e-3,
        "{}: {} != {}",
        method,
        result.ma,
        scenario.ma
    );
    for outlier in &scenario.outliers {
        assert!(!result.inliers.contains(outlier), "{}: outlier {}", method, outlier);
    }
    let clean = scenario.measurements.len() - scenario.outliers.len();
    assert!(result.inliers.len() * 10 >= clean * 9, "{}: {} inliers", method, result.inliers.len());
    assert!(result.covariance.is_some());
}

#[rstest]
#[case(RobustMethod::Prosac, Ranking::OutliersFirst)]
#[case(RobustMethod::Promeds, Ranking::OutliersFirst)]
#[case(RobustMethod::Prosac, Ranking::Flat)]
#[case(RobustMethod::Promeds, Ranking::Flat)]
fn misleading_quality_scores_still_reach_the_inliers(
    #[case] method: RobustMethod,
    #[case] ranking: Ranking,
) {
    init_logger();
    let scenario = ScenarioBuilder {
        seed: 3,
        count: 60,
        outlier_ratio: 0.3,
        noise: 1e-4,
        ranking,
        ..Default::default()
    }
    .build();

    let result = calibrate(&scenario, method, false);

    assert!(
        max_abs_diff(&result.ma, &scenario.ma) < 1e-3,
        "{} {:?}: {} != {}",
        method,
        ranking,
        result.ma,
        scenario.ma
    );
    for outlier in &scenario.outliers {
        assert!(!result.inliers.contains(outlier), "{}: outlier {}", method, outlier);
    }
    let clean = scenario.measurements.len() - scenario.outliers.len();
    assert!(result.inliers.len() * 10 >= clean * 9, "{}: {} inliers", method, result.inliers.len());
}

#[rstest]
#[case(false)]
#[case(true)]
fn lmeds_tolerates_almost_half_outliers(#[case] common_axis: bool) {
    init_logger();
    let scenario = ScenarioBuilder {
        seed: 11,
        count: 60,
        outlier_ratio: 0.45,
        noise: 1e-4,
        common_axis,
        ..Default::default()
    }
    .build();

    let result = calibrate_with(&scenario, RobustMethod::Lmeds, common_axis, |s| {
        s.confidence = 0.999;
    });

    assert!(max_abs_diff(&result.ma, &scenario.ma) < 1e-3);
    assert!(result.inliers.iter().all(|i| !scenario.outliers.contains(i)));
    assert!(result.fitness < 1e-6);
}

#[test]
fn lmeds_breaks_down_past_half_outliers() {
    init_logger();
    let scenario = ScenarioBuilder {
        seed: 11,
        count: 60,
        outlier_ratio: 0.6,
        noise: 1e-4,
        ..Default::default()
    }
    .build();
    let settings = EstimatorSettings::for_method(RobustMethod::Lmeds);

    let result = calibrate(&scenario, RobustMethod::Lmeds, false);

    // the lower half of the residuals always holds corrupted measurements
    assert!(
        result.fitness > settings.stop_threshold * settings.stop_threshold,
        "median {:e}",
        result.fitness
    );
    let budget = required_iterations(settings.confidence, 0.5, 4).unwrap();
    assert_eq!(result.iterations, budget.min(settings.max_iterations));
}

#[rstest]
#[case(RobustMethod::Ransac)]
#[case(RobustMethod::Lmeds)]
#[case(RobustMethod::Msac)]
fn gravity_norm_calibration_with_common_axis(#[case] method: RobustMethod) {
    init_logger();
    let scenario = ScenarioBuilder {
        seed: 5,
        count: 40,
        outlier_ratio: 0.2,
        oriented: false,
        common_axis: true,
        ..Default::default()
    }
    .build();

    let result = calibrate(&scenario, method, true);

    assert!(
        max_abs_diff(&result.ma, &scenario.ma) < 1e-6,
        "{}: {} != {}",
        method,
        result.ma,
        scenario.ma
    );
    assert!(result.ma.is_upper_triangular());
    assert_eq!(
        result.inliers.len(),
        scenario.measurements.len() - scenario.outliers.len()
    );
}

#[test]
fn gravity_norm_calibration_requires_common_axis() {
    let scenario = ScenarioBuilder {
        oriented: false,
        ..Default::default()
    }
    .build();

    let calibrator = create(CalibratorConfig::new(
        RobustMethod::Ransac,
        scenario.position.into(),
        &scenario.measurements,
    ))
    .unwrap();

    assert!(!calibrator.is_ready());
    let err = calibrator.calibrate().unwrap_err();
    assert_eq!(err, Error::OrientationRequired);
    assert!(err.is_not_ready());
    assert_eq!(calibrator.state(), CalibratorState::Idle);
}

#[rstest]
#[case(RobustMethod::Ransac, 5)]
#[case(RobustMethod::Msac, 3)]
#[case(RobustMethod::Lmeds, 2)]
#[case(RobustMethod::Prosac, 4)]
#[case(RobustMethod::Promeds, 1)]
fn iterations_never_exceed_the_budget(#[case] method: RobustMethod, #[case] budget: usize) {
    let scenario = ScenarioBuilder {
        seed: 9,
        outlier_ratio: 0.4,
        ..Default::default()
    }
    .build();

    let result = calibrate_with(&scenario, method, false, |s| {
        s.max_iterations = budget;
        s.stop_threshold = 0.0;
    });
    assert!(result.iterations <= budget);
    assert!(result.iterations >= 1);
}

#[test]
fn same_seed_same_result() {
    let scenario = ScenarioBuilder {
        seed: 21,
        outlier_ratio: 0.25,
        noise: 1e-4,
        ..Default::default()
    }
    .build();

    let a = calibrate(&scenario, RobustMethod::Msac, false);
    let b = calibrate(&scenario, RobustMethod::Msac, false);
    assert_eq!(a.inliers, b.inliers);
    assert_eq!(a.iterations, b.iterations);
    assert_eq!(a.ma, b.ma);
}

#[test]
fn unrefined_result_keeps_the_best_hypothesis() {
    let scenario = ScenarioBuilder::default().build();

    let result = calibrate_with(&scenario, RobustMethod::Ransac, false, |s| {
        s.refine_result = false;
    });

    assert!(!result.refined);
    assert!(!result.converged);
    assert!(result.covariance.is_none());
    assert!(max_abs_diff(&result.ma, &scenario.ma) < 1e-6);
    assert!(result.chi_sq < 1e-12);
}

#[test]
fn degenerate_measurements_fail_the_run() {
    let scenario = ScenarioBuilder::default().build();
    let same_attitude = vec![scenario.measurements[0].clone(); 10];

    let calibrator = create(CalibratorConfig::new(
        RobustMethod::Ransac,
        scenario.position.into(),
        &same_attitude,
    ))
    .unwrap();

    assert_eq!(calibrator.calibrate().unwrap_err(), Error::NoValidModel);
    assert_eq!(calibrator.state(), CalibratorState::Failed);
}

#[test]
fn configuration_round_trip() {
    let scenario = ScenarioBuilder::default().build();
    let ned = scenario.position;
    let initial_ma = ErrorMatrix::from_fn(|r, c| (r as f64 - c as f64) * 1e-4);

    let calibrator = create(
        CalibratorConfig::new(RobustMethod::Promeds, ned.into(), &scenario.measurements)
            .with_common_axis(true)
            .with_bias(scenario.bias)
            .with_initial_ma(initial_ma)
            .with_quality_scores(scenario.quality_scores.clone()),
    )
    .unwrap();

    assert_eq!(calibrator.method(), RobustMethod::Promeds);
    assert!(calibrator.is_common_axis_used());
    assert_eq!(calibrator.bias(), scenario.bias);
    assert_eq!(calibrator.initial_ma(), initial_ma);
    assert_eq!(calibrator.quality_scores(), Some(&scenario.quality_scores[..]));
    assert_eq!(calibrator.measurements().len(), scenario.measurements.len());
    assert!(calibrator.ned_position().equals(&ned, 1e-10, 1e-6));
    assert!(calibrator.ecef_position().equals(&ned.to_ecef(), 1e-9));
    assert_eq!(calibrator.threshold(), None);
    assert!((calibrator.gravity() - ned.gravity()).norm() < 1e-9);

    let ecef = ned.to_ecef();
    let calibrator = create(CalibratorConfig::new(
        RobustMethod::Lmeds,
        ecef.into(),
        &scenario.measurements,
    ))
    .unwrap();
    assert_eq!(calibrator.ecef_position(), ecef);
    assert!(calibrator.ned_position().equals(&ned, 1e-10, 1e-6));
}

#[test]
fn quality_scores_length_is_checked() {
    let scenario = ScenarioBuilder::default().build();
    let short = scenario.quality_scores[..10].to_vec();

    for method in [RobustMethod::Prosac, RobustMethod::Promeds] {
        let err = create(
            CalibratorConfig::new(method, scenario.position.into(), &scenario.measurements)
                .with_quality_scores(short.clone()),
        )
        .err()
        .unwrap();
        assert_eq!(
            err,
            Error::QualityScoresMismatch {
                expected: 40,
                provided: 10
            }
        );
        assert!(err.is_not_ready());
    }

    for method in [RobustMethod::Ransac, RobustMethod::Lmeds, RobustMethod::Msac] {
        let calibrator = create(
            CalibratorConfig::new(method, scenario.position.into(), &scenario.measurements)
                .with_quality_scores(short.clone()),
        )
        .unwrap();
        assert!(calibrator.quality_scores().is_none());
        assert!(calibrator.is_ready());
    }
}

#[test]
fn progressive_methods_need_quality_scores() {
    let scenario = ScenarioBuilder::default().build();
    let calibrator = create(CalibratorConfig::new(
        RobustMethod::Prosac,
        scenario.position.into(),
        &scenario.measurements,
    ))
    .unwrap();
    assert_eq!(calibrator.calibrate().unwrap_err(), Error::MissingQualityScores);
}

#[test]
fn known_bias_is_honoured() {
    let scenario = ScenarioBuilder {
        seed: 13,
        ..Default::default()
    }
    .build();

    // a wrong bias biases the estimate
    let calibrator = create(
        CalibratorConfig::new(
            RobustMethod::Lmeds,
            scenario.position.into(),
            &scenario.measurements,
        )
        .with_bias(scenario.bias + Vector3::new(0.05, 0.0, 0.0)),
    )
    .unwrap();
    let result = calibrator.calibrate().unwrap();
    assert!(max_abs_diff(&result.ma, &scenario.ma) > 1e-4);
}
