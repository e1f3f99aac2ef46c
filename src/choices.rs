//! Lightweight runtime wrappers exposing the built-in strategies via enums
//! while the core pipeline stays fully generic. [`Strategies::for_method`]
//! maps each robust method onto its sampler, scoring and termination.

use crate::core::{Estimator, Sampler, Scoring, TerminationCriterion};
use crate::error::Error;
use crate::samplers::{ProsacSampler, UniformRandomSampler};
use crate::scoring::{LmedsScoring, MsacScoring, RansacScoring, Score};
use crate::settings::{EstimatorSettings, RobustMethod};
use crate::termination::{AdaptiveTermination, FixedTermination};

/// Runtime sampler selection.
pub enum SamplerChoice {
    Uniform(UniformRandomSampler),
    Prosac(ProsacSampler),
}

impl Sampler for SamplerChoice {
    fn sample(&mut self, point_count: usize, sample_size: usize, out_indices: &mut [usize]) -> bool {
        match self {
            SamplerChoice::Uniform(s) => s.sample(point_count, sample_size, out_indices),
            SamplerChoice::Prosac(s) => s.sample(point_count, sample_size, out_indices),
        }
    }

    fn initialize(&mut self, point_count: usize, sample_size: usize, max_iterations: usize) {
        match self {
            SamplerChoice::Uniform(s) => s.initialize(point_count, sample_size, max_iterations),
            SamplerChoice::Prosac(s) => s.initialize(point_count, sample_size, max_iterations),
        }
    }
}

/// Runtime scoring selection.
#[derive(Debug, Clone)]
pub enum ScoringChoice {
    Ransac(RansacScoring),
    Msac(MsacScoring),
    Lmeds(LmedsScoring),
}

impl Scoring for ScoringChoice {
    fn threshold(&self) -> Option<f64> {
        match self {
            ScoringChoice::Ransac(s) => s.threshold(),
            ScoringChoice::Msac(s) => s.threshold(),
            ScoringChoice::Lmeds(s) => s.threshold(),
        }
    }

    fn score<E: Estimator>(
        &self,
        estimator: &E,
        model: &E::Model,
        best: Option<&Score>,
        inliers_out: &mut Vec<usize>,
    ) -> Option<Score> {
        match self {
            ScoringChoice::Ransac(s) => s.score(estimator, model, best, inliers_out),
            ScoringChoice::Msac(s) => s.score(estimator, model, best, inliers_out),
            ScoringChoice::Lmeds(s) => s.score(estimator, model, best, inliers_out),
        }
    }

    fn fitness(&self, score: &Score) -> f64 {
        match self {
            ScoringChoice::Ransac(s) => s.fitness(score),
            ScoringChoice::Msac(s) => s.fitness(score),
            ScoringChoice::Lmeds(s) => s.fitness(score),
        }
    }
}

/// Runtime termination selection.
#[derive(Debug, Clone)]
pub enum TerminationChoice {
    Adaptive(AdaptiveTermination),
    Fixed(FixedTermination),
}

impl TerminationCriterion for TerminationChoice {
    fn initialize(&mut self, point_count: usize, sample_size: usize, max_iterations: &mut usize) {
        match self {
            TerminationChoice::Adaptive(term) => {
                term.initialize(point_count, sample_size, max_iterations)
            }
            TerminationChoice::Fixed(term) => {
                term.initialize(point_count, sample_size, max_iterations)
            }
        }
    }

    fn check(
        &mut self,
        point_count: usize,
        best_score: &Score,
        sample_size: usize,
        max_iterations: &mut usize,
    ) -> bool {
        match self {
            TerminationChoice::Adaptive(term) => {
                term.check(point_count, best_score, sample_size, max_iterations)
            }
            TerminationChoice::Fixed(term) => {
                term.check(point_count, best_score, sample_size, max_iterations)
            }
        }
    }
}

/// Sampler, scoring and termination of one robust method.
pub struct Strategies {
    pub sampler: SamplerChoice,
    pub scoring: ScoringChoice,
    pub termination: TerminationChoice,
}

impl Strategies {
    /// Fails with [`Error::MissingThreshold`] or
    /// [`Error::MissingQualityScores`] when the method needs them.
    pub fn for_method(
        method: RobustMethod,
        settings: &EstimatorSettings,
        quality_scores: Option<&[f64]>,
    ) -> Result<Self, Error> {
        let threshold = || settings.threshold.ok_or(Error::MissingThreshold);
        let prosac = || {
            quality_scores
                .map(|q| ProsacSampler::new(q, settings.max_iterations, settings.seed))
                .ok_or(Error::MissingQualityScores)
        };
        let adaptive = || {
            TerminationChoice::Adaptive(AdaptiveTermination {
                confidence: settings.confidence,
            })
        };
        let fixed = || {
            TerminationChoice::Fixed(FixedTermination {
                confidence: settings.confidence,
                stop_threshold: settings.stop_threshold,
            })
        };
        let uniform = || SamplerChoice::Uniform(UniformRandomSampler::from_optional_seed(settings.seed));

        Ok(match method {
            RobustMethod::Ransac => Self {
                sampler: uniform(),
                scoring: ScoringChoice::Ransac(RansacScoring::new(threshold()?)),
                termination: adaptive(),
            },
            RobustMethod::Msac => Self {
                sampler: uniform(),
                scoring: ScoringChoice::Msac(MsacScoring::new(threshold()?)),
                termination: adaptive(),
            },
            RobustMethod::Lmeds => Self {
                sampler: uniform(),
                scoring: ScoringChoice::Lmeds(LmedsScoring::new(settings.stop_threshold)),
                termination: fixed(),
            },
            RobustMethod::Prosac => Self {
                sampler: SamplerChoice::Prosac(prosac()?),
                scoring: ScoringChoice::Ransac(RansacScoring::with_early_exit(threshold()?)),
                termination: adaptive(),
            },
            RobustMethod::Promeds => Self {
                sampler: SamplerChoice::Prosac(prosac()?),
                scoring: ScoringChoice::Lmeds(LmedsScoring::new(settings.stop_threshold)),
                termination: fixed(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn methods_map_onto_strategies() {
        let scores = [1.0, 0.5, 0.2];
        for method in RobustMethod::ALL {
            let settings = EstimatorSettings::for_method(method);
            let s = Strategies::for_method(method, &settings, Some(&scores)).unwrap();

            assert_eq!(
                matches!(s.sampler, SamplerChoice::Prosac(_)),
                method.requires_quality_scores()
            );
            assert_eq!(
                matches!(s.termination, TerminationChoice::Fixed(_)),
                method.is_median_based()
            );
            assert_eq!(s.scoring.threshold().is_some(), method.requires_threshold());
        }
    }

    #[test]
    fn promeds_reaches_every_measurement_within_its_budget() {
        let settings = EstimatorSettings {
            seed: Some(4),
            ..EstimatorSettings::for_method(RobustMethod::Promeds)
        };
        let scores: Vec<f64> = (0..40).map(|i| 1.0 - i as f64 / 40.0).collect();
        let mut s = Strategies::for_method(RobustMethod::Promeds, &settings, Some(&scores)).unwrap();

        let mut budget = settings.max_iterations;
        s.termination.initialize(40, 4, &mut budget);
        assert_eq!(budget, 72);
        s.sampler.initialize(40, 4, budget);

        let mut out = [0usize; 4];
        let mut reached = [false; 40];
        for _ in 0..budget {
            assert!(s.sampler.sample(40, 4, &mut out));
            for &i in &out {
                reached[i] = true;
            }
        }
        // the lowest ranked measurement was drawn at least once
        assert!(reached[39]);
    }

    #[test]
    fn prosac_scoring_exits_early() {
        let settings = EstimatorSettings::for_method(RobustMethod::Prosac);
        let s = Strategies::for_method(RobustMethod::Prosac, &settings, Some(&[1.0])).unwrap();
        assert!(matches!(s.scoring, ScoringChoice::Ransac(RansacScoring { early_exit: true, .. })));
    }

    #[test]
    fn missing_inputs_are_reported() {
        let settings = EstimatorSettings::default();
        assert_eq!(
            Strategies::for_method(RobustMethod::Ransac, &settings, None).err(),
            Some(Error::MissingThreshold)
        );
        let settings = EstimatorSettings::for_method(RobustMethod::Promeds);
        assert_eq!(
            Strategies::for_method(RobustMethod::Promeds, &settings, None).err(),
            Some(Error::MissingQualityScores)
        );
    }
}
