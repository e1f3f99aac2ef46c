//! Core robust-estimation traits and the consensus pipeline.
//!
//! The pipeline is generic over the measurement model ([`Estimator`]) and the
//! three strategies that tell the robust methods apart:
//! - a [`Sampler`] drawing candidate minimal subsets,
//! - a [`Scoring`] evaluating a hypothesis against every measurement,
//! - a [`TerminationCriterion`] deciding when to stop sampling.
//!
//! An optional [`LocalOptimizer`] polishes the best hypothesis on its inliers
//! once the search has ended.

use log::{debug, error, warn};

use crate::error::Error;
use crate::optimisers::{LocalOptimizer, Refinement};
use crate::scoring::Score;

/// Attempts at drawing a non-degenerate subset within one iteration.
const MAX_SAMPLE_ATTEMPTS: usize = 10;

/// Measurement model generating hypotheses from subsets of measurements.
pub trait Estimator {
    /// Model type produced by this estimator.
    type Model: Clone;

    /// Number of measurements the estimator works on.
    fn point_count(&self) -> usize;

    /// Size of a minimal subset.
    fn sample_size(&self) -> usize;

    /// Check whether a subset may produce a hypothesis.
    fn is_valid_sample(&self, sample: &[usize]) -> bool;

    /// Estimate a hypothesis from a subset of at least `sample_size` indices.
    ///
    /// Fails with [`Error::SingularModel`] when the subset does not constrain
    /// every free parameter.
    fn estimate_model(&self, sample: &[usize]) -> Result<Self::Model, Error>;

    /// Validate a hypothesis before scoring.
    fn is_valid_model(&self, model: &Self::Model) -> bool;

    /// Non-negative residual magnitude of measurement `index`.
    fn residual(&self, model: &Self::Model, index: usize) -> f64;
}

/// Sampler responsible for drawing minimal subsets.
pub trait Sampler {
    /// Draw `sample_size` distinct indices in `[0, point_count)` into
    /// `out_indices`.
    ///
    /// Returns `false` if a sample could not be drawn.
    fn sample(&mut self, point_count: usize, sample_size: usize, out_indices: &mut [usize])
        -> bool;

    /// Called once before the first iteration with the budget the run will
    /// actually use, after the termination criterion has adjusted it.
    fn initialize(&mut self, _point_count: usize, _sample_size: usize, _max_iterations: usize) {}
}

/// Scoring strategy evaluating hypotheses and classifying inliers.
pub trait Scoring {
    /// Inlier residual threshold, for threshold-based strategies.
    fn threshold(&self) -> Option<f64>;

    /// Score `model` against every measurement and collect its inliers.
    ///
    /// `best` is the best score so far; strategies may abandon the evaluation
    /// and return `None` once it can no longer be beaten.
    fn score<E: Estimator>(
        &self,
        estimator: &E,
        model: &E::Model,
        best: Option<&Score>,
        inliers_out: &mut Vec<usize>,
    ) -> Option<Score>;

    /// Fitness reported to the caller for a score, in the strategy's own units.
    fn fitness(&self, score: &Score) -> f64;
}

/// Termination criterion deciding when the search loop can stop.
pub trait TerminationCriterion {
    /// Called once before the first iteration; may lower the budget.
    fn initialize(&mut self, _point_count: usize, _sample_size: usize, _max_iterations: &mut usize) {
    }

    /// Called whenever the best score improved. May lower `max_iterations`.
    ///
    /// Returns `true` if the search should stop immediately.
    fn check(
        &mut self,
        point_count: usize,
        best_score: &Score,
        sample_size: usize,
        max_iterations: &mut usize,
    ) -> bool;
}

/// Receives search events, inline with the loop.
pub trait IterationObserver {
    /// A new iteration (1-based) is starting.
    fn on_iteration(&mut self, _iteration: usize) {}

    /// `completed` iterations out of the current budget are done.
    fn on_progress(&mut self, _completed: usize, _max_iterations: usize) {}

    /// Checked at the top of every iteration.
    fn should_stop(&mut self) -> bool {
        false
    }
}

/// Observer ignoring every event.
pub struct NoopObserver;

impl IterationObserver for NoopObserver {}

/// Consensus pipeline: sample, hypothesize, score, terminate, then refine.
pub struct RobustPipeline<E, Sa, Sc, T, LO>
where
    E: Estimator,
    Sa: Sampler,
    Sc: Scoring,
    T: TerminationCriterion,
    LO: LocalOptimizer<E>,
{
    pub max_iterations: usize,
    pub estimator: E,
    pub sampler: Sa,
    pub scoring: Sc,
    pub termination: T,
    pub final_optimizer: Option<LO>,

    // Outputs / diagnostics
    pub best_model: Option<E::Model>,
    pub best_inliers: Vec<usize>,
    pub best_score: Option<Score>,
    pub iteration: usize,
    pub refinement: Option<Refinement<E::Model>>,
}

impl<E, Sa, Sc, T, LO> RobustPipeline<E, Sa, Sc, T, LO>
where
    E: Estimator,
    Sa: Sampler,
    Sc: Scoring,
    T: TerminationCriterion,
    LO: LocalOptimizer<E>,
{
    pub fn new(
        max_iterations: usize,
        estimator: E,
        sampler: Sa,
        scoring: Sc,
        termination: T,
        final_optimizer: Option<LO>,
    ) -> Self {
        Self {
            max_iterations,
            estimator,
            sampler,
            scoring,
            termination,
            final_optimizer,
            best_model: None,
            best_inliers: Vec::new(),
            best_score: None,
            iteration: 0,
            refinement: None,
        }
    }

    /// Run the search loop and the final refinement.
    ///
    /// Fails with [`Error::NoValidModel`] when no subset produced a valid
    /// hypothesis within the budget. Refinement failures are logged and leave
    /// [`Self::refinement`] unset.
    pub fn run(&mut self, observer: &mut dyn IterationObserver) -> Result<(), Error> {
        let point_count = self.estimator.point_count();
        let sample_size = self.estimator.sample_size();
        if point_count < sample_size {
            return Err(Error::NotEnoughMeasurements {
                required: sample_size,
                provided: point_count,
            });
        }

        let mut sample = vec![0usize; sample_size];
        let mut tmp_inliers = Vec::with_capacity(point_count);

        let mut max_iterations = self.max_iterations;
        self.termination
            .initialize(point_count, sample_size, &mut max_iterations);
        self.sampler
            .initialize(point_count, sample_size, max_iterations);

        self.best_inliers.clear();
        self.best_model = None;
        self.best_score = None;
        self.refinement = None;
        self.iteration = 0;

        while self.iteration < max_iterations {
            if observer.should_stop() {
                debug!("search stopped by observer at iteration {}", self.iteration);
                break;
            }
            observer.on_iteration(self.iteration + 1);

            let mut stop = false;
            if let Some(model) = self.hypothesize(point_count, sample_size, &mut sample) {
                let score = self.scoring.score(
                    &self.estimator,
                    &model,
                    self.best_score.as_ref(),
                    &mut tmp_inliers,
                );

                if let Some(score) = score {
                    let better = match &self.best_score {
                        None => true,
                        Some(best) => score > *best,
                    };

                    if better {
                        debug!(
                            "iteration {}: new best hypothesis, {} inliers, fitness {:.6e}",
                            self.iteration + 1,
                            score.inlier_count,
                            self.scoring.fitness(&score)
                        );
                        self.best_model = Some(model);
                        self.best_inliers.clear();
                        self.best_inliers.extend_from_slice(&tmp_inliers);
                        stop = self.termination.check(
                            point_count,
                            &score,
                            sample_size,
                            &mut max_iterations,
                        );
                        self.best_score = Some(score);
                    }
                }
            }

            self.iteration += 1;
            observer.on_progress(self.iteration, max_iterations);
            if stop {
                break;
            }
        }

        let Some(best_model) = self.best_model.as_ref() else {
            error!(
                "no valid hypothesis after {} iterations over {} measurements",
                self.iteration, point_count
            );
            return Err(Error::NoValidModel);
        };

        if let Some(optimizer) = &mut self.final_optimizer {
            if self.best_inliers.len() >= sample_size {
                match optimizer.run(&self.estimator, &self.best_inliers, best_model) {
                    Ok(refinement) => self.refinement = Some(refinement),
                    Err(e) => warn!("refinement failed, keeping best hypothesis: {}", e),
                }
            } else {
                warn!(
                    "{} inliers are not enough to refine the best hypothesis",
                    self.best_inliers.len()
                );
            }
        }

        Ok(())
    }

    /// Draw subsets until one yields a valid hypothesis. Degenerate subsets
    /// are discarded.
    fn hypothesize(
        &mut self,
        point_count: usize,
        sample_size: usize,
        sample: &mut [usize],
    ) -> Option<E::Model> {
        for _ in 0..MAX_SAMPLE_ATTEMPTS {
            if !self.sampler.sample(point_count, sample_size, sample) {
                continue;
            }
            if !self.estimator.is_valid_sample(sample) {
                continue;
            }
            match self.estimator.estimate_model(sample) {
                Ok(model) if self.estimator.is_valid_model(&model) => return Some(model),
                Ok(_) => debug!("discarding invalid hypothesis from subset {:?}", sample),
                Err(e) => debug!("discarding subset {:?}: {}", sample, e),
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One-parameter model: every measurement is a scalar observation of it.
    struct MockEstimator {
        values: Vec<f64>,
        singular: bool,
    }

    impl Estimator for MockEstimator {
        type Model = f64;

        fn point_count(&self) -> usize {
            self.values.len()
        }

        fn sample_size(&self) -> usize {
            1
        }

        fn is_valid_sample(&self, _sample: &[usize]) -> bool {
            true
        }

        fn estimate_model(&self, sample: &[usize]) -> Result<f64, Error> {
            if self.singular {
                return Err(Error::SingularModel);
            }
            Ok(sample.iter().map(|&i| self.values[i]).sum::<f64>() / sample.len() as f64)
        }

        fn is_valid_model(&self, model: &f64) -> bool {
            model.is_finite()
        }

        fn residual(&self, model: &f64, index: usize) -> f64 {
            (self.values[index] - model).abs()
        }
    }

    /// Walks the measurements in order.
    struct SequentialSampler {
        next: usize,
        budget: Option<usize>,
    }

    impl Sampler for SequentialSampler {
        fn sample(&mut self, point_count: usize, _sample_size: usize, out: &mut [usize]) -> bool {
            out[0] = self.next % point_count;
            self.next += 1;
            true
        }

        fn initialize(&mut self, _point_count: usize, _sample_size: usize, max_iterations: usize) {
            self.budget = Some(max_iterations);
        }
    }

    struct CountScoring;

    impl Scoring for CountScoring {
        fn threshold(&self) -> Option<f64> {
            Some(0.5)
        }

        fn score<E: Estimator>(
            &self,
            estimator: &E,
            model: &E::Model,
            _best: Option<&Score>,
            inliers_out: &mut Vec<usize>,
        ) -> Option<Score> {
            inliers_out.clear();
            inliers_out.extend(
                (0..estimator.point_count()).filter(|&i| estimator.residual(model, i) <= 0.5),
            );
            Some(Score::new(
                inliers_out.len(),
                inliers_out.len() as f64,
                0.0,
            ))
        }

        fn fitness(&self, score: &Score) -> f64 {
            score.value
        }
    }

    struct StopWhenAllInliers {
        checks: usize,
        cap: Option<usize>,
    }

    impl TerminationCriterion for StopWhenAllInliers {
        fn initialize(&mut self, _: usize, _: usize, max_iterations: &mut usize) {
            if let Some(cap) = self.cap {
                *max_iterations = (*max_iterations).min(cap);
            }
        }

        fn check(&mut self, point_count: usize, best: &Score, _: usize, _: &mut usize) -> bool {
            self.checks += 1;
            best.inlier_count == point_count
        }
    }

    struct MeanOptimizer;

    impl LocalOptimizer<MockEstimator> for MeanOptimizer {
        fn run(
            &mut self,
            estimator: &MockEstimator,
            inliers: &[usize],
            _model: &f64,
        ) -> Result<Refinement<f64>, Error> {
            Ok(Refinement {
                model: estimator.estimate_model(inliers)?,
                covariance: None,
                converged: true,
                iterations: 1,
                chi_sq: 0.0,
                mse: 0.0,
            })
        }
    }

    #[derive(Default)]
    struct RecordingObserver {
        iterations: Vec<usize>,
        stop_after: Option<usize>,
    }

    impl IterationObserver for RecordingObserver {
        fn on_iteration(&mut self, iteration: usize) {
            self.iterations.push(iteration);
        }

        fn should_stop(&mut self) -> bool {
            matches!(self.stop_after, Some(n) if self.iterations.len() >= n)
        }
    }

    fn pipeline(
        values: Vec<f64>,
        singular: bool,
    ) -> RobustPipeline<MockEstimator, SequentialSampler, CountScoring, StopWhenAllInliers, MeanOptimizer>
    {
        RobustPipeline::new(
            20,
            MockEstimator { values, singular },
            SequentialSampler {
                next: 0,
                budget: None,
            },
            CountScoring,
            StopWhenAllInliers {
                checks: 0,
                cap: None,
            },
            Some(MeanOptimizer),
        )
    }

    #[test]
    fn pipeline_keeps_best_consensus() {
        let mut pipeline = pipeline(vec![10.0, 1.0, 1.2, 0.9, 1.1, -7.0], false);
        pipeline.run(&mut NoopObserver).unwrap();

        assert_eq!(pipeline.best_inliers, vec![1, 2, 3, 4]);
        assert_eq!(pipeline.best_score.unwrap().inlier_count, 4);
        assert_eq!(pipeline.iteration, 20);
        assert_eq!(pipeline.sampler.budget, Some(20));

        let refined = pipeline.refinement.unwrap().model;
        assert!((refined - 1.05).abs() < 1e-12);
    }

    #[test]
    fn termination_stops_the_search() {
        let mut pipeline = pipeline(vec![1.0, 1.1, 0.9], false);
        let mut observer = RecordingObserver::default();
        pipeline.run(&mut observer).unwrap();

        assert_eq!(pipeline.iteration, 1);
        assert_eq!(observer.iterations, vec![1]);
        assert_eq!(pipeline.termination.checks, 1);
    }

    #[test]
    fn sampler_sees_the_capped_budget() {
        let mut pipeline = pipeline(vec![10.0, 1.0, 1.2, 0.9, 1.1, -7.0], false);
        pipeline.termination.cap = Some(5);
        pipeline.run(&mut NoopObserver).unwrap();

        assert_eq!(pipeline.sampler.budget, Some(5));
        assert_eq!(pipeline.iteration, 5);
    }

    #[test]
    fn singular_subsets_exhaust_the_budget() {
        let mut pipeline = pipeline(vec![1.0, 2.0], true);
        assert_eq!(pipeline.run(&mut NoopObserver), Err(Error::NoValidModel));
        assert_eq!(pipeline.iteration, 20);
    }

    #[test]
    fn observer_can_stop_the_search() {
        let mut pipeline = pipeline(vec![10.0, 1.0, 1.2, 0.9, 1.1, -7.0], false);
        let mut observer = RecordingObserver {
            stop_after: Some(3),
            ..Default::default()
        };
        pipeline.run(&mut observer).unwrap();
        assert_eq!(pipeline.iteration, 3);
        assert!(pipeline.best_model.is_some());
    }
}
