//! Termination criteria.

use log::debug;

use crate::core::TerminationCriterion;
use crate::scoring::Score;

/// Iterations needed to draw at least one all-inlier subset with probability
/// `confidence`, given the inlier ratio. `None` when no finite bound exists.
pub fn required_iterations(confidence: f64, inlier_ratio: f64, sample_size: usize) -> Option<usize> {
    let inlier_ratio = inlier_ratio.clamp(0.0, 1.0);
    if inlier_ratio >= 1.0 {
        return Some(1);
    }
    if inlier_ratio <= 0.0 {
        return None;
    }

    let p_good_sample = inlier_ratio.powi(sample_size as i32);
    if p_good_sample <= 0.0 {
        return None;
    }

    let log_one_minus_conf = (1.0 - confidence).ln();
    let log_one_minus_p = (1.0 - p_good_sample).ln();
    if !log_one_minus_conf.is_finite() || !log_one_minus_p.is_finite() || log_one_minus_p >= 0.0 {
        return None;
    }

    let required = (log_one_minus_conf / log_one_minus_p).ceil().max(1.0);
    if required >= usize::MAX as f64 {
        return None;
    }
    Some(required as usize)
}

/// Shrinks the budget as the inlier ratio of the best hypothesis grows.
/// Used by RANSAC, MSAC and PROSAC.
#[derive(Debug, Clone)]
pub struct AdaptiveTermination {
    /// Desired confidence in (0, 1).
    pub confidence: f64,
}

impl TerminationCriterion for AdaptiveTermination {
    fn check(
        &mut self,
        point_count: usize,
        best_score: &Score,
        sample_size: usize,
        max_iterations: &mut usize,
    ) -> bool {
        if point_count == 0 {
            return false;
        }

        let inlier_ratio = best_score.inlier_count as f64 / point_count as f64;
        if let Some(required) = required_iterations(self.confidence, inlier_ratio, sample_size) {
            if required < *max_iterations {
                debug!(
                    "inlier ratio {:.3}: iteration budget lowered to {}",
                    inlier_ratio, required
                );
                *max_iterations = required;
            }
        }

        // the loop stops once the lowered budget is spent
        false
    }
}

/// Budget derived once from the confidence assuming half the measurements
/// are outliers, plus an early stop when the median squared residual drops
/// below `stop_threshold²`. Used by LMedS and PROMedS.
#[derive(Debug, Clone)]
pub struct FixedTermination {
    pub confidence: f64,
    pub stop_threshold: f64,
}

/// Outlier ratio a median-based estimator tolerates.
const WORST_CASE_INLIER_RATIO: f64 = 0.5;

impl TerminationCriterion for FixedTermination {
    fn initialize(&mut self, _point_count: usize, sample_size: usize, max_iterations: &mut usize) {
        if let Some(required) =
            required_iterations(self.confidence, WORST_CASE_INLIER_RATIO, sample_size)
        {
            *max_iterations = (*max_iterations).min(required);
        }
    }

    fn check(
        &mut self,
        _point_count: usize,
        best_score: &Score,
        _sample_size: usize,
        _max_iterations: &mut usize,
    ) -> bool {
        let median = -best_score.value;
        let stop = median <= self.stop_threshold * self.stop_threshold;
        if stop {
            debug!("median squared residual {:.3e} below stop threshold", median);
        }
        stop
    }
}
