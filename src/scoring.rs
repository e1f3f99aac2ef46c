//! Scoring strategies.
//!
//! Every strategy reduces a hypothesis to a [`Score`] where a larger
//! [`Score::value`] is better, so the pipeline can compare hypotheses without
//! knowing which robust method it runs:
//! - [`RansacScoring`] counts inliers within a residual threshold,
//! - [`MsacScoring`] sums the truncated squared residuals (negated),
//! - [`LmedsScoring`] takes the median squared residual (negated) and derives
//!   the inlier set from a robust scale estimate.

use std::cmp::Ordering;

use crate::core::{Estimator, Scoring};
use crate::utils::lower_median;

/// Consistency factor turning a median absolute residual into a Gaussian
/// standard deviation.
const MAD_CONSISTENCY: f64 = 1.4826;

/// Inlier cut-off of LMedS, in robust standard deviations.
const LMEDS_INLIER_FACTOR: f64 = 2.5;

/// Score of one hypothesis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Score {
    pub inlier_count: usize,
    /// Strategy-dependent quality; larger is better.
    pub value: f64,
    /// Sum of the squared inlier residuals, breaks ties on `value`.
    pub residual_sum: f64,
}

impl Score {
    pub fn new(inlier_count: usize, value: f64, residual_sum: f64) -> Self {
        Self {
            inlier_count,
            value,
            residual_sum,
        }
    }
}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match self.value.partial_cmp(&other.value)? {
            Ordering::Equal => other.residual_sum.partial_cmp(&self.residual_sum),
            ord => Some(ord),
        }
    }
}

/// Inlier counting within `threshold`.
///
/// With `early_exit` the evaluation is abandoned as soon as the remaining
/// measurements can no longer reach the best inlier count.
#[derive(Debug, Clone)]
pub struct RansacScoring {
    pub threshold: f64,
    pub early_exit: bool,
}

impl RansacScoring {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            early_exit: false,
        }
    }

    pub fn with_early_exit(threshold: f64) -> Self {
        Self {
            threshold,
            early_exit: true,
        }
    }
}

impl Scoring for RansacScoring {
    fn threshold(&self) -> Option<f64> {
        Some(self.threshold)
    }

    fn score<E: Estimator>(
        &self,
        estimator: &E,
        model: &E::Model,
        best: Option<&Score>,
        inliers_out: &mut Vec<usize>,
    ) -> Option<Score> {
        let n = estimator.point_count();
        let thresh_sq = self.threshold * self.threshold;
        let to_beat = best.filter(|_| self.early_exit).map(|b| b.inlier_count);
        inliers_out.clear();

        let mut residual_sum = 0.0;
        for i in 0..n {
            let r = estimator.residual(model, i);
            let r2 = r * r;
            if r2 <= thresh_sq {
                inliers_out.push(i);
                residual_sum += r2;
            }

            if let Some(to_beat) = to_beat {
                if inliers_out.len() + (n - i - 1) < to_beat {
                    return None;
                }
            }
        }

        Some(Score::new(
            inliers_out.len(),
            inliers_out.len() as f64,
            residual_sum,
        ))
    }

    fn fitness(&self, score: &Score) -> f64 {
        score.inlier_count as f64
    }
}

/// Truncated quadratic loss: every measurement costs `min(r², threshold²)`.
#[derive(Debug, Clone)]
pub struct MsacScoring {
    pub threshold: f64,
}

impl MsacScoring {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl Scoring for MsacScoring {
    fn threshold(&self) -> Option<f64> {
        Some(self.threshold)
    }

    fn score<E: Estimator>(
        &self,
        estimator: &E,
        model: &E::Model,
        _best: Option<&Score>,
        inliers_out: &mut Vec<usize>,
    ) -> Option<Score> {
        let thresh_sq = self.threshold * self.threshold;
        inliers_out.clear();

        let mut cost = 0.0;
        let mut residual_sum = 0.0;
        for i in 0..estimator.point_count() {
            let r = estimator.residual(model, i);
            let r2 = r * r;
            if r2 <= thresh_sq {
                inliers_out.push(i);
                residual_sum += r2;
                cost += r2;
            } else {
                cost += thresh_sq;
            }
        }

        Some(Score::new(inliers_out.len(), -cost, residual_sum))
    }

    /// Total truncated cost.
    fn fitness(&self, score: &Score) -> f64 {
        -score.value
    }
}

/// Least median of squared residuals.
///
/// Inliers are the measurements within `2.5·σ` of the hypothesis, where σ is
/// the robust scale `1.4826·(1 + 5/(n - s))·√median`, floored at
/// `stop_threshold`.
#[derive(Debug, Clone)]
pub struct LmedsScoring {
    pub stop_threshold: f64,
}

impl LmedsScoring {
    pub fn new(stop_threshold: f64) -> Self {
        Self { stop_threshold }
    }

    /// Robust residual standard deviation from the median squared residual.
    pub fn robust_scale(median_sq: f64, point_count: usize, sample_size: usize) -> f64 {
        let correction = if point_count > sample_size {
            1.0 + 5.0 / (point_count - sample_size) as f64
        } else {
            1.0
        };
        MAD_CONSISTENCY * correction * median_sq.sqrt()
    }
}

impl Scoring for LmedsScoring {
    fn threshold(&self) -> Option<f64> {
        None
    }

    fn score<E: Estimator>(
        &self,
        estimator: &E,
        model: &E::Model,
        _best: Option<&Score>,
        inliers_out: &mut Vec<usize>,
    ) -> Option<Score> {
        let n = estimator.point_count();
        let residuals: Vec<f64> = (0..n).map(|i| estimator.residual(model, i)).collect();

        let mut squared: Vec<f64> = residuals.iter().map(|r| r * r).collect();
        let median = lower_median(&mut squared)?;
        if !median.is_finite() {
            return None;
        }

        let sigma = Self::robust_scale(median, n, estimator.sample_size());
        let cutoff = (LMEDS_INLIER_FACTOR * sigma).max(self.stop_threshold);

        inliers_out.clear();
        let mut residual_sum = 0.0;
        for (i, r) in residuals.iter().enumerate() {
            if *r <= cutoff {
                inliers_out.push(i);
                residual_sum += r * r;
            }
        }

        Some(Score::new(inliers_out.len(), -median, residual_sum))
    }

    /// Median squared residual.
    fn fitness(&self, score: &Score) -> f64 {
        -score.value
    }
}
