//! PROSAC sampler: progressively grows the subset of high-quality measurements.
//!
//! Measurements are ranked by descending quality score. Sample `t` is drawn
//! from the `n` best ranked measurements, always including the `n`-th one,
//! where `n` grows along the PROSAC growth function scaled to the iteration
//! budget. The budget starts at the configured maximum and is replaced by the
//! effective one when the pipeline initializes the sampler, so the whole
//! population is reachable by the last allowed iteration even when the
//! termination criterion caps the run. Once the budget is spent the sampler
//! degrades to uniform sampling.

use crate::core::Sampler;
use crate::utils::UniformRandomGenerator;

pub struct ProsacSampler {
    rng: UniformRandomGenerator<usize>,
    /// Measurement indices by decreasing quality.
    ordering: Vec<usize>,
    growth_function: Vec<usize>,
    sample_size: Option<usize>,
    /// Iterations after which sampling is uniform (`T_N`).
    ransac_convergence_iterations: usize,
    kth_sample_number: usize,
    subset_size: usize,
}

impl ProsacSampler {
    /// Rank measurements by `quality_scores` (higher is better, ties keep their
    /// input order) and sample progressively over `max_iterations`.
    pub fn new(quality_scores: &[f64], max_iterations: usize, seed: Option<u64>) -> Self {
        Self {
            rng: UniformRandomGenerator::from_optional_seed(seed),
            ordering: Self::rank(quality_scores),
            growth_function: Vec::new(),
            sample_size: None,
            ransac_convergence_iterations: max_iterations.max(1),
            kth_sample_number: 1,
            subset_size: 0,
        }
    }

    /// Indices sorted by decreasing score; stable.
    pub fn rank(quality_scores: &[f64]) -> Vec<usize> {
        let mut ordering: Vec<usize> = (0..quality_scores.len()).collect();
        ordering.sort_by(|&a, &b| quality_scores[b].total_cmp(&quality_scores[a]));
        ordering
    }

    pub fn ordering(&self) -> &[usize] {
        &self.ordering
    }

    /// Size of the ranked prefix the next sample is drawn from.
    pub fn subset_size(&self) -> usize {
        self.subset_size
    }

    fn build_growth_function(&mut self, point_number: usize, sample_size: usize) {
        self.sample_size = Some(sample_size);
        self.growth_function.clear();
        self.growth_function.resize(point_number, 0);

        let budget = self.ransac_convergence_iterations;
        let mut t_n = budget as f64;
        for i in 0..sample_size {
            t_n *= (sample_size - i) as f64 / (point_number - i) as f64;
        }

        // rounded up and clamped so the last prefix is due by `T_N`
        for i in 0..point_number {
            if i < sample_size {
                self.growth_function[i] = 1;
                continue;
            }
            t_n *= (i + 1) as f64 / (i + 1 - sample_size) as f64;
            let due = (t_n.ceil() as usize).min(budget);
            self.growth_function[i] = due.max(self.growth_function[i - 1]);
        }

        self.kth_sample_number = 1;
        self.subset_size = sample_size;
    }

    fn increment_iteration_number(&mut self) {
        self.kth_sample_number += 1;

        let point_number = self.ordering.len();
        while self.kth_sample_number <= self.ransac_convergence_iterations
            && self.subset_size < point_number
            && self.kth_sample_number > self.growth_function[self.subset_size - 1]
        {
            self.subset_size += 1;
        }
    }
}

impl Sampler for ProsacSampler {
    fn sample(&mut self, point_count: usize, sample_size: usize, out_indices: &mut [usize]) -> bool {
        if sample_size == 0
            || point_count != self.ordering.len()
            || sample_size > point_count
            || out_indices.len() < sample_size
        {
            return false;
        }

        if self.sample_size != Some(sample_size) {
            self.build_growth_function(point_count, sample_size);
        }

        let drawn = &mut out_indices[..sample_size];
        if self.kth_sample_number > self.ransac_convergence_iterations {
            if !self.rng.gen_unique(drawn, 0, point_count - 1) {
                return false;
            }
        } else {
            // the newest member of the prefix is always part of the sample
            let newest = self.subset_size - 1;
            if sample_size > 1 && !self.rng.gen_unique(&mut drawn[..sample_size - 1], 0, newest - 1)
            {
                return false;
            }
            drawn[sample_size - 1] = newest;
        }

        for index in drawn.iter_mut() {
            *index = self.ordering[*index];
        }

        self.increment_iteration_number();
        true
    }

    fn initialize(&mut self, point_count: usize, sample_size: usize, max_iterations: usize) {
        self.ransac_convergence_iterations = max_iterations.max(1);
        if sample_size == 0 || sample_size > point_count || point_count != self.ordering.len() {
            // rejected by `sample` anyway
            self.sample_size = None;
            return;
        }
        self.build_growth_function(point_count, sample_size);
    }
}
