use crate::merge::{MergedProject, MergedTest};
use serde::{Deserialize, Serialize};

/// Cutoffs reported for Top-K.
pub const TOP_K: [usize; 4] = [1, 3, 5, 10];

/// Bug-level Top-K hits with the bugs behind each count.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopKCounts {
    pub top_1: usize,
    pub top_3: usize,
    pub top_5: usize,
    pub top_10: usize,
    pub found: TopKBugs,
    pub missed: TopKBugs,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopKBugs {
    pub top_1: Vec<String>,
    pub top_3: Vec<String>,
    pub top_5: Vec<String>,
    pub top_10: Vec<String>,
}

impl TopKBugs {
    fn bucket_mut(&mut self, k: usize) -> &mut Vec<String> {
        match k {
            1 => &mut self.top_1,
            3 => &mut self.top_3,
            5 => &mut self.top_5,
            _ => &mut self.top_10,
        }
    }
}

impl TopKCounts {
    #[must_use]
    pub const fn count(&self, k: usize) -> usize {
        match k {
            1 => self.top_1,
            3 => self.top_3,
            5 => self.top_5,
            _ => self.top_10,
        }
    }

    fn record(&mut self, k: usize, bug_id: &str, hit: bool) {
        if hit {
            match k {
                1 => self.top_1 += 1,
                3 => self.top_3 += 1,
                5 => self.top_5 += 1,
                _ => self.top_10 += 1,
            }
            self.found.bucket_mut(k).push(bug_id.to_string());
        } else {
            self.missed.bucket_mut(k).push(bug_id.to_string());
        }
    }
}

/// Whether any ground-truth signature is among the first `k` signatures.
#[must_use]
pub fn is_top_k_hit(test: &MergedTest, ground_truth: &[String], k: usize) -> bool {
    test.method_signatures
        .iter()
        .take(k)
        .any(|signature| ground_truth.contains(signature))
}

/// A bug is a Top-K hit when any of its tests is.
#[must_use]
pub fn score_top_k(project: &MergedProject) -> TopKCounts {
    let mut counts = TopKCounts::default();
    for bug in &project.bugs {
        for k in TOP_K {
            let hit = bug
                .tests
                .iter()
                .any(|test| is_top_k_hit(test, &bug.ground_truth, k));
            counts.record(k, &bug.bug_id, hit);
        }
    }
    counts
}

/// First and average rank of the faulty methods.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RankMetrics {
    pub mfr: f64,
    pub mar: f64,
    pub mfr_sum: f64,
    pub mar_sum: f64,
    /// Tests with at least one ranked ground-truth method
    pub num_tests: usize,
}

/// 1-based ranks of the distinct ground-truth methods in one test.
#[must_use]
pub fn test_ranks(test: &MergedTest, ground_truth: &[String]) -> Vec<usize> {
    ground_truth
        .iter()
        .filter_map(|signature| test.rank_of(signature))
        .collect()
}

#[must_use]
pub fn score_ranks(project: &MergedProject) -> RankMetrics {
    let mut metrics = RankMetrics::default();
    for bug in &project.bugs {
        for test in &bug.tests {
            let ranks = test_ranks(test, &bug.ground_truth);
            let Some(first) = ranks.iter().min() else {
                continue;
            };
            metrics.mfr_sum += *first as f64;
            metrics.mar_sum += ranks.iter().sum::<usize>() as f64 / ranks.len() as f64;
            metrics.num_tests += 1;
        }
    }
    if metrics.num_tests > 0 {
        metrics.mfr = metrics.mfr_sum / metrics.num_tests as f64;
        metrics.mar = metrics.mar_sum / metrics.num_tests as f64;
    }
    metrics
}
