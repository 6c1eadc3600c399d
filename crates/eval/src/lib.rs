//! # Faultrank Eval
//!
//! Scores ranked turn artifacts against ground truth.
//!
//! Artifacts of every test are merged into one ranked signature list per
//! (bug, test), then scored:
//!
//! - **Top-K** (K = 1, 3, 5, 10): a bug counts when any of its tests has a
//!   ground-truth method among the first K signatures.
//! - **MFR / MAR**: mean first rank and mean average rank of the
//!   ground-truth methods, over tests where at least one could be ranked.
//!
//! The merged order is the order of first appearance across artifacts; the
//! model's numeric `rank` field is not consulted.

mod error;
mod merge;
mod report;
mod score;

pub use error::{EvalError, Result};
pub use merge::{
    collect_artifact_files, load_covered_methods, load_ground_truth, merge_project, natural_cmp,
    MergedBug, MergedProject, MergedTest, ProjectSources, UNKNOWN_SIGNATURE,
};
pub use report::{
    render_markdown, technique_totals, top_k_by_project, with_totals, write_report, MetricsRow,
    ReportFiles, TOTAL_PROJECT,
};
pub use score::{
    is_top_k_hit, score_ranks, score_top_k, test_ranks, RankMetrics, TopKBugs, TopKCounts, TOP_K,
};

/// Scores of one (project, technique).
#[derive(Debug, Clone)]
pub struct ProjectScore {
    pub merged: MergedProject,
    pub top_k: TopKCounts,
    pub ranks: RankMetrics,
}

impl ProjectScore {
    #[must_use]
    pub fn row(&self, split: &str) -> MetricsRow {
        MetricsRow::from_scores(
            &self.merged.project,
            &self.merged.technique,
            split,
            &self.top_k,
            &self.ranks,
        )
    }
}

/// Merge and score one (project, technique).
#[must_use]
pub fn evaluate_project(project: &str, technique: &str, sources: &ProjectSources) -> ProjectScore {
    let merged = merge_project(project, technique, sources);
    let top_k = score_top_k(&merged);
    let ranks = score_ranks(&merged);
    log::debug!(
        "{project}/{technique}: {} bug(s), top-1 {}, MFR {:.2}",
        merged.bugs.len(),
        top_k.top_1,
        ranks.mfr
    );
    ProjectScore {
        merged,
        top_k,
        ranks,
    }
}
