use crate::error::{EvalError, Result};
use crate::score::{RankMetrics, TopKCounts};
use faultrank_protocol::to_json_pretty;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Project label of per-technique summary rows.
pub const TOTAL_PROJECT: &str = "Total";

/// One line of the results table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsRow {
    #[serde(rename = "Project")]
    pub project: String,
    #[serde(rename = "Technique")]
    pub technique: String,
    #[serde(rename = "Split")]
    pub split: String,
    #[serde(rename = "Top-1")]
    pub top_1: usize,
    #[serde(rename = "Top-3")]
    pub top_3: usize,
    #[serde(rename = "Top-5")]
    pub top_5: usize,
    #[serde(rename = "Top-10")]
    pub top_10: usize,
    #[serde(rename = "MFR")]
    pub mfr: f64,
    #[serde(rename = "MAR")]
    pub mar: f64,
}

impl MetricsRow {
    pub fn from_scores(
        project: impl Into<String>,
        technique: impl Into<String>,
        split: impl Into<String>,
        top_k: &TopKCounts,
        ranks: &RankMetrics,
    ) -> Self {
        Self {
            project: project.into(),
            technique: technique.into(),
            split: split.into(),
            top_1: top_k.top_1,
            top_3: top_k.top_3,
            top_5: top_k.top_5,
            top_10: top_k.top_10,
            mfr: ranks.mfr,
            mar: ranks.mar,
        }
    }

    #[must_use]
    pub fn is_total(&self) -> bool {
        self.project == TOTAL_PROJECT
    }
}

/// Per-technique totals, techniques in lexical order: Top-K counts are
/// summed and MFR/MAR are the mean of the per-project values.
#[must_use]
pub fn technique_totals(rows: &[MetricsRow]) -> Vec<MetricsRow> {
    let mut grouped: BTreeMap<&str, Vec<&MetricsRow>> = BTreeMap::new();
    for row in rows.iter().filter(|row| !row.is_total()) {
        grouped.entry(row.technique.as_str()).or_default().push(row);
    }

    grouped
        .into_iter()
        .map(|(technique, group)| {
            let n = group.len() as f64;
            MetricsRow {
                project: TOTAL_PROJECT.to_string(),
                technique: technique.to_string(),
                split: group[0].split.clone(),
                top_1: group.iter().map(|r| r.top_1).sum(),
                top_3: group.iter().map(|r| r.top_3).sum(),
                top_5: group.iter().map(|r| r.top_5).sum(),
                top_10: group.iter().map(|r| r.top_10).sum(),
                mfr: group.iter().map(|r| r.mfr).sum::<f64>() / n,
                mar: group.iter().map(|r| r.mar).sum::<f64>() / n,
            }
        })
        .collect()
}

/// `rows` followed by their technique totals.
#[must_use]
pub fn with_totals(mut rows: Vec<MetricsRow>) -> Vec<MetricsRow> {
    let totals = technique_totals(&rows);
    rows.extend(totals);
    rows
}

pub fn render_markdown(rows: &[MetricsRow]) -> String {
    let mut md = String::new();
    md.push_str("# Fault localization results\n\n");
    if let Some(split) = rows.first().map(|row| row.split.as_str()) {
        let _ = writeln!(md, "- Split: `{split}`");
    }
    let _ = writeln!(
        md,
        "- Rows: `{}`\n",
        rows.iter().filter(|row| !row.is_total()).count()
    );

    md.push_str("| Project | Technique | Split | Top-1 | Top-3 | Top-5 | Top-10 | MFR | MAR |\n");
    md.push_str("|---|---|---|---:|---:|---:|---:|---:|---:|\n");
    for row in rows {
        let project = if row.is_total() {
            format!("**{}**", row.project)
        } else {
            row.project.clone()
        };
        let _ = writeln!(
            md,
            "| {} | {} | {} | {} | {} | {} | {} | {:.2} | {:.2} |",
            project,
            row.technique,
            row.split,
            row.top_1,
            row.top_3,
            row.top_5,
            row.top_10,
            row.mfr,
            row.mar
        );
    }
    md
}

/// Nested Top-K view keyed project → technique.
#[must_use]
pub fn top_k_by_project(
    rows: &[MetricsRow],
) -> BTreeMap<String, BTreeMap<String, BTreeMap<&'static str, usize>>> {
    let mut out: BTreeMap<String, BTreeMap<String, BTreeMap<&'static str, usize>>> =
        BTreeMap::new();
    for row in rows.iter().filter(|row| !row.is_total()) {
        let counts = BTreeMap::from([
            ("Top-1", row.top_1),
            ("Top-3", row.top_3),
            ("Top-5", row.top_5),
            ("Top-10", row.top_10),
        ]);
        out.entry(row.project.clone())
            .or_default()
            .insert(row.technique.clone(), counts);
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportFiles {
    pub markdown: PathBuf,
    pub rows_json: PathBuf,
    pub top_k_json: PathBuf,
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    to_json_pretty(value).map_err(|err| EvalError::Other(err.to_string()))
}

/// Write `results.md`, `results.json` and `topk.json` into `dir`.
pub fn write_report(dir: &Path, rows: &[MetricsRow]) -> Result<ReportFiles> {
    std::fs::create_dir_all(dir)?;
    let files = ReportFiles {
        markdown: dir.join("results.md"),
        rows_json: dir.join("results.json"),
        top_k_json: dir.join("topk.json"),
    };
    std::fs::write(&files.markdown, render_markdown(rows))?;
    std::fs::write(&files.rows_json, encode(&rows)?)?;
    std::fs::write(&files.top_k_json, encode(&top_k_by_project(rows))?)?;
    log::info!("Results saved to {}", dir.display());
    Ok(files)
}
