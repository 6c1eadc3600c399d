use crate::error::{EvalError, Result};
use faultrank_protocol::{test_file_name, EvidenceChunk, StudyLayout, TurnArtifact};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Placeholder for ids absent from the covered-methods table.
pub const UNKNOWN_SIGNATURE: &str = "Unknown Signature";

/// Directories read while scoring one (project, technique).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectSources {
    /// Final turn artifacts, one subdirectory per bug
    pub artifacts_dir: PathBuf,
    /// Full coverage tables: `<bug>/test_<t>.json`
    pub coverage_dir: PathBuf,
    /// Ground truth: `<bug>.txt`
    pub ground_truth_dir: PathBuf,
}

impl ProjectSources {
    #[must_use]
    pub fn from_layout(layout: &StudyLayout, project: &str, technique: &str) -> Self {
        Self {
            artifacts_dir: layout.final_technique_dir(project, technique),
            coverage_dir: layout.coverage_dir(project, technique),
            ground_truth_dir: layout.ground_truth_dir(project),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergedTest {
    pub test_id: u32,
    /// Union of ranked ids across artifacts, first appearance wins
    pub method_ids: Vec<i64>,
    /// `method_ids` resolved through the coverage table
    pub method_signatures: Vec<String>,
    #[serde(skip)]
    pub covered: Option<EvidenceChunk>,
}

impl MergedTest {
    /// 1-based position of `signature` in the merged list, falling back to
    /// the coverage table's `method_id + 1`.
    #[must_use]
    pub fn rank_of(&self, signature: &str) -> Option<usize> {
        if let Some(pos) = self.method_signatures.iter().position(|s| s == signature) {
            return Some(pos + 1);
        }
        self.covered
            .as_ref()?
            .method_by_signature(signature)
            .map(|method| method.method_id as usize + 1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergedBug {
    pub bug_id: String,
    pub ground_truth: Vec<String>,
    pub tests: Vec<MergedTest>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergedProject {
    pub project: String,
    pub technique: String,
    pub bugs: Vec<MergedBug>,
}

/// Merge every turn artifact of a (project, technique) into per-test ranked
/// signature lists paired with the bug's ground truth.
pub fn merge_project(project: &str, technique: &str, sources: &ProjectSources) -> MergedProject {
    let mut order: Vec<String> = Vec::new();
    let mut merged: HashMap<String, Vec<(u32, Vec<i64>)>> = HashMap::new();

    for path in collect_artifact_files(&sources.artifacts_dir) {
        let artifact = match read_turn_artifact(&path) {
            Ok(artifact) => artifact,
            Err(err) => {
                log::warn!("Error processing file {}: {err}", path.display());
                continue;
            }
        };
        // A test is only known through its records.
        if artifact.ans.is_empty() {
            log::debug!("No ranked methods in {}", path.display());
            continue;
        }
        let tests = merged.entry(artifact.bug_id.clone()).or_insert_with(|| {
            order.push(artifact.bug_id.clone());
            Vec::new()
        });
        let index = match tests.iter().position(|(id, _)| *id == artifact.test_id) {
            Some(index) => index,
            None => {
                tests.push((artifact.test_id, Vec::new()));
                tests.len() - 1
            }
        };
        let ids = &mut tests[index].1;
        for record in &artifact.ans {
            if !ids.contains(&record.method_id) {
                ids.push(record.method_id);
            }
        }
    }

    order.sort_by(|a, b| natural_cmp(a, b));
    let bugs = order
        .into_iter()
        .map(|bug_id| {
            let mut tests = merged.remove(&bug_id).unwrap_or_default();
            tests.sort_by_key(|(test_id, _)| *test_id);
            let ground_truth = match load_ground_truth(&sources.ground_truth_dir, &bug_id) {
                Ok(signatures) => signatures,
                Err(EvalError::MissingGroundTruth(path)) => {
                    log::debug!("No ground truth for bug {bug_id} at {}", path.display());
                    Vec::new()
                }
                Err(err) => {
                    log::warn!("Error reading ground truth for bug {bug_id}: {err}");
                    Vec::new()
                }
            };
            let tests = tests
                .into_iter()
                .map(|(test_id, method_ids)| {
                    resolve_test(&sources.coverage_dir, &bug_id, test_id, method_ids)
                })
                .collect();
            MergedBug {
                bug_id,
                ground_truth,
                tests,
            }
        })
        .collect();

    MergedProject {
        project: project.to_string(),
        technique: technique.to_string(),
        bugs,
    }
}

fn resolve_test(coverage_dir: &Path, bug_id: &str, test_id: u32, method_ids: Vec<i64>) -> MergedTest {
    let covered = load_covered_methods(coverage_dir, bug_id, test_id);
    let method_signatures = method_ids
        .iter()
        .map(|id| {
            covered
                .as_ref()
                .and_then(|chunk| chunk.method_by_id(*id))
                .map_or_else(
                    || UNKNOWN_SIGNATURE.to_string(),
                    |method| method.method_signature.clone(),
                )
        })
        .collect();
    MergedTest {
        test_id,
        method_ids,
        method_signatures,
        covered,
    }
}

fn read_turn_artifact(path: &Path) -> Result<TurnArtifact> {
    let bytes = std::fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Coverage table `<coverage_dir>/<bug>/test_<t>.json`, if present and
/// readable.
#[must_use]
pub fn load_covered_methods(coverage_dir: &Path, bug_id: &str, test_id: u32) -> Option<EvidenceChunk> {
    let path = coverage_dir.join(bug_id).join(test_file_name(test_id));
    let bytes = match std::fs::read(&path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
        Err(err) => {
            log::warn!("Failed to read {}: {err}", path.display());
            return None;
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(chunk) => Some(chunk),
        Err(err) => {
            log::warn!("Failed to parse {}: {err}", path.display());
            None
        }
    }
}

/// Ground-truth signatures of a bug: one per non-empty line, duplicates
/// removed.
pub fn load_ground_truth(ground_truth_dir: &Path, bug_id: &str) -> Result<Vec<String>> {
    let path = ground_truth_dir.join(format!("{bug_id}.txt"));
    let text = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(EvalError::MissingGroundTruth(path));
        }
        Err(err) => return Err(err.into()),
    };
    let mut signatures: Vec<String> = Vec::new();
    for line in text.lines().map(str::trim).filter(|line| !line.is_empty()) {
        if !signatures.iter().any(|s| s == line) {
            signatures.push(line.to_string());
        }
    }
    Ok(signatures)
}

/// All `.json` files under `dir` in natural path order.
#[must_use]
pub fn collect_artifact_files(dir: &Path) -> Vec<PathBuf> {
    if !dir.is_dir() {
        log::debug!("No artifact directory at {}", dir.display());
        return Vec::new();
    }
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                log::warn!("Failed to read entry under {}: {err}", dir.display());
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort_by(|a, b| natural_path_cmp(a, b));
    files
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Segment {
    Text(String),
    Number(u64),
}

fn natural_key(s: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut digits = String::new();
    let mut text = String::new();
    for ch in s.chars() {
        if ch.is_ascii_digit() {
            if !text.is_empty() {
                segments.push(Segment::Text(std::mem::take(&mut text)));
            }
            digits.push(ch);
        } else {
            if !digits.is_empty() {
                segments.push(number_segment(&std::mem::take(&mut digits)));
            }
            text.push(ch);
        }
    }
    if !digits.is_empty() {
        segments.push(number_segment(&digits));
    }
    if !text.is_empty() {
        segments.push(Segment::Text(text));
    }
    segments
}

fn number_segment(digits: &str) -> Segment {
    digits
        .parse()
        .map_or_else(|_| Segment::Text(digits.to_string()), Segment::Number)
}

/// `test_2` < `test_10`; ties fall back to plain string order.
#[must_use]
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    natural_key(a).cmp(&natural_key(b)).then_with(|| a.cmp(b))
}

fn natural_path_cmp(a: &Path, b: &Path) -> Ordering {
    let parts = |p: &Path| -> Vec<String> {
        p.components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect()
    };
    let (pa, pb) = (parts(a), parts(b));
    for (x, y) in pa.iter().zip(pb.iter()) {
        match natural_cmp(x, y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    pa.len().cmp(&pb.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn natural_order_compares_numbers_by_value() {
        let mut names = vec!["test_10.json", "test_2.json", "test_1.json"];
        names.sort_by(|a, b| natural_cmp(a, b));
        assert_eq!(names, vec!["test_1.json", "test_2.json", "test_10.json"]);

        let mut bugs = vec!["12", "3", "100"];
        bugs.sort_by(|a, b| natural_cmp(a, b));
        assert_eq!(bugs, vec!["3", "12", "100"]);
    }

    #[test]
    fn paths_sort_by_directory_then_file() {
        let mut paths = vec![
            PathBuf::from("out/10/test_0.json"),
            PathBuf::from("out/2/test_1.json"),
            PathBuf::from("out/2/test_0.json"),
        ];
        paths.sort_by(|a, b| natural_path_cmp(a, b));
        assert_eq!(
            paths,
            vec![
                PathBuf::from("out/2/test_0.json"),
                PathBuf::from("out/2/test_1.json"),
                PathBuf::from("out/10/test_0.json"),
            ]
        );
    }

    #[test]
    fn rank_falls_back_to_coverage_position() {
        let test = MergedTest {
            test_id: 0,
            method_ids: vec![1],
            method_signatures: vec!["A#a()V".into()],
            covered: Some(EvidenceChunk {
                test_name: "t".into(),
                test_body: String::new(),
                stack_trace: String::new(),
                covered_methods: vec![faultrank_protocol::CoveredMethod {
                    method_signature: "Foo#bar(I)V".into(),
                    method_body: String::new(),
                    method_id: 4,
                }],
            }),
        };
        assert_eq!(test.rank_of("A#a()V"), Some(1));
        assert_eq!(test.rank_of("Foo#bar(I)V"), Some(5));
        assert_eq!(test.rank_of("Nope#x()V"), None);
    }
}
