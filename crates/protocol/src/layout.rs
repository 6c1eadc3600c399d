use std::path::{Path, PathBuf};

/// Default dataset variant directory for the chunked conversational study.
pub const DEFAULT_VARIANT: &str = "RankedDataSplitChat";

/// On-disk layout of the study data directory.
///
/// Chunk inputs, per-chunk and final outputs, covered-method tables, ground
/// truth and reports all hang off one data root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudyLayout {
    pub data_root: PathBuf,
    pub variant: String,
    pub split: String,
}

impl StudyLayout {
    pub fn new(data_root: impl Into<PathBuf>, split: impl Into<String>) -> Self {
        Self {
            data_root: data_root.into(),
            variant: DEFAULT_VARIANT.to_string(),
            split: split.into(),
        }
    }

    /// `<data>/<variant>/<split>/<project>/<technique>`
    #[must_use]
    pub fn chunks_technique_dir(&self, project: &str, technique: &str) -> PathBuf {
        self.data_root
            .join(&self.variant)
            .join(&self.split)
            .join(project)
            .join(technique)
    }

    #[must_use]
    pub fn chunks_dir(&self, project: &str, technique: &str, bug_id: &str) -> PathBuf {
        self.chunks_technique_dir(project, technique).join(bug_id)
    }

    /// `<data>/Output/<variant>/RawOutput/<split>/<project>/<technique>/<bug>`
    #[must_use]
    pub fn raw_output_dir(&self, project: &str, technique: &str, bug_id: &str) -> PathBuf {
        self.output_root()
            .join("RawOutput")
            .join(&self.split)
            .join(project)
            .join(technique)
            .join(bug_id)
    }

    /// `<data>/Output/<variant>/<split>`
    #[must_use]
    pub fn final_split_dir(&self) -> PathBuf {
        self.output_root().join(&self.split)
    }

    /// `<data>/Output/<variant>/<split>/<project>/<technique>`
    #[must_use]
    pub fn final_technique_dir(&self, project: &str, technique: &str) -> PathBuf {
        self.final_split_dir().join(project).join(technique)
    }

    #[must_use]
    pub fn final_output_dir(&self, project: &str, technique: &str, bug_id: &str) -> PathBuf {
        self.final_technique_dir(project, technique).join(bug_id)
    }

    /// Full per-test coverage tables: `<data>/RankedData/<project>/<technique>`
    #[must_use]
    pub fn coverage_dir(&self, project: &str, technique: &str) -> PathBuf {
        self.data_root
            .join("RankedData")
            .join(project)
            .join(technique)
    }

    /// `<data>/BuggyMethods/<project>`
    #[must_use]
    pub fn ground_truth_dir(&self, project: &str) -> PathBuf {
        self.data_root.join("BuggyMethods").join(project)
    }

    /// `<data>/Results/Split`
    #[must_use]
    pub fn results_dir(&self) -> PathBuf {
        self.data_root.join("Results").join("Split")
    }

    #[must_use]
    pub fn error_log_path(&self) -> PathBuf {
        self.data_root.join("error_log.txt")
    }

    fn output_root(&self) -> PathBuf {
        self.data_root.join("Output").join(&self.variant)
    }

    #[must_use]
    pub fn data_root(&self) -> &Path {
        &self.data_root
    }
}

/// `test_<id>.json`, the name of full coverage tables and final artifacts.
#[must_use]
pub fn test_file_name(test_id: u32) -> String {
    format!("test_{test_id}.json")
}
