//! Shared data model for the faultrank workspace.
//!
//! Everything that crosses a crate boundary or lands on disk lives here:
//! evidence chunks read from the split dataset, the conversational turns
//! exchanged with a model, and the turn artifacts persisted after each
//! chunk.

mod layout;

pub use layout::{test_file_name, StudyLayout, DEFAULT_VARIANT};

use anyhow::Result;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// One covered method inside an evidence chunk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CoveredMethod {
    pub method_signature: String,
    #[serde(default)]
    pub method_body: String,
    /// Stable within a test; the coverage tooling assigns them in
    /// suspiciousness order starting at 0.
    pub method_id: u32,
}

/// Coverage evidence for one slice of a failing test.
///
/// The same shape is used for full per-test coverage tables and for the
/// chunks split from them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EvidenceChunk {
    pub test_name: String,
    #[serde(default)]
    pub test_body: String,
    #[serde(default)]
    pub stack_trace: String,
    #[serde(default)]
    pub covered_methods: Vec<CoveredMethod>,
}

impl EvidenceChunk {
    /// Look up a covered method by its fully-qualified signature.
    #[must_use]
    pub fn method_by_signature(&self, signature: &str) -> Option<&CoveredMethod> {
        self.covered_methods
            .iter()
            .find(|method| method.method_signature == signature)
    }

    /// Look up a covered method by id.
    #[must_use]
    pub fn method_by_id(&self, method_id: i64) -> Option<&CoveredMethod> {
        self.covered_methods
            .iter()
            .find(|method| i64::from(method.method_id) == method_id)
    }
}

/// Identity of one conversational session: a single failing test of one bug.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionKey {
    pub project: String,
    pub bug_id: String,
    pub test_id: u32,
}

impl SessionKey {
    pub fn new(project: impl Into<String>, bug_id: impl Into<String>, test_id: u32) -> Self {
        Self {
            project: project.into(),
            bug_id: bug_id.into(),
            test_id,
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.project, self.bug_id, self.test_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// A single message in a session history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// One `{method_id, rank}` pair emitted by the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankRecord {
    pub method_id: i64,
    pub rank: i64,
}

/// Persisted result of one model turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnArtifact {
    pub project_name: String,
    #[serde(deserialize_with = "de_lenient_string")]
    pub bug_id: String,
    #[serde(deserialize_with = "de_lenient_u32")]
    pub test_id: u32,
    #[serde(default)]
    pub ans: Vec<RankRecord>,
    #[serde(default)]
    pub final_full_answer: String,
}

impl TurnArtifact {
    pub fn new(key: &SessionKey, ans: Vec<RankRecord>, raw: impl Into<String>) -> Self {
        Self {
            project_name: key.project.clone(),
            bug_id: key.bug_id.clone(),
            test_id: key.test_id,
            ans,
            final_full_answer: raw.into(),
        }
    }
}

/// Append-only collection of turn artifacts sharing one file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombinedArtifact {
    #[serde(default)]
    pub combined_outputs: Vec<TurnArtifact>,
}

/// Serialize with four-space indentation, the layout used by the study's
/// artifact files.
pub fn to_json_pretty<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    value.serialize(&mut serializer)?;
    Ok(out)
}

// Bug ids are strings on the command line but some exporters wrote them as
// numbers.
fn de_lenient_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}

fn de_lenient_u32<'de, D>(deserializer: D) -> std::result::Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    let parsed = match &value {
        serde_json::Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        serde_json::Value::String(s) => s.trim().parse::<u32>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| serde::de::Error::custom(format!("invalid test id {value}")))
}
