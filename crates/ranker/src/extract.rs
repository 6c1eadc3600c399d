//! Tolerant extraction of `{method_id, rank}` records from free-form model
//! text.
//!
//! Only ```` ```json ```` fenced blocks whose body is an object or an array
//! are considered. Each block is parsed as-is first; when that fails the
//! normalization passes are applied cumulatively, in order, until one parse
//! succeeds. A block that never parses becomes [`BlockOutcome::Rejected`].

use faultrank_protocol::RankRecord;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static BLOCK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"```json\n(\{[\s\S]*?\})\n```|```json\n(\[[\s\S]*?\])\n```")
        .expect("valid json block regex")
});
static DOUBLED_OPEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\{\n\s*\{").expect("valid regex"));
static DOUBLED_CLOSE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\}\n\s*\}$").expect("valid regex"));
static BARE_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([\{\s,])(\w+)(:)").expect("valid regex"));

/// A named text rewrite applied to a block before parsing.
#[derive(Clone, Copy)]
pub struct NormalizationPass {
    pub name: &'static str,
    pub apply: fn(&str) -> String,
}

impl std::fmt::Debug for NormalizationPass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name)
    }
}

pub const NORMALIZATION_PASSES: [NormalizationPass; 2] = [
    NormalizationPass {
        name: "collapse_doubled_braces",
        apply: collapse_doubled_braces,
    },
    NormalizationPass {
        name: "quote_bare_keys",
        apply: quote_bare_keys,
    },
];

/// `{\n  {` → `{` at the start, `}\n  }` → `}` at the end.
#[must_use]
pub fn collapse_doubled_braces(block: &str) -> String {
    let opened = DOUBLED_OPEN_RE.replace(block, "{");
    DOUBLED_CLOSE_RE.replace(&opened, "}").into_owned()
}

/// `{method_id: 3}` → `{"method_id": 3}`
#[must_use]
pub fn quote_bare_keys(block: &str) -> String {
    BARE_KEY_RE
        .replace_all(block, "${1}\"${2}\"${3}")
        .into_owned()
}

/// What happened to one fenced block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockOutcome {
    Parsed {
        records: usize,
        /// Elements missing an integer `method_id` or `rank`
        dropped: usize,
        /// Names of the passes that were needed
        repairs: Vec<&'static str>,
    },
    Rejected {
        reason: String,
    },
}

/// Records of one reply plus a per-block account.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    pub records: Vec<RankRecord>,
    pub outcomes: Vec<BlockOutcome>,
}

impl Extraction {
    #[must_use]
    pub fn rejected(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| matches!(outcome, BlockOutcome::Rejected { .. }))
            .count()
    }

    #[must_use]
    pub fn dropped(&self) -> usize {
        self.outcomes
            .iter()
            .map(|outcome| match outcome {
                BlockOutcome::Parsed { dropped, .. } => *dropped,
                BlockOutcome::Rejected { .. } => 0,
            })
            .sum()
    }
}

/// Extract every rank record from `text`, in order of appearance.
#[must_use]
pub fn extract_answer(text: &str) -> Extraction {
    let text = text.replace("\r\n", "\n");
    let mut extraction = Extraction::default();

    for caps in BLOCK_RE.captures_iter(&text) {
        let Some(body) = caps.get(1).or_else(|| caps.get(2)) else {
            continue;
        };
        let outcome = match parse_block(body.as_str().trim()) {
            Ok((value, repairs)) => {
                let (records, dropped) = collect_records(value);
                let count = records.len();
                extraction.records.extend(records);
                BlockOutcome::Parsed {
                    records: count,
                    dropped,
                    repairs,
                }
            }
            Err(reason) => {
                log::warn!("Rejected JSON block: {reason}");
                BlockOutcome::Rejected { reason }
            }
        };
        extraction.outcomes.push(outcome);
    }
    extraction
}

fn parse_block(block: &str) -> std::result::Result<(Value, Vec<&'static str>), String> {
    let first_error = match serde_json::from_str::<Value>(block) {
        Ok(value) => return Ok((value, Vec::new())),
        Err(err) => err.to_string(),
    };

    let mut current = block.to_string();
    let mut repairs = Vec::new();
    for pass in &NORMALIZATION_PASSES {
        let next = (pass.apply)(&current);
        if next == current {
            continue;
        }
        current = next;
        repairs.push(pass.name);
        if let Ok(value) = serde_json::from_str::<Value>(&current) {
            return Ok((value, repairs));
        }
    }
    Err(first_error)
}

fn collect_records(value: Value) -> (Vec<RankRecord>, usize) {
    let elements = match value {
        Value::Array(items) => items,
        other => vec![other],
    };
    let mut records = Vec::with_capacity(elements.len());
    let mut dropped = 0;
    for element in elements {
        match record_from_value(&element) {
            Some(record) => records.push(record),
            None => {
                log::warn!("Dropping rank entry without integer method_id/rank: {element}");
                dropped += 1;
            }
        }
    }
    (records, dropped)
}

fn record_from_value(value: &Value) -> Option<RankRecord> {
    let object = value.as_object()?;
    Some(RankRecord {
        method_id: integer_field(object.get("method_id")?)?,
        rank: integer_field(object.get("rank")?)?,
    })
}

fn integer_field(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
