use crate::budget::DEFAULT_INPUT_CEILING;
use crate::error::{RankerError, Result};
use faultrank_chunker::TokenEncoding;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

pub const ENV_MODEL: &str = "FAULTRANK_MODEL";
pub const ENV_MODEL_MODE: &str = "FAULTRANK_MODEL_MODE";
pub const ENV_API_BASE: &str = "FAULTRANK_API_BASE";
pub const ENV_INPUT_CEILING: &str = "FAULTRANK_INPUT_CEILING";
pub const ENV_API_KEY: &str = "OPENAI_API_KEY";

/// Which model adapter answers prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModelMode {
    /// OpenAI-compatible streaming chat endpoint
    #[default]
    OpenAi,
    /// Deterministic offline replies
    Stub,
}

impl ModelMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Stub => "stub",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "stub" => Ok(Self::Stub),
            other => Err(RankerError::invalid_config(format!(
                "unsupported model mode: {other}"
            ))),
        }
    }
}

/// Settings for one ranking run.
///
/// Layering: defaults, then an optional TOML file, then environment, then
/// whatever the caller sets explicitly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RankerConfig {
    pub model: String,
    pub mode: ModelMode,
    pub api_base: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub temperature: f32,
    pub request_timeout_secs: u64,
    /// Hard ceiling for one rendered prompt, in tokens
    pub input_ceiling: usize,
    pub encoding: TokenEncoding,
    /// Print model output to stderr while it streams
    pub echo_stream: bool,
    /// When set, every turn artifact is also appended here
    pub combined_artifact: Option<PathBuf>,
    /// Bugs processed concurrently
    pub jobs: usize,
}

impl Default for RankerConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            mode: ModelMode::OpenAi,
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: None,
            temperature: 0.0,
            request_timeout_secs: 300,
            input_ceiling: DEFAULT_INPUT_CEILING,
            encoding: TokenEncoding::Cl100k,
            echo_stream: false,
            combined_artifact: None,
            jobs: 1,
        }
    }
}

impl RankerConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|err| RankerError::invalid_config(err.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw).map_err(|err| {
            RankerError::invalid_config(format!("{}: {err}", path.display()))
        })
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(model) = get(ENV_MODEL) {
            self.model = model;
        }
        if let Some(mode) = get(ENV_MODEL_MODE) {
            self.mode = ModelMode::parse(&mode)?;
        }
        if let Some(base) = get(ENV_API_BASE) {
            self.api_base = base;
        }
        if let Some(raw) = get(ENV_INPUT_CEILING) {
            self.input_ceiling = raw.parse().map_err(|_| {
                RankerError::invalid_config(format!("{ENV_INPUT_CEILING}={raw} is not a number"))
            })?;
        }
        if let Some(key) = get(ENV_API_KEY) {
            self.api_key = Some(key);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.input_ceiling == 0 {
            return Err(RankerError::invalid_config("input_ceiling must be > 0"));
        }
        if self.jobs == 0 {
            return Err(RankerError::invalid_config("jobs must be > 0"));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(RankerError::invalid_config(
                "temperature must be within 0.0..=2.0",
            ));
        }
        if self.mode == ModelMode::OpenAi {
            if self.model.trim().is_empty() {
                return Err(RankerError::invalid_config("model must not be empty"));
            }
            if self.api_key.is_none() {
                return Err(RankerError::invalid_config(format!(
                    "{ENV_API_KEY} is required for the openai model mode"
                )));
            }
        }
        Ok(())
    }
}
