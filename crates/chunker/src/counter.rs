use crate::error::{ChunkerError, Result};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Encoding used to estimate prompt size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TokenEncoding {
    /// `cl100k_base` BPE, the encoding of the gpt-4 family
    #[default]
    Cl100k,
    /// Four bytes per token; no tokenizer tables needed
    Approximate,
}

impl TokenEncoding {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cl100k => "cl100k_base",
            Self::Approximate => "approximate",
        }
    }
}

/// Token counter with a lazily loaded BPE table.
pub struct TokenCounter {
    encoding: TokenEncoding,
    bpe: OnceLock<Option<tiktoken_rs::CoreBPE>>,
}

impl TokenCounter {
    #[must_use]
    pub fn new(encoding: TokenEncoding) -> Self {
        Self {
            encoding,
            bpe: OnceLock::new(),
        }
    }

    fn get_bpe(&self) -> Result<&tiktoken_rs::CoreBPE> {
        let cached = self.bpe.get_or_init(|| tiktoken_rs::cl100k_base().ok());
        cached
            .as_ref()
            .ok_or_else(|| ChunkerError::Tokenizer("failed to load cl100k_base".to_string()))
    }

    /// Count tokens in `text` with the configured encoding.
    pub fn count(&self, text: &str) -> Result<usize> {
        match self.encoding {
            TokenEncoding::Approximate => Ok(Self::count_approximate(text)),
            TokenEncoding::Cl100k => {
                let bpe = self.get_bpe()?;
                Ok(bpe.encode_with_special_tokens(text).len())
            }
        }
    }

    /// Count tokens, degrading to the approximation if the tokenizer is
    /// unavailable.
    pub fn count_or_approximate(&self, text: &str) -> usize {
        self.count(text).unwrap_or_else(|err| {
            log::warn!("{err}; falling back to approximate token count");
            Self::count_approximate(text)
        })
    }

    /// Fast approximation (4 bytes ≈ 1 token).
    #[must_use]
    pub fn count_approximate(text: &str) -> usize {
        text.len().div_ceil(4)
    }

    #[must_use]
    pub const fn encoding(&self) -> TokenEncoding {
        self.encoding
    }
}

impl Default for TokenCounter {
    fn default() -> Self {
        Self::new(TokenEncoding::Cl100k)
    }
}
