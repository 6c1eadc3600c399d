use crate::error::{RankerError, Result};
use faultrank_chunker::{TokenCounter, TokenEncoding};

/// Input ceiling used by the study for a 128k-context model, leaving room
/// for the reply and the retained exchange.
pub const DEFAULT_INPUT_CEILING: usize = 111_600;

/// Rejects prompts whose token estimate exceeds the ceiling.
///
/// Prompts are never truncated; an oversized one ends its test.
pub struct BudgetGuard {
    counter: TokenCounter,
    ceiling: usize,
}

impl BudgetGuard {
    #[must_use]
    pub fn new(encoding: TokenEncoding, ceiling: usize) -> Self {
        Self {
            counter: TokenCounter::new(encoding),
            ceiling,
        }
    }

    #[must_use]
    pub const fn ceiling(&self) -> usize {
        self.ceiling
    }

    #[must_use]
    pub fn estimate(&self, text: &str) -> usize {
        self.counter.count_or_approximate(text)
    }

    /// Returns the estimate when it fits.
    pub fn check(&self, text: &str) -> Result<usize> {
        let tokens = self.estimate(text);
        if tokens > self.ceiling {
            return Err(RankerError::BudgetExceeded {
                tokens,
                ceiling: self.ceiling,
            });
        }
        Ok(tokens)
    }
}

impl Default for BudgetGuard {
    fn default() -> Self {
        Self::new(TokenEncoding::Cl100k, DEFAULT_INPUT_CEILING)
    }
}
