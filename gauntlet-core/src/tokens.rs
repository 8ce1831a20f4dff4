//! Token estimation for responses whose engine did not report usage.

use crate::types::{Message, TokenBreakdown, TokenUsage};

/// Approximates token counts with tiktoken when the completion engine
/// omits usage figures.
pub struct TokenEstimator {
    bpe: tiktoken_rs::CoreBPE,
}

impl TokenEstimator {
    /// Create an estimator for the given model, falling back to
    /// cl100k_base for unrecognized models.
    pub fn for_model(model: &str) -> Self {
        let bpe = tiktoken_rs::get_bpe_from_model(model).unwrap_or_else(|_| {
            tiktoken_rs::cl100k_base().expect("cl100k_base should be available")
        });
        Self { bpe }
    }

    /// Count the number of tokens in a string.
    pub fn estimate(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }

    /// Estimate the token count for a set of messages, including a small
    /// per-message framing overhead.
    pub fn estimate_messages(&self, messages: &[Message]) -> usize {
        messages
            .iter()
            .map(|m| self.estimate(&m.content) + 4)
            .sum()
    }

    /// Build a prompt/completion breakdown, preferring reported usage and
    /// estimating whatever the engine left out.
    pub fn breakdown(
        &self,
        usage: Option<TokenUsage>,
        messages: &[Message],
        completion: &str,
    ) -> TokenBreakdown {
        let estimated_prompt = || self.estimate_messages(messages);
        let estimated_completion = || self.estimate(completion);
        match usage {
            Some(u) => {
                let completion_tokens = u
                    .completion_tokens
                    .unwrap_or_else(estimated_completion);
                let prompt_tokens = u.prompt_tokens.unwrap_or_else(|| {
                    u.total_tokens.saturating_sub(completion_tokens)
                });
                TokenBreakdown {
                    prompt_tokens,
                    completion_tokens,
                }
            }
            None => TokenBreakdown {
                prompt_tokens: estimated_prompt(),
                completion_tokens: estimated_completion(),
            },
        }
    }
}

impl Default for TokenEstimator {
    fn default() -> Self {
        Self::for_model("gpt-4o")
    }
}
