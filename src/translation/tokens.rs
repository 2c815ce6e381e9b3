/*!
 * Token accounting for batch sizing.
 *
 * A batch request has to fit the model's context together with the answer it
 * provokes, so each prompt line is charged for its own tokens plus an expected
 * share of output tokens.
 */

use std::fmt;

use once_cell::sync::Lazy;
use tiktoken_rs::tokenizer::{Tokenizer, get_tokenizer};
use tiktoken_rs::{CoreBPE, cl100k_base, o200k_base};

/// Default request budget in tokens, prompt and expected answer together
pub const DEFAULT_MAX_REQUEST_TOKENS: usize = 16_000;

/// Default ratio of answer tokens to prompt line tokens
pub const DEFAULT_OUTPUT_FACTOR: f64 = 1.2;

static O200K: Lazy<Option<CoreBPE>> = Lazy::new(|| o200k_base().ok());
static CL100K: Lazy<Option<CoreBPE>> = Lazy::new(|| cl100k_base().ok());

/// Counts tokens the way the target model does
#[derive(Clone, Copy)]
pub enum TokenCounter {
    Bpe(&'static CoreBPE),
    /// Four bytes per token, used when no encoding can be loaded
    Estimate,
}

impl fmt::Debug for TokenCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bpe(_) => f.write_str("TokenCounter::Bpe"),
            Self::Estimate => f.write_str("TokenCounter::Estimate"),
        }
    }
}

impl TokenCounter {
    /// Encoding used by `model`; unknown models fall back to cl100k
    pub fn for_model(model: &str) -> Self {
        let bpe = match get_tokenizer(model) {
            Some(Tokenizer::O200kBase) => Lazy::force(&O200K).as_ref(),
            _ => Lazy::force(&CL100K).as_ref(),
        };
        match bpe {
            Some(bpe) => Self::Bpe(bpe),
            None => {
                log::warn!("No token encoding available for {}, estimating from length", model);
                Self::Estimate
            }
        }
    }

    pub fn count(&self, text: &str) -> usize {
        match self {
            Self::Bpe(bpe) => bpe.encode_with_special_tokens(text).len(),
            Self::Estimate => text.len().div_ceil(4),
        }
    }
}

/// Token limit a single batch request must stay under
#[derive(Debug, Clone, Copy)]
pub struct TokenBudget {
    pub max_tokens: usize,
    pub output_factor: f64,

    /// Tokens taken by the system prompt in every request
    pub prompt_tokens: usize,

    counter: TokenCounter,
}

impl TokenBudget {
    pub fn new(max_tokens: usize, output_factor: f64, counter: TokenCounter) -> Self {
        Self {
            max_tokens,
            output_factor: output_factor.max(0.0),
            prompt_tokens: 0,
            counter,
        }
    }

    /// Charge `system_prompt` to every request
    pub fn with_system_prompt(mut self, system_prompt: &str) -> Self {
        self.prompt_tokens = self.counter.count(system_prompt);
        self
    }

    /// Tokens of one prompt line plus its expected translation
    pub fn line_cost(&self, line: &str) -> usize {
        let input = self.counter.count(line) + self.counter.count("\n");
        input + (input as f64 * self.output_factor) as usize
    }
}
