/// Token counting for chunk sizing and context budgets.
///
/// Production counts use the chat model's tiktoken BPE so budgets match what
/// the completion API will bill; tests plug in `WhitespaceCounter`.
use anyhow::Result;
use tiktoken_rs::{CoreBPE, cl100k_base, get_bpe_from_model};
use tracing::warn;

/// Counts tokens in a piece of text.
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;
}

/// tiktoken-backed counter.
pub struct TiktokenCounter {
    bpe: CoreBPE,
}

impl TiktokenCounter {
    /// Pick the encoding of `model`, falling back to `cl100k_base` for unknown names.
    pub fn for_model(model: &str) -> Result<Self> {
        let bpe = match get_bpe_from_model(model) {
            Ok(bpe) => bpe,
            Err(e) => {
                warn!("No tiktoken encoding for {model} ({e}), using cl100k_base");
                cl100k_base()?
            }
        };
        Ok(Self { bpe })
    }
}

impl TokenCounter for TiktokenCounter {
    fn count(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }
}

/// One token per whitespace-separated word.
#[derive(Debug, Default, Clone, Copy)]
pub struct WhitespaceCounter;

impl TokenCounter for WhitespaceCounter {
    fn count(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }
}
