//! Paragraph-boundary text chunker with a token budget.
//!
//! Text is split on blank lines (`\n\n`) and paragraphs are packed into
//! chunks whose token count stays within `max_tokens`. A paragraph is never
//! split; one that exceeds the budget on its own becomes a chunk by itself.

use crate::error::{Result, ScholarError};
use tiktoken_rs::CoreBPE;

/// Counts tokens the way the target model would.
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;
}

/// The `cl100k_base` BPE encoding.
pub struct Cl100kCounter {
    bpe: CoreBPE,
}

impl Cl100kCounter {
    pub fn new() -> Result<Self> {
        let bpe = tiktoken_rs::cl100k_base()
            .map_err(|e| ScholarError::Tokenizer(format!("cl100k_base unavailable: {}", e)))?;
        Ok(Self { bpe })
    }
}

impl TokenCounter for Cl100kCounter {
    fn count(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
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

/// Pack the paragraphs of `text` into chunks of at most `max_tokens`.
///
/// Every paragraph is emitted followed by `"\n\n"`, so concatenating the
/// chunks gives back the non-empty paragraphs in order.
pub fn chunk_paragraphs(text: &str, counter: &dyn TokenCounter, max_tokens: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_tokens = 0;

    for paragraph in text.split("\n\n").filter(|p| !p.is_empty()) {
        let piece = format!("{}\n\n", paragraph);
        let piece_tokens = counter.count(&piece);

        if current_tokens + piece_tokens <= max_tokens {
            current.push_str(&piece);
            current_tokens += piece_tokens;
            continue;
        }

        if !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }
        current = piece;
        current_tokens = piece_tokens;
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
