use crate::embedder::tokenizer::TokenCounter;

/// Splits article text into token-bounded chunks.
///
/// Paragraphs are the non-empty trimmed lines of `text`. They are packed
/// greedily while the running count stays within `max_tokens`; a paragraph
/// that would overflow a non-empty chunk starts the next one. A single
/// paragraph longer than `max_tokens` is kept whole as its own chunk.
/// Paragraphs inside a chunk are joined with `\n`.
pub fn chunk_text(text: &str, max_tokens: usize, counter: &dyn TokenCounter) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut tokens_used = 0usize;

    for para in text.lines().map(str::trim).filter(|p| !p.is_empty()) {
        let tokens = counter.count(para);

        if tokens_used + tokens > max_tokens && !current.is_empty() {
            chunks.push(current.join("\n"));
            current.clear();
            tokens_used = 0;
        }

        current.push(para);
        tokens_used += tokens;
    }

    if !current.is_empty() {
        chunks.push(current.join("\n"));
    }

    chunks
}
