//! Query-time pipeline: safety gate → retrieval → drafting → self-check.
//!
//! - **[`safety`]** — regex pre-filter for disallowed intents
//! - **[`retriever`]** — nearest-neighbour fetch, per-document compression, budget truncation
//! - **[`answer`]** — draft answer, statement extraction, verification, rewrite
//! - **[`assistant`]** — the user-facing entry point tying the stages together
//! - **[`prompts`]** — the three chat templates
pub mod answer;
pub mod assistant;
pub mod prompts;
pub mod retriever;
pub mod safety;

use thiserror::Error;

use crate::db::StoreError;
use crate::embedder::EmbedderError;
use crate::llm::LlmError;

/// Failures that end a query. Provider errors are not retried.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("embedding failed: {0}")]
    Embed(#[from] EmbedderError),

    #[error("vector store failed: {0}")]
    Store(#[from] StoreError),

    #[error("chat model failed: {0}")]
    Llm(#[from] LlmError),

    #[error("prompt rendering failed: {0}")]
    Prompt(#[from] minijinja::Error),

    #[error("invalid safety pattern: {0}")]
    Safety(#[from] regex::Error),
}
