//! Chat-completion seam used by the retrieval and answer pipelines.
pub mod mock;
pub mod openai;

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

pub use mock::ScriptedChatModel;
pub use openai::OpenAiChatModel;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("chat request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("chat provider returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("invalid chat response: {0}")]
    InvalidResponse(String),

    #[error("chat model misconfigured: {0}")]
    Config(String),
}

/// Which pipeline step issued a completion; used for logging and by test doubles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChatTask {
    Draft,
    Compress,
    Verify,
}

impl fmt::Display for ChatTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChatTask::Draft => "draft",
            ChatTask::Compress => "compress",
            ChatTask::Verify => "verify",
        };
        f.write_str(name)
    }
}

/// Request envelope shared by the chat model implementations.
#[derive(Debug, Clone)]
pub struct ChatRequest<'a> {
    pub task: ChatTask,
    pub system: &'a str,
    pub prompt: &'a str,
    pub temperature: f32,
}

/// Trait implemented by concrete chat-completion providers.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, request: &ChatRequest<'_>) -> Result<String, LlmError>;
}
