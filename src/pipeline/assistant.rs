use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex as TokioMutex;
use tracing::info;

use super::PipelineError;
use super::answer::AnswerPipeline;
use super::prompts::Prompts;
use super::retriever::{RetrievalSettings, RetrievedDocument, Retriever, build_context};
use super::safety::{REFUSAL_MESSAGE, SafetyGate};
use crate::config::Config;
use crate::db::Db;
use crate::embedder::Embedder;
use crate::embedder::tokenizer::TokenCounter;
use crate::llm::ChatModel;

pub const EMPTY_QUERY_MESSAGE: &str = "Введите, пожалуйста, вопрос.";

pub const NO_CONTEXT_MESSAGE: &str = "Я не нашёл релевантной информации в материалах OKX, \
которые у меня есть. Не могу ответить без домыслов.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyKind {
    Answered,
    Blocked,
    EmptyQuery,
    NoContext,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssistantReply {
    pub question: String,
    pub answer: String,
    /// `- {title} — {description}` lines, deduplicated.
    pub sources: Vec<String>,
    pub kind: ReplyKind,
}

impl AssistantReply {
    fn message(question: &str, answer: &str, kind: ReplyKind) -> Self {
        Self {
            question: question.to_string(),
            answer: answer.to_string(),
            sources: Vec::new(),
            kind,
        }
    }

    pub fn to_markdown(&self) -> String {
        match self.kind {
            ReplyKind::EmptyQuery | ReplyKind::Blocked => self.answer.clone(),
            ReplyKind::NoContext => {
                format!("**Вопрос:** {}\n\n**Ответ:**\n{}", self.question, self.answer)
            }
            ReplyKind::Answered if self.sources.is_empty() => {
                format!("**Вопрос:** {}\n\n{}", self.question, self.answer)
            }
            ReplyKind::Answered => format!(
                "**Вопрос:** {}\n\n{}\n\n---\n**Источники (по данным RAG):**\n{}",
                self.question,
                self.answer,
                self.sources.join("\n")
            ),
        }
    }
}

/// Source lines for the documents used, one per distinct `(title, description)`,
/// in first-seen order.
pub fn format_sources(docs: &[RetrievedDocument]) -> Vec<String> {
    let mut seen = HashSet::new();
    docs.iter()
        .filter(|d| seen.insert((d.title.as_str(), d.description.as_str())))
        .map(|d| format!("- {} — {}", d.title, d.description))
        .collect()
}

/// User-facing query interface.
pub struct Assistant {
    gate: SafetyGate,
    retriever: Retriever,
    answerer: AnswerPipeline,
}

impl Assistant {
    pub fn new(gate: SafetyGate, retriever: Retriever, answerer: AnswerPipeline) -> Self {
        Self {
            gate,
            retriever,
            answerer,
        }
    }

    /// Wires the pipeline from shared service handles using `config`'s
    /// retrieval settings.
    pub fn from_services(
        config: &Config,
        db: Arc<TokioMutex<Db>>,
        embedder: Arc<dyn Embedder>,
        chat: Arc<dyn ChatModel>,
        counter: Arc<dyn TokenCounter>,
    ) -> Result<Self, PipelineError> {
        let prompts = Arc::new(Prompts::new()?);
        let settings = RetrievalSettings {
            top_k: config.search_top_k,
            max_context_tokens: config.max_context_tokens,
            score_threshold: config.score_threshold,
            compression: config.compression,
            temperature: config.openai.temperature,
        };
        let retriever = Retriever::new(
            db,
            embedder,
            chat.clone(),
            prompts.clone(),
            counter,
            settings,
        );
        let answerer = AnswerPipeline::new(chat, prompts, config.openai.temperature);

        Ok(Self::new(SafetyGate::new()?, retriever, answerer))
    }

    pub async fn answer(&self, query: &str) -> Result<AssistantReply, PipelineError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(AssistantReply::message(query, EMPTY_QUERY_MESSAGE, ReplyKind::EmptyQuery));
        }

        if self.gate.is_blocked(query) {
            info!("query blocked by safety gate");
            return Ok(AssistantReply::message(query, REFUSAL_MESSAGE, ReplyKind::Blocked));
        }

        let docs = self.retriever.retrieve(query).await?;
        if docs.is_empty() {
            info!("no relevant documents");
            return Ok(AssistantReply::message(query, NO_CONTEXT_MESSAGE, ReplyKind::NoContext));
        }

        let context = build_context(&docs);
        let answer = self.answerer.answer(&context, query).await?;

        Ok(AssistantReply {
            question: query.to_string(),
            answer,
            sources: format_sources(&docs),
            kind: ReplyKind::Answered,
        })
    }
}
