//! Draft → extract → verify → rewrite.
//!
//! The draft is expected in three labelled sections (`Кратко:`, `Подробно:`,
//! `Источники:`). Each line of the detailed section is one statement; the
//! verification pass labels every statement and only supported ones survive
//! the rewrite. Labels are matched on the trimmed, lower-cased line prefix.
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::PipelineError;
use super::prompts::{Prompts, SYSTEM_PROMPT};
use crate::llm::{ChatModel, ChatRequest, ChatTask};

pub const DETAILED_LABEL: &str = "подробно";
pub const SOURCES_LABEL: &str = "источники";

/// Returned when verification supports none of the draft's statements.
pub const FALLBACK_ANSWER: &str = "Кратко:\n\
- Контекст не подтвердил детали ответа.\n\
\n\
Подробно:\n\
Модель не нашла в материалах OKX явного подтверждения деталей вопроса. \
Лучше обратиться к статьям напрямую.\n\
\n\
Источники:\n\
- см. контекст запроса.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationVerdict {
    pub statement: String,
    #[serde(default)]
    pub label: String,
}

impl VerificationVerdict {
    pub fn is_supported(&self) -> bool {
        self.label.trim().eq_ignore_ascii_case("TRUE")
    }
}

fn starts_with_label(line: &str, label: &str) -> bool {
    line.trim().to_lowercase().starts_with(label)
}

fn strip_bullet(line: &str) -> &str {
    let line = line.trim();
    line.strip_prefix("- ")
        .or_else(|| line.strip_prefix("* "))
        .or_else(|| line.strip_prefix("• "))
        .map(str::trim_start)
        .unwrap_or(line)
}

/// Non-blank lines between the detailed label and the sources label, bullet
/// markers removed. Repeated detailed-label lines are not statements. Empty
/// when the draft has no detailed section.
pub fn extract_statements(answer: &str) -> Vec<String> {
    answer
        .lines()
        .skip_while(|line| !starts_with_label(line, DETAILED_LABEL))
        .skip(1)
        .take_while(|line| !starts_with_label(line, SOURCES_LABEL))
        .filter(|line| !starts_with_label(line, DETAILED_LABEL))
        .map(strip_bullet)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parses the verification reply. A surrounding markdown code fence is
/// tolerated; anything else that is not a JSON array of verdicts is an error.
pub fn parse_verdicts(reply: &str) -> Result<Vec<VerificationVerdict>, serde_json::Error> {
    serde_json::from_str(strip_code_fence(reply))
}

fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(body) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // drop the info string (```json)
    let body = body.split_once('\n').map_or("", |(_, rest)| rest);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Rebuilds the detailed section from the supported verdicts. Lines outside
/// the section are kept verbatim; with nothing supported the fixed fallback
/// is returned instead.
pub fn rewrite(answer: &str, verdicts: &[VerificationVerdict]) -> String {
    let supported: Vec<&str> = verdicts
        .iter()
        .filter(|v| v.is_supported())
        .map(|v| strip_bullet(&v.statement))
        .filter(|s| !s.is_empty())
        .collect();

    if supported.is_empty() {
        return FALLBACK_ANSWER.to_string();
    }

    let mut rebuilt = Vec::new();
    let mut in_detailed = false;

    for line in answer.lines() {
        if in_detailed {
            if starts_with_label(line, SOURCES_LABEL) {
                in_detailed = false;
                rebuilt.push(line.to_string());
            }
            continue;
        }

        rebuilt.push(line.to_string());
        if starts_with_label(line, DETAILED_LABEL) {
            in_detailed = true;
            rebuilt.extend(supported.iter().map(|s| format!("- {s}")));
        }
    }

    rebuilt.join("\n")
}

/// Drafts an answer over the retrieved context and self-checks it.
pub struct AnswerPipeline {
    chat: Arc<dyn ChatModel>,
    prompts: Arc<Prompts>,
    temperature: f32,
}

impl AnswerPipeline {
    pub fn new(chat: Arc<dyn ChatModel>, prompts: Arc<Prompts>, temperature: f32) -> Self {
        Self {
            chat,
            prompts,
            temperature,
        }
    }

    pub async fn draft(&self, context: &str, query: &str) -> Result<String, PipelineError> {
        let prompt = self.prompts.draft(context, query)?;
        let reply = self
            .chat
            .complete(&ChatRequest {
                task: ChatTask::Draft,
                system: SYSTEM_PROMPT,
                prompt: &prompt,
                temperature: self.temperature,
            })
            .await?;
        Ok(reply.trim().to_string())
    }

    /// `None` when the reply cannot be parsed.
    pub async fn verify(
        &self,
        statements: &[String],
        context: &str,
    ) -> Result<Option<Vec<VerificationVerdict>>, PipelineError> {
        let prompt = self.prompts.verification(statements, context)?;
        let reply = self
            .chat
            .complete(&ChatRequest {
                task: ChatTask::Verify,
                system: SYSTEM_PROMPT,
                prompt: &prompt,
                temperature: self.temperature,
            })
            .await?;

        match parse_verdicts(&reply) {
            Ok(verdicts) => Ok(Some(verdicts)),
            Err(e) => {
                warn!(error = %e, "verification reply is not a verdict list; keeping draft");
                Ok(None)
            }
        }
    }

    /// Filters `draft` down to its supported statements. Fails open: a draft
    /// without statements or an unparseable verification reply is returned
    /// unchanged.
    pub async fn self_check(&self, draft: &str, context: &str) -> Result<String, PipelineError> {
        let statements = extract_statements(draft);
        if statements.is_empty() {
            debug!("draft has no detailed section; skipping self-check");
            return Ok(draft.to_string());
        }

        let Some(verdicts) = self.verify(&statements, context).await? else {
            return Ok(draft.to_string());
        };

        let supported = verdicts.iter().filter(|v| v.is_supported()).count();
        debug!(
            statements = statements.len(),
            supported, "self-check finished"
        );
        Ok(rewrite(draft, &verdicts))
    }

    pub async fn answer(&self, context: &str, query: &str) -> Result<String, PipelineError> {
        let draft = self.draft(context, query).await?;
        self.self_check(&draft, context).await
    }
}
