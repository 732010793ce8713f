use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex as TokioMutex;
use tracing::{debug, info};

use super::PipelineError;
use super::prompts::{NO_OUTPUT, Prompts, SYSTEM_PROMPT};
use crate::db::Db;
use crate::db::search::SearchResult;
use crate::embedder::Embedder;
use crate::embedder::tokenizer::TokenCounter;
use crate::llm::{ChatModel, ChatRequest, ChatTask};

/// A passage selected for one query. `content` may be a compressed excerpt
/// of the stored chunk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedDocument {
    pub content: String,
    pub chunk_id: String,
    pub article_id: String,
    pub title: String,
    pub description: String,
    pub url: String,
    pub tag_primary: String,
    pub similarity: f64,
}

impl From<SearchResult> for RetrievedDocument {
    fn from(hit: SearchResult) -> Self {
        let r = hit.record;
        Self {
            content: r.content,
            chunk_id: r.chunk_id,
            article_id: r.article_id,
            title: r.title,
            description: r.description,
            url: r.url,
            tag_primary: r.tag_primary,
            similarity: hit.similarity,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetrievalSettings {
    pub top_k: usize,
    pub max_context_tokens: usize,
    pub score_threshold: Option<f64>,
    pub compression: bool,
    pub temperature: f32,
}

/// Fetch → compress → truncate.
pub struct Retriever {
    db: Arc<TokioMutex<Db>>,
    embedder: Arc<dyn Embedder>,
    chat: Arc<dyn ChatModel>,
    prompts: Arc<Prompts>,
    counter: Arc<dyn TokenCounter>,
    settings: RetrievalSettings,
}

impl Retriever {
    pub fn new(
        db: Arc<TokioMutex<Db>>,
        embedder: Arc<dyn Embedder>,
        chat: Arc<dyn ChatModel>,
        prompts: Arc<Prompts>,
        counter: Arc<dyn TokenCounter>,
        settings: RetrievalSettings,
    ) -> Self {
        Self {
            db,
            embedder,
            chat,
            prompts,
            counter,
            settings,
        }
    }

    /// Nearest `top_k` chunks in rank order, minus any below the similarity floor.
    pub async fn fetch(&self, query: &str) -> Result<Vec<RetrievedDocument>, PipelineError> {
        let query_vector = self.embedder.embed(query).await?;

        let hits = {
            let db = self.db.lock().await;
            db.search(&query_vector, self.settings.top_k)?
        };

        let candidates: Vec<RetrievedDocument> = hits
            .into_iter()
            .filter(|hit| {
                self.settings
                    .score_threshold
                    .is_none_or(|floor| hit.similarity >= floor)
            })
            .map(RetrievedDocument::from)
            .collect();

        debug!(count = candidates.len(), "fetched candidates");
        Ok(candidates)
    }

    /// Replaces each candidate's content with its query-relevant excerpt.
    /// Candidates with nothing relevant are dropped; order is kept.
    pub async fn compress(
        &self,
        candidates: Vec<RetrievedDocument>,
        query: &str,
    ) -> Result<Vec<RetrievedDocument>, PipelineError> {
        let mut kept = Vec::with_capacity(candidates.len());

        for mut doc in candidates {
            let prompt = self.prompts.compression(&doc.content, query)?;
            let reply = self
                .chat
                .complete(&ChatRequest {
                    task: ChatTask::Compress,
                    system: SYSTEM_PROMPT,
                    prompt: &prompt,
                    temperature: self.settings.temperature,
                })
                .await?;

            match extract_excerpt(&reply) {
                Some(excerpt) => {
                    doc.content = excerpt;
                    kept.push(doc);
                }
                None => debug!(chunk_id = %doc.chunk_id, "compression dropped candidate"),
            }
        }

        Ok(kept)
    }

    pub async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedDocument>, PipelineError> {
        let candidates = self.fetch(query).await?;
        let fetched = candidates.len();

        let candidates = if self.settings.compression && !candidates.is_empty() {
            self.compress(candidates, query).await?
        } else {
            candidates
        };
        let compressed = candidates.len();

        let selected = truncate(
            candidates,
            query,
            self.settings.max_context_tokens,
            self.counter.as_ref(),
        );
        info!(
            fetched,
            compressed,
            selected = selected.len(),
            "retrieval finished"
        );
        Ok(selected)
    }
}

/// `None` when the compression reply carries no relevant text.
fn extract_excerpt(reply: &str) -> Option<String> {
    let trimmed = reply.trim();
    if trimmed.is_empty() || trimmed == NO_OUTPUT {
        return None;
    }
    Some(trimmed.to_string())
}

/// Keeps the longest prefix of `candidates` whose tokens, plus the query's,
/// fit within `budget`. Stops at the first candidate that does not fit even
/// if later ones would.
pub fn truncate(
    candidates: Vec<RetrievedDocument>,
    query: &str,
    budget: usize,
    counter: &dyn TokenCounter,
) -> Vec<RetrievedDocument> {
    let mut used = counter.count(query);
    let mut allowed = Vec::new();

    for doc in candidates {
        let tokens = counter.count(&doc.content);
        if used + tokens > budget {
            break;
        }
        used += tokens;
        allowed.push(doc);
    }

    allowed
}

/// Context handed to the drafting and verification prompts.
pub fn build_context(docs: &[RetrievedDocument]) -> String {
    docs.iter()
        .map(|d| d.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::ChunkRecord;
    use crate::embedder::mock::MockEmbedder;
    use crate::embedder::tokenizer::WhitespaceCounter;
    use crate::llm::ScriptedChatModel;

    fn doc(id: &str, content: &str) -> RetrievedDocument {
        RetrievedDocument {
            content: content.to_string(),
            chunk_id: id.to_string(),
            article_id: "0".to_string(),
            title: "T".to_string(),
            description: "D".to_string(),
            url: String::new(),
            tag_primary: "risk".to_string(),
            similarity: 0.5,
        }
    }

    fn ids(docs: &[RetrievedDocument]) -> Vec<&str> {
        docs.iter().map(|d| d.chunk_id.as_str()).collect()
    }

    #[test]
    fn test_truncate_strict_prefix() {
        // query = 2 tokens; budget 7
        let docs = vec![doc("a", "one two"), doc("b", "three four five six"), doc("c", "x")];
        let kept = truncate(docs, "q q", 7, &WhitespaceCounter);
        // "b" would overflow (2+2+4 = 8); "c" fits but comes after the cut
        assert_eq!(ids(&kept), vec!["a"]);
    }

    #[test]
    fn test_truncate_budget_boundary_is_inclusive() {
        let docs = vec![doc("a", "one two"), doc("b", "three")];
        let kept = truncate(docs, "q", 4, &WhitespaceCounter);
        assert_eq!(ids(&kept), vec!["a", "b"]);
    }

    #[test]
    fn test_truncate_query_alone_over_budget() {
        let docs = vec![doc("a", "tiny")];
        assert!(truncate(docs, "a very long query indeed", 3, &WhitespaceCounter).is_empty());
    }

    #[test]
    fn test_truncate_invariants_over_many_budgets() {
        let docs: Vec<_> = (0..6)
            .map(|i| doc(&i.to_string(), &"w ".repeat(i * 2 + 1)))
            .collect();
        for budget in 0..40 {
            let kept = truncate(docs.clone(), "q", budget, &WhitespaceCounter);
            let total: usize = 1 + kept
                .iter()
                .map(|d| WhitespaceCounter.count(&d.content))
                .sum::<usize>();
            assert!(kept.is_empty() || total <= budget, "budget {budget}");
            assert_eq!(kept[..], docs[..kept.len()], "must be a prefix");
        }
    }

    #[test]
    fn test_extract_excerpt() {
        assert_eq!(extract_excerpt("  NO_OUTPUT \n"), None);
        assert_eq!(extract_excerpt("   "), None);
        assert_eq!(extract_excerpt(" Комиссия 0%. ").as_deref(), Some("Комиссия 0%."));
    }

    #[test]
    fn test_build_context() {
        let context = build_context(&[doc("a", "first"), doc("b", "second")]);
        assert_eq!(context, "first\n\nsecond");
    }

    async fn seeded_retriever(
        chat: Arc<ScriptedChatModel>,
        settings: RetrievalSettings,
    ) -> Retriever {
        let embedder = Arc::new(MockEmbedder::new(64));
        let mut db = Db::open_in_memory(64).unwrap();
        let contents = [
            "Торговый бот OKX помогает автоматизировать сделки",
            "P2P покупка USDT с банковской карты",
            "Стоп-лосс ограничивает убытки",
        ];
        let records: Vec<ChunkRecord> = contents
            .iter()
            .enumerate()
            .map(|(i, c)| ChunkRecord {
                article_id: i.to_string(),
                chunk_id: ChunkRecord::make_chunk_id(&i.to_string(), 0),
                title: format!("T{i}"),
                url: String::new(),
                description: format!("D{i}"),
                tag_primary: "general".to_string(),
                lang: "ru".to_string(),
                chunk_order: 0,
                content: c.to_string(),
            })
            .collect();
        let texts: Vec<&str> = contents.to_vec();
        let vectors = embedder.embed_batch(&texts).await.unwrap();
        db.upsert_chunks(&records, &vectors).unwrap();

        Retriever::new(
            Arc::new(TokioMutex::new(db)),
            embedder,
            chat,
            Arc::new(Prompts::new().unwrap()),
            Arc::new(WhitespaceCounter),
            settings,
        )
    }

    fn settings(compression: bool) -> RetrievalSettings {
        RetrievalSettings {
            top_k: 2,
            max_context_tokens: 100,
            score_threshold: None,
            compression,
            temperature: 0.0,
        }
    }

    #[tokio::test]
    async fn test_fetch_returns_top_k_in_rank_order() {
        let chat = Arc::new(ScriptedChatModel::new());
        let retriever = seeded_retriever(chat.clone(), settings(false)).await;

        let docs = retriever.fetch("торговый бот OKX").await.unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].chunk_id, "0_0");
        assert!(docs[0].similarity >= docs[1].similarity);

        let docs = retriever.retrieve("торговый бот OKX").await.unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(chat.calls().len(), 0, "compression disabled");
    }

    #[tokio::test]
    async fn test_score_threshold_filters() {
        let chat = Arc::new(ScriptedChatModel::new());
        let mut s = settings(false);
        s.score_threshold = Some(0.99);
        let retriever = seeded_retriever(chat, s).await;
        let docs = retriever.fetch("торговый бот OKX").await.unwrap();
        assert!(docs.is_empty());
    }

    #[tokio::test]
    async fn test_compression_rewrites_and_drops() {
        let chat = Arc::new(
            ScriptedChatModel::new()
                .with_reply(ChatTask::Compress, "Торговый бот OKX помогает")
                .with_reply(ChatTask::Compress, NO_OUTPUT),
        );
        let retriever = seeded_retriever(chat.clone(), settings(true)).await;

        let docs = retriever.retrieve("торговый бот OKX").await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].chunk_id, "0_0");
        assert_eq!(docs[0].content, "Торговый бот OKX помогает");
        assert_eq!(chat.calls_for(ChatTask::Compress), 2);
    }

    #[tokio::test]
    async fn test_provider_error_propagates() {
        // No scripted compression reply: the chat call fails
        let chat = Arc::new(ScriptedChatModel::new());
        let retriever = seeded_retriever(chat, settings(true)).await;
        let err = retriever.retrieve("торговый бот").await.unwrap_err();
        assert!(matches!(err, PipelineError::Llm(_)));
    }
}
