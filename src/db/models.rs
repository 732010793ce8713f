use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One retrieval unit of the corpus, as persisted between pipeline stages
/// and stored next to its embedding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub article_id: String,
    /// `{article_id}_{chunk_order}`
    pub chunk_id: String,
    pub title: String,
    pub url: String,
    pub description: String,
    pub tag_primary: String,
    pub lang: String,
    pub chunk_order: usize,
    pub content: String,
}

impl ChunkRecord {
    #[must_use]
    pub fn make_chunk_id(article_id: &str, chunk_order: usize) -> String {
        format!("{article_id}_{chunk_order}")
    }
}

/// Per-article rollup of what is currently indexed.
#[derive(Debug, Clone, Serialize)]
pub struct ArticleSummary {
    pub article_id: String,
    pub title: String,
    pub url: String,
    pub chunks: usize,
    pub indexed_at: DateTime<Utc>,
}
