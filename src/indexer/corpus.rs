//! Corpus preparation: raw articles in, chunk records out.
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::chunker::chunk_text;
use crate::db::models::ChunkRecord;
use crate::embedder::tokenizer::TokenCounter;

const FALLBACK_TAG: &str = "general";

/// One scraped article (`id,title,url,content`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub id: String,
    pub title: String,
    pub url: String,
    pub content: String,
}

/// Topical metadata attached to every chunk of an article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicInfo {
    pub description: String,
    pub tag_primary: String,
}

/// Article id → topic metadata.
pub type TopicCatalog = HashMap<String, TopicInfo>;

pub fn read_articles(path: &Path) -> Result<Vec<Article>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open raw corpus: {}", path.display()))?;
    let mut articles = Vec::new();
    for row in reader.deserialize() {
        let article: Article =
            row.with_context(|| format!("malformed article row in {}", path.display()))?;
        articles.push(article);
    }
    info!("Read {} articles from {}", articles.len(), path.display());
    Ok(articles)
}

/// Loads the topic catalog. No path, or a path that does not exist, yields
/// an empty catalog.
pub fn load_topics(path: Option<&Path>) -> Result<TopicCatalog> {
    let Some(path) = path else {
        return Ok(TopicCatalog::new());
    };
    if !path.exists() {
        warn!("Topic catalog {} not found; using article titles", path.display());
        return Ok(TopicCatalog::new());
    }
    let data = fs::read_to_string(path)
        .with_context(|| format!("failed to read topics: {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("invalid topics JSON: {}", path.display()))
}

/// Chunks every article and attaches its topic metadata.
pub fn prepare_corpus(
    articles: &[Article],
    topics: &TopicCatalog,
    lang: &str,
    max_tokens: usize,
    counter: &dyn TokenCounter,
) -> Vec<ChunkRecord> {
    let mut records = Vec::new();

    for article in articles {
        let topic = topics.get(&article.id).cloned().unwrap_or_else(|| {
            warn!("No topic entry for article {}, using its title", article.id);
            TopicInfo {
                description: article.title.clone(),
                tag_primary: FALLBACK_TAG.to_string(),
            }
        });

        let chunks = chunk_text(&article.content, max_tokens, counter);
        if chunks.is_empty() {
            warn!("Article {} has no text, skipping", article.id);
        }

        for (chunk_order, content) in chunks.into_iter().enumerate() {
            records.push(ChunkRecord {
                article_id: article.id.clone(),
                chunk_id: ChunkRecord::make_chunk_id(&article.id, chunk_order),
                title: article.title.clone(),
                url: article.url.clone(),
                description: topic.description.clone(),
                tag_primary: topic.tag_primary.clone(),
                lang: lang.to_string(),
                chunk_order,
                content,
            });
        }
    }

    records
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

pub fn write_chunks_csv(path: &Path, records: &[ChunkRecord]) -> Result<()> {
    ensure_parent(path)?;
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_chunks_json(path: &Path, records: &[ChunkRecord]) -> Result<()> {
    ensure_parent(path)?;
    let data = serde_json::to_string_pretty(records).context("failed to serialize chunks")?;
    fs::write(path, data).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

pub fn read_chunks_csv(path: &Path) -> Result<Vec<ChunkRecord>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open chunk corpus: {}", path.display()))?;
    let mut records = Vec::new();
    for row in reader.deserialize() {
        let record: ChunkRecord =
            row.with_context(|| format!("malformed chunk row in {}", path.display()))?;
        records.push(record);
    }
    Ok(records)
}
