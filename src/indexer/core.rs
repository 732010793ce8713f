use crate::db::models::ChunkRecord;
use crate::db::{Db, StoreError};
use crate::embedder::{Embedder, EmbedderError};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex as TokioMutex;
use tracing::info;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error(transparent)]
    Embed(#[from] EmbedderError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct IndexReport {
    pub indexed: usize,
    pub batches: usize,
}

/// Embeds chunk records and writes them into the vector store.
pub struct Indexer<'a, E: Embedder + ?Sized> {
    pub db: Arc<TokioMutex<Db>>,
    pub embedder: &'a E,
    pub batch_size: usize,
}

impl<'a, E: Embedder + ?Sized> Indexer<'a, E> {
    pub fn new(db: Arc<TokioMutex<Db>>, embedder: &'a E, batch_size: usize) -> Self {
        Self {
            db,
            embedder,
            batch_size: batch_size.max(1),
        }
    }

    /// Upserts `records` batch by batch; each batch is one store transaction.
    pub async fn index_records(&mut self, records: &[ChunkRecord]) -> Result<IndexReport, IndexError> {
        let mut report = IndexReport::default();

        for batch in records.chunks(self.batch_size) {
            let texts: Vec<&str> = batch.iter().map(|r| r.content.as_str()).collect();
            let vectors = self.embedder.embed_batch(&texts).await?;

            // Lock only after the embedding call returns
            let written = {
                let mut db = self.db.lock().await;
                db.upsert_chunks(batch, &vectors)?
            };

            report.indexed += written;
            report.batches += 1;
            info!(
                "Indexed batch {} ({} chunks, {} total)",
                report.batches,
                written,
                report.indexed
            );
        }

        Ok(report)
    }

    /// Replaces the store contents with `records`. Every batch is embedded
    /// before the store is touched; the swap itself is one transaction, so a
    /// failed rebuild keeps the previous index.
    pub async fn rebuild(&mut self, records: &[ChunkRecord]) -> Result<IndexReport, IndexError> {
        let mut vectors = Vec::with_capacity(records.len());
        let mut batches = 0;

        for batch in records.chunks(self.batch_size) {
            let texts: Vec<&str> = batch.iter().map(|r| r.content.as_str()).collect();
            vectors.extend(self.embedder.embed_batch(&texts).await?);
            batches += 1;
            info!("Embedded batch {} ({} chunks)", batches, batch.len());
        }

        let indexed = {
            let mut db = self.db.lock().await;
            db.replace_all(records, &vectors)?
        };
        info!("Rebuilt index with {} chunks", indexed);

        Ok(IndexReport { indexed, batches })
    }
}
