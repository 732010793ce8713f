use super::{Db, StoreError, models::*, serialize_vector};
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Transaction, params};

impl Db {
    /// Inserts or replaces chunks with their embeddings, keyed by `chunk_id`.
    ///
    /// Runs in a single transaction; returns the number of rows written.
    pub fn upsert_chunks(
        &mut self,
        records: &[ChunkRecord],
        embeddings: &[Vec<f32>],
    ) -> Result<usize, StoreError> {
        self.check_batch(records, embeddings)?;

        let tx = self.conn.transaction()?;
        write_chunks(&tx, records, embeddings)?;
        tx.commit()?;
        Ok(records.len())
    }

    /// Replaces the whole store with `records`. The delete and the inserts
    /// share one transaction, so a failed write leaves the old contents.
    pub fn replace_all(
        &mut self,
        records: &[ChunkRecord],
        embeddings: &[Vec<f32>],
    ) -> Result<usize, StoreError> {
        self.check_batch(records, embeddings)?;

        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM vec_chunks", [])?;
        tx.execute("DELETE FROM chunks", [])?;
        write_chunks(&tx, records, embeddings)?;
        tx.commit()?;
        Ok(records.len())
    }

    fn check_batch(&self, records: &[ChunkRecord], embeddings: &[Vec<f32>]) -> Result<(), StoreError> {
        if records.len() != embeddings.len() {
            return Err(StoreError::LengthMismatch {
                records: records.len(),
                embeddings: embeddings.len(),
            });
        }
        for vector in embeddings {
            self.check_dimensions(vector)?;
        }
        Ok(())
    }

    pub fn count_chunks(&self) -> Result<usize, StoreError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Looks up a single chunk by its corpus identifier.
    pub fn get_chunk(&self, chunk_id: &str) -> Result<Option<ChunkRecord>, StoreError> {
        let record = self
            .conn
            .query_row(
                r#"
                SELECT article_id, chunk_id, title, url, description,
                       tag_primary, lang, chunk_order, content
                FROM chunks WHERE chunk_id = ?
                "#,
                params![chunk_id],
                map_chunk_row,
            )
            .optional()?;
        Ok(record)
    }

    /// Lists indexed articles with their chunk counts, ordered by article id.
    pub fn list_articles(&self) -> Result<Vec<ArticleSummary>, StoreError> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT article_id, MIN(title), MIN(url), COUNT(*), MAX(indexed_at)
            FROM chunks
            GROUP BY article_id
            ORDER BY article_id
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            let indexed_at: DateTime<Utc> = row.get(4)?;
            Ok(ArticleSummary {
                article_id: row.get(0)?,
                title: row.get(1)?,
                url: row.get(2)?,
                chunks: row.get::<_, i64>(3)? as usize,
                indexed_at,
            })
        })?;

        let mut articles = Vec::new();
        for row in rows {
            articles.push(row?);
        }
        Ok(articles)
    }
}

fn write_chunks(
    tx: &Transaction<'_>,
    records: &[ChunkRecord],
    embeddings: &[Vec<f32>],
) -> Result<(), StoreError> {
    let now = Utc::now();

    for (record, vector) in records.iter().zip(embeddings) {
        let row_id: i64 = tx.query_row(
            r#"
            INSERT INTO chunks (chunk_id, article_id, title, url, description,
                                tag_primary, lang, chunk_order, content, indexed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(chunk_id) DO UPDATE SET
                article_id = excluded.article_id,
                title = excluded.title,
                url = excluded.url,
                description = excluded.description,
                tag_primary = excluded.tag_primary,
                lang = excluded.lang,
                chunk_order = excluded.chunk_order,
                content = excluded.content,
                indexed_at = excluded.indexed_at
            RETURNING id
            "#,
            params![
                record.chunk_id,
                record.article_id,
                record.title,
                record.url,
                record.description,
                record.tag_primary,
                record.lang,
                record.chunk_order as i64,
                record.content,
                now,
            ],
            |row| row.get(0),
        )?;

        // vec0 has no upsert
        tx.execute("DELETE FROM vec_chunks WHERE rowid = ?", params![row_id])?;
        tx.execute(
            "INSERT INTO vec_chunks (rowid, embedding) VALUES (?, ?)",
            params![row_id, serialize_vector(vector)],
        )?;
    }
    Ok(())
}

/// Maps the nine leading chunk columns (in `ChunkRecord` field order).
pub(crate) fn map_chunk_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChunkRecord> {
    Ok(ChunkRecord {
        article_id: row.get(0)?,
        chunk_id: row.get(1)?,
        title: row.get(2)?,
        url: row.get(3)?,
        description: row.get(4)?,
        tag_primary: row.get(5)?,
        lang: row.get(6)?,
        chunk_order: row.get::<_, i64>(7)? as usize,
        content: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(article_id: &str, order: usize, content: &str) -> ChunkRecord {
        ChunkRecord {
            article_id: article_id.to_string(),
            chunk_id: ChunkRecord::make_chunk_id(article_id, order),
            title: format!("Article {article_id}"),
            url: format!("https://www.okx.com/ru/learn/{article_id}"),
            description: "desc".to_string(),
            tag_primary: "fees".to_string(),
            lang: "ru".to_string(),
            chunk_order: order,
            content: content.to_string(),
        }
    }

    fn count_vectors(db: &Db) -> i64 {
        db.conn
            .query_row("SELECT COUNT(*) FROM vec_chunks", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_chunks_crud() {
        let mut db = Db::open_in_memory(4).unwrap();

        let records = vec![record("0", 0, "Hello"), record("0", 1, "World"), record("1", 0, "P2P")];
        let embeddings = vec![vec![0.1; 4], vec![0.2; 4], vec![0.3; 4]];
        assert_eq!(db.upsert_chunks(&records, &embeddings).unwrap(), 3);
        assert_eq!(db.count_chunks().unwrap(), 3);
        assert_eq!(count_vectors(&db), 3);

        // Re-indexing the same chunk id replaces the row and its vector
        let replaced = vec![record("0", 0, "Replaced")];
        db.upsert_chunks(&replaced, &[vec![0.5; 4]]).unwrap();
        assert_eq!(db.count_chunks().unwrap(), 3);
        assert_eq!(count_vectors(&db), 3);
        let fetched = db.get_chunk("0_0").unwrap().unwrap();
        assert_eq!(fetched.content, "Replaced");

        let articles = db.list_articles().unwrap();
        assert_eq!(articles.len(), 2);
        assert_eq!(articles[0].article_id, "0");
        assert_eq!(articles[0].chunks, 2);
        assert_eq!(articles[1].chunks, 1);

        db.replace_all(&[], &[]).unwrap();
        assert_eq!(db.count_chunks().unwrap(), 0);
        assert_eq!(count_vectors(&db), 0);
        assert!(db.get_chunk("0_0").unwrap().is_none());
    }

    #[test]
    fn test_upsert_rejects_mismatches() {
        let mut db = Db::open_in_memory(4).unwrap();
        let records = vec![record("0", 0, "Hello")];

        let err = db.upsert_chunks(&records, &[]).unwrap_err();
        assert!(matches!(err, StoreError::LengthMismatch { .. }));

        let err = db.upsert_chunks(&records, &[vec![0.1; 3]]).unwrap_err();
        assert!(matches!(err, StoreError::DimensionMismatch { .. }));
        assert_eq!(db.count_chunks().unwrap(), 0);
    }

    #[test]
    fn test_replace_all_swaps_contents() {
        let mut db = Db::open_in_memory(4).unwrap();
        let old = vec![record("0", 0, "Old"), record("1", 0, "Stale")];
        db.upsert_chunks(&old, &[vec![0.1; 4], vec![0.2; 4]]).unwrap();

        let new = vec![record("0", 0, "New")];
        assert_eq!(db.replace_all(&new, &[vec![0.3; 4]]).unwrap(), 1);
        assert_eq!(db.count_chunks().unwrap(), 1);
        assert_eq!(count_vectors(&db), 1);
        assert_eq!(db.get_chunk("0_0").unwrap().unwrap().content, "New");
        assert!(db.get_chunk("1_0").unwrap().is_none());

        // Rejected input leaves the store untouched
        let err = db.replace_all(&[record("2", 0, "x")], &[vec![0.1; 3]]).unwrap_err();
        assert!(matches!(err, StoreError::DimensionMismatch { .. }));
        assert_eq!(db.get_chunk("0_0").unwrap().unwrap().content, "New");
    }
}
