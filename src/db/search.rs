use super::documents::map_chunk_row;
use super::{Db, StoreError, models::ChunkRecord, serialize_vector};
use rusqlite::params;

/// A nearest-neighbour hit: the stored chunk plus its cosine similarity.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub record: ChunkRecord,
    pub similarity: f64,
}

fn map_search_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SearchResult> {
    let record = map_chunk_row(row)?;
    let distance: f64 = row.get(9)?;
    Ok(SearchResult {
        record,
        // cosine distance lives in [0, 2]
        similarity: 1.0 - distance,
    })
}

impl Db {
    /// Returns the `top_k` chunks closest to `query_vector`, most similar first.
    pub fn search(
        &self,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchResult>, StoreError> {
        self.check_dimensions(query_vector)?;

        let mut stmt = self.conn.prepare(
            r#"
            SELECT
                c.article_id,
                c.chunk_id,
                c.title,
                c.url,
                c.description,
                c.tag_primary,
                c.lang,
                c.chunk_order,
                c.content,
                vec_distance_cosine(v.embedding, ?) AS distance
            FROM vec_chunks v
            JOIN chunks c ON v.rowid = c.id
            ORDER BY distance ASC, c.id ASC
            LIMIT ?
            "#,
        )?;

        let rows = stmt.query_map(
            params![serialize_vector(query_vector), top_k as i64],
            map_search_row,
        )?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }
}
