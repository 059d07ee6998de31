//! Vector index seam and the SQLite-backed implementation.
//!
//! [`CosineIndex`] holds every stored chunk vector in memory and answers
//! queries by brute-force cosine similarity. [`LazyIndex`] loads it once on
//! first use; concurrent first callers share a single load.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::embedding::{blob_to_vec, cosine_similarity, embed_query, Embedder};
use crate::error::RetrievalError;
use crate::models::RetrievedPassage;

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Top-`k` passages for `query`, most similar first.
    async fn similarity_search(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<RetrievedPassage>, RetrievalError>;
}

#[derive(Debug, Clone)]
pub struct IndexedChunk {
    pub text: String,
    pub metadata: serde_json::Value,
    pub vector: Vec<f32>,
}

pub struct CosineIndex {
    embedder: Arc<dyn Embedder>,
    entries: Vec<IndexedChunk>,
}

impl CosineIndex {
    pub fn new(embedder: Arc<dyn Embedder>, entries: Vec<IndexedChunk>) -> Self {
        Self { embedder, entries }
    }

    /// Loads all vectors stored for the embedder's model.
    pub async fn load(pool: &SqlitePool, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let rows = sqlx::query(
            r#"
            SELECT c.text, d.metadata_json, cv.embedding
            FROM chunk_vectors cv
            JOIN chunks c ON c.id = cv.chunk_id
            JOIN documents d ON d.id = c.document_id
            WHERE cv.model = ?
            ORDER BY d.source_id, c.chunk_index
            "#,
        )
        .bind(embedder.model_name())
        .fetch_all(pool)
        .await
        .context("Failed to load chunk vectors")?;

        let entries: Vec<IndexedChunk> = rows
            .iter()
            .map(|row| {
                let text: String = row.get("text");
                let metadata_json: String = row.get("metadata_json");
                let blob: Vec<u8> = row.get("embedding");
                IndexedChunk {
                    text,
                    metadata: serde_json::from_str(&metadata_json)
                        .unwrap_or_else(|_| serde_json::json!({})),
                    vector: blob_to_vec(&blob),
                }
            })
            .collect();

        tracing::info!(
            chunks = entries.len(),
            model = embedder.model_name(),
            "vector index loaded"
        );
        Ok(Self::new(embedder, entries))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Top-`k` entries for an already-embedded query.
    pub fn nearest(&self, query_vec: &[f32], k: usize) -> Vec<&IndexedChunk> {
        let mut scored: Vec<(f32, &IndexedChunk)> = self
            .entries
            .iter()
            .map(|e| (cosine_similarity(query_vec, &e.vector), e))
            .collect();
        // Stable sort keeps storage order among equal scores.
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.into_iter().take(k).map(|(_, e)| e).collect()
    }
}

#[async_trait]
impl VectorIndex for CosineIndex {
    async fn similarity_search(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<RetrievedPassage>, RetrievalError> {
        let query_vec = embed_query(self.embedder.as_ref(), query)
            .await
            .map_err(|e| RetrievalError::Embedding(e.to_string()))?;

        Ok(self
            .nearest(&query_vec, k)
            .into_iter()
            .map(|e| RetrievedPassage {
                text: e.text.clone(),
                source_metadata: e.metadata.clone(),
            })
            .collect())
    }
}

enum IndexSource {
    Sqlite {
        pool: SqlitePool,
        embedder: Arc<dyn Embedder>,
    },
    Preloaded,
}

/// Once-only holder for the vector index.
pub struct LazyIndex {
    cell: OnceCell<Arc<dyn VectorIndex>>,
    source: IndexSource,
}

impl LazyIndex {
    /// Index loaded from `pool` on first use.
    pub fn sqlite(pool: SqlitePool, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            cell: OnceCell::new(),
            source: IndexSource::Sqlite { pool, embedder },
        }
    }

    /// Already-initialized holder.
    pub fn ready(index: Arc<dyn VectorIndex>) -> Self {
        Self {
            cell: OnceCell::new_with(Some(index)),
            source: IndexSource::Preloaded,
        }
    }

    /// Returns the index, loading it first if needed.
    pub async fn get(&self) -> Result<Arc<dyn VectorIndex>, RetrievalError> {
        let index = self
            .cell
            .get_or_try_init(|| async {
                match &self.source {
                    IndexSource::Sqlite { pool, embedder } => {
                        let index = CosineIndex::load(pool, Arc::clone(embedder)).await?;
                        Ok(Arc::new(index) as Arc<dyn VectorIndex>)
                    }
                    IndexSource::Preloaded => Err(anyhow::anyhow!("no index source configured")),
                }
            })
            .await
            .map_err(|e| RetrievalError::Unavailable(format!("{:#}", e)))?;
        Ok(Arc::clone(index))
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.initialized()
    }
}
