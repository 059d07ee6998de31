//! Index building.
//!
//! Walks a knowledge directory, extracts items, then for each item:
//! upsert document → chunk → embed → store vectors. Re-indexing a file
//! replaces its chunks and vectors.

use anyhow::{bail, Context, Result};
use chrono::{TimeZone, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use std::path::Path;
use uuid::Uuid;
use walkdir::WalkDir;

use crate::chunk::chunk_text;
use crate::config::{ChunkingConfig, Config};
use crate::db;
use crate::embedding::{create_embedder, vec_to_blob, Embedder};
use crate::migrate::apply_schema;
use crate::extract::{extract_file, SUPPORTED_EXTENSIONS};
use crate::models::{Chunk, SourceItem};

const DEFAULT_EXCLUDES: &[&str] = &["**/.git/**", "**/target/**", "**/node_modules/**"];

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IndexStats {
    pub files_scanned: u64,
    pub files_skipped: u64,
    pub documents: u64,
    pub chunks: u64,
    pub vectors: u64,
}

/// Collects items from every supported file under `root`, sorted by
/// `source_id`. Files that fail extraction are skipped with a warning.
pub fn scan_directory(root: &Path) -> Result<(Vec<SourceItem>, IndexStats)> {
    if !root.exists() {
        bail!("Knowledge directory does not exist: {}", root.display());
    }

    let include_set = build_globset(
        &SUPPORTED_EXTENSIONS
            .iter()
            .map(|ext| format!("**/*.{}", ext))
            .collect::<Vec<_>>(),
    )?;
    let exclude_set = build_globset(
        &DEFAULT_EXCLUDES
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>(),
    )?;

    let mut stats = IndexStats::default();
    let mut items = Vec::new();

    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        stats.files_scanned += 1;
        let modified_secs = std::fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|t| t.duration_since(std::time::SystemTime::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        let updated_at = Utc
            .timestamp_opt(modified_secs, 0)
            .single()
            .unwrap_or_else(Utc::now);

        match extract_file(path, &rel_str, updated_at) {
            Ok(extracted) => items.extend(extracted),
            Err(e) => {
                tracing::warn!(file = %rel_str, error = %e, "skipping file");
                stats.files_skipped += 1;
            }
        }
    }

    items.sort_by(|a, b| a.source_id.cmp(&b.source_id));
    Ok((items, stats))
}

/// `fitrag index <dir>`: indexes `root` with the configured embedder and
/// prints a summary.
pub async fn run_index(config: &Config, root: &Path) -> Result<()> {
    if !root.is_dir() {
        bail!("Not a directory: {}", root.display());
    }
    let pool = db::connect(config).await?;
    apply_schema(&pool).await?;
    let embedder = create_embedder(&config.embedding)?;

    let stats = index_directory(
        &pool,
        root,
        &config.chunking,
        embedder.as_ref(),
        config.embedding.batch_size,
    )
    .await?;
    pool.close().await;

    println!("index {}", root.display());
    println!("  files scanned: {}", stats.files_scanned);
    println!("  files skipped: {}", stats.files_skipped);
    println!("  documents: {}", stats.documents);
    println!("  chunks: {}", stats.chunks);
    println!("  vectors: {}", stats.vectors);
    Ok(())
}

/// Indexes every supported file under `root` into the database.
pub async fn index_directory(
    pool: &SqlitePool,
    root: &Path,
    chunking: &ChunkingConfig,
    embedder: &dyn Embedder,
    batch_size: usize,
) -> Result<IndexStats> {
    let (items, mut stats) = scan_directory(root)?;
    tracing::info!(root = %root.display(), items = items.len(), "indexing knowledge directory");

    for item in &items {
        if item.body.trim().is_empty() {
            tracing::debug!(source_id = %item.source_id, "skipping empty item");
            continue;
        }

        let doc_id = upsert_document(pool, item).await?;
        let chunks = chunk_text(
            &doc_id,
            &item.body,
            chunking.chunk_chars,
            chunking.overlap_chars,
        );
        replace_chunks(pool, &doc_id, &chunks).await?;
        let written = embed_chunks(pool, embedder, &chunks, batch_size)
            .await
            .with_context(|| format!("Failed to embed {}", item.source_id))?;

        stats.documents += 1;
        stats.chunks += chunks.len() as u64;
        stats.vectors += written;
    }

    tracing::info!(
        documents = stats.documents,
        chunks = stats.chunks,
        vectors = stats.vectors,
        skipped = stats.files_skipped,
        "indexing complete"
    );
    Ok(stats)
}

async fn upsert_document(pool: &SqlitePool, item: &SourceItem) -> Result<String> {
    let mut hasher = Sha256::new();
    hasher.update(item.source.as_bytes());
    hasher.update(item.source_id.as_bytes());
    hasher.update(item.body.as_bytes());
    let dedup_hash = format!("{:x}", hasher.finalize());

    let existing_id: Option<String> =
        sqlx::query_scalar("SELECT id FROM documents WHERE source = ? AND source_id = ?")
            .bind(&item.source)
            .bind(&item.source_id)
            .fetch_optional(pool)
            .await?;

    let doc_id = existing_id.unwrap_or_else(|| Uuid::new_v4().to_string());

    sqlx::query(
        r#"
        INSERT INTO documents (id, source, source_id, title, updated_at, body, metadata_json, dedup_hash)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(source, source_id) DO UPDATE SET
            title = excluded.title,
            updated_at = excluded.updated_at,
            body = excluded.body,
            metadata_json = excluded.metadata_json,
            dedup_hash = excluded.dedup_hash
        "#,
    )
    .bind(&doc_id)
    .bind(&item.source)
    .bind(&item.source_id)
    .bind(&item.title)
    .bind(item.updated_at.timestamp())
    .bind(&item.body)
    .bind(&item.metadata_json)
    .bind(&dedup_hash)
    .execute(pool)
    .await?;

    Ok(doc_id)
}

async fn replace_chunks(pool: &SqlitePool, document_id: &str, chunks: &[Chunk]) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM chunk_vectors WHERE document_id = ?")
        .bind(document_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM chunks WHERE document_id = ?")
        .bind(document_id)
        .execute(&mut *tx)
        .await?;

    for chunk in chunks {
        sqlx::query(
            "INSERT INTO chunks (id, document_id, chunk_index, text, hash) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&chunk.id)
        .bind(&chunk.document_id)
        .bind(chunk.chunk_index)
        .bind(&chunk.text)
        .bind(&chunk.hash)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

async fn embed_chunks(
    pool: &SqlitePool,
    embedder: &dyn Embedder,
    chunks: &[Chunk],
    batch_size: usize,
) -> Result<u64> {
    let mut written = 0u64;

    for batch in chunks.chunks(batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let vectors = embedder.embed(&texts).await?;
        if vectors.len() != batch.len() {
            bail!(
                "Embedder returned {} vectors for {} chunks",
                vectors.len(),
                batch.len()
            );
        }

        for (chunk, vector) in batch.iter().zip(vectors.iter()) {
            sqlx::query(
                r#"
                INSERT INTO chunk_vectors (chunk_id, document_id, model, dims, embedding)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(chunk_id) DO UPDATE SET
                    model = excluded.model,
                    dims = excluded.dims,
                    embedding = excluded.embedding
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.document_id)
            .bind(embedder.model_name())
            .bind(vector.len() as i64)
            .bind(vec_to_blob(vector))
            .execute(pool)
            .await?;
            written += 1;
        }
    }

    Ok(written)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
