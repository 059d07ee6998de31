//! Knowledge directory → SQLite → vector index → retrieval, with a
//! deterministic keyword-count embedder standing in for a real model.

use async_trait::async_trait;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

use fitness_rag::config::{parse_config, Config};
use fitness_rag::db;
use fitness_rag::embedding::Embedder;
use fitness_rag::expand::QueryExpander;
use fitness_rag::index::{CosineIndex, LazyIndex, VectorIndex};
use fitness_rag::ingest::index_directory;
use fitness_rag::migrate::apply_schema;
use fitness_rag::retriever::Retriever;

const VOCAB: &[&str] = &["yoga", "breath", "padel", "racket", "majlis", "coffee"];

struct KeywordEmbedder;

#[async_trait]
impl Embedder for KeywordEmbedder {
    fn model_name(&self) -> &str {
        "keyword-test"
    }
    fn dims(&self) -> usize {
        VOCAB.len() + 1
    }
    async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                let lower = t.to_lowercase();
                let mut v: Vec<f32> = VOCAB
                    .iter()
                    .map(|w| lower.matches(w).count() as f32)
                    .collect();
                // Keeps every vector non-zero.
                v.push(0.01);
                v
            })
            .collect())
    }
}

fn test_config(tmp: &TempDir) -> Config {
    parse_config(&format!(
        r#"
[db]
path = "{}/data/fitrag.sqlite"

[chunking]
chunk_chars = 200
overlap_chars = 20
"#,
        tmp.path().display()
    ))
    .unwrap()
}

fn write_knowledge(root: &Path) {
    fs::create_dir_all(root.join("sports")).unwrap();
    fs::write(
        root.join("yoga.md"),
        "# Yoga\n\nYoga links breath and movement. Slow yoga breathing calms the nervous system.",
    )
    .unwrap();
    fs::write(
        root.join("sports/padel.txt"),
        "Padel is a racket sport played in doubles on an enclosed court. The padel racket is solid.",
    )
    .unwrap();
    fs::write(
        root.join("culture.json"),
        r#"[{"cultural_id": 7, "cultural_element_name": "Majlis", "region": "Gulf",
             "description": "A sitting room where guests are served coffee",
             "examples": ["Arabic coffee", "dates"]}]"#,
    )
    .unwrap();
    fs::write(root.join("notes.csv"), "ignored,file").unwrap();
}

#[tokio::test]
async fn test_index_then_retrieve() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp);
    let knowledge = tmp.path().join("knowledge");
    write_knowledge(&knowledge);

    let pool = db::connect(&cfg).await.unwrap();
    apply_schema(&pool).await.unwrap();

    let stats = index_directory(&pool, &knowledge, &cfg.chunking, &KeywordEmbedder, 8)
        .await
        .unwrap();
    assert_eq!(stats.documents, 3);
    assert_eq!(stats.files_scanned, 3);
    assert_eq!(stats.files_skipped, 0);
    assert_eq!(stats.chunks, stats.vectors);

    let index = CosineIndex::load(&pool, Arc::new(KeywordEmbedder))
        .await
        .unwrap();
    assert_eq!(index.len() as u64, stats.vectors);

    let hits = index.similarity_search("padel racket", 1).await.unwrap();
    assert!(hits[0].text.contains("Padel is a racket sport"));

    let hits = index.similarity_search("majlis coffee", 1).await.unwrap();
    assert!(hits[0]
        .text
        .starts_with("Cultural Element: Majlis. Region: Gulf."));
    assert_eq!(hits[0].source_metadata["cultural_element_name"], "Majlis");

    let retriever = Retriever::new(QueryExpander::new(), 2);
    let passages = retriever.retrieve(&index, "yoga breath").await.unwrap();
    assert!(passages[0].text.contains("Yoga links breath"));
    let mut texts: Vec<&str> = passages.iter().map(|p| p.text.as_str()).collect();
    let before = texts.len();
    texts.dedup();
    assert_eq!(texts.len(), before);
}

#[tokio::test]
async fn test_reindex_replaces_chunks() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp);
    let knowledge = tmp.path().join("knowledge");
    write_knowledge(&knowledge);

    let pool = db::connect(&cfg).await.unwrap();
    apply_schema(&pool).await.unwrap();
    index_directory(&pool, &knowledge, &cfg.chunking, &KeywordEmbedder, 8)
        .await
        .unwrap();

    fs::write(knowledge.join("yoga.md"), "Yoga, rewritten.").unwrap();
    index_directory(&pool, &knowledge, &cfg.chunking, &KeywordEmbedder, 8)
        .await
        .unwrap();

    let documents: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(documents, 3);

    let index = CosineIndex::load(&pool, Arc::new(KeywordEmbedder))
        .await
        .unwrap();
    let hits = index.similarity_search("yoga", 1).await.unwrap();
    assert_eq!(hits[0].text, "Yoga, rewritten.");
}

#[tokio::test]
async fn test_lazy_index_reports_empty_store_as_empty_results() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp);
    let pool = db::connect(&cfg).await.unwrap();
    apply_schema(&pool).await.unwrap();

    let lazy = LazyIndex::sqlite(pool, Arc::new(KeywordEmbedder));
    assert!(!lazy.is_loaded());
    let index = lazy.get().await.unwrap();
    assert!(lazy.is_loaded());
    assert!(index.similarity_search("yoga", 8).await.unwrap().is_empty());
}
