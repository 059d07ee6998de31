//! Multi-variant retrieval with exact-text deduplication.

use std::collections::HashSet;

use crate::config::Config;
use crate::db;
use crate::embedding::create_embedder;
use crate::error::RetrievalError;
use crate::expand::QueryExpander;
use crate::index::{LazyIndex, VectorIndex};
use crate::models::RetrievedPassage;

const LOGGED_PASSAGES: usize = 5;
const PREVIEW_CHARS: usize = 300;

pub struct Retriever {
    expander: QueryExpander,
    k: usize,
}

impl Retriever {
    pub fn new(expander: QueryExpander, k: usize) -> Self {
        Self { expander, k }
    }

    /// One top-k search per expansion variant, concatenated in variant order
    /// and deduplicated by exact text (first occurrence kept).
    pub async fn retrieve(
        &self,
        index: &dyn VectorIndex,
        query: &str,
    ) -> Result<Vec<RetrievedPassage>, RetrievalError> {
        let variants = self.expander.expand(query);
        tracing::debug!(?variants, "expanded query");

        let mut all = Vec::new();
        for variant in &variants {
            all.extend(index.similarity_search(variant, self.k).await?);
        }

        let mut seen = HashSet::new();
        let unique: Vec<RetrievedPassage> = all
            .into_iter()
            .filter(|p| seen.insert(p.text.clone()))
            .collect();

        for passage in unique.iter().take(LOGGED_PASSAGES) {
            let preview: String = passage.text.chars().take(PREVIEW_CHARS).collect();
            tracing::debug!(source = passage.source_label(), preview = %preview, "retrieved");
        }

        Ok(unique)
    }
}

/// `fitrag search <query>`: prints the deduplicated passages the answer
/// pipeline would see for `query` (English, untranslated).
pub async fn run_search(config: &Config, query: &str, k: Option<usize>) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    let embedder = create_embedder(&config.embedding)?;
    let index = LazyIndex::sqlite(pool, embedder).get().await?;

    let retriever = Retriever::new(QueryExpander::new(), k.unwrap_or(config.retrieval.k));
    let passages = retriever.retrieve(index.as_ref(), query).await?;

    if passages.is_empty() {
        println!("No results.");
        return Ok(());
    }
    for (i, passage) in passages.iter().enumerate() {
        let preview: String = passage.text.chars().take(PREVIEW_CHARS).collect();
        println!("{}. [{}]", i + 1, passage.source_label());
        println!("    {}", preview.replace('\n', " "));
    }
    Ok(())
}
