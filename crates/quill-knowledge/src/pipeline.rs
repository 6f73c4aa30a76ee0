//! Retrieval-augmented generation on top of the embedding store.

use crate::documents::{FolderSource, chunk_documents};
use crate::persistence::VectorDbFile;
use crate::search::{SearchResult, join_context, rank};
use crate::store::EmbeddingStore;
use quill_core::config::RetrievalConfig;
use quill_core::error::{QuillError, Result};
use quill_core::traits::{Embedder, Generator, ProgressSink, TokenStream};
use std::path::Path;
use std::sync::Arc;

/// Fill the prompt template's `{context}` and `{question}` placeholders.
///
/// Placeholders are only recognized in the template itself; the context and
/// question are inserted verbatim.
pub fn build_prompt(template: &str, context: &str, question: &str) -> String {
    template
        .split("{context}")
        .map(|piece| piece.replace("{question}", question))
        .collect::<Vec<_>>()
        .join(context)
}

/// Load the store from `db`, or build and save it from `training_dir` when
/// no database exists yet.
pub async fn open_or_train(
    db: &VectorDbFile,
    training_dir: Option<&Path>,
    embedder: &dyn Embedder,
    retrieval: &RetrievalConfig,
    progress: &dyn ProgressSink,
) -> Result<EmbeddingStore> {
    match training_dir {
        Some(dir) if !db.exists() && dir.is_dir() => {
            let chunks = chunk_documents(&FolderSource::new(dir), retrieval.chunk_size)?;
            let mut store = EmbeddingStore::new(retrieval.duplicates);
            store.train(&chunks, embedder, progress).await?;
            db.save(&store)?;
            tracing::info!("Embedded data saved to {}", db.path().display());
            Ok(store)
        }
        _ if db.exists() => {
            let dimension = embedder.dimension().await?;
            db.load(dimension, retrieval.duplicates)
        }
        _ => Err(QuillError::NotFound(format!(
            "vector db not found: {}",
            db.path().display()
        ))),
    }
}

/// A trained store wired to an embedder and a generator.
pub struct RagSession {
    store: EmbeddingStore,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    top_k: usize,
    template: String,
}

impl RagSession {
    pub fn new(
        store: EmbeddingStore,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        retrieval: &RetrievalConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            generator,
            top_k: retrieval.top_k,
            template: retrieval.prompt_template.clone(),
        }
    }

    pub fn store(&self) -> &EmbeddingStore {
        &self.store
    }

    /// Embed the question and rank the store against it.
    pub async fn retrieve(&self, question: &str) -> Result<Vec<SearchResult<'_>>> {
        let query = self.embedder.embed(question).await?;
        let results = rank(&self.store, &query, self.top_k)?;
        tracing::debug!(
            "Retrieved {} chunks, best score {:?}",
            results.len(),
            results.first().map(|r| r.score)
        );
        Ok(results)
    }

    /// Build the prompt for `question` from the retrieved context.
    pub async fn prompt_for(&self, question: &str) -> Result<String> {
        let context = join_context(&self.retrieve(question).await?);
        Ok(build_prompt(&self.template, &context, question))
    }

    /// Answer `question` as a stream of generated fragments.
    pub async fn ask(&self, question: &str) -> Result<TokenStream> {
        let prompt = self.prompt_for(question).await?;
        tracing::debug!("Prompt ({} chars) → {}", prompt.len(), self.generator.name());
        self.generator.generate(&prompt).await
    }
}
