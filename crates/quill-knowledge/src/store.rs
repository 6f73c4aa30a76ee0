//! In-memory embedding store.
//!
//! Entries are kept in insertion order with a side index from chunk text to
//! position. The store is filled once (by [`EmbeddingStore::train`] or
//! [`EmbeddingStore::from_records`]) and only read afterwards.

use quill_core::config::DuplicatePolicy;
use quill_core::error::{QuillError, Result};
use quill_core::traits::{Embedder, ProgressSink};
use std::collections::HashMap;

/// One chunk and its embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredChunk {
    pub text: String,
    pub vector: Vec<f32>,
}

/// Flattened on-disk shape: `texts[k]` owns `vectors[k*E..(k+1)*E]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersistedRecord {
    pub texts: Vec<String>,
    pub vectors: Vec<f32>,
}

impl PersistedRecord {
    /// Number of vector blocks of `embedding_size` scalars, validated against
    /// the number of texts.
    pub fn block_count(&self, embedding_size: usize) -> Result<usize> {
        if embedding_size == 0 {
            return Err(QuillError::DataMismatch(
                "embedding size must be positive".into(),
            ));
        }
        if self.vectors.len() % embedding_size != 0 {
            return Err(QuillError::DataMismatch(format!(
                "{} scalars is not a multiple of embedding size {}",
                self.vectors.len(),
                embedding_size
            )));
        }
        let blocks = self.vectors.len() / embedding_size;
        if blocks != self.texts.len() {
            return Err(QuillError::DataMismatch(format!(
                "{} vectors for {} texts",
                blocks,
                self.texts.len()
            )));
        }
        Ok(blocks)
    }
}

/// Insertion-ordered mapping from chunk text to embedding.
#[derive(Debug, Clone, Default)]
pub struct EmbeddingStore {
    entries: Vec<StoredChunk>,
    /// Text → position of its first entry.
    index: HashMap<String, usize>,
    dimension: Option<usize>,
    policy: DuplicatePolicy,
}

impl EmbeddingStore {
    /// Create an empty store; the dimension is fixed by the first insert.
    pub fn new(policy: DuplicatePolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// Create an empty store that only accepts vectors of `dimension`.
    pub fn with_dimension(dimension: usize, policy: DuplicatePolicy) -> Self {
        Self {
            dimension: Some(dimension),
            policy,
            ..Self::default()
        }
    }

    /// Rebuild a store from its persisted shape.
    pub fn from_records(
        record: PersistedRecord,
        embedding_size: usize,
        policy: DuplicatePolicy,
    ) -> Result<Self> {
        record.block_count(embedding_size)?;

        let mut store = Self::with_dimension(embedding_size, policy);
        for (text, vector) in record
            .texts
            .into_iter()
            .zip(record.vectors.chunks_exact(embedding_size))
        {
            store.insert(text, vector.to_vec())?;
        }
        Ok(store)
    }

    /// Flatten into the persisted shape, preserving iteration order.
    pub fn to_records(&self) -> PersistedRecord {
        let mut record = PersistedRecord {
            texts: Vec::with_capacity(self.entries.len()),
            vectors: Vec::with_capacity(self.entries.len() * self.dimension.unwrap_or(0)),
        };
        for entry in &self.entries {
            record.texts.push(entry.text.clone());
            record.vectors.extend_from_slice(&entry.vector);
        }
        record
    }

    /// Insert one chunk under the store's duplicate policy.
    pub fn insert(&mut self, text: String, vector: Vec<f32>) -> Result<()> {
        match self.dimension {
            Some(expected) if vector.len() != expected => {
                return Err(QuillError::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
            Some(_) => {}
            None if vector.is_empty() => {
                return Err(QuillError::DataMismatch(
                    "embedding vector is empty".into(),
                ));
            }
            None => self.dimension = Some(vector.len()),
        }

        if let Some(&position) = self.index.get(&text) {
            if self.policy == DuplicatePolicy::Collapse {
                self.entries[position].vector = vector;
                return Ok(());
            }
        } else {
            self.index.insert(text.clone(), self.entries.len());
        }
        self.entries.push(StoredChunk { text, vector });
        Ok(())
    }

    /// Embed every chunk in order and insert it.
    ///
    /// Embedding calls are awaited one at a time and `progress` is told
    /// `(current, total)` after each. On any error the store is left exactly
    /// as it was before the call.
    pub async fn train(
        &mut self,
        chunks: &[String],
        embedder: &dyn Embedder,
        progress: &dyn ProgressSink,
    ) -> Result<()> {
        let total = chunks.len();
        let mut staged = self.clone();
        for (i, text) in chunks.iter().enumerate() {
            let vector = embedder.embed(text).await?;
            staged.insert(text.clone(), vector)?;
            progress.report(i + 1, total);
        }

        tracing::info!(
            "Trained {} chunks with {} ({} entries, dim={:?})",
            total,
            embedder.name(),
            staged.len(),
            staged.dimension
        );
        *self = staged;
        Ok(())
    }

    /// Vector stored for `text` (its first entry under [`DuplicatePolicy::Keep`]).
    pub fn get(&self, text: &str) -> Option<&[f32]> {
        self.index
            .get(text)
            .map(|&position| self.entries[position].vector.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = &StoredChunk> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Length shared by every stored vector, once known.
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    pub fn policy(&self) -> DuplicatePolicy {
        self.policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use quill_core::traits::NoProgress;
    use std::sync::Mutex;

    /// Embeds a text as `[len, first byte, call number]`.
    struct Counting {
        calls: Mutex<usize>,
        fail_on: Option<usize>,
    }

    impl Counting {
        fn new() -> Self {
            Self { calls: Mutex::new(0), fail_on: None }
        }

        fn failing_on(call: usize) -> Self {
            Self { calls: Mutex::new(0), fail_on: Some(call) }
        }
    }

    #[async_trait]
    impl Embedder for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            if self.fail_on == Some(*calls) {
                return Err(QuillError::Embedding("model crashed".into()));
            }
            let first = text.bytes().next().unwrap_or(0);
            Ok(vec![text.len() as f32, first as f32, *calls as f32])
        }
    }

    fn chunks(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|t| t.to_string()).collect()
    }

    #[tokio::test]
    async fn test_train_inserts_in_order() {
        let mut store = EmbeddingStore::new(DuplicatePolicy::Collapse);
        store
            .train(&chunks(&["abc", "de", "f"]), &Counting::new(), &NoProgress)
            .await
            .unwrap();

        let texts: Vec<&str> = store.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["abc", "de", "f"]);
        assert_eq!(store.dimension(), Some(3));
        assert_eq!(store.get("de"), Some(&[2.0, b'd' as f32, 2.0][..]));
    }

    #[tokio::test]
    async fn test_train_reports_progress() {
        let seen = Mutex::new(Vec::new());
        let sink = |current: usize, total: usize| seen.lock().unwrap().push((current, total));
        let mut store = EmbeddingStore::new(DuplicatePolicy::Collapse);
        store
            .train(&chunks(&["a", "b", "c"]), &Counting::new(), &sink)
            .await
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![(1, 3), (2, 3), (3, 3)]);
    }

    #[tokio::test]
    async fn test_collapse_keeps_first_position_last_vector() {
        let mut store = EmbeddingStore::new(DuplicatePolicy::Collapse);
        store
            .train(&chunks(&["same", "other", "same"]), &Counting::new(), &NoProgress)
            .await
            .unwrap();

        assert_eq!(store.len(), 2);
        let first = store.iter().next().unwrap();
        assert_eq!(first.text, "same");
        // Third embedding call wins.
        assert_eq!(first.vector[2], 3.0);
    }

    #[tokio::test]
    async fn test_keep_policy_retains_duplicates() {
        let mut store = EmbeddingStore::new(DuplicatePolicy::Keep);
        store
            .train(&chunks(&["same", "other", "same"]), &Counting::new(), &NoProgress)
            .await
            .unwrap();

        assert_eq!(store.len(), 3);
        assert_eq!(store.get("same").unwrap()[2], 1.0);
    }

    #[tokio::test]
    async fn test_failed_train_leaves_store_untouched() {
        let mut store = EmbeddingStore::new(DuplicatePolicy::Collapse);
        store.insert("existing".into(), vec![9.0, 9.0, 9.0]).unwrap();

        let err = store
            .train(&chunks(&["a", "b", "c"]), &Counting::failing_on(2), &NoProgress)
            .await
            .unwrap_err();

        assert!(matches!(err, QuillError::Embedding(_)));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("a"), None);
    }

    #[test]
    fn test_insert_rejects_other_dimension() {
        let mut store = EmbeddingStore::with_dimension(2, DuplicatePolicy::Collapse);
        let err = store.insert("x".into(), vec![1.0, 2.0, 3.0]).unwrap_err();
        assert!(matches!(
            err,
            QuillError::DimensionMismatch { expected: 2, actual: 3 }
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_insert_rejects_empty_first_vector() {
        let mut store = EmbeddingStore::new(DuplicatePolicy::Collapse);
        assert!(matches!(
            store.insert("x".into(), vec![]),
            Err(QuillError::DataMismatch(_))
        ));
    }

    #[test]
    fn test_from_records_slices_blocks() {
        let record = PersistedRecord {
            texts: vec!["cat".into(), "dog".into()],
            vectors: vec![1.0, 0.0, 0.0, 1.0],
        };
        let store = EmbeddingStore::from_records(record.clone(), 2, DuplicatePolicy::Collapse).unwrap();
        assert_eq!(store.get("cat"), Some(&[1.0, 0.0][..]));
        assert_eq!(store.get("dog"), Some(&[0.0, 1.0][..]));
        assert_eq!(store.to_records(), record);
    }

    #[test]
    fn test_from_records_rejects_ragged_vectors() {
        let record = PersistedRecord {
            texts: vec!["cat".into()],
            vectors: vec![1.0, 0.0, 0.5],
        };
        assert!(matches!(
            EmbeddingStore::from_records(record, 2, DuplicatePolicy::Collapse),
            Err(QuillError::DataMismatch(_))
        ));
    }

    #[test]
    fn test_from_records_rejects_count_mismatch() {
        let record = PersistedRecord {
            texts: vec!["cat".into(), "dog".into(), "fish".into()],
            vectors: vec![1.0, 0.0, 0.0, 1.0],
        };
        assert!(matches!(
            EmbeddingStore::from_records(record, 2, DuplicatePolicy::Collapse),
            Err(QuillError::DataMismatch(_))
        ));
    }

    #[test]
    fn test_from_records_rejects_zero_size() {
        assert!(matches!(
            EmbeddingStore::from_records(PersistedRecord::default(), 0, DuplicatePolicy::Collapse),
            Err(QuillError::DataMismatch(_))
        ));
    }

    #[test]
    fn test_from_empty_records() {
        let store =
            EmbeddingStore::from_records(PersistedRecord::default(), 4, DuplicatePolicy::Collapse).unwrap();
        assert!(store.is_empty());
        assert_eq!(store.dimension(), Some(4));
    }
}
