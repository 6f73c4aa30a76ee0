//! # Quill Knowledge
//!
//! Minimal embedding-based retrieval: fixed-size chunks, one vector per chunk,
//! a two-table SQLite file, and exhaustive dot-product ranking.
//!
//! ## How it works
//! ```text
//! Folder of .txt / .md files
//!   ↓ FolderSource + chunk()
//! Fixed-size chunks
//!   ↓ Embedder (one call per chunk, in order)
//! EmbeddingStore ──save──▶ vectors.db (texts + vectors tables)
//!   ↓
//! Question → Embedder → top_k() by dot product
//!   ↓
//! Top chunks joined into the prompt → Generator → streamed answer
//! ```

pub mod chunker;
pub mod documents;
pub mod persistence;
pub mod pipeline;
pub mod search;
pub mod store;

pub use chunker::chunk;
pub use documents::{Document, DocumentSource, FolderSource, chunk_documents};
pub use persistence::VectorDbFile;
pub use pipeline::{RagSession, build_prompt, open_or_train};
pub use quill_core::config::DuplicatePolicy;
pub use search::{SearchResult, context_for, dot_product, join_context, rank, top_k};
pub use store::{EmbeddingStore, PersistedRecord, StoredChunk};
