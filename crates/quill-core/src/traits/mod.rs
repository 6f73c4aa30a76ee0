//! Capability traits for the collaborators around the retrieval engine.

pub mod embedder;
pub mod generator;
pub mod progress;

pub use embedder::Embedder;
pub use generator::{Generator, TokenStream};
pub use progress::{LogProgress, NoProgress, ProgressSink};
