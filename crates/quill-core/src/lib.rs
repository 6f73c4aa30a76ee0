//! # Quill Core
//!
//! Shared error type, configuration and capability traits for Quill.
//! The retrieval engine in `quill-knowledge` depends only on the traits here,
//! never on a concrete model runtime.

pub mod config;
pub mod error;
pub mod traits;

pub use config::QuillConfig;
pub use error::{QuillError, Result};
