//! Document sources: where raw training text comes from.

use crate::chunker::chunk;
use quill_core::error::Result;
use std::path::{Path, PathBuf};

/// A named blob of raw text.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub name: String,
    pub text: String,
}

/// Anything that can enumerate documents.
pub trait DocumentSource {
    fn documents(&self) -> Result<Vec<Document>>;
}

/// Reads the plain-text files directly inside one directory.
#[derive(Debug, Clone)]
pub struct FolderSource {
    dir: PathBuf,
}

const TEXT_EXTENSIONS: &[&str] = &["txt", "md"];

impl FolderSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl DocumentSource for FolderSource {
    fn documents(&self) -> Result<Vec<Document>> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file())
            .collect();
        paths.sort();

        let mut documents = Vec::new();
        for path in paths {
            let ext = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_ascii_lowercase())
                .unwrap_or_default();

            if TEXT_EXTENSIONS.contains(&ext.as_str()) {
                tracing::info!("reading {}", path.display());
                let bytes = std::fs::read(&path)?;
                let text = match String::from_utf8(bytes) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!(
                            "⚠️ {} is not valid UTF-8, replacing undecodable bytes",
                            path.display()
                        );
                        String::from_utf8_lossy(e.as_bytes()).into_owned()
                    }
                };
                let name = path
                    .file_name()
                    .map(|f| f.to_string_lossy().to_string())
                    .unwrap_or_default();
                documents.push(Document { name, text });
            } else if ext == "pdf" {
                tracing::warn!("⚠️ Skipping {}: PDF extraction is not supported", path.display());
            } else {
                tracing::debug!("Skipping {}", path.display());
            }
        }
        Ok(documents)
    }
}

/// Chunk every document separately; remainders never span two documents.
pub fn chunk_documents(source: &dyn DocumentSource, chunk_size: usize) -> Result<Vec<String>> {
    let documents = source.documents()?;
    let chunks: Vec<String> = documents
        .iter()
        .flat_map(|doc| chunk(&doc.text, chunk_size))
        .collect();
    tracing::info!(
        "Chunked {} documents into {} chunks of {} chars",
        documents.len(),
        chunks.len(),
        chunk_size
    );
    Ok(chunks)
}
