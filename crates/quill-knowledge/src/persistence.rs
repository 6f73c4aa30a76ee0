//! SQLite persistence for the embedding store.
//!
//! Layout, kept readable by older tools that only know `id` and `vector`:
//! ```text
//! texts   (id INTEGER PRIMARY KEY ASC, text TEXT NOT NULL)
//! vectors (id INTEGER PRIMARY KEY ASC, vector REAL NOT NULL, text_id INTEGER)
//! ```
//! Each text row is followed by exactly `dimension` vector rows. `text_id`
//! links every scalar back to its text; files without the column are sliced
//! purely by position.

use crate::store::{EmbeddingStore, PersistedRecord};
use quill_core::config::DuplicatePolicy;
use quill_core::error::{QuillError, Result};
use rusqlite::{Connection, OpenFlags, params};
use std::path::{Path, PathBuf};

const SCHEMA: &str = "
    CREATE TABLE texts (
        id INTEGER PRIMARY KEY ASC,
        text TEXT NOT NULL
    );
    CREATE TABLE vectors (
        id INTEGER PRIMARY KEY ASC,
        vector REAL NOT NULL,
        text_id INTEGER NOT NULL REFERENCES texts(id)
    );
";

fn storage(e: rusqlite::Error) -> QuillError {
    QuillError::Storage(e.to_string())
}

/// A vector database file on disk.
#[derive(Debug, Clone)]
pub struct VectorDbFile {
    path: PathBuf,
}

impl VectorDbFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Sibling file the database is written to before it replaces `path`.
    fn staging_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".partial");
        self.path.with_file_name(name)
    }

    /// Write `store`, replacing any existing file.
    ///
    /// All rows are inserted in one transaction into a staging file which is
    /// renamed over the target after commit, so the target is never left
    /// half-written.
    pub fn save(&self, store: &EmbeddingStore) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let staging = self.staging_path();
        if staging.exists() {
            std::fs::remove_file(&staging)?;
        }

        if let Err(e) = write_tables(&staging, store) {
            std::fs::remove_file(&staging).ok();
            return Err(e);
        }

        if let Err(e) = std::fs::rename(&staging, &self.path) {
            std::fs::remove_file(&staging).ok();
            return Err(e.into());
        }

        tracing::info!(
            "💾 Saved {} chunks (dim={:?}) to {}",
            store.len(),
            store.dimension(),
            self.path.display()
        );
        Ok(())
    }

    /// Read the file back into a store of `embedding_size`-long vectors.
    pub fn load(&self, embedding_size: usize, policy: DuplicatePolicy) -> Result<EmbeddingStore> {
        if !self.exists() {
            return Err(QuillError::NotFound(format!(
                "vector db {}",
                self.path.display()
            )));
        }

        let conn = Connection::open_with_flags(&self.path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(storage)?;

        let texts = read_texts(&conn)?;
        let linked = has_column(&conn, "vectors", "text_id")?;
        let scalars = read_scalars(&conn, linked)?;

        let record = PersistedRecord {
            texts: texts.iter().map(|(_, text)| text.clone()).collect(),
            vectors: scalars.iter().map(|&(value, _)| value).collect(),
        };
        record.block_count(embedding_size)?;

        if linked {
            check_links(&texts, &scalars, embedding_size)?;
        } else {
            tracing::debug!("{} has no text_id column, slicing by position", self.path.display());
        }

        let store = EmbeddingStore::from_records(record, embedding_size, policy)?;
        tracing::info!(
            "📂 Loaded {} chunks (dim={}) from {}",
            store.len(),
            embedding_size,
            self.path.display()
        );
        Ok(store)
    }
}

fn write_tables(path: &Path, store: &EmbeddingStore) -> Result<()> {
    let mut conn = Connection::open(path).map_err(storage)?;
    conn.execute_batch(SCHEMA).map_err(storage)?;

    let tx = conn.transaction().map_err(storage)?;
    {
        let mut insert_text = tx
            .prepare("INSERT INTO texts (text) VALUES (?1)")
            .map_err(storage)?;
        let mut insert_scalar = tx
            .prepare("INSERT INTO vectors (vector, text_id) VALUES (?1, ?2)")
            .map_err(storage)?;

        for entry in store.iter() {
            let text_id = insert_text.insert(params![entry.text]).map_err(storage)?;
            for &scalar in &entry.vector {
                insert_scalar
                    .execute(params![f64::from(scalar), text_id])
                    .map_err(storage)?;
            }
        }
    }
    tx.commit().map_err(storage)?;
    Ok(())
}

fn read_texts(conn: &Connection) -> Result<Vec<(i64, String)>> {
    let mut stmt = conn
        .prepare("SELECT id, text FROM texts ORDER BY id ASC")
        .map_err(storage)?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
        .map_err(storage)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(storage)
}

fn read_scalars(conn: &Connection, linked: bool) -> Result<Vec<(f32, Option<i64>)>> {
    let sql = if linked {
        "SELECT vector, text_id FROM vectors ORDER BY id ASC"
    } else {
        "SELECT vector, NULL FROM vectors ORDER BY id ASC"
    };
    let mut stmt = conn.prepare(sql).map_err(storage)?;
    let rows = stmt
        .query_map([], |row| {
            let value: f64 = row.get(0)?;
            Ok((value as f32, row.get::<_, Option<i64>>(1)?))
        })
        .map_err(storage)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(storage)
}

fn has_column(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({table})"))
        .map_err(storage)?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .map_err(storage)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(storage)?;
    Ok(names.iter().any(|name| name == column))
}

/// Every scalar in block `k` must point at text `k`.
fn check_links(
    texts: &[(i64, String)],
    scalars: &[(f32, Option<i64>)],
    embedding_size: usize,
) -> Result<()> {
    for (k, block) in scalars.chunks_exact(embedding_size).enumerate() {
        let text_id = texts[k].0;
        if let Some(&(_, link)) = block.iter().find(|(_, link)| *link != Some(text_id)) {
            return Err(QuillError::DataMismatch(format!(
                "vector block {k} belongs to text {link:?}, expected {text_id}"
            )));
        }
    }
    Ok(())
}
