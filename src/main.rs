//! # Quill
//!
//! Train a vector db on a body of work, then ask the author questions.
//!
//! Usage:
//!   quill vectors.db --training-data-folder-path ./books   # Embed, save, then chat
//!   quill vectors.db                                       # Reuse an existing db
//!   quill vectors.db --provider ollama --top-k 5 -v        # Override config

use anyhow::Result;
use clap::Parser;
use futures::StreamExt;
use quill_core::QuillConfig;
use quill_core::traits::{Embedder, Generator, LogProgress};
use quill_knowledge::{RagSession, VectorDbFile, open_or_train};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_stream::wrappers::LinesStream;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "quill",
    version,
    about = "Chat with the author of a body of work"
)]
struct Cli {
    /// Vector db file to load, or to create when training
    vector_db_path: String,

    /// Folder of .txt / .md files to embed when the vector db does not exist yet
    #[arg(long)]
    training_data_folder_path: Option<String>,

    /// Config file (default: ~/.quill/config.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Provider name or custom:<url>
    #[arg(short, long)]
    provider: Option<String>,

    /// Number of passages to retrieve per question
    #[arg(long)]
    top_k: Option<usize>,

    /// Characters per chunk when training
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn expand_path(p: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(p).to_string())
}

fn load_config(cli: &Cli) -> Result<QuillConfig> {
    let mut config = match &cli.config {
        Some(path) => QuillConfig::load_from(&expand_path(path))?,
        None => QuillConfig::load()?,
    };

    if let Some(provider) = &cli.provider {
        config.provider = provider.clone();
    }
    if let Some(top_k) = cli.top_k {
        config.retrieval.top_k = top_k;
    }
    if let Some(chunk_size) = cli.chunk_size {
        config.retrieval.chunk_size = chunk_size;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries the streamed answers.
    let filter = if cli.verbose {
        "quill=debug,quill_core=debug,quill_knowledge=debug,quill_providers=debug"
    } else {
        "quill=info,quill_core=info,quill_knowledge=info,quill_providers=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&cli)?;
    let provider = quill_providers::create_provider(&config)?;
    let embedder: Arc<dyn Embedder> = provider.clone();
    let generator: Arc<dyn Generator> = provider;

    let db = VectorDbFile::new(expand_path(&cli.vector_db_path));
    let training_dir = cli.training_data_folder_path.as_deref().map(expand_path);
    let store = open_or_train(
        &db,
        training_dir.as_deref(),
        embedder.as_ref(),
        &config.retrieval,
        &LogProgress,
    )
    .await?;
    tracing::info!("Loaded {} chunks from {}", store.len(), db.path().display());

    let session = RagSession::new(store, embedder, generator, &config.retrieval);
    chat(&session).await
}

/// Read questions from stdin until `exit`, streaming each answer to stdout.
async fn chat(session: &RagSession) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    let mut lines = LinesStream::new(BufReader::new(tokio::io::stdin()).lines());

    loop {
        stdout.write_all(b"Ask the author a question: ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next().await else {
            break;
        };
        let question = line?;
        let question = question.trim();
        if question.is_empty() {
            continue;
        }
        if question == "exit" {
            break;
        }

        let mut answer = match session.ask(question).await {
            Ok(answer) => answer,
            Err(e) => {
                tracing::error!("❌ {e}");
                continue;
            }
        };
        while let Some(fragment) = answer.next().await {
            match fragment {
                Ok(text) => {
                    stdout.write_all(text.as_bytes()).await?;
                    stdout.flush().await?;
                }
                Err(e) => {
                    tracing::error!("❌ Generation interrupted: {e}");
                    break;
                }
            }
        }
        stdout.write_all(b"\n").await?;
    }
    Ok(())
}
