//! # Quill Providers
//!
//! Embedding and text-generation backends for Quill.
//!
//! Every supported backend (OpenAI, Ollama, llama.cpp, vLLM, Together, Mistral,
//! or any `custom:` URL) speaks the OpenAI wire format and is handled by a
//! single `OpenAiCompatibleProvider`, which implements both `Embedder` and
//! `Generator`.

pub mod openai_compatible;
pub mod provider_registry;

use std::sync::Arc;

use quill_core::config::QuillConfig;
use quill_core::error::{QuillError, Result};

pub use openai_compatible::OpenAiCompatibleProvider;

/// Create the provider named by `config.provider`.
///
/// The returned handle can be shared as both `Arc<dyn Embedder>` and
/// `Arc<dyn Generator>`.
pub fn create_provider(config: &QuillConfig) -> Result<Arc<OpenAiCompatibleProvider>> {
    let provider_name = config.provider.as_str();

    let provider = match provider_name {
        // Custom endpoint: "custom:http://my-server:8080/v1"
        other if other.starts_with("custom:") => OpenAiCompatibleProvider::custom(other, config)?,

        _ => {
            let registry = provider_registry::get_provider_config(provider_name)
                .ok_or_else(|| QuillError::ProviderNotFound(provider_name.into()))?;
            OpenAiCompatibleProvider::from_registry(registry, config)?
        }
    };

    tracing::debug!(
        "Provider {} at {} (embedding: {}, generation: {})",
        provider_name,
        provider.base_url(),
        config.embedding.model,
        config.generation.model
    );
    Ok(Arc::new(provider))
}

/// List all available provider names.
pub fn available_providers() -> Vec<&'static str> {
    let mut names = provider_registry::all_provider_names();
    names.push("custom");
    names
}
