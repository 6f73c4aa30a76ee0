//! Unified OpenAI-compatible provider.
//!
//! A single struct that serves both embeddings (`/embeddings`) and streamed
//! chat completions (`/chat/completions` with `stream: true`) for every
//! OpenAI-compatible API, including local llama.cpp and Ollama servers.
//! Different providers are distinguished only by endpoint URL, auth style, and API key.

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use quill_core::config::QuillConfig;
use quill_core::error::{QuillError, Result};
use quill_core::traits::embedder::DIMENSION_PROBE;
use quill_core::traits::{Embedder, Generator, TokenStream};
use serde_json::{Value, json};

use crate::provider_registry::{AuthStyle, ProviderConfig};

/// A unified provider that works with any OpenAI-compatible API.
pub struct OpenAiCompatibleProvider {
    /// Provider name (e.g., "openai", "llamacpp", "ollama").
    name: String,
    /// API key for authentication.
    api_key: String,
    /// Base URL for the API (e.g., "https://api.openai.com/v1").
    base_url: String,
    embeddings_path: String,
    chat_path: String,
    auth_style: AuthStyle,
    embedding_model: String,
    /// Known embedding length; skips the probe request when set.
    dimensions: Option<usize>,
    chat_model: String,
    temperature: f32,
    max_tokens: u32,
    /// HTTP client.
    client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    /// Create from a known provider config + QuillConfig.
    ///
    /// Resolution order:
    /// - API key: `config.api_key` > env vars > empty
    /// - Base URL: `config.endpoint` > env override > registry default
    pub fn from_registry(registry: &ProviderConfig, config: &QuillConfig) -> Result<Self> {
        let api_key = if !config.api_key.is_empty() {
            config.api_key.clone()
        } else {
            registry
                .env_keys
                .iter()
                .find_map(|key| std::env::var(key).ok())
                .unwrap_or_default()
        };

        let base_url = if !config.endpoint.is_empty() {
            config.endpoint.trim_end_matches('/').to_string()
        } else {
            registry
                .base_url_env
                .and_then(|env_key| {
                    let val = std::env::var(env_key).ok()?;
                    // OLLAMA_HOST / LLAMACPP_HOST usually omit the /v1 suffix
                    if val.ends_with("/v1") {
                        Some(val)
                    } else {
                        Some(format!("{}/v1", val.trim_end_matches('/')))
                    }
                })
                .unwrap_or_else(|| registry.base_url.to_string())
        };

        Ok(Self::build(
            registry.name,
            api_key,
            base_url,
            registry.embeddings_path,
            registry.chat_path,
            registry.auth_style,
            config,
        ))
    }

    /// Create for a custom endpoint (e.g., "custom:http://my-server:8080/v1").
    pub fn custom(endpoint: &str, config: &QuillConfig) -> Result<Self> {
        let base_url = endpoint
            .strip_prefix("custom:")
            .unwrap_or(endpoint)
            .trim_end_matches('/')
            .to_string();
        if base_url.is_empty() {
            return Err(QuillError::Config("custom provider needs a URL".into()));
        }

        let api_key = if !config.api_key.is_empty() {
            config.api_key.clone()
        } else {
            std::env::var("CUSTOM_API_KEY").unwrap_or_default()
        };

        let auth_style = if api_key.is_empty() {
            AuthStyle::None
        } else {
            AuthStyle::Bearer
        };

        Ok(Self::build(
            "custom",
            api_key,
            base_url,
            "/embeddings",
            "/chat/completions",
            auth_style,
            config,
        ))
    }

    fn build(
        name: &str,
        api_key: String,
        base_url: String,
        embeddings_path: &str,
        chat_path: &str,
        auth_style: AuthStyle,
        config: &QuillConfig,
    ) -> Self {
        Self {
            name: name.to_string(),
            api_key,
            base_url,
            embeddings_path: embeddings_path.to_string(),
            chat_path: chat_path.to_string(),
            auth_style,
            embedding_model: config.embedding.model.clone(),
            dimensions: config.embedding.dimensions,
            chat_model: config.generation.model.clone(),
            temperature: config.generation.temperature,
            max_tokens: config.generation.max_tokens,
            client: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build the auth header for the request.
    fn apply_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.auth_style {
            AuthStyle::Bearer if !self.api_key.is_empty() => {
                req.header("Authorization", format!("Bearer {}", self.api_key))
            }
            _ => req,
        }
    }

    fn require_key(&self) -> Result<()> {
        if self.auth_style != AuthStyle::None && self.api_key.is_empty() {
            return Err(QuillError::ApiKeyMissing(self.name.clone()));
        }
        Ok(())
    }

    fn chat_body(&self, prompt: &str) -> Value {
        json!({
            "model": self.chat_model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "stream": true,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.require_key()?;

        let url = format!("{}{}", self.base_url, self.embeddings_path);
        let body = json!({
            "model": self.embedding_model,
            "input": text,
        });
        let req = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body);
        let resp = self.apply_auth(req).send().await.map_err(|e| {
            QuillError::Http(format!("{} connection failed ({}): {}", self.name, url, e))
        })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(QuillError::Embedding(format!(
                "{} API error {}: {}",
                self.name, status, text
            )));
        }

        let json: Value = resp
            .json()
            .await
            .map_err(|e| QuillError::Http(e.to_string()))?;
        parse_embedding(&json)
    }

    async fn dimension(&self) -> Result<usize> {
        match self.dimensions {
            Some(dimensions) => Ok(dimensions),
            None => {
                let probe = self.embed(DIMENSION_PROBE).await?;
                tracing::debug!("{} embeddings are {}-dimensional", self.name, probe.len());
                Ok(probe.len())
            }
        }
    }
}

#[async_trait]
impl Generator for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, prompt: &str) -> Result<TokenStream> {
        self.require_key()?;

        let url = format!("{}{}", self.base_url, self.chat_path);
        let req = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&self.chat_body(prompt));
        let resp = self.apply_auth(req).send().await.map_err(|e| {
            QuillError::Http(format!("{} connection failed ({}): {}", self.name, url, e))
        })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(QuillError::Generation(format!(
                "{} API error {}: {}",
                self.name, status, text
            )));
        }

        let reader = SseReader {
            bytes: resp.bytes_stream().map(|chunk| chunk.map(|b| b.to_vec())).boxed(),
            buffer: Vec::new(),
            finished: false,
        };
        let stream = futures::stream::unfold(reader, |mut reader| async move {
            reader.next_fragment().await.map(|item| (item, reader))
        });
        Ok(stream.boxed())
    }
}

/// Splits a chunked HTTP body into SSE lines and decodes the text deltas.
struct SseReader {
    bytes: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    buffer: Vec<u8>,
    finished: bool,
}

impl SseReader {
    async fn next_fragment(&mut self) -> Option<Result<String>> {
        while !self.finished {
            // Split on raw bytes; a chunk may end mid-character.
            while let Some(end) = self.buffer.iter().position(|&b| b == b'\n') {
                let raw: Vec<u8> = self.buffer.drain(..=end).collect();
                match parse_sse_line(&String::from_utf8_lossy(&raw)) {
                    Ok(Some(SseEvent::Delta(text))) => return Some(Ok(text)),
                    Ok(Some(SseEvent::Done)) => {
                        self.finished = true;
                        return None;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        self.finished = true;
                        return Some(Err(e));
                    }
                }
            }

            match self.bytes.next().await {
                Some(Ok(chunk)) => self.buffer.extend_from_slice(&chunk),
                Some(Err(e)) => {
                    self.finished = true;
                    return Some(Err(QuillError::Http(e.to_string())));
                }
                None => {
                    self.finished = true;
                    // Last line without a trailing newline.
                    let rest = std::mem::take(&mut self.buffer);
                    return match parse_sse_line(&String::from_utf8_lossy(&rest)) {
                        Ok(Some(SseEvent::Delta(text))) => Some(Ok(text)),
                        Ok(_) => None,
                        Err(e) => Some(Err(e)),
                    };
                }
            }
        }
        None
    }
}

/// Extract the vector from an `/embeddings` response.
///
/// Accepts the OpenAI shape (`data[0].embedding`) and the bare
/// `{"embedding": [...]}` shape some local servers return.
pub fn parse_embedding(json: &Value) -> Result<Vec<f32>> {
    let values = json["data"][0]["embedding"]
        .as_array()
        .or_else(|| json["embedding"].as_array())
        .ok_or_else(|| QuillError::Embedding("No embedding in response".into()))?;

    values
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| QuillError::Embedding(format!("non-numeric embedding value: {v}")))
        })
        .collect()
}

/// One decoded server-sent event from a streamed chat completion.
#[derive(Debug, Clone, PartialEq)]
pub enum SseEvent {
    Delta(String),
    Done,
}

/// Decode a single SSE line. Comments, blank lines and content-free chunks
/// (role headers, finish markers) yield `None`.
pub fn parse_sse_line(line: &str) -> Result<Option<SseEvent>> {
    let Some(data) = line.trim().strip_prefix("data:") else {
        return Ok(None);
    };
    let data = data.trim();
    if data == "[DONE]" {
        return Ok(Some(SseEvent::Done));
    }

    let json: Value = serde_json::from_str(data)
        .map_err(|e| QuillError::Generation(format!("Bad stream chunk: {e}")))?;
    if let Some(err) = json.get("error") {
        return Err(QuillError::Generation(err.to_string()));
    }

    match json["choices"][0]["delta"]["content"].as_str() {
        Some(text) if !text.is_empty() => Ok(Some(SseEvent::Delta(text.to_string()))),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider_registry::get_provider_config;

    #[test]
    fn test_parse_openai_embedding() {
        let json = json!({
            "object": "list",
            "data": [{ "object": "embedding", "index": 0, "embedding": [0.5, -1.0, 2.25] }],
            "model": "nomic-embed-text"
        });
        assert_eq!(parse_embedding(&json).unwrap(), vec![0.5, -1.0, 2.25]);
    }

    #[test]
    fn test_parse_bare_embedding() {
        let json = json!({ "embedding": [1, 2] });
        assert_eq!(parse_embedding(&json).unwrap(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_parse_embedding_missing() {
        assert!(matches!(
            parse_embedding(&json!({ "data": [] })),
            Err(QuillError::Embedding(_))
        ));
        assert!(parse_embedding(&json!({ "embedding": ["x"] })).is_err());
    }

    #[test]
    fn test_sse_delta() {
        let line = r#"data: {"choices":[{"index":0,"delta":{"content":"Hello"}}]}"#;
        assert_eq!(
            parse_sse_line(line).unwrap(),
            Some(SseEvent::Delta("Hello".into()))
        );
    }

    #[test]
    fn test_sse_done_and_noise() {
        assert_eq!(parse_sse_line("data: [DONE]\n").unwrap(), Some(SseEvent::Done));
        assert_eq!(parse_sse_line("").unwrap(), None);
        assert_eq!(parse_sse_line(": keep-alive").unwrap(), None);
        let role = r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert_eq!(parse_sse_line(role).unwrap(), None);
        let finish = r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#;
        assert_eq!(parse_sse_line(finish).unwrap(), None);
    }

    #[test]
    fn test_sse_error_payload() {
        let line = r#"data: {"error":{"message":"context length exceeded"}}"#;
        assert!(matches!(parse_sse_line(line), Err(QuillError::Generation(_))));
        assert!(parse_sse_line("data: {not json").is_err());
    }

    fn reader_over(chunks: Vec<&'static [u8]>) -> SseReader {
        let parts: Vec<reqwest::Result<Vec<u8>>> =
            chunks.into_iter().map(|c| Ok(c.to_vec())).collect();
        SseReader {
            bytes: futures::stream::iter(parts).boxed(),
            buffer: Vec::new(),
            finished: false,
        }
    }

    #[tokio::test]
    async fn test_reader_reassembles_split_chunks() {
        let body: &'static str = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"caf\u{e9}\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\" au lait\"}}]}\n\n",
            "data: [DONE]\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n",
        );
        let bytes = body.as_bytes();
        // Cut inside the two-byte 'é'.
        let cut = body.find('\u{e9}').unwrap() + 1;
        let mut reader = reader_over(vec![&bytes[..cut], &bytes[cut..]]);

        let mut fragments = Vec::new();
        while let Some(fragment) = reader.next_fragment().await {
            fragments.push(fragment.unwrap());
        }
        assert_eq!(fragments, vec!["caf\u{e9}", " au lait"]);
    }

    #[tokio::test]
    async fn test_reader_keeps_unterminated_last_line() {
        let mut reader = reader_over(vec![
            &b"data: {\"choices\":[{\"delta\":{\"content\":\"one\"}}]}\n"[..],
            &b"data: {\"choices\":[{\"delta\":{\"content\":\"two\"}}]}"[..],
        ]);
        assert_eq!(reader.next_fragment().await.unwrap().unwrap(), "one");
        assert_eq!(reader.next_fragment().await.unwrap().unwrap(), "two");
        assert!(reader.next_fragment().await.is_none());
    }

    #[tokio::test]
    async fn test_reader_stops_on_error_event() {
        let mut reader = reader_over(vec![
            &b"data: {\"error\":\"overloaded\"}\n"[..],
            &b"data: [DONE]\n"[..],
        ]);
        assert!(matches!(
            reader.next_fragment().await,
            Some(Err(QuillError::Generation(_)))
        ));
        assert!(reader.next_fragment().await.is_none());
    }

    #[test]
    fn test_chat_body_streams_with_config() {
        let mut config = QuillConfig::default();
        config.generation.model = "tinyllama".into();
        config.generation.temperature = 0.6;
        let registry = get_provider_config("llamacpp").unwrap();
        let provider = OpenAiCompatibleProvider::from_registry(registry, &config).unwrap();

        let body = provider.chat_body("hi");
        assert_eq!(body["model"], "tinyllama");
        assert_eq!(body["stream"], true);
        assert_eq!(body["messages"][0]["content"], "hi");
    }

    #[test]
    fn test_endpoint_override() {
        let mut config = QuillConfig::default();
        config.endpoint = "http://gpu-box:9000/v1/".into();
        let registry = get_provider_config("llamacpp").unwrap();
        let provider = OpenAiCompatibleProvider::from_registry(registry, &config).unwrap();
        assert_eq!(provider.base_url(), "http://gpu-box:9000/v1");
    }

    #[test]
    fn test_custom_endpoint() {
        let provider =
            OpenAiCompatibleProvider::custom("custom:http://localhost:1234/v1/", &QuillConfig::default())
                .unwrap();
        assert_eq!(provider.base_url(), "http://localhost:1234/v1");
        assert!(OpenAiCompatibleProvider::custom("custom:", &QuillConfig::default()).is_err());
    }

    #[tokio::test]
    async fn test_configured_dimension_skips_probe() {
        let mut config = QuillConfig::default();
        config.embedding.dimensions = Some(768);
        // Unroutable endpoint: any request would fail.
        config.endpoint = "http://127.0.0.1:9".into();
        let registry = get_provider_config("llamacpp").unwrap();
        let provider = OpenAiCompatibleProvider::from_registry(registry, &config).unwrap();
        assert_eq!(provider.dimension().await.unwrap(), 768);
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let mut config = QuillConfig::default();
        config.endpoint = "http://127.0.0.1:9".into();
        let registry = ProviderConfig {
            env_keys: &[],
            ..get_provider_config("openai").unwrap().clone()
        };
        let provider = OpenAiCompatibleProvider::from_registry(&registry, &config).unwrap();
        assert!(matches!(
            provider.embed("hello").await,
            Err(QuillError::ApiKeyMissing(_))
        ));
    }
}
