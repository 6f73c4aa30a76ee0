//! Text generation capability.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::Result;

/// Lazy sequence of output fragments; ends when the provider signals completion.
pub type TokenStream = BoxStream<'static, Result<String>>;

/// Produces a streamed completion for a single prompt.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Provider name, used in logs.
    fn name(&self) -> &str;

    /// Start generating. Each call yields an independent stream.
    async fn generate(&self, prompt: &str) -> Result<TokenStream>;
}
