//! Embedding capability.

use async_trait::async_trait;

use crate::error::Result;

/// Text probed by the default [`Embedder::dimension`] implementation.
pub const DIMENSION_PROBE: &str = "dimension probe";

/// Turns text into a fixed-length vector.
///
/// Every vector returned by one embedder must have the same length.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Provider name, used in logs.
    fn name(&self) -> &str;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Length of the vectors this embedder produces.
    ///
    /// Defaults to embedding a probe string and measuring the result.
    async fn dimension(&self) -> Result<usize> {
        Ok(self.embed(DIMENSION_PROBE).await?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Constant(usize);

    #[async_trait]
    impl Embedder for Constant {
        fn name(&self) -> &str {
            "constant"
        }

        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0; self.0])
        }
    }

    #[tokio::test]
    async fn test_default_dimension_probes() {
        let embedder = Constant(7);
        assert_eq!(embedder.dimension().await.unwrap(), 7);
    }
}
