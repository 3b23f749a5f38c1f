//! Optional capabilities consumed by the memory system
//!
//! Neither is required: without an embedder nodes carry no vector, and
//! without a summarizer automatic fusion uses a fixed content formula.

use async_trait::async_trait;

use crate::error::Result;

/// Produces vector embeddings for node content
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single piece of content
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Provider name for logging
    fn name(&self) -> &'static str;
}

/// Produces natural-language summaries of several node contents
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Summarize the given contents into one line of fusion content
    async fn summarize(&self, contents: &[&str]) -> Result<String>;

    /// Provider name for logging
    fn name(&self) -> &'static str;
}
