//! Test utilities for strata - deterministic mocks
//!
//! - `MockEmbedder` / `MockSummarizer` stand in for model-backed providers
//! - `FlakyStore` is an in-memory store whose saves and deletes can be made
//!   to fail on demand

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Result, StrataError};
use crate::memory::types::{NodeRef, StoredNode, TierKind};
use crate::provider::{Embedder, Summarizer};
use crate::storage::{InMemoryStore, NodeStore};

/// Dimensions of the vectors produced by `MockEmbedder`
pub const MOCK_EMBEDDING_DIMENSIONS: usize = 64;

/// Mock embedder producing deterministic vectors from a hash of the input.
#[derive(Debug, Default)]
pub struct MockEmbedder {
    fail: AtomicBool,
}

impl MockEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    /// An embedder whose every call fails
    pub fn failing() -> Self {
        Self {
            fail: AtomicBool::new(true),
        }
    }

    /// Deterministic vector in [-1, 1] for `text`
    pub fn vector(text: &str) -> Vec<f32> {
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        let seed = hasher.finish();

        (0..MOCK_EMBEDDING_DIMENSIONS)
            .map(|i| {
                let x = seed
                    .wrapping_mul(i as u64 + 1)
                    .wrapping_add(0x9e3779b97f4a7c15);
                let normalized = (x as f32) / (u64::MAX as f32);
                (normalized * 2.0) - 1.0
            })
            .collect()
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(StrataError::Embedding("mock embedder unavailable".to_string()));
        }
        Ok(Self::vector(text))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Mock summarizer joining its inputs with " + "
#[derive(Debug, Default)]
pub struct MockSummarizer {
    fail: AtomicBool,
}

impl MockSummarizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A summarizer whose every call fails
    pub fn failing() -> Self {
        Self {
            fail: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl Summarizer for MockSummarizer {
    async fn summarize(&self, contents: &[&str]) -> Result<String> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(StrataError::Embedding("mock summarizer unavailable".to_string()));
        }
        Ok(format!("Summary: {}", contents.join(" + ")))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// In-memory store with switchable save and delete failures
#[derive(Debug, Default)]
pub struct FlakyStore {
    inner: InMemoryStore,
    fail_saves: AtomicBool,
    fail_deletes: AtomicBool,
    save_delay_ms: AtomicU64,
    saves: AtomicUsize,
    deletes: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Make every save wait before completing
    pub fn set_save_delay(&self, delay: Duration) {
        self.save_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Successful saves so far
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Successful deletes so far
    pub fn delete_count(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &InMemoryStore {
        &self.inner
    }
}

#[async_trait]
impl NodeStore for FlakyStore {
    async fn save(&self, node: &StoredNode) -> Result<()> {
        let delay = self.save_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StrataError::Persistence(format!(
                "injected save failure for {}",
                node.id()
            )));
        }
        self.inner.save(node).await?;
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, node: NodeRef) -> Result<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StrataError::Persistence(format!(
                "injected delete failure for {node}"
            )));
        }
        self.inner.delete(node).await?;
        self.deletes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn load_all(&self, tier: TierKind) -> Result<Vec<StoredNode>> {
        self.inner.load_all(tier).await
    }

    fn name(&self) -> &'static str {
        "flaky"
    }
}
