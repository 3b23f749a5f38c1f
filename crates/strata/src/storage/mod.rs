//! Persistence for memory nodes
//!
//! Tiers keep their nodes in memory and write through to a `NodeStore` at
//! well-defined points (after a mutation, before returning to the caller).

pub mod json;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::config::{StorageBackend, StorageConfig};
use crate::error::Result;
use crate::memory::types::{NodeRef, StoredNode, TierKind};

pub use json::JsonFileStore;
pub use memory::InMemoryStore;

/// Durable home for the nodes of every tier
///
/// Implementations must be safe to share between the tiers and the
/// background maintenance task.
#[async_trait]
pub trait NodeStore: Send + Sync {
    /// Insert or overwrite a node
    async fn save(&self, node: &StoredNode) -> Result<()>;

    /// Delete a node. Deleting an absent node succeeds.
    async fn delete(&self, node: NodeRef) -> Result<()>;

    /// All persisted nodes of one tier
    async fn load_all(&self, tier: TierKind) -> Result<Vec<StoredNode>>;

    /// Store name for logging
    fn name(&self) -> &'static str;
}

/// Open the persistence backend named by the configuration
pub async fn open(config: &StorageConfig) -> Result<Arc<dyn NodeStore>> {
    let store: Arc<dyn NodeStore> = match config.backend {
        StorageBackend::Json => Arc::new(JsonFileStore::open(config.data_dir.join("nodes")).await?),
        StorageBackend::Memory => Arc::new(InMemoryStore::new()),
    };
    info!("Using {} node store", store.name());
    Ok(store)
}
