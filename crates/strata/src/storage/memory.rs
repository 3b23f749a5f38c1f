use async_trait::async_trait;
use dashmap::DashMap;

use super::NodeStore;
use crate::error::Result;
use crate::memory::types::{NodeId, NodeRef, StoredNode, TierKind};

/// Process-local store; nothing survives a restart
#[derive(Debug, Default)]
pub struct InMemoryStore {
    nodes: DashMap<NodeId, StoredNode>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Copy of a persisted node
    pub fn get(&self, id: &NodeId) -> Option<StoredNode> {
        self.nodes.get(id).map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl NodeStore for InMemoryStore {
    async fn save(&self, node: &StoredNode) -> Result<()> {
        self.nodes.insert(node.id(), node.clone());
        Ok(())
    }

    async fn delete(&self, node: NodeRef) -> Result<()> {
        self.nodes.remove(&node.id());
        Ok(())
    }

    async fn load_all(&self, tier: TierKind) -> Result<Vec<StoredNode>> {
        Ok(self
            .nodes
            .iter()
            .filter(|entry| entry.value().tier() == tier)
            .map(|entry| entry.value().clone())
            .collect())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
