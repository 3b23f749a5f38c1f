//! Fusion store: the synthetic tier linking nodes across the base tiers
//!
//! Fusion nodes live in a bounded `TierStore` ranked by coherence plus
//! strength, so a full fusion tier prunes its least coherent links first.
//! Connecting the source nodes back to a new fusion is the orchestrator's
//! job, since only it can reach the source tiers.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use tracing::info;

use crate::error::{Result, StrataError};
use crate::memory::fusion::{FusionKind, FusionNode, ValidationStatus};
use crate::memory::types::{MemoryNode, NodeId, NodeRef};
use crate::storage::NodeStore;
use crate::tier::{AddOutcome, ConsolidationReport, ScoredNode, TierSettings, TierStore};

/// A new fusion node and the fusions pruned to make room for it
#[derive(Debug, Clone)]
pub struct CreatedFusion {
    pub node: FusionNode,
    pub pruned: Vec<NodeId>,
}

pub struct FusionStore {
    nodes: TierStore<FusionNode>,
}

impl FusionStore {
    pub fn new(settings: TierSettings, store: Arc<dyn NodeStore>) -> Self {
        Self {
            nodes: TierStore::new(settings, store),
        }
    }

    pub async fn load(&self) -> Result<usize> {
        self.nodes.load().await
    }

    /// Create and persist a fusion node over `sources`.
    ///
    /// At least two distinct sources are required. A full fusion tier
    /// prunes its lowest-ranked nodes first; their ids are returned so the
    /// caller can drop connections to them.
    pub async fn create_fusion(
        &self,
        sources: Vec<NodeRef>,
        kind: FusionKind,
        content: impl Into<String>,
        importance: f32,
    ) -> Result<CreatedFusion> {
        let distinct: BTreeSet<&NodeRef> = sources.iter().collect();
        if distinct.len() < 2 {
            return Err(StrataError::InvalidFusionInput(format!(
                "fusion needs at least 2 distinct source nodes, got {}",
                distinct.len()
            )));
        }

        let node = FusionNode::new(sources, kind, content, importance);
        let pruned = match self.nodes.add(node.clone()).await? {
            AddOutcome::Inserted { evicted, .. } => evicted,
            AddOutcome::Merged { .. } => Vec::new(),
        };
        info!(
            "Created {:?} fusion {} over {} sources",
            kind,
            node.id(),
            node.source_nodes.len()
        );
        Ok(CreatedFusion { node, pruned })
    }

    /// Apply a validation outcome to a fusion node
    pub async fn validate(&self, id: NodeId, status: ValidationStatus) -> Result<FusionNode> {
        self.nodes
            .update(id, |node| {
                node.apply_validation(status);
                node.clone()
            })
            .await
    }

    /// Record a connection from fusion node `id` to `other`
    pub async fn connect(&self, id: NodeId, other: NodeId) -> Result<bool> {
        self.nodes.connect(id, other).await
    }

    /// Forget connections from fusion nodes to any node in `gone`
    pub async fn drop_connections(&self, gone: &HashSet<NodeId>) -> usize {
        self.nodes.drop_connections(gone).await
    }

    pub async fn search_fusion(&self, query: &str, limit: usize) -> Vec<ScoredNode<FusionNode>> {
        self.nodes.search_scored(query, limit).await
    }

    /// Recompute novelty for every fusion node and retry unsaved ones
    pub async fn refresh(&self) -> Result<ConsolidationReport> {
        self.nodes.consolidate().await
    }

    /// True if a fusion over exactly these sources already exists
    pub async fn has_fusion_for(&self, sources: &[NodeRef]) -> bool {
        self.nodes
            .nodes()
            .await
            .iter()
            .any(|node| node.has_sources(sources))
    }

    pub async fn remove(&self, id: NodeId) -> Result<FusionNode> {
        self.nodes.remove(id).await
    }

    pub async fn get(&self, id: NodeId) -> Option<FusionNode> {
        self.nodes.get(id).await
    }

    pub async fn nodes(&self) -> Vec<FusionNode> {
        self.nodes.nodes().await
    }

    pub async fn len(&self) -> usize {
        self.nodes.len().await
    }

    pub async fn active_count(&self) -> usize {
        self.nodes.active_count().await
    }

    pub async fn is_empty(&self) -> bool {
        self.nodes.is_empty().await
    }

    pub fn capacity(&self) -> usize {
        self.nodes.capacity()
    }

    pub async fn dirty_count(&self) -> usize {
        self.nodes.dirty_count().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::types::TierKind;
    use crate::storage::InMemoryStore;
    use uuid::Uuid;

    fn fusion_store(capacity: usize) -> FusionStore {
        FusionStore::new(
            TierSettings::new(capacity, 1.0, 0.10),
            Arc::new(InMemoryStore::new()),
        )
    }

    fn pair() -> Vec<NodeRef> {
        vec![
            NodeRef::Veridical(Uuid::new_v4()),
            NodeRef::Semantic(Uuid::new_v4()),
        ]
    }

    #[tokio::test]
    async fn test_create_fusion() {
        let store = fusion_store(10);
        let sources = pair();
        let created = store
            .create_fusion(sources.clone(), FusionKind::CrossLayer, "linked", 0.7)
            .await
            .unwrap();
        let node = created.node;
        assert!(created.pruned.is_empty());

        assert_eq!(node.coherence, 0.7);
        assert_eq!(node.source_nodes, sources);
        assert_eq!(
            node.fused_tiers,
            [TierKind::Veridical, TierKind::Semantic].into_iter().collect()
        );
        assert_eq!(store.len().await, 1);
        assert!(store.has_fusion_for(&[sources[1], sources[0]]).await);
    }

    #[tokio::test]
    async fn test_single_source_rejected() {
        let store = fusion_store(10);
        let only = NodeRef::Episodic(Uuid::new_v4());

        let err = store
            .create_fusion(vec![only], FusionKind::Temporal, "x", 0.5)
            .await
            .unwrap_err();
        assert!(matches!(err, StrataError::InvalidFusionInput(_)));

        let err = store
            .create_fusion(vec![only, only], FusionKind::Temporal, "x", 0.5)
            .await
            .unwrap_err();
        assert!(matches!(err, StrataError::InvalidFusionInput(_)));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_full_store_prunes_least_coherent() {
        let store = fusion_store(3);
        let weak = store
            .create_fusion(pair(), FusionKind::Causal, "weak", 0.1)
            .await
            .unwrap()
            .node;
        for _ in 0..2 {
            store
                .create_fusion(pair(), FusionKind::Causal, "strong", 0.9)
                .await
                .unwrap();
        }

        let created = store
            .create_fusion(pair(), FusionKind::Causal, "new", 0.5)
            .await
            .unwrap();
        assert_eq!(created.pruned, vec![weak.id()]);
        assert_eq!(store.len().await, 3);
        assert!(store.get(weak.id()).await.is_none());
    }

    #[tokio::test]
    async fn test_validate_updates_stored_node() {
        let store = fusion_store(10);
        let node = store
            .create_fusion(pair(), FusionKind::Analogical, "x", 0.5)
            .await
            .unwrap()
            .node;

        let validated = store
            .validate(node.id(), ValidationStatus::Rejected)
            .await
            .unwrap();
        assert!((validated.coherence - 0.2).abs() < 1e-6);
        assert_eq!(
            store.get(node.id()).await.unwrap().validation,
            ValidationStatus::Rejected
        );

        let missing = store
            .validate(Uuid::new_v4(), ValidationStatus::Validated)
            .await;
        assert!(matches!(missing, Err(StrataError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_search_fusion_scores_bounded() {
        let store = fusion_store(10);
        store
            .create_fusion(pair(), FusionKind::CrossLayer, "coffee and mornings", 0.6)
            .await
            .unwrap();

        let results = store.search_fusion("coffee", 5).await;
        assert_eq!(results.len(), 1);
        assert!(results[0].score > 0.1 && results[0].score <= 1.0);
        assert!(store.search_fusion("coffee", 0).await.is_empty());
    }
}
