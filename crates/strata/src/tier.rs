//! Generic bounded tier store
//!
//! One `TierStore<N>` owns the nodes of a single tier. It scores and ranks
//! them against queries, merges near-duplicates where the tier allows it,
//! evicts the lowest-ranked nodes when full, and runs the tier-local
//! consolidation pass (refresh, promotion, persistence retry).
//!
//! Every mutating operation (including `search`, which records access on
//! its results) takes the exclusive lock. Read-only accessors share it.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::{Result, StrataError};
use crate::memory::scoring::{MIN_RELEVANCE, Query};
use crate::memory::types::{MemoryNode, NodeId, TierKind};
use crate::storage::NodeStore;

/// Default consolidation score added to a promotion-eligible node per pass
pub const DEFAULT_PROMOTION_INCREMENT: f32 = 0.1;

/// Tier-specific scoring and consolidation behavior
pub trait TierNode: MemoryNode {
    /// Relevance of this node to `query`, always within 0.0-1.0
    fn relevance(&self, query: &Query, now: DateTime<Utc>) -> f32;

    /// Ranking used for eviction; lowest goes first
    fn retention_score(&self) -> f32;

    /// Per-node decay or recomputation run once per consolidation pass
    fn refresh(&mut self, _now: DateTime<Utc>) {}

    fn is_promotion_eligible(&self) -> bool {
        false
    }

    fn promotion_increment(&self) -> f32 {
        DEFAULT_PROMOTION_INCREMENT
    }

    /// Flag this node for promotion. Returns true if anything changed.
    fn promote(&mut self) -> bool {
        if !self.is_promotion_eligible() {
            return false;
        }
        let increment = self.promotion_increment();
        self.core_mut().add_consolidation_score(increment);
        true
    }

    /// True if `self` should be merged into `other` instead of stored alongside it
    fn is_duplicate_of(&self, _other: &Self, _threshold: f32) -> bool {
        false
    }

    /// Merge a duplicate into this node
    fn absorb(&mut self, _other: Self, _now: DateTime<Utc>) {}
}

/// Capacity and consolidation settings for one tier
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TierSettings {
    /// Maximum number of nodes held
    pub capacity: usize,
    /// Consolidation score at which a node is reported as a promotion candidate
    pub consolidation_threshold: f32,
    /// Fraction of capacity evicted when the tier is full
    pub eviction_fraction: f32,
    /// Merge incoming near-duplicates at this similarity; `None` disables merging
    pub merge_similarity: Option<f32>,
}

impl TierSettings {
    pub fn new(capacity: usize, consolidation_threshold: f32, eviction_fraction: f32) -> Self {
        Self {
            capacity,
            consolidation_threshold,
            eviction_fraction,
            merge_similarity: None,
        }
    }

    pub fn with_merge_similarity(mut self, similarity: f32) -> Self {
        self.merge_similarity = Some(similarity);
        self
    }

    /// Number of nodes evicted when the tier is full (rounded up, at least one)
    pub fn eviction_batch(&self) -> usize {
        let batch = (self.capacity as f32 * self.eviction_fraction).ceil() as usize;
        batch.max(1)
    }
}

/// A node paired with the relevance score it was ranked by
#[derive(Debug, Clone, Serialize)]
pub struct ScoredNode<N> {
    pub node: N,
    pub score: f32,
}

/// What happened to a node handed to `TierStore::add`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    /// Stored as a new node, possibly after evicting others
    Inserted { id: NodeId, evicted: Vec<NodeId> },
    /// Merged into an existing near-duplicate
    Merged { into: NodeId },
}

impl AddOutcome {
    /// Id of the node now holding the content
    pub fn id(&self) -> NodeId {
        match self {
            AddOutcome::Inserted { id, .. } => *id,
            AddOutcome::Merged { into } => *into,
        }
    }
}

/// Outcome of one tier consolidation pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsolidationReport {
    pub tier: TierKind,
    /// Nodes refreshed this pass
    pub refreshed: usize,
    /// Nodes whose promotion state changed this pass
    pub promoted: usize,
    /// Nodes at or above the tier's consolidation threshold
    pub promotion_candidates: Vec<NodeId>,
    /// Previously unsaved nodes persisted this pass
    pub recovered: usize,
    /// Nodes that could not be persisted and remain dirty
    pub failed_saves: usize,
}

impl ConsolidationReport {
    fn new(tier: TierKind) -> Self {
        Self {
            tier,
            refreshed: 0,
            promoted: 0,
            promotion_candidates: Vec::new(),
            recovered: 0,
            failed_saves: 0,
        }
    }
}

struct TierState<N> {
    /// Nodes in insertion order
    nodes: Vec<N>,
    /// Ids whose in-memory state is ahead of persistence
    dirty: HashSet<NodeId>,
}

impl<N: TierNode> TierState<N> {
    fn position(&self, id: &NodeId) -> Option<usize> {
        self.nodes.iter().position(|n| n.id() == *id)
    }
}

/// Bounded, persisted collection of one tier's nodes
pub struct TierStore<N: TierNode> {
    settings: TierSettings,
    state: RwLock<TierState<N>>,
    store: Arc<dyn NodeStore>,
}

impl<N: TierNode> TierStore<N> {
    pub fn new(settings: TierSettings, store: Arc<dyn NodeStore>) -> Self {
        Self {
            settings,
            state: RwLock::new(TierState {
                nodes: Vec::new(),
                dirty: HashSet::new(),
            }),
            store,
        }
    }

    pub fn tier(&self) -> TierKind {
        N::TIER
    }

    pub fn settings(&self) -> &TierSettings {
        &self.settings
    }

    pub fn capacity(&self) -> usize {
        self.settings.capacity
    }

    /// Load every persisted node of this tier, replacing in-memory state.
    ///
    /// Records of another tier are skipped. If more nodes are persisted than
    /// the tier can hold, the lowest-ranked are dropped and deleted.
    pub async fn load(&self) -> Result<usize> {
        let stored = self.store.load_all(N::TIER).await?;
        let mut nodes = Vec::with_capacity(stored.len());
        for record in stored {
            let (tier, id) = (record.tier(), record.id());
            match N::from_stored(record) {
                Some(node) => nodes.push(node),
                None => warn!("Skipping {} node {} while loading {} tier", tier, id, N::TIER),
            }
        }
        nodes.sort_by_key(|n| n.core().created_at);

        let mut state = self.state.write().await;
        state.nodes = nodes;
        state.dirty.clear();

        if state.nodes.len() > self.settings.capacity {
            let excess = state.nodes.len() - self.settings.capacity;
            warn!(
                "{} tier loaded {} nodes over capacity {}, trimming {}",
                N::TIER,
                state.nodes.len(),
                self.settings.capacity,
                excess
            );
            for victim in lowest_ranked(&state.nodes, excess) {
                let node_ref = state.nodes[victim].node_ref();
                if let Err(e) = self.store.delete(node_ref).await {
                    warn!("Failed to delete trimmed node {}: {}", node_ref, e);
                }
            }
            let keep = ranked_survivors(&state.nodes, excess);
            state.nodes = keep;
        }

        info!("Loaded {} nodes into {} tier", state.nodes.len(), N::TIER);
        Ok(state.nodes.len())
    }

    /// Add a node, merging or evicting as the tier requires, and persist it
    pub async fn add(&self, node: N) -> Result<AddOutcome> {
        let mut state = self.state.write().await;
        let now = Utc::now();

        if let Some(threshold) = self.settings.merge_similarity {
            let duplicate = state
                .nodes
                .iter()
                .position(|existing| node.is_duplicate_of(existing, threshold));

            if let Some(pos) = duplicate {
                let previous = state.nodes[pos].clone();
                let survivor = &mut state.nodes[pos];
                survivor.absorb(node, now);
                let stored = survivor.clone().into_stored();
                let into = survivor.id();

                if let Err(e) = self.store.save(&stored).await {
                    state.nodes[pos] = previous;
                    return Err(e);
                }
                state.dirty.remove(&into);
                debug!("Merged incoming node into {} node {}", N::TIER, into);
                return Ok(AddOutcome::Merged { into });
            }
        }

        let evicted = if state.nodes.len() >= self.settings.capacity {
            self.evict_locked(&mut state, self.settings.eviction_batch())
                .await?
        } else {
            Vec::new()
        };

        if state.nodes.len() >= self.settings.capacity {
            return Err(StrataError::CapacityExceeded {
                tier: N::TIER,
                capacity: self.settings.capacity,
            });
        }

        self.store.save(&node.clone().into_stored()).await?;
        let id = node.id();
        state.nodes.push(node);
        debug!("Added node {} to {} tier", id, N::TIER);

        Ok(AddOutcome::Inserted { id, evicted })
    }

    /// Evict up to `count` of the lowest-ranked nodes.
    ///
    /// Each victim is deleted from persistence before it leaves memory; on a
    /// failed delete the already-deleted victims are removed and the error
    /// is returned.
    async fn evict_locked(&self, state: &mut TierState<N>, count: usize) -> Result<Vec<NodeId>> {
        let victims: Vec<_> = lowest_ranked(&state.nodes, count)
            .into_iter()
            .map(|i| state.nodes[i].node_ref())
            .collect();

        let mut evicted = Vec::with_capacity(victims.len());
        let mut failure = None;
        for victim in victims {
            if let Err(e) = self.store.delete(victim).await {
                failure = Some(e);
                break;
            }
            evicted.push(victim.id());
        }

        let gone: HashSet<NodeId> = evicted.iter().copied().collect();
        state.nodes.retain(|n| !gone.contains(&n.id()));
        state.dirty.retain(|id| !gone.contains(id));

        if !evicted.is_empty() {
            info!("Evicted {} nodes from {} tier", evicted.len(), N::TIER);
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(evicted),
        }
    }

    /// Remove a node from the tier and from persistence
    pub async fn remove(&self, id: NodeId) -> Result<N> {
        let mut state = self.state.write().await;
        let pos = state.position(&id).ok_or(StrataError::NotFound { tier: N::TIER, id })?;

        self.store.delete(state.nodes[pos].node_ref()).await?;
        state.dirty.remove(&id);
        let node = state.nodes.remove(pos);
        debug!("Removed node {} from {} tier", id, N::TIER);
        Ok(node)
    }

    pub async fn get(&self, id: NodeId) -> Option<N> {
        let state = self.state.read().await;
        state.position(&id).map(|pos| state.nodes[pos].clone())
    }

    pub async fn contains(&self, id: NodeId) -> bool {
        self.state.read().await.position(&id).is_some()
    }

    /// Apply `f` to a node and persist the result.
    ///
    /// If the save fails the node is restored to its previous state.
    pub async fn update<F, R>(&self, id: NodeId, f: F) -> Result<R>
    where
        F: FnOnce(&mut N) -> R + Send,
        R: Send,
    {
        let mut state = self.state.write().await;
        let pos = state.position(&id).ok_or(StrataError::NotFound { tier: N::TIER, id })?;

        let previous = state.nodes[pos].clone();
        let result = f(&mut state.nodes[pos]);
        let stored = state.nodes[pos].clone().into_stored();

        if let Err(e) = self.store.save(&stored).await {
            state.nodes[pos] = previous;
            return Err(e);
        }
        state.dirty.remove(&id);
        Ok(result)
    }

    /// Record a connection from node `id` to `other`.
    /// Returns false if it was already present.
    pub async fn connect(&self, id: NodeId, other: NodeId) -> Result<bool> {
        self.update(id, |node| node.core_mut().add_connection(other))
            .await
    }

    /// Forget connections to any node in `gone`. Returns how many nodes
    /// changed; those that fail to persist stay dirty.
    pub async fn drop_connections(&self, gone: &HashSet<NodeId>) -> usize {
        if gone.is_empty() {
            return 0;
        }

        let mut state = self.state.write().await;
        let mut changed = Vec::new();
        for node in state.nodes.iter_mut() {
            let core = node.core_mut();
            let before = core.connections.len();
            core.connections.retain(|id| !gone.contains(id));
            let removed = before - core.connections.len();
            if removed > 0 {
                core.fusion_count = core.fusion_count.saturating_sub(removed as u32);
                changed.push(node.clone());
            }
        }

        for node in &changed {
            if let Err(e) = self.store.save(&node.clone().into_stored()).await {
                warn!(
                    "Failed to persist dropped connections for {} node {}: {}",
                    N::TIER,
                    node.id(),
                    e
                );
                state.dirty.insert(node.id());
            }
        }
        changed.len()
    }

    pub async fn search(&self, query: &str, limit: usize) -> Vec<N> {
        self.search_scored(query, limit)
            .await
            .into_iter()
            .map(|scored| scored.node)
            .collect()
    }

    /// Rank nodes against `query`, keeping scores above the relevance floor.
    ///
    /// Returned nodes have their access recorded. Failing to persist the
    /// access marks them dirty instead of failing the search.
    pub async fn search_scored(&self, query: &str, limit: usize) -> Vec<ScoredNode<N>> {
        if limit == 0 {
            return Vec::new();
        }

        let query = Query::new(query);
        let now = Utc::now();
        let mut state = self.state.write().await;

        let mut ranked: Vec<(usize, f32)> = state
            .nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (i, node.relevance(&query, now)))
            .filter(|(_, score)| *score > MIN_RELEVANCE)
            .collect();

        ranked.sort_by(|(a_idx, a_score), (b_idx, b_score)| {
            b_score
                .partial_cmp(a_score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| {
                    let a = state.nodes[*a_idx].core().last_accessed;
                    let b = state.nodes[*b_idx].core().last_accessed;
                    b.cmp(&a)
                })
        });
        ranked.truncate(limit);

        let mut results = Vec::with_capacity(ranked.len());
        for (idx, score) in ranked {
            let node = &mut state.nodes[idx];
            node.record_access(now);
            let snapshot = node.clone();

            if let Err(e) = self.store.save(&snapshot.clone().into_stored()).await {
                warn!(
                    "Failed to persist access for {} node {}: {}",
                    N::TIER,
                    snapshot.id(),
                    e
                );
                state.dirty.insert(snapshot.id());
            }
            results.push(ScoredNode {
                node: snapshot,
                score,
            });
        }

        results
    }

    /// Run the tier-local consolidation pass.
    ///
    /// Retries dirty nodes, refreshes every node, applies promotion and
    /// persists the result. Nodes that fail to persist stay dirty and the
    /// pass reports a `Consolidation` error after finishing the others.
    pub async fn consolidate(&self) -> Result<ConsolidationReport> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let mut report = ConsolidationReport::new(N::TIER);

        let pending: Vec<NodeId> = state.dirty.iter().copied().collect();
        for id in pending {
            let Some(pos) = state.position(&id) else {
                state.dirty.remove(&id);
                continue;
            };
            if self
                .store
                .save(&state.nodes[pos].clone().into_stored())
                .await
                .is_ok()
            {
                state.dirty.remove(&id);
                report.recovered += 1;
            }
        }

        for idx in 0..state.nodes.len() {
            let node = &mut state.nodes[idx];
            node.refresh(now);
            report.refreshed += 1;

            if node.promote() {
                report.promoted += 1;
                debug!("Promoted {} node {}", N::TIER, node.id());
            }
            if node.core().consolidation_score >= self.settings.consolidation_threshold {
                report.promotion_candidates.push(node.id());
            }

            let stored = node.clone().into_stored();
            let id = node.id();
            if let Err(e) = self.store.save(&stored).await {
                warn!("Failed to persist consolidated {} node {}: {}", N::TIER, id, e);
                state.dirty.insert(id);
                report.failed_saves += 1;
            }
        }

        if report.failed_saves > 0 {
            return Err(StrataError::Consolidation(format!(
                "{} of {} {} nodes could not be persisted",
                report.failed_saves,
                report.refreshed,
                N::TIER
            )));
        }

        debug!(
            "Consolidated {} tier: {} refreshed, {} promoted, {} candidates",
            N::TIER,
            report.refreshed,
            report.promoted,
            report.promotion_candidates.len()
        );
        Ok(report)
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.nodes.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.nodes.is_empty()
    }

    /// Snapshot of every node in insertion order
    pub async fn nodes(&self) -> Vec<N> {
        self.state.read().await.nodes.clone()
    }

    /// Snapshot of the first `limit` nodes in insertion order
    pub async fn first(&self, limit: usize) -> Vec<N> {
        let state = self.state.read().await;
        state.nodes.iter().take(limit).cloned().collect()
    }

    pub async fn ids(&self) -> Vec<NodeId> {
        self.state.read().await.nodes.iter().map(|n| n.id()).collect()
    }

    /// Nodes that have been read at least once
    pub async fn active_count(&self) -> usize {
        self.state
            .read()
            .await
            .nodes
            .iter()
            .filter(|n| n.core().access_count > 0)
            .count()
    }

    /// Nodes whose in-memory state has not reached persistence
    pub async fn dirty_count(&self) -> usize {
        self.state.read().await.dirty.len()
    }
}

/// Indices of the `count` nodes with the lowest retention score
fn lowest_ranked<N: TierNode>(nodes: &[N], count: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..nodes.len()).collect();
    order.sort_by(|&a, &b| {
        nodes[a]
            .retention_score()
            .partial_cmp(&nodes[b].retention_score())
            .unwrap_or(Ordering::Equal)
    });
    order.truncate(count);
    order
}

/// Nodes left after dropping the `count` lowest-ranked, in original order
fn ranked_survivors<N: TierNode>(nodes: &[N], count: usize) -> Vec<N> {
    let dropped: HashSet<usize> = lowest_ranked(nodes, count).into_iter().collect();
    nodes
        .iter()
        .enumerate()
        .filter(|(i, _)| !dropped.contains(i))
        .map(|(_, n)| n.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{
        ConceptKind, EpisodeKind, EpisodicNode, FactKind, SemanticNode, VerificationStatus,
        VeridicalNode,
    };
    use crate::storage::InMemoryStore;
    use crate::testing::FlakyStore;

    fn veridical_store(capacity: usize) -> (TierStore<VeridicalNode>, Arc<InMemoryStore>) {
        let backing = Arc::new(InMemoryStore::new());
        let store = TierStore::new(TierSettings::new(capacity, 0.8, 0.10), backing.clone());
        (store, backing)
    }

    fn fact(content: &str, importance: f32) -> VeridicalNode {
        VeridicalNode::new(content, FactKind::Statement).with_importance(importance)
    }

    mod settings {
        use super::*;

        #[test]
        fn test_eviction_batch_rounds_up() {
            assert_eq!(TierSettings::new(100, 0.8, 0.10).eviction_batch(), 10);
            assert_eq!(TierSettings::new(500, 0.7, 0.05).eviction_batch(), 25);
            assert_eq!(TierSettings::new(300, 0.6, 0.07).eviction_batch(), 21);
            assert_eq!(TierSettings::new(15, 0.6, 0.07).eviction_batch(), 2);
        }

        #[test]
        fn test_eviction_batch_at_least_one() {
            assert_eq!(TierSettings::new(3, 0.8, 0.10).eviction_batch(), 1);
            assert_eq!(TierSettings::new(10, 0.8, 0.0).eviction_batch(), 1);
        }
    }

    mod add {
        use super::*;

        #[tokio::test]
        async fn test_add_persists_node() {
            let (store, backing) = veridical_store(10);
            let node = fact("The door is open", 0.5);
            let outcome = store.add(node.clone()).await.unwrap();

            assert_eq!(outcome.id(), node.id());
            assert_eq!(store.len().await, 1);
            assert!(backing.contains(&node.id()));
        }

        #[tokio::test]
        async fn test_full_tier_evicts_lowest_ranked() {
            let (store, backing) = veridical_store(5);
            let weakest = fact("weakest", 0.0);
            store.add(weakest.clone()).await.unwrap();
            for i in 1..5 {
                store.add(fact(&format!("fact {i}"), 0.2 * i as f32)).await.unwrap();
            }

            let incoming = fact("incoming", 0.5);
            let outcome = store.add(incoming.clone()).await.unwrap();

            assert_eq!(
                outcome,
                AddOutcome::Inserted {
                    id: incoming.id(),
                    evicted: vec![weakest.id()],
                }
            );
            assert_eq!(store.len().await, 5);
            assert!(store.get(weakest.id()).await.is_none());
            assert!(!backing.contains(&weakest.id()));
        }

        #[tokio::test]
        async fn test_zero_capacity_is_capacity_exceeded() {
            let (store, _) = veridical_store(0);
            let err = store.add(fact("x", 0.5)).await.unwrap_err();
            assert!(matches!(
                err,
                StrataError::CapacityExceeded {
                    tier: TierKind::Veridical,
                    capacity: 0
                }
            ));
        }

        #[tokio::test]
        async fn test_failed_save_leaves_tier_unchanged() {
            let flaky = Arc::new(FlakyStore::new());
            let store: TierStore<VeridicalNode> =
                TierStore::new(TierSettings::new(10, 0.8, 0.1), flaky.clone());
            flaky.fail_saves(true);

            let err = store.add(fact("x", 0.5)).await.unwrap_err();
            assert!(matches!(err, StrataError::Persistence(_)));
            assert!(store.is_empty().await);
        }

        #[tokio::test]
        async fn test_semantic_duplicate_merges() {
            let backing = Arc::new(InMemoryStore::new());
            let store: TierStore<SemanticNode> = TierStore::new(
                TierSettings::new(10, 0.7, 0.05).with_merge_similarity(0.8),
                backing,
            );
            let first = SemanticNode::new("Paris is the capital of France", ConceptKind::Entity);
            let second = SemanticNode::new("paris is the capital of france", ConceptKind::Entity);

            store.add(first.clone()).await.unwrap();
            let outcome = store.add(second).await.unwrap();

            assert_eq!(outcome, AddOutcome::Merged { into: first.id() });
            assert_eq!(store.len().await, 1);
            assert_eq!(store.get(first.id()).await.unwrap().core.access_count, 1);
        }

        #[tokio::test]
        async fn test_episodic_tier_never_merges() {
            let backing = Arc::new(InMemoryStore::new());
            let store: TierStore<EpisodicNode> =
                TierStore::new(TierSettings::new(10, 0.6, 0.07), backing);
            store
                .add(EpisodicNode::new("same", EpisodeKind::Event))
                .await
                .unwrap();
            store
                .add(EpisodicNode::new("same", EpisodeKind::Event))
                .await
                .unwrap();
            assert_eq!(store.len().await, 2);
        }
    }

    mod remove {
        use super::*;

        #[tokio::test]
        async fn test_remove_detaches_from_persistence() {
            let (store, backing) = veridical_store(10);
            let node = fact("x", 0.5);
            store.add(node.clone()).await.unwrap();

            let removed = store.remove(node.id()).await.unwrap();
            assert_eq!(removed.id(), node.id());
            assert!(store.is_empty().await);
            assert!(!backing.contains(&node.id()));
        }

        #[tokio::test]
        async fn test_remove_unknown_is_not_found() {
            let (store, _) = veridical_store(10);
            let id = uuid::Uuid::new_v4();
            let err = store.remove(id).await.unwrap_err();
            assert!(matches!(err, StrataError::NotFound { id: missing, .. } if missing == id));
        }

        #[tokio::test]
        async fn test_failed_delete_keeps_node() {
            let flaky = Arc::new(FlakyStore::new());
            let store: TierStore<VeridicalNode> =
                TierStore::new(TierSettings::new(10, 0.8, 0.1), flaky.clone());
            let node = fact("x", 0.5);
            store.add(node.clone()).await.unwrap();

            flaky.fail_deletes(true);
            assert!(store.remove(node.id()).await.is_err());
            assert!(store.contains(node.id()).await);
        }
    }

    mod search {
        use super::*;

        #[tokio::test]
        async fn test_empty_tier_returns_empty() {
            let (store, _) = veridical_store(10);
            assert!(store.search("anything", 5).await.is_empty());
        }

        #[tokio::test]
        async fn test_results_ranked_and_accessed() {
            let (store, _) = veridical_store(10);
            store.add(fact("coffee is brewing", 0.5)).await.unwrap();
            store.add(fact("the printer is jammed", 0.5)).await.unwrap();

            let results = store.search_scored("coffee", 5).await;
            assert_eq!(results[0].node.content(), "coffee is brewing");
            assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
            assert!(results.iter().all(|r| r.score > MIN_RELEVANCE && r.score <= 1.0));
            assert_eq!(results[0].node.core.access_count, 1);

            let stored = store.get(results[0].node.id()).await.unwrap();
            assert_eq!(stored.core.access_count, 1);
        }

        #[tokio::test]
        async fn test_limit_respected() {
            let (store, _) = veridical_store(10);
            for i in 0..6 {
                store.add(fact(&format!("note {i}"), 0.9)).await.unwrap();
            }
            assert_eq!(store.search("note", 3).await.len(), 3);
            assert!(store.search("note", 0).await.is_empty());
        }

        #[tokio::test]
        async fn test_deprecated_ranks_below_unverified() {
            let (store, _) = veridical_store(10);
            let plain = fact("the meeting moved to friday", 0.5);
            let deprecated = fact("the meeting moved to friday", 0.5)
                .with_verification(VerificationStatus::Deprecated);
            store.add(deprecated.clone()).await.unwrap();
            store.add(plain.clone()).await.unwrap();

            let results = store.search("meeting friday", 5).await;
            assert_eq!(results[0].id(), plain.id());
        }

        #[tokio::test]
        async fn test_failed_access_save_marks_dirty() {
            let flaky = Arc::new(FlakyStore::new());
            let store: TierStore<VeridicalNode> =
                TierStore::new(TierSettings::new(10, 0.8, 0.1), flaky.clone());
            store.add(fact("coffee", 0.5)).await.unwrap();

            flaky.fail_saves(true);
            let results = store.search("coffee", 5).await;
            assert_eq!(results.len(), 1);
            assert_eq!(store.dirty_count().await, 1);
        }
    }

    mod consolidate {
        use super::*;

        #[tokio::test]
        async fn test_reports_promotion_candidates() {
            let backing = Arc::new(InMemoryStore::new());
            let store: TierStore<VeridicalNode> =
                TierStore::new(TierSettings::new(10, 0.2, 0.1), backing);
            let eligible = fact("verified", 0.9).with_verification(VerificationStatus::Verified);
            store.add(eligible.clone()).await.unwrap();
            store.add(fact("ordinary", 0.3)).await.unwrap();

            let first = store.consolidate().await.unwrap();
            assert_eq!(first.refreshed, 2);
            assert_eq!(first.promoted, 1);
            assert!(first.promotion_candidates.is_empty());

            let second = store.consolidate().await.unwrap();
            assert_eq!(second.promotion_candidates, vec![eligible.id()]);
            let node = store.get(eligible.id()).await.unwrap();
            assert!((node.core.consolidation_score - 0.2).abs() < 1e-6);
        }

        #[tokio::test]
        async fn test_failed_saves_surface_and_recover() {
            let flaky = Arc::new(FlakyStore::new());
            let store: TierStore<VeridicalNode> =
                TierStore::new(TierSettings::new(10, 0.8, 0.1), flaky.clone());
            store.add(fact("a", 0.5)).await.unwrap();

            flaky.fail_saves(true);
            let err = store.consolidate().await.unwrap_err();
            assert!(err.is_retryable());
            assert_eq!(store.dirty_count().await, 1);

            flaky.fail_saves(false);
            let report = store.consolidate().await.unwrap();
            assert_eq!(report.recovered, 1);
            assert_eq!(store.dirty_count().await, 0);
        }
    }

    #[tokio::test]
    async fn test_connect_is_idempotent() {
        let (store, _) = veridical_store(10);
        let node = fact("x", 0.5);
        store.add(node.clone()).await.unwrap();
        let other = uuid::Uuid::new_v4();

        assert!(store.connect(node.id(), other).await.unwrap());
        assert!(!store.connect(node.id(), other).await.unwrap());
        let stored = store.get(node.id()).await.unwrap();
        assert_eq!(stored.core.connections.len(), 1);
        assert_eq!(stored.core.fusion_count, 1);
    }

    #[tokio::test]
    async fn test_drop_connections_persists_changed_nodes() {
        let (store, backing) = veridical_store(10);
        let linked = fact("linked", 0.5);
        let untouched = fact("untouched", 0.5);
        store.add(linked.clone()).await.unwrap();
        store.add(untouched.clone()).await.unwrap();
        let (gone, kept) = (uuid::Uuid::new_v4(), uuid::Uuid::new_v4());
        store.connect(linked.id(), gone).await.unwrap();
        store.connect(linked.id(), kept).await.unwrap();

        let changed = store.drop_connections(&HashSet::from([gone])).await;
        assert_eq!(changed, 1);

        let stored = store.get(linked.id()).await.unwrap();
        assert_eq!(stored.core.connections.iter().collect::<Vec<_>>(), vec![&kept]);
        assert_eq!(stored.core.fusion_count, 1);
        let persisted = backing.get(&linked.id()).unwrap();
        assert!(!persisted.core().connections.contains(&gone));
        assert_eq!(store.drop_connections(&HashSet::from([gone])).await, 0);
    }

    #[tokio::test]
    async fn test_load_skips_other_tiers_and_trims() {
        let backing = Arc::new(InMemoryStore::new());
        for i in 0..4 {
            backing
                .save(&fact(&format!("f{i}"), 0.1 * i as f32).into_stored())
                .await
                .unwrap();
        }
        backing
            .save(&SemanticNode::new("c", ConceptKind::Rule).into_stored())
            .await
            .unwrap();

        let store: TierStore<VeridicalNode> =
            TierStore::new(TierSettings::new(3, 0.8, 0.1), backing.clone());
        assert_eq!(store.load().await.unwrap(), 3);
        assert_eq!(backing.load_all(TierKind::Veridical).await.unwrap().len(), 3);
        assert!(store.nodes().await.iter().all(|n| n.content() != "f0"));
    }
}
