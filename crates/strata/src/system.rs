//! Memory orchestrator
//!
//! `MemorySystem` composes the three base tiers and the fusion tier into one
//! addressable system: routed inserts, four-way concurrent search, fusion
//! creation and discovery, consolidation and health reporting.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::config::{Config, FusionConfig, MaintenanceConfig, SearchConfig};
use crate::error::{Result, StrataError};
use crate::fusion::{CreatedFusion, FusionStore};
use crate::memory::{
    EpisodicNode, FusionKind, FusionNode, MemoryNode, NodeId, NodeRef, SemanticNode, StoredNode,
    TierKind, ValidationStatus, VerificationStatus, VeridicalNode, jaccard_similarity,
    shared_connection_ratio,
};
use crate::provider::{Embedder, Summarizer};
use crate::storage::NodeStore;
use crate::tier::{ConsolidationReport, ScoredNode, TierNode, TierSettings, TierStore};

/// Characters of each source's content quoted in generated fusion content
const FUSION_EXCERPT_CHARS: usize = 30;

/// Relative emphasis of each tier when merging multi-tier results
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierWeights {
    #[serde(default = "default_veridical_weight")]
    pub veridical: f32,
    #[serde(default = "default_semantic_weight")]
    pub semantic: f32,
    #[serde(default = "default_episodic_weight")]
    pub episodic: f32,
    #[serde(default = "default_fusion_weight")]
    pub fusion: f32,
}

impl Default for TierWeights {
    fn default() -> Self {
        Self {
            veridical: default_veridical_weight(),
            semantic: default_semantic_weight(),
            episodic: default_episodic_weight(),
            fusion: default_fusion_weight(),
        }
    }
}

impl TierWeights {
    pub fn weight(&self, tier: TierKind) -> f32 {
        match tier {
            TierKind::Veridical => self.veridical,
            TierKind::Semantic => self.semantic,
            TierKind::Episodic => self.episodic,
            TierKind::Fusion => self.fusion,
        }
    }
}

fn default_veridical_weight() -> f32 {
    0.2
}

fn default_semantic_weight() -> f32 {
    0.4
}

fn default_episodic_weight() -> f32 {
    0.3
}

fn default_fusion_weight() -> f32 {
    0.1
}

/// One entry of a merged multi-tier ranking
#[derive(Debug, Clone, Serialize)]
pub struct RankedHit {
    pub node: NodeRef,
    pub content: String,
    /// Tier-local relevance
    pub score: f32,
    /// Relevance scaled by the tier weight
    pub weighted_score: f32,
}

/// Results of a search across every tier
#[derive(Debug, Clone, Serialize)]
pub struct MultiTierResult {
    pub query: String,
    pub veridical: Vec<ScoredNode<VeridicalNode>>,
    pub semantic: Vec<ScoredNode<SemanticNode>>,
    pub episodic: Vec<ScoredNode<EpisodicNode>>,
    pub fusion: Vec<ScoredNode<FusionNode>>,
    pub weights: TierWeights,
    /// Wall-clock time spent searching
    pub processing_time: Duration,
}

impl MultiTierResult {
    pub fn total_results(&self) -> usize {
        self.veridical.len() + self.semantic.len() + self.episodic.len() + self.fusion.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total_results() == 0
    }

    /// Every result in one list, ranked by tier-weighted relevance
    pub fn merged(&self) -> Vec<RankedHit> {
        let mut hits = Vec::with_capacity(self.total_results());
        hits.extend(self.veridical.iter().map(|r| self.hit(r)));
        hits.extend(self.semantic.iter().map(|r| self.hit(r)));
        hits.extend(self.episodic.iter().map(|r| self.hit(r)));
        hits.extend(self.fusion.iter().map(|r| self.hit(r)));

        hits.sort_by(|a, b| {
            b.weighted_score
                .partial_cmp(&a.weighted_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits
    }

    fn hit<N: MemoryNode>(&self, result: &ScoredNode<N>) -> RankedHit {
        RankedHit {
            node: result.node.node_ref(),
            content: result.node.content().to_string(),
            score: result.score,
            weighted_score: result.score * self.weights.weight(N::TIER),
        }
    }
}

/// Point-in-time load and usage figures
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemMetrics {
    pub veridical_nodes: usize,
    pub semantic_nodes: usize,
    pub episodic_nodes: usize,
    pub fusion_nodes: usize,
    pub total_nodes: usize,
    pub total_capacity: usize,
    /// Base-tier nodes read at least once
    pub active_nodes: usize,
    /// Total nodes over total capacity across all four tiers
    pub load_factor: f32,
    /// Active over total base-tier nodes (fusion excluded)
    pub memory_efficiency: f32,
    /// Nodes whose latest state has not been persisted
    pub dirty_nodes: usize,
}

impl SystemMetrics {
    pub fn is_healthy(&self) -> bool {
        self.load_factor < 0.9 && self.memory_efficiency > 0.3
    }
}

/// Health report returned by `MemorySystem::get_system_status`
#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    pub metrics: SystemMetrics,
    pub is_healthy: bool,
    pub recommended_actions: Vec<String>,
    pub last_consolidation_at: Option<DateTime<Utc>>,
    pub consolidation_count: u64,
    pub is_consolidating: bool,
    /// Error of the most recent consolidation, cleared by a successful one
    pub last_error: Option<String>,
}

/// Outcome of one full consolidation pass
#[derive(Debug, Clone, Serialize)]
pub struct ConsolidationSummary {
    /// Veridical, semantic, episodic and fusion reports, in pass order
    pub reports: Vec<ConsolidationReport>,
    pub fusions_created: Vec<NodeId>,
    pub metrics: SystemMetrics,
    pub duration: Duration,
}

#[derive(Debug, Default)]
struct ConsolidationState {
    last_consolidation_at: Option<DateTime<Utc>>,
    /// Runtime clock reading at the start of the last successful pass
    last_pass_started: Option<tokio::time::Instant>,
    consolidation_count: u64,
    last_error: Option<String>,
}

/// Clears the consolidation flag however the pass ends
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// The tiered memory engine
pub struct MemorySystem {
    veridical: TierStore<VeridicalNode>,
    semantic: TierStore<SemanticNode>,
    episodic: TierStore<EpisodicNode>,
    fusion: FusionStore,
    fusion_config: FusionConfig,
    maintenance_config: MaintenanceConfig,
    search_config: SearchConfig,
    embedder: Option<Arc<dyn Embedder>>,
    summarizer: Option<Arc<dyn Summarizer>>,
    consolidating: AtomicBool,
    consolidation: RwLock<ConsolidationState>,
}

impl MemorySystem {
    /// Build the tiers over `store` without loading anything
    pub fn new(config: &Config, store: Arc<dyn NodeStore>) -> Self {
        Self {
            veridical: TierStore::new((&config.tiers.veridical).into(), store.clone()),
            semantic: TierStore::new((&config.tiers.semantic).into(), store.clone()),
            episodic: TierStore::new((&config.tiers.episodic).into(), store.clone()),
            fusion: FusionStore::new(TierSettings::from(&config.fusion), store),
            fusion_config: config.fusion.clone(),
            maintenance_config: config.maintenance.clone(),
            search_config: config.search.clone(),
            embedder: None,
            summarizer: None,
            consolidating: AtomicBool::new(false),
            consolidation: RwLock::new(ConsolidationState::default()),
        }
    }

    /// Build the tiers and load every persisted node before accepting writes
    pub async fn open(config: &Config, store: Arc<dyn NodeStore>) -> Result<Self> {
        let system = Self::new(config, store);
        let (veridical, semantic, episodic, fusion) = futures::try_join!(
            system.veridical.load(),
            system.semantic.load(),
            system.episodic.load(),
            system.fusion.load(),
        )?;
        info!(
            "Memory system ready: {} veridical, {} semantic, {} episodic, {} fusion",
            veridical, semantic, episodic, fusion
        );
        Ok(system)
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        info!("Using {} embedder", embedder.name());
        self.embedder = Some(embedder);
        self
    }

    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        info!("Using {} summarizer", summarizer.name());
        self.summarizer = Some(summarizer);
        self
    }

    pub fn veridical(&self) -> &TierStore<VeridicalNode> {
        &self.veridical
    }

    pub fn semantic(&self) -> &TierStore<SemanticNode> {
        &self.semantic
    }

    pub fn episodic(&self) -> &TierStore<EpisodicNode> {
        &self.episodic
    }

    pub fn fusion(&self) -> &FusionStore {
        &self.fusion
    }

    pub fn maintenance_config(&self) -> &MaintenanceConfig {
        &self.maintenance_config
    }

    pub async fn add_veridical(&self, node: VeridicalNode) -> Result<NodeId> {
        self.insert(&self.veridical, node).await
    }

    /// Add a concept; a near-duplicate merges into the existing node, whose
    /// id is returned
    pub async fn add_semantic(&self, node: SemanticNode) -> Result<NodeId> {
        self.insert(&self.semantic, node).await
    }

    pub async fn add_episodic(&self, node: EpisodicNode) -> Result<NodeId> {
        self.insert(&self.episodic, node).await
    }

    async fn insert<N: TierNode>(&self, tier: &TierStore<N>, mut node: N) -> Result<NodeId> {
        if let Some(embedder) = &self.embedder {
            match embedder.embed(node.content()).await {
                Ok(embedding) => node.core_mut().embedding = Some(embedding),
                Err(e) => warn!("Storing {} node without embedding: {}", N::TIER, e),
            }
        }
        Ok(tier.add(node).await?.id())
    }

    /// Record a verification outcome on a veridical node
    pub async fn verify(&self, id: NodeId, status: VerificationStatus) -> Result<()> {
        self.veridical
            .update(id, |node| node.apply_verification(status))
            .await
    }

    /// Attach supporting evidence to a concept. Returns false if already known.
    pub async fn add_evidence(&self, id: NodeId, evidence: NodeId) -> Result<bool> {
        self.semantic
            .update(id, |node| node.add_evidence(evidence))
            .await
    }

    /// Attach a contradicting node to a concept. Returns false if already known.
    pub async fn add_contradiction(&self, id: NodeId, contradiction: NodeId) -> Result<bool> {
        self.semantic
            .update(id, |node| node.add_contradiction(contradiction))
            .await
    }

    pub async fn validate_fusion(&self, id: NodeId, status: ValidationStatus) -> Result<()> {
        self.fusion.validate(id, status).await.map(|_| ())
    }

    /// Copy of any node by reference
    pub async fn get(&self, node: NodeRef) -> Option<StoredNode> {
        match node {
            NodeRef::Veridical(id) => self.veridical.get(id).await.map(MemoryNode::into_stored),
            NodeRef::Semantic(id) => self.semantic.get(id).await.map(MemoryNode::into_stored),
            NodeRef::Episodic(id) => self.episodic.get(id).await.map(MemoryNode::into_stored),
            NodeRef::Fusion(id) => self.fusion.get(id).await.map(MemoryNode::into_stored),
        }
    }

    /// Remove a node from its tier and from persistence.
    ///
    /// Connections other nodes hold to it are left dangling.
    pub async fn remove(&self, node: NodeRef) -> Result<()> {
        match node {
            NodeRef::Veridical(id) => self.veridical.remove(id).await.map(|_| ()),
            NodeRef::Semantic(id) => self.semantic.remove(id).await.map(|_| ()),
            NodeRef::Episodic(id) => self.episodic.remove(id).await.map(|_| ()),
            NodeRef::Fusion(id) => self.fusion.remove(id).await.map(|_| ()),
        }
    }

    /// Search every tier concurrently.
    ///
    /// Each base tier gets `max_results / 3` results and the fusion tier
    /// `max_results / 4`; the sub-budgets are independent.
    pub async fn search(
        &self,
        query: &str,
        weights: Option<TierWeights>,
        max_results: Option<usize>,
    ) -> MultiTierResult {
        let started = Instant::now();
        let max_results = max_results.unwrap_or(self.search_config.max_results);
        let weights = weights.unwrap_or(self.search_config.weights);
        let tier_limit = max_results / 3;
        let fusion_limit = max_results / 4;

        let (veridical, semantic, episodic, fusion) = tokio::join!(
            self.veridical.search_scored(query, tier_limit),
            self.semantic.search_scored(query, tier_limit),
            self.episodic.search_scored(query, tier_limit),
            self.fusion.search_fusion(query, fusion_limit),
        );

        let result = MultiTierResult {
            query: query.to_string(),
            veridical,
            semantic,
            episodic,
            fusion,
            weights,
            processing_time: started.elapsed(),
        };
        debug!(
            "Search for {:?} returned {} results in {:?}",
            query,
            result.total_results(),
            result.processing_time
        );
        result
    }

    /// Fuse existing nodes and connect each source back to the fusion.
    ///
    /// Importance is the mean importance of the sources.
    pub async fn create_fusion(
        &self,
        sources: Vec<NodeRef>,
        kind: FusionKind,
        content: impl Into<String>,
    ) -> Result<NodeId> {
        let mut importances = Vec::with_capacity(sources.len());
        for source in &sources {
            let node = self.get(*source).await.ok_or_else(|| {
                StrataError::InvalidFusionInput(format!("source node {source} does not exist"))
            })?;
            importances.push(node.core().importance);
        }
        let importance = mean(&importances);

        let created = self
            .fusion
            .create_fusion(sources, kind, content, importance)
            .await?;
        Ok(self.link_fusion(created).await)
    }

    /// Connect a new fusion's sources to it and drop every tier's
    /// connections to the fusions pruned to make room for it
    async fn link_fusion(&self, created: CreatedFusion) -> NodeId {
        self.connect_sources(&created.node).await;
        if !created.pruned.is_empty() {
            let gone: HashSet<NodeId> = created.pruned.into_iter().collect();
            let (veridical, semantic, episodic, fusion) = tokio::join!(
                self.veridical.drop_connections(&gone),
                self.semantic.drop_connections(&gone),
                self.episodic.drop_connections(&gone),
                self.fusion.drop_connections(&gone),
            );
            debug!(
                "Dropped connections to {} pruned fusions from {} nodes",
                gone.len(),
                veridical + semantic + episodic + fusion
            );
        }
        created.node.id()
    }

    async fn connect_sources(&self, fusion: &FusionNode) {
        let fusion_id = fusion.id();
        for source in &fusion.source_nodes {
            let connected = match *source {
                NodeRef::Veridical(id) => self.veridical.connect(id, fusion_id).await,
                NodeRef::Semantic(id) => self.semantic.connect(id, fusion_id).await,
                NodeRef::Episodic(id) => self.episodic.connect(id, fusion_id).await,
                NodeRef::Fusion(id) => self.fusion.connect(id, fusion_id).await,
            };
            if let Err(e) = connected {
                warn!("Failed to connect {} to fusion {}: {}", source, fusion_id, e);
            }
        }
    }

    /// Scan the leading veridical and semantic nodes for pairs worth fusing
    /// and fuse them. Returns the ids of the fusions created.
    pub async fn identify_fusion_opportunities(&self) -> Result<Vec<NodeId>> {
        let limit = self.fusion_config.scan_limit;
        let facts = self.veridical.first(limit).await;
        let concepts = self.semantic.first(limit).await;

        let mut created = Vec::new();
        for fact in &facts {
            for concept in &concepts {
                if !self.should_fuse(fact, concept) {
                    continue;
                }
                let sources = vec![fact.node_ref(), concept.node_ref()];
                if self.fusion.has_fusion_for(&sources).await {
                    continue;
                }

                let content = self.fusion_content(&[fact.content(), concept.content()]).await;
                let importance = mean(&[fact.core.importance, concept.core.importance]);
                let fusion = self
                    .fusion
                    .create_fusion(sources, FusionKind::CrossLayer, content, importance)
                    .await?;
                created.push(self.link_fusion(fusion).await);
            }
        }

        if !created.is_empty() {
            info!("Created {} fusions from consolidation scan", created.len());
        }
        Ok(created)
    }

    /// True when two nodes are similar in content or share enough connections
    pub fn should_fuse(&self, fact: &VeridicalNode, concept: &SemanticNode) -> bool {
        let threshold = self.fusion_config.similarity_threshold;
        jaccard_similarity(fact.content(), concept.content()) > threshold
            || shared_connection_ratio(&fact.core.connections, &concept.core.connections)
                > threshold
    }

    async fn fusion_content(&self, contents: &[&str]) -> String {
        if let Some(summarizer) = &self.summarizer {
            match summarizer.summarize(contents).await {
                Ok(summary) => return summary,
                Err(e) => warn!("Summarizer failed, using excerpt fusion content: {}", e),
            }
        }
        excerpt_fusion_content(contents)
    }

    pub fn is_consolidating(&self) -> bool {
        self.consolidating.load(Ordering::Acquire)
    }

    /// True if consolidation has never run, is due, or load is high.
    ///
    /// A pass is due once a full interval has elapsed since the last
    /// successful pass started, measured on the tokio clock that drives the
    /// maintenance loop.
    pub async fn should_consolidate(&self) -> bool {
        let last = self.consolidation.read().await.last_pass_started;
        let Some(last) = last else {
            return true;
        };

        let interval = Duration::from_secs(self.maintenance_config.interval_secs);
        if last.elapsed() >= interval {
            return true;
        }
        self.metrics().await.load_factor > self.maintenance_config.load_factor_trigger
    }

    /// Consolidate every tier, then look for fusions.
    ///
    /// Returns `Ok(None)` without doing anything if a pass is already in
    /// flight. A failed pass is recorded in the system status and returned.
    pub async fn perform_consolidation(&self) -> Result<Option<ConsolidationSummary>> {
        if self
            .consolidating
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Consolidation already in progress, skipping");
            return Ok(None);
        }
        let _running = RunningGuard(&self.consolidating);

        let started = Instant::now();
        let pass_started = tokio::time::Instant::now();
        info!("Starting consolidation");

        match self.consolidate_all(started).await {
            Ok(summary) => {
                let mut state = self.consolidation.write().await;
                state.last_consolidation_at = Some(Utc::now());
                state.last_pass_started = Some(pass_started);
                state.consolidation_count += 1;
                state.last_error = None;
                info!(
                    "Consolidation finished in {:?}: {} fusions created, load {:.2}",
                    summary.duration,
                    summary.fusions_created.len(),
                    summary.metrics.load_factor
                );
                Ok(Some(summary))
            }
            Err(e) => {
                error!("Consolidation failed: {}", e);
                self.consolidation.write().await.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Alias of `perform_consolidation` for callers triggering a pass by hand
    pub async fn run_consolidation(&self) -> Result<Option<ConsolidationSummary>> {
        self.perform_consolidation().await
    }

    async fn consolidate_all(&self, started: Instant) -> Result<ConsolidationSummary> {
        let reports = vec![
            self.veridical.consolidate().await?,
            self.semantic.consolidate().await?,
            self.episodic.consolidate().await?,
            self.fusion.refresh().await?,
        ];
        let fusions_created = self.identify_fusion_opportunities().await?;
        let metrics = self.metrics().await;

        Ok(ConsolidationSummary {
            reports,
            fusions_created,
            metrics,
            duration: started.elapsed(),
        })
    }

    pub async fn metrics(&self) -> SystemMetrics {
        let veridical_nodes = self.veridical.len().await;
        let semantic_nodes = self.semantic.len().await;
        let episodic_nodes = self.episodic.len().await;
        let fusion_nodes = self.fusion.len().await;

        let active_nodes = self.veridical.active_count().await
            + self.semantic.active_count().await
            + self.episodic.active_count().await;
        let dirty_nodes = self.veridical.dirty_count().await
            + self.semantic.dirty_count().await
            + self.episodic.dirty_count().await
            + self.fusion.dirty_count().await;

        let base_nodes = veridical_nodes + semantic_nodes + episodic_nodes;
        let total_nodes = base_nodes + fusion_nodes;
        let total_capacity = self.veridical.capacity()
            + self.semantic.capacity()
            + self.episodic.capacity()
            + self.fusion.capacity();

        SystemMetrics {
            veridical_nodes,
            semantic_nodes,
            episodic_nodes,
            fusion_nodes,
            total_nodes,
            total_capacity,
            active_nodes,
            load_factor: ratio(total_nodes, total_capacity, 0.0),
            memory_efficiency: ratio(active_nodes, base_nodes, 1.0),
            dirty_nodes,
        }
    }

    pub async fn get_system_status(&self) -> SystemStatus {
        let metrics = self.metrics().await;
        let state = self.consolidation.read().await;

        let mut recommended_actions = Vec::new();
        if metrics.load_factor > self.maintenance_config.load_factor_trigger {
            recommended_actions.push(format!(
                "Load factor is {:.0}%; run consolidation to free capacity",
                metrics.load_factor * 100.0
            ));
        }
        if metrics.memory_efficiency <= 0.3 {
            recommended_actions.push(
                "Most memories have never been recalled; consider removing unused nodes"
                    .to_string(),
            );
        }
        if metrics.dirty_nodes > 0 {
            recommended_actions.push(format!(
                "{} nodes have unsaved changes; check the storage backend",
                metrics.dirty_nodes
            ));
        }
        if let Some(error) = &state.last_error {
            recommended_actions.push(format!(
                "Last consolidation failed ({error}); it will be retried"
            ));
        }
        if state.last_consolidation_at.is_none() && metrics.total_nodes > 0 {
            recommended_actions.push("Consolidation has not run yet".to_string());
        }

        SystemStatus {
            is_healthy: metrics.is_healthy(),
            metrics,
            recommended_actions,
            last_consolidation_at: state.last_consolidation_at,
            consolidation_count: state.consolidation_count,
            is_consolidating: self.is_consolidating(),
            last_error: state.last_error.clone(),
        }
    }
}

/// `"Fusion of: "` followed by the first characters of each content
pub fn excerpt_fusion_content(contents: &[&str]) -> String {
    let excerpts: Vec<String> = contents
        .iter()
        .map(|content| content.chars().take(FUSION_EXCERPT_CHARS).collect())
        .collect();
    format!("Fusion of: {}", excerpts.join(" | "))
}

fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f32>() / values.len() as f32
}

fn ratio(part: usize, whole: usize, empty: f32) -> f32 {
    if whole == 0 {
        empty
    } else {
        part as f32 / whole as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{ConceptKind, EpisodeKind, FactKind};
    use crate::storage::InMemoryStore;
    use crate::testing::{FlakyStore, MockEmbedder, MockSummarizer};

    fn system() -> MemorySystem {
        MemorySystem::new(&Config::default(), Arc::new(InMemoryStore::new()))
    }

    #[test]
    fn test_excerpt_fusion_content() {
        let long = "a".repeat(40);
        assert_eq!(
            excerpt_fusion_content(&[&long, "short"]),
            format!("Fusion of: {} | short", "a".repeat(30))
        );
    }

    #[test]
    fn test_excerpt_counts_chars_not_bytes() {
        let content = "é".repeat(35);
        let fused = excerpt_fusion_content(&[&content, "x"]);
        assert_eq!(fused, format!("Fusion of: {} | x", "é".repeat(30)));
    }

    #[test]
    fn test_default_weights() {
        let weights = TierWeights::default();
        assert_eq!(weights.weight(TierKind::Semantic), 0.4);
        assert_eq!(weights.weight(TierKind::Fusion), 0.1);
    }

    mod search {
        use super::*;

        #[tokio::test]
        async fn test_empty_system_search() {
            let result = system().search("anything", None, None).await;
            assert!(result.is_empty());
            assert!(result.merged().is_empty());
        }

        #[tokio::test]
        async fn test_per_tier_budgets() {
            let system = system();
            for i in 0..10 {
                system
                    .add_veridical(VeridicalNode::new(format!("tea note {i}"), FactKind::Statement))
                    .await
                    .unwrap();
                system
                    .add_episodic(EpisodicNode::new(format!("tea time {i}"), EpisodeKind::Event))
                    .await
                    .unwrap();
            }

            let result = system.search("tea", None, Some(9)).await;
            assert_eq!(result.veridical.len(), 3);
            assert_eq!(result.episodic.len(), 3);
            assert!(result.fusion.len() <= 2);
        }

        #[tokio::test]
        async fn test_merged_applies_weights() {
            let system = system();
            system
                .add_veridical(VeridicalNode::new("rust ownership", FactKind::Statement))
                .await
                .unwrap();
            system
                .add_semantic(SemanticNode::new("rust ownership", ConceptKind::Principle))
                .await
                .unwrap();

            let weights = TierWeights {
                veridical: 1.0,
                semantic: 0.0,
                episodic: 0.0,
                fusion: 0.0,
            };
            let result = system.search("rust ownership", Some(weights), Some(6)).await;
            let merged = result.merged();
            assert_eq!(merged.len(), 2);
            assert_eq!(merged[0].node.tier(), TierKind::Veridical);
            assert_eq!(merged[1].weighted_score, 0.0);
        }
    }

    mod fusion {
        use super::*;

        #[tokio::test]
        async fn test_create_fusion_connects_sources() {
            let system = system();
            let fact = system
                .add_veridical(VeridicalNode::new("fact", FactKind::Statement).with_importance(0.4))
                .await
                .unwrap();
            let concept = system
                .add_semantic(SemanticNode::new("concept", ConceptKind::Entity).with_importance(0.8))
                .await
                .unwrap();

            let fusion_id = system
                .create_fusion(
                    vec![NodeRef::Veridical(fact), NodeRef::Semantic(concept)],
                    FusionKind::Causal,
                    "fact causes concept",
                )
                .await
                .unwrap();

            let fact = system.veridical().get(fact).await.unwrap();
            assert!(fact.core.connections.contains(&fusion_id));
            let fusion = system.fusion().get(fusion_id).await.unwrap();
            assert!((fusion.coherence - 0.6).abs() < 1e-6);
        }

        #[tokio::test]
        async fn test_unknown_source_rejected() {
            let system = system();
            let fact = system
                .add_veridical(VeridicalNode::new("fact", FactKind::Statement))
                .await
                .unwrap();

            let err = system
                .create_fusion(
                    vec![NodeRef::Veridical(fact), NodeRef::Semantic(uuid::Uuid::new_v4())],
                    FusionKind::Causal,
                    "x",
                )
                .await
                .unwrap_err();
            assert!(matches!(err, StrataError::InvalidFusionInput(_)));
            assert!(system.fusion().is_empty().await);
        }

        #[tokio::test]
        async fn test_summarizer_used_for_discovered_fusions() {
            let system = system().with_summarizer(Arc::new(MockSummarizer::new()));
            system
                .add_veridical(VeridicalNode::new("the cat sat on the mat", FactKind::Observation))
                .await
                .unwrap();
            system
                .add_semantic(SemanticNode::new("the cat sat on the mat", ConceptKind::Entity))
                .await
                .unwrap();

            let created = system.identify_fusion_opportunities().await.unwrap();
            assert_eq!(created.len(), 1);
            let fusion = system.fusion().get(created[0]).await.unwrap();
            assert!(fusion.core.content.starts_with("Summary: "));
        }

        #[tokio::test]
        async fn test_failing_summarizer_falls_back() {
            let system = system().with_summarizer(Arc::new(MockSummarizer::failing()));
            system
                .add_veridical(VeridicalNode::new("bread needs yeast", FactKind::Statement))
                .await
                .unwrap();
            system
                .add_semantic(SemanticNode::new("bread needs yeast", ConceptKind::Rule))
                .await
                .unwrap();

            let created = system.identify_fusion_opportunities().await.unwrap();
            let fusion = system.fusion().get(created[0]).await.unwrap();
            assert_eq!(
                fusion.core.content,
                "Fusion of: bread needs yeast | bread needs yeast"
            );
        }
    }

    mod embedding {
        use super::*;

        #[tokio::test]
        async fn test_embedder_annotates_nodes() {
            let system = system().with_embedder(Arc::new(MockEmbedder::new()));
            let id = system
                .add_veridical(VeridicalNode::new("fact", FactKind::Statement))
                .await
                .unwrap();
            let node = system.veridical().get(id).await.unwrap();
            assert_eq!(node.core.embedding, Some(MockEmbedder::vector("fact")));
        }

        #[tokio::test]
        async fn test_embedder_failure_still_stores() {
            let system = system().with_embedder(Arc::new(MockEmbedder::failing()));
            let id = system
                .add_veridical(VeridicalNode::new("fact", FactKind::Statement))
                .await
                .unwrap();
            let node = system.veridical().get(id).await.unwrap();
            assert!(node.core.embedding.is_none());
        }
    }

    mod status {
        use super::*;

        #[tokio::test]
        async fn test_empty_system_is_healthy() {
            let status = system().get_system_status().await;
            assert_eq!(status.metrics.total_nodes, 0);
            assert_eq!(status.metrics.total_capacity, 1100);
            assert!(status.is_healthy);
            assert!(status.recommended_actions.is_empty());
        }

        #[tokio::test]
        async fn test_unread_nodes_lower_efficiency() {
            let system = system();
            system
                .add_veridical(VeridicalNode::new("never read", FactKind::Statement))
                .await
                .unwrap();
            let status = system.get_system_status().await;
            assert_eq!(status.metrics.memory_efficiency, 0.0);
            assert!(!status.is_healthy);
            assert!(!status.recommended_actions.is_empty());
        }

        #[tokio::test]
        async fn test_failed_consolidation_recorded() {
            let flaky = Arc::new(FlakyStore::new());
            let system = MemorySystem::new(&Config::default(), flaky.clone());
            system
                .add_veridical(VeridicalNode::new("fact", FactKind::Statement))
                .await
                .unwrap();

            flaky.fail_saves(true);
            assert!(system.perform_consolidation().await.is_err());
            assert!(!system.is_consolidating());

            let status = system.get_system_status().await;
            assert!(status.last_error.is_some());
            assert_eq!(status.consolidation_count, 0);
            assert!(status.last_consolidation_at.is_none());
            assert!(system.should_consolidate().await);
        }
    }

    #[tokio::test]
    async fn test_verify_and_evidence() {
        let system = system();
        let fact = system
            .add_veridical(VeridicalNode::new("fact", FactKind::Statement))
            .await
            .unwrap();
        system.verify(fact, VerificationStatus::Verified).await.unwrap();
        let node = system.veridical().get(fact).await.unwrap();
        assert_eq!(node.verification, VerificationStatus::Verified);
        assert!((node.core.importance - 0.6).abs() < 1e-6);

        let concept = system
            .add_semantic(SemanticNode::new("concept", ConceptKind::Entity))
            .await
            .unwrap();
        assert!(system.add_evidence(concept, fact).await.unwrap());
        assert!(!system.add_evidence(concept, fact).await.unwrap());
        assert!(system.add_contradiction(concept, uuid::Uuid::new_v4()).await.unwrap());
    }

    #[tokio::test]
    async fn test_remove_by_ref() {
        let system = system();
        let id = system
            .add_episodic(EpisodicNode::new("walk", EpisodeKind::Experience))
            .await
            .unwrap();
        system.remove(NodeRef::Episodic(id)).await.unwrap();
        assert!(system.get(NodeRef::Episodic(id)).await.is_none());

        let err = system.remove(NodeRef::Episodic(id)).await.unwrap_err();
        assert!(matches!(err, StrataError::NotFound { tier: TierKind::Episodic, .. }));
    }
}
