//! Core node types for the Strata memory engine
//!
//! Defines the shared node shape (`NodeCore`), the tier identifiers, typed
//! cross-tier references and the persisted envelope (`StoredNode`).

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::episodic::EpisodicNode;
use super::fusion::FusionNode;
use super::scoring::clamp_unit;
use super::semantic::SemanticNode;
use super::veridical::VeridicalNode;

/// Globally unique node identifier
pub type NodeId = Uuid;

/// Importance gained by a node every time it is read
pub const ACCESS_IMPORTANCE_BOOST: f32 = 0.02;
/// Strength gained by a node every time it is read
pub const ACCESS_STRENGTH_BOOST: f32 = 0.01;

/// The memory tier a node belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TierKind {
    /// Immediate facts and observations
    Veridical,
    /// Consolidated concepts
    Semantic,
    /// Experiential episodes
    Episodic,
    /// Synthetic nodes linking the other tiers
    Fusion,
}

impl TierKind {
    /// The three base tiers, in fan-out order
    pub const BASE: [TierKind; 3] = [TierKind::Veridical, TierKind::Semantic, TierKind::Episodic];

    pub fn as_str(&self) -> &'static str {
        match self {
            TierKind::Veridical => "veridical",
            TierKind::Semantic => "semantic",
            TierKind::Episodic => "episodic",
            TierKind::Fusion => "fusion",
        }
    }

    pub fn is_base(&self) -> bool {
        !matches!(self, TierKind::Fusion)
    }
}

impl fmt::Display for TierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TierKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "veridical" => Ok(TierKind::Veridical),
            "semantic" => Ok(TierKind::Semantic),
            "episodic" => Ok(TierKind::Episodic),
            "fusion" => Ok(TierKind::Fusion),
            other => Err(format!(
                "Unknown tier: {other}. Use veridical, semantic, episodic, or fusion."
            )),
        }
    }
}

/// A typed reference to a node in a specific tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "tier", content = "id")]
pub enum NodeRef {
    Veridical(NodeId),
    Semantic(NodeId),
    Episodic(NodeId),
    Fusion(NodeId),
}

impl NodeRef {
    pub fn new(tier: TierKind, id: NodeId) -> Self {
        match tier {
            TierKind::Veridical => NodeRef::Veridical(id),
            TierKind::Semantic => NodeRef::Semantic(id),
            TierKind::Episodic => NodeRef::Episodic(id),
            TierKind::Fusion => NodeRef::Fusion(id),
        }
    }

    pub fn tier(&self) -> TierKind {
        match self {
            NodeRef::Veridical(_) => TierKind::Veridical,
            NodeRef::Semantic(_) => TierKind::Semantic,
            NodeRef::Episodic(_) => TierKind::Episodic,
            NodeRef::Fusion(_) => TierKind::Fusion,
        }
    }

    pub fn id(&self) -> NodeId {
        match self {
            NodeRef::Veridical(id)
            | NodeRef::Semantic(id)
            | NodeRef::Episodic(id)
            | NodeRef::Fusion(id) => *id,
        }
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tier(), self.id())
    }
}

impl std::str::FromStr for NodeRef {
    type Err = String;

    /// Parse the `tier:id` form produced by `Display`
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (tier, id) = s
            .split_once(':')
            .ok_or_else(|| format!("Invalid node reference {s:?}, expected tier:id"))?;
        let id = Uuid::parse_str(id).map_err(|e| format!("Invalid node id {id:?}: {e}"))?;
        Ok(NodeRef::new(tier.parse()?, id))
    }
}

/// Fields shared by every node regardless of tier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeCore {
    /// Unique identifier, immutable
    pub id: NodeId,
    /// Free text content; the primary subject of scoring
    pub content: String,
    /// When this node was created
    pub created_at: DateTime<Utc>,
    /// Primary ranking signal, 0.0-1.0
    pub importance: f32,
    /// How many times this node has been read
    pub access_count: u32,
    /// When this node was last read
    pub last_accessed: DateTime<Utc>,
    /// Slower moving "how established" signal, 0.0-1.0
    pub strength: f32,
    /// Ids of related nodes in any tier; may dangle after eviction
    pub connections: BTreeSet<NodeId>,
    /// Number of connections ever added
    pub fusion_count: u32,
    /// Accumulated promotion eligibility from consolidation passes
    pub consolidation_score: f32,
    /// Optional vector embedding supplied by an `Embedder`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl NodeCore {
    pub fn new(content: String, importance: f32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            content,
            created_at: now,
            importance: clamp_unit(importance),
            access_count: 0,
            last_accessed: now,
            strength: 0.5,
            connections: BTreeSet::new(),
            fusion_count: 0,
            consolidation_score: 0.0,
            embedding: None,
        }
    }

    /// Mark this node as read, nudging importance and strength upward
    pub fn record_access(&mut self, now: DateTime<Utc>) {
        self.access_count = self.access_count.saturating_add(1);
        self.last_accessed = now;
        self.set_importance(self.importance + ACCESS_IMPORTANCE_BOOST);
        self.set_strength(self.strength + ACCESS_STRENGTH_BOOST);
    }

    /// Add a connection. Returns false if it was already present.
    pub fn add_connection(&mut self, other: NodeId) -> bool {
        if other == self.id || !self.connections.insert(other) {
            return false;
        }
        self.fusion_count = self.fusion_count.saturating_add(1);
        true
    }

    /// Remove a connection. Returns false if it was absent.
    pub fn remove_connection(&mut self, other: &NodeId) -> bool {
        if !self.connections.remove(other) {
            return false;
        }
        self.fusion_count = self.fusion_count.saturating_sub(1);
        true
    }

    pub fn set_importance(&mut self, importance: f32) {
        self.importance = clamp_unit(importance);
    }

    pub fn set_strength(&mut self, strength: f32) {
        self.strength = clamp_unit(strength);
    }

    pub fn add_consolidation_score(&mut self, delta: f32) {
        self.consolidation_score = clamp_unit(self.consolidation_score + delta);
    }

    /// Fractional days elapsed since creation
    pub fn age_days(&self, now: DateTime<Utc>) -> f32 {
        ((now - self.created_at).num_seconds().max(0) as f32) / 86_400.0
    }
}

/// Behavior shared by the node types of every tier
pub trait MemoryNode: Clone + fmt::Debug + Send + Sync + 'static {
    /// The tier this node type lives in; fixed per type
    const TIER: TierKind;

    fn core(&self) -> &NodeCore;
    fn core_mut(&mut self) -> &mut NodeCore;

    /// Wrap this node in the persisted envelope
    fn into_stored(self) -> StoredNode;
    /// Unwrap a persisted envelope, returning `None` for another tier's node
    fn from_stored(stored: StoredNode) -> Option<Self>;

    fn id(&self) -> NodeId {
        self.core().id
    }

    fn content(&self) -> &str {
        &self.core().content
    }

    fn tier(&self) -> TierKind {
        Self::TIER
    }

    fn node_ref(&self) -> NodeRef {
        NodeRef::new(Self::TIER, self.id())
    }

    /// Record a read. Tiers with access-driven fields extend this.
    fn record_access(&mut self, now: DateTime<Utc>) {
        self.core_mut().record_access(now);
    }
}

/// Persisted envelope for a node of any tier
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "tier", rename_all = "snake_case")]
pub enum StoredNode {
    Veridical(VeridicalNode),
    Semantic(SemanticNode),
    Episodic(EpisodicNode),
    Fusion(FusionNode),
}

impl StoredNode {
    pub fn tier(&self) -> TierKind {
        match self {
            StoredNode::Veridical(_) => TierKind::Veridical,
            StoredNode::Semantic(_) => TierKind::Semantic,
            StoredNode::Episodic(_) => TierKind::Episodic,
            StoredNode::Fusion(_) => TierKind::Fusion,
        }
    }

    pub fn core(&self) -> &NodeCore {
        match self {
            StoredNode::Veridical(n) => n.core(),
            StoredNode::Semantic(n) => n.core(),
            StoredNode::Episodic(n) => n.core(),
            StoredNode::Fusion(n) => n.core(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.core().id
    }
}
