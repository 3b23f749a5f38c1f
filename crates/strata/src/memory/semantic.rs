//! Semantic nodes: consolidated concepts backed by evidence
//!
//! Semantic nodes do not decay. They grow more abstract through
//! generalization once they are frequently read and well supported, and
//! near-duplicates are merged on insert rather than stored twice.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::scoring::{Query, clamp_unit, content_score, jaccard_similarity};
use super::types::{MemoryNode, NodeCore, NodeId, StoredNode, TierKind};
use crate::tier::TierNode;

pub const MAX_ABSTRACTION_LEVEL: u8 = 10;
pub const MAX_GENERALIZATIONS: u32 = 5;

const EVIDENCE_CONFIDENCE: f32 = 0.05;
const CONTRADICTION_PENALTY: f32 = 0.1;

/// What kind of concept a semantic node holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConceptKind {
    Entity,
    Relationship,
    Category,
    Attribute,
    Process,
    Rule,
    Principle,
}

/// A consolidated concept
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticNode {
    pub core: NodeCore,
    pub concept_kind: ConceptKind,
    /// 0 for concrete concepts, up to `MAX_ABSTRACTION_LEVEL`
    pub abstraction_level: u8,
    pub evidence_node_ids: BTreeSet<NodeId>,
    pub contradiction_node_ids: BTreeSet<NodeId>,
    /// Belief in this concept, 0.0-1.0
    pub confidence: f32,
    /// How many times this concept has been generalized
    pub generalization_count: u32,
}

impl SemanticNode {
    pub fn new(content: impl Into<String>, concept_kind: ConceptKind) -> Self {
        let core = NodeCore::new(content.into(), 0.5);
        let confidence = core.importance;
        Self {
            core,
            concept_kind,
            abstraction_level: 0,
            evidence_node_ids: BTreeSet::new(),
            contradiction_node_ids: BTreeSet::new(),
            confidence,
            generalization_count: 0,
        }
    }

    pub fn with_importance(mut self, importance: f32) -> Self {
        self.core.set_importance(importance);
        self.recompute_confidence();
        self
    }

    pub fn with_evidence(mut self, evidence: impl IntoIterator<Item = NodeId>) -> Self {
        self.evidence_node_ids.extend(evidence);
        self.recompute_confidence();
        self
    }

    pub fn with_abstraction_level(mut self, level: u8) -> Self {
        self.abstraction_level = level.min(MAX_ABSTRACTION_LEVEL);
        self
    }

    /// Derive confidence from importance, supporting evidence and contradictions
    pub fn recompute_confidence(&mut self) {
        self.confidence = clamp_unit(
            self.core.importance + self.evidence_node_ids.len() as f32 * EVIDENCE_CONFIDENCE
                - self.contradiction_node_ids.len() as f32 * CONTRADICTION_PENALTY,
        );
    }

    /// Record supporting evidence. Returns false if already known.
    pub fn add_evidence(&mut self, node_id: NodeId) -> bool {
        if !self.evidence_node_ids.insert(node_id) {
            return false;
        }
        self.confidence = clamp_unit(self.confidence + EVIDENCE_CONFIDENCE);
        true
    }

    /// Record a contradicting node. Returns false if already known.
    pub fn add_contradiction(&mut self, node_id: NodeId) -> bool {
        if !self.contradiction_node_ids.insert(node_id) {
            return false;
        }
        self.confidence = clamp_unit(self.confidence - CONTRADICTION_PENALTY);
        true
    }

    pub fn can_generalize(&self) -> bool {
        self.core.access_count > 10
            && self.confidence > 0.7
            && self.generalization_count < MAX_GENERALIZATIONS
    }

    /// Raise the abstraction level one step and reinforce strength
    pub fn generalize(&mut self) {
        self.abstraction_level = (self.abstraction_level + 1).min(MAX_ABSTRACTION_LEVEL);
        self.generalization_count += 1;
        self.core.set_strength(self.core.strength + 0.1);
    }
}

impl MemoryNode for SemanticNode {
    const TIER: TierKind = TierKind::Semantic;

    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut NodeCore {
        &mut self.core
    }

    fn into_stored(self) -> StoredNode {
        StoredNode::Semantic(self)
    }

    fn from_stored(stored: StoredNode) -> Option<Self> {
        match stored {
            StoredNode::Semantic(node) => Some(node),
            _ => None,
        }
    }
}

impl TierNode for SemanticNode {
    fn relevance(&self, query: &Query, _now: DateTime<Utc>) -> f32 {
        let abstraction_bonus =
            self.abstraction_level as f32 / MAX_ABSTRACTION_LEVEL as f32 * 0.1;
        let evidence_bonus = (self.evidence_node_ids.len() as f32 / 5.0).min(1.0) * 0.1;

        clamp_unit(
            content_score(query, &self.core.content) * 0.35
                + abstraction_bonus
                + evidence_bonus
                + self.confidence * 0.15
                + self.core.importance * 0.15
                + self.core.strength * 0.15,
        )
    }

    fn retention_score(&self) -> f32 {
        self.confidence + self.core.strength
    }

    fn promote(&mut self) -> bool {
        if self.can_generalize() {
            self.generalize();
            true
        } else {
            false
        }
    }

    fn is_duplicate_of(&self, other: &Self, threshold: f32) -> bool {
        self.concept_kind == other.concept_kind
            && jaccard_similarity(&self.core.content, &other.core.content) >= threshold
    }

    fn absorb(&mut self, other: Self, now: DateTime<Utc>) {
        self.evidence_node_ids.extend(other.evidence_node_ids);
        self.contradiction_node_ids
            .extend(other.contradiction_node_ids);
        self.confidence = clamp_unit((self.confidence + other.confidence) / 2.0);
        for id in other.core.connections {
            self.core.add_connection(id);
        }
        self.record_access(now);
    }
}
