//! Fusion nodes: synthetic nodes linking nodes across tiers

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::scoring::{Query, clamp_unit, content_score, linear_decay};
use super::types::{MemoryNode, NodeCore, NodeId, NodeRef, StoredNode, TierKind};
use crate::tier::TierNode;

pub const NOVELTY_WINDOW_DAYS: f32 = 90.0;
pub const NOVELTY_AGE_FLOOR: f32 = 0.1;
pub const NOVELTY_ACCESS_FLOOR: f32 = 0.3;
const NOVELTY_ACCESS_DECAY: f32 = 0.05;

/// How the fused nodes relate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FusionKind {
    CrossLayer,
    WithinLayer,
    Temporal,
    Causal,
    Analogical,
    Conceptual,
}

/// Validation state of a fusion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ValidationStatus {
    #[default]
    Pending,
    Validated,
    Rejected,
    Uncertain,
}

/// A synthetic node referencing nodes in other tiers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionNode {
    pub core: NodeCore,
    /// Distinct base tiers among the sources
    pub fused_tiers: BTreeSet<TierKind>,
    /// Source references in the order they were given
    pub source_nodes: Vec<NodeRef>,
    pub fusion_kind: FusionKind,
    /// How well the sources hang together, 0.0-1.0
    pub coherence: f32,
    /// How new the link still is, 0.0-1.0
    pub novelty: f32,
    pub validation: ValidationStatus,
}

impl FusionNode {
    pub fn new(
        source_nodes: Vec<NodeRef>,
        fusion_kind: FusionKind,
        content: impl Into<String>,
        importance: f32,
    ) -> Self {
        let fused_tiers = source_nodes
            .iter()
            .map(NodeRef::tier)
            .filter(TierKind::is_base)
            .collect();
        let core = NodeCore::new(content.into(), importance);
        let coherence = core.importance;

        Self {
            core,
            fused_tiers,
            source_nodes,
            fusion_kind,
            coherence,
            novelty: 1.0,
            validation: ValidationStatus::Pending,
        }
    }

    pub fn source_node_ids(&self) -> Vec<NodeId> {
        self.source_nodes.iter().map(NodeRef::id).collect()
    }

    /// True if this fusion was built from exactly the given sources
    pub fn has_sources(&self, sources: &[NodeRef]) -> bool {
        let mine: BTreeSet<&NodeRef> = self.source_nodes.iter().collect();
        let theirs: BTreeSet<&NodeRef> = sources.iter().collect();
        mine == theirs
    }

    /// Apply a validation outcome to coherence and strength
    pub fn apply_validation(&mut self, status: ValidationStatus) {
        match status {
            ValidationStatus::Validated => {
                self.coherence = clamp_unit(self.coherence + 0.2);
                self.core.set_strength(self.core.strength + 0.3);
            }
            ValidationStatus::Rejected => {
                self.coherence = clamp_unit(self.coherence - 0.3);
                self.core.set_strength(self.core.strength - 0.2);
            }
            ValidationStatus::Uncertain => {
                self.coherence = clamp_unit(self.coherence * 0.9);
            }
            ValidationStatus::Pending => return,
        }
        self.validation = status;
    }

    /// Recompute novelty from age and how often the fusion was read
    pub fn update_novelty(&mut self, now: DateTime<Utc>) {
        let age_factor = linear_decay(
            self.core.age_days(now),
            NOVELTY_WINDOW_DAYS,
            NOVELTY_AGE_FLOOR,
        );
        let access_factor = (1.0 - self.core.access_count as f32 * NOVELTY_ACCESS_DECAY)
            .max(NOVELTY_ACCESS_FLOOR);
        self.novelty = clamp_unit(age_factor * access_factor);
    }
}

impl MemoryNode for FusionNode {
    const TIER: TierKind = TierKind::Fusion;

    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut NodeCore {
        &mut self.core
    }

    fn into_stored(self) -> StoredNode {
        StoredNode::Fusion(self)
    }

    fn from_stored(stored: StoredNode) -> Option<Self> {
        match stored {
            StoredNode::Fusion(node) => Some(node),
            _ => None,
        }
    }

    fn record_access(&mut self, now: DateTime<Utc>) {
        self.core.record_access(now);
        self.update_novelty(now);
    }
}

impl TierNode for FusionNode {
    fn relevance(&self, query: &Query, _now: DateTime<Utc>) -> f32 {
        clamp_unit(
            content_score(query, &self.core.content) * 0.7
                + self.coherence * 0.2
                + self.novelty * 0.1,
        )
    }

    fn retention_score(&self) -> f32 {
        self.coherence + self.core.strength
    }

    fn refresh(&mut self, now: DateTime<Utc>) {
        self.update_novelty(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    fn sample() -> FusionNode {
        FusionNode::new(
            vec![
                NodeRef::Veridical(Uuid::new_v4()),
                NodeRef::Semantic(Uuid::new_v4()),
                NodeRef::Semantic(Uuid::new_v4()),
            ],
            FusionKind::CrossLayer,
            "Fusion of: a | b | c",
            0.6,
        )
    }

    #[test]
    fn test_new_fusion_defaults() {
        let node = sample();
        assert_eq!(node.coherence, 0.6);
        assert_eq!(node.novelty, 1.0);
        assert_eq!(node.validation, ValidationStatus::Pending);
        assert_eq!(node.source_nodes.len(), 3);
        assert_eq!(
            node.fused_tiers,
            [TierKind::Veridical, TierKind::Semantic].into_iter().collect()
        );
    }

    #[test]
    fn test_fused_tiers_exclude_fusion_sources() {
        let node = FusionNode::new(
            vec![
                NodeRef::Fusion(Uuid::new_v4()),
                NodeRef::Episodic(Uuid::new_v4()),
            ],
            FusionKind::Temporal,
            "x",
            0.5,
        );
        assert_eq!(node.fused_tiers, [TierKind::Episodic].into_iter().collect());
    }

    mod validation {
        use super::*;

        #[test]
        fn test_validated_raises_coherence_and_strength() {
            let mut node = sample();
            node.apply_validation(ValidationStatus::Validated);
            assert!((node.coherence - 0.8).abs() < 1e-6);
            assert!((node.core.strength - 0.8).abs() < 1e-6);
            assert_eq!(node.validation, ValidationStatus::Validated);
        }

        #[test]
        fn test_rejected_floors_at_zero() {
            let mut node = sample();
            node.coherence = 0.1;
            node.core.strength = 0.1;
            node.apply_validation(ValidationStatus::Rejected);
            assert_eq!(node.coherence, 0.0);
            assert_eq!(node.core.strength, 0.0);
        }

        #[test]
        fn test_uncertain_scales_coherence() {
            let mut node = sample();
            node.apply_validation(ValidationStatus::Uncertain);
            assert!((node.coherence - 0.54).abs() < 1e-6);
        }

        #[test]
        fn test_pending_is_noop() {
            let mut node = sample();
            node.apply_validation(ValidationStatus::Validated);
            let coherence = node.coherence;
            node.apply_validation(ValidationStatus::Pending);
            assert_eq!(node.coherence, coherence);
            assert_eq!(node.validation, ValidationStatus::Validated);
        }
    }

    mod novelty {
        use super::*;

        #[test]
        fn test_novelty_age_floor() {
            let now = Utc::now();
            let mut node = sample();
            node.core.created_at = now - Duration::days(200);
            node.update_novelty(now);
            assert!((node.novelty - 0.1).abs() < 1e-6);
        }

        #[test]
        fn test_novelty_access_floor() {
            let now = Utc::now();
            let mut node = sample();
            node.core.access_count = 100;
            node.update_novelty(now);
            assert!((node.novelty - 0.3).abs() < 1e-3);
        }

        #[test]
        fn test_access_lowers_novelty() {
            let mut node = sample();
            node.record_access(Utc::now());
            assert!(node.novelty < 1.0);
            assert!(node.novelty >= NOVELTY_ACCESS_FLOOR);
        }
    }

    #[test]
    fn test_has_sources_ignores_order() {
        let a = NodeRef::Veridical(Uuid::new_v4());
        let b = NodeRef::Semantic(Uuid::new_v4());
        let node = FusionNode::new(vec![a, b], FusionKind::CrossLayer, "x", 0.5);
        assert!(node.has_sources(&[b, a]));
        assert!(!node.has_sources(&[a]));
    }
}
