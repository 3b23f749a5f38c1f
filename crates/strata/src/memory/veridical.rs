//! Veridical nodes: immediate facts whose immediacy fades over a month

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::scoring::{Query, clamp_unit, content_score, linear_decay};
use super::types::{MemoryNode, NodeCore, StoredNode, TierKind};
use crate::tier::TierNode;

/// Days over which immediacy decays linearly to zero
pub const IMMEDIACY_WINDOW_DAYS: f32 = 30.0;

/// What kind of fact a veridical node records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FactKind {
    Observation,
    Statement,
    Measurement,
    Event,
    Condition,
}

/// Verification state of a fact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VerificationStatus {
    #[default]
    Unverified,
    Verified,
    Conflicted,
    Deprecated,
}

/// An immediate fact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VeridicalNode {
    pub core: NodeCore,
    pub fact_kind: FactKind,
    pub verification: VerificationStatus,
    /// How fresh the fact is, 0.0-1.0
    pub immediacy: f32,
}

impl VeridicalNode {
    pub fn new(content: impl Into<String>, fact_kind: FactKind) -> Self {
        Self {
            core: NodeCore::new(content.into(), 0.5),
            fact_kind,
            verification: VerificationStatus::Unverified,
            immediacy: 1.0,
        }
    }

    pub fn with_importance(mut self, importance: f32) -> Self {
        self.core.set_importance(importance);
        self
    }

    pub fn with_verification(mut self, status: VerificationStatus) -> Self {
        self.verification = status;
        self
    }

    /// Recompute immediacy from age
    pub fn update_immediacy(&mut self, now: DateTime<Utc>) {
        self.immediacy = clamp_unit(linear_decay(
            self.core.age_days(now),
            IMMEDIACY_WINDOW_DAYS,
            0.0,
        ));
    }

    /// Apply a verification outcome. Verification strengthens a fact,
    /// conflicts and deprecation weaken it.
    pub fn apply_verification(&mut self, status: VerificationStatus) {
        self.verification = status;
        match status {
            VerificationStatus::Verified => {
                self.core.set_strength(self.core.strength + 0.1);
                self.core.set_importance(self.core.importance + 0.1);
            }
            VerificationStatus::Conflicted => {
                self.core.set_strength(self.core.strength - 0.1);
            }
            VerificationStatus::Deprecated => {
                self.core.set_strength(self.core.strength - 0.2);
            }
            VerificationStatus::Unverified => {}
        }
    }
}

impl MemoryNode for VeridicalNode {
    const TIER: TierKind = TierKind::Veridical;

    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut NodeCore {
        &mut self.core
    }

    fn into_stored(self) -> StoredNode {
        StoredNode::Veridical(self)
    }

    fn from_stored(stored: StoredNode) -> Option<Self> {
        match stored {
            StoredNode::Veridical(node) => Some(node),
            _ => None,
        }
    }
}

impl TierNode for VeridicalNode {
    fn relevance(&self, query: &Query, _now: DateTime<Utc>) -> f32 {
        let mut score = content_score(query, &self.core.content) * 0.4
            + self.immediacy * 0.15
            + self.core.importance * 0.2
            + self.core.strength * 0.1;

        match self.verification {
            VerificationStatus::Verified => score += 0.1,
            VerificationStatus::Conflicted => score *= 0.7,
            VerificationStatus::Deprecated => score *= 0.3,
            VerificationStatus::Unverified => {}
        }

        clamp_unit(score)
    }

    fn retention_score(&self) -> f32 {
        self.core.importance + self.immediacy + self.core.strength
    }

    fn refresh(&mut self, now: DateTime<Utc>) {
        self.update_immediacy(now);
    }

    fn is_promotion_eligible(&self) -> bool {
        (self.core.importance > 0.8 && self.verification == VerificationStatus::Verified)
            || (self.core.access_count > 5 && self.core.connections.len() > 2)
    }
}
