//! Episodic nodes: experiences with participants, place and feeling

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::scoring::{Query, clamp_unit, content_score, linear_decay};
use super::types::{MemoryNode, NodeCore, StoredNode, TierKind};
use crate::tier::TierNode;

/// Vividness never decays below this fraction per pass
pub const VIVIDNESS_DECAY_FLOOR: f32 = 0.5;
pub const VIVIDNESS_WINDOW_DAYS: f32 = 365.0;
/// Vividness gained on every read
pub const VIVIDNESS_REINFORCEMENT: f32 = 0.05;
pub const RECENCY_WINDOW_DAYS: f32 = 30.0;

/// What kind of episode was experienced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EpisodeKind {
    Interaction,
    Event,
    Experience,
    Conversation,
    Observation,
    Decision,
}

/// An experienced episode
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodicNode {
    pub core: NodeCore,
    pub episode_kind: EpisodeKind,
    pub participants: BTreeSet<String>,
    pub location: Option<String>,
    /// -1.0 (negative) to 1.0 (positive)
    pub emotional_valence: f32,
    /// How clearly the episode is remembered, 0.0-1.0
    pub vividness: f32,
    /// Free-form cues (time of day, mood, topic) that help recall
    #[serde(default)]
    pub contextual_cues: Vec<String>,
}

impl EpisodicNode {
    pub fn new(content: impl Into<String>, episode_kind: EpisodeKind) -> Self {
        Self {
            core: NodeCore::new(content.into(), 0.5),
            episode_kind,
            participants: BTreeSet::new(),
            location: None,
            emotional_valence: 0.0,
            vividness: 1.0,
            contextual_cues: Vec::new(),
        }
    }

    pub fn with_importance(mut self, importance: f32) -> Self {
        self.core.set_importance(importance);
        self
    }

    pub fn with_participants<I, S>(mut self, participants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.participants
            .extend(participants.into_iter().map(Into::into));
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_emotional_valence(mut self, valence: f32) -> Self {
        self.set_emotional_valence(valence);
        self
    }

    pub fn with_cues<I, S>(mut self, cues: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.contextual_cues.extend(cues.into_iter().map(Into::into));
        self
    }

    pub fn set_emotional_valence(&mut self, valence: f32) {
        self.emotional_valence = if valence.is_nan() {
            0.0
        } else {
            valence.clamp(-1.0, 1.0)
        };
    }

    /// Decay vividness by age, or reinforce it after a read
    pub fn update_vividness(&mut self, decay: bool, now: DateTime<Utc>) {
        let vividness = if decay {
            self.vividness
                * linear_decay(
                    self.core.age_days(now),
                    VIVIDNESS_WINDOW_DAYS,
                    VIVIDNESS_DECAY_FLOOR,
                )
        } else {
            self.vividness + VIVIDNESS_REINFORCEMENT
        };
        self.vividness = clamp_unit(vividness);
    }
}

impl MemoryNode for EpisodicNode {
    const TIER: TierKind = TierKind::Episodic;

    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut NodeCore {
        &mut self.core
    }

    fn into_stored(self) -> StoredNode {
        StoredNode::Episodic(self)
    }

    fn from_stored(stored: StoredNode) -> Option<Self> {
        match stored {
            StoredNode::Episodic(node) => Some(node),
            _ => None,
        }
    }

    fn record_access(&mut self, now: DateTime<Utc>) {
        self.core.record_access(now);
        self.update_vividness(false, now);
    }
}

impl TierNode for EpisodicNode {
    fn relevance(&self, query: &Query, now: DateTime<Utc>) -> f32 {
        let cue_match = query.match_fraction(&self.contextual_cues) * 0.1;
        let participant_match = query.match_fraction(&self.participants) * 0.1;
        let location_match = match &self.location {
            Some(location) if query.mentions(location) => 0.05,
            _ => 0.0,
        };
        let recency = linear_decay(self.core.age_days(now), RECENCY_WINDOW_DAYS, 0.0) * 0.1;

        clamp_unit(
            content_score(query, &self.core.content) * 0.3
                + cue_match
                + participant_match
                + location_match
                + self.vividness * 0.1
                + self.emotional_valence.abs() * 0.05
                + recency
                + self.core.importance * 0.1
                + self.core.strength * 0.1,
        )
    }

    fn retention_score(&self) -> f32 {
        self.vividness
    }

    fn refresh(&mut self, now: DateTime<Utc>) {
        self.update_vividness(true, now);
    }

    fn is_promotion_eligible(&self) -> bool {
        (self.vividness > 0.6 && self.emotional_valence.abs() > 0.5)
            || (self.core.connections.len() > 3 && self.core.access_count > 3)
    }

    fn promotion_increment(&self) -> f32 {
        0.15
    }
}
