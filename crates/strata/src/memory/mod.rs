//! Memory node model
//!
//! Defines the node shapes for the three base tiers (veridical, semantic,
//! episodic), the synthetic fusion tier, and the scoring helpers they share.

pub mod episodic;
pub mod fusion;
pub mod scoring;
pub mod semantic;
pub mod types;
pub mod veridical;

pub use episodic::{EpisodeKind, EpisodicNode};
pub use fusion::{FusionKind, FusionNode, ValidationStatus};
pub use scoring::{Query, content_score, jaccard_similarity, shared_connection_ratio};
pub use semantic::{ConceptKind, SemanticNode};
pub use types::{MemoryNode, NodeCore, NodeId, NodeRef, StoredNode, TierKind};
pub use veridical::{FactKind, VerificationStatus, VeridicalNode};
