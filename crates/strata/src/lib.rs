//! Strata - tiered, score-driven memory engine
//!
//! Holds remembered content at three levels of abstraction (veridical
//! facts, semantic concepts, episodic experiences) plus a synthetic fusion
//! tier linking them, and keeps every tier bounded through scoring,
//! consolidation and eviction.

pub mod config;
pub mod error;
pub mod fusion;
pub mod maintenance;
pub mod memory;
pub mod provider;
pub mod storage;
pub mod system;
pub mod testing;
pub mod tier;

pub use error::{Result, StrataError};
pub use fusion::FusionStore;
pub use maintenance::MaintenanceHandle;
pub use system::{MemorySystem, MultiTierResult, SystemMetrics, SystemStatus, TierWeights};
pub use tier::{TierNode, TierSettings, TierStore};
