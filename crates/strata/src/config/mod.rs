use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{Result, StrataError};
use crate::system::TierWeights;
use crate::tier::TierSettings;

/// Main configuration structure for Strata
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Persistence configuration
    #[serde(default)]
    pub storage: StorageConfig,
    /// Per-tier capacity and consolidation settings
    #[serde(default)]
    pub tiers: TiersConfig,
    /// Fusion tier configuration
    #[serde(default)]
    pub fusion: FusionConfig,
    /// Background consolidation loop configuration
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
    /// Multi-tier search configuration
    #[serde(default)]
    pub search: SearchConfig,
}

impl Config {
    /// Parse a configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| StrataError::Config(format!("Failed to parse config: {e}")))
    }

    /// Load configuration from an explicit path, or from the first default
    /// location that exists, or fall back to defaults.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = config_path {
            tracing::info!("Loading config from: {}", path.display());
            return Self::read(path);
        }

        let default_paths = [
            dirs::home_dir().map(|h| h.join(".strata").join("config.toml")),
            dirs::config_dir().map(|c| c.join("strata").join("config.toml")),
            Some(PathBuf::from("config.toml")),
        ];

        for path in default_paths.iter().flatten() {
            if path.exists() {
                tracing::info!("Loading config from: {}", path.display());
                return Self::read(path);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Config::default())
    }

    fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            StrataError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml(&content)
    }
}

/// Which persistence backend holds the nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// One JSON document per node under the data directory
    #[default]
    Json,
    /// Process memory only; nothing survives a restart
    Memory,
}

/// Persistence configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Base directory for all storage data
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Persistence backend
    #[serde(default)]
    pub backend: StorageBackend,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            backend: StorageBackend::default(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".strata"))
        .unwrap_or_else(|| PathBuf::from(".strata"))
}

/// Settings for the three base tiers
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TiersConfig {
    #[serde(default)]
    pub veridical: VeridicalTierConfig,
    #[serde(default)]
    pub semantic: SemanticTierConfig,
    #[serde(default)]
    pub episodic: EpisodicTierConfig,
}

/// Veridical tier settings
#[derive(Debug, Clone, Deserialize)]
pub struct VeridicalTierConfig {
    /// Maximum number of nodes held
    #[serde(default = "default_veridical_capacity")]
    pub capacity: usize,
    /// Consolidation score at which a node is reported as a promotion candidate
    #[serde(default = "default_veridical_threshold")]
    pub consolidation_threshold: f32,
    /// Fraction of capacity evicted when the tier is full
    #[serde(default = "default_veridical_eviction")]
    pub eviction_fraction: f32,
}

impl Default for VeridicalTierConfig {
    fn default() -> Self {
        Self {
            capacity: default_veridical_capacity(),
            consolidation_threshold: default_veridical_threshold(),
            eviction_fraction: default_veridical_eviction(),
        }
    }
}

impl From<&VeridicalTierConfig> for TierSettings {
    fn from(config: &VeridicalTierConfig) -> Self {
        TierSettings::new(
            config.capacity,
            config.consolidation_threshold,
            config.eviction_fraction,
        )
    }
}

fn default_veridical_capacity() -> usize {
    100
}

fn default_veridical_threshold() -> f32 {
    0.8
}

fn default_veridical_eviction() -> f32 {
    0.10
}

/// Semantic tier settings
#[derive(Debug, Clone, Deserialize)]
pub struct SemanticTierConfig {
    /// Maximum number of nodes held
    #[serde(default = "default_semantic_capacity")]
    pub capacity: usize,
    /// Consolidation score at which a node is reported as a promotion candidate
    #[serde(default = "default_semantic_threshold")]
    pub consolidation_threshold: f32,
    /// Fraction of capacity evicted when the tier is full
    #[serde(default = "default_semantic_eviction")]
    pub eviction_fraction: f32,
    /// Word-set similarity at which an incoming concept merges into an existing one
    #[serde(default = "default_semantic_merge_similarity")]
    pub merge_similarity: f32,
}

impl Default for SemanticTierConfig {
    fn default() -> Self {
        Self {
            capacity: default_semantic_capacity(),
            consolidation_threshold: default_semantic_threshold(),
            eviction_fraction: default_semantic_eviction(),
            merge_similarity: default_semantic_merge_similarity(),
        }
    }
}

impl From<&SemanticTierConfig> for TierSettings {
    fn from(config: &SemanticTierConfig) -> Self {
        TierSettings::new(
            config.capacity,
            config.consolidation_threshold,
            config.eviction_fraction,
        )
        .with_merge_similarity(config.merge_similarity)
    }
}

fn default_semantic_capacity() -> usize {
    500
}

fn default_semantic_threshold() -> f32 {
    0.7
}

fn default_semantic_eviction() -> f32 {
    0.05
}

fn default_semantic_merge_similarity() -> f32 {
    0.8
}

/// Episodic tier settings
#[derive(Debug, Clone, Deserialize)]
pub struct EpisodicTierConfig {
    /// Maximum number of nodes held
    #[serde(default = "default_episodic_capacity")]
    pub capacity: usize,
    /// Consolidation score at which a node is reported as a promotion candidate
    #[serde(default = "default_episodic_threshold")]
    pub consolidation_threshold: f32,
    /// Fraction of capacity evicted when the tier is full
    #[serde(default = "default_episodic_eviction")]
    pub eviction_fraction: f32,
}

impl Default for EpisodicTierConfig {
    fn default() -> Self {
        Self {
            capacity: default_episodic_capacity(),
            consolidation_threshold: default_episodic_threshold(),
            eviction_fraction: default_episodic_eviction(),
        }
    }
}

impl From<&EpisodicTierConfig> for TierSettings {
    fn from(config: &EpisodicTierConfig) -> Self {
        TierSettings::new(
            config.capacity,
            config.consolidation_threshold,
            config.eviction_fraction,
        )
    }
}

fn default_episodic_capacity() -> usize {
    300
}

fn default_episodic_threshold() -> f32 {
    0.6
}

fn default_episodic_eviction() -> f32 {
    0.07
}

/// Fusion tier configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FusionConfig {
    /// Maximum number of fusion nodes held
    #[serde(default = "default_fusion_max_nodes")]
    pub max_nodes: usize,
    /// Fraction of capacity pruned when the fusion tier is full
    #[serde(default = "default_fusion_prune_fraction")]
    pub prune_fraction: f32,
    /// How many veridical and semantic nodes each fusion scan considers
    #[serde(default = "default_fusion_scan_limit")]
    pub scan_limit: usize,
    /// Content or connection similarity above which two nodes are fused
    #[serde(default = "default_fusion_similarity_threshold")]
    pub similarity_threshold: f32,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            max_nodes: default_fusion_max_nodes(),
            prune_fraction: default_fusion_prune_fraction(),
            scan_limit: default_fusion_scan_limit(),
            similarity_threshold: default_fusion_similarity_threshold(),
        }
    }
}

impl From<&FusionConfig> for TierSettings {
    fn from(config: &FusionConfig) -> Self {
        TierSettings::new(config.max_nodes, 1.0, config.prune_fraction)
    }
}

fn default_fusion_max_nodes() -> usize {
    200
}

fn default_fusion_prune_fraction() -> f32 {
    0.10
}

fn default_fusion_scan_limit() -> usize {
    50
}

fn default_fusion_similarity_threshold() -> f32 {
    0.6
}

/// Background consolidation loop configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MaintenanceConfig {
    /// Run the consolidation loop in the daemon
    #[serde(default = "default_maintenance_enabled")]
    pub enabled: bool,
    /// Seconds between loop ticks, and the staleness that forces consolidation
    #[serde(default = "default_maintenance_interval_secs")]
    pub interval_secs: u64,
    /// Load factor above which a tick consolidates regardless of staleness
    #[serde(default = "default_load_factor_trigger")]
    pub load_factor_trigger: f32,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            enabled: default_maintenance_enabled(),
            interval_secs: default_maintenance_interval_secs(),
            load_factor_trigger: default_load_factor_trigger(),
        }
    }
}

fn default_maintenance_enabled() -> bool {
    true
}

fn default_maintenance_interval_secs() -> u64 {
    300
}

fn default_load_factor_trigger() -> f32 {
    0.8
}

/// Multi-tier search configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    /// Default result budget split across the tiers
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    /// Default tier emphasis for weighted re-ranking
    #[serde(default)]
    pub weights: TierWeights,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
            weights: TierWeights::default(),
        }
    }
}

fn default_max_results() -> usize {
    20
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.storage.backend, StorageBackend::Json);
        assert_eq!(config.tiers.veridical.capacity, 100);
        assert_eq!(config.tiers.veridical.consolidation_threshold, 0.8);
        assert_eq!(config.tiers.semantic.capacity, 500);
        assert_eq!(config.tiers.semantic.consolidation_threshold, 0.7);
        assert_eq!(config.tiers.semantic.merge_similarity, 0.8);
        assert_eq!(config.tiers.episodic.capacity, 300);
        assert_eq!(config.tiers.episodic.consolidation_threshold, 0.6);
        assert_eq!(config.fusion.max_nodes, 200);
        assert_eq!(config.fusion.scan_limit, 50);
        assert!(config.maintenance.enabled);
        assert_eq!(config.maintenance.interval_secs, 300);
        assert_eq!(config.search.max_results, 20);
        assert_eq!(config.search.weights, TierWeights::default());
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_str = r#"
[storage]
data_dir = "/tmp/strata"
backend = "memory"

[tiers.veridical]
capacity = 10
consolidation_threshold = 0.5
eviction_fraction = 0.2

[tiers.semantic]
merge_similarity = 0.9

[fusion]
max_nodes = 40
scan_limit = 5

[maintenance]
enabled = false
interval_secs = 60

[search]
max_results = 12

[search.weights]
veridical = 0.25
semantic = 0.25
episodic = 0.25
fusion = 0.25
"#;

        let config = Config::from_toml(toml_str).expect("Failed to parse TOML");

        assert_eq!(config.storage.data_dir, PathBuf::from("/tmp/strata"));
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.tiers.veridical.capacity, 10);
        assert_eq!(config.tiers.veridical.eviction_fraction, 0.2);
        assert_eq!(config.tiers.semantic.merge_similarity, 0.9);
        assert_eq!(config.fusion.max_nodes, 40);
        assert_eq!(config.fusion.scan_limit, 5);
        assert!(!config.maintenance.enabled);
        assert_eq!(config.maintenance.interval_secs, 60);
        assert_eq!(config.search.max_results, 12);
        assert_eq!(config.search.weights.fusion, 0.25);
    }

    #[test]
    fn test_partial_tier_table_keeps_tier_defaults() {
        let toml_str = r#"
[tiers.semantic]
capacity = 42
"#;

        let config = Config::from_toml(toml_str).expect("Failed to parse partial TOML");

        assert_eq!(config.tiers.semantic.capacity, 42);
        assert_eq!(config.tiers.semantic.consolidation_threshold, 0.7);
        assert_eq!(config.tiers.semantic.eviction_fraction, 0.05);
        assert_eq!(config.tiers.veridical.capacity, 100);
        assert_eq!(config.tiers.episodic.eviction_fraction, 0.07);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = Config::from_toml("[storage\nbackend=").unwrap_err();
        assert!(matches!(err, StrataError::Config(_)));
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let err = Config::from_toml("[storage]\nbackend = \"lance\"").unwrap_err();
        assert!(matches!(err, StrataError::Config(_)));
    }

    #[test]
    fn test_load_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[search]\nmax_results = 7\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.search.max_results, 7);
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(Some(&dir.path().join("missing.toml"))).unwrap_err();
        assert!(matches!(err, StrataError::Config(_)));
    }
}
