use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, warn};

use super::NodeStore;
use crate::error::{Result, StrataError};
use crate::memory::types::{NodeId, NodeRef, StoredNode, TierKind};

/// One JSON document per node, laid out as `<root>/<tier>/<id>.json`
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    /// Open a store rooted at `root`, creating the tier directories
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        for tier in TierKind::BASE.iter().chain([&TierKind::Fusion]) {
            let dir = root.join(tier.as_str());
            fs::create_dir_all(&dir).await.map_err(|e| {
                StrataError::Persistence(format!(
                    "Failed to create {}: {}",
                    dir.display(),
                    e
                ))
            })?;
        }
        debug!("Opened JSON node store at {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn tier_dir(&self, tier: TierKind) -> PathBuf {
        self.root.join(tier.as_str())
    }

    fn node_path(&self, tier: TierKind, id: NodeId) -> PathBuf {
        self.tier_dir(tier).join(format!("{id}.json"))
    }
}

#[async_trait]
impl NodeStore for JsonFileStore {
    async fn save(&self, node: &StoredNode) -> Result<()> {
        let path = self.node_path(node.tier(), node.id());
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(node)?;

        fs::write(&tmp, body).await.map_err(|e| {
            StrataError::Persistence(format!("Failed to write {}: {}", tmp.display(), e))
        })?;
        fs::rename(&tmp, &path).await.map_err(|e| {
            StrataError::Persistence(format!("Failed to replace {}: {}", path.display(), e))
        })?;
        Ok(())
    }

    async fn delete(&self, node: NodeRef) -> Result<()> {
        let path = self.node_path(node.tier(), node.id());
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StrataError::Persistence(format!(
                "Failed to delete {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn load_all(&self, tier: TierKind) -> Result<Vec<StoredNode>> {
        let dir = self.tier_dir(tier);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StrataError::Persistence(format!(
                    "Failed to read {}: {}",
                    dir.display(),
                    e
                )));
            }
        };

        let mut nodes = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }

            let body = fs::read(&path).await?;
            match serde_json::from_slice::<StoredNode>(&body) {
                Ok(node) => nodes.push(node),
                Err(e) => warn!("Skipping unreadable node file {}: {}", path.display(), e),
            }
        }

        Ok(nodes)
    }

    fn name(&self) -> &'static str {
        "json"
    }
}
