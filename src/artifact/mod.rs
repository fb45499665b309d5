//! Durable artifact storage for payout tree JSON.
//!
//! Published trees (root, leaves, per-recipient proofs) are written to blob
//! storage and referenced by URL from the settlement record, so claim
//! front-ends can fetch proofs without hitting the engine.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::EngineError;

/// Write-once blob storage for settlement artifacts.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Stores a JSON document under `key` and returns its URL.
    async fn put_json(&self, key: &str, value: &serde_json::Value)
    -> Result<String, EngineError>;
}

/// Filesystem-backed artifact store. The returned URL is a `file://` path;
/// deployments front this directory with a static file server or swap in a
/// bucket-backed implementation.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    /// Creates a store rooted at the given directory.
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn put_json(
        &self,
        key: &str,
        value: &serde_json::Value,
    ) -> Result<String, EngineError> {
        let path = self.root.join(format!("{key}.json"));
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| EngineError::ArtifactError(e.to_string()))?;
        }
        let bytes = serde_json::to_vec_pretty(value)
            .map_err(|e| EngineError::ArtifactError(e.to_string()))?;
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| EngineError::ArtifactError(e.to_string()))?;
        Ok(format!("file://{}", path.display()))
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_json_and_returns_url() {
        let dir = tempfile::tempdir().ok();
        let Some(dir) = dir else {
            panic!("tempdir failed");
        };
        let store = FsArtifactStore::new(dir.path().to_path_buf());
        let url = store
            .put_json("trees/season-1", &serde_json::json!({"root": "0xabc"}))
            .await;
        let Ok(url) = url else {
            panic!("put_json failed");
        };
        assert!(url.starts_with("file://"));
        assert!(url.ends_with("trees/season-1.json"));

        let path = dir.path().join("trees/season-1.json");
        let written = std::fs::read_to_string(path).ok();
        let Some(written) = written else {
            panic!("artifact missing");
        };
        assert!(written.contains("0xabc"));
    }
}
