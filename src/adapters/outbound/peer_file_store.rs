use crate::common::StoreError;
use crate::domains::swarm::{PeerEntry, PeerStore};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

/// Peer list persisted as a pretty-printed JSON array.
///
/// The whole file is rewritten on every save, so a reader never sees a
/// partially merged list.
pub struct JsonFilePeerStore {
    path: PathBuf,
}

impl JsonFilePeerStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn ensure_parent_dir(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PeerStore for JsonFilePeerStore {
    async fn load(&self) -> Result<Vec<PeerEntry>, StoreError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    async fn save(&self, peers: &[PeerEntry]) -> Result<(), StoreError> {
        self.ensure_parent_dir().await?;
        let json = serde_json::to_string_pretty(peers)?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Volatile store for tests and for drones run without a peers file.
#[derive(Default)]
pub struct InMemoryPeerStore {
    peers: RwLock<Vec<PeerEntry>>,
}

impl InMemoryPeerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_peers(peers: Vec<PeerEntry>) -> Self {
        Self {
            peers: RwLock::new(peers),
        }
    }
}

#[async_trait]
impl PeerStore for InMemoryPeerStore {
    async fn load(&self) -> Result<Vec<PeerEntry>, StoreError> {
        Ok(self.peers.read().await.clone())
    }

    async fn save(&self, peers: &[PeerEntry]) -> Result<(), StoreError> {
        *self.peers.write().await = peers.to_vec();
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.peers.write().await.clear();
        Ok(())
    }
}
