//! Artifact storage: where uploads live until a worker reads them.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::StoreError;

/// Resolves artifact references to bytes and stores new artifacts.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store `bytes` under `name` and return the reference workers resolve.
    /// Writing a name that already exists keeps the existing artifact.
    async fn put(&self, name: &str, bytes: &Bytes) -> Result<String, StoreError>;

    /// Load the artifact behind `artifact_ref`.
    async fn get(&self, artifact_ref: &str) -> Result<Bytes, StoreError>;
}

#[async_trait]
impl<T: ArtifactStore + ?Sized> ArtifactStore for Arc<T> {
    async fn put(&self, name: &str, bytes: &Bytes) -> Result<String, StoreError> {
        (**self).put(name, bytes).await
    }

    async fn get(&self, artifact_ref: &str) -> Result<Bytes, StoreError> {
        (**self).get(artifact_ref).await
    }
}

/// References are flat file names: no separators, no parent or hidden entries.
fn validate_ref(artifact_ref: &str) -> Result<(), StoreError> {
    let bad = artifact_ref.is_empty()
        || artifact_ref.starts_with('.')
        || artifact_ref.contains("..")
        || artifact_ref
            .chars()
            .any(|c| c == '/' || c == '\\' || c == '\0');
    if bad {
        return Err(StoreError::InvalidRef(artifact_ref.to_string()));
    }
    Ok(())
}

// ── Local filesystem ──────────────────────────────────────────

/// Stores artifacts as files in a single upload directory.
pub struct LocalArtifactStore {
    root: PathBuf,
}

impl LocalArtifactStore {
    /// Open (creating if needed) the upload directory at `root`.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root).await?;
        info!("Artifacts: local store at {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn put(&self, name: &str, bytes: &Bytes) -> Result<String, StoreError> {
        validate_ref(name)?;
        let path = self.root.join(name);
        if tokio::fs::try_exists(&path).await? {
            debug!(artifact = %name, "artifact already stored");
            return Ok(name.to_string());
        }

        // Write under a temporary name and rename so readers never see a
        // partially written file.
        let tmp = self.root.join(format!(".{}.{}.tmp", name, Uuid::new_v4().simple()));
        tokio::fs::write(&tmp, bytes).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            tokio::fs::remove_file(&tmp).await.ok();
            return Err(e.into());
        }
        debug!(artifact = %name, size = bytes.len(), "artifact stored");
        Ok(name.to_string())
    }

    async fn get(&self, artifact_ref: &str) -> Result<Bytes, StoreError> {
        validate_ref(artifact_ref)?;
        match tokio::fs::read(self.root.join(artifact_ref)).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::ArtifactNotFound(artifact_ref.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

// ── In-memory ─────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryArtifactStore {
    artifacts: RwLock<HashMap<String, Bytes>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.artifacts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.artifacts.read().await.is_empty()
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn put(&self, name: &str, bytes: &Bytes) -> Result<String, StoreError> {
        validate_ref(name)?;
        self.artifacts
            .write()
            .await
            .entry(name.to_string())
            .or_insert_with(|| bytes.clone());
        Ok(name.to_string())
    }

    async fn get(&self, artifact_ref: &str) -> Result<Bytes, StoreError> {
        validate_ref(artifact_ref)?;
        self.artifacts
            .read()
            .await
            .get(artifact_ref)
            .cloned()
            .ok_or_else(|| StoreError::ArtifactNotFound(artifact_ref.to_string()))
    }
}
