//! Rewind object-store retrieval: the async seam to the external client and
//! prefix/key derivation for backup archives.

#![forbid(unsafe_code)]

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use rewind_core::RestoreError;

/// Storage coordinates for one backup location. Credentials themselves are
/// resolved by the external client from the referenced namespace.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObjectStoreConfig {
    pub bucket: String,
    #[serde(default)]
    pub folder: String,
    /// Namespace holding the bucket credential secret.
    #[serde(default)]
    pub credential_secret_namespace: String,
}

/// External object-store client. Authentication and transport live behind
/// this seam; implementations download to local scratch storage and return
/// the path (cleanup is the caller's responsibility).
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Download the first object whose key starts with `prefix`.
    async fn download_with_prefix(&self, bucket: &str, prefix: &str) -> Result<PathBuf>;
}

/// Retrieve the backup archive named `backup_name` and return its local path.
///
/// The lookup key is `folder/backup_name` when a folder is configured,
/// `backup_name` alone otherwise. An empty name fails before any store call.
pub async fn retrieve(
    store: &dyn ObjectStore,
    config: &ObjectStoreConfig,
    backup_name: &str,
) -> Result<PathBuf, RestoreError> {
    if backup_name.is_empty() {
        return Err(RestoreError::Configuration("empty backup name".to_string()));
    }
    let key = if config.folder.is_empty() {
        backup_name.to_string()
    } else {
        format!("{}/{}", config.folder, backup_name)
    };
    info!(bucket = %config.bucket, key = %key, "retrieving backup archive");
    store
        .download_with_prefix(&config.bucket, &key)
        .await
        .map_err(|e| RestoreError::Retrieval { key, source: e.into() })
}

/// Filesystem-backed store for tests and offline use. A bucket maps to a
/// subdirectory under `root`; lookup keeps the prefix-match semantics of
/// bucket listings (lexicographically first object wins).
pub struct LocalDirStore {
    root: PathBuf,
}

impl LocalDirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ObjectStore for LocalDirStore {
    async fn download_with_prefix(&self, bucket: &str, prefix: &str) -> Result<PathBuf> {
        let base = self.root.join(bucket);
        let exact = base.join(prefix);
        if tokio::fs::try_exists(&exact).await.unwrap_or(false) {
            return Ok(exact);
        }
        let (dir, stem) = match prefix.rsplit_once('/') {
            Some((d, s)) => (base.join(d), s.to_string()),
            None => (base.clone(), prefix.to_string()),
        };
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .with_context(|| format!("listing {}", dir.display()))?;
        let mut matches: Vec<PathBuf> = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(&stem) && entry.file_type().await?.is_file() {
                matches.push(entry.path());
            }
        }
        matches.sort();
        matches
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("no object in bucket {} matches prefix {}", bucket, prefix))
    }
}
