//! Object storage for source documents and output artifacts.
//!
//! The pipeline only needs bucket/key addressed blobs: `fetch` for the uploaded
//! document, `put` for the artifact (overwrite semantics), and `list` for the
//! completeness audit. Two backends are provided:
//! - [`LocalObjectStore`]: one directory per bucket under a root directory
//! - [`MemoryObjectStore`]: in-process map, for tests and dry runs

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::StoreError;

/// Where a document lives: bucket (container) plus key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    pub bucket: String,
    pub key: String,
}

impl SourceLocation {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Last path segment of the key (`cvs/valid/cv_7.pdf` -> `cv_7.pdf`).
    pub fn file_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

/// Bucket/key addressed blob storage.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Read the full object.
    async fn fetch(&self, bucket: &str, key: &str) -> Result<Bytes, StoreError>;

    /// Write the object, replacing any existing object under the same key.
    async fn put(&self, bucket: &str, key: &str, body: Bytes) -> Result<(), StoreError>;

    /// List keys in a bucket that start with `prefix`, sorted.
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StoreError>;
}

/// Reject keys that would escape the bucket directory.
fn validate_key(key: &str) -> Result<(), StoreError> {
    if key.is_empty() || key.starts_with('/') || key.contains('\\') {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    if key
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

fn validate_bucket(bucket: &str) -> Result<(), StoreError> {
    if bucket.is_empty() || bucket.contains('/') || bucket.contains('\\') || bucket == ".." {
        return Err(StoreError::InvalidKey(format!("bucket '{}'", bucket)));
    }
    Ok(())
}

/// Directory-backed store: `{root}/{bucket}/{key}`.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StoreError> {
        validate_bucket(bucket)?;
        validate_key(key)?;
        let mut path = self.root.join(bucket);
        for segment in key.split('/') {
            path.push(segment);
        }
        Ok(path)
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn fetch(&self, bucket: &str, key: &str) -> Result<Bytes, StoreError> {
        let path = self.object_path(bucket, key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StoreError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, bucket: &str, key: &str, body: Bytes) -> Result<(), StoreError> {
        let path = self.object_path(bucket, key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &body).await?;
        tracing::debug!(bucket, key, bytes = body.len(), "Stored object");
        Ok(())
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StoreError> {
        validate_bucket(bucket)?;
        let bucket_dir = self.root.join(bucket);
        if !tokio::fs::try_exists(&bucket_dir).await? {
            return Ok(Vec::new());
        }

        let mut keys = Vec::new();
        let mut pending = vec![(bucket_dir, String::new())];
        while let Some((dir, key_prefix)) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name().to_string_lossy().to_string();
                let key = format!("{}{}", key_prefix, name);
                if entry.file_type().await?.is_dir() {
                    pending.push((entry.path(), format!("{}/", key)));
                } else if key.starts_with(prefix) {
                    keys.push(key);
                }
            }
        }

        keys.sort();
        Ok(keys)
    }
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<(String, String), Bytes>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read an object without going through the trait (no error on miss).
    pub async fn get(&self, bucket: &str, key: &str) -> Option<Bytes> {
        let objects = self.objects.read().await;
        objects.get(&(bucket.to_string(), key.to_string())).cloned()
    }

    /// Number of objects across all buckets.
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn fetch(&self, bucket: &str, key: &str) -> Result<Bytes, StoreError> {
        self.get(bucket, key).await.ok_or_else(|| StoreError::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }

    async fn put(&self, bucket: &str, key: &str, body: Bytes) -> Result<(), StoreError> {
        validate_key(key)?;
        let mut objects = self.objects.write().await;
        objects.insert((bucket.to_string(), key.to_string()), body);
        Ok(())
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StoreError> {
        let objects = self.objects.read().await;
        let mut keys: Vec<String> = objects
            .keys()
            .filter(|(b, k)| b == bucket && k.starts_with(prefix))
            .map(|(_, k)| k.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}
