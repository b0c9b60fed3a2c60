//! Storage for login/password-hash pairs.
//!
//! Stores know nothing about hashing or about the registration order; the
//! [`crate::sequencer::AuthSequencer`] drives them.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::info;

use crate::error::StoreError;

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Returns the stored password hash for `login`, if any.
    async fn lookup(&self, login: &str) -> Result<Option<String>, StoreError>;

    /// Stores `hash` for `login`, replacing any previous entry.
    async fn insert(&self, login: &str, hash: &str) -> Result<(), StoreError>;
}

/// Credentials that live as long as the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn lookup(&self, login: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.read().await.get(login).cloned())
    }

    async fn insert(&self, login: &str, hash: &str) -> Result<(), StoreError> {
        self.entries
            .write()
            .await
            .insert(login.to_string(), hash.to_string());
        Ok(())
    }
}

/// Credentials persisted as a JSON object `{ login: hash }`.
///
/// The whole file is rewritten on every insert, through a temporary sibling
/// that is renamed into place.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: RwLock<HashMap<String, String>>,
}

impl FileStore {
    /// Loads `path`, starting empty if the file does not exist yet.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let entries: HashMap<String, String> = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(err) => return Err(err.into()),
        };
        info!(path = %path.display(), logins = entries.len(), "loaded credentials");

        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CredentialStore for FileStore {
    async fn lookup(&self, login: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.read().await.get(login).cloned())
    }

    async fn insert(&self, login: &str, hash: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        let mut next = entries.clone();
        next.insert(login.to_string(), hash.to_string());

        let encoded = serde_json::to_vec_pretty(&next)?;
        let staging = self.path.with_extension("tmp");
        tokio::fs::write(&staging, encoded).await?;
        tokio::fs::rename(&staging, &self.path).await?;

        *entries = next;
        Ok(())
    }
}
