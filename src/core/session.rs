use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Where the bearer token lives between runs.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self) -> Result<Option<String>>;
    async fn save(&self, token: &str) -> Result<()>;
    async fn clear(&self) -> Result<()>;
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionFile {
    token: String,
}

// --- File-backed store ---

pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn load(&self) -> Result<Option<String>> {
        if !tokio::fs::try_exists(&self.path).await? {
            return Ok(None);
        }
        let bytes = tokio::fs::read(&self.path)
            .await
            .with_context(|| format!("Failed to read session file {}", self.path.display()))?;
        let file: SessionFile = serde_json::from_slice(&bytes)
            .with_context(|| format!("Corrupt session file {}", self.path.display()))?;
        if file.token.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(file.token))
    }

    async fn save(&self, token: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.with_context(|| {
                    format!("Failed to create session directory {}", parent.display())
                })?;
            }
        }
        let content = serde_json::to_string_pretty(&SessionFile {
            token: token.to_string(),
        })?;
        tokio::fs::write(&self.path, content)
            .await
            .with_context(|| format!("Failed to write session file {}", self.path.display()))?;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        if tokio::fs::try_exists(&self.path).await? {
            tokio::fs::remove_file(&self.path).await?;
        }
        Ok(())
    }
}

// --- In-memory store ---

#[derive(Default)]
pub struct MemorySessionStore {
    token: RwLock<Option<String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self) -> Result<Option<String>> {
        Ok(self.token.read().await.clone())
    }

    async fn save(&self, token: &str) -> Result<()> {
        *self.token.write().await = Some(token.to_string());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        *self.token.write().await = None;
        Ok(())
    }
}

// --- Session handle ---

/// The current login, shared by every service. Holds the token in memory
/// and keeps the backing store in step with it.
pub struct Session {
    token: RwLock<Option<String>>,
    store: Arc<dyn SessionStore>,
}

impl Session {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            token: RwLock::new(None),
            store,
        }
    }

    /// Loads a previously persisted token, if any.
    pub async fn hydrate(&self) -> Result<()> {
        let stored = self.store.load().await?;
        *self.token.write().await = stored;
        Ok(())
    }

    pub async fn token(&self) -> Option<String> {
        self.token.read().await.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.token.read().await.is_some()
    }

    pub async fn set(&self, token: &str) -> Result<()> {
        self.store.save(token).await?;
        *self.token.write().await = Some(token.to_string());
        Ok(())
    }

    pub async fn clear(&self) -> Result<()> {
        self.store.clear().await?;
        *self.token.write().await = None;
        Ok(())
    }

    /// Drops the token after an authentication rejection. Storage failures
    /// are logged rather than raised so the HTTP error stays the headline.
    pub async fn invalidate(&self) {
        *self.token.write().await = None;
        if let Err(err) = self.store.clear().await {
            log::warn!("Failed to clear persisted session: {}", err);
        }
    }
}
