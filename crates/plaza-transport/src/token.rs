use std::path::PathBuf;

use async_trait::async_trait;
use plaza_core::{PlazaResult, TokenPair};
use tokio::sync::RwLock;
use tracing::debug;

/// Credential persistence used by the transport.
///
/// A refresh response may omit the refresh token; implementations must
/// keep the previously stored one in that case, so a rotation-free
/// backend does not log the client out.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Current access token, if any.
    async fn access_token(&self) -> Option<String>;
    /// Current refresh token, if any.
    async fn refresh_token(&self) -> Option<String>;
    /// Persists a freshly issued pair.
    async fn store(&self, pair: &TokenPair) -> PlazaResult<()>;
    /// Forgets both credentials.
    async fn clear(&self) -> PlazaResult<()>;
}

/// In-memory store, used by tests and short-lived clients.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    state: RwLock<Slot>,
}

#[derive(Debug, Default)]
struct Slot {
    access: Option<String>,
    refresh: Option<String>,
}

impl MemoryTokenStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn access_token(&self) -> Option<String> {
        self.state.read().await.access.clone()
    }

    async fn refresh_token(&self) -> Option<String> {
        self.state.read().await.refresh.clone()
    }

    async fn store(&self, pair: &TokenPair) -> PlazaResult<()> {
        let mut state = self.state.write().await;
        state.access = Some(pair.access_token.clone());
        if let Some(refresh) = &pair.refresh_token {
            state.refresh = Some(refresh.clone());
        }
        Ok(())
    }

    async fn clear(&self) -> PlazaResult<()> {
        let mut state = self.state.write().await;
        state.access = None;
        state.refresh = None;
        Ok(())
    }
}

/// Store backed by a single JSON file on disk.
///
/// The file holds a serialized [`TokenPair`]; a missing or unreadable
/// file reads as logged out.
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    /// Store writing to `path`, creating parent directories on demand.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    async fn load(&self) -> Option<TokenPair> {
        let data = tokio::fs::read_to_string(&self.path).await.ok()?;
        match serde_json::from_str(&data) {
            Ok(pair) => Some(pair),
            Err(err) => {
                debug!(path = %self.path.display(), error = %err, "ignoring malformed token file");
                None
            }
        }
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn access_token(&self) -> Option<String> {
        self.load().await.map(|pair| pair.access_token)
    }

    async fn refresh_token(&self) -> Option<String> {
        self.load().await.and_then(|pair| pair.refresh_token)
    }

    async fn store(&self, pair: &TokenPair) -> PlazaResult<()> {
        let mut merged = pair.clone();
        if merged.refresh_token.is_none() {
            merged.refresh_token = self.load().await.and_then(|old| old.refresh_token);
        }
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(&merged)?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }

    async fn clear(&self) -> PlazaResult<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
