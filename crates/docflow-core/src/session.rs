//! Session handling: where the bearer token lives and who may read it.
//!
//! A [`Session`] is an explicit object injected into every controller
//! rather than ambient global state. It wraps a pluggable [`SessionStore`]
//! and acts as the session guard: [`Session::token`] fails with
//! [`SessionError::NotAuthenticated`] when nothing is stored, and callers
//! respond by navigating to [`Navigate::Login`].
//!
//! Two stores are provided:
//!
//! - [`MemorySessionStore`]: process-local, for tests and one-shot tokens
//! - [`FileSessionStore`]: a single file holding the token, owner-only on Unix

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::SessionError;
use crate::model::DocumentId;

/// Page-navigation contract between controllers and the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigate {
    Login,
    DocumentList,
    DocumentDetail(DocumentId),
}

/// Persistent storage for a single bearer token.
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync + 'static {
    /// The stored token, if any.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Store`] if the store cannot be read.
    async fn load(&self) -> Result<Option<String>, SessionError>;

    /// Store a token, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Store`] if the store cannot be written.
    async fn save(&self, token: &str) -> Result<(), SessionError>;

    /// Remove the stored token. Clearing an empty store is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Store`] if the store cannot be written.
    async fn clear(&self) -> Result<(), SessionError>;
}

/// In-memory token store.
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    token: Arc<RwLock<Option<String>>>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A store already holding `token`.
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Arc::new(RwLock::new(Some(token.into()))),
        }
    }
}

#[async_trait::async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self) -> Result<Option<String>, SessionError> {
        Ok(self.token.read().await.clone())
    }

    async fn save(&self, token: &str) -> Result<(), SessionError> {
        *self.token.write().await = Some(token.to_owned());
        Ok(())
    }

    async fn clear(&self) -> Result<(), SessionError> {
        *self.token.write().await = None;
        Ok(())
    }
}

/// Token store backed by a single file.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn store_error(&self, err: &std::io::Error) -> SessionError {
        SessionError::Store {
            location: self.path.display().to_string(),
            reason: err.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl SessionStore for FileSessionStore {
    async fn load(&self) -> Result<Option<String>, SessionError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => {
                let token = content.trim();
                Ok((!token.is_empty()).then(|| token.to_owned()))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(self.store_error(&err)),
        }
    }

    async fn save(&self, token: &str) -> Result<(), SessionError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| self.store_error(&e))?;
        }
        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        // Owner-only (0600) on Unix from the moment the file exists.
        #[cfg(unix)]
        options.mode(0o600);
        let mut file = options
            .open(&self.path)
            .await
            .map_err(|e| self.store_error(&e))?;

        // A file left by an earlier run keeps its old mode on open.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(0o600))
                .await
                .map_err(|e| self.store_error(&e))?;
        }

        file.write_all(token.trim().as_bytes())
            .await
            .map_err(|e| self.store_error(&e))?;
        file.flush().await.map_err(|e| self.store_error(&e))?;

        debug!(path = %self.path.display(), "session saved");
        Ok(())
    }

    async fn clear(&self) -> Result<(), SessionError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(self.store_error(&err)),
        }
    }
}

/// The signed-in session, shared by every controller.
#[derive(Clone)]
pub struct Session {
    store: Arc<dyn SessionStore>,
}

impl Session {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    /// A session backed by a fresh in-memory store.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemorySessionStore::new()))
    }

    /// The current bearer token.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotAuthenticated`] if no token is stored.
    pub async fn token(&self) -> Result<String, SessionError> {
        self.store.load().await?.ok_or(SessionError::NotAuthenticated)
    }

    pub async fn is_authenticated(&self) -> bool {
        matches!(self.store.load().await, Ok(Some(_)))
    }

    /// Store the token issued at login or registration.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Store`] if the store cannot be written.
    pub async fn sign_in(&self, token: &str) -> Result<(), SessionError> {
        self.store.save(token).await
    }

    /// Forget the token.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Store`] if the store cannot be written.
    pub async fn sign_out(&self) -> Result<(), SessionError> {
        self.store.clear().await
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session").finish_non_exhaustive()
    }
}
