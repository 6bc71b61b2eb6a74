//! Document detail controller.
//!
//! Owns one document's extended view: the document itself plus its access
//! grants. Sharing reloads only the grant list; sign and replace reload the
//! whole view; delete asks for confirmation first and, on success, tells the
//! caller to navigate back to the list.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::ActionError;
use crate::model::{Document, DocumentId, DownloadedFile, FileUpload, FileUser, Grant};
use crate::pending::{PendingGuard, PendingSet};
use crate::preview::Preview;
use crate::service::{DEFAULT_SIGN_COMMENT, DocumentService};
use crate::session::{Navigate, Session};
use crate::status::RowStatus;

/// Prompt shown before a document is deleted.
pub const DELETE_PROMPT: &str = "Are you sure you want to delete this document?";

/// Explicit user confirmation for destructive actions.
pub trait Confirm {
    fn confirm(&self, prompt: &str) -> bool;
}

impl<F: Fn(&str) -> bool> Confirm for F {
    fn confirm(&self, prompt: &str) -> bool {
        self(prompt)
    }
}

/// A document together with its access grants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentDetail {
    pub document: Document,
    pub users: Vec<FileUser>,
}

/// Controller for a single document's detail view.
pub struct DocumentDetailController {
    service: Arc<dyn DocumentService>,
    session: Session,
    current: RwLock<Option<DocumentDetail>>,
    pending: PendingSet,
}

impl DocumentDetailController {
    pub fn new(service: Arc<dyn DocumentService>, session: Session) -> Self {
        Self {
            service,
            session,
            current: RwLock::new(None),
            pending: PendingSet::new(),
        }
    }

    /// Share a pending set with other controllers.
    #[must_use]
    pub fn with_pending(mut self, pending: PendingSet) -> Self {
        self.pending = pending;
        self
    }

    pub fn pending(&self) -> &PendingSet {
        &self.pending
    }

    /// The loaded view, if any.
    pub async fn detail(&self) -> Option<DocumentDetail> {
        self.current.read().await.clone()
    }

    /// Fetch the document and its grants concurrently.
    ///
    /// A failed grant fetch yields an empty grant list. A missing document
    /// clears the view and returns [`ActionError::NotFound`]; the caller
    /// should navigate away (see [`ActionError::navigation`]).
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::NotFound`], the session failure, or the
    /// document fetch failure (the previous view is kept).
    pub async fn load(&self, id: &DocumentId) -> Result<DocumentDetail, ActionError> {
        let token = self.session.token().await?;
        let (document, users) = tokio::join!(
            self.service.get_document(&token, id),
            self.service.list_file_users(&token, id),
        );

        let Some(document) = document? else {
            *self.current.write().await = None;
            return Err(ActionError::NotFound {
                document_id: id.clone(),
            });
        };
        let users = users.unwrap_or_else(|err| {
            warn!(document_id = %id, error = %err, "grant list unavailable");
            Vec::new()
        });

        let detail = DocumentDetail { document, users };
        *self.current.write().await = Some(detail.clone());
        debug!(document_id = %id, grants = detail.users.len(), "document detail loaded");
        Ok(detail)
    }

    /// Grant `email` view and sign access, then reload the grant list.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::Validation`] for a blank email (no request is
    /// made), [`ActionError::NoDocumentLoaded`], [`ActionError::Busy`], or
    /// the service failure.
    pub async fn add_user(&self, email: &str) -> Result<(), ActionError> {
        let email = email.trim();
        if email.is_empty() {
            return Err(ActionError::Validation {
                reason: "email must not be empty".to_owned(),
            });
        }
        let id = self.current_id().await?;
        let _guard = self.acquire(&id)?;
        let token = self.session.token().await?;

        self.service
            .add_file_user(&token, &id, &Grant::view_and_sign(email))
            .await?;
        info!(document_id = %id, "access granted");
        self.reload_users(&token, &id).await;
        Ok(())
    }

    /// Sign the loaded document, then reload the view.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::Unavailable`] if the document is already signed
    /// or rejected, [`ActionError::NoDocumentLoaded`], [`ActionError::Busy`],
    /// or the service failure.
    pub async fn sign(&self) -> Result<(), ActionError> {
        let document = self.current_document().await?;
        if document.is_final() {
            return Err(ActionError::Unavailable {
                action: "sign",
                status: document.status(&[]),
                document_id: document.id,
            });
        }
        let id = document.id;
        let _guard = self.acquire(&id)?;
        let token = self.session.token().await?;

        self.service
            .sign_document(&token, &id, DEFAULT_SIGN_COMMENT)
            .await?;
        info!(document_id = %id, "document signed");
        self.refresh(&id).await;
        Ok(())
    }

    /// Substitute the loaded document's content, then reload the view.
    ///
    /// The signature flag is not touched by the client; the reloaded view
    /// shows whatever the server reports.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::NoDocumentLoaded`], [`ActionError::Busy`], or
    /// the service failure.
    pub async fn replace(&self, upload: &FileUpload) -> Result<(), ActionError> {
        let id = self.current_id().await?;
        let _guard = self.acquire(&id)?;
        let token = self.session.token().await?;

        self.service.replace_document(&token, &id, upload).await?;
        info!(document_id = %id, size = upload.bytes.len(), "document content replaced");
        self.refresh(&id).await;
        Ok(())
    }

    /// Delete the loaded document after explicit confirmation.
    ///
    /// Returns `Ok(None)` if the user declined (no request is made), and
    /// `Ok(Some(Navigate::DocumentList))` once the server deleted it.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::NoDocumentLoaded`], [`ActionError::Busy`], or
    /// the service failure.
    pub async fn delete(&self, confirm: &dyn Confirm) -> Result<Option<Navigate>, ActionError> {
        let id = self.current_id().await?;
        if !confirm.confirm(DELETE_PROMPT) {
            debug!(document_id = %id, "delete cancelled");
            return Ok(None);
        }
        let _guard = self.acquire(&id)?;
        let token = self.session.token().await?;

        self.service.delete_document(&token, &id).await?;
        info!(document_id = %id, "document deleted");
        *self.current.write().await = None;
        Ok(Some(Navigate::DocumentList))
    }

    /// Download the loaded document's content.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::NotFound`] if the server has no content,
    /// [`ActionError::NoDocumentLoaded`], or the service failure.
    pub async fn download(&self) -> Result<DownloadedFile, ActionError> {
        let id = self.current_id().await?;
        let token = self.session.token().await?;
        self.service
            .download_document(&token, &id)
            .await?
            .ok_or(ActionError::NotFound { document_id: id })
    }

    /// Download the loaded document and classify it for display.
    ///
    /// # Errors
    ///
    /// Same as [`download`](Self::download).
    pub async fn view(&self) -> Result<Preview, ActionError> {
        let file = self.download().await?;
        Ok(Preview::classify(&file))
    }

    async fn current_document(&self) -> Result<Document, ActionError> {
        self.current
            .read()
            .await
            .as_ref()
            .map(|d| d.document.clone())
            .ok_or(ActionError::NoDocumentLoaded)
    }

    async fn current_id(&self) -> Result<DocumentId, ActionError> {
        self.current_document().await.map(|d| d.id)
    }

    /// Status of the loaded document, if any.
    pub async fn status(&self) -> Option<RowStatus> {
        self.current
            .read()
            .await
            .as_ref()
            .map(|d| d.document.status(&d.users))
    }

    fn acquire(&self, id: &DocumentId) -> Result<PendingGuard, ActionError> {
        self.pending.try_acquire(id).ok_or_else(|| ActionError::Busy {
            document_id: id.clone(),
        })
    }

    async fn reload_users(&self, token: &str, id: &DocumentId) {
        match self.service.list_file_users(token, id).await {
            Ok(users) => {
                if let Some(detail) = self.current.write().await.as_mut() {
                    detail.users = users;
                }
            }
            Err(err) => warn!(document_id = %id, error = %err, "grant list reload failed"),
        }
    }

    async fn refresh(&self, id: &DocumentId) {
        if let Err(err) = self.load(id).await {
            warn!(document_id = %id, error = %err, "reload after mutation failed");
        }
    }
}
