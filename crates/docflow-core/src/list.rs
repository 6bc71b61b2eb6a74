//! Document list controller.
//!
//! Owns the snapshot of every document visible to the signed-in user and
//! maps upload/send/sign/reject intents to service calls. Each row moves
//! `idle → pending(action) → idle`; the pending set refuses a second action
//! on a row whose first one has not answered yet.
//!
//! The server's document carries no recipient. A row counts as sent once
//! its grant list holds a sign-capable user, so `load` fetches the grants of
//! every row that is not final alongside the list.
//!
//! After a successful mutation the whole list is fetched again. A failed
//! reload is logged and leaves the previous snapshot in place; it does not
//! turn a completed mutation into an error.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::{ActionError, ServiceError};
use crate::model::{Document, DocumentId, FileUpload, FileUser, Grant};
use crate::pending::PendingSet;
use crate::service::{DEFAULT_SIGN_COMMENT, DocumentService};
use crate::session::Session;
use crate::status::{RowAction, RowStatus};

/// A document with its derived status, offered actions, and pending flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRow {
    pub document: Document,
    pub status: RowStatus,
    pub actions: Vec<RowAction>,
    pub pending: bool,
}

struct Entry {
    document: Document,
    grants: Vec<FileUser>,
}

impl Entry {
    fn status(&self) -> RowStatus {
        self.document.status(&self.grants)
    }
}

/// Controller for the signed-in user's document collection.
pub struct DocumentListController {
    service: Arc<dyn DocumentService>,
    session: Session,
    entries: RwLock<Vec<Entry>>,
    pending: PendingSet,
}

impl DocumentListController {
    pub fn new(service: Arc<dyn DocumentService>, session: Session) -> Self {
        Self {
            service,
            session,
            entries: RwLock::new(Vec::new()),
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

    /// Fetch the full list and replace the snapshot.
    ///
    /// Safe to call repeatedly; every call is a fresh round trip. On failure
    /// the previous snapshot is kept. A failed grant lookup only leaves that
    /// row without a recipient.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::Session`] without a token, or the service
    /// failure of the list fetch.
    pub async fn load(&self) -> Result<usize, ActionError> {
        let token = self.session.token().await?;
        let documents = self.service.list_documents(&token).await?;

        let lookups = documents.iter().map(|doc| self.grants_of(&token, doc));
        let grants = futures::future::join_all(lookups).await;

        let entries: Vec<Entry> = documents
            .into_iter()
            .zip(grants)
            .map(|(document, grants)| Entry { document, grants })
            .collect();
        let count = entries.len();
        *self.entries.write().await = entries;
        debug!(count, "document list loaded");
        Ok(count)
    }

    async fn grants_of(&self, token: &str, doc: &Document) -> Vec<FileUser> {
        if doc.is_final() {
            return Vec::new();
        }
        match self.service.list_file_users(token, &doc.id).await {
            Ok(grants) => grants,
            Err(err) => {
                warn!(document_id = %doc.id, error = %err, "grant lookup failed, row shown as unsent");
                Vec::new()
            }
        }
    }

    /// The current snapshot.
    pub async fn documents(&self) -> Vec<Document> {
        self.entries
            .read()
            .await
            .iter()
            .map(|e| e.document.clone())
            .collect()
    }

    pub async fn find(&self, id: &DocumentId) -> Option<Document> {
        self.entries
            .read()
            .await
            .iter()
            .find(|e| &e.document.id == id)
            .map(|e| e.document.clone())
    }

    /// Status of a loaded row.
    pub async fn status(&self, id: &DocumentId) -> Option<RowStatus> {
        self.entries
            .read()
            .await
            .iter()
            .find(|e| &e.document.id == id)
            .map(Entry::status)
    }

    /// The snapshot as rows ready for rendering.
    pub async fn rows(&self) -> Vec<DocumentRow> {
        self.entries
            .read()
            .await
            .iter()
            .map(|entry| {
                let status = entry.status();
                let pending = self.pending.is_pending(&entry.document.id);
                let actions = if pending {
                    Vec::new()
                } else {
                    status.actions().to_vec()
                };
                DocumentRow {
                    document: entry.document.clone(),
                    status,
                    actions,
                    pending,
                }
            })
            .collect()
    }

    /// Upload a file, then reload the list. No local insert is made; the
    /// new row appears with its server-assigned id after the reload.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::Validation`] for an empty name, or the
    /// session/service failure of the upload itself.
    pub async fn upload(&self, upload: &FileUpload) -> Result<(), ActionError> {
        if upload.name.trim().is_empty() {
            return Err(ActionError::Validation {
                reason: "file name must not be empty".to_owned(),
            });
        }
        let token = self.session.token().await?;
        self.service.add_document(&token, upload).await?;
        info!(name = %upload.name, size = upload.bytes.len(), "document uploaded");
        self.refresh().await;
        Ok(())
    }

    /// Send a document to `recipient` for signature.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::Validation`] for a blank recipient,
    /// [`ActionError::Unavailable`] if the row was already sent or is final,
    /// [`ActionError::Busy`] if the row is pending, or the service failure.
    pub async fn send(&self, id: &DocumentId, recipient: &str) -> Result<(), ActionError> {
        let recipient = recipient.trim();
        if recipient.is_empty() {
            return Err(ActionError::Validation {
                reason: "recipient email must not be empty".to_owned(),
            });
        }
        let grant = Grant::view_and_sign(recipient);
        self.row_action(id, RowAction::Send, |token| async move {
            self.service.add_file_user(&token, id, &grant).await
        })
        .await
    }

    /// Sign a document awaiting signature.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::Unavailable`] unless the row awaits a
    /// signature, [`ActionError::Busy`] if the row is pending, or the
    /// service failure.
    pub async fn sign(&self, id: &DocumentId) -> Result<(), ActionError> {
        self.row_action(id, RowAction::Sign, |token| async move {
            self.service
                .sign_document(&token, id, DEFAULT_SIGN_COMMENT)
                .await
        })
        .await
    }

    /// Reject a document awaiting signature.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::Validation`] for a blank reason,
    /// [`ActionError::Unavailable`] unless the row awaits a signature,
    /// [`ActionError::Busy`] if the row is pending, or the service failure.
    pub async fn reject(&self, id: &DocumentId, reason: &str) -> Result<(), ActionError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(ActionError::Validation {
                reason: "rejection reason must not be empty".to_owned(),
            });
        }
        self.row_action(id, RowAction::Reject, |token| async move {
            self.service.reject_document(&token, id, reason).await
        })
        .await
    }

    /// Gate, call, release, and reload on success.
    ///
    /// Rows missing from the snapshot are not gated on status; the server
    /// decides.
    async fn row_action<F, Fut>(
        &self,
        id: &DocumentId,
        action: RowAction,
        call: F,
    ) -> Result<(), ActionError>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<(), ServiceError>>,
    {
        if let Some(status) = self.status(id).await {
            if !status.allows(action) {
                return Err(ActionError::Unavailable {
                    document_id: id.clone(),
                    action: action.as_str(),
                    status,
                });
            }
        }

        let guard = self
            .pending
            .try_acquire(id)
            .ok_or_else(|| ActionError::Busy {
                document_id: id.clone(),
            })?;
        let token = self.session.token().await?;

        debug!(document_id = %id, %action, "row action started");
        let outcome = call(token).await;
        drop(guard);

        if let Err(err) = outcome {
            warn!(document_id = %id, %action, error = %err, "row action failed");
            return Err(err.into());
        }
        info!(document_id = %id, %action, "row action completed");
        self.refresh().await;
        Ok(())
    }

    async fn refresh(&self) {
        if let Err(err) = self.load().await {
            warn!(error = %err, "reload after mutation failed, keeping previous list");
        }
    }
}
