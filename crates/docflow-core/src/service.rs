//! Service traits implemented by the HTTP client and the in-memory service.
//!
//! [`DocumentService`] returns tagged [`ServiceError`]s. [`Lenient`] wraps
//! it with the older contract where every failure collapses to an empty
//! collection, `false`, or `None`, logging the swallowed error.

use tracing::warn;

use crate::error::ServiceError;
use crate::model::{Document, DocumentId, DownloadedFile, FileUpload, FileUser, Grant, Registration};

/// Comment attached to signatures issued by this client.
pub const DEFAULT_SIGN_COMMENT: &str = "Signed from docflow";

/// Document lifecycle operations against the server.
///
/// Every call carries the bearer token explicitly. Implementations must be
/// safe to share across async tasks (`Send + Sync`).
#[async_trait::async_trait]
pub trait DocumentService: Send + Sync + 'static {
    /// All documents visible to the token's user.
    ///
    /// # Errors
    ///
    /// Returns the transport, HTTP, or decode failure.
    async fn list_documents(&self, token: &str) -> Result<Vec<Document>, ServiceError>;

    /// A single document, or `None` if it does not exist for this user.
    ///
    /// # Errors
    ///
    /// Returns any failure other than not-found.
    async fn get_document(
        &self,
        token: &str,
        id: &DocumentId,
    ) -> Result<Option<Document>, ServiceError>;

    /// Upload a new document.
    ///
    /// # Errors
    ///
    /// Returns the failure if the server did not accept the upload.
    async fn add_document(&self, token: &str, upload: &FileUpload) -> Result<(), ServiceError>;

    /// Substitute the binary content of an existing document.
    ///
    /// # Errors
    ///
    /// Returns the failure if the server did not accept the replacement.
    async fn replace_document(
        &self,
        token: &str,
        id: &DocumentId,
        upload: &FileUpload,
    ) -> Result<(), ServiceError>;

    /// Delete a document.
    ///
    /// # Errors
    ///
    /// Returns the failure if the server did not delete it.
    async fn delete_document(&self, token: &str, id: &DocumentId) -> Result<(), ServiceError>;

    /// Sign a document. The server's signature decision is opaque.
    ///
    /// # Errors
    ///
    /// Returns the failure if the server refused the signature.
    async fn sign_document(
        &self,
        token: &str,
        id: &DocumentId,
        comments: &str,
    ) -> Result<(), ServiceError>;

    /// Reject a document awaiting signature.
    ///
    /// # Errors
    ///
    /// Returns the failure if the server refused the rejection.
    async fn reject_document(
        &self,
        token: &str,
        id: &DocumentId,
        reason: &str,
    ) -> Result<(), ServiceError>;

    /// Access grants on a document.
    ///
    /// # Errors
    ///
    /// Returns the transport, HTTP, or decode failure.
    async fn list_file_users(
        &self,
        token: &str,
        id: &DocumentId,
    ) -> Result<Vec<FileUser>, ServiceError>;

    /// Grant a user access to a document.
    ///
    /// # Errors
    ///
    /// Returns the failure if the server refused the grant.
    async fn add_file_user(
        &self,
        token: &str,
        id: &DocumentId,
        grant: &Grant,
    ) -> Result<(), ServiceError>;

    /// Download a document body, or `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns any failure other than not-found.
    async fn download_document(
        &self,
        token: &str,
        id: &DocumentId,
    ) -> Result<Option<DownloadedFile>, ServiceError>;
}

/// Credential exchange: username and password for a bearer token.
#[async_trait::async_trait]
pub trait AuthService: Send + Sync + 'static {
    /// Exchange credentials for a bearer token.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Domain`] with the server's error code
    /// (e.g. `user_not_found`) or the transport failure.
    async fn login(&self, username: &str, password: &str) -> Result<String, ServiceError>;

    /// Create an account and return its bearer token.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Domain`] with the server's error code
    /// (e.g. `username_exists`) or the transport failure.
    async fn register(&self, registration: &Registration) -> Result<String, ServiceError>;
}

/// Swallow-and-flag wrappers over [`DocumentService`].
///
/// None of these return an error: failures become the empty sentinel and
/// are logged at `warn`.
#[async_trait::async_trait]
pub trait Lenient: DocumentService {
    async fn list_documents_or_empty(&self, token: &str) -> Vec<Document> {
        self.list_documents(token)
            .await
            .unwrap_or_else(|err| swallow("list documents", &err, Vec::new()))
    }

    async fn get_document_or_none(&self, token: &str, id: &DocumentId) -> Option<Document> {
        self.get_document(token, id)
            .await
            .unwrap_or_else(|err| swallow("get document", &err, None))
    }

    async fn add_document_ok(&self, token: &str, upload: &FileUpload) -> bool {
        flag("add document", self.add_document(token, upload).await)
    }

    async fn replace_document_ok(&self, token: &str, id: &DocumentId, upload: &FileUpload) -> bool {
        flag("replace document", self.replace_document(token, id, upload).await)
    }

    async fn delete_document_ok(&self, token: &str, id: &DocumentId) -> bool {
        flag("delete document", self.delete_document(token, id).await)
    }

    async fn sign_document_ok(&self, token: &str, id: &DocumentId) -> bool {
        flag(
            "sign document",
            self.sign_document(token, id, DEFAULT_SIGN_COMMENT).await,
        )
    }

    async fn list_file_users_or_empty(&self, token: &str, id: &DocumentId) -> Vec<FileUser> {
        self.list_file_users(token, id)
            .await
            .unwrap_or_else(|err| swallow("list file users", &err, Vec::new()))
    }

    async fn add_file_user_ok(&self, token: &str, id: &DocumentId, email: &str) -> bool {
        flag(
            "add file user",
            self.add_file_user(token, id, &Grant::view_and_sign(email))
                .await,
        )
    }
}

#[async_trait::async_trait]
impl<T: DocumentService + ?Sized> Lenient for T {}

fn swallow<T>(operation: &str, err: &ServiceError, sentinel: T) -> T {
    warn!(operation, error = %err, "service call failed, returning empty result");
    sentinel
}

fn flag(operation: &str, result: Result<(), ServiceError>) -> bool {
    match result {
        Ok(()) => true,
        Err(err) => swallow(operation, &err, false),
    }
}
