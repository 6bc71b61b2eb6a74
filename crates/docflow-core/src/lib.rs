//! Core library for `docflow`.
//!
//! Contains the document model, the service traits the HTTP client
//! implements, the session object and its stores, the pending-action set,
//! and the two controllers that drive the document lifecycle: the list
//! controller (upload, send, sign, reject) and the detail controller
//! (sharing, sign, replace, delete, preview).
//!
//! Every mutation is followed by a full reload of the affected view. The
//! server is the source of truth; controllers never patch their snapshot
//! locally.

pub mod auth;
pub mod detail;
pub mod error;
pub mod list;
pub mod memory;
pub mod model;
pub mod pending;
pub mod preview;
pub mod service;
pub mod session;
pub mod status;

pub use auth::{AuthFailure, AuthFlow, AuthMode, Field, FieldError};
pub use detail::{Confirm, DocumentDetail, DocumentDetailController};
pub use error::{ActionError, ServiceError, SessionError};
pub use list::{DocumentListController, DocumentRow};
pub use memory::MemoryDocumentService;
pub use model::{
    AccessLevel, Document, DocumentId, DownloadedFile, FileUpload, FileUser, Grant, Owner,
    Registration, UserId,
};
pub use pending::{PendingGuard, PendingSet};
pub use preview::Preview;
pub use service::{AuthService, DocumentService, Lenient};
pub use session::{FileSessionStore, MemorySessionStore, Navigate, Session, SessionStore};
pub use status::{RowAction, RowStatus};
