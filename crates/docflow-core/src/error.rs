//! Error types for `docflow-core`.
//!
//! Each error variant carries enough context to diagnose the problem without
//! a debugger. Bearer tokens never appear in error messages.

use crate::model::DocumentId;
use crate::status::RowStatus;

/// Errors from the document and auth services.
///
/// Distinguishes transport failures, HTTP-level failures, and domain
/// failures reported by the server in a JSON body, so that "zero documents"
/// and "the request failed" are never confused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    /// The server could not be reached.
    #[error("transport error: {reason}")]
    Transport { reason: String },

    /// The request timed out before a response arrived.
    #[error("request timed out")]
    Timeout,

    /// The server answered with a non-success status.
    #[error("server returned {status}: {message}")]
    Http { status: u16, message: String },

    /// The server reported a domain error code (e.g. `user_not_found`).
    #[error("server rejected the request: {code}")]
    Domain { code: String },

    /// The request body could not be built.
    #[error("failed to encode request: {reason}")]
    Encode { reason: String },

    /// The response body could not be decoded.
    #[error("failed to decode response: {reason}")]
    Decode { reason: String },

    /// The bearer token was missing, unknown, or expired (401).
    #[error("request is not authenticated")]
    Unauthenticated,
}

impl ServiceError {
    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::Unauthenticated => Some(401),
            _ => None,
        }
    }

    /// Whether the server reported the resource as missing.
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// Whether the request never produced an HTTP response.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Timeout)
    }
}

/// Errors from session handling.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// No token is stored; the caller must sign in first.
    #[error("not signed in")]
    NotAuthenticated,

    /// The session store failed to read or write the token.
    #[error("session store failed at '{location}': {reason}")]
    Store { location: String, reason: String },
}

/// Errors from controller actions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    /// Another action on the same document is still awaiting its response.
    #[error("document {document_id} already has an action in flight")]
    Busy { document_id: DocumentId },

    /// The document's current status does not offer this action.
    #[error("action '{action}' is not available for document {document_id} ({status})")]
    Unavailable {
        document_id: DocumentId,
        action: &'static str,
        status: RowStatus,
    },

    /// Local input validation failed; no request was issued.
    #[error("invalid input: {reason}")]
    Validation { reason: String },

    /// The document does not exist or is not visible to the caller.
    #[error("document {document_id} not found")]
    NotFound { document_id: DocumentId },

    /// A detail action was attempted before any document was loaded.
    #[error("no document loaded")]
    NoDocumentLoaded,

    /// The session guard rejected the operation.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The service call failed.
    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl ActionError {
    /// Where the caller should navigate after this error, if anywhere.
    pub fn navigation(&self) -> Option<crate::session::Navigate> {
        use crate::session::Navigate;
        match self {
            Self::NotFound { .. } => Some(Navigate::DocumentList),
            Self::Session(SessionError::NotAuthenticated)
            | Self::Service(ServiceError::Unauthenticated) => Some(Navigate::Login),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Navigate;

    #[test]
    fn not_found_is_detected_from_status() {
        let err = ServiceError::Http {
            status: 404,
            message: "Document not found".to_owned(),
        };
        assert!(err.is_not_found());
        assert!(!err.is_transport());
    }

    #[test]
    fn transport_and_timeout_are_transport() {
        assert!(ServiceError::Timeout.is_transport());
        assert!(
            ServiceError::Transport {
                reason: "connection refused".to_owned()
            }
            .is_transport()
        );
        assert_eq!(ServiceError::Timeout.status(), None);
    }

    #[test]
    fn navigation_targets() {
        let missing = ActionError::NotFound {
            document_id: DocumentId::from("7"),
        };
        assert_eq!(missing.navigation(), Some(Navigate::DocumentList));

        let signed_out = ActionError::from(SessionError::NotAuthenticated);
        assert_eq!(signed_out.navigation(), Some(Navigate::Login));

        let expired = ActionError::from(ServiceError::Unauthenticated);
        assert_eq!(expired.navigation(), Some(Navigate::Login));

        let busy = ActionError::Busy {
            document_id: DocumentId::from("7"),
        };
        assert_eq!(busy.navigation(), None);
    }
}
