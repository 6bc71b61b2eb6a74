//! Request and response bodies that only exist on the wire.

use docflow_core::Document;
use serde::{Deserialize, Serialize};

/// `GET /documents/getDocuments` answers with an envelope; older servers
/// send the bare array. A missing or `null` list reads as empty.
#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum DocumentList {
    Envelope {
        #[serde(default)]
        documents: Option<Vec<Document>>,
    },
    Bare(Vec<Document>),
}

impl DocumentList {
    pub(crate) fn into_documents(self) -> Vec<Document> {
        match self {
            Self::Envelope { documents } => documents.unwrap_or_default(),
            Self::Bare(documents) => documents,
        }
    }
}

/// Login and register answer with either a token or an error code.
#[derive(Default, Deserialize)]
pub(crate) struct AuthResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Error bodies seen in practice: `{"error": "code"}`,
/// `{"detail": "..."}` (or a validation list), `{"message": "..."}`.
#[derive(Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub error: Option<serde_json::Value>,
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Serialize)]
pub(crate) struct SignRequest<'a> {
    pub comments: &'a str,
}

#[derive(Serialize)]
pub(crate) struct RejectRequest<'a> {
    pub reason: &'a str,
}

#[derive(Serialize)]
pub(crate) struct LoginForm<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const DOC: &str = r#"{"id": 1, "original_filename": "a.pdf", "upload_date": "2024-05-01T10:00:00",
        "is_signed": false, "owner": {"id": 1, "email": "a@example.com"}}"#;

    fn parse(body: &str) -> Vec<Document> {
        serde_json::from_str::<DocumentList>(body)
            .unwrap()
            .into_documents()
    }

    #[test]
    fn document_list_shapes() {
        assert_eq!(parse(&format!(r#"{{"documents": [{DOC}]}}"#)).len(), 1);
        assert_eq!(parse(&format!("[{DOC}]")).len(), 1);
        assert!(parse(r#"{"documents": null}"#).is_empty());
        assert!(parse("{}").is_empty());
    }
}
