//! Document model shared by the service client and the controllers.
//!
//! Field names follow the server's JSON (`snake_case`). Identifiers are
//! opaque: the server may send them as numbers or strings, and both are
//! normalized to a string form.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::status::RowStatus;

/// Wire form of an identifier: JSON number or JSON string.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Number(i64),
    Text(String),
}

impl From<RawId> for String {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Number(n) => n.to_string(),
            RawId::Text(s) => s,
        }
    }
}

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                RawId::deserialize(deserializer).map(|raw| Self(raw.into()))
            }
        }

        impl $name {
            /// The identifier as it appears in URL paths.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

opaque_id!(
    /// Server-assigned document identifier.
    DocumentId
);

opaque_id!(
    /// Server-assigned user identifier.
    UserId
);

/// The user who uploaded a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub id: UserId,
    pub email: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl Owner {
    /// Display name, falling back to the email address.
    pub fn display_name(&self) -> &str {
        self.full_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.email)
    }
}

/// A document as reported by the server.
///
/// `is_signed` only ever moves from `false` to `true`. `id`, `owner` and
/// `upload_date` never change after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub original_filename: String,
    /// ISO 8601 upload timestamp as sent by the server.
    pub upload_date: String,
    #[serde(default)]
    pub is_signed: bool,
    pub owner: Owner,
    /// Byte count, informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejected_reason: Option<String>,
}

impl Document {
    /// Lifecycle status derived from the server fields and the grant list.
    pub fn status(&self, grants: &[FileUser]) -> RowStatus {
        RowStatus::of(self, grants)
    }

    /// Whether the document reached a terminal state. Needs no grant list.
    pub fn is_final(&self) -> bool {
        self.is_signed || self.rejected_reason.is_some()
    }
}

/// Coarse access level used by some server versions instead of flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    View,
    Edit,
}

/// An access grant: a user with view and/or sign capability on a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileUser {
    pub user_id: UserId,
    pub email: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub can_view: bool,
    #[serde(default)]
    pub can_sign: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_level: Option<AccessLevel>,
}

impl FileUser {
    /// Whether the grant allows signing, honouring the coarse access level.
    pub fn may_sign(&self) -> bool {
        self.can_sign || self.access_level == Some(AccessLevel::Edit)
    }

    /// Whether the grant allows viewing.
    pub fn may_view(&self) -> bool {
        self.can_view || self.access_level.is_some() || self.can_sign
    }
}

/// Body of an access grant request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    pub email: String,
    pub can_view: bool,
    pub can_sign: bool,
}

impl Grant {
    /// The default grant: view and sign, no negotiation.
    pub fn view_and_sign(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            can_view: true,
            can_sign: true,
        }
    }
}

/// A file to upload or to substitute for an existing document's content.
#[derive(Clone, PartialEq, Eq)]
pub struct FileUpload {
    /// Display name, sent as the title and as the part's filename.
    pub name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl FileUpload {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content_type: None,
            bytes,
        }
    }

    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

impl fmt::Debug for FileUpload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileUpload")
            .field("name", &self.name)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// A downloaded document body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedFile {
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Registration form.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct Registration {
    pub username: String,
    pub password: String,
    pub email: String,
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("username", &self.username)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

fn default_true() -> bool {
    true
}
