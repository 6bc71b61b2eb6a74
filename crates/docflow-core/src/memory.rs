//! In-memory document service for tests and demos.
//!
//! Implements [`DocumentService`] and [`AuthService`] against a process-local
//! state behind a `RwLock`. Nothing is persisted. It enforces the same
//! server-side rules the controllers rely on:
//!
//! - unknown tokens are refused with [`ServiceError::Unauthenticated`]
//! - a user sees documents they own or were granted view access to
//! - only the owner may delete, replace, or share a document
//! - signing needs ownership or a sign-capable grant
//! - the first terminal transition wins: signing a rejected document or
//!   rejecting a signed one is a 409 conflict
//! - replacing content keeps the signature flag as it was

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use tokio::sync::RwLock;

use crate::error::ServiceError;
use crate::model::{
    Document, DocumentId, DownloadedFile, FileUpload, FileUser, Grant, Owner, Registration, UserId,
};
use crate::service::{AuthService, DocumentService};

struct UserRecord {
    id: UserId,
    username: String,
    password: String,
    email: String,
}

struct StoredDocument {
    document: Document,
    content_type: Option<String>,
    bytes: Vec<u8>,
    grants: Vec<FileUser>,
}

#[derive(Default)]
struct State {
    users: Vec<UserRecord>,
    tokens: HashMap<String, UserId>,
    documents: BTreeMap<u64, StoredDocument>,
    next_user_id: u64,
    next_document_id: u64,
    next_token: u64,
    offline: bool,
}

impl State {
    fn online(&self) -> Result<(), ServiceError> {
        if self.offline {
            return Err(ServiceError::Transport {
                reason: "connection refused".to_owned(),
            });
        }
        Ok(())
    }

    fn authenticate(&self, token: &str) -> Result<&UserRecord, ServiceError> {
        self.online()?;
        let id = self
            .tokens
            .get(token)
            .ok_or(ServiceError::Unauthenticated)?;
        self.users
            .iter()
            .find(|u| &u.id == id)
            .ok_or(ServiceError::Unauthenticated)
    }

    fn issue_token(&mut self, user: UserId) -> String {
        self.next_token += 1;
        let token = format!("mem-token-{}-{}", user, self.next_token);
        self.tokens.insert(token.clone(), user);
        token
    }
}

impl StoredDocument {
    fn visible_to(&self, user: &UserId) -> bool {
        &self.document.owner.id == user
            || self.grants.iter().any(|g| &g.user_id == user && g.may_view())
    }

    fn can_sign(&self, user: &UserId) -> bool {
        &self.document.owner.id == user
            || self.grants.iter().any(|g| &g.user_id == user && g.may_sign())
    }
}

/// An in-memory stand-in for the document server.
///
/// Clones share state.
#[derive(Clone, Default)]
pub struct MemoryDocumentService {
    state: Arc<RwLock<State>>,
}

impl MemoryDocumentService {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an unreachable server: every call fails with a transport
    /// error until switched back.
    pub async fn set_offline(&self, offline: bool) {
        self.state.write().await.offline = offline;
    }
}

fn http(status: u16, message: &str) -> ServiceError {
    ServiceError::Http {
        status,
        message: message.to_owned(),
    }
}

fn domain(code: &str) -> ServiceError {
    ServiceError::Domain {
        code: code.to_owned(),
    }
}

fn parse_id(id: &DocumentId) -> Option<u64> {
    id.as_str().parse().ok()
}

/// Look up a document the caller may see; hidden documents read as missing.
fn visible<'a>(
    state: &'a State,
    user: &UserId,
    id: &DocumentId,
) -> Result<&'a StoredDocument, ServiceError> {
    parse_id(id)
        .and_then(|key| state.documents.get(&key))
        .filter(|doc| doc.visible_to(user))
        .ok_or_else(|| http(404, "Document not found or access denied."))
}

fn visible_mut<'a>(
    state: &'a mut State,
    user: &UserId,
    id: &DocumentId,
) -> Result<&'a mut StoredDocument, ServiceError> {
    parse_id(id)
        .and_then(|key| state.documents.get_mut(&key))
        .filter(|doc| doc.visible_to(user))
        .ok_or_else(|| http(404, "Document not found or access denied."))
}

fn require_owner(doc: &StoredDocument, user: &UserId) -> Result<(), ServiceError> {
    if &doc.document.owner.id == user {
        Ok(())
    } else {
        Err(http(403, "Only the owner may do this."))
    }
}

#[async_trait::async_trait]
impl DocumentService for MemoryDocumentService {
    async fn list_documents(&self, token: &str) -> Result<Vec<Document>, ServiceError> {
        let state = self.state.read().await;
        let user = state.authenticate(token)?.id.clone();
        Ok(state
            .documents
            .values()
            .filter(|d| d.visible_to(&user))
            .map(|d| d.document.clone())
            .collect())
    }

    async fn get_document(
        &self,
        token: &str,
        id: &DocumentId,
    ) -> Result<Option<Document>, ServiceError> {
        let state = self.state.read().await;
        let user = state.authenticate(token)?.id.clone();
        match visible(&state, &user, id) {
            Ok(doc) => Ok(Some(doc.document.clone())),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn add_document(&self, token: &str, upload: &FileUpload) -> Result<(), ServiceError> {
        let mut state = self.state.write().await;
        let owner = {
            let user = state.authenticate(token)?;
            Owner {
                id: user.id.clone(),
                email: user.email.clone(),
                full_name: Some(user.username.clone()),
                is_active: true,
            }
        };
        if upload.name.trim().is_empty() {
            return Err(http(400, "No file provided or filename is missing."));
        }

        state.next_document_id += 1;
        let key = state.next_document_id;
        let document = Document {
            id: DocumentId::from(key.to_string()),
            original_filename: upload.name.clone(),
            upload_date: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            is_signed: false,
            owner,
            size: u64::try_from(upload.bytes.len()).ok(),
            rejected_reason: None,
        };
        state.documents.insert(
            key,
            StoredDocument {
                document,
                content_type: upload.content_type.clone(),
                bytes: upload.bytes.clone(),
                grants: Vec::new(),
            },
        );
        Ok(())
    }

    async fn replace_document(
        &self,
        token: &str,
        id: &DocumentId,
        upload: &FileUpload,
    ) -> Result<(), ServiceError> {
        let mut state = self.state.write().await;
        let user = state.authenticate(token)?.id.clone();
        let doc = visible_mut(&mut state, &user, id)?;
        require_owner(doc, &user)?;

        doc.bytes.clone_from(&upload.bytes);
        doc.content_type.clone_from(&upload.content_type);
        doc.document.size = u64::try_from(upload.bytes.len()).ok();
        Ok(())
    }

    async fn delete_document(&self, token: &str, id: &DocumentId) -> Result<(), ServiceError> {
        let mut state = self.state.write().await;
        let user = state.authenticate(token)?.id.clone();
        require_owner(visible(&state, &user, id)?, &user)?;
        if let Some(key) = parse_id(id) {
            state.documents.remove(&key);
        }
        Ok(())
    }

    async fn sign_document(
        &self,
        token: &str,
        id: &DocumentId,
        _comments: &str,
    ) -> Result<(), ServiceError> {
        let mut state = self.state.write().await;
        let user = state.authenticate(token)?.id.clone();
        let doc = visible_mut(&mut state, &user, id)?;
        if !doc.can_sign(&user) {
            return Err(http(403, "No permission to sign this document."));
        }
        if doc.document.rejected_reason.is_some() {
            return Err(http(409, "Document was rejected."));
        }
        doc.document.is_signed = true;
        Ok(())
    }

    async fn reject_document(
        &self,
        token: &str,
        id: &DocumentId,
        reason: &str,
    ) -> Result<(), ServiceError> {
        let mut state = self.state.write().await;
        let user = state.authenticate(token)?.id.clone();
        let doc = visible_mut(&mut state, &user, id)?;
        if !doc.can_sign(&user) {
            return Err(http(403, "No permission to reject this document."));
        }
        if doc.document.is_signed || doc.document.rejected_reason.is_some() {
            return Err(http(409, "Document already reached a final state."));
        }
        doc.document.rejected_reason = Some(reason.to_owned());
        Ok(())
    }

    async fn list_file_users(
        &self,
        token: &str,
        id: &DocumentId,
    ) -> Result<Vec<FileUser>, ServiceError> {
        let state = self.state.read().await;
        let user = state.authenticate(token)?.id.clone();
        Ok(visible(&state, &user, id)?.grants.clone())
    }

    async fn add_file_user(
        &self,
        token: &str,
        id: &DocumentId,
        grant: &Grant,
    ) -> Result<(), ServiceError> {
        let mut state = self.state.write().await;
        let user = state.authenticate(token)?.id.clone();
        let grantee = state
            .users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(grant.email.trim()))
            .map(|u| FileUser {
                user_id: u.id.clone(),
                email: u.email.clone(),
                full_name: Some(u.username.clone()),
                can_view: grant.can_view,
                can_sign: grant.can_sign,
                access_level: None,
            });

        let doc = visible_mut(&mut state, &user, id)?;
        require_owner(doc, &user)?;
        let grantee = grantee.ok_or_else(|| http(404, "User not found."))?;
        if grantee.user_id == doc.document.owner.id
            || doc.grants.iter().any(|g| g.user_id == grantee.user_id)
        {
            return Err(http(409, "User already has access."));
        }

        doc.grants.push(grantee);
        Ok(())
    }

    async fn download_document(
        &self,
        token: &str,
        id: &DocumentId,
    ) -> Result<Option<DownloadedFile>, ServiceError> {
        let state = self.state.read().await;
        let user = state.authenticate(token)?.id.clone();
        match visible(&state, &user, id) {
            Ok(doc) => Ok(Some(DownloadedFile {
                filename: Some(doc.document.original_filename.clone()),
                content_type: doc.content_type.clone(),
                bytes: doc.bytes.clone(),
            })),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }
}

#[async_trait::async_trait]
impl AuthService for MemoryDocumentService {
    async fn login(&self, username: &str, password: &str) -> Result<String, ServiceError> {
        let mut state = self.state.write().await;
        state.online()?;
        let user = state
            .users
            .iter()
            .find(|u| u.username == username || u.email == username)
            .ok_or_else(|| domain("user_not_found"))?;
        if user.password != password {
            return Err(domain("incorrect_password"));
        }
        let id = user.id.clone();
        Ok(state.issue_token(id))
    }

    async fn register(&self, registration: &Registration) -> Result<String, ServiceError> {
        let mut state = self.state.write().await;
        state.online()?;
        let username = registration.username.trim();
        if username.is_empty() || username.contains(char::is_whitespace) {
            return Err(domain("invalid_username"));
        }
        if registration.password.is_empty() {
            return Err(domain("empty_password"));
        }
        if state.users.iter().any(|u| u.username == username) {
            return Err(domain("username_exists"));
        }
        if state
            .users
            .iter()
            .any(|u| u.email.eq_ignore_ascii_case(&registration.email))
        {
            return Err(domain("email_exists"));
        }

        state.next_user_id += 1;
        let id = UserId::from(state.next_user_id.to_string());
        state.users.push(UserRecord {
            id: id.clone(),
            username: username.to_owned(),
            password: registration.password.clone(),
            email: registration.email.clone(),
        });
        Ok(state.issue_token(id))
    }
}
