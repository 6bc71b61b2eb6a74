//! `DocflowClient` implementation.

use std::time::Duration;

use docflow_core::{
    AuthService, Document, DocumentId, DocumentService, DownloadedFile, FileUpload, FileUser,
    Grant, Registration, ServiceError,
};
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE, HeaderName};
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::ClientError;
use crate::wire::{AuthResponse, DocumentList, ErrorBody, LoginForm, RejectRequest, SignRequest};
use crate::{
    ClientConfig, DEFAULT_BASE_URL, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_BASE_DELAY,
    DEFAULT_TIMEOUT, DEFAULT_USER_AGENT, DocflowClient,
};

impl DocflowClient {
    /// Create a client for `base_url` with default settings.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidBaseUrl`] if the URL is not absolute
    /// `http`/`https`, or [`ClientError::Http`] if the HTTP client cannot
    /// be built.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        Self::with_config(ClientConfig {
            base_url: base_url.into(),
            ..ClientConfig::default()
        })
    }

    /// Create a client from the environment (`DOCFLOW_URL`) and defaults.
    ///
    /// # Errors
    ///
    /// Same as [`new`](Self::new).
    pub fn from_env() -> Result<Self, ClientError> {
        Self::with_config(ClientConfig::default())
    }

    /// Create a client with full configuration.
    ///
    /// # Errors
    ///
    /// Same as [`new`](Self::new).
    #[allow(clippy::needless_pass_by_value)]
    pub fn with_config(cfg: ClientConfig) -> Result<Self, ClientError> {
        let base_url = first_non_empty(&[
            &cfg.base_url,
            &std::env::var("DOCFLOW_URL").unwrap_or_default(),
            DEFAULT_BASE_URL,
        ])
        .trim_end_matches('/')
        .to_owned();

        match Url::parse(&base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => {
                return Err(ClientError::InvalidBaseUrl {
                    reason: format!("unsupported scheme \"{}\"", url.scheme()),
                    url: base_url,
                });
            }
            Err(e) => {
                return Err(ClientError::InvalidBaseUrl {
                    reason: e.to_string(),
                    url: base_url,
                });
            }
        }

        let timeout = if cfg.timeout.is_zero() {
            DEFAULT_TIMEOUT
        } else {
            cfg.timeout
        };
        let retry_base_delay = if cfg.retry_base_delay.is_zero() {
            DEFAULT_RETRY_BASE_DELAY
        } else {
            cfg.retry_base_delay
        };
        let user_agent = first_non_empty(&[&cfg.user_agent, DEFAULT_USER_AGENT]);

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;

        Ok(Self {
            base_url,
            max_retries: cfg.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            retry_base_delay,
            http,
        })
    }

    /// The normalized base URL (no trailing slash).
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // --- Private ---

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `GET` with retries on transport failures and 429/5xx.
    async fn fetch(&self, path: &str, token: &str) -> Result<Response, ServiceError> {
        let url = self.url(path);
        let mut attempt = 0;
        loop {
            let result = execute(self.http.get(&url).bearer_auth(token)).await;
            match result {
                Err(err) if attempt < self.max_retries && is_retryable(&err) => {
                    debug!(path, attempt, error = %err, "read failed, retrying");
                    sleep_with_jitter(self.retry_base_delay, attempt).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// `GET` that maps a 404 to `None`.
    async fn fetch_optional(
        &self,
        path: &str,
        token: &str,
    ) -> Result<Option<Response>, ServiceError> {
        match self.fetch(path, token).await {
            Ok(resp) => Ok(Some(resp)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }
}

#[async_trait::async_trait]
impl DocumentService for DocflowClient {
    async fn list_documents(&self, token: &str) -> Result<Vec<Document>, ServiceError> {
        let resp = self.fetch("/documents/getDocuments", token).await?;
        let list: DocumentList = decode(resp).await?;
        Ok(list.into_documents())
    }

    async fn get_document(
        &self,
        token: &str,
        id: &DocumentId,
    ) -> Result<Option<Document>, ServiceError> {
        let path = format!("/documents/getDocument/{}", segment(id));
        match self.fetch_optional(&path, token).await? {
            Some(resp) => decode(resp).await.map(Some),
            None => Ok(None),
        }
    }

    async fn add_document(&self, token: &str, upload: &FileUpload) -> Result<(), ServiceError> {
        let form = Form::new()
            .text("title", upload.name.clone())
            .part("file", file_part(upload)?);
        let req = self
            .http
            .post(self.url("/documents/addDocument/"))
            .bearer_auth(token)
            .multipart(form);
        mutate("add document", req).await
    }

    async fn replace_document(
        &self,
        token: &str,
        id: &DocumentId,
        upload: &FileUpload,
    ) -> Result<(), ServiceError> {
        let form = Form::new().part("file", file_part(upload)?);
        let req = self
            .http
            .put(self.url(&format!("/documents/replaceDocument/{}", segment(id))))
            .bearer_auth(token)
            .multipart(form);
        mutate("replace document", req).await
    }

    async fn delete_document(&self, token: &str, id: &DocumentId) -> Result<(), ServiceError> {
        let req = self
            .http
            .delete(self.url(&format!("/documents/deleteDocument/{}", segment(id))))
            .bearer_auth(token);
        mutate("delete document", req).await
    }

    async fn sign_document(
        &self,
        token: &str,
        id: &DocumentId,
        comments: &str,
    ) -> Result<(), ServiceError> {
        let req = self
            .http
            .post(self.url(&format!("/documents/signDocument/{}/", segment(id))))
            .bearer_auth(token)
            .json(&SignRequest { comments });
        mutate("sign document", req).await
    }

    async fn reject_document(
        &self,
        token: &str,
        id: &DocumentId,
        reason: &str,
    ) -> Result<(), ServiceError> {
        let req = self
            .http
            .post(self.url(&format!("/documents/rejectDocument/{}/", segment(id))))
            .bearer_auth(token)
            .json(&RejectRequest { reason });
        mutate("reject document", req).await
    }

    async fn list_file_users(
        &self,
        token: &str,
        id: &DocumentId,
    ) -> Result<Vec<FileUser>, ServiceError> {
        let path = format!("/documents/getUsers/{}", segment(id));
        let resp = self.fetch(&path, token).await?;
        decode(resp).await
    }

    async fn add_file_user(
        &self,
        token: &str,
        id: &DocumentId,
        grant: &Grant,
    ) -> Result<(), ServiceError> {
        let req = self
            .http
            .post(self.url(&format!("/documents/addUser/{}", segment(id))))
            .bearer_auth(token)
            .json(grant);
        mutate("add file user", req).await
    }

    async fn download_document(
        &self,
        token: &str,
        id: &DocumentId,
    ) -> Result<Option<DownloadedFile>, ServiceError> {
        let path = format!("/documents/{}/download/", segment(id));
        let Some(resp) = self.fetch_optional(&path, token).await? else {
            return Ok(None);
        };

        let filename = header_value(&resp, CONTENT_DISPOSITION)
            .as_deref()
            .and_then(disposition_filename);
        let content_type = header_value(&resp, CONTENT_TYPE);
        let bytes = resp.bytes().await.map_err(transport)?;

        debug!(document_id = %id, len = bytes.len(), "document downloaded");
        Ok(Some(DownloadedFile {
            filename,
            content_type,
            bytes: bytes.to_vec(),
        }))
    }
}

#[async_trait::async_trait]
impl AuthService for DocflowClient {
    async fn login(&self, username: &str, password: &str) -> Result<String, ServiceError> {
        let req = self
            .http
            .post(self.url("/users/login"))
            .form(&LoginForm { username, password });
        exchange(req).await
    }

    async fn register(&self, registration: &Registration) -> Result<String, ServiceError> {
        let req = self
            .http
            .post(self.url("/users/register"))
            .json(registration);
        exchange(req).await
    }
}

/// Send a mutation once and discard the response body.
async fn mutate(operation: &str, req: RequestBuilder) -> Result<(), ServiceError> {
    match execute(req).await {
        Ok(_) => {
            debug!(operation, "mutation accepted");
            Ok(())
        }
        Err(err) => {
            warn!(operation, error = %err, "mutation refused");
            Err(err)
        }
    }
}

/// Login and register: the body carries a token or an error code,
/// whatever the status.
async fn exchange(req: RequestBuilder) -> Result<String, ServiceError> {
    let resp = req.send().await.map_err(transport)?;
    let status = resp.status();
    let bytes = resp.bytes().await.map_err(transport)?;
    let body: AuthResponse = serde_json::from_slice(&bytes).unwrap_or_default();

    if let Some(token) = body.access_token.filter(|t| !t.is_empty()) {
        if status.is_success() {
            return Ok(token);
        }
    }
    Err(match body.error {
        Some(code) => ServiceError::Domain { code },
        None if status.is_success() => ServiceError::Decode {
            reason: "response carries neither access_token nor error".to_owned(),
        },
        None => ServiceError::Http {
            status: status.as_u16(),
            message: format!("HTTP {}", status.as_u16()),
        },
    })
}

/// Send once; non-2xx responses become a [`ServiceError`].
async fn execute(req: RequestBuilder) -> Result<Response, ServiceError> {
    let resp = req.send().await.map_err(transport)?;
    if resp.status().is_success() {
        return Ok(resp);
    }
    Err(error_from_response(resp).await)
}

async fn error_from_response(resp: Response) -> ServiceError {
    let status = resp.status();
    let text = resp.text().await.unwrap_or_default();
    let body = serde_json::from_str::<ErrorBody>(&text).ok();

    if let Some(serde_json::Value::String(code)) = body.as_ref().and_then(|b| b.error.as_ref()) {
        return ServiceError::Domain { code: code.clone() };
    }
    if status == StatusCode::UNAUTHORIZED {
        return ServiceError::Unauthenticated;
    }

    let message = body
        .and_then(|b| {
            b.detail
                .map(|d| match d {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                })
                .or(b.message)
        })
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
    ServiceError::Http {
        status: status.as_u16(),
        message,
    }
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, ServiceError> {
    let bytes = resp.bytes().await.map_err(transport)?;
    serde_json::from_slice(&bytes).map_err(|e| ServiceError::Decode {
        reason: e.to_string(),
    })
}

fn transport(err: reqwest::Error) -> ServiceError {
    if err.is_timeout() {
        ServiceError::Timeout
    } else {
        ServiceError::Transport {
            reason: err.to_string(),
        }
    }
}

fn file_part(upload: &FileUpload) -> Result<Part, ServiceError> {
    let part = Part::bytes(upload.bytes.clone()).file_name(upload.name.clone());
    match upload.content_type.as_deref() {
        Some(mime) => part.mime_str(mime).map_err(|e| ServiceError::Encode {
            reason: format!("invalid content type \"{mime}\": {e}"),
        }),
        None => Ok(part),
    }
}

fn header_value(resp: &Response, name: HeaderName) -> Option<String> {
    resp.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}

fn segment(id: &DocumentId) -> String {
    urlencoding::encode(id.as_str()).into_owned()
}

/// Filename from a `Content-Disposition` header. `filename*` (RFC 5987)
/// takes precedence over `filename`.
fn disposition_filename(header: &str) -> Option<String> {
    let mut plain = None;
    for param in header.split(';').map(str::trim) {
        if let Some(value) = param.strip_prefix("filename*=") {
            let encoded = value.rsplit("''").next().unwrap_or(value).trim_matches('"');
            if let Ok(decoded) = urlencoding::decode(encoded) {
                return Some(decoded.into_owned());
            }
        } else if let Some(value) = param.strip_prefix("filename=") {
            plain = Some(value.trim_matches('"').to_owned());
        }
    }
    plain.filter(|name| !name.is_empty())
}

fn is_retryable(err: &ServiceError) -> bool {
    match err {
        ServiceError::Transport { .. } | ServiceError::Timeout => true,
        ServiceError::Http { status, .. } => matches!(status, 429 | 500 | 502 | 503 | 504),
        _ => false,
    }
}

async fn sleep_with_jitter(base_delay: Duration, attempt: u32) {
    // Base delays are milliseconds and attempts are few, so values stay small.
    #[allow(clippy::cast_possible_truncation)]
    let base = (base_delay.as_millis() as u64).saturating_mul(2u64.saturating_pow(attempt));
    #[allow(clippy::cast_precision_loss)]
    let base_f = base as f64;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let jitter = (base_f * 0.3 * rand_f64()) as u64;
    tokio::time::sleep(Duration::from_millis(base.saturating_add(jitter))).await;
}

/// Pseudo-random f64 in [0, 1) from the clock.
fn rand_f64() -> f64 {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    f64::from(nanos % 1000) / 1000.0
}

fn first_non_empty(vals: &[&str]) -> String {
    vals.iter()
        .find(|v| !v.is_empty())
        .map(|v| (*v).to_owned())
        .unwrap_or_default()
}
