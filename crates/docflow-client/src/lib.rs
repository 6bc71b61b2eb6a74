//! HTTP client for the docflow document server.
//!
//! [`DocflowClient`] implements the [`DocumentService`] and [`AuthService`]
//! traits from `docflow-core` over `reqwest`. Reads (`GET`) are retried with
//! backoff on transport failures and 429/5xx responses; mutations are sent
//! exactly once.
//!
//! # Example
//!
//! ```rust,no_run
//! use docflow_client::DocflowClient;
//! use docflow_core::{AuthService, DocumentService};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = DocflowClient::new("http://localhost:8000")?;
//! let token = client.login("alice", "secret").await?;
//! for doc in client.list_documents(&token).await? {
//!     println!("{} {}", doc.id, doc.original_filename);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! [`DocumentService`]: docflow_core::DocumentService
//! [`AuthService`]: docflow_core::AuthService

mod client;
mod error;
mod wire;

pub use error::ClientError;

use std::time::Duration;

const DEFAULT_BASE_URL: &str = "http://localhost:8000";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_MAX_RETRIES: u32 = 2;
const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_millis(250);
const DEFAULT_USER_AGENT: &str = concat!("docflow-client/", env!("CARGO_PKG_VERSION"));

/// Configuration for [`DocflowClient`].
///
/// Empty or zero fields fall back to the environment, then to defaults.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    /// Server base URL. Falls back to `DOCFLOW_URL`, then
    /// `http://localhost:8000`.
    pub base_url: String,
    /// Per-request timeout. Default: 10 seconds.
    pub timeout: Duration,
    /// Extra attempts for failed reads. `None` means the default (2);
    /// `Some(0)` disables retries.
    pub max_retries: Option<u32>,
    /// First backoff delay, doubled per attempt. Default: 250 ms.
    pub retry_base_delay: Duration,
    /// `User-Agent` header. Default: `docflow-client/<version>`.
    pub user_agent: String,
}

/// Client for the document server.
///
/// Cheap to clone; clones share the connection pool. The bearer token is
/// passed per call and never stored.
#[derive(Debug, Clone)]
pub struct DocflowClient {
    base_url: String,
    max_retries: u32,
    retry_base_delay: Duration,
    http: reqwest::Client,
}
