//! `docflow` CLI: command-line front end for the document server.
//!
//! Each invocation is one page visit: it builds the controller it needs,
//! reads the bearer token from the session file, performs one action and
//! prints the reloaded state.

#![allow(clippy::print_stdout, clippy::print_stderr)]

mod paths;

use std::io::{BufRead, Write as _};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use docflow_client::{ClientConfig, DocflowClient};
use docflow_core::{
    ActionError, AuthFailure, AuthFlow, Document, DocumentDetailController, DocumentId,
    DocumentListController, FileSessionStore, FileUpload, FileUser, MemorySessionStore, Navigate,
    Preview, Registration, RowStatus, Session,
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

// ── ANSI color helpers ───────────────────────────────────────────────

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const WHITE: &str = "\x1b[37m";

// ── CLI structure ────────────────────────────────────────────────────

/// docflow: document upload, sharing and signing.
#[derive(Parser)]
#[command(
    name = "docflow",
    version,
    about = "docflow CLI: upload, share, sign and reject documents",
    long_about = None,
    after_help = format!(
        "{DIM}Environment variables:{RESET}\n  \
         DOCFLOW_ADDR           Server address (default: DOCFLOW_URL or http://localhost:8000)\n  \
         DOCFLOW_TOKEN          Bearer token, overrides the stored session\n  \
         DOCFLOW_SESSION_FILE   Session file (default: ~/.docflow/session)\n  \
         DOCFLOW_LOG            Log filter (default: warn)\n  \
         DOCFLOW_LOG_JSON       Emit log events as JSON lines\n\n\
         {DIM}Examples:{RESET}\n  \
         docflow login alice\n  \
         docflow upload ./contract.pdf\n  \
         docflow send 12 bob@example.com\n  \
         docflow reject 12 --reason \"wrong totals\""
    ),
)]
struct Cli {
    /// Document server address.
    #[arg(long, env = "DOCFLOW_ADDR")]
    addr: Option<String>,

    /// Bearer token; overrides the stored session.
    #[arg(long, env = "DOCFLOW_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Where the session token is stored.
    #[arg(long, env = "DOCFLOW_SESSION_FILE")]
    session_file: Option<PathBuf>,

    /// Log debug events to stderr.
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Emit log events as JSON lines.
    #[arg(long, env = "DOCFLOW_LOG_JSON", default_value = "false")]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and store the session token.
    Login {
        /// Username or email.
        username: Option<String>,
        /// Password (prompted on stdin when omitted).
        #[arg(long, env = "DOCFLOW_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Create an account and sign in.
    Register {
        username: String,
        email: String,
        /// Password (prompted on stdin when omitted).
        #[arg(long, env = "DOCFLOW_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Forget the stored session token.
    Logout,
    /// List documents visible to you.
    List,
    /// Upload a new document.
    Upload {
        /// File to upload.
        path: PathBuf,
        /// Display name (default: the file name).
        #[arg(long)]
        name: Option<String>,
    },
    /// Show a document and who has access to it.
    Show { id: String },
    /// Grant a user view and sign access.
    Share { id: String, email: String },
    /// Send a document to a recipient for signature.
    Send { id: String, email: String },
    /// Sign a document.
    Sign { id: String },
    /// Reject a document awaiting signature.
    Reject {
        id: String,
        /// Why the document is rejected.
        #[arg(long)]
        reason: String,
    },
    /// Replace a document's content.
    Replace { id: String, path: PathBuf },
    /// Delete a document.
    Delete {
        id: String,
        /// Skip the confirmation prompt.
        #[arg(long, short, default_value = "false")]
        yes: bool,
    },
    /// Download a document's content.
    Download {
        id: String,
        /// Output path (default: the server's file name in the current directory).
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Preview a document inline (text only; other types are described).
    View { id: String },
}

// ── Output helpers ───────────────────────────────────────────────────

fn header(icon: &str, title: &str) {
    println!("{BOLD}{CYAN}{icon} {title}{RESET}");
    println!("{DIM}─────────────────────────────────────────{RESET}");
}

fn kv_line(key: &str, value: &str) {
    println!("  {DIM}{key:<20}{RESET} {WHITE}{value}{RESET}");
}

fn success(msg: &str) {
    println!("{GREEN}{BOLD}✓{RESET} {msg}");
}

fn warning(msg: &str) {
    println!("{YELLOW}{BOLD}⚠{RESET} {YELLOW}{msg}{RESET}");
}

fn status_badge(status: &RowStatus) -> String {
    match status {
        RowStatus::Signed => format!("{GREEN}signed{RESET}"),
        RowStatus::Rejected { reason } => format!("{RED}rejected{RESET} {DIM}({reason}){RESET}"),
        RowStatus::PendingSignature { recipient: Some(r) } => {
            format!("{YELLOW}awaiting signature{RESET} {DIM}from {r}{RESET}")
        }
        RowStatus::PendingSignature { recipient: None } => format!("{YELLOW}draft{RESET}"),
    }
}

fn print_document(doc: &Document, users: &[FileUser]) {
    kv_line("ID", doc.id.as_str());
    kv_line("File", &doc.original_filename);
    kv_line("Owner", doc.owner.display_name());
    kv_line("Uploaded", &doc.upload_date);
    if let Some(size) = doc.size {
        kv_line("Size", &format!("{size} bytes"));
    }
    kv_line("Status", &status_badge(&doc.status(users)));
}

// ── Entry point ──────────────────────────────────────────────────────

fn init_tracing(verbose: bool, json: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("DOCFLOW_LOG").unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!();
            eprintln!("  {RED}{BOLD}✗ Error:{RESET} {e:#}");
            if needs_login(&e) {
                eprintln!("  {DIM}Run `docflow login` to sign in.{RESET}");
            }
            eprintln!();
            ExitCode::FAILURE
        }
    }
}

fn needs_login(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<ActionError>()
            .is_some_and(|e| e.navigation() == Some(Navigate::Login))
    })
}

/// Shared per-invocation context.
struct App {
    client: Arc<DocflowClient>,
    stored: Session,
    session: Session,
}

impl App {
    fn new(cli: &Cli) -> Result<Self> {
        let client = DocflowClient::with_config(ClientConfig {
            base_url: cli.addr.clone().unwrap_or_default(),
            ..ClientConfig::default()
        })
        .context("invalid server configuration")?;

        let session_file = match &cli.session_file {
            Some(path) => path.clone(),
            None => paths::default_session_file()?,
        };
        debug!(path = %session_file.display(), "using session file");
        let stored = Session::new(Arc::new(FileSessionStore::new(session_file)));

        // An explicit token wins over the stored one but is never persisted.
        let session = match cli.token.as_deref().filter(|t| !t.trim().is_empty()) {
            Some(token) => Session::new(Arc::new(MemorySessionStore::with_token(token))),
            None => stored.clone(),
        };

        Ok(Self {
            client: Arc::new(client),
            stored,
            session,
        })
    }

    fn auth(&self) -> AuthFlow {
        AuthFlow::new(self.client.clone(), self.stored.clone())
    }

    fn list(&self) -> DocumentListController {
        DocumentListController::new(self.client.clone(), self.session.clone())
    }

    fn detail(&self) -> DocumentDetailController {
        DocumentDetailController::new(self.client.clone(), self.session.clone())
    }
}

async fn run(cli: Cli) -> Result<()> {
    let app = App::new(&cli)?;
    match cli.command {
        Commands::Login { username, password } => cmd_login(&app, username, password).await,
        Commands::Register {
            username,
            email,
            password,
        } => cmd_register(&app, username, email, password).await,
        Commands::Logout => cmd_logout(&app).await,
        Commands::List => cmd_list(&app).await,
        Commands::Upload { path, name } => cmd_upload(&app, &path, name).await,
        Commands::Show { id } => cmd_show(&app, &DocumentId::from(id)).await,
        Commands::Share { id, email } => cmd_share(&app, &DocumentId::from(id), &email).await,
        Commands::Send { id, email } => cmd_send(&app, &DocumentId::from(id), &email).await,
        Commands::Sign { id } => cmd_sign(&app, &DocumentId::from(id)).await,
        Commands::Reject { id, reason } => cmd_reject(&app, &DocumentId::from(id), &reason).await,
        Commands::Replace { id, path } => cmd_replace(&app, &DocumentId::from(id), &path).await,
        Commands::Delete { id, yes } => cmd_delete(&app, &DocumentId::from(id), yes).await,
        Commands::Download { id, output } => cmd_download(&app, &DocumentId::from(id), output).await,
        Commands::View { id } => cmd_view(&app, &DocumentId::from(id)).await,
    }
}

// ── Auth ─────────────────────────────────────────────────────────────

fn prompt(label: &str) -> Result<String> {
    eprint!("{label}: ");
    std::io::stderr().flush().ok();
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_owned())
}

fn auth_error(failure: AuthFailure) -> anyhow::Error {
    match failure {
        AuthFailure::Rejected { errors } => {
            for e in &errors {
                eprintln!("  {RED}{}{RESET}: {}", e.field, e.message);
            }
            anyhow::anyhow!("authentication failed")
        }
        AuthFailure::Session(e) => anyhow::Error::new(e).context("could not store session"),
    }
}

async fn cmd_login(app: &App, username: Option<String>, password: Option<String>) -> Result<()> {
    let username = match username {
        Some(u) => u,
        None => prompt("Username")?,
    };
    let password = match password {
        Some(p) => p,
        None => prompt("Password")?,
    };
    app.auth()
        .login(&username, &password)
        .await
        .map_err(auth_error)?;
    success(&format!("Signed in as {BOLD}{username}{RESET}"));
    Ok(())
}

async fn cmd_register(
    app: &App,
    username: String,
    email: String,
    password: Option<String>,
) -> Result<()> {
    let password = match password {
        Some(p) => p,
        None => prompt("Password")?,
    };
    let registration = Registration {
        username,
        password,
        email,
    };
    app.auth()
        .register(&registration)
        .await
        .map_err(auth_error)?;
    success(&format!(
        "Account created, signed in as {BOLD}{}{RESET}",
        registration.username.trim()
    ));
    Ok(())
}

async fn cmd_logout(app: &App) -> Result<()> {
    app.auth().logout().await.context("could not clear session")?;
    success("Signed out");
    Ok(())
}

// ── Document list ────────────────────────────────────────────────────

async fn cmd_list(app: &App) -> Result<()> {
    let list = app.list();
    list.load().await.context("failed to load documents")?;
    print_rows(&list).await;
    Ok(())
}

async fn print_rows(list: &DocumentListController) {
    let rows = list.rows().await;
    header("📄", "Documents");
    if rows.is_empty() {
        println!("  {DIM}(none){RESET}");
        return;
    }
    for row in rows {
        let actions = row
            .actions
            .iter()
            .map(|a| a.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        println!(
            "  {BOLD}{:>6}{RESET}  {:<32} {}",
            row.document.id.as_str(),
            row.document.original_filename,
            status_badge(&row.status)
        );
        if !actions.is_empty() {
            println!("          {DIM}actions: {actions}{RESET}");
        }
    }
}

async fn read_upload(path: &Path, name: Option<String>) -> Result<FileUpload> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let name = match name {
        Some(n) => n,
        None => path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .with_context(|| format!("{} has no file name", path.display()))?,
    };
    let upload = FileUpload::new(name, bytes);
    Ok(match paths::guess_content_type(path) {
        Some(mime) => upload.with_content_type(mime),
        None => upload,
    })
}

async fn cmd_upload(app: &App, path: &Path, name: Option<String>) -> Result<()> {
    let upload = read_upload(path, name).await?;
    let list = app.list();
    list.upload(&upload)
        .await
        .with_context(|| format!("failed to upload {}", upload.name))?;
    success(&format!("Uploaded {BOLD}{}{RESET}", upload.name));
    print_rows(&list).await;
    Ok(())
}

/// Load the list first so the row's status gates the action.
async fn loaded_list(app: &App, id: &DocumentId) -> Result<DocumentListController> {
    let list = app.list();
    list.load().await.context("failed to load documents")?;
    if list.find(id).await.is_none() {
        warning(&format!("Document {id} is not in your list; trying anyway"));
    }
    Ok(list)
}

async fn cmd_send(app: &App, id: &DocumentId, email: &str) -> Result<()> {
    let list = loaded_list(app, id).await?;
    list.send(id, email)
        .await
        .with_context(|| format!("failed to send document {id}"))?;
    success(&format!("Sent document {id} to {email}"));
    print_rows(&list).await;
    Ok(())
}

async fn cmd_sign(app: &App, id: &DocumentId) -> Result<()> {
    let list = loaded_list(app, id).await?;
    list.sign(id)
        .await
        .with_context(|| format!("failed to sign document {id}"))?;
    success(&format!("Signed document {id}"));
    print_rows(&list).await;
    Ok(())
}

async fn cmd_reject(app: &App, id: &DocumentId, reason: &str) -> Result<()> {
    let list = loaded_list(app, id).await?;
    list.reject(id, reason)
        .await
        .with_context(|| format!("failed to reject document {id}"))?;
    success(&format!("Rejected document {id}"));
    print_rows(&list).await;
    Ok(())
}

// ── Document detail ──────────────────────────────────────────────────

async fn load_detail(app: &App, id: &DocumentId) -> Result<DocumentDetailController> {
    let detail = app.detail();
    detail
        .load(id)
        .await
        .with_context(|| format!("failed to load document {id}"))?;
    Ok(detail)
}

async fn print_detail(detail: &DocumentDetailController) {
    let Some(current) = detail.detail().await else {
        return;
    };
    header("📄", &current.document.original_filename);
    print_document(&current.document, &current.users);
    println!();
    header("👥", "Access");
    if current.users.is_empty() {
        println!("  {DIM}(owner only){RESET}");
    }
    for user in &current.users {
        let mut rights = Vec::new();
        if user.may_view() {
            rights.push("view");
        }
        if user.may_sign() {
            rights.push("sign");
        }
        kv_line(&user.email, &rights.join(", "));
    }
}

async fn cmd_show(app: &App, id: &DocumentId) -> Result<()> {
    let detail = load_detail(app, id).await?;
    print_detail(&detail).await;
    Ok(())
}

async fn cmd_share(app: &App, id: &DocumentId, email: &str) -> Result<()> {
    let detail = load_detail(app, id).await?;
    detail
        .add_user(email)
        .await
        .with_context(|| format!("failed to share document {id} with {email}"))?;
    success(&format!("Shared document {id} with {email}"));
    print_detail(&detail).await;
    Ok(())
}

async fn cmd_replace(app: &App, id: &DocumentId, path: &Path) -> Result<()> {
    let detail = load_detail(app, id).await?;
    let current = detail
        .detail()
        .await
        .map(|d| d.document.original_filename)
        .unwrap_or_default();
    let upload = read_upload(path, Some(current)).await?;
    detail
        .replace(&upload)
        .await
        .with_context(|| format!("failed to replace document {id}"))?;
    success(&format!("Replaced content of document {id}"));
    print_detail(&detail).await;
    Ok(())
}

fn confirm_on_stdin(message: &str) -> bool {
    match prompt(&format!("{message} [y/N]")) {
        Ok(answer) => matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
        Err(_) => false,
    }
}

async fn cmd_delete(app: &App, id: &DocumentId, yes: bool) -> Result<()> {
    let detail = load_detail(app, id).await?;
    let outcome = if yes {
        detail.delete(&|_: &str| true).await
    } else {
        detail.delete(&confirm_on_stdin).await
    };
    let outcome = outcome.with_context(|| format!("failed to delete document {id}"))?;

    match outcome {
        Some(_) => success(&format!("Deleted document {id}")),
        None => warning("Cancelled"),
    }
    Ok(())
}

async fn cmd_download(app: &App, id: &DocumentId, output: Option<PathBuf>) -> Result<()> {
    let detail = load_detail(app, id).await?;
    let file = detail
        .download()
        .await
        .with_context(|| format!("failed to download document {id}"))?;

    let output = match output {
        Some(path) => path,
        None => PathBuf::from(paths::safe_file_name(
            file.filename.as_deref().unwrap_or(id.as_str()),
        )),
    };
    tokio::fs::write(&output, &file.bytes)
        .await
        .with_context(|| format!("failed to write {}", output.display()))?;
    success(&format!(
        "Saved {} bytes to {BOLD}{}{RESET}",
        file.bytes.len(),
        output.display()
    ));
    Ok(())
}

async fn cmd_view(app: &App, id: &DocumentId) -> Result<()> {
    let detail = load_detail(app, id).await?;
    let preview = detail
        .view()
        .await
        .with_context(|| format!("failed to download document {id}"))?;
    match preview {
        Preview::Text(text) => println!("{text}"),
        Preview::Pdf => warning("PDF document; use `docflow download` to open it"),
        Preview::Image => warning("Image document; use `docflow download` to open it"),
        Preview::Unsupported => bail!("no inline preview for this document type"),
    }
    Ok(())
}
