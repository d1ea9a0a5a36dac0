//! DocRoute CLI - share links, QR verification and document codes
//!
//! Usage:
//!   docroute-cli login --email <email>                Sign in
//!   docroute-cli share open <token>                   Open a share link
//!   docroute-cli share download <token> --format pdf  Download a shared document
//!   docroute-cli qr scan <token>                      Verify a physical document
//!   docroute-cli qr create <pdf> --owner-name ...     Track a physical document
//!   docroute-cli code send <file>                     Get a one-time document code
//!   docroute-cli analytics --watch                    Live dashboard numbers

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::future::Future;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use docroute::analytics::{AnalyticsDashboard, AnalyticsSnapshot, SECTIONS};
use docroute::api::{
    format_timestamp, DownloadFormat, NewQrDocument, QrDocument, SharePermission, ShareToken,
};
use docroute::busy::ActionOutcome;
use docroute::config::ClientConfig;
use docroute::doc_code::{code_status, time_left, DocCodeExchange, DocCodeHistory};
use docroute::qr::{OwnerDashboard, QrVerifier, QrView};
use docroute::qr_tracking::QrTracking;
use docroute::share::{ShareView, ShareViewer, SubmitOutcome, UnlockState};
use docroute::validation::validate_login;
use docroute::{init_logging, load_config, ApiClient, SessionHandle, SessionStore};

const MAX_PASSWORD_ATTEMPTS: u32 = 3;

#[derive(Parser)]
#[command(
    name = "docroute-cli",
    about = "DocRoute CLI - share links, QR verification and document codes",
    version
)]
struct Cli {
    /// Backend base URL (overrides the config file and DOCROUTE_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in with email and password
    Login {
        #[arg(long)]
        email: String,
        /// Prompted on stdin when omitted
        #[arg(long)]
        password: Option<String>,
    },
    /// Sign out and forget the stored session
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Open, edit, download or manage share links
    #[command(subcommand)]
    Share(ShareCommand),
    /// Verify physical documents by QR token
    #[command(subcommand)]
    Qr(QrCommand),
    /// Exchange documents with one-time codes
    #[command(subcommand)]
    Code(CodeCommand),
    /// Show the analytics dashboard
    Analytics {
        /// Keep running and print each refresh
        #[arg(long)]
        watch: bool,
    },
}

#[derive(Subcommand)]
enum ShareCommand {
    /// Show a shared document
    Open {
        token: String,
        #[arg(long)]
        password: Option<String>,
    },
    /// Replace the content of a share opened with edit access
    Edit {
        token: String,
        #[arg(long, conflicts_with = "file", required_unless_present = "file")]
        content: Option<String>,
        /// Read the new content from a file
        #[arg(long)]
        file: Option<PathBuf>,
        #[arg(long)]
        password: Option<String>,
    },
    /// Download a share opened with download access
    Download {
        token: String,
        #[arg(long, value_enum)]
        format: FormatArg,
        /// Target directory (default: configured download directory)
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long)]
        password: Option<String>,
    },
    /// Create a share link for one of your documents
    Create {
        document_id: i64,
        #[arg(long, value_enum, default_value = "view")]
        permission: PermissionArg,
        /// Protect the link with a password
        #[arg(long)]
        password: Option<String>,
    },
    /// Revoke a share link
    Revoke { token: String },
}

#[derive(Subcommand)]
enum QrCommand {
    /// Public verification of a QR token
    Scan { token: String },
    /// Owner access with the QR password
    Owner {
        token: String,
        #[arg(long)]
        password: Option<String>,
    },
    /// Register a PDF for physical tracking
    Create {
        pdf: PathBuf,
        #[arg(long)]
        owner_name: String,
        #[arg(long)]
        owner_email: String,
        /// 10-digit contact number
        #[arg(long)]
        owner_contact: String,
        /// Display name (defaults to the PDF's name)
        #[arg(long, default_value = "")]
        file_name: String,
        /// QR owner password (prompted when omitted)
        #[arg(long)]
        password: Option<String>,
        /// Hide owner details from public scans
        #[arg(long)]
        restricted: bool,
    },
    /// Your tracked documents
    List,
    /// Print the active QR token of a tracked document, issuing one if needed
    Link { id: i64 },
    /// Revoke a QR token
    Revoke { token: String },
    /// Delete a tracked document
    Delete { id: i64 },
}

#[derive(Subcommand)]
enum CodeCommand {
    /// Upload a file and print its one-time code
    Send {
        file: PathBuf,
        #[arg(long)]
        password: Option<String>,
    },
    /// Redeem a code and save the document
    Receive {
        code: String,
        #[arg(long)]
        password: Option<String>,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Sent and received codes
    History {
        #[arg(long)]
        watch: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    Pdf,
    Docx,
}

impl From<FormatArg> for DownloadFormat {
    fn from(f: FormatArg) -> Self {
        match f {
            FormatArg::Pdf => DownloadFormat::Pdf,
            FormatArg::Docx => DownloadFormat::Docx,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum PermissionArg {
    View,
    Edit,
    Download,
}

impl From<PermissionArg> for SharePermission {
    fn from(p: PermissionArg) -> Self {
        match p {
            PermissionArg::View => SharePermission::View,
            PermissionArg::Edit => SharePermission::Edit,
            PermissionArg::Download => SharePermission::Download,
        }
    }
}

struct App {
    client: Arc<ApiClient>,
    session: SessionHandle,
    config: ClientConfig,
    json: bool,
}

impl App {
    fn emit<T: Serialize>(&self, value: &T, text: impl Fn(&T)) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            text(value);
        }
        Ok(())
    }
}

// ============ Helpers ============

fn prompt(label: &str) -> Result<String> {
    eprint!("{}", label);
    std::io::stderr().flush()?;
    let mut line = String::new();
    let read = std::io::stdin().lock().read_line(&mut line)?;
    if read == 0 {
        bail!("No input on stdin");
    }
    Ok(line.trim_end_matches(&['\r', '\n'][..]).to_string())
}

/// Open a share and, if it is password protected, unlock it with `password`
/// or with passwords read from stdin.
async fn unlock(viewer: &ShareViewer, password: Option<String>) -> Result<()> {
    let mut state = viewer.open().await;
    let mut supplied = password;
    let mut attempts = 0;

    loop {
        match state {
            UnlockState::Unlocked(_) => return Ok(()),
            UnlockState::Error(e) => return Err(e.into()),
            UnlockState::Loading => bail!("Share is still loading"),
            UnlockState::PasswordRequired { message } => {
                if attempts >= MAX_PASSWORD_ATTEMPTS {
                    bail!("{}", message.unwrap_or_else(|| "Password required".to_string()));
                }
                if let Some(msg) = message {
                    eprintln!("{}", msg);
                }
                let password = match supplied.take() {
                    Some(p) => p,
                    None => prompt("This document is password protected. Password: ")?,
                };
                if password.trim().is_empty() {
                    bail!("Password required");
                }
                attempts += 1;
                state = match viewer.submit_password(&password).await {
                    SubmitOutcome::Resolved(state) => state,
                    SubmitOutcome::Ignored => viewer.state(),
                };
            }
        }
    }
}

/// Re-print whenever `current` yields a different value, until Ctrl+C.
async fn watch<T, F, Fut>(
    mut current: F,
    mut last: T,
    print: impl Fn(&T) -> Result<()>,
) -> Result<()>
where
    T: PartialEq,
    F: FnMut() -> Fut,
    Fut: Future<Output = T>,
{
    eprintln!("Watching for updates, press Ctrl+C to stop");
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                let value = current().await;
                if value != last {
                    print(&value)?;
                    last = value;
                }
            }
        }
    }
    Ok(())
}

fn or_dash(value: Option<&str>) -> &str {
    value.filter(|v| !v.is_empty()).unwrap_or("—")
}

// ============ Printers ============

fn print_share(view: &ShareView) {
    println!("{}  [{}]", view.title, view.badge);
    if let Some(tracking) = &view.tracking_id {
        println!("Tracking ID:  {}", tracking);
    }
    println!("Last updated: {}", view.last_updated);
    if let Some(w) = &view.watermark {
        println!("Watermark:    {} (opacity {:.2})", w.text, w.opacity);
    }
    println!();
    println!("{}", view.content);
    println!();
    if let Some(notice) = view.notice {
        println!("{}", notice);
    } else {
        let actions: Vec<String> = view.controls.iter().map(|c| format!("{:?}", c)).collect();
        println!("Available actions: {}", actions.join(", "));
    }
    if let Some(err) = &view.error {
        println!("Error: {}", err);
    }
}

fn print_qr(view: &QrView) {
    println!("[{}]", format!("{:?}", view.badge).to_uppercase());
    if !view.message.is_empty() {
        println!("{}", view.message);
    }
    println!("Name:    {}", view.owner_name);
    println!("Email:   {}", view.owner_email);
    println!("Contact: {}", view.owner_contact);
    if view.owner_login_offered {
        println!();
        println!("Owner? Run `docroute-cli qr owner <token>` to view tracking history.");
    }
}

fn print_tracked(documents: &[QrDocument]) {
    if documents.is_empty() {
        println!("No tracked documents");
        return;
    }
    for d in documents {
        let qr = d
            .active_qr
            .as_ref()
            .map(|q| q.token.as_str())
            .unwrap_or("no active QR");
        println!(
            "{:>5}  {}  {}  {}  [{}]{}",
            d.id,
            d.tracking_id,
            d.file_name,
            format_timestamp(d.created_at.as_deref()),
            qr,
            if d.restrict_public_view { "  restricted" } else { "" }
        );
    }
}

fn print_owner(dashboard: &OwnerDashboard) {
    let doc = &dashboard.document;
    println!("Tracking ID: {}", or_dash(doc.tracking_id.as_deref()));
    println!("File:        {}", or_dash(doc.file_name.as_deref()));

    println!("\nScan history ({})", dashboard.scans.len());
    for s in &dashboard.scans {
        let place: Vec<&str> = [s.city.as_deref(), s.region.as_deref(), s.country.as_deref()]
            .into_iter()
            .flatten()
            .collect();
        println!(
            "  {}  {}  {}  {}",
            format_timestamp(s.scanned_at.as_deref()),
            s.scanned_by,
            or_dash(s.ip_address.as_deref()),
            if place.is_empty() { "—".to_string() } else { place.join(", ") }
        );
    }

    println!("\nAudit log ({})", dashboard.audit.len());
    for a in &dashboard.audit {
        println!(
            "  {}  {}  {}",
            format_timestamp(a.created_at.as_deref()),
            a.action,
            or_dash(a.ip_address.as_deref())
        );
    }

    println!(
        "\nSubmissions ({}, {} received)",
        dashboard.submissions.len(),
        dashboard.received_count()
    );
    for s in &dashboard.submissions {
        println!(
            "  {} @ {}  {}  submitted {}  received {}",
            s.submitted_to,
            s.submitted_location,
            s.status,
            format_timestamp(s.submitted_at.as_deref()),
            format_timestamp(s.received_at.as_deref())
        );
    }

    if let Some(err) = &dashboard.history_error {
        println!("\nHistory unavailable: {}", err);
    }
}

fn print_history(history: &DocCodeHistory) {
    let now = chrono::Utc::now();
    println!("Sent");
    if history.sent.is_empty() {
        println!("  No records");
    }
    for r in &history.sent {
        println!(
            "  {}  {:?}  {}  {}",
            r.code,
            code_status(r, now),
            time_left(r.expires_at.as_deref(), now),
            r.file_name
        );
    }
    println!("Received");
    if history.received.is_empty() {
        println!("  No records");
    }
    for r in &history.received {
        println!(
            "  {}  {}  {}",
            r.code,
            r.file_name,
            format_timestamp(r.created_at.as_deref())
        );
    }
}

fn print_analytics(snapshot: &AnalyticsSnapshot) {
    if let Some(user) = &snapshot.user {
        println!("Signed in as {}", user.display_name());
    }
    println!("Updated {}", snapshot.fetched_at.format("%Y-%m-%d %H:%M:%S"));
    for name in SECTIONS {
        println!("\n{}", name);
        match snapshot.section(name) {
            Some(serde_json::Value::Object(map)) if !map.is_empty() => {
                for (key, value) in map {
                    match value {
                        serde_json::Value::Array(items) => {
                            println!("  {}: {} entries", key, items.len())
                        }
                        serde_json::Value::Object(_) => println!("  {}: {}", key, value),
                        serde_json::Value::String(s) => println!("  {}: {}", key, s),
                        other => println!("  {}: {}", key, other),
                    }
                }
            }
            _ => println!("  No data"),
        }
    }
}

// ============ Commands ============

async fn run_share(app: &App, command: ShareCommand) -> Result<()> {
    match command {
        ShareCommand::Open { token, password } => {
            let viewer = ShareViewer::new(app.client.clone(), &token);
            unlock(&viewer, password).await?;
            let view = viewer.view().ok_or_else(|| anyhow!("Share is not available"))?;
            app.emit(&view, print_share)
        }
        ShareCommand::Edit { token, content, file, password } => {
            let content = match (content, file) {
                (Some(content), _) => content,
                (None, Some(path)) => tokio::fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("Cannot read {}", path.display()))?,
                (None, None) => bail!("Provide --content or --file"),
            };
            let viewer = ShareViewer::new(app.client.clone(), &token);
            unlock(&viewer, password).await?;
            if !viewer.begin_edit() {
                bail!("This share link does not allow editing");
            }
            viewer.set_draft(content);
            if let ActionOutcome::Completed(()) = viewer.save().await? {
                println!("Changes saved");
            }
            Ok(())
        }
        ShareCommand::Download { token, format, out, password } => {
            let viewer = ShareViewer::new(app.client.clone(), &token);
            unlock(&viewer, password).await?;
            let dir = out.unwrap_or_else(|| app.config.download_dir.clone());
            if let ActionOutcome::Completed(path) = viewer.download(format.into(), &dir).await? {
                println!("Saved to {}", path.display());
            }
            Ok(())
        }
        ShareCommand::Create { document_id, permission, password } => {
            let created = app
                .client
                .create_share_link(document_id, permission.into(), password.as_deref())
                .await?;
            app.emit(&created, |c| {
                println!("Share token: {}", c.token);
                println!("Expires:     {}", format_timestamp(c.expires_at.as_deref()));
            })
        }
        ShareCommand::Revoke { token } => {
            let token = ShareToken::parse(&token)?;
            app.client.revoke_share_link(&token).await?;
            println!("Share link revoked");
            Ok(())
        }
    }
}

async fn run_qr(app: &App, command: QrCommand) -> Result<()> {
    match command {
        QrCommand::Scan { token } => {
            let verifier = QrVerifier::new(app.client.clone(), &token)?;
            let view = verifier.scan().await?;
            app.emit(&view, print_qr)
        }
        QrCommand::Owner { token, password } => {
            let verifier = QrVerifier::new(app.client.clone(), &token)?;
            let password = match password {
                Some(p) => p,
                None => prompt("Owner password: ")?,
            };
            let ActionOutcome::Completed(dashboard) = verifier.owner_login(&password).await? else {
                return Ok(());
            };
            if !app.json {
                if let Some(preview) = dashboard.document.pdf_preview.as_deref() {
                    println!("Preview:     {}", app.client.resolve_link(preview)?);
                }
            }
            app.emit(&dashboard, print_owner)
        }
        QrCommand::Create {
            pdf,
            owner_name,
            owner_email,
            owner_contact,
            file_name,
            password,
            restricted,
        } => {
            let owner_password = match password {
                Some(p) => p,
                None => prompt("QR owner password: ")?,
            };
            let doc = NewQrDocument {
                owner_name,
                owner_email,
                owner_contact,
                owner_password,
                file_name,
                restrict_public_view: restricted,
                pdf,
            };
            let tracking = QrTracking::new(app.client.clone());
            if let ActionOutcome::Completed(created) = tracking.create(&doc).await? {
                app.emit(&created, |d| {
                    println!("Tracking ID generated successfully: {}", d.tracking_id);
                    if let Some(qr) = &d.active_qr {
                        println!("QR token: {}", qr.token);
                    }
                })?;
            }
            Ok(())
        }
        QrCommand::List => {
            let documents = QrTracking::new(app.client.clone()).load().await?;
            app.emit(&documents, |docs| print_tracked(docs))
        }
        QrCommand::Link { id } => {
            let token = QrTracking::new(app.client.clone()).active_token(id).await?;
            app.emit(&token, |t| println!("{}", t))
        }
        QrCommand::Revoke { token } => {
            QrTracking::new(app.client.clone()).revoke(&token).await?;
            println!("QR revoked");
            Ok(())
        }
        QrCommand::Delete { id } => {
            QrTracking::new(app.client.clone()).delete(id).await?;
            println!("Deleted successfully");
            Ok(())
        }
    }
}

async fn run_code(app: &App, command: CodeCommand) -> Result<()> {
    let exchange = Arc::new(DocCodeExchange::new(app.client.clone()));
    match command {
        CodeCommand::Send { file, password } => {
            if let ActionOutcome::Completed(generated) =
                exchange.generate(&file, password.as_deref()).await?
            {
                app.emit(&generated, |g| {
                    println!("Code:    {}", g.code);
                    println!("Expires: {}", format_timestamp(g.expires_at.as_deref()));
                })?;
            }
            Ok(())
        }
        CodeCommand::Receive { code, password, out } => {
            let dir = out.unwrap_or_else(|| app.config.download_dir.clone());
            if let ActionOutcome::Completed(path) =
                exchange.receive(&code, password.as_deref(), &dir).await?
            {
                println!("Document downloaded to {}", path.display());
            }
            Ok(())
        }
        CodeCommand::History { watch: keep_watching } => {
            let history = exchange.load_history().await?;
            app.emit(&history, print_history)?;
            if keep_watching {
                let _poller = exchange.start_polling(app.config.doc_code_refresh());
                let ex = exchange.clone();
                watch(
                    move || {
                        let ex = ex.clone();
                        async move { ex.history().await }
                    },
                    history,
                    |h| app.emit(h, print_history),
                )
                .await?;
            }
            Ok(())
        }
    }
}

async fn run_analytics(app: &App, keep_watching: bool) -> Result<()> {
    let dashboard = Arc::new(AnalyticsDashboard::new(app.client.clone()));
    let snapshot = dashboard.load().await?;
    app.emit(&snapshot, print_analytics)?;

    if keep_watching {
        let _poller = dashboard.start_polling(app.config.analytics_refresh());
        let d = dashboard.clone();
        watch(
            move || {
                let d = d.clone();
                async move { d.latest().await }
            },
            Some(snapshot),
            |s| match s {
                Some(s) => app.emit(s, print_analytics),
                None => Ok(()),
            },
        )
        .await?;
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = load_config();
    if let Some(url) = cli.api_url {
        config.api_url = url;
    }

    let store = SessionStore::default_location();
    let session = store.load().into_handle();
    let client = Arc::new(ApiClient::new(&config, session.clone())?);
    let app = App { client, session, config, json: cli.json };

    let result = match cli.command {
        Commands::Login { email, password } => {
            let password = match password {
                Some(p) => p,
                None => prompt("Password: ")?,
            };
            let (email, password) = validate_login(&email, &password)?;
            let user = app.client.login(&email, &password).await?;
            println!("Signed in as {}", user.display_name());
            Ok(())
        }
        Commands::Logout => {
            if app.session.read().await.is_authenticated() {
                app.client.logout().await;
                println!("Signed out");
            } else {
                println!("Not signed in");
            }
            Ok(())
        }
        Commands::Whoami => {
            if !app.session.read().await.is_authenticated() {
                bail!("Not signed in - run `docroute-cli login`");
            }
            let user = app.client.me().await?;
            app.emit(&user, |u| {
                println!("{}", u.display_name());
                println!("{}", or_dash(u.email.as_deref()));
            })
        }
        Commands::Share(command) => run_share(&app, command).await,
        Commands::Qr(command) => run_qr(&app, command).await,
        Commands::Code(command) => run_code(&app, command).await,
        Commands::Analytics { watch } => run_analytics(&app, watch).await,
    };

    // Persist sign-in, sign-out, and sessions cleared by a rejected token
    if let Err(e) = store.save(&*app.session.read().await) {
        warn!("Failed to save session: {}", e);
    }
    result
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
