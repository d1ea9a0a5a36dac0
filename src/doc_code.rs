//! Document code exchange.
//!
//! A sender uploads a file and gets a short one-time code (optionally
//! password protected); the receiver redeems the code to download the file.
//! Both sides see a history of sent and received codes, refreshed in the
//! background.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::api::{parse_timestamp, ApiError, DocCodeBackend, DocCodeRecord, GeneratedCode};
use crate::busy::{ActionOutcome, BusyFlag};
use crate::poller::Poller;
use crate::validation::{validate_exchange_password, ValidationError};

#[derive(Debug, Error)]
pub enum DocCodeError {
    #[error("{0}")]
    Input(&'static str),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// ============ History ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CodeStatus {
    Received,
    Expired,
    Pending,
}

/// Used codes are `Received`; unused ones expire at `expires_at`. A missing or
/// unparsable expiry counts as expired.
pub fn code_status(record: &DocCodeRecord, now: DateTime<Utc>) -> CodeStatus {
    if record.is_used {
        return CodeStatus::Received;
    }
    match record.expires_at.as_deref().and_then(parse_timestamp) {
        Some(expiry) if expiry > now => CodeStatus::Pending,
        _ => CodeStatus::Expired,
    }
}

/// `"<n> min left"` until expiry, or `"Expired"`.
pub fn time_left(expires_at: Option<&str>, now: DateTime<Utc>) -> String {
    match expires_at.and_then(parse_timestamp) {
        Some(expiry) if expiry > now => format!("{} min left", (expiry - now).num_minutes()),
        _ => "Expired".to_string(),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DocCodeHistory {
    pub sent: Vec<DocCodeRecord>,
    pub received: Vec<DocCodeRecord>,
}

// ============ Content-Disposition ============

/// File name from a `Content-Disposition` header. `filename*` (RFC 5987) wins
/// over `filename`. Directory components are stripped.
pub fn filename_from_disposition(header: &str) -> Option<String> {
    let mut plain = None;
    let mut extended = None;

    for param in header.split(';').map(str::trim) {
        let Some((key, value)) = param.split_once('=') else {
            continue;
        };
        match key.trim().to_ascii_lowercase().as_str() {
            "filename*" => {
                // charset'language'percent-encoded
                let encoded = value.trim().splitn(3, '\'').nth(2).unwrap_or(value.trim());
                extended = urlencoding::decode(encoded).ok().map(|v| v.into_owned());
            }
            "filename" => {
                plain = Some(value.trim().trim_matches('"').to_string());
            }
            _ => {}
        }
    }

    extended
        .or(plain)
        .and_then(|name| {
            name.rsplit(&['/', '\\'][..])
                .next()
                .map(|base| base.trim().to_string())
        })
        .filter(|name| !name.is_empty() && name != "." && name != "..")
}

/// `name` for attempt 0, `stem (n).ext` after that.
fn candidate_name(name: &str, n: u32) -> String {
    if n == 0 {
        return name.to_string();
    }
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{} ({}).{}", stem, n, ext),
        _ => format!("{} ({})", name, n),
    }
}

/// Write `bytes` to `dir/name`, or `dir/stem (n).ext` for the first free
/// `n`. Files are opened with `create_new`, so a file that appears after the
/// name was picked is still never truncated.
async fn write_new_file(dir: &Path, name: &str, bytes: &[u8]) -> std::io::Result<PathBuf> {
    let mut n = 0;
    loop {
        let path = dir.join(candidate_name(name, n));
        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(mut file) => {
                file.write_all(bytes).await?;
                file.flush().await?;
                return Ok(path);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => n += 1,
            Err(e) => return Err(e),
        }
    }
}

// ============ Exchange ============

pub struct DocCodeExchange {
    backend: Arc<dyn DocCodeBackend>,
    history: RwLock<DocCodeHistory>,
    generating: BusyFlag,
    receiving: BusyFlag,
    refreshing: BusyFlag,
}

impl DocCodeExchange {
    pub fn new(backend: Arc<dyn DocCodeBackend>) -> Self {
        Self {
            backend,
            history: RwLock::new(DocCodeHistory::default()),
            generating: BusyFlag::new(),
            receiving: BusyFlag::new(),
            refreshing: BusyFlag::new(),
        }
    }

    /// Upload `file` and return its code. A non-empty password must meet the
    /// exchange password policy.
    pub async fn generate(
        &self,
        file: &Path,
        password: Option<&str>,
    ) -> Result<ActionOutcome<GeneratedCode>, DocCodeError> {
        if !file.is_file() {
            return Err(DocCodeError::Input("Select a file first"));
        }
        let password = password.filter(|p| !p.is_empty());
        if let Some(pw) = password {
            validate_exchange_password(pw)?;
        }
        let Some(_guard) = self.generating.try_acquire() else {
            return Ok(ActionOutcome::Suppressed);
        };

        let generated = self.backend.generate_doc_code(file, password).await?;
        info!("Generated document code for {:?}", file.file_name().unwrap_or_default());
        self.refresh().await;
        Ok(ActionOutcome::Completed(generated))
    }

    /// Redeem `code` and save the document into `dir`. An existing file with
    /// the same name is never overwritten.
    pub async fn receive(
        &self,
        code: &str,
        password: Option<&str>,
        dir: &Path,
    ) -> Result<ActionOutcome<PathBuf>, DocCodeError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(DocCodeError::Input("Enter document code"));
        }
        let Some(_guard) = self.receiving.try_acquire() else {
            return Ok(ActionOutcome::Suppressed);
        };

        let received = self
            .backend
            .receive_doc_code(code, password.filter(|p| !p.is_empty()))
            .await?;

        tokio::fs::create_dir_all(dir).await?;
        let path = write_new_file(dir, &received.file_name, &received.bytes).await?;
        info!("Document received to {}", path.display());

        self.refresh().await;
        Ok(ActionOutcome::Completed(path))
    }

    async fn fetch_history(&self) -> Result<DocCodeHistory, ApiError> {
        let (sent, received) = tokio::try_join!(
            self.backend.doc_code_sent(),
            self.backend.doc_code_received()
        )?;
        Ok(DocCodeHistory { sent, received })
    }

    /// Foreground history load; errors are returned.
    pub async fn load_history(&self) -> Result<DocCodeHistory, ApiError> {
        let history = self.fetch_history().await?;
        *self.history.write().await = history.clone();
        Ok(history)
    }

    /// Background history refresh; failures are logged and the previous
    /// history is kept.
    pub async fn refresh(&self) -> ActionOutcome<bool> {
        let Some(_guard) = self.refreshing.try_acquire() else {
            return ActionOutcome::Suppressed;
        };
        match self.fetch_history().await {
            Ok(history) => {
                *self.history.write().await = history;
                ActionOutcome::Completed(true)
            }
            Err(e) => {
                warn!("Background doc-code history refresh failed: {}", e);
                ActionOutcome::Completed(false)
            }
        }
    }

    pub async fn history(&self) -> DocCodeHistory {
        self.history.read().await.clone()
    }

    pub fn start_polling(self: &Arc<Self>, period: Duration) -> Poller {
        let exchange = Arc::clone(self);
        Poller::start("doc-code-history", period, move || {
            let exchange = exchange.clone();
            async move {
                exchange.refresh().await;
            }
        })
    }
}
