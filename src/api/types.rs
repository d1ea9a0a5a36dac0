//! Shared types for the DocRoute REST API
//!
//! Wire representations returned by the backend, the share token newtype, and
//! the two error layers: `ApiError` for transport/HTTP failures and
//! `ShareError` for what the share flow reports to the user.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

// ============ Share Token ============

/// Opaque share grant identifier (document share link or physical QR code)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShareToken(String);

impl ShareToken {
    /// Accepts any non-empty token without whitespace or URL delimiters.
    pub fn parse(raw: &str) -> Result<Self, ShareError> {
        let trimmed = raw.trim();
        if trimmed.is_empty()
            || trimmed
                .chars()
                .any(|c| c.is_whitespace() || matches!(c, '/' | '?' | '#'))
        {
            return Err(ShareError::InvalidToken);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShareToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============ Share Bundle ============

/// Access scope encoded in a share grant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum SharePermission {
    #[default]
    View,
    Edit,
    Download,
}

impl From<String> for SharePermission {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "view" => SharePermission::View,
            "edit" => SharePermission::Edit,
            "download" => SharePermission::Download,
            other => {
                tracing::warn!("Unknown share permission '{}', treating as view", other);
                SharePermission::View
            }
        }
    }
}

impl fmt::Display for SharePermission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SharePermission::View => write!(f, "view"),
            SharePermission::Edit => write!(f, "edit"),
            SharePermission::Download => write!(f, "download"),
        }
    }
}

/// Document metadata and content exposed through a share link
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedDocument {
    pub id: i64,
    pub file_name: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tracking_id: Option<String>,
    #[serde(default)]
    pub last_updated_at: Option<String>,
}

fn default_watermark_opacity() -> f64 {
    0.15
}

/// Display-only overlay shown above shared content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Watermark {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default = "default_watermark_opacity")]
    pub opacity: f64,
}

/// Response of `GET /documents/share/{token}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShareBundle {
    #[serde(default)]
    pub document: Option<SharedDocument>,
    #[serde(default)]
    pub watermark: Option<Watermark>,
    #[serde(default)]
    pub permission: SharePermission,
}

/// Binary formats offered by `GET /documents/share/{token}/download`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadFormat {
    Docx,
    Pdf,
}

impl DownloadFormat {
    pub const ALL: [DownloadFormat; 2] = [DownloadFormat::Docx, DownloadFormat::Pdf];

    /// Query value and file extension
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadFormat::Docx => "docx",
            DownloadFormat::Pdf => "pdf",
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            DownloadFormat::Docx => 0,
            DownloadFormat::Pdf => 1,
        }
    }
}

impl std::str::FromStr for DownloadFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "docx" => Ok(DownloadFormat::Docx),
            "pdf" => Ok(DownloadFormat::Pdf),
            other => Err(format!("Unsupported format: {} (expected pdf or docx)", other)),
        }
    }
}

/// Response of `POST /documents/{id}/share`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareLinkCreated {
    pub token: String,
    #[serde(default)]
    pub expires_at: Option<String>,
}

// ============ Physical QR ============

/// Response of `GET /qr/scan/{token}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QrVerification {
    pub verified: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub owner_name: Option<String>,
    #[serde(default)]
    pub owner_email: Option<String>,
    #[serde(default)]
    pub owner_contact: Option<String>,
}

/// Response of `POST /qr/owner-login/{token}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QrOwnerBundle {
    pub id: i64,
    #[serde(default)]
    pub tracking_id: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    /// Backend-relative path of the PDF preview (e.g. `/qr/preview/12`)
    #[serde(default)]
    pub pdf_preview: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanLogEntry {
    pub id: i64,
    pub scanned_by: String,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub scanned_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: i64,
    pub action: String,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Hand-over record of a physical document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub id: i64,
    #[serde(default)]
    pub qr_document_id: Option<i64>,
    #[serde(default)]
    pub file_name: Option<String>,
    pub submitted_to: String,
    pub submitted_location: String,
    #[serde(default)]
    pub remarks: Option<String>,
    /// `SUBMITTED` or `RECEIVED`
    pub status: String,
    #[serde(default)]
    pub submitted_at: Option<String>,
    #[serde(default)]
    pub received_at: Option<String>,
}

impl Submission {
    pub fn is_received(&self) -> bool {
        self.status.eq_ignore_ascii_case("received")
    }
}

// ============ QR Tracking (owner side) ============

/// One printed QR code of a tracked document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QrCode {
    pub id: i64,
    pub token: String,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Tracked physical document, as returned by `/qr/create` and `/qr/documents`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QrDocument {
    pub id: i64,
    pub tracking_id: String,
    pub owner_name: String,
    pub owner_email: String,
    #[serde(default)]
    pub owner_contact: Option<String>,
    pub file_name: String,
    #[serde(default)]
    pub preview_url: Option<String>,
    #[serde(default)]
    pub restrict_public_view: bool,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub qr_codes: Vec<QrCode>,
    #[serde(default)]
    pub active_qr: Option<QrCode>,
}

/// Response of `POST /qr/generate/{id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QrGenerated {
    pub token: String,
}

/// Form fields of `POST /qr/create`; the PDF is sent as the `file` part.
#[derive(Debug, Clone, PartialEq)]
pub struct NewQrDocument {
    pub owner_name: String,
    pub owner_email: String,
    pub owner_contact: String,
    pub owner_password: String,
    pub file_name: String,
    pub restrict_public_view: bool,
    pub pdf: PathBuf,
}

// ============ Account ============

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub id: Option<i64>,
    /// Set by `/auth/login`
    #[serde(default)]
    pub name: Option<String>,
    /// Set by `/auth/me`
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl UserProfile {
    pub fn display_name(&self) -> &str {
        self.full_name
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or("User")
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct LoginResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub user: Option<UserProfile>,
}

// ============ Document Codes ============

/// Response of `POST /doc-code/generate`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedCode {
    pub code: String,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub expires_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocCodeRecord {
    pub code: String,
    pub file_name: String,
    #[serde(default)]
    pub file_type: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub expires_at: Option<String>,
    #[serde(default)]
    pub is_used: bool,
    /// `active`, `expired` or `used` when the backend computes it
    #[serde(default)]
    pub status: Option<String>,
}

/// Binary body plus the file name announced by the server
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

// ============ Error Types ============

/// Transport-level failure talking to the backend
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ApiError {
    /// Non-success status; `detail` is the backend's message
    #[error("HTTP {status}: {detail}")]
    Http { status: u16, detail: String },

    /// 401 on an authenticated endpoint; the session has been cleared
    #[error("Session expired - please log in again")]
    Unauthorized,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Parse error: {0}")]
    Decode(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            ApiError::Unauthorized => Some(401),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else {
            ApiError::Network(e.to_string())
        }
    }
}

/// User-facing failure of the share and QR flows
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ShareError {
    #[error("Invalid share link")]
    InvalidToken,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Expired(String),

    #[error("{0}")]
    Revoked(String),

    #[error("Password required")]
    PasswordRequired,

    #[error("Incorrect password")]
    PasswordIncorrect,

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl ShareError {
    /// Password failures can be fixed by re-prompting; everything else is terminal.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ShareError::PasswordRequired | ShareError::PasswordIncorrect)
    }

    /// Classify an API failure. `password_sent` separates a missing password
    /// from a wrong one when the backend detail is ambiguous.
    pub fn from_api(err: ApiError, password_sent: bool) -> Self {
        match err {
            ApiError::Http { status, detail } => {
                let lower = detail.to_lowercase();
                if status == 401 || (status < 500 && lower.contains("password")) {
                    return if lower.contains("required") || !password_sent {
                        ShareError::PasswordRequired
                    } else {
                        ShareError::PasswordIncorrect
                    };
                }
                match status {
                    410 if lower.contains("revoked") => ShareError::Revoked(detail),
                    410 => ShareError::Expired(detail),
                    404 => ShareError::NotFound(detail),
                    403 => ShareError::PermissionDenied(detail),
                    400 | 422 => ShareError::Rejected(detail),
                    s if s >= 500 => ShareError::ServerError(detail),
                    s => ShareError::ServerError(format!("HTTP {}: {}", s, detail)),
                }
            }
            ApiError::Unauthorized => {
                ShareError::PermissionDenied("Session expired - please log in again".to_string())
            }
            ApiError::Network(msg) => ShareError::NetworkError(msg),
            ApiError::Decode(msg) => ShareError::ServerError(format!("Malformed response: {}", msg)),
            ApiError::InvalidConfig(msg) => ShareError::Rejected(msg),
        }
    }
}

impl From<std::io::Error> for ShareError {
    fn from(e: std::io::Error) -> Self {
        ShareError::Io(e.to_string())
    }
}

/// Parse a backend timestamp. Naive values (no offset) are UTC.
pub fn parse_timestamp(raw: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&chrono::Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| chrono::NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Render an optional backend timestamp for display, `"—"` when absent or unparsable.
pub fn format_timestamp(value: Option<&str>) -> String {
    value
        .and_then(parse_timestamp)
        .map(|dt| {
            dt.with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        })
        .unwrap_or_else(|| "—".to_string())
}
