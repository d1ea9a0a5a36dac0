//! DocRoute REST API
//!
//! Each flow talks to the backend through its own trait (`ShareBackend`,
//! `QrBackend`, `QrTrackingBackend`, `DocCodeBackend`, `AnalyticsBackend`).
//! `ApiClient` implements all of them against the real REST API; tests
//! substitute in-memory fakes.
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌────────────┐
//! │ ShareViewer  │   │ QrVerifier,  │   │ Analytics, │
//! │ (unlock/gate)│   │ QrTracking   │   │ DocCodes   │
//! └──────┬───────┘   └──────┬───────┘   └─────┬──────┘
//!        ▼                  ▼                 ▼
//!   ShareBackend         QrBackend,     DocCodeBackend,
//!        │           QrTrackingBackend  AnalyticsBackend
//!        └──────────────────┼─────────────────┘
//!                           ▼
//!             ApiClient ──── http_retry ──── reqwest
//! ```

pub mod types;
pub mod http_retry;
pub mod client;

pub use types::*;
pub use client::ApiClient;

use async_trait::async_trait;
use std::path::Path;

/// Backend operations behind a document share link
#[async_trait]
pub trait ShareBackend: Send + Sync {
    /// `GET /documents/share/{token}`; `password` is only sent when present
    async fn open_share(
        &self,
        token: &ShareToken,
        password: Option<&str>,
    ) -> Result<ShareBundle, ApiError>;

    /// `PUT /documents/share/{token}/edit`
    async fn save_share(&self, token: &ShareToken, content: &str) -> Result<(), ApiError>;

    /// `GET /documents/share/{token}/download?format=...`
    async fn download_share(
        &self,
        token: &ShareToken,
        format: DownloadFormat,
    ) -> Result<Vec<u8>, ApiError>;
}

/// Backend operations behind a physical-document QR code
#[async_trait]
pub trait QrBackend: Send + Sync {
    /// `GET /qr/scan/{token}`
    async fn scan(&self, token: &ShareToken) -> Result<QrVerification, ApiError>;

    /// `POST /qr/owner-login/{token}`
    async fn owner_login(&self, token: &ShareToken, password: &str)
        -> Result<QrOwnerBundle, ApiError>;

    async fn scan_history(&self, document_id: i64) -> Result<Vec<ScanLogEntry>, ApiError>;

    async fn audit_log(&self, document_id: i64) -> Result<Vec<AuditLogEntry>, ApiError>;

    async fn submissions(&self, document_id: i64) -> Result<Vec<Submission>, ApiError>;
}

/// Owner-side management of tracked physical documents and their QR codes
#[async_trait]
pub trait QrTrackingBackend: Send + Sync {
    async fn create_qr_document(&self, doc: &NewQrDocument) -> Result<QrDocument, ApiError>;

    async fn qr_documents(&self) -> Result<Vec<QrDocument>, ApiError>;

    /// Issue a fresh QR code for a document that has no active one
    async fn generate_qr(&self, document_id: i64) -> Result<QrGenerated, ApiError>;

    async fn revoke_qr(&self, token: &ShareToken) -> Result<(), ApiError>;

    async fn delete_qr_document(&self, document_id: i64) -> Result<(), ApiError>;
}

/// Document exchange codes: upload a file for a one-time code, redeem a code
#[async_trait]
pub trait DocCodeBackend: Send + Sync {
    async fn generate_doc_code(
        &self,
        file: &Path,
        password: Option<&str>,
    ) -> Result<GeneratedCode, ApiError>;

    async fn receive_doc_code(
        &self,
        code: &str,
        password: Option<&str>,
    ) -> Result<ReceivedFile, ApiError>;

    async fn doc_code_sent(&self) -> Result<Vec<DocCodeRecord>, ApiError>;

    async fn doc_code_received(&self) -> Result<Vec<DocCodeRecord>, ApiError>;
}

#[async_trait]
pub trait AnalyticsBackend: Send + Sync {
    /// `GET /analytics/{section}` as untyped JSON
    async fn analytics_section(&self, section: &str) -> Result<serde_json::Value, ApiError>;

    async fn current_user(&self) -> Result<UserProfile, ApiError>;
}
