//! Owner-side management of tracked physical documents.
//!
//! An owner registers a PDF with contact details and a QR password; the
//! backend issues a tracking ID and a QR code to print on the paper copy.
//! Codes can be revoked and reissued, and a tracking can be deleted.

use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::api::{ApiError, NewQrDocument, QrDocument, QrTrackingBackend, ShareToken};
use crate::busy::{ActionOutcome, BusyFlag};
use crate::validation::{
    validate_contact, validate_email, validate_qr_owner_password, ValidationError,
};

#[derive(Debug, Error)]
pub enum QrTrackingError {
    #[error("{0}")]
    Input(&'static str),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Tracking {0} not found")]
    NotFound(i64),

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Check a registration and return it normalized: trimmed owner name and
/// contact, lowercased email, and the PDF's stem as the display name when
/// none was given.
pub fn validate_new_document(doc: &NewQrDocument) -> Result<NewQrDocument, QrTrackingError> {
    let owner_name = doc.owner_name.trim();
    if owner_name.is_empty() {
        return Err(QrTrackingError::Input("Owner name required"));
    }
    let owner_contact = doc.owner_contact.trim();
    validate_contact(owner_contact)?;
    let owner_email = validate_email(&doc.owner_email)?;

    if !doc.pdf.is_file() {
        return Err(QrTrackingError::Input("PDF required"));
    }
    if !has_pdf_extension(&doc.pdf) {
        return Err(QrTrackingError::Input("PDF only allowed"));
    }
    validate_qr_owner_password(&doc.owner_password)?;

    let file_name = match doc.file_name.trim() {
        "" => doc
            .pdf
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("document")
            .to_string(),
        name => name.to_string(),
    };

    Ok(NewQrDocument {
        owner_name: owner_name.to_string(),
        owner_email,
        owner_contact: owner_contact.to_string(),
        owner_password: doc.owner_password.clone(),
        file_name,
        restrict_public_view: doc.restrict_public_view,
        pdf: doc.pdf.clone(),
    })
}

fn has_pdf_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}

pub struct QrTracking {
    backend: Arc<dyn QrTrackingBackend>,
    documents: RwLock<Vec<QrDocument>>,
    creating: BusyFlag,
}

impl QrTracking {
    pub fn new(backend: Arc<dyn QrTrackingBackend>) -> Self {
        Self {
            backend,
            documents: RwLock::new(Vec::new()),
            creating: BusyFlag::new(),
        }
    }

    /// Foreground load of the owner's tracked documents.
    pub async fn load(&self) -> Result<Vec<QrDocument>, ApiError> {
        let documents = self.backend.qr_documents().await?;
        *self.documents.write().await = documents.clone();
        Ok(documents)
    }

    /// Last loaded list
    pub async fn documents(&self) -> Vec<QrDocument> {
        self.documents.read().await.clone()
    }

    /// Reload after a change; the change itself already succeeded, so a
    /// failure here is only logged.
    async fn reload(&self) {
        if let Err(e) = self.load().await {
            warn!("Failed to reload QR tracking list: {}", e);
        }
    }

    pub async fn create(
        &self,
        doc: &NewQrDocument,
    ) -> Result<ActionOutcome<QrDocument>, QrTrackingError> {
        let doc = validate_new_document(doc)?;
        let Some(_guard) = self.creating.try_acquire() else {
            return Ok(ActionOutcome::Suppressed);
        };

        let created = self.backend.create_qr_document(&doc).await?;
        info!("Tracking ID {} generated", created.tracking_id);
        self.reload().await;
        Ok(ActionOutcome::Completed(created))
    }

    /// Token of the document's active QR code, issuing a new code when the
    /// previous one was revoked.
    pub async fn active_token(&self, document_id: i64) -> Result<String, QrTrackingError> {
        let cached = self.find(document_id).await;
        let doc = match cached {
            Some(doc) => doc,
            None => self
                .load()
                .await?
                .into_iter()
                .find(|d| d.id == document_id)
                .ok_or(QrTrackingError::NotFound(document_id))?,
        };

        if let Some(qr) = doc.active_qr.filter(|qr| qr.is_active) {
            return Ok(qr.token);
        }
        let generated = self.backend.generate_qr(document_id).await?;
        info!("Issued a new QR code for tracking {}", doc.tracking_id);
        self.reload().await;
        Ok(generated.token)
    }

    pub async fn revoke(&self, raw_token: &str) -> Result<(), QrTrackingError> {
        let token =
            ShareToken::parse(raw_token).map_err(|_| QrTrackingError::Input("Invalid QR token"))?;
        self.backend.revoke_qr(&token).await?;
        info!("QR revoked");
        self.reload().await;
        Ok(())
    }

    pub async fn delete(&self, document_id: i64) -> Result<(), QrTrackingError> {
        self.backend.delete_qr_document(document_id).await?;
        self.documents.write().await.retain(|d| d.id != document_id);
        info!("Tracking {} deleted", document_id);
        Ok(())
    }

    async fn find(&self, document_id: i64) -> Option<QrDocument> {
        self.documents
            .read()
            .await
            .iter()
            .find(|d| d.id == document_id)
            .cloned()
    }
}
