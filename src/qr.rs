//! Physical QR verification and owner access.
//!
//! A public scan reports whether the document behind a QR code is verified
//! and who owns it. The owner can unlock the tracking history with the QR
//! password; the three history lists are then fetched concurrently.

use serde::Serialize;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use crate::api::{
    AuditLogEntry, QrBackend, QrOwnerBundle, QrVerification, ScanLogEntry, ShareError, ShareToken,
    Submission,
};
use crate::busy::{lock, ActionOutcome, BusyFlag};

const MISSING: &str = "—";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Badge {
    Verified,
    Restricted,
}

impl Badge {
    /// Display tone of the badge
    pub fn tone(&self) -> &'static str {
        match self {
            Badge::Verified => "success",
            Badge::Restricted => "danger",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AlertLevel {
    Success,
    Warning,
}

/// What a public scan shows
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QrView {
    pub badge: Badge,
    pub alert: AlertLevel,
    pub message: String,
    pub owner_name: String,
    pub owner_email: String,
    pub owner_contact: String,
    /// The owner unlock form is offered whether or not the code is verified
    pub owner_login_offered: bool,
}

impl QrView {
    pub fn from_verification(v: &QrVerification) -> Self {
        let or_missing = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or(MISSING)
                .to_string()
        };
        Self {
            badge: if v.verified { Badge::Verified } else { Badge::Restricted },
            alert: if v.verified { AlertLevel::Success } else { AlertLevel::Warning },
            message: v.message.clone().unwrap_or_default(),
            owner_name: or_missing(&v.owner_name),
            owner_email: or_missing(&v.owner_email),
            owner_contact: or_missing(&v.owner_contact),
            owner_login_offered: true,
        }
    }
}

/// Owner view after a successful owner login
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OwnerDashboard {
    pub document: QrOwnerBundle,
    pub scans: Vec<ScanLogEntry>,
    pub audit: Vec<AuditLogEntry>,
    pub submissions: Vec<Submission>,
    /// Set when the history could not be loaded; the owner stays logged in
    pub history_error: Option<String>,
}

impl OwnerDashboard {
    pub fn received_count(&self) -> usize {
        self.submissions.iter().filter(|s| s.is_received()).count()
    }
}

pub struct QrVerifier {
    token: ShareToken,
    backend: Arc<dyn QrBackend>,
    verification: Mutex<Option<QrVerification>>,
    owner: Mutex<Option<OwnerDashboard>>,
    logging_in: BusyFlag,
}

impl QrVerifier {
    pub fn new(backend: Arc<dyn QrBackend>, raw_token: &str) -> Result<Self, ShareError> {
        Ok(Self {
            token: ShareToken::parse(raw_token)?,
            backend,
            verification: Mutex::new(None),
            owner: Mutex::new(None),
            logging_in: BusyFlag::new(),
        })
    }

    pub fn token(&self) -> &ShareToken {
        &self.token
    }

    /// Public scan. A revoked or unknown code fails with `Revoked`.
    pub async fn scan(&self) -> Result<QrView, ShareError> {
        let verification = self
            .backend
            .scan(&self.token)
            .await
            .map_err(|e| ShareError::from_api(e, false))?;
        info!("QR {} scanned (verified: {})", self.token, verification.verified);

        let view = QrView::from_verification(&verification);
        *lock(&self.verification) = Some(verification);
        Ok(view)
    }

    pub fn view(&self) -> Option<QrView> {
        lock(&self.verification).as_ref().map(QrView::from_verification)
    }

    /// Unlock the owner view. A blank password is rejected without a request;
    /// a login already in flight suppresses this one.
    pub async fn owner_login(
        &self,
        password: &str,
    ) -> Result<ActionOutcome<OwnerDashboard>, ShareError> {
        if password.is_empty() {
            return Err(ShareError::PasswordRequired);
        }
        let Some(_guard) = self.logging_in.try_acquire() else {
            return Ok(ActionOutcome::Suppressed);
        };

        let document = self
            .backend
            .owner_login(&self.token, password)
            .await
            .map_err(|e| ShareError::from_api(e, true))?;
        info!("Owner unlocked QR {} (document {})", self.token, document.id);

        let id = document.id;
        let history = tokio::try_join!(
            self.backend.scan_history(id),
            self.backend.audit_log(id),
            self.backend.submissions(id),
        );

        let dashboard = match history {
            Ok((scans, audit, submissions)) => OwnerDashboard {
                document,
                scans,
                audit,
                submissions,
                history_error: None,
            },
            Err(e) => {
                let err = ShareError::from_api(e, false);
                warn!("Failed to load history for QR document {}: {}", id, err);
                OwnerDashboard {
                    document,
                    scans: Vec::new(),
                    audit: Vec::new(),
                    submissions: Vec::new(),
                    history_error: Some(err.to_string()),
                }
            }
        };

        *lock(&self.owner) = Some(dashboard.clone());
        Ok(ActionOutcome::Completed(dashboard))
    }

    pub fn owner(&self) -> Option<OwnerDashboard> {
        lock(&self.owner).clone()
    }

    /// Drop the owner view. Returns false when no owner was logged in.
    pub fn owner_logout(&self) -> bool {
        lock(&self.owner).take().is_some()
    }
}
