//! In-memory backends for unit tests.
//!
//! They answer with the same statuses and `detail` strings as the real
//! backend so the error classification is exercised end to end.
//! `CannedServer` serves scripted HTTP responses on loopback for tests of the
//! real `ApiClient`.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use crate::api::{
    ApiError, AuditLogEntry, DownloadFormat, QrBackend, QrOwnerBundle, QrVerification,
    ScanLogEntry, ShareBackend, ShareBundle, SharePermission, ShareToken, SharedDocument,
    Submission, Watermark,
};

fn http(status: u16, detail: &str) -> ApiError {
    ApiError::Http { status, detail: detail.to_string() }
}

pub struct FakeShareBackend {
    token: String,
    password: Option<String>,
    bundle: Mutex<ShareBundle>,
    delay: Duration,
    save_error: Mutex<Option<ApiError>>,
    download_error: Mutex<Option<ApiError>>,
    open_calls: AtomicUsize,
    save_calls: AtomicUsize,
    download_calls: AtomicUsize,
    last_password: Mutex<Option<String>>,
    saved: Mutex<Vec<String>>,
}

impl FakeShareBackend {
    pub fn public(token: &str, permission: &str) -> Self {
        Self {
            token: token.to_string(),
            password: None,
            bundle: Mutex::new(ShareBundle {
                document: Some(SharedDocument {
                    id: 41,
                    file_name: "report".to_string(),
                    content: Some("Quarterly report".to_string()),
                    tracking_id: Some("TRK-0041".to_string()),
                    last_updated_at: None,
                }),
                watermark: Some(Watermark {
                    text: Some("Shared | 127.0.0.1".to_string()),
                    opacity: 0.15,
                }),
                permission: SharePermission::from(permission.to_string()),
            }),
            delay: Duration::ZERO,
            save_error: Mutex::new(None),
            download_error: Mutex::new(None),
            open_calls: AtomicUsize::new(0),
            save_calls: AtomicUsize::new(0),
            download_calls: AtomicUsize::new(0),
            last_password: Mutex::new(None),
            saved: Mutex::new(Vec::new()),
        }
    }

    pub fn protected(token: &str, password: &str, permission: &str) -> Self {
        Self {
            password: Some(password.to_string()),
            ..Self::public(token, permission)
        }
    }

    /// Every call sleeps this long before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn without_document(self) -> Self {
        self.bundle.lock().unwrap().document = None;
        self
    }

    pub fn fail_saves(&self, err: Option<ApiError>) {
        *self.save_error.lock().unwrap() = err;
    }

    pub fn fail_downloads(&self, err: Option<ApiError>) {
        *self.download_error.lock().unwrap() = err;
    }

    pub fn open_calls(&self) -> usize {
        self.open_calls.load(Ordering::SeqCst)
    }

    pub fn save_calls(&self) -> usize {
        self.save_calls.load(Ordering::SeqCst)
    }

    pub fn download_calls(&self) -> usize {
        self.download_calls.load(Ordering::SeqCst)
    }

    pub fn last_password(&self) -> Option<String> {
        self.last_password.lock().unwrap().clone()
    }

    pub fn saved(&self) -> Vec<String> {
        self.saved.lock().unwrap().clone()
    }

    fn check_token(&self, token: &ShareToken) -> Result<(), ApiError> {
        if token.as_str() == self.token {
            Ok(())
        } else {
            Err(http(410, "Link expired"))
        }
    }

    async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

#[async_trait]
impl ShareBackend for FakeShareBackend {
    async fn open_share(
        &self,
        token: &ShareToken,
        password: Option<&str>,
    ) -> Result<ShareBundle, ApiError> {
        self.open_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_password.lock().unwrap() = password.map(str::to_string);
        self.pause().await;
        self.check_token(token)?;

        match (&self.password, password) {
            (Some(_), None) => Err(http(401, "Password required for this share link")),
            (Some(expected), Some(given)) if expected != given => {
                Err(http(401, "Invalid share link password"))
            }
            _ => Ok(self.bundle.lock().unwrap().clone()),
        }
    }

    async fn save_share(&self, token: &ShareToken, content: &str) -> Result<(), ApiError> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.check_token(token)?;
        if let Some(err) = self.save_error.lock().unwrap().clone() {
            return Err(err);
        }
        if let Some(doc) = self.bundle.lock().unwrap().document.as_mut() {
            doc.content = Some(content.to_string());
        }
        self.saved.lock().unwrap().push(content.to_string());
        Ok(())
    }

    async fn download_share(
        &self,
        token: &ShareToken,
        format: DownloadFormat,
    ) -> Result<Vec<u8>, ApiError> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.check_token(token)?;
        if let Some(err) = self.download_error.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(format!("{}-bytes", format.as_str()).into_bytes())
    }
}

pub struct FakeQrBackend {
    token: String,
    verification: QrVerification,
    owner_password: String,
    delay: Duration,
    login_calls: AtomicUsize,
    history_calls: AtomicUsize,
}

impl FakeQrBackend {
    pub fn new(token: &str, verified: bool, owner_password: &str) -> Self {
        let verification = if verified {
            QrVerification {
                verified: true,
                message: Some("Owner details available".to_string()),
                owner_name: Some("Meera Iyer".to_string()),
                owner_email: Some("meera@example.com".to_string()),
                owner_contact: None,
            }
        } else {
            QrVerification {
                verified: false,
                message: Some("This document is restricted. Owner access required.".to_string()),
                ..Default::default()
            }
        };
        Self {
            token: token.to_string(),
            verification,
            owner_password: owner_password.to_string(),
            delay: Duration::ZERO,
            login_calls: AtomicUsize::new(0),
            history_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn login_calls(&self) -> usize {
        self.login_calls.load(Ordering::SeqCst)
    }

    pub fn history_calls(&self) -> usize {
        self.history_calls.load(Ordering::SeqCst)
    }

    fn check_token(&self, token: &ShareToken) -> Result<(), ApiError> {
        if token.as_str() == self.token {
            Ok(())
        } else {
            Err(http(410, "QR invalid or revoked"))
        }
    }
}

#[async_trait]
impl QrBackend for FakeQrBackend {
    async fn scan(&self, token: &ShareToken) -> Result<QrVerification, ApiError> {
        self.check_token(token)?;
        Ok(self.verification.clone())
    }

    async fn owner_login(
        &self,
        token: &ShareToken,
        password: &str,
    ) -> Result<QrOwnerBundle, ApiError> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if token.as_str() != self.token {
            return Err(http(404, "Invalid QR"));
        }
        if password.is_empty() {
            return Err(http(400, "Password required"));
        }
        if password != self.owner_password {
            return Err(http(401, "Invalid password"));
        }
        Ok(QrOwnerBundle {
            id: 12,
            tracking_id: Some("PHY-2026-0012".to_string()),
            file_name: Some("land-deed.pdf".to_string()),
            pdf_preview: Some("/qr/preview/12".to_string()),
        })
    }

    async fn scan_history(&self, document_id: i64) -> Result<Vec<ScanLogEntry>, ApiError> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![ScanLogEntry {
            id: 1,
            scanned_by: "public".to_string(),
            ip_address: Some("203.0.113.9".to_string()),
            user_agent: None,
            country: Some("IN".to_string()),
            region: None,
            city: None,
            scanned_at: Some(format!("2026-02-0{}T09:30:00", document_id % 9)),
        }])
    }

    async fn audit_log(&self, _document_id: i64) -> Result<Vec<AuditLogEntry>, ApiError> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![AuditLogEntry {
            id: 5,
            action: "OWNER_LOGIN".to_string(),
            ip_address: None,
            user_agent: None,
            created_at: Some("2026-02-01T10:00:00".to_string()),
        }])
    }

    async fn submissions(&self, document_id: i64) -> Result<Vec<Submission>, ApiError> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![Submission {
            id: 2,
            qr_document_id: Some(document_id),
            file_name: Some("land-deed.pdf".to_string()),
            submitted_to: "Registrar".to_string(),
            submitted_location: "Pune".to_string(),
            remarks: None,
            status: "RECEIVED".to_string(),
            submitted_at: Some("2026-01-20T08:00:00".to_string()),
            received_at: Some("2026-01-22T15:45:00".to_string()),
        }])
    }
}

// ============ Canned HTTP server ============

/// One scripted HTTP response
pub fn canned(status: u16, headers: &[(&str, &str)], body: &str) -> String {
    let mut response = format!(
        "HTTP/1.1 {} Canned\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n",
        status,
        body.len()
    );
    for (name, value) in headers {
        response.push_str(&format!("{}: {}\r\n", name, value));
    }
    response.push_str("\r\n");
    response.push_str(body);
    response
}

/// Loopback server answering each connection with the next scripted response.
/// Request lines (`METHOD /path?query`) are recorded in arrival order.
pub struct CannedServer {
    pub url: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl CannedServer {
    pub async fn start(responses: Vec<String>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = requests.clone();

        tokio::spawn(async move {
            for response in responses {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                if let Some(line) = read_request(&mut stream).await {
                    seen.lock().unwrap().push(line);
                }
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        Self { url, requests }
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

/// Read one request (head and body) and return its request line without the
/// HTTP version.
async fn read_request(stream: &mut tokio::net::TcpStream) -> Option<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let content_length = head
        .lines()
        .filter_map(|l| l.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    while buf.len() < head_end + content_length {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let line = head.lines().next()?;
    Some(line.rsplit_once(' ').map(|(req, _)| req).unwrap_or(line).to_string())
}
