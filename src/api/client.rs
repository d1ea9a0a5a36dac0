//! REST client for the DocRoute backend
//!
//! Wraps a `reqwest::Client` with the base URL, request timeout and the shared
//! `Session`. The bearer token is attached to every request when signed in; a
//! 401 from an endpoint that requires login clears the session. Public share
//! and QR endpoints keep their 401s as ordinary errors, since those mean
//! "wrong share password", not "logged out".

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, AUTHORIZATION, CONTENT_DISPOSITION, CONTENT_TYPE};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::path::Path;
use tracing::{debug, info, warn};
use url::Url;

use super::http_retry::{send_with_retry, HttpRetryConfig};
use super::{
    AnalyticsBackend, ApiError, AuditLogEntry, DocCodeBackend, DocCodeRecord, DownloadFormat,
    GeneratedCode, LoginResponse, NewQrDocument, QrBackend, QrDocument, QrGenerated,
    QrOwnerBundle, QrTrackingBackend, QrVerification, ReceivedFile, ScanLogEntry, ShareBackend,
    ShareBundle, ShareLinkCreated, SharePermission, ShareToken, Submission, UserProfile,
};
use crate::config::ClientConfig;
use crate::session::SessionHandle;

/// Longest backend body echoed into an error message
const MAX_DETAIL_LEN: usize = 200;

/// Whether a 401 on this endpoint means the login session is gone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Public,
    Authenticated,
}

pub struct ApiClient {
    http: reqwest::Client,
    base: Url,
    retry: HttpRetryConfig,
    session: SessionHandle,
}

impl ApiClient {
    pub fn new(config: &ClientConfig, session: SessionHandle) -> Result<Self, ApiError> {
        crate::config::validate_config(config)
            .map_err(|e| ApiError::InvalidConfig(e.to_string()))?;

        let base = Url::parse(&config.api_url)
            .map_err(|e| ApiError::InvalidConfig(format!("api_url: {}", e)))?;

        let mut builder = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("docroute-cli/", env!("CARGO_PKG_VERSION")));
        // A backend on this machine is never reached through a proxy
        if is_loopback(&base) {
            builder = builder.no_proxy();
        }
        let http = builder
            .build()
            .map_err(|e| ApiError::InvalidConfig(format!("HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base,
            retry: config.retry.clone(),
            session,
        })
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Resolve a backend-relative link such as a QR `pdf_preview` path.
    pub fn resolve_link(&self, relative: &str) -> Result<Url, ApiError> {
        self.base
            .join(relative)
            .map_err(|e| ApiError::InvalidConfig(format!("Invalid link '{}': {}", relative, e)))
    }

    /// Build `<base>/<segments...>`; each segment is percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidConfig("api_url cannot be a base URL".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn request(&self, method: Method, url: Url) -> RequestBuilder {
        debug!("{} {}", method, url.path());
        let builder = self.http.request(method, url);
        match self.session.read().await.bearer() {
            Some(bearer) => builder.header(AUTHORIZATION, bearer),
            None => builder,
        }
    }

    async fn execute(&self, builder: RequestBuilder, access: Access) -> Result<Response, ApiError> {
        let request = builder.build()?;
        let response = send_with_retry(&self.http, request, &self.retry).await?;
        self.check(response, access).await
    }

    async fn check(&self, response: Response, access: Access) -> Result<Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let detail = extract_detail(status, &body);

        if status == StatusCode::UNAUTHORIZED && access == Access::Authenticated {
            warn!("Backend rejected the session token, signing out");
            self.session.write().await.clear();
            return Err(ApiError::Unauthorized);
        }

        if status.is_server_error() {
            warn!("Server error {}: {}", status.as_u16(), detail);
        }

        Err(ApiError::Http { status: status.as_u16(), detail })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        access: Access,
    ) -> Result<T, ApiError> {
        let url = self.endpoint(segments)?;
        let builder = self.request(Method::GET, url).await;
        read_json(self.execute(builder, access).await?).await
    }

    // ============ Account ============

    /// `POST /auth/login`; on success the session is signed in.
    pub async fn login(&self, email: &str, password: &str) -> Result<UserProfile, ApiError> {
        let body = serde_json::json!({
            "email": email.trim().to_lowercase(),
            "password": password.trim(),
        });
        let url = self.endpoint(&["auth", "login"])?;
        let builder = self.request(Method::POST, url).await.json(&body);
        let login: LoginResponse = read_json(self.execute(builder, Access::Public).await?).await?;

        let token = login
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::Decode("Invalid server response".to_string()))?;

        let user = login.user.unwrap_or_default();
        self.session.write().await.sign_in(token, Some(user.clone()));
        info!("Signed in as {}", user.email.as_deref().unwrap_or("unknown user"));
        Ok(user)
    }

    /// `POST /auth/logout`; the local session is cleared even if the call fails.
    pub async fn logout(&self) {
        let result = match self.endpoint(&["auth", "logout"]) {
            Ok(url) => {
                let builder = self.request(Method::POST, url).await;
                self.execute(builder, Access::Public).await.map(|_| ())
            }
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            debug!("Logout call failed (token may already be invalid): {}", e);
        }
        self.session.write().await.clear();
    }

    /// `GET /auth/me`; refreshes the profile stored in the session.
    pub async fn me(&self) -> Result<UserProfile, ApiError> {
        let user: UserProfile = self.get_json(&["auth", "me"], Access::Authenticated).await?;
        self.session.write().await.set_user(Some(user.clone()));
        Ok(user)
    }

    // ============ Owner-side share links ============

    /// `POST /documents/{id}/share`
    pub async fn create_share_link(
        &self,
        document_id: i64,
        permission: SharePermission,
        password: Option<&str>,
    ) -> Result<ShareLinkCreated, ApiError> {
        let id = document_id.to_string();
        let url = self.endpoint(&["documents", &id, "share"])?;
        let permission = permission.to_string();
        let mut pairs = vec![("permission", permission.as_str())];
        if let Some(pw) = password.filter(|p| !p.is_empty()) {
            pairs.push(("password", pw));
        }
        let builder = self
            .request(Method::POST, url)
            .await
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(form_body(&pairs));
        read_json(self.execute(builder, Access::Authenticated).await?).await
    }

    /// `POST /documents/share/{token}/revoke`
    pub async fn revoke_share_link(&self, token: &ShareToken) -> Result<(), ApiError> {
        let url = self.endpoint(&["documents", "share", token.as_str(), "revoke"])?;
        let builder = self.request(Method::POST, url).await;
        self.execute(builder, Access::Authenticated).await?;
        Ok(())
    }
}

#[async_trait]
impl DocCodeBackend for ApiClient {
    /// `POST /doc-code/generate` with the file as multipart
    async fn generate_doc_code(
        &self,
        file: &Path,
        password: Option<&str>,
    ) -> Result<GeneratedCode, ApiError> {
        let bytes = tokio::fs::read(file)
            .await
            .map_err(|e| ApiError::InvalidConfig(format!("Cannot read {:?}: {}", file, e)))?;
        let file_name = file
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("document")
            .to_string();
        let mime = mime_guess::from_path(file).first_or_octet_stream().to_string();

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(&mime)?;
        let mut form = reqwest::multipart::Form::new().part("file", part);
        if let Some(pw) = password.filter(|p| !p.is_empty()) {
            form = form.text("password", pw.to_string());
        }

        let url = self.endpoint(&["doc-code", "generate"])?;
        let builder = self.request(Method::POST, url).await.multipart(form);
        read_json(self.execute(builder, Access::Authenticated).await?).await
    }

    /// `POST /doc-code/receive`; returns the document bytes.
    async fn receive_doc_code(
        &self,
        code: &str,
        password: Option<&str>,
    ) -> Result<ReceivedFile, ApiError> {
        let mut body = serde_json::json!({ "code": code });
        if let Some(pw) = password.filter(|p| !p.is_empty()) {
            body["password"] = serde_json::Value::String(pw.to_string());
        }

        let url = self.endpoint(&["doc-code", "receive"])?;
        let builder = self.request(Method::POST, url).await.json(&body);
        let response = self.execute(builder, Access::Authenticated).await?;

        let disposition = header_str(response.headers(), CONTENT_DISPOSITION);
        let content_type = header_str(response.headers(), CONTENT_TYPE);
        let bytes = response.bytes().await?.to_vec();

        Ok(ReceivedFile {
            file_name: disposition
                .as_deref()
                .and_then(crate::doc_code::filename_from_disposition)
                .unwrap_or_else(|| "document".to_string()),
            content_type,
            bytes,
        })
    }

    async fn doc_code_sent(&self) -> Result<Vec<DocCodeRecord>, ApiError> {
        self.get_json(&["doc-code", "history", "sent"], Access::Authenticated).await
    }

    async fn doc_code_received(&self) -> Result<Vec<DocCodeRecord>, ApiError> {
        self.get_json(&["doc-code", "history", "received"], Access::Authenticated).await
    }
}

#[async_trait]
impl AnalyticsBackend for ApiClient {
    async fn analytics_section(&self, section: &str) -> Result<serde_json::Value, ApiError> {
        self.get_json(&["analytics", section], Access::Authenticated).await
    }

    async fn current_user(&self) -> Result<UserProfile, ApiError> {
        self.me().await
    }
}

#[async_trait]
impl ShareBackend for ApiClient {
    async fn open_share(
        &self,
        token: &ShareToken,
        password: Option<&str>,
    ) -> Result<ShareBundle, ApiError> {
        let mut url = self.endpoint(&["documents", "share", token.as_str()])?;
        if let Some(pw) = password {
            url.query_pairs_mut().append_pair("password", pw);
        }
        let builder = self.request(Method::GET, url).await;
        read_json(self.execute(builder, Access::Public).await?).await
    }

    async fn save_share(&self, token: &ShareToken, content: &str) -> Result<(), ApiError> {
        let url = self.endpoint(&["documents", "share", token.as_str(), "edit"])?;
        let builder = self
            .request(Method::PUT, url)
            .await
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(form_body(&[("content", content)]));
        self.execute(builder, Access::Public).await?;
        Ok(())
    }

    async fn download_share(
        &self,
        token: &ShareToken,
        format: DownloadFormat,
    ) -> Result<Vec<u8>, ApiError> {
        let mut url = self.endpoint(&["documents", "share", token.as_str(), "download"])?;
        url.query_pairs_mut().append_pair("format", format.as_str());
        let builder = self.request(Method::GET, url).await;
        let response = self.execute(builder, Access::Public).await?;
        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl QrBackend for ApiClient {
    async fn scan(&self, token: &ShareToken) -> Result<QrVerification, ApiError> {
        self.get_json(&["qr", "scan", token.as_str()], Access::Public).await
    }

    async fn owner_login(
        &self,
        token: &ShareToken,
        password: &str,
    ) -> Result<QrOwnerBundle, ApiError> {
        let url = self.endpoint(&["qr", "owner-login", token.as_str()])?;
        let body = serde_json::json!({ "password": password });
        let builder = self.request(Method::POST, url).await.json(&body);
        read_json(self.execute(builder, Access::Public).await?).await
    }

    async fn scan_history(&self, document_id: i64) -> Result<Vec<ScanLogEntry>, ApiError> {
        let id = document_id.to_string();
        self.get_json(&["qr", "history", &id], Access::Authenticated).await
    }

    async fn audit_log(&self, document_id: i64) -> Result<Vec<AuditLogEntry>, ApiError> {
        let id = document_id.to_string();
        self.get_json(&["qr", "audit", &id], Access::Authenticated).await
    }

    async fn submissions(&self, document_id: i64) -> Result<Vec<Submission>, ApiError> {
        let id = document_id.to_string();
        self.get_json(&["qr", "submission", &id], Access::Public).await
    }
}

#[async_trait]
impl QrTrackingBackend for ApiClient {
    /// `POST /qr/create`, multipart with the PDF as `file`
    async fn create_qr_document(&self, doc: &NewQrDocument) -> Result<QrDocument, ApiError> {
        let bytes = tokio::fs::read(&doc.pdf)
            .await
            .map_err(|e| ApiError::InvalidConfig(format!("Cannot read {:?}: {}", doc.pdf, e)))?;
        let upload_name = doc
            .pdf
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("document.pdf")
            .to_string();
        // The backend only accepts application/pdf uploads
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(upload_name)
            .mime_str("application/pdf")?;

        let form = reqwest::multipart::Form::new()
            .text("owner_name", doc.owner_name.clone())
            .text("owner_email", doc.owner_email.clone())
            .text("owner_contact", doc.owner_contact.clone())
            .text("file_name", doc.file_name.clone())
            .text("owner_password", doc.owner_password.clone())
            .text("restrict_public_view", if doc.restrict_public_view { "1" } else { "0" })
            .part("file", part);

        let url = self.endpoint(&["qr", "create"])?;
        let builder = self.request(Method::POST, url).await.multipart(form);
        let created: QrDocument = read_json(self.execute(builder, Access::Authenticated).await?).await?;
        info!("Created QR tracking {}", created.tracking_id);
        Ok(created)
    }

    async fn qr_documents(&self) -> Result<Vec<QrDocument>, ApiError> {
        self.get_json(&["qr", "documents"], Access::Authenticated).await
    }

    async fn generate_qr(&self, document_id: i64) -> Result<QrGenerated, ApiError> {
        let id = document_id.to_string();
        let url = self.endpoint(&["qr", "generate", &id])?;
        let builder = self.request(Method::POST, url).await;
        read_json(self.execute(builder, Access::Authenticated).await?).await
    }

    async fn revoke_qr(&self, token: &ShareToken) -> Result<(), ApiError> {
        let url = self.endpoint(&["qr", "revoke", token.as_str()])?;
        let builder = self.request(Method::POST, url).await;
        self.execute(builder, Access::Authenticated).await?;
        Ok(())
    }

    async fn delete_qr_document(&self, document_id: i64) -> Result<(), ApiError> {
        let id = document_id.to_string();
        let url = self.endpoint(&["qr", "delete", &id])?;
        let builder = self.request(Method::DELETE, url).await;
        self.execute(builder, Access::Authenticated).await?;
        Ok(())
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))
}

fn is_loopback(url: &Url) -> bool {
    match url.host() {
        Some(url::Host::Ipv4(ip)) => ip.is_loopback(),
        Some(url::Host::Ipv6(ip)) => ip.is_loopback(),
        Some(url::Host::Domain(name)) => name.eq_ignore_ascii_case("localhost"),
        None => false,
    }
}

fn header_str(headers: &HeaderMap, name: HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn form_body(pairs: &[(&str, &str)]) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}

/// Pull the user-facing message out of an error body.
///
/// The backend answers `{"detail": "..."}`, or a list of `{"msg": ...}`
/// objects for request validation failures.
fn extract_detail(status: StatusCode, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        match value.get("detail") {
            Some(serde_json::Value::String(s)) if !s.is_empty() => return s.clone(),
            Some(serde_json::Value::Array(items)) => {
                let messages: Vec<&str> = items
                    .iter()
                    .filter_map(|item| item.get("msg").and_then(|m| m.as_str()))
                    .collect();
                if !messages.is_empty() {
                    return messages.join("; ");
                }
            }
            _ => {}
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() || trimmed.starts_with('<') {
        return status.canonical_reason().unwrap_or("Request failed").to_string();
    }
    trimmed.chars().take(MAX_DETAIL_LEN).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;
    use crate::testing::{canned, CannedServer};

    fn client(api_url: &str) -> ApiClient {
        let config = ClientConfig {
            api_url: api_url.to_string(),
            ..Default::default()
        };
        ApiClient::new(&config, Session::new().into_handle()).unwrap()
    }

    #[test]
    fn test_endpoint_encodes_segments() {
        let c = client("http://localhost:8000");
        let url = c.endpoint(&["documents", "share", "a b%"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/documents/share/a%20b%25");
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let c = client("https://docroute.example.com/api/");
        let url = c.endpoint(&["qr", "scan", "qr456"]).unwrap();
        assert_eq!(url.as_str(), "https://docroute.example.com/api/qr/scan/qr456");
    }

    #[test]
    fn test_resolve_link() {
        let c = client("https://docroute.example.com");
        assert_eq!(
            c.resolve_link("/qr/preview/12").unwrap().as_str(),
            "https://docroute.example.com/qr/preview/12"
        );
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = ClientConfig {
            api_url: "file:///etc/passwd".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            ApiClient::new(&config, Session::new().into_handle()),
            Err(ApiError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_form_body_encoding() {
        assert_eq!(
            form_body(&[("content", "line one\nline & two")]),
            "content=line+one%0Aline+%26+two"
        );
    }

    #[test]
    fn test_extract_detail() {
        assert_eq!(
            extract_detail(StatusCode::GONE, r#"{"detail":"Link expired"}"#),
            "Link expired"
        );
        assert_eq!(
            extract_detail(
                StatusCode::UNPROCESSABLE_ENTITY,
                r#"{"detail":[{"loc":["body","code"],"msg":"Invalid code format"}]}"#
            ),
            "Invalid code format"
        );
        assert_eq!(
            extract_detail(StatusCode::BAD_GATEWAY, "<html>bad gateway</html>"),
            "Bad Gateway"
        );
        assert_eq!(extract_detail(StatusCode::NOT_FOUND, ""), "Not Found");
        assert_eq!(extract_detail(StatusCode::BAD_REQUEST, "plain text"), "plain text");
    }

    /// Signed-in client with near-zero backoff
    fn signed_in(server: &CannedServer) -> ApiClient {
        let config = ClientConfig {
            api_url: server.url.clone(),
            retry: HttpRetryConfig {
                base_delay_ms: 1,
                max_delay_ms: 5,
                ..Default::default()
            },
            ..Default::default()
        };
        let mut session = Session::new();
        session.sign_in("tok-1".into(), None);
        ApiClient::new(&config, session.into_handle()).unwrap()
    }

    const BUNDLE: &str =
        r#"{"document":{"id":41,"file_name":"report","content":"Quarterly report"},"permission":"view"}"#;

    #[test]
    fn test_is_loopback() {
        assert!(is_loopback(&Url::parse("http://127.0.0.1:8000").unwrap()));
        assert!(is_loopback(&Url::parse("http://localhost:8000").unwrap()));
        assert!(is_loopback(&Url::parse("http://[::1]:8000").unwrap()));
        assert!(!is_loopback(&Url::parse("https://docroute.example.com").unwrap()));
    }

    #[tokio::test]
    async fn test_share_401_keeps_session() {
        let server = CannedServer::start(vec![canned(
            401,
            &[],
            r#"{"detail":"Invalid share link password"}"#,
        )])
        .await;
        let c = signed_in(&server);
        let token = ShareToken::parse("xyz789").unwrap();

        let err = c.open_share(&token, Some("nope")).await.unwrap_err();
        assert_eq!(
            err,
            ApiError::Http { status: 401, detail: "Invalid share link password".into() }
        );
        assert!(c.session().read().await.is_authenticated());
        assert_eq!(server.requests(), vec!["GET /documents/share/xyz789?password=nope"]);
    }

    #[tokio::test]
    async fn test_authenticated_401_clears_session() {
        let server = CannedServer::start(vec![canned(
            401,
            &[],
            r#"{"detail":"Could not validate credentials"}"#,
        )])
        .await;
        let c = signed_in(&server);

        assert_eq!(c.me().await.unwrap_err(), ApiError::Unauthorized);
        assert!(!c.session().read().await.is_authenticated());
        assert_eq!(server.requests(), vec!["GET /auth/me"]);
    }

    #[tokio::test]
    async fn test_get_retried_after_unavailable() {
        let server = CannedServer::start(vec![
            canned(503, &[("Retry-After", "0")], r#"{"detail":"Service Unavailable"}"#),
            canned(200, &[], BUNDLE),
        ])
        .await;
        let c = signed_in(&server);
        let token = ShareToken::parse("abc123").unwrap();

        let bundle = c.open_share(&token, None).await.unwrap();
        assert_eq!(
            bundle.document.and_then(|d| d.content).as_deref(),
            Some("Quarterly report")
        );
        assert_eq!(server.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_get_not_retried_on_500() {
        let server = CannedServer::start(vec![
            canned(500, &[], r#"{"detail":"Internal error"}"#),
            canned(200, &[], BUNDLE),
        ])
        .await;
        let c = signed_in(&server);
        let token = ShareToken::parse("abc123").unwrap();

        let err = c.open_share(&token, None).await.unwrap_err();
        assert_eq!(err.status(), Some(500));
        assert_eq!(server.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_save_sent_once_despite_unavailable() {
        let server = CannedServer::start(vec![
            canned(503, &[("Retry-After", "0")], r#"{"detail":"Service Unavailable"}"#),
            canned(200, &[], "{}"),
        ])
        .await;
        let c = signed_in(&server);
        let token = ShareToken::parse("abc123").unwrap();

        let err = c.save_share(&token, "edited").await.unwrap_err();
        assert_eq!(
            err,
            ApiError::Http { status: 503, detail: "Service Unavailable".into() }
        );
        assert_eq!(server.requests(), vec!["PUT /documents/share/abc123/edit"]);
    }

    #[tokio::test]
    async fn test_create_qr_document_posts_multipart() {
        let created = r#"{"id":7,"tracking_id":"PHY-2026-0007","owner_name":"Meera Iyer",
            "owner_email":"meera@example.com","file_name":"land-deed",
            "active_qr":{"id":70,"token":"qr456","is_active":true}}"#;
        let server = CannedServer::start(vec![canned(200, &[], created)]).await;
        let c = signed_in(&server);
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("land-deed.pdf");
        std::fs::write(&pdf, b"%PDF-1.7").unwrap();

        let doc = NewQrDocument {
            owner_name: "Meera Iyer".into(),
            owner_email: "meera@example.com".into(),
            owner_contact: "9876543210".into(),
            owner_password: "Owner1!a".into(),
            file_name: "land-deed".into(),
            restrict_public_view: false,
            pdf,
        };
        let created = c.create_qr_document(&doc).await.unwrap();
        assert_eq!(created.tracking_id, "PHY-2026-0007");
        assert_eq!(created.active_qr.map(|q| q.token).as_deref(), Some("qr456"));
        assert_eq!(server.requests(), vec!["POST /qr/create"]);
    }
}
