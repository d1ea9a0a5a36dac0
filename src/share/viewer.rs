//! One share session: unlock, then edit or download as the permission allows.
//!
//! `ShareViewer` is shared by reference between concurrent callers. State is
//! kept behind short-lived std mutexes that are never held across an await;
//! overlapping actions of the same kind are suppressed by busy flags.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use super::permission::{allowed_actions, AllowedActions};
use super::resolver::ShareResolver;
use super::unlock::{UnlockMachine, UnlockState};
use super::view::ShareView;
use crate::api::{DownloadFormat, ShareBackend, ShareBundle, ShareError, ShareToken};
use crate::busy::{lock, ActionOutcome, BusyFlag};

/// Result of a password submission
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// Not accepted: blank password, wrong state, or a request already in flight
    Ignored,
    Resolved(UnlockState),
}

#[derive(Debug, Default)]
struct Editor {
    draft: Option<String>,
    error: Option<String>,
}

pub struct ShareViewer {
    token: Option<ShareToken>,
    resolver: ShareResolver,
    backend: Arc<dyn ShareBackend>,
    machine: Mutex<UnlockMachine>,
    editor: Mutex<Editor>,
    saving: BusyFlag,
    downloading: [BusyFlag; 2],
}

impl ShareViewer {
    /// A malformed token puts the viewer straight into the error state.
    pub fn new(backend: Arc<dyn ShareBackend>, raw_token: &str) -> Self {
        let mut machine = UnlockMachine::new();
        let token = match ShareToken::parse(raw_token) {
            Ok(token) => Some(token),
            Err(e) => {
                machine.fail(e);
                None
            }
        };
        Self {
            token,
            resolver: ShareResolver::new(backend.clone()),
            backend,
            machine: Mutex::new(machine),
            editor: Mutex::new(Editor::default()),
            saving: BusyFlag::new(),
            downloading: [BusyFlag::new(), BusyFlag::new()],
        }
    }

    pub fn token(&self) -> Option<&ShareToken> {
        self.token.as_ref()
    }

    pub fn state(&self) -> UnlockState {
        lock(&self.machine).state().clone()
    }

    pub fn allowed(&self) -> AllowedActions {
        lock(&self.machine)
            .state()
            .bundle()
            .map(|b| allowed_actions(b.permission))
            .unwrap_or(AllowedActions::NONE)
    }

    /// Initial load without a password. Later calls return the current state.
    pub async fn open(&self) -> UnlockState {
        let Some(token) = self.token.as_ref() else {
            return self.state();
        };
        if !lock(&self.machine).begin_open() {
            return self.state();
        }
        let _pending = PendingRequest(&self.machine);

        let result = self.resolver.resolve(token, None).await;
        self.apply(token, result)
    }

    pub async fn submit_password(&self, password: &str) -> SubmitOutcome {
        let Some(token) = self.token.as_ref() else {
            return SubmitOutcome::Ignored;
        };
        if !lock(&self.machine).begin_submit(password) {
            return SubmitOutcome::Ignored;
        }
        let _pending = PendingRequest(&self.machine);

        let result = self.resolver.resolve(token, Some(password)).await;
        SubmitOutcome::Resolved(self.apply(token, result))
    }

    fn apply(&self, token: &ShareToken, result: Result<ShareBundle, ShareError>) -> UnlockState {
        let mut machine = lock(&self.machine);
        machine.finish(result);
        match machine.state() {
            UnlockState::Unlocked(bundle) => {
                info!("Share {} unlocked ({} access)", token, bundle.permission)
            }
            UnlockState::PasswordRequired { .. } => info!("Share {} needs a password", token),
            UnlockState::Error(e) => warn!("Share {} failed: {}", token, e),
            UnlockState::Loading => {}
        }
        machine.state().clone()
    }

    // ============ Editing ============

    pub fn is_editing(&self) -> bool {
        lock(&self.editor).draft.is_some()
    }

    /// Enter edit mode with the current content as the draft.
    pub fn begin_edit(&self) -> bool {
        if !self.allowed().edit {
            return false;
        }
        let current = self.current_content().unwrap_or_default();
        let mut editor = lock(&self.editor);
        if editor.draft.is_none() {
            editor.draft = Some(current);
        }
        true
    }

    pub fn set_draft(&self, text: impl Into<String>) -> bool {
        let mut editor = lock(&self.editor);
        match editor.draft.as_mut() {
            Some(draft) => {
                *draft = text.into();
                true
            }
            None => false,
        }
    }

    pub fn cancel_edit(&self) {
        lock(&self.editor).draft = None;
    }

    /// Save the draft. On success the displayed content becomes exactly the
    /// draft and edit mode ends; on failure both are kept.
    pub async fn save(&self) -> Result<ActionOutcome<()>, ShareError> {
        let token = self.require(self.allowed().edit, "editing")?;
        let Some(draft) = lock(&self.editor).draft.clone() else {
            return Err(ShareError::Rejected("Not in edit mode".to_string()));
        };
        let Some(_guard) = self.saving.try_acquire() else {
            return Ok(ActionOutcome::Suppressed);
        };

        match self.backend.save_share(&token, &draft).await {
            Ok(()) => {
                let mut editor = lock(&self.editor);
                // Edits typed while the request was out stay in edit mode
                if editor.draft.as_deref() == Some(draft.as_str()) {
                    editor.draft = None;
                }
                editor.error = None;
                drop(editor);
                lock(&self.machine).replace_content(draft);
                info!("Saved changes to share {}", token);
                Ok(ActionOutcome::Completed(()))
            }
            Err(e) => {
                let err = ShareError::from_api(e, false);
                lock(&self.editor).error = Some(format!("Failed to save changes: {}", err));
                Err(err)
            }
        }
    }

    // ============ Downloads ============

    /// Download the document in `format` into `dir`, returning the written path.
    pub async fn download(
        &self,
        format: DownloadFormat,
        dir: &Path,
    ) -> Result<ActionOutcome<PathBuf>, ShareError> {
        let token = self.require(self.allowed().download, "downloads")?;
        let Some(_guard) = self.downloading[format.index()].try_acquire() else {
            return Ok(ActionOutcome::Suppressed);
        };

        let result = async {
            let bytes = self
                .backend
                .download_share(&token, format)
                .await
                .map_err(|e| ShareError::from_api(e, false))?;
            let name = download_file_name(&self.file_name().unwrap_or_default(), format);
            let path = dir.join(name);
            tokio::fs::create_dir_all(dir).await?;
            tokio::fs::write(&path, &bytes).await?;
            Ok::<_, ShareError>(path)
        }
        .await;

        match result {
            Ok(path) => {
                info!("Downloaded share {} to {}", token, path.display());
                Ok(ActionOutcome::Completed(path))
            }
            Err(err) => {
                lock(&self.editor).error = Some(format!(
                    "Failed to download {}: {}",
                    format.as_str().to_uppercase(),
                    err
                ));
                Err(err)
            }
        }
    }

    // ============ View ============

    pub fn error(&self) -> Option<String> {
        lock(&self.editor).error.clone()
    }

    pub fn dismiss_error(&self) {
        lock(&self.editor).error = None;
    }

    /// View model for an unlocked share, `None` in any other state.
    pub fn view(&self) -> Option<ShareView> {
        let editor = lock(&self.editor);
        let machine = lock(&self.machine);
        machine
            .state()
            .bundle()
            .map(|b| ShareView::build(b, editor.draft.as_deref(), editor.error.as_deref()))
    }

    fn require(&self, allowed: bool, action: &str) -> Result<ShareToken, ShareError> {
        match (&self.token, allowed) {
            (Some(token), true) => Ok(token.clone()),
            (None, _) => Err(ShareError::InvalidToken),
            (Some(_), false) => Err(ShareError::PermissionDenied(format!(
                "This share link does not allow {}",
                action
            ))),
        }
    }

    fn current_content(&self) -> Option<String> {
        lock(&self.machine)
            .state()
            .bundle()
            .and_then(|b| b.document.as_ref())
            .and_then(|d| d.content.clone())
    }

    fn file_name(&self) -> Option<String> {
        lock(&self.machine)
            .state()
            .bundle()
            .and_then(|b| b.document.as_ref())
            .map(|d| d.file_name.clone())
    }
}

/// Rolls the unlock machine back if the request future is dropped before
/// its result is applied.
struct PendingRequest<'a>(&'a Mutex<UnlockMachine>);

impl Drop for PendingRequest<'_> {
    fn drop(&mut self) {
        let mut machine = lock(self.0);
        if machine.is_in_flight() {
            machine.abandon();
            warn!("Share request dropped before completing");
        }
    }
}

/// `<file_name>.<ext>` with path separators and control characters replaced.
fn download_file_name(file_name: &str, format: DownloadFormat) -> String {
    let mut stem: String = file_name
        .trim()
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | ':') || c.is_control() { '_' } else { c })
        .collect();
    let ext = format.as_str();
    let suffix = format!(".{}", ext);
    if stem.to_ascii_lowercase().ends_with(&suffix) {
        stem.truncate(stem.len() - suffix.len());
    }
    let stem = stem.trim_matches('.');
    let stem = if stem.is_empty() { "document" } else { stem };
    format!("{}.{}", stem, ext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiError;
    use crate::share::view::Control;
    use crate::testing::FakeShareBackend;
    use std::time::Duration;

    fn viewer(backend: &Arc<FakeShareBackend>, token: &str) -> ShareViewer {
        ShareViewer::new(backend.clone(), token)
    }

    #[tokio::test]
    async fn test_abc123_view_only() {
        let backend = Arc::new(FakeShareBackend::public("abc123", "view"));
        let v = viewer(&backend, "abc123");

        let state = v.open().await;
        assert!(matches!(state, UnlockState::Unlocked(_)));
        let view = v.view().unwrap();
        assert_eq!(view.content, "Quarterly report");
        assert!(view.controls.is_empty());
        assert!(view.notice.is_some());
        assert!(v.allowed().is_read_only());
    }

    #[tokio::test]
    async fn test_view_only_rejects_edit_and_download() {
        let backend = Arc::new(FakeShareBackend::public("abc123", "view"));
        let v = viewer(&backend, "abc123");
        v.open().await;

        assert!(!v.begin_edit());
        let dir = tempfile::tempdir().unwrap();
        let err = v.download(DownloadFormat::Pdf, dir.path()).await.unwrap_err();
        assert!(matches!(err, ShareError::PermissionDenied(_)));
        assert_eq!(backend.download_calls(), 0);
    }

    #[tokio::test]
    async fn test_xyz789_unlocks_with_password() {
        let backend = Arc::new(FakeShareBackend::protected("xyz789", "Secret1!", "view"));
        let v = viewer(&backend, "xyz789");

        assert_eq!(v.open().await, UnlockState::PasswordRequired { message: None });
        assert!(v.view().is_none());

        let outcome = v.submit_password("Secret1!").await;
        assert!(matches!(outcome, SubmitOutcome::Resolved(UnlockState::Unlocked(_))));
        assert_eq!(v.view().unwrap().content, "Quarterly report");
    }

    #[tokio::test]
    async fn test_wrong_password_keeps_prompt() {
        let backend = Arc::new(FakeShareBackend::protected("xyz789", "Secret1!", "view"));
        let v = viewer(&backend, "xyz789");
        v.open().await;

        let outcome = v.submit_password("wrong").await;
        assert_eq!(
            outcome,
            SubmitOutcome::Resolved(UnlockState::PasswordRequired {
                message: Some("Incorrect password".into())
            })
        );
        assert!(v.view().is_none());
        assert!(v.state().bundle().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_submits_make_one_call() {
        let backend = Arc::new(
            FakeShareBackend::protected("xyz789", "Secret1!", "view")
                .with_delay(Duration::from_millis(50)),
        );
        let v = viewer(&backend, "xyz789");
        v.open().await;
        assert_eq!(backend.open_calls(), 1);

        let (a, b) = tokio::join!(v.submit_password("Secret1!"), v.submit_password("Secret1!"));
        assert!(matches!(a, SubmitOutcome::Resolved(UnlockState::Unlocked(_))));
        assert_eq!(b, SubmitOutcome::Ignored);
        assert_eq!(backend.open_calls(), 2);
    }

    #[tokio::test]
    async fn test_dropped_submit_does_not_block_retry() {
        let backend = Arc::new(
            FakeShareBackend::protected("xyz789", "Secret1!", "view")
                .with_delay(Duration::from_millis(50)),
        );
        let v = viewer(&backend, "xyz789");
        v.open().await;

        let abandoned =
            tokio::time::timeout(Duration::from_millis(10), v.submit_password("wrong")).await;
        assert!(abandoned.is_err());
        assert_eq!(v.state(), UnlockState::PasswordRequired { message: None });

        let outcome = v.submit_password("Secret1!").await;
        assert!(matches!(outcome, SubmitOutcome::Resolved(UnlockState::Unlocked(_))));
        assert_eq!(backend.open_calls(), 3);
    }

    #[tokio::test]
    async fn test_dropped_open_can_be_reopened() {
        let backend = Arc::new(
            FakeShareBackend::public("abc123", "view").with_delay(Duration::from_millis(50)),
        );
        let v = viewer(&backend, "abc123");

        assert!(tokio::time::timeout(Duration::from_millis(10), v.open()).await.is_err());
        assert_eq!(v.state(), UnlockState::Loading);

        assert!(matches!(v.open().await, UnlockState::Unlocked(_)));
        assert_eq!(backend.open_calls(), 2);
    }

    #[tokio::test]
    async fn test_blank_submit_is_ignored() {
        let backend = Arc::new(FakeShareBackend::protected("xyz789", "Secret1!", "view"));
        let v = viewer(&backend, "xyz789");
        v.open().await;

        assert_eq!(v.submit_password("  ").await, SubmitOutcome::Ignored);
        assert_eq!(backend.open_calls(), 1);
    }

    #[tokio::test]
    async fn test_open_runs_once() {
        let backend = Arc::new(FakeShareBackend::public("abc123", "view"));
        let v = viewer(&backend, "abc123");
        v.open().await;
        v.open().await;
        assert_eq!(backend.open_calls(), 1);
    }

    #[tokio::test]
    async fn test_malformed_token_never_calls_backend() {
        let backend = Arc::new(FakeShareBackend::public("abc123", "view"));
        let v = viewer(&backend, "bad token");

        assert_eq!(v.open().await, UnlockState::Error(ShareError::InvalidToken));
        assert_eq!(backend.open_calls(), 0);
    }

    #[tokio::test]
    async fn test_expired_link_is_terminal() {
        let backend = Arc::new(FakeShareBackend::public("abc123", "view"));
        let v = viewer(&backend, "gone");

        let state = v.open().await;
        assert_eq!(state, UnlockState::Error(ShareError::Expired("Link expired".into())));
        assert_eq!(v.submit_password("Secret1!").await, SubmitOutcome::Ignored);
    }

    #[tokio::test]
    async fn test_save_replaces_content_exactly() {
        let backend = Arc::new(FakeShareBackend::public("abc123", "edit"));
        let v = viewer(&backend, "abc123");
        v.open().await;

        assert!(v.begin_edit());
        assert_eq!(v.view().unwrap().draft.as_deref(), Some("Quarterly report"));
        let text = "  Revised figures\n\twith trailing space ";
        assert!(v.set_draft(text));

        assert_eq!(v.save().await.unwrap(), ActionOutcome::Completed(()));
        let view = v.view().unwrap();
        assert_eq!(view.content, text);
        assert!(!v.is_editing());
        assert_eq!(view.controls, vec![Control::Edit]);
        assert_eq!(backend.saved(), vec![text.to_string()]);
    }

    #[tokio::test]
    async fn test_failed_save_keeps_draft() {
        let backend = Arc::new(FakeShareBackend::public("abc123", "edit"));
        backend.fail_saves(Some(ApiError::Http {
            status: 422,
            detail: "Content cannot be empty".into(),
        }));
        let v = viewer(&backend, "abc123");
        v.open().await;
        v.begin_edit();
        v.set_draft("");

        let err = v.save().await.unwrap_err();
        assert_eq!(err, ShareError::Rejected("Content cannot be empty".into()));
        assert!(v.is_editing());
        let view = v.view().unwrap();
        assert_eq!(view.draft.as_deref(), Some(""));
        assert_eq!(view.content, "Quarterly report");
        assert!(view.error.unwrap().starts_with("Failed to save changes:"));

        v.dismiss_error();
        assert_eq!(v.error(), None);
    }

    #[tokio::test]
    async fn test_concurrent_saves_are_suppressed() {
        let backend = Arc::new(
            FakeShareBackend::public("abc123", "edit").with_delay(Duration::from_millis(50)),
        );
        let v = viewer(&backend, "abc123");
        v.open().await;
        v.begin_edit();
        v.set_draft("new");

        let (a, b) = tokio::join!(v.save(), v.save());
        assert_eq!(a.unwrap(), ActionOutcome::Completed(()));
        assert_eq!(b.unwrap(), ActionOutcome::Suppressed);
        assert_eq!(backend.save_calls(), 1);
    }

    #[tokio::test]
    async fn test_draft_edited_during_save_is_kept() {
        let backend = Arc::new(
            FakeShareBackend::public("abc123", "edit").with_delay(Duration::from_millis(50)),
        );
        let v = viewer(&backend, "abc123");
        v.open().await;
        v.begin_edit();
        v.set_draft("first");

        let (saved, _) = tokio::join!(v.save(), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            assert!(v.set_draft("second"));
        });
        assert_eq!(saved.unwrap(), ActionOutcome::Completed(()));

        let view = v.view().unwrap();
        assert_eq!(view.content, "first");
        assert!(v.is_editing());
        assert_eq!(view.draft.as_deref(), Some("second"));
        assert_eq!(backend.saved(), vec!["first".to_string()]);
    }

    #[tokio::test]
    async fn test_save_requires_edit_mode() {
        let backend = Arc::new(FakeShareBackend::public("abc123", "edit"));
        let v = viewer(&backend, "abc123");
        v.open().await;

        assert!(matches!(v.save().await, Err(ShareError::Rejected(_))));
        assert_eq!(backend.save_calls(), 0);
    }

    #[tokio::test]
    async fn test_download_writes_file() {
        let backend = Arc::new(FakeShareBackend::public("abc123", "download"));
        let v = viewer(&backend, "abc123");
        v.open().await;
        assert!(!v.begin_edit());

        let dir = tempfile::tempdir().unwrap();
        let path = v
            .download(DownloadFormat::Docx, dir.path())
            .await
            .unwrap()
            .completed()
            .unwrap();
        assert_eq!(path, dir.path().join("report.docx"));
        assert_eq!(std::fs::read(&path).unwrap(), b"docx-bytes");
    }

    #[tokio::test]
    async fn test_download_kinds_are_independent() {
        let backend = Arc::new(
            FakeShareBackend::public("abc123", "download").with_delay(Duration::from_millis(50)),
        );
        let v = viewer(&backend, "abc123");
        v.open().await;
        let dir = tempfile::tempdir().unwrap();

        let (a, b, c) = tokio::join!(
            v.download(DownloadFormat::Pdf, dir.path()),
            v.download(DownloadFormat::Pdf, dir.path()),
            v.download(DownloadFormat::Docx, dir.path()),
        );
        assert!(matches!(a.unwrap(), ActionOutcome::Completed(_)));
        assert_eq!(b.unwrap(), ActionOutcome::Suppressed);
        assert!(matches!(c.unwrap(), ActionOutcome::Completed(_)));
        assert_eq!(backend.download_calls(), 2);
    }

    #[tokio::test]
    async fn test_failed_download_records_error() {
        let backend = Arc::new(FakeShareBackend::public("abc123", "download"));
        backend.fail_downloads(Some(ApiError::Http {
            status: 403,
            detail: "Share link does not allow this action".into(),
        }));
        let v = viewer(&backend, "abc123");
        v.open().await;

        let dir = tempfile::tempdir().unwrap();
        let err = v.download(DownloadFormat::Pdf, dir.path()).await.unwrap_err();
        assert!(matches!(err, ShareError::PermissionDenied(_)));
        assert!(v.error().unwrap().starts_with("Failed to download PDF"));
    }

    #[test]
    fn test_download_file_name() {
        assert_eq!(download_file_name("report", DownloadFormat::Pdf), "report.pdf");
        assert_eq!(download_file_name("a/b\\c", DownloadFormat::Docx), "a_b_c.docx");
        assert_eq!(download_file_name("memo.PDF", DownloadFormat::Pdf), "memo.pdf");
        assert_eq!(download_file_name("", DownloadFormat::Pdf), "document.pdf");
        assert_eq!(download_file_name("..", DownloadFormat::Pdf), "document.pdf");
    }
}
