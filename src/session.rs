//! Session - explicit authentication state
//!
//! The signed-in user's bearer token and profile live in a `Session` shared
//! through a `SessionHandle`. The API client reads it to authorize requests and
//! clears it when the backend rejects the token; `SessionStore` persists it
//! between CLI invocations.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::api::UserProfile;
use crate::config::ConfigError;

const SESSION_FILENAME: &str = "session.json";

/// Authentication state of the current user
#[derive(Debug, Default)]
pub struct Session {
    access_token: Option<SecretString>,
    user: Option<UserProfile>,
}

/// Shared handle passed to every component that needs the session
pub type SessionHandle = Arc<RwLock<Session>>;

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_handle(self) -> SessionHandle {
        Arc::new(RwLock::new(self))
    }

    pub fn is_authenticated(&self) -> bool {
        self.access_token.is_some()
    }

    pub fn user(&self) -> Option<&UserProfile> {
        self.user.as_ref()
    }

    pub fn set_user(&mut self, user: Option<UserProfile>) {
        self.user = user;
    }

    /// `Authorization` header value, if signed in
    pub fn bearer(&self) -> Option<String> {
        self.access_token
            .as_ref()
            .map(|t| format!("Bearer {}", t.expose_secret()))
    }

    pub fn sign_in(&mut self, token: String, user: Option<UserProfile>) {
        self.access_token = Some(SecretString::from(token));
        self.user = user;
    }

    pub fn clear(&mut self) {
        self.access_token = None;
        self.user = None;
    }
}

#[derive(Serialize, Deserialize)]
struct StoredSession {
    access_token: String,
    #[serde(default)]
    user: Option<UserProfile>,
}

/// File-backed persistence for `Session`
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config_dir>/docroute/session.json`
    pub fn default_location() -> Self {
        Self::new(crate::config::config_dir().join(SESSION_FILENAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored session; a missing or unreadable file yields a signed-out session.
    pub fn load(&self) -> Session {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Session::new(),
            Err(e) => {
                warn!("Failed to read session file {:?}: {}", self.path, e);
                return Session::new();
            }
        };

        match serde_json::from_str::<StoredSession>(&content) {
            Ok(stored) if !stored.access_token.is_empty() => {
                let mut session = Session::new();
                session.sign_in(stored.access_token, stored.user);
                session
            }
            Ok(_) => Session::new(),
            Err(e) => {
                warn!("Discarding unparsable session file: {}", e);
                Session::new()
            }
        }
    }

    /// Persist a signed-in session; a signed-out session removes the file.
    pub fn save(&self, session: &Session) -> Result<(), ConfigError> {
        let Some(token) = session.access_token.as_ref() else {
            return self.clear();
        };

        if let Some(parent) = self.path.parent() {
            create_private_dir(parent)?;
        }

        let stored = StoredSession {
            access_token: token.expose_secret().to_string(),
            user: session.user.clone(),
        };
        let content = serde_json::to_string_pretty(&stored)
            .map_err(|e| ConfigError::Serialization(e.to_string()))?;
        write_private_file(&self.path, content.as_bytes())?;

        info!("Session saved to {:?}", self.path);
        Ok(())
    }

    pub fn clear(&self) -> Result<(), ConfigError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// ============ Permission Hardening ============

/// Create `dir` (and missing parents) readable by the owner only.
fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
        fs::DirBuilder::new().recursive(true).mode(0o700).create(dir)?;
        // An existing directory keeps its mode under `recursive`
        fs::set_permissions(dir, fs::Permissions::from_mode(0o700))?;
    }
    #[cfg(not(unix))]
    fs::create_dir_all(dir)?;
    Ok(())
}

/// Write `bytes` to a file that is never readable by others, not even briefly.
fn write_private_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    use std::io::Write;

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    #[cfg(unix)]
    {
        // `mode` only applies on creation; tighten a pre-existing file too
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }
    file.write_all(bytes)?;
    file.sync_all()
}
