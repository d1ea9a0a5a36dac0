//! Unlock state machine for password-protected shares.
//!
//! ```text
//!            open()                 finish(Ok)
//! Loading ────────────► (request) ────────────► Unlocked     (terminal)
//!    ▲                      │  finish(Err, password)
//!    │ begin_submit()       ├──────────────────► PasswordRequired
//!    └──────────────────────┘  finish(Err, other)
//!                           └──────────────────► Error        (terminal)
//! ```
//!
//! The machine is synchronous; the caller performs the request between
//! `begin_*` and `finish`. At most one request is in flight at a time. A
//! request that never reaches `finish` (its future was dropped) is rolled
//! back with `abandon`.

use crate::api::{ShareBundle, ShareError};

/// Where a share view currently stands
#[derive(Debug, Clone, PartialEq)]
pub enum UnlockState {
    Loading,
    /// Waiting for a password; `message` explains a previous failed attempt
    PasswordRequired { message: Option<String> },
    Unlocked(ShareBundle),
    Error(ShareError),
}

impl UnlockState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UnlockState::Unlocked(_) | UnlockState::Error(_))
    }

    pub fn bundle(&self) -> Option<&ShareBundle> {
        match self {
            UnlockState::Unlocked(bundle) => Some(bundle),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    Open,
    Submit,
}

#[derive(Debug)]
pub struct UnlockMachine {
    state: UnlockState,
    pending: Option<Pending>,
    opened: bool,
    attempts: u32,
}

impl Default for UnlockMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl UnlockMachine {
    pub fn new() -> Self {
        Self {
            state: UnlockState::Loading,
            pending: None,
            opened: false,
            attempts: 0,
        }
    }

    pub fn state(&self) -> &UnlockState {
        &self.state
    }

    pub fn is_in_flight(&self) -> bool {
        self.pending.is_some()
    }

    /// Password submissions made so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Start the initial password-less load. Returns false if it already ran.
    pub fn begin_open(&mut self) -> bool {
        if self.opened || self.pending.is_some() {
            return false;
        }
        self.opened = true;
        self.pending = Some(Pending::Open);
        self.state = UnlockState::Loading;
        true
    }

    /// Accept a password submission. Only valid while a password is being
    /// asked for, with a non-blank password and nothing in flight.
    pub fn begin_submit(&mut self, password: &str) -> bool {
        if self.pending.is_some()
            || password.trim().is_empty()
            || !matches!(self.state, UnlockState::PasswordRequired { .. })
        {
            return false;
        }
        self.pending = Some(Pending::Submit);
        self.attempts += 1;
        self.state = UnlockState::Loading;
        true
    }

    /// Apply the result of the request started by `begin_open`/`begin_submit`.
    pub fn finish(&mut self, result: Result<ShareBundle, ShareError>) {
        self.pending = None;
        self.state = match result {
            Ok(bundle) => UnlockState::Unlocked(bundle),
            Err(ShareError::PasswordIncorrect) => UnlockState::PasswordRequired {
                message: Some("Incorrect password".to_string()),
            },
            Err(ShareError::PasswordRequired) if self.attempts > 0 => {
                UnlockState::PasswordRequired {
                    message: Some("Password required".to_string()),
                }
            }
            Err(ShareError::PasswordRequired) => UnlockState::PasswordRequired { message: None },
            Err(e) => UnlockState::Error(e),
        };
    }

    /// Enter the terminal error state without a request (e.g. malformed token).
    pub fn fail(&mut self, error: ShareError) {
        self.opened = true;
        self.pending = None;
        self.state = UnlockState::Error(error);
    }

    /// Roll back a request that was started but will never finish. An
    /// abandoned open may run again; an abandoned submit returns to the
    /// password prompt. No-op when nothing is in flight.
    pub fn abandon(&mut self) {
        match self.pending.take() {
            Some(Pending::Open) => {
                self.opened = false;
                self.state = UnlockState::Loading;
            }
            Some(Pending::Submit) => {
                self.state = UnlockState::PasswordRequired { message: None };
            }
            None => {}
        }
    }

    /// Replace the unlocked document's content after a successful save.
    pub fn replace_content(&mut self, content: String) -> bool {
        match &mut self.state {
            UnlockState::Unlocked(ShareBundle { document: Some(doc), .. }) => {
                doc.content = Some(content);
                true
            }
            _ => false,
        }
    }
}
