//! Client-side permission gate.
//!
//! Decides which actions a share view exposes. The backend re-checks the
//! permission on every edit and download, so this only shapes the UI.

use serde::Serialize;

use crate::api::SharePermission;

/// Actions a front end may expose for a share
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AllowedActions {
    pub edit: bool,
    pub download: bool,
}

impl AllowedActions {
    pub const NONE: AllowedActions = AllowedActions { edit: false, download: false };

    pub fn is_read_only(&self) -> bool {
        !self.edit && !self.download
    }
}

/// `view` allows nothing, `edit` allows editing and saving, `download` allows
/// the two format downloads. Edit does not imply download.
pub fn allowed_actions(permission: SharePermission) -> AllowedActions {
    match permission {
        SharePermission::View => AllowedActions::NONE,
        SharePermission::Edit => AllowedActions { edit: true, download: false },
        SharePermission::Download => AllowedActions { edit: false, download: true },
    }
}
