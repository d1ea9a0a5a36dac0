//! Share-link access: resolve a token, unlock it, and gate what the holder
//! may do with the document.

pub mod permission;
pub mod resolver;
pub mod unlock;
pub mod view;
pub mod viewer;

pub use permission::{allowed_actions, AllowedActions};
pub use resolver::ShareResolver;
pub use unlock::{UnlockMachine, UnlockState};
pub use view::{Control, ShareView};
pub use viewer::{ShareViewer, SubmitOutcome};
