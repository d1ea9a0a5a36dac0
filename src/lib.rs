//! DocRoute client library
//!
//! Typed async access to the DocRoute document-management backend. The core
//! is the share-link flow: resolve a share token, unlock it with a password
//! when required, and expose only the actions its permission allows. Around
//! it sit physical QR verification and tracking, the one-time document code exchange,
//! the analytics dashboard and the account session.

pub mod analytics;
pub mod api;
pub mod busy;
pub mod config;
pub mod doc_code;
pub mod poller;
pub mod qr;
pub mod qr_tracking;
pub mod session;
pub mod share;
pub mod validation;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{ApiClient, ApiError, ShareError, ShareToken};
pub use config::{load_config, ClientConfig};
pub use session::{Session, SessionHandle, SessionStore};
pub use share::ShareViewer;

use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber for a front end.
///
/// `RUST_LOG` wins when set; otherwise `info`, or `debug` for this crate when
/// `verbose`. Calling it twice is harmless.
pub fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("docroute=debug,info")
        } else {
            EnvFilter::new("info")
        }
    });

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .try_init();
}
