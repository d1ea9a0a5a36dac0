//! Share Resolver: token (+ optional password) to share bundle.

use std::sync::Arc;
use tracing::debug;

use crate::api::{ShareBackend, ShareBundle, ShareError, ShareToken};

#[derive(Clone)]
pub struct ShareResolver {
    backend: Arc<dyn ShareBackend>,
}

impl ShareResolver {
    pub fn new(backend: Arc<dyn ShareBackend>) -> Self {
        Self { backend }
    }

    /// Fetch a share. A blank password counts as no password and is not sent.
    ///
    /// Safe to retry with the same or a corrected password.
    pub async fn resolve(
        &self,
        token: &ShareToken,
        password: Option<&str>,
    ) -> Result<ShareBundle, ShareError> {
        let password = password.map(str::trim).filter(|p| !p.is_empty());

        debug!(
            "Resolving share {} ({})",
            token,
            if password.is_some() { "with password" } else { "no password" }
        );

        let bundle = self
            .backend
            .open_share(token, password)
            .await
            .map_err(|e| ShareError::from_api(e, password.is_some()))?;

        if bundle.document.is_none() {
            return Err(ShareError::NotFound("Document not available".to_string()));
        }

        Ok(bundle)
    }
}
