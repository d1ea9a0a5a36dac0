//! Analytics dashboard data.
//!
//! The five sections are fetched concurrently and applied together. The
//! signed-in profile is fetched alongside but is best-effort: a failure there
//! leaves `user` empty instead of failing the load.

use chrono::{DateTime, Local};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::api::{AnalyticsBackend, ApiError, UserProfile};
use crate::busy::{ActionOutcome, BusyFlag};
use crate::poller::Poller;

pub const SECTIONS: [&str; 5] = ["overview", "workflow", "reminders", "system-health", "doc-code"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsSnapshot {
    pub overview: Value,
    pub workflow: Value,
    pub reminders: Value,
    pub system_health: Value,
    pub doc_code: Value,
    pub user: Option<UserProfile>,
    pub fetched_at: DateTime<Local>,
}

impl AnalyticsSnapshot {
    pub fn section(&self, name: &str) -> Option<&Value> {
        match name {
            "overview" => Some(&self.overview),
            "workflow" => Some(&self.workflow),
            "reminders" => Some(&self.reminders),
            "system-health" => Some(&self.system_health),
            "doc-code" => Some(&self.doc_code),
            _ => None,
        }
    }

    /// Integer metric inside a section, e.g. `("overview", "total_documents")`.
    pub fn metric(&self, section: &str, key: &str) -> Option<i64> {
        self.section(section)?.get(key)?.as_i64()
    }
}

/// A `null` section body counts as empty
fn or_empty(value: Value) -> Value {
    if value.is_null() {
        Value::Object(Default::default())
    } else {
        value
    }
}

pub struct AnalyticsDashboard {
    backend: Arc<dyn AnalyticsBackend>,
    latest: RwLock<Option<AnalyticsSnapshot>>,
    refreshing: BusyFlag,
}

impl AnalyticsDashboard {
    pub fn new(backend: Arc<dyn AnalyticsBackend>) -> Self {
        Self {
            backend,
            latest: RwLock::new(None),
            refreshing: BusyFlag::new(),
        }
    }

    async fn fetch(&self) -> Result<AnalyticsSnapshot, ApiError> {
        let b = &self.backend;
        let (sections, user) = tokio::join!(
            async {
                tokio::try_join!(
                    b.analytics_section(SECTIONS[0]),
                    b.analytics_section(SECTIONS[1]),
                    b.analytics_section(SECTIONS[2]),
                    b.analytics_section(SECTIONS[3]),
                    b.analytics_section(SECTIONS[4]),
                )
            },
            b.current_user(),
        );
        let (overview, workflow, reminders, system_health, doc_code) = sections?;

        let user = match user {
            Ok(user) => Some(user),
            Err(e) => {
                debug!("Profile unavailable for analytics: {}", e);
                None
            }
        };

        Ok(AnalyticsSnapshot {
            overview: or_empty(overview),
            workflow: or_empty(workflow),
            reminders: or_empty(reminders),
            system_health: or_empty(system_health),
            doc_code: or_empty(doc_code),
            user,
            fetched_at: Local::now(),
        })
    }

    /// Foreground load: errors are returned to the caller.
    pub async fn load(&self) -> Result<AnalyticsSnapshot, ApiError> {
        let snapshot = self.fetch().await?;
        *self.latest.write().await = Some(snapshot.clone());
        Ok(snapshot)
    }

    /// Background refresh: failures keep the previous snapshot and are only
    /// logged. Overlapping refreshes are suppressed.
    pub async fn refresh(&self) -> ActionOutcome<bool> {
        let Some(_guard) = self.refreshing.try_acquire() else {
            return ActionOutcome::Suppressed;
        };
        match self.fetch().await {
            Ok(snapshot) => {
                *self.latest.write().await = Some(snapshot);
                ActionOutcome::Completed(true)
            }
            Err(e) => {
                warn!("Background analytics refresh failed: {}", e);
                ActionOutcome::Completed(false)
            }
        }
    }

    pub async fn latest(&self) -> Option<AnalyticsSnapshot> {
        self.latest.read().await.clone()
    }

    /// Refresh every `period` until the returned poller is stopped or dropped.
    pub fn start_polling(self: &Arc<Self>, period: Duration) -> Poller {
        let dashboard = Arc::clone(self);
        Poller::start("analytics", period, move || {
            let dashboard = dashboard.clone();
            async move {
                dashboard.refresh().await;
            }
        })
    }
}
