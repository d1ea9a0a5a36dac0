//! Render-ready description of an unlocked share.

use serde::Serialize;

use super::permission::allowed_actions;
use crate::api::{format_timestamp, ShareBundle};

pub const VIEW_ONLY_NOTICE: &str = "This document is shared with view access.";
pub const NO_PREVIEW: &str = "No preview available";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Control {
    Edit,
    Save,
    Cancel,
    DownloadDocx,
    DownloadPdf,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WatermarkView {
    pub text: String,
    pub opacity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShareView {
    pub title: String,
    /// Uppercased permission, e.g. `EDIT`
    pub badge: String,
    pub tracking_id: Option<String>,
    pub last_updated: String,
    pub watermark: Option<WatermarkView>,
    pub content: String,
    /// Draft text while editing
    pub draft: Option<String>,
    pub controls: Vec<Control>,
    pub notice: Option<&'static str>,
    pub error: Option<String>,
}

impl ShareView {
    pub fn build(bundle: &ShareBundle, draft: Option<&str>, error: Option<&str>) -> Self {
        let allowed = allowed_actions(bundle.permission);
        let doc = bundle.document.as_ref();

        let mut controls = Vec::new();
        if allowed.edit {
            if draft.is_some() {
                controls.extend([Control::Save, Control::Cancel]);
            } else {
                controls.push(Control::Edit);
            }
        }
        if allowed.download {
            controls.extend([Control::DownloadDocx, Control::DownloadPdf]);
        }

        let watermark = bundle.watermark.as_ref().and_then(|w| {
            w.text
                .as_deref()
                .filter(|t| !t.trim().is_empty())
                .map(|text| WatermarkView {
                    text: text.to_string(),
                    opacity: w.opacity.clamp(0.0, 1.0),
                })
        });

        Self {
            title: doc.map(|d| d.file_name.clone()).unwrap_or_default(),
            badge: bundle.permission.to_string().to_uppercase(),
            tracking_id: doc.and_then(|d| d.tracking_id.clone()),
            last_updated: format_timestamp(doc.and_then(|d| d.last_updated_at.as_deref())),
            watermark,
            content: doc
                .and_then(|d| d.content.clone())
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| NO_PREVIEW.to_string()),
            draft: draft.map(str::to_string),
            controls,
            notice: allowed.is_read_only().then_some(VIEW_ONLY_NOTICE),
            error: error.map(str::to_string),
        }
    }

    pub fn has_control(&self, control: Control) -> bool {
        self.controls.contains(&control)
    }
}
