//! Clip request and outcome records

use serde::{Deserialize, Serialize};

/// Lifecycle state of a clip outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClipStatus {
    Pending,
    Ok,
    Failed,
}

/// Who asked for a clip on which account.
#[derive(Debug, Clone)]
pub struct ClipRequest {
    pub account_id: String,
    pub requested_by: String,
    pub requested_by_id: Option<String>,
    pub note: Option<String>,
}

impl ClipRequest {
    pub fn new(account_id: impl Into<String>, requested_by: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            requested_by: requested_by.into(),
            requested_by_id: None,
            note: None,
        }
    }
}

/// A clip that is ready to watch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Clip {
    pub clip_id: String,
    pub url: String,
}

/// One appended record in the clip history.
///
/// A single request may produce two records for the same clip id: a `failed`
/// one when the foreground poll gives up and a later `ok` one from the
/// extended poll. Sinks keep both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipOutcome {
    pub account_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clip_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub requested_by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_by_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub status: ClipStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ClipOutcome {
    /// Record started for a request, before anything is known upstream.
    pub fn pending(request: &ClipRequest) -> Self {
        Self {
            account_id: request.account_id.clone(),
            clip_id: None,
            url: None,
            requested_by: request.requested_by.clone(),
            requested_by_id: request.requested_by_id.clone(),
            note: request.note.clone(),
            status: ClipStatus::Pending,
            error: None,
        }
    }

    pub fn succeeded(self, clip: &Clip) -> Self {
        Self {
            clip_id: Some(clip.clip_id.clone()),
            url: Some(clip.url.clone()),
            status: ClipStatus::Ok,
            error: None,
            ..self
        }
    }

    pub fn failed(self, clip_id: Option<String>, error: String) -> Self {
        Self {
            clip_id,
            url: None,
            status: ClipStatus::Failed,
            error: Some(error),
            ..self
        }
    }
}
