//! Clip request endpoint
//!
//! `POST /api/channels/{broadcaster_id}/clip` runs one acquisition and
//! answers when the foreground poll finishes. Acquisition errors map to
//! HTTP statuses here; the handler holds no logic of its own beyond input
//! validation.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use clip_acquire::{ClipRequest, Error};
use serde::Deserialize;
use tracing::{info, warn};

use crate::AppState;

/// Longest accepted note, in characters
pub const MAX_NOTE_CHARS: usize = 300;

const DEFAULT_REQUESTER: &str = "dashboard";

/// Optional request body. An empty body is the same as `{}`.
#[derive(Debug, Default, Deserialize)]
struct ClipBody {
    #[serde(default)]
    note: Option<String>,
    #[serde(default)]
    requested_by: Option<String>,
    #[serde(default)]
    requested_by_id: Option<String>,
}

/// JSON error body: {"error":{"type":"...","message":"...","request_id":"req_..."}}
pub fn error_response(status: StatusCode, kind: &str, message: &str, request_id: &str) -> Response {
    let body = serde_json::json!({
        "error": {
            "type": kind,
            "message": message,
            "request_id": request_id,
        }
    });
    (
        status,
        [(header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::CooldownActive { .. } => StatusCode::TOO_MANY_REQUESTS,
        Error::NoCredential(_) => StatusCode::NOT_FOUND,
        Error::PollTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        Error::Upstream(_) | Error::RefreshFailed { .. } => StatusCode::BAD_GATEWAY,
        Error::Store(_) | Error::Sink(_) | Error::Aborted(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn clip_error_response(err: &Error, request_id: &str) -> Response {
    let mut response = error_response(status_for(err), err.kind(), &err.to_string(), request_id);
    if let Error::CooldownActive { remaining_secs } = err {
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(*remaining_secs));
    }
    response
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub async fn create_clip_handler(
    State(state): State<AppState>,
    Path(broadcaster_id): Path<String>,
    body: Bytes,
) -> Response {
    let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());

    let body: ClipBody = if body.is_empty() {
        ClipBody::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(parsed) => parsed,
            Err(e) => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    "invalid_request",
                    &format!("invalid request body: {e}"),
                    &request_id,
                );
            }
        }
    };

    // Length applies to the note as sent, before trimming
    if body
        .note
        .as_deref()
        .is_some_and(|n| n.chars().count() > MAX_NOTE_CHARS)
    {
        return error_response(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            &format!("note must be at most {MAX_NOTE_CHARS} characters"),
            &request_id,
        );
    }

    let note = non_empty(body.note);
    let request = ClipRequest {
        account_id: broadcaster_id,
        requested_by: non_empty(body.requested_by).unwrap_or_else(|| DEFAULT_REQUESTER.to_string()),
        requested_by_id: non_empty(body.requested_by_id),
        note,
    };

    match state.orchestrator.request_clip(request).await {
        Ok(clip) => {
            info!(request_id = %request_id, clip_id = %clip.clip_id, "clip request served");
            (StatusCode::OK, axum::Json(clip)).into_response()
        }
        Err(e) => {
            if !matches!(e, Error::CooldownActive { .. }) {
                warn!(request_id = %request_id, error = %e, kind = e.kind(), "clip request failed");
            }
            clip_error_response(&e, &request_id)
        }
    }
}
