use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::AppState;
use crate::config::SignatureMode;
use crate::event::Action;
use crate::normalize::{Normalized, normalize};
use crate::signature::verify_signature;

const EVENT_HEADER: &str = "x-github-event";
const SIGNATURE_HEADER: &str = "x-hub-signature-256";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub(super) enum Status {
    Success,
    Skipped,
}

#[derive(Debug, Serialize)]
pub(super) struct WebhookResponse {
    status: Status,
    event_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    action: Option<Action>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_id: Option<String>,
    /// Whether the event reached the store. The delivery itself is always
    /// acknowledged so GitHub does not redeliver.
    #[serde(skip_serializing_if = "Option::is_none")]
    stored: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    repository: Option<String>,
}

impl WebhookResponse {
    fn new(status: Status, event_type: &str) -> Self {
        Self {
            status,
            event_type: event_type.to_owned(),
            action: None,
            message: None,
            request_id: None,
            stored: None,
            repository: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub(super) enum WebhookError {
    #[error("invalid signature")]
    InvalidSignature,
    #[error("invalid JSON payload: {0}")]
    MalformedJson(#[from] serde_json::Error),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::InvalidSignature => StatusCode::UNAUTHORIZED,
            Self::MalformedJson(_) => StatusCode::BAD_REQUEST,
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

pub(super) async fn handle_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, WebhookError> {
    let event_type = header(&headers, EVENT_HEADER).unwrap_or("unknown");

    if event_type == "ping" {
        return Ok(Json(ping(&body)));
    }

    check_signature(&state.signature, &body, header(&headers, SIGNATURE_HEADER))?;

    let payload: Value = serde_json::from_slice(&body).inspect_err(|e| {
        warn!(event_type, error = %e, "failed to parse webhook payload");
    })?;

    let event = match normalize(event_type, &payload, Utc::now()) {
        Normalized::Event(event) => event,
        Normalized::Skipped(reason) => {
            info!(event_type, %reason, "skipping delivery");
            let mut response = WebhookResponse::new(Status::Skipped, event_type);
            response.message = Some(reason.to_string());
            return Ok(Json(response));
        }
    };

    let message = event.message();
    let stored = match state.store.insert(&event).await {
        Ok(id) => {
            info!(id, action = %event.action, request_id = %event.request_id, "stored event");
            true
        }
        Err(e) => {
            error!(action = %event.action, request_id = %event.request_id, error = %e, "failed to store event");
            false
        }
    };

    let mut response = WebhookResponse::new(Status::Success, event_type);
    response.action = Some(event.action);
    response.message = Some(message);
    response.request_id = Some(event.request_id);
    response.stored = Some(stored);
    Ok(Json(response))
}

/// GitHub's connectivity check when a hook is first configured.
fn ping(body: &[u8]) -> WebhookResponse {
    let payload: Value = serde_json::from_slice(body).unwrap_or_default();
    let repository = ["/repository/full_name", "/repository/name"]
        .into_iter()
        .find_map(|pointer| payload.pointer(pointer).and_then(Value::as_str))
        .map(str::to_owned);
    info!(repository = ?repository, "received ping - webhook is configured correctly");

    let mut response = WebhookResponse::new(Status::Success, "ping");
    response.message = Some(
        payload
            .get("zen")
            .and_then(Value::as_str)
            .unwrap_or("pong")
            .to_owned(),
    );
    response.repository = repository;
    response
}

fn check_signature(
    mode: &SignatureMode,
    body: &[u8],
    signature: Option<&str>,
) -> Result<(), WebhookError> {
    match mode {
        SignatureMode::Enforce { secret } => {
            if verify_signature(secret, body, signature) {
                Ok(())
            } else {
                warn!(header_present = signature.is_some(), "invalid webhook signature");
                Err(WebhookError::InvalidSignature)
            }
        }
        SignatureMode::Bypass { secret } => {
            let verified = secret
                .as_deref()
                .map(|secret| verify_signature(secret, body, signature));
            warn!(?verified, "signature verification bypassed, accepting delivery");
            Ok(())
        }
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
