use axum::{extract::State, response::Json};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::warn;

use super::{AppState, RECENT_EVENTS_LIMIT};
use crate::event::StoredEvent;

#[derive(Debug, Serialize)]
pub(super) struct EventView {
    request_id: String,
    author: String,
    action: String,
    from_branch: Option<String>,
    to_branch: Option<String>,
    message: String,
    timestamp: String,
}

impl From<StoredEvent> for EventView {
    fn from(event: StoredEvent) -> Self {
        Self {
            message: event.message(),
            timestamp: event.occurred_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            request_id: event.request_id,
            author: event.author,
            action: event.action,
            from_branch: event.from_branch,
            to_branch: event.to_branch,
        }
    }
}

/// Polled by the dashboard, so store failures yield an empty list.
pub(super) async fn recent_events(State(state): State<Arc<AppState>>) -> Json<Vec<EventView>> {
    match state.store.list_recent(RECENT_EVENTS_LIMIT).await {
        Ok(events) => Json(events.into_iter().map(EventView::from).collect()),
        Err(e) => {
            warn!(error = %e, "serving empty event list");
            Json(Vec::new())
        }
    }
}

pub(super) async fn health_check(State(state): State<Arc<AppState>>) -> Json<Value> {
    let store = match state.store.status().await {
        Ok(status) => json!({
            "backend": status.backend,
            "connected": true,
            "event_count": status.event_count,
        }),
        Err(e) => json!({
            "connected": false,
            "error": e.to_string(),
        }),
    };
    Json(json!({
        "status": "healthy",
        "service": "hookfeed",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        "store": store,
    }))
}

pub(super) async fn service_info() -> Json<Value> {
    Json(json!({
        "service": "hookfeed",
        "endpoints": {
            "webhook": "/webhook",
            "events": "/events",
            "health": "/health",
            "info": "/"
        },
        "supported_events": [
            "push",
            "pull_request (opened)",
            "pull_request (closed, merged)",
            "ping"
        ]
    }))
}
