use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::SignatureMode;
use crate::store::EventStore;

mod feed;
mod webhook;


/// Number of events returned by `GET /events`.
pub const RECENT_EVENTS_LIMIT: usize = 50;

pub struct AppState {
    pub store: Arc<dyn EventStore>,
    pub signature: SignatureMode,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(feed::service_info))
        .route("/health", get(feed::health_check))
        .route("/events", get(feed::recent_events))
        .route("/webhook", post(webhook::handle_webhook))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}
