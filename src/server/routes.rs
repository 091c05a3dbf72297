// HTTP routes configuration
// Author: kelexine (https://github.com/kelexine)

use super::handlers::{health_handler, intercept_handler, message_handler, metrics_handler, register_handler};
use super::middleware::request_id_layers;
use crate::config::AppConfig;
use crate::messaging::MessageChannel;
use crate::registration::Registration;
use axum::{routing::{get, post}, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Prefix of the proxy's own endpoints; everything else is intercepted.
pub const CONTROL_PREFIX: &str = "/__shellcache";

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub registration: Arc<Registration>,
    pub messages: MessageChannel,
}

pub fn create_router(config: AppConfig, registration: Arc<Registration>) -> Router {
    let state = AppState {
        config,
        messages: MessageChannel::new(registration.clone()),
        registration,
    };

    let (set_request_id, propagate_request_id) = request_id_layers();

    Router::new()
        .route(&format!("{}/health", CONTROL_PREFIX), get(health_handler))
        .route(&format!("{}/metrics", CONTROL_PREFIX), get(metrics_handler))
        .route(&format!("{}/message", CONTROL_PREFIX), post(message_handler))
        .route(&format!("{}/register", CONTROL_PREFIX), post(register_handler))
        .fallback(intercept_handler)
        // Forwarded uploads are buffered in full
        .layer(tower_http::limit::RequestBodyLimitLayer::new(16 * 1024 * 1024))
        .layer(TraceLayer::new_for_http())
        .layer(propagate_request_id)
        .layer(set_request_id)
        .with_state(state)
}
