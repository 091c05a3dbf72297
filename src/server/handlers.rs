// HTTP request handlers
// Author: kelexine (https://github.com/kelexine)

use super::routes::AppState;
use crate::error::{CoordinatorError, Result};
use crate::lifecycle::{LifecycleState, Release};
use crate::messaging::ClientMessage;
use crate::models::{Destination, RequestDescriptor, Response as CachedResponse};
use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

/// Largest request body the interceptor buffers before forwarding.
const MAX_FORWARDED_BODY: usize = 16 * 1024 * 1024;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub checks: HashMap<String, HealthCheck>,
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthCheck {
    pub status: String,
    pub message: String,
}

pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let mut checks = HashMap::new();
    let mut overall_status = HealthStatus::Healthy;
    let status = state.registration.status();

    // Active coordinator
    let coordinator_check = match state.registration.active() {
        Some(active) if active.state() == LifecycleState::Active => HealthCheck {
            status: "ok".to_string(),
            message: format!("Active release {}", active.version()),
        },
        Some(active) => {
            overall_status = HealthStatus::Degraded;
            HealthCheck {
                status: "warning".to_string(),
                message: format!("Release {} is {}", active.version(), active.state().as_str()),
            }
        }
        None => {
            overall_status = HealthStatus::Unhealthy;
            HealthCheck {
                status: "error".to_string(),
                message: "No active release, requests pass straight to the network".to_string(),
            }
        }
    };
    checks.insert("coordinator".to_string(), coordinator_check);

    // Pending update
    let update_check = match (&status.installing, &status.waiting) {
        (Some(version), _) => HealthCheck {
            status: "ok".to_string(),
            message: format!("Installing {}", version),
        },
        (None, Some(version)) => HealthCheck {
            status: "ok".to_string(),
            message: format!("{} waiting for {} open client(s)", version, status.clients),
        },
        (None, None) => HealthCheck {
            status: "ok".to_string(),
            message: "No pending update".to_string(),
        },
    };
    checks.insert("update".to_string(), update_check);

    // Cache buckets
    checks.insert(
        "cache".to_string(),
        HealthCheck {
            status: "ok".to_string(),
            message: format!("Buckets: {}", status.buckets.join(", ")),
        },
    );

    // Configuration
    checks.insert(
        "configuration".to_string(),
        HealthCheck {
            status: "ok".to_string(),
            message: format!(
                "Origin {} → upstream {} (script {})",
                state.config.origin.public_url, state.config.origin.upstream_url, status.script_path
            ),
        },
    );

    Json(HealthResponse {
        status: overall_status,
        checks,
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// Prometheus text exposition
pub async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        crate::metrics::gather_metrics(),
    )
}

/// Handler for client messages. Queries reply in the body, commands get 202.
pub async fn message_handler(State(state): State<AppState>, body: Bytes) -> Result<Response> {
    let message = ClientMessage::from_json(&body)?;
    match state.messages.handle(message).await? {
        Some(reply) => Ok(Json(reply).into_response()),
        None => Ok(StatusCode::ACCEPTED.into_response()),
    }
}

/// Body of a registration request. The manifest defaults to the configured one.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub version: String,
    #[serde(default)]
    pub manifest: Option<Vec<String>>,
}

/// Install (and, when nothing holds it back, activate) a release at runtime.
pub async fn register_handler(State(state): State<AppState>, body: Bytes) -> Result<Response> {
    let request: RegisterRequest = serde_json::from_slice(&body)
        .map_err(|e| CoordinatorError::InvalidRequest(format!("invalid registration: {}", e)))?;
    if request.version.trim().is_empty() {
        return Err(CoordinatorError::InvalidRequest("version must not be empty".to_string()));
    }
    let release = Release {
        version: request.version,
        manifest: request
            .manifest
            .unwrap_or_else(|| state.config.coordinator.manifest.clone()),
    };

    info!("Registration of {} requested", release.version);
    state.registration.update(release).await?;
    Ok(Json(state.registration.status()).into_response())
}

/// Fallback: every other request goes through the coordinator.
pub async fn intercept_handler(State(state): State<AppState>, request: Request) -> Result<Response> {
    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, MAX_FORWARDED_BODY)
        .await
        .map_err(|e| CoordinatorError::InvalidRequest(format!("unreadable request body: {}", e)))?;

    let descriptor = describe(state.registration.origin(), &parts.method, &parts.uri, &parts.headers, body)?;
    let foreign = descriptor.origin() != state.registration.origin().origin().ascii_serialization();
    if foreign && !state.config.origin.forward_foreign {
        return Err(CoordinatorError::InvalidRequest(format!(
            "refusing to forward to foreign origin {}",
            descriptor.origin()
        )));
    }
    debug!(
        "Intercepted {} {} ({:?})",
        descriptor.method, descriptor.url, descriptor.destination
    );

    let response = state.registration.fetch(&descriptor).await?;
    Ok(into_http(response))
}

/// Turn an incoming request into the coordinator's request descriptor.
///
/// Absolute-form targets keep their own URL (and so their own origin);
/// origin-form targets are resolved against the public origin.
pub(crate) fn describe(
    origin: &reqwest::Url,
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<RequestDescriptor> {
    let url = if uri.scheme().is_some() && uri.authority().is_some() {
        uri.to_string()
    } else {
        let path = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
        origin
            .join(path)
            .map_err(|e| CoordinatorError::InvalidRequest(format!("invalid target '{}': {}", path, e)))?
            .to_string()
    };

    let mut descriptor = RequestDescriptor::get(&url, destination(method, headers))?
        .with_method(method.as_str())
        .with_body(body);
    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            descriptor = descriptor.with_header(name.as_str(), value);
        }
    }
    Ok(descriptor)
}

/// `Sec-Fetch-Dest` when present, otherwise an HTML-accepting GET counts as
/// a document load.
fn destination(method: &Method, headers: &HeaderMap) -> Destination {
    if let Some(dest) = headers.get("sec-fetch-dest").and_then(|v| v.to_str().ok()) {
        return Destination::from_fetch_dest(dest);
    }
    let accepts_html = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|accept| accept.contains("text/html"))
        .unwrap_or(false);
    if method == Method::GET && accepts_html {
        Destination::Document
    } else {
        Destination::Empty
    }
}

fn into_http(response: CachedResponse) -> Response {
    let mut builder = Response::builder().status(response.status);
    for (name, value) in &response.headers {
        if name.eq_ignore_ascii_case("content-length") || name.eq_ignore_ascii_case("transfer-encoding") {
            continue;
        }
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
        .body(Body::from(response.body))
        .unwrap_or_else(|e| CoordinatorError::Internal(format!("unrepresentable response: {}", e)).into_response())
}
