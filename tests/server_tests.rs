// Router tests driven through tower::ServiceExt
// Author: kelexine (https://github.com/kelexine)

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use common::{registration, ScriptedNetwork};
use http_body_util::BodyExt;
use shellcache::config::AppConfig;
use shellcache::lifecycle::Release;
use shellcache::registration::Registration;
use shellcache::server::create_router;
use std::sync::Arc;
use tower::ServiceExt;

async fn setup() -> (Arc<ScriptedNetwork>, Arc<Registration>, axum::Router) {
    let network = ScriptedNetwork::with_shell();
    let registration = registration(network.clone());
    registration
        .update(Release::new("v1", &["/", "/index.html", "/icon-192.png"]))
        .await
        .unwrap();
    let router = create_router(AppConfig::default(), registration.clone());
    (network, registration, router)
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_health_reports_active_release() {
    let (_, _, router) = setup().await;
    let response = router
        .oneshot(Request::get("/__shellcache/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(json["status"], "healthy");
    assert!(json["checks"]["coordinator"]["message"].as_str().unwrap().contains("v1"));
}

#[tokio::test]
async fn test_metrics_endpoint_exposes_text() {
    let (_, _, router) = setup().await;
    let response = router
        .oneshot(Request::get("/__shellcache/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_string(response).await.contains("lifecycle_transitions_total"));
}

#[tokio::test]
async fn test_check_update_message_over_http() {
    let (_, _, router) = setup().await;
    let response = router
        .oneshot(
            Request::post("/__shellcache/message")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"type":"CHECK_UPDATE"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(json, serde_json::json!({"type": "UPDATE_AVAILABLE", "version": "v1"}));
}

#[tokio::test]
async fn test_skip_waiting_message_is_accepted() {
    let (_, _, router) = setup().await;
    let response = router
        .oneshot(
            Request::post("/__shellcache/message")
                .body(Body::from(r#"{"type":"SKIP_WAITING"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
}

#[tokio::test]
async fn test_unknown_message_is_bad_request() {
    let (_, _, router) = setup().await;
    let response = router
        .oneshot(
            Request::post("/__shellcache/message")
                .body(Body::from(r#"{"type":"PURGE"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(json["error"]["type"], "invalid_request_error");
}

#[tokio::test]
async fn test_intercepted_static_asset_served_from_cache() {
    let (network, _, router) = setup().await;
    let before = network.calls_to("/icon-192.png");

    let response = router
        .oneshot(Request::get("/icon-192.png").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "png-192");
    assert_eq!(network.calls_to("/icon-192.png"), before);
}

#[tokio::test]
async fn test_offline_html_navigation_gets_shell() {
    let (network, _, router) = setup().await;
    network.set_offline(true);

    let response = router
        .oneshot(
            Request::get("/water-tracker")
                .header(header::ACCEPT, "text/html,application/xhtml+xml")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "<html>shell v1</html>");
}

#[tokio::test]
async fn test_offline_uncached_asset_is_gateway_timeout() {
    let (network, _, router) = setup().await;
    network.set_offline(true);

    let response = router
        .oneshot(
            Request::get("/assets/chart.js")
                .header("sec-fetch-dest", "script")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(json["error"]["type"], "network_unavailable");
}

#[tokio::test]
async fn test_register_endpoint_installs_new_release() {
    let (_, registration, router) = setup().await;
    let response = router
        .clone()
        .oneshot(
            Request::post("/__shellcache/register")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"version":"v2","manifest":["/","/index.html"]}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let status: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(status["active"], "v2");
    assert_eq!(registration.store().bucket_names(), vec!["static-v2"]);

    let response = router
        .oneshot(
            Request::post("/__shellcache/message")
                .body(Body::from(r#"{"type":"CHECK_UPDATE"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(json["version"], "v2");
}

#[tokio::test]
async fn test_register_endpoint_reports_failed_install() {
    let (network, registration, router) = setup().await;
    network.set_offline(true);

    let response = router
        .oneshot(
            Request::post("/__shellcache/register")
                .body(Body::from(r#"{"version":"v2"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(registration.active().unwrap().version(), "v1");
}

#[tokio::test]
async fn test_foreign_absolute_target_is_refused() {
    let (network, _, router) = setup().await;
    network.serve("/inter.woff2", "font-bytes");

    let response = router
        .oneshot(
            Request::get("http://fonts.example.com/inter.woff2")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(network.calls_to("/inter.woff2"), 0);
}

#[tokio::test]
async fn test_foreign_absolute_target_forwarded_when_enabled() {
    let network = ScriptedNetwork::with_shell();
    network.serve("/inter.woff2", "font-bytes");
    let registration = registration(network.clone());
    registration.update(Release::new("v1", &["/"])).await.unwrap();
    let mut config = AppConfig::default();
    config.origin.forward_foreign = true;
    let router = create_router(config, registration);

    let response = router
        .oneshot(
            Request::get("http://fonts.example.com/inter.woff2")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "font-bytes");
    assert_eq!(network.calls_to("/inter.woff2"), 1);
}
