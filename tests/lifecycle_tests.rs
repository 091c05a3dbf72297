// Lifecycle scenarios: install, waiting, activation and cleanup
// Author: kelexine (https://github.com/kelexine)

mod common;

use common::{get, registration, ScriptedNetwork};
use shellcache::cache::BucketName;
use shellcache::error::CoordinatorError;
use shellcache::lifecycle::{LifecycleEvent, LifecycleState, Release};
use shellcache::models::Destination;
use std::time::Duration;

#[tokio::test]
async fn test_first_install_activates_and_populates_static_bucket() {
    let network = ScriptedNetwork::with_shell();
    let registration = registration(network.clone());

    let v1 = registration.update(Release::new("v1", &["/", "/index.html"])).await.unwrap();

    assert_eq!(v1.state(), LifecycleState::Active);
    let store = registration.store();
    assert_eq!(store.bucket_names(), vec!["static-v1"]);
    assert_eq!(store.entry_count(&BucketName::static_for("v1")), 2);
    for path in ["/", "/index.html"] {
        let cached = store
            .match_in(&BucketName::static_for("v1"), &get(path, Destination::Empty).cache_key())
            .unwrap();
        assert!(!cached.body.is_empty());
    }
}

#[tokio::test]
async fn test_update_waits_for_controlled_clients_then_cleans_up() {
    let network = ScriptedNetwork::with_shell();
    network.serve("/app.js", "console.log('v1')");
    let registration = registration(network.clone());
    registration.update(Release::new("v1", &["/", "/index.html"])).await.unwrap();

    let client = registration.open_client();
    assert_eq!(client.controller().as_deref(), Some("v1"));
    client.fetch(&get("/app.js", Destination::Script)).await.unwrap();
    registration.settle().await;
    assert!(registration.store().has_bucket(&BucketName::dynamic_for("v1")));

    // The open client keeps v2 waiting
    let v2 = registration.update(Release::new("v2", &["/", "/index.html"])).await.unwrap();
    assert_eq!(v2.state(), LifecycleState::Waiting);
    assert_eq!(registration.active().unwrap().version(), "v1");
    assert!(registration.store().has_bucket(&BucketName::static_for("v1")));

    registration.skip_waiting().await.unwrap();
    assert_eq!(v2.state(), LifecycleState::Active);
    assert_eq!(client.controller().as_deref(), Some("v2"));

    client.fetch(&get("/app.js", Destination::Script)).await.unwrap();
    registration.settle().await;

    assert_eq!(
        registration.store().bucket_names(),
        vec!["dynamic-v2".to_string(), "static-v2".to_string()]
    );
}

#[tokio::test]
async fn test_old_version_becomes_redundant() {
    let network = ScriptedNetwork::with_shell();
    let registration = registration(network);
    let v1 = registration.update(Release::new("v1", &["/"])).await.unwrap();
    let v2 = registration.update(Release::new("v2", &["/"])).await.unwrap();

    // No clients, so v2 activates right away
    assert_eq!(v2.state(), LifecycleState::Active);
    assert_eq!(v1.state(), LifecycleState::Redundant);
    assert_eq!(registration.store().bucket_names(), vec!["static-v2"]);
}

#[tokio::test]
async fn test_closing_last_client_promotes_waiting_release() {
    let network = ScriptedNetwork::with_shell();
    let registration = registration(network);
    registration.update(Release::new("v1", &["/"])).await.unwrap();

    let client = registration.open_client();
    let v2 = registration.update(Release::new("v2", &["/"])).await.unwrap();
    assert_eq!(v2.state(), LifecycleState::Waiting);

    let mut state = v2.subscribe_state();
    drop(client);
    tokio::time::timeout(Duration::from_secs(5), state.wait_for(|s| *s == LifecycleState::Active))
        .await
        .expect("waiting release was never promoted")
        .unwrap();
    assert_eq!(registration.active().unwrap().version(), "v2");
}

#[tokio::test]
async fn test_manifest_failure_leaves_active_release_untouched() {
    let network = ScriptedNetwork::with_shell();
    let registration = registration(network.clone());
    registration.update(Release::new("v1", &["/", "/index.html"])).await.unwrap();

    let err = registration
        .update(Release::new("v2", &["/", "/does-not-exist.css"]))
        .await
        .unwrap_err();
    match err {
        CoordinatorError::ManifestFetchFailed { path, .. } => assert_eq!(path, "/does-not-exist.css"),
        other => panic!("unexpected error: {}", other),
    }

    assert_eq!(registration.active().unwrap().version(), "v1");
    assert!(registration.waiting().is_none());
    assert_eq!(registration.store().bucket_names(), vec!["static-v1"]);
    assert_eq!(registration.store().entry_count(&BucketName::static_for("v1")), 2);
}

#[tokio::test]
async fn test_offline_install_writes_nothing() {
    let network = ScriptedNetwork::with_shell();
    network.set_offline(true);
    let registration = registration(network);

    let err = registration.update(Release::new("v1", &["/", "/index.html"])).await.unwrap_err();
    assert!(matches!(err, CoordinatorError::ManifestFetchFailed { .. }));
    assert!(registration.active().is_none());
    assert!(registration.store().bucket_names().is_empty());
}

#[tokio::test]
async fn test_update_is_idempotent_per_version() {
    let network = ScriptedNetwork::with_shell();
    let registration = registration(network.clone());

    let first = registration.update(Release::new("v1", &["/"])).await.unwrap();
    let again = registration.update(Release::new("v1", &["/"])).await.unwrap();

    assert_eq!(first.id(), again.id());
    assert_eq!(network.calls_to("/"), 1);
}

#[tokio::test]
async fn test_lifecycle_events_are_broadcast() {
    let network = ScriptedNetwork::with_shell();
    let registration = registration(network);
    let mut events = registration.subscribe();
    registration.update(Release::new("v1", &["/"])).await.unwrap();
    let _client = registration.open_client();
    registration.update(Release::new("v2", &["/"])).await.unwrap();
    registration.skip_waiting().await.unwrap();

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }

    assert!(seen.contains(&LifecycleEvent::UpdateFound { version: "v2".to_string() }));
    assert!(seen.contains(&LifecycleEvent::StateChanged {
        version: "v1".to_string(),
        state: LifecycleState::Redundant,
    }));
    assert!(seen.contains(&LifecycleEvent::ControllerChanged {
        version: "v2".to_string(),
        clients: 1,
    }));
}

#[tokio::test]
async fn test_skip_waiting_without_waiting_release_is_noop() {
    let network = ScriptedNetwork::with_shell();
    let registration = registration(network);
    registration.update(Release::new("v1", &["/"])).await.unwrap();

    assert!(registration.skip_waiting().await.unwrap().is_none());
    assert!(registration.skip_waiting().await.unwrap().is_none());
    assert_eq!(registration.active().unwrap().version(), "v1");
}
