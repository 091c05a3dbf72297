// Client messaging channel tests
// Author: kelexine (https://github.com/kelexine)

mod common;

use common::{registration, ScriptedNetwork};
use shellcache::error::CoordinatorError;
use shellcache::lifecycle::{LifecycleState, Release};
use shellcache::messaging::{ClientMessage, Envelope, MessageChannel, MessageReply};
use std::time::Duration;

#[tokio::test]
async fn test_check_update_reports_active_version() {
    let registration = registration(ScriptedNetwork::with_shell());
    registration.update(Release::new("v1", &["/"])).await.unwrap();
    let channel = MessageChannel::new(registration);

    let reply = channel.handle(ClientMessage::CheckUpdate).await.unwrap();
    assert_eq!(reply, Some(MessageReply::UpdateAvailable { version: "v1".to_string() }));
}

#[tokio::test]
async fn test_check_update_without_release_is_not_registered() {
    let channel = MessageChannel::new(registration(ScriptedNetwork::with_shell()));
    let err = channel.handle(ClientMessage::CheckUpdate).await.unwrap_err();
    assert!(matches!(err, CoordinatorError::NotRegistered(_)));
}

#[tokio::test]
async fn test_skip_waiting_activates_and_has_no_reply() {
    let registration = registration(ScriptedNetwork::with_shell());
    registration.update(Release::new("v1", &["/"])).await.unwrap();
    let _client = registration.open_client();
    let v2 = registration.update(Release::new("v2", &["/"])).await.unwrap();
    assert_eq!(v2.state(), LifecycleState::Waiting);

    let channel = MessageChannel::new(registration.clone());
    assert_eq!(channel.handle(ClientMessage::SkipWaiting).await.unwrap(), None);
    assert_eq!(v2.state(), LifecycleState::Active);

    // Repeating the command changes nothing
    assert_eq!(channel.handle(ClientMessage::SkipWaiting).await.unwrap(), None);
    assert_eq!(registration.active().unwrap().version(), "v2");
}

#[tokio::test]
async fn test_envelopes_over_mpsc() {
    let registration = registration(ScriptedNetwork::with_shell());
    registration.update(Release::new("v1", &["/"])).await.unwrap();
    let _client = registration.open_client();
    let v2 = registration.update(Release::new("v2", &["/"])).await.unwrap();
    let sender = MessageChannel::new(registration.clone()).spawn();

    let mut state = v2.subscribe_state();
    sender.send(Envelope::command(ClientMessage::SkipWaiting)).await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), state.wait_for(|s| *s == LifecycleState::Active))
        .await
        .expect("skip waiting was never applied")
        .unwrap();

    let (query, reply) = Envelope::query(ClientMessage::CheckUpdate);
    sender.send(query).await.unwrap();
    let reply = tokio::time::timeout(Duration::from_secs(5), reply).await.unwrap().unwrap();
    assert_eq!(reply, MessageReply::UpdateAvailable { version: "v2".to_string() });
}
