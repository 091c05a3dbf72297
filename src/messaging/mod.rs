//! Client messaging channel.
//!
//! Two messages, each handled on its own: `SKIP_WAITING` forces activation of
//! the waiting release, `CHECK_UPDATE` answers with the current version.
//! Messages arrive in-process through [`MessageChannel::spawn`] or over HTTP
//! through the server's message endpoint.
//!
//! Author: kelexine (<https://github.com/kelexine>)

use crate::error::{CoordinatorError, Result};
use crate::metrics;
use crate::registration::Registration;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    /// Command, no reply.
    SkipWaiting,
    /// Query, answered with [`MessageReply::UpdateAvailable`].
    CheckUpdate,
}

impl ClientMessage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientMessage::SkipWaiting => "SKIP_WAITING",
            ClientMessage::CheckUpdate => "CHECK_UPDATE",
        }
    }

    /// Parse a JSON message, rejecting unknown types.
    pub fn from_json(raw: &[u8]) -> Result<Self> {
        serde_json::from_slice(raw)
            .map_err(|e| CoordinatorError::InvalidRequest(format!("unrecognized message: {}", e)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageReply {
    UpdateAvailable { version: String },
}

/// In-process message with an optional reply port.
#[derive(Debug)]
pub struct Envelope {
    pub message: ClientMessage,
    pub reply: Option<oneshot::Sender<MessageReply>>,
}

impl Envelope {
    pub fn command(message: ClientMessage) -> Self {
        Self { message, reply: None }
    }

    /// Build a query envelope and the receiver its reply arrives on.
    pub fn query(message: ClientMessage) -> (Self, oneshot::Receiver<MessageReply>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                message,
                reply: Some(tx),
            },
            rx,
        )
    }
}

#[derive(Clone)]
pub struct MessageChannel {
    registration: Arc<Registration>,
}

impl MessageChannel {
    pub fn new(registration: Arc<Registration>) -> Self {
        Self { registration }
    }

    /// Handle one message. `CHECK_UPDATE` yields a reply, `SKIP_WAITING` none.
    pub async fn handle(&self, message: ClientMessage) -> Result<Option<MessageReply>> {
        metrics::record_message(message.as_str());
        debug!("Received {}", message.as_str());

        match message {
            ClientMessage::SkipWaiting => {
                match self.registration.skip_waiting().await? {
                    Some(promoted) => info!("Skip waiting: {} activated", promoted.version()),
                    None => debug!("Skip waiting: no waiting release"),
                }
                Ok(None)
            }
            ClientMessage::CheckUpdate => {
                let version = self.registration.current_version().ok_or_else(|| {
                    CoordinatorError::NotRegistered(format!(
                        "no release registered for {}",
                        self.registration.origin()
                    ))
                })?;
                Ok(Some(MessageReply::UpdateAvailable { version }))
            }
        }
    }

    /// Serve envelopes from an mpsc channel until every sender is gone.
    ///
    /// Each envelope is handled on its own task so a slow activation never
    /// delays a version query.
    pub fn spawn(self) -> mpsc::Sender<Envelope> {
        let (tx, mut rx) = mpsc::channel::<Envelope>(32);
        tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                let channel = self.clone();
                tokio::spawn(async move {
                    match channel.handle(envelope.message).await {
                        Ok(Some(reply)) => {
                            if let Some(port) = envelope.reply {
                                // Sender may have given up waiting
                                let _ = port.send(reply);
                            }
                        }
                        Ok(None) => {}
                        Err(e) => warn!("{} failed: {}", envelope.message.as_str(), e),
                    }
                });
            }
            debug!("Message channel closed");
        });
        tx
    }
}
