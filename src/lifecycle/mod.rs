//! Coordinator lifecycle.
//!
//! A [`Coordinator`] is one release of the cache coordinator for one origin.
//! It moves through `Installing → Waiting → Activating → Active` and ends up
//! `Redundant` when its install is abandoned or a newer release activates.
//! Sequencing several releases against each other is the job of
//! [`crate::registration::Registration`].
//!
//! Author: kelexine (<https://github.com/kelexine>)

mod coordinator;

pub use coordinator::Coordinator;

use serde::{Deserialize, Serialize};

/// Build-time identity of a coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    /// Version identifier, incremented every release.
    pub version: String,
    /// Core shell paths, fetched in order at install time.
    pub manifest: Vec<String>,
}

impl Release {
    pub fn new(version: &str, manifest: &[&str]) -> Self {
        Self {
            version: version.to_string(),
            manifest: manifest.iter().map(|p| p.to_string()).collect(),
        }
    }
}

/// Phase of a coordinator instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    Installing,
    Waiting,
    Activating,
    Active,
    /// Install abandoned or superseded by a newer active instance.
    Redundant,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Installing => "installing",
            LifecycleState::Waiting => "waiting",
            LifecycleState::Activating => "activating",
            LifecycleState::Active => "active",
            LifecycleState::Redundant => "redundant",
        }
    }

    /// Legal forward moves. Any live state may become redundant.
    pub fn can_transition_to(&self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Installing, Waiting)
                | (Waiting, Activating)
                | (Activating, Active)
                | (Installing | Waiting | Activating | Active, Redundant)
        )
    }
}

/// Notifications an application can subscribe to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleEvent {
    /// A new release started installing.
    UpdateFound { version: String },
    StateChanged { version: String, state: LifecycleState },
    /// Open clients are now controlled by `version`.
    ControllerChanged { version: String, clients: usize },
}
